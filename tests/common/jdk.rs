//! A minimal `java.base`, assembled in code. Just enough of each class for the
//! interpreter and its built-in natives to work against.

use classfile::{
    builder::{ClassBuilder, CodeBuilder},
    classfile::ClassDescriptor,
    flags::{FieldAccessFlags, MethodAccessFlags},
    opcode::*,
};

const PUBLIC: MethodAccessFlags = MethodAccessFlags::PUBLIC;
const NATIVE_STATIC: MethodAccessFlags = MethodAccessFlags::from_bits_truncate(
    MethodAccessFlags::PUBLIC.bits() | MethodAccessFlags::STATIC.bits(),
);

fn object() -> ClassDescriptor {
    let mut class = ClassBuilder::new("java/lang/Object");
    class.default_constructor();

    class
        .native_method("registerNatives", "()V", NATIVE_STATIC)
        .native_method("hashCode", "()I", PUBLIC)
        .native_method("getClass", "()Ljava/lang/Class;", PUBLIC | MethodAccessFlags::FINAL)
        .native_method("clone", "()Ljava/lang/Object;", MethodAccessFlags::PROTECTED)
        .native_method("wait", "(J)V", PUBLIC | MethodAccessFlags::FINAL)
        .native_method("notify", "()V", PUBLIC | MethodAccessFlags::FINAL)
        .native_method("notifyAll", "()V", PUBLIC | MethodAccessFlags::FINAL);

    let wait = class.method_ref("java/lang/Object", "wait", "(J)V");
    let mut code = CodeBuilder::new();
    code.op(ALOAD_0).op(LCONST_0).op_u16(INVOKEVIRTUAL, wait).op(RETURN);
    class.method("wait", "()V", PUBLIC | MethodAccessFlags::FINAL, code.build().expect("wait()V"));

    class.build()
}

fn class() -> ClassDescriptor {
    let mut class = ClassBuilder::new("java/lang/Class");
    class
        .native_method("registerNatives", "()V", NATIVE_STATIC)
        .native_method("desiredAssertionStatus0", "(Ljava/lang/Class;)Z", NATIVE_STATIC)
        .native_method("isInterface", "()Z", PUBLIC)
        .native_method("isArray", "()Z", PUBLIC);

    class.build()
}

fn string() -> ClassDescriptor {
    let mut class = ClassBuilder::new("java/lang/String");
    class
        .implements("java/io/Serializable")
        .field("value", "[C", FieldAccessFlags::PRIVATE | FieldAccessFlags::FINAL)
        .default_constructor();

    let value = class.field_ref("java/lang/String", "value", "[C");
    let mut code = CodeBuilder::new();
    code.op(ALOAD_0)
        .op_u16(GETFIELD, value)
        .op(ARRAYLENGTH)
        .op(IRETURN);
    class.method("length", "()I", PUBLIC, code.build().expect("length()I"));
    class.native_method("intern", "()Ljava/lang/String;", PUBLIC);

    class.build()
}

fn marker_interface(name: &str) -> ClassDescriptor {
    ClassBuilder::interface(name).build()
}

/// A throwable type with the usual `()` and `(String)` constructors
pub fn throwable_type(name: &str, super_class: &str) -> ClassDescriptor {
    let mut class = ClassBuilder::new(name);
    class.extends(super_class).default_constructor();

    let init = class.method_ref(super_class, "<init>", "(Ljava/lang/String;)V");
    let mut code = CodeBuilder::new();
    code.op(ALOAD_0)
        .op(ALOAD_1)
        .op_u16(INVOKESPECIAL, init)
        .op(RETURN);
    class.method("<init>", "(Ljava/lang/String;)V", PUBLIC, code.build().expect("<init>"));

    class.build()
}

fn throwable() -> ClassDescriptor {
    let mut class = ClassBuilder::new("java/lang/Throwable");
    class
        .implements("java/io/Serializable")
        .field("detailMessage", "Ljava/lang/String;", FieldAccessFlags::PRIVATE)
        .native_method("fillInStackTrace", "(I)Ljava/lang/Throwable;", PUBLIC)
        .native_method("getStackTraceDepth", "()I", PUBLIC)
        .native_method(
            "getStackTraceElement",
            "(I)Ljava/lang/StackTraceElement;",
            PUBLIC,
        );

    let object_init = class.method_ref("java/lang/Object", "<init>", "()V");
    let fill = class.method_ref("java/lang/Throwable", "fillInStackTrace", "()Ljava/lang/Throwable;");
    let fill_native = class.method_ref("java/lang/Throwable", "fillInStackTrace", "(I)Ljava/lang/Throwable;");
    let message = class.field_ref("java/lang/Throwable", "detailMessage", "Ljava/lang/String;");

    let mut code = CodeBuilder::new();
    code.op(ALOAD_0)
        .op(ICONST_0)
        .op_u16(INVOKEVIRTUAL, fill_native)
        .op(ARETURN);
    class.method(
        "fillInStackTrace",
        "()Ljava/lang/Throwable;",
        PUBLIC,
        code.build().expect("fillInStackTrace"),
    );

    let mut code = CodeBuilder::new();
    code.op(ALOAD_0)
        .op_u16(INVOKESPECIAL, object_init)
        .op(ALOAD_0)
        .op_u16(INVOKEVIRTUAL, fill)
        .op(POP)
        .op(RETURN);
    class.method("<init>", "()V", PUBLIC, code.build().expect("<init>()V"));

    let mut code = CodeBuilder::new();
    code.op(ALOAD_0)
        .op_u16(INVOKESPECIAL, object_init)
        .op(ALOAD_0)
        .op_u16(INVOKEVIRTUAL, fill)
        .op(POP)
        .op(ALOAD_0)
        .op(ALOAD_1)
        .op_u16(PUTFIELD, message)
        .op(RETURN);
    class.method(
        "<init>",
        "(Ljava/lang/String;)V",
        PUBLIC,
        code.build().expect("<init>(String)V"),
    );

    let mut code = CodeBuilder::new();
    code.op(ALOAD_0).op_u16(GETFIELD, message).op(ARETURN);
    class.method("getMessage", "()Ljava/lang/String;", PUBLIC, code.build().expect("getMessage"));

    class.build()
}

fn stack_trace_element() -> ClassDescriptor {
    let mut class = ClassBuilder::new("java/lang/StackTraceElement");
    class
        .field("declaringClass", "Ljava/lang/String;", FieldAccessFlags::PRIVATE)
        .field("methodName", "Ljava/lang/String;", FieldAccessFlags::PRIVATE)
        .field("fileName", "Ljava/lang/String;", FieldAccessFlags::PRIVATE)
        .field("lineNumber", "I", FieldAccessFlags::PRIVATE);

    class.build()
}

fn runnable() -> ClassDescriptor {
    let mut class = ClassBuilder::interface("java/lang/Runnable");
    class.abstract_method("run", "()V");
    class.build()
}

fn thread() -> ClassDescriptor {
    let name = "java/lang/Thread";
    let mut class = ClassBuilder::new(name);
    class
        .implements("java/lang/Runnable")
        .field("name", "Ljava/lang/String;", FieldAccessFlags::PRIVATE)
        .field("daemon", "Z", FieldAccessFlags::PRIVATE)
        .field("threadStatus", "I", FieldAccessFlags::PRIVATE)
        .field("target", "Ljava/lang/Runnable;", FieldAccessFlags::PRIVATE)
        .default_constructor()
        .native_method("registerNatives", "()V", NATIVE_STATIC)
        .native_method("currentThread", "()Ljava/lang/Thread;", NATIVE_STATIC)
        .native_method("start0", "()V", MethodAccessFlags::PRIVATE)
        .native_method("isAlive", "()Z", PUBLIC | MethodAccessFlags::FINAL)
        .native_method("interrupt0", "()V", MethodAccessFlags::PRIVATE)
        .native_method("isInterrupted", "(Z)Z", MethodAccessFlags::PRIVATE)
        .native_method("sleep", "(J)V", NATIVE_STATIC)
        .native_method("yield", "()V", NATIVE_STATIC)
        .native_method("setPriority0", "(I)V", MethodAccessFlags::PRIVATE)
        .native_method("holdsLock", "(Ljava/lang/Object;)Z", NATIVE_STATIC);

    let object_init = class.method_ref("java/lang/Object", "<init>", "()V");
    let target = class.field_ref(name, "target", "Ljava/lang/Runnable;");
    let daemon = class.field_ref(name, "daemon", "Z");
    let run = class.interface_method_ref("java/lang/Runnable", "run", "()V");
    let start0 = class.method_ref(name, "start0", "()V");
    let interrupt0 = class.method_ref(name, "interrupt0", "()V");
    let is_interrupted = class.method_ref(name, "isInterrupted", "(Z)Z");
    let is_alive = class.method_ref(name, "isAlive", "()Z");
    let wait = class.method_ref(name, "wait", "(J)V");

    let mut code = CodeBuilder::new();
    code.op(ALOAD_0)
        .op_u16(INVOKESPECIAL, object_init)
        .op(ALOAD_0)
        .op(ALOAD_1)
        .op_u16(PUTFIELD, target)
        .op(RETURN);
    class.method("<init>", "(Ljava/lang/Runnable;)V", PUBLIC, code.build().expect("<init>"));

    let mut code = CodeBuilder::new();
    let done = code.label();
    code.op(ALOAD_0)
        .op_u16(GETFIELD, target)
        .op(ASTORE_1)
        .op(ALOAD_1)
        .branch(IFNULL, done)
        .op(ALOAD_1)
        .invokeinterface(run, 1)
        .bind(done)
        .op(RETURN);
    class.method("run", "()V", PUBLIC, code.build().expect("run"));

    let mut code = CodeBuilder::new();
    code.op(ALOAD_0).op_u16(INVOKEVIRTUAL, start0).op(RETURN);
    class.method("start", "()V", PUBLIC, code.build().expect("start"));

    let mut code = CodeBuilder::new();
    code.op(ALOAD_0).op_u16(INVOKEVIRTUAL, interrupt0).op(RETURN);
    class.method("interrupt", "()V", PUBLIC, code.build().expect("interrupt"));

    let mut code = CodeBuilder::new();
    code.op(ALOAD_0)
        .op(ICONST_0)
        .op_u16(INVOKEVIRTUAL, is_interrupted)
        .op(IRETURN);
    class.method("isInterrupted", "()Z", PUBLIC, code.build().expect("isInterrupted"));

    let mut code = CodeBuilder::new();
    code.op(ALOAD_0).op(ILOAD_1).op_u16(PUTFIELD, daemon).op(RETURN);
    class.method("setDaemon", "(Z)V", PUBLIC, code.build().expect("setDaemon"));

    // while (isAlive()) wait(0);
    let mut code = CodeBuilder::new();
    let check = code.label();
    let done = code.label();
    code.bind(check)
        .op(ALOAD_0)
        .op_u16(INVOKEVIRTUAL, is_alive)
        .branch(IFEQ, done)
        .op(ALOAD_0)
        .op(LCONST_0)
        .op_u16(INVOKEVIRTUAL, wait)
        .branch(GOTO, check)
        .bind(done)
        .op(RETURN);
    class.method(
        "join",
        "()V",
        PUBLIC | MethodAccessFlags::SYNCHRONIZED,
        code.build().expect("join"),
    );

    class.build()
}

fn system() -> ClassDescriptor {
    let mut class = ClassBuilder::new("java/lang/System");
    class
        .native_method("registerNatives", "()V", NATIVE_STATIC)
        .native_method(
            "arraycopy",
            "(Ljava/lang/Object;ILjava/lang/Object;II)V",
            NATIVE_STATIC,
        )
        .native_method("currentTimeMillis", "()J", NATIVE_STATIC)
        .native_method("nanoTime", "()J", NATIVE_STATIC)
        .native_method("identityHashCode", "(Ljava/lang/Object;)I", NATIVE_STATIC);

    class.build()
}

fn file_descriptor() -> ClassDescriptor {
    let mut class = ClassBuilder::new("java/io/FileDescriptor");
    class
        .field("fd", "I", FieldAccessFlags::PRIVATE)
        .default_constructor()
        .native_method("initIDs", "()V", NATIVE_STATIC);

    class.build()
}

fn file_output_stream() -> ClassDescriptor {
    let mut class = ClassBuilder::new("java/io/FileOutputStream");
    class
        .field("fd", "Ljava/io/FileDescriptor;", FieldAccessFlags::PRIVATE)
        .default_constructor()
        .native_method("initIDs", "()V", NATIVE_STATIC)
        .native_method("writeBytes", "([BIIZ)V", MethodAccessFlags::PRIVATE);

    class.build()
}

/// Every class above, plus the exception hierarchy the VM raises into
pub fn java_base() -> Vec<ClassDescriptor> {
    let mut classes = vec![
        object(),
        class(),
        string(),
        marker_interface("java/lang/Cloneable"),
        marker_interface("java/io/Serializable"),
        throwable(),
        stack_trace_element(),
        runnable(),
        thread(),
        system(),
        file_descriptor(),
        file_output_stream(),
    ];

    let hierarchy = [
        ("java/lang/Exception", "java/lang/Throwable"),
        ("java/lang/Error", "java/lang/Throwable"),
        ("java/lang/RuntimeException", "java/lang/Exception"),
        ("java/lang/InterruptedException", "java/lang/Exception"),
        ("java/lang/CloneNotSupportedException", "java/lang/Exception"),
        ("java/lang/NullPointerException", "java/lang/RuntimeException"),
        ("java/lang/ArithmeticException", "java/lang/RuntimeException"),
        ("java/lang/IndexOutOfBoundsException", "java/lang/RuntimeException"),
        ("java/lang/ArrayIndexOutOfBoundsException", "java/lang/IndexOutOfBoundsException"),
        ("java/lang/NegativeArraySizeException", "java/lang/RuntimeException"),
        ("java/lang/ClassCastException", "java/lang/RuntimeException"),
        ("java/lang/ArrayStoreException", "java/lang/RuntimeException"),
        ("java/lang/IllegalMonitorStateException", "java/lang/RuntimeException"),
        ("java/lang/IllegalArgumentException", "java/lang/RuntimeException"),
        ("java/lang/IllegalThreadStateException", "java/lang/IllegalArgumentException"),
        ("java/lang/VirtualMachineError", "java/lang/Error"),
        ("java/lang/StackOverflowError", "java/lang/VirtualMachineError"),
        ("java/lang/LinkageError", "java/lang/Error"),
        ("java/lang/IncompatibleClassChangeError", "java/lang/LinkageError"),
        ("java/lang/InstantiationError", "java/lang/IncompatibleClassChangeError"),
        ("java/lang/AbstractMethodError", "java/lang/IncompatibleClassChangeError"),
    ];

    classes.extend(
        hierarchy
            .iter()
            .map(|(name, super_class)| throwable_type(name, super_class)),
    );

    classes
}
