mod common;

use anyhow::Result;
use classfile::{
    builder::{ClassBuilder, CodeBuilder},
    flags::MethodAccessFlags,
    opcode::*,
};
use common::{
    iassert_eq, jdk::throwable_type, make_vm, make_vm_with, message_of, object, sassert_eq,
    uncaught_class, PROBE,
};
use interpreter::{Config, Throwable};

const STATIC: MethodAccessFlags = MethodAccessFlags::STATIC;

fn boom() -> classfile::classfile::ClassDescriptor {
    throwable_type("Boom", "java/lang/RuntimeException")
}

/// `new Boom()` onto the stack
fn new_boom(class: &mut ClassBuilder, code: &mut CodeBuilder) {
    let target = class.class_ref("Boom");
    let init = class.method_ref("Boom", "<init>", "()V");
    code.op_u16(NEW, target).op(DUP).op_u16(INVOKESPECIAL, init);
}

#[test]
fn handlers_see_only_the_exception_on_the_stack() -> Result<()> {
    let mut main = ClassBuilder::new("Main");
    let make = main.method_ref("Main", "make", "()LBoom;");
    let depth = main.method_ref(PROBE, "depth", "()I");
    let capture = main.method_ref(PROBE, "capture", "(I)V");

    let mut code = CodeBuilder::new();
    new_boom(&mut main, &mut code);
    code.op(ARETURN);
    main.method("make", "()LBoom;", STATIC, code.build()?);

    let mut code = CodeBuilder::new();
    code.op(ICONST_1) // 0, left behind on the stack
        .op_u16(INVOKESTATIC, make) // 1
        .op(NOP) // 4
        .op(ATHROW) // 5
        .op(RETURN) // 6
        .nops(13) // 7..20
        .op_u16(INVOKESTATIC, depth) // 20
        .op_u16(INVOKESTATIC, capture)
        .op(POP)
        .op(ICONST_5)
        .op_u16(INVOKESTATIC, capture)
        .op(RETURN)
        .handler_at(0, 10, 20, Some("Boom"));
    assert_eq!(code.pc(), 32);
    main.method("runTest", "()V", STATIC, code.build()?);

    let vm = make_vm([boom(), main.build()]);
    let mut captures = vm.execute_test("Main");

    iassert_eq(1, captures.next());
    iassert_eq(5, captures.next());

    Ok(())
}

#[test]
fn unmatched_handlers_let_the_exception_unwind() -> Result<()> {
    // static void go() { try { throw new Boom(); } catch (ArithmeticException e) { capture(1); } }
    let mut thrower = ClassBuilder::new("Thrower");
    let capture = thrower.method_ref(PROBE, "capture", "(I)V");
    let mut code = CodeBuilder::new();
    let start = code.label();
    let end = code.label();
    let handler = code.label();
    code.bind(start);
    new_boom(&mut thrower, &mut code);
    code.op(ATHROW)
        .bind(end)
        .bind(handler)
        .op(POP)
        .op(ICONST_1)
        .op_u16(INVOKESTATIC, capture)
        .op(RETURN)
        .try_catch(start, end, handler, Some("java/lang/ArithmeticException"));
    thrower.method("go", "()V", STATIC, code.build()?);

    // try { Thrower.go(); } catch (Boom e) { capture(e); }
    let mut main = ClassBuilder::new("Main");
    let go = main.method_ref("Thrower", "go", "()V");
    let capture = main.method_ref(PROBE, "capture", "(Ljava/lang/Object;)V");
    let mut code = CodeBuilder::new();
    let start = code.label();
    let end = code.label();
    let handler = code.label();
    code.bind(start)
        .op_u16(INVOKESTATIC, go)
        .bind(end)
        .op(RETURN)
        .bind(handler)
        .op_u16(INVOKESTATIC, capture)
        .op(RETURN)
        .try_catch(start, end, handler, Some("java/lang/RuntimeException"));
    main.method("runTest", "()V", STATIC, code.build()?);

    let vm = make_vm([boom(), thrower.build(), main.build()]);
    let captures = vm.execute_test("Main");

    assert_eq!(captures.len(), 1);
    assert_eq!(object(captures.get(0)).class().name(), "Boom");

    Ok(())
}

#[test]
fn null_dereferences_raise_a_catchable_exception() -> Result<()> {
    let mut main = ClassBuilder::new("Main");
    let capture = main.method_ref(PROBE, "capture", "(Ljava/lang/Object;)V");
    let mut code = CodeBuilder::new();
    let start = code.label();
    let end = code.label();
    let handler = code.label();
    code.bind(start)
        .op(ACONST_NULL)
        .op(ARRAYLENGTH)
        .op(POP)
        .bind(end)
        .op(RETURN)
        .bind(handler)
        .op_u16(INVOKESTATIC, capture)
        .op(RETURN)
        .try_catch(start, end, handler, Some("java/lang/NullPointerException"));
    main.method("runTest", "()V", STATIC, code.build()?);

    let vm = make_vm([main.build()]);
    let captures = vm.execute_test("Main");

    let exception = object(captures.get(0));
    assert_eq!(exception.class().name(), "java/lang/NullPointerException");

    Ok(())
}

#[test]
fn uncaught_exceptions_end_the_thread_with_a_trace() -> Result<()> {
    let mut main = ClassBuilder::new("Main");
    main.source_file("Main.java");
    let divide = main.method_ref("Main", "divide", "(II)I");

    let mut code = CodeBuilder::new();
    code.line(10)
        .op(ILOAD_0)
        .op(ILOAD_1)
        .op(IDIV)
        .op(IRETURN);
    main.method("divide", "(II)I", STATIC, code.build()?);

    let mut code = CodeBuilder::new();
    code.line(3)
        .op(ICONST_1)
        .line(4)
        .op(ICONST_0)
        .op_u16(INVOKESTATIC, divide)
        .op(POP)
        .op(RETURN);
    main.method("runTest", "()V", STATIC, code.build()?);

    let vm = make_vm([main.build()]);
    let result = vm.run("Main", "runTest", "()V", vec![]);

    assert!(result.error.is_none());
    assert_eq!(uncaught_class(&result), "java/lang/ArithmeticException");

    let exception = result.uncaught.as_ref().expect("an exception");
    assert_eq!(message_of(exception).as_deref(), Some("/ by zero"));

    let trace = exception.stack_trace().expect("a throwable payload");
    assert_eq!(trace.len(), 2);
    assert_eq!(trace[0].method_name, "divide");
    assert_eq!(trace[0].line, Some(10));
    assert_eq!(trace[1].method_name, "runTest");
    assert_eq!(trace[1].line, Some(4));
    assert_eq!(trace[1].to_string(), "at Main.runTest(Main.java:4)");

    Ok(())
}

#[test]
fn synchronized_methods_release_their_monitor_when_unwinding() -> Result<()> {
    let mut locked = ClassBuilder::new("Locked");
    let this_class = locked.class_ref("Locked");
    let holds = locked.method_ref("java/lang/Thread", "holdsLock", "(Ljava/lang/Object;)Z");
    let capture = locked.method_ref(PROBE, "capture", "(I)V");

    // capture(Thread.holdsLock(Locked.class)); 1 / 0;
    let mut code = CodeBuilder::new();
    code.op_u8(LDC, this_class as u8)
        .op_u16(INVOKESTATIC, holds)
        .op_u16(INVOKESTATIC, capture)
        .op(ICONST_1)
        .op(ICONST_0)
        .op(IDIV)
        .op(POP)
        .op(RETURN);
    locked.method(
        "explode",
        "()V",
        STATIC | MethodAccessFlags::SYNCHRONIZED,
        code.build()?,
    );

    let explode = locked.method_ref("Locked", "explode", "()V");
    let mut code = CodeBuilder::new();
    let start = code.label();
    let end = code.label();
    let handler = code.label();
    code.bind(start)
        .op_u16(INVOKESTATIC, explode)
        .bind(end)
        .op(RETURN)
        .bind(handler)
        .op(POP)
        .op_u8(LDC, this_class as u8)
        .op_u16(INVOKESTATIC, holds)
        .op_u16(INVOKESTATIC, capture)
        .op(RETURN)
        .try_catch(start, end, handler, Some("java/lang/ArithmeticException"));
    locked.method("runTest", "()V", STATIC, code.build()?);

    let vm = make_vm([locked.build()]);
    let mut captures = vm.execute_test("Locked");

    iassert_eq(1, captures.next());
    iassert_eq(0, captures.next());

    Ok(())
}

#[test]
fn runaway_recursion_is_a_stack_overflow() -> Result<()> {
    let mut main = ClassBuilder::new("Main");
    let down = main.method_ref("Main", "down", "()V");
    let capture = main.method_ref(PROBE, "capture", "(I)V");

    let mut code = CodeBuilder::new();
    code.op_u16(INVOKESTATIC, down).op(RETURN);
    main.method("down", "()V", STATIC, code.build()?);

    let mut code = CodeBuilder::new();
    let start = code.label();
    let end = code.label();
    let handler = code.label();
    code.bind(start)
        .op_u16(INVOKESTATIC, down)
        .bind(end)
        .op(RETURN)
        .bind(handler)
        .op(POP)
        .op(ICONST_1)
        .op_u16(INVOKESTATIC, capture)
        .op(RETURN)
        .try_catch(start, end, handler, Some("java/lang/StackOverflowError"));
    main.method("runTest", "()V", STATIC, code.build()?);

    let config = Config::default().with_max_stack(32);
    let vm = make_vm_with(config, [main.build()]);
    let mut captures = vm.execute_test("Main");

    iassert_eq(1, captures.next());

    // Uncaught, it ends the thread like any other exception
    let result = vm.run("Main", "down", "()V", vec![]);
    assert_eq!(uncaught_class(&result), "java/lang/StackOverflowError");

    Ok(())
}

#[test]
fn stack_traces_start_at_the_allocation_site() -> Result<()> {
    let mut main = ClassBuilder::new("Main");
    main.source_file("Main.java");
    let depth = main.method_ref("java/lang/Throwable", "getStackTraceDepth", "()I");
    let element = main.method_ref(
        "java/lang/Throwable",
        "getStackTraceElement",
        "(I)Ljava/lang/StackTraceElement;",
    );
    let method_name = main.field_ref("java/lang/StackTraceElement", "methodName", "Ljava/lang/String;");
    let declaring = main.field_ref("java/lang/StackTraceElement", "declaringClass", "Ljava/lang/String;");
    let line = main.field_ref("java/lang/StackTraceElement", "lineNumber", "I");
    let capture_int = main.method_ref(PROBE, "capture", "(I)V");
    let capture_object = main.method_ref(PROBE, "capture", "(Ljava/lang/Object;)V");

    let mut code = CodeBuilder::new();
    code.line(7);
    new_boom(&mut main, &mut code);
    code.line(8)
        .op(ASTORE_0)
        .op(ALOAD_0)
        .op_u16(INVOKEVIRTUAL, depth)
        .op_u16(INVOKESTATIC, capture_int)
        .op(ALOAD_0)
        .op(ICONST_0)
        .op_u16(INVOKEVIRTUAL, element)
        .op(ASTORE_1)
        .op(ALOAD_1)
        .op_u16(GETFIELD, method_name)
        .op_u16(INVOKESTATIC, capture_object)
        .op(ALOAD_1)
        .op_u16(GETFIELD, declaring)
        .op_u16(INVOKESTATIC, capture_object)
        .op(ALOAD_1)
        .op_u16(GETFIELD, line)
        .op_u16(INVOKESTATIC, capture_int)
        .op(RETURN);
    main.method("runTest", "()V", STATIC, code.build()?);

    let vm = make_vm([boom(), main.build()]);
    let mut captures = vm.execute_test("Main");

    iassert_eq(1, captures.next());
    sassert_eq("runTest", captures.next());
    sassert_eq("Main", captures.next());
    iassert_eq(7, captures.next());

    // Out of range indices are the guest's problem
    let mut probe = ClassBuilder::new("OutOfRange");
    let element = probe.method_ref(
        "java/lang/Throwable",
        "getStackTraceElement",
        "(I)Ljava/lang/StackTraceElement;",
    );
    let mut code = CodeBuilder::new();
    new_boom(&mut probe, &mut code);
    code.op_i8(BIPUSH, 9)
        .op_u16(INVOKEVIRTUAL, element)
        .op(POP)
        .op(RETURN);
    probe.method("runTest", "()V", STATIC, code.build()?);

    let vm = make_vm([boom(), probe.build()]);
    let result = vm.run("OutOfRange", "runTest", "()V", vec![]);
    assert_eq!(
        uncaught_class(&result),
        "java/lang/ArrayIndexOutOfBoundsException"
    );

    Ok(())
}

#[test]
fn unregistered_natives_abort_the_thread() -> Result<()> {
    let mut main = ClassBuilder::new("Main");
    main.native_method("mystery", "()V", STATIC);
    let mystery = main.method_ref("Main", "mystery", "()V");
    let mut code = CodeBuilder::new();
    code.op_u16(INVOKESTATIC, mystery).op(RETURN);
    main.method("runTest", "()V", STATIC, code.build()?);

    let vm = make_vm([main.build()]);
    let result = vm.run("Main", "runTest", "()V", vec![]);

    assert!(
        matches!(&result.error, Some(Throwable::NativeNotFound(name)) if name.contains("mystery")),
        "{:?}",
        result
    );

    Ok(())
}
