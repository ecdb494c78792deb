mod common;

use anyhow::Result;
use classfile::{
    builder::{ClassBuilder, CodeBuilder},
    flags::MethodAccessFlags,
    opcode::*,
};
use common::{assert_null, dassert_eq, iassert_eq, make_vm, message_of, sassert_eq, uncaught_class, PROBE};
use interpreter::Throwable;

const STATIC: MethodAccessFlags = MethodAccessFlags::STATIC;

const T_CHAR: u8 = 5;
const T_BYTE: u8 = 8;
const T_INT: u8 = 10;

struct Captures {
    int: u16,
    long: u16,
    double: u16,
    object: u16,
}

fn captures(class: &mut ClassBuilder) -> Captures {
    Captures {
        int: class.method_ref(PROBE, "capture", "(I)V"),
        long: class.method_ref(PROBE, "capture", "(J)V"),
        double: class.method_ref(PROBE, "capture", "(D)V"),
        object: class.method_ref(PROBE, "capture", "(Ljava/lang/Object;)V"),
    }
}

#[test]
fn integer_arithmetic_wraps() -> Result<()> {
    let mut main = ClassBuilder::new("Main");
    let capture = captures(&mut main);
    let max = main.int(i32::MAX) as u8;
    let min = main.int(i32::MIN) as u8;
    let long_max = main.long(i64::MAX);
    let big = main.long(1 << 40);

    let mut code = CodeBuilder::new();
    code.op_u8(LDC, max)
        .op(ICONST_1)
        .op(IADD)
        .op_u16(INVOKESTATIC, capture.int)
        .op_u8(LDC, min)
        .op(ICONST_M1)
        .op(IDIV)
        .op_u16(INVOKESTATIC, capture.int)
        .op_i8(BIPUSH, -7)
        .op(ICONST_3)
        .op(IREM)
        .op_u16(INVOKESTATIC, capture.int)
        .op(ICONST_1)
        .op_i8(BIPUSH, 33)
        .op(ISHL)
        .op_u16(INVOKESTATIC, capture.int)
        .op(ICONST_M1)
        .op_i8(BIPUSH, 28)
        .op(IUSHR)
        .op_u16(INVOKESTATIC, capture.int)
        .op_i8(BIPUSH, -16)
        .op(ICONST_2)
        .op(ISHR)
        .op_u16(INVOKESTATIC, capture.int)
        .op_u16(LDC2_W, long_max)
        .op(LCONST_1)
        .op(LADD)
        .op_u16(INVOKESTATIC, capture.long)
        .op_u16(LDC2_W, big)
        .op(L2I)
        .op_u16(INVOKESTATIC, capture.int)
        .op(ICONST_5)
        .op(ISTORE_0)
        .iinc(0, -7)
        .op(ILOAD_0)
        .op_u16(INVOKESTATIC, capture.int)
        .op(RETURN);
    main.method("runTest", "()V", STATIC, code.build()?);

    let vm = make_vm([main.build()]);
    let mut captures = vm.execute_test("Main");

    iassert_eq(i32::MIN as i64, captures.next());
    iassert_eq(i32::MIN as i64, captures.next());
    iassert_eq(-1, captures.next());
    iassert_eq(2, captures.next());
    iassert_eq(15, captures.next());
    iassert_eq(-4, captures.next());
    iassert_eq(i64::MIN, captures.next());
    iassert_eq(0, captures.next());
    iassert_eq(-2, captures.next());

    Ok(())
}

#[test]
fn long_division_by_zero_throws() -> Result<()> {
    let mut main = ClassBuilder::new("Main");
    let mut code = CodeBuilder::new();
    code.op(LCONST_1)
        .op(LCONST_0)
        .op(LREM)
        .op(POP2)
        .op(RETURN);
    main.method("runTest", "()V", STATIC, code.build()?);

    let vm = make_vm([main.build()]);
    let result = vm.run("Main", "runTest", "()V", vec![]);

    assert_eq!(uncaught_class(&result), "java/lang/ArithmeticException");
    let exception = result.uncaught.as_ref().expect("an exception");
    assert_eq!(message_of(exception).as_deref(), Some("/ by zero"));

    Ok(())
}

#[test]
fn floating_point_comparisons_and_conversions() -> Result<()> {
    let mut main = ClassBuilder::new("Main");
    let capture = captures(&mut main);
    let huge = main.double(1e20);
    let two = main.double(2.0);
    let three = main.long(3);
    let five = main.long(5);

    let mut code = CodeBuilder::new();
    // float nan = 0f / 0f;
    code.op(FCONST_0)
        .op(FCONST_0)
        .op(FDIV)
        .op(FSTORE_0)
        .op(FLOAD_0)
        .op(FCONST_1)
        .op(FCMPL)
        .op_u16(INVOKESTATIC, capture.int)
        .op(FLOAD_0)
        .op(FCONST_1)
        .op(FCMPG)
        .op_u16(INVOKESTATIC, capture.int)
        .op(FLOAD_0)
        .op(F2I)
        .op_u16(INVOKESTATIC, capture.int)
        .op_u16(LDC2_W, huge)
        .op(D2I)
        .op_u16(INVOKESTATIC, capture.int)
        .op_u16(LDC2_W, huge)
        .op(DNEG)
        .op(D2I)
        .op_u16(INVOKESTATIC, capture.int)
        .op_i16(SIPUSH, 200)
        .op(I2B)
        .op_u16(INVOKESTATIC, capture.int)
        .op(ICONST_M1)
        .op(I2C)
        .op_u16(INVOKESTATIC, capture.int)
        .op_u16(LDC2_W, three)
        .op_u16(LDC2_W, five)
        .op(LCMP)
        .op_u16(INVOKESTATIC, capture.int)
        .op(ICONST_1)
        .op(I2D)
        .op_u16(LDC2_W, two)
        .op(DDIV)
        .op_u16(INVOKESTATIC, capture.double)
        .op(FCONST_2)
        .op(F2D)
        .op_u16(INVOKESTATIC, capture.double)
        .op(RETURN);
    main.method("runTest", "()V", STATIC, code.build()?);

    let vm = make_vm([main.build()]);
    let mut captures = vm.execute_test("Main");

    iassert_eq(-1, captures.next());
    iassert_eq(1, captures.next());
    iassert_eq(0, captures.next());
    iassert_eq(i32::MAX as i64, captures.next());
    iassert_eq(i32::MIN as i64, captures.next());
    iassert_eq(-56, captures.next());
    iassert_eq(65535, captures.next());
    iassert_eq(-1, captures.next());
    dassert_eq(0.5, captures.next());
    dassert_eq(2.0, captures.next());

    Ok(())
}

#[test]
fn switches_pick_their_targets() -> Result<()> {
    let mut main = ClassBuilder::new("Main");
    let capture = captures(&mut main);
    let table = main.method_ref("Main", "table", "(I)I");
    let lookup = main.method_ref("Main", "lookup", "(I)I");

    // The leading nops move the switch to a different alignment
    let mut code = CodeBuilder::new();
    let cases = [code.label(), code.label(), code.label()];
    let default = code.label();
    code.nops(2).op(ILOAD_0).tableswitch(1, default, &cases);
    for (label, value) in cases.iter().zip([10, 20, 30]) {
        code.bind(*label).op_i8(BIPUSH, value).op(IRETURN);
    }
    code.bind(default).op(ICONST_M1).op(IRETURN);
    main.method("table", "(I)I", STATIC, code.build()?);

    let mut code = CodeBuilder::new();
    let low = code.label();
    let high = code.label();
    let default = code.label();
    code.op(ILOAD_0)
        .lookupswitch(default, &[(-5, low), (100, high)])
        .bind(low)
        .op(ICONST_1)
        .op(IRETURN)
        .bind(high)
        .op(ICONST_2)
        .op(IRETURN)
        .bind(default)
        .op(ICONST_0)
        .op(IRETURN);
    main.method("lookup", "(I)I", STATIC, code.build()?);

    let mut code = CodeBuilder::new();
    for value in [0, 1, 3, 4] {
        code.op_i8(BIPUSH, value)
            .op_u16(INVOKESTATIC, table)
            .op_u16(INVOKESTATIC, capture.int);
    }
    for value in [-5, 100, 0] {
        code.op_i8(BIPUSH, value)
            .op_u16(INVOKESTATIC, lookup)
            .op_u16(INVOKESTATIC, capture.int);
    }
    code.op(RETURN);
    main.method("runTest", "()V", STATIC, code.build()?);

    let vm = make_vm([main.build()]);
    let mut captures = vm.execute_test("Main");

    for expected in [-1, 10, 30, -1, 1, 2, 0] {
        iassert_eq(expected, captures.next());
    }

    Ok(())
}

#[test]
fn arrays_store_and_narrow_their_elements() -> Result<()> {
    let mut main = ClassBuilder::new("Main");
    let capture = captures(&mut main);
    let matrix = main.class_ref("[[I");
    let string = main.class_ref("java/lang/String");

    let mut code = CodeBuilder::new();
    // int[] a = new int[3]; a[1] = 42;
    code.op(ICONST_3)
        .op_u8(NEWARRAY, T_INT)
        .op(ASTORE_0)
        .op(ALOAD_0)
        .op(ICONST_1)
        .op_i8(BIPUSH, 42)
        .op(IASTORE)
        .op(ALOAD_0)
        .op(ICONST_1)
        .op(IALOAD)
        .op_u16(INVOKESTATIC, capture.int)
        .op(ALOAD_0)
        .op(ICONST_0)
        .op(IALOAD)
        .op_u16(INVOKESTATIC, capture.int)
        .op(ALOAD_0)
        .op(ARRAYLENGTH)
        .op_u16(INVOKESTATIC, capture.int);
    // int[][] m = new int[2][3];
    code.op(ICONST_2)
        .op(ICONST_3)
        .multianewarray(matrix, 2)
        .op(ASTORE_1)
        .op(ALOAD_1)
        .op(ARRAYLENGTH)
        .op_u16(INVOKESTATIC, capture.int)
        .op(ALOAD_1)
        .op(ICONST_1)
        .op(AALOAD)
        .op(ARRAYLENGTH)
        .op_u16(INVOKESTATIC, capture.int);
    // new String[2][0] is null
    code.op(ICONST_2)
        .op_u16(ANEWARRAY, string)
        .op(ICONST_0)
        .op(AALOAD)
        .op_u16(INVOKESTATIC, capture.object);
    // byte and char stores narrow
    code.op(ICONST_1)
        .op_u8(NEWARRAY, T_BYTE)
        .op(DUP)
        .op(ICONST_0)
        .op_i16(SIPUSH, 200)
        .op(BASTORE)
        .op(ICONST_0)
        .op(BALOAD)
        .op_u16(INVOKESTATIC, capture.int)
        .op(ICONST_1)
        .op_u8(NEWARRAY, T_CHAR)
        .op(DUP)
        .op(ICONST_0)
        .op(ICONST_M1)
        .op(CASTORE)
        .op(ICONST_0)
        .op(CALOAD)
        .op_u16(INVOKESTATIC, capture.int);
    // a[3]
    code.op(ALOAD_0)
        .op(ICONST_3)
        .op(IALOAD)
        .op(POP)
        .op(RETURN);
    main.method("runTest", "()V", STATIC, code.build()?);

    let mut code = CodeBuilder::new();
    code.op(ICONST_M1)
        .op_u8(NEWARRAY, T_INT)
        .op(POP)
        .op(RETURN);
    main.method("negative", "()V", STATIC, code.build()?);

    // ((Object[]) new String[1])[0] = new Object();
    let object = main.class_ref("java/lang/Object");
    let object_init = main.method_ref("java/lang/Object", "<init>", "()V");
    let mut code = CodeBuilder::new();
    code.op(ICONST_1)
        .op_u16(ANEWARRAY, string)
        .op(ICONST_0)
        .op_u16(NEW, object)
        .op(DUP)
        .op_u16(INVOKESPECIAL, object_init)
        .op(AASTORE)
        .op(RETURN);
    main.method("mismatched", "()V", STATIC, code.build()?);

    let vm = make_vm([main.build()]);
    let result = vm.run("Main", "runTest", "()V", vec![]);
    assert_eq!(
        uncaught_class(&result),
        "java/lang/ArrayIndexOutOfBoundsException"
    );
    let exception = result.uncaught.as_ref().expect("an exception");
    assert_eq!(
        message_of(exception).as_deref(),
        Some("Index 3 out of bounds for length 3")
    );

    let mut captures = vm.captures();
    iassert_eq(42, captures.next());
    iassert_eq(0, captures.next());
    iassert_eq(3, captures.next());
    iassert_eq(2, captures.next());
    iassert_eq(3, captures.next());
    assert_null(captures.next());
    iassert_eq(-56, captures.next());
    iassert_eq(65535, captures.next());

    let result = vm.run("Main", "negative", "()V", vec![]);
    assert_eq!(
        uncaught_class(&result),
        "java/lang/NegativeArraySizeException"
    );

    let result = vm.run("Main", "mismatched", "()V", vec![]);
    assert_eq!(uncaught_class(&result), "java/lang/ArrayStoreException");

    Ok(())
}

#[test]
fn string_literals_are_interned() -> Result<()> {
    let mut main = ClassBuilder::new("Main");
    let capture = captures(&mut main);
    let hello = main.string("hello") as u8;
    let accented = main.string("h\u{e9}llo w\u{f6}rld") as u8;
    let length = main.method_ref("java/lang/String", "length", "()I");

    let mut code = CodeBuilder::new();
    let same = code.label();
    let done = code.label();
    code.op_u8(LDC, hello)
        .op_u8(LDC, hello)
        .branch(IF_ACMPEQ, same)
        .op(ICONST_0)
        .branch(GOTO, done)
        .bind(same)
        .op(ICONST_1)
        .bind(done)
        .op_u16(INVOKESTATIC, capture.int)
        .op_u8(LDC, hello)
        .op_u16(INVOKEVIRTUAL, length)
        .op_u16(INVOKESTATIC, capture.int)
        .op_u8(LDC, accented)
        .op_u16(INVOKESTATIC, capture.object)
        .op(RETURN);
    main.method("runTest", "()V", STATIC, code.build()?);

    let vm = make_vm([main.build()]);
    let mut captures = vm.execute_test("Main");

    iassert_eq(1, captures.next());
    iassert_eq(5, captures.next());
    sassert_eq("h\u{e9}llo w\u{f6}rld", captures.next());

    Ok(())
}

#[test]
fn arraycopy_handles_overlap_and_bad_ranges() -> Result<()> {
    let mut main = ClassBuilder::new("Main");
    let capture = captures(&mut main);
    let arraycopy = main.method_ref(
        "java/lang/System",
        "arraycopy",
        "(Ljava/lang/Object;ILjava/lang/Object;II)V",
    );
    let string = main.class_ref("java/lang/String");

    let mut code = CodeBuilder::new();
    // int[] a = { 1, 2, 3, 4, 5 }; int[] b = new int[5];
    code.op(ICONST_5).op_u8(NEWARRAY, T_INT).op(ASTORE_0);
    for i in 0..5 {
        code.op(ALOAD_0)
            .op_i8(BIPUSH, i)
            .op_i8(BIPUSH, i + 1)
            .op(IASTORE);
    }
    code.op(ICONST_5).op_u8(NEWARRAY, T_INT).op(ASTORE_1);

    // System.arraycopy(a, 1, b, 0, 3);
    code.op(ALOAD_0)
        .op(ICONST_1)
        .op(ALOAD_1)
        .op(ICONST_0)
        .op(ICONST_3)
        .op_u16(INVOKESTATIC, arraycopy);
    for i in 0..4 {
        code.op(ALOAD_1)
            .op_i8(BIPUSH, i)
            .op(IALOAD)
            .op_u16(INVOKESTATIC, capture.int);
    }

    // System.arraycopy(a, 0, a, 1, 4);
    code.op(ALOAD_0)
        .op(ICONST_0)
        .op(ALOAD_0)
        .op(ICONST_1)
        .op(ICONST_4)
        .op_u16(INVOKESTATIC, arraycopy);
    for i in 0..5 {
        code.op(ALOAD_0)
            .op_i8(BIPUSH, i)
            .op(IALOAD)
            .op_u16(INVOKESTATIC, capture.int);
    }
    code.op(RETURN);
    main.method("runTest", "()V", STATIC, code.build()?);

    // System.arraycopy(new int[2], 1, new int[2], 0, 2);
    let mut code = CodeBuilder::new();
    code.op(ICONST_2)
        .op_u8(NEWARRAY, T_INT)
        .op(ICONST_1)
        .op(ICONST_2)
        .op_u8(NEWARRAY, T_INT)
        .op(ICONST_0)
        .op(ICONST_2)
        .op_u16(INVOKESTATIC, arraycopy)
        .op(RETURN);
    main.method("outOfRange", "()V", STATIC, code.build()?);

    // System.arraycopy(new int[1], 0, new String[1], 0, 1);
    let mut code = CodeBuilder::new();
    code.op(ICONST_1)
        .op_u8(NEWARRAY, T_INT)
        .op(ICONST_0)
        .op(ICONST_1)
        .op_u16(ANEWARRAY, string)
        .op(ICONST_0)
        .op(ICONST_1)
        .op_u16(INVOKESTATIC, arraycopy)
        .op(RETURN);
    main.method("mismatched", "()V", STATIC, code.build()?);

    // System.arraycopy(null, 0, new int[1], 0, 1);
    let mut code = CodeBuilder::new();
    code.op(ACONST_NULL)
        .op(ICONST_0)
        .op(ICONST_1)
        .op_u8(NEWARRAY, T_INT)
        .op(ICONST_0)
        .op(ICONST_1)
        .op_u16(INVOKESTATIC, arraycopy)
        .op(RETURN);
    main.method("fromNull", "()V", STATIC, code.build()?);

    let vm = make_vm([main.build()]);
    let mut captures = vm.execute_test("Main");

    for expected in [2, 3, 4, 0, 1, 1, 2, 3, 4] {
        iassert_eq(expected, captures.next());
    }

    let result = vm.run("Main", "outOfRange", "()V", vec![]);
    assert_eq!(
        uncaught_class(&result),
        "java/lang/ArrayIndexOutOfBoundsException"
    );

    let result = vm.run("Main", "mismatched", "()V", vec![]);
    assert_eq!(uncaught_class(&result), "java/lang/ArrayStoreException");

    let result = vm.run("Main", "fromNull", "()V", vec![]);
    assert_eq!(uncaught_class(&result), "java/lang/NullPointerException");

    Ok(())
}

#[test]
fn clones_are_shallow_copies() -> Result<()> {
    let mut sheep = ClassBuilder::new("Sheep");
    sheep.default_constructor();
    let object_clone = sheep.method_ref("java/lang/Object", "clone", "()Ljava/lang/Object;");
    let mut code = CodeBuilder::new();
    code.op(ALOAD_0)
        .op_u16(INVOKESPECIAL, object_clone)
        .op(ARETURN);
    sheep.method("copy", "()Ljava/lang/Object;", MethodAccessFlags::PUBLIC, code.build()?);

    let mut main = ClassBuilder::new("Main");
    let capture = captures(&mut main);
    let array_clone = main.method_ref("[I", "clone", "()Ljava/lang/Object;");
    let int_array = main.class_ref("[I");

    let mut code = CodeBuilder::new();
    let same = code.label();
    let done = code.label();
    // int[] a = { 7 }; int[] b = (int[]) a.clone(); b[0] = 9;
    code.op(ICONST_1)
        .op_u8(NEWARRAY, T_INT)
        .op(DUP)
        .op(ICONST_0)
        .op_i8(BIPUSH, 7)
        .op(IASTORE)
        .op(ASTORE_0)
        .op(ALOAD_0)
        .op_u16(INVOKEVIRTUAL, array_clone)
        .op_u16(CHECKCAST, int_array)
        .op(ASTORE_1)
        .op(ALOAD_1)
        .op(ICONST_0)
        .op_i8(BIPUSH, 9)
        .op(IASTORE)
        .op(ALOAD_0)
        .op(ICONST_0)
        .op(IALOAD)
        .op_u16(INVOKESTATIC, capture.int)
        .op(ALOAD_1)
        .op(ICONST_0)
        .op(IALOAD)
        .op_u16(INVOKESTATIC, capture.int)
        .op(ALOAD_0)
        .op(ALOAD_1)
        .branch(IF_ACMPEQ, same)
        .op(ICONST_0)
        .branch(GOTO, done)
        .bind(same)
        .op(ICONST_1)
        .bind(done)
        .op_u16(INVOKESTATIC, capture.int)
        .op(RETURN);
    main.method("runTest", "()V", STATIC, code.build()?);

    // new Sheep().copy(), which is not Cloneable
    let target = main.class_ref("Sheep");
    let init = main.method_ref("Sheep", "<init>", "()V");
    let copy = main.method_ref("Sheep", "copy", "()Ljava/lang/Object;");
    let mut code = CodeBuilder::new();
    code.op_u16(NEW, target)
        .op(DUP)
        .op_u16(INVOKESPECIAL, init)
        .op_u16(INVOKEVIRTUAL, copy)
        .op(POP)
        .op(RETURN);
    main.method("cloneSheep", "()V", STATIC, code.build()?);

    let vm = make_vm([sheep.build(), main.build()]);
    let mut captures = vm.execute_test("Main");

    iassert_eq(7, captures.next());
    iassert_eq(9, captures.next());
    iassert_eq(0, captures.next());

    let result = vm.run("Main", "cloneSheep", "()V", vec![]);
    assert_eq!(
        uncaught_class(&result),
        "java/lang/CloneNotSupportedException"
    );

    Ok(())
}

/// `capture(a == b)` for the two references on top of the stack
fn capture_identity(code: &mut CodeBuilder, capture: u16) {
    let same = code.label();
    let done = code.label();
    code.branch(IF_ACMPEQ, same)
        .op(ICONST_0)
        .branch(GOTO, done)
        .bind(same)
        .op(ICONST_1)
        .bind(done)
        .op_u16(INVOKESTATIC, capture);
}

#[test]
fn intern_returns_the_pooled_string() -> Result<()> {
    let mut main = ClassBuilder::new("Main");
    let capture = captures(&mut main);
    let lit = main.string("lit") as u8;
    let string = main.class_ref("java/lang/String");
    let init = main.method_ref("java/lang/String", "<init>", "()V");
    let value = main.field_ref("java/lang/String", "value", "[C");
    let intern = main.method_ref("java/lang/String", "intern", "()Ljava/lang/String;");

    let mut code = CodeBuilder::new();
    // String copy = new String(); copy.value = "lit".value;
    code.op_u16(NEW, string)
        .op(DUP)
        .op_u16(INVOKESPECIAL, init)
        .op(ASTORE_0)
        .op(ALOAD_0)
        .op_u8(LDC, lit)
        .op_u16(GETFIELD, value)
        .op_u16(PUTFIELD, value);

    // copy == "lit"
    code.op(ALOAD_0).op_u8(LDC, lit);
    capture_identity(&mut code, capture.int);

    // copy.intern() == "lit"
    code.op(ALOAD_0).op_u16(INVOKEVIRTUAL, intern).op_u8(LDC, lit);
    capture_identity(&mut code, capture.int);

    // String fresh = new String(); fresh.value = new char[] { 'z' };
    code.op_u16(NEW, string)
        .op(DUP)
        .op_u16(INVOKESPECIAL, init)
        .op(ASTORE_1)
        .op(ALOAD_1)
        .op(ICONST_1)
        .op_u8(NEWARRAY, T_CHAR)
        .op(DUP)
        .op(ICONST_0)
        .op_i8(BIPUSH, b'z' as i8)
        .op(CASTORE)
        .op_u16(PUTFIELD, value);

    // fresh.intern() == fresh, nothing with its contents was pooled yet
    code.op(ALOAD_1).op_u16(INVOKEVIRTUAL, intern).op(ALOAD_1);
    capture_identity(&mut code, capture.int);

    code.op(ALOAD_1)
        .op_u16(INVOKEVIRTUAL, intern)
        .op_u16(INVOKESTATIC, capture.object)
        .op(RETURN);
    main.method("runTest", "()V", STATIC, code.build()?);

    let vm = make_vm([main.build()]);
    let mut captures = vm.execute_test("Main");

    iassert_eq(0, captures.next());
    iassert_eq(1, captures.next());
    iassert_eq(1, captures.next());
    sassert_eq("z", captures.next());

    Ok(())
}

/// `new FileOutputStream()` with its `fd` set to a descriptor numbered `fd`, in local 0
fn stream_for(class: &mut ClassBuilder, code: &mut CodeBuilder, fd: i8) {
    let stream = class.class_ref("java/io/FileOutputStream");
    let stream_init = class.method_ref("java/io/FileOutputStream", "<init>", "()V");
    let descriptor = class.class_ref("java/io/FileDescriptor");
    let descriptor_init = class.method_ref("java/io/FileDescriptor", "<init>", "()V");
    let number = class.field_ref("java/io/FileDescriptor", "fd", "I");
    let handle = class.field_ref("java/io/FileOutputStream", "fd", "Ljava/io/FileDescriptor;");

    code.op_u16(NEW, stream)
        .op(DUP)
        .op_u16(INVOKESPECIAL, stream_init)
        .op(ASTORE_0)
        .op(ALOAD_0)
        .op_u16(NEW, descriptor)
        .op(DUP)
        .op_u16(INVOKESPECIAL, descriptor_init)
        .op(DUP)
        .op_i8(BIPUSH, fd)
        .op_u16(PUTFIELD, number)
        .op_u16(PUTFIELD, handle);
}

/// `stream.writeBytes(new byte[3], offset, length, false)` on the stream in local 0
fn write_three(class: &mut ClassBuilder, code: &mut CodeBuilder, offset: i8, length: i8) {
    let write = class.method_ref("java/io/FileOutputStream", "writeBytes", "([BIIZ)V");
    code.op(ALOAD_0)
        .op(ICONST_3)
        .op_u8(NEWARRAY, T_BYTE)
        .op_i8(BIPUSH, offset)
        .op_i8(BIPUSH, length)
        .op(ICONST_0)
        .op_u16(INVOKEVIRTUAL, write);
}

#[test]
fn file_output_streams_check_their_arguments() -> Result<()> {
    let mut main = ClassBuilder::new("Main");
    let capture = captures(&mut main);
    let write = main.method_ref("java/io/FileOutputStream", "writeBytes", "([BIIZ)V");

    // Nothing to write, but the descriptor still binds to stderr
    let mut code = CodeBuilder::new();
    stream_for(&mut main, &mut code, 2);
    write_three(&mut main, &mut code, 1, 0);
    code.op(ICONST_1)
        .op_u16(INVOKESTATIC, capture.int)
        .op(RETURN);
    main.method("runTest", "()V", STATIC, code.build()?);

    let mut code = CodeBuilder::new();
    stream_for(&mut main, &mut code, 2);
    write_three(&mut main, &mut code, 2, 5);
    code.op(RETURN);
    main.method("pastTheEnd", "()V", STATIC, code.build()?);

    let mut code = CodeBuilder::new();
    stream_for(&mut main, &mut code, 2);
    code.op(ALOAD_0)
        .op(ACONST_NULL)
        .op(ICONST_0)
        .op(ICONST_0)
        .op(ICONST_0)
        .op_u16(INVOKEVIRTUAL, write)
        .op(RETURN);
    main.method("nullBytes", "()V", STATIC, code.build()?);

    let mut code = CodeBuilder::new();
    stream_for(&mut main, &mut code, 7);
    write_three(&mut main, &mut code, 0, 1);
    code.op(RETURN);
    main.method("unknownDescriptor", "()V", STATIC, code.build()?);

    let vm = make_vm([main.build()]);
    let mut captures = vm.execute_test("Main");
    iassert_eq(1, captures.next());

    let result = vm.run("Main", "pastTheEnd", "()V", vec![]);
    assert_eq!(
        uncaught_class(&result),
        "java/lang/ArrayIndexOutOfBoundsException"
    );

    let result = vm.run("Main", "nullBytes", "()V", vec![]);
    assert_eq!(uncaught_class(&result), "java/lang/NullPointerException");

    let result = vm.run("Main", "unknownDescriptor", "()V", vec![]);
    match &result.error {
        Some(Throwable::Native { method, source }) => {
            assert!(method.contains("writeBytes"), "{}", method);
            assert!(
                source.to_string().contains("no host stream for descriptor 7"),
                "{}",
                source
            );
        }
        other => panic!("expected a native failure, got {:?}", other),
    }
    assert!(result.uncaught.is_none());

    Ok(())
}

#[test]
fn array_stores_check_the_index_before_the_type() -> Result<()> {
    let mut main = ClassBuilder::new("Main");
    let string = main.class_ref("java/lang/String");
    let object = main.class_ref("java/lang/Object");
    let object_init = main.method_ref("java/lang/Object", "<init>", "()V");

    // ((Object[]) new String[1])[5] = new Object();
    let mut code = CodeBuilder::new();
    code.op(ICONST_1)
        .op_u16(ANEWARRAY, string)
        .op(ICONST_5)
        .op_u16(NEW, object)
        .op(DUP)
        .op_u16(INVOKESPECIAL, object_init)
        .op(AASTORE)
        .op(RETURN);
    main.method("runTest", "()V", STATIC, code.build()?);

    let vm = make_vm([main.build()]);
    let result = vm.run("Main", "runTest", "()V", vec![]);
    assert_eq!(
        uncaught_class(&result),
        "java/lang/ArrayIndexOutOfBoundsException"
    );

    Ok(())
}
