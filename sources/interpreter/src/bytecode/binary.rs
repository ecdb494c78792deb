#![allow(clippy::redundant_closure_call)]

use std::sync::Arc;

use super::{Instruction, Progression};
use crate::{
    arg,
    error::{Throwable, VMError},
    object::value::{ObjectRef, RuntimeValue},
    thread::Thread,
};

macro_rules! binop {
    // Generic value transformation
    ($ins: ident, $lhs: ident, $rhs: ident, $res: ty, $res_trans: expr => $op: expr) => {
        #[derive(Debug)]
        pub struct $ins;

        impl Instruction for $ins {
            fn handle(&self, thread: &mut Thread) -> Result<Progression, Throwable> {
                let rhs = arg!(thread, "rhs" => $rhs);
                let lhs = arg!(thread, "lhs" => $lhs);

                let result: $res = $op(lhs, rhs);
                thread.frame_mut()?.push($res_trans(result));

                Ok(Progression::Next)
            }
        }
    };
    // Generic conditional transformation
    ($ins: ident, $res_ty: ident => $op: expr) => {
        #[derive(Debug)]
        pub struct $ins {
            pub(crate) jump_to: i16,
        }

        impl Instruction for $ins {
            fn handle(&self, thread: &mut Thread) -> Result<Progression, Throwable> {
                let rhs = arg!(thread, "rhs" => $res_ty);
                let lhs = arg!(thread, "lhs" => $res_ty);

                let result: bool = $op(lhs, rhs);
                if result {
                    Ok(Progression::JumpRel(self.jump_to as i32))
                } else {
                    Ok(Progression::Next)
                }
            }
        }
    };
    ($ins: ident (int) => $op: expr) => {
        binop!($ins, i32, i32, i32, RuntimeValue::Int => $op);
    };
    ($ins: ident (long) => $op: expr) => {
        binop!($ins, i64, i64, i64, RuntimeValue::Long => $op);
    };
    ($ins: ident (long => int) => $op: expr) => {
        binop!($ins, i64, i64, i32, RuntimeValue::Int => $op);
    };
    ($ins: ident (float => int) => $op: expr) => {
        binop!($ins, f32, f32, i32, RuntimeValue::Int => $op);
    };
    ($ins: ident (double => int) => $op: expr) => {
        binop!($ins, f64, f64, i32, RuntimeValue::Int => $op);
    };
    ($ins: ident (long bitwise) => $op: expr) => {
        binop!($ins, i64, i32, i64, RuntimeValue::Long => $op);
    };
    ($ins: ident (float) => $op: expr) => {
        binop!($ins, f32, f32, f32, RuntimeValue::Float => $op);
    };
    ($ins: ident (double) => $op: expr) => {
        binop!($ins, f64, f64, f64, RuntimeValue::Double => $op);
    };
    ($ins: ident (int cond) => $op: expr) => {
        binop!($ins, i32 => $op);
    };
    ($ins: ident (Object cond) => $op: expr) => {
        binop!($ins, Object => $op);
    };
}

/// Integer division and remainder, which raise ArithmeticException on a zero divisor
macro_rules! divop {
    ($ins: ident, $ty: ident, $variant: ident => $op: expr) => {
        #[derive(Debug)]
        pub struct $ins;

        impl Instruction for $ins {
            fn handle(&self, thread: &mut Thread) -> Result<Progression, Throwable> {
                let rhs = arg!(thread, "rhs" => $ty);
                let lhs = arg!(thread, "lhs" => $ty);

                if rhs == 0 {
                    return Err(thread.throw(VMError::ArithmeticException {
                        ctx: "/ by zero".to_string(),
                    }));
                }

                let result: $ty = $op(lhs, rhs);
                thread.frame_mut()?.push(RuntimeValue::$variant(result));

                Ok(Progression::Next)
            }
        }
    };
}

// Binary (int)
binop!(Iadd (int) => |lhs: i32, rhs: i32| lhs.wrapping_add(rhs));
binop!(Isub (int) => |lhs: i32, rhs: i32| lhs.wrapping_sub(rhs));
binop!(Imul (int) => |lhs: i32, rhs: i32| lhs.wrapping_mul(rhs));
divop!(Idiv, i32, Int => |lhs: i32, rhs: i32| lhs.wrapping_div(rhs));
divop!(Irem, i32, Int => |lhs: i32, rhs: i32| lhs.wrapping_rem(rhs));

// Binary (long)
binop!(Ladd (long) => |lhs: i64, rhs: i64| lhs.wrapping_add(rhs));
binop!(Lsub (long) => |lhs: i64, rhs: i64| lhs.wrapping_sub(rhs));
binop!(Lmul (long) => |lhs: i64, rhs: i64| lhs.wrapping_mul(rhs));
divop!(Ldiv, i64, Long => |lhs: i64, rhs: i64| lhs.wrapping_div(rhs));
divop!(Lrem, i64, Long => |lhs: i64, rhs: i64| lhs.wrapping_rem(rhs));

// Binary (float)
binop!(Fadd (float) => |lhs: f32, rhs: f32| lhs + rhs);
binop!(Fsub (float) => |lhs: f32, rhs: f32| lhs - rhs);
binop!(Fmul (float) => |lhs: f32, rhs: f32| lhs * rhs);
binop!(Fdiv (float) => |lhs: f32, rhs: f32| lhs / rhs);
binop!(Frem (float) => |lhs: f32, rhs: f32| lhs % rhs);

// Binary (double)
binop!(Dadd (double) => |lhs: f64, rhs: f64| lhs + rhs);
binop!(Dsub (double) => |lhs: f64, rhs: f64| lhs - rhs);
binop!(Dmul (double) => |lhs: f64, rhs: f64| lhs * rhs);
binop!(Ddiv (double) => |lhs: f64, rhs: f64| lhs / rhs);
binop!(Drem (double) => |lhs: f64, rhs: f64| lhs % rhs);

// Bitwise, shift distances are masked to the operand width
binop!(Ishl (int) => |lhs: i32, rhs: i32| lhs.wrapping_shl((rhs & 0x1f) as u32));
binop!(Ishr (int) => |lhs: i32, rhs: i32| lhs.wrapping_shr((rhs & 0x1f) as u32));
binop!(Iushr (int) => |lhs: i32, rhs: i32| ((lhs as u32) >> (rhs & 0x1f)) as i32);
binop!(Lshl (long bitwise) => |lhs: i64, rhs: i32| lhs.wrapping_shl((rhs & 0x3f) as u32));
binop!(Lshr (long bitwise) => |lhs: i64, rhs: i32| lhs.wrapping_shr((rhs & 0x3f) as u32));
binop!(Lushr (long bitwise) => |lhs: i64, rhs: i32| ((lhs as u64) >> (rhs & 0x3f)) as i64);
binop!(Iand (int) => |lhs: i32, rhs: i32| lhs & rhs);
binop!(Ior (int) => |lhs: i32, rhs: i32| lhs | rhs);
binop!(Ixor (int) => |lhs: i32, rhs: i32| lhs ^ rhs);
binop!(Land (long) => |lhs: i64, rhs: i64| lhs & rhs);
binop!(Lor (long) => |lhs: i64, rhs: i64| lhs | rhs);
binop!(Lxor (long) => |lhs: i64, rhs: i64| lhs ^ rhs);

// Comparisons. The l/g variants differ only in what NaN compares as.
binop!(Lcmp (long => int) => |lhs: i64, rhs: i64| lhs.cmp(&rhs) as i32);
binop!(Fcmpl (float => int) => |lhs: f32, rhs: f32| {
    lhs.partial_cmp(&rhs).map_or(-1, |ordering| ordering as i32)
});
binop!(Fcmpg (float => int) => |lhs: f32, rhs: f32| {
    lhs.partial_cmp(&rhs).map_or(1, |ordering| ordering as i32)
});
binop!(Dcmpl (double => int) => |lhs: f64, rhs: f64| {
    lhs.partial_cmp(&rhs).map_or(-1, |ordering| ordering as i32)
});
binop!(Dcmpg (double => int) => |lhs: f64, rhs: f64| {
    lhs.partial_cmp(&rhs).map_or(1, |ordering| ordering as i32)
});

// Conditional (int)
binop!(IfICmpEq (int cond) => |lhs: i32, rhs: i32| lhs == rhs);
binop!(IfICmpNe (int cond) => |lhs: i32, rhs: i32| lhs != rhs);
binop!(IfICmpLt (int cond) => |lhs: i32, rhs: i32| lhs < rhs);
binop!(IfICmpGe (int cond) => |lhs: i32, rhs: i32| lhs >= rhs);
binop!(IfICmpGt (int cond) => |lhs: i32, rhs: i32| lhs > rhs);
binop!(IfICmpLe (int cond) => |lhs: i32, rhs: i32| lhs <= rhs);

// Conditional (reference identity)
binop!(IfACmpEq (Object cond) => |lhs: Option<ObjectRef>, rhs: Option<ObjectRef>| same(&lhs, &rhs));
binop!(IfACmpNe (Object cond) => |lhs: Option<ObjectRef>, rhs: Option<ObjectRef>| !same(&lhs, &rhs));

fn same(lhs: &Option<ObjectRef>, rhs: &Option<ObjectRef>) -> bool {
    match (lhs, rhs) {
        (Some(lhs), Some(rhs)) => Arc::ptr_eq(lhs, rhs),
        (None, None) => true,
        _ => false,
    }
}
