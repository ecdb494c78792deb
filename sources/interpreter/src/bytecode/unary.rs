#![allow(clippy::redundant_closure_call)]

use super::{Instruction, Progression};
use crate::{
    arg,
    error::Throwable,
    internal,
    object::value::{ObjectRef, RuntimeValue},
    thread::Thread,
};

macro_rules! unop {
    // Generic value transformation
    ($ins: ident, $from: ident, $res_trans: expr => $op: expr) => {
        #[derive(Debug)]
        pub struct $ins;

        impl Instruction for $ins {
            fn handle(&self, thread: &mut Thread) -> Result<Progression, Throwable> {
                let val = arg!(thread, "unary value" => $from);

                let result = $op(val);
                thread.frame_mut()?.push($res_trans(result));

                Ok(Progression::Next)
            }
        }
    };
    // Generic conditional transformation
    ($ins: ident, $from: ident => $op: expr) => {
        #[derive(Debug)]
        pub struct $ins {
            pub(crate) jump_to: i16,
        }

        impl Instruction for $ins {
            fn handle(&self, thread: &mut Thread) -> Result<Progression, Throwable> {
                let val = arg!(thread, "unary value" => $from);

                let result: bool = $op(val);
                if result {
                    Ok(Progression::JumpRel(self.jump_to as i32))
                } else {
                    Ok(Progression::Next)
                }
            }
        }
    };
    ($ins: ident ($from: ident => int) => $op: expr) => {
        unop!($ins, $from, RuntimeValue::Int => $op);
    };
    ($ins: ident ($from: ident => long) => $op: expr) => {
        unop!($ins, $from, RuntimeValue::Long => $op);
    };
    ($ins: ident ($from: ident => float) => $op: expr) => {
        unop!($ins, $from, RuntimeValue::Float => $op);
    };
    ($ins: ident ($from: ident => double) => $op: expr) => {
        unop!($ins, $from, RuntimeValue::Double => $op);
    };
    ($ins: ident ($from: ident cond) => $op: expr) => {
        unop!($ins, $from => $op);
    };
}

// Negation
unop!(Ineg (i32 => int) => |val: i32| val.wrapping_neg());
unop!(Lneg (i64 => long) => |val: i64| val.wrapping_neg());
unop!(Fneg (f32 => float) => |val: f32| -val);
unop!(Dneg (f64 => double) => |val: f64| -val);

// Conversions. Float to integer casts saturate and take NaN to zero, as the JVM wants.
unop!(I2l (i32 => long) => |val: i32| val as i64);
unop!(I2f (i32 => float) => |val: i32| val as f32);
unop!(I2d (i32 => double) => |val: i32| val as f64);
unop!(L2i (i64 => int) => |val: i64| val as i32);
unop!(L2f (i64 => float) => |val: i64| val as f32);
unop!(L2d (i64 => double) => |val: i64| val as f64);
unop!(F2i (f32 => int) => |val: f32| val as i32);
unop!(F2l (f32 => long) => |val: f32| val as i64);
unop!(F2d (f32 => double) => |val: f32| val as f64);
unop!(D2i (f64 => int) => |val: f64| val as i32);
unop!(D2l (f64 => long) => |val: f64| val as i64);
unop!(D2f (f64 => float) => |val: f64| val as f32);
unop!(I2b (i32 => int) => |val: i32| val as i8 as i32);
unop!(I2c (i32 => int) => |val: i32| val as u16 as i32);
unop!(I2s (i32 => int) => |val: i32| val as i16 as i32);

// Conditional (compare against zero)
unop!(IfEq (i32 cond) => |val: i32| val == 0);
unop!(IfNe (i32 cond) => |val: i32| val != 0);
unop!(IfLt (i32 cond) => |val: i32| val < 0);
unop!(IfGe (i32 cond) => |val: i32| val >= 0);
unop!(IfGt (i32 cond) => |val: i32| val > 0);
unop!(IfLe (i32 cond) => |val: i32| val <= 0);

// Conditional (null)
unop!(IfNull (Object cond) => |val: Option<ObjectRef>| val.is_none());
unop!(IfNonNull (Object cond) => |val: Option<ObjectRef>| val.is_some());

#[derive(Debug)]
pub struct Iinc {
    pub(crate) index: usize,
    pub(crate) constant: i32,
}

impl Instruction for Iinc {
    fn handle(&self, thread: &mut Thread) -> Result<Progression, Throwable> {
        let frame = thread.frame_mut()?;

        let value = match frame.load(self.index)? {
            RuntimeValue::Int(value) => value,
            other => return Err(internal!("iinc on local {} holding {:?}", self.index, other)),
        };

        frame.store(self.index, RuntimeValue::Int(value.wrapping_add(self.constant)))?;
        Ok(Progression::Next)
    }
}
