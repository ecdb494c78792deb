use std::sync::Arc;

use classfile::{attributes::CodeAttribute, classfile::MethodInfo, pool::ConstantPool};
use paste::paste;

use crate::{
    error::{Throwable, TraceElement},
    internal,
    object::{
        class::{Class, ResolvedMethod},
        monitor::Monitor,
        value::{ObjectRef, RuntimeValue},
    },
};

/// One activation of a bytecode method
#[derive(Debug)]
pub struct Frame {
    method: ResolvedMethod,
    pub(crate) locals: Vec<RuntimeValue>,
    pub(crate) operands: Vec<RuntimeValue>,
    /// Where execution continues, already past the current instruction
    pub(crate) pc: usize,
    /// Start of the instruction being executed, branches are relative to it
    pub(crate) instruction_pc: usize,
    /// Held for synchronized methods, released when the frame pops
    pub(crate) lock: Option<Monitor>,
    /// Entered by `monitorenter` and not yet exited, innermost last
    pub(crate) held: Vec<Monitor>,
}

macro_rules! typed_pop {
    ($($name: ident => $variant: ident ($ty: ty)),*) => {
        paste! {
            $(
                pub fn [<pop_ $name>](&mut self, side: &str) -> Result<$ty, Throwable> {
                    match self.pop()? {
                        RuntimeValue::$variant(value) => Ok(value),
                        other => Err(internal!(
                            "{} was not {}, got {:?} in {}",
                            side,
                            stringify!($name),
                            other,
                            self.method.display_name()
                        )),
                    }
                }
            )*
        }
    };
}

impl Frame {
    /// Lay out `args` in the locals, longs and doubles taking two slots
    pub fn new(method: ResolvedMethod, args: Vec<RuntimeValue>) -> Result<Self, Throwable> {
        let code = method
            .code()
            .ok_or_else(|| internal!("{} has no code", method.display_name()))?;

        let max_stack = code.max_stack as usize;
        let max_locals = code.max_locals as usize;

        let arg_slots: usize = args.iter().map(|a| if a.is_wide() { 2 } else { 1 }).sum();
        let mut locals = Vec::with_capacity(arg_slots.max(max_locals));

        for arg in args {
            let wide = arg.is_wide();
            locals.push(arg);
            if wide {
                locals.push(RuntimeValue::Null);
            }
        }

        locals.resize(arg_slots.max(max_locals), RuntimeValue::Null);

        Ok(Self {
            method,
            locals,
            operands: Vec::with_capacity(max_stack),
            pc: 0,
            instruction_pc: 0,
            lock: None,
            held: Vec::new(),
        })
    }

    pub fn class(&self) -> &Arc<Class> {
        &self.method.class
    }

    pub fn method(&self) -> &ResolvedMethod {
        &self.method
    }

    pub fn info(&self) -> &MethodInfo {
        self.method.info()
    }

    pub fn code(&self) -> Result<&CodeAttribute, Throwable> {
        self.method
            .code()
            .ok_or_else(|| internal!("{} has no code", self.method.display_name()))
    }

    pub fn pool(&self) -> &ConstantPool {
        &self.method.class.descriptor().constant_pool
    }

    pub fn pc(&self) -> usize {
        self.pc
    }

    pub fn instruction_pc(&self) -> usize {
        self.instruction_pc
    }

    pub fn operands(&self) -> &[RuntimeValue] {
        &self.operands
    }

    pub fn locals(&self) -> &[RuntimeValue] {
        &self.locals
    }

    pub fn push(&mut self, value: RuntimeValue) {
        self.operands.push(value);
    }

    pub fn pop(&mut self) -> Result<RuntimeValue, Throwable> {
        self.operands.pop().ok_or_else(|| {
            internal!(
                "operand stack underflow at pc {} in {}",
                self.instruction_pc,
                self.method.display_name()
            )
        })
    }

    /// Pop `count` values, returned in the order they were pushed
    pub fn pop_n(&mut self, count: usize) -> Result<Vec<RuntimeValue>, Throwable> {
        if self.operands.len() < count {
            return Err(internal!(
                "wanted {} operands but only {} are on the stack in {}",
                count,
                self.operands.len(),
                self.method.display_name()
            ));
        }

        Ok(self.operands.split_off(self.operands.len() - count))
    }

    typed_pop!(
        int => Int(i32),
        long => Long(i64),
        float => Float(f32),
        double => Double(f64)
    );

    pub fn pop_reference(&mut self, side: &str) -> Result<Option<ObjectRef>, Throwable> {
        match self.pop()? {
            RuntimeValue::Object(obj) => Ok(Some(obj)),
            RuntimeValue::Null => Ok(None),
            other => Err(internal!(
                "{} was not a reference, got {:?} in {}",
                side,
                other,
                self.method.display_name()
            )),
        }
    }

    pub fn load(&self, index: usize) -> Result<RuntimeValue, Throwable> {
        self.locals.get(index).cloned().ok_or_else(|| {
            internal!("local {} out of range in {}", index, self.method.display_name())
        })
    }

    pub fn store(&mut self, index: usize, value: RuntimeValue) -> Result<(), Throwable> {
        let wide = value.is_wide();
        let needed = if wide { index + 2 } else { index + 1 };

        if needed > self.locals.len() {
            return Err(internal!(
                "local {} out of range in {}",
                index,
                self.method.display_name()
            ));
        }

        self.locals[index] = value;
        if wide {
            self.locals[index + 1] = RuntimeValue::Null;
        }

        Ok(())
    }

    /// The first handler covering the faulting instruction that accepts `exception`
    pub fn find_handler(&self, exception: &ObjectRef) -> Result<Option<usize>, Throwable> {
        let code = self.code()?;

        Ok(code
            .exception_table
            .iter()
            .find(|entry| {
                entry.covers(self.instruction_pc)
                    && entry
                        .catch_type
                        .as_deref()
                        .map_or(true, |catch| exception.class().is_subclass_of(catch))
            })
            .map(|entry| entry.handler_pc as usize))
    }

    pub fn trace_element(&self) -> TraceElement {
        TraceElement {
            class_name: self.class().name().to_string(),
            method_name: self.info().name.clone(),
            source_file: self.class().descriptor().source_file.clone(),
            line: self
                .method
                .code()
                .and_then(|code| code.line_number(self.instruction_pc)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use classfile::{
        builder::{ClassBuilder, CodeBuilder},
        flags::MethodAccessFlags,
        opcode::*,
    };

    use super::Frame;
    use crate::object::{class::Class, value::RuntimeValue};

    fn frame_for(descriptor: &str, max_locals: u16) -> anyhow::Result<Frame> {
        let mut builder = ClassBuilder::new("Locals");
        let mut code = CodeBuilder::new();
        code.max_locals(max_locals).op(RETURN);

        builder.method("run", descriptor, MethodAccessFlags::STATIC, code.build()?);
        let class = Arc::new(Class::new(Arc::new(builder.build()))?);
        let method = class.own_method("run", descriptor).expect("method exists");

        let args = match descriptor {
            "(IJI)V" => vec![RuntimeValue::Int(1), RuntimeValue::Long(2), RuntimeValue::Int(3)],
            _ => vec![],
        };

        Ok(Frame::new(method, args)?)
    }

    #[test]
    fn wide_arguments_take_two_slots() -> anyhow::Result<()> {
        let frame = frame_for("(IJI)V", 2)?;

        assert_eq!(frame.locals().len(), 4);
        assert_eq!(frame.load(0)?, RuntimeValue::Int(1));
        assert_eq!(frame.load(1)?, RuntimeValue::Long(2));
        assert_eq!(frame.load(3)?, RuntimeValue::Int(3));
        Ok(())
    }

    #[test]
    fn locals_cover_max_locals() -> anyhow::Result<()> {
        let frame = frame_for("()V", 6)?;
        assert_eq!(frame.locals().len(), 6);
        assert!(frame.load(6).is_err());
        Ok(())
    }

    #[test]
    fn typed_pops_reject_other_kinds() -> anyhow::Result<()> {
        let mut frame = frame_for("()V", 1)?;

        frame.push(RuntimeValue::Float(1.5));
        assert!(frame.pop_int("lhs").is_err());

        frame.push(RuntimeValue::Int(4));
        frame.push(RuntimeValue::Int(5));
        assert_eq!(frame.pop_n(2)?, vec![RuntimeValue::Int(4), RuntimeValue::Int(5)]);
        assert!(frame.pop().is_err());
        Ok(())
    }
}
