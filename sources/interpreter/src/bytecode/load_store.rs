use std::sync::Arc;

use classfile::pool::ConstantEntry;
use support::descriptor::{BaseType, FieldType};

use super::{Instruction, Progression};
use crate::{
    arg,
    error::{Throwable, VMError},
    internal, non_null,
    object::{
        class::ResolvedField,
        value::{RuntimeValue, ValueKind},
    },
    pop,
    thread::Thread,
};

#[derive(Debug)]
pub struct PushConst {
    pub(crate) value: RuntimeValue,
}

impl Instruction for PushConst {
    fn handle(&self, thread: &mut Thread) -> Result<Progression, Throwable> {
        thread.frame_mut()?.push(self.value.clone());
        Ok(Progression::Next)
    }
}

#[derive(Debug)]
pub struct Ldc {
    pub(crate) index: u16,
}

impl Instruction for Ldc {
    fn handle(&self, thread: &mut Thread) -> Result<Progression, Throwable> {
        let entry = thread.frame()?.pool().get(self.index)?.clone();

        let value = match entry {
            ConstantEntry::Integer(value) => RuntimeValue::Int(value),
            ConstantEntry::Float(value) => RuntimeValue::Float(value),
            ConstantEntry::String(string) => RuntimeValue::Object(thread.intern(&string.string)?),
            ConstantEntry::Class(class) => {
                let class = thread.vm().class_loader().for_name(&class.name)?;
                RuntimeValue::Object(thread.class_mirror(&class)?)
            }
            other => return Err(internal!("cannot ldc {:?}", other)),
        };

        thread.frame_mut()?.push(value);
        Ok(Progression::Next)
    }
}

#[derive(Debug)]
pub struct Ldc2W {
    pub(crate) index: u16,
}

impl Instruction for Ldc2W {
    fn handle(&self, thread: &mut Thread) -> Result<Progression, Throwable> {
        let value = match thread.frame()?.pool().get(self.index)? {
            ConstantEntry::Long(value) => RuntimeValue::Long(*value),
            ConstantEntry::Double(value) => RuntimeValue::Double(*value),
            other => return Err(internal!("cannot ldc2_w {:?}", other)),
        };

        thread.frame_mut()?.push(value);
        Ok(Progression::Next)
    }
}

#[derive(Debug)]
pub struct LoadLocal {
    pub(crate) index: usize,
    pub(crate) kind: ValueKind,
}

impl Instruction for LoadLocal {
    fn handle(&self, thread: &mut Thread) -> Result<Progression, Throwable> {
        let frame = thread.frame_mut()?;
        let value = frame.load(self.index)?;

        if value.kind() != self.kind {
            return Err(internal!(
                "local {} held {:?}, expected {:?}",
                self.index,
                value,
                self.kind
            ));
        }

        frame.push(value);
        Ok(Progression::Next)
    }
}

#[derive(Debug)]
pub struct StoreLocal {
    pub(crate) index: usize,
    pub(crate) kind: ValueKind,
}

impl Instruction for StoreLocal {
    fn handle(&self, thread: &mut Thread) -> Result<Progression, Throwable> {
        let frame = thread.frame_mut()?;
        let value = frame.pop()?;

        if value.kind() != self.kind {
            return Err(internal!(
                "cannot store {:?} into a {:?} local",
                value,
                self.kind
            ));
        }

        frame.store(self.index, value)?;
        Ok(Progression::Next)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayKind {
    Int,
    Long,
    Float,
    Double,
    Reference,
    /// Byte or boolean
    Byte,
    Char,
    Short,
}

impl ArrayKind {
    fn value_kind(&self) -> ValueKind {
        match self {
            ArrayKind::Long => ValueKind::Long,
            ArrayKind::Float => ValueKind::Float,
            ArrayKind::Double => ValueKind::Double,
            ArrayKind::Reference => ValueKind::Reference,
            ArrayKind::Int | ArrayKind::Byte | ArrayKind::Char | ArrayKind::Short => ValueKind::Int,
        }
    }

    /// Truncate an int to what the array element can hold
    fn narrow(&self, component: &FieldType, value: RuntimeValue) -> RuntimeValue {
        let int = match value {
            RuntimeValue::Int(int) => int,
            other => return other,
        };

        RuntimeValue::Int(match (self, component) {
            (ArrayKind::Byte, FieldType::Base(BaseType::Boolean)) => int & 1,
            (ArrayKind::Byte, _) => int as i8 as i32,
            (ArrayKind::Char, _) => int as u16 as i32,
            (ArrayKind::Short, _) => int as i16 as i32,
            _ => int,
        })
    }
}

fn check_index(thread: &mut Thread, index: i32, length: usize) -> Result<usize, Throwable> {
    if index < 0 || index as usize >= length {
        return Err(thread.throw(VMError::ArrayIndexOutOfBounds { at: index, length }));
    }

    Ok(index as usize)
}

#[derive(Debug)]
pub struct ArrayLoad {
    pub(crate) kind: ArrayKind,
}

impl Instruction for ArrayLoad {
    fn handle(&self, thread: &mut Thread) -> Result<Progression, Throwable> {
        let index = arg!(thread, "index" => i32);
        let array = non_null!(thread, "arrayref");

        let length = array.array_length()?;
        let index = check_index(thread, index, length)?;

        let value = array.array()?.read()[index].clone();
        if value.kind() != self.kind.value_kind() {
            return Err(internal!(
                "{:?} array load from {}",
                self.kind,
                array.class().name()
            ));
        }

        thread.frame_mut()?.push(value);
        Ok(Progression::Next)
    }
}

#[derive(Debug)]
pub struct ArrayStore {
    pub(crate) kind: ArrayKind,
}

impl Instruction for ArrayStore {
    fn handle(&self, thread: &mut Thread) -> Result<Progression, Throwable> {
        let value = pop!(thread);
        let index = arg!(thread, "index" => i32);
        let array = non_null!(thread, "arrayref");

        if value.kind() != self.kind.value_kind() {
            return Err(internal!(
                "cannot store {:?} with a {:?} array store",
                value,
                self.kind
            ));
        }

        let component = array
            .array_component()
            .cloned()
            .ok_or_else(|| internal!("{} is not an array", array.class().name()))?;

        let length = array.array_length()?;
        let index = check_index(thread, index, length)?;

        if let (RuntimeValue::Object(obj), Some(expected)) = (&value, component.class_name()) {
            if !obj.class().is_instance_of(&expected) {
                return Err(thread.throw(VMError::ArrayStoreException {
                    ty: obj.class().binary_name(),
                }));
            }
        }

        array.array()?.write()[index] = self.kind.narrow(&component, value);
        Ok(Progression::Next)
    }
}

fn resolve_static(thread: &mut Thread, index: u16) -> Result<ResolvedField, Throwable> {
    let member = thread.frame()?.pool().field(index)?.clone();
    let class = thread.initialised_class(&member.class)?;

    let field = class
        .resolve_field(&member.name, &member.descriptor)
        .ok_or_else(|| internal!("no field {}.{}:{}", member.class, member.name, member.descriptor))?;

    if !field.is_static() {
        return Err(thread.throw(VMError::IncompatibleClassChange {
            ctx: format!("expected {}.{} to be static", member.class, member.name),
        }));
    }

    // The declaring class may be a superinterface the referenced class did not initialize
    if !Arc::ptr_eq(&field.class, &class) {
        thread.initialised_class(field.class.name())?;
    }

    Ok(field)
}

fn resolve_instance(thread: &mut Thread, index: u16) -> Result<ResolvedField, Throwable> {
    let member = thread.frame()?.pool().field(index)?.clone();
    let class = thread.vm().class_loader().for_name(&member.class)?;

    let field = class
        .resolve_field(&member.name, &member.descriptor)
        .ok_or_else(|| internal!("no field {}.{}:{}", member.class, member.name, member.descriptor))?;

    if field.is_static() {
        return Err(thread.throw(VMError::IncompatibleClassChange {
            ctx: format!("expected {}.{} to be an instance field", member.class, member.name),
        }));
    }

    Ok(field)
}

#[derive(Debug)]
pub struct GetStatic {
    pub(crate) index: u16,
}

impl Instruction for GetStatic {
    fn handle(&self, thread: &mut Thread) -> Result<Progression, Throwable> {
        let field = resolve_static(thread, self.index)?;
        let value = field.class.get_static(field.static_slot()?)?;

        thread.frame_mut()?.push(value);
        Ok(Progression::Next)
    }
}

#[derive(Debug)]
pub struct PutStatic {
    pub(crate) index: u16,
}

impl Instruction for PutStatic {
    fn handle(&self, thread: &mut Thread) -> Result<Progression, Throwable> {
        let field = resolve_static(thread, self.index)?;
        let value = pop!(thread);

        field.class.put_static(field.static_slot()?, value)?;
        Ok(Progression::Next)
    }
}

#[derive(Debug)]
pub struct GetField {
    pub(crate) index: u16,
}

impl Instruction for GetField {
    fn handle(&self, thread: &mut Thread) -> Result<Progression, Throwable> {
        let field = resolve_instance(thread, self.index)?;
        let obj = non_null!(thread, "objectref");

        let value = obj.get_field(field.instance_slot()?)?;
        thread.frame_mut()?.push(value);
        Ok(Progression::Next)
    }
}

#[derive(Debug)]
pub struct PutField {
    pub(crate) index: u16,
}

impl Instruction for PutField {
    fn handle(&self, thread: &mut Thread) -> Result<Progression, Throwable> {
        let field = resolve_instance(thread, self.index)?;
        let value = pop!(thread);
        let obj = non_null!(thread, "objectref");

        obj.put_field(field.instance_slot()?, value)?;
        Ok(Progression::Next)
    }
}
