use std::sync::Arc;

use classfile::pool::ConstantMember;
use support::descriptor::MethodType;
use tracing::trace;

use super::{Instruction, Progression};
use crate::{
    error::{Throwable, VMError},
    internal, internalise, non_null,
    object::{
        class::{Class, ResolvedMethod},
        instance::Instance,
        value::{ObjectRef, RuntimeValue},
    },
    thread::Thread,
};

fn member(thread: &Thread, index: u16) -> Result<ConstantMember, Throwable> {
    Ok(thread.frame()?.pool().method(index)?.clone())
}

fn parameter_count(member: &ConstantMember) -> Result<usize, Throwable> {
    let ty = MethodType::parse(&member.descriptor).map_err(internalise!())?;
    Ok(ty.parameters.len())
}

fn lookup(class: &Arc<Class>, member: &ConstantMember) -> Result<ResolvedMethod, Throwable> {
    class
        .resolve_method(&member.name, &member.descriptor)
        .ok_or_else(|| {
            internal!(
                "no method {}{} in {} (referenced as {})",
                member.name,
                member.descriptor,
                class.name(),
                member.class
            )
        })
}

/// Pop the arguments, then the receiver beneath them, and put the receiver first
fn receiver_and_args(
    thread: &mut Thread,
    member: &ConstantMember,
) -> Result<(ObjectRef, Vec<RuntimeValue>), Throwable> {
    let mut args = thread.frame_mut()?.pop_n(parameter_count(member)?)?;
    let receiver = non_null!(thread, "receiver");

    args.insert(0, RuntimeValue::Object(receiver.clone()));
    Ok((receiver, args))
}

/// Virtual dispatch on the receiver's class
fn dispatch_virtual(thread: &mut Thread, member: ConstantMember) -> Result<Progression, Throwable> {
    let (receiver, args) = receiver_and_args(thread, &member)?;
    let method = lookup(receiver.class(), &member)?;

    if method.info().is_static() {
        return Err(thread.throw(VMError::IncompatibleClassChange {
            ctx: format!("expected {} to be an instance method", method.display_name()),
        }));
    }

    trace!("Dispatching {} on {}", method.display_name(), receiver.class().name());
    thread.call(method, args)
}

#[derive(Debug)]
pub struct InvokeVirtual {
    pub(crate) index: u16,
}

impl Instruction for InvokeVirtual {
    fn handle(&self, thread: &mut Thread) -> Result<Progression, Throwable> {
        let member = member(thread, self.index)?;
        dispatch_virtual(thread, member)
    }
}

#[derive(Debug)]
pub struct InvokeInterface {
    pub(crate) index: u16,
}

impl Instruction for InvokeInterface {
    fn handle(&self, thread: &mut Thread) -> Result<Progression, Throwable> {
        let member = member(thread, self.index)?;
        dispatch_virtual(thread, member)
    }
}

/// Constructors, private methods and `super.m()` calls. None of these dispatch
/// on the receiver's class.
#[derive(Debug)]
pub struct InvokeSpecial {
    pub(crate) index: u16,
}

impl Instruction for InvokeSpecial {
    fn handle(&self, thread: &mut Thread) -> Result<Progression, Throwable> {
        let member = member(thread, self.index)?;
        let referenced = thread.vm().class_loader().for_name(&member.class)?;
        let current = thread.frame()?.class().clone();

        // A super call names a superclass of the caller, and starts the search
        // at the caller's direct superclass
        let start = if member.name != "<init>"
            && !referenced.is_interface()
            && current.name() != referenced.name()
            && current.is_subclass_of(referenced.name())
            && current.has_super_semantics()
        {
            current.super_class().cloned().unwrap_or(referenced)
        } else {
            referenced
        };

        let method = lookup(&start, &member)?;
        if method.info().is_static() {
            return Err(thread.throw(VMError::IncompatibleClassChange {
                ctx: format!("expected {} to be an instance method", method.display_name()),
            }));
        }

        let (_, args) = receiver_and_args(thread, &member)?;
        thread.call(method, args)
    }
}

#[derive(Debug)]
pub struct InvokeStatic {
    pub(crate) index: u16,
}

impl Instruction for InvokeStatic {
    fn handle(&self, thread: &mut Thread) -> Result<Progression, Throwable> {
        let member = member(thread, self.index)?;
        let class = thread.initialised_class(&member.class)?;
        let method = lookup(&class, &member)?;

        if !method.info().is_static() {
            return Err(thread.throw(VMError::IncompatibleClassChange {
                ctx: format!("expected {} to be static", method.display_name()),
            }));
        }

        let args = thread.frame_mut()?.pop_n(parameter_count(&member)?)?;
        thread.call(method, args)
    }
}

#[derive(Debug)]
pub struct New {
    pub(crate) index: u16,
}

impl Instruction for New {
    fn handle(&self, thread: &mut Thread) -> Result<Progression, Throwable> {
        let name = thread.frame()?.pool().class_name(self.index)?.to_string();
        let class = thread.initialised_class(&name)?;

        if class.is_interface() || class.is_abstract() || class.is_array() {
            return Err(thread.throw(VMError::InstantiationError {
                class: class.binary_name(),
            }));
        }

        let obj = Instance::new(class)?;
        thread.frame_mut()?.push(RuntimeValue::Object(obj));

        Ok(Progression::Next)
    }
}
