use std::{
    fmt,
    sync::{Arc, OnceLock},
};

use classfile::{
    attributes::CodeAttribute,
    classfile::{ClassDescriptor, FieldInfo, MethodInfo},
    flags::ClassAccessFlags,
};
use parking_lot::{Condvar, Mutex, RwLock};
use support::descriptor::{FieldType, MethodType};

use super::{
    instance::Instance,
    monitor::Monitor,
    value::{ObjectRef, RuntimeValue},
};
use crate::{error::Throwable, internal, internalise, thread::ThreadId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassState {
    NotInitialized,
    Initializing,
    Initialized,
    FailedInitialization,
}

#[derive(Debug, Clone)]
pub enum ClassKind {
    Class,
    Interface,
    Array {
        component: FieldType,
        /// The component's class, `None` for primitive components
        element: Option<Arc<Class>>,
    },
}

/// What kind of VM-side payload instances of a class carry.
/// Decided by walking the superclass chain for a handful of well known names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassCategory {
    Plain,
    Mirror,
    Thread,
    Throwable,
    Array,
    FileDescriptor,
}

#[derive(Debug)]
pub struct InstanceLayout {
    pub total: usize,
    /// Instance slot for each declared field, `None` for statics
    pub slots: Vec<Option<usize>>,
    pub defaults: Vec<RuntimeValue>,
}

#[derive(Debug)]
struct Links {
    super_class: Option<Arc<Class>>,
    interfaces: Vec<Arc<Class>>,
    layout: InstanceLayout,
}

#[derive(Debug)]
struct InitState {
    state: ClassState,
    initializer: Option<ThreadId>,
}

pub(crate) enum InitDecision {
    /// The caller now owns initialization and must call `finish_initialisation`
    Run,
    Done(ClassState),
}

pub struct Class {
    name: String,
    descriptor: Arc<ClassDescriptor>,
    kind: ClassKind,
    links: OnceLock<Links>,
    static_slots: Vec<Option<usize>>,
    statics: RwLock<Vec<RuntimeValue>>,
    init: Mutex<InitState>,
    init_cond: Condvar,
    monitor: Monitor,
    mirror: OnceLock<ObjectRef>,
    category: OnceLock<ClassCategory>,
}

impl Class {
    pub fn new(descriptor: Arc<ClassDescriptor>) -> Result<Self, Throwable> {
        let kind = if descriptor.is_interface() {
            ClassKind::Interface
        } else {
            ClassKind::Class
        };

        Self::build(descriptor, kind, ClassState::NotInitialized)
    }

    /// Array classes need no initializer, so they start out initialized
    pub fn new_array(
        descriptor: Arc<ClassDescriptor>,
        component: FieldType,
        element: Option<Arc<Class>>,
    ) -> Result<Self, Throwable> {
        Self::build(
            descriptor,
            ClassKind::Array { component, element },
            ClassState::Initialized,
        )
    }

    fn build(
        descriptor: Arc<ClassDescriptor>,
        kind: ClassKind,
        state: ClassState,
    ) -> Result<Self, Throwable> {
        let mut static_slots = Vec::with_capacity(descriptor.fields.len());
        let mut statics = vec![];

        for field in &descriptor.fields {
            if field.is_static() {
                let ty = field.field_type().map_err(internalise!())?;
                static_slots.push(Some(statics.len()));
                statics.push(RuntimeValue::default_for(&ty));
            } else {
                static_slots.push(None);
            }
        }

        Ok(Self {
            name: descriptor.name.clone(),
            descriptor,
            kind,
            links: OnceLock::new(),
            static_slots,
            statics: RwLock::new(statics),
            init: Mutex::new(InitState {
                state,
                initializer: None,
            }),
            init_cond: Condvar::new(),
            monitor: Monitor::new(),
            mirror: OnceLock::new(),
            category: OnceLock::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn descriptor(&self) -> &Arc<ClassDescriptor> {
        &self.descriptor
    }

    pub fn kind(&self) -> &ClassKind {
        &self.kind
    }

    pub fn is_interface(&self) -> bool {
        matches!(self.kind, ClassKind::Interface)
    }

    pub fn is_abstract(&self) -> bool {
        self.descriptor.is_abstract()
    }

    pub fn is_array(&self) -> bool {
        matches!(self.kind, ClassKind::Array { .. })
    }

    pub fn has_super_semantics(&self) -> bool {
        self.descriptor.access_flags.contains(ClassAccessFlags::SUPER)
    }

    pub fn component(&self) -> Option<&FieldType> {
        match &self.kind {
            ClassKind::Array { component, .. } => Some(component),
            _ => None,
        }
    }

    pub fn monitor(&self) -> &Monitor {
        &self.monitor
    }

    pub fn is_linked(&self) -> bool {
        self.links.get().is_some()
    }

    pub fn super_class(&self) -> Option<&Arc<Class>> {
        self.links.get().and_then(|l| l.super_class.as_ref())
    }

    pub fn interfaces(&self) -> &[Arc<Class>] {
        self.links.get().map_or(&[], |l| l.interfaces.as_slice())
    }

    pub fn layout(&self) -> Option<&InstanceLayout> {
        self.links.get().map(|l| &l.layout)
    }

    /// Record the resolved supertypes and compute the instance layout.
    /// Inherited fields keep the slots the superclass gave them.
    pub(crate) fn link(
        &self,
        super_class: Option<Arc<Class>>,
        interfaces: Vec<Arc<Class>>,
    ) -> Result<(), Throwable> {
        let (mut total, mut defaults) = match &super_class {
            Some(parent) => {
                let layout = parent.layout().ok_or_else(|| {
                    internal!("superclass {} of {} is not linked", parent.name, self.name)
                })?;

                (layout.total, layout.defaults.clone())
            }
            None => (0, vec![]),
        };

        let mut slots = vec![None; self.descriptor.fields.len()];
        for (index, field) in self.descriptor.fields.iter().enumerate() {
            if field.is_static() {
                continue;
            }

            let ty = field.field_type().map_err(internalise!())?;
            slots[index] = Some(total);
            defaults.push(RuntimeValue::default_for(&ty));
            total += 1;
        }

        // Another thread may have linked us first, theirs is just as good
        let _ = self.links.set(Links {
            super_class,
            interfaces,
            layout: InstanceLayout {
                total,
                slots,
                defaults,
            },
        });

        Ok(())
    }

    pub fn state(&self) -> ClassState {
        self.init.lock().state
    }

    /// Claim initialization of this class for `thread`, or wait for whoever
    /// holds it. A thread re-entering its own initialization sees `Initializing`.
    pub(crate) fn begin_initialisation(&self, thread: ThreadId) -> InitDecision {
        let mut init = self.init.lock();

        loop {
            match init.state {
                ClassState::NotInitialized => {
                    init.state = ClassState::Initializing;
                    init.initializer = Some(thread);
                    return InitDecision::Run;
                }
                ClassState::Initializing if init.initializer == Some(thread) => {
                    return InitDecision::Done(ClassState::Initializing);
                }
                ClassState::Initializing => self.init_cond.wait(&mut init),
                state => return InitDecision::Done(state),
            }
        }
    }

    pub(crate) fn finish_initialisation(&self, state: ClassState) {
        let mut init = self.init.lock();
        debug_assert_eq!(init.state, ClassState::Initializing);

        init.state = state;
        init.initializer = None;
        self.init_cond.notify_all();
    }

    pub fn static_slot(&self, field_index: usize) -> Option<usize> {
        self.static_slots.get(field_index).copied().flatten()
    }

    pub fn get_static(&self, slot: usize) -> Result<RuntimeValue, Throwable> {
        self.statics
            .read()
            .get(slot)
            .cloned()
            .ok_or_else(|| internal!("static slot {} out of range in {}", slot, self.name))
    }

    pub fn put_static(&self, slot: usize, value: RuntimeValue) -> Result<(), Throwable> {
        let mut statics = self.statics.write();
        let entry = statics
            .get_mut(slot)
            .ok_or_else(|| internal!("static slot {} out of range in {}", slot, self.name))?;

        *entry = value;
        Ok(())
    }

    /// Read a static by name, resolving it the way `getstatic` would
    pub fn static_value(self: &Arc<Self>, name: &str, descriptor: &str) -> Result<RuntimeValue, Throwable> {
        let field = self
            .resolve_field(name, descriptor)
            .ok_or_else(|| internal!("no static {}:{} in {}", name, descriptor, self.name))?;

        field.class.get_static(field.static_slot()?)
    }

    /// Field lookup: the class itself, then its superinterfaces, then its superclass
    pub fn resolve_field(self: &Arc<Self>, name: &str, descriptor: &str) -> Option<ResolvedField> {
        if let Some((index, _)) = self.descriptor.find_field(name, descriptor) {
            return Some(ResolvedField {
                class: self.clone(),
                index,
            });
        }

        for interface in self.interfaces() {
            if let Some(found) = interface.resolve_field(name, descriptor) {
                return Some(found);
            }
        }

        self.super_class()?.resolve_field(name, descriptor)
    }

    /// Method lookup: the class itself, then its superclasses, then its superinterfaces
    pub fn resolve_method(self: &Arc<Self>, name: &str, descriptor: &str) -> Option<ResolvedMethod> {
        if let Some(found) = self.own_method(name, descriptor) {
            return Some(found);
        }

        if let Some(found) = self
            .super_class()
            .and_then(|parent| parent.resolve_method(name, descriptor))
        {
            return Some(found);
        }

        self.interfaces()
            .iter()
            .find_map(|interface| interface.resolve_method(name, descriptor))
    }

    pub fn own_method(self: &Arc<Self>, name: &str, descriptor: &str) -> Option<ResolvedMethod> {
        self.descriptor
            .find_method(name, descriptor)
            .map(|(index, _)| ResolvedMethod {
                class: self.clone(),
                index,
            })
    }

    /// Reflexive walk of the superclass chain
    pub fn is_subclass_of(&self, name: &str) -> bool {
        if self.name == name {
            return true;
        }

        self.super_class()
            .map_or(false, |parent| parent.is_subclass_of(name))
    }

    pub fn implements(&self, name: &str) -> bool {
        self.interfaces()
            .iter()
            .any(|interface| interface.name == name || interface.implements(name))
            || self
                .super_class()
                .map_or(false, |parent| parent.implements(name))
    }

    /// Assignability as `checkcast` and `instanceof` see it
    pub fn is_instance_of(&self, target: &str) -> bool {
        if self.name == target {
            return true;
        }

        if let ClassKind::Array { element, .. } = &self.kind {
            if !target.starts_with('[') {
                return matches!(
                    target,
                    "java/lang/Object" | "java/lang/Cloneable" | "java/io/Serializable"
                );
            }

            let target_component = match FieldType::parse(target) {
                Ok(FieldType::Array(array)) => array.field_type.class_name(),
                _ => return false,
            };

            // Primitive arrays only match themselves, which the name check covered
            return match (element, target_component) {
                (Some(element), Some(target_component)) => element.is_instance_of(&target_component),
                _ => false,
            };
        }

        if target.starts_with('[') {
            return false;
        }

        self.is_subclass_of(target) || self.implements(target)
    }

    pub fn category(&self) -> ClassCategory {
        if let Some(category) = self.category.get() {
            return *category;
        }

        let category = self.compute_category();

        // Before linking the superclass chain is unknown, so don't remember the answer
        if self.is_linked() {
            let _ = self.category.set(category);
        }

        category
    }

    fn compute_category(&self) -> ClassCategory {
        if self.is_array() {
            return ClassCategory::Array;
        }

        let mut current = Some(self);
        while let Some(class) = current {
            match class.name.as_str() {
                "java/lang/Class" => return ClassCategory::Mirror,
                "java/lang/Thread" => return ClassCategory::Thread,
                "java/lang/Throwable" => return ClassCategory::Throwable,
                "java/io/FileDescriptor" => return ClassCategory::FileDescriptor,
                _ => {}
            }

            current = class.super_class().map(|parent| parent.as_ref());
        }

        ClassCategory::Plain
    }

    /// The `java/lang/Class` instance standing for this class. Created once,
    /// every caller sees the same object.
    pub fn mirror(self: &Arc<Self>, meta: &Arc<Class>) -> Result<ObjectRef, Throwable> {
        if let Some(mirror) = self.mirror.get() {
            return Ok(mirror.clone());
        }

        let mirror = Instance::mirror_of(meta.clone(), self)?;
        let _ = self.mirror.set(mirror);

        self.mirror
            .get()
            .cloned()
            .ok_or_else(|| internal!("mirror of {} vanished", self.name))
    }

    /// The name `Class.getName` reports, dotted
    pub fn binary_name(&self) -> String {
        self.name.replace('/', ".")
    }
}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Class")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("state", &self.state())
            .finish()
    }
}

/// A field together with the class that declares it
#[derive(Debug, Clone)]
pub struct ResolvedField {
    pub class: Arc<Class>,
    pub index: usize,
}

impl ResolvedField {
    pub fn info(&self) -> &FieldInfo {
        &self.class.descriptor.fields[self.index]
    }

    pub fn is_static(&self) -> bool {
        self.info().is_static()
    }

    pub fn static_slot(&self) -> Result<usize, Throwable> {
        self.class.static_slot(self.index).ok_or_else(|| {
            internal!("{}.{} is not a static field", self.class.name, self.info().name)
        })
    }

    pub fn instance_slot(&self) -> Result<usize, Throwable> {
        self.class
            .layout()
            .and_then(|layout| layout.slots.get(self.index).copied().flatten())
            .ok_or_else(|| {
                internal!("{}.{} is not an instance field", self.class.name, self.info().name)
            })
    }
}

/// A method together with the class that declares it
#[derive(Debug, Clone)]
pub struct ResolvedMethod {
    pub class: Arc<Class>,
    pub index: usize,
}

impl ResolvedMethod {
    pub fn info(&self) -> &MethodInfo {
        &self.class.descriptor.methods[self.index]
    }

    pub fn name(&self) -> &str {
        &self.info().name
    }

    pub fn code(&self) -> Option<&CodeAttribute> {
        self.info().code.as_ref()
    }

    pub fn method_type(&self) -> Result<MethodType, Throwable> {
        self.info().method_type().map_err(internalise!())
    }

    /// `Class.name(descriptor)`, for logs and error messages
    pub fn display_name(&self) -> String {
        format!("{}.{}{}", self.class.name, self.info().name, self.info().descriptor)
    }
}
