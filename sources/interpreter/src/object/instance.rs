use std::{
    fmt,
    io::{self, Write},
    sync::{Arc, Weak},
};

use parking_lot::{Mutex, RwLock};
use support::descriptor::FieldType;

use super::{
    class::{Class, ClassCategory},
    monitor::Monitor,
    value::{ObjectRef, RuntimeValue},
};
use crate::{
    error::{Throwable, TraceElement},
    internal,
    thread::ThreadHandle,
};

/// A host stream bound to a guest `FileDescriptor`
#[derive(Debug)]
pub enum HostStream {
    Stdin,
    Stdout,
    Stderr,
}

impl HostStream {
    pub fn from_fd(fd: i32) -> Option<Self> {
        match fd {
            0 => Some(HostStream::Stdin),
            1 => Some(HostStream::Stdout),
            2 => Some(HostStream::Stderr),
            _ => None,
        }
    }

    pub fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        match self {
            HostStream::Stdin => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "cannot write to stdin",
            )),
            HostStream::Stdout => {
                let mut out = io::stdout().lock();
                out.write_all(bytes)?;
                out.flush()
            }
            HostStream::Stderr => io::stderr().lock().write_all(bytes),
        }
    }
}

/// VM-side state some instances carry next to their fields
pub enum Payload {
    Plain,
    Mirror(Weak<Class>),
    Thread(RwLock<Option<Arc<ThreadHandle>>>),
    Throwable(RwLock<Vec<TraceElement>>),
    Array(RwLock<Vec<RuntimeValue>>),
    File(Mutex<Option<HostStream>>),
}

pub struct Instance {
    class: Arc<Class>,
    fields: RwLock<Vec<RuntimeValue>>,
    monitor: Monitor,
    payload: Payload,
}

impl Instance {
    /// Allocate an instance with every field at its default
    pub fn new(class: Arc<Class>) -> Result<ObjectRef, Throwable> {
        let layout = class
            .layout()
            .ok_or_else(|| internal!("cannot allocate {}, it is not linked", class.name()))?;

        let payload = match class.category() {
            ClassCategory::Plain => Payload::Plain,
            ClassCategory::Mirror => Payload::Mirror(Weak::new()),
            ClassCategory::Thread => Payload::Thread(RwLock::new(None)),
            ClassCategory::Throwable => Payload::Throwable(RwLock::new(vec![])),
            ClassCategory::FileDescriptor => Payload::File(Mutex::new(None)),
            ClassCategory::Array => {
                return Err(internal!("{} is an array class, use new_array", class.name()))
            }
        };

        Ok(Arc::new(Self {
            fields: RwLock::new(layout.defaults.clone()),
            monitor: Monitor::new(),
            payload,
            class,
        }))
    }

    pub fn new_array(class: Arc<Class>, length: usize) -> Result<ObjectRef, Throwable> {
        let component = class
            .component()
            .ok_or_else(|| internal!("{} is not an array class", class.name()))?;

        let values = vec![RuntimeValue::default_for(component); length];
        Self::array_from(class, values)
    }

    pub fn array_from(class: Arc<Class>, values: Vec<RuntimeValue>) -> Result<ObjectRef, Throwable> {
        if !class.is_array() {
            return Err(internal!("{} is not an array class", class.name()));
        }

        Ok(Arc::new(Self {
            class,
            fields: RwLock::new(vec![]),
            monitor: Monitor::new(),
            payload: Payload::Array(RwLock::new(values)),
        }))
    }

    /// The mirror shares the monitor of the class it stands for, so that
    /// `synchronized (Foo.class)` and static synchronized methods agree.
    pub fn mirror_of(meta: Arc<Class>, target: &Arc<Class>) -> Result<ObjectRef, Throwable> {
        let layout = meta
            .layout()
            .ok_or_else(|| internal!("cannot allocate {}, it is not linked", meta.name()))?;

        Ok(Arc::new(Self {
            fields: RwLock::new(layout.defaults.clone()),
            monitor: target.monitor().clone(),
            payload: Payload::Mirror(Arc::downgrade(target)),
            class: meta,
        }))
    }

    pub fn class(&self) -> &Arc<Class> {
        &self.class
    }

    pub fn monitor(&self) -> &Monitor {
        &self.monitor
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn get_field(&self, slot: usize) -> Result<RuntimeValue, Throwable> {
        self.fields
            .read()
            .get(slot)
            .cloned()
            .ok_or_else(|| internal!("field slot {} out of range in {}", slot, self.class.name()))
    }

    pub fn put_field(&self, slot: usize, value: RuntimeValue) -> Result<(), Throwable> {
        let mut fields = self.fields.write();
        let entry = fields
            .get_mut(slot)
            .ok_or_else(|| internal!("field slot {} out of range in {}", slot, self.class.name()))?;

        *entry = value;
        Ok(())
    }

    pub fn has_field(&self, name: &str, descriptor: &str) -> bool {
        self.class
            .resolve_field(name, descriptor)
            .map_or(false, |field| !field.is_static())
    }

    /// Read an instance field by name, for natives
    pub fn field(&self, name: &str, descriptor: &str) -> Result<RuntimeValue, Throwable> {
        let slot = self.field_slot(name, descriptor)?;
        self.get_field(slot)
    }

    pub fn set_field(&self, name: &str, descriptor: &str, value: RuntimeValue) -> Result<(), Throwable> {
        let slot = self.field_slot(name, descriptor)?;
        self.put_field(slot, value)
    }

    fn field_slot(&self, name: &str, descriptor: &str) -> Result<usize, Throwable> {
        self.class
            .resolve_field(name, descriptor)
            .ok_or_else(|| internal!("no field {}:{} in {}", name, descriptor, self.class.name()))?
            .instance_slot()
    }

    pub fn is_array(&self) -> bool {
        matches!(self.payload, Payload::Array(_))
    }

    pub fn array(&self) -> Result<&RwLock<Vec<RuntimeValue>>, Throwable> {
        match &self.payload {
            Payload::Array(values) => Ok(values),
            _ => Err(internal!("{} is not an array", self.class.name())),
        }
    }

    pub fn array_length(&self) -> Result<usize, Throwable> {
        Ok(self.array()?.read().len())
    }

    pub fn array_component(&self) -> Option<&FieldType> {
        self.class.component()
    }

    /// The class a `java/lang/Class` instance stands for
    pub fn mirrored_class(&self) -> Option<Arc<Class>> {
        match &self.payload {
            Payload::Mirror(class) => class.upgrade(),
            _ => None,
        }
    }

    pub fn thread_handle(&self) -> Option<Arc<ThreadHandle>> {
        match &self.payload {
            Payload::Thread(handle) => handle.read().clone(),
            _ => None,
        }
    }

    pub fn bind_thread(&self, thread: Arc<ThreadHandle>) -> Result<(), Throwable> {
        match &self.payload {
            Payload::Thread(handle) => {
                *handle.write() = Some(thread);
                Ok(())
            }
            _ => Err(internal!("{} is not a thread", self.class.name())),
        }
    }

    pub fn stack_trace(&self) -> Option<Vec<TraceElement>> {
        match &self.payload {
            Payload::Throwable(trace) => Some(trace.read().clone()),
            _ => None,
        }
    }

    pub fn set_stack_trace(&self, elements: Vec<TraceElement>) -> Result<(), Throwable> {
        match &self.payload {
            Payload::Throwable(trace) => {
                *trace.write() = elements;
                Ok(())
            }
            _ => Err(internal!("{} is not a throwable", self.class.name())),
        }
    }

    pub fn stream(&self) -> Option<&Mutex<Option<HostStream>>> {
        match &self.payload {
            Payload::File(stream) => Some(stream),
            _ => None,
        }
    }

    /// Field-by-field copy for `Object.clone`, with a monitor of its own
    pub fn shallow_clone(&self) -> Result<ObjectRef, Throwable> {
        let payload = match &self.payload {
            Payload::Plain => Payload::Plain,
            Payload::Array(values) => Payload::Array(RwLock::new(values.read().clone())),
            Payload::Throwable(trace) => Payload::Throwable(RwLock::new(trace.read().clone())),
            Payload::Thread(_) => Payload::Thread(RwLock::new(None)),
            Payload::File(_) => Payload::File(Mutex::new(None)),
            Payload::Mirror(_) => {
                return Err(internal!("class mirrors cannot be cloned"));
            }
        };

        Ok(Arc::new(Self {
            class: self.class.clone(),
            fields: RwLock::new(self.fields.read().clone()),
            monitor: Monitor::new(),
            payload,
        }))
    }
}

/// Identity hash derived from the allocation address
pub fn identity_hash(obj: &ObjectRef) -> i32 {
    let address = Arc::as_ptr(obj) as usize;
    (address >> 3) as i32
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct("Instance");
        out.field("class", &self.class.name());

        match &self.payload {
            Payload::Array(values) => out.field("length", &values.read().len()),
            Payload::Mirror(class) => out.field(
                "mirrors",
                &class.upgrade().map(|c| c.name().to_string()),
            ),
            _ => out.field("fields", &self.fields.read().len()),
        };

        out.finish()
    }
}
