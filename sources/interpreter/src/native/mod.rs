use std::{collections::HashMap, fmt, sync::Arc};

use parking_lot::RwLock;
use support::types::MethodDescriptor;
use tracing::debug;

use crate::{
    error::{Throwable, VMError},
    internal, internalise,
    object::{
        class::{Class, ResolvedMethod},
        value::{ObjectRef, RuntimeValue},
    },
    thread::Thread,
};

pub mod io;
pub mod lang;

pub type NativeResult = Result<Option<RuntimeValue>, Throwable>;

pub type NativeStaticFunction =
    Arc<dyn Fn(&mut Thread, Arc<Class>, Vec<RuntimeValue>) -> NativeResult + Send + Sync>;

/// Instance natives get the receiver split off from `args`
pub type NativeInstanceFunction =
    Arc<dyn Fn(&mut Thread, ObjectRef, Vec<RuntimeValue>) -> NativeResult + Send + Sync>;

#[derive(Clone)]
pub enum NativeFunction {
    Static(NativeStaticFunction),
    Instance(NativeInstanceFunction),
}

impl NativeFunction {
    pub fn from_static<F>(function: F) -> Self
    where
        F: Fn(&mut Thread, Arc<Class>, Vec<RuntimeValue>) -> NativeResult + Send + Sync + 'static,
    {
        NativeFunction::Static(Arc::new(function))
    }

    pub fn from_instance<F>(function: F) -> Self
    where
        F: Fn(&mut Thread, ObjectRef, Vec<RuntimeValue>) -> NativeResult + Send + Sync + 'static,
    {
        NativeFunction::Instance(Arc::new(function))
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NativeFunction::Static(_) => f.write_str("NativeFunction::Static"),
            NativeFunction::Instance(_) => f.write_str("NativeFunction::Instance"),
        }
    }
}

pub type NameAndDescriptor = (&'static str, &'static str);

/// A group of natives belonging to one class
pub trait NativeModule {
    fn classname(&self) -> &'static str;

    fn methods(&self) -> Vec<(NameAndDescriptor, NativeFunction)>;
}

/// Native implementations keyed by class name and method descriptor
#[derive(Default)]
pub struct NativeRegistry {
    methods: RwLock<HashMap<(String, MethodDescriptor), NativeFunction>>,
}

impl NativeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        class: &str,
        name: &str,
        descriptor: &str,
        function: NativeFunction,
    ) -> Result<(), Throwable> {
        let key = MethodDescriptor::try_from((name, descriptor)).map_err(internalise!())?;
        self.methods.write().insert((class.to_string(), key), function);

        Ok(())
    }

    pub fn register_module(&self, module: &dyn NativeModule) -> Result<(), Throwable> {
        let class = module.classname();
        let methods = module.methods();
        debug!("Registering {} natives for {}", methods.len(), class);

        for ((name, descriptor), function) in methods {
            self.register(class, name, descriptor, function)?;
        }

        Ok(())
    }

    pub fn lookup(&self, class: &str, name: &str, descriptor: &str) -> Option<NativeFunction> {
        let key = MethodDescriptor::try_from((name, descriptor)).ok()?;
        self.methods.read().get(&(class.to_string(), key)).cloned()
    }

    pub fn len(&self) -> usize {
        self.methods.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.read().is_empty()
    }

    /// Run the native behind `method`. The registry lock is released before the
    /// implementation runs, so natives may register or call other natives.
    pub fn dispatch(
        &self,
        thread: &mut Thread,
        method: &ResolvedMethod,
        mut args: Vec<RuntimeValue>,
    ) -> NativeResult {
        let class = method.class.clone();
        let info = method.info();

        let function = self
            .lookup(class.name(), &info.name, &info.descriptor)
            .ok_or_else(|| Throwable::NativeNotFound(method.display_name()))?;

        let result = match function {
            NativeFunction::Static(function) => function(thread, class, args),
            NativeFunction::Instance(function) => {
                if args.is_empty() {
                    return Err(internal!("{} called without a receiver", method.display_name()));
                }

                let receiver = match args.remove(0) {
                    RuntimeValue::Object(obj) => obj,
                    _ => {
                        return Err(thread.throw(VMError::NullPointerException {
                            ctx: format!("receiver of {} was null", method.display_name()),
                        }))
                    }
                };

                function(thread, receiver, args)
            }
        };

        match result {
            Err(e) if !e.is_guest() => Err(Throwable::Native {
                method: method.display_name(),
                source: Box::new(e),
            }),
            other => other,
        }
    }
}

impl fmt::Debug for NativeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeRegistry")
            .field("methods", &self.methods.read().len())
            .finish()
    }
}

#[macro_export]
macro_rules! static_method {
    (name: $name: expr, descriptor: $descriptor: expr => $method: expr) => {
        (
            ($name, $descriptor),
            $crate::native::NativeFunction::from_static($method),
        )
    };
}

#[macro_export]
macro_rules! instance_method {
    (name: $name: expr, descriptor: $descriptor: expr => $method: expr) => {
        (
            ($name, $descriptor),
            $crate::native::NativeFunction::from_instance($method),
        )
    };
}

/// Pull a typed argument out of a native's argument list
#[macro_export]
macro_rules! native_arg {
    ($args: expr, $index: expr => int) => {
        match $args.get($index) {
            Some($crate::object::value::RuntimeValue::Int(value)) => *value,
            other => return Err($crate::internal!("expected an int argument at {}, got {:?}", $index, other)),
        }
    };
    ($args: expr, $index: expr => long) => {
        match $args.get($index) {
            Some($crate::object::value::RuntimeValue::Long(value)) => *value,
            other => return Err($crate::internal!("expected a long argument at {}, got {:?}", $index, other)),
        }
    };
    ($args: expr, $index: expr => Object) => {
        match $args.get($index) {
            Some($crate::object::value::RuntimeValue::Object(value)) => Some(value.clone()),
            Some($crate::object::value::RuntimeValue::Null) => None,
            other => return Err($crate::internal!("expected a reference argument at {}, got {:?}", $index, other)),
        }
    };
}

/// Every built-in module, in registration order
pub fn builtin_modules() -> Vec<Box<dyn NativeModule>> {
    vec![
        Box::new(lang::LangObject),
        Box::new(lang::LangClass),
        Box::new(lang::LangSystem),
        Box::new(lang::LangThread),
        Box::new(lang::LangThrowable),
        Box::new(lang::LangRuntime),
        Box::new(lang::LangString),
        Box::new(io::FileDescriptor),
        Box::new(io::FileOutputStream),
    ]
}
