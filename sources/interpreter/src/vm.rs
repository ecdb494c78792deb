use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use classfile::{attributes::ConstantValue, provider::DescriptorProvider};
use tracing::{debug, error, info};

use crate::{
    config::Config,
    error::Throwable,
    executor::{Completions, Executor},
    internal,
    native::{builtin_modules, NativeRegistry},
    object::{
        class::{Class, ClassState, InitDecision},
        interner::StringInterner,
        loader::ClassLoader,
        value::{ObjectRef, RuntimeValue},
    },
    thread::{describe, Outcome, Thread, ThreadHandle, ThreadInfo},
};

/// Everything threads share: loaded classes, interned strings, natives and the executor
pub struct VM {
    config: Config,
    class_loader: ClassLoader,
    interner: StringInterner,
    natives: NativeRegistry,
    executor: Executor,
    next_thread_id: AtomicU64,
}

impl VM {
    /// Register the built-in natives and load the bootstrap classes
    pub fn initialize(config: Config, provider: impl DescriptorProvider + 'static) -> Result<Arc<VM>, Throwable> {
        let executor = Executor::new(config.thread_stack_size);

        let vm = VM {
            class_loader: ClassLoader::new(provider),
            interner: StringInterner::new(),
            natives: NativeRegistry::new(),
            executor,
            next_thread_id: AtomicU64::new(1),
            config,
        };

        for module in builtin_modules() {
            vm.natives.register_module(module.as_ref())?;
        }

        for name in &vm.config.bootstrap_classes {
            vm.class_loader.for_name(name)?;
        }

        info!(
            "VM ready with {} natives and {} classes",
            vm.natives.len(),
            vm.class_loader.loaded_count()
        );

        Ok(Arc::new(vm))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn class_loader(&self) -> &ClassLoader {
        &self.class_loader
    }

    pub fn interner(&self) -> &StringInterner {
        &self.interner
    }

    pub fn natives(&self) -> &NativeRegistry {
        &self.natives
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    pub fn new_thread_handle(&self, name: Option<String>, daemon: bool) -> Arc<ThreadHandle> {
        let id = self.next_thread_id.fetch_add(1, Ordering::SeqCst);
        let name = name.unwrap_or_else(|| format!("Thread-{}", id));

        ThreadHandle::new(id, name, daemon)
    }

    /// Run `body` on a new VM thread bound to `handle`
    pub fn spawn<F>(self: &Arc<Self>, handle: Arc<ThreadHandle>, body: F) -> Result<ThreadInfo, Throwable>
    where
        F: FnOnce(&mut Thread) -> Result<Outcome, Throwable> + Send + 'static,
    {
        self.executor.spawn(self.clone(), handle, body)
    }

    /// Load and link `name`, then run its initialization if nobody has yet.
    /// Returns the state the class was left in.
    pub fn ensure_initialized(
        &self,
        thread: &mut Thread,
        name: &str,
    ) -> Result<(Arc<Class>, ClassState), Throwable> {
        let class = self.class_loader.for_name(name)?;

        match class.begin_initialisation(thread.id()) {
            InitDecision::Done(state) => Ok((class, state)),
            InitDecision::Run => {
                debug!("Initializing {} on \"{}\"", name, thread.handle().name());

                let result = self.initialise(thread, &class);
                let state = match &result {
                    Ok(state) => *state,
                    Err(_) => ClassState::FailedInitialization,
                };

                class.finish_initialisation(state);
                debug!("{} is now {:?}", name, state);

                result.map(|state| (class, state))
            }
        }
    }

    fn initialise(&self, thread: &mut Thread, class: &Arc<Class>) -> Result<ClassState, Throwable> {
        for (index, field) in class.descriptor().fields.iter().enumerate() {
            let (slot, constant) = match (class.static_slot(index), &field.constant_value) {
                (Some(slot), Some(constant)) => (slot, constant),
                _ => continue,
            };

            let value = match constant {
                ConstantValue::Int(value) => RuntimeValue::Int(*value),
                ConstantValue::Long(value) => RuntimeValue::Long(*value),
                ConstantValue::Float(value) => RuntimeValue::Float(*value),
                ConstantValue::Double(value) => RuntimeValue::Double(*value),
                ConstantValue::String(value) => RuntimeValue::Object(thread.intern(value)?),
            };

            class.put_static(slot, value)?;
        }

        let dependencies = class
            .super_class()
            .into_iter()
            .chain(class.interfaces())
            .map(|dependency| dependency.name().to_string())
            .collect::<Vec<_>>();

        for dependency in dependencies {
            let (_, state) = self.ensure_initialized(thread, &dependency)?;
            if state == ClassState::FailedInitialization {
                error!(
                    "{} cannot be initialized, {} failed initialization",
                    class.name(),
                    dependency
                );
                return Ok(ClassState::FailedInitialization);
            }
        }

        if let Some(clinit) = class.own_method("<clinit>", "()V") {
            if let Outcome::Threw(exception) = thread.invoke(clinit, vec![])? {
                error!(
                    "Initializer of {} threw {}",
                    class.name(),
                    describe(&exception)
                );
                return Ok(ClassState::FailedInitialization);
            }
        }

        Ok(ClassState::Initialized)
    }

    /// The single `java/lang/Class` instance for `class`
    pub fn class_mirror(&self, class: &Arc<Class>) -> Result<ObjectRef, Throwable> {
        let meta = self.class_loader.for_name("java/lang/Class")?;
        class.mirror(&meta)
    }

    /// Resolve `main([Ljava/lang/String;)V` now, then initialize the class and
    /// run it on a fresh main thread
    pub fn exec_main(self: &Arc<Self>, class_name: &str, args: Vec<String>) -> Result<ThreadInfo, Throwable> {
        let class = self.class_loader.for_name(class_name)?;
        let main = class
            .resolve_method("main", "([Ljava/lang/String;)V")
            .filter(|method| method.info().is_static())
            .ok_or_else(|| internal!("{} has no static main([Ljava/lang/String;)V", class_name))?;

        let handle = self.new_thread_handle(Some(self.config.main_thread_name.clone()), false);
        let class_name = class_name.to_string();

        self.spawn(handle, move |thread| {
            thread.attach()?;
            thread.initialised_class(&class_name)?;

            let values = args
                .iter()
                .map(|arg| thread.intern(arg).map(RuntimeValue::Object))
                .collect::<Result<Vec<_>, _>>()?;

            let args = thread.new_array("[Ljava/lang/String;", values)?;
            thread.invoke(main, vec![RuntimeValue::Object(args)])
        })
    }

    /// Run the static `class.method(descriptor)` on a new VM thread
    pub fn start_thread(
        self: &Arc<Self>,
        name: &str,
        daemon: bool,
        class_name: &str,
        method: &str,
        descriptor: &str,
        args: Vec<RuntimeValue>,
    ) -> Result<ThreadInfo, Throwable> {
        let class = self.class_loader.for_name(class_name)?;
        let entry = class
            .resolve_method(method, descriptor)
            .filter(|resolved| resolved.info().is_static())
            .ok_or_else(|| internal!("{} has no static {}{}", class_name, method, descriptor))?;

        let handle = self.new_thread_handle(Some(name.to_string()), daemon);
        let class_name = class_name.to_string();

        self.spawn(handle, move |thread| {
            thread.attach()?;
            thread.initialised_class(&class_name)?;
            thread.invoke(entry, args)
        })
    }

    /// Completion records of every thread, until no non-daemon thread is left
    pub fn completions(&self) -> Completions<'_> {
        self.executor.completions()
    }
}
