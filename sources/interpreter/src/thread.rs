use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tracing::{debug, error, trace, warn};

use crate::{
    bytecode::{decode_instruction, Progression},
    error::{RuntimeException, Throwable, TraceElement, VMError},
    frame::Frame,
    internal,
    object::{
        class::{Class, ClassState, ResolvedMethod},
        instance::Instance,
        interner::decode_string,
        monitor::{Interrupt, Monitor},
        value::{ObjectRef, RuntimeValue},
    },
    vm::VM,
};

pub type ThreadId = u64;

/// `threadStatus` values, as the JVMTI thread state bits have them
pub const THREAD_RUNNABLE: i32 = 0x0005;
pub const THREAD_TERMINATED: i32 = 0x0002;

/// The part of a VM thread other threads may see: identity, liveness and the interrupt signal
#[derive(Debug)]
pub struct ThreadHandle {
    id: ThreadId,
    name: String,
    daemon: bool,
    alive: AtomicBool,
    interrupt: Interrupt,
}

impl ThreadHandle {
    pub fn new(id: ThreadId, name: impl Into<String>, daemon: bool) -> Arc<Self> {
        Arc::new(Self {
            id,
            name: name.into(),
            daemon,
            alive: AtomicBool::new(false),
            interrupt: Interrupt::new(),
        })
    }

    pub fn id(&self) -> ThreadId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_daemon(&self) -> bool {
        self.daemon
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    pub(crate) fn set_alive(&self, alive: bool) {
        self.alive.store(alive, Ordering::SeqCst);
    }

    pub fn interrupt(&self) -> &Interrupt {
        &self.interrupt
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadInfo {
    pub id: ThreadId,
    pub name: String,
    pub daemon: bool,
}

/// How a run of guest code ended when it did not fault
#[derive(Debug)]
pub enum Outcome {
    Returned(Option<RuntimeValue>),
    Threw(ObjectRef),
}

/// A VM thread: its frame stack and everything needed to execute on it
pub struct Thread {
    vm: Arc<VM>,
    handle: Arc<ThreadHandle>,
    frames: Vec<Frame>,
    java_thread: Option<ObjectRef>,
}

impl Thread {
    pub fn new(vm: Arc<VM>, handle: Arc<ThreadHandle>) -> Self {
        Self {
            vm,
            handle,
            frames: vec![],
            java_thread: None,
        }
    }

    pub fn vm(&self) -> &Arc<VM> {
        &self.vm
    }

    pub fn id(&self) -> ThreadId {
        self.handle.id
    }

    pub fn handle(&self) -> &Arc<ThreadHandle> {
        &self.handle
    }

    pub fn info(&self) -> ThreadInfo {
        ThreadInfo {
            id: self.handle.id,
            name: self.handle.name.clone(),
            daemon: self.handle.daemon,
        }
    }

    pub fn java_thread(&self) -> Option<&ObjectRef> {
        self.java_thread.as_ref()
    }

    pub(crate) fn set_java_thread(&mut self, obj: ObjectRef) {
        self.java_thread = Some(obj);
    }

    /// The guest `java/lang/Thread` for this thread, created on first use.
    /// `None` when the class path has no `java/lang/Thread`.
    pub fn attach(&mut self) -> Result<Option<ObjectRef>, Throwable> {
        if let Some(existing) = &self.java_thread {
            return Ok(Some(existing.clone()));
        }

        let class = match self.initialised_class("java/lang/Thread") {
            Ok(class) => class,
            Err(Throwable::ClassNotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };

        let obj = Instance::new(class)?;
        obj.bind_thread(self.handle.clone())?;

        if obj.has_field("name", "Ljava/lang/String;") {
            let name = self.intern(&self.handle.name.clone())?;
            obj.set_field("name", "Ljava/lang/String;", RuntimeValue::Object(name))?;
        }

        if obj.has_field("daemon", "Z") {
            obj.set_field("daemon", "Z", RuntimeValue::from(self.handle.daemon))?;
        }

        if obj.has_field("threadStatus", "I") {
            obj.set_field("threadStatus", "I", RuntimeValue::Int(THREAD_RUNNABLE))?;
        }

        debug!("Attached guest thread object to \"{}\"", self.handle.name);
        self.java_thread = Some(obj.clone());
        Ok(Some(obj))
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn frame(&self) -> Result<&Frame, Throwable> {
        self.frames
            .last()
            .ok_or_else(|| internal!("no frame on thread {}", self.handle.name))
    }

    pub fn frame_mut(&mut self) -> Result<&mut Frame, Throwable> {
        let name = &self.handle.name;
        self.frames
            .last_mut()
            .ok_or_else(|| internal!("no frame on thread {}", name))
    }

    /// Every frame on the thread, outermost first
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn push_frame(&mut self, mut frame: Frame) -> Result<(), Throwable> {
        if self.frames.len() >= self.vm.config().max_stack {
            return Err(self.throw(VMError::StackOverflowError));
        }

        if frame.info().is_synchronized() {
            let monitor = self.method_monitor(frame.method(), frame.locals().first())?;
            monitor.enter(self.id());
            frame.lock = Some(monitor);
        }

        trace!("Entering {}", frame.method().display_name());
        self.frames.push(frame);
        Ok(())
    }

    pub fn pop_frame(&mut self) -> Option<Frame> {
        let mut frame = self.frames.pop()?;

        while let Some(monitor) = frame.held.pop() {
            warn!(
                "Releasing monitor still entered by {}",
                frame.method().display_name()
            );
            if let Err(e) = monitor.exit(self.id()) {
                warn!("Unbalanced monitor leaving {}: {}", frame.method().display_name(), e);
            }
        }

        if let Some(lock) = &frame.lock {
            if let Err(e) = lock.exit(self.id()) {
                warn!(
                    "Unbalanced monitor leaving {}: {}",
                    frame.method().display_name(),
                    e
                );
            }
        }

        Some(frame)
    }

    fn unwind_to(&mut self, base: usize) {
        while self.frames.len() > base {
            self.pop_frame();
        }
    }

    /// The monitor a synchronized method holds: the receiver's, or the class's when static
    fn method_monitor(
        &self,
        method: &ResolvedMethod,
        receiver: Option<&RuntimeValue>,
    ) -> Result<Monitor, Throwable> {
        if method.info().is_static() {
            return Ok(method.class.monitor().clone());
        }

        match receiver {
            Some(RuntimeValue::Object(obj)) => Ok(obj.monitor().clone()),
            _ => Err(internal!(
                "synchronized {} has no receiver",
                method.display_name()
            )),
        }
    }

    /// Invoke from an instruction. Natives run inline and push their result,
    /// bytecode methods get a frame the run loop picks up.
    pub fn call(&mut self, method: ResolvedMethod, args: Vec<RuntimeValue>) -> Result<Progression, Throwable> {
        let info = method.info();

        if info.is_native() {
            if let Some(value) = self.call_native(&method, args)? {
                self.frame_mut()?.push(value);
            }

            return Ok(Progression::Next);
        }

        if info.is_abstract() {
            return Err(self.throw(VMError::AbstractMethodError {
                method: method.display_name(),
            }));
        }

        let frame = Frame::new(method, args)?;
        self.push_frame(frame)?;

        Ok(Progression::Next)
    }

    fn call_native(
        &mut self,
        method: &ResolvedMethod,
        args: Vec<RuntimeValue>,
    ) -> Result<Option<RuntimeValue>, Throwable> {
        trace!("Native call to {}", method.display_name());

        let lock = if method.info().is_synchronized() {
            let monitor = self.method_monitor(method, args.first())?;
            monitor.enter(self.id());
            Some(monitor)
        } else {
            None
        };

        let vm = self.vm.clone();
        let result = vm.natives().dispatch(self, method, args);

        if let Some(lock) = lock {
            if let Err(e) = lock.exit(self.id()) {
                warn!("Unbalanced monitor leaving native {}: {}", method.display_name(), e);
            }
        }

        result
    }

    /// Run `method` to completion on this thread, nested inside whatever is
    /// already executing. Guest exceptions come back as `Outcome::Threw`.
    pub fn invoke(&mut self, method: ResolvedMethod, args: Vec<RuntimeValue>) -> Result<Outcome, Throwable> {
        let result = if method.info().is_native() {
            self.call_native(&method, args).map(Outcome::Returned)
        } else if method.info().is_abstract() {
            Err(self.throw(VMError::AbstractMethodError {
                method: method.display_name(),
            }))
        } else {
            let base = self.frames.len();
            Frame::new(method, args)
                .and_then(|frame| self.push_frame(frame))
                .and_then(|_| self.run(base))
        };

        match result {
            Err(Throwable::Runtime(exception)) => Ok(Outcome::Threw(exception.obj)),
            other => other,
        }
    }

    /// Execute until the frame stack is back to `base` frames
    pub fn run(&mut self, base: usize) -> Result<Outcome, Throwable> {
        let mut result = None;

        while self.frames.len() > base {
            let progression = match self.step() {
                Ok(progression) => progression,
                Err(Throwable::Runtime(exception)) => Progression::Throw(exception.obj),
                Err(e) => {
                    self.unwind_to(base);
                    return Err(e);
                }
            };

            match progression {
                Progression::Next => {}
                Progression::JumpRel(offset) => {
                    let frame = self.frame_mut()?;
                    frame.pc = branch_target(frame.instruction_pc as i64 + offset as i64)?;
                }
                Progression::Return(value) => {
                    self.pop_frame();

                    if self.frames.len() > base {
                        if let Some(value) = value {
                            self.frame_mut()?.push(value);
                        }
                    } else {
                        result = value;
                    }
                }
                Progression::Throw(exception) => {
                    if let Some(uncaught) = self.unwind(exception, base)? {
                        return Ok(Outcome::Threw(uncaught));
                    }
                }
            }
        }

        Ok(Outcome::Returned(result))
    }

    fn step(&mut self) -> Result<Progression, Throwable> {
        let instruction = {
            let frame = self.frame_mut()?;
            let pc = frame.pc;

            let (instruction, consumed) = {
                let code = frame.code()?;
                let mut bytes = code.code.get(pc..).unwrap_or(&[]);
                if bytes.is_empty() {
                    return Err(internal!(
                        "execution ran off the end of {}",
                        frame.method().display_name()
                    ));
                }

                let before = bytes.len();
                let instruction = decode_instruction(&mut bytes, pc)?;
                (instruction, before - bytes.len())
            };

            frame.instruction_pc = pc;
            frame.pc = pc + consumed;
            instruction
        };

        trace!("Executing {:?}", instruction);
        instruction.handle(self)
    }

    /// Find a handler for `exception` between the current frame and `base`.
    /// Returns the exception back if none was found.
    fn unwind(&mut self, exception: ObjectRef, base: usize) -> Result<Option<ObjectRef>, Throwable> {
        while self.frames.len() > base {
            let frame = self.frame_mut()?;

            if let Some(handler) = frame.find_handler(&exception)? {
                debug!(
                    "Caught {} in {} at {}",
                    exception.class().name(),
                    frame.method().display_name(),
                    handler
                );

                frame.operands.clear();
                frame.operands.push(RuntimeValue::Object(exception));
                frame.pc = handler;
                return Ok(None);
            }

            self.pop_frame();
        }

        Ok(Some(exception))
    }

    /// The current stack, innermost frame first
    pub fn stack_trace(&self) -> Vec<TraceElement> {
        self.frames.iter().rev().map(Frame::trace_element).collect()
    }

    /// Allocate the guest exception for `error`. No constructor runs, the
    /// trace and `detailMessage` are filled in directly.
    pub fn make_error(&mut self, error: VMError) -> Result<ObjectRef, Throwable> {
        let class = self.initialised_class(error.class_name())?;
        let obj = Instance::new(class)?;

        if obj.stack_trace().is_some() {
            obj.set_stack_trace(self.stack_trace())?;
        }

        if obj.has_field("detailMessage", "Ljava/lang/String;") {
            let message = self.intern(&error.message())?;
            obj.set_field(
                "detailMessage",
                "Ljava/lang/String;",
                RuntimeValue::Object(message),
            )?;
        }

        Ok(obj)
    }

    /// `make_error` as a ready to return `Throwable`
    pub fn throw(&mut self, error: VMError) -> Throwable {
        let message = format!("{}: {}", error.class_name(), error.message());

        match self.make_error(error) {
            Ok(obj) => Throwable::Runtime(RuntimeException {
                message,
                obj,
                sources: self.stack_trace(),
            }),
            Err(e) => e,
        }
    }

    /// Wrap an existing guest exception object so it can travel as an `Err`
    pub fn rethrow(&self, obj: ObjectRef) -> Throwable {
        Throwable::Runtime(RuntimeException {
            message: describe(&obj),
            obj,
            sources: self.stack_trace(),
        })
    }

    pub fn ensure_initialized(&mut self, name: &str) -> Result<(Arc<Class>, ClassState), Throwable> {
        let vm = self.vm.clone();
        vm.ensure_initialized(self, name)
    }

    /// Load, link and initialize `name`, failing if its initializer failed
    pub fn initialised_class(&mut self, name: &str) -> Result<Arc<Class>, Throwable> {
        let (class, state) = self.ensure_initialized(name)?;

        if state == ClassState::FailedInitialization {
            return Err(Throwable::FailedInitialization(name.to_string()));
        }

        Ok(class)
    }

    pub fn intern(&mut self, value: &str) -> Result<ObjectRef, Throwable> {
        let vm = self.vm.clone();
        vm.interner().intern(self, value)
    }

    pub fn new_array(&mut self, descriptor: &str, values: Vec<RuntimeValue>) -> Result<ObjectRef, Throwable> {
        let class = self.vm.class_loader().for_name(descriptor)?;
        Instance::array_from(class, values)
    }

    pub fn class_mirror(&mut self, class: &Arc<Class>) -> Result<ObjectRef, Throwable> {
        self.vm.class_mirror(class)
    }

    /// Release everything this thread holds and produce its completion record
    pub(crate) fn finish(&mut self, outcome: Result<Outcome, Throwable>) -> crate::executor::ThreadResult {
        let (value, uncaught, error) = match outcome {
            Ok(Outcome::Returned(value)) => (value, None, None),
            Ok(Outcome::Threw(exception)) => {
                error!(
                    "Exception in thread \"{}\" {}",
                    self.handle.name,
                    describe(&exception)
                );

                for element in exception.stack_trace().unwrap_or_default() {
                    error!("    {}", element);
                }

                (None, Some(exception), None)
            }
            Err(e) => {
                error!("Thread \"{}\" aborted: {}", self.handle.name, e);
                (None, None, Some(e))
            }
        };

        self.unwind_to(0);
        self.handle.set_alive(false);

        if let Some(java_thread) = self.java_thread.clone() {
            if java_thread.has_field("threadStatus", "I") {
                if let Err(e) =
                    java_thread.set_field("threadStatus", "I", RuntimeValue::Int(THREAD_TERMINATED))
                {
                    warn!("Could not mark thread terminated: {}", e);
                }
            }

            let monitor = java_thread.monitor();
            monitor.enter(self.id());
            if let Err(e) = monitor.notify_all(self.id()) {
                warn!("Could not wake joiners: {}", e);
            }
            if let Err(e) = monitor.exit(self.id()) {
                warn!("Could not release thread monitor: {}", e);
            }
        }

        debug!("Thread \"{}\" finished", self.handle.name);

        crate::executor::ThreadResult {
            thread: self.info(),
            error,
            uncaught,
            value,
        }
    }
}

fn branch_target(target: i64) -> Result<usize, Throwable> {
    usize::try_from(target).map_err(|_| internal!("branch to negative pc {}", target))
}

/// `ClassName: message` for logs, falling back to the class name alone
pub fn describe(exception: &ObjectRef) -> String {
    let class_name = exception.class().binary_name();

    let message = exception
        .field("detailMessage", "Ljava/lang/String;")
        .ok()
        .and_then(|value| match value {
            RuntimeValue::Object(message) => decode_string(&message).ok(),
            _ => None,
        });

    match message {
        Some(message) => format!("{}: {}", class_name, message),
        None => class_name,
    }
}
