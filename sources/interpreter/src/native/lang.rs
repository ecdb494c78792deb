use std::{
    sync::OnceLock,
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

use tracing::debug;

use super::{NameAndDescriptor, NativeFunction, NativeModule};
use crate::{
    error::{Throwable, TraceElement, VMError},
    instance_method, internal, native_arg,
    object::{
        instance::{identity_hash, Instance},
        interner::decode_string,
        monitor::{MonitorError, WaitOutcome},
        value::{ObjectRef, RuntimeValue},
    },
    static_method,
    thread::{Thread, THREAD_RUNNABLE},
};

fn illegal_monitor(thread: &mut Thread, error: MonitorError) -> Throwable {
    thread.throw(VMError::IllegalMonitorState {
        ctx: error.to_string(),
    })
}

fn null_check(thread: &mut Thread, value: Option<ObjectRef>, what: &str) -> Result<ObjectRef, Throwable> {
    match value {
        Some(obj) => Ok(obj),
        None => Err(thread.throw(VMError::NullPointerException {
            ctx: format!("{} was null", what),
        })),
    }
}

pub struct LangObject;
impl NativeModule for LangObject {
    fn classname(&self) -> &'static str {
        "java/lang/Object"
    }

    fn methods(&self) -> Vec<(NameAndDescriptor, NativeFunction)> {
        vec![
            static_method!(name: "registerNatives", descriptor: "()V" => |_, _, _| Ok(None)),
            instance_method!(name: "hashCode", descriptor: "()I" => |_, this, _| {
                Ok(Some(RuntimeValue::Int(identity_hash(&this))))
            }),
            instance_method!(name: "getClass", descriptor: "()Ljava/lang/Class;" => |thread, this, _| {
                let mirror = thread.class_mirror(this.class())?;
                Ok(Some(RuntimeValue::Object(mirror)))
            }),
            instance_method!(name: "clone", descriptor: "()Ljava/lang/Object;" => |thread, this, _| {
                let class = this.class();
                if !class.is_array() && !class.is_instance_of("java/lang/Cloneable") {
                    return Err(thread.throw(VMError::CloneNotSupported {
                        class: class.binary_name(),
                    }));
                }

                Ok(Some(RuntimeValue::Object(this.shallow_clone()?)))
            }),
            instance_method!(name: "wait", descriptor: "(J)V" => |thread, this, args| {
                let millis = native_arg!(args, 0 => long);
                if millis < 0 {
                    return Err(thread.throw(VMError::IllegalArgument {
                        ctx: "timeout value is negative".to_string(),
                    }));
                }

                let timeout = (millis > 0).then(|| Duration::from_millis(millis as u64));
                let handle = thread.handle().clone();

                match this.monitor().wait(thread.id(), timeout, handle.interrupt()) {
                    Ok(WaitOutcome::Interrupted) => Err(thread.throw(VMError::Interrupted)),
                    Ok(_) => Ok(None),
                    Err(e) => Err(illegal_monitor(thread, e)),
                }
            }),
            instance_method!(name: "notify", descriptor: "()V" => |thread, this, _| {
                match this.monitor().notify(thread.id()) {
                    Ok(()) => Ok(None),
                    Err(e) => Err(illegal_monitor(thread, e)),
                }
            }),
            instance_method!(name: "notifyAll", descriptor: "()V" => |thread, this, _| {
                match this.monitor().notify_all(thread.id()) {
                    Ok(()) => Ok(None),
                    Err(e) => Err(illegal_monitor(thread, e)),
                }
            }),
        ]
    }
}

pub struct LangClass;
impl NativeModule for LangClass {
    fn classname(&self) -> &'static str {
        "java/lang/Class"
    }

    fn methods(&self) -> Vec<(NameAndDescriptor, NativeFunction)> {
        fn mirrored(this: &ObjectRef) -> Result<std::sync::Arc<crate::object::class::Class>, Throwable> {
            this.mirrored_class()
                .ok_or_else(|| internal!("{:?} does not mirror a class", this))
        }

        vec![
            static_method!(name: "registerNatives", descriptor: "()V" => |_, _, _| Ok(None)),
            static_method!(name: "desiredAssertionStatus0", descriptor: "(Ljava/lang/Class;)Z" => |_, _, _| {
                Ok(Some(RuntimeValue::from(false)))
            }),
            instance_method!(name: "isInterface", descriptor: "()Z" => |_, this, _| {
                Ok(Some(RuntimeValue::from(mirrored(&this)?.is_interface())))
            }),
            instance_method!(name: "isArray", descriptor: "()Z" => |_, this, _| {
                Ok(Some(RuntimeValue::from(mirrored(&this)?.is_array())))
            }),
        ]
    }
}

fn array_or_store_error(thread: &mut Thread, obj: &ObjectRef) -> Result<(), Throwable> {
    if obj.is_array() {
        return Ok(());
    }

    Err(thread.throw(VMError::ArrayStoreException {
        ty: format!("arraycopy: {} is not an array", obj.class().binary_name()),
    }))
}

fn arraycopy(thread: &mut Thread, args: Vec<RuntimeValue>) -> Result<Option<RuntimeValue>, Throwable> {
    let src = native_arg!(args, 0 => Object);
    let src_pos = native_arg!(args, 1 => int);
    let dest = native_arg!(args, 2 => Object);
    let dest_pos = native_arg!(args, 3 => int);
    let length = native_arg!(args, 4 => int);

    let src = null_check(thread, src, "arraycopy source")?;
    let dest = null_check(thread, dest, "arraycopy destination")?;
    array_or_store_error(thread, &src)?;
    array_or_store_error(thread, &dest)?;

    let (src_component, dest_component) = match (src.array_component(), dest.array_component()) {
        (Some(src), Some(dest)) => (src.clone(), dest.clone()),
        _ => return Err(internal!("array classes without components")),
    };

    // Primitive arrays only copy into the same primitive type
    if (!src_component.is_reference() || !dest_component.is_reference()) && src_component != dest_component {
        return Err(thread.throw(VMError::ArrayStoreException {
            ty: format!(
                "arraycopy: type mismatch: can not copy {} into {}",
                src.class().binary_name(),
                dest.class().binary_name()
            ),
        }));
    }

    let src_len = src.array_length()?;
    let dest_len = dest.array_length()?;

    for (pos, len) in [(src_pos, src_len), (dest_pos, dest_len)] {
        if pos < 0 || length < 0 || pos as i64 + length as i64 > len as i64 {
            let at = if pos < 0 || length < 0 { pos.min(length) } else { pos.saturating_add(length) };
            return Err(thread.throw(VMError::ArrayIndexOutOfBounds { at, length: len }));
        }
    }

    let (src_pos, dest_pos, length) = (src_pos as usize, dest_pos as usize, length as usize);

    // Copied out first, which also covers src and dest being the same array
    let values: Vec<RuntimeValue> = src.array()?.read()[src_pos..src_pos + length].to_vec();

    if let Some(expected) = dest_component.class_name() {
        if let Some(bad) = values.iter().find_map(|value| match value {
            RuntimeValue::Object(obj) if !obj.class().is_instance_of(&expected) => Some(obj.clone()),
            _ => None,
        }) {
            return Err(thread.throw(VMError::ArrayStoreException {
                ty: format!(
                    "arraycopy: element type {} does not match {}",
                    bad.class().binary_name(),
                    dest.class().binary_name()
                ),
            }));
        }
    }

    dest.array()?.write()[dest_pos..dest_pos + length].clone_from_slice(&values);
    Ok(None)
}

fn nano_base() -> Instant {
    static BASE: OnceLock<Instant> = OnceLock::new();
    *BASE.get_or_init(Instant::now)
}

pub struct LangSystem;
impl NativeModule for LangSystem {
    fn classname(&self) -> &'static str {
        "java/lang/System"
    }

    fn methods(&self) -> Vec<(NameAndDescriptor, NativeFunction)> {
        vec![
            static_method!(name: "registerNatives", descriptor: "()V" => |_, _, _| Ok(None)),
            static_method!(name: "arraycopy", descriptor: "(Ljava/lang/Object;ILjava/lang/Object;II)V" => |thread, _, args| {
                arraycopy(thread, args)
            }),
            static_method!(name: "currentTimeMillis", descriptor: "()J" => |_, _, _| {
                let now = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map_err(|e| internal!(e))?;

                Ok(Some(RuntimeValue::Long(now.as_millis() as i64)))
            }),
            static_method!(name: "nanoTime", descriptor: "()J" => |_, _, _| {
                Ok(Some(RuntimeValue::Long(nano_base().elapsed().as_nanos() as i64)))
            }),
            static_method!(name: "identityHashCode", descriptor: "(Ljava/lang/Object;)I" => |_, _, args| {
                let hash = native_arg!(args, 0 => Object).map_or(0, |obj| identity_hash(&obj));
                Ok(Some(RuntimeValue::Int(hash)))
            }),
        ]
    }
}

/// `Thread.start0`: bind a fresh VM thread to the guest object and run its `run()V` there
fn start(thread: &mut Thread, this: ObjectRef) -> Result<Option<RuntimeValue>, Throwable> {
    if this.thread_handle().is_some() {
        return Err(thread.throw(VMError::IllegalThreadState {
            ctx: "thread already started".to_string(),
        }));
    }

    let vm = thread.vm().clone();

    let daemon = this.has_field("daemon", "Z")
        && matches!(this.field("daemon", "Z")?, RuntimeValue::Int(flag) if flag != 0);

    let name = if this.has_field("name", "Ljava/lang/String;") {
        match this.field("name", "Ljava/lang/String;")? {
            RuntimeValue::Object(name) => Some(decode_string(&name)?),
            _ => None,
        }
    } else {
        None
    };

    let handle = vm.new_thread_handle(name, daemon);
    this.bind_thread(handle.clone())?;

    if this.has_field("threadStatus", "I") {
        this.set_field("threadStatus", "I", RuntimeValue::Int(THREAD_RUNNABLE))?;
    }

    let run = this
        .class()
        .resolve_method("run", "()V")
        .ok_or_else(|| internal!("{} has no run()V", this.class().name()))?;

    debug!("Starting guest thread \"{}\"", handle.name());

    let target = this.clone();
    vm.spawn(handle, move |thread| {
        thread.set_java_thread(target.clone());
        thread.invoke(run, vec![RuntimeValue::Object(target)])
    })?;

    Ok(None)
}

pub struct LangThread;
impl NativeModule for LangThread {
    fn classname(&self) -> &'static str {
        "java/lang/Thread"
    }

    fn methods(&self) -> Vec<(NameAndDescriptor, NativeFunction)> {
        vec![
            static_method!(name: "registerNatives", descriptor: "()V" => |_, _, _| Ok(None)),
            static_method!(name: "currentThread", descriptor: "()Ljava/lang/Thread;" => |thread, _, _| {
                let current = thread
                    .attach()?
                    .ok_or_else(|| internal!("java/lang/Thread is not loadable"))?;

                Ok(Some(RuntimeValue::Object(current)))
            }),
            instance_method!(name: "start0", descriptor: "()V" => |thread, this, _| start(thread, this)),
            instance_method!(name: "isAlive", descriptor: "()Z" => |_, this, _| {
                let alive = this.thread_handle().map_or(false, |handle| handle.is_alive());
                Ok(Some(RuntimeValue::from(alive)))
            }),
            instance_method!(name: "interrupt0", descriptor: "()V" => |_, this, _| {
                if let Some(handle) = this.thread_handle() {
                    handle.interrupt().raise();
                }

                Ok(None)
            }),
            instance_method!(name: "isInterrupted", descriptor: "(Z)Z" => |_, this, args| {
                let clear = native_arg!(args, 0 => int) != 0;
                let interrupted = match this.thread_handle() {
                    Some(handle) if clear => handle.interrupt().take(),
                    Some(handle) => handle.interrupt().is_set(),
                    None => false,
                };

                Ok(Some(RuntimeValue::from(interrupted)))
            }),
            static_method!(name: "sleep", descriptor: "(J)V" => |thread, _, args| {
                let millis = native_arg!(args, 0 => long);
                if millis < 0 {
                    return Err(thread.throw(VMError::IllegalArgument {
                        ctx: "timeout value is negative".to_string(),
                    }));
                }

                let handle = thread.handle().clone();
                if handle.interrupt().sleep(Duration::from_millis(millis as u64)) {
                    return Err(thread.throw(VMError::Interrupted));
                }

                Ok(None)
            }),
            static_method!(name: "yield", descriptor: "()V" => |_, _, _| {
                std::thread::yield_now();
                Ok(None)
            }),
            instance_method!(name: "setPriority0", descriptor: "(I)V" => |_, _, _| Ok(None)),
            static_method!(name: "holdsLock", descriptor: "(Ljava/lang/Object;)Z" => |thread, _, args| {
                let obj = native_arg!(args, 0 => Object);
                let obj = null_check(thread, obj, "holdsLock argument")?;

                Ok(Some(RuntimeValue::from(obj.monitor().holds(thread.id()))))
            }),
        ]
    }
}

/// The trace for a throwable being filled in: the current stack, minus the
/// frames that are building the throwable itself
fn trace_for(thread: &Thread, throwable: &ObjectRef) -> Vec<TraceElement> {
    thread
        .stack_trace()
        .into_iter()
        .skip_while(|element| element.method_name == "fillInStackTrace")
        .skip_while(|element| {
            element.method_name == "<init>" && throwable.class().is_instance_of(&element.class_name)
        })
        .collect()
}

fn stack_trace_element(thread: &mut Thread, element: &TraceElement) -> Result<ObjectRef, Throwable> {
    let class = thread.initialised_class("java/lang/StackTraceElement")?;
    let obj = Instance::new(class)?;

    let binary_name = element.class_name.replace('/', ".");
    let strings = [
        ("declaringClass", Some(binary_name.as_str())),
        ("methodName", Some(element.method_name.as_str())),
        ("fileName", element.source_file.as_deref()),
    ];

    for (field, value) in strings {
        if let (Some(value), true) = (value, obj.has_field(field, "Ljava/lang/String;")) {
            let string = thread.intern(value)?;
            obj.set_field(field, "Ljava/lang/String;", RuntimeValue::Object(string))?;
        }
    }

    if obj.has_field("lineNumber", "I") {
        let line = element.line.map_or(-1, i32::from);
        obj.set_field("lineNumber", "I", RuntimeValue::Int(line))?;
    }

    Ok(obj)
}

pub struct LangThrowable;
impl NativeModule for LangThrowable {
    fn classname(&self) -> &'static str {
        "java/lang/Throwable"
    }

    fn methods(&self) -> Vec<(NameAndDescriptor, NativeFunction)> {
        vec![
            instance_method!(name: "fillInStackTrace", descriptor: "(I)Ljava/lang/Throwable;" => |thread, this, _| {
                this.set_stack_trace(trace_for(thread, &this))?;
                Ok(Some(RuntimeValue::Object(this)))
            }),
            instance_method!(name: "getStackTraceDepth", descriptor: "()I" => |_, this, _| {
                let depth = this.stack_trace().map_or(0, |trace| trace.len());
                Ok(Some(RuntimeValue::Int(depth as i32)))
            }),
            instance_method!(name: "getStackTraceElement", descriptor: "(I)Ljava/lang/StackTraceElement;" => |thread, this, args| {
                let index = native_arg!(args, 0 => int);
                let trace = this.stack_trace().unwrap_or_default();

                let element = match usize::try_from(index).ok().and_then(|i| trace.get(i)) {
                    Some(element) => element,
                    None => {
                        return Err(thread.throw(VMError::ArrayIndexOutOfBounds {
                            at: index,
                            length: trace.len(),
                        }))
                    }
                };

                Ok(Some(RuntimeValue::Object(stack_trace_element(thread, element)?)))
            }),
        ]
    }
}

pub struct LangRuntime;
impl NativeModule for LangRuntime {
    fn classname(&self) -> &'static str {
        "java/lang/Runtime"
    }

    fn methods(&self) -> Vec<(NameAndDescriptor, NativeFunction)> {
        vec![instance_method!(name: "availableProcessors", descriptor: "()I" => |_, _, _| {
            let count = std::thread::available_parallelism().map_or(1, |n| n.get());
            Ok(Some(RuntimeValue::Int(count as i32)))
        })]
    }
}

pub struct LangString;
impl NativeModule for LangString {
    fn classname(&self) -> &'static str {
        "java/lang/String"
    }

    fn methods(&self) -> Vec<(NameAndDescriptor, NativeFunction)> {
        vec![instance_method!(name: "intern", descriptor: "()Ljava/lang/String;" => |thread, this, _| {
            let interned = thread.vm().interner().intern_object(this)?;
            Ok(Some(RuntimeValue::Object(interned)))
        })]
    }
}
