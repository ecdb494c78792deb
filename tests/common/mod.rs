#![allow(dead_code)]

use std::sync::Arc;

use classfile::{
    builder::ClassBuilder,
    classfile::ClassDescriptor,
    flags::MethodAccessFlags,
    provider::MemoryProvider,
};
use interpreter::{
    native::NativeFunction,
    object::interner::decode_string,
    thread::describe,
    Config, ObjectRef, RuntimeValue, ThreadResult, VM,
};
use parking_lot::Mutex;
use tracing::Level;
use tracing_subscriber::fmt;

pub mod jdk;

pub const PROBE: &str = "test/Probe";

/// A VM over `java_base` plus the classes of one test, with the probe natives attached
pub struct TestVm {
    pub vm: Arc<VM>,
    captures: Arc<Mutex<Vec<RuntimeValue>>>,
}

#[derive(Clone, Debug)]
pub struct CapturedOutput {
    cursor: usize,
    values: Vec<RuntimeValue>,
}

impl CapturedOutput {
    pub fn get(&self, index: usize) -> RuntimeValue {
        self.values
            .get(index)
            .cloned()
            .expect("index to be in range")
    }

    pub fn next(&mut self) -> RuntimeValue {
        let cr = self.cursor;
        self.cursor += 1;
        self.values.get(cr).cloned().expect("another capture")
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn values(&self) -> &[RuntimeValue] {
        &self.values
    }
}

fn init_tracing() {
    let format = fmt::format()
        .without_time()
        .with_level(true)
        .with_target(false)
        .with_thread_names(true)
        .compact();

    let _ = tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .event_format(format)
        .with_test_writer()
        .try_init();
}

/// `test/Probe`, whose natives let guest code report back to the test
fn probe_class() -> ClassDescriptor {
    let flags = MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC;
    let mut class = ClassBuilder::new(PROBE);
    class
        .native_method("capture", "(I)V", flags)
        .native_method("capture", "(J)V", flags)
        .native_method("capture", "(D)V", flags)
        .native_method("capture", "(Ljava/lang/Object;)V", flags)
        .native_method("depth", "()I", flags);

    class.build()
}

pub fn make_vm(classes: impl IntoIterator<Item = ClassDescriptor>) -> TestVm {
    make_vm_with(Config::default(), classes)
}

pub fn make_vm_with(config: Config, classes: impl IntoIterator<Item = ClassDescriptor>) -> TestVm {
    init_tracing();

    let provider = MemoryProvider::with_classes(
        jdk::java_base()
            .into_iter()
            .chain(std::iter::once(probe_class()))
            .chain(classes),
    );

    let config = config.with_thread_stack_size(1024 * 1024 * 4);
    let vm = VM::initialize(config, provider).expect("vm to initialize");

    let captures = Arc::new(Mutex::new(vec![]));
    for descriptor in ["(I)V", "(J)V", "(D)V", "(Ljava/lang/Object;)V"] {
        let captures = captures.clone();
        vm.natives()
            .register(
                PROBE,
                "capture",
                descriptor,
                NativeFunction::from_static(move |_, _, args| {
                    let value = args.first().cloned().expect("capture arg to be passed");
                    captures.lock().push(value);
                    Ok(None)
                }),
            )
            .expect("probe to register");
    }

    // Operands of the caller, which is the frame on top while a native runs
    vm.natives()
        .register(
            PROBE,
            "depth",
            "()I",
            NativeFunction::from_static(|thread, _, _| {
                let depth = thread.frame()?.operands().len();
                Ok(Some(RuntimeValue::Int(depth as i32)))
            }),
        )
        .expect("probe to register");

    TestVm { vm, captures }
}

impl TestVm {
    pub fn captures(&self) -> CapturedOutput {
        CapturedOutput {
            cursor: 0,
            values: self.captures.lock().clone(),
        }
    }

    /// Run the static `class.method` on a fresh thread and wait for every
    /// non-daemon thread to finish. Returns the record of that thread.
    pub fn run(&self, class: &str, method: &str, descriptor: &str, args: Vec<RuntimeValue>) -> ThreadResult {
        let info = self
            .vm
            .start_thread("test", false, class, method, descriptor, args)
            .expect("thread to start");

        finish(&self.vm)
            .into_iter()
            .find(|result| result.thread.id == info.id)
            .expect("a record for the test thread")
    }

    /// `class.runTest()V`, which must complete normally
    pub fn execute_test(&self, class: &str) -> CapturedOutput {
        let result = self.run(class, "runTest", "()V", vec![]);
        let captures = self.captures();

        if !result.is_success() {
            eprintln!("Execution failed:");
            if let Some(error) = &result.error {
                eprintln!("{:#?}", error);
            }
            if let Some(exception) = &result.uncaught {
                eprintln!("Uncaught {}", describe(exception));
            }
            eprintln!("Captures:");
            for capture in captures.values() {
                match capture {
                    RuntimeValue::Object(o) if o.class().name() == "java/lang/String" => {
                        eprintln!("{:?}", decode_string(o).unwrap_or_default());
                    }
                    v => eprintln!("{:?}", v),
                }
            }
            panic!("{} did not complete", class);
        }

        captures
    }
}

/// Every completion record, once no non-daemon thread is left
pub fn finish(vm: &VM) -> Vec<ThreadResult> {
    vm.completions().collect()
}

/// The class name of what `result` threw out of its entry method
#[track_caller]
pub fn uncaught_class(result: &ThreadResult) -> String {
    let exception = result
        .uncaught
        .as_ref()
        .unwrap_or_else(|| panic!("expected an uncaught exception, got {:?}", result));

    exception.class().name().to_string()
}

#[track_caller]
pub fn message_of(exception: &ObjectRef) -> Option<String> {
    match exception.field("detailMessage", "Ljava/lang/String;").expect("a throwable") {
        RuntimeValue::Object(message) => Some(decode_string(&message).expect("a string")),
        _ => None,
    }
}

#[track_caller]
pub fn iassert_eq(lhs: i64, rhs: RuntimeValue) {
    let val = match rhs {
        RuntimeValue::Int(v) => v as i64,
        RuntimeValue::Long(v) => v,
        other => panic!("{:?} was not an integral", other),
    };
    assert_eq!(lhs, val);
}

#[track_caller]
pub fn dassert_eq(lhs: f64, rhs: RuntimeValue) {
    let val = match rhs {
        RuntimeValue::Float(v) => v as f64,
        RuntimeValue::Double(v) => v,
        other => panic!("{:?} was not a floating value", other),
    };
    assert_eq!(lhs, val);
}

#[track_caller]
pub fn sassert_eq(lhs: impl Into<String>, rhs: RuntimeValue) {
    let val = object(rhs);
    let str_val = decode_string(&val).expect("could not decode string");

    assert_eq!(lhs.into(), str_val);
}

#[track_caller]
pub fn object(val: RuntimeValue) -> ObjectRef {
    match val {
        RuntimeValue::Object(obj) => obj,
        other => panic!("{:?} was not an object", other),
    }
}

#[track_caller]
pub fn assert_null(val: RuntimeValue) {
    assert!(matches!(val, RuntimeValue::Null), "{:?} was not null", val);
}
