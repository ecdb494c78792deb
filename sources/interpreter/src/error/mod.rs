use std::fmt;

use classfile::provider::ProviderError;
use thiserror::Error;

use crate::object::value::ObjectRef;

/// Guest exceptions the VM raises on its own behalf
#[derive(Debug, Clone)]
pub enum VMError {
    ArrayIndexOutOfBounds { at: i32, length: usize },
    NullPointerException { ctx: String },
    ClassCastException { from: String, to: String },
    ArithmeticException { ctx: String },
    NegativeArraySize { size: i32 },
    ArrayStoreException { ty: String },
    IllegalMonitorState { ctx: String },
    Interrupted,
    StackOverflowError,
    CloneNotSupported { class: String },
    IllegalArgument { ctx: String },
    IllegalThreadState { ctx: String },
    InstantiationError { class: String },
    AbstractMethodError { method: String },
    IncompatibleClassChange { ctx: String },
}

impl VMError {
    pub fn class_name(&self) -> &'static str {
        match self {
            VMError::ArrayIndexOutOfBounds { .. } => "java/lang/ArrayIndexOutOfBoundsException",
            VMError::NullPointerException { .. } => "java/lang/NullPointerException",
            VMError::ClassCastException { .. } => "java/lang/ClassCastException",
            VMError::ArithmeticException { .. } => "java/lang/ArithmeticException",
            VMError::NegativeArraySize { .. } => "java/lang/NegativeArraySizeException",
            VMError::ArrayStoreException { .. } => "java/lang/ArrayStoreException",
            VMError::IllegalMonitorState { .. } => "java/lang/IllegalMonitorStateException",
            VMError::Interrupted => "java/lang/InterruptedException",
            VMError::StackOverflowError => "java/lang/StackOverflowError",
            VMError::CloneNotSupported { .. } => "java/lang/CloneNotSupportedException",
            VMError::IllegalArgument { .. } => "java/lang/IllegalArgumentException",
            VMError::IllegalThreadState { .. } => "java/lang/IllegalThreadStateException",
            VMError::InstantiationError { .. } => "java/lang/InstantiationError",
            VMError::AbstractMethodError { .. } => "java/lang/AbstractMethodError",
            VMError::IncompatibleClassChange { .. } => "java/lang/IncompatibleClassChangeError",
        }
    }

    pub fn message(&self) -> String {
        match self {
            VMError::ArrayIndexOutOfBounds { at, length } => {
                format!("Index {} out of bounds for length {}", at, length)
            }
            VMError::NullPointerException { ctx } => ctx.clone(),
            VMError::ClassCastException { from, to } => {
                format!("class {} cannot be cast to class {}", from, to)
            }
            VMError::ArithmeticException { ctx } => ctx.clone(),
            VMError::NegativeArraySize { size } => size.to_string(),
            VMError::ArrayStoreException { ty } => ty.clone(),
            VMError::IllegalMonitorState { ctx } => ctx.clone(),
            VMError::Interrupted => "sleep interrupted".to_string(),
            VMError::StackOverflowError => "stack depth exceeded".to_string(),
            VMError::CloneNotSupported { class } => class.clone(),
            VMError::IllegalArgument { ctx } => ctx.clone(),
            VMError::IllegalThreadState { ctx } => ctx.clone(),
            VMError::InstantiationError { class } => class.clone(),
            VMError::AbstractMethodError { method } => method.clone(),
            VMError::IncompatibleClassChange { ctx } => ctx.clone(),
        }
    }
}

#[derive(Error, Debug)]
pub enum Throwable {
    /// A guest exception, the only kind exception tables can catch
    #[error(transparent)]
    Runtime(RuntimeException),

    #[error("class {0} could not be found")]
    ClassNotFound(String),

    #[error("failed to link {class}: {reason}")]
    Linkage { class: String, reason: String },

    #[error("class {0} failed initialization")]
    FailedInitialization(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("native method not found: {0}")]
    NativeNotFound(String),

    #[error("native method {method} failed")]
    Native {
        method: String,
        #[source]
        source: Box<Throwable>,
    },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl Throwable {
    pub fn is_guest(&self) -> bool {
        matches!(self, Throwable::Runtime(_))
    }
}

#[macro_export]
macro_rules! internal {
    ($msg:literal $(,)?) => {
        $crate::Throwable::Internal(anyhow::anyhow!($msg))
    };
    ($err:expr $(,)?) => {
        $crate::Throwable::Internal(anyhow::anyhow!($err))
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::Throwable::Internal(anyhow::anyhow!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! internalise {
    () => {
        |f| $crate::internal!(f)
    };
}

/// One line of a guest stack trace
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub struct TraceElement {
    pub class_name: String,
    pub method_name: String,
    pub source_file: Option<String>,
    pub line: Option<u16>,
}

impl fmt::Display for TraceElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "at {}.{}", self.class_name.replace('/', "."), self.method_name)?;
        match (&self.source_file, self.line) {
            (Some(file), Some(line)) => write!(f, "({}:{})", file, line),
            (Some(file), None) => write!(f, "({})", file),
            (None, _) => write!(f, "(Unknown Source)"),
        }
    }
}

#[derive(Error)]
#[error("{message}")]
pub struct RuntimeException {
    pub message: String,
    pub obj: ObjectRef,
    pub sources: Vec<TraceElement>,
}

impl fmt::Debug for RuntimeException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeException")
            .field("message", &self.message)
            .field("ty", &self.obj.class().name())
            .field("sources", &self.sources)
            .finish()
    }
}
