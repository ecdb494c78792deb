pub mod bytecode;
pub mod config;
pub mod error;
pub mod executor;
pub mod frame;
pub mod native;
pub mod object;
pub mod thread;
pub mod vm;

pub use config::Config;
pub use error::{Throwable, VMError};
pub use executor::ThreadResult;
pub use object::value::{ObjectRef, RuntimeValue};
pub use thread::{Outcome, Thread, ThreadInfo};
pub use vm::VM;
