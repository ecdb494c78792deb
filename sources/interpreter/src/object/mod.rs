pub mod class;
pub mod instance;
pub mod interner;
pub mod loader;
pub mod monitor;
pub mod value;
