pub mod attributes;
pub mod builder;
pub mod classfile;
pub mod flags;
pub mod opcode;
pub mod pool;
pub mod provider;
