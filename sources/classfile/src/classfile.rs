use anyhow::Result;
use support::descriptor::{FieldType, MethodType};

use crate::{
    attributes::{Attribute, CodeAttribute, ConstantValue},
    flags::{ClassAccessFlags, FieldAccessFlags, MethodAccessFlags},
    pool::ConstantPool,
};

/// A class as handed over by a descriptor provider. Everything is already
/// decoded, the runtime never sees class file bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassDescriptor {
    pub name: String,
    pub super_class: Option<String>,
    pub interfaces: Vec<String>,
    pub access_flags: ClassAccessFlags,
    pub constant_pool: ConstantPool,
    pub fields: Vec<FieldInfo>,
    pub methods: Vec<MethodInfo>,
    pub attributes: Vec<Attribute>,
    pub source_file: Option<String>,
}

impl ClassDescriptor {
    /// The descriptor of a synthetic array class, which has no members of its own
    pub fn array(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            super_class: Some("java/lang/Object".to_string()),
            interfaces: vec![],
            access_flags: ClassAccessFlags::PUBLIC | ClassAccessFlags::FINAL,
            constant_pool: ConstantPool::new(),
            fields: vec![],
            methods: vec![],
            attributes: vec![],
            source_file: None,
        }
    }

    pub fn is_interface(&self) -> bool {
        self.access_flags.contains(ClassAccessFlags::INTERFACE)
    }

    pub fn is_abstract(&self) -> bool {
        self.access_flags.contains(ClassAccessFlags::ABSTRACT)
    }

    pub fn find_field(&self, name: &str, descriptor: &str) -> Option<(usize, &FieldInfo)> {
        self.fields
            .iter()
            .enumerate()
            .find(|(_, f)| f.name == name && f.descriptor == descriptor)
    }

    pub fn find_method(&self, name: &str, descriptor: &str) -> Option<(usize, &MethodInfo)> {
        self.methods
            .iter()
            .enumerate()
            .find(|(_, m)| m.name == name && m.descriptor == descriptor)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldInfo {
    pub name: String,
    pub descriptor: String,
    pub flags: FieldAccessFlags,
    pub constant_value: Option<ConstantValue>,
    pub attributes: Vec<Attribute>,
}

impl FieldInfo {
    pub fn is_static(&self) -> bool {
        self.flags.contains(FieldAccessFlags::STATIC)
    }

    pub fn field_type(&self) -> Result<FieldType> {
        FieldType::parse(&self.descriptor)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodInfo {
    pub name: String,
    pub descriptor: String,
    pub flags: MethodAccessFlags,
    pub code: Option<CodeAttribute>,
    pub attributes: Vec<Attribute>,
}

impl MethodInfo {
    pub fn is_static(&self) -> bool {
        self.flags.contains(MethodAccessFlags::STATIC)
    }

    pub fn is_native(&self) -> bool {
        self.flags.contains(MethodAccessFlags::NATIVE)
    }

    pub fn is_abstract(&self) -> bool {
        self.flags.contains(MethodAccessFlags::ABSTRACT)
    }

    pub fn is_synchronized(&self) -> bool {
        self.flags.contains(MethodAccessFlags::SYNCHRONIZED)
    }

    pub fn method_type(&self) -> Result<MethodType> {
        MethodType::parse(&self.descriptor)
    }
}
