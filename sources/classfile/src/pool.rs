use anyhow::{anyhow, Result};
use enum_as_inner::EnumAsInner;

/// A decoded constant pool. Indices are 1-based, slot 0 is reserved, and the
/// slot after every long or double is reserved too, matching the class file layout.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantPool {
    entries: Vec<ConstantEntry>,
}

impl Default for ConstantPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstantPool {
    pub fn new() -> Self {
        Self {
            entries: vec![ConstantEntry::Reserved],
        }
    }

    /// Append an entry, returning the index it was stored at
    pub fn insert(&mut self, entry: ConstantEntry) -> u16 {
        let index = self.entries.len() as u16;
        let wide = matches!(entry, ConstantEntry::Long(_) | ConstantEntry::Double(_));

        self.entries.push(entry);
        if wide {
            self.entries.push(ConstantEntry::Reserved);
        }

        index
    }

    /// Reuse an equal entry if one exists, otherwise insert it
    pub fn intern(&mut self, entry: ConstantEntry) -> u16 {
        match self.entries.iter().position(|e| *e == entry) {
            Some(index) if entry != ConstantEntry::Reserved => index as u16,
            _ => self.insert(entry),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }

    pub fn get(&self, index: u16) -> Result<&ConstantEntry> {
        match self.entries.get(index as usize) {
            Some(ConstantEntry::Reserved) | None => {
                Err(anyhow!("no usable constant pool entry at {index}"))
            }
            Some(entry) => Ok(entry),
        }
    }

    pub fn class_name(&self, index: u16) -> Result<&str> {
        let entry = self.get(index)?;
        entry
            .as_class()
            .map(|c| c.name.as_str())
            .ok_or_else(|| anyhow!("entry {index} is not a class, got {entry:?}"))
    }

    pub fn utf8(&self, index: u16) -> Result<&str> {
        let entry = self.get(index)?;
        entry
            .as_utf8()
            .map(|s| s.as_str())
            .ok_or_else(|| anyhow!("entry {index} is not utf8, got {entry:?}"))
    }

    pub fn field(&self, index: u16) -> Result<&ConstantMember> {
        let entry = self.get(index)?;
        entry
            .as_field()
            .ok_or_else(|| anyhow!("entry {index} is not a field ref, got {entry:?}"))
    }

    /// Resolves both class and interface method refs
    pub fn method(&self, index: u16) -> Result<&ConstantMember> {
        match self.get(index)? {
            ConstantEntry::Method(member) | ConstantEntry::InterfaceMethod(member) => Ok(member),
            entry => Err(anyhow!("entry {index} is not a method ref, got {entry:?}")),
        }
    }
}

#[derive(EnumAsInner, Debug, Clone, PartialEq)]
pub enum ConstantEntry {
    Utf8(String),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class(ConstantClass),
    String(ConstantString),
    Field(ConstantMember),
    Method(ConstantMember),
    InterfaceMethod(ConstantMember),
    NameAndType(ConstantNameAndType),
    Reserved,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstantClass {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstantString {
    pub string: String,
}

/// A field, method or interface method reference, already resolved through
/// its class and name-and-type entries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstantMember {
    pub class: String,
    pub name: String,
    pub descriptor: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstantNameAndType {
    pub name: String,
    pub descriptor: String,
}
