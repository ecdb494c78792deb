use std::collections::HashMap;

use parking_lot::Mutex;
use support::encoding::{decode_chars, decode_string as decode_bytes, encode_chars, encode_string, CompactEncoding};

use super::{
    instance::Instance,
    value::{ObjectRef, RuntimeValue},
};
use crate::{error::Throwable, internal, internalise, thread::Thread};

/// The pool of interned strings. Equal contents give the identical object.
#[derive(Debug, Default)]
pub struct StringInterner {
    strings: Mutex<HashMap<String, ObjectRef>>,
}

impl StringInterner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&self, thread: &mut Thread, value: &str) -> Result<ObjectRef, Throwable> {
        if let Some(existing) = self.strings.lock().get(value) {
            return Ok(existing.clone());
        }

        // Creating the string may run String's initializer, so no lock is held here
        let created = new_string(thread, value)?;

        let mut strings = self.strings.lock();
        Ok(strings
            .entry(value.to_string())
            .or_insert(created)
            .clone())
    }

    /// Intern an existing string object, as `String.intern` does
    pub fn intern_object(&self, obj: ObjectRef) -> Result<ObjectRef, Throwable> {
        let value = decode_string(&obj)?;
        if let Some(existing) = self.strings.lock().get(&value) {
            return Ok(existing.clone());
        }

        let mut strings = self.strings.lock();
        Ok(strings.entry(value).or_insert(obj).clone())
    }

    pub fn len(&self) -> usize {
        self.strings.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.lock().is_empty()
    }
}

/// A fresh, uninterned `java/lang/String`. Works with both the `char[]` layout
/// and the compact `byte[]` + `coder` layout.
pub fn new_string(thread: &mut Thread, value: &str) -> Result<ObjectRef, Throwable> {
    let class = thread.initialised_class("java/lang/String")?;
    let string = Instance::new(class)?;

    if string.has_field("value", "[C") {
        let chars = encode_chars(value)
            .into_iter()
            .map(RuntimeValue::from)
            .collect();

        let array = thread.new_array("[C", chars)?;
        string.set_field("value", "[C", RuntimeValue::Object(array))?;
    } else if string.has_field("value", "[B") {
        let (encoding, bytes) = encode_string(value).map_err(internalise!())?;
        let bytes = bytes
            .into_iter()
            .map(|b| RuntimeValue::Int(b as i8 as i32))
            .collect();

        let array = thread.new_array("[B", bytes)?;
        string.set_field("value", "[B", RuntimeValue::Object(array))?;

        if string.has_field("coder", "B") {
            string.set_field("coder", "B", RuntimeValue::Int(encoding.coder() as i32))?;
        }
    } else {
        return Err(internal!("java/lang/String has no value field"));
    }

    Ok(string)
}

pub fn decode_string(obj: &ObjectRef) -> Result<String, Throwable> {
    if obj.has_field("value", "[C") {
        let array = match obj.field("value", "[C")? {
            RuntimeValue::Object(array) => array,
            _ => return Ok(String::new()),
        };

        let chars = array
            .array()?
            .read()
            .iter()
            .map(|v| match v {
                RuntimeValue::Int(c) => Ok(*c as u16),
                other => Err(internal!("string char was {:?}", other)),
            })
            .collect::<Result<Vec<_>, _>>()?;

        return decode_chars(&chars).map_err(internalise!());
    }

    if obj.has_field("value", "[B") {
        let array = match obj.field("value", "[B")? {
            RuntimeValue::Object(array) => array,
            _ => return Ok(String::new()),
        };

        let bytes = array
            .array()?
            .read()
            .iter()
            .map(|v| match v {
                RuntimeValue::Int(b) => Ok(*b as u8),
                other => Err(internal!("string byte was {:?}", other)),
            })
            .collect::<Result<Vec<_>, _>>()?;

        let coder = if obj.has_field("coder", "B") {
            match obj.field("coder", "B")? {
                RuntimeValue::Int(coder) => coder as u8,
                _ => 0,
            }
        } else {
            CompactEncoding::Utf16.coder()
        };

        let encoding = CompactEncoding::from_coder(coder).map_err(internalise!())?;
        return decode_bytes(encoding, &bytes).map_err(internalise!());
    }

    Err(internal!("{} is not a string", obj.class().name()))
}
