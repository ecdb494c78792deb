use tracing::trace;

use super::{NameAndDescriptor, NativeFunction, NativeModule};
use crate::{
    error::{Throwable, VMError},
    instance_method, internal, native_arg,
    object::{
        instance::HostStream,
        value::{ObjectRef, RuntimeValue},
    },
    static_method,
    thread::Thread,
};

pub struct FileDescriptor;
impl NativeModule for FileDescriptor {
    fn classname(&self) -> &'static str {
        "java/io/FileDescriptor"
    }

    fn methods(&self) -> Vec<(NameAndDescriptor, NativeFunction)> {
        vec![
            static_method!(name: "initIDs", descriptor: "()V" => |_, _, _| Ok(None)),
            // Windows handles, which never exist here
            static_method!(name: "getHandle", descriptor: "(I)J" => |_, _, _| {
                Ok(Some(RuntimeValue::Long(-1)))
            }),
            static_method!(name: "getAppend", descriptor: "(I)Z" => |_, _, _| {
                Ok(Some(RuntimeValue::from(false)))
            }),
        ]
    }
}

/// The `FileDescriptor` a stream writes through
fn descriptor_of(stream: &ObjectRef) -> Result<ObjectRef, Throwable> {
    match stream.field("fd", "Ljava/io/FileDescriptor;")? {
        RuntimeValue::Object(fd) => Ok(fd),
        _ => Err(internal!("{} has no file descriptor", stream.class().name())),
    }
}

fn write_bytes(thread: &mut Thread, this: ObjectRef, args: Vec<RuntimeValue>) -> Result<Option<RuntimeValue>, Throwable> {
    let bytes = native_arg!(args, 0 => Object);
    let offset = native_arg!(args, 1 => int);
    let length = native_arg!(args, 2 => int);

    let bytes = match bytes {
        Some(bytes) => bytes,
        None => {
            return Err(thread.throw(VMError::NullPointerException {
                ctx: "byte array was null".to_string(),
            }))
        }
    };

    let available = bytes.array_length()?;
    if offset < 0 || length < 0 || offset as i64 + length as i64 > available as i64 {
        return Err(thread.throw(VMError::ArrayIndexOutOfBounds {
            at: offset.saturating_add(length),
            length: available,
        }));
    }

    let data = bytes.array()?.read()[offset as usize..(offset + length) as usize]
        .iter()
        .map(|value| match value {
            RuntimeValue::Int(byte) => Ok(*byte as u8),
            other => Err(internal!("byte array held {:?}", other)),
        })
        .collect::<Result<Vec<u8>, Throwable>>()?;

    let fd = descriptor_of(&this)?;
    let stream = fd
        .stream()
        .ok_or_else(|| internal!("{} carries no host stream", fd.class().name()))?;

    let mut stream = stream.lock();
    if stream.is_none() {
        let number = match fd.field("fd", "I")? {
            RuntimeValue::Int(number) => number,
            other => return Err(internal!("fd field held {:?}", other)),
        };

        *stream = Some(
            HostStream::from_fd(number)
                .ok_or_else(|| internal!("no host stream for descriptor {}", number))?,
        );
    }

    trace!("Writing {} bytes to {:?}", data.len(), stream);

    if let Some(stream) = stream.as_mut() {
        stream.write_all(&data).map_err(|e| internal!(e))?;
    }

    Ok(None)
}

pub struct FileOutputStream;
impl NativeModule for FileOutputStream {
    fn classname(&self) -> &'static str {
        "java/io/FileOutputStream"
    }

    fn methods(&self) -> Vec<(NameAndDescriptor, NativeFunction)> {
        vec![
            static_method!(name: "initIDs", descriptor: "()V" => |_, _, _| Ok(None)),
            instance_method!(name: "writeBytes", descriptor: "([BIIZ)V" => write_bytes),
        ]
    }
}
