use support::descriptor::BaseType;

use super::{Instruction, Progression};
use crate::{
    error::{Throwable, VMError},
    internal,
    object::{
        instance::Instance,
        value::{ObjectRef, RuntimeValue, ValueKind},
    },
    thread::Thread,
};

#[macro_export]
macro_rules! pop {
    ($thread: expr) => {
        $thread.frame_mut()?.pop()?
    };
}

#[macro_export]
macro_rules! arg {
    ($thread: expr, $side: expr => i32) => {
        $thread.frame_mut()?.pop_int($side)?
    };
    ($thread: expr, $side: expr => i64) => {
        $thread.frame_mut()?.pop_long($side)?
    };
    ($thread: expr, $side: expr => f32) => {
        $thread.frame_mut()?.pop_float($side)?
    };
    ($thread: expr, $side: expr => f64) => {
        $thread.frame_mut()?.pop_double($side)?
    };
    ($thread: expr, $side: expr => Object) => {
        $thread.frame_mut()?.pop_reference($side)?
    };
}

/// Pop a reference, raising NullPointerException for null
#[macro_export]
macro_rules! non_null {
    ($thread: expr, $side: expr) => {
        match $crate::arg!($thread, $side => Object) {
            Some(obj) => obj,
            None => {
                return Err($thread.throw($crate::error::VMError::NullPointerException {
                    ctx: format!("{} was null", $side),
                }))
            }
        }
    };
}

#[derive(Debug)]
pub struct Nop;
impl Instruction for Nop {}

#[derive(Debug)]
pub struct Unsupported {
    pub(crate) name: &'static str,
}

impl Instruction for Unsupported {
    fn handle(&self, _thread: &mut Thread) -> Result<Progression, Throwable> {
        Err(internal!("{} is not supported", self.name))
    }
}

#[derive(Debug)]
pub struct Pop;

impl Instruction for Pop {
    fn handle(&self, thread: &mut Thread) -> Result<Progression, Throwable> {
        let value = pop!(thread);
        if value.is_wide() {
            return Err(internal!("pop on a category 2 value {:?}", value));
        }

        Ok(Progression::Next)
    }
}

/// One category 2 value, or two category 1 values
#[derive(Debug)]
pub struct Pop2;

impl Instruction for Pop2 {
    fn handle(&self, thread: &mut Thread) -> Result<Progression, Throwable> {
        let frame = thread.frame_mut()?;
        let count = entries_for_slots(&frame.operands, 2)?;
        frame.pop_n(count)?;

        Ok(Progression::Next)
    }
}

/// The dup family. Copies the top `take` slots and inserts the copy
/// below the `skip` slots underneath them.
#[derive(Debug)]
pub struct Dup {
    pub(crate) take: usize,
    pub(crate) skip: usize,
}

impl Instruction for Dup {
    fn handle(&self, thread: &mut Thread) -> Result<Progression, Throwable> {
        let frame = thread.frame_mut()?;
        let len = frame.operands.len();

        let taken = entries_for_slots(&frame.operands, self.take)?;
        let skipped = entries_for_slots(&frame.operands[..len - taken], self.skip)?;

        let copies = frame.operands[len - taken..].to_vec();
        let at = len - taken - skipped;
        frame.operands.splice(at..at, copies);

        Ok(Progression::Next)
    }
}

/// How many stack entries, counted from the top, make up exactly `slots` slots
fn entries_for_slots(operands: &[RuntimeValue], slots: usize) -> Result<usize, Throwable> {
    let mut counted = 0;
    let mut entries = 0;

    for value in operands.iter().rev() {
        if counted >= slots {
            break;
        }

        counted += if value.is_wide() { 2 } else { 1 };
        entries += 1;
    }

    if counted != slots {
        return Err(internal!(
            "operand stack does not split at {} slots",
            slots
        ));
    }

    Ok(entries)
}

#[derive(Debug)]
pub struct Swap;

impl Instruction for Swap {
    fn handle(&self, thread: &mut Thread) -> Result<Progression, Throwable> {
        let top = pop!(thread);
        let under = pop!(thread);
        if top.is_wide() || under.is_wide() {
            return Err(internal!("swap on a category 2 value"));
        }

        let frame = thread.frame_mut()?;
        frame.push(top);
        frame.push(under);

        Ok(Progression::Next)
    }
}

#[derive(Debug)]
pub struct Goto {
    pub(crate) jump_to: i32,
}

impl Instruction for Goto {
    fn handle(&self, _thread: &mut Thread) -> Result<Progression, Throwable> {
        Ok(Progression::JumpRel(self.jump_to))
    }
}

#[derive(Debug)]
pub struct TableSwitch {
    pub default: i32,
    pub low: i32,
    pub high: i32,
    pub offsets: Vec<i32>,
}

impl TableSwitch {
    /// The branch offset taken for `key`
    pub fn target(&self, key: i32) -> i32 {
        if key < self.low || key > self.high {
            return self.default;
        }

        let index = (key as i64 - self.low as i64) as usize;
        self.offsets.get(index).copied().unwrap_or(self.default)
    }
}

impl Instruction for TableSwitch {
    fn handle(&self, thread: &mut Thread) -> Result<Progression, Throwable> {
        let key = arg!(thread, "key" => i32);
        Ok(Progression::JumpRel(self.target(key)))
    }
}

#[derive(Debug)]
pub struct LookupSwitch {
    pub default: i32,
    pub pairs: Vec<(i32, i32)>,
}

impl LookupSwitch {
    pub fn target(&self, key: i32) -> i32 {
        self.pairs
            .iter()
            .find(|(candidate, _)| *candidate == key)
            .map_or(self.default, |(_, offset)| *offset)
    }
}

impl Instruction for LookupSwitch {
    fn handle(&self, thread: &mut Thread) -> Result<Progression, Throwable> {
        let key = arg!(thread, "key" => i32);
        Ok(Progression::JumpRel(self.target(key)))
    }
}

#[derive(Debug)]
pub struct ValueReturn {
    pub(crate) kind: ValueKind,
}

impl Instruction for ValueReturn {
    fn handle(&self, thread: &mut Thread) -> Result<Progression, Throwable> {
        let value = pop!(thread);
        if value.kind() != self.kind {
            return Err(internal!(
                "return expected {:?}, got {:?}",
                self.kind,
                value
            ));
        }

        Ok(Progression::Return(Some(value)))
    }
}

#[derive(Debug)]
pub struct VoidReturn;

impl Instruction for VoidReturn {
    fn handle(&self, _thread: &mut Thread) -> Result<Progression, Throwable> {
        Ok(Progression::Return(None))
    }
}

fn array_length(thread: &mut Thread, count: i32) -> Result<usize, Throwable> {
    if count < 0 {
        return Err(thread.throw(VMError::NegativeArraySize { size: count }));
    }

    Ok(count as usize)
}

/// The array class descriptor with `component` as its element
pub(crate) fn array_of(component: &str) -> String {
    if component.starts_with('[') {
        format!("[{}", component)
    } else {
        format!("[L{};", component)
    }
}

#[derive(Debug)]
pub struct NewArray {
    pub(crate) ty: BaseType,
}

impl Instruction for NewArray {
    fn handle(&self, thread: &mut Thread) -> Result<Progression, Throwable> {
        let count = arg!(thread, "count" => i32);
        let length = array_length(thread, count)?;

        let class = thread.vm().class_loader().for_name(&format!("[{}", self.ty))?;
        let array = Instance::new_array(class, length)?;
        thread.frame_mut()?.push(RuntimeValue::Object(array));

        Ok(Progression::Next)
    }
}

#[derive(Debug)]
pub struct ANewArray {
    pub(crate) index: u16,
}

impl Instruction for ANewArray {
    fn handle(&self, thread: &mut Thread) -> Result<Progression, Throwable> {
        let component = thread.frame()?.pool().class_name(self.index)?.to_string();
        let count = arg!(thread, "count" => i32);
        let length = array_length(thread, count)?;

        let class = thread.vm().class_loader().for_name(&array_of(&component))?;
        let array = Instance::new_array(class, length)?;
        thread.frame_mut()?.push(RuntimeValue::Object(array));

        Ok(Progression::Next)
    }
}

#[derive(Debug)]
pub struct MultiANewArray {
    pub(crate) index: u16,
    pub(crate) dimensions: u8,
}

impl MultiANewArray {
    fn build(thread: &mut Thread, descriptor: &str, counts: &[usize]) -> Result<ObjectRef, Throwable> {
        let class = thread.vm().class_loader().for_name(descriptor)?;

        match counts {
            [] => Err(internal!("multianewarray needs at least one dimension")),
            [length] => Instance::new_array(class, *length),
            [length, rest @ ..] => {
                let inner = &descriptor[1..];
                let values = (0..*length)
                    .map(|_| Self::build(thread, inner, rest).map(RuntimeValue::Object))
                    .collect::<Result<Vec<_>, _>>()?;

                Instance::array_from(class, values)
            }
        }
    }
}

impl Instruction for MultiANewArray {
    fn handle(&self, thread: &mut Thread) -> Result<Progression, Throwable> {
        let descriptor = thread.frame()?.pool().class_name(self.index)?.to_string();

        let counts = thread.frame_mut()?.pop_n(self.dimensions as usize)?;
        let mut lengths = Vec::with_capacity(counts.len());
        for count in counts {
            let count = match count {
                RuntimeValue::Int(count) => count,
                other => return Err(internal!("array dimension was {:?}", other)),
            };

            lengths.push(array_length(thread, count)?);
        }

        let array = Self::build(thread, &descriptor, &lengths)?;
        thread.frame_mut()?.push(RuntimeValue::Object(array));

        Ok(Progression::Next)
    }
}

#[derive(Debug)]
pub struct ArrayLength;

impl Instruction for ArrayLength {
    fn handle(&self, thread: &mut Thread) -> Result<Progression, Throwable> {
        let array = non_null!(thread, "arrayref");
        let length = array.array_length()?;
        thread.frame_mut()?.push(RuntimeValue::Int(length as i32));

        Ok(Progression::Next)
    }
}

#[derive(Debug)]
pub struct Athrow;

impl Instruction for Athrow {
    fn handle(&self, thread: &mut Thread) -> Result<Progression, Throwable> {
        let exception = non_null!(thread, "exception");
        Ok(Progression::Throw(exception))
    }
}

#[derive(Debug)]
pub struct CheckCast {
    pub(crate) index: u16,
}

impl Instruction for CheckCast {
    fn handle(&self, thread: &mut Thread) -> Result<Progression, Throwable> {
        let target = thread.frame()?.pool().class_name(self.index)?.to_string();
        let value = pop!(thread);

        if let RuntimeValue::Object(obj) = &value {
            if !obj.class().is_instance_of(&target) {
                return Err(thread.throw(VMError::ClassCastException {
                    from: obj.class().binary_name(),
                    to: target.replace('/', "."),
                }));
            }
        }

        thread.frame_mut()?.push(value);
        Ok(Progression::Next)
    }
}

#[derive(Debug)]
pub struct InstanceOf {
    pub(crate) index: u16,
}

impl Instruction for InstanceOf {
    fn handle(&self, thread: &mut Thread) -> Result<Progression, Throwable> {
        let target = thread.frame()?.pool().class_name(self.index)?.to_string();
        let value = arg!(thread, "objectref" => Object);

        let result = value.map_or(false, |obj| obj.class().is_instance_of(&target));
        thread.frame_mut()?.push(RuntimeValue::from(result));

        Ok(Progression::Next)
    }
}

#[derive(Debug)]
pub struct MonitorEnter;

impl Instruction for MonitorEnter {
    fn handle(&self, thread: &mut Thread) -> Result<Progression, Throwable> {
        let obj = non_null!(thread, "monitor");
        let monitor = obj.monitor().clone();
        monitor.enter(thread.id());
        thread.frame_mut()?.held.push(monitor);

        Ok(Progression::Next)
    }
}

#[derive(Debug)]
pub struct MonitorExit;

impl Instruction for MonitorExit {
    fn handle(&self, thread: &mut Thread) -> Result<Progression, Throwable> {
        let obj = non_null!(thread, "monitor");

        if let Err(e) = obj.monitor().exit(thread.id()) {
            return Err(thread.throw(VMError::IllegalMonitorState { ctx: e.to_string() }));
        }

        let held = &mut thread.frame_mut()?.held;
        if let Some(pos) = held.iter().rposition(|m| m.same_as(obj.monitor())) {
            held.remove(pos);
        }

        Ok(Progression::Next)
    }
}
