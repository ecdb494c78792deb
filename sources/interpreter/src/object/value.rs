use std::sync::Arc;

use enum_as_inner::EnumAsInner;
use support::descriptor::{BaseType, FieldType};

use super::instance::Instance;

pub type ObjectRef = Arc<Instance>;

/// A single operand stack entry or local variable.
/// Longs and doubles are one entry on the operand stack, but two local slots.
#[derive(Debug, Clone, EnumAsInner)]
pub enum RuntimeValue {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Object(ObjectRef),
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Int,
    Long,
    Float,
    Double,
    Reference,
}

impl RuntimeValue {
    pub fn null_ref() -> Self {
        RuntimeValue::Null
    }

    pub fn default_for(ty: &FieldType) -> Self {
        match ty {
            FieldType::Base(BaseType::Long) => RuntimeValue::Long(0),
            FieldType::Base(BaseType::Float) => RuntimeValue::Float(0.0),
            FieldType::Base(BaseType::Double) => RuntimeValue::Double(0.0),
            FieldType::Base(BaseType::Void) => RuntimeValue::Null,
            FieldType::Base(_) => RuntimeValue::Int(0),
            FieldType::Object(_) | FieldType::Array(_) => RuntimeValue::Null,
        }
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            RuntimeValue::Int(_) => ValueKind::Int,
            RuntimeValue::Long(_) => ValueKind::Long,
            RuntimeValue::Float(_) => ValueKind::Float,
            RuntimeValue::Double(_) => ValueKind::Double,
            RuntimeValue::Object(_) | RuntimeValue::Null => ValueKind::Reference,
        }
    }

    /// Category 2 values, as far as `pop2` and the `dup2` family are concerned
    pub fn is_wide(&self) -> bool {
        matches!(self, RuntimeValue::Long(_) | RuntimeValue::Double(_))
    }

    /// The reference held by this value, `None` for null.
    /// Primitives are not references and produce an error.
    pub fn reference(&self) -> Result<Option<&ObjectRef>, ValueKind> {
        match self {
            RuntimeValue::Object(obj) => Ok(Some(obj)),
            RuntimeValue::Null => Ok(None),
            other => Err(other.kind()),
        }
    }
}

impl PartialEq for RuntimeValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (RuntimeValue::Int(a), RuntimeValue::Int(b)) => a == b,
            (RuntimeValue::Long(a), RuntimeValue::Long(b)) => a == b,
            (RuntimeValue::Float(a), RuntimeValue::Float(b)) => a.to_bits() == b.to_bits(),
            (RuntimeValue::Double(a), RuntimeValue::Double(b)) => a.to_bits() == b.to_bits(),
            (RuntimeValue::Object(a), RuntimeValue::Object(b)) => Arc::ptr_eq(a, b),
            (RuntimeValue::Null, RuntimeValue::Null) => true,
            _ => false,
        }
    }
}

macro_rules! from_num {
    ($variant: ident, $($ty: ty),*) => {
        $(
            impl From<$ty> for RuntimeValue {
                fn from(value: $ty) -> Self {
                    RuntimeValue::$variant(value.into())
                }
            }
        )*
    };
}

from_num!(Int, i32, i16, i8, u16, u8);
from_num!(Long, i64);
from_num!(Float, f32);
from_num!(Double, f64);

impl From<bool> for RuntimeValue {
    fn from(value: bool) -> Self {
        RuntimeValue::Int(value as i32)
    }
}

impl From<ObjectRef> for RuntimeValue {
    fn from(value: ObjectRef) -> Self {
        RuntimeValue::Object(value)
    }
}

impl From<Option<ObjectRef>> for RuntimeValue {
    fn from(value: Option<ObjectRef>) -> Self {
        value.map_or(RuntimeValue::Null, RuntimeValue::Object)
    }
}
