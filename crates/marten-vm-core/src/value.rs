//! Boxed runtime values
//!
//! Elements of reference-backed arrays are stored as [`Value`]s. Scalar
//! arrays never go through this type; their elements live inline in the
//! specialized storage, so `Value` only appears where the element type
//! genuinely needs indirection (nested arrays, tuples, open typing).

use crate::array::{ArrayRef, ArrayValue};
use marten_vm_types::{TypeDesc, TypeTag};
use std::fmt;
use std::sync::Arc;

/// A boxed runtime value
#[derive(Debug, Clone)]
pub enum Value {
    /// 64-bit signed integer
    Int(i64),
    /// Boolean flag
    Boolean(bool),
    /// 8-bit unsigned integer
    Byte(u8),
    /// 64-bit floating point
    Float(f64),
    /// UTF-8 string
    String(String),
    /// Array or tuple value
    Array(ArrayRef),
}

impl Value {
    /// The declared zero-value of a type, used to pre-fill unset slots.
    ///
    /// `None` means the type's zero-value is "absent": slots of such types
    /// stay unset until explicitly written (and are skipped by the textual
    /// rendering).
    pub fn zero_of(ty: &TypeDesc) -> Option<Value> {
        match ty {
            TypeDesc::Int => Some(Value::Int(0)),
            TypeDesc::Boolean => Some(Value::Boolean(false)),
            TypeDesc::Byte => Some(Value::Byte(0)),
            TypeDesc::Float => Some(Value::Float(0.0)),
            TypeDesc::String => Some(Value::String(String::new())),
            TypeDesc::Array(_) | TypeDesc::Tuple(_) => {
                Some(Value::Array(Arc::new(ArrayValue::new_with_type(ty))))
            }
            TypeDesc::Any => None,
        }
    }

    /// The type tag of this value
    pub fn type_tag(&self) -> TypeTag {
        match self {
            Value::Int(_) => TypeTag::Int,
            Value::Boolean(_) => TypeTag::Boolean,
            Value::Byte(_) => TypeTag::Byte,
            Value::Float(_) => TypeTag::Float,
            Value::String(_) => TypeTag::String,
            Value::Array(arr) => arr.declared_type().tag(),
        }
    }

    /// Borrow the contained array, if this is an array value
    pub fn as_array(&self) -> Option<&ArrayRef> {
        match self {
            Value::Array(arr) => Some(arr),
            _ => None,
        }
    }
}

/// Render a float the way the runtime prints numbers: shortest decimal
/// form that round-trips, always carrying a fractional part (`1.0`, not
/// `1`).
pub(crate) fn format_float(value: f64) -> String {
    let mut buffer = ryu::Buffer::new();
    buffer.format(value).to_string()
}

impl fmt::Display for Value {
    /// Strings render unquoted here; containers add quotes around string
    /// elements themselves.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            Value::Boolean(v) => write!(f, "{}", v),
            Value::Byte(v) => write!(f, "{}", v),
            Value::Float(v) => f.write_str(&format_float(*v)),
            Value::String(v) => f.write_str(v),
            Value::Array(arr) => write!(f, "{}", arr),
        }
    }
}
