//! # Marten VM Types
//!
//! Runtime type descriptors for the Marten VM.
//!
//! A [`TypeDesc`] tells the value layer what a value is allowed to contain:
//! which specialized storage an array should use, whether its length is
//! fixed, and what the member types of a tuple are. Descriptors are
//! immutable and cheap to clone (compound payloads sit behind `Arc`).

#![warn(clippy::all)]
#![warn(missing_docs)]
#![deny(unsafe_code)]

use std::fmt;
use std::sync::Arc;

/// Flat discriminant for a type descriptor.
///
/// The value layer dispatches on the tag to pick a storage backend, so the
/// tag set is deliberately small: the five specialized element kinds, plus
/// `Array`/`Tuple` for compound declared types and `Any` for open typing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeTag {
    /// 64-bit signed integer
    Int,
    /// Boolean flag
    Boolean,
    /// 8-bit unsigned integer
    Byte,
    /// 64-bit floating point
    Float,
    /// UTF-8 string
    String,
    /// Array of a single element type
    Array,
    /// Tuple with per-slot member types
    Tuple,
    /// Open / dynamically typed
    Any,
}

impl TypeTag {
    /// Get the name of this type tag
    pub fn name(&self) -> &'static str {
        match self {
            TypeTag::Int => "int",
            TypeTag::Boolean => "boolean",
            TypeTag::Byte => "byte",
            TypeTag::Float => "float",
            TypeTag::String => "string",
            TypeTag::Array => "array",
            TypeTag::Tuple => "tuple",
            TypeTag::Any => "any",
        }
    }
}

/// Length classification of an array type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayState {
    /// Open-ended array, grows on demand
    Open,
    /// Closed/sealed array with a fixed length bound
    ClosedSealed(usize),
}

/// Descriptor payload for an array type.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayType {
    element: TypeDesc,
    state: ArrayState,
}

impl ArrayType {
    /// Create an array type descriptor
    pub fn new(element: TypeDesc, state: ArrayState) -> Self {
        Self { element, state }
    }

    /// The element type of this array type
    pub fn element_type(&self) -> &TypeDesc {
        &self.element
    }

    /// Length classification (open vs closed/sealed)
    pub fn state(&self) -> ArrayState {
        self.state
    }
}

/// Descriptor payload for a tuple type.
#[derive(Debug, Clone, PartialEq)]
pub struct TupleType {
    members: Vec<TypeDesc>,
}

impl TupleType {
    /// Create a tuple type descriptor from its member types
    pub fn new(members: Vec<TypeDesc>) -> Self {
        Self { members }
    }

    /// The per-slot member types
    pub fn member_types(&self) -> &[TypeDesc] {
        &self.members
    }

    /// Number of tuple slots
    pub fn arity(&self) -> usize {
        self.members.len()
    }
}

/// A runtime type descriptor.
///
/// Scalar descriptors are unit variants; compound descriptors share their
/// payload through `Arc` so cloning one is a refcount bump.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeDesc {
    /// 64-bit signed integer
    Int,
    /// Boolean flag
    Boolean,
    /// 8-bit unsigned integer
    Byte,
    /// 64-bit floating point
    Float,
    /// UTF-8 string
    String,
    /// Open / dynamically typed
    Any,
    /// Array of a single element type
    Array(Arc<ArrayType>),
    /// Tuple with per-slot member types
    Tuple(Arc<TupleType>),
}

impl TypeDesc {
    /// Build an open-ended array type
    pub fn array(element: TypeDesc) -> Self {
        TypeDesc::Array(Arc::new(ArrayType::new(element, ArrayState::Open)))
    }

    /// Build a closed/sealed array type with a fixed length bound
    pub fn sealed_array(element: TypeDesc, size: usize) -> Self {
        TypeDesc::Array(Arc::new(ArrayType::new(
            element,
            ArrayState::ClosedSealed(size),
        )))
    }

    /// Build a tuple type from its member types
    pub fn tuple(members: Vec<TypeDesc>) -> Self {
        TypeDesc::Tuple(Arc::new(TupleType::new(members)))
    }

    /// The flat discriminant of this descriptor
    pub fn tag(&self) -> TypeTag {
        match self {
            TypeDesc::Int => TypeTag::Int,
            TypeDesc::Boolean => TypeTag::Boolean,
            TypeDesc::Byte => TypeTag::Byte,
            TypeDesc::Float => TypeTag::Float,
            TypeDesc::String => TypeTag::String,
            TypeDesc::Any => TypeTag::Any,
            TypeDesc::Array(_) => TypeTag::Array,
            TypeDesc::Tuple(_) => TypeTag::Tuple,
        }
    }

    /// The element type, for array descriptors
    pub fn element_type(&self) -> Option<&TypeDesc> {
        match self {
            TypeDesc::Array(at) => Some(at.element_type()),
            _ => None,
        }
    }

    /// Whether this descriptor carries a fixed length bound
    ///
    /// True for closed/sealed arrays and for tuples (a tuple's bound is its
    /// arity).
    pub fn is_fixed_size(&self) -> bool {
        self.fixed_size().is_some()
    }

    /// The fixed length bound, if any
    pub fn fixed_size(&self) -> Option<usize> {
        match self {
            TypeDesc::Array(at) => match at.state() {
                ArrayState::ClosedSealed(size) => Some(size),
                ArrayState::Open => None,
            },
            TypeDesc::Tuple(tt) => Some(tt.arity()),
            _ => None,
        }
    }
}

impl fmt::Display for TypeDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDesc::Array(at) => match at.state() {
                ArrayState::Open => write!(f, "{}[]", at.element_type()),
                ArrayState::ClosedSealed(size) => {
                    write!(f, "{}[{}]", at.element_type(), size)
                }
            },
            TypeDesc::Tuple(tt) => {
                write!(f, "(")?;
                for (i, member) in tt.member_types().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", member)?;
                }
                write!(f, ")")
            }
            other => f.write_str(other.tag().name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_tags() {
        assert_eq!(TypeDesc::Int.tag(), TypeTag::Int);
        assert_eq!(TypeDesc::Byte.tag(), TypeTag::Byte);
        assert_eq!(TypeDesc::Any.tag().name(), "any");
    }

    #[test]
    fn test_open_array_has_no_fixed_size() {
        let ty = TypeDesc::array(TypeDesc::Int);
        assert_eq!(ty.tag(), TypeTag::Array);
        assert_eq!(ty.element_type(), Some(&TypeDesc::Int));
        assert!(!ty.is_fixed_size());
        assert_eq!(ty.fixed_size(), None);
    }

    #[test]
    fn test_sealed_array_fixed_size() {
        let ty = TypeDesc::sealed_array(TypeDesc::Float, 4);
        assert!(ty.is_fixed_size());
        assert_eq!(ty.fixed_size(), Some(4));
    }

    #[test]
    fn test_tuple_fixed_size_is_arity() {
        let ty = TypeDesc::tuple(vec![TypeDesc::Int, TypeDesc::String, TypeDesc::Float]);
        assert_eq!(ty.tag(), TypeTag::Tuple);
        assert_eq!(ty.fixed_size(), Some(3));
    }

    #[test]
    fn test_display() {
        assert_eq!(TypeDesc::array(TypeDesc::Int).to_string(), "int[]");
        assert_eq!(
            TypeDesc::sealed_array(TypeDesc::String, 2).to_string(),
            "string[2]"
        );
        assert_eq!(
            TypeDesc::tuple(vec![TypeDesc::Int, TypeDesc::Boolean]).to_string(),
            "(int, boolean)"
        );
    }
}
