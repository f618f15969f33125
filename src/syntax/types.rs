//! Value types, object types, and parameter directions.

use std::fmt;

use crate::syntax::MethodName;

/// The type of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ValueType {
    /// Signed integers.
    Integer,
    /// Booleans.
    Boolean,
    /// The unit type.
    Unit,
}

/// The type of an object: a class applied to an element type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ObjectType {
    /// A write-once cell, set by its constructor.
    ImmutableCell(ValueType),
    /// A mutable cell.
    MutableCell(ValueType),
    /// A fixed-length vector.
    Vector(ValueType),
}

impl ObjectType {
    /// The type of the object's elements.
    #[must_use]
    pub fn element_type(&self) -> ValueType {
        match self {
            Self::ImmutableCell(element) | Self::MutableCell(element) | Self::Vector(element) => {
                *element
            }
        }
    }

    /// Argument types of the object's constructor.
    ///
    /// Cells take their initial value; vectors take their length.
    #[must_use]
    pub fn constructor_signature(&self) -> Vec<ValueType> {
        match self {
            Self::ImmutableCell(element) | Self::MutableCell(element) => vec![*element],
            Self::Vector(_) => vec![ValueType::Integer],
        }
    }

    /// Argument types and result type of a query method, if the method
    /// exists on this type.
    #[must_use]
    pub fn query_signature(&self, method: MethodName) -> Option<(Vec<ValueType>, ValueType)> {
        match (self, method) {
            (Self::ImmutableCell(element) | Self::MutableCell(element), MethodName::Get) => {
                Some((vec![], *element))
            }
            (Self::Vector(element), MethodName::Get) => {
                Some((vec![ValueType::Integer], *element))
            }
            (_, MethodName::Set) => None,
        }
    }

    /// Argument types of an update method, if the method exists on this
    /// type. Immutable cells have no updates.
    #[must_use]
    pub fn update_signature(&self, method: MethodName) -> Option<Vec<ValueType>> {
        match (self, method) {
            (Self::MutableCell(element), MethodName::Set) => Some(vec![*element]),
            (Self::Vector(element), MethodName::Set) => {
                Some(vec![ValueType::Integer, *element])
            }
            _ => None,
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ImmutableCell(element) => write!(f, "Cell<{element}>"),
            Self::MutableCell(element) => write!(f, "MutableCell<{element}>"),
            Self::Vector(element) => write!(f, "Vector<{element}>"),
        }
    }
}

/// Whether a function parameter is consumed or produced by the callee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ParameterDirection {
    /// The caller supplies the value.
    In,
    /// The callee must initialize the parameter exactly once.
    Out,
}
