//! Surface-level label annotations.

use std::collections::BTreeMap;
use std::fmt;

use crate::security::{Label, Principal};
use crate::syntax::{LabelParameter, SourceLocation};
use crate::Result;

/// A label annotation as written in the program.
///
/// Unlike [`Label`], expressions may mention the polymorphic label
/// parameters of the enclosing function; [`LabelExpression::interpret`]
/// resolves them against a concrete instantiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelExpression {
    /// The authority of a single principal.
    Principal(Principal),
    /// A label parameter of the enclosing function.
    Parameter(LabelParameter),
    /// The most restrictive data policy.
    Top,
    /// The least restrictive data policy.
    Bottom,
    /// Join in the information-flow order.
    Join(Box<LabelExpression>, Box<LabelExpression>),
    /// Meet in the information-flow order.
    Meet(Box<LabelExpression>, Box<LabelExpression>),
    /// Conjunction of authority.
    And(Box<LabelExpression>, Box<LabelExpression>),
    /// The confidentiality projection of the inner expression.
    Confidentiality(Box<LabelExpression>),
    /// The integrity projection of the inner expression.
    Integrity(Box<LabelExpression>),
}

impl LabelExpression {
    /// Convenience constructor for a principal's authority.
    pub fn principal(name: impl Into<String>) -> Self {
        Self::Principal(Principal::new(name))
    }

    /// Evaluates the expression under `parameters`.
    ///
    /// # Errors
    ///
    /// Fails with [`crate::Error::UndefinedName`] if a mentioned label
    /// parameter has no binding in `parameters`.
    pub fn interpret(
        &self,
        parameters: &BTreeMap<LabelParameter, Label>,
        location: SourceLocation,
    ) -> Result<Label> {
        match self {
            Self::Principal(principal) => Ok(Label::from_principal(principal.clone())),
            Self::Parameter(parameter) => parameters
                .get(parameter)
                .cloned()
                .ok_or_else(|| crate::Error::UndefinedName {
                    name: parameter.name().to_string(),
                    location,
                }),
            Self::Top => Ok(Label::top()),
            Self::Bottom => Ok(Label::bottom()),
            Self::Join(lhs, rhs) => Ok(lhs
                .interpret(parameters, location)?
                .join(&rhs.interpret(parameters, location)?)),
            Self::Meet(lhs, rhs) => Ok(lhs
                .interpret(parameters, location)?
                .meet(&rhs.interpret(parameters, location)?)),
            Self::And(lhs, rhs) => Ok(lhs
                .interpret(parameters, location)?
                .and(&rhs.interpret(parameters, location)?)),
            Self::Confidentiality(inner) => {
                Ok(inner.interpret(parameters, location)?.confidentiality())
            }
            Self::Integrity(inner) => Ok(inner.interpret(parameters, location)?.integrity()),
        }
    }

    /// Returns `true` if the expression mentions any label parameter and
    /// therefore cannot be interpreted without an instantiation.
    #[must_use]
    pub fn is_polymorphic(&self) -> bool {
        match self {
            Self::Parameter(_) => true,
            Self::Principal(_) | Self::Top | Self::Bottom => false,
            Self::Join(lhs, rhs) | Self::Meet(lhs, rhs) | Self::And(lhs, rhs) => {
                lhs.is_polymorphic() || rhs.is_polymorphic()
            }
            Self::Confidentiality(inner) | Self::Integrity(inner) => inner.is_polymorphic(),
        }
    }
}

impl fmt::Display for LabelExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Principal(principal) => write!(f, "{principal}"),
            Self::Parameter(parameter) => write!(f, "{parameter}"),
            Self::Top => write!(f, "\u{22a4}"),
            Self::Bottom => write!(f, "\u{22a5}"),
            Self::Join(lhs, rhs) => write!(f, "({lhs} \u{2294} {rhs})"),
            Self::Meet(lhs, rhs) => write!(f, "({lhs} \u{2293} {rhs})"),
            Self::And(lhs, rhs) => write!(f, "({lhs} \u{2227} {rhs})"),
            Self::Confidentiality(inner) => write!(f, "{inner}->"),
            Self::Integrity(inner) => write!(f, "{inner}<-"),
        }
    }
}
