//! Built-in operators and their signatures.

use crate::syntax::ValueType;

/// A primitive operator.
///
/// Every operator has a fixed signature; [`Operator::signature`] drives both
/// type checking and the per-operator execution cost of the MPC backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, strum::Display)]
pub enum Operator {
    /// Integer addition.
    Add,
    /// Integer subtraction.
    Subtract,
    /// Integer multiplication.
    Multiply,
    /// Integer division.
    Division,
    /// Binary minimum.
    Minimum,
    /// Binary maximum.
    Maximum,
    /// Integer negation.
    Negation,
    /// Boolean conjunction.
    And,
    /// Boolean disjunction.
    Or,
    /// Boolean negation.
    Not,
    /// Integer equality test.
    EqualTo,
    /// Integer ordering test.
    LessThan,
    /// Non-strict integer ordering test.
    LessThanOrEqualTo,
    /// Oblivious select: `mux(guard, then, else)`.
    ///
    /// The data-dependent form a multiplexed conditional is rewritten into.
    Mux,
}

impl Operator {
    /// Parameter types and result type.
    #[must_use]
    pub fn signature(&self) -> (&'static [ValueType], ValueType) {
        use ValueType::{Boolean, Integer};
        match self {
            Self::Add | Self::Subtract | Self::Multiply | Self::Division | Self::Minimum
            | Self::Maximum => (&[Integer, Integer], Integer),
            Self::Negation => (&[Integer], Integer),
            Self::And | Self::Or => (&[Boolean, Boolean], Boolean),
            Self::Not => (&[Boolean], Boolean),
            Self::EqualTo | Self::LessThan | Self::LessThanOrEqualTo => {
                (&[Integer, Integer], Boolean)
            }
            Self::Mux => (&[Boolean, Integer, Integer], Integer),
        }
    }

    /// Number of operands.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.signature().0.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signatures_are_consistent() {
        assert_eq!(Operator::Add.arity(), 2);
        assert_eq!(Operator::Not.arity(), 1);
        assert_eq!(Operator::Mux.arity(), 3);
        assert_eq!(Operator::LessThan.signature().1, ValueType::Boolean);
    }
}
