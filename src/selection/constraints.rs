//! Decision variables and the propositional constraint language that
//! protocol selection searches over.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::protocols::Protocol;
use crate::syntax::{FunctionName, ObjectVariable, Variable};
use crate::{Error, Result};

/// A temporary or object variable, unified into the single namespace that
/// selection decides over.
///
/// Temporaries and object variables live in disjoint namespaces in the
/// source program; selection assigns protocols to both, so decision
/// variables tag which namespace a name came from.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum VariableName {
    /// A let-bound temporary.
    Temporary(Variable),
    /// An object variable, including object-typed parameters.
    Object(ObjectVariable),
}

impl fmt::Display for VariableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Temporary(variable) => write!(f, "{variable}"),
            Self::Object(object) => write!(f, "{object}"),
        }
    }
}

/// One protocol decision variable: a variable of one function.
///
/// Specialization runs before selection, so a function name identifies a
/// single calling context and every decision variable has exactly one
/// concrete label.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FunctionVariable {
    /// The function the variable is declared in.
    pub function: FunctionName,
    /// The variable itself.
    pub variable: VariableName,
}

impl FunctionVariable {
    /// The decision variable for a let-bound temporary.
    #[must_use]
    pub fn temporary(function: FunctionName, variable: Variable) -> Self {
        Self {
            function,
            variable: VariableName::Temporary(variable),
        }
    }

    /// The decision variable for an object variable or parameter.
    #[must_use]
    pub fn object(function: FunctionName, object: ObjectVariable) -> Self {
        Self {
            function,
            variable: VariableName::Object(object),
        }
    }
}

impl fmt::Display for FunctionVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.function, self.variable)
    }
}

/// A propositional constraint over protocol decision variables.
///
/// Atoms are set membership and equality of two variables; the usual
/// connectives combine them. The solver evaluates constraints over partial
/// assignments during search and over the total assignment during
/// validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionConstraint {
    /// A constant truth value.
    Literal(bool),
    /// Negation.
    Not(Box<SelectionConstraint>),
    /// Conjunction.
    And(Box<SelectionConstraint>, Box<SelectionConstraint>),
    /// Disjunction.
    Or(Box<SelectionConstraint>, Box<SelectionConstraint>),
    /// Material implication.
    Implies(Box<SelectionConstraint>, Box<SelectionConstraint>),
    /// The variable's protocol is drawn from the given set.
    VariableIn {
        /// The constrained variable.
        variable: FunctionVariable,
        /// The allowed protocols.
        protocols: BTreeSet<Protocol>,
    },
    /// Two variables share one protocol.
    VariableEquals(FunctionVariable, FunctionVariable),
}

impl SelectionConstraint {
    /// A [`SelectionConstraint::VariableIn`] atom.
    #[must_use]
    pub fn variable_in(variable: FunctionVariable, protocols: BTreeSet<Protocol>) -> Self {
        Self::VariableIn {
            variable,
            protocols,
        }
    }

    /// Negates the constraint.
    #[must_use]
    pub fn not(self) -> Self {
        Self::Not(Box::new(self))
    }

    /// `self → consequence`.
    #[must_use]
    pub fn implies(self, consequence: Self) -> Self {
        Self::Implies(Box::new(self), Box::new(consequence))
    }

    /// The conjunction of all given constraints; true when empty.
    pub fn conjunction(constraints: impl IntoIterator<Item = Self>) -> Self {
        constraints
            .into_iter()
            .fold(Self::Literal(true), |conjunction, constraint| {
                match (conjunction, constraint) {
                    (Self::Literal(true), constraint) => constraint,
                    (conjunction, Self::Literal(true)) => conjunction,
                    (conjunction, constraint) => {
                        Self::And(Box::new(conjunction), Box::new(constraint))
                    }
                }
            })
    }

    /// The disjunction of all given constraints; false when empty.
    pub fn disjunction(constraints: impl IntoIterator<Item = Self>) -> Self {
        constraints
            .into_iter()
            .fold(Self::Literal(false), |disjunction, constraint| {
                match (disjunction, constraint) {
                    (Self::Literal(false), constraint) => constraint,
                    (disjunction, Self::Literal(false)) => disjunction,
                    (disjunction, constraint) => {
                        Self::Or(Box::new(disjunction), Box::new(constraint))
                    }
                }
            })
    }

    /// Every decision variable the constraint mentions.
    #[must_use]
    pub fn variables(&self) -> BTreeSet<&FunctionVariable> {
        let mut result = BTreeSet::new();
        self.collect_variables(&mut result);
        result
    }

    fn collect_variables<'a>(&'a self, into: &mut BTreeSet<&'a FunctionVariable>) {
        match self {
            Self::Literal(_) => {}
            Self::Not(inner) => inner.collect_variables(into),
            Self::And(lhs, rhs) | Self::Or(lhs, rhs) | Self::Implies(lhs, rhs) => {
                lhs.collect_variables(into);
                rhs.collect_variables(into);
            }
            Self::VariableIn { variable, .. } => {
                into.insert(variable);
            }
            Self::VariableEquals(lhs, rhs) => {
                into.insert(lhs);
                into.insert(rhs);
            }
        }
    }

    /// Evaluates the constraint over a total assignment.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::SelectionVerification`] if the constraint
    /// mentions a variable the assignment does not cover.
    pub fn evaluate(&self, assignment: &ProtocolAssignment) -> Result<bool> {
        match self {
            Self::Literal(value) => Ok(*value),
            Self::Not(inner) => Ok(!inner.evaluate(assignment)?),
            Self::And(lhs, rhs) => Ok(lhs.evaluate(assignment)? && rhs.evaluate(assignment)?),
            Self::Or(lhs, rhs) => Ok(lhs.evaluate(assignment)? || rhs.evaluate(assignment)?),
            Self::Implies(premise, consequence) => {
                Ok(!premise.evaluate(assignment)? || consequence.evaluate(assignment)?)
            }
            Self::VariableIn {
                variable,
                protocols,
            } => Ok(protocols.contains(assignment.protocol(variable)?)),
            Self::VariableEquals(lhs, rhs) => {
                Ok(assignment.protocol(lhs)? == assignment.protocol(rhs)?)
            }
        }
    }

    /// Three-valued evaluation over a partial assignment.
    ///
    /// Returns `None` when the truth value still depends on an unassigned
    /// variable. The search prunes a branch as soon as any constraint
    /// evaluates to `Some(false)`.
    pub fn evaluate_partial(
        &self,
        lookup: &impl Fn(&FunctionVariable) -> Option<Protocol>,
    ) -> Option<bool> {
        match self {
            Self::Literal(value) => Some(*value),
            Self::Not(inner) => inner.evaluate_partial(lookup).map(|value| !value),
            Self::And(lhs, rhs) => {
                match (lhs.evaluate_partial(lookup), rhs.evaluate_partial(lookup)) {
                    (Some(false), _) | (_, Some(false)) => Some(false),
                    (Some(true), Some(true)) => Some(true),
                    _ => None,
                }
            }
            Self::Or(lhs, rhs) => {
                match (lhs.evaluate_partial(lookup), rhs.evaluate_partial(lookup)) {
                    (Some(true), _) | (_, Some(true)) => Some(true),
                    (Some(false), Some(false)) => Some(false),
                    _ => None,
                }
            }
            Self::Implies(premise, consequence) => {
                match (
                    premise.evaluate_partial(lookup),
                    consequence.evaluate_partial(lookup),
                ) {
                    (Some(false), _) | (_, Some(true)) => Some(true),
                    (Some(true), Some(false)) => Some(false),
                    _ => None,
                }
            }
            Self::VariableIn {
                variable,
                protocols,
            } => lookup(variable).map(|protocol| protocols.contains(&protocol)),
            Self::VariableEquals(lhs, rhs) => match (lookup(lhs), lookup(rhs)) {
                (Some(lhs), Some(rhs)) => Some(lhs == rhs),
                _ => None,
            },
        }
    }
}

/// A total mapping from decision variables to protocols, the end product of
/// selection.
///
/// Immutable once selection finishes; downstream passes only read it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtocolAssignment {
    assignment: BTreeMap<FunctionVariable, Protocol>,
}

impl ProtocolAssignment {
    /// An empty assignment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Assigns `protocol` to `variable`, replacing any earlier choice.
    pub fn insert(&mut self, variable: FunctionVariable, protocol: Protocol) {
        self.assignment.insert(variable, protocol);
    }

    /// The protocol assigned to `variable`, if any.
    #[must_use]
    pub fn get(&self, variable: &FunctionVariable) -> Option<&Protocol> {
        self.assignment.get(variable)
    }

    /// Retracts the choice for `variable`; the search uses this while
    /// backtracking.
    pub(crate) fn remove(&mut self, variable: &FunctionVariable) {
        self.assignment.remove(variable);
    }

    /// The protocol assigned to `variable`.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::SelectionVerification`] if the variable was
    /// never assigned; after selection the assignment is total, so a miss
    /// is an internal inconsistency, not an input error.
    pub fn protocol(&self, variable: &FunctionVariable) -> Result<&Protocol> {
        self.assignment
            .get(variable)
            .ok_or_else(|| Error::SelectionVerification {
                variable: variable.to_string(),
            })
    }

    /// Iterates over all assigned variables in deterministic order.
    pub fn iter(&self) -> impl Iterator<Item = (&FunctionVariable, &Protocol)> {
        self.assignment.iter()
    }

    /// Every protocol the assignment uses anywhere.
    #[must_use]
    pub fn protocols(&self) -> BTreeSet<Protocol> {
        self.assignment.values().cloned().collect()
    }

    /// Number of assigned variables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.assignment.len()
    }

    /// Returns `true` if nothing has been assigned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.assignment.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::Host;

    fn variable(name: &str) -> FunctionVariable {
        FunctionVariable::temporary(FunctionName::new("main"), Variable::new(name))
    }

    fn local(host: &str) -> Protocol {
        Protocol::Local {
            host: Host::new(host),
        }
    }

    #[test]
    fn membership_evaluates_against_the_assignment() {
        let mut assignment = ProtocolAssignment::new();
        assignment.insert(variable("x"), local("alice"));

        let holds = SelectionConstraint::variable_in(
            variable("x"),
            BTreeSet::from([local("alice"), local("bob")]),
        );
        let fails =
            SelectionConstraint::variable_in(variable("x"), BTreeSet::from([local("bob")]));
        assert!(holds.evaluate(&assignment).unwrap());
        assert!(!fails.evaluate(&assignment).unwrap());
    }

    #[test]
    fn missing_variable_is_a_verification_error() {
        let assignment = ProtocolAssignment::new();
        let constraint =
            SelectionConstraint::variable_in(variable("x"), BTreeSet::from([local("alice")]));
        assert!(matches!(
            constraint.evaluate(&assignment),
            Err(Error::SelectionVerification { .. })
        ));
    }

    #[test]
    fn implication_with_false_premise_holds() {
        let mut assignment = ProtocolAssignment::new();
        assignment.insert(variable("x"), local("alice"));
        assignment.insert(variable("y"), local("bob"));

        let premise =
            SelectionConstraint::variable_in(variable("x"), BTreeSet::from([local("bob")]));
        let consequence = SelectionConstraint::VariableEquals(variable("x"), variable("y"));
        assert!(premise.implies(consequence).evaluate(&assignment).unwrap());
    }

    #[test]
    fn partial_evaluation_is_three_valued() {
        let mut known = ProtocolAssignment::new();
        known.insert(variable("x"), local("alice"));
        let lookup = |v: &FunctionVariable| known.get(v).cloned();

        let decided =
            SelectionConstraint::variable_in(variable("x"), BTreeSet::from([local("alice")]));
        let undecided = SelectionConstraint::VariableEquals(variable("x"), variable("y"));
        assert_eq!(decided.evaluate_partial(&lookup), Some(true));
        assert_eq!(undecided.evaluate_partial(&lookup), None);

        // Short circuit: one false conjunct decides the conjunction.
        let conjunction = SelectionConstraint::conjunction([
            SelectionConstraint::variable_in(variable("x"), BTreeSet::from([local("bob")])),
            undecided,
        ]);
        assert_eq!(conjunction.evaluate_partial(&lookup), Some(false));
    }

    #[test]
    fn conjunction_folds_away_trivial_parts() {
        let atom =
            SelectionConstraint::variable_in(variable("x"), BTreeSet::from([local("alice")]));
        let folded = SelectionConstraint::conjunction([
            SelectionConstraint::Literal(true),
            atom.clone(),
            SelectionConstraint::Literal(true),
        ]);
        assert_eq!(folded, atom);
        assert_eq!(folded.variables().len(), 1);
    }
}
