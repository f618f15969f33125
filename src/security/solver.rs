//! Flows-to constraints between label terms.
//!
//! The information-flow analysis phrases everything it knows as flows-to and
//! equality constraints between label terms. This module lowers each label
//! constraint into two component constraints over the underlying principal
//! lattice — confidentiality with the sides swapped, integrity as written —
//! and solves them through [`crate::algebra::ConstraintSystem`].
//!
//! The solution assigns every variable the *least trust* label consistent
//! with the constraints. Each constraint carries a failure constructor; when
//! the system is unsatisfiable the first violated constraint's constructor is
//! invoked with the best estimates of both sides.

use std::io::{self, Write};
use std::rc::Rc;

use tracing::debug;

use crate::algebra::{ConstraintSystem, LeftHandTerm, RightHandTerm, Solution, VariableRef};
use crate::security::{Label, PrincipalComponent};
use crate::{Error, Result};

/// A label unknown: one lattice variable per component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LabelVariable {
    confidentiality: VariableRef,
    integrity: VariableRef,
}

impl LabelVariable {
    /// Exchanges the components, mirroring [`Label::swap`] on the term level.
    #[must_use]
    pub fn swap(&self) -> Self {
        Self {
            confidentiality: self.integrity,
            integrity: self.confidentiality,
        }
    }
}

/// A label term that is a single constant or variable.
#[derive(Debug, Clone)]
pub enum AtomicLabelTerm {
    /// A known label.
    Constant(Label),
    /// A label unknown.
    Variable(LabelVariable),
}

impl AtomicLabelTerm {
    /// Exchanges confidentiality and integrity.
    #[must_use]
    pub fn swap(&self) -> Self {
        match self {
            Self::Constant(label) => Self::Constant(label.swap()),
            Self::Variable(variable) => Self::Variable(variable.swap()),
        }
    }

    /// Joins a constant onto this term.
    #[must_use]
    pub fn join(&self, constant: Label) -> LabelTerm {
        match self {
            Self::Constant(label) => LabelTerm::Atomic(Self::Constant(label.join(&constant))),
            Self::Variable(variable) => LabelTerm::ConstantJoin(constant, *variable),
        }
    }

    fn confidentiality_lhs(&self) -> LeftHandTerm<PrincipalComponent> {
        match self {
            Self::Constant(label) => {
                LeftHandTerm::Constant(label.confidentiality_component().clone())
            }
            Self::Variable(variable) => LeftHandTerm::Variable(variable.confidentiality),
        }
    }

    fn confidentiality_rhs(&self) -> RightHandTerm<PrincipalComponent> {
        match self {
            Self::Constant(label) => {
                RightHandTerm::Constant(label.confidentiality_component().clone())
            }
            Self::Variable(variable) => RightHandTerm::Variable(variable.confidentiality),
        }
    }

    fn integrity_lhs(&self) -> LeftHandTerm<PrincipalComponent> {
        match self {
            Self::Constant(label) => LeftHandTerm::Constant(label.integrity_component().clone()),
            Self::Variable(variable) => LeftHandTerm::Variable(variable.integrity),
        }
    }

    fn integrity_rhs(&self) -> RightHandTerm<PrincipalComponent> {
        match self {
            Self::Constant(label) => RightHandTerm::Constant(label.integrity_component().clone()),
            Self::Variable(variable) => RightHandTerm::Variable(variable.integrity),
        }
    }
}

/// A label term as allowed on the right-hand side of a flows-to constraint.
#[derive(Debug, Clone)]
pub enum LabelTerm {
    /// A constant or variable.
    Atomic(AtomicLabelTerm),
    /// `constant ⊔ variable` in the information-flow order.
    ///
    /// Arises from the non-malleability conditions, whose right-hand sides
    /// have the shape `swap(from) ⊔ to`.
    ConstantJoin(Label, LabelVariable),
}

impl LabelTerm {
    /// Wraps a known label.
    #[must_use]
    pub fn constant(label: Label) -> Self {
        Self::Atomic(AtomicLabelTerm::Constant(label))
    }

    /// Wraps a label unknown.
    #[must_use]
    pub fn variable(variable: LabelVariable) -> Self {
        Self::Atomic(AtomicLabelTerm::Variable(variable))
    }

    /// Confidentiality of a join is the meet of the confidentialities, so a
    /// join term lands on the constant-meet-variable form.
    fn confidentiality_lhs(&self) -> LeftHandTerm<PrincipalComponent> {
        match self {
            Self::Atomic(atomic) => atomic.confidentiality_lhs(),
            Self::ConstantJoin(constant, variable) => LeftHandTerm::ConstantMeetVariable(
                constant.confidentiality_component().clone(),
                variable.confidentiality,
            ),
        }
    }

    fn integrity_rhs(&self) -> RightHandTerm<PrincipalComponent> {
        match self {
            Self::Atomic(atomic) => atomic.integrity_rhs(),
            Self::ConstantJoin(constant, variable) => RightHandTerm::ConstantJoinVariable(
                constant.integrity_component().clone(),
                variable.integrity,
            ),
        }
    }
}

/// Constructor for the error reported when a constraint is violated.
///
/// Receives the best estimates for the two sides, in flow order. Reference
/// counted because equality constraints install the same constructor for
/// both flow directions.
pub type FailWith = Rc<dyn Fn(Label, Label) -> Error>;

struct PendingFailure {
    lhs: LabelTerm,
    rhs: LabelTerm,
    fail_with: FailWith,
}

/// Collects information-flow constraints for one function and solves them.
#[derive(Default)]
pub struct ConstraintSolver {
    system: ConstraintSystem<PrincipalComponent>,
    failures: Vec<PendingFailure>,
}

impl ConstraintSolver {
    /// Creates an empty solver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a fresh label variable. `name` only shows up in diagnostics
    /// and the DOT export.
    pub fn fresh_variable(&mut self, name: &str) -> LabelVariable {
        LabelVariable {
            confidentiality: self.system.fresh_variable(format!("(c) {name}")),
            integrity: self.system.fresh_variable(format!("(i) {name}")),
        }
    }

    /// Number of label variables created so far.
    #[must_use]
    pub fn variable_count(&self) -> usize {
        self.system.variable_count() / 2
    }

    /// Adds the constraint `lhs flows-to rhs`.
    pub fn add_flows_to(&mut self, lhs: &AtomicLabelTerm, rhs: &LabelTerm, fail_with: FailWith) {
        let tag = self.failures.len();
        // Confidentiality may only grow along a flow, integrity may only
        // shrink; hence the component constraints point in opposite
        // directions.
        self.system.add_less_than_or_equal_to(
            rhs.confidentiality_lhs(),
            lhs.confidentiality_rhs(),
            tag,
        );
        self.system
            .add_less_than_or_equal_to(lhs.integrity_lhs(), rhs.integrity_rhs(), tag);
        self.failures.push(PendingFailure {
            lhs: LabelTerm::Atomic(lhs.clone()),
            rhs: rhs.clone(),
            fail_with,
        });
    }

    /// Constrains the integrity components of `lhs` and `rhs` to be equal,
    /// leaving confidentiality unconstrained.
    ///
    /// Declassification must carry integrity through unchanged; this states
    /// that requirement when the expression's label is still a variable.
    pub fn add_integrity_equal_to(
        &mut self,
        lhs: &AtomicLabelTerm,
        rhs: &AtomicLabelTerm,
        fail_with: FailWith,
    ) {
        for (a, b) in [(lhs, rhs), (rhs, lhs)] {
            let tag = self.failures.len();
            self.system
                .add_less_than_or_equal_to(a.integrity_lhs(), b.integrity_rhs(), tag);
            self.failures.push(PendingFailure {
                lhs: LabelTerm::Atomic(lhs.clone()),
                rhs: LabelTerm::Atomic(rhs.clone()),
                fail_with: Rc::clone(&fail_with),
            });
        }
    }

    /// Constrains the confidentiality components of `lhs` and `rhs` to be
    /// equal, leaving integrity unconstrained. The dual of
    /// [`ConstraintSolver::add_integrity_equal_to`], used for endorsement.
    pub fn add_confidentiality_equal_to(
        &mut self,
        lhs: &AtomicLabelTerm,
        rhs: &AtomicLabelTerm,
        fail_with: FailWith,
    ) {
        for (a, b) in [(lhs, rhs), (rhs, lhs)] {
            let tag = self.failures.len();
            // Confidentiality constraints run against the flow direction.
            self.system
                .add_less_than_or_equal_to(b.confidentiality_lhs(), a.confidentiality_rhs(), tag);
            self.failures.push(PendingFailure {
                lhs: LabelTerm::Atomic(lhs.clone()),
                rhs: LabelTerm::Atomic(rhs.clone()),
                fail_with: Rc::clone(&fail_with),
            });
        }
    }

    /// Adds the constraint `lhs == rhs` as two opposing flows.
    pub fn add_equal_to(
        &mut self,
        lhs: &AtomicLabelTerm,
        rhs: &AtomicLabelTerm,
        fail_with: FailWith,
    ) {
        let shared = Rc::clone(&fail_with);
        let reversed: FailWith = Rc::new(move |to, from| shared(from, to));
        self.add_flows_to(lhs, &LabelTerm::Atomic(rhs.clone()), fail_with);
        self.add_flows_to(rhs, &LabelTerm::Atomic(lhs.clone()), reversed);
    }

    /// Solves the collected constraints for the least-trust solution.
    ///
    /// # Errors
    ///
    /// Returns the error built by the violated constraint's failure
    /// constructor when the constraints are unsatisfiable.
    pub fn solve(self) -> Result<ConstraintSolution> {
        self.solve_and_export(&mut io::sink())
    }

    /// Like [`ConstraintSolver::solve`], but also writes the component
    /// constraint graph to `writer` in DOT format. When solving fails the
    /// violated constraint is drawn in red, so the graph shows why.
    ///
    /// # Errors
    ///
    /// Returns the violated constraint's error, or [`Error::Io`] when the
    /// writer fails.
    pub fn solve_and_export<W: Write>(self, writer: &mut W) -> Result<ConstraintSolution> {
        debug!(
            variables = self.variable_count(),
            constraints = self.failures.len(),
            "solving label constraints"
        );
        match self.system.solve() {
            Ok(solution) => {
                self.system.export_dot(writer, None)?;
                Ok(ConstraintSolution { solution })
            }
            Err(failure) => {
                self.system.export_dot(writer, Some(failure.tag))?;
                let pending = &self.failures[failure.tag];
                let partial = ConstraintSolution {
                    solution: failure.solution,
                };
                let from = partial.evaluate_term(&pending.lhs);
                let to = partial.evaluate_term(&pending.rhs);
                Err((pending.fail_with)(from, to))
            }
        }
    }
}

/// The solved labels of one function's constraint system.
#[derive(Debug, Clone)]
pub struct ConstraintSolution {
    solution: Solution<PrincipalComponent>,
}

impl ConstraintSolution {
    /// The label assigned to `variable`.
    #[must_use]
    pub fn label(&self, variable: &LabelVariable) -> Label {
        Label::new(
            self.solution.value(variable.confidentiality),
            self.solution.value(variable.integrity),
        )
    }

    /// Evaluates an atomic term under this solution.
    #[must_use]
    pub fn evaluate(&self, term: &AtomicLabelTerm) -> Label {
        match term {
            AtomicLabelTerm::Constant(label) => label.clone(),
            AtomicLabelTerm::Variable(variable) => self.label(variable),
        }
    }

    /// Evaluates a full term under this solution.
    #[must_use]
    pub fn evaluate_term(&self, term: &LabelTerm) -> Label {
        match term {
            LabelTerm::Atomic(atomic) => self.evaluate(atomic),
            LabelTerm::ConstantJoin(constant, variable) => constant.join(&self.label(variable)),
        }
    }
}
