//! Lattice traits shared by the label algebra and the dataflow analyses.
//!
//! Two separate fixpoint engines in this crate operate over lattices: the
//! label constraint system (greatest solutions over the free distributive
//! lattice) and the out-parameter initialization dataflow (a small flat
//! lattice). Both program against these traits.
//!
//! # Conventions
//!
//! - **Join (∨)**: least upper bound.
//! - **Meet (∧)**: greatest lower bound.
//! - **Top (⊤)**: greatest element, identity for meet.
//! - **Bottom (⊥)**: least element, identity for join.
//!
//! The greatest-solution solver initializes every unknown to top and only
//! ever moves values downwards via meet, so termination follows from finite
//! descending chains on the values actually reachable from the constraints.

use std::fmt::Debug;

/// A join semi-lattice: a partial order with least upper bounds.
///
/// `join` must be idempotent, commutative, and associative.
pub trait JoinSemiLattice: Clone + Debug + PartialEq {
    /// Computes the join (least upper bound) of two elements.
    #[must_use]
    fn join(&self, other: &Self) -> Self;
}

/// A meet semi-lattice: a partial order with greatest lower bounds.
///
/// `meet` must be idempotent, commutative, and associative.
pub trait MeetSemiLattice: Clone + Debug + PartialEq {
    /// Computes the meet (greatest lower bound) of two elements.
    #[must_use]
    fn meet(&self, other: &Self) -> Self;
}

/// The partial order induced by the lattice operations.
///
/// Provided for every type that is both a join and a meet semi-lattice;
/// `x ≤ y` holds exactly when `x ∨ y = y`.
pub trait PartialOrder {
    /// Returns `true` if `self ≤ other` in the lattice order.
    #[must_use]
    fn less_than_or_equal_to(&self, other: &Self) -> bool;
}

impl<T: JoinSemiLattice> PartialOrder for T {
    fn less_than_or_equal_to(&self, other: &Self) -> bool {
        &self.join(other) == other
    }
}

/// A bounded lattice with both operations and both extremal elements.
pub trait Lattice: JoinSemiLattice + MeetSemiLattice {
    /// The greatest element; identity for meet.
    #[must_use]
    fn top() -> Self;

    /// The least element; identity for join.
    #[must_use]
    fn bottom() -> Self;
}

/// A lattice with a relative pseudocomplement (Heyting implication).
///
/// `a.imply(b)` is the greatest element `x` such that `a ∧ x ≤ b`. The
/// constraint system uses it to rewrite constraints of the form
/// `c ∧ v ≤ u` into the equivalent `v ≤ c → u`, which has the unknown
/// alone on the left and can therefore be solved by plain propagation.
pub trait HeytingAlgebra: Lattice {
    /// Returns the greatest `x` with `self ∧ x ≤ that`.
    #[must_use]
    fn imply(&self, that: &Self) -> Self;
}
