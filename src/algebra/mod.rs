//! Order-theoretic foundations for the label and dataflow solvers.
//!
//! This module provides the lattice traits shared by every fixpoint
//! computation in the crate, the free distributive lattice over an arbitrary
//! atom type (the carrier of security label components), and a generic
//! greatest-solution constraint system over any bounded distributive lattice.
//!
//! The constraint system is the engine underneath the information-flow
//! solver: it turns a set of `lhs ≤ rhs` constraints into a term graph,
//! condenses it into strongly connected components, and runs a worklist
//! dataflow over the condensation in topological order.

mod free_distributive;
mod lattice;
mod solver;

pub use free_distributive::FreeDistributiveLattice;
pub use lattice::{HeytingAlgebra, JoinSemiLattice, Lattice, MeetSemiLattice, PartialOrder};
pub use solver::{
    ConstraintSystem, LeftHandTerm, RightHandTerm, Solution, SystemFailure, VariableRef,
};
