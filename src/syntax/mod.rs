//! The intermediate representation consumed by all analyses.
//!
//! Programs are immutable arena-backed trees: every node lives in a
//! [`ProgramTree`] and is addressed by a stable [`NodeId`]. Analyses never
//! write into nodes; they own side tables keyed by node id. Parent and child
//! navigation is computed once when the tree is built and never changes.

mod location;
mod names;
mod operators;
mod tree;
mod types;
mod values;

pub use location::SourceLocation;
pub use names::{FunctionName, Host, JumpLabel, LabelParameter, MethodName, ObjectVariable, Variable};
pub use operators::Operator;
pub use tree::{CallArgument, NodeId, NodeKind, ProgramBuilder, ProgramTree};
pub use types::{ObjectType, ParameterDirection, ValueType};
pub use values::Value;
