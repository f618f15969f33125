//! Static analyses over the program tree.
//!
//! Each analysis is an explicit context object built once per program. All
//! results live in side tables keyed by [`crate::syntax::NodeId`]; the tree
//! itself is never written to. Construction order matters: name analysis
//! feeds type analysis, both feed the information-flow analysis, and the
//! protocol analysis consumes a finished protocol assignment.

mod information_flow;
mod name;
mod out_parameters;
mod protocols;
mod types;

pub use information_flow::{InformationFlowAnalysis, InformationFlowDiagnostic};
pub use name::NameAnalysis;
pub use out_parameters::{InitializationState, OutParameterInitializationAnalysis};
pub use protocols::ProtocolAnalysis;
pub use types::TypeAnalysis;
