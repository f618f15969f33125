//! # secflow Prelude
//!
//! This module provides a convenient prelude for the most commonly used types
//! and traits from the secflow library. Import this module to get quick
//! access to everything needed to build a program, run the analyses, and
//! select protocols.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all secflow operations
pub use crate::Error;

/// The result type used throughout secflow
pub use crate::Result;

// ================================================================================================
// Program Trees
// ================================================================================================

/// Tree construction and navigation
pub use crate::syntax::{CallArgument, NodeId, NodeKind, ProgramBuilder, ProgramTree};

/// Names of the program namespaces
pub use crate::syntax::{
    FunctionName, Host, JumpLabel, LabelParameter, MethodName, ObjectVariable, Variable,
};

/// Types, values, operators, and source positions
pub use crate::syntax::{
    ObjectType, Operator, ParameterDirection, SourceLocation, Value, ValueType,
};

// ================================================================================================
// Security Labels
// ================================================================================================

/// Labels and the principals they are built from
pub use crate::security::{HostTrustConfiguration, Label, LabelExpression, Principal};

/// The lattice the label components live in
pub use crate::algebra::FreeDistributiveLattice;

// ================================================================================================
// Analyses
// ================================================================================================

/// The per-program analysis contexts, in construction order
pub use crate::analysis::{
    InformationFlowAnalysis, InformationFlowDiagnostic, InitializationState, NameAnalysis,
    OutParameterInitializationAnalysis, ProtocolAnalysis, TypeAnalysis,
};

// ================================================================================================
// Protocols and Selection
// ================================================================================================

/// The concrete protocols
pub use crate::protocols::{MpcCircuit, Protocol};

/// The selection problem and its search
pub use crate::selection::{
    validate_protocol_assignment, CostOrderedSearch, DecisionVariable, ProtocolAssignment,
    SelectionConstraint, SelectionContext, SelectionProblem, SelectionSolver,
};

/// Decision variables
pub use crate::selection::{FunctionVariable, VariableName};

/// Backend extension points and their built-in implementations
pub use crate::selection::{
    Backend, CommitmentFactory, DefaultBackend, LocalFactory, MpcFactory, ProtocolComposer,
    ProtocolFactory, ReplicationFactory, SimpleProtocolComposer, UnionFactory, ZkpFactory,
};

/// Cost estimation
pub use crate::selection::{Cost, CostEstimator, CostFeature, CostRegime, SimpleCostEstimator};

// ================================================================================================
// Passes
// ================================================================================================

/// Call-site specialization
pub use crate::passes::{specialize, SpecializationBounds};
