//! Protocol selection.
//!
//! Selection assigns every let-bound temporary, declared object, and
//! function parameter a cryptographic (or cleartext) protocol whose
//! authority covers the label inference computed for it. The module is
//! split along the extension seams: [`ProtocolFactory`] enumerates what a
//! backend can implement, [`ProtocolComposer`] says which protocols can
//! hand values to each other, [`CostEstimator`] prices the alternatives,
//! and [`SelectionSolver`] searches for a consistent assignment. The
//! built-in implementations cover local storage, replication, two-party
//! MPC, commitments, and zero-knowledge proofs.

mod composer;
mod constraints;
mod cost;
mod factory;
mod solver;

pub use composer::{ProtocolComposer, SimpleProtocolComposer};
pub use constraints::{
    FunctionVariable, ProtocolAssignment, SelectionConstraint, VariableName,
};
pub use cost::{Cost, CostEstimator, CostFeature, CostRegime, SimpleCostEstimator};
pub use factory::{
    CommitmentFactory, LocalFactory, MpcFactory, ProtocolFactory, ReplicationFactory,
    UnionFactory, ZkpFactory,
};
pub use solver::{
    validate_protocol_assignment, CostOrderedSearch, DecisionVariable, SelectionProblem,
    SelectionSolver,
};

use crate::analysis::{InformationFlowAnalysis, NameAnalysis, TypeAnalysis};
use crate::security::HostTrustConfiguration;
use crate::syntax::ProgramTree;

/// A complete selection backend: the protocols it offers, how they may
/// hand values to each other, and what they cost.
///
/// Bundling the three seams lets callers pass one value through the
/// pipeline; the built-in [`DefaultBackend`] combines every built-in
/// factory with [`SimpleProtocolComposer`] and [`SimpleCostEstimator`].
pub trait Backend {
    /// The protocols this backend can place variables on.
    fn protocol_factory(&self) -> &dyn ProtocolFactory;

    /// Which of this backend's protocols can communicate.
    fn protocol_composer(&self) -> &dyn ProtocolComposer;

    /// The cost model the search orders candidates by.
    fn cost_estimator(&self) -> &dyn CostEstimator;
}

/// Every built-in protocol under the default composition and cost rules.
pub struct DefaultBackend {
    factory: UnionFactory,
    composer: SimpleProtocolComposer,
    estimator: SimpleCostEstimator,
}

impl DefaultBackend {
    /// A backend over the declared hosts, costed for the given network
    /// regime.
    #[must_use]
    pub fn new(trust: &HostTrustConfiguration, regime: CostRegime) -> Self {
        Self {
            factory: UnionFactory::all_backends(trust),
            composer: SimpleProtocolComposer,
            estimator: SimpleCostEstimator::new(regime),
        }
    }
}

impl Backend for DefaultBackend {
    fn protocol_factory(&self) -> &dyn ProtocolFactory {
        &self.factory
    }

    fn protocol_composer(&self) -> &dyn ProtocolComposer {
        &self.composer
    }

    fn cost_estimator(&self) -> &dyn CostEstimator {
        &self.estimator
    }
}

/// The analysis results selection reads from.
///
/// All fields are finished analyses over the same tree; selection itself
/// adds nothing to them.
pub struct SelectionContext<'a, 't> {
    /// The program being compiled.
    pub tree: &'t ProgramTree,
    /// Name resolution results.
    pub names: &'a NameAnalysis<'t>,
    /// Type checking results.
    pub types: &'a TypeAnalysis<'t, 'a>,
    /// Inferred labels for every declaration site.
    pub information_flow: &'a InformationFlowAnalysis,
    /// The authority of every declared host.
    pub trust: &'a HostTrustConfiguration,
}
