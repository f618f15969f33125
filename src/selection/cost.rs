//! The cost model protocol selection minimizes over.

use std::collections::BTreeMap;
use std::fmt;

use crate::protocols::{MpcCircuit, Protocol};
use crate::syntax::{NodeId, NodeKind, Operator, ProgramTree};
use crate::Result;

/// A feature of the cost vector.
///
/// Costs are kept per feature and collapsed into a scalar only through
/// [`Cost::weighted`], so one estimator serves both network regimes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum CostFeature {
    /// Messages crossing host boundaries.
    Messages,
    /// Per-statement execution work.
    Execution,
    /// Circuit cost under low latency.
    Lan,
    /// Circuit cost under high latency.
    Wan,
}

/// A vector of per-feature costs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cost {
    features: BTreeMap<CostFeature, u64>,
}

impl Cost {
    /// The zero cost.
    #[must_use]
    pub fn zero() -> Self {
        Self::default()
    }

    /// Adds `amount` to `feature`, consuming and returning the vector so
    /// costs build up as chains.
    #[must_use]
    pub fn with(mut self, feature: CostFeature, amount: u64) -> Self {
        *self.features.entry(feature).or_insert(0) += amount;
        self
    }

    /// The amount recorded for `feature`.
    #[must_use]
    pub fn feature(&self, feature: CostFeature) -> u64 {
        self.features.get(&feature).copied().unwrap_or(0)
    }

    /// Pointwise sum of two cost vectors.
    #[must_use]
    pub fn plus(&self, other: &Self) -> Self {
        let mut result = self.clone();
        for (feature, amount) in &other.features {
            *result.features.entry(*feature).or_insert(0) += amount;
        }
        result
    }

    /// Collapses the vector into a scalar under the given feature weights.
    #[must_use]
    pub fn weighted(&self, weights: &Self) -> u64 {
        self.features
            .iter()
            .map(|(feature, amount)| amount * weights.feature(*feature))
            .sum()
    }
}

impl fmt::Display for Cost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (feature, amount) in &self.features {
            if *amount == 0 {
                continue;
            }
            if !first {
                write!(f, " + ")?;
            }
            write!(f, "{amount} {feature}")?;
            first = false;
        }
        if first {
            write!(f, "0")?;
        }
        Ok(())
    }
}

/// Estimates what a candidate protocol costs at a statement and what moving
/// data between two protocols costs.
pub trait CostEstimator {
    /// Cost of executing `statement` on `protocol`.
    ///
    /// # Errors
    ///
    /// Fails if the statement computes an operation the protocol has no
    /// cost entry for; factories exclude such candidates, so reaching this
    /// indicates a malformed candidate set.
    fn execution_cost(
        &self,
        tree: &ProgramTree,
        statement: NodeId,
        protocol: &Protocol,
    ) -> Result<Cost>;

    /// Cost of handing a value from `source` to `destination`.
    fn communication_cost(&self, source: &Protocol, destination: &Protocol) -> Cost;

    /// Per-feature weights the search collapses cost vectors with.
    fn feature_weights(&self) -> Cost;
}

/// The network regime the default estimator weights for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CostRegime {
    /// Low latency; bytes on the wire dominate.
    Lan,
    /// High latency; round trips dominate.
    Wan,
}

/// The default feature-weighted estimator.
///
/// Per-gate MPC circuit costs are rough microbenchmark-derived constants;
/// they only need to order candidates sensibly, not predict runtimes.
#[derive(Debug, Clone, Copy)]
pub struct SimpleCostEstimator {
    regime: CostRegime,
}

impl SimpleCostEstimator {
    /// An estimator weighting for the given network regime.
    #[must_use]
    pub fn new(regime: CostRegime) -> Self {
        Self { regime }
    }
}

/// Per-gate cost of `operator` in the given circuit representation, or
/// `None` if the circuit cannot realize the operator.
pub(crate) fn mpc_operator_cost(operator: Operator, circuit: MpcCircuit) -> Option<u64> {
    match circuit {
        MpcCircuit::Arithmetic => match operator {
            Operator::Add => Some(4),
            Operator::Subtract | Operator::Negation => Some(5),
            Operator::Multiply => Some(17),
            _ => None,
        },
        MpcCircuit::Boolean => match operator {
            Operator::Add => Some(24),
            Operator::Subtract | Operator::Negation => Some(60),
            Operator::Multiply => Some(80),
            Operator::Division => Some(378),
            Operator::And => Some(20),
            Operator::Or => Some(35),
            Operator::Not => Some(5),
            Operator::EqualTo => Some(25),
            Operator::LessThan => Some(26),
            Operator::LessThanOrEqualTo => Some(86),
            Operator::Mux => Some(14),
            Operator::Minimum => Some(35),
            Operator::Maximum => Some(34),
        },
        MpcCircuit::Yao => match operator {
            Operator::Add => Some(17),
            Operator::Subtract | Operator::Negation => Some(16),
            Operator::Multiply => Some(46),
            Operator::Division => Some(130),
            Operator::And => Some(22),
            Operator::Or => Some(40),
            Operator::Not => Some(6),
            Operator::EqualTo | Operator::LessThan => Some(18),
            Operator::LessThanOrEqualTo => Some(76),
            Operator::Mux => Some(9),
            Operator::Minimum => Some(19),
            Operator::Maximum => Some(18),
        },
    }
}

/// Cost of converting shares between two MPC circuit representations.
fn share_conversion_cost(from: MpcCircuit, to: MpcCircuit) -> u64 {
    match (from, to) {
        (MpcCircuit::Arithmetic, MpcCircuit::Boolean) => 19,
        (MpcCircuit::Arithmetic, MpcCircuit::Yao) => 18,
        (MpcCircuit::Boolean, MpcCircuit::Arithmetic) => 15,
        (MpcCircuit::Boolean, MpcCircuit::Yao) => 16,
        (MpcCircuit::Yao, MpcCircuit::Arithmetic) => 15,
        (MpcCircuit::Yao, MpcCircuit::Boolean) => 5,
        _ => 0,
    }
}

impl CostEstimator for SimpleCostEstimator {
    fn execution_cost(
        &self,
        tree: &ProgramTree,
        statement: NodeId,
        protocol: &Protocol,
    ) -> Result<Cost> {
        let base = match protocol {
            Protocol::Local { .. } | Protocol::Replication { .. } => 1,
            Protocol::Commitment { .. } => 10,
            Protocol::Zkp { .. } => 20,
            Protocol::Mpc { .. } => 100,
        };
        let mut cost = Cost::zero().with(CostFeature::Execution, base);

        if let Protocol::Mpc { circuit, .. } = protocol {
            if let NodeKind::Let { value, .. } = tree.kind(statement) {
                if let NodeKind::Operator { operator, .. } = tree.kind(*value) {
                    let gate =
                        mpc_operator_cost(*operator, *circuit).ok_or_else(|| {
                            malformed_error!(
                                "no circuit cost for operator {} in {}",
                                operator,
                                protocol
                            )
                        })?;
                    cost = cost
                        .with(CostFeature::Lan, gate)
                        .with(CostFeature::Wan, gate);
                }
            }
        }
        Ok(cost)
    }

    fn communication_cost(&self, source: &Protocol, destination: &Protocol) -> Cost {
        if source == destination {
            return Cost::zero();
        }
        if let (
            Protocol::Mpc {
                circuit: from,
                server,
                client,
            },
            Protocol::Mpc {
                circuit: to,
                server: other_server,
                client: other_client,
            },
        ) = (source, destination)
        {
            if server == other_server && client == other_client {
                let conversion = share_conversion_cost(*from, *to);
                return Cost::zero()
                    .with(CostFeature::Lan, conversion)
                    .with(CostFeature::Wan, conversion);
            }
        }

        // One message per destination host the source does not already run
        // on; leaving an MPC additionally executes the output gate.
        let sources = source.hosts();
        let messages = destination
            .hosts()
            .iter()
            .filter(|host| !sources.contains(*host))
            .count() as u64;
        let mut cost = Cost::zero().with(CostFeature::Messages, messages);
        if matches!(source, Protocol::Mpc { .. }) {
            cost = cost.with(CostFeature::Execution, 10);
        }
        cost
    }

    fn feature_weights(&self) -> Cost {
        match self.regime {
            CostRegime::Lan => Cost::zero()
                .with(CostFeature::Messages, 1)
                .with(CostFeature::Execution, 1)
                .with(CostFeature::Lan, 1),
            CostRegime::Wan => Cost::zero()
                .with(CostFeature::Messages, 10)
                .with(CostFeature::Execution, 1)
                .with(CostFeature::Wan, 1),
        }
    }
}
