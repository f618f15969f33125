//! Per-backend protocol factories.
//!
//! A factory answers two questions for every variable declaration site:
//! which of its protocol instances may implement the variable at all, and
//! what side constraints the backend imposes on the surrounding program.
//! Viability always includes the label check: a protocol is only offered
//! when its authority acts for the variable's inferred label.

use std::collections::BTreeSet;

use crate::protocols::Protocol;
use crate::security::HostTrustConfiguration;
use crate::selection::cost::mpc_operator_cost;
use crate::selection::{FunctionVariable, SelectionConstraint, SelectionContext};
use crate::syntax::{Host, NodeId, NodeKind};
use crate::Result;

/// A backend's contribution to the selection problem.
pub trait ProtocolFactory {
    /// Every protocol instance this factory offers.
    fn protocols(&self) -> Vec<Protocol>;

    /// The subset of this factory's protocols that may implement the
    /// variable declared at `node`.
    ///
    /// # Errors
    ///
    /// Fails if `node` has no inferred label or a participating host is
    /// undeclared.
    fn viable_protocols(
        &self,
        context: &SelectionContext<'_, '_>,
        node: NodeId,
    ) -> Result<BTreeSet<Protocol>>;

    /// Side constraints this backend imposes at `node`; trivially true by
    /// default.
    ///
    /// # Errors
    ///
    /// Fails if name resolution for the constrained variables fails.
    fn constraints(
        &self,
        context: &SelectionContext<'_, '_>,
        node: NodeId,
    ) -> Result<SelectionConstraint> {
        let _ = (context, node);
        Ok(SelectionConstraint::Literal(true))
    }
}

/// Keeps the protocols whose authority acts for the label inferred at
/// `node`.
fn authority_filter(
    protocols: &[Protocol],
    context: &SelectionContext<'_, '_>,
    node: NodeId,
) -> Result<BTreeSet<Protocol>> {
    let label = context.information_flow.label(node)?;
    let mut viable = BTreeSet::new();
    for protocol in protocols {
        if protocol.authority(context.trust)?.acts_for(label) {
            viable.insert(protocol.clone());
        }
    }
    Ok(viable)
}

/// Largest host subset a multi-host protocol is instantiated over. Keeps
/// the factories polynomial in the number of declared hosts.
const MAX_PROTOCOL_HOSTS: usize = 5;

/// Subsets of the declared hosts with at least `minimum` and at most
/// [`MAX_PROTOCOL_HOSTS`] members.
fn host_subsets(trust: &HostTrustConfiguration, minimum: usize) -> Vec<BTreeSet<Host>> {
    let hosts: Vec<Host> = trust.hosts().cloned().collect();
    let mut subsets = Vec::new();
    // Grow each subset by hosts with a strictly larger index so every
    // subset is built exactly once, for any number of hosts.
    let mut frontier: Vec<(usize, BTreeSet<Host>)> = hosts
        .iter()
        .enumerate()
        .map(|(index, host)| (index, BTreeSet::from([host.clone()])))
        .collect();
    while let Some((last, subset)) = frontier.pop() {
        if subset.len() < MAX_PROTOCOL_HOSTS {
            for (next, host) in hosts.iter().enumerate().skip(last + 1) {
                let mut extended = subset.clone();
                extended.insert(host.clone());
                frontier.push((next, extended));
            }
        }
        if subset.len() >= minimum {
            subsets.push(subset);
        }
    }
    subsets
}

fn local_protocols(trust: &HostTrustConfiguration) -> Vec<Protocol> {
    trust
        .hosts()
        .map(|host| Protocol::Local { host: host.clone() })
        .collect()
}

fn replication_protocols(trust: &HostTrustConfiguration) -> Vec<Protocol> {
    host_subsets(trust, 2)
        .into_iter()
        .map(|hosts| Protocol::Replication { hosts })
        .collect()
}

/// The cleartext protocols every backend may hand values to.
fn cleartext_protocols(trust: &HostTrustConfiguration) -> BTreeSet<Protocol> {
    local_protocols(trust)
        .into_iter()
        .chain(replication_protocols(trust))
        .collect()
}

/// The decision variable a statement writes, if it writes one.
pub(crate) fn destination_variable(
    context: &SelectionContext<'_, '_>,
    statement: NodeId,
) -> Result<Option<FunctionVariable>> {
    let function = context.names.enclosing_function_name(statement)?;
    Ok(match context.tree.kind(statement) {
        NodeKind::Let { temporary, .. } => {
            Some(FunctionVariable::temporary(function, temporary.clone()))
        }
        NodeKind::DeclareObject { object, .. } => {
            Some(FunctionVariable::object(function, object.clone()))
        }
        NodeKind::Update { object, .. } => {
            Some(FunctionVariable::object(function, object.clone()))
        }
        NodeKind::OutParameterInitialization { parameter, .. } => {
            Some(FunctionVariable::object(function, parameter.clone()))
        }
        _ => None,
    })
}

/// Returns `true` if both branches of the conditional can be rewritten into
/// straight-line selects.
///
/// Muxing executes both branches unconditionally, so they may only contain
/// pure assignments: lets, `set` updates, blocks, and nested conditionals
/// of the same shape. Inputs, outputs, calls, loops, asserts, downgrades,
/// and fresh object declarations all pin the branch to real control flow.
pub(crate) fn can_mux(context: &SelectionContext<'_, '_>, conditional: NodeId) -> bool {
    let NodeKind::If {
        then_branch,
        else_branch,
        ..
    } = context.tree.kind(conditional)
    else {
        return false;
    };
    [*then_branch, *else_branch].into_iter().all(|branch| {
        context.tree.descendants(branch).into_iter().all(|node| {
            match context.tree.kind(node) {
                NodeKind::Block { .. } | NodeKind::Update { .. } | NodeKind::If { .. } => true,
                NodeKind::Let { value, .. } => !matches!(
                    context.tree.kind(*value),
                    NodeKind::Input { .. }
                        | NodeKind::Declassify { .. }
                        | NodeKind::Endorse { .. }
                ),
                kind => kind.is_expression(),
            }
        })
    })
}

/// Every variable written inside the conditional's branches.
fn branch_variables(
    context: &SelectionContext<'_, '_>,
    conditional: NodeId,
) -> Result<Vec<FunctionVariable>> {
    let NodeKind::If {
        then_branch,
        else_branch,
        ..
    } = context.tree.kind(conditional)
    else {
        return Ok(Vec::new());
    };
    let mut variables = Vec::new();
    for branch in [*then_branch, *else_branch] {
        for node in context.tree.descendants(branch) {
            if let Some(variable) = destination_variable(context, node)? {
                if !variables.contains(&variable) {
                    variables.push(variable);
                }
            }
        }
    }
    Ok(variables)
}

/// The guard-visibility constraint secret backends attach to conditionals.
///
/// When the conditional can be muxed, a guard held by this backend forces
/// every variable written in the branches onto the guard's protocol (the
/// whole conditional becomes one circuit). When it cannot be muxed, the
/// guard must not be held by this backend at all, since nobody could see
/// which branch to take.
fn mux_constraint(
    context: &SelectionContext<'_, '_>,
    conditional: NodeId,
    protocols: &[Protocol],
) -> Result<SelectionConstraint> {
    let NodeKind::If { guard, .. } = context.tree.kind(conditional) else {
        return Ok(SelectionConstraint::Literal(true));
    };
    let NodeKind::ReadTemporary { temporary } = context.tree.kind(*guard) else {
        return Ok(SelectionConstraint::Literal(true));
    };
    let function = context.names.enclosing_function_name(conditional)?;
    let guard_variable = FunctionVariable::temporary(function, temporary.clone());
    let guard_here = SelectionConstraint::variable_in(
        guard_variable.clone(),
        protocols.iter().cloned().collect(),
    );
    if can_mux(context, conditional) {
        let equalities = SelectionConstraint::conjunction(
            branch_variables(context, conditional)?
                .into_iter()
                .map(|variable| {
                    SelectionConstraint::VariableEquals(guard_variable.clone(), variable)
                }),
        );
        Ok(guard_here.implies(equalities))
    } else {
        Ok(guard_here.not())
    }
}

/// Cleartext storage on each declared host.
#[derive(Debug, Clone)]
pub struct LocalFactory {
    protocols: Vec<Protocol>,
}

impl LocalFactory {
    /// One `Local` protocol per declared host.
    #[must_use]
    pub fn new(trust: &HostTrustConfiguration) -> Self {
        Self {
            protocols: local_protocols(trust),
        }
    }
}

impl ProtocolFactory for LocalFactory {
    fn protocols(&self) -> Vec<Protocol> {
        self.protocols.clone()
    }

    fn viable_protocols(
        &self,
        context: &SelectionContext<'_, '_>,
        node: NodeId,
    ) -> Result<BTreeSet<Protocol>> {
        authority_filter(&self.protocols, context, node)
    }
}

/// Cleartext replication across host subsets.
#[derive(Debug, Clone)]
pub struct ReplicationFactory {
    protocols: Vec<Protocol>,
}

impl ReplicationFactory {
    /// One `Replication` protocol per host subset of size two or more.
    #[must_use]
    pub fn new(trust: &HostTrustConfiguration) -> Self {
        Self {
            protocols: replication_protocols(trust),
        }
    }
}

impl ProtocolFactory for ReplicationFactory {
    fn protocols(&self) -> Vec<Protocol> {
        self.protocols.clone()
    }

    fn viable_protocols(
        &self,
        context: &SelectionContext<'_, '_>,
        node: NodeId,
    ) -> Result<BTreeSet<Protocol>> {
        authority_filter(&self.protocols, context, node)
    }
}

/// Two-party MPC in arithmetic, boolean, and Yao circuit representations.
#[derive(Debug, Clone)]
pub struct MpcFactory {
    protocols: Vec<Protocol>,
}

impl MpcFactory {
    /// All three circuit representations for every host pair.
    #[must_use]
    pub fn new(trust: &HostTrustConfiguration) -> Self {
        let mut protocols = Vec::new();
        for pair in host_subsets(trust, 2) {
            if pair.len() != 2 {
                continue;
            }
            let mut hosts = pair.into_iter();
            let (server, client) = match (hosts.next(), hosts.next()) {
                (Some(server), Some(client)) => (server, client),
                _ => continue,
            };
            protocols.push(Protocol::arithmetic_mpc(server.clone(), client.clone()));
            protocols.push(Protocol::boolean_mpc(server.clone(), client.clone()));
            protocols.push(Protocol::yao_mpc(server, client));
        }
        Self { protocols }
    }
}

impl ProtocolFactory for MpcFactory {
    fn protocols(&self) -> Vec<Protocol> {
        self.protocols.clone()
    }

    fn viable_protocols(
        &self,
        context: &SelectionContext<'_, '_>,
        node: NodeId,
    ) -> Result<BTreeSet<Protocol>> {
        let mut viable = authority_filter(&self.protocols, context, node)?;

        // A circuit representation is only offered when it has a gate for
        // the computed operator; e.g. arithmetic shares cannot compare.
        if let NodeKind::Let { value, .. } = context.tree.kind(node) {
            if let NodeKind::Operator { operator, .. } = context.tree.kind(*value) {
                viable.retain(|protocol| match protocol {
                    Protocol::Mpc { circuit, .. } => {
                        mpc_operator_cost(*operator, *circuit).is_some()
                    }
                    _ => true,
                });
            }
        }
        Ok(viable)
    }

    fn constraints(
        &self,
        context: &SelectionContext<'_, '_>,
        node: NodeId,
    ) -> Result<SelectionConstraint> {
        match context.tree.kind(node) {
            NodeKind::If { .. } => mux_constraint(context, node, &self.protocols),
            _ => Ok(SelectionConstraint::Literal(true)),
        }
    }
}

/// Commitments from a sender to a set of receivers.
#[derive(Debug, Clone)]
pub struct CommitmentFactory {
    protocols: Vec<Protocol>,
    cleartext: BTreeSet<Protocol>,
}

impl CommitmentFactory {
    /// Every (sender, receivers) split of every host subset of size two or
    /// more.
    #[must_use]
    pub fn new(trust: &HostTrustConfiguration) -> Self {
        let mut protocols = Vec::new();
        for subset in host_subsets(trust, 2) {
            for sender in &subset {
                let receivers: BTreeSet<Host> =
                    subset.iter().filter(|h| *h != sender).cloned().collect();
                protocols.push(Protocol::Commitment {
                    sender: sender.clone(),
                    receivers,
                });
            }
        }
        Self {
            protocols,
            cleartext: cleartext_protocols(trust),
        }
    }

    /// Commitments store but never compute: the value may be moved, opened,
    /// and compared, not fed into operators or queries.
    fn applicable(&self, context: &SelectionContext<'_, '_>, node: NodeId) -> Result<bool> {
        match context.tree.kind(node) {
            NodeKind::Let { value, .. } => {
                let movable_value = matches!(
                    context.tree.kind(*value),
                    NodeKind::Literal { .. }
                        | NodeKind::ReadTemporary { .. }
                        | NodeKind::Declassify { .. }
                        | NodeKind::Endorse { .. }
                        | NodeKind::Query { .. }
                );
                if !movable_value {
                    return Ok(false);
                }
                for reader in context.names.readers(node) {
                    if let NodeKind::Let { value, .. } = context.tree.kind(*reader) {
                        if matches!(
                            context.tree.kind(*value),
                            NodeKind::Operator { .. } | NodeKind::Query { .. }
                        ) {
                            return Ok(false);
                        }
                    }
                }
                Ok(true)
            }
            NodeKind::DeclareObject { .. } => Ok(context.names.updaters(node).is_empty()),
            _ => Ok(true),
        }
    }
}

impl ProtocolFactory for CommitmentFactory {
    fn protocols(&self) -> Vec<Protocol> {
        self.protocols.clone()
    }

    fn viable_protocols(
        &self,
        context: &SelectionContext<'_, '_>,
        node: NodeId,
    ) -> Result<BTreeSet<Protocol>> {
        if !self.applicable(context, node)? {
            return Ok(BTreeSet::new());
        }
        authority_filter(&self.protocols, context, node)
    }

    /// A committed value may only move on to the commitment itself or to
    /// cleartext protocols that open it.
    fn constraints(
        &self,
        context: &SelectionContext<'_, '_>,
        node: NodeId,
    ) -> Result<SelectionConstraint> {
        if !matches!(context.tree.kind(node), NodeKind::Let { .. }) {
            return Ok(SelectionConstraint::Literal(true));
        }
        let Some(variable) = destination_variable(context, node)? else {
            return Ok(SelectionConstraint::Literal(true));
        };
        let mut destinations = Vec::new();
        for reader in context.names.readers(node) {
            if let Some(destination) = destination_variable(context, *reader)? {
                destinations.push(destination);
            }
        }
        let mut parts = Vec::new();
        for protocol in &self.protocols {
            let mut allowed = self.cleartext.clone();
            allowed.insert(protocol.clone());
            let readers_allowed =
                SelectionConstraint::conjunction(destinations.iter().map(|destination| {
                    SelectionConstraint::variable_in(destination.clone(), allowed.clone())
                }));
            parts.push(
                SelectionConstraint::variable_in(
                    variable.clone(),
                    BTreeSet::from([protocol.clone()]),
                )
                .implies(readers_allowed),
            );
        }
        Ok(SelectionConstraint::conjunction(parts))
    }
}

/// Zero-knowledge proofs from a prover to a set of verifiers.
#[derive(Debug, Clone)]
pub struct ZkpFactory {
    protocols: Vec<Protocol>,
    cleartext: BTreeSet<Protocol>,
}

impl ZkpFactory {
    /// Every (prover, verifiers) split of every host subset of size two or
    /// more.
    #[must_use]
    pub fn new(trust: &HostTrustConfiguration) -> Self {
        let mut protocols = Vec::new();
        for subset in host_subsets(trust, 2) {
            for prover in &subset {
                let verifiers: BTreeSet<Host> =
                    subset.iter().filter(|h| *h != prover).cloned().collect();
                protocols.push(Protocol::Zkp {
                    prover: prover.clone(),
                    verifiers,
                });
            }
        }
        Self {
            protocols,
            cleartext: cleartext_protocols(trust),
        }
    }

    /// A proof only ever reveals a boolean verdict, so a value that later
    /// gets declassified must be boolean for ZKP to hold it.
    fn applicable(&self, context: &SelectionContext<'_, '_>, node: NodeId) -> Result<bool> {
        let NodeKind::Let { value, .. } = context.tree.kind(node) else {
            return Ok(true);
        };
        for reader in context.names.readers(node) {
            if let NodeKind::Let {
                value: reader_value,
                ..
            } = context.tree.kind(*reader)
            {
                if matches!(
                    context.tree.kind(*reader_value),
                    NodeKind::Declassify { .. } | NodeKind::Endorse { .. }
                ) && context.types.value_type(*value)? != crate::syntax::ValueType::Boolean
                {
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    /// The temporaries a let's value reads.
    fn sources(
        context: &SelectionContext<'_, '_>,
        node: NodeId,
    ) -> Result<Vec<FunctionVariable>> {
        let NodeKind::Let { value, .. } = context.tree.kind(node) else {
            return Ok(Vec::new());
        };
        let function = context.names.enclosing_function_name(node)?;
        let mut sources = Vec::new();
        for descendant in context.tree.descendants(*value) {
            if let NodeKind::ReadTemporary { temporary } = context.tree.kind(descendant) {
                let source = FunctionVariable::temporary(function.clone(), temporary.clone());
                if !sources.contains(&source) {
                    sources.push(source);
                }
            }
        }
        Ok(sources)
    }
}

impl ProtocolFactory for ZkpFactory {
    fn protocols(&self) -> Vec<Protocol> {
        self.protocols.clone()
    }

    fn viable_protocols(
        &self,
        context: &SelectionContext<'_, '_>,
        node: NodeId,
    ) -> Result<BTreeSet<Protocol>> {
        if !self.applicable(context, node)? {
            return Ok(BTreeSet::new());
        }
        authority_filter(&self.protocols, context, node)
    }

    /// ZKP reads from and sends to only itself and cleartext protocols.
    fn constraints(
        &self,
        context: &SelectionContext<'_, '_>,
        node: NodeId,
    ) -> Result<SelectionConstraint> {
        match context.tree.kind(node) {
            NodeKind::If { .. } => mux_constraint(context, node, &self.protocols),
            NodeKind::Let { .. } => {
                let Some(variable) = destination_variable(context, node)? else {
                    return Ok(SelectionConstraint::Literal(true));
                };
                let sources = Self::sources(context, node)?;
                let mut destinations = Vec::new();
                for reader in context.names.readers(node) {
                    if let Some(destination) = destination_variable(context, *reader)? {
                        destinations.push(destination);
                    }
                }
                let mut parts = Vec::new();
                for protocol in &self.protocols {
                    let mut allowed = self.cleartext.clone();
                    allowed.insert(protocol.clone());
                    let neighbors_allowed = SelectionConstraint::conjunction(
                        sources.iter().chain(destinations.iter()).map(|neighbor| {
                            SelectionConstraint::variable_in(neighbor.clone(), allowed.clone())
                        }),
                    );
                    parts.push(
                        SelectionConstraint::variable_in(
                            variable.clone(),
                            BTreeSet::from([protocol.clone()]),
                        )
                        .implies(neighbors_allowed),
                    );
                }
                Ok(SelectionConstraint::conjunction(parts))
            }
            _ => Ok(SelectionConstraint::Literal(true)),
        }
    }
}

/// The union of several backends' factories.
#[derive(Default)]
pub struct UnionFactory {
    factories: Vec<Box<dyn ProtocolFactory>>,
}

impl UnionFactory {
    /// A union over the given factories.
    #[must_use]
    pub fn new(factories: Vec<Box<dyn ProtocolFactory>>) -> Self {
        Self { factories }
    }

    /// The full built-in backend set: local, replication, MPC, commitment,
    /// and ZKP.
    #[must_use]
    pub fn all_backends(trust: &HostTrustConfiguration) -> Self {
        Self::new(vec![
            Box::new(LocalFactory::new(trust)),
            Box::new(ReplicationFactory::new(trust)),
            Box::new(MpcFactory::new(trust)),
            Box::new(CommitmentFactory::new(trust)),
            Box::new(ZkpFactory::new(trust)),
        ])
    }
}

impl ProtocolFactory for UnionFactory {
    fn protocols(&self) -> Vec<Protocol> {
        self.factories
            .iter()
            .flat_map(|factory| factory.protocols())
            .collect()
    }

    fn viable_protocols(
        &self,
        context: &SelectionContext<'_, '_>,
        node: NodeId,
    ) -> Result<BTreeSet<Protocol>> {
        let mut viable = BTreeSet::new();
        for factory in &self.factories {
            viable.extend(factory.viable_protocols(context, node)?);
        }
        Ok(viable)
    }

    fn constraints(
        &self,
        context: &SelectionContext<'_, '_>,
        node: NodeId,
    ) -> Result<SelectionConstraint> {
        let mut parts = Vec::new();
        for factory in &self.factories {
            parts.push(factory.constraints(context, node)?);
        }
        Ok(SelectionConstraint::conjunction(parts))
    }
}
