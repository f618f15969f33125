//! Protocol placement of statements.
//!
//! Once selection has produced a [`ProtocolAssignment`], code generation
//! needs two views of it: the primary protocol that executes each
//! statement, and the full set of protocols participating in a statement,
//! including those that only receive its result. The participant sets are
//! closed over control flow by a fixpoint, since loops and calls make the
//! relation cyclic.

use std::collections::{BTreeSet, HashMap};

use crate::protocols::Protocol;
use crate::selection::{FunctionVariable, ProtocolAssignment};
use crate::syntax::{NodeId, NodeKind, ProgramTree};
use crate::{Error, Result};

use super::NameAnalysis;

/// Maps statements to the protocols that execute and observe them.
pub struct ProtocolAnalysis<'t> {
    tree: &'t ProgramTree,
    /// Statement to the protocol that executes it.
    primaries: HashMap<NodeId, Protocol>,
    /// Statement to every protocol participating in it.
    participants: HashMap<NodeId, BTreeSet<Protocol>>,
    /// Every protocol the assignment uses anywhere.
    all_protocols: BTreeSet<Protocol>,
    empty: BTreeSet<Protocol>,
}

impl<'t> ProtocolAnalysis<'t> {
    /// Derives statement placement from a finished assignment.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::InputProtocolMismatch`] when an input statement
    /// is assigned anything but its host's local protocol, and with
    /// [`Error::SelectionVerification`] when the assignment misses a
    /// variable the program declares.
    pub fn new(
        tree: &'t ProgramTree,
        names: &NameAnalysis<'t>,
        assignment: &ProtocolAssignment,
    ) -> Result<Self> {
        let mut analysis = Self {
            tree,
            primaries: HashMap::new(),
            participants: HashMap::new(),
            all_protocols: assignment.protocols(),
            empty: BTreeSet::new(),
        };
        analysis.place_declarations(names, assignment)?;
        analysis.place_uses(names)?;
        analysis.close_participants(names)?;
        tracing::debug!(
            statements = analysis.primaries.len(),
            protocols = analysis.all_protocols.len(),
            "placed statements on protocols"
        );
        Ok(analysis)
    }

    /// The protocol executing the statement at `node`.
    ///
    /// Defined for lets, object declarations, updates, out-parameter
    /// initializations, and outputs; compound statements have participants
    /// but no single executor.
    ///
    /// # Errors
    ///
    /// Fails for nodes without a primary protocol.
    pub fn primary_protocol(&self, node: NodeId) -> Result<&Protocol> {
        self.primaries.get(&node).ok_or_else(|| {
            malformed_error!("node {} has no primary protocol", node.index())
        })
    }

    /// Every protocol participating in the statement at `node`: its
    /// executor plus everyone receiving the result or following the control
    /// flow.
    #[must_use]
    pub fn protocols(&self, node: NodeId) -> &BTreeSet<Protocol> {
        self.participants.get(&node).unwrap_or(&self.empty)
    }

    /// The protocols that must synchronize at `statement` before execution
    /// may continue past it.
    ///
    /// Downgrades are the only synchronization points: every protocol in
    /// the program must agree the downgrade happened, or a compromised
    /// host could reorder it around the attack window it closes.
    #[must_use]
    pub fn protocols_requiring_sync(&self, statement: NodeId) -> BTreeSet<Protocol> {
        if let NodeKind::Let { value, .. } = self.tree.kind(statement) {
            if matches!(
                self.tree.kind(*value),
                NodeKind::Declassify { .. } | NodeKind::Endorse { .. }
            ) {
                return self.all_protocols.clone();
            }
        }
        BTreeSet::new()
    }

    /// The protocols `statement` must notify beyond its own participants:
    /// those requiring synchronization that would otherwise not hear about
    /// the statement, restricted to protocols active in the enclosing
    /// block.
    #[must_use]
    pub fn protocols_to_sync(&self, statement: NodeId) -> BTreeSet<Protocol> {
        let requiring = self.protocols_requiring_sync(statement);
        if requiring.is_empty() {
            return requiring;
        }
        let participating = self.protocols(statement);
        let enclosing: BTreeSet<Protocol> = self
            .tree
            .find_ancestor(statement, |kind| matches!(kind, NodeKind::Block { .. }))
            .map(|block| self.protocols(block).clone())
            .unwrap_or_default();
        requiring
            .into_iter()
            .filter(|protocol| !participating.contains(protocol))
            .filter(|protocol| enclosing.contains(protocol))
            .collect()
    }

    /// Primary protocols of declaration sites, straight from the
    /// assignment.
    fn place_declarations(
        &mut self,
        names: &NameAnalysis<'t>,
        assignment: &ProtocolAssignment,
    ) -> Result<()> {
        for declaration in self.tree.function_declarations() {
            for node in self.tree.descendants(declaration) {
                let variable = match self.tree.kind(node) {
                    NodeKind::Let { temporary, value } => {
                        let function = names.enclosing_function_name(node)?;
                        let variable = FunctionVariable::temporary(function, temporary.clone());
                        let protocol = assignment.protocol(&variable)?;
                        if let NodeKind::Input { host, .. } = self.tree.kind(*value) {
                            let expected = Protocol::Local { host: host.clone() };
                            if *protocol != expected {
                                return Err(Error::InputProtocolMismatch {
                                    host: host.name().to_string(),
                                    protocol: protocol.to_string(),
                                    location: self.tree.location(node),
                                });
                            }
                        }
                        variable
                    }
                    NodeKind::DeclareObject { object, .. } => {
                        let function = names.enclosing_function_name(node)?;
                        FunctionVariable::object(function, object.clone())
                    }
                    NodeKind::Parameter { name, .. } => {
                        let function = names.enclosing_function_name(node)?;
                        FunctionVariable::object(function, name.clone())
                    }
                    NodeKind::Argument(crate::syntax::CallArgument::ObjectDeclaration {
                        object,
                        ..
                    }) => {
                        let function = names.enclosing_function_name(node)?;
                        FunctionVariable::object(function, object.clone())
                    }
                    _ => continue,
                };
                let protocol = assignment.protocol(&variable)?.clone();
                self.primaries.insert(node, protocol);
            }
        }
        Ok(())
    }

    /// Primary protocols of statements that act on an existing
    /// declaration.
    fn place_uses(&mut self, names: &NameAnalysis<'t>) -> Result<()> {
        for declaration in self.tree.function_declarations() {
            for node in self.tree.descendants(declaration) {
                match self.tree.kind(node) {
                    NodeKind::Update { .. } | NodeKind::OutParameterInitialization { .. } => {
                        let target = names.declaration(node)?;
                        let protocol = self.primary_protocol(target)?.clone();
                        self.primaries.insert(node, protocol);
                    }
                    NodeKind::Output { host, .. } => {
                        self.primaries
                            .insert(node, Protocol::Local { host: host.clone() });
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }

    /// Closes participant sets by fixpoint; breaks and calls make the
    /// relation cyclic, so one bottom-up pass is not enough.
    fn close_participants(&mut self, names: &NameAnalysis<'t>) -> Result<()> {
        let mut nodes = Vec::new();
        for declaration in self.tree.function_declarations() {
            for node in self.tree.descendants(declaration) {
                if self.tree.kind(node).is_statement()
                    || matches!(
                        self.tree.kind(node),
                        NodeKind::FunctionDeclaration { .. } | NodeKind::Parameter { .. }
                    )
                {
                    nodes.push(node);
                }
            }
        }

        let mut changed = true;
        while changed {
            changed = false;
            for &node in &nodes {
                let updated = self.transfer(node, names)?;
                if self.participants.get(&node) != Some(&updated) {
                    self.participants.insert(node, updated);
                    changed = true;
                }
            }
        }
        Ok(())
    }

    fn transfer(&self, node: NodeId, names: &NameAnalysis<'t>) -> Result<BTreeSet<Protocol>> {
        let mut result = BTreeSet::new();
        match self.tree.kind(node) {
            NodeKind::Let { .. } => {
                result.insert(self.primary_protocol(node)?.clone());
                for &reader in names.readers(node) {
                    match self.tree.kind(reader) {
                        NodeKind::FunctionCall { .. } => {
                            result.extend(self.protocols(names.declaration(reader)?).iter().cloned());
                        }
                        NodeKind::If { .. } | NodeKind::Loop { .. } => {
                            result.extend(self.protocols(reader).iter().cloned());
                        }
                        // Asserts are checked by whoever already holds the
                        // condition; they move no data.
                        NodeKind::Assert { .. } => {}
                        _ => {
                            if let Some(primary) = self.primaries.get(&reader) {
                                result.insert(primary.clone());
                            }
                        }
                    }
                }
            }

            NodeKind::DeclareObject { .. } | NodeKind::Parameter { .. } => {
                result.insert(self.primary_protocol(node)?.clone());
                for user in names.users(node) {
                    let statement = if self.tree.kind(user).is_statement() {
                        Some(user)
                    } else {
                        self.tree.find_ancestor(user, NodeKind::is_statement)
                    };
                    let Some(statement) = statement else { continue };
                    if let NodeKind::FunctionCall { .. } = self.tree.kind(statement) {
                        result.extend(
                            self.protocols(names.declaration(statement)?).iter().cloned(),
                        );
                    } else if let Some(primary) = self.primaries.get(&statement) {
                        result.insert(primary.clone());
                    }
                }
            }

            NodeKind::Update { .. }
            | NodeKind::OutParameterInitialization { .. }
            | NodeKind::Output { .. } => {
                result.insert(self.primary_protocol(node)?.clone());
            }

            NodeKind::FunctionCall { .. } => {
                result.extend(self.protocols(names.declaration(node)?).iter().cloned());
            }

            NodeKind::If {
                then_branch,
                else_branch,
                ..
            } => {
                result.extend(self.protocols(*then_branch).iter().cloned());
                result.extend(self.protocols(*else_branch).iter().cloned());
            }

            NodeKind::Loop { body, .. } => {
                result.extend(self.protocols(*body).iter().cloned());
            }

            NodeKind::Break { .. } => {
                result.extend(self.protocols(names.declaration(node)?).iter().cloned());
            }

            NodeKind::Assert { .. } => {}

            NodeKind::Block { statements } => {
                for &statement in statements {
                    result.extend(self.protocols(statement).iter().cloned());
                }
            }

            NodeKind::FunctionDeclaration {
                parameters, body, ..
            } => {
                for &parameter in parameters {
                    result.extend(self.protocols(parameter).iter().cloned());
                }
                result.extend(self.protocols(*body).iter().cloned());
            }

            _ => {}
        }
        Ok(result)
    }
}
