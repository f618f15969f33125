//! Call-site specialization.
//!
//! Selection decides one protocol per function variable, so a function
//! called from two places with different labels or protocols needs two
//! copies. This pass clones the call graph reachable from `main` until
//! every function has exactly one call site; later analyses then never see
//! a variable shared between calling contexts. Recursion would clone
//! forever, so the copy depth is bounded and exceeding the bound is an
//! error.

use std::collections::VecDeque;

use crate::syntax::{
    FunctionName, NodeId, NodeKind, ProgramBuilder, ProgramTree,
};
use crate::util::FreshNameGenerator;
use crate::{Error, Result};

/// Limits on the specialization pass.
#[derive(Debug, Clone, Copy)]
pub struct SpecializationBounds {
    /// Maximum depth of the specialized call tree, counted from `main`.
    pub depth_limit: usize,
}

impl Default for SpecializationBounds {
    fn default() -> Self {
        Self { depth_limit: 32 }
    }
}

/// Rewrites `tree` so every function has a single call site.
///
/// `main` keeps its name; every other reachable function is copied once per
/// call site under a fresh name, and the call statements are rewritten to
/// name their private copy. Functions unreachable from `main` are dropped.
///
/// # Errors
///
/// Fails with [`Error::SpecializationDepthExceeded`] when the copied call
/// tree grows deeper than `bounds` allow, which happens exactly when the
/// program recurses.
pub fn specialize(tree: &ProgramTree, bounds: &SpecializationBounds) -> Result<ProgramTree> {
    let reserved = tree.function_declarations().filter_map(|declaration| {
        match tree.kind(declaration) {
            NodeKind::FunctionDeclaration { function, .. } => {
                Some(function.name().to_string())
            }
            _ => None,
        }
    });

    let mut specializer = Specializer {
        tree,
        builder: ProgramBuilder::new(),
        generator: FreshNameGenerator::with_reserved(reserved),
        worklist: VecDeque::new(),
        depth_limit: bounds.depth_limit,
    };

    let mut declarations = Vec::new();
    for host in tree.host_declarations() {
        declarations.push(
            specializer
                .builder
                .add(tree.kind(host).clone(), tree.location(host)),
        );
    }

    specializer
        .worklist
        .push_back((tree.main()?, FunctionName::new("main"), 0));
    let mut copies = 0_usize;
    while let Some((declaration, name, depth)) = specializer.worklist.pop_front() {
        declarations.push(specializer.copy_function(declaration, name, depth)?);
        copies += 1;
    }
    tracing::debug!(functions = copies, "specialized call sites");

    let root = specializer.builder.add(
        NodeKind::Program { declarations },
        tree.location(tree.root()),
    );
    specializer.builder.build(root)
}

struct Specializer<'t> {
    tree: &'t ProgramTree,
    builder: ProgramBuilder,
    generator: FreshNameGenerator,
    /// Original declaration, the copy's name, and the copy's depth.
    worklist: VecDeque<(NodeId, FunctionName, usize)>,
    depth_limit: usize,
}

impl Specializer<'_> {
    fn copy_function(
        &mut self,
        declaration: NodeId,
        name: FunctionName,
        depth: usize,
    ) -> Result<NodeId> {
        let NodeKind::FunctionDeclaration {
            label_parameters,
            parameters,
            pc_label,
            body,
            ..
        } = self.tree.kind(declaration).clone()
        else {
            return Err(malformed_error!("expected a function declaration"));
        };
        let parameters = parameters
            .into_iter()
            .map(|parameter| self.copy_node(parameter, depth))
            .collect::<Result<Vec<_>>>()?;
        let body = self.copy_node(body, depth)?;
        Ok(self.builder.add(
            NodeKind::FunctionDeclaration {
                function: name,
                label_parameters,
                parameters,
                pc_label,
                body,
            },
            self.tree.location(declaration),
        ))
    }

    /// Copies the subtree at `node`, bottom-up so children exist before
    /// their parents reference them.
    fn copy_node(&mut self, node: NodeId, depth: usize) -> Result<NodeId> {
        let location = self.tree.location(node);
        let kind = match self.tree.kind(node).clone() {
            NodeKind::FunctionCall {
                function,
                arguments,
            } => {
                let next = depth + 1;
                if next > self.depth_limit {
                    return Err(Error::SpecializationDepthExceeded {
                        function: function.name().to_string(),
                        limit: self.depth_limit,
                    });
                }
                let declaration = self.tree.function(&function).ok_or_else(|| {
                    malformed_error!("call to undeclared function `{}`", function)
                })?;
                let copy = FunctionName::new(self.generator.fresh(function.name()));
                self.worklist.push_back((declaration, copy.clone(), next));
                let arguments = self.copy_all(arguments, depth)?;
                NodeKind::FunctionCall {
                    function: copy,
                    arguments,
                }
            }

            NodeKind::Operator {
                operator,
                arguments,
            } => NodeKind::Operator {
                operator,
                arguments: self.copy_all(arguments, depth)?,
            },
            NodeKind::Query {
                object,
                method,
                arguments,
            } => NodeKind::Query {
                object,
                method,
                arguments: self.copy_all(arguments, depth)?,
            },
            NodeKind::Update {
                object,
                method,
                arguments,
            } => NodeKind::Update {
                object,
                method,
                arguments: self.copy_all(arguments, depth)?,
            },
            NodeKind::DeclareObject {
                object,
                object_type,
                label,
                arguments,
            } => NodeKind::DeclareObject {
                object,
                object_type,
                label,
                arguments: self.copy_all(arguments, depth)?,
            },
            NodeKind::OutParameterInitialization {
                parameter,
                arguments,
            } => NodeKind::OutParameterInitialization {
                parameter,
                arguments: self.copy_all(arguments, depth)?,
            },

            NodeKind::Declassify {
                expression,
                from_label,
                to_label,
            } => NodeKind::Declassify {
                expression: self.copy_node(expression, depth)?,
                from_label,
                to_label,
            },
            NodeKind::Endorse {
                expression,
                from_label,
                to_label,
            } => NodeKind::Endorse {
                expression: self.copy_node(expression, depth)?,
                from_label,
                to_label,
            },
            NodeKind::Let { temporary, value } => NodeKind::Let {
                temporary,
                value: self.copy_node(value, depth)?,
            },
            NodeKind::Output { message, host } => NodeKind::Output {
                message: self.copy_node(message, depth)?,
                host,
            },
            NodeKind::Argument(argument) => {
                let argument = match argument {
                    crate::syntax::CallArgument::Expression { value } => {
                        crate::syntax::CallArgument::Expression {
                            value: self.copy_node(value, depth)?,
                        }
                    }
                    other => other,
                };
                NodeKind::Argument(argument)
            }
            NodeKind::If {
                guard,
                then_branch,
                else_branch,
            } => NodeKind::If {
                guard: self.copy_node(guard, depth)?,
                then_branch: self.copy_node(then_branch, depth)?,
                else_branch: self.copy_node(else_branch, depth)?,
            },
            NodeKind::Loop { jump_label, body } => NodeKind::Loop {
                jump_label,
                body: self.copy_node(body, depth)?,
            },
            NodeKind::Assert { condition } => NodeKind::Assert {
                condition: self.copy_node(condition, depth)?,
            },
            NodeKind::Block { statements } => NodeKind::Block {
                statements: self.copy_all(statements, depth)?,
            },

            // Leaves carry no node references.
            leaf @ (NodeKind::Literal { .. }
            | NodeKind::ReadTemporary { .. }
            | NodeKind::Input { .. }
            | NodeKind::Break { .. }
            | NodeKind::Parameter { .. }) => leaf,

            NodeKind::HostDeclaration { .. }
            | NodeKind::FunctionDeclaration { .. }
            | NodeKind::Program { .. } => {
                return Err(malformed_error!(
                    "declaration node {} inside a function body",
                    node.index()
                ));
            }
        };
        Ok(self.builder.add(kind, location))
    }

    fn copy_all(&mut self, nodes: Vec<NodeId>, depth: usize) -> Result<Vec<NodeId>> {
        nodes
            .into_iter()
            .map(|node| self.copy_node(node, depth))
            .collect()
    }
}
