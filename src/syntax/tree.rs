//! The arena-backed program tree.
//!
//! All nodes of a program live in one flat arena and reference each other
//! through [`NodeId`] indices. The tree is immutable once built; parent
//! links and the declaration index are computed a single time by
//! [`ProgramBuilder::build`]. Analyses attach nothing to nodes — they keep
//! their own maps keyed by [`NodeId`].
//!
//! Expressions are in administrative normal form: compound expressions
//! (operator applications, queries, downgrades) only reference atomic
//! expressions (literals and temporary reads), and every intermediate result
//! is bound by a let statement. The elaborator that produces this form is
//! outside the crate; the analyses rely on the convention but re-validate
//! node kinds wherever they destructure.

use crate::security::LabelExpression;
use crate::syntax::{
    FunctionName, Host, JumpLabel, LabelParameter, MethodName, ObjectType, ObjectVariable,
    Operator, ParameterDirection, SourceLocation, Value, Variable,
};
use crate::Result;

/// A stable index of a node in its [`ProgramTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u32);

impl NodeId {
    /// The raw index.
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// One argument at a function call site.
///
/// The argument form determines its direction: expressions and object
/// references are `in`, out-parameter and object-declaration arguments are
/// `out`.
#[derive(Debug, Clone)]
pub enum CallArgument {
    /// An atomic expression passed by value.
    Expression {
        /// The argument expression.
        value: NodeId,
    },
    /// An existing object passed for the callee to read.
    ObjectReference {
        /// The referenced object.
        object: ObjectVariable,
    },
    /// One of the caller's own out parameters, delegated to the callee.
    OutParameter {
        /// The delegated parameter.
        parameter: ObjectVariable,
    },
    /// A new object declared at the call site and initialized by the callee.
    ObjectDeclaration {
        /// The newly declared object.
        object: ObjectVariable,
        /// Its type.
        object_type: ObjectType,
        /// Optional label annotation.
        label: Option<LabelExpression>,
    },
}

/// The payload of one tree node.
#[derive(Debug, Clone)]
pub enum NodeKind {
    // ----- expressions -----
    /// A literal value. Atomic.
    Literal {
        /// The value.
        value: Value,
    },
    /// A read of a let-bound temporary. Atomic.
    ReadTemporary {
        /// The temporary being read.
        temporary: Variable,
    },
    /// An operator applied to atomic arguments.
    Operator {
        /// The operator.
        operator: Operator,
        /// Argument expressions.
        arguments: Vec<NodeId>,
    },
    /// A side-effect-free method read on an object.
    Query {
        /// The receiving object.
        object: ObjectVariable,
        /// The method.
        method: MethodName,
        /// Argument expressions.
        arguments: Vec<NodeId>,
    },
    /// Lowers the confidentiality of the inner expression.
    Declassify {
        /// The expression being downgraded.
        expression: NodeId,
        /// The label the expression is asserted to have, if annotated.
        from_label: Option<LabelExpression>,
        /// The label after the downgrade.
        to_label: LabelExpression,
    },
    /// Raises the integrity of the inner expression.
    Endorse {
        /// The expression being downgraded.
        expression: NodeId,
        /// The label the expression is asserted to have, if annotated.
        from_label: Option<LabelExpression>,
        /// The label after the downgrade.
        to_label: LabelExpression,
    },
    /// A value read from a host's environment.
    Input {
        /// Type of the value.
        value_type: crate::syntax::ValueType,
        /// The host the value comes from.
        host: Host,
    },

    // ----- statements -----
    /// Binds a temporary to the value of an expression.
    Let {
        /// The defined temporary.
        temporary: Variable,
        /// The bound expression.
        value: NodeId,
    },
    /// Declares and constructs an object.
    DeclareObject {
        /// The declared object.
        object: ObjectVariable,
        /// Its type.
        object_type: ObjectType,
        /// Optional label annotation; unannotated objects get an inferred
        /// label.
        label: Option<LabelExpression>,
        /// Constructor arguments.
        arguments: Vec<NodeId>,
    },
    /// Invokes an update method on an object.
    Update {
        /// The receiving object.
        object: ObjectVariable,
        /// The method.
        method: MethodName,
        /// Argument expressions.
        arguments: Vec<NodeId>,
    },
    /// Initializes one of the enclosing function's out parameters.
    OutParameterInitialization {
        /// The parameter being initialized.
        parameter: ObjectVariable,
        /// Constructor arguments for the parameter's object type.
        arguments: Vec<NodeId>,
    },
    /// Sends a value to a host's environment.
    Output {
        /// The sent expression.
        message: NodeId,
        /// The receiving host.
        host: Host,
    },
    /// Calls a declared function.
    FunctionCall {
        /// The callee.
        function: FunctionName,
        /// Argument nodes; each is a [`NodeKind::Argument`].
        arguments: Vec<NodeId>,
    },
    /// One argument of a function call.
    Argument(CallArgument),
    /// A two-way conditional.
    If {
        /// The guard expression.
        guard: NodeId,
        /// Block executed when the guard holds.
        then_branch: NodeId,
        /// Block executed otherwise.
        else_branch: NodeId,
    },
    /// An infinite loop, exited by break statements.
    Loop {
        /// Optional jump label for breaks.
        jump_label: Option<JumpLabel>,
        /// The loop body block.
        body: NodeId,
    },
    /// Exits the innermost (or named) enclosing loop.
    Break {
        /// The targeted loop's label, if explicit.
        jump_label: Option<JumpLabel>,
    },
    /// Checks a condition every participant can evaluate.
    Assert {
        /// The asserted condition.
        condition: NodeId,
    },
    /// A sequence of statements.
    Block {
        /// The statements, in order.
        statements: Vec<NodeId>,
    },

    // ----- declarations -----
    /// Declares a host and its authority.
    HostDeclaration {
        /// The host.
        host: Host,
        /// The host's authority label.
        authority: LabelExpression,
    },
    /// Declares a function.
    FunctionDeclaration {
        /// The function's name.
        function: FunctionName,
        /// Polymorphic label parameters.
        label_parameters: Vec<LabelParameter>,
        /// Parameter nodes; each is a [`NodeKind::Parameter`].
        parameters: Vec<NodeId>,
        /// Optional bound on the function's program counter label.
        pc_label: Option<LabelExpression>,
        /// The body block.
        body: NodeId,
    },
    /// One function parameter.
    Parameter {
        /// The parameter's name; parameters are object-typed.
        name: ObjectVariable,
        /// Whether the caller supplies or receives the value.
        direction: ParameterDirection,
        /// The parameter's object type.
        object_type: ObjectType,
        /// Optional label annotation, possibly mentioning label parameters.
        label: Option<LabelExpression>,
    },
    /// The root node holding all top-level declarations.
    Program {
        /// Host and function declarations.
        declarations: Vec<NodeId>,
    },
}

impl NodeKind {
    /// The node ids this node directly references, in source order.
    #[must_use]
    pub fn children(&self) -> Vec<NodeId> {
        match self {
            Self::Literal { .. }
            | Self::ReadTemporary { .. }
            | Self::Input { .. }
            | Self::Break { .. }
            | Self::HostDeclaration { .. }
            | Self::Parameter { .. } => Vec::new(),
            Self::Operator { arguments, .. }
            | Self::Query { arguments, .. }
            | Self::Update { arguments, .. }
            | Self::OutParameterInitialization { arguments, .. }
            | Self::DeclareObject { arguments, .. }
            | Self::FunctionCall { arguments, .. } => arguments.clone(),
            Self::Declassify { expression, .. } | Self::Endorse { expression, .. } => {
                vec![*expression]
            }
            Self::Let { value, .. } => vec![*value],
            Self::Output { message, .. } => vec![*message],
            Self::Argument(argument) => match argument {
                CallArgument::Expression { value } => vec![*value],
                CallArgument::ObjectReference { .. }
                | CallArgument::OutParameter { .. }
                | CallArgument::ObjectDeclaration { .. } => Vec::new(),
            },
            Self::If {
                guard,
                then_branch,
                else_branch,
            } => vec![*guard, *then_branch, *else_branch],
            Self::Loop { body, .. } => vec![*body],
            Self::Assert { condition } => vec![*condition],
            Self::Block { statements } => statements.clone(),
            Self::FunctionDeclaration {
                parameters, body, ..
            } => {
                let mut children = parameters.clone();
                children.push(*body);
                children
            }
            Self::Program { declarations } => declarations.clone(),
        }
    }

    /// Returns `true` for expression nodes.
    #[must_use]
    pub fn is_expression(&self) -> bool {
        matches!(
            self,
            Self::Literal { .. }
                | Self::ReadTemporary { .. }
                | Self::Operator { .. }
                | Self::Query { .. }
                | Self::Declassify { .. }
                | Self::Endorse { .. }
                | Self::Input { .. }
        )
    }

    /// Returns `true` for statement nodes.
    #[must_use]
    pub fn is_statement(&self) -> bool {
        matches!(
            self,
            Self::Let { .. }
                | Self::DeclareObject { .. }
                | Self::Update { .. }
                | Self::OutParameterInitialization { .. }
                | Self::Output { .. }
                | Self::FunctionCall { .. }
                | Self::If { .. }
                | Self::Loop { .. }
                | Self::Break { .. }
                | Self::Assert { .. }
                | Self::Block { .. }
        )
    }
}

#[derive(Debug)]
struct NodeData {
    kind: NodeKind,
    location: SourceLocation,
    parent: Option<NodeId>,
}

/// An immutable program.
#[derive(Debug)]
pub struct ProgramTree {
    nodes: Vec<NodeData>,
    root: NodeId,
}

impl ProgramTree {
    /// The payload of `node`.
    #[must_use]
    pub fn kind(&self, node: NodeId) -> &NodeKind {
        &self.nodes[node.index()].kind
    }

    /// The source location of `node`.
    #[must_use]
    pub fn location(&self, node: NodeId) -> SourceLocation {
        self.nodes[node.index()].location
    }

    /// The parent of `node`; only the root has none.
    #[must_use]
    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.index()].parent
    }

    /// The root [`NodeKind::Program`] node.
    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// The direct children of `node`, in source order.
    #[must_use]
    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.kind(node).children()
    }

    /// All node ids, in creation order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len() as u32).map(NodeId)
    }

    /// Number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// All host declaration nodes.
    pub fn host_declarations(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.children(self.root)
            .into_iter()
            .filter(|&id| matches!(self.kind(id), NodeKind::HostDeclaration { .. }))
    }

    /// All function declaration nodes, in declaration order.
    pub fn function_declarations(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.children(self.root)
            .into_iter()
            .filter(|&id| matches!(self.kind(id), NodeKind::FunctionDeclaration { .. }))
    }

    /// Looks up a function declaration by name.
    #[must_use]
    pub fn function(&self, name: &FunctionName) -> Option<NodeId> {
        self.function_declarations().find(|&id| {
            matches!(self.kind(id), NodeKind::FunctionDeclaration { function, .. } if function == name)
        })
    }

    /// The `main` function's declaration node.
    ///
    /// # Errors
    ///
    /// Fails with [`crate::Error::UndefinedName`] if the program declares no
    /// `main`.
    pub fn main(&self) -> Result<NodeId> {
        self.function(&FunctionName::new("main"))
            .ok_or_else(|| crate::Error::UndefinedName {
                name: "main".to_string(),
                location: self.location(self.root),
            })
    }

    /// The statements before `statement` in its enclosing block, closest
    /// first. Empty if the node is not directly inside a block.
    #[must_use]
    pub fn preceding_statements(&self, statement: NodeId) -> Vec<NodeId> {
        let Some(parent) = self.parent(statement) else {
            return Vec::new();
        };
        let NodeKind::Block { statements } = self.kind(parent) else {
            return Vec::new();
        };
        let mut preceding: Vec<NodeId> = statements
            .iter()
            .take_while(|&&id| id != statement)
            .copied()
            .collect();
        preceding.reverse();
        preceding
    }

    /// Walks parent links until `predicate` matches; returns that ancestor.
    #[must_use]
    pub fn find_ancestor(
        &self,
        node: NodeId,
        predicate: impl Fn(&NodeKind) -> bool,
    ) -> Option<NodeId> {
        let mut current = self.parent(node);
        while let Some(ancestor) = current {
            if predicate(self.kind(ancestor)) {
                return Some(ancestor);
            }
            current = self.parent(ancestor);
        }
        None
    }

    /// The function declaration enclosing `node`, if any.
    #[must_use]
    pub fn enclosing_function(&self, node: NodeId) -> Option<NodeId> {
        if matches!(self.kind(node), NodeKind::FunctionDeclaration { .. }) {
            return Some(node);
        }
        self.find_ancestor(node, |kind| {
            matches!(kind, NodeKind::FunctionDeclaration { .. })
        })
    }

    /// All nodes of the subtree rooted at `node`, preorder.
    #[must_use]
    pub fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        let mut result = Vec::new();
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            result.push(current);
            let mut children = self.children(current);
            children.reverse();
            stack.extend(children);
        }
        result
    }
}

/// Constructs a [`ProgramTree`] node by node.
///
/// Children must be added before the nodes that reference them; the final
/// [`ProgramBuilder::build`] call validates all references and computes
/// parent links.
#[derive(Default)]
pub struct ProgramBuilder {
    nodes: Vec<(NodeKind, SourceLocation)>,
}

impl ProgramBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node and returns its id.
    pub fn add(&mut self, kind: NodeKind, location: SourceLocation) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push((kind, location));
        id
    }

    /// Finishes the tree with `root` as the program node.
    ///
    /// # Errors
    ///
    /// Fails with [`crate::Error::MalformedProgram`] if `root` is not a
    /// [`NodeKind::Program`], a child reference is out of range, or a node
    /// is referenced by two parents.
    pub fn build(self, root: NodeId) -> Result<ProgramTree> {
        let mut nodes: Vec<NodeData> = self
            .nodes
            .into_iter()
            .map(|(kind, location)| NodeData {
                kind,
                location,
                parent: None,
            })
            .collect();

        if root.index() >= nodes.len() {
            return Err(malformed_error!("root node {} is out of range", root.index()));
        }
        if !matches!(nodes[root.index()].kind, NodeKind::Program { .. }) {
            return Err(malformed_error!("root node must be a program node"));
        }

        for parent in 0..nodes.len() {
            let parent_id = NodeId(parent as u32);
            for child in nodes[parent].kind.children() {
                if child.index() >= nodes.len() {
                    return Err(malformed_error!(
                        "node {} references missing child {}",
                        parent,
                        child.index()
                    ));
                }
                if nodes[child.index()].parent.is_some() {
                    return Err(malformed_error!(
                        "node {} already has a parent",
                        child.index()
                    ));
                }
                nodes[child.index()].parent = Some(parent_id);
            }
        }

        Ok(ProgramTree { nodes, root })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_computes_parent_links() {
        let mut builder = ProgramBuilder::new();
        let here = SourceLocation::new(1, 1);
        let literal = builder.add(
            NodeKind::Literal {
                value: Value::Integer(1),
            },
            here,
        );
        let binding = builder.add(
            NodeKind::Let {
                temporary: Variable::new("x"),
                value: literal,
            },
            here,
        );
        let body = builder.add(
            NodeKind::Block {
                statements: vec![binding],
            },
            here,
        );
        let function = builder.add(
            NodeKind::FunctionDeclaration {
                function: FunctionName::new("main"),
                label_parameters: vec![],
                parameters: vec![],
                pc_label: None,
                body,
            },
            here,
        );
        let root = builder.add(
            NodeKind::Program {
                declarations: vec![function],
            },
            here,
        );
        let tree = builder.build(root).unwrap();

        assert_eq!(tree.parent(literal), Some(binding));
        assert_eq!(tree.parent(binding), Some(body));
        assert_eq!(tree.parent(root), None);
        assert_eq!(tree.main().unwrap(), function);
        assert_eq!(tree.enclosing_function(literal), Some(function));
    }

    #[test]
    fn double_parent_is_rejected() {
        let mut builder = ProgramBuilder::new();
        let here = SourceLocation::new(1, 1);
        let literal = builder.add(
            NodeKind::Literal {
                value: Value::Integer(1),
            },
            here,
        );
        let first = builder.add(
            NodeKind::Let {
                temporary: Variable::new("x"),
                value: literal,
            },
            here,
        );
        let second = builder.add(
            NodeKind::Let {
                temporary: Variable::new("y"),
                value: literal,
            },
            here,
        );
        let body = builder.add(
            NodeKind::Block {
                statements: vec![first, second],
            },
            here,
        );
        let root = builder.add(
            NodeKind::Program {
                declarations: vec![body],
            },
            here,
        );
        assert!(builder.build(root).is_err());
    }

    #[test]
    fn preceding_statements_are_closest_first() {
        let mut builder = ProgramBuilder::new();
        let here = SourceLocation::new(1, 1);
        let statements: Vec<NodeId> = (0..3)
            .map(|i| {
                let value = builder.add(
                    NodeKind::Literal {
                        value: Value::Integer(i),
                    },
                    here,
                );
                builder.add(
                    NodeKind::Let {
                        temporary: Variable::new(format!("t{i}")),
                        value,
                    },
                    here,
                )
            })
            .collect();
        let block = builder.add(
            NodeKind::Block {
                statements: statements.clone(),
            },
            here,
        );
        let root = builder.add(
            NodeKind::Program {
                declarations: vec![block],
            },
            here,
        );
        let tree = builder.build(root).unwrap();
        assert_eq!(
            tree.preceding_statements(statements[2]),
            vec![statements[1], statements[0]]
        );
    }
}
