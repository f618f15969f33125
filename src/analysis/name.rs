//! Name resolution.
//!
//! Associates every use of a name with its declaration and builds the
//! reverse indices (readers, queriers, updaters, breaks, call sites) the
//! later analyses consume. Resolution happens eagerly during construction;
//! a [`NameAnalysis`] value is proof that every name in the program
//! resolves and that no scope declares a name twice.
//!
//! Scoping rules: declarations inside a block never escape it. Temporary
//! scope additionally resets at blocks directly under a function or loop,
//! so each iteration and each function body starts with a clean temporary
//! namespace; object variables are only block-scoped. Breaks resolve to the
//! innermost enclosing loop, or the nearest one carrying the named jump
//! label.

use std::collections::{BTreeSet, HashMap};

use crate::syntax::{
    CallArgument, FunctionName, Host, JumpLabel, NodeId, NodeKind, ObjectVariable,
    ParameterDirection, ProgramTree, Variable,
};
use crate::{Error, Result};

/// Lexical context threaded through one function body.
#[derive(Clone, Default)]
struct Scope {
    temporaries: HashMap<Variable, NodeId>,
    objects: HashMap<ObjectVariable, NodeId>,
}

/// Name resolution results for one program.
#[derive(Debug)]
pub struct NameAnalysis<'t> {
    tree: &'t ProgramTree,
    /// Use site to declaration site, for every referencing node.
    declarations: HashMap<NodeId, NodeId>,
    /// Let statement to the statements that directly read its temporary.
    readers: HashMap<NodeId, BTreeSet<NodeId>>,
    /// Object declaration to the query nodes reading it.
    queriers: HashMap<NodeId, BTreeSet<NodeId>>,
    /// Object declaration to the update nodes writing it.
    updaters: HashMap<NodeId, BTreeSet<NodeId>>,
    /// Object declaration to the call arguments referencing it.
    argument_uses: HashMap<NodeId, BTreeSet<NodeId>>,
    /// Loop node to its break nodes.
    breaks: HashMap<NodeId, BTreeSet<NodeId>>,
    /// Function declaration to its call sites.
    calls: HashMap<NodeId, BTreeSet<NodeId>>,
    /// Function name to every function transitively reachable from it.
    reachable: HashMap<FunctionName, BTreeSet<FunctionName>>,
    empty: BTreeSet<NodeId>,
}

impl<'t> NameAnalysis<'t> {
    /// Resolves every name in `tree`.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::UndefinedName`] if a name has no in-scope
    /// declaration and [`Error::NameClash`] if a scope declares a name
    /// twice.
    pub fn new(tree: &'t ProgramTree) -> Result<Self> {
        let mut analysis = Self {
            tree,
            declarations: HashMap::new(),
            readers: HashMap::new(),
            queriers: HashMap::new(),
            updaters: HashMap::new(),
            argument_uses: HashMap::new(),
            breaks: HashMap::new(),
            calls: HashMap::new(),
            reachable: HashMap::new(),
            empty: BTreeSet::new(),
        };
        let resolver = Resolver::new(tree)?;
        for function in tree.function_declarations() {
            analysis.resolve_function(function, &resolver)?;
        }
        analysis.close_reachable(&resolver)?;
        tracing::debug!(
            uses = analysis.declarations.len(),
            functions = resolver.functions.len(),
            "resolved names"
        );
        Ok(analysis)
    }

    /// The declaration site of the name used at `use_site`.
    ///
    /// Use sites are temporary reads, queries, updates, out-parameter
    /// initializations, breaks, function calls, object-reference and
    /// out-parameter arguments, and input/output statements (resolving to
    /// the host declaration).
    ///
    /// # Errors
    ///
    /// Fails if `use_site` is not a referencing node; every referencing
    /// node was resolved at construction.
    pub fn declaration(&self, use_site: NodeId) -> Result<NodeId> {
        self.declarations.get(&use_site).copied().ok_or_else(|| {
            malformed_error!("node {} does not reference a name", use_site.index())
        })
    }

    /// The statements that directly read the temporary defined by `let_node`.
    ///
    /// Direct means via an expression child: an if statement reads only the
    /// temporaries of its guard, never those of its branches.
    #[must_use]
    pub fn readers(&self, let_node: NodeId) -> &BTreeSet<NodeId> {
        self.readers.get(&let_node).unwrap_or(&self.empty)
    }

    /// The query nodes reading the object declared at `declaration`.
    #[must_use]
    pub fn queriers(&self, declaration: NodeId) -> &BTreeSet<NodeId> {
        self.queriers.get(&declaration).unwrap_or(&self.empty)
    }

    /// The update nodes writing the object declared at `declaration`.
    #[must_use]
    pub fn updaters(&self, declaration: NodeId) -> &BTreeSet<NodeId> {
        self.updaters.get(&declaration).unwrap_or(&self.empty)
    }

    /// Every query, update, and call-argument use of the object declared at
    /// `declaration`.
    #[must_use]
    pub fn users(&self, declaration: NodeId) -> BTreeSet<NodeId> {
        let mut users = self.queriers(declaration).clone();
        users.extend(self.updaters(declaration).iter().copied());
        users.extend(self.argument_uses(declaration).iter().copied());
        users
    }

    /// The call arguments that pass the object declared at `declaration`.
    #[must_use]
    pub fn argument_uses(&self, declaration: NodeId) -> &BTreeSet<NodeId> {
        self.argument_uses.get(&declaration).unwrap_or(&self.empty)
    }

    /// The break statements exiting the loop at `loop_node`.
    #[must_use]
    pub fn corresponding_breaks(&self, loop_node: NodeId) -> &BTreeSet<NodeId> {
        self.breaks.get(&loop_node).unwrap_or(&self.empty)
    }

    /// The call sites of the function declared at `declaration`.
    #[must_use]
    pub fn calls(&self, declaration: NodeId) -> &BTreeSet<NodeId> {
        self.calls.get(&declaration).unwrap_or(&self.empty)
    }

    /// Every function transitively reachable from `function` through calls.
    #[must_use]
    pub fn reachable_functions(&self, function: &FunctionName) -> BTreeSet<FunctionName> {
        self.reachable.get(function).cloned().unwrap_or_default()
    }

    /// The name of the function whose body contains `node`.
    ///
    /// # Errors
    ///
    /// Fails if `node` sits outside every function body.
    pub fn enclosing_function_name(&self, node: NodeId) -> Result<FunctionName> {
        let function = self
            .tree
            .enclosing_function(node)
            .ok_or_else(|| malformed_error!("node {} is not inside a function", node.index()))?;
        match self.tree.kind(function) {
            NodeKind::FunctionDeclaration { function, .. } => Ok(function.clone()),
            _ => Err(malformed_error!("enclosing node is not a function")),
        }
    }

    /// The callee parameter node that `argument` is passed for.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::IncorrectNumberOfArguments`] when the call
    /// supplies more arguments than the callee declares.
    pub fn parameter(&self, argument: NodeId) -> Result<NodeId> {
        let call = self
            .tree
            .parent(argument)
            .ok_or_else(|| malformed_error!("argument {} has no parent", argument.index()))?;
        let NodeKind::FunctionCall { arguments, .. } = self.tree.kind(call) else {
            return Err(malformed_error!("argument parent is not a function call"));
        };
        let index = arguments
            .iter()
            .position(|&id| id == argument)
            .ok_or_else(|| malformed_error!("argument not found in its call"))?;
        let callee = self.declaration(call)?;
        let NodeKind::FunctionDeclaration { parameters, .. } = self.tree.kind(callee) else {
            return Err(malformed_error!("call resolves to a non-function"));
        };
        parameters.get(index).copied().ok_or_else(|| {
            Error::IncorrectNumberOfArguments {
                expected: parameters.len(),
                actual: arguments.len(),
                location: self.tree.location(call),
            }
        })
    }

    /// The function declaration owning the parameter node `parameter`.
    ///
    /// # Errors
    ///
    /// Fails if `parameter` is not a parameter node.
    pub fn parameter_function(&self, parameter: NodeId) -> Result<NodeId> {
        let function = self
            .tree
            .parent(parameter)
            .ok_or_else(|| malformed_error!("parameter {} has no parent", parameter.index()))?;
        match self.tree.kind(function) {
            NodeKind::FunctionDeclaration { .. } => Ok(function),
            _ => Err(malformed_error!("parameter parent is not a function")),
        }
    }

    fn resolve_function(&mut self, function: NodeId, resolver: &Resolver) -> Result<()> {
        let NodeKind::FunctionDeclaration {
            parameters, body, ..
        } = self.tree.kind(function)
        else {
            return Err(malformed_error!("expected a function declaration"));
        };

        let mut scope = Scope::default();
        for &parameter in parameters {
            let NodeKind::Parameter { name, .. } = self.tree.kind(parameter) else {
                return Err(malformed_error!("expected a parameter node"));
            };
            self.declare_object(&mut scope, name.clone(), parameter)?;
        }
        let mut jumps = Vec::new();
        self.resolve_block(*body, scope, true, &mut jumps, resolver)
    }

    fn resolve_block(
        &mut self,
        block: NodeId,
        mut scope: Scope,
        reset_temporaries: bool,
        jumps: &mut Vec<(Option<JumpLabel>, NodeId)>,
        resolver: &Resolver,
    ) -> Result<()> {
        let NodeKind::Block { statements } = self.tree.kind(block) else {
            return Err(malformed_error!("expected a block node"));
        };
        if reset_temporaries {
            scope.temporaries.clear();
        }
        for &statement in statements {
            self.resolve_statement(statement, &mut scope, jumps, resolver)?;
        }
        Ok(())
    }

    fn resolve_statement(
        &mut self,
        statement: NodeId,
        scope: &mut Scope,
        jumps: &mut Vec<(Option<JumpLabel>, NodeId)>,
        resolver: &Resolver,
    ) -> Result<()> {
        match self.tree.kind(statement).clone() {
            NodeKind::Let { temporary, value } => {
                self.resolve_expression(value, statement, scope, resolver)?;
                self.declare_temporary(scope, temporary, statement)
            }
            NodeKind::DeclareObject {
                object, arguments, ..
            } => {
                for argument in arguments {
                    self.resolve_expression(argument, statement, scope, resolver)?;
                }
                self.declare_object(scope, object, statement)
            }
            NodeKind::Update {
                object, arguments, ..
            } => {
                let declaration = self.resolve_object(&object, statement, scope)?;
                self.updaters.entry(declaration).or_default().insert(statement);
                for argument in arguments {
                    self.resolve_expression(argument, statement, scope, resolver)?;
                }
                Ok(())
            }
            NodeKind::OutParameterInitialization {
                parameter,
                arguments,
            } => {
                let declaration = self.resolve_object(&parameter, statement, scope)?;
                if !self.is_out_parameter(declaration) {
                    return Err(Error::UndefinedName {
                        name: parameter.name().to_string(),
                        location: self.tree.location(statement),
                    });
                }
                self.declarations.insert(statement, declaration);
                for argument in arguments {
                    self.resolve_expression(argument, statement, scope, resolver)?;
                }
                Ok(())
            }
            NodeKind::Output { message, .. } => {
                self.resolve_host(statement, resolver)?;
                self.resolve_expression(message, statement, scope, resolver)
            }
            NodeKind::FunctionCall {
                function,
                arguments,
            } => {
                let declaration = resolver.function(&function, self.tree.location(statement))?;
                self.declarations.insert(statement, declaration);
                self.calls.entry(declaration).or_default().insert(statement);
                for argument in arguments {
                    self.resolve_argument(argument, statement, scope, resolver)?;
                }
                Ok(())
            }
            NodeKind::If {
                guard,
                then_branch,
                else_branch,
            } => {
                self.resolve_expression(guard, statement, scope, resolver)?;
                self.resolve_block(then_branch, scope.clone(), false, jumps, resolver)?;
                self.resolve_block(else_branch, scope.clone(), false, jumps, resolver)
            }
            NodeKind::Loop { jump_label, body } => {
                jumps.push((jump_label, statement));
                let result = self.resolve_block(body, scope.clone(), true, jumps, resolver);
                jumps.pop();
                result
            }
            NodeKind::Break { jump_label } => {
                let target = match &jump_label {
                    None => jumps.last().map(|(_, target)| *target),
                    Some(label) => jumps
                        .iter()
                        .rev()
                        .find(|(candidate, _)| candidate.as_ref() == Some(label))
                        .map(|(_, target)| *target),
                };
                let target = target.ok_or_else(|| Error::UndefinedName {
                    name: jump_label
                        .as_ref()
                        .map_or_else(|| "break".to_string(), |label| label.name().to_string()),
                    location: self.tree.location(statement),
                })?;
                self.declarations.insert(statement, target);
                self.breaks.entry(target).or_default().insert(statement);
                Ok(())
            }
            NodeKind::Assert { condition } => {
                self.resolve_expression(condition, statement, scope, resolver)
            }
            NodeKind::Block { .. } => {
                self.resolve_block(statement, scope.clone(), false, jumps, resolver)
            }
            other => Err(malformed_error!(
                "unexpected statement kind {:?}",
                std::mem::discriminant(&other)
            )),
        }
    }

    fn resolve_argument(
        &mut self,
        argument: NodeId,
        call: NodeId,
        scope: &mut Scope,
        resolver: &Resolver,
    ) -> Result<()> {
        let NodeKind::Argument(kind) = self.tree.kind(argument).clone() else {
            return Err(malformed_error!("expected an argument node"));
        };
        match kind {
            CallArgument::Expression { value } => {
                self.resolve_expression(value, call, scope, resolver)
            }
            CallArgument::ObjectReference { object } => {
                let declaration = self.resolve_object(&object, argument, scope)?;
                self.declarations.insert(argument, declaration);
                self.argument_uses.entry(declaration).or_default().insert(argument);
                Ok(())
            }
            CallArgument::OutParameter { parameter } => {
                let declaration = self.resolve_object(&parameter, argument, scope)?;
                if !self.is_out_parameter(declaration) {
                    return Err(Error::UndefinedName {
                        name: parameter.name().to_string(),
                        location: self.tree.location(argument),
                    });
                }
                self.declarations.insert(argument, declaration);
                self.argument_uses.entry(declaration).or_default().insert(argument);
                Ok(())
            }
            CallArgument::ObjectDeclaration { object, .. } => {
                // The callee initializes the object; it scopes like a
                // declaration placed right after the call.
                self.declare_object(scope, object, argument)
            }
        }
    }

    fn resolve_expression(
        &mut self,
        expression: NodeId,
        statement: NodeId,
        scope: &Scope,
        resolver: &Resolver,
    ) -> Result<()> {
        match self.tree.kind(expression).clone() {
            NodeKind::Literal { .. } => Ok(()),
            NodeKind::ReadTemporary { temporary } => {
                let declaration = scope.temporaries.get(&temporary).copied().ok_or_else(|| {
                    Error::UndefinedName {
                        name: temporary.name().to_string(),
                        location: self.tree.location(expression),
                    }
                })?;
                self.declarations.insert(expression, declaration);
                self.readers.entry(declaration).or_default().insert(statement);
                Ok(())
            }
            NodeKind::Operator { arguments, .. } => {
                for argument in arguments {
                    self.resolve_expression(argument, statement, scope, resolver)?;
                }
                Ok(())
            }
            NodeKind::Query {
                object, arguments, ..
            } => {
                let declaration = self.resolve_object(&object, expression, scope)?;
                self.declarations.insert(expression, declaration);
                self.queriers.entry(declaration).or_default().insert(expression);
                for argument in arguments {
                    self.resolve_expression(argument, statement, scope, resolver)?;
                }
                Ok(())
            }
            NodeKind::Declassify { expression: inner, .. }
            | NodeKind::Endorse { expression: inner, .. } => {
                self.resolve_expression(inner, statement, scope, resolver)
            }
            NodeKind::Input { .. } => self.resolve_host(expression, resolver),
            other => Err(malformed_error!(
                "unexpected expression kind {:?}",
                std::mem::discriminant(&other)
            )),
        }
    }

    fn resolve_host(&mut self, node: NodeId, resolver: &Resolver) -> Result<()> {
        let host = match self.tree.kind(node) {
            NodeKind::Input { host, .. } | NodeKind::Output { host, .. } => host.clone(),
            _ => return Err(malformed_error!("node does not name a host")),
        };
        let declaration = resolver.host(&host, self.tree.location(node))?;
        self.declarations.insert(node, declaration);
        Ok(())
    }

    fn resolve_object(
        &mut self,
        object: &ObjectVariable,
        use_site: NodeId,
        scope: &Scope,
    ) -> Result<NodeId> {
        scope.objects.get(object).copied().ok_or_else(|| Error::UndefinedName {
            name: object.name().to_string(),
            location: self.tree.location(use_site),
        })
    }

    fn declare_temporary(
        &mut self,
        scope: &mut Scope,
        temporary: Variable,
        declaration: NodeId,
    ) -> Result<()> {
        if let Some(&first) = scope.temporaries.get(&temporary) {
            return Err(Error::NameClash {
                name: temporary.name().to_string(),
                first: self.tree.location(first),
                second: self.tree.location(declaration),
            });
        }
        scope.temporaries.insert(temporary, declaration);
        Ok(())
    }

    fn declare_object(
        &mut self,
        scope: &mut Scope,
        object: ObjectVariable,
        declaration: NodeId,
    ) -> Result<()> {
        if let Some(&first) = scope.objects.get(&object) {
            return Err(Error::NameClash {
                name: object.name().to_string(),
                first: self.tree.location(first),
                second: self.tree.location(declaration),
            });
        }
        scope.objects.insert(object, declaration);
        Ok(())
    }

    fn is_out_parameter(&self, declaration: NodeId) -> bool {
        matches!(
            self.tree.kind(declaration),
            NodeKind::Parameter {
                direction: ParameterDirection::Out,
                ..
            }
        )
    }

    /// Closes the direct call relation into `reachable` by fixpoint.
    fn close_reachable(&mut self, resolver: &Resolver) -> Result<()> {
        let mut direct: HashMap<FunctionName, BTreeSet<FunctionName>> = HashMap::new();
        for (name, &declaration) in &resolver.functions {
            let mut callees = BTreeSet::new();
            for node in self.tree.descendants(declaration) {
                if let NodeKind::FunctionCall { function, .. } = self.tree.kind(node) {
                    callees.insert(function.clone());
                }
            }
            direct.insert(name.clone(), callees);
        }

        let mut reachable = direct.clone();
        let mut changed = true;
        while changed {
            changed = false;
            for name in direct.keys() {
                let current = reachable[name].clone();
                let mut expanded = current.clone();
                for callee in &current {
                    if let Some(transitive) = reachable.get(callee) {
                        expanded.extend(transitive.iter().cloned());
                    }
                }
                if expanded.len() != current.len() {
                    reachable.insert(name.clone(), expanded);
                    changed = true;
                }
            }
        }
        self.reachable = reachable;
        Ok(())
    }
}

/// Top-level host and function namespaces, clash-checked once.
struct Resolver {
    hosts: HashMap<Host, NodeId>,
    functions: HashMap<FunctionName, NodeId>,
}

impl Resolver {
    fn new(tree: &ProgramTree) -> Result<Self> {
        let mut hosts = HashMap::new();
        for declaration in tree.host_declarations() {
            if let NodeKind::HostDeclaration { host, .. } = tree.kind(declaration) {
                if let Some(&first) = hosts.get(host) {
                    return Err(Error::NameClash {
                        name: host.name().to_string(),
                        first: tree.location(first),
                        second: tree.location(declaration),
                    });
                }
                hosts.insert(host.clone(), declaration);
            }
        }
        let mut functions = HashMap::new();
        for declaration in tree.function_declarations() {
            if let NodeKind::FunctionDeclaration { function, .. } = tree.kind(declaration) {
                if let Some(&first) = functions.get(function) {
                    return Err(Error::NameClash {
                        name: function.name().to_string(),
                        first: tree.location(first),
                        second: tree.location(declaration),
                    });
                }
                functions.insert(function.clone(), declaration);
            }
        }
        Ok(Self { hosts, functions })
    }

    fn host(&self, host: &Host, location: crate::syntax::SourceLocation) -> Result<NodeId> {
        self.hosts.get(host).copied().ok_or_else(|| Error::UndefinedName {
            name: host.name().to_string(),
            location,
        })
    }

    fn function(
        &self,
        function: &FunctionName,
        location: crate::syntax::SourceLocation,
    ) -> Result<NodeId> {
        self.functions
            .get(function)
            .copied()
            .ok_or_else(|| Error::UndefinedName {
                name: function.name().to_string(),
                location,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::{ProgramBuilder, SourceLocation, Value};

    fn here() -> SourceLocation {
        SourceLocation::new(1, 1)
    }

    /// `fn main() { let x = 1; let y = x; }`
    fn chain_program() -> (ProgramTree, NodeId, NodeId, NodeId) {
        let mut builder = ProgramBuilder::new();
        let one = builder.add(
            NodeKind::Literal {
                value: Value::Integer(1),
            },
            here(),
        );
        let let_x = builder.add(
            NodeKind::Let {
                temporary: Variable::new("x"),
                value: one,
            },
            here(),
        );
        let read_x = builder.add(
            NodeKind::ReadTemporary {
                temporary: Variable::new("x"),
            },
            here(),
        );
        let let_y = builder.add(
            NodeKind::Let {
                temporary: Variable::new("y"),
                value: read_x,
            },
            here(),
        );
        let body = builder.add(
            NodeKind::Block {
                statements: vec![let_x, let_y],
            },
            here(),
        );
        let main = builder.add(
            NodeKind::FunctionDeclaration {
                function: FunctionName::new("main"),
                label_parameters: vec![],
                parameters: vec![],
                pc_label: None,
                body,
            },
            here(),
        );
        let root = builder.add(
            NodeKind::Program {
                declarations: vec![main],
            },
            here(),
        );
        (builder.build(root).unwrap(), let_x, read_x, let_y)
    }

    #[test]
    fn reads_resolve_to_their_let() {
        let (tree, let_x, read_x, let_y) = chain_program();
        let analysis = NameAnalysis::new(&tree).unwrap();
        assert_eq!(analysis.declaration(read_x).unwrap(), let_x);
        assert_eq!(analysis.readers(let_x), &BTreeSet::from([let_y]));
        assert!(analysis.readers(let_y).is_empty());
    }

    #[test]
    fn undefined_temporary_is_reported() {
        let mut builder = ProgramBuilder::new();
        let read = builder.add(
            NodeKind::ReadTemporary {
                temporary: Variable::new("ghost"),
            },
            here(),
        );
        let binding = builder.add(
            NodeKind::Let {
                temporary: Variable::new("x"),
                value: read,
            },
            here(),
        );
        let body = builder.add(
            NodeKind::Block {
                statements: vec![binding],
            },
            here(),
        );
        let main = builder.add(
            NodeKind::FunctionDeclaration {
                function: FunctionName::new("main"),
                label_parameters: vec![],
                parameters: vec![],
                pc_label: None,
                body,
            },
            here(),
        );
        let root = builder.add(
            NodeKind::Program {
                declarations: vec![main],
            },
            here(),
        );
        let tree = builder.build(root).unwrap();
        match NameAnalysis::new(&tree) {
            Err(Error::UndefinedName { name, .. }) => assert_eq!(name, "ghost"),
            other => panic!("expected an undefined name, got {other:?}"),
        }
    }

    #[test]
    fn clashing_temporaries_are_reported() {
        let mut builder = ProgramBuilder::new();
        let first_value = builder.add(
            NodeKind::Literal {
                value: Value::Integer(1),
            },
            here(),
        );
        let first = builder.add(
            NodeKind::Let {
                temporary: Variable::new("x"),
                value: first_value,
            },
            here(),
        );
        let second_value = builder.add(
            NodeKind::Literal {
                value: Value::Integer(2),
            },
            here(),
        );
        let second = builder.add(
            NodeKind::Let {
                temporary: Variable::new("x"),
                value: second_value,
            },
            SourceLocation::new(2, 1),
        );
        let body = builder.add(
            NodeKind::Block {
                statements: vec![first, second],
            },
            here(),
        );
        let main = builder.add(
            NodeKind::FunctionDeclaration {
                function: FunctionName::new("main"),
                label_parameters: vec![],
                parameters: vec![],
                pc_label: None,
                body,
            },
            here(),
        );
        let root = builder.add(
            NodeKind::Program {
                declarations: vec![main],
            },
            here(),
        );
        let tree = builder.build(root).unwrap();
        assert!(matches!(
            NameAnalysis::new(&tree),
            Err(Error::NameClash { .. })
        ));
    }

    #[test]
    fn loop_temporaries_do_not_escape_or_leak_in() {
        // let x = 1; loop { let x = 2; break; }
        // The loop body resets temporaries, so the inner x is fresh.
        let mut builder = ProgramBuilder::new();
        let one = builder.add(
            NodeKind::Literal {
                value: Value::Integer(1),
            },
            here(),
        );
        let outer = builder.add(
            NodeKind::Let {
                temporary: Variable::new("x"),
                value: one,
            },
            here(),
        );
        let two = builder.add(
            NodeKind::Literal {
                value: Value::Integer(2),
            },
            here(),
        );
        let inner = builder.add(
            NodeKind::Let {
                temporary: Variable::new("x"),
                value: two,
            },
            here(),
        );
        let break_node = builder.add(NodeKind::Break { jump_label: None }, here());
        let loop_body = builder.add(
            NodeKind::Block {
                statements: vec![inner, break_node],
            },
            here(),
        );
        let loop_node = builder.add(
            NodeKind::Loop {
                jump_label: None,
                body: loop_body,
            },
            here(),
        );
        let body = builder.add(
            NodeKind::Block {
                statements: vec![outer, loop_node],
            },
            here(),
        );
        let main = builder.add(
            NodeKind::FunctionDeclaration {
                function: FunctionName::new("main"),
                label_parameters: vec![],
                parameters: vec![],
                pc_label: None,
                body,
            },
            here(),
        );
        let root = builder.add(
            NodeKind::Program {
                declarations: vec![main],
            },
            here(),
        );
        let tree = builder.build(root).unwrap();
        let analysis = NameAnalysis::new(&tree).unwrap();
        assert_eq!(
            analysis.corresponding_breaks(loop_node),
            &BTreeSet::from([break_node])
        );
    }

    #[test]
    fn reachable_functions_are_transitive() {
        // main calls f, f calls g.
        let mut builder = ProgramBuilder::new();
        let call_g = builder.add(
            NodeKind::FunctionCall {
                function: FunctionName::new("g"),
                arguments: vec![],
            },
            here(),
        );
        let f_body = builder.add(
            NodeKind::Block {
                statements: vec![call_g],
            },
            here(),
        );
        let f = builder.add(
            NodeKind::FunctionDeclaration {
                function: FunctionName::new("f"),
                label_parameters: vec![],
                parameters: vec![],
                pc_label: None,
                body: f_body,
            },
            here(),
        );
        let g_body = builder.add(NodeKind::Block { statements: vec![] }, here());
        let g = builder.add(
            NodeKind::FunctionDeclaration {
                function: FunctionName::new("g"),
                label_parameters: vec![],
                parameters: vec![],
                pc_label: None,
                body: g_body,
            },
            here(),
        );
        let call_f = builder.add(
            NodeKind::FunctionCall {
                function: FunctionName::new("f"),
                arguments: vec![],
            },
            here(),
        );
        let main_body = builder.add(
            NodeKind::Block {
                statements: vec![call_f],
            },
            here(),
        );
        let main = builder.add(
            NodeKind::FunctionDeclaration {
                function: FunctionName::new("main"),
                label_parameters: vec![],
                parameters: vec![],
                pc_label: None,
                body: main_body,
            },
            here(),
        );
        let root = builder.add(
            NodeKind::Program {
                declarations: vec![main, f, g],
            },
            here(),
        );
        let tree = builder.build(root).unwrap();
        let analysis = NameAnalysis::new(&tree).unwrap();
        let reachable = analysis.reachable_functions(&FunctionName::new("main"));
        assert!(reachable.contains(&FunctionName::new("f")));
        assert!(reachable.contains(&FunctionName::new("g")));
        assert_eq!(analysis.calls(f), &BTreeSet::from([call_f]));
    }
}
