//! Definite initialization of out parameters.
//!
//! Forward dataflow over flat `out parameter -> state` maps. `flow_in` and
//! `flow_out` are mutually recursive attributes of tree nodes: a node's
//! `flow_in` is its previous sibling's `flow_out` (or the enclosing
//! function's all-uninitialized entry map), and `flow_out` applies the
//! node's transfer. Branches of a conditional are unified by `meet`.
//!
//! Loops are a one-step approximation rather than a true fixpoint: a
//! loop's `flow_out` is the meet of its `flow_in` and its body's
//! `flow_out`, which forbids out-parameter initialization inside loops.
//! TODO: model breaks precisely by iterating the loop body to a fixpoint.

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use crate::analysis::NameAnalysis;
use crate::syntax::{
    CallArgument, NodeId, NodeKind, ObjectVariable, ParameterDirection, ProgramTree,
};
use crate::{Error, Result};

/// Whether an out parameter has been written at a program point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum InitializationState {
    /// Definitely not yet written.
    Uninitialized,
    /// Definitely written exactly once.
    Initialized,
    /// Written on some paths but not others.
    Unknown,
}

impl InitializationState {
    /// Unifies the states arriving from two control-flow branches.
    #[must_use]
    pub fn meet(self, that: Self) -> Self {
        if self == that {
            self
        } else {
            Self::Unknown
        }
    }

    /// Sequential composition: the state after `that` happens on the same
    /// path as `self`.
    #[must_use]
    pub fn join(self, that: Self) -> Self {
        match (self, that) {
            (Self::Uninitialized, Self::Uninitialized) => Self::Uninitialized,
            (Self::Unknown, _) | (_, Self::Unknown) => Self::Unknown,
            _ => Self::Initialized,
        }
    }
}

type StateMap = BTreeMap<ObjectVariable, InitializationState>;

fn meet_maps(lhs: &StateMap, rhs: &StateMap) -> StateMap {
    debug_assert!(lhs.keys().eq(rhs.keys()));
    lhs.iter()
        .map(|(parameter, &state)| {
            let other = rhs.get(parameter).copied().unwrap_or(state);
            (parameter.clone(), state.meet(other))
        })
        .collect()
}

/// Checks that every out parameter is initialized exactly once before any
/// use and before its function returns.
#[derive(Debug)]
pub struct OutParameterInitializationAnalysis<'t> {
    tree: &'t ProgramTree,
    flow_ins: HashMap<NodeId, StateMap>,
    flow_outs: HashMap<NodeId, StateMap>,
}

impl<'t> OutParameterInitializationAnalysis<'t> {
    /// Runs the dataflow and checks the whole program.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::OutParameterInitialization`] on the first
    /// parameter that is used uninitialized, initialized twice, or not
    /// initialized on every path to a function exit.
    pub fn new(tree: &'t ProgramTree, names: &NameAnalysis<'_>) -> Result<Self> {
        let mut analysis = Self {
            tree,
            flow_ins: HashMap::new(),
            flow_outs: HashMap::new(),
        };
        analysis.check(tree.root(), names)?;
        debug!(
            nodes = analysis.flow_ins.len(),
            "out parameter initialization checked"
        );
        Ok(analysis)
    }

    /// The state of `parameter` just before `node` executes, if `parameter`
    /// is an out parameter of the enclosing function.
    #[must_use]
    pub fn state_before(
        &self,
        node: NodeId,
        parameter: &ObjectVariable,
    ) -> Option<InitializationState> {
        self.flow_ins.get(&node)?.get(parameter).copied()
    }

    /// The initialization map before `node` executes.
    fn flow_in(&mut self, node: NodeId) -> Result<StateMap> {
        if let Some(cached) = self.flow_ins.get(&node) {
            return Ok(cached.clone());
        }
        let result = match self.tree.parent(node) {
            None => StateMap::new(),
            Some(parent) => match self.tree.kind(parent) {
                NodeKind::Block { .. } => {
                    match self.tree.preceding_statements(node).first().copied() {
                        Some(previous) => self.flow_out(previous)?,
                        None => self.flow_in(parent)?,
                    }
                }
                NodeKind::FunctionDeclaration { .. } => self.flow_out(parent)?,
                _ => self.flow_in(parent)?,
            },
        };
        self.flow_ins.insert(node, result.clone());
        Ok(result)
    }

    /// The initialization map after `node` executes.
    fn flow_out(&mut self, node: NodeId) -> Result<StateMap> {
        if let Some(cached) = self.flow_outs.get(&node) {
            return Ok(cached.clone());
        }
        let result = match self.tree.kind(node).clone() {
            // Function entry: every out parameter starts uninitialized.
            NodeKind::FunctionDeclaration { parameters, .. } => {
                let mut map = StateMap::new();
                for parameter in parameters {
                    if let NodeKind::Parameter {
                        name,
                        direction: ParameterDirection::Out,
                        ..
                    } = self.tree.kind(parameter)
                    {
                        map.insert(name.clone(), InitializationState::Uninitialized);
                    }
                }
                map
            }
            NodeKind::OutParameterInitialization { parameter, .. } => {
                let mut map = self.flow_in(node)?;
                self.record_write(&mut map, &parameter)?;
                map
            }
            // Passing an out parameter onward initializes it in the callee.
            NodeKind::FunctionCall { arguments, .. } => {
                let mut map = self.flow_in(node)?;
                for argument in arguments {
                    if let NodeKind::Argument(CallArgument::OutParameter { parameter }) =
                        self.tree.kind(argument).clone()
                    {
                        self.record_write(&mut map, &parameter)?;
                    }
                }
                map
            }
            NodeKind::If {
                then_branch,
                else_branch,
                ..
            } => {
                let then_out = self.flow_out(then_branch)?;
                let else_out = self.flow_out(else_branch)?;
                meet_maps(&then_out, &else_out)
            }
            // One-step approximation: the body may or may not run, so its
            // writes never become definite.
            NodeKind::Loop { body, .. } => {
                let entry = self.flow_in(node)?;
                let body_out = self.flow_out(body)?;
                meet_maps(&entry, &body_out)
            }
            NodeKind::Block { statements } => match statements.last().copied() {
                Some(last) => self.flow_out(last)?,
                None => self.flow_in(node)?,
            },
            _ => self.flow_in(node)?,
        };
        self.flow_outs.insert(node, result.clone());
        Ok(result)
    }

    fn record_write(&self, map: &mut StateMap, parameter: &ObjectVariable) -> Result<()> {
        let state = map.get(parameter).copied().ok_or_else(|| {
            malformed_error!("`{parameter}` is written but is not an out parameter")
        })?;
        map.insert(
            parameter.clone(),
            state.join(InitializationState::Initialized),
        );
        Ok(())
    }

    fn check(&mut self, node: NodeId, names: &NameAnalysis<'_>) -> Result<()> {
        match self.tree.kind(node).clone() {
            NodeKind::FunctionDeclaration {
                parameters, body, ..
            } => {
                let exit = self.flow_out(body)?;
                for (parameter, state) in &exit {
                    if *state != InitializationState::Initialized {
                        let violation = match state {
                            InitializationState::Uninitialized => "is never initialized",
                            _ => "is not initialized on every path to the function exit",
                        };
                        let declaration = parameters
                            .iter()
                            .copied()
                            .find(|&id| {
                                matches!(
                                    self.tree.kind(id),
                                    NodeKind::Parameter { name, .. } if name == parameter
                                )
                            })
                            .unwrap_or(node);
                        return Err(Error::OutParameterInitialization {
                            parameter: parameter.name().to_string(),
                            violation: violation.to_string(),
                            location: self.tree.location(declaration),
                        });
                    }
                }
            }
            NodeKind::Update { object, .. } | NodeKind::Query { object, .. } => {
                self.check_use(node, &object, names)?;
            }
            NodeKind::Argument(CallArgument::ObjectReference { object }) => {
                self.check_use(node, &object, names)?;
            }
            NodeKind::OutParameterInitialization { parameter, .. } => {
                if let Some(state) = self.state(node, &parameter)? {
                    if state != InitializationState::Uninitialized {
                        let violation = match state {
                            InitializationState::Initialized => "is initialized more than once",
                            _ => "may already be initialized on some paths",
                        };
                        return Err(Error::OutParameterInitialization {
                            parameter: parameter.name().to_string(),
                            violation: violation.to_string(),
                            location: self.tree.location(node),
                        });
                    }
                }
            }
            _ => {}
        }
        for child in self.tree.children(node) {
            self.check(child, names)?;
        }
        Ok(())
    }

    /// Reports a use of `object` while it is not definitely initialized.
    /// Objects that are not out parameters are not tracked and always pass.
    fn check_use(
        &mut self,
        node: NodeId,
        object: &ObjectVariable,
        names: &NameAnalysis<'_>,
    ) -> Result<()> {
        let declaration = names.declaration(node)?;
        if !matches!(
            self.tree.kind(declaration),
            NodeKind::Parameter {
                direction: ParameterDirection::Out,
                ..
            }
        ) {
            return Ok(());
        }
        if let Some(state) = self.state(node, object)? {
            if state != InitializationState::Initialized {
                return Err(Error::OutParameterInitialization {
                    parameter: object.name().to_string(),
                    violation: "is used before it is initialized".to_string(),
                    location: self.tree.location(node),
                });
            }
        }
        Ok(())
    }

    fn state(
        &mut self,
        node: NodeId,
        parameter: &ObjectVariable,
    ) -> Result<Option<InitializationState>> {
        Ok(self.flow_in(node)?.get(parameter).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::{
        FunctionName, ObjectType, ProgramBuilder, SourceLocation, ValueType, Value,
    };

    fn here() -> SourceLocation {
        SourceLocation::new(1, 1)
    }

    struct TestProgram {
        builder: ProgramBuilder,
        declarations: Vec<NodeId>,
    }

    impl TestProgram {
        fn new() -> Self {
            Self {
                builder: ProgramBuilder::new(),
                declarations: Vec::new(),
            }
        }

        fn out_parameter(&mut self, name: &str) -> NodeId {
            self.builder.add(
                NodeKind::Parameter {
                    name: ObjectVariable::new(name),
                    direction: ParameterDirection::Out,
                    object_type: ObjectType::ImmutableCell(ValueType::Integer),
                    label: None,
                },
                here(),
            )
        }

        fn literal(&mut self, value: i64) -> NodeId {
            self.builder
                .add(NodeKind::Literal { value: Value::Integer(value) }, here())
        }

        fn initialize(&mut self, parameter: &str) -> NodeId {
            let value = self.literal(0);
            self.builder.add(
                NodeKind::OutParameterInitialization {
                    parameter: ObjectVariable::new(parameter),
                    arguments: vec![value],
                },
                here(),
            )
        }

        fn function(&mut self, name: &str, parameters: Vec<NodeId>, statements: Vec<NodeId>) {
            let body = self.builder.add(NodeKind::Block { statements }, here());
            let declaration = self.builder.add(
                NodeKind::FunctionDeclaration {
                    function: FunctionName::new(name),
                    label_parameters: vec![],
                    parameters,
                    pc_label: None,
                    body,
                },
                here(),
            );
            self.declarations.push(declaration);
        }

        fn build(self) -> ProgramTree {
            let mut builder = self.builder;
            let root = builder.add(
                NodeKind::Program {
                    declarations: self.declarations,
                },
                here(),
            );
            builder.build(root).unwrap()
        }
    }

    fn check(tree: &ProgramTree) -> Result<OutParameterInitializationAnalysis<'_>> {
        let names = NameAnalysis::new(tree)?;
        OutParameterInitializationAnalysis::new(tree, &names)
    }

    #[test]
    fn straight_line_initialization_passes() {
        let mut program = TestProgram::new();
        let parameter = program.out_parameter("y");
        let init = program.initialize("y");
        program.function("main", vec![parameter], vec![init]);
        let tree = program.build();

        let analysis = check(&tree).unwrap();
        assert_eq!(
            analysis.state_before(init, &ObjectVariable::new("y")),
            Some(InitializationState::Uninitialized)
        );
    }

    #[test]
    fn never_initialized_parameter_is_reported() {
        let mut program = TestProgram::new();
        let parameter = program.out_parameter("y");
        program.function("main", vec![parameter], vec![]);
        let tree = program.build();

        match check(&tree) {
            Err(Error::OutParameterInitialization { parameter, .. }) => {
                assert_eq!(parameter, "y");
            }
            other => panic!("expected an initialization error, got {other:?}"),
        }
    }

    #[test]
    fn initialization_in_only_one_branch_is_reported() {
        let mut program = TestProgram::new();
        let parameter = program.out_parameter("y");
        let init = program.initialize("y");
        let guard = program.builder.add(
            NodeKind::Literal {
                value: Value::Boolean(true),
            },
            here(),
        );
        let then_branch = program.builder.add(
            NodeKind::Block {
                statements: vec![init],
            },
            here(),
        );
        let else_branch = program
            .builder
            .add(NodeKind::Block { statements: vec![] }, here());
        let conditional = program.builder.add(
            NodeKind::If {
                guard,
                then_branch,
                else_branch,
            },
            here(),
        );
        program.function("main", vec![parameter], vec![conditional]);
        let tree = program.build();

        assert!(matches!(
            check(&tree),
            Err(Error::OutParameterInitialization { .. })
        ));
    }

    #[test]
    fn initialization_in_both_branches_passes() {
        let mut program = TestProgram::new();
        let parameter = program.out_parameter("y");
        let then_init = program.initialize("y");
        let else_init = program.initialize("y");
        let guard = program.builder.add(
            NodeKind::Literal {
                value: Value::Boolean(true),
            },
            here(),
        );
        let then_branch = program.builder.add(
            NodeKind::Block {
                statements: vec![then_init],
            },
            here(),
        );
        let else_branch = program.builder.add(
            NodeKind::Block {
                statements: vec![else_init],
            },
            here(),
        );
        let conditional = program.builder.add(
            NodeKind::If {
                guard,
                then_branch,
                else_branch,
            },
            here(),
        );
        program.function("main", vec![parameter], vec![conditional]);
        let tree = program.build();

        assert!(check(&tree).is_ok());
    }

    #[test]
    fn double_initialization_is_reported() {
        let mut program = TestProgram::new();
        let parameter = program.out_parameter("y");
        let first = program.initialize("y");
        let second = program.initialize("y");
        program.function("main", vec![parameter], vec![first, second]);
        let tree = program.build();

        match check(&tree) {
            Err(Error::OutParameterInitialization { violation, .. }) => {
                assert!(violation.contains("more than once"));
            }
            other => panic!("expected an initialization error, got {other:?}"),
        }
    }

    #[test]
    fn use_before_initialization_is_reported() {
        let mut program = TestProgram::new();
        let parameter = program.out_parameter("y");
        let query = program.builder.add(
            NodeKind::Query {
                object: ObjectVariable::new("y"),
                method: crate::syntax::MethodName::Get,
                arguments: vec![],
            },
            here(),
        );
        let read = program.builder.add(
            NodeKind::Let {
                temporary: crate::syntax::Variable::new("t"),
                value: query,
            },
            here(),
        );
        let init = program.initialize("y");
        program.function("main", vec![parameter], vec![read, init]);
        let tree = program.build();

        match check(&tree) {
            Err(Error::OutParameterInitialization { violation, .. }) => {
                assert!(violation.contains("used before"));
            }
            other => panic!("expected an initialization error, got {other:?}"),
        }
    }

    #[test]
    fn initialization_inside_a_loop_is_never_definite() {
        let mut program = TestProgram::new();
        let parameter = program.out_parameter("y");
        let init = program.initialize("y");
        let brk = program
            .builder
            .add(NodeKind::Break { jump_label: None }, here());
        let body = program.builder.add(
            NodeKind::Block {
                statements: vec![init, brk],
            },
            here(),
        );
        let looped = program.builder.add(
            NodeKind::Loop {
                jump_label: None,
                body,
            },
            here(),
        );
        program.function("main", vec![parameter], vec![looped]);
        let tree = program.build();

        assert!(matches!(
            check(&tree),
            Err(Error::OutParameterInitialization { .. })
        ));
    }
}
