//! Building the selection problem and solving it.

use std::collections::BTreeSet;

use tracing::debug;

use crate::protocols::Protocol;
use crate::selection::composer::ProtocolComposer;
use crate::selection::cost::{Cost, CostEstimator};
use crate::selection::factory::{can_mux, destination_variable, ProtocolFactory};
use crate::selection::{
    FunctionVariable, ProtocolAssignment, SelectionConstraint, SelectionContext,
};
use crate::syntax::{CallArgument, FunctionName, NodeId, NodeKind, ObjectType};
use crate::{Error, Result};

/// One decision variable together with its declaration site and candidate
/// protocols.
#[derive(Debug, Clone)]
pub struct DecisionVariable {
    /// The variable being decided.
    pub variable: FunctionVariable,
    /// The declaration site the variable's label is read from.
    pub node: NodeId,
    /// Candidate protocols, already filtered for authority and backend
    /// restrictions.
    pub candidates: BTreeSet<Protocol>,
}

/// The combinatorial problem selection solves: decision variables with
/// candidate sets, plus the constraints tying them together.
pub struct SelectionProblem {
    variables: Vec<DecisionVariable>,
    constraints: Vec<SelectionConstraint>,
    dataflow_edges: Vec<(FunctionVariable, FunctionVariable)>,
}

impl SelectionProblem {
    /// Builds the problem for a whole program.
    ///
    /// One decision variable is created per temporary, object declaration,
    /// parameter, and call-site object declaration. Constraints cover:
    /// inputs pinned to their host's local protocol, query results sharing
    /// the object's protocol, call arguments sharing the parameter's
    /// protocol, communication feasibility along every def-use edge,
    /// cleartext vector indices, guards of unmuxable conditionals kept
    /// visible to at least one host, and each backend's own side
    /// constraints. The def-use edges between decision variables are
    /// recorded for the cost model.
    ///
    /// # Errors
    ///
    /// Fails when name resolution or label lookup fails for a declaration
    /// site; those indicate a malformed tree rather than an unselectable
    /// program.
    pub fn new(
        context: &SelectionContext<'_, '_>,
        factory: &dyn ProtocolFactory,
        composer: &dyn ProtocolComposer,
    ) -> Result<Self> {
        let all_protocols: BTreeSet<Protocol> = factory.protocols().into_iter().collect();
        let cleartext: BTreeSet<Protocol> = all_protocols
            .iter()
            .filter(|protocol| protocol.is_cleartext())
            .cloned()
            .collect();

        let mut variables = Vec::new();
        let mut constraints = Vec::new();
        let mut dataflow_edges = Vec::new();

        for declaration in context.tree.function_declarations() {
            for node in context.tree.descendants(declaration) {
                match context.tree.kind(node) {
                    NodeKind::Let { temporary, value } => {
                        let function = context.names.enclosing_function_name(node)?;
                        let variable =
                            FunctionVariable::temporary(function.clone(), temporary.clone());
                        let candidates = factory.viable_protocols(context, node)?;

                        match context.tree.kind(*value) {
                            NodeKind::Input { host, .. } => {
                                constraints.push(SelectionConstraint::variable_in(
                                    variable.clone(),
                                    BTreeSet::from([Protocol::Local { host: host.clone() }]),
                                ));
                            }
                            NodeKind::Query { object, .. } => {
                                constraints.push(SelectionConstraint::VariableEquals(
                                    variable.clone(),
                                    FunctionVariable::object(function, object.clone()),
                                ));
                            }
                            _ => {}
                        }

                        Self::reader_constraints(
                            context,
                            composer,
                            &all_protocols,
                            node,
                            &variable,
                            &candidates,
                            &mut constraints,
                            &mut dataflow_edges,
                        )?;
                        variables.push(DecisionVariable {
                            variable,
                            node,
                            candidates,
                        });
                    }

                    NodeKind::DeclareObject {
                        object,
                        object_type,
                        ..
                    } => {
                        let function = context.names.enclosing_function_name(node)?;
                        let variable = FunctionVariable::object(function, object.clone());
                        let candidates = factory.viable_protocols(context, node)?;
                        Self::object_use_constraints(
                            context,
                            composer,
                            &all_protocols,
                            &cleartext,
                            node,
                            &variable,
                            *object_type,
                            &candidates,
                            &mut constraints,
                            &mut dataflow_edges,
                        )?;
                        variables.push(DecisionVariable {
                            variable,
                            node,
                            candidates,
                        });
                    }

                    NodeKind::Parameter {
                        name, object_type, ..
                    } => {
                        let function = context.names.enclosing_function_name(node)?;
                        let variable = FunctionVariable::object(function, name.clone());
                        let candidates = factory.viable_protocols(context, node)?;
                        Self::object_use_constraints(
                            context,
                            composer,
                            &all_protocols,
                            &cleartext,
                            node,
                            &variable,
                            *object_type,
                            &candidates,
                            &mut constraints,
                            &mut dataflow_edges,
                        )?;
                        variables.push(DecisionVariable {
                            variable,
                            node,
                            candidates,
                        });
                    }

                    NodeKind::Argument(argument) => {
                        let caller = context.names.enclosing_function_name(node)?;
                        let parameter = context.names.parameter(node)?;
                        let callee = context.names.enclosing_function_name(parameter)?;
                        let NodeKind::Parameter {
                            name: parameter_name,
                            ..
                        } = context.tree.kind(parameter)
                        else {
                            return Err(malformed_error!(
                                "call argument resolved to a non-parameter node"
                            ));
                        };
                        let parameter_variable =
                            FunctionVariable::object(callee, parameter_name.clone());

                        match argument {
                            CallArgument::Expression { value } => {
                                if let NodeKind::ReadTemporary { temporary } =
                                    context.tree.kind(*value)
                                {
                                    constraints.push(SelectionConstraint::VariableEquals(
                                        FunctionVariable::temporary(caller, temporary.clone()),
                                        parameter_variable,
                                    ));
                                }
                            }
                            CallArgument::ObjectReference { object }
                            | CallArgument::OutParameter { parameter: object } => {
                                constraints.push(SelectionConstraint::VariableEquals(
                                    FunctionVariable::object(caller, object.clone()),
                                    parameter_variable,
                                ));
                            }
                            CallArgument::ObjectDeclaration { object, .. } => {
                                let variable = FunctionVariable::object(caller, object.clone());
                                let candidates = factory.viable_protocols(context, node)?;
                                constraints.push(SelectionConstraint::VariableEquals(
                                    variable.clone(),
                                    parameter_variable,
                                ));
                                variables.push(DecisionVariable {
                                    variable,
                                    node,
                                    candidates,
                                });
                            }
                        }
                    }

                    NodeKind::If { guard, .. } => {
                        // A guard nobody can read in the clear only works
                        // when both branches mux into a single circuit.
                        if !can_mux(context, node) {
                            if let NodeKind::ReadTemporary { temporary } =
                                context.tree.kind(*guard)
                            {
                                let function = context.names.enclosing_function_name(node)?;
                                let visible: BTreeSet<Protocol> = all_protocols
                                    .iter()
                                    .filter(|protocol| {
                                        !composer.visible_guard_hosts(protocol).is_empty()
                                    })
                                    .cloned()
                                    .collect();
                                constraints.push(SelectionConstraint::variable_in(
                                    FunctionVariable::temporary(function, temporary.clone()),
                                    visible,
                                ));
                            }
                        }
                    }

                    _ => {}
                }

                let side_constraint = factory.constraints(context, node)?;
                if side_constraint != SelectionConstraint::Literal(true) {
                    constraints.push(side_constraint);
                }
            }
        }

        debug!(
            variables = variables.len(),
            constraints = constraints.len(),
            protocols = all_protocols.len(),
            "built selection problem"
        );
        Ok(Self {
            variables,
            constraints,
            dataflow_edges,
        })
    }

    /// Communication constraints from a definition to every statement
    /// reading it.
    #[allow(clippy::too_many_arguments)]
    fn reader_constraints(
        context: &SelectionContext<'_, '_>,
        composer: &dyn ProtocolComposer,
        all_protocols: &BTreeSet<Protocol>,
        definition: NodeId,
        variable: &FunctionVariable,
        candidates: &BTreeSet<Protocol>,
        constraints: &mut Vec<SelectionConstraint>,
        edges: &mut Vec<(FunctionVariable, FunctionVariable)>,
    ) -> Result<()> {
        for reader in context.names.readers(definition) {
            match context.tree.kind(*reader) {
                NodeKind::Output { host, .. } => {
                    let local = Protocol::Local { host: host.clone() };
                    let reachable: BTreeSet<Protocol> = all_protocols
                        .iter()
                        .filter(|protocol| composer.can_communicate(protocol, &local))
                        .cloned()
                        .collect();
                    constraints.push(SelectionConstraint::variable_in(
                        variable.clone(),
                        reachable,
                    ));
                }
                // Calls are covered by argument/parameter equalities, and
                // conditionals by the guard-visibility constraints.
                NodeKind::FunctionCall { .. } | NodeKind::If { .. } | NodeKind::Assert { .. } => {}
                _ => {
                    if let Some(destination) = destination_variable(context, *reader)? {
                        edges.push((variable.clone(), destination.clone()));
                        for protocol in candidates {
                            let reachable: BTreeSet<Protocol> = all_protocols
                                .iter()
                                .filter(|target| composer.can_communicate(protocol, target))
                                .cloned()
                                .collect();
                            constraints.push(
                                SelectionConstraint::variable_in(
                                    variable.clone(),
                                    BTreeSet::from([protocol.clone()]),
                                )
                                .implies(SelectionConstraint::variable_in(
                                    destination.clone(),
                                    reachable,
                                )),
                            );
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Constraints from an object declaration to its queries and updates:
    /// communication feasibility to every query's destination, and
    /// cleartext vector indices.
    #[allow(clippy::too_many_arguments)]
    fn object_use_constraints(
        context: &SelectionContext<'_, '_>,
        composer: &dyn ProtocolComposer,
        all_protocols: &BTreeSet<Protocol>,
        cleartext: &BTreeSet<Protocol>,
        declaration: NodeId,
        variable: &FunctionVariable,
        object_type: ObjectType,
        candidates: &BTreeSet<Protocol>,
        constraints: &mut Vec<SelectionConstraint>,
        edges: &mut Vec<(FunctionVariable, FunctionVariable)>,
    ) -> Result<()> {
        let function = context.names.enclosing_function_name(declaration)?;

        for querier in context.names.queriers(declaration) {
            let statement = context
                .tree
                .find_ancestor(*querier, NodeKind::is_statement);
            if let Some(statement) = statement {
                if let Some(destination) = destination_variable(context, statement)? {
                    edges.push((variable.clone(), destination.clone()));
                    for protocol in candidates {
                        let reachable: BTreeSet<Protocol> = all_protocols
                            .iter()
                            .filter(|target| composer.can_communicate(protocol, target))
                            .cloned()
                            .collect();
                        constraints.push(
                            SelectionConstraint::variable_in(
                                variable.clone(),
                                BTreeSet::from([protocol.clone()]),
                            )
                            .implies(SelectionConstraint::variable_in(
                                destination.clone(),
                                reachable,
                            )),
                        );
                    }
                }
            }
            if matches!(object_type, ObjectType::Vector(_)) {
                if let NodeKind::Query { arguments, .. } = context.tree.kind(*querier) {
                    Self::cleartext_index_constraint(
                        context,
                        cleartext,
                        all_protocols,
                        variable,
                        &function,
                        arguments.first().copied(),
                        constraints,
                    );
                }
            }
        }

        if matches!(object_type, ObjectType::Vector(_)) {
            for updater in context.names.updaters(declaration) {
                if let NodeKind::Update { arguments, .. } = context.tree.kind(*updater) {
                    Self::cleartext_index_constraint(
                        context,
                        cleartext,
                        all_protocols,
                        variable,
                        &function,
                        arguments.first().copied(),
                        constraints,
                    );
                }
            }
        }
        Ok(())
    }

    /// Vector indices must live on a protocol that only ever sees
    /// cleartext; every host has to agree which element is touched.
    fn cleartext_index_constraint(
        context: &SelectionContext<'_, '_>,
        cleartext: &BTreeSet<Protocol>,
        all_protocols: &BTreeSet<Protocol>,
        variable: &FunctionVariable,
        function: &FunctionName,
        index: Option<NodeId>,
        constraints: &mut Vec<SelectionConstraint>,
    ) {
        let Some(index) = index else { return };
        let NodeKind::ReadTemporary { temporary } = context.tree.kind(index) else {
            return;
        };
        let index_variable = FunctionVariable::temporary(function.clone(), temporary.clone());
        constraints.push(
            SelectionConstraint::variable_in(variable.clone(), all_protocols.clone()).implies(
                SelectionConstraint::variable_in(index_variable, cleartext.clone()),
            ),
        );
    }

    /// The decision variables, in declaration order.
    #[must_use]
    pub fn variables(&self) -> &[DecisionVariable] {
        &self.variables
    }

    /// The generated constraints.
    #[must_use]
    pub fn constraints(&self) -> &[SelectionConstraint] {
        &self.constraints
    }

    /// Def-use edges between decision variables, as (source, destination)
    /// pairs.
    #[must_use]
    pub fn dataflow_edges(&self) -> &[(FunctionVariable, FunctionVariable)] {
        &self.dataflow_edges
    }
}

/// A strategy for finding a satisfying protocol assignment.
pub trait SelectionSolver {
    /// Finds an assignment satisfying every constraint of `problem`.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::NoSelectionSolution`] when no assignment
    /// satisfies the constraints.
    fn select(
        &self,
        context: &SelectionContext<'_, '_>,
        problem: &SelectionProblem,
        estimator: &dyn CostEstimator,
    ) -> Result<ProtocolAssignment>;
}

/// The default solver: depth-first backtracking search trying each
/// variable's candidates cheapest-first.
///
/// A candidate's rank is its weighted execution cost at the declaration
/// site plus the communication cost to and from every dataflow neighbor
/// already placed, so the first satisfying assignment found favors cheap
/// protocols with cheap connections; the search does not prove global
/// optimality.
#[derive(Debug, Clone, Copy, Default)]
pub struct CostOrderedSearch;

impl CostOrderedSearch {
    #[allow(clippy::too_many_arguments)]
    fn search(
        ordered: &[(&DecisionVariable, Vec<(u64, Protocol)>)],
        constraints: &[SelectionConstraint],
        edges: &[(FunctionVariable, FunctionVariable)],
        estimator: &dyn CostEstimator,
        weights: &Cost,
        index: usize,
        assignment: &mut ProtocolAssignment,
        steps: &mut u64,
        backtracks: &mut u64,
    ) -> bool {
        let Some((decision, candidates)) = ordered.get(index) else {
            return true;
        };
        // Re-rank against the protocols already placed on the variable's
        // dataflow neighbors: a candidate cheap to run but expensive to
        // reach loses its head start.
        let mut ranked: Vec<(u64, &Protocol)> = candidates
            .iter()
            .map(|(base, protocol)| {
                let communication: u64 = edges
                    .iter()
                    .filter_map(|(source, destination)| {
                        if *source == decision.variable {
                            assignment.get(destination).map(|placed| {
                                estimator
                                    .communication_cost(protocol, placed)
                                    .weighted(weights)
                            })
                        } else if *destination == decision.variable {
                            assignment.get(source).map(|placed| {
                                estimator
                                    .communication_cost(placed, protocol)
                                    .weighted(weights)
                            })
                        } else {
                            None
                        }
                    })
                    .sum();
                (base + communication, protocol)
            })
            .collect();
        ranked.sort_by_key(|(cost, _)| *cost);

        for (_, protocol) in ranked {
            *steps += 1;
            assignment.insert(decision.variable.clone(), protocol.clone());
            let contradicted = {
                let lookup = |variable: &FunctionVariable| assignment.get(variable).cloned();
                constraints
                    .iter()
                    .any(|constraint| constraint.evaluate_partial(&lookup) == Some(false))
            };
            if !contradicted
                && Self::search(
                    ordered,
                    constraints,
                    edges,
                    estimator,
                    weights,
                    index + 1,
                    assignment,
                    steps,
                    backtracks,
                )
            {
                return true;
            }
            *backtracks += 1;
        }
        assignment.remove(&decision.variable);
        false
    }
}

impl SelectionSolver for CostOrderedSearch {
    fn select(
        &self,
        context: &SelectionContext<'_, '_>,
        problem: &SelectionProblem,
        estimator: &dyn CostEstimator,
    ) -> Result<ProtocolAssignment> {
        let weights = estimator.feature_weights();
        let mut ordered = Vec::with_capacity(problem.variables().len());
        for decision in problem.variables() {
            if decision.candidates.is_empty() {
                debug!(variable = %decision.variable, "no candidate protocols");
                return Err(Error::NoSelectionSolution);
            }
            let mut costed = Vec::with_capacity(decision.candidates.len());
            for protocol in &decision.candidates {
                let cost = estimator
                    .execution_cost(context.tree, decision.node, protocol)?
                    .weighted(&weights);
                costed.push((cost, protocol.clone()));
            }
            costed.sort();
            ordered.push((decision, costed));
        }

        let mut assignment = ProtocolAssignment::new();
        let mut steps = 0;
        let mut backtracks = 0;
        let solved = Self::search(
            &ordered,
            problem.constraints(),
            problem.dataflow_edges(),
            estimator,
            &weights,
            0,
            &mut assignment,
            &mut steps,
            &mut backtracks,
        );
        debug!(steps, backtracks, solved, "selection search finished");
        if solved {
            Ok(assignment)
        } else {
            Err(Error::NoSelectionSolution)
        }
    }
}

/// Re-checks a finished assignment against everything the problem
/// demanded.
///
/// The solver should never hand back a bad assignment; this pass turns an
/// encoding or search defect into a hard error instead of letting it leak
/// into later passes.
///
/// # Errors
///
/// Fails with [`Error::InputProtocolMismatch`] when an input statement
/// left its host's local protocol, and [`Error::SelectionVerification`]
/// for every other inconsistency.
pub fn validate_protocol_assignment(
    context: &SelectionContext<'_, '_>,
    problem: &SelectionProblem,
    assignment: &ProtocolAssignment,
) -> Result<()> {
    for decision in problem.variables() {
        let protocol = assignment.protocol(&decision.variable)?;

        if let NodeKind::Let { value, .. } = context.tree.kind(decision.node) {
            if let NodeKind::Input { host, .. } = context.tree.kind(*value) {
                let expected = Protocol::Local { host: host.clone() };
                if *protocol != expected {
                    return Err(Error::InputProtocolMismatch {
                        host: host.name().to_string(),
                        protocol: protocol.to_string(),
                        location: context.tree.location(decision.node),
                    });
                }
            }
        }

        if !decision.candidates.contains(protocol) {
            return Err(Error::SelectionVerification {
                variable: decision.variable.to_string(),
            });
        }
        let label = context.information_flow.label(decision.node)?;
        if !protocol.authority(context.trust)?.acts_for(label) {
            return Err(Error::SelectionVerification {
                variable: decision.variable.to_string(),
            });
        }
    }

    for constraint in problem.constraints() {
        if !constraint.evaluate(assignment)? {
            let variable = constraint
                .variables()
                .into_iter()
                .next()
                .map(ToString::to_string)
                .unwrap_or_default();
            return Err(Error::SelectionVerification { variable });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{InformationFlowAnalysis, NameAnalysis, TypeAnalysis};
    use crate::protocols::MpcCircuit;
    use crate::security::{HostTrustConfiguration, LabelExpression};
    use crate::selection::{
        CostRegime, SimpleCostEstimator, SimpleProtocolComposer, UnionFactory,
    };
    use crate::syntax::{
        FunctionName, Host, NodeId, ProgramBuilder, ProgramTree, SourceLocation, ValueType,
        Variable,
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

        fn host(&mut self, name: &str) {
            let declaration = self.builder.add(
                NodeKind::HostDeclaration {
                    host: Host::new(name),
                    authority: LabelExpression::principal(name),
                },
                here(),
            );
            self.declarations.push(declaration);
        }

        fn input(&mut self, temporary: &str, host: &str) -> NodeId {
            let value = self.builder.add(
                NodeKind::Input {
                    value_type: ValueType::Integer,
                    host: Host::new(host),
                },
                here(),
            );
            self.let_binding(temporary, value)
        }

        fn boolean_input(&mut self, temporary: &str, host: &str) -> NodeId {
            let value = self.builder.add(
                NodeKind::Input {
                    value_type: ValueType::Boolean,
                    host: Host::new(host),
                },
                here(),
            );
            self.let_binding(temporary, value)
        }

        fn read(&mut self, temporary: &str) -> NodeId {
            self.builder.add(
                NodeKind::ReadTemporary {
                    temporary: Variable::new(temporary),
                },
                here(),
            )
        }

        fn conditional(
            &mut self,
            guard: NodeId,
            then_statements: Vec<NodeId>,
            else_statements: Vec<NodeId>,
        ) -> NodeId {
            let then_branch = self.builder.add(
                NodeKind::Block {
                    statements: then_statements,
                },
                here(),
            );
            let else_branch = self.builder.add(
                NodeKind::Block {
                    statements: else_statements,
                },
                here(),
            );
            self.builder.add(
                NodeKind::If {
                    guard,
                    then_branch,
                    else_branch,
                },
                here(),
            )
        }

        fn let_binding(&mut self, temporary: &str, value: NodeId) -> NodeId {
            self.builder.add(
                NodeKind::Let {
                    temporary: Variable::new(temporary),
                    value,
                },
                here(),
            )
        }

        fn endorse(&mut self, temporary: &str, source: &str, to: LabelExpression) -> NodeId {
            let expression = self.read(source);
            let endorsed = self.builder.add(
                NodeKind::Endorse {
                    expression,
                    from_label: None,
                    to_label: to,
                },
                here(),
            );
            self.let_binding(temporary, endorsed)
        }

        fn output(&mut self, temporary: &str, host: &str) -> NodeId {
            let message = self.read(temporary);
            self.builder.add(
                NodeKind::Output {
                    message,
                    host: Host::new(host),
                },
                here(),
            )
        }

        fn main(&mut self, statements: Vec<NodeId>) {
            let body = self.builder.add(NodeKind::Block { statements }, here());
            let main = self.builder.add(
                NodeKind::FunctionDeclaration {
                    function: FunctionName::new("main"),
                    label_parameters: vec![],
                    parameters: vec![],
                    pc_label: None,
                    body,
                },
                here(),
            );
            self.declarations.push(main);
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

    /// Integrity endorsed by both parties, the target of the endorsements
    /// in the joint computation below.
    fn both_trusted(owner: &str) -> LabelExpression {
        LabelExpression::And(
            Box::new(LabelExpression::Confidentiality(Box::new(
                LabelExpression::principal(owner),
            ))),
            Box::new(LabelExpression::Integrity(Box::new(LabelExpression::And(
                Box::new(LabelExpression::principal("alice")),
                Box::new(LabelExpression::principal("bob")),
            )))),
        )
    }

    struct Fixture {
        tree: ProgramTree,
    }

    /// Both parties feed a secret into a product that only their joint
    /// computation may see, then publish the declassified result.
    fn joint_computation() -> Fixture {
        let mut program = TestProgram::new();
        program.host("alice");
        program.host("bob");
        let let_x = program.input("x", "alice");
        let let_xe = program.endorse("xe", "x", both_trusted("alice"));
        let let_y = program.input("y", "bob");
        let let_ye = program.endorse("ye", "y", both_trusted("bob"));

        let read_xe = program.read("xe");
        let read_ye = program.read("ye");
        let product = program.builder.add(
            NodeKind::Operator {
                operator: crate::syntax::Operator::Multiply,
                arguments: vec![read_xe, read_ye],
            },
            here(),
        );
        let let_z = program.let_binding("z", product);

        let read_z = program.read("z");
        let declassified = program.builder.add(
            NodeKind::Declassify {
                expression: read_z,
                from_label: None,
                to_label: LabelExpression::Integrity(Box::new(LabelExpression::And(
                    Box::new(LabelExpression::principal("alice")),
                    Box::new(LabelExpression::principal("bob")),
                ))),
            },
            here(),
        );
        let let_w = program.let_binding("w", declassified);
        let output = program.output("w", "alice");

        program.main(vec![let_x, let_xe, let_y, let_ye, let_z, let_w, output]);
        Fixture {
            tree: program.build(),
        }
    }

    fn single_input() -> Fixture {
        let mut program = TestProgram::new();
        program.host("alice");
        let let_x = program.input("x", "alice");
        let output = program.output("x", "alice");
        program.main(vec![let_x, output]);
        Fixture {
            tree: program.build(),
        }
    }

    struct Pipeline<'t> {
        names: NameAnalysis<'t>,
        trust: HostTrustConfiguration,
        information_flow: InformationFlowAnalysis,
    }

    fn run_pipeline(tree: &ProgramTree) -> Pipeline<'_> {
        let names = NameAnalysis::new(tree).unwrap();
        let trust = HostTrustConfiguration::from_program(tree).unwrap();
        let information_flow = InformationFlowAnalysis::new(tree, &names, &trust).unwrap();
        Pipeline {
            names,
            trust,
            information_flow,
        }
    }

    fn temporary(name: &str) -> FunctionVariable {
        FunctionVariable::temporary(FunctionName::new("main"), Variable::new(name))
    }

    #[test]
    fn single_input_is_pinned_to_its_host() {
        let fixture = single_input();
        let pipeline = run_pipeline(&fixture.tree);
        let types = TypeAnalysis::new(&fixture.tree, &pipeline.names).unwrap();
        let context = SelectionContext {
            tree: &fixture.tree,
            names: &pipeline.names,
            types: &types,
            information_flow: &pipeline.information_flow,
            trust: &pipeline.trust,
        };
        let factory = UnionFactory::all_backends(&pipeline.trust);
        let composer = SimpleProtocolComposer;
        let problem = SelectionProblem::new(&context, &factory, &composer).unwrap();
        assert_eq!(problem.variables().len(), 1);

        let estimator = SimpleCostEstimator::new(CostRegime::Lan);
        let assignment = CostOrderedSearch.select(&context, &problem, &estimator).unwrap();
        assert_eq!(
            assignment.protocol(&temporary("x")).unwrap(),
            &Protocol::Local {
                host: Host::new("alice")
            }
        );
        validate_protocol_assignment(&context, &problem, &assignment).unwrap();
    }

    #[test]
    fn joint_product_lands_in_arithmetic_mpc() {
        let fixture = joint_computation();
        let pipeline = run_pipeline(&fixture.tree);
        let types = TypeAnalysis::new(&fixture.tree, &pipeline.names).unwrap();
        let context = SelectionContext {
            tree: &fixture.tree,
            names: &pipeline.names,
            types: &types,
            information_flow: &pipeline.information_flow,
            trust: &pipeline.trust,
        };
        let factory = UnionFactory::all_backends(&pipeline.trust);
        let composer = SimpleProtocolComposer;
        let problem = SelectionProblem::new(&context, &factory, &composer).unwrap();
        let estimator = SimpleCostEstimator::new(CostRegime::Lan);
        let assignment = CostOrderedSearch.select(&context, &problem, &estimator).unwrap();

        assert_eq!(
            assignment.protocol(&temporary("x")).unwrap(),
            &Protocol::Local {
                host: Host::new("alice")
            }
        );
        // The product is only computable under both parties' authority,
        // and multiplication picks the arithmetic circuit.
        match assignment.protocol(&temporary("z")).unwrap() {
            Protocol::Mpc { circuit, .. } => assert_eq!(*circuit, MpcCircuit::Arithmetic),
            other => panic!("expected MPC for the product, got {other}"),
        }
        // The declassified result is public and alice-trusted, so it comes
        // back out to cheap cleartext storage.
        assert!(assignment.protocol(&temporary("w")).unwrap().is_cleartext());

        validate_protocol_assignment(&context, &problem, &assignment).unwrap();
    }

    #[test]
    fn tampered_assignment_fails_validation() {
        let fixture = joint_computation();
        let pipeline = run_pipeline(&fixture.tree);
        let types = TypeAnalysis::new(&fixture.tree, &pipeline.names).unwrap();
        let context = SelectionContext {
            tree: &fixture.tree,
            names: &pipeline.names,
            types: &types,
            information_flow: &pipeline.information_flow,
            trust: &pipeline.trust,
        };
        let factory = UnionFactory::all_backends(&pipeline.trust);
        let composer = SimpleProtocolComposer;
        let problem = SelectionProblem::new(&context, &factory, &composer).unwrap();
        let estimator = SimpleCostEstimator::new(CostRegime::Lan);
        let mut assignment = CostOrderedSearch.select(&context, &problem, &estimator).unwrap();

        // bob has no authority over the endorsed product.
        assignment.insert(
            temporary("w"),
            Protocol::Local {
                host: Host::new("bob"),
            },
        );
        assert!(matches!(
            validate_protocol_assignment(&context, &problem, &assignment),
            Err(Error::SelectionVerification { .. })
        ));
    }

    #[test]
    fn displaced_input_is_reported_with_its_host() {
        let fixture = single_input();
        let pipeline = run_pipeline(&fixture.tree);
        let types = TypeAnalysis::new(&fixture.tree, &pipeline.names).unwrap();
        let context = SelectionContext {
            tree: &fixture.tree,
            names: &pipeline.names,
            types: &types,
            information_flow: &pipeline.information_flow,
            trust: &pipeline.trust,
        };
        let factory = UnionFactory::all_backends(&pipeline.trust);
        let composer = SimpleProtocolComposer;
        let problem = SelectionProblem::new(&context, &factory, &composer).unwrap();

        let mut assignment = ProtocolAssignment::new();
        assignment.insert(
            temporary("x"),
            Protocol::Commitment {
                sender: Host::new("alice"),
                receivers: BTreeSet::from([Host::new("bob")]),
            },
        );
        assert!(matches!(
            validate_protocol_assignment(&context, &problem, &assignment),
            Err(Error::InputProtocolMismatch { .. })
        ));
    }

    fn first_let(tree: &ProgramTree) -> NodeId {
        tree.function_declarations()
            .flat_map(|declaration| tree.descendants(declaration))
            .find(|node| matches!(tree.kind(*node), NodeKind::Let { .. }))
            .unwrap()
    }

    #[test]
    fn dataflow_edges_follow_definitions_to_readers() {
        let fixture = joint_computation();
        let pipeline = run_pipeline(&fixture.tree);
        let types = TypeAnalysis::new(&fixture.tree, &pipeline.names).unwrap();
        let context = SelectionContext {
            tree: &fixture.tree,
            names: &pipeline.names,
            types: &types,
            information_flow: &pipeline.information_flow,
            trust: &pipeline.trust,
        };
        let factory = UnionFactory::all_backends(&pipeline.trust);
        let composer = SimpleProtocolComposer;
        let problem = SelectionProblem::new(&context, &factory, &composer).unwrap();

        let edges = problem.dataflow_edges();
        assert!(edges.contains(&(temporary("x"), temporary("xe"))));
        assert!(edges.contains(&(temporary("z"), temporary("w"))));
    }

    #[test]
    fn placed_neighbors_steer_candidate_order() {
        let fixture = single_input();
        let pipeline = run_pipeline(&fixture.tree);
        let types = TypeAnalysis::new(&fixture.tree, &pipeline.names).unwrap();
        let context = SelectionContext {
            tree: &fixture.tree,
            names: &pipeline.names,
            types: &types,
            information_flow: &pipeline.information_flow,
            trust: &pipeline.trust,
        };
        let node = first_let(&fixture.tree);

        let source = temporary("s");
        let destination = temporary("d");
        let problem = SelectionProblem {
            variables: vec![
                DecisionVariable {
                    variable: source.clone(),
                    node,
                    candidates: BTreeSet::from([Protocol::Local {
                        host: Host::new("bob"),
                    }]),
                },
                DecisionVariable {
                    variable: destination.clone(),
                    node,
                    candidates: BTreeSet::from([
                        Protocol::Local {
                            host: Host::new("alice"),
                        },
                        Protocol::Local {
                            host: Host::new("bob"),
                        },
                    ]),
                },
            ],
            constraints: vec![],
            dataflow_edges: vec![(source, destination.clone())],
        };

        let estimator = SimpleCostEstimator::new(CostRegime::Lan);
        let assignment = CostOrderedSearch.select(&context, &problem, &estimator).unwrap();
        // Both of d's candidates run equally cheap; the edge from s makes
        // the co-located protocol win.
        assert_eq!(
            assignment.protocol(&destination).unwrap(),
            &Protocol::Local {
                host: Host::new("bob")
            }
        );
    }

    #[test]
    fn unmuxable_guards_must_be_visible_somewhere() {
        let mut program = TestProgram::new();
        program.host("alice");
        program.host("bob");
        let let_b = program.boolean_input("b", "alice");
        let read_b = program.read("b");
        let let_c = program.let_binding("c", read_b);
        let guard = program.read("c");
        // The output pins the branch to real control flow, so the
        // conditional cannot be muxed away.
        let output = program.output("b", "alice");
        let conditional = program.conditional(guard, vec![output], vec![]);
        program.main(vec![let_b, let_c, conditional]);
        let fixture = Fixture {
            tree: program.build(),
        };

        let pipeline = run_pipeline(&fixture.tree);
        let types = TypeAnalysis::new(&fixture.tree, &pipeline.names).unwrap();
        let context = SelectionContext {
            tree: &fixture.tree,
            names: &pipeline.names,
            types: &types,
            information_flow: &pipeline.information_flow,
            trust: &pipeline.trust,
        };
        let factory = UnionFactory::all_backends(&pipeline.trust);
        let composer = SimpleProtocolComposer;
        let problem = SelectionProblem::new(&context, &factory, &composer).unwrap();

        // The guard may sit on a commitment, whose sender sees the value,
        // but never on a protocol nobody can read in the clear.
        assert!(problem.constraints().iter().any(|constraint| {
            match constraint {
                SelectionConstraint::VariableIn {
                    variable,
                    protocols,
                } if *variable == temporary("c") => {
                    protocols
                        .iter()
                        .any(|protocol| matches!(protocol, Protocol::Commitment { .. }))
                        && !protocols.iter().any(|protocol| {
                            matches!(protocol, Protocol::Mpc { .. } | Protocol::Zkp { .. })
                        })
                }
                _ => false,
            }
        }));
    }

    #[test]
    fn contradictory_constraints_have_no_solution() {
        let fixture = single_input();
        let pipeline = run_pipeline(&fixture.tree);
        let types = TypeAnalysis::new(&fixture.tree, &pipeline.names).unwrap();
        let context = SelectionContext {
            tree: &fixture.tree,
            names: &pipeline.names,
            types: &types,
            information_flow: &pipeline.information_flow,
            trust: &pipeline.trust,
        };
        let factory = UnionFactory::all_backends(&pipeline.trust);
        let composer = SimpleProtocolComposer;
        let mut problem = SelectionProblem::new(&context, &factory, &composer).unwrap();
        problem.constraints.push(SelectionConstraint::Literal(false));

        let estimator = SimpleCostEstimator::new(CostRegime::Lan);
        assert!(matches!(
            CostOrderedSearch.select(&context, &problem, &estimator),
            Err(Error::NoSelectionSolution)
        ));
    }
}
