//! Information-flow label inference and checking.
//!
//! Every expression, temporary, and object gets a label term in a
//! per-function constraint solver; program-counter labels track what the
//! fact of reaching a statement reveals. Solving yields the least-trust
//! label for every variable or pinpoints the first insecure flow.
//!
//! Functions are solved one at a time. `main` goes first with a fresh
//! program-counter variable at its body. A call to a not-yet-solved
//! function creates fresh variables for the callee's parameters and pc in
//! the *caller's* solver; once the caller is solved those variables are
//! concrete and the callee is enqueued with them as constants. Calls to an
//! already-solved function instead assert equality against its solved
//! labels. No function is solved twice; the specialization pass duplicates
//! functions beforehand so each instance sees one calling context.

use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use tracing::debug;

use crate::analysis::NameAnalysis;
use crate::security::solver::{
    AtomicLabelTerm, ConstraintSolver, FailWith, LabelTerm, LabelVariable,
};
use crate::security::{HostTrustConfiguration, Label, LabelExpression};
use crate::syntax::{
    CallArgument, FunctionName, LabelParameter, NodeId, NodeKind, ObjectVariable, ProgramTree,
    SourceLocation,
};
use crate::util::{FreshNameGenerator, UniqueQueue};
use crate::{Error, Result};

/// One concrete calling context for a function: its parameter labels and
/// the program-counter label at the call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Instantiation {
    function: FunctionName,
    parameters: Vec<Label>,
    pc: Label,
}

/// The solved interface of a function, consulted at later call sites.
struct FunctionSummary {
    parameters: Vec<Label>,
    pc: Label,
}

/// A call to a not-yet-solved function, instantiated after the caller's
/// solve.
struct PendingCall {
    callee: FunctionName,
    parameters: Vec<LabelVariable>,
    pc: LabelVariable,
}

/// A failed information-flow check, bundled with the constraint graph of
/// the function whose constraints were unsatisfiable.
///
/// The graph is in DOT format with the violated constraint drawn in red.
/// It is empty when the failure happened before any constraint was solved,
/// for example a name that never resolves.
#[derive(Debug)]
pub struct InformationFlowDiagnostic {
    /// The error the analysis reports.
    pub error: Error,
    /// The function being solved when the check failed.
    pub function: FunctionName,
    /// That function's constraint graph in DOT format.
    pub constraint_graph: String,
}

/// Inferred security labels for one program.
#[derive(Debug)]
pub struct InformationFlowAnalysis {
    labels: HashMap<NodeId, Label>,
    pc_labels: HashMap<NodeId, Label>,
    constraint_graphs: BTreeMap<FunctionName, String>,
}

impl InformationFlowAnalysis {
    /// Checks information-flow security of `tree` and infers all labels.
    ///
    /// # Errors
    ///
    /// Fails with one of the six information-flow errors
    /// ([`Error::InsecureDataFlow`], [`Error::InsecureControlFlow`],
    /// [`Error::LabelMismatch`], [`Error::IntegrityChangingDeclassification`],
    /// [`Error::ConfidentialityChangingEndorsement`],
    /// [`Error::MalleableDowngrade`]) on the first violation.
    pub fn new(
        tree: &ProgramTree,
        names: &NameAnalysis<'_>,
        trust: &HostTrustConfiguration,
    ) -> Result<Self> {
        Self::with_diagnostics(tree, names, trust).map_err(|diagnostic| diagnostic.error)
    }

    /// Like [`InformationFlowAnalysis::new`], but a failure carries the
    /// offending function's constraint graph with the violated constraint
    /// highlighted.
    ///
    /// # Errors
    ///
    /// Fails with the same errors as [`InformationFlowAnalysis::new`],
    /// wrapped in an [`InformationFlowDiagnostic`].
    pub fn with_diagnostics(
        tree: &ProgramTree,
        names: &NameAnalysis<'_>,
        trust: &HostTrustConfiguration,
    ) -> std::result::Result<Self, Box<InformationFlowDiagnostic>> {
        let mut analysis = Self {
            labels: HashMap::new(),
            pc_labels: HashMap::new(),
            constraint_graphs: BTreeMap::new(),
        };
        let mut summaries: HashMap<FunctionName, FunctionSummary> = HashMap::new();
        let mut queue: UniqueQueue<Instantiation> = UniqueQueue::new();

        let main_name = FunctionName::new("main");
        let main = match tree.main() {
            Ok(main) => main,
            Err(error) => return Err(analysis.diagnose(&main_name, error)),
        };
        match analysis.solve_function(tree, names, trust, &mut summaries, main, None) {
            Ok(instantiations) => {
                for instantiation in instantiations {
                    queue.push(instantiation);
                }
            }
            Err(error) => return Err(analysis.diagnose(&main_name, error)),
        }
        while let Some(instantiation) = queue.pop() {
            if summaries.contains_key(&instantiation.function) {
                continue;
            }
            let Some(declaration) = tree.function(&instantiation.function) else {
                let error = Error::UndefinedName {
                    name: instantiation.function.name().to_string(),
                    location: SourceLocation::default(),
                };
                return Err(analysis.diagnose(&instantiation.function, error));
            };
            match analysis.solve_function(
                tree,
                names,
                trust,
                &mut summaries,
                declaration,
                Some(&instantiation),
            ) {
                Ok(instantiations) => {
                    for next in instantiations {
                        queue.push(next);
                    }
                }
                Err(error) => return Err(analysis.diagnose(&instantiation.function, error)),
            }
        }
        debug!(functions = summaries.len(), "information flow checked");
        Ok(analysis)
    }

    fn diagnose(&self, function: &FunctionName, error: Error) -> Box<InformationFlowDiagnostic> {
        Box::new(InformationFlowDiagnostic {
            constraint_graph: self
                .constraint_graphs
                .get(function)
                .cloned()
                .unwrap_or_default(),
            function: function.clone(),
            error,
        })
    }

    /// The inferred label of an expression, temporary, object declaration,
    /// or parameter.
    ///
    /// # Errors
    ///
    /// Fails for nodes that carry no label (for example blocks) or belong
    /// to a function that is never called.
    pub fn label(&self, node: NodeId) -> Result<&Label> {
        self.labels
            .get(&node)
            .ok_or_else(|| malformed_error!("node {} has no label", node.index()))
    }

    /// The program-counter label in effect at a statement.
    ///
    /// # Errors
    ///
    /// Fails for non-statement nodes.
    pub fn pc_label(&self, node: NodeId) -> Result<&Label> {
        self.pc_labels
            .get(&node)
            .ok_or_else(|| malformed_error!("node {} has no pc label", node.index()))
    }

    /// Writes `function`'s constraint graph in DOT format.
    ///
    /// # Errors
    ///
    /// Fails if `function` was never solved, and propagates writer
    /// failures.
    pub fn export_constraint_graph<W: std::io::Write>(
        &self,
        function: &FunctionName,
        writer: &mut W,
    ) -> Result<()> {
        let graph = self.constraint_graphs.get(function).ok_or_else(|| {
            Error::UndefinedName {
                name: function.name().to_string(),
                location: SourceLocation::default(),
            }
        })?;
        writer.write_all(graph.as_bytes())?;
        Ok(())
    }

    /// Solves one function and returns the instantiations its call sites
    /// produced.
    fn solve_function(
        &mut self,
        tree: &ProgramTree,
        names: &NameAnalysis<'_>,
        trust: &HostTrustConfiguration,
        summaries: &mut HashMap<FunctionName, FunctionSummary>,
        declaration: NodeId,
        instantiation: Option<&Instantiation>,
    ) -> Result<Vec<Instantiation>> {
        let NodeKind::FunctionDeclaration {
            function: name,
            parameters,
            body,
            ..
        } = tree.kind(declaration).clone()
        else {
            return Err(malformed_error!("expected a function declaration"));
        };
        debug!(function = %name, instantiated = instantiation.is_some(), "solving function");

        let mut checker = FunctionChecker {
            tree,
            names,
            trust,
            summaries,
            label_parameters: BTreeMap::new(),
            solver: ConstraintSolver::new(),
            terms: HashMap::new(),
            pc_terms: HashMap::new(),
            loop_pcs: HashMap::new(),
            pending: Vec::new(),
            fresh: FreshNameGenerator::new(),
        };

        checker.seed_parameters(&parameters, instantiation)?;
        let pc = match instantiation {
            Some(instantiation) => AtomicLabelTerm::Constant(instantiation.pc.clone()),
            None => AtomicLabelTerm::Variable(
                checker.solver.fresh_variable(&format!("{name}.pc")),
            ),
        };
        checker.check_statement(body, &pc, name.name())?;

        let FunctionChecker {
            solver,
            terms,
            pc_terms,
            pending,
            ..
        } = checker;
        let mut dot = Vec::new();
        let solved = solver.solve_and_export(&mut dot);
        self.constraint_graphs
            .insert(name.clone(), String::from_utf8_lossy(&dot).into_owned());
        let solution = solved?;

        for (node, term) in &terms {
            self.labels.insert(*node, solution.evaluate(term));
        }
        for (node, term) in &pc_terms {
            self.pc_labels.insert(*node, solution.evaluate(term));
        }
        let parameter_labels = parameters
            .iter()
            .map(|parameter| {
                terms
                    .get(parameter)
                    .map(|term| solution.evaluate(term))
                    .ok_or_else(|| malformed_error!("parameter was not assigned a term"))
            })
            .collect::<Result<Vec<_>>>()?;
        summaries.insert(
            name,
            FunctionSummary {
                parameters: parameter_labels,
                pc: solution.evaluate(&pc),
            },
        );

        Ok(pending
            .into_iter()
            .map(|call| Instantiation {
                function: call.callee,
                parameters: call
                    .parameters
                    .iter()
                    .map(|variable| solution.label(variable))
                    .collect(),
                pc: solution.label(&call.pc),
            })
            .collect())
    }
}

/// Constraint generation for one function body.
struct FunctionChecker<'a, 't> {
    tree: &'t ProgramTree,
    names: &'a NameAnalysis<'t>,
    trust: &'a HostTrustConfiguration,
    summaries: &'a HashMap<FunctionName, FunctionSummary>,
    /// Label parameters bound through same-named value parameters.
    label_parameters: BTreeMap<LabelParameter, Label>,
    solver: ConstraintSolver,
    /// Label term per expression, temporary, object declaration, and
    /// parameter.
    terms: HashMap<NodeId, AtomicLabelTerm>,
    /// Program-counter term per statement.
    pc_terms: HashMap<NodeId, AtomicLabelTerm>,
    loop_pcs: HashMap<NodeId, AtomicLabelTerm>,
    pending: Vec<PendingCall>,
    fresh: FreshNameGenerator,
}

impl FunctionChecker<'_, '_> {
    fn seed_parameters(
        &mut self,
        parameters: &[NodeId],
        instantiation: Option<&Instantiation>,
    ) -> Result<()> {
        if let Some(instantiation) = instantiation {
            if instantiation.parameters.len() != parameters.len() {
                return Err(malformed_error!("instantiation arity mismatch"));
            }
        }
        for (index, &parameter) in parameters.iter().enumerate() {
            let NodeKind::Parameter { name, label, .. } = self.tree.kind(parameter).clone()
            else {
                return Err(malformed_error!("expected a parameter node"));
            };
            let location = self.tree.location(parameter);
            let term = match instantiation {
                Some(instantiation) => {
                    let provided = instantiation.parameters[index].clone();
                    if let Some(expression) = &label {
                        if !expression.is_polymorphic() {
                            let declared = expression.interpret(&BTreeMap::new(), location)?;
                            if declared != provided {
                                return Err(Error::LabelMismatch {
                                    expected: declared,
                                    actual: provided,
                                    location,
                                });
                            }
                        }
                    }
                    AtomicLabelTerm::Constant(provided)
                }
                None => match &label {
                    Some(expression) if !expression.is_polymorphic() => AtomicLabelTerm::Constant(
                        expression.interpret(&BTreeMap::new(), location)?,
                    ),
                    _ => AtomicLabelTerm::Variable(self.solver.fresh_variable(name.name())),
                },
            };
            // A label parameter is bound by the value parameter sharing its
            // name; calls instantiate it through that parameter's label.
            if let AtomicLabelTerm::Constant(constant) = &term {
                self.label_parameters
                    .insert(LabelParameter::new(name.name()), constant.clone());
            }
            self.terms.insert(parameter, term);
        }
        Ok(())
    }

    fn check_statement(
        &mut self,
        statement: NodeId,
        pc: &AtomicLabelTerm,
        path: &str,
    ) -> Result<()> {
        self.pc_terms.insert(statement, pc.clone());
        let location = self.tree.location(statement);
        match self.tree.kind(statement).clone() {
            NodeKind::Let { temporary, value } => {
                let value_term = self.check_expression(value, pc)?;
                let target = AtomicLabelTerm::Variable(
                    self.solver.fresh_variable(temporary.name()),
                );
                self.solver.add_flows_to(
                    &value_term,
                    &LabelTerm::Atomic(target.clone()),
                    data_failure(self.tree.location(value)),
                );
                self.solver.add_flows_to(
                    pc,
                    &LabelTerm::Atomic(target.clone()),
                    control_failure(location),
                );
                self.terms.insert(statement, target);
                Ok(())
            }
            NodeKind::DeclareObject {
                object,
                label,
                arguments,
                ..
            } => {
                let target = self.object_term(&object, label.as_ref(), location)?;
                for argument in arguments {
                    let term = self.check_expression(argument, pc)?;
                    self.solver.add_flows_to(
                        &term,
                        &LabelTerm::Atomic(target.clone()),
                        data_failure(self.tree.location(argument)),
                    );
                }
                self.solver.add_flows_to(
                    pc,
                    &LabelTerm::Atomic(target.clone()),
                    control_failure(location),
                );
                self.terms.insert(statement, target);
                Ok(())
            }
            NodeKind::Update { arguments, .. }
            | NodeKind::OutParameterInitialization { arguments, .. } => {
                let declaration = self.names.declaration(statement)?;
                let target = self.declared_term(declaration)?;
                for argument in arguments {
                    let term = self.check_expression(argument, pc)?;
                    self.solver.add_flows_to(
                        &term,
                        &LabelTerm::Atomic(target.clone()),
                        data_failure(self.tree.location(argument)),
                    );
                }
                self.solver.add_flows_to(
                    pc,
                    &LabelTerm::Atomic(target),
                    control_failure(location),
                );
                Ok(())
            }
            NodeKind::Output { message, host } => {
                let message_term = self.check_expression(message, pc)?;
                let authority =
                    AtomicLabelTerm::Constant(self.trust.authority(&host, location)?.clone());
                self.solver.add_flows_to(
                    pc,
                    &LabelTerm::Atomic(authority.clone()),
                    control_failure(location),
                );
                self.solver.add_flows_to(
                    &message_term,
                    &LabelTerm::Atomic(authority),
                    data_failure(self.tree.location(message)),
                );
                Ok(())
            }
            NodeKind::FunctionCall { arguments, .. } => {
                self.check_call(statement, &arguments, pc)
            }
            NodeKind::If {
                guard,
                then_branch,
                else_branch,
            } => {
                let guard_term = self.check_expression(guard, pc)?;
                for (branch, suffix) in [(then_branch, "then"), (else_branch, "else")] {
                    let branch_path = self.fresh.fresh(&format!("{path}.if.{suffix}"));
                    let branch_pc = AtomicLabelTerm::Variable(
                        self.solver.fresh_variable(&format!("{branch_path}.pc")),
                    );
                    self.solver.add_flows_to(
                        pc,
                        &LabelTerm::Atomic(branch_pc.clone()),
                        control_failure(location),
                    );
                    // The branch taken reveals the guard.
                    self.solver.add_flows_to(
                        &guard_term,
                        &LabelTerm::Atomic(branch_pc.clone()),
                        control_failure(self.tree.location(guard)),
                    );
                    self.check_statement(branch, &branch_pc, &branch_path)?;
                }
                Ok(())
            }
            NodeKind::Loop { body, .. } => {
                let loop_path = self.fresh.fresh(&format!("{path}.loop"));
                let loop_pc = AtomicLabelTerm::Variable(
                    self.solver.fresh_variable(&format!("{loop_path}.pc")),
                );
                self.solver.add_flows_to(
                    pc,
                    &LabelTerm::Atomic(loop_pc.clone()),
                    control_failure(location),
                );
                self.loop_pcs.insert(statement, loop_pc.clone());
                self.check_statement(body, &loop_pc, &loop_path)
            }
            NodeKind::Break { .. } => {
                let target = self.names.declaration(statement)?;
                let loop_pc = self
                    .loop_pcs
                    .get(&target)
                    .cloned()
                    .ok_or_else(|| malformed_error!("break outside its loop"))?;
                // Exiting joins what reaching the break revealed back into
                // the loop's pc.
                self.solver.add_flows_to(
                    pc,
                    &LabelTerm::Atomic(loop_pc),
                    control_failure(location),
                );
                Ok(())
            }
            NodeKind::Assert { condition } => {
                let term = self.check_expression(condition, pc)?;
                // Every participant evaluates assertions.
                self.solver.add_flows_to(
                    &term,
                    &LabelTerm::constant(Label::bottom()),
                    data_failure(self.tree.location(condition)),
                );
                Ok(())
            }
            NodeKind::Block { statements } => {
                for statement in statements {
                    self.check_statement(statement, pc, path)?;
                }
                Ok(())
            }
            _ => Err(malformed_error!("unexpected statement node")),
        }
    }

    fn check_expression(
        &mut self,
        expression: NodeId,
        pc: &AtomicLabelTerm,
    ) -> Result<AtomicLabelTerm> {
        let location = self.tree.location(expression);
        let term = match self.tree.kind(expression).clone() {
            NodeKind::Literal { .. } => AtomicLabelTerm::Variable(
                self.solver
                    .fresh_variable(&self.fresh.fresh("literal")),
            ),
            NodeKind::ReadTemporary { temporary } => {
                let declaration = self.names.declaration(expression)?;
                let source = self.declared_term(declaration)?;
                let result = AtomicLabelTerm::Variable(
                    self.solver.fresh_variable(temporary.name()),
                );
                self.solver.add_flows_to(
                    &source,
                    &LabelTerm::Atomic(result.clone()),
                    data_failure(location),
                );
                result
            }
            NodeKind::Operator { arguments, .. } => {
                let result = AtomicLabelTerm::Variable(
                    self.solver.fresh_variable(&self.fresh.fresh("operator")),
                );
                for argument in arguments {
                    let term = self.check_expression(argument, pc)?;
                    self.solver.add_flows_to(
                        &term,
                        &LabelTerm::Atomic(result.clone()),
                        data_failure(self.tree.location(argument)),
                    );
                }
                result
            }
            NodeKind::Query { arguments, .. } => {
                let declaration = self.names.declaration(expression)?;
                let object = self.declared_term(declaration)?;
                for argument in arguments {
                    let term = self.check_expression(argument, pc)?;
                    self.solver.add_flows_to(
                        &term,
                        &LabelTerm::Atomic(object.clone()),
                        data_failure(self.tree.location(argument)),
                    );
                }
                // The object's protocol observes the access.
                self.solver.add_flows_to(
                    pc,
                    &LabelTerm::Atomic(object.clone()),
                    control_failure(location),
                );
                let result = AtomicLabelTerm::Variable(
                    self.solver.fresh_variable(&self.fresh.fresh("query")),
                );
                self.solver.add_flows_to(
                    &object,
                    &LabelTerm::Atomic(result.clone()),
                    data_failure(location),
                );
                result
            }
            NodeKind::Declassify {
                expression: inner,
                from_label,
                to_label,
            } => self.check_downgrade(inner, from_label.as_ref(), &to_label, pc, location, true)?,
            NodeKind::Endorse {
                expression: inner,
                from_label,
                to_label,
            } => {
                self.check_downgrade(inner, from_label.as_ref(), &to_label, pc, location, false)?
            }
            NodeKind::Input { host, .. } => {
                let authority =
                    AtomicLabelTerm::Constant(self.trust.authority(&host, location)?.clone());
                // The host learns that execution reached this input.
                self.solver.add_flows_to(
                    pc,
                    &LabelTerm::Atomic(authority.clone()),
                    control_failure(location),
                );
                authority
            }
            _ => return Err(malformed_error!("unexpected expression node")),
        };
        self.terms.insert(expression, term.clone());
        Ok(term)
    }

    /// Shared constraint generation for declassification and endorsement.
    ///
    /// Both preserve the component they do not downgrade and must satisfy
    /// the non-malleability condition `from ⊑ swap(from) ⊔ to`.
    fn check_downgrade(
        &mut self,
        inner: NodeId,
        from_label: Option<&LabelExpression>,
        to_label: &LabelExpression,
        pc: &AtomicLabelTerm,
        location: SourceLocation,
        declassification: bool,
    ) -> Result<AtomicLabelTerm> {
        let inner_term = self.check_expression(inner, pc)?;
        let to = to_label.interpret(&self.label_parameters, location)?;

        self.solver.add_flows_to(
            pc,
            &LabelTerm::constant(to.clone()),
            control_failure(location),
        );

        match from_label {
            Some(expression) => {
                let from = expression.interpret(&self.label_parameters, location)?;
                self.solver.add_equal_to(
                    &inner_term,
                    &AtomicLabelTerm::Constant(from.clone()),
                    mismatch_failure(self.tree.location(inner)),
                );
                let preserved = if declassification {
                    from.integrity_component() == to.integrity_component()
                } else {
                    from.confidentiality_component() == to.confidentiality_component()
                };
                if !preserved {
                    return Err(downgrade_component_error(
                        declassification,
                        from,
                        to,
                        location,
                    ));
                }
                if !from.flows_to(&from.swap().join(&to)) {
                    return Err(Error::MalleableDowngrade {
                        from,
                        to,
                        location,
                    });
                }
            }
            None => {
                let to_constant = AtomicLabelTerm::Constant(to.clone());
                let component_failure: FailWith = {
                    let to = to.clone();
                    if declassification {
                        Rc::new(move |from, _| Error::IntegrityChangingDeclassification {
                            from,
                            to: to.clone(),
                            location,
                        })
                    } else {
                        Rc::new(move |from, _| Error::ConfidentialityChangingEndorsement {
                            from,
                            to: to.clone(),
                            location,
                        })
                    }
                };
                if declassification {
                    self.solver.add_integrity_equal_to(
                        &inner_term,
                        &to_constant,
                        component_failure,
                    );
                } else {
                    self.solver.add_confidentiality_equal_to(
                        &inner_term,
                        &to_constant,
                        component_failure,
                    );
                }
                let malleable: FailWith = {
                    let to = to.clone();
                    Rc::new(move |from, _| Error::MalleableDowngrade {
                        from,
                        to: to.clone(),
                        location,
                    })
                };
                self.solver.add_flows_to(
                    &inner_term,
                    &inner_term.swap().join(to.clone()),
                    malleable,
                );
            }
        }

        Ok(AtomicLabelTerm::Constant(to))
    }

    fn check_call(
        &mut self,
        call: NodeId,
        arguments: &[NodeId],
        pc: &AtomicLabelTerm,
    ) -> Result<()> {
        let location = self.tree.location(call);
        let declaration = self.names.declaration(call)?;
        let NodeKind::FunctionDeclaration {
            function: callee,
            parameters,
            pc_label,
            ..
        } = self.tree.kind(declaration).clone()
        else {
            return Err(malformed_error!("call resolves to a non-function"));
        };
        if parameters.len() != arguments.len() {
            return Err(malformed_error!("call arity mismatch survived checking"));
        }

        // Argument terms, by position and by callee parameter name (label
        // parameters in signatures are bound through same-named value
        // parameters).
        let mut argument_terms = Vec::with_capacity(arguments.len());
        let mut terms_by_name: HashMap<ObjectVariable, AtomicLabelTerm> = HashMap::new();
        for (&argument, &parameter) in arguments.iter().zip(parameters.iter()) {
            let term = self.check_argument(argument, pc)?;
            let NodeKind::Parameter { name, .. } = self.tree.kind(parameter) else {
                return Err(malformed_error!("expected a parameter node"));
            };
            terms_by_name.insert(name.clone(), term.clone());
            argument_terms.push(term);
        }

        if let Some(summary) = self.summaries.get(&callee) {
            self.solver.add_equal_to(
                pc,
                &AtomicLabelTerm::Constant(summary.pc.clone()),
                mismatch_failure(location),
            );
            for ((argument, term), label) in arguments
                .iter()
                .zip(argument_terms.iter())
                .zip(summary.parameters.clone())
            {
                self.solver.add_equal_to(
                    term,
                    &AtomicLabelTerm::Constant(label),
                    mismatch_failure(self.tree.location(*argument)),
                );
            }
            return Ok(());
        }

        let mut parameter_variables = Vec::with_capacity(parameters.len());
        for ((&argument, &parameter), term) in arguments
            .iter()
            .zip(parameters.iter())
            .zip(argument_terms.iter())
        {
            let NodeKind::Parameter { name, label, .. } = self.tree.kind(parameter).clone()
            else {
                return Err(malformed_error!("expected a parameter node"));
            };
            let variable = self
                .solver
                .fresh_variable(&self.fresh.fresh(name.name()));
            self.solver.add_equal_to(
                &AtomicLabelTerm::Variable(variable),
                term,
                mismatch_failure(self.tree.location(argument)),
            );
            if let Some(expression) = label {
                let bound = self.signature_bound(&expression, &terms_by_name, location)?;
                let equality = matches!(
                    self.tree.kind(argument),
                    NodeKind::Argument(CallArgument::ObjectDeclaration { .. })
                );
                if equality {
                    self.solver.add_equal_to(
                        term,
                        &bound,
                        mismatch_failure(self.tree.location(argument)),
                    );
                } else {
                    self.solver.add_flows_to(
                        term,
                        &LabelTerm::Atomic(bound),
                        data_failure(self.tree.location(argument)),
                    );
                }
            }
            parameter_variables.push(variable);
        }

        let callee_pc = self
            .solver
            .fresh_variable(&self.fresh.fresh(&format!("{callee}.pc")));
        self.solver.add_equal_to(
            &AtomicLabelTerm::Variable(callee_pc),
            pc,
            mismatch_failure(location),
        );
        if let Some(expression) = pc_label {
            let bound = self.signature_bound(&expression, &terms_by_name, location)?;
            self.solver.add_flows_to(
                pc,
                &LabelTerm::Atomic(bound),
                control_failure(location),
            );
        }

        self.pending.push(PendingCall {
            callee,
            parameters: parameter_variables,
            pc: callee_pc,
        });
        Ok(())
    }

    /// Resolves a label annotation in a function signature at a call site.
    ///
    /// A bare label parameter refers to the argument label of the
    /// same-named value parameter; anything else must be monomorphic.
    fn signature_bound(
        &self,
        expression: &LabelExpression,
        terms_by_name: &HashMap<ObjectVariable, AtomicLabelTerm>,
        location: SourceLocation,
    ) -> Result<AtomicLabelTerm> {
        match expression {
            LabelExpression::Parameter(parameter) => terms_by_name
                .get(&ObjectVariable::new(parameter.name()))
                .cloned()
                .ok_or_else(|| Error::UndefinedName {
                    name: parameter.name().to_string(),
                    location,
                }),
            _ if !expression.is_polymorphic() => Ok(AtomicLabelTerm::Constant(
                expression.interpret(&BTreeMap::new(), location)?,
            )),
            _ => Err(malformed_error!(
                "compound label expressions over label parameters are not allowed in signatures"
            )),
        }
    }

    fn check_argument(
        &mut self,
        argument: NodeId,
        pc: &AtomicLabelTerm,
    ) -> Result<AtomicLabelTerm> {
        let NodeKind::Argument(kind) = self.tree.kind(argument).clone() else {
            return Err(malformed_error!("expected an argument node"));
        };
        let term = match kind {
            CallArgument::Expression { value } => self.check_expression(value, pc)?,
            CallArgument::ObjectReference { .. } | CallArgument::OutParameter { .. } => {
                let declaration = self.names.declaration(argument)?;
                self.declared_term(declaration)?
            }
            CallArgument::ObjectDeclaration { object, label, .. } => {
                self.object_term(&object, label.as_ref(), self.tree.location(argument))?
            }
        };
        self.terms.insert(argument, term.clone());
        Ok(term)
    }

    /// The label term of an object declaration: the interpreted annotation
    /// when present, a fresh variable otherwise.
    fn object_term(
        &mut self,
        object: &ObjectVariable,
        label: Option<&LabelExpression>,
        location: SourceLocation,
    ) -> Result<AtomicLabelTerm> {
        match label {
            Some(expression) => Ok(AtomicLabelTerm::Constant(
                expression.interpret(&self.label_parameters, location)?,
            )),
            None => Ok(AtomicLabelTerm::Variable(
                self.solver.fresh_variable(object.name()),
            )),
        }
    }

    /// The already-created term of a declaration node.
    fn declared_term(&self, declaration: NodeId) -> Result<AtomicLabelTerm> {
        self.terms.get(&declaration).cloned().ok_or_else(|| {
            malformed_error!(
                "declaration {} was used before being checked",
                declaration.index()
            )
        })
    }
}

fn data_failure(location: SourceLocation) -> FailWith {
    Rc::new(move |from, to| Error::InsecureDataFlow { from, to, location })
}

fn control_failure(location: SourceLocation) -> FailWith {
    Rc::new(move |pc, to| Error::InsecureControlFlow { pc, to, location })
}

fn mismatch_failure(location: SourceLocation) -> FailWith {
    Rc::new(move |actual, expected| Error::LabelMismatch {
        expected,
        actual,
        location,
    })
}

fn downgrade_component_error(
    declassification: bool,
    from: Label,
    to: Label,
    location: SourceLocation,
) -> Error {
    if declassification {
        Error::IntegrityChangingDeclassification { from, to, location }
    } else {
        Error::ConfidentialityChangingEndorsement { from, to, location }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::{ProgramBuilder, ValueType, Variable};

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

        fn host(&mut self, name: &str, authority: LabelExpression) {
            let declaration = self.builder.add(
                NodeKind::HostDeclaration {
                    host: crate::syntax::Host::new(name),
                    authority,
                },
                here(),
            );
            self.declarations.push(declaration);
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

    fn analyze(tree: &ProgramTree) -> Result<InformationFlowAnalysis> {
        let names = NameAnalysis::new(tree)?;
        let trust = HostTrustConfiguration::from_program(tree)?;
        InformationFlowAnalysis::new(tree, &names, &trust)
    }

    /// Hosts for the two-party scenarios: alice, and bob who additionally
    /// accepts alice-trusted data.
    fn two_hosts(program: &mut TestProgram) {
        program.host("alice", LabelExpression::principal("alice"));
        program.host(
            "bob",
            LabelExpression::Join(
                Box::new(LabelExpression::principal("bob")),
                Box::new(LabelExpression::Integrity(Box::new(
                    LabelExpression::principal("alice"),
                ))),
            ),
        );
    }

    #[test]
    fn declassified_input_may_be_output() {
        let mut program = TestProgram::new();
        two_hosts(&mut program);
        let input = program.builder.add(
            NodeKind::Input {
                value_type: ValueType::Integer,
                host: crate::syntax::Host::new("alice"),
            },
            here(),
        );
        let let_x = program.builder.add(
            NodeKind::Let {
                temporary: Variable::new("x"),
                value: input,
            },
            here(),
        );
        let read_x = program.builder.add(
            NodeKind::ReadTemporary {
                temporary: Variable::new("x"),
            },
            here(),
        );
        let declassified = program.builder.add(
            NodeKind::Declassify {
                expression: read_x,
                from_label: Some(LabelExpression::principal("alice")),
                to_label: LabelExpression::Integrity(Box::new(LabelExpression::principal(
                    "alice",
                ))),
            },
            here(),
        );
        let let_y = program.builder.add(
            NodeKind::Let {
                temporary: Variable::new("y"),
                value: declassified,
            },
            here(),
        );
        let read_y = program.builder.add(
            NodeKind::ReadTemporary {
                temporary: Variable::new("y"),
            },
            here(),
        );
        let output = program.builder.add(
            NodeKind::Output {
                message: read_y,
                host: crate::syntax::Host::new("bob"),
            },
            here(),
        );
        program.main(vec![let_x, let_y, output]);
        let tree = program.build();

        let analysis = analyze(&tree).unwrap();
        let declassified_label = analysis.label(declassified).unwrap();
        assert_eq!(
            declassified_label,
            &Label::from_principal(crate::security::Principal::new("alice")).integrity()
        );
    }

    #[test]
    fn secret_output_without_declassify_is_insecure() {
        let mut program = TestProgram::new();
        two_hosts(&mut program);
        let input = program.builder.add(
            NodeKind::Input {
                value_type: ValueType::Integer,
                host: crate::syntax::Host::new("alice"),
            },
            here(),
        );
        let let_x = program.builder.add(
            NodeKind::Let {
                temporary: Variable::new("x"),
                value: input,
            },
            here(),
        );
        let read_x = program.builder.add(
            NodeKind::ReadTemporary {
                temporary: Variable::new("x"),
            },
            here(),
        );
        let output = program.builder.add(
            NodeKind::Output {
                message: read_x,
                host: crate::syntax::Host::new("bob"),
            },
            here(),
        );
        program.main(vec![let_x, output]);
        let tree = program.build();

        assert!(matches!(
            analyze(&tree),
            Err(Error::InsecureDataFlow { .. })
        ));
    }

    #[test]
    fn insecure_flow_diagnostic_highlights_the_violated_constraint() {
        let mut program = TestProgram::new();
        two_hosts(&mut program);
        let input = program.builder.add(
            NodeKind::Input {
                value_type: ValueType::Integer,
                host: crate::syntax::Host::new("alice"),
            },
            here(),
        );
        let let_x = program.builder.add(
            NodeKind::Let {
                temporary: Variable::new("x"),
                value: input,
            },
            here(),
        );
        let read_x = program.builder.add(
            NodeKind::ReadTemporary {
                temporary: Variable::new("x"),
            },
            here(),
        );
        let output = program.builder.add(
            NodeKind::Output {
                message: read_x,
                host: crate::syntax::Host::new("bob"),
            },
            here(),
        );
        program.main(vec![let_x, output]);
        let tree = program.build();

        let names = NameAnalysis::new(&tree).unwrap();
        let trust = HostTrustConfiguration::from_program(&tree).unwrap();
        let diagnostic =
            InformationFlowAnalysis::with_diagnostics(&tree, &names, &trust).unwrap_err();
        assert!(matches!(diagnostic.error, Error::InsecureDataFlow { .. }));
        assert_eq!(diagnostic.function, FunctionName::new("main"));
        assert!(diagnostic.constraint_graph.contains("digraph"));
        assert!(diagnostic.constraint_graph.contains("color=red"));
    }

    #[test]
    fn secret_guard_with_public_effect_is_insecure() {
        let mut program = TestProgram::new();
        two_hosts(&mut program);
        let input = program.builder.add(
            NodeKind::Input {
                value_type: ValueType::Boolean,
                host: crate::syntax::Host::new("alice"),
            },
            here(),
        );
        let let_g = program.builder.add(
            NodeKind::Let {
                temporary: Variable::new("g"),
                value: input,
            },
            here(),
        );
        let read_g = program.builder.add(
            NodeKind::ReadTemporary {
                temporary: Variable::new("g"),
            },
            here(),
        );
        let one = program.builder.add(
            NodeKind::Literal {
                value: crate::syntax::Value::Integer(1),
            },
            here(),
        );
        let output = program.builder.add(
            NodeKind::Output {
                message: one,
                host: crate::syntax::Host::new("bob"),
            },
            here(),
        );
        let then_branch = program.builder.add(
            NodeKind::Block {
                statements: vec![output],
            },
            here(),
        );
        let else_branch = program
            .builder
            .add(NodeKind::Block { statements: vec![] }, here());
        let conditional = program.builder.add(
            NodeKind::If {
                guard: read_g,
                then_branch,
                else_branch,
            },
            here(),
        );
        program.main(vec![let_g, conditional]);
        let tree = program.build();

        assert!(matches!(
            analyze(&tree),
            Err(Error::InsecureControlFlow { .. })
        ));
    }

    #[test]
    fn integrity_changing_declassification_is_rejected() {
        let mut program = TestProgram::new();
        two_hosts(&mut program);
        let input = program.builder.add(
            NodeKind::Input {
                value_type: ValueType::Integer,
                host: crate::syntax::Host::new("alice"),
            },
            here(),
        );
        let let_x = program.builder.add(
            NodeKind::Let {
                temporary: Variable::new("x"),
                value: input,
            },
            here(),
        );
        let read_x = program.builder.add(
            NodeKind::ReadTemporary {
                temporary: Variable::new("x"),
            },
            here(),
        );
        // Dropping to public *and untrusted* changes integrity.
        let declassified = program.builder.add(
            NodeKind::Declassify {
                expression: read_x,
                from_label: Some(LabelExpression::principal("alice")),
                to_label: LabelExpression::Top,
            },
            here(),
        );
        let let_y = program.builder.add(
            NodeKind::Let {
                temporary: Variable::new("y"),
                value: declassified,
            },
            here(),
        );
        program.main(vec![let_x, let_y]);
        let tree = program.build();

        assert!(matches!(
            analyze(&tree),
            Err(Error::IntegrityChangingDeclassification { .. })
        ));
    }

    #[test]
    fn called_function_is_solved_with_caller_labels() {
        // fn deliver(message: Cell<integer> {alice}) {
        //     output message.get() to alice
        // }
        // fn main() { let x = input integer from alice; deliver(x); }
        let mut program = TestProgram::new();
        program.host("alice", LabelExpression::principal("alice"));

        let parameter = program.builder.add(
            NodeKind::Parameter {
                name: ObjectVariable::new("message"),
                direction: crate::syntax::ParameterDirection::In,
                object_type: crate::syntax::ObjectType::ImmutableCell(ValueType::Integer),
                label: Some(LabelExpression::principal("alice")),
            },
            here(),
        );
        let query = program.builder.add(
            NodeKind::Query {
                object: ObjectVariable::new("message"),
                method: crate::syntax::MethodName::Get,
                arguments: vec![],
            },
            here(),
        );
        let let_m = program.builder.add(
            NodeKind::Let {
                temporary: Variable::new("m"),
                value: query,
            },
            here(),
        );
        let read_m = program.builder.add(
            NodeKind::ReadTemporary {
                temporary: Variable::new("m"),
            },
            here(),
        );
        let output = program.builder.add(
            NodeKind::Output {
                message: read_m,
                host: crate::syntax::Host::new("alice"),
            },
            here(),
        );
        let deliver_body = program.builder.add(
            NodeKind::Block {
                statements: vec![let_m, output],
            },
            here(),
        );
        let deliver = program.builder.add(
            NodeKind::FunctionDeclaration {
                function: FunctionName::new("deliver"),
                label_parameters: vec![],
                parameters: vec![parameter],
                pc_label: None,
                body: deliver_body,
            },
            here(),
        );
        program.declarations.push(deliver);

        let input = program.builder.add(
            NodeKind::Input {
                value_type: ValueType::Integer,
                host: crate::syntax::Host::new("alice"),
            },
            here(),
        );
        let let_x = program.builder.add(
            NodeKind::Let {
                temporary: Variable::new("x"),
                value: input,
            },
            here(),
        );
        let read_x = program.builder.add(
            NodeKind::ReadTemporary {
                temporary: Variable::new("x"),
            },
            here(),
        );
        let argument = program.builder.add(
            NodeKind::Argument(CallArgument::Expression { value: read_x }),
            here(),
        );
        let call = program.builder.add(
            NodeKind::FunctionCall {
                function: FunctionName::new("deliver"),
                arguments: vec![argument],
            },
            here(),
        );
        program.main(vec![let_x, call]);
        let tree = program.build();

        let analysis = analyze(&tree).unwrap();
        // The callee's parameter carries the caller's argument label.
        let alice = Label::from_principal(crate::security::Principal::new("alice"));
        assert_eq!(analysis.label(parameter).unwrap(), &alice);
        assert!(analysis.pc_label(output).is_ok());
    }
}
