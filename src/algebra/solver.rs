//! A greatest-solution constraint system over a bounded distributive lattice.
//!
//! Constraints have the shape `lhs ≤ rhs` where the left side is a constant,
//! a variable, or `constant ∧ variable`, and the right side is a constant, a
//! variable, or `constant ∨ variable`. The solver finds the greatest
//! assignment of lattice values to variables satisfying all constraints, or
//! reports the first violated constraint along with the best estimates for
//! both sides.
//!
//! # Algorithm
//!
//! Every constraint becomes an edge from the right-hand term to the
//! left-hand variable carrying a monotone transfer function; constraints with
//! a constant on the left produce no edge and are only verified. Variables
//! start at top and are lowered by taking the meet of all incoming edge
//! outputs. The term graph is condensed into strongly connected components
//! and solved component by component in topological order, with a worklist
//! inside each component. A final verification pass re-checks every
//! constraint against the computed solution, so constraints that cannot
//! lower anything (constant ≤ variable) still fail loudly when violated.

use std::collections::HashMap;
use std::fmt::Display;
use std::io::{self, Write};

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use tracing::debug;

use crate::algebra::{HeytingAlgebra, PartialOrder};
use crate::util::UniqueQueue;

/// A handle to a variable in a [`ConstraintSystem`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VariableRef(NodeIndex);

/// A term allowed on the left-hand side of a `≤` constraint.
#[derive(Debug, Clone)]
pub enum LeftHandTerm<L> {
    /// A constant lattice value.
    Constant(L),
    /// A plain variable.
    Variable(VariableRef),
    /// `constant ∧ variable`; solved through the Heyting residual.
    ConstantMeetVariable(L, VariableRef),
}

/// A term allowed on the right-hand side of a `≤` constraint.
#[derive(Debug, Clone)]
pub enum RightHandTerm<L> {
    /// A constant lattice value.
    Constant(L),
    /// A plain variable.
    Variable(VariableRef),
    /// `constant ∨ variable`.
    ConstantJoinVariable(L, VariableRef),
}

#[derive(Debug)]
enum Node<L> {
    Variable { name: String },
    Constant { value: L },
}

/// Transfer function attached to a propagation edge.
///
/// For an edge from source `s` to target variable `t`, the contribution to
/// `t` is `imply_from → (join_with ∨ value(s))`, with each part optional.
#[derive(Debug, Clone)]
struct Transfer<L> {
    join_with: Option<L>,
    imply_from: Option<L>,
    /// Tag of the constraint this edge came from; the DOT export uses it
    /// to highlight violated constraints.
    tag: usize,
}

impl<L: HeytingAlgebra> Transfer<L> {
    fn apply(&self, value: &L) -> L {
        let joined = match &self.join_with {
            Some(constant) => constant.join(value),
            None => value.clone(),
        };
        match &self.imply_from {
            Some(constant) => constant.imply(&joined),
            None => joined,
        }
    }
}

#[derive(Debug)]
struct Constraint<L> {
    lhs: LeftHandTerm<L>,
    rhs: RightHandTerm<L>,
    tag: usize,
}

/// The solved values of all variables in a system.
#[derive(Debug, Clone)]
pub struct Solution<L> {
    values: HashMap<NodeIndex, L>,
}

impl<L: HeytingAlgebra> Solution<L> {
    /// Returns the value assigned to `variable`.
    ///
    /// Every variable created through the owning system is present.
    #[must_use]
    pub fn value(&self, variable: VariableRef) -> L {
        self.values
            .get(&variable.0)
            .cloned()
            .unwrap_or_else(L::top)
    }

    fn evaluate_lhs(&self, term: &LeftHandTerm<L>) -> L {
        match term {
            LeftHandTerm::Constant(value) => value.clone(),
            LeftHandTerm::Variable(variable) => self.value(*variable),
            LeftHandTerm::ConstantMeetVariable(constant, variable) => {
                constant.meet(&self.value(*variable))
            }
        }
    }

    fn evaluate_rhs(&self, term: &RightHandTerm<L>) -> L {
        match term {
            RightHandTerm::Constant(value) => value.clone(),
            RightHandTerm::Variable(variable) => self.value(*variable),
            RightHandTerm::ConstantJoinVariable(constant, variable) => {
                constant.join(&self.value(*variable))
            }
        }
    }
}

/// A violated constraint, reported with the best estimates for both sides.
#[derive(Debug)]
pub struct SystemFailure<L> {
    /// The tag the violated constraint was registered with.
    pub tag: usize,
    /// Greatest value the left-hand side can take.
    pub lhs: L,
    /// Value of the right-hand side under the solution.
    pub rhs: L,
    /// The (unsatisfying) greatest solution, for diagnostics.
    pub solution: Solution<L>,
}

/// A set of `≤` constraints over lattice variables and constants.
#[derive(Debug)]
pub struct ConstraintSystem<L> {
    graph: DiGraph<Node<L>, Transfer<L>>,
    constraints: Vec<Constraint<L>>,
    variable_count: usize,
}

impl<L: HeytingAlgebra> Default for ConstraintSystem<L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: HeytingAlgebra> ConstraintSystem<L> {
    /// Creates an empty system.
    #[must_use]
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            constraints: Vec::new(),
            variable_count: 0,
        }
    }

    /// Creates a fresh variable. `name` is only used in diagnostics and the
    /// DOT export.
    pub fn fresh_variable(&mut self, name: impl Into<String>) -> VariableRef {
        self.variable_count += 1;
        VariableRef(self.graph.add_node(Node::Variable { name: name.into() }))
    }

    /// Number of variables created so far.
    #[must_use]
    pub fn variable_count(&self) -> usize {
        self.variable_count
    }

    /// Adds the constraint `lhs ≤ rhs`, tagged with `tag` for failure
    /// reporting. Trivially true constraints are dropped.
    pub fn add_less_than_or_equal_to(
        &mut self,
        lhs: LeftHandTerm<L>,
        rhs: RightHandTerm<L>,
        tag: usize,
    ) {
        if self.is_trivially_true(&lhs, &rhs) {
            return;
        }

        // Propagation lowers the left-hand variable, if there is one.
        let (target, imply_from) = match &lhs {
            LeftHandTerm::Constant(_) => (None, None),
            LeftHandTerm::Variable(variable) => (Some(variable.0), None),
            LeftHandTerm::ConstantMeetVariable(constant, variable) => {
                (Some(variable.0), Some(constant.clone()))
            }
        };

        if let Some(target) = target {
            let (source, join_with) = match &rhs {
                RightHandTerm::Constant(value) => (
                    self.graph.add_node(Node::Constant {
                        value: value.clone(),
                    }),
                    None,
                ),
                RightHandTerm::Variable(variable) => (variable.0, None),
                RightHandTerm::ConstantJoinVariable(constant, variable) => {
                    (variable.0, Some(constant.clone()))
                }
            };
            self.graph.add_edge(
                source,
                target,
                Transfer {
                    join_with,
                    imply_from,
                    tag,
                },
            );
        }

        self.constraints.push(Constraint { lhs, rhs, tag });
    }

    fn is_trivially_true(&self, lhs: &LeftHandTerm<L>, rhs: &RightHandTerm<L>) -> bool {
        match (lhs, rhs) {
            (LeftHandTerm::Constant(value), _) if value == &L::bottom() => true,
            (_, RightHandTerm::Constant(value)) if value == &L::top() => true,
            (LeftHandTerm::Constant(lhs), RightHandTerm::Constant(rhs)) => {
                lhs.less_than_or_equal_to(rhs)
            }
            (LeftHandTerm::Variable(lhs), RightHandTerm::Variable(rhs)) => lhs == rhs,
            _ => false,
        }
    }

    /// Computes the greatest solution and verifies every constraint against
    /// it.
    ///
    /// # Errors
    ///
    /// Returns a [`SystemFailure`] describing the first violated constraint
    /// (in insertion order) when the constraints are unsatisfiable.
    pub fn solve(&self) -> Result<Solution<L>, Box<SystemFailure<L>>> {
        let mut values: HashMap<NodeIndex, L> = HashMap::with_capacity(self.graph.node_count());
        for index in self.graph.node_indices() {
            let initial = match &self.graph[index] {
                Node::Variable { .. } => L::top(),
                Node::Constant { value } => value.clone(),
            };
            values.insert(index, initial);
        }

        // Tarjan yields components in reverse topological order; reversing
        // gives sources-first, so every value a component depends on is
        // final before the component itself is processed.
        let components = tarjan_scc(&self.graph);
        debug!(
            variables = self.variable_count,
            constraints = self.constraints.len(),
            components = components.len(),
            "solving constraint system"
        );

        for component in components.iter().rev() {
            let mut worklist: UniqueQueue<NodeIndex> = UniqueQueue::new();
            for &node in component {
                worklist.push(node);
            }
            while let Some(node) = worklist.pop() {
                if matches!(self.graph[node], Node::Constant { .. }) {
                    continue;
                }
                let mut new_value = L::top();
                for edge in self.graph.edges_directed(node, Direction::Incoming) {
                    let source_value = &values[&edge.source()];
                    new_value = new_value.meet(&edge.weight().apply(source_value));
                }
                if values[&node] != new_value {
                    values.insert(node, new_value);
                    for edge in self.graph.edges_directed(node, Direction::Outgoing) {
                        if component.contains(&edge.target()) {
                            worklist.push(edge.target());
                        }
                    }
                }
            }
        }

        let solution = Solution { values };
        for constraint in &self.constraints {
            let lhs = solution.evaluate_lhs(&constraint.lhs);
            let rhs = solution.evaluate_rhs(&constraint.rhs);
            if !lhs.less_than_or_equal_to(&rhs) {
                return Err(Box::new(SystemFailure {
                    tag: constraint.tag,
                    lhs,
                    rhs,
                    solution,
                }));
            }
        }
        Ok(solution)
    }
}

impl<L: HeytingAlgebra + Display> ConstraintSystem<L> {
    /// Writes the term graph in DOT format for external visualization.
    ///
    /// When `violated` names a constraint tag, every edge that constraint
    /// produced is drawn in red. A violated constraint without a
    /// propagation edge (constant on the left) is drawn as an explicit
    /// dashed edge, so the failure is visible either way.
    ///
    /// # Errors
    ///
    /// Propagates I/O failures from `writer`.
    pub fn export_dot<W: Write>(&self, writer: &mut W, violated: Option<usize>) -> io::Result<()> {
        writeln!(writer, "digraph constraints {{")?;
        for index in self.graph.node_indices() {
            match &self.graph[index] {
                Node::Variable { name } => {
                    writeln!(writer, "  n{} [label=\"{name}\"];", index.index())?;
                }
                Node::Constant { value } => {
                    writeln!(
                        writer,
                        "  n{} [label=\"{value}\", shape=box];",
                        index.index()
                    )?;
                }
            }
        }
        for edge in self.graph.edge_references() {
            let transfer = edge.weight();
            let mut label = String::new();
            if let Some(join) = &transfer.join_with {
                label.push_str(&format!("\u{2228} {join}"));
            }
            if let Some(imply) = &transfer.imply_from {
                if !label.is_empty() {
                    label.push_str("; ");
                }
                label.push_str(&format!("{imply} \u{2192}"));
            }
            let highlight = if violated == Some(transfer.tag) {
                ", color=red, penwidth=2"
            } else {
                ""
            };
            writeln!(
                writer,
                "  n{} -> n{} [label=\"{label}\"{highlight}];",
                edge.source().index(),
                edge.target().index()
            )?;
        }
        if let Some(tag) = violated {
            let drawn = self
                .graph
                .edge_references()
                .any(|edge| edge.weight().tag == tag);
            if !drawn {
                for constraint in self.constraints.iter().filter(|c| c.tag == tag) {
                    self.export_violated_constraint(writer, constraint)?;
                }
            }
        }
        writeln!(writer, "}}")
    }

    /// Draws a verify-only violated constraint as its own red edge,
    /// synthesizing box nodes for constant sides.
    fn export_violated_constraint<W: Write>(
        &self,
        writer: &mut W,
        constraint: &Constraint<L>,
    ) -> io::Result<()> {
        let lhs = match &constraint.lhs {
            LeftHandTerm::Constant(value) => {
                writeln!(
                    writer,
                    "  v{}l [label=\"{value}\", shape=box, color=red];",
                    constraint.tag
                )?;
                format!("v{}l", constraint.tag)
            }
            LeftHandTerm::Variable(variable)
            | LeftHandTerm::ConstantMeetVariable(_, variable) => {
                format!("n{}", variable.0.index())
            }
        };
        let rhs = match &constraint.rhs {
            RightHandTerm::Constant(value) => {
                writeln!(
                    writer,
                    "  v{}r [label=\"{value}\", shape=box, color=red];",
                    constraint.tag
                )?;
                format!("v{}r", constraint.tag)
            }
            RightHandTerm::Variable(variable)
            | RightHandTerm::ConstantJoinVariable(_, variable) => {
                format!("n{}", variable.0.index())
            }
        };
        writeln!(
            writer,
            "  {rhs} -> {lhs} [label=\"violated\", color=red, penwidth=2, style=dashed];"
        )
    }
}
