//! Benchmarks for the analysis and selection pipeline.
//!
//! Measures the phases on a synthetic straight-line program:
//! - Name resolution and type checking
//! - Information-flow label inference
//! - Protocol selection (problem construction plus search)

extern crate secflow;

use criterion::{criterion_group, criterion_main, Criterion};
use secflow::prelude::*;
use std::hint::black_box;

fn here() -> SourceLocation {
    SourceLocation::new(1, 1)
}

/// A single-host program with `chains` independent input/compute/output
/// chains, each three statements long.
fn chained_program(chains: usize) -> ProgramTree {
    let mut builder = ProgramBuilder::new();
    let host_declaration = builder.add(
        NodeKind::HostDeclaration {
            host: Host::new("alice"),
            authority: LabelExpression::principal("alice"),
        },
        here(),
    );

    let mut statements = Vec::new();
    for chain in 0..chains {
        let input = builder.add(
            NodeKind::Input {
                value_type: ValueType::Integer,
                host: Host::new("alice"),
            },
            here(),
        );
        let source = format!("in{chain}");
        let let_input = builder.add(
            NodeKind::Let {
                temporary: Variable::new(source.clone()),
                value: input,
            },
            here(),
        );

        let lhs = builder.add(
            NodeKind::ReadTemporary {
                temporary: Variable::new(source.clone()),
            },
            here(),
        );
        let rhs = builder.add(
            NodeKind::ReadTemporary {
                temporary: Variable::new(source),
            },
            here(),
        );
        let sum = builder.add(
            NodeKind::Operator {
                operator: Operator::Add,
                arguments: vec![lhs, rhs],
            },
            here(),
        );
        let doubled = format!("sum{chain}");
        let let_sum = builder.add(
            NodeKind::Let {
                temporary: Variable::new(doubled.clone()),
                value: sum,
            },
            here(),
        );

        let message = builder.add(
            NodeKind::ReadTemporary {
                temporary: Variable::new(doubled),
            },
            here(),
        );
        let output = builder.add(
            NodeKind::Output {
                message,
                host: Host::new("alice"),
            },
            here(),
        );
        statements.extend([let_input, let_sum, output]);
    }

    let body = builder.add(NodeKind::Block { statements }, here());
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
            declarations: vec![host_declaration, main],
        },
        here(),
    );
    builder.build(root).unwrap()
}

fn bench_name_and_type_analysis(c: &mut Criterion) {
    let tree = chained_program(50);

    c.bench_function("analysis_names_and_types", |b| {
        b.iter(|| {
            let names = NameAnalysis::new(black_box(&tree)).unwrap();
            let types = TypeAnalysis::new(&tree, &names).unwrap();
            black_box((&names, &types));
        });
    });
}

fn bench_information_flow(c: &mut Criterion) {
    let tree = chained_program(50);
    let names = NameAnalysis::new(&tree).unwrap();
    let trust = HostTrustConfiguration::from_program(&tree).unwrap();

    c.bench_function("analysis_information_flow", |b| {
        b.iter(|| {
            let flows =
                InformationFlowAnalysis::new(black_box(&tree), &names, &trust).unwrap();
            black_box(flows)
        });
    });
}

fn bench_protocol_selection(c: &mut Criterion) {
    let tree = chained_program(50);
    let names = NameAnalysis::new(&tree).unwrap();
    let types = TypeAnalysis::new(&tree, &names).unwrap();
    let trust = HostTrustConfiguration::from_program(&tree).unwrap();
    let information_flow = InformationFlowAnalysis::new(&tree, &names, &trust).unwrap();
    let context = SelectionContext {
        tree: &tree,
        names: &names,
        types: &types,
        information_flow: &information_flow,
        trust: &trust,
    };
    let factory = UnionFactory::all_backends(&trust);
    let estimator = SimpleCostEstimator::new(CostRegime::Lan);

    c.bench_function("selection_problem_and_search", |b| {
        b.iter(|| {
            let problem =
                SelectionProblem::new(&context, &factory, &SimpleProtocolComposer).unwrap();
            let assignment = CostOrderedSearch
                .select(&context, &problem, &estimator)
                .unwrap();
            black_box(assignment)
        });
    });
}

criterion_group!(
    benches,
    bench_name_and_type_analysis,
    bench_information_flow,
    bench_protocol_selection
);
criterion_main!(benches);
