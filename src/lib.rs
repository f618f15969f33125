// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(dead_code)]
#![allow(clippy::too_many_arguments)]

//! # secflow
//!
//! [![Crates.io](https://img.shields.io/crates/v/secflow.svg)](https://crates.io/crates/secflow)
//! [![Documentation](https://docs.rs/secflow/badge.svg)](https://docs.rs/secflow)
//! [![License](https://img.shields.io/badge/license-Apache--2.0-blue.svg)](https://github.com/BinFlip/secflow/blob/main/LICENSE-APACHE)
//!
//! A security-typed compiler core for distributed programs. `secflow` takes a
//! program annotated with information-flow labels, verifies that every data
//! and control flow respects the labels, and then assigns each variable a
//! cryptographic (or plain) protocol — local storage, replication, two-party
//! MPC, commitments, or zero-knowledge proofs — whose authority is strong
//! enough to protect it.
//!
//! ## Features
//!
//! - **🔐 Label inference** - Flows-to constraints over the free distributive
//!   lattice of principals, solved for the greatest (most permissive) labels
//! - **🛡️ Non-malleable downgrades** - Declassification and endorsement are
//!   checked against the non-malleability condition, not just the flow order
//! - **⚙️ Protocol selection** - A constraint-driven, cost-ordered search
//!   places every variable on a viable backend and re-validates the result
//! - **🧩 Extensible backends** - Factories, composers, and cost estimators
//!   are traits; adding a backend never touches the search
//! - **📊 Explicit analyses** - Name resolution, type checking, out-parameter
//!   initialization, and statement placement are separate, testable passes
//! - **🔍 Diagnosable solving** - Constraint graphs export to Graphviz for
//!   debugging label inference failures
//!
//! ## Quick Start
//!
//! Add `secflow` to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! secflow = "0.1"
//! ```
//!
//! ### Compiling a program
//!
//! Programs are built as arena trees, checked by the analyses in order, and
//! handed to selection:
//!
//! ```rust
//! use secflow::prelude::*;
//!
//! // host alice; fn main() { let x = input alice; output x to alice; }
//! let mut builder = ProgramBuilder::new();
//! let here = SourceLocation::new(1, 1);
//! let alice = builder.add(
//!     NodeKind::HostDeclaration {
//!         host: Host::new("alice"),
//!         authority: LabelExpression::principal("alice"),
//!     },
//!     here,
//! );
//! let value = builder.add(
//!     NodeKind::Input {
//!         value_type: ValueType::Integer,
//!         host: Host::new("alice"),
//!     },
//!     here,
//! );
//! let let_x = builder.add(
//!     NodeKind::Let {
//!         temporary: Variable::new("x"),
//!         value,
//!     },
//!     here,
//! );
//! let message = builder.add(
//!     NodeKind::ReadTemporary {
//!         temporary: Variable::new("x"),
//!     },
//!     here,
//! );
//! let output = builder.add(
//!     NodeKind::Output {
//!         message,
//!         host: Host::new("alice"),
//!     },
//!     here,
//! );
//! let body = builder.add(
//!     NodeKind::Block {
//!         statements: vec![let_x, output],
//!     },
//!     here,
//! );
//! let main = builder.add(
//!     NodeKind::FunctionDeclaration {
//!         function: FunctionName::new("main"),
//!         label_parameters: vec![],
//!         parameters: vec![],
//!         pc_label: None,
//!         body,
//!     },
//!     here,
//! );
//! let root = builder.add(
//!     NodeKind::Program {
//!         declarations: vec![alice, main],
//!     },
//!     here,
//! );
//! let tree = builder.build(root)?;
//!
//! // Verify the program, then place every variable on a protocol.
//! let names = NameAnalysis::new(&tree)?;
//! let types = TypeAnalysis::new(&tree, &names)?;
//! let trust = HostTrustConfiguration::from_program(&tree)?;
//! let information_flow = InformationFlowAnalysis::new(&tree, &names, &trust)?;
//!
//! let context = SelectionContext {
//!     tree: &tree,
//!     names: &names,
//!     types: &types,
//!     information_flow: &information_flow,
//!     trust: &trust,
//! };
//! let factory = UnionFactory::all_backends(&trust);
//! let problem = SelectionProblem::new(&context, &factory, &SimpleProtocolComposer)?;
//! let estimator = SimpleCostEstimator::new(CostRegime::Lan);
//! let assignment = CostOrderedSearch.select(&context, &problem, &estimator)?;
//! validate_protocol_assignment(&context, &problem, &assignment)?;
//! # Ok::<(), secflow::Error>(())
//! ```
//!
//! ## Architecture
//!
//! `secflow` is organized into several key modules:
//!
//! - [`prelude`] - Convenient re-exports of commonly used types and traits
//! - [`syntax`] - The arena-backed program tree and its node kinds
//! - [`algebra`] - Lattice traits, the free distributive lattice, and the
//!   generic greatest-solution constraint system
//! - [`security`] - Labels, label expressions, host trust, and the
//!   information-flow constraint solver
//! - [`analysis`] - Name resolution, type checking, information-flow
//!   verification, out-parameter initialization, and statement placement
//! - [`protocols`] - The concrete protocols and their authority labels
//! - [`selection`] - Factories, composers, cost estimation, and the search
//!   that assigns protocols to variables
//! - [`passes`] - Whole-program transformations, currently call-site
//!   specialization
//! - [`Error`] and [`Result`] - Comprehensive error handling
//!
//! ### Verification pipeline
//!
//! The analyses build on each other in a fixed order: names feed types, both
//! feed information flow, and selection consumes all three. Each analysis is
//! an explicit context object constructed once per program; successful
//! construction is the proof that the program passed. After selection, the
//! [`analysis::ProtocolAnalysis`] derives the statement placement code
//! generation works from.
//!
//! ### Selection engine
//!
//! Selection is deliberately split along its extension seams: a
//! [`selection::ProtocolFactory`] says what a backend can implement and under
//! which side constraints, a [`selection::ProtocolComposer`] says which
//! protocols can exchange values, and a [`selection::CostEstimator`] prices
//! the candidates. The default [`selection::CostOrderedSearch`] tries cheap
//! candidates first and backtracks on contradiction; the finished assignment
//! is independently re-validated before anything downstream trusts it.

#[macro_use]
mod error;

pub mod algebra;
pub mod analysis;
pub mod passes;
pub mod prelude;
pub mod protocols;
pub mod security;
pub mod selection;
pub mod syntax;
pub mod util;

pub use error::Error;

/// The result type used throughout `secflow`.
pub type Result<T> = std::result::Result<T, Error>;
