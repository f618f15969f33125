//! Security labels and the information-flow constraint solver.
//!
//! A [`Label`] pairs a confidentiality component with an integrity
//! component, each an element of the free distributive lattice over
//! [`Principal`] atoms. The [`solver`] submodule layers flows-to and
//! equality constraints between label terms on top of the generic
//! constraint system in [`crate::algebra`].

mod label;
mod label_expression;
pub mod solver;

use std::collections::BTreeMap;
use std::fmt;

pub use label::{Label, PrincipalComponent};
pub use label_expression::LabelExpression;

use crate::syntax::{Host, NodeKind, ProgramTree, SourceLocation};
use crate::Result;

/// An atomic participant in the security lattice.
///
/// Hosts declared by the program are principals; label components are
/// built from principal atoms.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Principal(String);

impl Principal {
    /// Creates a principal with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The principal's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&Host> for Principal {
    fn from(host: &Host) -> Self {
        Self(host.name().to_string())
    }
}

/// The authority labels of all hosts declared by a program.
///
/// Built once from the host declarations and consulted by the
/// information-flow analysis (input statements), protocol authority
/// computations, and protocol selection.
#[derive(Debug, Clone, Default)]
pub struct HostTrustConfiguration {
    authorities: BTreeMap<Host, Label>,
}

impl HostTrustConfiguration {
    /// Creates an empty configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads every host declaration of `tree` and interprets its authority
    /// label expression.
    ///
    /// # Errors
    ///
    /// Fails if an authority expression mentions a label parameter; host
    /// declarations are top level and have none in scope.
    pub fn from_program(tree: &ProgramTree) -> Result<Self> {
        let mut authorities = BTreeMap::new();
        for declaration in tree.host_declarations() {
            if let NodeKind::HostDeclaration { host, authority } = tree.kind(declaration) {
                let label = authority.interpret(&BTreeMap::new(), tree.location(declaration))?;
                authorities.insert(host.clone(), label);
            }
        }
        Ok(Self { authorities })
    }

    /// Registers `host` with the given authority label.
    pub fn insert(&mut self, host: Host, authority: Label) {
        self.authorities.insert(host, authority);
    }

    /// The authority label of `host`.
    ///
    /// # Errors
    ///
    /// Fails with [`crate::Error::UndefinedName`] if the host was never
    /// declared.
    pub fn authority(&self, host: &Host, location: SourceLocation) -> Result<&Label> {
        self.authorities
            .get(host)
            .ok_or_else(|| crate::Error::UndefinedName {
                name: host.name().to_string(),
                location,
            })
    }

    /// All declared hosts, in name order.
    pub fn hosts(&self) -> impl Iterator<Item = &Host> {
        self.authorities.keys()
    }

    /// Number of declared hosts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.authorities.len()
    }

    /// Returns `true` if no host is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.authorities.is_empty()
    }
}
