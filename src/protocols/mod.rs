//! Concrete protocols a variable can be assigned to.
//!
//! Each protocol names the hosts it runs on and derives its authority label
//! from the host trust configuration. Selection only assigns a protocol to a
//! variable when the protocol's authority acts for the variable's inferred
//! label; the authority formulas below are therefore the security core of
//! every backend.

use std::collections::BTreeSet;
use std::fmt;

use crate::security::{HostTrustConfiguration, Label};
use crate::syntax::{Host, SourceLocation};
use crate::Result;

/// The circuit representation an MPC value is shared in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, strum::Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum MpcCircuit {
    /// Arithmetic shares; cheap additions and multiplications only.
    Arithmetic,
    /// Boolean (GMW) shares.
    Boolean,
    /// Yao garbled-circuit shares.
    Yao,
}

/// A cryptographic or trust execution strategy for one variable.
///
/// Ordered and hashable so protocols can key maps and populate sets; the
/// derived order also makes backtracking search deterministic.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Protocol {
    /// Cleartext storage on a single host.
    Local {
        /// The storing host.
        host: Host,
    },
    /// Cleartext copies on every host in the set; reads cross-check
    /// replicas.
    Replication {
        /// The replica hosts; at least two.
        hosts: BTreeSet<Host>,
    },
    /// Two-party semi-honest MPC with abort, in one of three share
    /// representations.
    Mpc {
        /// The share representation.
        circuit: MpcCircuit,
        /// The party driving the computation.
        server: Host,
        /// The other party.
        client: Host,
    },
    /// The sender commits to a value; receivers hold the commitment and can
    /// later verify the opening.
    Commitment {
        /// The committing host.
        sender: Host,
        /// The commitment holders; never includes the sender.
        receivers: BTreeSet<Host>,
    },
    /// The prover convinces each verifier of a statement about its secret.
    Zkp {
        /// The host holding the witness.
        prover: Host,
        /// The verifying hosts; never includes the prover.
        verifiers: BTreeSet<Host>,
    },
}

impl Protocol {
    /// A [`Protocol::Mpc`] with arithmetic shares.
    #[must_use]
    pub fn arithmetic_mpc(server: Host, client: Host) -> Self {
        Self::Mpc {
            circuit: MpcCircuit::Arithmetic,
            server,
            client,
        }
    }

    /// A [`Protocol::Mpc`] with boolean shares.
    #[must_use]
    pub fn boolean_mpc(server: Host, client: Host) -> Self {
        Self::Mpc {
            circuit: MpcCircuit::Boolean,
            server,
            client,
        }
    }

    /// A [`Protocol::Mpc`] with Yao shares.
    #[must_use]
    pub fn yao_mpc(server: Host, client: Host) -> Self {
        Self::Mpc {
            circuit: MpcCircuit::Yao,
            server,
            client,
        }
    }

    /// The protocol's name, without its hosts.
    #[must_use]
    pub fn name(&self) -> String {
        match self {
            Self::Local { .. } => "Local".to_string(),
            Self::Replication { .. } => "Replication".to_string(),
            Self::Mpc { circuit, .. } => format!("{circuit}"),
            Self::Commitment { .. } => "Commitment".to_string(),
            Self::Zkp { .. } => "ZKP".to_string(),
        }
    }

    /// Every host participating in the protocol.
    #[must_use]
    pub fn hosts(&self) -> BTreeSet<Host> {
        match self {
            Self::Local { host } => BTreeSet::from([host.clone()]),
            Self::Replication { hosts } => hosts.clone(),
            Self::Mpc { server, client, .. } => {
                BTreeSet::from([server.clone(), client.clone()])
            }
            Self::Commitment { sender, receivers } => {
                let mut hosts = receivers.clone();
                hosts.insert(sender.clone());
                hosts
            }
            Self::Zkp { prover, verifiers } => {
                let mut hosts = verifiers.clone();
                hosts.insert(prover.clone());
                hosts
            }
        }
    }

    /// Returns `true` if the protocol stores values in cleartext on its
    /// hosts.
    #[must_use]
    pub fn is_cleartext(&self) -> bool {
        matches!(self, Self::Local { .. } | Self::Replication { .. })
    }

    /// The security label the protocol can enforce.
    ///
    /// A variable may only be assigned to this protocol when the returned
    /// label acts for the variable's label.
    ///
    /// # Errors
    ///
    /// Fails if a participating host was never declared.
    pub fn authority(&self, trust: &HostTrustConfiguration) -> Result<Label> {
        let here = SourceLocation::default();
        match self {
            // The host stores the value in the clear; it enforces exactly
            // its own trust.
            Self::Local { host } => Ok(trust.authority(host, here)?.clone()),

            // Any single replica can leak the value, so confidentiality is
            // what the hosts share; forging it requires corrupting every
            // replica, so integrity is their combined trust.
            Self::Replication { hosts } => fold_authorities(hosts, trust, |a, b| {
                a.or(b).confidentiality().and(&a.and(b).integrity())
            }),

            // Secure against a dishonest majority: confidentiality and
            // integrity both hold unless all parties are corrupted.
            Self::Mpc { server, client, .. } => {
                let server = trust.authority(server, here)?;
                let client = trust.authority(client, here)?;
                Ok(server.and(client))
            }

            // The sender keeps the value secret; receivers holding the
            // commitment add their integrity since the sender cannot
            // equivocate.
            Self::Commitment { sender, receivers } => {
                let sender = trust.authority(sender, here)?.clone();
                let receivers = fold_authorities(receivers, trust, |a, b| {
                    a.integrity().and(&b.integrity())
                })?;
                Ok(sender.and(&receivers.integrity()))
            }

            // Like commitment: the witness stays with the prover, and every
            // convinced verifier vouches for the result.
            Self::Zkp { prover, verifiers } => {
                let prover = trust.authority(prover, here)?.clone();
                let verifiers = fold_authorities(verifiers, trust, |a, b| {
                    a.integrity().and(&b.integrity())
                })?;
                Ok(prover.and(&verifiers.integrity()))
            }
        }
    }
}

fn fold_authorities(
    hosts: &BTreeSet<Host>,
    trust: &HostTrustConfiguration,
    combine: impl Fn(&Label, &Label) -> Label,
) -> Result<Label> {
    let here = SourceLocation::default();
    let mut authorities = hosts.iter();
    let first = match authorities.next() {
        Some(host) => trust.authority(host, here)?.clone(),
        None => return Ok(Label::weakest()),
    };
    authorities.try_fold(first, |acc, host| {
        Ok(combine(&acc, trust.authority(host, here)?))
    })
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hosts: Vec<String> = match self {
            Self::Local { host } => vec![host.to_string()],
            Self::Replication { hosts } => hosts.iter().map(Host::to_string).collect(),
            Self::Mpc { server, client, .. } => vec![server.to_string(), client.to_string()],
            Self::Commitment { sender, receivers } => std::iter::once(sender.to_string())
                .chain(receivers.iter().map(Host::to_string))
                .collect(),
            Self::Zkp { prover, verifiers } => std::iter::once(prover.to_string())
                .chain(verifiers.iter().map(Host::to_string))
                .collect(),
        };
        write!(f, "{}({})", self.name(), hosts.join(", "))
    }
}
