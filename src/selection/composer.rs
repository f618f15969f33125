//! Communication feasibility between protocol pairs.

use std::collections::BTreeSet;

use crate::protocols::Protocol;
use crate::syntax::Host;

/// Decides how protocols may compose: whether one protocol can hand a value
/// to another, and where a value held by a protocol is readable in the
/// clear.
///
/// Selection consults the composer when it turns def-use edges into
/// constraints; a reader may only sit on a protocol the definition's
/// protocol can send to.
pub trait ProtocolComposer {
    /// Returns `true` if `source` can send a value it holds to
    /// `destination`.
    fn can_communicate(&self, source: &Protocol, destination: &Protocol) -> bool;

    /// Hosts that can read a value held by `protocol` in the clear.
    ///
    /// A conditional guard must be visible somewhere unless every branch
    /// can be multiplexed away; protocols returning an empty set here can
    /// only hold guards of muxable conditionals.
    fn visible_guard_hosts(&self, protocol: &Protocol) -> BTreeSet<Host>;
}

/// The default composition rules for the built-in protocols.
///
/// Cleartext protocols send freely; entering an MPC, commitment, or ZKP
/// requires the sender to already be one of its participants (secret
/// inputs come from the owning host, cleartext inputs from all of them);
/// leaving one reveals the value, so the receivers must be covered by the
/// participants.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleProtocolComposer;

impl ProtocolComposer for SimpleProtocolComposer {
    fn can_communicate(&self, source: &Protocol, destination: &Protocol) -> bool {
        if source == destination {
            return true;
        }
        match (source, destination) {
            (Protocol::Local { .. } | Protocol::Replication { .. }, Protocol::Local { .. })
            | (Protocol::Local { .. } | Protocol::Replication { .. }, Protocol::Replication { .. }) => {
                true
            }

            (Protocol::Local { host }, Protocol::Mpc { .. }) => {
                destination.hosts().contains(host)
            }
            (Protocol::Local { host }, Protocol::Commitment { sender, .. }) => host == sender,
            (Protocol::Local { host }, Protocol::Zkp { prover, .. }) => host == prover,

            (
                Protocol::Replication { hosts },
                Protocol::Mpc { .. } | Protocol::Commitment { .. } | Protocol::Zkp { .. },
            ) => destination.hosts().is_subset(hosts),

            // Share conversion: same parties, any pair of circuits.
            (
                Protocol::Mpc { server, client, .. },
                Protocol::Mpc {
                    server: other_server,
                    client: other_client,
                    ..
                },
            ) => server == other_server && client == other_client,

            (Protocol::Mpc { .. }, Protocol::Local { host }) => source.hosts().contains(host),
            (Protocol::Mpc { .. }, Protocol::Replication { hosts }) => {
                hosts.is_subset(&source.hosts())
            }

            // Opening a commitment is a broadcast; anyone can check it.
            (Protocol::Commitment { .. }, Protocol::Local { .. })
            | (Protocol::Commitment { .. }, Protocol::Replication { .. }) => true,

            (Protocol::Zkp { .. }, Protocol::Local { host }) => source.hosts().contains(host),
            (Protocol::Zkp { .. }, Protocol::Replication { hosts }) => {
                hosts.is_subset(&source.hosts())
            }

            _ => false,
        }
    }

    fn visible_guard_hosts(&self, protocol: &Protocol) -> BTreeSet<Host> {
        match protocol {
            Protocol::Local { .. } | Protocol::Replication { .. } => protocol.hosts(),
            Protocol::Commitment { sender, .. } => BTreeSet::from([sender.clone()]),
            Protocol::Mpc { .. } | Protocol::Zkp { .. } => BTreeSet::new(),
        }
    }
}
