use serde::Deserialize;

use super::range::{ensure, ensure_stat, Range, StatRange};
use super::{peer_public_key, Violation};
use crate::lnrpc::{ChannelEdge, NodeInfo, RoutingPolicy};

/// Which side of a channel edge published a routing policy, relative
/// to the requesting peer.
#[derive(Clone, Copy)]
enum Direction {
    /// The policy the peer itself publishes for forwarding through
    /// the channel.
    Outgoing,
    /// The policy published by the other endpoint.
    Incoming,
}

/// Requirements on the requesting node's public channel graph.
///
/// Fee and HTLC amounts are published in millisatoshis and compared in
/// satoshis, so sampled values divide by 1000 first.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Channels {
    pub number: Option<Range<u32>>,
    pub capacity: Option<StatRange<i64>>,
    pub zero_base_fees: Option<bool>,
    pub block_height: Option<StatRange<u32>>,
    pub time_lock_delta: Option<StatRange<u32>>,
    pub min_htlc: Option<StatRange<i64>>,
    pub max_htlc: Option<StatRange<u64>>,
    pub last_update_diff: Option<StatRange<u32>>,
    pub together: Option<Range<u32>>,
    pub incoming_fee_rates: Option<StatRange<i64>>,
    pub outgoing_fee_rates: Option<StatRange<i64>>,
    pub incoming_base_fees: Option<StatRange<i64>>,
    pub outgoing_base_fees: Option<StatRange<i64>>,
    pub incoming_disabled: Option<StatRange<f64>>,
    pub outgoing_disabled: Option<StatRange<f64>>,
    pub incoming_inbound_fee_rates: Option<StatRange<i32>>,
    pub outgoing_inbound_fee_rates: Option<StatRange<i32>>,
    pub incoming_inbound_base_fees: Option<StatRange<i32>>,
    pub outgoing_inbound_base_fees: Option<StatRange<i32>>,
}

impl Channels {
    /// Checks the peer's channel graph in a fixed order and returns
    /// the first violated constraint.
    pub(crate) fn evaluate(
        &self,
        node_public_key: &str,
        peer: &NodeInfo,
    ) -> Result<(), Violation> {
        let peer_key = peer_public_key(peer);
        let channels = peer.channels.as_slice();

        ensure(&self.number, peer.num_channels, "Node number of channels")?;

        ensure_stat(&self.capacity, channels, "Capacity", |c| c.capacity)?;

        if !self.check_zero_base_fees(peer_key, channels) {
            return Err(Violation::new(
                "Node has channels with base fees higher than zero",
            ));
        }

        ensure_stat(&self.block_height, channels, "Block height", |c| {
            (c.channel_id >> 40) as u32
        })?;

        ensure_stat(&self.time_lock_delta, channels, "Time lock delta", |c| {
            node_policy(peer_key, c, Direction::Outgoing).map_or(0, |p| p.time_lock_delta)
        })?;

        ensure_stat(&self.min_htlc, channels, "Channels minimum HTLC", |c| {
            node_policy(peer_key, c, Direction::Outgoing).map_or(0, |p| p.min_htlc)
        })?;

        ensure_stat(&self.max_htlc, channels, "Channels maximum HTLC", |c| {
            node_policy(peer_key, c, Direction::Outgoing).map_or(0, |p| p.max_htlc_msat / 1000)
        })?;

        let now = chrono::Utc::now().timestamp() as u32;
        ensure_stat(&self.last_update_diff, channels, "Channels last update", |c| {
            let last_update =
                node_policy(peer_key, c, Direction::Outgoing).map_or(0, |p| p.last_update);
            now.saturating_sub(last_update)
        })?;

        if let Some(together) = &self.together {
            let count = shared_channels(node_public_key, peer_key, channels);
            if !together.contains(count) {
                return Err(Violation::new(format!(
                    "Channels together {}",
                    together.reason()
                )));
            }
        }

        ensure_stat(&self.incoming_fee_rates, channels, "Incoming fee rates", |c| {
            node_policy(peer_key, c, Direction::Incoming).map_or(0, |p| p.fee_rate_milli_msat / 1000)
        })?;

        ensure_stat(&self.outgoing_fee_rates, channels, "Outgoing fee rates", |c| {
            node_policy(peer_key, c, Direction::Outgoing).map_or(0, |p| p.fee_rate_milli_msat / 1000)
        })?;

        ensure_stat(&self.incoming_base_fees, channels, "Incoming base fees", |c| {
            node_policy(peer_key, c, Direction::Incoming).map_or(0, |p| p.fee_base_msat / 1000)
        })?;

        ensure_stat(&self.outgoing_base_fees, channels, "Outgoing base fees", |c| {
            node_policy(peer_key, c, Direction::Outgoing).map_or(0, |p| p.fee_base_msat / 1000)
        })?;

        ensure_stat(
            &self.incoming_inbound_fee_rates,
            channels,
            "Incoming inbound fee rates",
            |c| {
                node_policy(peer_key, c, Direction::Incoming)
                    .map_or(0, |p| p.inbound_fee_rate_milli_msat / 1000)
            },
        )?;

        ensure_stat(
            &self.outgoing_inbound_fee_rates,
            channels,
            "Outgoing inbound fee rates",
            |c| {
                node_policy(peer_key, c, Direction::Outgoing)
                    .map_or(0, |p| p.inbound_fee_rate_milli_msat / 1000)
            },
        )?;

        ensure_stat(
            &self.incoming_inbound_base_fees,
            channels,
            "Incoming inbound base fees",
            |c| {
                node_policy(peer_key, c, Direction::Incoming)
                    .map_or(0, |p| p.inbound_fee_base_msat / 1000)
            },
        )?;

        ensure_stat(
            &self.outgoing_inbound_base_fees,
            channels,
            "Outgoing inbound base fees",
            |c| {
                node_policy(peer_key, c, Direction::Outgoing)
                    .map_or(0, |p| p.inbound_fee_base_msat / 1000)
            },
        )?;

        ensure_stat(
            &self.incoming_disabled,
            channels,
            "Incoming disabled channels",
            |c| disabled_sample(peer_key, c, Direction::Incoming),
        )?;

        ensure_stat(
            &self.outgoing_disabled,
            channels,
            "Outgoing disabled channels",
            |c| disabled_sample(peer_key, c, Direction::Outgoing),
        )?;

        Ok(())
    }

    /// When enabled, every channel's outgoing base fee must be
    /// exactly zero.
    fn check_zero_base_fees(&self, peer_key: &str, channels: &[ChannelEdge]) -> bool {
        if !self.zero_base_fees.unwrap_or(false) {
            return true;
        }

        channels.iter().all(|c| {
            node_policy(peer_key, c, Direction::Outgoing).map_or(true, |p| p.fee_base_msat == 0)
        })
    }
}

/// Selects the edge's routing policy for the given direction relative
/// to the peer. Every per-channel statistic resolves direction here.
/// Edges missing a policy yield `None` and sample as zero.
fn node_policy<'a>(
    peer_key: &str,
    channel: &'a ChannelEdge,
    direction: Direction,
) -> Option<&'a RoutingPolicy> {
    match direction {
        Direction::Outgoing => {
            if peer_key == channel.node1_pub {
                channel.node1_policy.as_ref()
            } else {
                channel.node2_policy.as_ref()
            }
        }
        Direction::Incoming => {
            if peer_key == channel.node2_pub {
                channel.node1_policy.as_ref()
            } else {
                channel.node2_policy.as_ref()
            }
        }
    }
}

fn disabled_sample(peer_key: &str, channel: &ChannelEdge, direction: Direction) -> f64 {
    if node_policy(peer_key, channel, direction).map_or(false, |p| p.disabled) {
        1.0
    } else {
        0.0
    }
}

/// Number of channels directly connecting the local node and the
/// peer, in either direction.
fn shared_channels(node_public_key: &str, peer_key: &str, channels: &[ChannelEdge]) -> u32 {
    channels
        .iter()
        .filter(|c| {
            (c.node1_pub == node_public_key && c.node2_pub == peer_key)
                || (c.node2_pub == node_public_key && c.node1_pub == peer_key)
        })
        .count() as u32
}
