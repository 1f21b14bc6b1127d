//! Declarative rules evaluated against inbound channel-open requests.
//!
//! A policy's requirements are enforced only when its conditions are
//! met or absent. Evaluation is a pure pass over the request and the
//! local/peer node snapshots; the only output besides the verdict is
//! the response staging (minimum accept depth, zero-conf flag).

pub mod channels;
pub mod conditions;
pub mod node;
pub mod range;
pub mod request;

pub use channels::Channels;
pub use conditions::Conditions;
pub use node::Node;
pub use request::Request;

use serde::Deserialize;
use thiserror::Error;

use crate::lnrpc::{ChannelAcceptRequest, ChannelAcceptResponse, GetInfoResponse, NodeInfo};

/// Constraint a channel request or its initiator failed to satisfy.
/// The text is surfaced verbatim as the rejection reason.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct Violation(String);

impl Violation {
    fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

/// The announce bit is the only bit lnd sets in `channel_flags`.
const ANNOUNCE_CHANNEL: u32 = 1;

pub(crate) fn is_private(req: &ChannelAcceptRequest) -> bool {
    req.channel_flags & ANNOUNCE_CHANNEL == 0
}

pub(crate) fn peer_public_key(peer: &NodeInfo) -> &str {
    peer.node
        .as_ref()
        .map(|n| n.pub_key.as_str())
        .unwrap_or_default()
}

/// A set of requirements a channel-open request must satisfy, gated by
/// optional conditions. Policies are loaded once and evaluated
/// read-only per request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Policy {
    pub conditions: Option<Conditions>,
    pub request: Option<Request>,
    pub node: Option<Node>,
    pub allow_list: Option<Vec<String>>,
    pub block_list: Option<Vec<String>>,
    pub zero_conf_list: Option<Vec<String>>,
    pub reject_all: Option<bool>,
    pub reject_private_channels: Option<bool>,
    pub accept_zero_conf_channels: Option<bool>,
    pub min_accept_depth: Option<u32>,
    pub max_channels: Option<u32>,
}

impl Policy {
    /// Evaluates the policy against one request, staging response
    /// fields on the way to acceptance. Returns the first violated
    /// constraint.
    pub fn evaluate(
        &self,
        req: &ChannelAcceptRequest,
        resp: &mut ChannelAcceptResponse,
        node: &GetInfoResponse,
        peer: &NodeInfo,
    ) -> Result<(), Violation> {
        if let Some(conditions) = &self.conditions {
            if !conditions.matches(req, node, peer) {
                return Ok(());
            }
        }

        if let Some(depth) = self.min_accept_depth {
            resp.min_accept_depth = depth;
        }

        if self.reject_all.unwrap_or(false) {
            return Err(Violation::new("No new channels are accepted"));
        }

        let peer_key = peer_public_key(peer);

        if let Some(allow_list) = &self.allow_list {
            if allow_list.iter().any(|key| key == peer_key) {
                // Listed peers skip every remaining check of this policy.
                return Ok(());
            }
            return Err(Violation::new("Node is not allowed"));
        }

        if let Some(block_list) = &self.block_list {
            if block_list.iter().any(|key| key == peer_key) {
                return Err(Violation::new("Node is blocked"));
            }
        }

        if !self.check_private(is_private(req)) {
            return Err(Violation::new("Private channels are not accepted"));
        }

        if !self.check_zero_conf(peer_key, req.wants_zero_conf, resp) {
            return Err(Violation::new("Zero conf channels are not accepted"));
        }

        let num_channels =
            node.num_active_channels + node.num_inactive_channels + node.num_pending_channels;
        if !self.check_max_channels(num_channels) {
            return Err(Violation::new("Maximum number of channels reached"));
        }

        if let Some(request) = &self.request {
            request.evaluate(req)?;
        }

        if let Some(node_rules) = &self.node {
            node_rules.evaluate(node, peer)?;
        }

        Ok(())
    }

    fn check_private(&self, private: bool) -> bool {
        if !private {
            return true;
        }
        !self.reject_private_channels.unwrap_or(false)
    }

    /// Zero-conf requests pass only when explicitly accepted and, if a
    /// zero-conf list is configured, the peer is on it. The response
    /// is staged only on a full pass; the forced depth of 0 overrides
    /// any previously staged minimum.
    fn check_zero_conf(
        &self,
        peer_key: &str,
        wants_zero_conf: bool,
        resp: &mut ChannelAcceptResponse,
    ) -> bool {
        if !wants_zero_conf {
            return true;
        }

        if !self.accept_zero_conf_channels.unwrap_or(false) {
            return false;
        }

        if let Some(list) = &self.zero_conf_list {
            if !list.iter().any(|key| key == peer_key) {
                return false;
            }
        }

        resp.zero_conf = true;
        resp.min_accept_depth = 0;
        true
    }

    fn check_max_channels(&self, num_channels: u32) -> bool {
        self.max_channels.map_or(true, |max| num_channels < max)
    }
}
