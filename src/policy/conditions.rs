use serde::Deserialize;

use super::node::Node;
use super::request::Request;
use super::{is_private, peer_public_key};
use crate::lnrpc::{ChannelAcceptRequest, GetInfoResponse, NodeInfo};

/// Predicate gating whether a policy applies to a request. Matching
/// never produces side effects; nested rule failures only make the
/// conditions not match.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Conditions {
    pub is_private: Option<bool>,
    pub wants_zero_conf: Option<bool>,
    pub is: Option<Vec<String>>,
    pub is_not: Option<Vec<String>>,
    pub request: Option<Request>,
    pub node: Option<Node>,
}

impl Conditions {
    /// Returns true if all the conditions match. Peers on the `is`
    /// list match regardless of every other condition.
    pub(crate) fn matches(
        &self,
        req: &ChannelAcceptRequest,
        node: &GetInfoResponse,
        peer: &NodeInfo,
    ) -> bool {
        let peer_key = peer_public_key(peer);

        if let Some(is) = &self.is {
            if is.iter().any(|key| key == peer_key) {
                return true;
            }
        }

        if let Some(is_not) = &self.is_not {
            if is_not.iter().any(|key| key == peer_key) {
                return false;
            }
        }

        if let Some(private) = self.is_private {
            if private != is_private(req) {
                return false;
            }
        }

        if let Some(wants_zero_conf) = self.wants_zero_conf {
            if wants_zero_conf != req.wants_zero_conf {
                return false;
            }
        }

        if let Some(request) = &self.request {
            if request.evaluate(req).is_err() {
                return false;
            }
        }

        if let Some(node_rules) = &self.node {
            if node_rules.evaluate(node, peer).is_err() {
                return false;
            }
        }

        true
    }
}
