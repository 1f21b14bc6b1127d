use serde::Deserialize;

use super::channels::Channels;
use super::range::{ensure, Range};
use super::Violation;
use crate::lnrpc::{GetInfoResponse, NodeInfo};

/// Requirements the node requesting to open a channel must satisfy.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Node {
    pub age: Option<Range<u32>>,
    pub capacity: Option<Range<i64>>,
    pub hybrid: Option<bool>,
    pub feature_flags: Option<Vec<u32>>,
    pub channels: Option<Channels>,
}

impl Node {
    pub(crate) fn evaluate(
        &self,
        node: &GetInfoResponse,
        peer: &NodeInfo,
    ) -> Result<(), Violation> {
        if let Some(age) = &self.age {
            if !age.contains(node_age(node.block_height, peer)) {
                return Err(Violation::new(format!("Node age {}", age.reason())));
            }
        }

        ensure(&self.capacity, peer.total_capacity, "Node capacity")?;

        if !self.check_hybrid(peer) {
            return Err(Violation::new(
                "Node doesn't have both clearnet and tor addresses",
            ));
        }

        if !self.check_feature_flags(peer) {
            return Err(Violation::new(
                "Node doesn't have the desired feature flags",
            ));
        }

        if let Some(channels) = &self.channels {
            channels.evaluate(&node.identity_pubkey, peer)?;
        }

        Ok(())
    }

    /// The hybrid flag is an exact-match predicate: `true` requires
    /// both a tor and a clearnet address, `false` requires the peer
    /// NOT to have both.
    fn check_hybrid(&self, peer: &NodeInfo) -> bool {
        let Some(hybrid) = self.hybrid else {
            return true;
        };

        let addresses = peer
            .node
            .as_ref()
            .map(|n| n.addresses.as_slice())
            .unwrap_or_default();

        let mut has_clearnet = false;
        let mut has_tor = false;
        for address in addresses {
            let host = address.addr.split(':').next().unwrap_or_default();
            if host.ends_with(".onion") {
                has_tor = true;
            } else {
                has_clearnet = true;
            }
        }

        if has_clearnet && has_tor {
            hybrid
        } else {
            !hybrid
        }
    }

    /// Every configured feature bit must be known to the peer.
    fn check_feature_flags(&self, peer: &NodeInfo) -> bool {
        let Some(flags) = &self.feature_flags else {
            return true;
        };

        let features = peer.node.as_ref().map(|n| &n.features);
        flags.iter().all(|flag| {
            features
                .and_then(|f| f.get(flag))
                .map_or(false, |feature| feature.is_known)
        })
    }
}

/// Blocks since the peer's oldest channel was opened; the channel id
/// encodes the funding block height in its high bits. A peer with no
/// channels has age 0.
fn node_age(best_block_height: u32, peer: &NodeInfo) -> u32 {
    let oldest = peer
        .channels
        .iter()
        .map(|c| (c.channel_id >> 40) as u32)
        .min();

    match oldest {
        Some(height) => best_block_height.saturating_sub(height) + 1,
        None => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lnrpc::{ChannelEdge, Feature, LightningNode, NodeAddress};

    fn peer_with_addresses(addrs: &[&str]) -> NodeInfo {
        NodeInfo {
            node: Some(LightningNode {
                pub_key: "peer_key".to_string(),
                addresses: addrs
                    .iter()
                    .map(|a| NodeAddress {
                        network: "tcp".to_string(),
                        addr: a.to_string(),
                    })
                    .collect(),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn channel_at_height(height: u64) -> ChannelEdge {
        ChannelEdge {
            channel_id: height << 40,
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_rules_accept() {
        let rules = Node::default();
        assert!(rules
            .evaluate(&GetInfoResponse::default(), &NodeInfo::default())
            .is_ok());
    }

    #[test]
    fn test_age() {
        let rules = Node {
            age: Some(Range {
                min: Some(100),
                max: None,
            }),
            ..Default::default()
        };
        let node = GetInfoResponse {
            block_height: 800_000,
            ..Default::default()
        };

        // Oldest channel opened 150 blocks ago.
        let peer = NodeInfo {
            channels: vec![channel_at_height(799_851), channel_at_height(799_999)],
            ..Default::default()
        };
        assert!(rules.evaluate(&node, &peer).is_ok());

        let peer = NodeInfo {
            channels: vec![channel_at_height(799_999)],
            ..Default::default()
        };
        let err = rules.evaluate(&node, &peer).unwrap_err();
        assert_eq!(err.to_string(), "Node age is lower than 100");
    }

    #[test]
    fn test_age_without_channels_is_zero() {
        let rules = Node {
            age: Some(Range {
                min: Some(1),
                max: None,
            }),
            ..Default::default()
        };
        let node = GetInfoResponse {
            block_height: 800_000,
            ..Default::default()
        };

        let err = rules.evaluate(&node, &NodeInfo::default()).unwrap_err();
        assert_eq!(err.to_string(), "Node age is lower than 1");

        let rules = Node {
            age: Some(Range {
                min: None,
                max: Some(10),
            }),
            ..Default::default()
        };
        assert!(rules.evaluate(&node, &NodeInfo::default()).is_ok());
    }

    #[test]
    fn test_capacity() {
        let rules = Node {
            capacity: Some(Range {
                min: Some(1_000_000),
                max: None,
            }),
            ..Default::default()
        };

        let peer = NodeInfo {
            total_capacity: 5_000_000,
            ..Default::default()
        };
        assert!(rules.evaluate(&GetInfoResponse::default(), &peer).is_ok());

        let peer = NodeInfo {
            total_capacity: 500_000,
            ..Default::default()
        };
        let err = rules
            .evaluate(&GetInfoResponse::default(), &peer)
            .unwrap_err();
        assert_eq!(err.to_string(), "Node capacity is lower than 1000000");
    }

    #[test]
    fn test_hybrid() {
        let hybrid_peer =
            peer_with_addresses(&["203.0.113.5:9735", "abcdef0123456789.onion:9735"]);
        let clearnet_peer = peer_with_addresses(&["203.0.113.5:9735"]);
        let tor_peer = peer_with_addresses(&["abcdef0123456789.onion:9735"]);

        let require_hybrid = Node {
            hybrid: Some(true),
            ..Default::default()
        };
        assert!(require_hybrid
            .evaluate(&GetInfoResponse::default(), &hybrid_peer)
            .is_ok());
        assert!(require_hybrid
            .evaluate(&GetInfoResponse::default(), &clearnet_peer)
            .is_err());
        assert!(require_hybrid
            .evaluate(&GetInfoResponse::default(), &tor_peer)
            .is_err());

        let reject_hybrid = Node {
            hybrid: Some(false),
            ..Default::default()
        };
        assert!(reject_hybrid
            .evaluate(&GetInfoResponse::default(), &clearnet_peer)
            .is_ok());
        assert!(reject_hybrid
            .evaluate(&GetInfoResponse::default(), &tor_peer)
            .is_ok());
        let err = reject_hybrid
            .evaluate(&GetInfoResponse::default(), &hybrid_peer)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Node doesn't have both clearnet and tor addresses"
        );
    }

    #[test]
    fn test_feature_flags() {
        let rules = Node {
            feature_flags: Some(vec![0, 12]),
            ..Default::default()
        };

        let mut peer = peer_with_addresses(&[]);
        {
            let node = peer.node.as_mut().unwrap();
            node.features.insert(
                0,
                Feature {
                    name: "data-loss-protect".to_string(),
                    is_required: false,
                    is_known: true,
                },
            );
        }
        let err = rules
            .evaluate(&GetInfoResponse::default(), &peer)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Node doesn't have the desired feature flags"
        );

        {
            let node = peer.node.as_mut().unwrap();
            node.features.insert(
                12,
                Feature {
                    name: "static-remote-key".to_string(),
                    is_required: false,
                    is_known: true,
                },
            );
        }
        assert!(rules.evaluate(&GetInfoResponse::default(), &peer).is_ok());

        // An advertised but unknown feature does not count.
        {
            let node = peer.node.as_mut().unwrap();
            node.features.get_mut(&12).unwrap().is_known = false;
        }
        assert!(rules
            .evaluate(&GetInfoResponse::default(), &peer)
            .is_err());

        let no_flags = Node::default();
        assert!(no_flags.evaluate(&GetInfoResponse::default(), &peer).is_ok());
    }

    #[test]
    fn test_channels_delegation() {
        let rules = Node {
            channels: Some(Channels {
                number: Some(Range {
                    min: Some(5),
                    max: None,
                }),
                ..Default::default()
            }),
            ..Default::default()
        };

        let peer = NodeInfo {
            num_channels: 2,
            ..Default::default()
        };
        let err = rules
            .evaluate(&GetInfoResponse::default(), &peer)
            .unwrap_err();
        assert_eq!(err.to_string(), "Node number of channels is lower than 5");
    }
}
