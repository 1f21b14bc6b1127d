//! Channel acceptor stream handling: one response per inbound
//! request, produced by evaluating the configured policies in order.

use log::{debug, error, info, warn};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::client::{GrpcLndClient, LndClient};
use crate::config::Config;
use crate::lnrpc::{ChannelAcceptRequest, ChannelAcceptResponse, GetInfoResponse, NodeInfo};
use crate::policy::{Policy, Violation};

/// Fetch failures must not leak detail to the requesting peer.
const INTERNAL_ERROR: &str = "internal server error";

/// Listens on the channel acceptor stream and answers every request.
pub async fn run(config: &Config, client: &GrpcLndClient) -> anyhow::Result<()> {
    let (tx, rx) = mpsc::channel(32);
    let mut requests = client.channel_acceptor(ReceiverStream::new(rx)).await?;

    info!("Listening for channel requests");
    loop {
        tokio::select! {
            message = requests.message() => {
                let Some(req) = message? else {
                    warn!("Channel acceptor stream closed by lnd");
                    return Ok(());
                };
                debug!("Channel opening request: {:?}", req);

                let resp = handle_request(config, client, &req).await;
                log_response(&req, &resp);
                if tx.send(resp).await.is_err() {
                    anyhow::bail!("Channel acceptor response stream closed");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal, closing acceptor stream");
                return Ok(());
            }
        }
    }
}

/// Evaluates one channel request and builds its response. Failures
/// fetching node data are logged and answered with a generic internal
/// error.
pub async fn handle_request(
    config: &Config,
    client: &impl LndClient,
    req: &ChannelAcceptRequest,
) -> ChannelAcceptResponse {
    let mut resp = ChannelAcceptResponse {
        pending_chan_id: req.pending_chan_id.clone(),
        ..Default::default()
    };

    let node = match client.get_info().await {
        Ok(node) => node,
        Err(e) => {
            error!("Getting node information: {:#}", e);
            resp.error = INTERNAL_ERROR.to_string();
            return resp;
        }
    };

    let peer_key = hex::encode(&req.node_pubkey);
    let peer = match client.get_node_info(&peer_key, true).await {
        Ok(peer) => peer,
        Err(e) => {
            error!("Getting peer information for {}: {:#}", peer_key, e);
            resp.error = INTERNAL_ERROR.to_string();
            return resp;
        }
    };
    debug!("Peer node information: {:?}", peer);

    match evaluate_policies(&config.policies, req, &mut resp, &node, &peer) {
        Ok(()) => resp.accept = true,
        Err(violation) => {
            if config.general.monitor_only {
                warn!("Monitor mode: would reject {}: {}", peer_key, violation);
                resp = ChannelAcceptResponse {
                    pending_chan_id: req.pending_chan_id.clone(),
                    accept: true,
                    ..Default::default()
                };
            } else {
                resp.error = violation.to_string();
            }
        }
    }

    resp
}

/// Applies the ordered policy list against one shared response; the
/// first violation aborts the evaluation. An empty list accepts.
pub fn evaluate_policies(
    policies: &[Policy],
    req: &ChannelAcceptRequest,
    resp: &mut ChannelAcceptResponse,
    node: &GetInfoResponse,
    peer: &NodeInfo,
) -> Result<(), Violation> {
    for policy in policies {
        policy.evaluate(req, resp, node, peer)?;
    }
    Ok(())
}

fn log_response(req: &ChannelAcceptRequest, resp: &ChannelAcceptResponse) {
    let id = hex::encode(&req.pending_chan_id);
    let public_key = hex::encode(&req.node_pubkey);
    if resp.accept {
        info!("Channel request accepted: id={} public_key={}", id, public_key);
    } else {
        info!(
            "Channel request rejected: id={} public_key={} error={:?}",
            id, public_key, resp.error
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::mock::MockLndClient;
    use crate::lnrpc::LightningNode;
    use crate::policy::Conditions;
    use std::path::PathBuf;

    // hex::encode(&[2, 3])
    const PEER_KEY: &str = "0203";

    fn test_config(policies: Vec<Policy>) -> Config {
        let mut config =
            Config::test_default(PathBuf::from("/dev/null"), PathBuf::from("/dev/null"));
        config.policies = policies;
        config
    }

    fn mock_with_peer() -> MockLndClient {
        let mut mock = MockLndClient::new();
        mock.peer = NodeInfo {
            node: Some(LightningNode {
                pub_key: PEER_KEY.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        };
        mock
    }

    fn request() -> ChannelAcceptRequest {
        ChannelAcceptRequest {
            node_pubkey: vec![2, 3],
            pending_chan_id: vec![9, 9, 9],
            channel_flags: 1,
            funding_amt: 1_000_000,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_no_policies_accepts() {
        let config = test_config(vec![]);
        let mock = mock_with_peer();

        let resp = handle_request(&config, &mock, &request()).await;

        assert!(resp.accept);
        assert!(resp.error.is_empty());
        assert_eq!(resp.pending_chan_id, vec![9, 9, 9]);
        // The peer snapshot is fetched with channel edges included.
        assert_eq!(
            mock.node_info_calls.lock().unwrap().as_slice(),
            &[PEER_KEY.to_string()]
        );
    }

    #[tokio::test]
    async fn test_rejection_carries_violation_text() {
        let config = test_config(vec![Policy {
            reject_all: Some(true),
            ..Default::default()
        }]);
        let mock = mock_with_peer();

        let resp = handle_request(&config, &mock, &request()).await;

        assert!(!resp.accept);
        assert_eq!(resp.error, "No new channels are accepted");
    }

    #[tokio::test]
    async fn test_first_rejection_short_circuits() {
        // The first policy's block list rejects; the second policy
        // would have rejected everything with a different message.
        let config = test_config(vec![
            Policy {
                conditions: Some(Conditions {
                    is_not: Some(vec!["someone_else".to_string()]),
                    ..Default::default()
                }),
                block_list: Some(vec![PEER_KEY.to_string()]),
                ..Default::default()
            },
            Policy {
                reject_all: Some(true),
                ..Default::default()
            },
        ]);
        let mock = mock_with_peer();

        let resp = handle_request(&config, &mock, &request()).await;

        assert!(!resp.accept);
        assert_eq!(resp.error, "Node is blocked");
    }

    #[tokio::test]
    async fn test_min_accept_depth_staged_on_accept() {
        let config = test_config(vec![Policy {
            min_accept_depth: Some(6),
            ..Default::default()
        }]);
        let mock = mock_with_peer();

        let resp = handle_request(&config, &mock, &request()).await;

        assert!(resp.accept);
        assert_eq!(resp.min_accept_depth, 6);
    }

    #[tokio::test]
    async fn test_later_policies_restage_response() {
        let config = test_config(vec![
            Policy {
                min_accept_depth: Some(3),
                ..Default::default()
            },
            Policy {
                min_accept_depth: Some(6),
                ..Default::default()
            },
        ]);
        let mock = mock_with_peer();

        let resp = handle_request(&config, &mock, &request()).await;

        assert!(resp.accept);
        assert_eq!(resp.min_accept_depth, 6);
    }

    #[tokio::test]
    async fn test_zero_conf_rejected_leaves_response_unmodified() {
        let config = test_config(vec![Policy {
            accept_zero_conf_channels: Some(false),
            ..Default::default()
        }]);
        let mock = mock_with_peer();

        let req = ChannelAcceptRequest {
            wants_zero_conf: true,
            ..request()
        };
        let resp = handle_request(&config, &mock, &req).await;

        assert!(!resp.accept);
        assert_eq!(resp.error, "Zero conf channels are not accepted");
        assert!(!resp.zero_conf);
        assert_eq!(resp.min_accept_depth, 0);
    }

    #[tokio::test]
    async fn test_zero_conf_accepted_overrides_depth() {
        let config = test_config(vec![Policy {
            accept_zero_conf_channels: Some(true),
            min_accept_depth: Some(6),
            ..Default::default()
        }]);
        let mock = mock_with_peer();

        let req = ChannelAcceptRequest {
            wants_zero_conf: true,
            ..request()
        };
        let resp = handle_request(&config, &mock, &req).await;

        assert!(resp.accept);
        assert!(resp.zero_conf);
        assert_eq!(resp.min_accept_depth, 0);
    }

    #[tokio::test]
    async fn test_get_info_failure_is_redacted() {
        let config = test_config(vec![]);
        let mut mock = mock_with_peer();
        mock.fail_get_info = true;

        let resp = handle_request(&config, &mock, &request()).await;

        assert!(!resp.accept);
        assert_eq!(resp.error, INTERNAL_ERROR);
    }

    #[tokio::test]
    async fn test_get_node_info_failure_is_redacted() {
        let config = test_config(vec![]);
        let mut mock = mock_with_peer();
        mock.fail_get_node_info = true;

        let resp = handle_request(&config, &mock, &request()).await;

        assert!(!resp.accept);
        assert_eq!(resp.error, INTERNAL_ERROR);
        assert!(!resp.error.contains("mock"), "details must not leak");
    }

    #[tokio::test]
    async fn test_monitor_only_accepts_and_clears_staging() {
        let mut config = test_config(vec![
            Policy {
                min_accept_depth: Some(3),
                ..Default::default()
            },
            Policy {
                reject_all: Some(true),
                ..Default::default()
            },
        ]);
        config.general.monitor_only = true;
        let mock = mock_with_peer();

        let resp = handle_request(&config, &mock, &request()).await;

        assert!(resp.accept);
        assert!(resp.error.is_empty());
        assert_eq!(resp.min_accept_depth, 0);
        assert_eq!(resp.pending_chan_id, vec![9, 9, 9]);
    }

    #[tokio::test]
    async fn test_monitor_only_does_not_alter_accepts() {
        let mut config = test_config(vec![Policy {
            min_accept_depth: Some(6),
            ..Default::default()
        }]);
        config.general.monitor_only = true;
        let mock = mock_with_peer();

        let resp = handle_request(&config, &mock, &request()).await;

        assert!(resp.accept);
        assert_eq!(resp.min_accept_depth, 6);
    }
}
