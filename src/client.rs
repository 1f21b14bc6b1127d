use std::time::Duration;

use anyhow::Context;
use log::{debug, warn};
use tokio::time::sleep;
use tonic::metadata::AsciiMetadataValue;
use tonic::transport::{Certificate, Channel, ClientTlsConfig};

use crate::config::Config;
use crate::lnrpc::{
    ChannelAcceptRequest, ChannelAcceptResponse, GetInfoRequest, GetInfoResponse,
    LightningClient, NodeInfo, NodeInfoRequest,
};

/// Trait abstracting the lnd RPCs the gatekeeper consumes.
///
/// This enables mock-based end-to-end testing without a live node.
#[async_trait::async_trait]
pub trait LndClient: Send + Sync {
    async fn get_info(&self) -> anyhow::Result<GetInfoResponse>;
    async fn get_node_info(
        &self,
        pub_key: &str,
        include_channels: bool,
    ) -> anyhow::Result<NodeInfo>;
}

/// Retrying tonic client for lnd with macaroon credentials.
pub struct GrpcLndClient {
    inner: LightningClient,
    macaroon: AsciiMetadataValue,
}

const MAX_RETRIES: u32 = 3;
// Short backoff: lnd only waits so long for an acceptor verdict.
const RETRY_BASE_MS: u64 = 500;

impl GrpcLndClient {
    pub async fn connect(config: &Config) -> anyhow::Result<Self> {
        let cert_pem = std::fs::read(&config.lnd.tls_cert_path).with_context(|| {
            format!(
                "Failed to read TLS cert at {}",
                config.lnd.tls_cert_path.display()
            )
        })?;
        let macaroon_bytes = std::fs::read(&config.lnd.macaroon_path).with_context(|| {
            format!(
                "Failed to read macaroon at {}",
                config.lnd.macaroon_path.display()
            )
        })?;
        let macaroon = AsciiMetadataValue::try_from(hex::encode(macaroon_bytes))
            .map_err(|_| anyhow::anyhow!("Macaroon does not encode to valid metadata"))?;

        let tls = ClientTlsConfig::new().ca_certificate(Certificate::from_pem(cert_pem));

        let mut endpoint = Channel::from_shared(format!("https://{}", config.lnd.rpc_address))?
            .tls_config(tls)?;
        // A configured timeout of 0 disables the deadline instead of
        // applying a zero-length one.
        if config.lnd.rpc_timeout_secs > 0 {
            endpoint =
                endpoint.connect_timeout(Duration::from_secs(config.lnd.rpc_timeout_secs));
        }

        let channel = endpoint.connect().await.with_context(|| {
            format!("Failed to connect to lnd at {}", config.lnd.rpc_address)
        })?;

        Ok(Self {
            inner: LightningClient::new(channel),
            macaroon,
        })
    }

    fn request<T>(&self, message: T) -> tonic::Request<T> {
        let mut request = tonic::Request::new(message);
        request
            .metadata_mut()
            .insert("macaroon", self.macaroon.clone());
        request
    }

    /// Opens the bidirectional channel acceptor stream: `responses`
    /// flow to lnd, the returned stream yields its requests.
    pub async fn channel_acceptor<S>(
        &self,
        responses: S,
    ) -> anyhow::Result<tonic::Streaming<ChannelAcceptRequest>>
    where
        S: tokio_stream::Stream<Item = ChannelAcceptResponse> + Send + 'static,
    {
        let mut client = self.inner.clone();
        let stream = client
            .channel_acceptor(self.request(responses))
            .await
            .map_err(|e| anyhow::anyhow!("Subscribing to the channel acceptor stream: {e}"))?
            .into_inner();
        Ok(stream)
    }

    async fn with_retry<F, Fut, T>(&self, name: &str, f: F) -> anyhow::Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<tonic::Response<T>, tonic::Status>>,
    {
        for attempt in 0..MAX_RETRIES {
            match f().await {
                Ok(resp) => {
                    debug!("{}: success", name);
                    return Ok(resp.into_inner());
                }
                Err(status) => {
                    if attempt < MAX_RETRIES - 1 {
                        let delay = RETRY_BASE_MS * 2u64.pow(attempt);
                        warn!(
                            "{}: attempt {} failed ({}), retrying in {}ms",
                            name,
                            attempt + 1,
                            status,
                            delay
                        );
                        sleep(Duration::from_millis(delay)).await;
                    } else {
                        return Err(anyhow::anyhow!(
                            "{}: all {} attempts failed: {}",
                            name,
                            MAX_RETRIES,
                            status
                        ));
                    }
                }
            }
        }
        unreachable!()
    }
}

#[async_trait::async_trait]
impl LndClient for GrpcLndClient {
    async fn get_info(&self) -> anyhow::Result<GetInfoResponse> {
        self.with_retry("GetInfo", || {
            let mut client = self.inner.clone();
            let request = self.request(GetInfoRequest {});
            async move { client.get_info(request).await }
        })
        .await
    }

    async fn get_node_info(
        &self,
        pub_key: &str,
        include_channels: bool,
    ) -> anyhow::Result<NodeInfo> {
        self.with_retry("GetNodeInfo", || {
            let mut client = self.inner.clone();
            let request = self.request(NodeInfoRequest {
                pub_key: pub_key.to_string(),
                include_channels,
            });
            async move { client.get_node_info(request).await }
        })
        .await
    }
}

// ---------------------------------------------------------------------------
// Mock client for end-to-end testing
// ---------------------------------------------------------------------------

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::Mutex;

    /// Mock lnd client that returns preset responses and records
    /// peer-info lookups.
    pub struct MockLndClient {
        pub info: GetInfoResponse,
        pub peer: NodeInfo,
        pub fail_get_info: bool,
        pub fail_get_node_info: bool,
        pub node_info_calls: Mutex<Vec<String>>,
    }

    impl MockLndClient {
        pub fn new() -> Self {
            Self {
                info: GetInfoResponse {
                    identity_pubkey: "local_key".to_string(),
                    block_height: 800_000,
                    ..Default::default()
                },
                peer: NodeInfo::default(),
                fail_get_info: false,
                fail_get_node_info: false,
                node_info_calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl LndClient for MockLndClient {
        async fn get_info(&self) -> anyhow::Result<GetInfoResponse> {
            if self.fail_get_info {
                anyhow::bail!("mock GetInfo failure");
            }
            Ok(self.info.clone())
        }

        async fn get_node_info(
            &self,
            pub_key: &str,
            _include_channels: bool,
        ) -> anyhow::Result<NodeInfo> {
            self.node_info_calls
                .lock()
                .unwrap()
                .push(pub_key.to_string());
            if self.fail_get_node_info {
                anyhow::bail!("mock GetNodeInfo failure");
            }
            Ok(self.peer.clone())
        }
    }
}
