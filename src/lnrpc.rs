//! Hand-maintained subset of lnd's `lightning.proto` messages.
//!
//! Only the fields the gatekeeper reads or writes are declared; prost
//! skips unknown fields on decode and omitted fields encode as their
//! defaults, so the subset stays wire-compatible with lnd. Tags must
//! match lightning.proto exactly.

use std::collections::HashMap;

use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::Channel;

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetInfoRequest {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetInfoResponse {
    #[prost(string, tag = "1")]
    pub identity_pubkey: String,
    #[prost(string, tag = "2")]
    pub alias: String,
    #[prost(uint32, tag = "3")]
    pub num_pending_channels: u32,
    #[prost(uint32, tag = "4")]
    pub num_active_channels: u32,
    #[prost(uint32, tag = "6")]
    pub block_height: u32,
    #[prost(uint32, tag = "15")]
    pub num_inactive_channels: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NodeInfoRequest {
    #[prost(string, tag = "1")]
    pub pub_key: String,
    #[prost(bool, tag = "2")]
    pub include_channels: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NodeInfo {
    #[prost(message, optional, tag = "1")]
    pub node: Option<LightningNode>,
    #[prost(uint32, tag = "2")]
    pub num_channels: u32,
    #[prost(int64, tag = "3")]
    pub total_capacity: i64,
    #[prost(message, repeated, tag = "4")]
    pub channels: Vec<ChannelEdge>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LightningNode {
    #[prost(uint32, tag = "1")]
    pub last_update: u32,
    #[prost(string, tag = "2")]
    pub pub_key: String,
    #[prost(string, tag = "3")]
    pub alias: String,
    #[prost(message, repeated, tag = "4")]
    pub addresses: Vec<NodeAddress>,
    #[prost(map = "uint32, message", tag = "6")]
    pub features: HashMap<u32, Feature>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NodeAddress {
    #[prost(string, tag = "1")]
    pub network: String,
    #[prost(string, tag = "2")]
    pub addr: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Feature {
    #[prost(string, tag = "2")]
    pub name: String,
    #[prost(bool, tag = "3")]
    pub is_required: bool,
    #[prost(bool, tag = "4")]
    pub is_known: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ChannelEdge {
    #[prost(uint64, tag = "1")]
    pub channel_id: u64,
    #[prost(string, tag = "2")]
    pub chan_point: String,
    #[prost(string, tag = "4")]
    pub node1_pub: String,
    #[prost(string, tag = "5")]
    pub node2_pub: String,
    #[prost(int64, tag = "6")]
    pub capacity: i64,
    #[prost(message, optional, tag = "7")]
    pub node1_policy: Option<RoutingPolicy>,
    #[prost(message, optional, tag = "8")]
    pub node2_policy: Option<RoutingPolicy>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RoutingPolicy {
    #[prost(uint32, tag = "1")]
    pub time_lock_delta: u32,
    #[prost(int64, tag = "2")]
    pub min_htlc: i64,
    #[prost(int64, tag = "3")]
    pub fee_base_msat: i64,
    #[prost(int64, tag = "4")]
    pub fee_rate_milli_msat: i64,
    #[prost(bool, tag = "5")]
    pub disabled: bool,
    #[prost(uint64, tag = "6")]
    pub max_htlc_msat: u64,
    #[prost(uint32, tag = "7")]
    pub last_update: u32,
    #[prost(int32, tag = "9")]
    pub inbound_fee_base_msat: i32,
    #[prost(int32, tag = "10")]
    pub inbound_fee_rate_milli_msat: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ChannelAcceptRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub node_pubkey: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub chain_hash: Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    pub pending_chan_id: Vec<u8>,
    #[prost(uint64, tag = "4")]
    pub funding_amt: u64,
    #[prost(uint64, tag = "5")]
    pub push_amt: u64,
    #[prost(uint64, tag = "6")]
    pub dust_limit: u64,
    #[prost(uint64, tag = "7")]
    pub max_value_in_flight: u64,
    #[prost(uint64, tag = "8")]
    pub channel_reserve: u64,
    #[prost(uint64, tag = "9")]
    pub min_htlc: u64,
    #[prost(uint64, tag = "10")]
    pub fee_per_kw: u64,
    #[prost(uint32, tag = "11")]
    pub csv_delay: u32,
    #[prost(uint32, tag = "12")]
    pub max_accepted_htlcs: u32,
    #[prost(uint32, tag = "13")]
    pub channel_flags: u32,
    #[prost(enumeration = "CommitmentType", tag = "14")]
    pub commitment_type: i32,
    #[prost(bool, tag = "15")]
    pub wants_zero_conf: bool,
    #[prost(bool, tag = "16")]
    pub wants_scid_alias: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ChannelAcceptResponse {
    #[prost(bool, tag = "1")]
    pub accept: bool,
    #[prost(bytes = "vec", tag = "2")]
    pub pending_chan_id: Vec<u8>,
    #[prost(string, tag = "3")]
    pub error: String,
    #[prost(uint32, tag = "10")]
    pub min_accept_depth: u32,
    #[prost(bool, tag = "11")]
    pub zero_conf: bool,
}

/// Commitment formats a channel can be negotiated with. Values match
/// lnd's `CommitmentType` enum; the serde names are what policy files
/// use.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    ::prost::Enumeration,
    serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[repr(i32)]
pub enum CommitmentType {
    UnknownCommitmentType = 0,
    Legacy = 1,
    StaticRemoteKey = 2,
    Anchors = 3,
    ScriptEnforcedLease = 4,
    SimpleTaproot = 5,
    SimpleTaprootOverlay = 6,
}

impl std::fmt::Display for CommitmentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CommitmentType::UnknownCommitmentType => "unknown_commitment_type",
            CommitmentType::Legacy => "legacy",
            CommitmentType::StaticRemoteKey => "static_remote_key",
            CommitmentType::Anchors => "anchors",
            CommitmentType::ScriptEnforcedLease => "script_enforced_lease",
            CommitmentType::SimpleTaproot => "simple_taproot",
            CommitmentType::SimpleTaprootOverlay => "simple_taproot_overlay",
        };
        f.write_str(name)
    }
}

/// Client stub for the three `lnrpc.Lightning` RPCs the gatekeeper
/// uses, in the shape tonic's codegen emits for them.
#[derive(Debug, Clone)]
pub struct LightningClient {
    inner: tonic::client::Grpc<Channel>,
}

impl LightningClient {
    pub fn new(channel: Channel) -> Self {
        Self {
            inner: tonic::client::Grpc::new(channel),
        }
    }

    async fn ready(&mut self) -> Result<(), tonic::Status> {
        self.inner.ready().await.map_err(|e| {
            tonic::Status::new(
                tonic::Code::Unknown,
                format!("Service was not ready: {e}"),
            )
        })
    }

    pub async fn get_info(
        &mut self,
        request: impl tonic::IntoRequest<GetInfoRequest>,
    ) -> Result<tonic::Response<GetInfoResponse>, tonic::Status> {
        self.ready().await?;
        let codec = tonic::codec::ProstCodec::default();
        let path = PathAndQuery::from_static("/lnrpc.Lightning/GetInfo");
        self.inner.unary(request.into_request(), path, codec).await
    }

    pub async fn get_node_info(
        &mut self,
        request: impl tonic::IntoRequest<NodeInfoRequest>,
    ) -> Result<tonic::Response<NodeInfo>, tonic::Status> {
        self.ready().await?;
        let codec = tonic::codec::ProstCodec::default();
        let path = PathAndQuery::from_static("/lnrpc.Lightning/GetNodeInfo");
        self.inner.unary(request.into_request(), path, codec).await
    }

    pub async fn channel_acceptor(
        &mut self,
        request: impl tonic::IntoStreamingRequest<Message = ChannelAcceptResponse>,
    ) -> Result<tonic::Response<tonic::Streaming<ChannelAcceptRequest>>, tonic::Status> {
        self.ready().await?;
        let codec = tonic::codec::ProstCodec::default();
        let path = PathAndQuery::from_static("/lnrpc.Lightning/ChannelAcceptor");
        self.inner
            .streaming(request.into_streaming_request(), path, codec)
            .await
    }
}
