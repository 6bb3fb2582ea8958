//! Messages of the Mesh service contract: inter-node overlay transport and
//! the user-data broadcast pub/sub.

#[derive(Clone, PartialEq, prost::Message)]
pub struct SeedMeshRequest {
    #[prost(string, tag = "1")]
    pub mesh_name: String,
    #[prost(bool, tag = "2")]
    pub allow_join: bool,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct SeedMeshResponse {
    #[prost(string, tag = "1")]
    pub mesh_id: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct JoinMeshRequest {
    #[prost(string, tag = "1")]
    pub mesh_id: String,
    #[prost(string, tag = "2")]
    pub node_address: String,
    #[prost(int64, tag = "3")]
    pub node_id: i64,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct JoinMeshResponse {
    #[prost(bool, tag = "1")]
    pub accepted: bool,
    #[prost(string, tag = "2")]
    pub message: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct GetTopologyRequest {
    #[prost(string, tag = "1")]
    pub mesh_id: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct NodeInfo {
    #[prost(int64, tag = "1")]
    pub node_id: i64,
    #[prost(string, tag = "2")]
    pub address: String,
    #[prost(int32, tag = "3")]
    pub port: i32,
    #[prost(string, tag = "4")]
    pub status: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct GetTopologyResponse {
    #[prost(message, repeated, tag = "1")]
    pub nodes: Vec<NodeInfo>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct GetMessageMetricsRequest {}

#[derive(Clone, PartialEq, prost::Message)]
pub struct GetMessageMetricsResponse {
    #[prost(int64, tag = "1")]
    pub published: i64,
    #[prost(int64, tag = "2")]
    pub delivered: i64,
    #[prost(int64, tag = "3")]
    pub failed: i64,
}

/// A user-data mutation to replicate to every other node of the mesh.
/// Subscribers key on `(table, operation)`.
#[derive(Clone, PartialEq, prost::Message)]
pub struct BroadcastUserDataRequest {
    #[prost(string, tag = "1")]
    pub table: String,
    /// One of `INSERT`, `UPDATE`, `DELETE`.
    #[prost(string, tag = "2")]
    pub operation: String,
    /// Full record as an opaque JSON document.
    #[prost(string, tag = "3")]
    pub record: String,
    #[prost(string, tag = "4")]
    pub primary_key: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct BroadcastUserDataResponse {
    #[prost(bool, tag = "1")]
    pub success: bool,
    #[prost(int32, tag = "2")]
    pub acked_nodes: i32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct QueryRecordVersionRequest {
    #[prost(string, tag = "1")]
    pub table: String,
    #[prost(string, tag = "2")]
    pub primary_key: String,
}

/// One peer's view of the queried record.
#[derive(Clone, PartialEq, prost::Message)]
pub struct RecordVersion {
    #[prost(int64, tag = "1")]
    pub node_id: i64,
    /// The record as the peer stores it, as JSON. Empty when the peer has
    /// no row for the key.
    #[prost(string, tag = "2")]
    pub record: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct QueryRecordVersionResponse {
    #[prost(message, repeated, tag = "1")]
    pub versions: Vec<RecordVersion>,
}
