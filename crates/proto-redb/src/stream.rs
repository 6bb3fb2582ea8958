//! Messages of the Stream service contract: message-platform subscriptions
//! bound to a node and workspace.

#[derive(Clone, PartialEq, prost::Message)]
pub struct ConnectStreamRequest {
    #[prost(string, tag = "1")]
    pub stream_id: String,
    #[prost(string, repeated, tag = "2")]
    pub topics: Vec<String>,
    /// Connection configuration as an opaque JSON document.
    #[prost(string, tag = "3")]
    pub config: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct DisconnectStreamRequest {
    #[prost(string, tag = "1")]
    pub stream_id: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct GetStreamStatusRequest {
    #[prost(string, tag = "1")]
    pub stream_id: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct GetStreamStatusResponse {
    #[prost(enumeration = "crate::common::Status", tag = "1")]
    pub status: i32,
    #[prost(string, tag = "2")]
    pub message: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct StreamAck {
    #[prost(bool, tag = "1")]
    pub success: bool,
    #[prost(string, tag = "2")]
    pub message: String,
}
