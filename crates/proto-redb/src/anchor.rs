//! Messages of the Anchor service contract: per-database driver fan-out.
//!
//! Anchor is the only component that speaks database dialects. Row documents
//! cross this boundary as JSON-encoded object text, one string per row, so
//! the core never needs driver-level value types.

/// Ack is the uniform response of lifecycle operations that carry no payload.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Ack {
    #[prost(bool, tag = "1")]
    pub success: bool,
    #[prost(string, tag = "2")]
    pub message: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ConnectInstanceRequest {
    #[prost(string, tag = "1")]
    pub instance_id: String,
    /// Connection configuration as an opaque JSON document.
    #[prost(string, tag = "2")]
    pub config: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct DisconnectInstanceRequest {
    #[prost(string, tag = "1")]
    pub instance_id: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ConnectDatabaseRequest {
    #[prost(string, tag = "1")]
    pub database_id: String,
    #[prost(string, tag = "2")]
    pub config: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct DisconnectDatabaseRequest {
    #[prost(string, tag = "1")]
    pub database_id: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CreateDatabaseRequest {
    #[prost(string, tag = "1")]
    pub instance_id: String,
    #[prost(string, tag = "2")]
    pub database_id: String,
    #[prost(string, tag = "3")]
    pub database_name: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct WipeDatabaseRequest {
    #[prost(string, tag = "1")]
    pub database_id: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct DeployDatabaseSchemaRequest {
    #[prost(string, tag = "1")]
    pub database_id: String,
    /// Schema structure as an opaque JSON document.
    #[prost(string, tag = "2")]
    pub schema: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct DropDatabaseRequest {
    #[prost(string, tag = "1")]
    pub database_id: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct DropTableRequest {
    #[prost(string, tag = "1")]
    pub database_id: String,
    #[prost(string, tag = "2")]
    pub table_name: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct WipeTableRequest {
    #[prost(string, tag = "1")]
    pub database_id: String,
    #[prost(string, tag = "2")]
    pub table_name: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct FetchDataRequest {
    #[prost(string, tag = "1")]
    pub database_id: String,
    #[prost(string, tag = "2")]
    pub table_name: String,
    /// Columns to fetch. Empty fetches every column.
    #[prost(string, repeated, tag = "3")]
    pub columns: Vec<String>,
    /// Maximum rows to return. Zero means no limit.
    #[prost(int64, tag = "4")]
    pub limit: i64,
    #[prost(int64, tag = "5")]
    pub offset: i64,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct FetchDataResponse {
    /// JSON object document per row.
    #[prost(string, repeated, tag = "1")]
    pub rows: Vec<String>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct FetchDataStreamRequest {
    #[prost(string, tag = "1")]
    pub database_id: String,
    #[prost(string, tag = "2")]
    pub table_name: String,
    #[prost(string, repeated, tag = "3")]
    pub columns: Vec<String>,
    #[prost(int32, tag = "4")]
    pub batch_size: i32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct FetchDataStreamResponse {
    #[prost(string, repeated, tag = "1")]
    pub rows: Vec<String>,
    /// Zero-based index of this batch within the stream.
    #[prost(int64, tag = "2")]
    pub batch_index: i64,
    #[prost(bool, tag = "3")]
    pub is_final: bool,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct StreamTableDataRequest {
    #[prost(string, tag = "1")]
    pub database_id: String,
    #[prost(string, tag = "2")]
    pub table_name: String,
    #[prost(int32, tag = "3")]
    pub batch_size: i32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct StreamTableDataResponse {
    #[prost(string, repeated, tag = "1")]
    pub rows: Vec<String>,
    #[prost(bool, tag = "2")]
    pub is_final: bool,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct InsertDataRequest {
    #[prost(string, tag = "1")]
    pub database_id: String,
    #[prost(string, tag = "2")]
    pub table_name: String,
    #[prost(string, repeated, tag = "3")]
    pub rows: Vec<String>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct InsertDataResponse {
    #[prost(int64, tag = "1")]
    pub rows_affected: i64,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct InsertBatchDataRequest {
    #[prost(string, tag = "1")]
    pub database_id: String,
    #[prost(string, tag = "2")]
    pub table_name: String,
    #[prost(string, repeated, tag = "3")]
    pub rows: Vec<String>,
    /// Batches of one logical insert are applied in a single transaction.
    #[prost(bool, tag = "4")]
    pub atomic: bool,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct InsertBatchDataResponse {
    #[prost(int64, tag = "1")]
    pub rows_affected: i64,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct UpdateTableDataRequest {
    #[prost(string, tag = "1")]
    pub database_id: String,
    #[prost(string, tag = "2")]
    pub table_name: String,
    #[prost(string, repeated, tag = "3")]
    pub rows: Vec<String>,
    #[prost(string, repeated, tag = "4")]
    pub key_columns: Vec<String>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct UpdateTableDataResponse {
    #[prost(int64, tag = "1")]
    pub rows_affected: i64,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct GetTableRowCountRequest {
    #[prost(string, tag = "1")]
    pub database_id: String,
    #[prost(string, tag = "2")]
    pub table_name: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct GetTableRowCountResponse {
    #[prost(int64, tag = "1")]
    pub count: i64,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct TransformDataRequest {
    #[prost(string, tag = "1")]
    pub database_id: String,
    #[prost(string, tag = "2")]
    pub table_name: String,
    #[prost(string, repeated, tag = "3")]
    pub rows: Vec<String>,
    /// Serialized mapping rules to apply driver-side.
    #[prost(string, tag = "4")]
    pub rules: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct TransformDataResponse {
    #[prost(string, repeated, tag = "1")]
    pub rows: Vec<String>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct StartCdcReplicationRequest {
    #[prost(string, tag = "1")]
    pub replication_source_id: String,
    #[prost(string, tag = "2")]
    pub database_id: String,
    #[prost(string, tag = "3")]
    pub table_name: String,
    #[prost(string, tag = "4")]
    pub slot_name: String,
    #[prost(string, tag = "5")]
    pub publication_name: String,
    /// Serialized mapping rules driving the ongoing replication.
    #[prost(string, tag = "6")]
    pub rules: String,
    #[prost(string, tag = "7")]
    pub target_database_id: String,
    #[prost(string, tag = "8")]
    pub target_table_name: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct StartCdcReplicationResponse {
    #[prost(string, tag = "1")]
    pub connection_id: String,
    /// Opaque resumable replication state, as JSON.
    #[prost(string, tag = "2")]
    pub state: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct StopCdcReplicationRequest {
    #[prost(string, tag = "1")]
    pub connection_id: String,
    #[prost(string, tag = "2")]
    pub slot_name: String,
    #[prost(string, tag = "3")]
    pub publication_name: String,
    /// Preserve slot state so the stream can later be resumed.
    #[prost(bool, tag = "4")]
    pub preserve_state: bool,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct StopCdcReplicationResponse {
    /// Final replication state at the moment of stop, as JSON.
    #[prost(string, tag = "1")]
    pub state: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ResumeCdcReplicationRequest {
    #[prost(string, tag = "1")]
    pub connection_id: String,
    #[prost(string, tag = "2")]
    pub slot_name: String,
    #[prost(string, tag = "3")]
    pub publication_name: String,
    /// State captured by a prior stop, as JSON. An empty object starts cold.
    #[prost(string, tag = "4")]
    pub resume_state: String,
    #[prost(string, tag = "5")]
    pub rules: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ResumeCdcReplicationResponse {
    #[prost(string, tag = "1")]
    pub connection_id: String,
    #[prost(string, tag = "2")]
    pub state: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct RemoveReplicationSourceRequest {
    #[prost(string, tag = "1")]
    pub connection_id: String,
    #[prost(string, tag = "2")]
    pub slot_name: String,
    #[prost(string, tag = "3")]
    pub publication_name: String,
}
