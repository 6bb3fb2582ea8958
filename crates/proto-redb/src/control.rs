//! Messages of the core's own server-streamed endpoints.

use crate::common::Status;

/// One progress event of `StartRelationship` / `ResumeRelationship`.
/// Events are emitted in strict phase order; the final event carries a
/// terminal status.
#[derive(Clone, PartialEq, prost::Message)]
pub struct RelationshipProgress {
    /// Workflow phase: `initializing`, `copying_data`, `resuming_cdc`,
    /// `setting_up_cdc`, `active`.
    #[prost(string, tag = "1")]
    pub phase: String,
    #[prost(int64, tag = "2")]
    pub rows_copied: i64,
    #[prost(int64, tag = "3")]
    pub total_rows: i64,
    #[prost(string, tag = "4")]
    pub current_table: String,
    #[prost(double, tag = "5")]
    pub progress_percentage: f64,
    #[prost(string, tag = "6")]
    pub cdc_status: String,
    #[prost(string, tag = "7")]
    pub message: String,
    #[prost(bool, tag = "8")]
    pub success: bool,
    #[prost(enumeration = "Status", tag = "9")]
    pub status: i32,
}

/// One progress event of `CopyMappingData`.
#[derive(Clone, PartialEq, prost::Message)]
pub struct CopyProgress {
    /// `starting`, `copying`, `completed`, `completed_with_errors`, `error`.
    #[prost(string, tag = "1")]
    pub phase: String,
    #[prost(int64, tag = "2")]
    pub rows_copied: i64,
    #[prost(int64, tag = "3")]
    pub total_rows: i64,
    #[prost(string, tag = "4")]
    pub current_table: String,
    #[prost(double, tag = "5")]
    pub progress_percentage: f64,
    #[prost(string, tag = "6")]
    pub message: String,
    #[prost(bool, tag = "7")]
    pub success: bool,
    #[prost(enumeration = "Status", tag = "8")]
    pub status: i32,
    /// Accumulated non-fatal errors, present on terminal events.
    #[prost(string, repeated, tag = "9")]
    pub errors: Vec<String>,
    /// Advisory operation id; `GetCopyStatus` accepts it while the
    /// operation is retained.
    #[prost(string, tag = "10")]
    pub operation_id: String,
}

/// One chunk of `TransformDataStream`: rows of the source table with the
/// mapping's transformations applied.
#[derive(Clone, PartialEq, prost::Message)]
pub struct TransformedDataChunk {
    #[prost(string, tag = "1")]
    pub current_table: String,
    #[prost(string, repeated, tag = "2")]
    pub rows: Vec<String>,
    #[prost(bool, tag = "3")]
    pub is_final: bool,
    #[prost(enumeration = "Status", tag = "4")]
    pub status: i32,
}
