//! Messages of the Transformation service contract: named per-value
//! transformation functions, dispatched by name.

#[derive(Clone, PartialEq, prost::Message)]
pub struct TransformRequest {
    #[prost(string, tag = "1")]
    pub function_name: String,
    /// Input value rendered as a string; the function owns its parsing.
    #[prost(string, tag = "2")]
    pub input: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct TransformResponse {
    #[prost(string, tag = "1")]
    pub output: String,
    #[prost(enumeration = "crate::common::Status", tag = "2")]
    pub status: i32,
}
