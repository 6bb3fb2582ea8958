//! Messages of the UnifiedModel service contract: cross-dialect schema
//! translation.

#[derive(Clone, PartialEq, prost::Message)]
pub struct TranslateRequest {
    #[prost(string, tag = "1")]
    pub source_type: String,
    #[prost(string, tag = "2")]
    pub target_type: String,
    /// Source schema structure as an opaque JSON document.
    #[prost(string, tag = "3")]
    pub source_structure: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct TranslateResponse {
    /// Translated schema structure. Absence signals a failed translation
    /// even when the RPC itself succeeded.
    #[prost(string, optional, tag = "1")]
    pub target_structure: Option<String>,
    #[prost(string, repeated, tag = "2")]
    pub warnings: Vec<String>,
}
