//! The core control plane engine: orchestration of relationship, clone,
//! and data-copy workflows over the metadata store and the downstream
//! Anchor / UnifiedModel / Mesh / Transformation / Stream services.

pub mod api;
pub mod clone;
pub mod connectors;
pub mod copy;
pub mod engine;
pub mod mappings;
pub mod registry;
pub mod relationship;
pub mod resource_uri;
pub mod schema_repo;
pub mod sync;

mod error;
pub use error::{db_error, gateway_error, ApiResult};

/// Wire-level timestamp emission: RFC-3339 UTC with second precision,
/// `2006-01-02T15:04:05Z`.
pub fn wire_timestamp(ts: chrono::DateTime<chrono::Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

#[cfg(test)]
mod test {
    use chrono::TimeZone;

    #[test]
    fn wire_timestamps_are_rfc3339_utc_seconds() {
        let ts = chrono::Utc.with_ymd_and_hms(2006, 1, 2, 15, 4, 5).unwrap();
        assert_eq!(super::wire_timestamp(ts), "2006-01-02T15:04:05Z");
    }
}
