//! All relational-store access of the core control plane.
//!
//! One module per persisted entity family. Every mutating function takes an
//! explicit executor so callers choose their transactional boundary; update
//! functions build their `SET` clause strictly from the fields present in
//! the update struct.

pub mod commits;
pub mod crypto;
pub mod data_products;
pub mod databases;
pub mod instances;
pub mod mappings;
pub mod mesh;
pub mod relationships;
pub mod replication_sources;
pub mod repos;
pub mod resources;
pub mod streams;
pub mod workspaces;

mod status;
pub use status::Status;

mod text_json;
pub use text_json::TextJson;

use serde_json::value::RawValue;

/// Opaque JSON column payload: raw bytes in, raw bytes out.
pub type Json = TextJson<Box<RawValue>>;

/// The empty-object document substituted wherever a derived JSON column
/// would otherwise be null at the wire.
pub fn empty_json() -> Json {
    TextJson(RawValue::from_string("{}".to_string()).expect("static document parses"))
}

/// Build a Json column value from raw JSON text, substituting the empty
/// object for null, empty, or malformed input.
pub fn json_or_empty(text: &str) -> Json {
    if text.trim().is_empty() || text.trim() == "null" {
        return empty_json();
    }
    match RawValue::from_string(text.to_string()) {
        Ok(raw) => TextJson(raw),
        Err(_) => empty_json(),
    }
}

/// Status-message columns are bounded to 250 bytes. Clamp on a char
/// boundary so multi-byte text stays valid UTF-8.
pub const STATUS_MESSAGE_MAX: usize = 250;

pub fn clamp_status_message(message: &str) -> String {
    if message.len() <= STATUS_MESSAGE_MAX {
        return message.to_string();
    }
    let mut end = STATUS_MESSAGE_MAX;
    while !message.is_char_boundary(end) {
        end -= 1;
    }
    message[..end].to_string()
}

/// Connect a Postgres pool sized for the core's per-query checkout model.
pub async fn connect_pool(database_url: &str, max_connections: u32) -> sqlx::Result<sqlx::PgPool> {
    sqlx::postgres::PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}

#[cfg(test)]
mod test {
    use super::{empty_json, json_or_empty};

    #[test]
    fn json_columns_are_never_null() {
        assert_eq!(empty_json().get(), "{}");
        assert_eq!(json_or_empty("").get(), "{}");
        assert_eq!(json_or_empty("  ").get(), "{}");
        assert_eq!(json_or_empty("null").get(), "{}");
        assert_eq!(json_or_empty("not json").get(), "{}");
    }

    #[test]
    fn status_messages_clamp_to_250_bytes() {
        use super::clamp_status_message;

        assert_eq!(clamp_status_message("short"), "short");
        assert_eq!(clamp_status_message(&"x".repeat(251)).len(), 250);
        assert_eq!(clamp_status_message(&"x".repeat(250)).len(), 250);

        // 249 ASCII bytes followed by a 3-byte char: the clamp backs off to
        // the char boundary rather than splitting the sequence.
        let mixed = format!("{}\u{20AC}", "x".repeat(249));
        let clamped = clamp_status_message(&mixed);
        assert_eq!(clamped.len(), 249);
        assert!(clamped.is_char_boundary(clamped.len()));
    }

    #[test]
    fn json_passes_through_verbatim() {
        // Key ordering and spacing survive the round-trip untouched.
        let doc = r#"{"b": 1,  "a": {"nested": [1, 2, 3]}}"#;
        assert_eq!(json_or_empty(doc).get(), doc);
    }
}
