use serde::{Deserialize, Serialize};

/// Status is the Rust equivalent of the Postgres `status_enum` type, used by
/// every status column in the store. Wire emission uses the same `STATUS_*`
/// names as the response taxonomy.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "status_enum")]
pub enum Status {
    #[sqlx(rename = "STATUS_CREATED")]
    #[serde(rename = "STATUS_CREATED")]
    Created,
    #[sqlx(rename = "STATUS_CONNECTED")]
    #[serde(rename = "STATUS_CONNECTED")]
    Connected,
    #[sqlx(rename = "STATUS_DISCONNECTED")]
    #[serde(rename = "STATUS_DISCONNECTED")]
    Disconnected,
    #[sqlx(rename = "STATUS_DELETED")]
    #[serde(rename = "STATUS_DELETED")]
    Deleted,
    #[sqlx(rename = "STATUS_ACTIVE")]
    #[serde(rename = "STATUS_ACTIVE")]
    Active,
    #[sqlx(rename = "STATUS_STOPPED")]
    #[serde(rename = "STATUS_STOPPED")]
    Stopped,
    #[sqlx(rename = "STATUS_PENDING")]
    #[serde(rename = "STATUS_PENDING")]
    Pending,
    #[sqlx(rename = "STATUS_ERROR")]
    #[serde(rename = "STATUS_ERROR")]
    Error,
    /// A node that has never joined a mesh, or left one cleanly.
    #[sqlx(rename = "STATUS_CLEAN")]
    #[serde(rename = "STATUS_CLEAN")]
    Clean,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Created => "STATUS_CREATED",
            Status::Connected => "STATUS_CONNECTED",
            Status::Disconnected => "STATUS_DISCONNECTED",
            Status::Deleted => "STATUS_DELETED",
            Status::Active => "STATUS_ACTIVE",
            Status::Stopped => "STATUS_STOPPED",
            Status::Pending => "STATUS_PENDING",
            Status::Error => "STATUS_ERROR",
            Status::Clean => "STATUS_CLEAN",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
