//! The multi-service façade. Each service wraps its handlers in the
//! tracking envelope: requests are counted and held as in-flight operations
//! for their full scope (streams included), and failures bump the error
//! counter. Transport binding is external; these methods return exactly the
//! shapes a server implementation delegates to.

use std::sync::Arc;

use crate::engine::Engine;

mod data_product;
mod database;
mod mapping;
mod mesh;
mod relationship;
mod repo;
mod resource;
mod stream;

pub use data_product::DataProductService;
pub use database::DatabaseService;
pub use mapping::MappingService;
pub use mesh::MeshService;
pub use relationship::RelationshipService;
pub use repo::RepoService;
pub use resource::ResourceService;
pub use stream::StreamService;

/// The envelope every unary response carries: a free-form message, the
/// machine-readable status tag, and an RFC-3339 UTC timestamp.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub message: String,
    pub success: bool,
    pub status: proto_redb::Status,
    pub timestamp: String,
}

impl Envelope {
    pub fn ok(status: proto_redb::Status, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            success: true,
            status,
            timestamp: crate::wire_timestamp(chrono::Utc::now()),
        }
    }
}

/// The assembled façade.
pub struct Core {
    pub engine: Arc<Engine>,
    pub relationships: RelationshipService,
    pub mappings: MappingService,
    pub repos: RepoService,
    pub databases: DatabaseService,
    pub resources: ResourceService,
    pub data_products: DataProductService,
    pub streams: StreamService,
    pub mesh: MeshService,
}

impl Core {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            relationships: RelationshipService::new(engine.clone()),
            mappings: MappingService::new(engine.clone()),
            repos: RepoService::new(engine.clone()),
            databases: DatabaseService::new(engine.clone()),
            resources: ResourceService::new(engine.clone()),
            data_products: DataProductService::new(engine.clone()),
            streams: StreamService::new(engine.clone()),
            mesh: MeshService::new(engine.clone()),
            engine,
        }
    }
}

/// Fold a handler result into the error metric on the way out.
pub(crate) fn observe<T>(engine: &Engine, result: crate::ApiResult<T>) -> crate::ApiResult<T> {
    if result.is_err() {
        engine.record_error();
    }
    result
}

#[cfg(test)]
mod test {
    use super::Envelope;

    #[test]
    fn envelope_carries_status_and_rfc3339_timestamp() {
        let envelope = Envelope::ok(proto_redb::Status::Created, "created");
        assert!(envelope.success);
        assert_eq!(envelope.status.as_str_name(), "STATUS_CREATED");
        // 2006-01-02T15:04:05Z shape: 20 chars, trailing Z, no sub-seconds.
        assert_eq!(envelope.timestamp.len(), 20);
        assert!(envelope.timestamp.ends_with('Z'));
        assert!(!envelope.timestamp.contains('.'));
    }
}
