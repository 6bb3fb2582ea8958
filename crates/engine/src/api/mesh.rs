//! Mesh service: seeding and joining the overlay, topology, and message
//! metrics. Mesh rows are not workspace-scoped.

use std::sync::Arc;

use tonic::Status;
use uuid::Uuid;

use super::{observe, Envelope};
use crate::engine::Engine;
use crate::{db_error, gateway_error, ApiResult};
use proto_redb::mesh as pb;

#[derive(Debug, Clone, Default)]
pub struct SeedMeshRequest {
    pub mesh_name: String,
    pub allow_join: bool,
}

#[derive(Debug, Clone)]
pub struct SeedMeshResponse {
    pub envelope: Envelope,
    pub mesh_id: Uuid,
}

#[derive(Debug, Clone, Default)]
pub struct JoinMeshRequest {
    pub mesh_id: String,
    pub node_address: String,
}

#[derive(Debug, Clone, Default)]
pub struct GetTopologyRequest {
    pub mesh_id: String,
}

#[derive(Debug, Clone)]
pub struct GetTopologyResponse {
    pub envelope: Envelope,
    pub nodes: Vec<pb::NodeInfo>,
}

#[derive(Debug, Clone)]
pub struct MessageMetricsResponse {
    pub envelope: Envelope,
    pub published: i64,
    pub delivered: i64,
    pub failed: i64,
}

pub struct MeshService {
    engine: Arc<Engine>,
}

impl MeshService {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }

    fn mesh_client(&self) -> ApiResult<gateways::mesh::Client> {
        let runtime = self.engine.runtime()?;
        runtime
            .mesh
            .clone()
            .ok_or_else(|| Status::unavailable("mesh service is not available"))
    }

    fn node_id(&self) -> ApiResult<i64> {
        self.engine
            .runtime()?
            .node_id
            .ok_or_else(|| Status::failed_precondition("this node has no local identity"))
    }

    /// Seed a brand-new mesh with this node as its first member.
    pub async fn seed_mesh(&self, req: SeedMeshRequest) -> ApiResult<SeedMeshResponse> {
        let _guard = self.engine.track_operation();
        let result = self.seed_inner(req).await;
        observe(&self.engine, result)
    }

    async fn seed_inner(&self, req: SeedMeshRequest) -> ApiResult<SeedMeshResponse> {
        if req.mesh_name.is_empty() {
            return Err(Status::invalid_argument("mesh_name is required"));
        }
        let client = self.mesh_client()?;
        let node_id = self.node_id()?;
        let pool = self.engine.pool();

        let mesh = core_sql::mesh::create_mesh(&req.mesh_name, req.allow_join, pool)
            .await
            .map_err(db_error)?;

        client
            .seed_mesh(pb::SeedMeshRequest {
                mesh_name: req.mesh_name.clone(),
                allow_join: req.allow_join,
            })
            .await
            .map_err(|err| gateway_error("mesh", err))?;

        core_sql::mesh::add_membership(mesh.id, node_id, pool)
            .await
            .map_err(db_error)?;
        if let Err(err) =
            core_sql::mesh::set_node_status(node_id, core_sql::Status::Active, pool).await
        {
            tracing::warn!(error = %err, "best-effort node status write failed");
        }

        Ok(SeedMeshResponse {
            envelope: Envelope::ok(
                proto_redb::Status::Created,
                format!("mesh '{}' seeded", req.mesh_name),
            ),
            mesh_id: mesh.id,
        })
    }

    /// Join an existing mesh that allows joins.
    pub async fn join_mesh(&self, req: JoinMeshRequest) -> ApiResult<Envelope> {
        let _guard = self.engine.track_operation();
        let result = self.join_inner(req).await;
        observe(&self.engine, result)
    }

    async fn join_inner(&self, req: JoinMeshRequest) -> ApiResult<Envelope> {
        let mesh_id = Uuid::parse_str(&req.mesh_id)
            .map_err(|_| Status::invalid_argument("mesh_id is not a valid id"))?;
        let client = self.mesh_client()?;
        let node_id = self.node_id()?;
        let pool = self.engine.pool();

        let mesh = core_sql::mesh::get_mesh(mesh_id, pool)
            .await
            .map_err(db_error)?
            .ok_or_else(|| Status::not_found(format!("mesh '{mesh_id}' not found")))?;
        if !mesh.allow_join {
            return Err(Status::failed_precondition(format!(
                "mesh '{}' does not allow joins",
                mesh.name
            )));
        }

        let joined = client
            .join_mesh(pb::JoinMeshRequest {
                mesh_id: mesh_id.to_string(),
                node_address: req.node_address.clone(),
                node_id,
            })
            .await
            .map_err(|err| gateway_error("mesh", err))?;
        if !joined.accepted {
            return Err(Status::failed_precondition(format!(
                "mesh rejected the join: {}",
                joined.message
            )));
        }

        core_sql::mesh::add_membership(mesh_id, node_id, pool)
            .await
            .map_err(db_error)?;
        if let Err(err) =
            core_sql::mesh::set_node_status(node_id, core_sql::Status::Active, pool).await
        {
            tracing::warn!(error = %err, "best-effort node status write failed");
        }

        Ok(Envelope::ok(
            proto_redb::Status::Connected,
            format!("joined mesh '{}'", mesh.name),
        ))
    }

    pub async fn get_topology(&self, req: GetTopologyRequest) -> ApiResult<GetTopologyResponse> {
        let _guard = self.engine.track_operation();
        let result = self.topology_inner(req).await;
        observe(&self.engine, result)
    }

    async fn topology_inner(&self, req: GetTopologyRequest) -> ApiResult<GetTopologyResponse> {
        let client = self.mesh_client()?;

        let topology = client
            .get_topology(pb::GetTopologyRequest {
                mesh_id: req.mesh_id.clone(),
            })
            .await
            .map_err(|err| gateway_error("mesh", err))?;

        Ok(GetTopologyResponse {
            envelope: Envelope::ok(
                proto_redb::Status::Success,
                format!("{} nodes", topology.nodes.len()),
            ),
            nodes: topology.nodes,
        })
    }

    pub async fn get_message_metrics(&self) -> ApiResult<MessageMetricsResponse> {
        let _guard = self.engine.track_operation();
        let result = self.metrics_inner().await;
        observe(&self.engine, result)
    }

    async fn metrics_inner(&self) -> ApiResult<MessageMetricsResponse> {
        let client = self.mesh_client()?;

        let metrics = client
            .get_message_metrics(pb::GetMessageMetricsRequest {})
            .await
            .map_err(|err| gateway_error("mesh", err))?;

        Ok(MessageMetricsResponse {
            envelope: Envelope::ok(proto_redb::Status::Success, "message metrics"),
            published: metrics.published,
            delivered: metrics.delivered,
            failed: metrics.failed,
        })
    }
}
