//! Stream service: message-platform subscriptions whose lifecycle mirrors
//! databases.

use std::sync::Arc;

use tonic::Status;
use uuid::Uuid;

use super::{observe, Envelope};
use crate::engine::Engine;
use crate::registry::resolve_workspace;
use crate::{db_error, gateway_error, ApiResult};
use core_sql::Status as RowStatus;
use proto_redb::stream as pb;

#[derive(Debug, Clone, Default)]
pub struct ConnectStreamRequest {
    pub tenant_id: String,
    pub workspace_name: String,
    pub name: String,
    pub topics: Vec<String>,
    /// Connection configuration as an opaque JSON document.
    pub config: String,
}

#[derive(Debug, Clone, Default)]
pub struct DisconnectStreamRequest {
    pub tenant_id: String,
    pub workspace_name: String,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct ConnectStreamResponse {
    pub envelope: Envelope,
    pub stream_id: Uuid,
}

pub struct StreamService {
    engine: Arc<Engine>,
}

impl StreamService {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }

    pub async fn connect_stream(&self, req: ConnectStreamRequest) -> ApiResult<ConnectStreamResponse> {
        let _guard = self.engine.track_operation();
        let result = self.connect_inner(req).await;
        observe(&self.engine, result)
    }

    async fn connect_inner(&self, req: ConnectStreamRequest) -> ApiResult<ConnectStreamResponse> {
        if req.name.is_empty() || req.topics.is_empty() {
            return Err(Status::invalid_argument("name and topics are required"));
        }

        let pool = self.engine.pool();
        let runtime = self.engine.runtime()?;
        let gateway = runtime.stream()?;
        let node_id = runtime.node_id.unwrap_or(0);

        let workspace_id = resolve_workspace(pool, &req.tenant_id, &req.workspace_name).await?;

        let topics_json = serde_json::to_string(&req.topics)
            .map_err(|err| Status::internal(format!("failed to serialize topics: {err}")))?;
        let stream = core_sql::streams::create(
            &req.tenant_id,
            workspace_id,
            node_id,
            &req.name,
            core_sql::json_or_empty(&topics_json),
            core_sql::json_or_empty(&req.config),
            pool,
        )
        .await
        .map_err(db_error)?;

        let ack = gateway
            .connect_stream(pb::ConnectStreamRequest {
                stream_id: stream.id.to_string(),
                topics: req.topics.clone(),
                config: req.config.clone(),
            })
            .await
            .map_err(|err| gateway_error("stream", err))?;
        if !ack.success {
            core_sql::streams::set_status(stream.id, RowStatus::Error, &ack.message, pool)
                .await
                .map_err(db_error)?;
            return Err(Status::internal(format!(
                "stream subscription failed: {}",
                ack.message
            )));
        }

        core_sql::streams::set_status(stream.id, RowStatus::Connected, "", pool)
            .await
            .map_err(db_error)?;

        Ok(ConnectStreamResponse {
            envelope: Envelope::ok(
                proto_redb::Status::Connected,
                format!("stream '{}' connected", req.name),
            ),
            stream_id: stream.id,
        })
    }

    pub async fn disconnect_stream(&self, req: DisconnectStreamRequest) -> ApiResult<Envelope> {
        let _guard = self.engine.track_operation();
        let result = self.disconnect_inner(req).await;
        observe(&self.engine, result)
    }

    async fn disconnect_inner(&self, req: DisconnectStreamRequest) -> ApiResult<Envelope> {
        let pool = self.engine.pool();
        let runtime = self.engine.runtime()?;

        let workspace_id = resolve_workspace(pool, &req.tenant_id, &req.workspace_name).await?;
        let stream = core_sql::streams::get_by_name(workspace_id, &req.name, pool)
            .await
            .map_err(db_error)?
            .ok_or_else(|| Status::not_found(format!("stream '{}' not found", req.name)))?;

        runtime
            .stream()?
            .disconnect_stream(pb::DisconnectStreamRequest {
                stream_id: stream.id.to_string(),
            })
            .await
            .map_err(|err| gateway_error("stream", err))?;

        core_sql::streams::set_status(stream.id, RowStatus::Disconnected, "", pool)
            .await
            .map_err(db_error)?;

        Ok(Envelope::ok(
            proto_redb::Status::Disconnected,
            format!("stream '{}' disconnected", req.name),
        ))
    }
}
