//! Relationship service: the streaming start/resume workflows plus the
//! unary stop and remove.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::Status;

use super::{observe, Envelope};
use crate::connectors::{AnchorConnector, TransformationConnector};
use crate::copy::CopyOptions;
use crate::engine::Engine;
use crate::relationship::{self, StartRequest};
use crate::ApiResult;
use proto_redb::control::RelationshipProgress;

type ProgressStream = ReceiverStream<Result<RelationshipProgress, Status>>;

#[derive(Debug, Clone, Default)]
pub struct StartRelationshipRequest {
    pub tenant_id: String,
    pub workspace_name: String,
    pub relationship_name: String,
    /// Zero takes the default of 1000.
    pub batch_size: i32,
    /// Zero takes the default of 4.
    pub parallel_workers: i32,
}

#[derive(Debug, Clone, Default)]
pub struct StopRelationshipRequest {
    pub tenant_id: String,
    pub workspace_name: String,
    pub relationship_name: String,
}

#[derive(Debug, Clone, Default)]
pub struct ResumeRelationshipRequest {
    pub tenant_id: String,
    pub workspace_name: String,
    pub relationship_name: String,
}

#[derive(Debug, Clone, Default)]
pub struct RemoveRelationshipRequest {
    pub tenant_id: String,
    pub workspace_name: String,
    pub relationship_name: String,
    pub force: bool,
}

#[derive(Debug, Clone)]
pub struct RelationshipAck {
    pub envelope: Envelope,
    pub relationship_status: core_sql::Status,
}

pub struct RelationshipService {
    engine: Arc<Engine>,
}

impl RelationshipService {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }

    #[tracing::instrument(skip(self), fields(relationship = %req.relationship_name))]
    pub async fn start_relationship(
        &self,
        req: StartRelationshipRequest,
    ) -> ApiResult<ProgressStream> {
        let guard = self.engine.track_operation();
        let runtime = observe(&self.engine, self.engine.runtime())?;
        let anchor = observe(&self.engine, runtime.anchor().cloned())?;

        let anchor = AnchorConnector { client: anchor };
        let transformer = runtime
            .transformation
            .clone()
            .map(|client| TransformationConnector { client });

        let start = StartRequest {
            tenant_id: req.tenant_id,
            workspace_name: req.workspace_name,
            relationship_name: req.relationship_name,
            options: CopyOptions {
                batch_size: req.batch_size,
                parallel_workers: if req.parallel_workers <= 0 {
                    crate::copy::DEFAULT_PARALLEL_WORKERS
                } else {
                    req.parallel_workers
                },
                dry_run: false,
            },
        };

        let (tx, rx) = mpsc::channel(16);
        let engine = self.engine.clone();
        tokio::spawn(async move {
            let _guard = guard; // in-flight for the whole stream
            let result = relationship::start_relationship(
                engine.pool(),
                &anchor,
                &anchor,
                transformer
                    .as_ref()
                    .map(|t| t as &dyn crate::connectors::TransformConnector),
                start,
                &tx,
            )
            .await;

            if let Err(status) = result {
                engine.record_error();
                let _ = tx.send(Err(status)).await;
            }
        });

        Ok(ReceiverStream::new(rx))
    }

    #[tracing::instrument(skip(self), fields(relationship = %req.relationship_name))]
    pub async fn stop_relationship(
        &self,
        req: StopRelationshipRequest,
    ) -> ApiResult<RelationshipAck> {
        let _guard = self.engine.track_operation();
        let result = self.stop_inner(req).await;
        observe(&self.engine, result)
    }

    async fn stop_inner(&self, req: StopRelationshipRequest) -> ApiResult<RelationshipAck> {
        let runtime = self.engine.runtime()?;
        let anchor = AnchorConnector {
            client: runtime.anchor()?.clone(),
        };

        let relationship = relationship::stop_relationship(
            self.engine.pool(),
            &anchor,
            &req.tenant_id,
            &req.workspace_name,
            &req.relationship_name,
        )
        .await?;

        Ok(RelationshipAck {
            envelope: Envelope::ok(
                proto_redb::Status::Updated,
                format!("relationship '{}' stopped", req.relationship_name),
            ),
            relationship_status: relationship.status,
        })
    }

    #[tracing::instrument(skip(self), fields(relationship = %req.relationship_name))]
    pub async fn resume_relationship(
        &self,
        req: ResumeRelationshipRequest,
    ) -> ApiResult<ProgressStream> {
        let guard = self.engine.track_operation();
        let runtime = observe(&self.engine, self.engine.runtime())?;
        let anchor = observe(&self.engine, runtime.anchor().cloned())?;
        let anchor = AnchorConnector { client: anchor };

        let (tx, rx) = mpsc::channel(16);
        let engine = self.engine.clone();
        tokio::spawn(async move {
            let _guard = guard;
            let result = relationship::resume_relationship(
                engine.pool(),
                &anchor,
                &req.tenant_id,
                &req.workspace_name,
                &req.relationship_name,
                &tx,
            )
            .await;

            if let Err(status) = result {
                engine.record_error();
                let _ = tx.send(Err(status)).await;
            }
        });

        Ok(ReceiverStream::new(rx))
    }

    #[tracing::instrument(skip(self), fields(relationship = %req.relationship_name, force = req.force))]
    pub async fn remove_relationship(&self, req: RemoveRelationshipRequest) -> ApiResult<Envelope> {
        let _guard = self.engine.track_operation();
        let result = self.remove_inner(req).await;
        observe(&self.engine, result)
    }

    async fn remove_inner(&self, req: RemoveRelationshipRequest) -> ApiResult<Envelope> {
        let runtime = self.engine.runtime()?;
        let anchor = AnchorConnector {
            client: runtime.anchor()?.clone(),
        };

        relationship::remove_relationship(
            self.engine.pool(),
            &anchor,
            &req.tenant_id,
            &req.workspace_name,
            &req.relationship_name,
            req.force,
        )
        .await?;

        Ok(Envelope::ok(
            proto_redb::Status::Deleted,
            format!("relationship '{}' removed", req.relationship_name),
        ))
    }
}
