//! Mapping service: the streaming mapping-driven data copy, the advisory
//! copy-status endpoint, and the streamed transform of a source table.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::Status;
use uuid::Uuid;

use super::{observe, Envelope};
use crate::connectors::{AnchorConnector, TransformConnector, TransformationConnector};
use crate::copy::{self, CopyEvent, CopyOptions};
use crate::engine::Engine;
use crate::registry::resolve_workspace;
use crate::{db_error, gateway_error, mappings, ApiResult};
use proto_redb::common::Status as WireStatus;
use proto_redb::control::{CopyProgress, TransformedDataChunk};

#[derive(Debug, Clone, Default)]
pub struct CopyMappingDataRequest {
    pub tenant_id: String,
    pub workspace_name: String,
    pub mapping_name: String,
    pub batch_size: i32,
    pub parallel_workers: i32,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Default)]
pub struct GetCopyStatusRequest {
    pub operation_id: String,
}

#[derive(Debug, Clone)]
pub struct GetCopyStatusResponse {
    pub envelope: Envelope,
    pub phase: String,
    pub rows_copied: i64,
    pub total_rows: i64,
    pub current_table: String,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct TransformDataStreamRequest {
    pub tenant_id: String,
    pub workspace_name: String,
    pub mapping_name: String,
    /// Restrict to one source table; empty streams every grouped pair.
    pub table_name: String,
    pub batch_size: i32,
}

fn copy_event_to_progress(operation_id: Uuid, event: &CopyEvent) -> CopyProgress {
    let mut progress = CopyProgress {
        operation_id: operation_id.to_string(),
        status: WireStatus::Pending as i32,
        ..Default::default()
    };
    match event {
        CopyEvent::TableStarted {
            table, total_rows, ..
        } => {
            progress.phase = "copying".to_string();
            progress.current_table = table.clone();
            progress.total_rows = (*total_rows).max(0);
            progress.message = format!("copying table {table}");
        }
        CopyEvent::BatchApplied {
            table,
            rows_copied,
            total_rows,
            progress_percentage,
        } => {
            progress.phase = "copying".to_string();
            progress.current_table = table.clone();
            progress.rows_copied = *rows_copied;
            progress.total_rows = (*total_rows).max(0);
            progress.progress_percentage = *progress_percentage;
        }
        CopyEvent::TableCompleted {
            table, rows_copied, ..
        } => {
            progress.phase = "copying".to_string();
            progress.current_table = table.clone();
            progress.rows_copied = *rows_copied;
            progress.message = format!("table {table} completed");
        }
        CopyEvent::Finished {
            phase,
            rows_copied,
            errors,
        } => {
            progress.phase = phase.to_string();
            progress.rows_copied = *rows_copied;
            progress.progress_percentage = 100.0;
            progress.errors = errors.clone();
            progress.success = errors.is_empty();
            progress.status = if errors.is_empty() {
                WireStatus::Success as i32
            } else {
                WireStatus::Error as i32
            };
            progress.message = format!("copy {phase}");
        }
    }
    progress
}

pub struct MappingService {
    engine: Arc<Engine>,
}

impl MappingService {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }

    #[tracing::instrument(skip(self), fields(mapping = %req.mapping_name))]
    pub async fn copy_mapping_data(
        &self,
        req: CopyMappingDataRequest,
    ) -> ApiResult<ReceiverStream<Result<CopyProgress, Status>>> {
        let guard = self.engine.track_operation();

        let prepared = self.prepare_copy(&req).await;
        let (pairs, anchor, transformer) = observe(&self.engine, prepared)?;

        let operation_id = Uuid::new_v4();
        self.engine.copy_registry.begin(operation_id);

        let options = CopyOptions {
            batch_size: req.batch_size,
            parallel_workers: if req.parallel_workers <= 0 {
                copy::DEFAULT_PARALLEL_WORKERS
            } else {
                req.parallel_workers
            },
            dry_run: req.dry_run,
        };

        let (tx, rx) = mpsc::channel(16);
        let engine = self.engine.clone();
        tokio::spawn(async move {
            let _guard = guard;
            let (copy_tx, mut copy_rx) = mpsc::channel::<CopyEvent>(16);

            let copy_task = async {
                let result = copy::run_copy(
                    &pairs,
                    &options,
                    &anchor,
                    transformer
                        .as_ref()
                        .map(|t| t as &dyn TransformConnector),
                    &copy_tx,
                )
                .await;
                drop(copy_tx);
                result
            };

            let forward_task = async {
                while let Some(event) = copy_rx.recv().await {
                    engine.copy_registry.record(operation_id, &event);
                    let progress = copy_event_to_progress(operation_id, &event);
                    if tx.send(Ok(progress)).await.is_err() {
                        break;
                    }
                }
            };

            let (result, ()) = tokio::join!(copy_task, forward_task);
            if let Err(err) = result {
                engine.record_error();
                let status = if err.to_string().contains("no mapping rules usable") {
                    Status::failed_precondition("no mapping rules usable")
                } else {
                    Status::internal(format!("data copy failed: {err:#}"))
                };
                let _ = tx.send(Err(status)).await;
            }
        });

        Ok(ReceiverStream::new(rx))
    }

    async fn prepare_copy(
        &self,
        req: &CopyMappingDataRequest,
    ) -> ApiResult<(
        Vec<mappings::TablePair>,
        AnchorConnector,
        Option<TransformationConnector>,
    )> {
        let runtime = self.engine.runtime()?;
        let anchor = AnchorConnector {
            client: runtime.anchor()?.clone(),
        };
        let transformer = runtime
            .transformation
            .clone()
            .map(|client| TransformationConnector { client });

        let pool = self.engine.pool();
        let workspace_id = resolve_workspace(pool, &req.tenant_id, &req.workspace_name).await?;
        let mapping = core_sql::mappings::get_by_name(workspace_id, &req.mapping_name, pool)
            .await
            .map_err(db_error)?
            .ok_or_else(|| {
                Status::not_found(format!("mapping '{}' not found", req.mapping_name))
            })?;

        let rules = core_sql::mappings::rules_for_mapping(mapping.id, pool)
            .await
            .map_err(db_error)?;
        if rules.is_empty() {
            return Err(Status::failed_precondition(format!(
                "mapping '{}' has no rules",
                req.mapping_name
            )));
        }

        let (pairs, warnings) = mappings::group_by_tables(&rules);
        for warning in &warnings {
            tracing::warn!(mapping = %req.mapping_name, "{warning}");
        }
        if pairs.is_empty() {
            return Err(Status::failed_precondition("no mapping rules usable"));
        }

        Ok((pairs, anchor, transformer))
    }

    /// Advisory status of a copy operation, from the in-memory registry.
    pub async fn get_copy_status(&self, req: GetCopyStatusRequest) -> ApiResult<GetCopyStatusResponse> {
        let _guard = self.engine.track_operation();
        let result = self.copy_status_inner(req).await;
        observe(&self.engine, result)
    }

    async fn copy_status_inner(&self, req: GetCopyStatusRequest) -> ApiResult<GetCopyStatusResponse> {
        let operation_id = Uuid::parse_str(&req.operation_id)
            .map_err(|_| Status::invalid_argument("operation_id is not a valid id"))?;

        self.engine.copy_registry.sweep(chrono::Utc::now());

        let status = self
            .engine
            .copy_registry
            .get(operation_id)
            .ok_or_else(|| Status::not_found("copy operation not found or no longer retained"))?;

        Ok(GetCopyStatusResponse {
            envelope: Envelope::ok(proto_redb::Status::Success, "copy status"),
            phase: status.phase,
            rows_copied: status.rows_copied,
            total_rows: status.total_rows,
            current_table: status.current_table,
            errors: status.errors,
        })
    }

    /// Stream a mapping's source tables through their transformations
    /// without writing anywhere: each chunk carries transformed rows.
    #[tracing::instrument(skip(self), fields(mapping = %req.mapping_name))]
    pub async fn transform_data_stream(
        &self,
        req: TransformDataStreamRequest,
    ) -> ApiResult<ReceiverStream<Result<TransformedDataChunk, Status>>> {
        let guard = self.engine.track_operation();

        let prepared = self.prepare_transform(&req).await;
        let (pairs, anchor, transformer) = observe(&self.engine, prepared)?;
        let batch_size = copy::effective_batch_size(req.batch_size);

        let (tx, rx) = mpsc::channel(16);
        let engine = self.engine.clone();
        tokio::spawn(async move {
            let _guard = guard;
            let result = stream_transformed(
                &pairs,
                batch_size,
                &anchor.client,
                transformer
                    .as_ref()
                    .map(|t| t as &dyn TransformConnector),
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

    async fn prepare_transform(
        &self,
        req: &TransformDataStreamRequest,
    ) -> ApiResult<(
        Vec<mappings::TablePair>,
        AnchorConnector,
        Option<TransformationConnector>,
    )> {
        let copy_req = CopyMappingDataRequest {
            tenant_id: req.tenant_id.clone(),
            workspace_name: req.workspace_name.clone(),
            mapping_name: req.mapping_name.clone(),
            ..Default::default()
        };
        let (mut pairs, anchor, transformer) = self.prepare_copy(&copy_req).await?;

        if !req.table_name.is_empty() {
            pairs.retain(|pair| pair.source_table == req.table_name);
            if pairs.is_empty() {
                return Err(Status::not_found(format!(
                    "mapping has no rules for table '{}'",
                    req.table_name
                )));
            }
        }
        Ok((pairs, anchor, transformer))
    }
}

async fn stream_transformed(
    pairs: &[mappings::TablePair],
    batch_size: i32,
    anchor: &gateways::anchor::Client,
    transformer: Option<&dyn TransformConnector>,
    tx: &mpsc::Sender<Result<TransformedDataChunk, Status>>,
) -> ApiResult<()> {
    for pair in pairs {
        let mut upstream = anchor
            .stream_table_data(proto_redb::anchor::StreamTableDataRequest {
                database_id: pair.source_database_id.clone(),
                table_name: pair.source_table.clone(),
                batch_size,
            })
            .await
            .map_err(|err| gateway_error("anchor", err))?;

        while let Some(batch) = upstream.next().await {
            let batch = batch?;

            let mut rows = Vec::with_capacity(batch.rows.len());
            for row in &batch.rows {
                let (row, warnings) =
                    mappings::transform_row(row, &pair.bindings, transformer)
                        .await
                        .map_err(|err| {
                            Status::internal(format!("row transformation failed: {err:#}"))
                        })?;
                for warning in warnings {
                    tracing::warn!(table = %pair.source_table, "{warning}");
                }
                rows.push(row);
            }

            let chunk = TransformedDataChunk {
                current_table: pair.source_key(),
                rows,
                is_final: false,
                status: WireStatus::Pending as i32,
            };
            if tx.send(Ok(chunk)).await.is_err() {
                return Err(Status::cancelled("client went away"));
            }
        }
    }

    let terminal = TransformedDataChunk {
        current_table: String::new(),
        rows: Vec::new(),
        is_final: true,
        status: WireStatus::Success as i32,
    };
    tx.send(Ok(terminal))
        .await
        .map_err(|_| Status::cancelled("client went away"))?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn copy_events_translate_to_wire_progress() {
        let id = Uuid::new_v4();

        let started = copy_event_to_progress(
            id,
            &CopyEvent::TableStarted {
                table: "src.orders".to_string(),
                total_rows: -1,
                tables_done: 0,
                tables_total: 1,
            },
        );
        assert_eq!(started.phase, "copying");
        assert_eq!(started.total_rows, 0); // unknown count never goes negative
        assert_eq!(started.operation_id, id.to_string());

        let finished = copy_event_to_progress(
            id,
            &CopyEvent::Finished {
                phase: "completed",
                rows_copied: 3,
                errors: Vec::new(),
            },
        );
        assert!(finished.success);
        assert_eq!(finished.status, WireStatus::Success as i32);
        assert_eq!(finished.progress_percentage, 100.0);

        let failed = copy_event_to_progress(
            id,
            &CopyEvent::Finished {
                phase: "completed_with_errors",
                rows_copied: 2,
                errors: vec!["src.users: boom".to_string()],
            },
        );
        assert!(!failed.success);
        assert_eq!(failed.status, WireStatus::Error as i32);
    }
}
