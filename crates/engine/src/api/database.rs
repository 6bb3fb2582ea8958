//! Database service: connect (with instance reuse and mesh-ordered
//! broadcasts), disconnect, and clone.

use std::sync::Arc;

use tonic::Status;
use uuid::Uuid;

use super::{observe, Envelope};
use crate::clone::{self, CloneOptions, CloneRequest, CloneTarget};
use crate::engine::Engine;
use crate::registry::resolve_workspace;
use crate::sync::UserDataEvent;
use crate::{db_error, gateway_error, ApiResult};
use core_sql::databases::{self, Database, DatabaseUpdate, NewDatabase};
use core_sql::instances::{self, Instance, InstanceUpdate, NewInstance};
use core_sql::Status as RowStatus;
use proto_redb::anchor;

#[derive(Debug, Clone, Default)]
pub struct ConnectDatabaseRequest {
    pub tenant_id: String,
    pub workspace_name: String,
    pub name: String,
    pub db_type: String,
    pub vendor: String,
    pub host: String,
    pub port: i32,
    pub username: String,
    pub password: String,
    pub database_name: String,
    pub environment: String,
}

#[derive(Debug, Clone)]
pub struct ConnectDatabaseResponse {
    pub envelope: Envelope,
    pub database_id: Uuid,
    pub instance_id: Uuid,
    pub instance_reused: bool,
}

#[derive(Debug, Clone, Default)]
pub struct DisconnectDatabaseRequest {
    pub tenant_id: String,
    pub workspace_name: String,
    pub database_name: String,
}

#[derive(Debug, Clone, Default)]
pub struct CloneDatabaseRequest {
    pub tenant_id: String,
    pub workspace_name: String,
    pub source_database_name: String,
    /// Set to create the target on this instance; leave empty to use
    /// `existing_database_name`.
    pub target_instance_name: String,
    pub target_database_name: String,
    pub existing_database_name: String,
    pub wipe: bool,
    pub with_data: bool,
}

#[derive(Debug, Clone)]
pub struct CloneDatabaseResponse {
    pub envelope: Envelope,
    pub target_database_id: Option<Uuid>,
    pub rows_copied: i64,
    pub warnings: Vec<String>,
    pub repo_id: Option<Uuid>,
    pub branch_id: Option<Uuid>,
    pub commit_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default)]
pub struct FetchTableDataRequest {
    pub tenant_id: String,
    pub workspace_name: String,
    pub database_name: String,
    pub table_name: String,
    pub page: i64,
    pub page_size: i64,
}

#[derive(Debug, Clone)]
pub struct FetchTableDataResponse {
    pub envelope: Envelope,
    /// JSON object document per row.
    pub rows: Vec<String>,
    pub page: i64,
    pub page_size: i64,
    pub total_pages: i64,
}

/// Broadcast payload of an instance row. Credentials stay sealed.
fn instance_record(instance: &Instance) -> String {
    serde_json::json!({
        "id": instance.id,
        "tenant_id": instance.tenant_id,
        "workspace_id": instance.workspace_id,
        "name": instance.name,
        "instance_type": instance.instance_type,
        "vendor": instance.vendor,
        "host": instance.host,
        "port": instance.port,
        "username": instance.username,
        "password_sealed": instance.password_sealed,
        "connected_to_node_id": instance.connected_to_node_id,
        "environment": instance.environment,
        "status": instance.status,
    })
    .to_string()
}

fn database_record(database: &Database) -> String {
    serde_json::json!({
        "id": database.id,
        "tenant_id": database.tenant_id,
        "workspace_id": database.workspace_id,
        "instance_id": database.instance_id,
        "name": database.name,
        "db_type": database.db_type,
        "vendor": database.vendor,
        "username": database.username,
        "password_sealed": database.password_sealed,
        "environment": database.environment,
        "status": database.status,
    })
    .to_string()
}

pub struct DatabaseService {
    engine: Arc<Engine>,
}

impl DatabaseService {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }

    /// Connect a database, reusing an existing instance when `(host, port,
    /// node)` matches. A freshly-created instance is broadcast
    /// synchronously before the database row: the FK parent must land on
    /// peers first, and the child broadcast is suppressed if it does not.
    #[tracing::instrument(skip(self, req), fields(database = %req.name))]
    pub async fn connect_database(
        &self,
        req: ConnectDatabaseRequest,
    ) -> ApiResult<ConnectDatabaseResponse> {
        let _guard = self.engine.track_operation();
        let result = self.connect_inner(req).await;
        observe(&self.engine, result)
    }

    async fn connect_inner(
        &self,
        req: ConnectDatabaseRequest,
    ) -> ApiResult<ConnectDatabaseResponse> {
        if req.name.is_empty() || req.host.is_empty() || req.db_type.is_empty() {
            return Err(Status::invalid_argument(
                "name, host, and db_type are required",
            ));
        }

        let pool = self.engine.pool();
        let runtime = self.engine.runtime()?;
        let anchor_client = runtime.anchor()?;
        let node_id = runtime.node_id.unwrap_or(0);

        let workspace_id = resolve_workspace(pool, &req.tenant_id, &req.workspace_name).await?;

        let password_sealed = self
            .engine
            .sealer()
            .seal(&req.password)
            .map_err(|err| Status::internal(format!("failed to seal credential: {err}")))?;

        // Reuse an instance of the same (host, port, node) when one exists.
        let existing = instances::find_reusable(
            &req.tenant_id,
            workspace_id,
            &req.host,
            req.port,
            node_id,
            pool,
        )
        .await
        .map_err(db_error)?;
        let instance_reused = existing.is_some();

        let instance = match existing {
            Some(instance) => instance,
            None => {
                let instance = instances::create(
                    NewInstance {
                        tenant_id: &req.tenant_id,
                        workspace_id,
                        name: &format!("{}-instance", req.name),
                        instance_type: &req.db_type,
                        vendor: &req.vendor,
                        host: &req.host,
                        port: req.port,
                        username: &req.username,
                        password_sealed: &password_sealed,
                        connected_to_node_id: node_id,
                        environment: &req.environment,
                    },
                    pool,
                )
                .await
                .map_err(db_error)?;

                let config = serde_json::json!({
                    "host": req.host,
                    "port": req.port,
                    "username": req.username,
                    "password": req.password,
                    "instance_type": req.db_type,
                });
                anchor_client
                    .connect_instance(anchor::ConnectInstanceRequest {
                        instance_id: instance.id.to_string(),
                        config: config.to_string(),
                    })
                    .await
                    .map_err(|err| gateway_error("anchor", err))?;

                instances::update(
                    instance.id,
                    InstanceUpdate {
                        status: Some(RowStatus::Connected),
                        ..Default::default()
                    },
                    pool,
                )
                .await
                .map_err(db_error)?
                .ok_or_else(|| Status::internal("created instance disappeared"))?
            }
        };

        let database_name = if req.database_name.is_empty() {
            req.name.clone()
        } else {
            req.database_name.clone()
        };

        let database = databases::create(
            NewDatabase {
                tenant_id: &req.tenant_id,
                workspace_id,
                instance_id: instance.id,
                name: &req.name,
                db_type: &req.db_type,
                vendor: &req.vendor,
                username: &req.username,
                password_sealed: &password_sealed,
                environment: &req.environment,
            },
            pool,
        )
        .await
        .map_err(db_error)?;

        let config = serde_json::json!({
            "host": req.host,
            "port": req.port,
            "username": req.username,
            "password": req.password,
            "database_name": database_name,
            "db_type": req.db_type,
        });
        anchor_client
            .connect_database(anchor::ConnectDatabaseRequest {
                database_id: database.id.to_string(),
                config: config.to_string(),
            })
            .await
            .map_err(|err| gateway_error("anchor", err))?;

        let database = databases::update(
            database.id,
            DatabaseUpdate {
                status: Some(RowStatus::Connected),
                ..Default::default()
            },
            pool,
        )
        .await
        .map_err(db_error)?
        .ok_or_else(|| Status::internal("created database disappeared"))?;

        // FK ordering: a fresh instance row broadcasts synchronously first;
        // its failure suppresses the database broadcast.
        let mut broadcast_child = true;
        if !instance_reused {
            let parent = runtime
                .sync
                .broadcast_user_data_sync(UserDataEvent {
                    table: "instances".to_string(),
                    operation: "INSERT".to_string(),
                    record: instance_record(&instance),
                    primary_key: instance.id.to_string(),
                })
                .await;
            if let Err(err) = parent {
                tracing::warn!(error = %format!("{err:#}"),
                    "instance broadcast failed; suppressing database broadcast");
                broadcast_child = false;
            }
        }
        if broadcast_child {
            runtime.sync.broadcast_user_data(UserDataEvent {
                table: "databases".to_string(),
                operation: "INSERT".to_string(),
                record: database_record(&database),
                primary_key: database.id.to_string(),
            });
        }

        Ok(ConnectDatabaseResponse {
            envelope: Envelope::ok(
                proto_redb::Status::Connected,
                format!("database '{}' connected", database.name),
            ),
            database_id: database.id,
            instance_id: instance.id,
            instance_reused,
        })
    }

    #[tracing::instrument(skip(self), fields(database = %req.database_name))]
    pub async fn disconnect_database(&self, req: DisconnectDatabaseRequest) -> ApiResult<Envelope> {
        let _guard = self.engine.track_operation();
        let result = self.disconnect_inner(req).await;
        observe(&self.engine, result)
    }

    async fn disconnect_inner(&self, req: DisconnectDatabaseRequest) -> ApiResult<Envelope> {
        let pool = self.engine.pool();
        let runtime = self.engine.runtime()?;

        let workspace_id = resolve_workspace(pool, &req.tenant_id, &req.workspace_name).await?;
        let database = databases::get_by_name(workspace_id, &req.database_name, pool)
            .await
            .map_err(db_error)?
            .ok_or_else(|| {
                Status::not_found(format!("database '{}' not found", req.database_name))
            })?;

        runtime
            .anchor()?
            .disconnect_database(anchor::DisconnectDatabaseRequest {
                database_id: database.id.to_string(),
            })
            .await
            .map_err(|err| gateway_error("anchor", err))?;

        let database = databases::update(
            database.id,
            DatabaseUpdate {
                status: Some(RowStatus::Disconnected),
                ..Default::default()
            },
            pool,
        )
        .await
        .map_err(db_error)?
        .ok_or_else(|| Status::not_found("database disappeared during disconnect"))?;

        runtime.sync.broadcast_user_data(UserDataEvent {
            table: "databases".to_string(),
            operation: "UPDATE".to_string(),
            record: database_record(&database),
            primary_key: database.id.to_string(),
        });

        Ok(Envelope::ok(
            proto_redb::Status::Disconnected,
            format!("database '{}' disconnected", database.name),
        ))
    }

    /// Page through a table's rows via Anchor. `total_pages` comes from the
    /// table's true row count when the probe succeeds, and falls back to
    /// the size of the current page when it does not.
    #[tracing::instrument(skip(self), fields(database = %req.database_name, table = %req.table_name))]
    pub async fn fetch_table_data(
        &self,
        req: FetchTableDataRequest,
    ) -> ApiResult<FetchTableDataResponse> {
        let _guard = self.engine.track_operation();
        let result = self.fetch_table_inner(req).await;
        observe(&self.engine, result)
    }

    async fn fetch_table_inner(
        &self,
        req: FetchTableDataRequest,
    ) -> ApiResult<FetchTableDataResponse> {
        if req.table_name.is_empty() {
            return Err(Status::invalid_argument("table_name is required"));
        }

        let pool = self.engine.pool();
        let runtime = self.engine.runtime()?;
        let anchor_client = runtime.anchor()?;

        let workspace_id = resolve_workspace(pool, &req.tenant_id, &req.workspace_name).await?;
        let database = databases::get_by_name(workspace_id, &req.database_name, pool)
            .await
            .map_err(db_error)?
            .ok_or_else(|| {
                Status::not_found(format!("database '{}' not found", req.database_name))
            })?;

        let (limit, offset) = crate::registry::pagination(req.page, req.page_size);

        let fetched = anchor_client
            .fetch_data(anchor::FetchDataRequest {
                database_id: database.id.to_string(),
                table_name: req.table_name.clone(),
                columns: Vec::new(),
                limit,
                offset,
            })
            .await
            .map_err(|err| gateway_error("anchor", err))?;

        let total_rows = match anchor_client
            .get_table_row_count(anchor::GetTableRowCountRequest {
                database_id: database.id.to_string(),
                table_name: req.table_name.clone(),
            })
            .await
        {
            Ok(resp) => Some(resp.count),
            Err(err) => {
                tracing::debug!(error = %err, "row-count probe failed; total_pages is approximate");
                None
            }
        };
        let counted = total_rows.unwrap_or(fetched.rows.len() as i64);
        let total_pages = (counted + limit - 1) / limit;

        Ok(FetchTableDataResponse {
            envelope: Envelope::ok(
                proto_redb::Status::Success,
                format!("{} rows", fetched.rows.len()),
            ),
            rows: fetched.rows,
            page: offset / limit + 1,
            page_size: limit,
            total_pages: total_pages.max(1),
        })
    }

    #[tracing::instrument(skip(self), fields(source = %req.source_database_name))]
    pub async fn clone_database(
        &self,
        req: CloneDatabaseRequest,
    ) -> ApiResult<CloneDatabaseResponse> {
        let _guard = self.engine.track_operation();
        let result = self.clone_inner(req).await;
        observe(&self.engine, result)
    }

    async fn clone_inner(&self, req: CloneDatabaseRequest) -> ApiResult<CloneDatabaseResponse> {
        let runtime = self.engine.runtime()?;
        let anchor_client = runtime.anchor()?;
        let translator = runtime
            .unified_model
            .clone()
            .map(|client| crate::connectors::UnifiedModelConnector { client });

        let target = if !req.target_instance_name.is_empty() {
            if req.target_database_name.is_empty() {
                return Err(Status::invalid_argument(
                    "target_database_name is required with target_instance_name",
                ));
            }
            CloneTarget::New {
                instance_name: req.target_instance_name.clone(),
                database_name: req.target_database_name.clone(),
            }
        } else if !req.existing_database_name.is_empty() {
            CloneTarget::Existing {
                database_name: req.existing_database_name.clone(),
            }
        } else {
            return Err(Status::invalid_argument(
                "either a target instance or an existing database is required",
            ));
        };

        let outcome = clone::clone_database(
            self.engine.pool(),
            anchor_client,
            translator
                .as_ref()
                .map(|t| t as &dyn crate::connectors::TranslateConnector),
            self.engine.sealer(),
            CloneRequest {
                tenant_id: req.tenant_id,
                workspace_name: req.workspace_name,
                source_database_name: req.source_database_name,
                target,
                options: CloneOptions {
                    wipe: req.wipe,
                    with_data: req.with_data,
                },
            },
        )
        .await?;

        Ok(CloneDatabaseResponse {
            envelope: Envelope::ok(proto_redb::Status::Created, "database cloned"),
            target_database_id: outcome.target_database_id,
            rows_copied: outcome.rows_copied,
            warnings: outcome.warnings,
            repo_id: outcome.repo_id,
            branch_id: outcome.branch_id,
            commit_id: outcome.commit_id,
        })
    }
}
