//! The clone/deploy orchestrator: schema extract, cross-dialect translate,
//! target create, deploy, optional data copy, and the wait for
//! anchor-driven discovery of the deployed schema.

use serde_json::Value;
use sqlx::PgPool;
use std::time::Duration;
use tonic::Status;
use uuid::Uuid;

use crate::connectors::TranslateConnector;
use crate::registry::resolve_workspace;
use crate::{db_error, gateway_error, ApiResult};
use core_sql::crypto::Sealer;
use core_sql::databases::{self, Database, DatabaseUpdate, NewDatabase};
use core_sql::Status as RowStatus;
use proto_redb::anchor;

pub const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(60);
pub const DISCOVERY_INTERVAL: Duration = Duration::from_secs(2);

/// Poll attempts the discovery loop makes before giving up.
pub fn discovery_attempts() -> u32 {
    (DISCOVERY_TIMEOUT.as_secs() / DISCOVERY_INTERVAL.as_secs()) as u32
}

/// Where the clone lands: a database created on a named instance, or one
/// that already exists.
#[derive(Debug, Clone)]
pub enum CloneTarget {
    New {
        instance_name: String,
        database_name: String,
    },
    Existing {
        database_name: String,
    },
}

#[derive(Debug, Clone, Default)]
pub struct CloneOptions {
    pub wipe: bool,
    pub with_data: bool,
}

pub struct CloneRequest {
    pub tenant_id: String,
    pub workspace_name: String,
    pub source_database_name: String,
    pub target: CloneTarget,
    pub options: CloneOptions,
}

#[derive(Debug, Default)]
pub struct CloneOutcome {
    pub target_database_id: Option<Uuid>,
    pub rows_copied: i64,
    pub warnings: Vec<String>,
    pub repo_id: Option<Uuid>,
    pub branch_id: Option<Uuid>,
    pub commit_id: Option<Uuid>,
}

/// Table names out of a cached tables document. Accepts both the bare
/// array form and the `{"tables": [...]}` wrapper; elements may be plain
/// strings or objects with a `name` field.
pub fn table_names_from_tables_doc(doc: &str) -> Vec<String> {
    let parsed: Value = match serde_json::from_str(doc) {
        Ok(value) => value,
        Err(_) => return Vec::new(),
    };
    let list = match &parsed {
        Value::Array(items) => items.as_slice(),
        Value::Object(map) => match map.get("tables") {
            Some(Value::Array(items)) => items.as_slice(),
            _ => return Vec::new(),
        },
        _ => return Vec::new(),
    };

    list.iter()
        .filter_map(|item| match item {
            Value::String(name) => Some(name.clone()),
            Value::Object(map) => map
                .get("name")
                .and_then(Value::as_str)
                .map(str::to_string),
            _ => None,
        })
        .collect()
}

/// An empty or absent schema document cannot be cloned.
pub fn schema_is_empty(doc: &str) -> bool {
    match serde_json::from_str::<Value>(doc) {
        Ok(Value::Object(map)) => map.is_empty(),
        Ok(Value::Null) => true,
        Ok(_) => false,
        Err(_) => true,
    }
}

pub async fn clone_database(
    pool: &PgPool,
    anchor: &gateways::anchor::Client,
    translator: Option<&dyn TranslateConnector>,
    sealer: &Sealer,
    req: CloneRequest,
) -> ApiResult<CloneOutcome> {
    let workspace_id = resolve_workspace(pool, &req.tenant_id, &req.workspace_name).await?;

    let source = databases::get_by_name(workspace_id, &req.source_database_name, pool)
        .await
        .map_err(db_error)?
        .ok_or_else(|| {
            Status::not_found(format!(
                "source database '{}' not found",
                req.source_database_name
            ))
        })?;
    if source.status != RowStatus::Connected {
        return Err(Status::failed_precondition(format!(
            "source database '{}' is not connected",
            source.name
        )));
    }
    if schema_is_empty(source.schema.get()) {
        return Err(Status::failed_precondition(format!(
            "source database '{}' has no stored schema to clone",
            source.name
        )));
    }

    let mut outcome = CloneOutcome::default();

    let target = match &req.target {
        CloneTarget::New {
            instance_name,
            database_name,
        } => {
            create_target_database(
                pool,
                anchor,
                sealer,
                &req.tenant_id,
                workspace_id,
                &source,
                instance_name,
                database_name,
            )
            .await?
        }
        CloneTarget::Existing { database_name } => {
            let target = databases::get_by_name(workspace_id, database_name, pool)
                .await
                .map_err(db_error)?
                .ok_or_else(|| {
                    Status::not_found(format!("target database '{database_name}' not found"))
                })?;
            if target.status != RowStatus::Connected {
                return Err(Status::failed_precondition(format!(
                    "target database '{database_name}' is not connected"
                )));
            }
            target
        }
    };
    outcome.target_database_id = Some(target.id);

    // Translate iff the dialects differ; a nil structure is a hard failure.
    let schema = if source.db_type != target.db_type {
        let translator = translator
            .ok_or_else(|| Status::unavailable("unifiedmodel service is not available"))?;
        let (structure, warnings) = translator
            .translate(&source.db_type, &target.db_type, source.schema.get())
            .await
            .map_err(|err| Status::internal(format!("schema translation failed: {err:#}")))?;
        outcome.warnings.extend(warnings);
        structure
    } else {
        source.schema.get().to_string()
    };

    if req.options.wipe {
        anchor
            .wipe_database(anchor::WipeDatabaseRequest {
                database_id: target.id.to_string(),
            })
            .await
            .map_err(|err| gateway_error("anchor", err))?;
    }

    anchor
        .deploy_database_schema(anchor::DeployDatabaseSchemaRequest {
            database_id: target.id.to_string(),
            schema: schema.clone(),
        })
        .await
        .map_err(|err| gateway_error("anchor", err))?;

    databases::update(
        target.id,
        DatabaseUpdate {
            schema: Some(core_sql::json_or_empty(&schema)),
            ..Default::default()
        },
        pool,
    )
    .await
    .map_err(db_error)?;

    if req.options.with_data {
        outcome.rows_copied =
            copy_source_tables(anchor, &source, target.id, &mut outcome.warnings).await;
    }

    // Wait for anchor-driven discovery to commit the deployed schema.
    match wait_for_discovery(pool, target.id).await? {
        Some((repo_id, branch_id, commit_id)) => {
            outcome.repo_id = Some(repo_id);
            outcome.branch_id = Some(branch_id);
            outcome.commit_id = Some(commit_id);
        }
        None => {
            outcome.warnings.push(format!(
                "schema discovery did not complete within {}s; repo ids are not yet available",
                DISCOVERY_TIMEOUT.as_secs()
            ));
        }
    }

    Ok(outcome)
}

/// Resolve the instance and create the core-side record plus the physical
/// database. The instance's sealed password is copied onto the record
/// post-create, so it is never re-sealed.
#[allow(clippy::too_many_arguments)]
async fn create_target_database(
    pool: &PgPool,
    anchor: &gateways::anchor::Client,
    sealer: &Sealer,
    tenant_id: &str,
    workspace_id: Uuid,
    source: &Database,
    instance_name: &str,
    database_name: &str,
) -> ApiResult<Database> {
    let instance = core_sql::instances::get_by_name(workspace_id, instance_name, pool)
        .await
        .map_err(db_error)?
        .ok_or_else(|| Status::not_found(format!("instance '{instance_name}' not found")))?;
    if instance.status != RowStatus::Connected {
        return Err(Status::failed_precondition(format!(
            "instance '{instance_name}' is not connected"
        )));
    }

    let target = databases::create(
        NewDatabase {
            tenant_id,
            workspace_id,
            instance_id: instance.id,
            name: database_name,
            db_type: &source.db_type,
            vendor: &instance.vendor,
            username: &instance.username,
            password_sealed: "",
            environment: &source.environment,
        },
        pool,
    )
    .await
    .map_err(db_error)?;

    let target = databases::update(
        target.id,
        DatabaseUpdate {
            password_sealed: Some(instance.password_sealed.clone()),
            ..Default::default()
        },
        pool,
    )
    .await
    .map_err(db_error)?
    .ok_or_else(|| Status::internal("created database disappeared"))?;

    anchor
        .create_database(anchor::CreateDatabaseRequest {
            instance_id: instance.id.to_string(),
            database_id: target.id.to_string(),
            database_name: database_name.to_string(),
        })
        .await
        .map_err(|err| gateway_error("anchor", err))?;

    let password = sealer
        .unseal(&instance.password_sealed)
        .map_err(|err| Status::internal(format!("failed to unseal instance credential: {err}")))?;
    let config = serde_json::json!({
        "host": instance.host,
        "port": instance.port,
        "username": instance.username,
        "password": password,
        "database_name": database_name,
        "db_type": source.db_type,
    });

    anchor
        .connect_database(anchor::ConnectDatabaseRequest {
            database_id: target.id.to_string(),
            config: config.to_string(),
        })
        .await
        .map_err(|err| gateway_error("anchor", err))?;

    databases::update(
        target.id,
        DatabaseUpdate {
            status: Some(RowStatus::Connected),
            ..Default::default()
        },
        pool,
    )
    .await
    .map_err(db_error)?
    .ok_or_else(|| Status::internal("created database disappeared"))
}

/// Copy every cached source table through Anchor. Per-table failures are
/// warnings, not fatal.
async fn copy_source_tables(
    anchor: &gateways::anchor::Client,
    source: &Database,
    target_id: Uuid,
    warnings: &mut Vec<String>,
) -> i64 {
    let mut rows_copied = 0i64;

    for table in table_names_from_tables_doc(source.tables.get()) {
        let fetched = match anchor
            .fetch_data(anchor::FetchDataRequest {
                database_id: source.id.to_string(),
                table_name: table.clone(),
                columns: Vec::new(),
                limit: 0,
                offset: 0,
            })
            .await
        {
            Ok(resp) => resp.rows,
            Err(err) => {
                tracing::warn!(table = %table, error = %err, "failed to fetch table during clone");
                warnings.push(format!("table '{table}': fetch failed: {err}"));
                continue;
            }
        };

        match anchor
            .insert_data(anchor::InsertDataRequest {
                database_id: target_id.to_string(),
                table_name: table.clone(),
                rows: fetched,
            })
            .await
        {
            Ok(resp) => rows_copied += resp.rows_affected,
            Err(err) => {
                tracing::warn!(table = %table, error = %err, "failed to insert table during clone");
                warnings.push(format!("table '{table}': insert failed: {err}"));
            }
        }
    }

    rows_copied
}

/// Poll until a repo and branch exist for the database and the branch has
/// at least one commit, or the discovery window lapses.
async fn wait_for_discovery(
    pool: &PgPool,
    database_id: Uuid,
) -> ApiResult<Option<(Uuid, Uuid, Uuid)>> {
    for _ in 0..discovery_attempts() {
        if let Some((repo, branch)) =
            core_sql::repos::find_repo_and_branch_by_database_id(database_id, pool)
                .await
                .map_err(db_error)?
        {
            if let Some(head) = core_sql::commits::head(branch.id, pool)
                .await
                .map_err(db_error)?
            {
                return Ok(Some((repo.id, branch.id, head.id)));
            }
        }
        tokio::time::sleep(DISCOVERY_INTERVAL).await;
    }
    Ok(None)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn discovery_schedule_covers_the_window() {
        assert_eq!(discovery_attempts(), 30);
        assert_eq!(
            discovery_attempts() as u64 * DISCOVERY_INTERVAL.as_secs(),
            DISCOVERY_TIMEOUT.as_secs()
        );
    }

    #[test]
    fn table_names_accept_both_document_shapes() {
        assert_eq!(
            table_names_from_tables_doc(r#"{"tables": [{"name": "users"}, {"name": "orders"}]}"#),
            vec!["users", "orders"]
        );
        assert_eq!(
            table_names_from_tables_doc(r#"["users", "orders"]"#),
            vec!["users", "orders"]
        );
        assert_eq!(
            table_names_from_tables_doc(r#"{"tables": [{"name": "users"}, 42]}"#),
            vec!["users"]
        );
        assert!(table_names_from_tables_doc("{}").is_empty());
        assert!(table_names_from_tables_doc("garbage").is_empty());
    }

    #[test]
    fn empty_schema_detection() {
        assert!(schema_is_empty("{}"));
        assert!(schema_is_empty("null"));
        assert!(schema_is_empty("not json"));
        assert!(!schema_is_empty(r#"{"tables": []}"#));
    }
}
