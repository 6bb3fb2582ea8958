use chrono::{DateTime, Utc};
use sqlx::types::Uuid;

use crate::Status;

/// Instance is a connection to a logical database server. Instances are
/// reused across databases: `(tenant, workspace, host, port, node)`
/// identifies a reusable instance.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Instance {
    pub id: Uuid,
    pub tenant_id: String,
    pub workspace_id: Uuid,
    pub name: String,
    pub instance_type: String,
    pub vendor: String,
    pub host: String,
    pub port: i32,
    pub username: String,
    /// Sealed with `crypto::Sealer`; never plaintext at rest.
    pub password_sealed: String,
    pub connected_to_node_id: i64,
    pub environment: String,
    pub enabled: bool,
    pub status: Status,
    pub status_message: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

const COLUMNS: &str = "id, tenant_id, workspace_id, name, instance_type, vendor, host, port, \
     username, password_sealed, connected_to_node_id, environment, enabled, status, \
     status_message, created, updated";

pub async fn get_by_id(
    id: Uuid,
    db: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
) -> sqlx::Result<Option<Instance>> {
    sqlx::query_as::<_, Instance>(&format!("select {COLUMNS} from instances where id = $1"))
        .bind(id)
        .fetch_optional(db)
        .await
}

pub async fn get_by_name(
    workspace_id: Uuid,
    name: &str,
    db: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
) -> sqlx::Result<Option<Instance>> {
    sqlx::query_as::<_, Instance>(&format!(
        "select {COLUMNS} from instances where workspace_id = $1 and name = $2"
    ))
    .bind(workspace_id)
    .bind(name)
    .fetch_optional(db)
    .await
}

pub async fn list(
    workspace_id: Uuid,
    db: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
) -> sqlx::Result<Vec<Instance>> {
    sqlx::query_as::<_, Instance>(&format!(
        "select {COLUMNS} from instances where workspace_id = $1 order by created desc"
    ))
    .bind(workspace_id)
    .fetch_all(db)
    .await
}

/// Find an existing instance this connection can reuse. Reuse is keyed by
/// `(host, port, connected_to_node_id)` within the workspace.
pub async fn find_reusable(
    tenant_id: &str,
    workspace_id: Uuid,
    host: &str,
    port: i32,
    connected_to_node_id: i64,
    db: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
) -> sqlx::Result<Option<Instance>> {
    sqlx::query_as::<_, Instance>(&format!(
        "select {COLUMNS} from instances
         where tenant_id = $1 and workspace_id = $2
           and host = $3 and port = $4 and connected_to_node_id = $5"
    ))
    .bind(tenant_id)
    .bind(workspace_id)
    .bind(host)
    .bind(port)
    .bind(connected_to_node_id)
    .fetch_optional(db)
    .await
}

pub struct NewInstance<'a> {
    pub tenant_id: &'a str,
    pub workspace_id: Uuid,
    pub name: &'a str,
    pub instance_type: &'a str,
    pub vendor: &'a str,
    pub host: &'a str,
    pub port: i32,
    pub username: &'a str,
    pub password_sealed: &'a str,
    pub connected_to_node_id: i64,
    pub environment: &'a str,
}

pub async fn create(
    new: NewInstance<'_>,
    db: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
) -> sqlx::Result<Instance> {
    sqlx::query_as::<_, Instance>(&format!(
        "insert into instances (id, tenant_id, workspace_id, name, instance_type, vendor,
                                host, port, username, password_sealed, connected_to_node_id,
                                environment, enabled, status, status_message)
         values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, true, 'STATUS_CREATED', '')
         returning {COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(new.tenant_id)
    .bind(new.workspace_id)
    .bind(new.name)
    .bind(new.instance_type)
    .bind(new.vendor)
    .bind(new.host)
    .bind(new.port)
    .bind(new.username)
    .bind(new.password_sealed)
    .bind(new.connected_to_node_id)
    .bind(new.environment)
    .fetch_one(db)
    .await
}

#[derive(Debug, Default, Clone)]
pub struct InstanceUpdate {
    pub name: Option<String>,
    pub username: Option<String>,
    pub password_sealed: Option<String>,
    pub environment: Option<String>,
    pub enabled: Option<bool>,
    pub status: Option<Status>,
    pub status_message: Option<String>,
}

pub async fn update(
    id: Uuid,
    update: InstanceUpdate,
    db: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
) -> sqlx::Result<Option<Instance>> {
    let mut builder = sqlx::QueryBuilder::new("update instances set updated = now()");
    if let Some(name) = update.name {
        builder.push(", name = ").push_bind(name);
    }
    if let Some(username) = update.username {
        builder.push(", username = ").push_bind(username);
    }
    if let Some(password_sealed) = update.password_sealed {
        builder.push(", password_sealed = ").push_bind(password_sealed);
    }
    if let Some(environment) = update.environment {
        builder.push(", environment = ").push_bind(environment);
    }
    if let Some(enabled) = update.enabled {
        builder.push(", enabled = ").push_bind(enabled);
    }
    if let Some(status) = update.status {
        builder.push(", status = ").push_bind(status);
    }
    if let Some(status_message) = update.status_message {
        builder
            .push(", status_message = ")
            .push_bind(crate::clamp_status_message(&status_message));
    }
    builder.push(" where id = ").push_bind(id);
    builder.push(format!(" returning {COLUMNS}"));

    builder.build_query_as::<Instance>().fetch_optional(db).await
}

/// Delete an instance. Databases referencing it block the delete unless
/// `force` removes them first.
pub async fn delete(
    id: Uuid,
    force: bool,
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
) -> sqlx::Result<u64> {
    if force {
        sqlx::query("delete from databases where instance_id = $1")
            .bind(id)
            .execute(&mut **txn)
            .await?;
    }
    let done = sqlx::query("delete from instances where id = $1")
        .bind(id)
        .execute(&mut **txn)
        .await?;
    Ok(done.rows_affected())
}
