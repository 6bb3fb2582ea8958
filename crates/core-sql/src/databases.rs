use chrono::{DateTime, Utc};
use sqlx::types::Uuid;

use crate::{Json, Status};

/// Database is a connection to a named database inside an instance. The
/// stored schema and table list are opaque JSON caches refreshed by
/// anchor-driven discovery.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Database {
    pub id: Uuid,
    pub tenant_id: String,
    pub workspace_id: Uuid,
    pub instance_id: Uuid,
    pub name: String,
    pub db_type: String,
    pub vendor: String,
    pub username: String,
    pub password_sealed: String,
    pub schema: Json,
    pub tables: Json,
    pub environment: String,
    pub enabled: bool,
    pub status: Status,
    pub status_message: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

const COLUMNS: &str = "id, tenant_id, workspace_id, instance_id, name, db_type, vendor, \
     username, password_sealed, schema, tables, environment, enabled, status, status_message, \
     created, updated";

pub async fn get_by_id(
    id: Uuid,
    db: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
) -> sqlx::Result<Option<Database>> {
    sqlx::query_as::<_, Database>(&format!("select {COLUMNS} from databases where id = $1"))
        .bind(id)
        .fetch_optional(db)
        .await
}

pub async fn get_by_name(
    workspace_id: Uuid,
    name: &str,
    db: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
) -> sqlx::Result<Option<Database>> {
    sqlx::query_as::<_, Database>(&format!(
        "select {COLUMNS} from databases where workspace_id = $1 and name = $2"
    ))
    .bind(workspace_id)
    .bind(name)
    .fetch_optional(db)
    .await
}

pub async fn list(
    workspace_id: Uuid,
    db: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
) -> sqlx::Result<Vec<Database>> {
    sqlx::query_as::<_, Database>(&format!(
        "select {COLUMNS} from databases where workspace_id = $1 order by created desc"
    ))
    .bind(workspace_id)
    .fetch_all(db)
    .await
}

pub async fn list_by_instance(
    instance_id: Uuid,
    db: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
) -> sqlx::Result<Vec<Database>> {
    sqlx::query_as::<_, Database>(&format!(
        "select {COLUMNS} from databases where instance_id = $1 order by created desc"
    ))
    .bind(instance_id)
    .fetch_all(db)
    .await
}

pub struct NewDatabase<'a> {
    pub tenant_id: &'a str,
    pub workspace_id: Uuid,
    pub instance_id: Uuid,
    pub name: &'a str,
    pub db_type: &'a str,
    pub vendor: &'a str,
    pub username: &'a str,
    pub password_sealed: &'a str,
    pub environment: &'a str,
}

pub async fn create(
    new: NewDatabase<'_>,
    db: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
) -> sqlx::Result<Database> {
    sqlx::query_as::<_, Database>(&format!(
        "insert into databases (id, tenant_id, workspace_id, instance_id, name, db_type,
                                vendor, username, password_sealed, schema, tables,
                                environment, enabled, status, status_message)
         values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, true, 'STATUS_CREATED', '')
         returning {COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(new.tenant_id)
    .bind(new.workspace_id)
    .bind(new.instance_id)
    .bind(new.name)
    .bind(new.db_type)
    .bind(new.vendor)
    .bind(new.username)
    .bind(new.password_sealed)
    .bind(crate::empty_json())
    .bind(crate::empty_json())
    .bind(new.environment)
    .fetch_one(db)
    .await
}

#[derive(Debug, Default, Clone)]
pub struct DatabaseUpdate {
    pub name: Option<String>,
    pub username: Option<String>,
    pub password_sealed: Option<String>,
    pub schema: Option<Json>,
    pub tables: Option<Json>,
    pub environment: Option<String>,
    pub enabled: Option<bool>,
    pub status: Option<Status>,
    pub status_message: Option<String>,
}

pub async fn update(
    id: Uuid,
    update: DatabaseUpdate,
    db: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
) -> sqlx::Result<Option<Database>> {
    let mut builder = sqlx::QueryBuilder::new("update databases set updated = now()");
    if let Some(name) = update.name {
        builder.push(", name = ").push_bind(name);
    }
    if let Some(username) = update.username {
        builder.push(", username = ").push_bind(username);
    }
    if let Some(password_sealed) = update.password_sealed {
        builder.push(", password_sealed = ").push_bind(password_sealed);
    }
    if let Some(schema) = update.schema {
        builder.push(", schema = ").push_bind(schema);
    }
    if let Some(tables) = update.tables {
        builder.push(", tables = ").push_bind(tables);
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

    builder.build_query_as::<Database>().fetch_optional(db).await
}

/// Delete a database. Referencing rows (relationships, branch attachments)
/// block the delete unless `force` clears them first.
pub async fn delete(
    id: Uuid,
    force: bool,
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
) -> sqlx::Result<u64> {
    if force {
        for statement in [
            "update branches set connected_database_id = null where connected_database_id = $1",
            "delete from relationships where source_database_id = $1 or target_database_id = $1",
            "delete from replication_sources where database_id = $1 or target_database_id = $1",
        ] {
            sqlx::query(statement).bind(id).execute(&mut **txn).await?;
        }
    }
    let done = sqlx::query("delete from databases where id = $1")
        .bind(id)
        .execute(&mut **txn)
        .await?;
    Ok(done.rows_affected())
}
