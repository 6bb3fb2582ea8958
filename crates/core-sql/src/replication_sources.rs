use chrono::{DateTime, Utc};
use sqlx::types::Uuid;

use crate::{Json, Status};

/// ReplicationSource names a CDC slot/publication pair for one source table
/// of a relationship, plus the opaque resumable state Anchor hands back.
/// One row exists per `(workspace, database, table, relationship)`.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ReplicationSource {
    pub id: Uuid,
    pub tenant_id: String,
    pub workspace_id: Uuid,
    pub database_id: Uuid,
    pub table_name: String,
    pub relationship_id: Uuid,
    pub slot_name: String,
    pub publication_name: String,
    pub target_database_id: Uuid,
    pub target_table_name: String,
    /// Serialized mapping rules driving the replication.
    pub rules: Json,
    pub cdc_connection_id: String,
    pub cdc_state: Json,
    pub status: Status,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

const COLUMNS: &str = "id, tenant_id, workspace_id, database_id, table_name, relationship_id, \
     slot_name, publication_name, target_database_id, target_table_name, rules, \
     cdc_connection_id, cdc_state, status, created, updated";

pub async fn get_by_id(
    id: Uuid,
    db: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
) -> sqlx::Result<Option<ReplicationSource>> {
    sqlx::query_as::<_, ReplicationSource>(&format!(
        "select {COLUMNS} from replication_sources where id = $1"
    ))
    .bind(id)
    .fetch_optional(db)
    .await
}

pub async fn list_for_relationship(
    relationship_id: Uuid,
    db: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
) -> sqlx::Result<Vec<ReplicationSource>> {
    sqlx::query_as::<_, ReplicationSource>(&format!(
        "select {COLUMNS} from replication_sources
         where relationship_id = $1 order by created asc"
    ))
    .bind(relationship_id)
    .fetch_all(db)
    .await
}

pub struct NewReplicationSource<'a> {
    pub tenant_id: &'a str,
    pub workspace_id: Uuid,
    pub database_id: Uuid,
    pub table_name: &'a str,
    pub relationship_id: Uuid,
    pub slot_name: &'a str,
    pub publication_name: &'a str,
    pub target_database_id: Uuid,
    pub target_table_name: &'a str,
    pub rules: Json,
}

/// Idempotent creation: re-issuing for the same
/// `(workspace, database, table, relationship)` tuple returns the existing
/// row untouched apart from its `updated` stamp.
pub async fn ensure(
    new: NewReplicationSource<'_>,
    db: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
) -> sqlx::Result<ReplicationSource> {
    sqlx::query_as::<_, ReplicationSource>(&format!(
        "insert into replication_sources
           (id, tenant_id, workspace_id, database_id, table_name, relationship_id,
            slot_name, publication_name, target_database_id, target_table_name,
            rules, cdc_connection_id, cdc_state, status)
         values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, '', $12, 'STATUS_PENDING')
         on conflict (workspace_id, database_id, table_name, relationship_id)
           do update set updated = now()
         returning {COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(new.tenant_id)
    .bind(new.workspace_id)
    .bind(new.database_id)
    .bind(new.table_name)
    .bind(new.relationship_id)
    .bind(new.slot_name)
    .bind(new.publication_name)
    .bind(new.target_database_id)
    .bind(new.target_table_name)
    .bind(new.rules)
    .bind(crate::empty_json())
    .fetch_one(db)
    .await
}

#[derive(Debug, Default, Clone)]
pub struct ReplicationSourceUpdate {
    pub cdc_connection_id: Option<String>,
    pub cdc_state: Option<Json>,
    pub status: Option<Status>,
}

pub async fn update(
    id: Uuid,
    update: ReplicationSourceUpdate,
    db: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
) -> sqlx::Result<Option<ReplicationSource>> {
    let mut builder = sqlx::QueryBuilder::new("update replication_sources set updated = now()");
    if let Some(cdc_connection_id) = update.cdc_connection_id {
        builder
            .push(", cdc_connection_id = ")
            .push_bind(cdc_connection_id);
    }
    if let Some(cdc_state) = update.cdc_state {
        builder.push(", cdc_state = ").push_bind(cdc_state);
    }
    if let Some(status) = update.status {
        builder.push(", status = ").push_bind(status);
    }
    builder.push(" where id = ").push_bind(id);
    builder.push(format!(" returning {COLUMNS}"));

    builder
        .build_query_as::<ReplicationSource>()
        .fetch_optional(db)
        .await
}

pub async fn delete(
    id: Uuid,
    db: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
) -> sqlx::Result<u64> {
    let done = sqlx::query("delete from replication_sources where id = $1")
        .bind(id)
        .execute(db)
        .await?;
    Ok(done.rows_affected())
}
