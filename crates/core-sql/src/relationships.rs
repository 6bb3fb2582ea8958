use chrono::{DateTime, Utc};
use sqlx::types::Uuid;

use crate::Status;

/// Relationship couples a source database, a target database, and a mapping
/// into a live replication pipeline: an initial bulk copy followed by CDC.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Relationship {
    pub id: Uuid,
    pub tenant_id: String,
    pub workspace_id: Uuid,
    pub name: String,
    pub source_database_id: Uuid,
    pub target_database_id: Uuid,
    pub mapping_id: Uuid,
    pub target_table_name: String,
    pub status: Status,
    pub status_message: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

const COLUMNS: &str = "id, tenant_id, workspace_id, name, source_database_id, \
     target_database_id, mapping_id, target_table_name, status, status_message, created, updated";

pub async fn get_by_id(
    id: Uuid,
    db: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
) -> sqlx::Result<Option<Relationship>> {
    sqlx::query_as::<_, Relationship>(&format!(
        "select {COLUMNS} from relationships where id = $1"
    ))
    .bind(id)
    .fetch_optional(db)
    .await
}

pub async fn get_by_name(
    workspace_id: Uuid,
    name: &str,
    db: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
) -> sqlx::Result<Option<Relationship>> {
    sqlx::query_as::<_, Relationship>(&format!(
        "select {COLUMNS} from relationships where workspace_id = $1 and name = $2"
    ))
    .bind(workspace_id)
    .bind(name)
    .fetch_optional(db)
    .await
}

pub async fn list(
    workspace_id: Uuid,
    db: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
) -> sqlx::Result<Vec<Relationship>> {
    sqlx::query_as::<_, Relationship>(&format!(
        "select {COLUMNS} from relationships where workspace_id = $1 order by created desc"
    ))
    .bind(workspace_id)
    .fetch_all(db)
    .await
}

pub struct NewRelationship<'a> {
    pub tenant_id: &'a str,
    pub workspace_id: Uuid,
    pub name: &'a str,
    pub source_database_id: Uuid,
    pub target_database_id: Uuid,
    pub mapping_id: Uuid,
    pub target_table_name: &'a str,
}

pub async fn create(
    new: NewRelationship<'_>,
    db: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
) -> sqlx::Result<Relationship> {
    sqlx::query_as::<_, Relationship>(&format!(
        "insert into relationships (id, tenant_id, workspace_id, name, source_database_id,
                                    target_database_id, mapping_id, target_table_name,
                                    status, status_message)
         values ($1, $2, $3, $4, $5, $6, $7, $8, 'STATUS_CREATED', '')
         returning {COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(new.tenant_id)
    .bind(new.workspace_id)
    .bind(new.name)
    .bind(new.source_database_id)
    .bind(new.target_database_id)
    .bind(new.mapping_id)
    .bind(new.target_table_name)
    .fetch_one(db)
    .await
}

/// Set the lifecycle status and (clamped) status message in one statement.
pub async fn set_status(
    id: Uuid,
    status: Status,
    status_message: &str,
    db: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
) -> sqlx::Result<Option<Relationship>> {
    sqlx::query_as::<_, Relationship>(&format!(
        "update relationships set status = $2, status_message = $3, updated = now()
         where id = $1
         returning {COLUMNS}"
    ))
    .bind(id)
    .bind(status)
    .bind(crate::clamp_status_message(status_message))
    .fetch_optional(db)
    .await
}

/// Delete the relationship. `replication_sources.relationship_id` is
/// `ON DELETE CASCADE`, so replication sources go with it.
pub async fn delete(
    id: Uuid,
    db: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
) -> sqlx::Result<u64> {
    let done = sqlx::query("delete from relationships where id = $1")
        .bind(id)
        .execute(db)
        .await?;
    Ok(done.rows_affected())
}
