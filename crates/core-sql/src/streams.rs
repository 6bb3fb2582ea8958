use chrono::{DateTime, Utc};
use sqlx::types::Uuid;

use crate::{Json, Status};

/// Stream is a message-platform subscription bound to a node and workspace.
/// Its lifecycle mirrors a database: CONNECTED / DISCONNECTED.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Stream {
    pub id: Uuid,
    pub tenant_id: String,
    pub workspace_id: Uuid,
    pub node_id: i64,
    pub name: String,
    /// Monitored topic list, as a JSON array of strings.
    pub topics: Json,
    pub config: Json,
    pub status: Status,
    pub status_message: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

const COLUMNS: &str = "id, tenant_id, workspace_id, node_id, name, topics, config, status, \
     status_message, created, updated";

pub async fn get_by_id(
    id: Uuid,
    db: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
) -> sqlx::Result<Option<Stream>> {
    sqlx::query_as::<_, Stream>(&format!("select {COLUMNS} from streams where id = $1"))
        .bind(id)
        .fetch_optional(db)
        .await
}

pub async fn get_by_name(
    workspace_id: Uuid,
    name: &str,
    db: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
) -> sqlx::Result<Option<Stream>> {
    sqlx::query_as::<_, Stream>(&format!(
        "select {COLUMNS} from streams where workspace_id = $1 and name = $2"
    ))
    .bind(workspace_id)
    .bind(name)
    .fetch_optional(db)
    .await
}

pub async fn list(
    workspace_id: Uuid,
    db: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
) -> sqlx::Result<Vec<Stream>> {
    sqlx::query_as::<_, Stream>(&format!(
        "select {COLUMNS} from streams where workspace_id = $1 order by created desc"
    ))
    .bind(workspace_id)
    .fetch_all(db)
    .await
}

pub async fn create(
    tenant_id: &str,
    workspace_id: Uuid,
    node_id: i64,
    name: &str,
    topics: Json,
    config: Json,
    db: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
) -> sqlx::Result<Stream> {
    sqlx::query_as::<_, Stream>(&format!(
        "insert into streams (id, tenant_id, workspace_id, node_id, name, topics, config,
                              status, status_message)
         values ($1, $2, $3, $4, $5, $6, $7, 'STATUS_CREATED', '')
         returning {COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(tenant_id)
    .bind(workspace_id)
    .bind(node_id)
    .bind(name)
    .bind(topics)
    .bind(config)
    .fetch_one(db)
    .await
}

pub async fn set_status(
    id: Uuid,
    status: Status,
    status_message: &str,
    db: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
) -> sqlx::Result<Option<Stream>> {
    sqlx::query_as::<_, Stream>(&format!(
        "update streams set status = $2, status_message = $3, updated = now()
         where id = $1
         returning {COLUMNS}"
    ))
    .bind(id)
    .bind(status)
    .bind(crate::clamp_status_message(status_message))
    .fetch_optional(db)
    .await
}

pub async fn delete(
    id: Uuid,
    db: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
) -> sqlx::Result<u64> {
    let done = sqlx::query("delete from streams where id = $1")
        .bind(id)
        .execute(db)
        .await?;
    Ok(done.rows_affected())
}
