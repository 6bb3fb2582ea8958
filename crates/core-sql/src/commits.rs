use chrono::{DateTime, Utc};
use sqlx::types::Uuid;

use crate::Json;

/// Commit is one entry of a branch's append-only schema history. Commits
/// are never mutated; only the `is_head` flag moves, and exactly one commit
/// per branch carries it.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Commit {
    pub id: Uuid,
    pub branch_id: Uuid,
    /// Strictly increasing per branch.
    pub sequence: i64,
    /// Short human-readable code, derived from the commit id.
    pub code: String,
    pub message: String,
    pub schema_type: String,
    pub schema_structure: Json,
    pub is_head: bool,
    pub created: DateTime<Utc>,
}

const COLUMNS: &str =
    "id, branch_id, sequence, code, message, schema_type, schema_structure, is_head, created";

pub async fn get_by_id(
    id: Uuid,
    db: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
) -> sqlx::Result<Option<Commit>> {
    sqlx::query_as::<_, Commit>(&format!("select {COLUMNS} from commits where id = $1"))
        .bind(id)
        .fetch_optional(db)
        .await
}

pub async fn list(
    branch_id: Uuid,
    db: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
) -> sqlx::Result<Vec<Commit>> {
    sqlx::query_as::<_, Commit>(&format!(
        "select {COLUMNS} from commits where branch_id = $1 order by sequence asc"
    ))
    .bind(branch_id)
    .fetch_all(db)
    .await
}

pub async fn head(
    branch_id: Uuid,
    db: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
) -> sqlx::Result<Option<Commit>> {
    sqlx::query_as::<_, Commit>(&format!(
        "select {COLUMNS} from commits where branch_id = $1 and is_head"
    ))
    .bind(branch_id)
    .fetch_optional(db)
    .await
}

pub async fn count(
    branch_id: Uuid,
    db: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
) -> sqlx::Result<i64> {
    sqlx::query_scalar::<_, i64>("select count(*) from commits where branch_id = $1")
        .bind(branch_id)
        .fetch_one(db)
        .await
}

/// Append a commit and move the head flag to it, atomically within the
/// caller's transaction. The new commit's sequence is one past the
/// branch's current maximum.
pub async fn append_head(
    branch_id: Uuid,
    message: &str,
    schema_type: &str,
    schema_structure: Json,
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
) -> sqlx::Result<Commit> {
    sqlx::query("update commits set is_head = false where branch_id = $1 and is_head")
        .bind(branch_id)
        .execute(&mut **txn)
        .await?;

    let id = Uuid::new_v4();
    let code = id.simple().to_string()[..8].to_string();

    sqlx::query_as::<_, Commit>(&format!(
        "insert into commits (id, branch_id, sequence, code, message, schema_type,
                              schema_structure, is_head)
         values ($1, $2,
                 (select coalesce(max(sequence), 0) + 1 from commits where branch_id = $2),
                 $3, $4, $5, $6, true)
         returning {COLUMNS}"
    ))
    .bind(id)
    .bind(branch_id)
    .bind(code)
    .bind(message)
    .bind(schema_type)
    .bind(schema_structure)
    .fetch_one(&mut **txn)
    .await
}
