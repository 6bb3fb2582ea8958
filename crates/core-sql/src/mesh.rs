use chrono::{DateTime, Utc};
use sqlx::types::Uuid;

use crate::Status;

/// Mesh-level objects are not workspace-scoped: one mesh spans nodes that
/// each serve many tenants.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Mesh {
    pub id: Uuid,
    pub name: String,
    pub allow_join: bool,
    pub status: Status,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Node {
    pub id: i64,
    pub name: String,
    pub address: String,
    pub port: i32,
    pub identity: String,
    pub status: Status,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

const MESH_COLUMNS: &str = "id, name, allow_join, status, created, updated";
const NODE_COLUMNS: &str = "id, name, address, port, identity, status, created, updated";

/// The identity id of the running node. The `localidentity` side-table
/// holds a single row.
pub async fn local_identity(
    db: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
) -> sqlx::Result<Option<i64>> {
    sqlx::query_scalar::<_, i64>("select identity_id from localidentity limit 1")
        .fetch_optional(db)
        .await
}

pub async fn get_node(
    id: i64,
    db: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
) -> sqlx::Result<Option<Node>> {
    sqlx::query_as::<_, Node>(&format!("select {NODE_COLUMNS} from nodes where id = $1"))
        .bind(id)
        .fetch_optional(db)
        .await
}

pub async fn set_node_status(
    id: i64,
    status: Status,
    db: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
) -> sqlx::Result<u64> {
    let done = sqlx::query("update nodes set status = $2, updated = now() where id = $1")
        .bind(id)
        .bind(status)
        .execute(db)
        .await?;
    Ok(done.rows_affected())
}

pub async fn get_mesh(
    id: Uuid,
    db: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
) -> sqlx::Result<Option<Mesh>> {
    sqlx::query_as::<_, Mesh>(&format!("select {MESH_COLUMNS} from mesh where id = $1"))
        .bind(id)
        .fetch_optional(db)
        .await
}

/// The mesh this node is a member of, if any.
pub async fn mesh_for_node(
    node_id: i64,
    db: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
) -> sqlx::Result<Option<Mesh>> {
    sqlx::query_as::<_, Mesh>(&format!(
        "select {MESH_COLUMNS} from mesh m
         join mesh_node_membership mm on mm.mesh_id = m.id
         where mm.node_id = $1",
    ))
    .bind(node_id)
    .fetch_optional(db)
    .await
}

pub async fn create_mesh(
    name: &str,
    allow_join: bool,
    db: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
) -> sqlx::Result<Mesh> {
    sqlx::query_as::<_, Mesh>(&format!(
        "insert into mesh (id, name, allow_join, status)
         values ($1, $2, $3, 'STATUS_ACTIVE')
         returning {MESH_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(name)
    .bind(allow_join)
    .fetch_one(db)
    .await
}

/// Idempotent membership insert.
pub async fn add_membership(
    mesh_id: Uuid,
    node_id: i64,
    db: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
) -> sqlx::Result<()> {
    sqlx::query(
        "insert into mesh_node_membership (mesh_id, node_id, status)
         values ($1, $2, 'STATUS_ACTIVE')
         on conflict (mesh_id, node_id) do nothing",
    )
    .bind(mesh_id)
    .bind(node_id)
    .execute(db)
    .await?;
    Ok(())
}

pub async fn set_mesh_status(
    id: Uuid,
    status: Status,
    db: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
) -> sqlx::Result<u64> {
    let done = sqlx::query("update mesh set status = $2, updated = now() where id = $1")
        .bind(id)
        .bind(status)
        .execute(db)
        .await?;
    Ok(done.rows_affected())
}

/// Member count of the mesh; the should-broadcast gate keys on this.
pub async fn count_mesh_nodes(
    mesh_id: Uuid,
    db: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
) -> sqlx::Result<i64> {
    sqlx::query_scalar::<_, i64>(
        "select count(*) from mesh_node_membership where mesh_id = $1",
    )
    .bind(mesh_id)
    .fetch_one(db)
    .await
}
