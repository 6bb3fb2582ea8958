use chrono::{DateTime, Utc};
use sqlx::types::Uuid;

/// Workspace is the container for all user-space objects of a tenant.
/// Names are unique within a tenant.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Workspace {
    pub id: Uuid,
    pub tenant_id: String,
    pub name: String,
    pub description: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

const COLUMNS: &str = "id, tenant_id, name, description, created, updated";

/// Resolve `workspace_name -> workspace_id`. Every workspace-scoped
/// operation performs this step first.
pub async fn resolve_id(
    tenant_id: &str,
    workspace_name: &str,
    db: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
) -> sqlx::Result<Option<Uuid>> {
    sqlx::query_scalar::<_, Uuid>("select id from workspaces where tenant_id = $1 and name = $2")
        .bind(tenant_id)
        .bind(workspace_name)
        .fetch_optional(db)
        .await
}

pub async fn get_by_id(
    id: Uuid,
    db: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
) -> sqlx::Result<Option<Workspace>> {
    sqlx::query_as::<_, Workspace>(&format!("select {COLUMNS} from workspaces where id = $1"))
        .bind(id)
        .fetch_optional(db)
        .await
}

pub async fn list(
    tenant_id: &str,
    db: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
) -> sqlx::Result<Vec<Workspace>> {
    sqlx::query_as::<_, Workspace>(&format!(
        "select {COLUMNS} from workspaces where tenant_id = $1 order by created desc"
    ))
    .bind(tenant_id)
    .fetch_all(db)
    .await
}

pub async fn create(
    tenant_id: &str,
    name: &str,
    description: &str,
    db: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
) -> sqlx::Result<Workspace> {
    sqlx::query_as::<_, Workspace>(&format!(
        "insert into workspaces (id, tenant_id, name, description)
         values ($1, $2, $3, $4)
         returning {COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(tenant_id)
    .bind(name)
    .bind(description)
    .fetch_one(db)
    .await
}

#[derive(Debug, Default, Clone)]
pub struct WorkspaceUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
}

/// Apply the present fields of the update; absent fields are untouched.
pub async fn update(
    id: Uuid,
    update: WorkspaceUpdate,
    db: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
) -> sqlx::Result<Option<Workspace>> {
    let mut builder = sqlx::QueryBuilder::new("update workspaces set updated = now()");
    if let Some(name) = update.name {
        builder.push(", name = ").push_bind(name);
    }
    if let Some(description) = update.description {
        builder.push(", description = ").push_bind(description);
    }
    builder.push(" where id = ").push_bind(id);
    builder.push(format!(" returning {COLUMNS}"));

    builder
        .build_query_as::<Workspace>()
        .fetch_optional(db)
        .await
}

/// Delete a workspace. Without `force` the delete fails on the first
/// foreign-key reference; with `force` all contained objects go first,
/// in one transaction.
pub async fn delete(
    id: Uuid,
    force: bool,
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
) -> sqlx::Result<u64> {
    if force {
        for statement in [
            "delete from data_product_items where data_product_id in
               (select id from data_products where workspace_id = $1)",
            "delete from data_products where workspace_id = $1",
            "delete from resource_items where container_id in
               (select id from resource_containers where workspace_id = $1)",
            "delete from resource_containers where workspace_id = $1",
            "delete from relationships where workspace_id = $1",
            "delete from mapping_rules where mapping_id in
               (select id from mappings where workspace_id = $1)",
            "delete from mappings where workspace_id = $1",
            "delete from commits where branch_id in
               (select b.id from branches b join repos r on b.repo_id = r.id where r.workspace_id = $1)",
            "delete from branches where repo_id in (select id from repos where workspace_id = $1)",
            "delete from repos where workspace_id = $1",
            "delete from streams where workspace_id = $1",
            "delete from databases where workspace_id = $1",
            "delete from instances where workspace_id = $1",
        ] {
            sqlx::query(statement).bind(id).execute(&mut **txn).await?;
        }
    }
    let done = sqlx::query("delete from workspaces where id = $1")
        .bind(id)
        .execute(&mut **txn)
        .await?;
    Ok(done.rows_affected())
}
