use chrono::{DateTime, Utc};
use sqlx::types::Uuid;

/// Repo is a workspace-scoped, append-only schema history. Every repo owns
/// a `main` branch from the moment of creation.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Repo {
    pub id: Uuid,
    pub tenant_id: String,
    pub workspace_id: Uuid,
    pub name: String,
    pub description: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Branch {
    pub id: Uuid,
    pub repo_id: Uuid,
    pub name: String,
    /// Null on `main`.
    pub parent_branch_id: Option<Uuid>,
    /// At most one live attachment per database.
    pub connected_database_id: Option<Uuid>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

const REPO_COLUMNS: &str = "id, tenant_id, workspace_id, name, description, created, updated";
const BRANCH_COLUMNS: &str =
    "id, repo_id, name, parent_branch_id, connected_database_id, created, updated";

pub async fn get_by_id(
    id: Uuid,
    db: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
) -> sqlx::Result<Option<Repo>> {
    sqlx::query_as::<_, Repo>(&format!("select {REPO_COLUMNS} from repos where id = $1"))
        .bind(id)
        .fetch_optional(db)
        .await
}

pub async fn get_by_name(
    workspace_id: Uuid,
    name: &str,
    db: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
) -> sqlx::Result<Option<Repo>> {
    sqlx::query_as::<_, Repo>(&format!(
        "select {REPO_COLUMNS} from repos where workspace_id = $1 and name = $2"
    ))
    .bind(workspace_id)
    .bind(name)
    .fetch_optional(db)
    .await
}

pub async fn list(
    workspace_id: Uuid,
    db: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
) -> sqlx::Result<Vec<Repo>> {
    sqlx::query_as::<_, Repo>(&format!(
        "select {REPO_COLUMNS} from repos where workspace_id = $1 order by created desc"
    ))
    .bind(workspace_id)
    .fetch_all(db)
    .await
}

/// Create a repo together with its `main` branch, in one transaction.
pub async fn create(
    tenant_id: &str,
    workspace_id: Uuid,
    name: &str,
    description: &str,
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
) -> sqlx::Result<(Repo, Branch)> {
    let repo = sqlx::query_as::<_, Repo>(&format!(
        "insert into repos (id, tenant_id, workspace_id, name, description)
         values ($1, $2, $3, $4, $5)
         returning {REPO_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(tenant_id)
    .bind(workspace_id)
    .bind(name)
    .bind(description)
    .fetch_one(&mut **txn)
    .await?;

    let main = sqlx::query_as::<_, Branch>(&format!(
        "insert into branches (id, repo_id, name, parent_branch_id, connected_database_id)
         values ($1, $2, 'main', null, null)
         returning {BRANCH_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(repo.id)
    .fetch_one(&mut **txn)
    .await?;

    Ok((repo, main))
}

pub async fn delete(
    id: Uuid,
    force: bool,
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
) -> sqlx::Result<u64> {
    if force {
        sqlx::query(
            "delete from commits where branch_id in (select id from branches where repo_id = $1)",
        )
        .bind(id)
        .execute(&mut **txn)
        .await?;
        sqlx::query("delete from branches where repo_id = $1")
            .bind(id)
            .execute(&mut **txn)
            .await?;
    }
    let done = sqlx::query("delete from repos where id = $1")
        .bind(id)
        .execute(&mut **txn)
        .await?;
    Ok(done.rows_affected())
}

pub async fn get_branch(
    id: Uuid,
    db: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
) -> sqlx::Result<Option<Branch>> {
    sqlx::query_as::<_, Branch>(&format!("select {BRANCH_COLUMNS} from branches where id = $1"))
        .bind(id)
        .fetch_optional(db)
        .await
}

pub async fn get_branch_by_name(
    repo_id: Uuid,
    name: &str,
    db: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
) -> sqlx::Result<Option<Branch>> {
    sqlx::query_as::<_, Branch>(&format!(
        "select {BRANCH_COLUMNS} from branches where repo_id = $1 and name = $2"
    ))
    .bind(repo_id)
    .bind(name)
    .fetch_optional(db)
    .await
}

pub async fn list_branches(
    repo_id: Uuid,
    db: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
) -> sqlx::Result<Vec<Branch>> {
    sqlx::query_as::<_, Branch>(&format!(
        "select {BRANCH_COLUMNS} from branches where repo_id = $1 order by created asc"
    ))
    .bind(repo_id)
    .fetch_all(db)
    .await
}

pub async fn create_branch(
    repo_id: Uuid,
    name: &str,
    parent_branch_id: Option<Uuid>,
    db: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
) -> sqlx::Result<Branch> {
    sqlx::query_as::<_, Branch>(&format!(
        "insert into branches (id, repo_id, name, parent_branch_id, connected_database_id)
         values ($1, $2, $3, $4, null)
         returning {BRANCH_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(repo_id)
    .bind(name)
    .bind(parent_branch_id)
    .fetch_one(db)
    .await
}

/// Bind a branch to a database. Fails the caller's precondition check if
/// either side is already bound; this only writes the link.
pub async fn attach_branch(
    branch_id: Uuid,
    database_id: Uuid,
    db: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
) -> sqlx::Result<Option<Branch>> {
    sqlx::query_as::<_, Branch>(&format!(
        "update branches set connected_database_id = $2, updated = now()
         where id = $1
         returning {BRANCH_COLUMNS}"
    ))
    .bind(branch_id)
    .bind(database_id)
    .fetch_optional(db)
    .await
}

pub async fn detach_branch(
    branch_id: Uuid,
    db: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
) -> sqlx::Result<Option<Branch>> {
    sqlx::query_as::<_, Branch>(&format!(
        "update branches set connected_database_id = null, updated = now()
         where id = $1
         returning {BRANCH_COLUMNS}"
    ))
    .bind(branch_id)
    .fetch_optional(db)
    .await
}

/// The branch currently attached to a database, if any.
pub async fn find_branch_by_database_id(
    database_id: Uuid,
    db: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
) -> sqlx::Result<Option<Branch>> {
    sqlx::query_as::<_, Branch>(&format!(
        "select {BRANCH_COLUMNS} from branches where connected_database_id = $1"
    ))
    .bind(database_id)
    .fetch_optional(db)
    .await
}

/// Anchor-discovery lookup: the repo and branch attached to a database.
pub async fn find_repo_and_branch_by_database_id(
    database_id: Uuid,
    db: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
) -> sqlx::Result<Option<(Repo, Branch)>> {
    #[derive(sqlx::FromRow)]
    struct Joined {
        repo_id: Uuid,
        tenant_id: String,
        workspace_id: Uuid,
        repo_name: String,
        description: String,
        repo_created: DateTime<Utc>,
        repo_updated: DateTime<Utc>,
        id: Uuid,
        name: String,
        parent_branch_id: Option<Uuid>,
        connected_database_id: Option<Uuid>,
        created: DateTime<Utc>,
        updated: DateTime<Utc>,
    }

    let joined = sqlx::query_as::<_, Joined>(
        "select r.id as repo_id, r.tenant_id, r.workspace_id, r.name as repo_name,
                r.description, r.created as repo_created, r.updated as repo_updated,
                b.id, b.name, b.parent_branch_id, b.connected_database_id,
                b.created, b.updated
         from branches b
         join repos r on b.repo_id = r.id
         where b.connected_database_id = $1",
    )
    .bind(database_id)
    .fetch_optional(db)
    .await?;

    Ok(joined.map(|j| {
        (
            Repo {
                id: j.repo_id,
                tenant_id: j.tenant_id,
                workspace_id: j.workspace_id,
                name: j.repo_name,
                description: j.description,
                created: j.repo_created,
                updated: j.repo_updated,
            },
            Branch {
                id: j.id,
                repo_id: j.repo_id,
                name: j.name,
                parent_branch_id: j.parent_branch_id,
                connected_database_id: j.connected_database_id,
                created: j.created,
                updated: j.updated,
            },
        )
    }))
}
