//! The repo/branch/commit engine: append-only schema history with
//! anchor-discovery integration, fork, branch, merge, and deploy.

use sqlx::PgPool;
use tonic::Status;
use uuid::Uuid;

use crate::connectors::TranslateConnector;
use crate::{db_error, gateway_error, ApiResult};
use core_sql::commits::{self, Commit};
use core_sql::repos::{self, Branch, Repo};

/// Create a repo; `main` comes with it.
pub async fn create_repo(
    pool: &PgPool,
    tenant_id: &str,
    workspace_id: Uuid,
    name: &str,
    description: &str,
) -> ApiResult<(Repo, Branch)> {
    let mut txn = pool.begin().await.map_err(db_error)?;
    let created = repos::create(tenant_id, workspace_id, name, description, &mut txn)
        .await
        .map_err(db_error)?;
    txn.commit().await.map_err(db_error)?;
    Ok(created)
}

/// Bind a branch to a database. Both sides must be unbound.
pub async fn attach_branch(pool: &PgPool, branch_id: Uuid, database_id: Uuid) -> ApiResult<Branch> {
    let branch = repos::get_branch(branch_id, pool)
        .await
        .map_err(db_error)?
        .ok_or_else(|| Status::not_found(format!("branch '{branch_id}' not found")))?;
    if let Some(bound) = branch.connected_database_id {
        return Err(Status::failed_precondition(format!(
            "branch '{branch_id}' is already attached to database '{bound}'"
        )));
    }

    if let Some(existing) = repos::find_branch_by_database_id(database_id, pool)
        .await
        .map_err(db_error)?
    {
        return Err(Status::failed_precondition(format!(
            "database '{database_id}' is already attached to branch '{}'",
            existing.id
        )));
    }

    repos::attach_branch(branch_id, database_id, pool)
        .await
        .map_err(db_error)?
        .ok_or_else(|| Status::not_found(format!("branch '{branch_id}' not found")))
}

pub async fn detach_branch(pool: &PgPool, branch_id: Uuid) -> ApiResult<Branch> {
    repos::detach_branch(branch_id, pool)
        .await
        .map_err(db_error)?
        .ok_or_else(|| Status::not_found(format!("branch '{branch_id}' not found")))
}

/// The discovery path: turn an anchor-extracted schema into the branch's
/// new head commit. The previous head is unflagged and the new commit
/// becomes head atomically.
pub async fn create_commit_by_anchor(
    pool: &PgPool,
    branch_id: Uuid,
    message: &str,
    schema_type: &str,
    schema_structure: &str,
) -> ApiResult<Commit> {
    if repos::get_branch(branch_id, pool)
        .await
        .map_err(db_error)?
        .is_none()
    {
        return Err(Status::not_found(format!("branch '{branch_id}' not found")));
    }

    let mut txn = pool.begin().await.map_err(db_error)?;
    let commit = commits::append_head(
        branch_id,
        message,
        schema_type,
        core_sql::json_or_empty(schema_structure),
        &mut txn,
    )
    .await
    .map_err(db_error)?;
    txn.commit().await.map_err(db_error)?;

    tracing::info!(branch_id = %branch_id, commit_id = %commit.id, code = %commit.code,
        "discovery produced new head commit");
    Ok(commit)
}

pub struct ForkOutcome {
    pub repo: Repo,
    pub branch: Branch,
    pub commit: Commit,
    pub warnings: Vec<String>,
}

/// Clone a commit's schema into a brand-new repo. When the requested
/// dialect differs from the commit's, UnifiedModel translates and its
/// warnings ride along on the response.
pub async fn fork_commit(
    pool: &PgPool,
    translator: Option<&dyn TranslateConnector>,
    tenant_id: &str,
    workspace_id: Uuid,
    commit_id: Uuid,
    new_repo_name: &str,
    target_db_type: &str,
) -> ApiResult<ForkOutcome> {
    let source = commits::get_by_id(commit_id, pool)
        .await
        .map_err(db_error)?
        .ok_or_else(|| Status::not_found(format!("commit '{commit_id}' not found")))?;

    let source_branch = repos::get_branch(source.branch_id, pool)
        .await
        .map_err(db_error)?
        .ok_or_else(|| Status::not_found("source branch not found"))?;
    let source_repo = repos::get_by_id(source_branch.repo_id, pool)
        .await
        .map_err(db_error)?
        .ok_or_else(|| Status::not_found("source repo not found"))?;
    crate::registry::ensure_same_tenant(tenant_id, &source_repo.tenant_id)?;

    let (schema_type, schema_structure, warnings) = if !target_db_type.is_empty()
        && target_db_type != source.schema_type
    {
        let translator = translator.ok_or_else(|| {
            Status::unavailable("unifiedmodel service is not available")
        })?;
        let (structure, warnings) = translator
            .translate(&source.schema_type, target_db_type, source.schema_structure.get())
            .await
            .map_err(|err| Status::internal(format!("schema translation failed: {err:#}")))?;
        (target_db_type.to_string(), structure, warnings)
    } else {
        (
            source.schema_type.clone(),
            source.schema_structure.get().to_string(),
            Vec::new(),
        )
    };

    let mut txn = pool.begin().await.map_err(db_error)?;
    let (repo, branch) = repos::create(tenant_id, workspace_id, new_repo_name, "", &mut txn)
        .await
        .map_err(db_error)?;
    let commit = match commits::append_head(
        branch.id,
        &format!("forked from commit {}", source.code),
        &schema_type,
        core_sql::json_or_empty(&schema_structure),
        &mut txn,
    )
    .await
    {
        Ok(commit) => commit,
        Err(err) => {
            // The transaction rolls back on drop; nothing half-built stays.
            drop(txn);
            return Err(db_error(err));
        }
    };
    txn.commit().await.map_err(db_error)?;

    Ok(ForkOutcome {
        repo,
        branch,
        commit,
        warnings,
    })
}

/// Create a new branch whose initial commit copies the given commit.
pub async fn branch_commit(
    pool: &PgPool,
    commit_id: Uuid,
    new_branch_name: &str,
) -> ApiResult<(Branch, Commit)> {
    let source = commits::get_by_id(commit_id, pool)
        .await
        .map_err(db_error)?
        .ok_or_else(|| Status::not_found(format!("commit '{commit_id}' not found")))?;
    let source_branch = repos::get_branch(source.branch_id, pool)
        .await
        .map_err(db_error)?
        .ok_or_else(|| Status::not_found("source branch not found"))?;

    let mut txn = pool.begin().await.map_err(db_error)?;
    let branch = repos::create_branch(
        source_branch.repo_id,
        new_branch_name,
        Some(source_branch.id),
        &mut *txn,
    )
    .await
    .map_err(db_error)?;
    let commit = commits::append_head(
        branch.id,
        &format!("branched from commit {}", source.code),
        &source.schema_type,
        core_sql::json_or_empty(source.schema_structure.get()),
        &mut txn,
    )
    .await
    .map_err(db_error)?;
    txn.commit().await.map_err(db_error)?;

    Ok((branch, commit))
}

/// Apply a child-branch commit onto the parent branch: a new parent head
/// with identical structure. No schema diffing happens here.
pub async fn merge_commit(pool: &PgPool, commit_id: Uuid) -> ApiResult<Commit> {
    let source = commits::get_by_id(commit_id, pool)
        .await
        .map_err(db_error)?
        .ok_or_else(|| Status::not_found(format!("commit '{commit_id}' not found")))?;
    let branch = repos::get_branch(source.branch_id, pool)
        .await
        .map_err(db_error)?
        .ok_or_else(|| Status::not_found("source branch not found"))?;
    let parent_branch_id = branch.parent_branch_id.ok_or_else(|| {
        Status::failed_precondition(format!(
            "branch '{}' has no parent branch to merge into",
            branch.name
        ))
    })?;

    let mut txn = pool.begin().await.map_err(db_error)?;
    let merged = commits::append_head(
        parent_branch_id,
        &format!("merged commit {} from branch '{}'", source.code, branch.name),
        &source.schema_type,
        core_sql::json_or_empty(source.schema_structure.get()),
        &mut txn,
    )
    .await
    .map_err(db_error)?;
    txn.commit().await.map_err(db_error)?;

    Ok(merged)
}

/// Push a commit's schema into the branch's attached database via Anchor.
pub async fn deploy_commit(
    pool: &PgPool,
    anchor: &gateways::anchor::Client,
    commit_id: Uuid,
) -> ApiResult<Uuid> {
    let commit = commits::get_by_id(commit_id, pool)
        .await
        .map_err(db_error)?
        .ok_or_else(|| Status::not_found(format!("commit '{commit_id}' not found")))?;
    let branch = repos::get_branch(commit.branch_id, pool)
        .await
        .map_err(db_error)?
        .ok_or_else(|| Status::not_found("branch not found"))?;
    let database_id = branch.connected_database_id.ok_or_else(|| {
        Status::failed_precondition(format!(
            "branch '{}' is not attached to a database",
            branch.name
        ))
    })?;

    anchor
        .deploy_database_schema(proto_redb::anchor::DeployDatabaseSchemaRequest {
            database_id: database_id.to_string(),
            schema: commit.schema_structure.get().to_string(),
        })
        .await
        .map_err(|err| gateway_error("anchor", err))?;

    // Refresh the database's cached schema with what was just deployed.
    core_sql::databases::update(
        database_id,
        core_sql::databases::DatabaseUpdate {
            schema: Some(core_sql::json_or_empty(commit.schema_structure.get())),
            ..Default::default()
        },
        pool,
    )
    .await
    .map_err(db_error)?;

    Ok(database_id)
}
