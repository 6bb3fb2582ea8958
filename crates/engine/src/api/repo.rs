//! Repo/branch/commit service: the version-controlled schema store.

use std::sync::Arc;

use tonic::Status;
use uuid::Uuid;

use super::{observe, Envelope};
use crate::engine::Engine;
use crate::registry::resolve_workspace;
use crate::schema_repo;
use crate::ApiResult;

#[derive(Debug, Clone, Default)]
pub struct CreateRepoRequest {
    pub tenant_id: String,
    pub workspace_name: String,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct CreateRepoResponse {
    pub envelope: Envelope,
    pub repo_id: Uuid,
    pub main_branch_id: Uuid,
}

#[derive(Debug, Clone, Default)]
pub struct AttachBranchRequest {
    pub branch_id: String,
    pub database_id: String,
}

#[derive(Debug, Clone, Default)]
pub struct DetachBranchRequest {
    pub branch_id: String,
}

#[derive(Debug, Clone, Default)]
pub struct CreateCommitByAnchorRequest {
    pub branch_id: String,
    pub message: String,
    pub schema_type: String,
    pub schema_structure: String,
}

#[derive(Debug, Clone)]
pub struct CommitResponse {
    pub envelope: Envelope,
    pub commit_id: Uuid,
    pub code: String,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ForkCommitRequest {
    pub tenant_id: String,
    pub workspace_name: String,
    pub commit_id: String,
    pub new_repo_name: String,
    /// Empty keeps the source dialect; a differing dialect translates.
    pub target_db_type: String,
}

#[derive(Debug, Clone)]
pub struct ForkCommitResponse {
    pub envelope: Envelope,
    pub repo_id: Uuid,
    pub branch_id: Uuid,
    pub commit_id: Uuid,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct BranchCommitRequest {
    pub commit_id: String,
    pub branch_name: String,
}

#[derive(Debug, Clone, Default)]
pub struct MergeCommitRequest {
    pub commit_id: String,
}

#[derive(Debug, Clone, Default)]
pub struct DeployCommitRequest {
    pub commit_id: String,
}

fn parse_id(value: &str, what: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(value).map_err(|_| Status::invalid_argument(format!("{what} is not a valid id")))
}

pub struct RepoService {
    engine: Arc<Engine>,
}

impl RepoService {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }

    pub async fn create_repo(&self, req: CreateRepoRequest) -> ApiResult<CreateRepoResponse> {
        let _guard = self.engine.track_operation();
        let result = self.create_repo_inner(req).await;
        observe(&self.engine, result)
    }

    async fn create_repo_inner(&self, req: CreateRepoRequest) -> ApiResult<CreateRepoResponse> {
        if req.name.is_empty() {
            return Err(Status::invalid_argument("repo name is required"));
        }
        let pool = self.engine.pool();
        let workspace_id = resolve_workspace(pool, &req.tenant_id, &req.workspace_name).await?;

        let (repo, main) = schema_repo::create_repo(
            pool,
            &req.tenant_id,
            workspace_id,
            &req.name,
            &req.description,
        )
        .await?;

        Ok(CreateRepoResponse {
            envelope: Envelope::ok(
                proto_redb::Status::Created,
                format!("repo '{}' created with branch 'main'", repo.name),
            ),
            repo_id: repo.id,
            main_branch_id: main.id,
        })
    }

    pub async fn attach_branch(&self, req: AttachBranchRequest) -> ApiResult<Envelope> {
        let _guard = self.engine.track_operation();
        let result = self.attach_inner(req).await;
        observe(&self.engine, result)
    }

    async fn attach_inner(&self, req: AttachBranchRequest) -> ApiResult<Envelope> {
        let branch_id = parse_id(&req.branch_id, "branch_id")?;
        let database_id = parse_id(&req.database_id, "database_id")?;

        let branch = schema_repo::attach_branch(self.engine.pool(), branch_id, database_id).await?;
        Ok(Envelope::ok(
            proto_redb::Status::Updated,
            format!("branch '{}' attached", branch.name),
        ))
    }

    pub async fn detach_branch(&self, req: DetachBranchRequest) -> ApiResult<Envelope> {
        let _guard = self.engine.track_operation();
        let result = self.detach_inner(req).await;
        observe(&self.engine, result)
    }

    async fn detach_inner(&self, req: DetachBranchRequest) -> ApiResult<Envelope> {
        let branch_id = parse_id(&req.branch_id, "branch_id")?;
        let branch = schema_repo::detach_branch(self.engine.pool(), branch_id).await?;
        Ok(Envelope::ok(
            proto_redb::Status::Updated,
            format!("branch '{}' detached", branch.name),
        ))
    }

    /// The discovery entry point: persist an anchor-extracted schema as the
    /// branch's new head.
    pub async fn create_commit_by_anchor(
        &self,
        req: CreateCommitByAnchorRequest,
    ) -> ApiResult<CommitResponse> {
        let _guard = self.engine.track_operation();
        let result = self.commit_by_anchor_inner(req).await;
        observe(&self.engine, result)
    }

    async fn commit_by_anchor_inner(
        &self,
        req: CreateCommitByAnchorRequest,
    ) -> ApiResult<CommitResponse> {
        let branch_id = parse_id(&req.branch_id, "branch_id")?;
        if req.schema_type.is_empty() {
            return Err(Status::invalid_argument("schema_type is required"));
        }

        let commit = schema_repo::create_commit_by_anchor(
            self.engine.pool(),
            branch_id,
            &req.message,
            &req.schema_type,
            &req.schema_structure,
        )
        .await?;

        Ok(CommitResponse {
            envelope: Envelope::ok(
                proto_redb::Status::Created,
                format!("commit {} created", commit.code),
            ),
            commit_id: commit.id,
            code: commit.code,
            warnings: Vec::new(),
        })
    }

    pub async fn fork_commit(&self, req: ForkCommitRequest) -> ApiResult<ForkCommitResponse> {
        let _guard = self.engine.track_operation();
        let result = self.fork_inner(req).await;
        observe(&self.engine, result)
    }

    async fn fork_inner(&self, req: ForkCommitRequest) -> ApiResult<ForkCommitResponse> {
        let commit_id = parse_id(&req.commit_id, "commit_id")?;
        if req.new_repo_name.is_empty() {
            return Err(Status::invalid_argument("new_repo_name is required"));
        }

        let pool = self.engine.pool();
        let workspace_id = resolve_workspace(pool, &req.tenant_id, &req.workspace_name).await?;

        let runtime = self.engine.runtime()?;
        let translator = runtime
            .unified_model
            .clone()
            .map(|client| crate::connectors::UnifiedModelConnector { client });

        let fork = schema_repo::fork_commit(
            pool,
            translator
                .as_ref()
                .map(|t| t as &dyn crate::connectors::TranslateConnector),
            &req.tenant_id,
            workspace_id,
            commit_id,
            &req.new_repo_name,
            &req.target_db_type,
        )
        .await?;

        Ok(ForkCommitResponse {
            envelope: Envelope::ok(
                proto_redb::Status::Created,
                format!("repo '{}' forked from commit", fork.repo.name),
            ),
            repo_id: fork.repo.id,
            branch_id: fork.branch.id,
            commit_id: fork.commit.id,
            warnings: fork.warnings,
        })
    }

    pub async fn branch_commit(&self, req: BranchCommitRequest) -> ApiResult<CommitResponse> {
        let _guard = self.engine.track_operation();
        let result = self.branch_inner(req).await;
        observe(&self.engine, result)
    }

    async fn branch_inner(&self, req: BranchCommitRequest) -> ApiResult<CommitResponse> {
        let commit_id = parse_id(&req.commit_id, "commit_id")?;
        if req.branch_name.is_empty() {
            return Err(Status::invalid_argument("branch_name is required"));
        }

        let (branch, commit) =
            schema_repo::branch_commit(self.engine.pool(), commit_id, &req.branch_name).await?;

        Ok(CommitResponse {
            envelope: Envelope::ok(
                proto_redb::Status::Created,
                format!("branch '{}' created", branch.name),
            ),
            commit_id: commit.id,
            code: commit.code,
            warnings: Vec::new(),
        })
    }

    pub async fn merge_commit(&self, req: MergeCommitRequest) -> ApiResult<CommitResponse> {
        let _guard = self.engine.track_operation();
        let result = self.merge_inner(req).await;
        observe(&self.engine, result)
    }

    async fn merge_inner(&self, req: MergeCommitRequest) -> ApiResult<CommitResponse> {
        let commit_id = parse_id(&req.commit_id, "commit_id")?;
        let merged = schema_repo::merge_commit(self.engine.pool(), commit_id).await?;

        Ok(CommitResponse {
            envelope: Envelope::ok(
                proto_redb::Status::Created,
                format!("commit {} merged to parent branch", merged.code),
            ),
            commit_id: merged.id,
            code: merged.code,
            warnings: Vec::new(),
        })
    }

    pub async fn deploy_commit(&self, req: DeployCommitRequest) -> ApiResult<Envelope> {
        let _guard = self.engine.track_operation();
        let result = self.deploy_inner(req).await;
        observe(&self.engine, result)
    }

    async fn deploy_inner(&self, req: DeployCommitRequest) -> ApiResult<Envelope> {
        let commit_id = parse_id(&req.commit_id, "commit_id")?;

        let runtime = self.engine.runtime()?;
        let anchor = runtime.anchor()?;

        let database_id = schema_repo::deploy_commit(self.engine.pool(), anchor, commit_id).await?;
        Ok(Envelope::ok(
            proto_redb::Status::Updated,
            format!("commit deployed to database '{database_id}'"),
        ))
    }
}
