//! The resource registry: filterable listing of the URI-addressed
//! container/item catalog.

use sqlx::PgPool;
use tonic::Status;
use uuid::Uuid;

use crate::{db_error, ApiResult};
use core_sql::resources::{self, ResourceContainer, ResourceItem};

pub const DEFAULT_PAGE: i64 = 1;
pub const DEFAULT_PAGE_SIZE: i64 = 25;

/// Resolve `page`/`page_size` into `(limit, offset)`. Zero or negative
/// values fall back to page 1, size 25.
pub fn pagination(page: i64, page_size: i64) -> (i64, i64) {
    let page = if page <= 0 { DEFAULT_PAGE } else { page };
    let size = if page_size <= 0 { DEFAULT_PAGE_SIZE } else { page_size };
    (size, (page - 1) * size)
}

/// Client-facing container filter; workspace scoping happens by name.
#[derive(Debug, Default, Clone)]
pub struct ContainerQuery {
    pub container_type: Option<String>,
    pub protocol: Option<String>,
    pub scope: Option<String>,
    pub online: Option<bool>,
    pub page: i64,
    pub page_size: i64,
}

#[derive(Debug, Default, Clone)]
pub struct ItemQuery {
    pub container_id: Option<Uuid>,
    pub item_type: Option<String>,
    pub data_type: Option<String>,
    pub is_primary_key: Option<bool>,
    pub is_unique: Option<bool>,
    pub is_indexed: Option<bool>,
    pub is_privileged: Option<bool>,
    pub page: i64,
    pub page_size: i64,
}

/// Cross-tenant access to an entity reached by id is refused outright.
pub fn ensure_same_tenant(request_tenant: &str, entity_tenant: &str) -> ApiResult<()> {
    if request_tenant != entity_tenant {
        return Err(Status::permission_denied(
            "cross-tenant access is not permitted",
        ));
    }
    Ok(())
}

pub async fn resolve_workspace(
    pool: &PgPool,
    tenant_id: &str,
    workspace_name: &str,
) -> ApiResult<Uuid> {
    core_sql::workspaces::resolve_id(tenant_id, workspace_name, pool)
        .await
        .map_err(db_error)?
        .ok_or_else(|| Status::not_found(format!("workspace '{workspace_name}' not found")))
}

pub async fn list_containers(
    pool: &PgPool,
    tenant_id: &str,
    workspace_name: &str,
    query: ContainerQuery,
) -> ApiResult<Vec<ResourceContainer>> {
    let workspace_id = resolve_workspace(pool, tenant_id, workspace_name).await?;
    let (limit, offset) = pagination(query.page, query.page_size);

    resources::list_containers(
        resources::ContainerFilter {
            workspace_id: Some(workspace_id),
            container_type: query.container_type,
            protocol: query.protocol,
            scope: query.scope,
            online: query.online,
            limit,
            offset,
        },
        pool,
    )
    .await
    .map_err(db_error)
}

pub async fn list_items(
    pool: &PgPool,
    tenant_id: &str,
    workspace_name: &str,
    query: ItemQuery,
) -> ApiResult<Vec<ResourceItem>> {
    // Workspace scoping is indirect (items hang off containers), but
    // identity resolution still gates the call.
    let _workspace_id = resolve_workspace(pool, tenant_id, workspace_name).await?;
    let (limit, offset) = pagination(query.page, query.page_size);

    resources::list_items(
        resources::ItemFilter {
            container_id: query.container_id,
            item_type: query.item_type,
            data_type: query.data_type,
            is_primary_key: query.is_primary_key,
            is_unique: query.is_unique,
            is_indexed: query.is_indexed,
            is_privileged: query.is_privileged,
            limit,
            offset,
        },
        pool,
    )
    .await
    .map_err(db_error)
}

/// Only `item_display_name` is user-editable today; `updated` always bumps.
pub async fn modify_resource_item(
    pool: &PgPool,
    item_id: Uuid,
    item_display_name: &str,
) -> ApiResult<ResourceItem> {
    resources::modify_item_display_name(item_id, item_display_name, pool)
        .await
        .map_err(db_error)?
        .ok_or_else(|| Status::not_found(format!("resource item '{item_id}' not found")))
}

#[cfg(test)]
mod test {
    use super::{ensure_same_tenant, pagination};

    #[test]
    fn pagination_defaults_apply_on_zero() {
        assert_eq!(pagination(0, 0), (25, 0));
        assert_eq!(pagination(1, 25), (25, 0));
        assert_eq!(pagination(3, 10), (10, 20));
        assert_eq!(pagination(-2, -5), (25, 0));
        assert_eq!(pagination(2, 0), (25, 25));
    }

    #[test]
    fn cross_tenant_access_is_refused() {
        assert!(ensure_same_tenant("t1", "t1").is_ok());
        let err = ensure_same_tenant("t1", "t2").unwrap_err();
        assert_eq!(err.code(), tonic::Code::PermissionDenied);
    }
}
