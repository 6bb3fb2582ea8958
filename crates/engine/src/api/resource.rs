//! Resource service: the URI-addressed container/item catalog.

use std::sync::Arc;

use tonic::Status;
use uuid::Uuid;

use super::{observe, Envelope};
use crate::engine::Engine;
use crate::registry::{self, ContainerQuery, ItemQuery};
use crate::ApiResult;
use core_sql::resources::{ResourceContainer, ResourceItem};

#[derive(Debug, Clone, Default)]
pub struct ListContainersRequest {
    pub tenant_id: String,
    pub workspace_name: String,
    pub container_type: Option<String>,
    pub protocol: Option<String>,
    pub scope: Option<String>,
    pub online: Option<bool>,
    pub page: i64,
    pub page_size: i64,
}

#[derive(Debug, Clone, Default)]
pub struct ListItemsRequest {
    pub tenant_id: String,
    pub workspace_name: String,
    pub container_id: String,
    pub item_type: Option<String>,
    pub data_type: Option<String>,
    pub is_primary_key: Option<bool>,
    pub is_unique: Option<bool>,
    pub is_indexed: Option<bool>,
    pub is_privileged: Option<bool>,
    pub page: i64,
    pub page_size: i64,
}

#[derive(Debug, Clone, Default)]
pub struct ModifyResourceItemRequest {
    pub item_id: String,
    pub item_display_name: String,
}

#[derive(Debug, Clone)]
pub struct ListContainersResponse {
    pub envelope: Envelope,
    pub containers: Vec<ResourceContainer>,
}

#[derive(Debug, Clone)]
pub struct ListItemsResponse {
    pub envelope: Envelope,
    pub items: Vec<ResourceItem>,
}

#[derive(Debug, Clone)]
pub struct ModifyResourceItemResponse {
    pub envelope: Envelope,
    pub item: ResourceItem,
}

pub struct ResourceService {
    engine: Arc<Engine>,
}

impl ResourceService {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }

    pub async fn list_containers(
        &self,
        req: ListContainersRequest,
    ) -> ApiResult<ListContainersResponse> {
        let _guard = self.engine.track_operation();
        let result = self.list_containers_inner(req).await;
        observe(&self.engine, result)
    }

    async fn list_containers_inner(
        &self,
        req: ListContainersRequest,
    ) -> ApiResult<ListContainersResponse> {
        let containers = registry::list_containers(
            self.engine.pool(),
            &req.tenant_id,
            &req.workspace_name,
            ContainerQuery {
                container_type: req.container_type,
                protocol: req.protocol,
                scope: req.scope,
                online: req.online,
                page: req.page,
                page_size: req.page_size,
            },
        )
        .await?;

        Ok(ListContainersResponse {
            envelope: Envelope::ok(
                proto_redb::Status::Success,
                format!("{} containers", containers.len()),
            ),
            containers,
        })
    }

    pub async fn list_items(&self, req: ListItemsRequest) -> ApiResult<ListItemsResponse> {
        let _guard = self.engine.track_operation();
        let result = self.list_items_inner(req).await;
        observe(&self.engine, result)
    }

    async fn list_items_inner(&self, req: ListItemsRequest) -> ApiResult<ListItemsResponse> {
        let container_id = if req.container_id.is_empty() {
            None
        } else {
            Some(
                Uuid::parse_str(&req.container_id)
                    .map_err(|_| Status::invalid_argument("container_id is not a valid id"))?,
            )
        };

        let items = registry::list_items(
            self.engine.pool(),
            &req.tenant_id,
            &req.workspace_name,
            ItemQuery {
                container_id,
                item_type: req.item_type,
                data_type: req.data_type,
                is_primary_key: req.is_primary_key,
                is_unique: req.is_unique,
                is_indexed: req.is_indexed,
                is_privileged: req.is_privileged,
                page: req.page,
                page_size: req.page_size,
            },
        )
        .await?;

        Ok(ListItemsResponse {
            envelope: Envelope::ok(
                proto_redb::Status::Success,
                format!("{} items", items.len()),
            ),
            items,
        })
    }

    pub async fn modify_resource_item(
        &self,
        req: ModifyResourceItemRequest,
    ) -> ApiResult<ModifyResourceItemResponse> {
        let _guard = self.engine.track_operation();
        let result = self.modify_item_inner(req).await;
        observe(&self.engine, result)
    }

    async fn modify_item_inner(
        &self,
        req: ModifyResourceItemRequest,
    ) -> ApiResult<ModifyResourceItemResponse> {
        let item_id = Uuid::parse_str(&req.item_id)
            .map_err(|_| Status::invalid_argument("item_id is not a valid id"))?;
        if req.item_display_name.is_empty() {
            return Err(Status::invalid_argument("item_display_name is required"));
        }

        let item =
            registry::modify_resource_item(self.engine.pool(), item_id, &req.item_display_name)
                .await?;

        Ok(ModifyResourceItemResponse {
            envelope: Envelope::ok(proto_redb::Status::Updated, "resource item updated"),
            item,
        })
    }
}
