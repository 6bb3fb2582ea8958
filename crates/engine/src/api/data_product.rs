//! Data-product service: ordered bundles of resource items. Creation is
//! transactional: the product and all its ordered item rows commit
//! together or not at all.

use std::sync::Arc;

use tonic::Status;
use uuid::Uuid;

use super::{observe, Envelope};
use crate::engine::Engine;
use crate::registry::resolve_workspace;
use crate::{db_error, ApiResult};
use core_sql::data_products::{self, DataProduct};

#[derive(Debug, Clone, Default)]
pub struct CreateDataProductRequest {
    pub tenant_id: String,
    pub workspace_name: String,
    pub name: String,
    pub description: String,
    /// Resource items of the product, in user order.
    pub resource_item_ids: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct GetDataProductRequest {
    pub tenant_id: String,
    pub workspace_name: String,
    pub name: String,
}

#[derive(Debug, Clone, Default)]
pub struct ListDataProductsRequest {
    pub tenant_id: String,
    pub workspace_name: String,
}

#[derive(Debug, Clone)]
pub struct ListDataProductsResponse {
    pub envelope: Envelope,
    pub data_products: Vec<DataProduct>,
}

#[derive(Debug, Clone, Default)]
pub struct DeleteDataProductRequest {
    pub tenant_id: String,
    pub workspace_name: String,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct DataProductResponse {
    pub envelope: Envelope,
    pub data_product: DataProduct,
    pub item_ids: Vec<Uuid>,
}

pub struct DataProductService {
    engine: Arc<Engine>,
}

impl DataProductService {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }

    pub async fn create_data_product(
        &self,
        req: CreateDataProductRequest,
    ) -> ApiResult<DataProductResponse> {
        let _guard = self.engine.track_operation();
        let result = self.create_inner(req).await;
        observe(&self.engine, result)
    }

    async fn create_inner(&self, req: CreateDataProductRequest) -> ApiResult<DataProductResponse> {
        if req.name.is_empty() {
            return Err(Status::invalid_argument("data product name is required"));
        }
        let item_ids = req
            .resource_item_ids
            .iter()
            .map(|id| Uuid::parse_str(id))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| Status::invalid_argument("resource_item_ids contains an invalid id"))?;

        let pool = self.engine.pool();
        let workspace_id = resolve_workspace(pool, &req.tenant_id, &req.workspace_name).await?;

        let mut txn = pool.begin().await.map_err(db_error)?;
        let product = data_products::create(
            &req.tenant_id,
            workspace_id,
            &req.name,
            &req.description,
            &item_ids,
            &mut txn,
        )
        .await
        .map_err(db_error)?;
        txn.commit().await.map_err(db_error)?;

        Ok(DataProductResponse {
            envelope: Envelope::ok(
                proto_redb::Status::Created,
                format!("data product '{}' created", product.name),
            ),
            data_product: product,
            item_ids,
        })
    }

    pub async fn get_data_product(
        &self,
        req: GetDataProductRequest,
    ) -> ApiResult<DataProductResponse> {
        let _guard = self.engine.track_operation();
        let result = self.get_inner(req).await;
        observe(&self.engine, result)
    }

    async fn get_inner(&self, req: GetDataProductRequest) -> ApiResult<DataProductResponse> {
        let pool = self.engine.pool();
        let workspace_id = resolve_workspace(pool, &req.tenant_id, &req.workspace_name).await?;

        let product = data_products::get_by_name(workspace_id, &req.name, pool)
            .await
            .map_err(db_error)?
            .ok_or_else(|| Status::not_found(format!("data product '{}' not found", req.name)))?;

        // Item order is stable and user-controlled.
        let item_ids = data_products::item_ids(product.id, pool)
            .await
            .map_err(db_error)?;

        Ok(DataProductResponse {
            envelope: Envelope::ok(proto_redb::Status::Success, "data product"),
            data_product: product,
            item_ids,
        })
    }

    pub async fn list_data_products(
        &self,
        req: ListDataProductsRequest,
    ) -> ApiResult<ListDataProductsResponse> {
        let _guard = self.engine.track_operation();
        let result = self.list_inner(req).await;
        observe(&self.engine, result)
    }

    async fn list_inner(&self, req: ListDataProductsRequest) -> ApiResult<ListDataProductsResponse> {
        let pool = self.engine.pool();
        let workspace_id = resolve_workspace(pool, &req.tenant_id, &req.workspace_name).await?;

        let data_products = data_products::list(workspace_id, pool)
            .await
            .map_err(db_error)?;

        Ok(ListDataProductsResponse {
            envelope: Envelope::ok(
                proto_redb::Status::Success,
                format!("{} data products", data_products.len()),
            ),
            data_products,
        })
    }

    pub async fn delete_data_product(&self, req: DeleteDataProductRequest) -> ApiResult<Envelope> {
        let _guard = self.engine.track_operation();
        let result = self.delete_inner(req).await;
        observe(&self.engine, result)
    }

    async fn delete_inner(&self, req: DeleteDataProductRequest) -> ApiResult<Envelope> {
        let pool = self.engine.pool();
        let workspace_id = resolve_workspace(pool, &req.tenant_id, &req.workspace_name).await?;

        let product = data_products::get_by_name(workspace_id, &req.name, pool)
            .await
            .map_err(db_error)?
            .ok_or_else(|| Status::not_found(format!("data product '{}' not found", req.name)))?;

        let mut txn = pool.begin().await.map_err(db_error)?;
        data_products::delete(product.id, &mut txn)
            .await
            .map_err(db_error)?;
        txn.commit().await.map_err(db_error)?;

        Ok(Envelope::ok(
            proto_redb::Status::Deleted,
            format!("data product '{}' deleted", req.name),
        ))
    }
}
