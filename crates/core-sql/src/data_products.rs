use chrono::{DateTime, Utc};
use sqlx::types::Uuid;

/// DataProduct is a named, ordered bundle of resource items. Ordering is
/// user-controlled and stable across reads.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DataProduct {
    pub id: Uuid,
    pub tenant_id: String,
    pub workspace_id: Uuid,
    pub name: String,
    pub description: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DataProductItem {
    pub data_product_id: Uuid,
    pub resource_item_id: Uuid,
    pub item_order: i32,
}

const COLUMNS: &str = "id, tenant_id, workspace_id, name, description, created, updated";

pub async fn get_by_id(
    id: Uuid,
    db: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
) -> sqlx::Result<Option<DataProduct>> {
    sqlx::query_as::<_, DataProduct>(&format!("select {COLUMNS} from data_products where id = $1"))
        .bind(id)
        .fetch_optional(db)
        .await
}

pub async fn get_by_name(
    workspace_id: Uuid,
    name: &str,
    db: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
) -> sqlx::Result<Option<DataProduct>> {
    sqlx::query_as::<_, DataProduct>(&format!(
        "select {COLUMNS} from data_products where workspace_id = $1 and name = $2"
    ))
    .bind(workspace_id)
    .bind(name)
    .fetch_optional(db)
    .await
}

pub async fn list(
    workspace_id: Uuid,
    db: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
) -> sqlx::Result<Vec<DataProduct>> {
    sqlx::query_as::<_, DataProduct>(&format!(
        "select {COLUMNS} from data_products where workspace_id = $1 order by created desc"
    ))
    .bind(workspace_id)
    .fetch_all(db)
    .await
}

/// Create the product and its ordered item rows in the caller's
/// transaction: either everything commits or nothing does.
pub async fn create(
    tenant_id: &str,
    workspace_id: Uuid,
    name: &str,
    description: &str,
    resource_item_ids: &[Uuid],
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
) -> sqlx::Result<DataProduct> {
    let product = sqlx::query_as::<_, DataProduct>(&format!(
        "insert into data_products (id, tenant_id, workspace_id, name, description)
         values ($1, $2, $3, $4, $5)
         returning {COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(tenant_id)
    .bind(workspace_id)
    .bind(name)
    .bind(description)
    .fetch_one(&mut **txn)
    .await?;

    for (order, item_id) in resource_item_ids.iter().enumerate() {
        sqlx::query(
            "insert into data_product_items (data_product_id, resource_item_id, item_order)
             values ($1, $2, $3)",
        )
        .bind(product.id)
        .bind(item_id)
        .bind(order as i32)
        .execute(&mut **txn)
        .await?;
    }

    Ok(product)
}

/// Item ids of the product, in their stable user-defined order.
pub async fn item_ids(
    data_product_id: Uuid,
    db: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
) -> sqlx::Result<Vec<Uuid>> {
    sqlx::query_scalar::<_, Uuid>(
        "select resource_item_id from data_product_items
         where data_product_id = $1 order by item_order asc",
    )
    .bind(data_product_id)
    .fetch_all(db)
    .await
}

pub async fn delete(
    id: Uuid,
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
) -> sqlx::Result<u64> {
    sqlx::query("delete from data_product_items where data_product_id = $1")
        .bind(id)
        .execute(&mut **txn)
        .await?;
    let done = sqlx::query("delete from data_products where id = $1")
        .bind(id)
        .execute(&mut **txn)
        .await?;
    Ok(done.rows_affected())
}
