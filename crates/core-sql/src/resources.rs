use chrono::{DateTime, Utc};
use sqlx::types::Uuid;

use crate::Json;

/// ResourceContainer is one entry of the URI-addressed catalog: a database,
/// instance, integration, or MCP server known to the workspace.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ResourceContainer {
    pub id: Uuid,
    pub tenant_id: String,
    pub workspace_id: Uuid,
    pub container_type: String,
    pub name: String,
    pub protocol: String,
    pub scope: String,
    pub metadata: Json,
    pub online: bool,
    pub item_count: i32,
    pub size_bytes: i64,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

/// ResourceItem is a typed row under a container: a table, column, topic,
/// or similar addressable object.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ResourceItem {
    pub id: Uuid,
    pub container_id: Uuid,
    pub item_name: String,
    pub item_display_name: String,
    pub item_type: String,
    pub data_type: String,
    pub ordinal: Option<i32>,
    pub is_primary_key: bool,
    pub is_unique: bool,
    pub is_indexed: bool,
    pub is_nullable: bool,
    pub is_array: bool,
    pub is_privileged: bool,
    /// Confidence of the privileged-data classifier, 0.0 when unclassified.
    pub detection_confidence: f64,
    pub metadata: Json,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

const CONTAINER_COLUMNS: &str = "id, tenant_id, workspace_id, container_type, name, protocol, \
     scope, metadata, online, item_count, size_bytes, created, updated";
const ITEM_COLUMNS: &str = "id, container_id, item_name, item_display_name, item_type, \
     data_type, ordinal, is_primary_key, is_unique, is_indexed, is_nullable, is_array, \
     is_privileged, detection_confidence, metadata, created, updated";

/// Filter of `ListContainers`. Absent fields do not constrain.
#[derive(Debug, Default, Clone)]
pub struct ContainerFilter {
    pub workspace_id: Option<Uuid>,
    pub container_type: Option<String>,
    pub protocol: Option<String>,
    pub scope: Option<String>,
    pub online: Option<bool>,
    pub limit: i64,
    pub offset: i64,
}

/// Filter of `ListItems`. Absent fields do not constrain.
#[derive(Debug, Default, Clone)]
pub struct ItemFilter {
    pub container_id: Option<Uuid>,
    pub item_type: Option<String>,
    pub data_type: Option<String>,
    pub is_primary_key: Option<bool>,
    pub is_unique: Option<bool>,
    pub is_indexed: Option<bool>,
    pub is_privileged: Option<bool>,
    pub limit: i64,
    pub offset: i64,
}

/// Containers matching the filter, newest first.
pub async fn list_containers(
    filter: ContainerFilter,
    db: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
) -> sqlx::Result<Vec<ResourceContainer>> {
    let mut builder = sqlx::QueryBuilder::new(format!(
        "select {CONTAINER_COLUMNS} from resource_containers where true"
    ));
    if let Some(workspace_id) = filter.workspace_id {
        builder.push(" and workspace_id = ").push_bind(workspace_id);
    }
    if let Some(container_type) = filter.container_type {
        builder
            .push(" and container_type = ")
            .push_bind(container_type);
    }
    if let Some(protocol) = filter.protocol {
        builder.push(" and protocol = ").push_bind(protocol);
    }
    if let Some(scope) = filter.scope {
        builder.push(" and scope = ").push_bind(scope);
    }
    if let Some(online) = filter.online {
        builder.push(" and online = ").push_bind(online);
    }
    builder.push(" order by created desc");
    builder.push(" limit ").push_bind(filter.limit);
    builder.push(" offset ").push_bind(filter.offset);

    builder
        .build_query_as::<ResourceContainer>()
        .fetch_all(db)
        .await
}

/// Items matching the filter: ordinal ascending with nulls last, creation
/// ascending as the tiebreak.
pub async fn list_items(
    filter: ItemFilter,
    db: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
) -> sqlx::Result<Vec<ResourceItem>> {
    let mut builder = sqlx::QueryBuilder::new(format!(
        "select {ITEM_COLUMNS} from resource_items where true"
    ));
    if let Some(container_id) = filter.container_id {
        builder.push(" and container_id = ").push_bind(container_id);
    }
    if let Some(item_type) = filter.item_type {
        builder.push(" and item_type = ").push_bind(item_type);
    }
    if let Some(data_type) = filter.data_type {
        builder.push(" and data_type = ").push_bind(data_type);
    }
    if let Some(is_primary_key) = filter.is_primary_key {
        builder
            .push(" and is_primary_key = ")
            .push_bind(is_primary_key);
    }
    if let Some(is_unique) = filter.is_unique {
        builder.push(" and is_unique = ").push_bind(is_unique);
    }
    if let Some(is_indexed) = filter.is_indexed {
        builder.push(" and is_indexed = ").push_bind(is_indexed);
    }
    if let Some(is_privileged) = filter.is_privileged {
        builder
            .push(" and is_privileged = ")
            .push_bind(is_privileged);
    }
    builder.push(" order by ordinal asc nulls last, created asc");
    builder.push(" limit ").push_bind(filter.limit);
    builder.push(" offset ").push_bind(filter.offset);

    builder.build_query_as::<ResourceItem>().fetch_all(db).await
}

pub async fn get_container(
    id: Uuid,
    db: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
) -> sqlx::Result<Option<ResourceContainer>> {
    sqlx::query_as::<_, ResourceContainer>(&format!(
        "select {CONTAINER_COLUMNS} from resource_containers where id = $1"
    ))
    .bind(id)
    .fetch_optional(db)
    .await
}

pub async fn get_item(
    id: Uuid,
    db: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
) -> sqlx::Result<Option<ResourceItem>> {
    sqlx::query_as::<_, ResourceItem>(&format!(
        "select {ITEM_COLUMNS} from resource_items where id = $1"
    ))
    .bind(id)
    .fetch_optional(db)
    .await
}

/// Only `item_display_name` is user-editable; `updated` always bumps.
pub async fn modify_item_display_name(
    id: Uuid,
    item_display_name: &str,
    db: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
) -> sqlx::Result<Option<ResourceItem>> {
    sqlx::query_as::<_, ResourceItem>(&format!(
        "update resource_items set item_display_name = $2, updated = now()
         where id = $1
         returning {ITEM_COLUMNS}"
    ))
    .bind(id)
    .bind(item_display_name)
    .fetch_optional(db)
    .await
}

pub struct NewContainer<'a> {
    pub tenant_id: &'a str,
    pub workspace_id: Uuid,
    pub container_type: &'a str,
    pub name: &'a str,
    pub protocol: &'a str,
    pub scope: &'a str,
    pub metadata: Json,
}

pub async fn create_container(
    new: NewContainer<'_>,
    db: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
) -> sqlx::Result<ResourceContainer> {
    sqlx::query_as::<_, ResourceContainer>(&format!(
        "insert into resource_containers
           (id, tenant_id, workspace_id, container_type, name, protocol, scope, metadata,
            online, item_count, size_bytes)
         values ($1, $2, $3, $4, $5, $6, $7, $8, false, 0, 0)
         returning {CONTAINER_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(new.tenant_id)
    .bind(new.workspace_id)
    .bind(new.container_type)
    .bind(new.name)
    .bind(new.protocol)
    .bind(new.scope)
    .bind(new.metadata)
    .fetch_one(db)
    .await
}

pub struct NewItem<'a> {
    pub container_id: Uuid,
    pub item_name: &'a str,
    pub item_type: &'a str,
    pub data_type: &'a str,
    pub ordinal: Option<i32>,
    pub is_primary_key: bool,
    pub is_unique: bool,
    pub is_indexed: bool,
    pub is_nullable: bool,
    pub is_array: bool,
    pub is_privileged: bool,
    pub detection_confidence: f64,
    pub metadata: Json,
}

pub async fn create_item(
    new: NewItem<'_>,
    db: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
) -> sqlx::Result<ResourceItem> {
    sqlx::query_as::<_, ResourceItem>(&format!(
        "insert into resource_items
           (id, container_id, item_name, item_display_name, item_type, data_type, ordinal,
            is_primary_key, is_unique, is_indexed, is_nullable, is_array, is_privileged,
            detection_confidence, metadata)
         values ($1, $2, $3, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
         returning {ITEM_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(new.container_id)
    .bind(new.item_name)
    .bind(new.item_type)
    .bind(new.data_type)
    .bind(new.ordinal)
    .bind(new.is_primary_key)
    .bind(new.is_unique)
    .bind(new.is_indexed)
    .bind(new.is_nullable)
    .bind(new.is_array)
    .bind(new.is_privileged)
    .bind(new.detection_confidence)
    .bind(new.metadata)
    .fetch_one(db)
    .await
}

pub async fn delete_container(
    id: Uuid,
    force: bool,
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
) -> sqlx::Result<u64> {
    if force {
        sqlx::query("delete from resource_items where container_id = $1")
            .bind(id)
            .execute(&mut **txn)
            .await?;
    }
    let done = sqlx::query("delete from resource_containers where id = $1")
        .bind(id)
        .execute(&mut **txn)
        .await?;
    Ok(done.rows_affected())
}
