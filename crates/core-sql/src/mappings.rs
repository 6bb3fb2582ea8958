use chrono::{DateTime, Utc};
use sqlx::types::Uuid;

use crate::Json;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Mapping {
    pub id: Uuid,
    pub tenant_id: String,
    pub workspace_id: Uuid,
    pub name: String,
    pub description: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

/// Rule is one column-level mapping within a Mapping. Source and target are
/// `redb://` resource URIs; `transformation_name` names a function of the
/// Transformation service, or `direct_mapping` for a verbatim copy.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Rule {
    pub id: Uuid,
    pub mapping_id: Uuid,
    pub name: String,
    pub source_resource_uri: String,
    pub target_resource_uri: String,
    pub transformation_name: String,
    pub transformation_options: Json,
    pub metadata: Json,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

const MAPPING_COLUMNS: &str = "id, tenant_id, workspace_id, name, description, created, updated";
const RULE_COLUMNS: &str = "id, mapping_id, name, source_resource_uri, target_resource_uri, \
     transformation_name, transformation_options, metadata, created, updated";

pub async fn get_by_id(
    id: Uuid,
    db: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
) -> sqlx::Result<Option<Mapping>> {
    sqlx::query_as::<_, Mapping>(&format!("select {MAPPING_COLUMNS} from mappings where id = $1"))
        .bind(id)
        .fetch_optional(db)
        .await
}

pub async fn get_by_name(
    workspace_id: Uuid,
    name: &str,
    db: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
) -> sqlx::Result<Option<Mapping>> {
    sqlx::query_as::<_, Mapping>(&format!(
        "select {MAPPING_COLUMNS} from mappings where workspace_id = $1 and name = $2"
    ))
    .bind(workspace_id)
    .bind(name)
    .fetch_optional(db)
    .await
}

pub async fn list(
    workspace_id: Uuid,
    db: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
) -> sqlx::Result<Vec<Mapping>> {
    sqlx::query_as::<_, Mapping>(&format!(
        "select {MAPPING_COLUMNS} from mappings where workspace_id = $1 order by created desc"
    ))
    .bind(workspace_id)
    .fetch_all(db)
    .await
}

pub async fn create(
    tenant_id: &str,
    workspace_id: Uuid,
    name: &str,
    description: &str,
    db: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
) -> sqlx::Result<Mapping> {
    sqlx::query_as::<_, Mapping>(&format!(
        "insert into mappings (id, tenant_id, workspace_id, name, description)
         values ($1, $2, $3, $4, $5)
         returning {MAPPING_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(tenant_id)
    .bind(workspace_id)
    .bind(name)
    .bind(description)
    .fetch_one(db)
    .await
}

pub async fn delete(
    id: Uuid,
    force: bool,
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
) -> sqlx::Result<u64> {
    if force {
        sqlx::query("delete from mapping_rules where mapping_id = $1")
            .bind(id)
            .execute(&mut **txn)
            .await?;
    }
    let done = sqlx::query("delete from mappings where id = $1")
        .bind(id)
        .execute(&mut **txn)
        .await?;
    Ok(done.rows_affected())
}

/// The rule set of a mapping, in creation order.
pub async fn rules_for_mapping(
    mapping_id: Uuid,
    db: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
) -> sqlx::Result<Vec<Rule>> {
    sqlx::query_as::<_, Rule>(&format!(
        "select {RULE_COLUMNS} from mapping_rules where mapping_id = $1 order by created asc"
    ))
    .bind(mapping_id)
    .fetch_all(db)
    .await
}

pub struct NewRule<'a> {
    pub mapping_id: Uuid,
    pub name: &'a str,
    pub source_resource_uri: &'a str,
    pub target_resource_uri: &'a str,
    pub transformation_name: &'a str,
    pub transformation_options: Json,
    pub metadata: Json,
}

pub async fn create_rule(
    new: NewRule<'_>,
    db: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
) -> sqlx::Result<Rule> {
    sqlx::query_as::<_, Rule>(&format!(
        "insert into mapping_rules (id, mapping_id, name, source_resource_uri,
                                    target_resource_uri, transformation_name,
                                    transformation_options, metadata)
         values ($1, $2, $3, $4, $5, $6, $7, $8)
         returning {RULE_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(new.mapping_id)
    .bind(new.name)
    .bind(new.source_resource_uri)
    .bind(new.target_resource_uri)
    .bind(new.transformation_name)
    .bind(new.transformation_options)
    .bind(new.metadata)
    .fetch_one(db)
    .await
}

pub async fn delete_rule(
    id: Uuid,
    db: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
) -> sqlx::Result<u64> {
    let done = sqlx::query("delete from mapping_rules where id = $1")
        .bind(id)
        .execute(db)
        .await?;
    Ok(done.rows_affected())
}
