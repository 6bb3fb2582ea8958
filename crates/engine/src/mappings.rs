//! Mapping-rule grouping and per-row transformation dispatch.
//!
//! Rules address their endpoints with `redb://` URIs. The copy pipeline and
//! the relationship orchestrator both consume rules grouped into table
//! pairs; transformation happens rule by rule against the Transformation
//! service, with `direct_mapping` (or an absent name) copying verbatim.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::connectors::TransformConnector;
use crate::resource_uri::ResourceUri;

pub const DIRECT_MAPPING: &str = "direct_mapping";

/// One source-column to target-column binding inside a table pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleBinding {
    pub source_column: String,
    pub target_column: String,
    pub transformation_name: String,
}

/// All rules of a mapping that couple one source table to one target table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TablePair {
    pub source_database_id: String,
    pub source_table: String,
    pub target_database_id: String,
    pub target_table: String,
    pub bindings: Vec<RuleBinding>,
}

impl TablePair {
    /// Legacy `databaseId.tableName` pairing key, used only for internal
    /// bucketing and progress labels.
    pub fn source_key(&self) -> String {
        format!("{}.{}", self.source_database_id, self.source_table)
    }

    pub fn target_key(&self) -> String {
        format!("{}.{}", self.target_database_id, self.target_table)
    }

    /// The source columns the pair's rules actually reference.
    pub fn source_columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = Vec::new();
        for binding in &self.bindings {
            if !columns.contains(&binding.source_column) {
                columns.push(binding.source_column.clone());
            }
        }
        columns
    }
}

/// Bucket rules by their `(source db.table, target db.table)` pair. Rules
/// with a missing or malformed URI, or without a column on either side, are
/// skipped with a warning rather than failing the whole set.
pub fn group_by_tables(rules: &[core_sql::mappings::Rule]) -> (Vec<TablePair>, Vec<String>) {
    let mut buckets: BTreeMap<(String, String), TablePair> = BTreeMap::new();
    let mut warnings = Vec::new();

    for rule in rules {
        if rule.source_resource_uri.is_empty() || rule.target_resource_uri.is_empty() {
            warnings.push(format!(
                "rule '{}' is missing a source or target resource URI and was skipped",
                rule.name
            ));
            continue;
        }

        let (source, target) = match (
            ResourceUri::parse(&rule.source_resource_uri),
            ResourceUri::parse(&rule.target_resource_uri),
        ) {
            (Ok(source), Ok(target)) => (source, target),
            (Err(err), _) | (_, Err(err)) => {
                warnings.push(format!("rule '{}' has a bad resource URI: {err}", rule.name));
                continue;
            }
        };

        let (source_column, target_column) = match (source.column(), target.column()) {
            (Some(s), Some(t)) => (s.to_string(), t.to_string()),
            _ => {
                warnings.push(format!(
                    "rule '{}' does not name a column on both sides and was skipped",
                    rule.name
                ));
                continue;
            }
        };

        let key = (
            format!("{}.{}", source.database_id, source.object_name),
            format!("{}.{}", target.database_id, target.object_name),
        );
        let pair = buckets.entry(key).or_insert_with(|| TablePair {
            source_database_id: source.database_id.clone(),
            source_table: source.object_name.clone(),
            target_database_id: target.database_id.clone(),
            target_table: target.object_name.clone(),
            bindings: Vec::new(),
        });
        pair.bindings.push(RuleBinding {
            source_column,
            target_column,
            transformation_name: rule.transformation_name.clone(),
        });
    }

    (buckets.into_values().collect(), warnings)
}

/// All rules of one mapping must target a single source database and a
/// single target database.
pub fn ensure_single_database(pairs: &[TablePair]) -> anyhow::Result<()> {
    let mut sources: Vec<&str> = pairs.iter().map(|p| p.source_database_id.as_str()).collect();
    let mut targets: Vec<&str> = pairs.iter().map(|p| p.target_database_id.as_str()).collect();
    sources.sort_unstable();
    sources.dedup();
    targets.sort_unstable();
    targets.dedup();

    if sources.len() > 1 || targets.len() > 1 {
        anyhow::bail!(
            "mapping rules span multiple databases (sources: {sources:?}, targets: {targets:?})"
        );
    }
    Ok(())
}

/// Apply a pair's bindings to one source row document, producing the target
/// row. Nulls copy as nulls. A transformation failure is non-fatal: the
/// original value is carried through and a warning is recorded.
pub async fn transform_row(
    row: &str,
    bindings: &[RuleBinding],
    transformer: Option<&dyn TransformConnector>,
) -> anyhow::Result<(String, Vec<String>)> {
    let source: Value = serde_json::from_str(row)?;
    let source = source
        .as_object()
        .ok_or_else(|| anyhow::anyhow!("source row is not a JSON object"))?;

    let mut target = serde_json::Map::new();
    let mut warnings = Vec::new();

    for binding in bindings {
        let Some(value) = source.get(&binding.source_column) else {
            continue;
        };

        let direct = binding.transformation_name.is_empty()
            || binding.transformation_name == DIRECT_MAPPING;

        if direct || value.is_null() {
            target.insert(binding.target_column.clone(), value.clone());
            continue;
        }

        let input = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };

        let transformed = match transformer {
            Some(transformer) => {
                transformer
                    .transform(&binding.transformation_name, &input)
                    .await
            }
            None => Err(anyhow::anyhow!("transformation service is not available")),
        };

        match transformed {
            Ok(output) => {
                // The function returns a string; re-parse so numeric and
                // structured outputs land typed in the target document.
                let parsed = serde_json::from_str::<Value>(&output)
                    .unwrap_or_else(|_| Value::String(output));
                target.insert(binding.target_column.clone(), parsed);
            }
            Err(err) => {
                warnings.push(format!(
                    "transformation '{}' failed on column '{}': {err:#}; carried original value",
                    binding.transformation_name, binding.source_column
                ));
                target.insert(binding.target_column.clone(), value.clone());
            }
        }
    }

    Ok((Value::Object(target).to_string(), warnings))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::connectors::TransformConnector;
    use async_trait::async_trait;
    use core_sql::mappings::Rule;
    use pretty_assertions::assert_eq;

    fn rule(name: &str, source: &str, target: &str, transformation: &str) -> Rule {
        Rule {
            id: uuid::Uuid::new_v4(),
            mapping_id: uuid::Uuid::new_v4(),
            name: name.to_string(),
            source_resource_uri: source.to_string(),
            target_resource_uri: target.to_string(),
            transformation_name: transformation.to_string(),
            transformation_options: core_sql::empty_json(),
            metadata: core_sql::empty_json(),
            created: chrono::Utc::now(),
            updated: chrono::Utc::now(),
        }
    }

    struct Upper;
    #[async_trait]
    impl TransformConnector for Upper {
        async fn transform(&self, function_name: &str, input: &str) -> anyhow::Result<String> {
            match function_name {
                "uppercase" => Ok(input.to_uppercase()),
                other => anyhow::bail!("unknown function '{other}'"),
            }
        }
    }

    #[test]
    fn groups_rules_by_table_pair() {
        let rules = vec![
            rule(
                "r1",
                "redb://src/table/orders/column:id",
                "redb://tgt/table/orders/column:id",
                DIRECT_MAPPING,
            ),
            rule(
                "r2",
                "redb://src/table/orders/column:total",
                "redb://tgt/table/orders/column:amount",
                "",
            ),
            rule(
                "r3",
                "redb://src/table/users/column:email",
                "redb://tgt/table/customers/column:email",
                "uppercase",
            ),
        ];

        let (pairs, warnings) = group_by_tables(&rules);
        assert!(warnings.is_empty());
        assert_eq!(pairs.len(), 2);

        let orders = pairs.iter().find(|p| p.source_table == "orders").unwrap();
        assert_eq!(orders.bindings.len(), 2);
        assert_eq!(orders.source_key(), "src.orders");
        assert_eq!(orders.target_key(), "tgt.orders");
        assert_eq!(orders.source_columns(), vec!["id", "total"]);

        let users = pairs.iter().find(|p| p.source_table == "users").unwrap();
        assert_eq!(users.target_table, "customers");

        assert!(ensure_single_database(&pairs).is_ok());
    }

    #[test]
    fn skips_unusable_rules_with_warnings() {
        let rules = vec![
            rule("empty", "", "redb://tgt/table/t/column:c", DIRECT_MAPPING),
            rule(
                "bad-scheme",
                "http://src/table/t/column:c",
                "redb://tgt/table/t/column:c",
                DIRECT_MAPPING,
            ),
            rule(
                "table-level",
                "redb://src/table/t",
                "redb://tgt/table/t/column:c",
                DIRECT_MAPPING,
            ),
        ];

        let (pairs, warnings) = group_by_tables(&rules);
        assert!(pairs.is_empty());
        assert_eq!(warnings.len(), 3);
    }

    #[test]
    fn rejects_rules_spanning_databases() {
        let rules = vec![
            rule(
                "r1",
                "redb://src-a/table/t/column:c",
                "redb://tgt/table/t/column:c",
                DIRECT_MAPPING,
            ),
            rule(
                "r2",
                "redb://src-b/table/t/column:c",
                "redb://tgt/table/t/column:c",
                DIRECT_MAPPING,
            ),
        ];

        let (pairs, _) = group_by_tables(&rules);
        assert!(ensure_single_database(&pairs).is_err());
    }

    #[tokio::test]
    async fn transform_row_applies_bindings() {
        let bindings = vec![
            RuleBinding {
                source_column: "id".to_string(),
                target_column: "id".to_string(),
                transformation_name: DIRECT_MAPPING.to_string(),
            },
            RuleBinding {
                source_column: "email".to_string(),
                target_column: "contact".to_string(),
                transformation_name: "uppercase".to_string(),
            },
        ];

        let (row, warnings) = transform_row(
            r#"{"id": 7, "email": "a@b.co", "ignored": true}"#,
            &bindings,
            Some(&Upper),
        )
        .await
        .unwrap();

        assert!(warnings.is_empty());
        let row: serde_json::Value = serde_json::from_str(&row).unwrap();
        assert_eq!(row["id"], 7);
        assert_eq!(row["contact"], "A@B.CO");
        assert!(row.get("ignored").is_none());
    }

    #[tokio::test]
    async fn nulls_copy_as_nulls_without_dispatch() {
        let bindings = vec![RuleBinding {
            source_column: "email".to_string(),
            target_column: "email".to_string(),
            transformation_name: "uppercase".to_string(),
        }];

        // No transformer wired: a null value must still copy cleanly
        // because null never dispatches.
        let (row, warnings) = transform_row(r#"{"email": null}"#, &bindings, None)
            .await
            .unwrap();

        assert!(warnings.is_empty());
        let row: serde_json::Value = serde_json::from_str(&row).unwrap();
        assert!(row["email"].is_null());
    }

    #[tokio::test]
    async fn transformation_failure_carries_original_value() {
        let bindings = vec![RuleBinding {
            source_column: "email".to_string(),
            target_column: "email".to_string(),
            transformation_name: "no_such_function".to_string(),
        }];

        let (row, warnings) = transform_row(r#"{"email": "a@b.co"}"#, &bindings, Some(&Upper))
            .await
            .unwrap();

        assert_eq!(warnings.len(), 1);
        let row: serde_json::Value = serde_json::from_str(&row).unwrap();
        assert_eq!(row["email"], "a@b.co");
    }
}
