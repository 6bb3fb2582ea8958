//! The relationship orchestrator: StartRelationship (initial copy plus CDC
//! setup), Stop, Resume, and Remove.
//!
//! StartRelationship streams phase events in strict order:
//! `initializing`, then `copying_data` or `resuming_cdc` depending on the
//! target probe, then `setting_up_cdc`, then `active`.

use serde_json::Value;
use sqlx::PgPool;
use std::time::Duration;
use tokio::sync::mpsc;
use tonic::Status;
use uuid::Uuid;

use crate::connectors::{CdcConnector, DataConnector, TransformConnector};
use crate::copy::{self, CopyEvent, CopyOptions};
use crate::mappings;
use crate::registry::resolve_workspace;
use crate::{db_error, ApiResult};
use core_sql::relationships::Relationship;
use core_sql::replication_sources::{self, NewReplicationSource, ReplicationSourceUpdate};
use core_sql::Status as RowStatus;
use proto_redb::common::Status as WireStatus;
use proto_redb::control::RelationshipProgress;

pub const SLOT_PREFIX: &str = "redb_rel_";
pub const PUBLICATION_PREFIX: &str = "redb_pub_";

/// Best-effort status writes run under their own short deadline, decoupled
/// from the caller's context.
const STATUS_BACKUP_DEADLINE: Duration = Duration::from_secs(3);

/// First 8 hex chars of the relationship id, shared by the slot and
/// publication names of all its replication sources.
pub fn short_id(relationship_id: Uuid) -> String {
    relationship_id.simple().to_string()[..8].to_string()
}

pub fn slot_name(relationship_id: Uuid) -> String {
    format!("{SLOT_PREFIX}{}", short_id(relationship_id))
}

pub fn publication_name(relationship_id: Uuid) -> String {
    format!("{PUBLICATION_PREFIX}{}", short_id(relationship_id))
}

/// Decode persisted CDC state, tolerating empty or invalid documents as an
/// empty map: a source with no state starts cold rather than failing.
pub fn decode_cdc_state(raw: &str) -> serde_json::Map<String, Value> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        _ => serde_json::Map::new(),
    }
}

/// Whether the persisted state allows a resume, as opposed to a cold start.
pub fn has_resumable_state(raw: &str) -> bool {
    !decode_cdc_state(raw).is_empty()
}

/// The target-probe policy: rows already present mean the initial copy is
/// skipped and CDC resumes; an empty table or a failed probe means copy.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CopyDecision {
    SkipInitialCopy,
    PerformInitialCopy,
}

pub fn initial_copy_decision(probe: Result<i64, &anyhow::Error>) -> CopyDecision {
    match probe {
        Ok(count) if count > 0 => CopyDecision::SkipInitialCopy,
        _ => CopyDecision::PerformInitialCopy,
    }
}

pub struct StartRequest {
    pub tenant_id: String,
    pub workspace_name: String,
    pub relationship_name: String,
    pub options: CopyOptions,
}

type EventTx = mpsc::Sender<Result<RelationshipProgress, Status>>;

fn progress(phase: &str, message: &str) -> RelationshipProgress {
    RelationshipProgress {
        phase: phase.to_string(),
        message: message.to_string(),
        status: WireStatus::Pending as i32,
        ..Default::default()
    }
}

async fn send(events: &EventTx, event: RelationshipProgress) -> ApiResult<()> {
    events
        .send(Ok(event))
        .await
        .map_err(|_| Status::cancelled("client went away"))
}

/// Mark the relationship failed (clamped message) and surface Internal.
/// The status write is best-effort under its own deadline.
async fn fail_relationship(pool: &PgPool, relationship_id: Uuid, message: &str) -> Status {
    let write = core_sql::relationships::set_status(
        relationship_id,
        RowStatus::Error,
        message,
        pool,
    );
    match tokio::time::timeout(STATUS_BACKUP_DEADLINE, write).await {
        Ok(Ok(_)) => {}
        Ok(Err(err)) => {
            tracing::error!(relationship_id = %relationship_id, error = %err,
                "failed to record relationship error status")
        }
        Err(_) => {
            tracing::error!(relationship_id = %relationship_id,
                "timed out recording relationship error status")
        }
    }
    Status::internal(message.to_string())
}

struct Resolved {
    relationship: Relationship,
    source_database_id: Uuid,
    target_database_id: Uuid,
    pairs: Vec<mappings::TablePair>,
    rules_json: String,
}

async fn resolve(pool: &PgPool, req: &StartRequest) -> ApiResult<Resolved> {
    let workspace_id = resolve_workspace(pool, &req.tenant_id, &req.workspace_name).await?;

    let relationship =
        core_sql::relationships::get_by_name(workspace_id, &req.relationship_name, pool)
            .await
            .map_err(db_error)?
            .ok_or_else(|| {
                Status::not_found(format!(
                    "relationship '{}' not found",
                    req.relationship_name
                ))
            })?;

    let mapping = core_sql::mappings::get_by_id(relationship.mapping_id, pool)
        .await
        .map_err(db_error)?
        .ok_or_else(|| Status::not_found("mapping of the relationship not found"))?;

    for (label, id) in [
        ("source", relationship.source_database_id),
        ("target", relationship.target_database_id),
    ] {
        if core_sql::databases::get_by_id(id, pool)
            .await
            .map_err(db_error)?
            .is_none()
        {
            return Err(Status::not_found(format!("{label} database not found")));
        }
    }

    let rules = core_sql::mappings::rules_for_mapping(mapping.id, pool)
        .await
        .map_err(db_error)?;
    if rules.is_empty() {
        return Err(Status::failed_precondition(format!(
            "mapping '{}' has no rules",
            mapping.name
        )));
    }

    let (pairs, warnings) = mappings::group_by_tables(&rules);
    for warning in &warnings {
        tracing::warn!(relationship = %relationship.name, "{warning}");
    }
    if pairs.is_empty() {
        return Err(Status::failed_precondition("no mapping rules usable"));
    }

    let rules_json = serialize_rules(&rules);

    Ok(Resolved {
        source_database_id: relationship.source_database_id,
        target_database_id: relationship.target_database_id,
        relationship,
        pairs,
        rules_json,
    })
}

/// The wire form of a rule set, handed to Anchor and persisted on each
/// replication source.
pub fn serialize_rules(rules: &[core_sql::mappings::Rule]) -> String {
    let rules: Vec<Value> = rules
        .iter()
        .map(|rule| {
            serde_json::json!({
                "name": rule.name,
                "source_resource_uri": rule.source_resource_uri,
                "target_resource_uri": rule.target_resource_uri,
                "transformation_name": rule.transformation_name,
            })
        })
        .collect();
    Value::Array(rules).to_string()
}

/// StartRelationship. Emits progress into `events`; the return value is the
/// terminal outcome the façade folds into the stream.
pub async fn start_relationship(
    pool: &PgPool,
    data: &dyn DataConnector,
    cdc: &dyn CdcConnector,
    transformer: Option<&dyn TransformConnector>,
    req: StartRequest,
    events: &EventTx,
) -> ApiResult<()> {
    // Phase: initializing.
    send(events, progress("initializing", "Resolving relationship")).await?;
    let resolved = resolve(pool, &req).await?;
    let relationship_id = resolved.relationship.id;

    // Probe the target table; the outcome decides the copy path.
    let probe = data
        .table_row_count(
            &resolved.target_database_id.to_string(),
            &resolved.relationship.target_table_name,
        )
        .await;
    if let Err(err) = &probe {
        tracing::warn!(relationship = %resolved.relationship.name, error = %format!("{err:#}"),
            "target probe failed; performing initial copy");
    }

    let mut rows_copied = 0i64;
    match initial_copy_decision(probe.as_ref().map(|c| *c)) {
        CopyDecision::SkipInitialCopy => {
            send(
                events,
                progress(
                    "resuming_cdc",
                    "Target table already contains rows; skipping initial copy",
                ),
            )
            .await?;
        }
        CopyDecision::PerformInitialCopy => {
            core_sql::relationships::set_status(
                relationship_id,
                RowStatus::Active,
                "Starting initial data copy",
                pool,
            )
            .await
            .map_err(db_error)?;

            send(events, progress("copying_data", "Starting initial data copy")).await?;

            rows_copied = match run_initial_copy(
                &resolved.pairs,
                &req.options,
                data,
                transformer,
                events,
            )
            .await
            {
                Ok(rows) => rows,
                Err(message) => {
                    return Err(fail_relationship(pool, relationship_id, &message).await);
                }
            };
        }
    }

    // Phase: setting_up_cdc.
    send(events, progress("setting_up_cdc", "Setting up CDC replication")).await?;

    let slot = slot_name(relationship_id);
    let publication = publication_name(relationship_id);

    for pair in distinct_source_tables(&resolved.pairs) {
        let source = replication_sources::ensure(
            NewReplicationSource {
                tenant_id: &req.tenant_id,
                workspace_id: resolved.relationship.workspace_id,
                database_id: resolved.source_database_id,
                table_name: &pair.source_table,
                relationship_id,
                slot_name: &slot,
                publication_name: &publication,
                target_database_id: resolved.target_database_id,
                target_table_name: &pair.target_table,
                rules: core_sql::json_or_empty(&resolved.rules_json),
            },
            pool,
        )
        .await
        .map_err(db_error)?;

        let session = match cdc
            .start_replication(proto_redb::anchor::StartCdcReplicationRequest {
                replication_source_id: source.id.to_string(),
                database_id: resolved.source_database_id.to_string(),
                table_name: pair.source_table.clone(),
                slot_name: slot.clone(),
                publication_name: publication.clone(),
                rules: resolved.rules_json.clone(),
                target_database_id: resolved.target_database_id.to_string(),
                target_table_name: pair.target_table.clone(),
            })
            .await
        {
            Ok(session) => session,
            Err(err) => {
                let message = format!("CDC setup failed on table '{}': {err:#}", pair.source_table);
                return Err(fail_relationship(pool, relationship_id, &message).await);
            }
        };

        replication_sources::update(
            source.id,
            ReplicationSourceUpdate {
                cdc_connection_id: Some(session.connection_id),
                cdc_state: Some(core_sql::json_or_empty(&session.state)),
                status: Some(RowStatus::Active),
            },
            pool,
        )
        .await
        .map_err(db_error)?;
    }

    core_sql::relationships::set_status(
        relationship_id,
        RowStatus::Active,
        "CDC replication active",
        pool,
    )
    .await
    .map_err(db_error)?;

    // Phase: active (terminal).
    send(
        events,
        RelationshipProgress {
            phase: "active".to_string(),
            rows_copied,
            progress_percentage: 100.0,
            cdc_status: "active".to_string(),
            message: "Relationship is active".to_string(),
            success: true,
            status: WireStatus::Success as i32,
            ..Default::default()
        },
    )
    .await?;

    Ok(())
}

/// Run the copy pipeline, forwarding its events as `copying_data` progress.
/// Returns total rows copied, or a workflow-fatal error message.
async fn run_initial_copy(
    pairs: &[mappings::TablePair],
    options: &CopyOptions,
    data: &dyn DataConnector,
    transformer: Option<&dyn TransformConnector>,
    events: &EventTx,
) -> Result<i64, String> {
    let (copy_tx, mut copy_rx) = mpsc::channel::<CopyEvent>(16);

    let copy_task = async {
        let outcome = copy::run_copy(pairs, options, data, transformer, &copy_tx).await;
        drop(copy_tx);
        outcome
    };

    let forward_task = async {
        while let Some(event) = copy_rx.recv().await {
            let update = match &event {
                CopyEvent::TableStarted {
                    table, total_rows, ..
                } => Some((table.clone(), 0, *total_rows, 0.0)),
                CopyEvent::BatchApplied {
                    table,
                    rows_copied,
                    total_rows,
                    progress_percentage,
                } => Some((table.clone(), *rows_copied, *total_rows, *progress_percentage)),
                CopyEvent::TableCompleted { .. } | CopyEvent::Finished { .. } => None,
            };
            if let Some((table, rows, total, pct)) = update {
                let event = RelationshipProgress {
                    phase: "copying_data".to_string(),
                    rows_copied: rows,
                    total_rows: total.max(0),
                    current_table: table,
                    progress_percentage: pct,
                    status: WireStatus::Pending as i32,
                    ..Default::default()
                };
                if events.send(Ok(event)).await.is_err() {
                    break;
                }
            }
        }
    };

    let (outcome, ()) = tokio::join!(copy_task, forward_task);

    match outcome {
        Ok(outcome) if outcome.errors.is_empty() => Ok(outcome.rows_copied),
        Ok(outcome) => Err(format!(
            "initial data copy failed: {}",
            outcome.errors.join("; ")
        )),
        Err(err) => Err(format!("initial data copy failed: {err:#}")),
    }
}

/// One representative pair per distinct source table.
fn distinct_source_tables(pairs: &[mappings::TablePair]) -> Vec<&mappings::TablePair> {
    let mut seen = Vec::new();
    let mut out = Vec::new();
    for pair in pairs {
        if !seen.contains(&pair.source_table.as_str()) {
            seen.push(pair.source_table.as_str());
            out.push(pair);
        }
    }
    out
}

/// StopRelationship: best-effort stop of every replication source with
/// state preserved, then mark the relationship stopped regardless.
pub async fn stop_relationship(
    pool: &PgPool,
    cdc: &dyn CdcConnector,
    tenant_id: &str,
    workspace_name: &str,
    relationship_name: &str,
) -> ApiResult<Relationship> {
    let workspace_id = resolve_workspace(pool, tenant_id, workspace_name).await?;
    let relationship = core_sql::relationships::get_by_name(workspace_id, relationship_name, pool)
        .await
        .map_err(db_error)?
        .ok_or_else(|| Status::not_found(format!("relationship '{relationship_name}' not found")))?;

    let sources = replication_sources::list_for_relationship(relationship.id, pool)
        .await
        .map_err(db_error)?;

    for source in sources {
        match cdc
            .stop_replication(
                &source.cdc_connection_id,
                &source.slot_name,
                &source.publication_name,
                true,
            )
            .await
        {
            Ok(state) => {
                replication_sources::update(
                    source.id,
                    ReplicationSourceUpdate {
                        cdc_state: Some(core_sql::json_or_empty(&state)),
                        status: Some(RowStatus::Stopped),
                        ..Default::default()
                    },
                    pool,
                )
                .await
                .map_err(db_error)?;
            }
            Err(err) => {
                tracing::warn!(replication_source = %source.id, error = %format!("{err:#}"),
                    "failed to stop replication source; continuing");
            }
        }
    }

    core_sql::relationships::set_status(
        relationship.id,
        RowStatus::Stopped,
        "Relationship stopped",
        pool,
    )
    .await
    .map_err(db_error)?
    .ok_or_else(|| Status::not_found("relationship disappeared during stop"))
}

/// ResumeRelationship: replay each source's persisted state into Anchor.
/// Any Anchor failure aborts with Internal.
pub async fn resume_relationship(
    pool: &PgPool,
    cdc: &dyn CdcConnector,
    tenant_id: &str,
    workspace_name: &str,
    relationship_name: &str,
    events: &EventTx,
) -> ApiResult<()> {
    send(events, progress("initializing", "Resolving relationship")).await?;

    let workspace_id = resolve_workspace(pool, tenant_id, workspace_name).await?;
    let relationship = core_sql::relationships::get_by_name(workspace_id, relationship_name, pool)
        .await
        .map_err(db_error)?
        .ok_or_else(|| Status::not_found(format!("relationship '{relationship_name}' not found")))?;

    let sources = replication_sources::list_for_relationship(relationship.id, pool)
        .await
        .map_err(db_error)?;
    if sources.is_empty() {
        return Err(Status::failed_precondition(
            "relationship has no replication sources to resume",
        ));
    }

    send(events, progress("resuming_cdc", "Resuming CDC replication")).await?;

    for source in sources {
        // Invalid or empty persisted state resumes cold rather than failing.
        let resume_state = Value::Object(decode_cdc_state(source.cdc_state.get())).to_string();

        let session = cdc
            .resume_replication(proto_redb::anchor::ResumeCdcReplicationRequest {
                connection_id: source.cdc_connection_id.clone(),
                slot_name: source.slot_name.clone(),
                publication_name: source.publication_name.clone(),
                resume_state,
                rules: source.rules.get().to_string(),
            })
            .await
            .map_err(|err| {
                Status::internal(format!(
                    "failed to resume replication source '{}': {err:#}",
                    source.id
                ))
            })?;

        replication_sources::update(
            source.id,
            ReplicationSourceUpdate {
                cdc_connection_id: Some(session.connection_id),
                cdc_state: Some(core_sql::json_or_empty(&session.state)),
                status: Some(RowStatus::Active),
            },
            pool,
        )
        .await
        .map_err(db_error)?;
    }

    core_sql::relationships::set_status(
        relationship.id,
        RowStatus::Active,
        "CDC replication active",
        pool,
    )
    .await
    .map_err(db_error)?;

    send(
        events,
        RelationshipProgress {
            phase: "active".to_string(),
            progress_percentage: 100.0,
            cdc_status: "active".to_string(),
            message: "Relationship is active".to_string(),
            success: true,
            status: WireStatus::Success as i32,
            ..Default::default()
        },
    )
    .await?;

    Ok(())
}

/// RemoveRelationship: stop (without preserving state) and remove every
/// replication source, then delete the relationship row. Without `force`
/// any Anchor failure aborts; with it, failures are logged and ignored.
pub async fn remove_relationship(
    pool: &PgPool,
    cdc: &dyn CdcConnector,
    tenant_id: &str,
    workspace_name: &str,
    relationship_name: &str,
    force: bool,
) -> ApiResult<()> {
    let workspace_id = resolve_workspace(pool, tenant_id, workspace_name).await?;
    let relationship = core_sql::relationships::get_by_name(workspace_id, relationship_name, pool)
        .await
        .map_err(db_error)?
        .ok_or_else(|| Status::not_found(format!("relationship '{relationship_name}' not found")))?;

    let sources = replication_sources::list_for_relationship(relationship.id, pool)
        .await
        .map_err(db_error)?;

    for source in sources {
        let stopped = cdc
            .stop_replication(
                &source.cdc_connection_id,
                &source.slot_name,
                &source.publication_name,
                false,
            )
            .await;
        if let Err(err) = stopped {
            if force {
                tracing::warn!(replication_source = %source.id, error = %format!("{err:#}"),
                    "force remove: ignoring failure to stop replication");
            } else {
                return Err(Status::internal(format!(
                    "failed to stop replication source '{}': {err:#}",
                    source.id
                )));
            }
        }

        let removed = cdc
            .remove_replication_source(
                &source.cdc_connection_id,
                &source.slot_name,
                &source.publication_name,
            )
            .await;
        if let Err(err) = removed {
            if force {
                tracing::warn!(replication_source = %source.id, error = %format!("{err:#}"),
                    "force remove: ignoring failure to remove replication source");
            } else {
                return Err(Status::internal(format!(
                    "failed to remove replication source '{}': {err:#}",
                    source.id
                )));
            }
        }
    }

    // Cascade drops the replication-source rows.
    core_sql::relationships::delete(relationship.id, pool)
        .await
        .map_err(db_error)?;

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn slot_and_publication_names_carry_the_id_prefix() {
        let id = Uuid::parse_str("a1b2c3d4-0000-0000-0000-000000000000").unwrap();
        assert_eq!(slot_name(id), "redb_rel_a1b2c3d4");
        assert_eq!(publication_name(id), "redb_pub_a1b2c3d4");
        assert!(slot_name(id).contains(&short_id(id)));
    }

    #[test]
    fn probe_policy_skips_copy_only_on_rows() {
        let err = anyhow::anyhow!("probe failed");
        assert_eq!(
            initial_copy_decision(Ok(3)),
            CopyDecision::SkipInitialCopy
        );
        assert_eq!(
            initial_copy_decision(Ok(0)),
            CopyDecision::PerformInitialCopy
        );
        assert_eq!(
            initial_copy_decision(Err(&err)),
            CopyDecision::PerformInitialCopy
        );
    }

    #[test]
    fn cdc_state_decode_is_tolerant() {
        assert!(decode_cdc_state("").is_empty());
        assert!(decode_cdc_state("not json").is_empty());
        assert!(decode_cdc_state("[1, 2]").is_empty());

        let state = decode_cdc_state(r#"{"lsn": "0/1A"}"#);
        assert_eq!(state.get("lsn").unwrap(), "0/1A");
        assert!(has_resumable_state(r#"{"lsn": "0/1A"}"#));
        assert!(!has_resumable_state("{}"));
    }

    #[test]
    fn rules_serialize_to_a_json_array() {
        let rule = core_sql::mappings::Rule {
            id: Uuid::new_v4(),
            mapping_id: Uuid::new_v4(),
            name: "r1".to_string(),
            source_resource_uri: "redb://src/table/orders/column:id".to_string(),
            target_resource_uri: "redb://tgt/table/orders/column:id".to_string(),
            transformation_name: "direct_mapping".to_string(),
            transformation_options: core_sql::empty_json(),
            metadata: core_sql::empty_json(),
            created: chrono::Utc::now(),
            updated: chrono::Utc::now(),
        };

        let serialized = serialize_rules(&[rule]);
        let parsed: Value = serde_json::from_str(&serialized).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 1);
        assert_eq!(parsed[0]["transformation_name"], "direct_mapping");
    }
}
