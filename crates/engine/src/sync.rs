//! The mesh-aware sync layer: broadcast of user-data mutations to the other
//! nodes of a mesh, the consensus checker for cluster-consistent reads, and
//! the event manager that drains inbound user-data events.
//!
//! The three components reference each other at runtime; they are
//! constructed reference-free and wired through setters in a fixed order
//! (event -> sync -> consensus), never in constructors.

use serde_json::Value;
use sqlx::PgPool;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use proto_redb::mesh::{BroadcastUserDataRequest, QueryRecordVersionRequest, RecordVersion};

/// Every broadcast carries this deadline, sync or async.
pub const BROADCAST_DEADLINE: Duration = Duration::from_secs(10);

/// A user-data mutation to replicate: the table, the operation
/// (INSERT/UPDATE/DELETE), the full record as JSON, and its primary key.
#[derive(Debug, Clone)]
pub struct UserDataEvent {
    pub table: String,
    pub operation: String,
    pub record: String,
    pub primary_key: String,
}

/// The broadcast gate: only a node that is part of a mesh with more than
/// one member broadcasts.
pub fn should_broadcast(client_present: bool, node_id: Option<i64>, mesh_members: Option<i64>) -> bool {
    client_present && node_id.is_some() && mesh_members.map(|n| n > 1).unwrap_or(false)
}

pub struct SyncManager {
    client: Option<gateways::mesh::Client>,
    pool: PgPool,
    node_id: Option<i64>,
    consensus: Mutex<Option<Arc<ConsensusChecker>>>,
}

impl SyncManager {
    pub fn new(
        client: Option<gateways::mesh::Client>,
        pool: PgPool,
        node_id: Option<i64>,
    ) -> Arc<Self> {
        Arc::new(Self {
            client,
            pool,
            node_id,
            consensus: Mutex::new(None),
        })
    }

    pub fn set_consensus_checker(&self, checker: Arc<ConsensusChecker>) {
        *self.consensus.lock().unwrap() = Some(checker);
    }

    pub fn consensus_checker(&self) -> Option<Arc<ConsensusChecker>> {
        self.consensus.lock().unwrap().clone()
    }

    /// Whether broadcasts should happen at all: requires a live Mesh client
    /// and membership in a mesh of cardinality > 1.
    pub async fn should_broadcast_user_data(&self) -> bool {
        let Some(node_id) = self.node_id else {
            return false;
        };
        if self.client.is_none() {
            return false;
        }

        let members = match core_sql::mesh::mesh_for_node(node_id, &self.pool).await {
            Ok(Some(mesh)) => match core_sql::mesh::count_mesh_nodes(mesh.id, &self.pool).await {
                Ok(count) => Some(count),
                Err(err) => {
                    tracing::warn!(error = %err, "failed to count mesh members");
                    None
                }
            },
            Ok(None) => None,
            Err(err) => {
                tracing::warn!(error = %err, "failed to resolve mesh membership");
                None
            }
        };

        should_broadcast(true, Some(node_id), members)
    }

    /// Synchronous broadcast: blocks until acknowledged or the deadline
    /// lapses. In degraded mode (no Mesh client) this is a no-op success.
    pub async fn broadcast_user_data_sync(&self, event: UserDataEvent) -> anyhow::Result<()> {
        let Some(client) = &self.client else {
            tracing::debug!(table = %event.table, operation = %event.operation,
                "Sync manager is nil; skipping user-data broadcast");
            return Ok(());
        };

        if !self.should_broadcast_user_data().await {
            return Ok(());
        }

        let response = tokio::time::timeout(
            BROADCAST_DEADLINE,
            client.broadcast_user_data(BroadcastUserDataRequest {
                table: event.table.clone(),
                operation: event.operation.clone(),
                record: event.record.clone(),
                primary_key: event.primary_key.clone(),
            }),
        )
        .await
        .map_err(|_| anyhow::anyhow!("user-data broadcast timed out"))??;

        if !response.success {
            anyhow::bail!(
                "user-data broadcast of {} {} was not acknowledged",
                event.operation,
                event.table
            );
        }

        tracing::debug!(table = %event.table, operation = %event.operation,
            acked_nodes = response.acked_nodes, "user-data broadcast acknowledged");
        Ok(())
    }

    /// Asynchronous broadcast: fire-and-forget on a background task with
    /// its own deadline. Failures are logged, never propagated.
    pub fn broadcast_user_data(self: &Arc<Self>, event: UserDataEvent) {
        let manager = self.clone();
        tokio::spawn(async move {
            if let Err(err) = manager.broadcast_user_data_sync(event).await {
                tracing::warn!(error = %format!("{err:#}"), "async user-data broadcast failed");
            }
        });
    }
}

/// Count the peers whose version of the record differs from ours.
/// Comparison is structural over the parsed JSON, so formatting-only
/// differences are not divergence. A peer without the record diverges.
pub fn divergent_count(local_record: &str, versions: &[RecordVersion]) -> usize {
    let local: Option<Value> = serde_json::from_str(local_record).ok();

    versions
        .iter()
        .filter(|version| {
            if version.record.is_empty() {
                return true;
            }
            match (&local, serde_json::from_str::<Value>(&version.record)) {
                (Some(local), Ok(peer)) => *local != peer,
                _ => true,
            }
        })
        .count()
}

pub struct ConsensusChecker {
    client: Option<gateways::mesh::Client>,
    /// Divergent responses tolerated before an inconsistency is raised.
    tolerance: usize,
    events: Mutex<Option<Arc<EventManager>>>,
}

impl ConsensusChecker {
    pub fn new(client: Option<gateways::mesh::Client>, tolerance: usize) -> Arc<Self> {
        Arc::new(Self {
            client,
            tolerance,
            events: Mutex::new(None),
        })
    }

    pub fn set_event_manager(&self, events: Arc<EventManager>) {
        *self.events.lock().unwrap() = Some(events);
    }

    /// Ask peers for their version of the record. Returns Ok(true) when the
    /// cluster agrees within tolerance; Ok(true) also in degraded mode,
    /// where there are no peers to disagree.
    pub async fn check_record(
        &self,
        table: &str,
        primary_key: &str,
        local_record: &str,
    ) -> anyhow::Result<bool> {
        let Some(client) = &self.client else {
            return Ok(true);
        };

        let response = tokio::time::timeout(
            BROADCAST_DEADLINE,
            client.query_record_version(QueryRecordVersionRequest {
                table: table.to_string(),
                primary_key: primary_key.to_string(),
            }),
        )
        .await
        .map_err(|_| anyhow::anyhow!("record-version query timed out"))??;

        let divergent = divergent_count(local_record, &response.versions);
        if divergent > self.tolerance {
            tracing::error!(table, primary_key, divergent, tolerance = self.tolerance,
                "cluster record inconsistency detected");
            // Queue a reconcile pass for the event loop.
            let events = self.events.lock().unwrap().clone();
            if let Some(events) = events {
                events.submit(UserDataEvent {
                    table: table.to_string(),
                    operation: "RECONCILE".to_string(),
                    record: local_record.to_string(),
                    primary_key: primary_key.to_string(),
                });
            }
            return Ok(false);
        }
        Ok(true)
    }
}

/// EventManager drains inbound user-data events from the mesh
/// subscription. It owns only lifecycle and counting; applying a remote
/// mutation is the submitting transport's callback.
pub struct EventManager {
    sync: Mutex<Option<Arc<SyncManager>>>,
    tx: Mutex<Option<mpsc::Sender<UserDataEvent>>>,
    task: Mutex<Option<tokio::task::JoinHandle<()>>>,
    events_processed: AtomicU64,
}

impl EventManager {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sync: Mutex::new(None),
            tx: Mutex::new(None),
            task: Mutex::new(None),
            events_processed: AtomicU64::new(0),
        })
    }

    pub fn set_sync_manager(&self, sync: Arc<SyncManager>) {
        *self.sync.lock().unwrap() = Some(sync);
    }

    pub fn start(self: &Arc<Self>) {
        let (tx, mut rx) = mpsc::channel::<UserDataEvent>(256);
        *self.tx.lock().unwrap() = Some(tx);

        let manager = self.clone();
        let task = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                manager.events_processed.fetch_add(1, Ordering::Relaxed);
                tracing::info!(table = %event.table, operation = %event.operation,
                    primary_key = %event.primary_key, "received user-data event");
            }
        });
        *self.task.lock().unwrap() = Some(task);
    }

    /// Enqueue an inbound event. Returns false when the manager is not
    /// running or the queue is saturated.
    pub fn submit(&self, event: UserDataEvent) -> bool {
        let tx = self.tx.lock().unwrap().clone();
        match tx {
            Some(tx) => tx.try_send(event).is_ok(),
            None => false,
        }
    }

    pub fn events_processed(&self) -> u64 {
        self.events_processed.load(Ordering::Relaxed)
    }

    /// Stop draining: close the queue and wait for the loop to finish.
    pub async fn stop(&self) {
        let tx = self.tx.lock().unwrap().take();
        drop(tx);
        let task = self.task.lock().unwrap().take();
        if let Some(task) = task {
            if let Err(err) = task.await {
                tracing::warn!(error = %err, "event manager task ended abnormally");
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn version(node_id: i64, record: &str) -> RecordVersion {
        RecordVersion {
            node_id,
            record: record.to_string(),
        }
    }

    #[test]
    fn broadcast_gate_requires_a_peer() {
        assert!(should_broadcast(true, Some(1), Some(2)));
        assert!(!should_broadcast(true, Some(1), Some(1)));
        assert!(!should_broadcast(true, Some(1), None));
        assert!(!should_broadcast(true, None, Some(3)));
        assert!(!should_broadcast(false, Some(1), Some(3)));
    }

    #[test]
    fn divergence_is_structural_not_textual() {
        let local = r#"{"id": 1, "name": "a"}"#;
        let same_spacing = version(2, r#"{ "name": "a", "id": 1 }"#);
        let different = version(3, r#"{"id": 1, "name": "b"}"#);
        let missing = version(4, "");

        assert_eq!(divergent_count(local, &[same_spacing.clone()]), 0);
        assert_eq!(
            divergent_count(local, &[same_spacing, different, missing]),
            2
        );
    }

    #[tokio::test]
    async fn degraded_mode_broadcast_is_a_no_op_success() {
        // A lazily-connected pool never touches the network on this path.
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost:1/void")
            .unwrap();
        let manager = SyncManager::new(None, pool, Some(7));

        assert!(!manager.should_broadcast_user_data().await);
        manager
            .broadcast_user_data_sync(UserDataEvent {
                table: "databases".to_string(),
                operation: "INSERT".to_string(),
                record: "{}".to_string(),
                primary_key: "x".to_string(),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn event_manager_counts_and_stops() {
        let manager = EventManager::new();
        manager.start();

        assert!(manager.submit(UserDataEvent {
            table: "instances".to_string(),
            operation: "INSERT".to_string(),
            record: "{}".to_string(),
            primary_key: "a".to_string(),
        }));

        manager.stop().await;
        assert_eq!(manager.events_processed(), 1);
        assert!(!manager.submit(UserDataEvent {
            table: "instances".to_string(),
            operation: "DELETE".to_string(),
            record: "{}".to_string(),
            primary_key: "a".to_string(),
        }));
    }
}
