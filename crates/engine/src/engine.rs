//! Engine lifecycle and shared state: gateway establishment, mesh
//! subsystem wiring, in-flight operation accounting, metrics, and health.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use sqlx::PgPool;
use tonic::Status;

use crate::copy::OperationRegistry;
use crate::sync::{ConsensusChecker, EventManager, SyncManager};
use core_sql::crypto::Sealer;
use core_sql::Status as RowStatus;

/// Terminal bookkeeping at shutdown runs under its own deadline, decoupled
/// from whatever cancelled the caller.
pub const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(5);

#[derive(Debug, Default)]
pub struct Metrics {
    pub requests_processed: AtomicU64,
    pub errors: AtomicU64,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub addresses: gateways::Addresses,
    /// Divergent consensus responses tolerated before an inconsistency.
    pub consensus_tolerance: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            addresses: gateways::Addresses::default(),
            consensus_tolerance: 0,
        }
    }
}

/// Subsystems that exist only while the engine is running.
///
/// Field declaration order is the close order: gateways are dropped in
/// reverse of how they were dialed.
pub struct Runtime {
    pub stream: Option<gateways::stream::Client>,
    pub transformation: Option<gateways::transformation::Client>,
    pub mesh: Option<gateways::mesh::Client>,
    pub unified_model: Option<gateways::unified_model::Client>,
    pub anchor: Option<gateways::anchor::Client>,

    pub sync: Arc<SyncManager>,
    pub events: Arc<EventManager>,
    pub consensus: Arc<ConsensusChecker>,
    pub node_id: Option<i64>,
}

impl Runtime {
    /// The Anchor client, or the degraded-mode error.
    pub fn anchor(&self) -> Result<&gateways::anchor::Client, Status> {
        self.anchor
            .as_ref()
            .ok_or_else(|| Status::unavailable("anchor service is not available"))
    }

    pub fn stream(&self) -> Result<&gateways::stream::Client, Status> {
        self.stream
            .as_ref()
            .ok_or_else(|| Status::unavailable("stream service is not available"))
    }
}

pub struct Engine {
    pool: PgPool,
    sealer: Sealer,
    config: EngineConfig,

    runtime: RwLock<Option<Arc<Runtime>>>,
    is_running: tokio::sync::Mutex<bool>,
    ongoing_operations: AtomicI64,
    grpc_server_ready: AtomicBool,

    pub metrics: Metrics,
    pub copy_registry: OperationRegistry,
}

/// Scoped in-flight operation accounting: acquired at method entry,
/// released on every exit path. Health and shutdown quiesce on the counter
/// reaching zero.
pub struct OperationGuard {
    engine: Arc<Engine>,
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        self.engine.ongoing_operations.fetch_sub(1, Ordering::AcqRel);
    }
}

impl Engine {
    pub fn new(pool: PgPool, sealer: Sealer, config: EngineConfig) -> Arc<Self> {
        Arc::new(Self {
            pool,
            sealer,
            config,
            runtime: RwLock::new(None),
            is_running: tokio::sync::Mutex::new(false),
            ongoing_operations: AtomicI64::new(0),
            grpc_server_ready: AtomicBool::new(false),
            metrics: Metrics::default(),
            copy_registry: OperationRegistry::default(),
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn sealer(&self) -> &Sealer {
        &self.sealer
    }

    /// Start the engine: dial gateways (degraded tolerant), resolve the
    /// local node identity, wire and start the mesh subsystems, and record
    /// node/mesh status. Double starts are rejected.
    pub async fn start(self: &Arc<Self>) -> Result<(), Status> {
        let mut is_running = self.is_running.lock().await;
        if *is_running {
            return Err(Status::failed_precondition("engine is already started"));
        }

        let addresses = &self.config.addresses;
        let anchor = dial(&addresses.anchor, "anchor")
            .await
            .map(gateways::anchor::Client::new);
        let unified_model = dial(&addresses.unified_model, "unifiedmodel")
            .await
            .map(gateways::unified_model::Client::new);
        let mesh = dial(&addresses.mesh, "mesh")
            .await
            .map(gateways::mesh::Client::new);
        let transformation = dial(&addresses.transformation, "transformation")
            .await
            .map(gateways::transformation::Client::new);
        let stream = dial(&addresses.stream, "stream")
            .await
            .map(gateways::stream::Client::new);

        let node_id = match core_sql::mesh::local_identity(&self.pool).await {
            Ok(id) => id,
            Err(err) => {
                tracing::warn!(error = %err, "failed to resolve local node identity");
                None
            }
        };

        // Construct the mesh subsystems reference-free, then wire them in
        // a fixed order before starting the event loop.
        let events = EventManager::new();
        let sync = SyncManager::new(mesh.clone(), self.pool.clone(), node_id);
        let consensus =
            ConsensusChecker::new(mesh.clone(), self.config.consensus_tolerance);
        events.set_sync_manager(sync.clone());
        sync.set_consensus_checker(consensus.clone());
        consensus.set_event_manager(events.clone());
        events.start();

        self.record_startup_status(node_id).await;

        let runtime = Arc::new(Runtime {
            stream,
            transformation,
            mesh,
            unified_model,
            anchor,
            sync,
            events,
            consensus,
            node_id,
        });
        *self.runtime.write().unwrap() = Some(runtime);
        *is_running = true;

        tracing::info!(node_id = ?node_id, "engine started");
        Ok(())
    }

    /// Stop the engine. The first call records terminal node/mesh status
    /// under a fresh deadline, stops the event manager, then drops the
    /// gateways; later calls are no-ops.
    pub async fn stop(self: &Arc<Self>) -> Result<(), Status> {
        let mut is_running = self.is_running.lock().await;
        if !*is_running {
            return Ok(());
        }

        let runtime = self.runtime.write().unwrap().take();
        if let Some(runtime) = &runtime {
            // Status writes must not be cancelled by the shutdown signal.
            let bookkeeping = self.record_shutdown_status(runtime.node_id);
            if tokio::time::timeout(SHUTDOWN_DEADLINE, bookkeeping)
                .await
                .is_err()
            {
                tracing::error!("timed out recording shutdown status");
            }

            runtime.events.stop().await;
        }
        drop(runtime); // Gateways close here, reverse of dial order.

        self.grpc_server_ready.store(false, Ordering::Release);
        *is_running = false;
        tracing::info!("engine stopped");
        Ok(())
    }

    async fn record_startup_status(&self, node_id: Option<i64>) {
        let Some(node_id) = node_id else { return };

        let mesh = core_sql::mesh::mesh_for_node(node_id, &self.pool).await;
        match mesh {
            Ok(Some(mesh)) => {
                log_status_write(
                    core_sql::mesh::set_node_status(node_id, RowStatus::Active, &self.pool).await,
                );
                log_status_write(
                    core_sql::mesh::set_mesh_status(mesh.id, RowStatus::Active, &self.pool).await,
                );
            }
            Ok(None) => {
                log_status_write(
                    core_sql::mesh::set_node_status(node_id, RowStatus::Clean, &self.pool).await,
                );
            }
            Err(err) => tracing::warn!(error = %err, "failed to resolve mesh at startup"),
        }
    }

    async fn record_shutdown_status(&self, node_id: Option<i64>) {
        let Some(node_id) = node_id else { return };

        match core_sql::mesh::mesh_for_node(node_id, &self.pool).await {
            Ok(Some(mesh)) => {
                log_status_write(
                    core_sql::mesh::set_node_status(node_id, RowStatus::Stopped, &self.pool).await,
                );
                log_status_write(
                    core_sql::mesh::set_mesh_status(mesh.id, RowStatus::Disconnected, &self.pool)
                        .await,
                );
            }
            Ok(None) => {
                log_status_write(
                    core_sql::mesh::set_node_status(node_id, RowStatus::Clean, &self.pool).await,
                );
            }
            Err(err) => tracing::warn!(error = %err, "failed to resolve mesh at shutdown"),
        }
    }

    /// The running subsystems, or Unavailable when stopped.
    pub fn runtime(&self) -> Result<Arc<Runtime>, Status> {
        self.runtime
            .read()
            .unwrap()
            .clone()
            .ok_or_else(|| Status::unavailable("engine is not running"))
    }

    /// Method-entry envelope: count the request and hold an in-flight
    /// operation for the scope of the guard.
    pub fn track_operation(self: &Arc<Self>) -> OperationGuard {
        self.ongoing_operations.fetch_add(1, Ordering::AcqRel);
        self.metrics.requests_processed.fetch_add(1, Ordering::Relaxed);
        OperationGuard {
            engine: self.clone(),
        }
    }

    pub fn record_error(&self) {
        self.metrics.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn ongoing_operations(&self) -> i64 {
        self.ongoing_operations.load(Ordering::Acquire)
    }

    pub fn set_grpc_server_ready(&self, ready: bool) {
        self.grpc_server_ready.store(ready, Ordering::Release);
    }

    /// Engine running and the gRPC server present.
    pub async fn check_health(&self) -> Result<(), Status> {
        if self.runtime.read().unwrap().is_none() {
            return Err(Status::unavailable("engine is not running"));
        }
        if !self.grpc_server_ready.load(Ordering::Acquire) {
            return Err(Status::unavailable("gRPC server is not ready"));
        }
        Ok(())
    }

    /// Ping the relational pool.
    pub async fn check_database(&self) -> Result<(), Status> {
        sqlx::query("select 1")
            .execute(&self.pool)
            .await
            .map_err(crate::db_error)?;
        Ok(())
    }

    pub async fn check_grpc_server(&self) -> Result<(), Status> {
        self.check_health().await?;
        self.check_database().await
    }
}

async fn dial(address: &str, service: &'static str) -> Option<tonic::transport::Channel> {
    match gateways::dial_channel(address).await {
        Ok(channel) => {
            tracing::info!(service, address, "gateway connected");
            Some(channel)
        }
        Err(err) => {
            tracing::warn!(service, address, error = %err,
                "gateway unavailable; continuing in degraded mode");
            None
        }
    }
}

fn log_status_write(result: sqlx::Result<u64>) {
    if let Err(err) = result {
        tracing::warn!(error = %err, "best-effort status write failed");
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn test_engine() -> Arc<Engine> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost:1/void")
            .unwrap();
        let sealer = Sealer::new(&[1u8; core_sql::crypto::KEY_LEN]).unwrap();
        Engine::new(pool, sealer, EngineConfig::default())
    }

    #[tokio::test]
    async fn operation_guard_releases_on_every_exit() {
        let engine = test_engine();
        assert_eq!(engine.ongoing_operations(), 0);

        {
            let _a = engine.track_operation();
            let _b = engine.track_operation();
            assert_eq!(engine.ongoing_operations(), 2);
        }
        assert_eq!(engine.ongoing_operations(), 0);
        assert_eq!(engine.metrics.requests_processed.load(Ordering::Relaxed), 2);

        engine.record_error();
        assert_eq!(engine.metrics.errors.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn health_requires_a_running_engine() {
        let engine = test_engine();
        assert!(engine.check_health().await.is_err());
        assert!(engine.runtime().is_err());

        // Stopping a never-started engine is a no-op.
        engine.stop().await.unwrap();
    }
}
