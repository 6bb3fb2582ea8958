//! The mapping-driven data-copy pipeline: streamed fetch, per-row
//! transformation, transactional batch insert, with progress events.
//!
//! Table pairs are processed serially and batches within a pair strictly in
//! source order, so progress events stay monotonic. The `parallel_workers`
//! knob is accepted and recorded but does not reorder work.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::connectors::{DataConnector, TransformConnector};
use crate::mappings::{self, TablePair};

pub const DEFAULT_BATCH_SIZE: i32 = 1000;
pub const DEFAULT_PARALLEL_WORKERS: i32 = 4;

#[derive(Debug, Clone)]
pub struct CopyOptions {
    pub batch_size: i32,
    pub parallel_workers: i32,
    pub dry_run: bool,
}

impl Default for CopyOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            parallel_workers: DEFAULT_PARALLEL_WORKERS,
            dry_run: false,
        }
    }
}

/// Clamp a requested batch size: absent (zero) takes the default, anything
/// below one is floored to one.
pub fn effective_batch_size(requested: i32) -> i32 {
    if requested == 0 {
        DEFAULT_BATCH_SIZE
    } else if requested < 0 {
        1
    } else {
        requested
    }
}

/// Overall completion fraction: finished pairs plus the row fraction of the
/// pair in flight. An unknown row count contributes nothing until the pair
/// completes.
pub fn progress_percentage(
    tables_done: usize,
    tables_total: usize,
    rows_copied: i64,
    total_rows: i64,
) -> f64 {
    if tables_total == 0 {
        return 100.0;
    }
    let intra = if total_rows > 0 {
        (rows_copied as f64 / total_rows as f64).clamp(0.0, 1.0)
    } else {
        0.0
    };
    ((tables_done as f64 + intra) / tables_total as f64 * 100.0).clamp(0.0, 100.0)
}

/// Progress of a running copy, as emitted to the caller's event channel.
#[derive(Debug, Clone, PartialEq)]
pub enum CopyEvent {
    TableStarted {
        table: String,
        total_rows: i64,
        tables_done: usize,
        tables_total: usize,
    },
    BatchApplied {
        table: String,
        rows_copied: i64,
        total_rows: i64,
        progress_percentage: f64,
    },
    TableCompleted {
        table: String,
        rows_copied: i64,
        tables_done: usize,
        tables_total: usize,
    },
    Finished {
        phase: &'static str,
        rows_copied: i64,
        errors: Vec<String>,
    },
}

#[derive(Debug, Default, Clone)]
pub struct CopyOutcome {
    pub rows_copied: i64,
    pub errors: Vec<String>,
}

impl CopyOutcome {
    pub fn terminal_phase(&self) -> &'static str {
        if self.errors.is_empty() {
            "completed"
        } else {
            "completed_with_errors"
        }
    }
}

/// Run the copy over grouped table pairs. Pair-level failures are recorded
/// and the remaining pairs still run; the caller decides whether a
/// non-empty error list fails its own workflow.
pub async fn run_copy(
    pairs: &[TablePair],
    options: &CopyOptions,
    data: &dyn DataConnector,
    transformer: Option<&dyn TransformConnector>,
    events: &mpsc::Sender<CopyEvent>,
) -> anyhow::Result<CopyOutcome> {
    if pairs.is_empty() {
        anyhow::bail!("no mapping rules usable");
    }
    mappings::ensure_single_database(pairs)?;

    let batch_size = effective_batch_size(options.batch_size);
    let tables_total = pairs.len();
    let mut outcome = CopyOutcome::default();

    tracing::info!(
        tables = tables_total,
        batch_size,
        parallel_workers = options.parallel_workers,
        dry_run = options.dry_run,
        "starting data copy"
    );

    for (tables_done, pair) in pairs.iter().enumerate() {
        // Best-effort probe, used only for progress estimation.
        let total_rows = match data
            .table_row_count(&pair.source_database_id, &pair.source_table)
            .await
        {
            Ok(count) => count,
            Err(err) => {
                tracing::debug!(table = %pair.source_key(), error = %err, "row-count probe failed");
                -1
            }
        };

        emit(
            events,
            CopyEvent::TableStarted {
                table: pair.source_key(),
                total_rows,
                tables_done,
                tables_total,
            },
        )
        .await?;

        match copy_table_pair(
            pair,
            batch_size,
            total_rows,
            tables_done,
            tables_total,
            options.dry_run,
            data,
            transformer,
            events,
        )
        .await
        {
            Ok(rows) => {
                outcome.rows_copied += rows;
                emit(
                    events,
                    CopyEvent::TableCompleted {
                        table: pair.source_key(),
                        rows_copied: rows,
                        tables_done: tables_done + 1,
                        tables_total,
                    },
                )
                .await?;
            }
            Err(err) => {
                tracing::error!(table = %pair.source_key(), error = %format!("{err:#}"), "table copy failed");
                outcome
                    .errors
                    .push(format!("{}: {err:#}", pair.source_key()));
            }
        }
    }

    emit(
        events,
        CopyEvent::Finished {
            phase: outcome.terminal_phase(),
            rows_copied: outcome.rows_copied,
            errors: outcome.errors.clone(),
        },
    )
    .await?;

    Ok(outcome)
}

#[allow(clippy::too_many_arguments)]
async fn copy_table_pair(
    pair: &TablePair,
    batch_size: i32,
    total_rows: i64,
    tables_done: usize,
    tables_total: usize,
    dry_run: bool,
    data: &dyn DataConnector,
    transformer: Option<&dyn TransformConnector>,
    events: &mpsc::Sender<CopyEvent>,
) -> anyhow::Result<i64> {
    let mut stream = data
        .open_fetch_stream(
            &pair.source_database_id,
            &pair.source_table,
            pair.source_columns(),
            batch_size,
        )
        .await?;

    let mut rows_copied = 0i64;

    while let Some(batch) = stream.next().await {
        let batch = batch?;
        if batch.is_empty() {
            continue;
        }

        let mut transformed = Vec::with_capacity(batch.len());
        for row in &batch {
            let (row, warnings) = mappings::transform_row(row, &pair.bindings, transformer).await?;
            for warning in warnings {
                tracing::warn!(table = %pair.source_key(), "{warning}");
            }
            transformed.push(row);
        }

        if dry_run {
            rows_copied += transformed.len() as i64;
        } else {
            rows_copied += data
                .insert_batch(
                    &pair.target_database_id,
                    &pair.target_table,
                    transformed,
                )
                .await?;
        }

        emit(
            events,
            CopyEvent::BatchApplied {
                table: pair.source_key(),
                rows_copied,
                total_rows,
                progress_percentage: progress_percentage(
                    tables_done,
                    tables_total,
                    rows_copied,
                    total_rows,
                ),
            },
        )
        .await?;
    }

    Ok(rows_copied)
}

/// A dropped receiver means the caller is gone; the copy aborts rather
/// than running headless.
async fn emit(events: &mpsc::Sender<CopyEvent>, event: CopyEvent) -> anyhow::Result<()> {
    events
        .send(event)
        .await
        .map_err(|_| anyhow::anyhow!("progress consumer went away; copy aborted"))
}

/// Advisory in-memory registry backing `GetCopyStatus`. Nothing here is
/// persisted; entries of terminal operations are swept after an hour.
#[derive(Debug, Clone)]
pub struct CopyStatus {
    pub operation_id: Uuid,
    pub phase: String,
    pub rows_copied: i64,
    pub total_rows: i64,
    pub current_table: String,
    pub errors: Vec<String>,
    pub updated: DateTime<Utc>,
}

impl CopyStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.phase.as_str(),
            "completed" | "completed_with_errors" | "error"
        )
    }
}

#[derive(Debug, Default)]
pub struct OperationRegistry {
    inner: RwLock<HashMap<Uuid, CopyStatus>>,
}

/// How long terminal operations stay queryable.
pub fn terminal_retention() -> chrono::Duration {
    chrono::Duration::hours(1)
}

impl OperationRegistry {
    pub fn begin(&self, operation_id: Uuid) {
        let mut inner = self.inner.write().unwrap();
        inner.insert(
            operation_id,
            CopyStatus {
                operation_id,
                phase: "starting".to_string(),
                rows_copied: 0,
                total_rows: 0,
                current_table: String::new(),
                errors: Vec::new(),
                updated: Utc::now(),
            },
        );
    }

    pub fn record(&self, operation_id: Uuid, event: &CopyEvent) {
        let mut inner = self.inner.write().unwrap();
        let Some(status) = inner.get_mut(&operation_id) else {
            return;
        };
        status.updated = Utc::now();
        match event {
            CopyEvent::TableStarted {
                table, total_rows, ..
            } => {
                status.phase = "copying".to_string();
                status.current_table = table.clone();
                status.total_rows = (*total_rows).max(0);
            }
            CopyEvent::BatchApplied { rows_copied, .. } => {
                status.rows_copied = *rows_copied;
            }
            CopyEvent::TableCompleted { .. } => {}
            CopyEvent::Finished {
                phase,
                rows_copied,
                errors,
            } => {
                status.phase = phase.to_string();
                status.rows_copied = *rows_copied;
                status.errors = errors.clone();
            }
        }
    }

    pub fn get(&self, operation_id: Uuid) -> Option<CopyStatus> {
        self.inner.read().unwrap().get(&operation_id).cloned()
    }

    /// Drop terminal entries older than the retention window.
    pub fn sweep(&self, now: DateTime<Utc>) {
        let mut inner = self.inner.write().unwrap();
        inner.retain(|_, status| {
            !status.is_terminal() || now - status.updated < terminal_retention()
        });
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mappings::{RuleBinding, TablePair, DIRECT_MAPPING};
    use async_trait::async_trait;
    use futures::stream::BoxStream;
    use std::sync::Mutex;

    /// In-memory tables keyed by `database.table`.
    #[derive(Default)]
    struct FakeData {
        tables: HashMap<String, Vec<String>>,
        inserted: Mutex<HashMap<String, Vec<String>>>,
        fail_row_count: bool,
    }

    #[async_trait]
    impl DataConnector for FakeData {
        async fn table_row_count(&self, database_id: &str, table_name: &str) -> anyhow::Result<i64> {
            if self.fail_row_count {
                anyhow::bail!("probe refused");
            }
            Ok(self
                .tables
                .get(&format!("{database_id}.{table_name}"))
                .map(|rows| rows.len() as i64)
                .unwrap_or(0))
        }

        async fn open_fetch_stream(
            &self,
            database_id: &str,
            table_name: &str,
            _columns: Vec<String>,
            batch_size: i32,
        ) -> anyhow::Result<BoxStream<'static, anyhow::Result<Vec<String>>>> {
            let rows = self
                .tables
                .get(&format!("{database_id}.{table_name}"))
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("no such table {database_id}.{table_name}"))?;
            let batches: Vec<anyhow::Result<Vec<String>>> = rows
                .chunks(batch_size as usize)
                .map(|chunk| Ok(chunk.to_vec()))
                .collect();
            Ok(futures::stream::iter(batches).boxed())
        }

        async fn insert_batch(
            &self,
            database_id: &str,
            table_name: &str,
            rows: Vec<String>,
        ) -> anyhow::Result<i64> {
            let count = rows.len() as i64;
            self.inserted
                .lock()
                .unwrap()
                .entry(format!("{database_id}.{table_name}"))
                .or_default()
                .extend(rows);
            Ok(count)
        }
    }

    fn orders_pair() -> TablePair {
        TablePair {
            source_database_id: "src".to_string(),
            source_table: "orders".to_string(),
            target_database_id: "tgt".to_string(),
            target_table: "orders".to_string(),
            bindings: vec![RuleBinding {
                source_column: "id".to_string(),
                target_column: "id".to_string(),
                transformation_name: DIRECT_MAPPING.to_string(),
            }],
        }
    }

    fn fake_with_orders(rows: usize) -> FakeData {
        let mut data = FakeData::default();
        data.tables.insert(
            "src.orders".to_string(),
            (0..rows).map(|i| format!(r#"{{"id": {i}}}"#)).collect(),
        );
        data
    }

    async fn drain(mut rx: mpsc::Receiver<CopyEvent>) -> Vec<CopyEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn copies_all_batches_in_order() {
        let data = fake_with_orders(5);
        let (tx, rx) = mpsc::channel(16);

        let options = CopyOptions {
            batch_size: 2,
            ..Default::default()
        };
        let outcome = run_copy(&[orders_pair()], &options, &data, None, &tx)
            .await
            .unwrap();
        drop(tx);

        assert_eq!(outcome.rows_copied, 5);
        assert!(outcome.errors.is_empty());
        assert_eq!(outcome.terminal_phase(), "completed");
        assert_eq!(data.inserted.lock().unwrap()["tgt.orders"].len(), 5);

        let events = drain(rx).await;
        // Started, three batches (2 + 2 + 1), completed, finished.
        assert_eq!(events.len(), 6);
        assert!(matches!(events[0], CopyEvent::TableStarted { total_rows: 5, .. }));
        assert!(matches!(
            events.last().unwrap(),
            CopyEvent::Finished {
                phase: "completed",
                rows_copied: 5,
                ..
            }
        ));

        // Progress is monotonic.
        let mut last = -1.0;
        for event in &events {
            if let CopyEvent::BatchApplied {
                progress_percentage,
                ..
            } = event
            {
                assert!(*progress_percentage >= last);
                last = *progress_percentage;
            }
        }
    }

    #[tokio::test]
    async fn dry_run_counts_without_inserting() {
        let data = fake_with_orders(3);
        let (tx, _rx) = mpsc::channel(16);

        let options = CopyOptions {
            dry_run: true,
            ..Default::default()
        };
        let outcome = run_copy(&[orders_pair()], &options, &data, None, &tx)
            .await
            .unwrap();

        assert_eq!(outcome.rows_copied, 3);
        assert!(data.inserted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn probe_failure_is_best_effort() {
        let mut data = fake_with_orders(2);
        data.fail_row_count = true;
        let (tx, rx) = mpsc::channel(16);

        let outcome = run_copy(&[orders_pair()], &CopyOptions::default(), &data, None, &tx)
            .await
            .unwrap();
        drop(tx);

        assert_eq!(outcome.rows_copied, 2);
        let events = drain(rx).await;
        assert!(matches!(
            events[0],
            CopyEvent::TableStarted { total_rows: -1, .. }
        ));
    }

    #[tokio::test]
    async fn missing_table_is_recorded_not_fatal() {
        let data = fake_with_orders(2);
        let mut missing = orders_pair();
        missing.source_table = "absent".to_string();
        let (tx, _rx) = mpsc::channel(32);

        let outcome = run_copy(
            &[missing, orders_pair()],
            &CopyOptions::default(),
            &data,
            None,
            &tx,
        )
        .await
        .unwrap();

        assert_eq!(outcome.rows_copied, 2);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.terminal_phase(), "completed_with_errors");
    }

    #[tokio::test]
    async fn empty_pair_set_is_an_error() {
        let data = FakeData::default();
        let (tx, _rx) = mpsc::channel(4);

        let err = run_copy(&[], &CopyOptions::default(), &data, None, &tx)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no mapping rules usable"));
    }

    #[test]
    fn batch_size_clamping() {
        assert_eq!(effective_batch_size(0), DEFAULT_BATCH_SIZE);
        assert_eq!(effective_batch_size(-5), 1);
        assert_eq!(effective_batch_size(1), 1);
        assert_eq!(effective_batch_size(500), 500);
    }

    #[test]
    fn registry_tracks_and_sweeps() {
        let registry = OperationRegistry::default();
        let id = Uuid::new_v4();
        registry.begin(id);

        registry.record(
            id,
            &CopyEvent::Finished {
                phase: "completed",
                rows_copied: 10,
                errors: Vec::new(),
            },
        );
        let status = registry.get(id).unwrap();
        assert!(status.is_terminal());
        assert_eq!(status.rows_copied, 10);

        // Fresh terminal entries survive a sweep; stale ones do not.
        registry.sweep(Utc::now());
        assert!(registry.get(id).is_some());
        registry.sweep(Utc::now() + chrono::Duration::hours(2));
        assert!(registry.get(id).is_none());
    }
}
