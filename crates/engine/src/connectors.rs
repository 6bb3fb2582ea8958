//! Trait seams over the downstream gateways, as the orchestrators consume
//! them. The engine wires the real clients in; tests substitute in-memory
//! fakes.

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use proto_redb::anchor;

/// A live CDC session handed back by Anchor: the connection handle plus the
/// opaque resumable state, both persisted on the replication source.
#[derive(Debug, Clone)]
pub struct CdcSession {
    pub connection_id: String,
    pub state: String,
}

/// Bulk data-plane operations of the copy pipeline.
#[async_trait]
pub trait DataConnector: Send + Sync {
    async fn table_row_count(&self, database_id: &str, table_name: &str) -> anyhow::Result<i64>;

    /// Open a streamed fetch of the named columns. Each stream item is one
    /// batch of JSON row documents.
    async fn open_fetch_stream(
        &self,
        database_id: &str,
        table_name: &str,
        columns: Vec<String>,
        batch_size: i32,
    ) -> anyhow::Result<BoxStream<'static, anyhow::Result<Vec<String>>>>;

    /// Transactionally insert one batch, returning rows affected.
    async fn insert_batch(
        &self,
        database_id: &str,
        table_name: &str,
        rows: Vec<String>,
    ) -> anyhow::Result<i64>;
}

/// CDC replication control of the relationship orchestrator.
#[async_trait]
pub trait CdcConnector: Send + Sync {
    async fn start_replication(
        &self,
        req: anchor::StartCdcReplicationRequest,
    ) -> anyhow::Result<CdcSession>;

    /// Stop the session, returning the final state. With `preserve_state`
    /// the slot survives for a later resume.
    async fn stop_replication(
        &self,
        connection_id: &str,
        slot_name: &str,
        publication_name: &str,
        preserve_state: bool,
    ) -> anyhow::Result<String>;

    async fn resume_replication(
        &self,
        req: anchor::ResumeCdcReplicationRequest,
    ) -> anyhow::Result<CdcSession>;

    async fn remove_replication_source(
        &self,
        connection_id: &str,
        slot_name: &str,
        publication_name: &str,
    ) -> anyhow::Result<()>;
}

/// Named per-value transformation dispatch.
#[async_trait]
pub trait TransformConnector: Send + Sync {
    async fn transform(&self, function_name: &str, input: &str) -> anyhow::Result<String>;
}

/// Cross-dialect schema translation. Returns the translated structure and
/// any conversion warnings; an absent target structure is an error even
/// when the RPC succeeded.
#[async_trait]
pub trait TranslateConnector: Send + Sync {
    async fn translate(
        &self,
        source_type: &str,
        target_type: &str,
        source_structure: &str,
    ) -> anyhow::Result<(String, Vec<String>)>;
}

/// The production DataConnector / CdcConnector over the Anchor gateway.
#[derive(Clone)]
pub struct AnchorConnector {
    pub client: gateways::anchor::Client,
}

#[async_trait]
impl DataConnector for AnchorConnector {
    async fn table_row_count(&self, database_id: &str, table_name: &str) -> anyhow::Result<i64> {
        let resp = self
            .client
            .get_table_row_count(anchor::GetTableRowCountRequest {
                database_id: database_id.to_string(),
                table_name: table_name.to_string(),
            })
            .await?;
        Ok(resp.count)
    }

    async fn open_fetch_stream(
        &self,
        database_id: &str,
        table_name: &str,
        columns: Vec<String>,
        batch_size: i32,
    ) -> anyhow::Result<BoxStream<'static, anyhow::Result<Vec<String>>>> {
        let streaming = self
            .client
            .fetch_data_stream(anchor::FetchDataStreamRequest {
                database_id: database_id.to_string(),
                table_name: table_name.to_string(),
                columns,
                batch_size,
            })
            .await?;

        Ok(streaming
            .map(|item| match item {
                Ok(batch) => Ok(batch.rows),
                Err(status) => Err(anyhow::Error::from(status)),
            })
            .boxed())
    }

    async fn insert_batch(
        &self,
        database_id: &str,
        table_name: &str,
        rows: Vec<String>,
    ) -> anyhow::Result<i64> {
        let resp = self
            .client
            .insert_batch_data(anchor::InsertBatchDataRequest {
                database_id: database_id.to_string(),
                table_name: table_name.to_string(),
                rows,
                atomic: true,
            })
            .await?;
        Ok(resp.rows_affected)
    }
}

#[async_trait]
impl CdcConnector for AnchorConnector {
    async fn start_replication(
        &self,
        req: anchor::StartCdcReplicationRequest,
    ) -> anyhow::Result<CdcSession> {
        let resp = self.client.start_cdc_replication(req).await?;
        Ok(CdcSession {
            connection_id: resp.connection_id,
            state: resp.state,
        })
    }

    async fn stop_replication(
        &self,
        connection_id: &str,
        slot_name: &str,
        publication_name: &str,
        preserve_state: bool,
    ) -> anyhow::Result<String> {
        let resp = self
            .client
            .stop_cdc_replication(anchor::StopCdcReplicationRequest {
                connection_id: connection_id.to_string(),
                slot_name: slot_name.to_string(),
                publication_name: publication_name.to_string(),
                preserve_state,
            })
            .await?;
        Ok(resp.state)
    }

    async fn resume_replication(
        &self,
        req: anchor::ResumeCdcReplicationRequest,
    ) -> anyhow::Result<CdcSession> {
        let resp = self.client.resume_cdc_replication(req).await?;
        Ok(CdcSession {
            connection_id: resp.connection_id,
            state: resp.state,
        })
    }

    async fn remove_replication_source(
        &self,
        connection_id: &str,
        slot_name: &str,
        publication_name: &str,
    ) -> anyhow::Result<()> {
        self.client
            .remove_replication_source(anchor::RemoveReplicationSourceRequest {
                connection_id: connection_id.to_string(),
                slot_name: slot_name.to_string(),
                publication_name: publication_name.to_string(),
            })
            .await?;
        Ok(())
    }
}

/// The production TranslateConnector over the UnifiedModel gateway.
#[derive(Clone)]
pub struct UnifiedModelConnector {
    pub client: gateways::unified_model::Client,
}

#[async_trait]
impl TranslateConnector for UnifiedModelConnector {
    async fn translate(
        &self,
        source_type: &str,
        target_type: &str,
        source_structure: &str,
    ) -> anyhow::Result<(String, Vec<String>)> {
        let resp = self
            .client
            .translate(proto_redb::unifiedmodel::TranslateRequest {
                source_type: source_type.to_string(),
                target_type: target_type.to_string(),
                source_structure: source_structure.to_string(),
            })
            .await?;

        let target_structure = resp.target_structure.ok_or_else(|| {
            anyhow::anyhow!("translation from {source_type} to {target_type} produced no structure")
        })?;
        Ok((target_structure, resp.warnings))
    }
}

/// The production TransformConnector over the Transformation gateway.
#[derive(Clone)]
pub struct TransformationConnector {
    pub client: gateways::transformation::Client,
}

#[async_trait]
impl TransformConnector for TransformationConnector {
    async fn transform(&self, function_name: &str, input: &str) -> anyhow::Result<String> {
        let resp = self
            .client
            .transform(proto_redb::transformation::TransformRequest {
                function_name: function_name.to_string(),
                input: input.to_string(),
            })
            .await?;

        if resp.status != proto_redb::Status::Success as i32 {
            anyhow::bail!("transformation '{function_name}' returned non-success status");
        }
        Ok(resp.output)
    }
}
