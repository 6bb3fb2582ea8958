//! Client of the Anchor service: instance/database lifecycle, data access,
//! and CDC replication control.

use proto_redb::anchor::*;
use tonic::client::Grpc;
use tonic::transport::Channel;

use crate::call;

#[derive(Clone, Debug)]
pub struct Client {
    inner: Grpc<Channel>,
}

impl Client {
    pub fn new(channel: Channel) -> Self {
        Self {
            inner: Grpc::new(channel),
        }
    }

    // Instance and database lifecycle.

    pub async fn connect_instance(&self, req: ConnectInstanceRequest) -> crate::Result<Ack> {
        call::unary(&self.inner, "/redb.anchor.Anchor/ConnectInstance", req).await
    }

    pub async fn disconnect_instance(&self, req: DisconnectInstanceRequest) -> crate::Result<Ack> {
        call::unary(&self.inner, "/redb.anchor.Anchor/DisconnectInstance", req).await
    }

    pub async fn connect_database(&self, req: ConnectDatabaseRequest) -> crate::Result<Ack> {
        call::unary(&self.inner, "/redb.anchor.Anchor/ConnectDatabase", req).await
    }

    pub async fn disconnect_database(&self, req: DisconnectDatabaseRequest) -> crate::Result<Ack> {
        call::unary(&self.inner, "/redb.anchor.Anchor/DisconnectDatabase", req).await
    }

    pub async fn create_database(&self, req: CreateDatabaseRequest) -> crate::Result<Ack> {
        call::unary(&self.inner, "/redb.anchor.Anchor/CreateDatabase", req).await
    }

    pub async fn wipe_database(&self, req: WipeDatabaseRequest) -> crate::Result<Ack> {
        call::unary(&self.inner, "/redb.anchor.Anchor/WipeDatabase", req).await
    }

    pub async fn deploy_database_schema(
        &self,
        req: DeployDatabaseSchemaRequest,
    ) -> crate::Result<Ack> {
        call::unary(&self.inner, "/redb.anchor.Anchor/DeployDatabaseSchema", req).await
    }

    pub async fn drop_database(&self, req: DropDatabaseRequest) -> crate::Result<Ack> {
        call::unary(&self.inner, "/redb.anchor.Anchor/DropDatabase", req).await
    }

    pub async fn drop_table(&self, req: DropTableRequest) -> crate::Result<Ack> {
        call::unary(&self.inner, "/redb.anchor.Anchor/DropTable", req).await
    }

    pub async fn wipe_table(&self, req: WipeTableRequest) -> crate::Result<Ack> {
        call::unary(&self.inner, "/redb.anchor.Anchor/WipeTable", req).await
    }

    // Data access.

    pub async fn fetch_data(&self, req: FetchDataRequest) -> crate::Result<FetchDataResponse> {
        call::unary(&self.inner, "/redb.anchor.Anchor/FetchData", req).await
    }

    pub async fn fetch_data_stream(
        &self,
        req: FetchDataStreamRequest,
    ) -> crate::Result<tonic::Streaming<FetchDataStreamResponse>> {
        call::server_streaming(&self.inner, "/redb.anchor.Anchor/FetchDataStream", req).await
    }

    pub async fn stream_table_data(
        &self,
        req: StreamTableDataRequest,
    ) -> crate::Result<tonic::Streaming<StreamTableDataResponse>> {
        call::server_streaming(&self.inner, "/redb.anchor.Anchor/StreamTableData", req).await
    }

    pub async fn insert_data(&self, req: InsertDataRequest) -> crate::Result<InsertDataResponse> {
        call::unary(&self.inner, "/redb.anchor.Anchor/InsertData", req).await
    }

    pub async fn insert_batch_data(
        &self,
        req: InsertBatchDataRequest,
    ) -> crate::Result<InsertBatchDataResponse> {
        call::unary(&self.inner, "/redb.anchor.Anchor/InsertBatchData", req).await
    }

    pub async fn update_table_data(
        &self,
        req: UpdateTableDataRequest,
    ) -> crate::Result<UpdateTableDataResponse> {
        call::unary(&self.inner, "/redb.anchor.Anchor/UpdateTableData", req).await
    }

    pub async fn get_table_row_count(
        &self,
        req: GetTableRowCountRequest,
    ) -> crate::Result<GetTableRowCountResponse> {
        call::unary(&self.inner, "/redb.anchor.Anchor/GetTableRowCount", req).await
    }

    pub async fn transform_data(
        &self,
        req: TransformDataRequest,
    ) -> crate::Result<TransformDataResponse> {
        call::unary(&self.inner, "/redb.anchor.Anchor/TransformData", req).await
    }

    // CDC replication.

    pub async fn start_cdc_replication(
        &self,
        req: StartCdcReplicationRequest,
    ) -> crate::Result<StartCdcReplicationResponse> {
        call::unary(&self.inner, "/redb.anchor.Anchor/StartCDCReplication", req).await
    }

    pub async fn stop_cdc_replication(
        &self,
        req: StopCdcReplicationRequest,
    ) -> crate::Result<StopCdcReplicationResponse> {
        call::unary(&self.inner, "/redb.anchor.Anchor/StopCDCReplication", req).await
    }

    pub async fn resume_cdc_replication(
        &self,
        req: ResumeCdcReplicationRequest,
    ) -> crate::Result<ResumeCdcReplicationResponse> {
        call::unary(&self.inner, "/redb.anchor.Anchor/ResumeCDCReplication", req).await
    }

    pub async fn remove_replication_source(
        &self,
        req: RemoveReplicationSourceRequest,
    ) -> crate::Result<Ack> {
        call::unary(
            &self.inner,
            "/redb.anchor.Anchor/RemoveReplicationSource",
            req,
        )
        .await
    }
}
