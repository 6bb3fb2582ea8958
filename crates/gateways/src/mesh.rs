//! Client of the Mesh service: overlay topology and the user-data
//! broadcast pub/sub.

use proto_redb::mesh::*;
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

    pub async fn seed_mesh(&self, req: SeedMeshRequest) -> crate::Result<SeedMeshResponse> {
        call::unary(&self.inner, "/redb.mesh.Mesh/SeedMesh", req).await
    }

    pub async fn join_mesh(&self, req: JoinMeshRequest) -> crate::Result<JoinMeshResponse> {
        call::unary(&self.inner, "/redb.mesh.Mesh/JoinMesh", req).await
    }

    pub async fn get_topology(&self, req: GetTopologyRequest) -> crate::Result<GetTopologyResponse> {
        call::unary(&self.inner, "/redb.mesh.Mesh/GetTopology", req).await
    }

    pub async fn get_message_metrics(
        &self,
        req: GetMessageMetricsRequest,
    ) -> crate::Result<GetMessageMetricsResponse> {
        call::unary(&self.inner, "/redb.mesh.Mesh/GetMessageMetrics", req).await
    }

    pub async fn broadcast_user_data(
        &self,
        req: BroadcastUserDataRequest,
    ) -> crate::Result<BroadcastUserDataResponse> {
        call::unary(&self.inner, "/redb.mesh.Mesh/BroadcastUserData", req).await
    }

    pub async fn query_record_version(
        &self,
        req: QueryRecordVersionRequest,
    ) -> crate::Result<QueryRecordVersionResponse> {
        call::unary(&self.inner, "/redb.mesh.Mesh/QueryRecordVersion", req).await
    }
}
