//! Client of the Stream service: message-platform subscriptions.

use proto_redb::stream::*;
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

    pub async fn connect_stream(&self, req: ConnectStreamRequest) -> crate::Result<StreamAck> {
        call::unary(&self.inner, "/redb.stream.Stream/ConnectStream", req).await
    }

    pub async fn disconnect_stream(
        &self,
        req: DisconnectStreamRequest,
    ) -> crate::Result<StreamAck> {
        call::unary(&self.inner, "/redb.stream.Stream/DisconnectStream", req).await
    }

    pub async fn get_stream_status(
        &self,
        req: GetStreamStatusRequest,
    ) -> crate::Result<GetStreamStatusResponse> {
        call::unary(&self.inner, "/redb.stream.Stream/GetStreamStatus", req).await
    }
}
