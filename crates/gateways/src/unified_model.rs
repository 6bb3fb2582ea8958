//! Client of the UnifiedModel service: schema translation between database
//! dialects.

use proto_redb::unifiedmodel::*;
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

    pub async fn translate(&self, req: TranslateRequest) -> crate::Result<TranslateResponse> {
        call::unary(&self.inner, "/redb.unifiedmodel.UnifiedModel/Translate", req).await
    }
}
