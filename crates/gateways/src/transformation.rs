//! Client of the Transformation service: named transformation functions
//! applied to single values, dispatched by function name.

use proto_redb::transformation::*;
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

    pub async fn transform(&self, req: TransformRequest) -> crate::Result<TransformResponse> {
        call::unary(
            &self.inner,
            "/redb.transformation.Transformation/Transform",
            req,
        )
        .await
    }
}
