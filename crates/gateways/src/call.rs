//! Shared call plumbing for the hand-written clients. These are the same
//! `tonic::client::Grpc` entry points tonic's codegen emits, factored once.

use tonic::client::Grpc;
use tonic::codec::ProstCodec;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::Channel;

pub(crate) async fn unary<M1, M2>(
    grpc: &Grpc<Channel>,
    path: &'static str,
    request: M1,
) -> crate::Result<M2>
where
    M1: prost::Message + Send + Sync + 'static,
    M2: prost::Message + Default + Send + Sync + 'static,
{
    let mut grpc = grpc.clone();
    grpc.ready().await?;

    let codec: ProstCodec<M1, M2> = ProstCodec::default();
    let response = grpc
        .unary(
            tonic::Request::new(request),
            PathAndQuery::from_static(path),
            codec,
        )
        .await?;

    Ok(response.into_inner())
}

pub(crate) async fn server_streaming<M1, M2>(
    grpc: &Grpc<Channel>,
    path: &'static str,
    request: M1,
) -> crate::Result<tonic::Streaming<M2>>
where
    M1: prost::Message + Send + Sync + 'static,
    M2: prost::Message + Default + Send + Sync + 'static,
{
    let mut grpc = grpc.clone();
    grpc.ready().await?;

    let codec: ProstCodec<M1, M2> = ProstCodec::default();
    let response = grpc
        .server_streaming(
            tonic::Request::new(request),
            PathAndQuery::from_static(path),
            codec,
        )
        .await?;

    Ok(response.into_inner())
}
