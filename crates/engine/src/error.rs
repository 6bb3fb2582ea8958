//! Mapping of internal failures onto the wire error taxonomy. The façade
//! surfaces exactly the `tonic::Status` codes: InvalidArgument, NotFound,
//! FailedPrecondition, PermissionDenied, Internal, Unavailable,
//! DeadlineExceeded, Unimplemented.

use tonic::Status;

pub type ApiResult<T> = Result<T, Status>;

/// Storage failures are always Internal; the underlying error is logged,
/// not leaked to the client.
pub fn db_error(err: sqlx::Error) -> Status {
    tracing::error!(error = %err, "database error");
    Status::internal("database error, please retry the request")
}

/// Gateway failures surface as Unavailable when the service is absent or
/// unreachable, Internal otherwise.
pub fn gateway_error(service: &'static str, err: gateways::Error) -> Status {
    if err.is_unavailable() {
        tracing::warn!(service, error = %err, "downstream service unavailable");
        Status::unavailable(format!("{service} service is not available"))
    } else {
        tracing::error!(service, error = %err, "downstream service error");
        Status::internal(format!("{service} error: {err}"))
    }
}
