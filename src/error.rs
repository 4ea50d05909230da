use thiserror::Error;

/// Per-request error. Each variant maps 1:1 to an `ERR *` response line and
/// never outlives the request that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("BAD_NODES")]
    BadNodes,

    #[error("BAD_EDGE")]
    BadEdge,

    #[error("BAD_SPEED")]
    BadSpeed,

    #[error("NO_ROUTE")]
    NoRoute,

    #[error("ROUTE_FAIL")]
    RouteFail,

    #[error("INTERNAL")]
    Internal,
}
