//! Errors internal to the routing client. Never surfaced directly to HTTP callers;
//! the dispatch engine maps any `RoutingError` to `DispatchError::RoutingUnavailable`.

#[derive(Debug, thiserror::Error)]
pub enum RoutingError {
    #[error("circuit breaker is open")]
    CircuitOpen,

    #[error("routing request timed out")]
    Timeout,

    #[error("routing provider returned an error: {0}")]
    Provider(String),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}
