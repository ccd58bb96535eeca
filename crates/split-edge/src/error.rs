//! Typed errors the coordinator returns, one variant per HTTP status
//! class the transport layer maps them to.

#[derive(Debug, thiserror::Error)]
pub enum EdgeError {
    #[error("malformed wire payload")]
    BadWireFormat(#[from] split_wire::WireError),

    #[error("client '{0}' has never registered")]
    UnknownClient(String),

    #[error("layer execution failed")]
    Runtime(#[from] split_executor::ExecutorError),

    #[error("internal error")]
    Internal(#[source] Box<dyn std::error::Error + Send + Sync>),
}
