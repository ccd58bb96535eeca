use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("model has zero layers")]
    EmptyModel,

    #[error("layer list out of order: expected index {expected}, found {found}")]
    OutOfOrderLayer { expected: usize, found: usize },

    #[error("layer {layer} references a later layer as inbound")]
    ForwardReferencingLayer { layer: usize },

    #[error("client_id must not be empty")]
    EmptyClientId,

    #[error("client_id must be ASCII")]
    NonAsciiClientId,

    #[error("client_id is {len} bytes, limit is 9")]
    ClientIdTooLong { len: usize },
}
