//! Shared domain types for the split-computing edge: the layer model, the
//! client identity type, and the unified split-index convention every other
//! crate in this workspace builds on.

pub mod client;
pub mod error;
pub mod layer;
pub mod split;

pub use client::{ClientId, ClientRecord, MAX_CLIENT_ID_BYTES};
pub use error::CoreError;
pub use layer::{LayerIndex, LayerSpec, Model};
pub use split::SplitIndex;
