use crate::address_space::{FieldId, NodeId};
use crate::type_tag::{ValueKind, ValueType};
use std::net::SocketAddr;
use thiserror::Error;

/// Result type alias for adapter operations.
pub type AdapterResult<T> = Result<T, AdapterError>;

/// Centralized error enum for the control-system adapter.
///
/// The first three variants are variable-scoped: the bulk mapping pass turns
/// them into a skipped variable plus a log entry and never propagates them.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AdapterError {
    /// The runtime type of a process variable has no OPC UA type tag.
    #[error("Unsupported value type: {0}")]
    UnsupportedType(ValueType),

    /// The node a variable should be attached to does not exist.
    ///
    /// Indicates a construction-order bug, not a transient condition.
    #[error("Base node {0} is not mapped in the address space")]
    UnmappedBase(NodeId),

    /// The source was asked for a value kind the variable does not hold,
    /// either another element type or a scalar/array mismatch.
    #[error("Bad cast: '{variable}' holds {actual}, requested {requested}")]
    BadCast {
        variable: String,
        requested: ValueKind,
        actual: ValueKind,
    },

    /// The source has no variable with this name.
    #[error("Unknown process variable: {0}")]
    UnknownVariable(String),

    /// The endpoint could not be bound (e.g. port already in use).
    #[error("Failed to bind OPC UA endpoint {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// A node id did not resolve in the address space.
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    /// No accessor is registered for the field on this node.
    #[error("Node {node} has no data source for field '{field}'")]
    NoDataSource { node: NodeId, field: FieldId },

    /// Operation attempted in an invalid state (e.g. start after terminate).
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Catch-all for unexpected internal failures.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AdapterError {
    /// Returns `true` for errors that only affect a single variable during
    /// the mapping pass.
    pub const fn is_variable_scoped(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedType(_) | Self::UnmappedBase(_) | Self::BadCast { .. }
        )
    }
}
