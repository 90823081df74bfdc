//! # cs-opcua-adapter
//!
//! Publishes a control system's process variables as OPC UA nodes.
//!
//! Every variable becomes an object node under the `ProcessVariables`
//! folder with `Name`, `Type` and `Value` fields bound to live accessors and
//! a `TimeStamp` child captured at mapping time.
//!
//! ## Features
//! - `test-support`: Enables `MockAddressSpace` and
//!   `MockProcessVariableSource` via `mockall`

mod adapter;
mod address_space;
mod config;
mod errors;
mod mapping;
mod process;
mod server;
mod timestamp;
mod type_tag;
mod variable;
mod worker;

// Stable public API
pub use adapter::ControlSystemAdapter;
pub use address_space::{
    AddressSpace, FieldAccessor, FieldId, LocalizedText, MemoryAddressSpace, NodeClass, NodeId,
    NodeSnapshot, ObjectNodeRequest, ids,
};
pub use config::{AdapterConfig, DEFAULT_PORT};
pub use errors::{AdapterError, AdapterResult};
pub use mapping::{MappingReport, SkippedVariable, format_array, map_all};
pub use process::{ProcessValue, ProcessVariable, ProcessVariableSource, PvStore};
pub use server::{ServerHandle, ServerRequest, UaServer};
pub use timestamp::TimeStamp;
pub use type_tag::{TagLayout, TypeTag, ValueKind, ValueType, resolve};
pub use variable::{MappedVariable, VariableSpec, map_variable};
pub use worker::{ManagedWorker, ManagerState, WorkerManager};

// Test support re-export
#[cfg(feature = "test-support")]
pub use address_space::MockAddressSpace;
#[cfg(feature = "test-support")]
pub use process::MockProcessVariableSource;
