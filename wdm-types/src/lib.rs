//! Core value types for WDM trait data sinks.
//!
//! This crate defines the plain, backend-agnostic types shared by the
//! data-sink engine and its backends:
//! - Resource identifiers naming the node or resource that owns a trait
//! - Property values written to and read from trait paths
//! - Trait data versions
//! - Trait descriptors used to instantiate a data sink
//!
//! Nothing in here performs I/O; the engine lives in `wdm-sink`.

mod descriptor;
mod resource;
mod value;
mod version;

pub use bigdecimal::num_bigint::BigInt;
pub use descriptor::TraitDescriptor;
pub use resource::{ResourceIdentifier, ResourceType, RESOURCE_ID_LEN, SELF_NODE_ID};
pub use value::{truncate_to_i64, truncate_to_u64, PropertyValue, ValueKind};
pub use version::DataVersion;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("resource id must be {expected} bytes, got {len}")]
    InvalidResourceIdLength { expected: usize, len: usize },

    #[error("invalid resource identifier: {0}")]
    InvalidResourceIdentifier(String),
}
