//! Backend abstraction.
//!
//! A [`PropertyPathStore`](crate::PropertyPathStore) never stores or
//! transmits data itself. It forwards every call to a backend that owns the
//! trait instances, tracks their versions, and talks to the remote peer.
//! How the backend persists or transmits data is its own business.

use crate::completion::CompletionNotifier;
use crate::error::SinkResult;
use crate::handle::SinkHandle;
use wdm_types::{DataVersion, TraitDescriptor};

/// Per-instance operations a data sink delegates to.
///
/// Every method must report an unknown or released `handle` as
/// [`SinkError::InvalidHandle`](crate::SinkError::InvalidHandle) rather than
/// touching other state.
pub trait DataSinkBackend: Send + Sync {
    /// Prepares the instance for use by a store.
    fn init(&self, handle: SinkHandle) -> SinkResult<()>;

    /// Releases the instance. The handle is stale afterwards.
    fn shutdown(&self, handle: SinkHandle) -> SinkResult<()>;

    /// Discards locally staged modifications.
    fn clear(&self, handle: SinkHandle) -> SinkResult<()>;

    /// Starts re-synchronizing every property from the authoritative source.
    ///
    /// Must return without waiting; the outcome is reported later through
    /// `notifier`, never from inside this call.
    fn begin_refresh(&self, handle: SinkHandle, notifier: CompletionNotifier) -> SinkResult<()>;

    /// Writes a 64-bit integer. `value` is the raw bit pattern; `signed`
    /// says how to interpret it.
    fn set_int(
        &self,
        handle: SinkHandle,
        path: &str,
        value: i64,
        conditional: bool,
        signed: bool,
    ) -> SinkResult<()>;

    fn set_double(&self, handle: SinkHandle, path: &str, value: f64, conditional: bool)
    -> SinkResult<()>;

    fn set_bool(&self, handle: SinkHandle, path: &str, value: bool, conditional: bool)
    -> SinkResult<()>;

    fn set_string(&self, handle: SinkHandle, path: &str, value: &str, conditional: bool)
    -> SinkResult<()>;

    fn set_bytes(&self, handle: SinkHandle, path: &str, value: &[u8], conditional: bool)
    -> SinkResult<()>;

    fn set_null(&self, handle: SinkHandle, path: &str, conditional: bool) -> SinkResult<()>;

    /// Reads the raw 64-bit pattern of an integer property.
    fn get_int(&self, handle: SinkHandle, path: &str) -> SinkResult<i64>;

    fn get_double(&self, handle: SinkHandle, path: &str) -> SinkResult<f64>;

    fn get_bool(&self, handle: SinkHandle, path: &str) -> SinkResult<bool>;

    /// Reads a string property; `None` if the property is null.
    fn get_string(&self, handle: SinkHandle, path: &str) -> SinkResult<Option<String>>;

    /// Reads a byte-string property; `None` if the property is null.
    fn get_bytes(&self, handle: SinkHandle, path: &str) -> SinkResult<Option<Vec<u8>>>;

    fn get_version(&self, handle: SinkHandle) -> SinkResult<DataVersion>;
}

/// Client-wide operations used by [`WdmClient`](crate::WdmClient).
pub trait ClientBackend: DataSinkBackend {
    /// Creates a trait instance and returns its handle.
    fn new_trait_instance(&self, descriptor: &TraitDescriptor) -> SinkResult<SinkHandle>;

    /// Starts pushing every staged write of every instance to the remote
    /// peer. Conditional writes whose precondition fails are rejected and
    /// reported through `notifier`.
    fn begin_flush_update(&self, notifier: CompletionNotifier) -> SinkResult<()>;

    /// Starts refreshing every instance.
    fn begin_refresh_all(&self, notifier: CompletionNotifier) -> SinkResult<()>;

    /// Releases every instance and stops accepting new ones.
    fn close(&self) -> SinkResult<()>;
}
