//! Property-path store bound to one backend trait instance.
//!
//! The store is a thin, typed front for a [`DataSinkBackend`]: every write is
//! forwarded immediately and returns without waiting for acknowledgement,
//! every read is a synchronous look at the state the backend currently
//! knows. A refresh is the only asynchronous operation; its outcome reaches
//! the [`CompletionHandler`] registered *at delivery time*.
//!
//! After [`PropertyPathStore::shutdown`] the store has no backend. What calls
//! then return is governed by [`InvalidHandlePolicy`].

use crate::backend::DataSinkBackend;
use crate::completion::{CompletionHandler, CompletionNotifier, CompletionSlot};
use crate::config::{InvalidHandlePolicy, StoreConfig};
use crate::error::{SinkError, SinkResult};
use crate::handle::SinkHandle;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::{debug, error, info};
use wdm_types::{BigInt, DataVersion, PropertyValue};

/// Owner that keeps a reference table of live stores.
pub(crate) trait SinkRegistry: Send + Sync {
    fn remove_data_sink_ref(&self, handle: SinkHandle);
}

/// A type that can be read from a property path.
///
/// `Default::default()` is what a lenient store returns when it has no
/// usable handle.
pub trait PropertyType: Sized + Default {
    fn read(backend: &dyn DataSinkBackend, handle: SinkHandle, path: &str) -> SinkResult<Self>;
}

impl PropertyType for i64 {
    fn read(backend: &dyn DataSinkBackend, handle: SinkHandle, path: &str) -> SinkResult<Self> {
        backend.get_int(handle, path)
    }
}

impl PropertyType for i32 {
    fn read(backend: &dyn DataSinkBackend, handle: SinkHandle, path: &str) -> SinkResult<Self> {
        backend.get_int(handle, path).map(|v| v as i32)
    }
}

impl PropertyType for u64 {
    fn read(backend: &dyn DataSinkBackend, handle: SinkHandle, path: &str) -> SinkResult<Self> {
        backend.get_int(handle, path).map(|v| v as u64)
    }
}

impl PropertyType for u32 {
    fn read(backend: &dyn DataSinkBackend, handle: SinkHandle, path: &str) -> SinkResult<Self> {
        backend.get_int(handle, path).map(|v| v as u32)
    }
}

impl PropertyType for BigInt {
    fn read(backend: &dyn DataSinkBackend, handle: SinkHandle, path: &str) -> SinkResult<Self> {
        backend.get_int(handle, path).map(BigInt::from)
    }
}

impl PropertyType for f64 {
    fn read(backend: &dyn DataSinkBackend, handle: SinkHandle, path: &str) -> SinkResult<Self> {
        backend.get_double(handle, path)
    }
}

impl PropertyType for bool {
    fn read(backend: &dyn DataSinkBackend, handle: SinkHandle, path: &str) -> SinkResult<Self> {
        backend.get_bool(handle, path)
    }
}

impl PropertyType for Option<String> {
    fn read(backend: &dyn DataSinkBackend, handle: SinkHandle, path: &str) -> SinkResult<Self> {
        backend.get_string(handle, path)
    }
}

impl PropertyType for Option<Vec<u8>> {
    fn read(backend: &dyn DataSinkBackend, handle: SinkHandle, path: &str) -> SinkResult<Self> {
        backend.get_bytes(handle, path)
    }
}

/// Typed key/value view of one trait instance, keyed by property path.
pub struct PropertyPathStore {
    backend: Option<Arc<dyn DataSinkBackend>>,
    handle: Option<SinkHandle>,
    owner: Option<Weak<dyn SinkRegistry>>,
    completion: Arc<CompletionSlot>,
    config: StoreConfig,
}

impl PropertyPathStore {
    /// Binds a store to an existing backend instance and initializes it.
    pub fn new(
        backend: Arc<dyn DataSinkBackend>,
        handle: SinkHandle,
        config: StoreConfig,
    ) -> SinkResult<Self> {
        Self::attach(backend, handle, config, None)
    }

    pub(crate) fn attach(
        backend: Arc<dyn DataSinkBackend>,
        handle: SinkHandle,
        config: StoreConfig,
        owner: Option<Weak<dyn SinkRegistry>>,
    ) -> SinkResult<Self> {
        backend.init(handle)?;
        debug!(%handle, "data sink bound to backend");
        Ok(Self {
            backend: Some(backend),
            handle: Some(handle),
            owner,
            completion: Arc::new(CompletionSlot::new()),
            config,
        })
    }

    pub(crate) fn completion_slot(&self) -> &Arc<CompletionSlot> {
        &self.completion
    }

    /// The backend handle, or `None` once shut down.
    pub fn handle(&self) -> Option<SinkHandle> {
        self.handle
    }

    pub fn is_shut_down(&self) -> bool {
        self.handle.is_none()
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    // ── Writes ───────────────────────────────────────────────────

    /// Writes `value` at `path`, unconditionally.
    pub fn set(&self, path: &str, value: impl Into<PropertyValue>) -> SinkResult<()> {
        self.write(path, value, false)
    }

    /// Writes `value` at `path`, applied only if the backend's update
    /// precondition still holds when the write is pushed.
    pub fn set_conditional(&self, path: &str, value: impl Into<PropertyValue>) -> SinkResult<()> {
        self.write(path, value, true)
    }

    /// Writes an arbitrary-precision integer as signed, truncated to 64 bits.
    pub fn set_signed_big(&self, path: &str, value: &BigInt) -> SinkResult<()> {
        self.write(path, PropertyValue::signed_from_big(value), false)
    }

    /// Writes an arbitrary-precision integer as unsigned, truncated to 64 bits.
    pub fn set_unsigned_big(&self, path: &str, value: &BigInt) -> SinkResult<()> {
        self.write(path, PropertyValue::unsigned_from_big(value), false)
    }

    pub fn set_null(&self, path: &str) -> SinkResult<()> {
        self.write(path, PropertyValue::Null, false)
    }

    /// Forwards a write to the backend and returns without waiting for it
    /// to be acknowledged.
    pub fn write(
        &self,
        path: &str,
        value: impl Into<PropertyValue>,
        conditional: bool,
    ) -> SinkResult<()> {
        let value = value.into();
        let result = self.live().and_then(|(backend, handle)| {
            debug!(%handle, path, kind = %value.kind(), conditional, "set property");
            match &value {
                PropertyValue::Signed(v) => backend.set_int(handle, path, *v, conditional, true),
                PropertyValue::Unsigned(v) => {
                    backend.set_int(handle, path, *v as i64, conditional, false)
                }
                PropertyValue::Double(v) => backend.set_double(handle, path, *v, conditional),
                PropertyValue::Bool(v) => backend.set_bool(handle, path, *v, conditional),
                PropertyValue::String(v) => backend.set_string(handle, path, v, conditional),
                PropertyValue::Bytes(v) => backend.set_bytes(handle, path, v, conditional),
                PropertyValue::Null => backend.set_null(handle, path, conditional),
            }
        });
        self.settle("set", result, || ())
    }

    // ── Reads ────────────────────────────────────────────────────

    /// Reads the property at `path` as `T`.
    pub fn get<T: PropertyType>(&self, path: &str) -> SinkResult<T> {
        let result = self
            .live()
            .and_then(|(backend, handle)| T::read(backend, handle, path));
        self.settle("get", result, T::default)
    }

    pub fn get_signed(&self, path: &str) -> SinkResult<i64> {
        self.get(path)
    }

    /// Reads an integer property, reinterpreting its 64 bits as unsigned.
    pub fn get_unsigned(&self, path: &str) -> SinkResult<u64> {
        self.get(path)
    }

    pub fn get_big_int(&self, path: &str) -> SinkResult<BigInt> {
        self.get(path)
    }

    pub fn get_double(&self, path: &str) -> SinkResult<f64> {
        self.get(path)
    }

    pub fn get_bool(&self, path: &str) -> SinkResult<bool> {
        self.get(path)
    }

    pub fn get_string(&self, path: &str) -> SinkResult<Option<String>> {
        self.get(path)
    }

    pub fn get_bytes(&self, path: &str) -> SinkResult<Option<Vec<u8>>> {
        self.get(path)
    }

    /// The backend's current data version for this instance.
    pub fn version(&self) -> SinkResult<DataVersion> {
        let result = self
            .live()
            .and_then(|(backend, handle)| backend.get_version(handle));
        self.settle("version", result, DataVersion::default)
    }

    // ── Refresh & lifecycle ──────────────────────────────────────

    /// Asks the backend to re-synchronize this instance.
    ///
    /// Returns immediately. Exactly one of `on_refresh_data_complete` or
    /// `on_error` is later called on the handler registered when the
    /// backend delivers, possibly from another thread.
    pub fn begin_refresh_data(&self) -> SinkResult<()> {
        let result = self.live().and_then(|(backend, handle)| {
            debug!(%handle, "begin refresh");
            let notifier = CompletionNotifier::for_slot(Arc::clone(&self.completion));
            backend.begin_refresh(handle, notifier)
        });
        self.settle("begin_refresh_data", result, || ())
    }

    /// Refreshes this instance and waits for the outcome.
    ///
    /// The outcome goes to this call only, not to the registered handler.
    pub async fn refresh(&self) -> SinkResult<()> {
        let started = self.live().and_then(|(backend, handle)| {
            debug!(%handle, "refresh");
            let (notifier, rx) = CompletionNotifier::waiter();
            backend.begin_refresh(handle, notifier).map(|()| Some(rx))
        });
        let Some(rx) = self.settle("refresh", started, || None)? else {
            return Ok(());
        };
        rx.await.unwrap_or_else(|_| {
            Err(SinkError::Backend(
                "refresh abandoned before completion".to_string(),
            ))
        })
    }

    /// Discards modifications staged in the backend for this instance.
    pub fn clear(&self) -> SinkResult<()> {
        let result = self.live().and_then(|(backend, handle)| {
            debug!(%handle, "clear staged changes");
            backend.clear(handle)
        });
        self.settle("clear", result, || ())
    }

    /// Registers `handler`, replacing and returning any previous one.
    ///
    /// A refresh already in flight reports to the new handler.
    pub fn set_completion_handler(
        &self,
        handler: Option<Arc<dyn CompletionHandler>>,
    ) -> Option<Arc<dyn CompletionHandler>> {
        self.completion.replace(handler)
    }

    pub fn completion_handler(&self) -> Option<Arc<dyn CompletionHandler>> {
        self.completion.current()
    }

    /// Releases the backend handle and detaches from the owning client.
    ///
    /// Idempotent. A handler call already running on another thread is
    /// waited for; a refresh still pending is never delivered afterwards.
    pub fn shutdown(&mut self) {
        if let Some(owner) = self.owner.take().and_then(|w| w.upgrade()) {
            if let Some(handle) = self.handle {
                owner.remove_data_sink_ref(handle);
            }
        }

        if let (Some(backend), Some(handle)) = (self.backend.take(), self.handle.take()) {
            if let Err(e) = backend.shutdown(handle) {
                debug!(%handle, error = %e, "backend had already released handle");
            }
            info!(%handle, "data sink shut down");
        }

        self.completion.close();
    }

    // ── Internals ────────────────────────────────────────────────

    fn live(&self) -> SinkResult<(&dyn DataSinkBackend, SinkHandle)> {
        match (&self.backend, self.handle) {
            (Some(backend), Some(handle)) => Ok((backend.as_ref(), handle)),
            _ => Err(SinkError::NoBackend),
        }
    }

    /// Applies the invalid-handle policy to an operation's result.
    fn settle<T>(
        &self,
        op: &'static str,
        result: SinkResult<T>,
        fallback: impl FnOnce() -> T,
    ) -> SinkResult<T> {
        match result {
            Err(e) if e.is_invalid_handle() => {
                error!(op, error = %e, "data sink has no usable backend handle");
                match self.config.invalid_handle {
                    InvalidHandlePolicy::Strict => Err(e),
                    InvalidHandlePolicy::Lenient => Ok(fallback()),
                }
            }
            other => other,
        }
    }
}

impl Drop for PropertyPathStore {
    fn drop(&mut self) {
        if let Some(handle) = self.handle {
            debug!(%handle, "data sink dropped without shutdown, releasing");
            if let Some(backend) = &self.backend {
                let _ = backend.clear(handle);
            }
            self.shutdown();
        }
    }
}

impl fmt::Debug for PropertyPathStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyPathStore")
            .field("handle", &self.handle)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
