//! In-memory backend.
//!
//! Keeps every trait instance in a [`HandleTable`] and simulates the remote
//! peer with a per-instance snapshot. Useful as a loopback backend and for
//! driving refresh and flush outcomes deterministically in tests.
//!
//! Model per instance:
//! - `remote` is the peer's authoritative data with its own version
//! - `committed` is the last data fetched by a refresh (or pushed by a flush)
//! - `staged` holds local writes not yet flushed; reads see them first
//!
//! A conditional write remembers the version it was staged against and is
//! rejected at flush time if the remote version has moved on.

use crate::backend::{ClientBackend, DataSinkBackend};
use crate::completion::CompletionNotifier;
use crate::error::{SinkError, SinkResult};
use crate::handle::{HandleTable, SinkHandle};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};
use wdm_types::{DataVersion, PropertyValue, TraitDescriptor, ValueKind};

/// Settings for [`MemoryBackend`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryBackendConfig {
    /// Deliver every refresh from a background thread as soon as it starts,
    /// instead of waiting for [`MemoryBackend::deliver_refresh`].
    pub auto_complete: bool,
}

#[derive(Debug, Clone, PartialEq)]
enum Stored {
    Int { bits: i64, signed: bool },
    Double(f64),
    Bool(bool),
    String(String),
    Bytes(Vec<u8>),
    Null,
}

impl Stored {
    fn kind(&self) -> ValueKind {
        match self {
            Self::Int { signed: true, .. } => ValueKind::Signed,
            Self::Int { signed: false, .. } => ValueKind::Unsigned,
            Self::Double(_) => ValueKind::Double,
            Self::Bool(_) => ValueKind::Bool,
            Self::String(_) => ValueKind::String,
            Self::Bytes(_) => ValueKind::Bytes,
            Self::Null => ValueKind::Null,
        }
    }

    fn to_value(&self) -> PropertyValue {
        match self {
            Self::Int { bits, signed: true } => PropertyValue::Signed(*bits),
            Self::Int { bits, signed: false } => PropertyValue::Unsigned(*bits as u64),
            Self::Double(v) => PropertyValue::Double(*v),
            Self::Bool(v) => PropertyValue::Bool(*v),
            Self::String(v) => PropertyValue::String(v.clone()),
            Self::Bytes(v) => PropertyValue::Bytes(v.clone()),
            Self::Null => PropertyValue::Null,
        }
    }
}

impl From<PropertyValue> for Stored {
    fn from(value: PropertyValue) -> Self {
        match value {
            PropertyValue::Signed(v) => Self::Int {
                bits: v,
                signed: true,
            },
            PropertyValue::Unsigned(v) => Self::Int {
                bits: v as i64,
                signed: false,
            },
            PropertyValue::Double(v) => Self::Double(v),
            PropertyValue::Bool(v) => Self::Bool(v),
            PropertyValue::String(v) => Self::String(v),
            PropertyValue::Bytes(v) => Self::Bytes(v),
            PropertyValue::Null => Self::Null,
        }
    }
}

#[derive(Debug)]
struct StagedWrite {
    value: Stored,
    conditional: bool,
    staged_at: DataVersion,
}

#[derive(Debug)]
struct TraitState {
    descriptor: TraitDescriptor,
    initialized: bool,
    committed: HashMap<String, Stored>,
    staged: BTreeMap<String, StagedWrite>,
    remote: HashMap<String, Stored>,
    remote_version: DataVersion,
    version: DataVersion,
    pending_refresh: Vec<CompletionNotifier>,
}

impl TraitState {
    fn new(descriptor: TraitDescriptor) -> Self {
        Self {
            descriptor,
            initialized: false,
            committed: HashMap::new(),
            staged: BTreeMap::new(),
            remote: HashMap::new(),
            remote_version: DataVersion::ZERO,
            version: DataVersion::ZERO,
            pending_refresh: Vec::new(),
        }
    }

    fn lookup(&self, path: &str) -> SinkResult<&Stored> {
        self.staged
            .get(path)
            .map(|w| &w.value)
            .or_else(|| self.committed.get(path))
            .ok_or_else(|| SinkError::PathNotFound(path.to_string()))
    }

    fn stage(&mut self, path: &str, value: Stored, conditional: bool) -> SinkResult<()> {
        if path.is_empty() {
            return Err(SinkError::InvalidPath(path.to_string()));
        }
        let staged_at = self.version;
        self.staged.insert(
            path.to_string(),
            StagedWrite {
                value,
                conditional,
                staged_at,
            },
        );
        Ok(())
    }

    /// Copies the remote snapshot into committed state.
    fn pull(&mut self) {
        self.committed = self.remote.clone();
        self.version = self.remote_version;
    }

    /// Pushes staged writes to the remote snapshot. Returns the first
    /// rejected conditional write, if any; the others are still applied.
    fn push(&mut self) -> Option<SinkError> {
        let mut rejected = None;
        let mut applied = 0usize;
        for (path, write) in std::mem::take(&mut self.staged) {
            if write.conditional && write.staged_at != self.remote_version {
                debug!(path = %path, staged = %write.staged_at, current = %self.remote_version,
                    "conditional write rejected");
                rejected.get_or_insert(SinkError::ConditionalUpdateRejected {
                    path,
                    staged: write.staged_at,
                    current: self.remote_version,
                });
                continue;
            }
            self.remote.insert(path.clone(), write.value.clone());
            self.committed.insert(path, write.value);
            applied += 1;
        }
        if applied > 0 {
            self.remote_version = self.remote_version.next();
            self.version = self.remote_version;
        }
        rejected
    }
}

struct MemoryInner {
    config: MemoryBackendConfig,
    instances: Mutex<HandleTable<TraitState>>,
    closed: AtomicBool,
}

impl MemoryInner {
    fn instances(&self) -> MutexGuard<'_, HandleTable<TraitState>> {
        self.instances.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_instance<T>(
        &self,
        handle: SinkHandle,
        f: impl FnOnce(&mut TraitState) -> SinkResult<T>,
    ) -> SinkResult<T> {
        let mut instances = self.instances();
        let state = instances
            .get_mut(handle)
            .ok_or(SinkError::InvalidHandle(handle))?;
        f(state)
    }

    fn take_pending(&self, handle: SinkHandle, pull: bool) -> SinkResult<Vec<CompletionNotifier>> {
        self.with_instance(handle, |state| {
            if pull {
                state.pull();
            }
            Ok(std::mem::take(&mut state.pending_refresh))
        })
    }
}

/// Backend that keeps all trait data in process memory.
#[derive(Clone)]
pub struct MemoryBackend {
    inner: Arc<MemoryInner>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::with_config(MemoryBackendConfig::default())
    }

    pub fn with_config(config: MemoryBackendConfig) -> Self {
        Self {
            inner: Arc::new(MemoryInner {
                config,
                instances: Mutex::new(HandleTable::new()),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &MemoryBackendConfig {
        &self.inner.config
    }

    /// Number of live trait instances.
    pub fn instance_count(&self) -> usize {
        self.inner.instances().len()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    pub fn descriptor(&self, handle: SinkHandle) -> SinkResult<TraitDescriptor> {
        self.inner
            .with_instance(handle, |state| Ok(state.descriptor.clone()))
    }

    pub fn is_initialized(&self, handle: SinkHandle) -> SinkResult<bool> {
        self.inner.with_instance(handle, |state| Ok(state.initialized))
    }

    /// Number of writes staged and not yet flushed.
    pub fn staged_count(&self, handle: SinkHandle) -> SinkResult<usize> {
        self.inner.with_instance(handle, |state| Ok(state.staged.len()))
    }

    /// Number of refreshes waiting for delivery.
    pub fn pending_refreshes(&self, handle: SinkHandle) -> SinkResult<usize> {
        self.inner
            .with_instance(handle, |state| Ok(state.pending_refresh.len()))
    }

    /// Changes the simulated peer's data. Local state sees it after the
    /// next refresh.
    pub fn set_remote(
        &self,
        handle: SinkHandle,
        path: &str,
        value: impl Into<PropertyValue>,
    ) -> SinkResult<()> {
        let value = Stored::from(value.into());
        self.inner.with_instance(handle, |state| {
            state.remote.insert(path.to_string(), value);
            state.remote_version = state.remote_version.next();
            Ok(())
        })
    }

    /// Reads the simulated peer's value at `path`.
    pub fn remote_value(&self, handle: SinkHandle, path: &str) -> SinkResult<Option<PropertyValue>> {
        self.inner
            .with_instance(handle, |state| Ok(state.remote.get(path).map(Stored::to_value)))
    }

    pub fn remote_version(&self, handle: SinkHandle) -> SinkResult<DataVersion> {
        self.inner
            .with_instance(handle, |state| Ok(state.remote_version))
    }

    /// Completes every pending refresh of `handle` successfully.
    ///
    /// Pulls the remote snapshot first, then notifies outside the lock.
    /// Returns how many refreshes were delivered.
    pub fn deliver_refresh(&self, handle: SinkHandle) -> SinkResult<usize> {
        let pending = self.inner.take_pending(handle, true)?;
        let delivered = pending.len();
        debug!(%handle, delivered, "delivering refresh completion");
        for notifier in pending {
            notifier.complete();
        }
        Ok(delivered)
    }

    /// Fails every pending refresh of `handle` with `error`.
    pub fn fail_refresh(&self, handle: SinkHandle, error: SinkError) -> SinkResult<usize> {
        let pending = self.inner.take_pending(handle, false)?;
        let delivered = pending.len();
        debug!(%handle, delivered, error = %error, "failing refresh");
        for notifier in pending {
            notifier.fail(error.clone());
        }
        Ok(delivered)
    }

    fn stage(
        &self,
        handle: SinkHandle,
        path: &str,
        value: Stored,
        conditional: bool,
    ) -> SinkResult<()> {
        self.inner
            .with_instance(handle, |state| state.stage(path, value, conditional))
    }

    fn read<T>(
        &self,
        handle: SinkHandle,
        path: &str,
        expected: ValueKind,
        extract: impl FnOnce(&Stored) -> Option<T>,
    ) -> SinkResult<T> {
        self.inner.with_instance(handle, |state| {
            let stored = state.lookup(path)?;
            extract(stored).ok_or_else(|| SinkError::TypeMismatch {
                path: path.to_string(),
                expected,
                found: stored.kind(),
            })
        })
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBackend")
            .field("config", &self.inner.config)
            .field("instances", &self.instance_count())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl DataSinkBackend for MemoryBackend {
    fn init(&self, handle: SinkHandle) -> SinkResult<()> {
        self.inner.with_instance(handle, |state| {
            state.initialized = true;
            Ok(())
        })
    }

    fn shutdown(&self, handle: SinkHandle) -> SinkResult<()> {
        let state = self
            .inner
            .instances()
            .remove(handle)
            .ok_or(SinkError::InvalidHandle(handle))?;
        debug!(%handle, dropped_refreshes = state.pending_refresh.len(), "trait instance released");
        Ok(())
    }

    fn clear(&self, handle: SinkHandle) -> SinkResult<()> {
        self.inner.with_instance(handle, |state| {
            state.staged.clear();
            Ok(())
        })
    }

    fn begin_refresh(&self, handle: SinkHandle, notifier: CompletionNotifier) -> SinkResult<()> {
        self.inner.with_instance(handle, |state| {
            state.pending_refresh.push(notifier);
            Ok(())
        })?;

        if self.inner.config.auto_complete {
            let backend = self.clone();
            std::thread::spawn(move || {
                if let Err(e) = backend.deliver_refresh(handle) {
                    debug!(%handle, error = %e, "auto refresh not delivered");
                }
            });
        }
        Ok(())
    }

    fn set_int(
        &self,
        handle: SinkHandle,
        path: &str,
        value: i64,
        conditional: bool,
        signed: bool,
    ) -> SinkResult<()> {
        self.stage(handle, path, Stored::Int { bits: value, signed }, conditional)
    }

    fn set_double(
        &self,
        handle: SinkHandle,
        path: &str,
        value: f64,
        conditional: bool,
    ) -> SinkResult<()> {
        self.stage(handle, path, Stored::Double(value), conditional)
    }

    fn set_bool(
        &self,
        handle: SinkHandle,
        path: &str,
        value: bool,
        conditional: bool,
    ) -> SinkResult<()> {
        self.stage(handle, path, Stored::Bool(value), conditional)
    }

    fn set_string(
        &self,
        handle: SinkHandle,
        path: &str,
        value: &str,
        conditional: bool,
    ) -> SinkResult<()> {
        self.stage(handle, path, Stored::String(value.to_string()), conditional)
    }

    fn set_bytes(
        &self,
        handle: SinkHandle,
        path: &str,
        value: &[u8],
        conditional: bool,
    ) -> SinkResult<()> {
        self.stage(handle, path, Stored::Bytes(value.to_vec()), conditional)
    }

    fn set_null(&self, handle: SinkHandle, path: &str, conditional: bool) -> SinkResult<()> {
        self.stage(handle, path, Stored::Null, conditional)
    }

    fn get_int(&self, handle: SinkHandle, path: &str) -> SinkResult<i64> {
        self.read(handle, path, ValueKind::Signed, |stored| match stored {
            Stored::Int { bits, .. } => Some(*bits),
            _ => None,
        })
    }

    fn get_double(&self, handle: SinkHandle, path: &str) -> SinkResult<f64> {
        self.read(handle, path, ValueKind::Double, |stored| match stored {
            Stored::Double(v) => Some(*v),
            _ => None,
        })
    }

    fn get_bool(&self, handle: SinkHandle, path: &str) -> SinkResult<bool> {
        self.read(handle, path, ValueKind::Bool, |stored| match stored {
            Stored::Bool(v) => Some(*v),
            _ => None,
        })
    }

    fn get_string(&self, handle: SinkHandle, path: &str) -> SinkResult<Option<String>> {
        self.read(handle, path, ValueKind::String, |stored| match stored {
            Stored::String(v) => Some(Some(v.clone())),
            Stored::Null => Some(None),
            _ => None,
        })
    }

    fn get_bytes(&self, handle: SinkHandle, path: &str) -> SinkResult<Option<Vec<u8>>> {
        self.read(handle, path, ValueKind::Bytes, |stored| match stored {
            Stored::Bytes(v) => Some(Some(v.clone())),
            Stored::Null => Some(None),
            _ => None,
        })
    }

    fn get_version(&self, handle: SinkHandle) -> SinkResult<DataVersion> {
        self.inner.with_instance(handle, |state| Ok(state.version))
    }
}

impl ClientBackend for MemoryBackend {
    fn new_trait_instance(&self, descriptor: &TraitDescriptor) -> SinkResult<SinkHandle> {
        if self.is_closed() {
            return Err(SinkError::ClientClosed);
        }
        let handle = self
            .inner
            .instances()
            .insert(TraitState::new(descriptor.clone()));
        debug!(%handle, trait_instance = %descriptor, "trait instance created");
        Ok(handle)
    }

    fn begin_flush_update(&self, notifier: CompletionNotifier) -> SinkResult<()> {
        if self.is_closed() {
            return Err(SinkError::ClientClosed);
        }
        let rejected = {
            let mut instances = self.inner.instances();
            let mut first = None;
            for (handle, state) in instances.iter_mut() {
                let staged = state.staged.len();
                if let Some(e) = state.push() {
                    warn!(%handle, error = %e, "flush rejected a conditional write");
                    first.get_or_insert(e);
                }
                debug!(%handle, staged, version = %state.version, "instance flushed");
            }
            first
        };
        match rejected {
            Some(e) => notifier.fail(e),
            None => notifier.complete(),
        }
        Ok(())
    }

    fn begin_refresh_all(&self, notifier: CompletionNotifier) -> SinkResult<()> {
        if self.is_closed() {
            return Err(SinkError::ClientClosed);
        }
        {
            let mut instances = self.inner.instances();
            for (_, state) in instances.iter_mut() {
                state.pull();
            }
        }
        notifier.complete();
        Ok(())
    }

    fn close(&self) -> SinkResult<()> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let released = self.inner.instances().drain().len();
        info!(released, "memory backend closed");
        Ok(())
    }
}
