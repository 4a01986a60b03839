//! WDM client: creates data sinks and owns their reference table.

use crate::backend::{ClientBackend, DataSinkBackend};
use crate::completion::{CompletionNotifier, CompletionSlot};
use crate::config::ClientConfig;
use crate::error::{SinkError, SinkResult};
use crate::handle::SinkHandle;
use crate::store::{PropertyPathStore, SinkRegistry};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use wdm_types::TraitDescriptor;

struct ClientShared<B> {
    backend: Arc<B>,
    config: ClientConfig,
    /// Live stores by handle. Only the completion slot is kept, so the
    /// client can silence a store without owning it.
    sinks: Mutex<HashMap<SinkHandle, Weak<CompletionSlot>>>,
    closed: AtomicBool,
}

impl<B: ClientBackend> SinkRegistry for ClientShared<B> {
    fn remove_data_sink_ref(&self, handle: SinkHandle) {
        let removed = self
            .sinks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&handle)
            .is_some();
        debug!(client = %self.config.name, %handle, removed, "data sink reference removed");
    }
}

/// Creates [`PropertyPathStore`]s on a backend and tracks them until they
/// shut down or the client closes.
pub struct WdmClient<B: ClientBackend + 'static> {
    shared: Arc<ClientShared<B>>,
}

impl<B: ClientBackend + 'static> WdmClient<B> {
    /// Creates a client over `backend`.
    pub fn new(backend: Arc<B>, config: ClientConfig) -> Self {
        info!(client = %config.name, "client created");
        Self {
            shared: Arc::new(ClientShared {
                backend,
                config,
                sinks: Mutex::new(HashMap::new()),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Creates a client with the default configuration.
    pub fn with_defaults(backend: Arc<B>) -> Self {
        Self::new(backend, ClientConfig::default())
    }

    pub fn name(&self) -> &str {
        &self.shared.config.name
    }

    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.shared.backend
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Number of stores that have not shut down yet.
    pub fn sink_count(&self) -> usize {
        self.sinks().len()
    }

    /// Creates a trait instance described by `descriptor` and returns a
    /// store bound to it.
    pub fn new_data_sink(&self, descriptor: TraitDescriptor) -> SinkResult<PropertyPathStore> {
        self.ensure_open()?;
        let backend = &self.shared.backend;
        let handle = backend.new_trait_instance(&descriptor)?;

        let registry: Arc<dyn SinkRegistry> = self.shared.clone();
        let sink_backend: Arc<dyn DataSinkBackend> = backend.clone();
        let mut store = match PropertyPathStore::attach(
            sink_backend,
            handle,
            self.shared.config.store.clone(),
            Some(Arc::downgrade(&registry)),
        ) {
            Ok(store) => store,
            Err(e) => {
                warn!(client = %self.name(), %handle, error = %e, "data sink init failed");
                if let Err(cleanup) = backend.shutdown(handle) {
                    debug!(client = %self.name(), %handle, error = %cleanup, "handle already released");
                }
                return Err(e);
            }
        };

        {
            // `close` flags the client before draining, so checking under
            // the lock keeps a closing client from gaining an entry.
            let mut sinks = self.sinks();
            if self.is_closed() {
                drop(sinks);
                debug!(client = %self.name(), %handle, "client closed during data sink creation");
                store.shutdown();
                return Err(SinkError::ClientClosed);
            }
            sinks.insert(handle, Arc::downgrade(store.completion_slot()));
        }
        info!(client = %self.name(), %handle, trait_instance = %descriptor, "data sink created");
        Ok(store)
    }

    /// Pushes every staged write of every data sink to the remote peer and
    /// waits for the outcome.
    pub async fn flush_update(&self) -> SinkResult<()> {
        self.ensure_open()?;
        let (notifier, rx) = CompletionNotifier::waiter();
        self.shared.backend.begin_flush_update(notifier)?;
        let outcome = Self::wait(rx, "flush update").await;
        match &outcome {
            Ok(()) => info!(client = %self.name(), "flush update complete"),
            Err(e) => warn!(client = %self.name(), error = %e, "flush update failed"),
        }
        outcome
    }

    /// Refreshes every data sink and waits for the outcome.
    pub async fn refresh_data(&self) -> SinkResult<()> {
        self.ensure_open()?;
        let (notifier, rx) = CompletionNotifier::waiter();
        self.shared.backend.begin_refresh_all(notifier)?;
        let outcome = Self::wait(rx, "refresh").await;
        match &outcome {
            Ok(()) => info!(client = %self.name(), "refresh complete"),
            Err(e) => warn!(client = %self.name(), error = %e, "refresh failed"),
        }
        outcome
    }

    /// Shuts down every tracked data sink and closes the backend.
    ///
    /// Idempotent. Stores still held by callers report an invalid handle
    /// from then on, and their pending refreshes are not delivered.
    pub fn close(&self) {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let sinks: Vec<_> = self.sinks().drain().collect();
        for (handle, slot) in sinks {
            if let Some(slot) = slot.upgrade() {
                slot.close();
            }
            if let Err(e) = self.shared.backend.shutdown(handle) {
                debug!(client = %self.name(), %handle, error = %e, "handle already released");
            }
        }

        if let Err(e) = self.shared.backend.close() {
            warn!(client = %self.name(), error = %e, "backend close failed");
        }
        info!(client = %self.name(), "client closed");
    }

    fn ensure_open(&self) -> SinkResult<()> {
        if self.is_closed() {
            return Err(SinkError::ClientClosed);
        }
        Ok(())
    }

    fn sinks(&self) -> std::sync::MutexGuard<'_, HashMap<SinkHandle, Weak<CompletionSlot>>> {
        self.shared
            .sinks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    async fn wait(rx: oneshot::Receiver<SinkResult<()>>, what: &str) -> SinkResult<()> {
        rx.await
            .unwrap_or_else(|_| Err(SinkError::Backend(format!("{what} abandoned by backend"))))
    }
}

impl<B: ClientBackend + 'static> Drop for WdmClient<B> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<B: ClientBackend + 'static> std::fmt::Debug for WdmClient<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WdmClient")
            .field("name", &self.name())
            .field("closed", &self.is_closed())
            .field("sinks", &self.sink_count())
            .finish()
    }
}
