//! Shared test helpers for data sink tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use wdm_sink::{
    ClientBackend, ClientConfig, CompletionHandler, CompletionNotifier, DataSinkBackend,
    MemoryBackend, MemoryBackendConfig, PropertyPathStore, SinkError, SinkHandle, SinkResult,
    StoreConfig, WdmClient,
};
use wdm_types::{DataVersion, TraitDescriptor};

/// Profile id of the locale settings trait used throughout the tests.
pub const LOCALE_SETTINGS: u32 = 20;
/// Profile id of the test trait with nested paths.
pub const TEST_C_TRAIT: u32 = 593_165_827;

static TRACING: Once = Once::new();

/// Installs a test subscriber honouring `RUST_LOG`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Handler that counts every outcome it receives.
#[derive(Default)]
pub struct RecordingHandler {
    completions: AtomicUsize,
    errors: Mutex<Vec<SinkError>>,
}

impl RecordingHandler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn completions(&self) -> usize {
        self.completions.load(Ordering::SeqCst)
    }

    pub fn errors(&self) -> Vec<SinkError> {
        self.errors.lock().unwrap().clone()
    }

    pub fn outcomes(&self) -> usize {
        self.completions() + self.errors().len()
    }
}

impl CompletionHandler for RecordingHandler {
    fn on_refresh_data_complete(&self) {
        self.completions.fetch_add(1, Ordering::SeqCst);
    }

    fn on_error(&self, error: SinkError) {
        self.errors.lock().unwrap().push(error);
    }
}

/// Registers `handler` on `store`.
pub fn register(store: &PropertyPathStore, handler: &Arc<RecordingHandler>) {
    let handler: Arc<dyn CompletionHandler> = handler.clone();
    store.set_completion_handler(Some(handler));
}

pub fn make_client() -> (Arc<MemoryBackend>, WdmClient<MemoryBackend>) {
    make_client_with(MemoryBackendConfig::default(), StoreConfig::default())
}

pub fn make_lenient_client() -> (Arc<MemoryBackend>, WdmClient<MemoryBackend>) {
    make_client_with(MemoryBackendConfig::default(), StoreConfig::lenient())
}

pub fn make_client_with(
    backend_config: MemoryBackendConfig,
    store: StoreConfig,
) -> (Arc<MemoryBackend>, WdmClient<MemoryBackend>) {
    init_tracing();
    let backend = Arc::new(MemoryBackend::with_config(backend_config));
    let config = ClientConfig {
        name: "test-client".to_string(),
        store,
    };
    let client = WdmClient::new(backend.clone(), config);
    (backend, client)
}

pub fn locale_sink(client: &WdmClient<MemoryBackend>) -> PropertyPathStore {
    client
        .new_data_sink(TraitDescriptor::new(LOCALE_SETTINGS, 0))
        .unwrap()
}

pub fn test_c_sink(client: &WdmClient<MemoryBackend>) -> PropertyPathStore {
    client
        .new_data_sink(TraitDescriptor::new(TEST_C_TRAIT, 0))
        .unwrap()
}

// ── Hooked backend ──────────────────────────────────────────────

type Hook = Box<dyn FnOnce() + Send>;

/// Delegates to a [`MemoryBackend`], optionally parking refresh notifiers
/// where a test can reach them (even after the instance is released) and
/// running a one-off hook right after the next `init`.
#[derive(Default)]
pub struct HookedBackend {
    pub inner: MemoryBackend,
    park_refreshes: bool,
    parked: Mutex<Vec<CompletionNotifier>>,
    after_init: Mutex<Option<Hook>>,
    init_failure: Mutex<Option<SinkError>>,
}

impl HookedBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn parking() -> Arc<Self> {
        Arc::new(Self {
            park_refreshes: true,
            ..Self::default()
        })
    }

    pub fn take_parked(&self) -> Vec<CompletionNotifier> {
        std::mem::take(&mut *self.parked.lock().unwrap())
    }

    pub fn set_after_init(&self, hook: impl FnOnce() + Send + 'static) {
        *self.after_init.lock().unwrap() = Some(Box::new(hook));
    }

    /// Makes the next `init` lose the instance and fail with `error`.
    pub fn fail_next_init(&self, error: SinkError) {
        *self.init_failure.lock().unwrap() = Some(error);
    }
}

impl DataSinkBackend for HookedBackend {
    fn init(&self, handle: SinkHandle) -> SinkResult<()> {
        let failure = self.init_failure.lock().unwrap().take();
        if let Some(error) = failure {
            self.inner.shutdown(handle)?;
            return Err(error);
        }
        self.inner.init(handle)?;
        let hook = self.after_init.lock().unwrap().take();
        if let Some(hook) = hook {
            hook();
        }
        Ok(())
    }

    fn shutdown(&self, handle: SinkHandle) -> SinkResult<()> {
        self.inner.shutdown(handle)
    }

    fn clear(&self, handle: SinkHandle) -> SinkResult<()> {
        self.inner.clear(handle)
    }

    fn begin_refresh(&self, handle: SinkHandle, notifier: CompletionNotifier) -> SinkResult<()> {
        if self.park_refreshes {
            self.parked.lock().unwrap().push(notifier);
            return Ok(());
        }
        self.inner.begin_refresh(handle, notifier)
    }

    fn set_int(
        &self,
        handle: SinkHandle,
        path: &str,
        value: i64,
        conditional: bool,
        signed: bool,
    ) -> SinkResult<()> {
        self.inner.set_int(handle, path, value, conditional, signed)
    }

    fn set_double(
        &self,
        handle: SinkHandle,
        path: &str,
        value: f64,
        conditional: bool,
    ) -> SinkResult<()> {
        self.inner.set_double(handle, path, value, conditional)
    }

    fn set_bool(
        &self,
        handle: SinkHandle,
        path: &str,
        value: bool,
        conditional: bool,
    ) -> SinkResult<()> {
        self.inner.set_bool(handle, path, value, conditional)
    }

    fn set_string(
        &self,
        handle: SinkHandle,
        path: &str,
        value: &str,
        conditional: bool,
    ) -> SinkResult<()> {
        self.inner.set_string(handle, path, value, conditional)
    }

    fn set_bytes(
        &self,
        handle: SinkHandle,
        path: &str,
        value: &[u8],
        conditional: bool,
    ) -> SinkResult<()> {
        self.inner.set_bytes(handle, path, value, conditional)
    }

    fn set_null(&self, handle: SinkHandle, path: &str, conditional: bool) -> SinkResult<()> {
        self.inner.set_null(handle, path, conditional)
    }

    fn get_int(&self, handle: SinkHandle, path: &str) -> SinkResult<i64> {
        self.inner.get_int(handle, path)
    }

    fn get_double(&self, handle: SinkHandle, path: &str) -> SinkResult<f64> {
        self.inner.get_double(handle, path)
    }

    fn get_bool(&self, handle: SinkHandle, path: &str) -> SinkResult<bool> {
        self.inner.get_bool(handle, path)
    }

    fn get_string(&self, handle: SinkHandle, path: &str) -> SinkResult<Option<String>> {
        self.inner.get_string(handle, path)
    }

    fn get_bytes(&self, handle: SinkHandle, path: &str) -> SinkResult<Option<Vec<u8>>> {
        self.inner.get_bytes(handle, path)
    }

    fn get_version(&self, handle: SinkHandle) -> SinkResult<DataVersion> {
        self.inner.get_version(handle)
    }
}

impl ClientBackend for HookedBackend {
    fn new_trait_instance(&self, descriptor: &TraitDescriptor) -> SinkResult<SinkHandle> {
        self.inner.new_trait_instance(descriptor)
    }

    fn begin_flush_update(&self, notifier: CompletionNotifier) -> SinkResult<()> {
        self.inner.begin_flush_update(notifier)
    }

    fn begin_refresh_all(&self, notifier: CompletionNotifier) -> SinkResult<()> {
        self.inner.begin_refresh_all(notifier)
    }

    fn close(&self) -> SinkResult<()> {
        self.inner.close()
    }
}
