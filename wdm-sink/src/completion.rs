//! Refresh completion delivery.
//!
//! A backend finishing an asynchronous operation holds a
//! [`CompletionNotifier`]. Consuming it with [`CompletionNotifier::complete`]
//! or [`CompletionNotifier::fail`] delivers exactly one outcome, either to
//! the store's registered [`CompletionHandler`] or to a one-shot waiter.

use crate::error::{SinkError, SinkResult};
use std::cell::Cell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;
use tracing::{debug, error};

/// Receives the outcome of a data sink refresh.
///
/// Called from whatever thread the backend completes on.
pub trait CompletionHandler: Send + Sync {
    /// The refresh finished and the sink holds fresh data.
    fn on_refresh_data_complete(&self);

    /// The refresh failed.
    fn on_error(&self, error: SinkError);
}

thread_local! {
    /// Nesting depth of handler calls on this thread.
    static DELIVERING: Cell<usize> = const { Cell::new(0) };
}

/// Marks the current thread as inside a handler until dropped.
struct DeliveryScope;

impl DeliveryScope {
    fn enter() -> Self {
        DELIVERING.with(|depth| depth.set(depth.get() + 1));
        Self
    }

    fn active() -> bool {
        DELIVERING.with(|depth| depth.get() > 0)
    }
}

impl Drop for DeliveryScope {
    fn drop(&mut self) {
        DELIVERING.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

/// Single-slot handler registration shared between a store and the
/// notifiers it hands out.
///
/// Delivery and [`close`](Self::close) serialize on `delivery`, so once
/// `close` returns no handler call through this slot is running or will
/// start. A handler that closes a slot from inside its own callback skips
/// the wait instead of deadlocking.
#[derive(Default)]
pub(crate) struct CompletionSlot {
    handler: Mutex<Option<Arc<dyn CompletionHandler>>>,
    delivery: Mutex<()>,
    closed: AtomicBool,
}

impl CompletionSlot {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Replaces the handler, returning the previous one.
    pub(crate) fn replace(
        &self,
        handler: Option<Arc<dyn CompletionHandler>>,
    ) -> Option<Arc<dyn CompletionHandler>> {
        let mut slot = self.handler.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *slot, handler)
    }

    pub(crate) fn current(&self) -> Option<Arc<dyn CompletionHandler>> {
        self.handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Stops all further deliveries through this slot, waiting for one in
    /// progress on another thread to finish.
    pub(crate) fn close(&self) {
        let _delivery = self.delivery_guard();
        self.closed.store(true, Ordering::SeqCst);
        self.replace(None);
    }

    fn delivery_guard(&self) -> Option<MutexGuard<'_, ()>> {
        if DeliveryScope::active() {
            return None;
        }
        Some(self.delivery.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

enum Target {
    Slot(Arc<CompletionSlot>),
    Waiter(oneshot::Sender<SinkResult<()>>),
}

/// One-shot token a backend uses to report the end of an asynchronous
/// operation.
///
/// Dropping a notifier without consuming it delivers nothing.
pub struct CompletionNotifier {
    target: Option<Target>,
}

impl CompletionNotifier {
    pub(crate) fn for_slot(slot: Arc<CompletionSlot>) -> Self {
        Self {
            target: Some(Target::Slot(slot)),
        }
    }

    /// Creates a notifier whose outcome is received by the returned channel.
    pub fn waiter() -> (Self, oneshot::Receiver<SinkResult<()>>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                target: Some(Target::Waiter(tx)),
            },
            rx,
        )
    }

    /// Reports success.
    pub fn complete(mut self) {
        self.deliver(Ok(()));
    }

    /// Reports failure with `error`.
    pub fn fail(mut self, error: SinkError) {
        self.deliver(Err(error));
    }

    fn deliver(&mut self, outcome: SinkResult<()>) {
        match self.target.take() {
            Some(Target::Slot(slot)) => deliver_to_slot(&slot, outcome),
            Some(Target::Waiter(tx)) => {
                if tx.send(outcome).is_err() {
                    debug!("completion waiter went away before delivery");
                }
            }
            None => {}
        }
    }
}

/// Hands the outcome to whichever handler is registered right now.
fn deliver_to_slot(slot: &CompletionSlot, outcome: SinkResult<()>) {
    let _delivery = slot.delivery_guard();
    if slot.is_closed() {
        debug!(?outcome, "data sink shut down, suppressing refresh completion");
        return;
    }
    let Some(handler) = slot.current() else {
        error!(?outcome, "no completion handler registered, dropping refresh outcome");
        return;
    };
    let _scope = DeliveryScope::enter();
    match outcome {
        Ok(()) => handler.on_refresh_data_complete(),
        Err(e) => handler.on_error(e),
    }
}

impl Drop for CompletionNotifier {
    fn drop(&mut self) {
        if self.target.is_some() {
            debug!("completion notifier dropped without an outcome");
        }
    }
}

impl std::fmt::Debug for CompletionNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let target = match &self.target {
            Some(Target::Slot(_)) => "slot",
            Some(Target::Waiter(_)) => "waiter",
            None => "delivered",
        };
        f.debug_struct("CompletionNotifier")
            .field("target", &target)
            .finish()
    }
}
