//! Live telemetry plane.
//!
//! The load driver periodically posts a [`StatsReport`],
//! which the [`TelemetryHub`] fans out to all connected observers.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use parking_lot::Mutex;
use rama::telemetry::tracing;
use tokio::sync::mpsc;

mod report;
pub use self::report::StatsReport;


/// Reports an observer can lag behind before it is considered dead.
pub const DEFAULT_OBSERVER_BUFFER: usize = 16;

/// Unique identifier of a registered observer channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(u64);

impl std::fmt::Display for ObserverId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "observer#{}", self.0)
    }
}

/// Registry of live observer channels.
///
/// Cheap to clone, all clones share the same registry.
#[derive(Clone, Default)]
pub struct TelemetryHub {
    inner: Arc<HubInner>,
}

#[derive(Default)]
struct HubInner {
    next_id: AtomicU64,
    observers: Mutex<HashMap<ObserverId, mpsc::Sender<Arc<StatsReport>>>>,
}

impl std::fmt::Debug for TelemetryHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryHub")
            .field("observers", &self.observer_count())
            .finish()
    }
}

impl TelemetryHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a raw channel as observer.
    ///
    /// The channel stays registered until a send to it fails,
    /// [`Self::unregister`] is called or the hub disconnects all observers.
    pub fn register(&self, sender: mpsc::Sender<Arc<StatsReport>>) -> ObserverId {
        let id = ObserverId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.inner.observers.lock().insert(id, sender);
        tracing::debug!(observer.id = %id, "observer registered");
        id
    }

    /// Remove an observer, returns false if it was already gone.
    pub fn unregister(&self, id: ObserverId) -> bool {
        let removed = self.inner.observers.lock().remove(&id).is_some();
        if removed {
            tracing::debug!(observer.id = %id, "observer unregistered");
        }
        removed
    }

    /// Register a new observer with a buffer of the given capacity.
    ///
    /// Dropping the returned [`Observer`] unregisters it.
    pub fn subscribe(&self, buffer: usize) -> Observer {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let id = self.register(tx);
        Observer {
            id,
            rx,
            hub: self.clone(),
        }
    }

    /// Fan the report out to all registered observers.
    ///
    /// Sending never blocks: any observer which cannot take the report
    /// right away (closed or full) is dropped as part of this same pass,
    /// without affecting delivery to the others.
    ///
    /// Returns the amount of observers the report was delivered to.
    pub fn ingest(&self, report: StatsReport) -> usize {
        let report = Arc::new(report);

        let mut delivered = 0;
        let mut observers = self.inner.observers.lock();
        observers.retain(|id, sender| match sender.try_send(report.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(err) => {
                tracing::debug!(observer.id = %id, "drop observer after failed send: {err}");
                false
            }
        });
        let remaining = observers.len();
        drop(observers);

        tracing::trace!(
            observer.delivered = delivered,
            observer.remaining = remaining,
            "stats report fanned out"
        );
        delivered
    }

    /// Drop all observer channels, ending their streams.
    pub fn disconnect_all(&self) -> usize {
        let observers = std::mem::take(&mut *self.inner.observers.lock());
        let count = observers.len();
        if count > 0 {
            tracing::debug!("disconnected {count} observer(s)");
        }
        count
    }

    pub fn observer_count(&self) -> usize {
        self.inner.observers.lock().len()
    }

    #[cfg(test)]
    pub(crate) fn is_registered(&self, id: ObserverId) -> bool {
        self.inner.observers.lock().contains_key(&id)
    }
}

/// An observer subscription, unregistered when dropped.
#[derive(Debug)]
pub struct Observer {
    id: ObserverId,
    rx: mpsc::Receiver<Arc<StatsReport>>,
    hub: TelemetryHub,
}

impl Observer {
    pub fn id(&self) -> ObserverId {
        self.id
    }

    /// Wait for the next report.
    ///
    /// Returns `None` once the hub dropped this observer.
    pub async fn recv(&mut self) -> Option<Arc<StatsReport>> {
        self.rx.recv().await
    }
}

impl Drop for Observer {
    fn drop(&mut self) {
        self.hub.unregister(self.id);
    }
}
