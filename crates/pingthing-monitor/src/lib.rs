//! Debounced host reachability monitor.

mod route;

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard, Weak,
    },
    time::Duration,
};

use async_stream::stream;
use async_trait::async_trait;
use futures::{pin_mut, Stream, StreamExt};
use pingthing_types::{events::AvailabilityChanged, network::NetworkAvailability};
use tokio::{task::JoinHandle, time::interval};
use tracing::{debug, info};

pub use route::RouteProbeSource;

/// Platform facility reporting the current network path.
#[async_trait]
pub trait PathSource: Send + Sync + 'static {
    async fn current_path(&self) -> NetworkAvailability;
}

pub type AvailabilityListener = Arc<dyn Fn(AvailabilityChanged) + Send + Sync>;

struct EdgeState {
    previous: Option<bool>,
    latest: NetworkAvailability,
}

struct MonitorInner {
    active: AtomicBool,
    edge: Mutex<EdgeState>,
    listeners: Mutex<Vec<AvailabilityListener>>,
    started: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Exposes a single "network usable" flag and notifies listeners only when
/// it flips. The first observation sets the baseline without notifying.
#[derive(Clone)]
pub struct NetworkMonitor {
    inner: Arc<MonitorInner>,
    source: Arc<dyn PathSource>,
    poll_interval: Duration,
}

impl NetworkMonitor {
    pub fn new(source: impl PathSource, poll_interval: Duration) -> Self {
        Self {
            inner: Arc::new(MonitorInner {
                active: AtomicBool::new(false),
                edge: Mutex::new(EdgeState {
                    previous: None,
                    latest: NetworkAvailability::default(),
                }),
                listeners: Mutex::new(Vec::new()),
                started: AtomicBool::new(false),
                task: Mutex::new(None),
            }),
            source: Arc::new(source),
            poll_interval,
        }
    }

    /// Takes a baseline reading, then keeps polling on a background task.
    /// Calling it again while running does nothing.
    pub async fn start(&self) {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return;
        }
        let baseline = self.source.current_path().await;
        info!(
            "Network monitor started, network {}",
            if baseline.is_active { "active" } else { "inactive" }
        );
        self.observe(baseline);

        let updates = path_updates(self.source.clone(), self.poll_interval);
        let weak = Arc::downgrade(&self.inner);
        let handle = tokio::spawn(async move {
            pin_mut!(updates);
            while let Some(availability) = updates.next().await {
                let Some(inner) = Weak::upgrade(&weak) else {
                    break;
                };
                observe_on(&inner, availability);
            }
        });
        *lock(&self.inner.task) = Some(handle);
    }

    pub fn stop(&self) {
        if let Some(handle) = lock(&self.inner.task).take() {
            handle.abort();
        }
        self.inner.started.store(false, Ordering::SeqCst);
    }

    /// Listeners run on the observing context and must not call back into the monitor.
    pub fn on_availability_changed<F>(&self, listener: F)
    where
        F: Fn(AvailabilityChanged) + Send + Sync + 'static,
    {
        lock(&self.inner.listeners).push(Arc::new(listener));
    }

    pub fn currently_active(&self) -> bool {
        self.inner.active.load(Ordering::Acquire)
    }

    pub fn availability(&self) -> NetworkAvailability {
        lock(&self.inner.edge).latest
    }

    /// Feeds one raw path update, as delivered by the platform callback.
    pub fn observe(&self, availability: NetworkAvailability) {
        observe_on(&self.inner, availability);
    }
}

fn observe_on(inner: &MonitorInner, availability: NetworkAvailability) {
    let mut edge = lock(&inner.edge);
    edge.latest = availability;
    inner.active.store(availability.is_active, Ordering::Release);

    let previous = edge.previous.replace(availability.is_active);
    match previous {
        Some(prev) if prev != availability.is_active => {}
        _ => return,
    }

    debug!("Network status changed, active: {}", availability.is_active);
    let event = AvailabilityChanged {
        is_active: availability.is_active,
        availability,
    };
    let listeners: Vec<AvailabilityListener> = lock(&inner.listeners).clone();
    for listener in listeners {
        listener(event);
    }
}

fn path_updates(
    source: Arc<dyn PathSource>,
    period: Duration,
) -> impl Stream<Item = NetworkAvailability> {
    stream! {
        let mut ticker = interval(period);
        // the first tick completes immediately; the baseline already covered it
        ticker.tick().await;
        loop {
            ticker.tick().await;
            yield source.current_path().await;
        }
    }
}
