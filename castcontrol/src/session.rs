//! Device Session Manager.
//!
//! Owns the single binding cell. Every mutation of the cell goes through a
//! compare-and-swap so that concurrent discovery producers, the loop's
//! timeout accounting and the shutdown hook agree on exactly one winner.

use std::collections::HashSet;
use std::fmt;
use std::net::SocketAddr;
use std::sync::{Arc, Once};

use arc_swap::ArcSwapOption;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::device::{DeviceCandidate, DeviceConnector, DeviceHandle};
use crate::events::EventSink;

/// Which producer announced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoverySource {
    Mdns,
    Upnp,
    Manual,
}

impl fmt::Display for DiscoverySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscoverySource::Mdns => write!(f, "mDNS"),
            DiscoverySource::Upnp => write!(f, "UPnP"),
            DiscoverySource::Manual => write!(f, "manual"),
        }
    }
}

/// Start/stop switch of a discovery producer.
pub trait DiscoveryControl: Send + Sync {
    fn name(&self) -> &str;
    /// Stops offering candidates.
    fn stop(&self) -> anyhow::Result<()>;
    /// Forgets what was seen and starts offering again.
    fn restart(&self) -> anyhow::Result<()>;
}

type BindListener = Box<dyn Fn(&DeviceHandle) + Send + Sync>;

pub struct SessionManager {
    target: String,
    connector: Arc<dyn DeviceConnector>,
    sink: EventSink,
    binding: ArcSwapOption<DeviceHandle>,
    seen: Mutex<HashSet<SocketAddr>>,
    producers: RwLock<Vec<Arc<dyn DiscoveryControl>>>,
    listeners: RwLock<Vec<BindListener>>,
}

impl SessionManager {
    /// `target` is matched case-insensitively as a substring of device names.
    pub fn new(target: &str, connector: Arc<dyn DeviceConnector>, sink: EventSink) -> Self {
        Self {
            target: target.trim().to_lowercase(),
            connector,
            sink,
            binding: ArcSwapOption::empty(),
            seen: Mutex::new(HashSet::new()),
            producers: RwLock::new(Vec::new()),
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn add_producer(&self, producer: Arc<dyn DiscoveryControl>) {
        self.producers.write().push(producer);
    }

    /// Registers a callback invoked after each successful bind.
    pub fn on_bind<F>(&self, listener: F)
    where
        F: Fn(&DeviceHandle) + Send + Sync + 'static,
    {
        self.listeners.write().push(Box::new(listener));
    }

    pub fn matches(&self, name: &str) -> bool {
        !self.target.is_empty() && name.to_lowercase().contains(&self.target)
    }

    /// Snapshot of the current binding.
    pub fn current(&self) -> Option<Arc<DeviceHandle>> {
        self.binding.load_full()
    }

    pub fn is_bound(&self) -> bool {
        self.binding.load().is_some()
    }

    /// Called by discovery producers for each announced device.
    ///
    /// Returns whether the candidate ended up bound.
    pub fn offer(&self, candidate: DeviceCandidate, source: DiscoverySource) -> bool {
        if !self.matches(&candidate.name) {
            debug!(name = %candidate.name, %source, "Ignoring non matching device");
            return false;
        }
        if self.is_bound() {
            debug!(name = %candidate.name, %source, "Already bound, ignoring candidate");
            return false;
        }
        if !self.seen.lock().insert(candidate.address) {
            debug!(address = %candidate.address, %source, "Candidate already offered");
            return false;
        }

        info!(
            "🔎 Found {} at {} via {} (model: {})",
            candidate.name,
            candidate.address,
            source,
            candidate.model.as_deref().unwrap_or("unknown")
        );
        let handle = Arc::new(DeviceHandle::new(self.connector.open(&candidate)));
        self.bind(handle)
    }

    /// Claims the empty cell for `candidate`. Returns whether this call won.
    pub fn bind(&self, candidate: Arc<DeviceHandle>) -> bool {
        let previous = self
            .binding
            .compare_and_swap(&None::<Arc<DeviceHandle>>, Some(Arc::clone(&candidate)));
        if previous.is_some() {
            debug!(device = %candidate, "Lost bind race");
            return false;
        }

        info!("🔗 Bound to {}", candidate);
        candidate.client().subscribe(self.sink.clone());
        self.stop_discovery();
        for listener in self.listeners.read().iter() {
            listener(&candidate);
        }
        self.sink.wake();
        true
    }

    /// Clears the cell if it still holds `expected`.
    ///
    /// Returns the released handle, or `None` when another caller got there first.
    pub fn unbind(&self, expected: &Arc<DeviceHandle>) -> Option<Arc<DeviceHandle>> {
        let expected_cell = Some(Arc::clone(expected));
        let previous = self
            .binding
            .compare_and_swap(&expected_cell, None::<Arc<DeviceHandle>>);
        match &*previous {
            Some(prev) if Arc::ptr_eq(prev, expected) => {
                info!("Released {}", expected);
                Some(Arc::clone(prev))
            }
            _ => None,
        }
    }

    /// Releases an unresponsive device, then restarts discovery.
    ///
    /// Only the caller that actually released the handle disconnects it and
    /// triggers rediscovery.
    pub fn abandon(&self, expected: &Arc<DeviceHandle>) -> bool {
        match self.unbind(expected) {
            Some(handle) => {
                handle.client().disconnect();
                self.rediscover();
                true
            }
            None => false,
        }
    }

    pub fn rediscover(&self) {
        self.seen.lock().clear();
        for producer in self.producers.read().iter() {
            match producer.restart() {
                Ok(()) => info!("🔄 Restarted {} discovery", producer.name()),
                Err(e) => warn!("Failed to restart {} discovery: {}", producer.name(), e),
            }
        }
    }

    fn stop_discovery(&self) {
        for producer in self.producers.read().iter() {
            if let Err(e) = producer.stop() {
                warn!("Failed to stop {} discovery: {}", producer.name(), e);
            }
        }
    }

    /// Leaves the device tidy: stops our app if it is in the foreground, then disconnects.
    fn tidy(&self, app_id: &str) {
        self.stop_discovery();
        let Some(handle) = self.current() else {
            return;
        };
        let Some(handle) = self.unbind(&handle) else {
            return;
        };

        let client = handle.client();
        if client.is_connected() {
            match client.status() {
                Ok(status) if status.is_running(app_id) => match client.stop_app() {
                    Ok(()) => info!("Stopped app {} on {}", app_id, handle),
                    Err(e) => warn!("Failed to stop app on {}: {}", handle, e),
                },
                Ok(_) => {}
                Err(e) => warn!("Failed to read status of {}: {}", handle, e),
            }
        }
        client.disconnect();
        info!("👋 Disconnected from {}", handle);
    }

    /// Returns a guard running the shutdown tidy exactly once, at the latest on drop.
    pub fn shutdown_guard(self: &Arc<Self>, app_id: &str) -> ShutdownGuard {
        ShutdownGuard {
            session: Arc::clone(self),
            app_id: app_id.to_string(),
            once: Once::new(),
        }
    }
}

pub struct ShutdownGuard {
    session: Arc<SessionManager>,
    app_id: String,
    once: Once,
}

impl ShutdownGuard {
    pub fn tidy(&self) {
        self.once.call_once(|| self.session.tidy(&self.app_id));
    }
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        self.tidy();
    }
}
