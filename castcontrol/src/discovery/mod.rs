//! Discovery producers.
//!
//! Each producer runs on its own named thread and offers candidates to the
//! [`SessionManager`](crate::session::SessionManager). The session manager
//! pauses producers once a device is bound and restarts them on give-up.

mod mdns;
mod upnp;

pub use self::mdns::{MdnsDiscovery, SERVICE_NAME, candidate_from_parts};
pub use self::upnp::{DescriptionError, DeviceSummary, UpnpCastDiscovery, parse_description};

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::session::DiscoveryControl;

/// Pause/restart switch shared between a producer thread and the session manager.
pub struct ProducerSwitch {
    name: String,
    paused: AtomicBool,
    restart_requested: AtomicBool,
    shutdown: AtomicBool,
}

impl ProducerSwitch {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            paused: AtomicBool::new(false),
            restart_requested: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Returns true once per `restart()` call.
    pub fn take_restart(&self) -> bool {
        self.restart_requested.swap(false, Ordering::AcqRel)
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}

impl DiscoveryControl for ProducerSwitch {
    fn name(&self) -> &str {
        &self.name
    }

    fn stop(&self) -> anyhow::Result<()> {
        self.paused.store(true, Ordering::Release);
        Ok(())
    }

    fn restart(&self) -> anyhow::Result<()> {
        self.restart_requested.store(true, Ordering::Release);
        self.paused.store(false, Ordering::Release);
        Ok(())
    }
}

/// Remembers announced devices so that repeated announcements are not
/// processed again before half of their max-age.
#[derive(Debug, Default)]
pub struct SeenCache {
    seen: HashMap<String, (Instant, Duration)>,
}

impl SeenCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if `key` is new or its last processing is older than half of `max_age`.
    pub fn should_process(&mut self, key: &str, max_age: Duration, now: Instant) -> bool {
        match self.seen.get(key) {
            Some((last, age)) if now.saturating_duration_since(*last) <= *age / 2 => false,
            _ => {
                self.seen.insert(key.to_string(), (now, max_age));
                true
            }
        }
    }

    pub fn forget(&mut self, key: &str) {
        self.seen.remove(key);
    }

    pub fn clear(&mut self) {
        self.seen.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_switch() {
        let switch = ProducerSwitch::new("mDNS");
        assert!(!switch.is_paused());
        switch.stop().unwrap();
        assert!(switch.is_paused());
        assert!(!switch.take_restart());
        switch.restart().unwrap();
        assert!(!switch.is_paused());
        assert!(switch.take_restart());
        assert!(!switch.take_restart());
    }

    #[test]
    fn test_seen_cache_half_max_age() {
        let mut cache = SeenCache::new();
        let t0 = Instant::now();
        let max_age = Duration::from_secs(100);
        assert!(cache.should_process("uuid:a", max_age, t0));
        assert!(!cache.should_process("uuid:a", max_age, t0 + Duration::from_secs(50)));
        assert!(cache.should_process("uuid:a", max_age, t0 + Duration::from_secs(51)));
        assert!(cache.should_process("uuid:b", max_age, t0));

        cache.forget("uuid:b");
        assert!(cache.should_process("uuid:b", max_age, t0));
        cache.clear();
        assert!(cache.should_process("uuid:a", max_age, t0 + Duration::from_secs(52)));
    }
}
