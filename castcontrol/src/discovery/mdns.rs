//! Chromecast discovery via mDNS.
//!
//! Cast devices advertise `_googlecast._tcp.local`. The TXT record carries
//! the friendly name (`fn`), the model (`md`) and the device id (`id`).

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use futures::{StreamExt, pin_mut};
use tracing::{debug, info, warn};

use super::ProducerSwitch;
use crate::chromecast::DEFAULT_CAST_PORT;
use crate::device::DeviceCandidate;
use crate::session::{DiscoverySource, SessionManager};

pub const SERVICE_NAME: &str = "_googlecast._tcp.local";

const RETRY_DELAY: Duration = Duration::from_secs(5);

pub struct MdnsDiscovery {
    switch: Arc<ProducerSwitch>,
    query_interval: Duration,
}

impl MdnsDiscovery {
    pub fn new(query_interval: Duration) -> Self {
        Self {
            switch: Arc::new(ProducerSwitch::new("mDNS")),
            query_interval,
        }
    }

    pub fn switch(&self) -> Arc<ProducerSwitch> {
        Arc::clone(&self.switch)
    }

    /// Registers the producer with `session` and starts browsing.
    pub fn spawn(self, session: Arc<SessionManager>) -> std::io::Result<JoinHandle<()>> {
        session.add_producer(self.switch.clone());
        thread::Builder::new()
            .name("mdns-discovery".to_string())
            .spawn(move || self.run(&session))
    }

    fn run(&self, session: &SessionManager) {
        info!("✅ mDNS discovery started for {}", SERVICE_NAME);
        while !self.switch.is_shutdown() {
            if let Err(e) = async_std::task::block_on(self.browse(session)) {
                warn!("mDNS discovery failed: {}, retrying in {:?}", e, RETRY_DELAY);
            }
            thread::sleep(RETRY_DELAY);
        }
        debug!("mDNS discovery stopped");
    }

    async fn browse(&self, session: &SessionManager) -> Result<(), mdns::Error> {
        let stream = mdns::discover::all(SERVICE_NAME, self.query_interval)?.listen();
        pin_mut!(stream);

        while let Some(response) = stream.next().await {
            if self.switch.is_shutdown() {
                break;
            }
            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    debug!("Ignoring mDNS error: {}", e);
                    continue;
                }
            };
            if self.switch.take_restart() {
                debug!("mDNS discovery restarted");
            }
            if self.switch.is_paused() {
                continue;
            }
            if let Some(candidate) = candidate_from_response(&response) {
                session.offer(candidate, DiscoverySource::Mdns);
            }
        }
        Ok(())
    }
}

fn candidate_from_response(response: &mdns::Response) -> Option<DeviceCandidate> {
    let mut ptr = None;
    let mut addresses = Vec::new();
    let mut port = None;
    let mut txt = Vec::new();

    for record in response.records() {
        match &record.kind {
            mdns::RecordKind::PTR(name) if ptr.is_none() => ptr = Some(name.clone()),
            mdns::RecordKind::A(addr) => addresses.push(IpAddr::V4(*addr)),
            mdns::RecordKind::AAAA(addr) => addresses.push(IpAddr::V6(*addr)),
            mdns::RecordKind::SRV { port: p, .. } => port = Some(*p),
            mdns::RecordKind::TXT(entries) => txt.extend(entries.iter().cloned()),
            _ => {}
        }
    }

    candidate_from_parts(ptr.as_deref(), &addresses, port, &txt)
}

/// Builds a candidate from the records of one mDNS response.
///
/// IPv4 addresses are preferred. Without a `fn` TXT entry the instance name
/// is taken from the PTR record, minus its 32-char hex id suffix.
pub fn candidate_from_parts(
    ptr: Option<&str>,
    addresses: &[IpAddr],
    port: Option<u16>,
    txt: &[String],
) -> Option<DeviceCandidate> {
    let host = addresses
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| addresses.first())?;

    let txt: HashMap<&str, &str> = txt.iter().filter_map(|e| e.split_once('=')).collect();

    let name = match txt.get("fn") {
        Some(name) if !name.trim().is_empty() => name.trim().to_string(),
        _ => {
            let instance = ptr?.split(&format!(".{}", SERVICE_NAME)).next()?;
            let name = instance
                .split('-')
                .take_while(|part| part.len() != 32)
                .collect::<Vec<_>>()
                .join("-");
            if name.trim().is_empty() {
                return None;
            }
            name.trim().to_string()
        }
    };

    Some(DeviceCandidate {
        name,
        address: SocketAddr::new(*host, port.unwrap_or(DEFAULT_CAST_PORT)),
        model: txt.get("md").map(|m| m.to_string()),
        uuid: txt.get("id").map(|id| id.to_string()),
    })
}
