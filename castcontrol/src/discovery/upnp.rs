//! Cast device discovery via SSDP.
//!
//! Cast devices also answer SSDP searches with a DIAL description. The
//! description is fetched once per device and max-age window; devices whose
//! model is on the configured list are offered on the cast port.

use std::io::BufReader;
use std::net::{IpAddr, SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use castupnp::ssdp::{SsdpClient, SsdpEvent};
use quick_xml::{Error as XmlError, Reader, events::Event};
use thiserror::Error;
use tracing::{debug, info, warn};
use ureq::Agent;

use super::{ProducerSwitch, SeenCache};
use crate::chromecast::DEFAULT_CAST_PORT;
use crate::device::DeviceCandidate;
use crate::session::{DiscoverySource, SessionManager};

const FETCH_TIMEOUT: Duration = Duration::from_secs(5);
const POLL_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum DescriptionError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] ureq::Error),

    #[error("XML parsing error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Missing required device element: {0}")]
    MissingField(&'static str),

    #[error("Invalid location: {0}")]
    InvalidLocation(String),
}

/// The parts of a device description this producer cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSummary {
    pub friendly_name: String,
    pub model_name: Option<String>,
    pub udn: Option<String>,
}

pub struct UpnpCastDiscovery {
    switch: Arc<ProducerSwitch>,
    search_interval: Duration,
    models: Vec<String>,
    cast_port: u16,
    agent: Agent,
    seen: SeenCache,
}

impl UpnpCastDiscovery {
    pub fn new(search_interval: Duration, models: Vec<String>) -> Self {
        let agent: Agent = Agent::config_builder()
            .timeout_global(Some(FETCH_TIMEOUT))
            .build()
            .into();
        Self {
            switch: Arc::new(ProducerSwitch::new("UPnP")),
            search_interval,
            models,
            cast_port: DEFAULT_CAST_PORT,
            agent,
            seen: SeenCache::new(),
        }
    }

    /// Port offered for accepted devices; SSDP descriptions do not carry it.
    pub fn with_cast_port(mut self, port: u16) -> Self {
        self.cast_port = port;
        self
    }

    pub fn switch(&self) -> Arc<ProducerSwitch> {
        Arc::clone(&self.switch)
    }

    pub fn accepts_model(&self, model: Option<&str>) -> bool {
        model.is_some_and(|m| self.models.iter().any(|wanted| wanted.eq_ignore_ascii_case(m.trim())))
    }

    pub fn spawn(self, session: Arc<SessionManager>) -> std::io::Result<JoinHandle<()>> {
        session.add_producer(self.switch.clone());
        let client = SsdpClient::new()?;
        thread::Builder::new()
            .name("upnp-discovery".to_string())
            .spawn(move || self.run(client, &session))
    }

    fn run(mut self, mut client: SsdpClient, session: &SessionManager) {
        info!("✅ UPnP discovery started (models: {:?})", self.models);
        let mut last_search: Option<Instant> = None;

        while !self.switch.is_shutdown() {
            if self.switch.take_restart() {
                self.seen.clear();
                last_search = None;
            }

            let due = last_search.is_none_or(|t| t.elapsed() >= self.search_interval);
            if due && !self.switch.is_paused() {
                if let Err(e) = client.send_msearch("ssdp:all", 3) {
                    warn!("Failed to send M-SEARCH: {}", e);
                }
                last_search = Some(Instant::now());
            }

            match client.poll_event(POLL_TIMEOUT) {
                Ok(Some(event)) => self.handle_event(event, session),
                Ok(None) => {}
                Err(e) => {
                    warn!("SSDP receive error: {}", e);
                    thread::sleep(POLL_TIMEOUT);
                }
            }
        }
        debug!("UPnP discovery stopped");
    }

    fn handle_event(&mut self, event: SsdpEvent, session: &SessionManager) {
        let (usn, location, max_age) = match event {
            SsdpEvent::Alive {
                usn,
                location,
                max_age,
                ..
            }
            | SsdpEvent::SearchResponse {
                usn,
                location,
                max_age,
                ..
            } => (usn, location, max_age),
            SsdpEvent::ByeBye { usn, .. } => {
                self.seen.forget(device_key(&usn));
                return;
            }
        };
        if self.switch.is_paused() {
            return;
        }
        let key = device_key(&usn).to_string();
        if !self
            .seen
            .should_process(&key, Duration::from_secs(max_age as u64), Instant::now())
        {
            return;
        }

        match self.fetch(&location) {
            Ok((summary, host)) => {
                if !self.accepts_model(summary.model_name.as_deref()) {
                    debug!(
                        "Skipping {} ({:?}): not a cast model",
                        summary.friendly_name, summary.model_name
                    );
                    return;
                }
                session.offer(
                    DeviceCandidate {
                        name: summary.friendly_name,
                        address: SocketAddr::new(host, self.cast_port),
                        model: summary.model_name,
                        uuid: summary.udn,
                    },
                    DiscoverySource::Upnp,
                );
            }
            Err(e) => {
                debug!("Failed to read description at {}: {}", location, e);
                self.seen.forget(&key);
            }
        }
    }

    fn fetch(&self, location: &str) -> Result<(DeviceSummary, IpAddr), DescriptionError> {
        let host = location_host(location)?;
        let response = self.agent.get(location).call()?;
        let (_parts, body) = response.into_parts();
        let summary = parse_description(BufReader::new(body.into_reader()))?;
        Ok((summary, host))
    }
}

/// `uuid:X::urn:...` and `uuid:X` both identify device X.
fn device_key(usn: &str) -> &str {
    usn.split("::").next().unwrap_or(usn)
}

fn location_host(location: &str) -> Result<IpAddr, DescriptionError> {
    let invalid = || DescriptionError::InvalidLocation(location.to_string());
    let authority = location
        .split_once("://")
        .map(|(_, rest)| rest)
        .ok_or_else(invalid)?
        .split('/')
        .next()
        .ok_or_else(invalid)?;
    let with_port = if authority.contains(':') {
        authority.to_string()
    } else {
        format!("{}:80", authority)
    };
    with_port
        .to_socket_addrs()
        .map_err(|_| invalid())?
        .next()
        .map(|addr| addr.ip())
        .ok_or_else(invalid)
}

/// Reads `friendlyName`, `modelName` and `UDN` of the root device.
pub fn parse_description<R: std::io::BufRead>(source: R) -> Result<DeviceSummary, DescriptionError> {
    let mut reader = Reader::from_reader(source);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut depth_in_device = 0usize;
    let mut current_tag: Option<String> = None;
    let mut friendly_name = None;
    let mut model_name = None;
    let mut udn = None;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                if name == "device" {
                    depth_in_device += 1;
                    current_tag = None;
                } else if depth_in_device == 1 {
                    current_tag = Some(name);
                }
            }
            Event::End(e) => {
                if e.local_name().as_ref() == b"device" {
                    depth_in_device = depth_in_device.saturating_sub(1);
                }
                current_tag = None;
            }
            Event::Text(e) => {
                if let Some(tag) = &current_tag {
                    let text = e.decode().map_err(XmlError::Encoding)?.into_owned();
                    match tag.as_str() {
                        "friendlyName" if friendly_name.is_none() => friendly_name = Some(text),
                        "modelName" if model_name.is_none() => model_name = Some(text),
                        "UDN" if udn.is_none() => udn = Some(text),
                        _ => {}
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(DeviceSummary {
        friendly_name: friendly_name.ok_or(DescriptionError::MissingField("friendlyName"))?,
        model_name,
        udn,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIAL_DESCRIPTION: &str = r#"<?xml version="1.0"?>
<root xmlns="urn:schemas-upnp-org:device-1-0">
  <specVersion><major>1</major><minor>0</minor></specVersion>
  <URLBase>http://192.168.1.40:8008</URLBase>
  <device>
    <deviceType>urn:dial-multiscreen-org:device:dial:1</deviceType>
    <friendlyName>Kitchen speaker</friendlyName>
    <manufacturer>Google Inc.</manufacturer>
    <modelName>Eureka Dongle</modelName>
    <UDN>uuid:3e1cc7c4-f0f0-4b6d-8c22-9d2bd7d1a111</UDN>
    <serviceList>
      <service>
        <serviceType>urn:dial-multiscreen-org:service:dial:1</serviceType>
      </service>
    </serviceList>
  </device>
</root>"#;

    #[test]
    fn test_parse_description() {
        let summary = parse_description(DIAL_DESCRIPTION.as_bytes()).unwrap();
        assert_eq!(summary.friendly_name, "Kitchen speaker");
        assert_eq!(summary.model_name.as_deref(), Some("Eureka Dongle"));
        assert_eq!(
            summary.udn.as_deref(),
            Some("uuid:3e1cc7c4-f0f0-4b6d-8c22-9d2bd7d1a111")
        );
    }

    #[test]
    fn test_missing_friendly_name() {
        let xml = "<root><device><modelName>x</modelName></device></root>";
        assert!(matches!(
            parse_description(xml.as_bytes()),
            Err(DescriptionError::MissingField("friendlyName"))
        ));
    }

    #[test]
    fn test_model_filter() {
        let discovery = UpnpCastDiscovery::new(
            Duration::from_secs(30),
            vec!["Eureka Dongle".to_string(), "Chromecast Audio".to_string()],
        );
        assert!(discovery.accepts_model(Some("Chromecast Audio")));
        assert!(discovery.accepts_model(Some(" eureka dongle ")));
        assert!(!discovery.accepts_model(Some("MediaRenderer")));
        assert!(!discovery.accepts_model(None));
    }

    #[test]
    fn test_device_key_and_host() {
        assert_eq!(device_key("uuid:abc::upnp:rootdevice"), "uuid:abc");
        assert_eq!(device_key("uuid:abc"), "uuid:abc");
        assert_eq!(
            location_host("http://192.168.1.40:8008/ssdp/device-desc.xml").unwrap(),
            "192.168.1.40".parse::<IpAddr>().unwrap()
        );
        assert!(location_host("not a url").is_err());
    }
}
