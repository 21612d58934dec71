//! Device RPC surface consumed by the session manager and the loop.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::errors::DeviceResult;
use crate::events::EventSink;
use crate::media::LoadRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Idle,
    Buffering,
    Playing,
    Paused,
}

/// Why a media session went idle. Every variant ends the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleReason {
    Cancelled,
    Interrupted,
    Finished,
    Error,
    Completed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MediaStatus {
    pub media_session_id: Option<i32>,
    pub player_state: PlayerState,
    pub url: Option<String>,
    pub current_time: f64,
    pub duration: Option<f64>,
    pub idle_reason: Option<IdleReason>,
}

impl MediaStatus {
    /// Media URL, `None` when blank.
    pub fn media_url(&self) -> Option<&str> {
        self.url.as_deref().map(str::trim).filter(|u| !u.is_empty())
    }
}

/// Application currently owning the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunningApp {
    pub app_id: String,
    pub display_name: String,
    pub session_id: String,
    pub transport_id: String,
    pub status_text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceStatus {
    pub running_app: Option<RunningApp>,
}

impl DeviceStatus {
    pub fn is_running(&self, app_id: &str) -> bool {
        self.running_app
            .as_ref()
            .is_some_and(|app| app.app_id.eq_ignore_ascii_case(app_id))
    }
}

/// Blocking RPC client for one physical device.
pub trait DeviceClient: Send + Sync {
    fn name(&self) -> &str;
    fn address(&self) -> SocketAddr;

    fn is_connected(&self) -> bool;
    fn connect(&self) -> DeviceResult<()>;
    fn disconnect(&self);

    fn status(&self) -> DeviceResult<DeviceStatus>;
    /// `None` when the device reports no media session.
    fn media_status(&self) -> DeviceResult<Option<MediaStatus>>;

    fn load(&self, request: &LoadRequest) -> DeviceResult<Option<MediaStatus>>;
    fn play(&self) -> DeviceResult<()>;
    fn pause(&self) -> DeviceResult<()>;
    fn seek(&self, position_secs: f64) -> DeviceResult<()>;
    fn launch_app(&self, app_id: &str) -> DeviceResult<()>;
    fn stop_app(&self) -> DeviceResult<()>;

    /// Forwards unsolicited media status updates into `sink`.
    fn subscribe(&self, sink: EventSink);
}

/// A device announced by a discovery producer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCandidate {
    pub name: String,
    pub address: SocketAddr,
    pub model: Option<String>,
    pub uuid: Option<String>,
}

/// Builds RPC clients for discovered candidates.
pub trait DeviceConnector: Send + Sync {
    fn open(&self, candidate: &DeviceCandidate) -> Arc<dyn DeviceClient>;
}

/// The binding to one physical device.
#[derive(Clone)]
pub struct DeviceHandle {
    client: Arc<dyn DeviceClient>,
}

impl DeviceHandle {
    pub fn new(client: Arc<dyn DeviceClient>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &dyn DeviceClient {
        self.client.as_ref()
    }

    pub fn name(&self) -> &str {
        self.client.name()
    }

    pub fn address(&self) -> SocketAddr {
        self.client.address()
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_connected()
    }
}

impl fmt::Debug for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("name", &self.name())
            .field("address", &self.address())
            .finish()
    }
}

impl fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.address())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_media_url_is_absent() {
        let status = MediaStatus {
            media_session_id: Some(1),
            player_state: PlayerState::Idle,
            url: Some("  ".into()),
            current_time: 0.0,
            duration: None,
            idle_reason: None,
        };
        assert_eq!(status.media_url(), None);
    }

    #[test]
    fn test_is_running_compares_app_id() {
        let status = DeviceStatus {
            running_app: Some(RunningApp {
                app_id: "cc1ad845".into(),
                display_name: "Default Media Receiver".into(),
                session_id: "s".into(),
                transport_id: "t".into(),
                status_text: String::new(),
            }),
        };
        assert!(status.is_running("CC1AD845"));
        assert!(!DeviceStatus::default().is_running("CC1AD845"));
    }
}
