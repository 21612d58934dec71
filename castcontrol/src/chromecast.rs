//! Cast device client using the rust_cast library.
//!
//! Every call opens a fresh TLS connection on a short-lived worker thread and
//! the caller waits at most `call_timeout` for the answer. Only owned data
//! crosses the thread boundary, the `CastDevice` never leaves its thread.
//! Push events come from a separate listener thread holding a long-lived
//! connection.

use std::net::SocketAddr;
use std::sync::{Arc, Once};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use crossbeam_channel::bounded;
use parking_lot::Mutex;
use rust_cast::channels::connection::ConnectionResponse;
use rust_cast::channels::heartbeat::HeartbeatResponse;
use rust_cast::channels::media::{
    GenericMediaMetadata, IdleReason as CastIdleReason, Image, Media, MediaResponse, Metadata,
    PlayerState as CastPlayerState, StatusEntry, StreamType,
};
use rust_cast::channels::receiver::{Application, CastDeviceApp, ReceiverResponse};
use rust_cast::{CastDevice, ChannelMessage};
use tracing::{debug, info, warn};

use crate::device::{
    DeviceCandidate, DeviceClient, DeviceConnector, DeviceStatus, IdleReason, MediaStatus,
    PlayerState, RunningApp,
};
use crate::errors::{DeviceError, DeviceResult};
use crate::events::EventSink;
use crate::media::{LoadRequest, StreamKind};

/// Default Chromecast port.
pub const DEFAULT_CAST_PORT: u16 = 8009;

/// Default timeout for a single device call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

const RECEIVER_DESTINATION: &str = "receiver-0";
const DEFAULT_MEDIA_RECEIVER_ID: &str = "CC1AD845";
const LISTENER_RETRY: Duration = Duration::from_secs(5);

/// Worker threads allowed per device, including the ones left behind by a timeout.
const MAX_CALLS_IN_FLIGHT: usize = 4;

/// Counts the worker threads of a device that have not returned yet.
#[derive(Debug, Default)]
struct CallSlots {
    in_flight: Arc<AtomicUsize>,
}

impl CallSlots {
    fn try_acquire(&self, limit: usize) -> Option<CallSlot> {
        self.in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < limit).then_some(n + 1))
            .ok()
            .map(|_| CallSlot(Arc::clone(&self.in_flight)))
    }

    fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }
}

/// Released when the worker thread holding it ends.
struct CallSlot(Arc<AtomicUsize>);

impl Drop for CallSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Ids needed to address our app and its media session.
#[derive(Debug, Default, Clone)]
struct CastSession {
    receiver_session_id: Option<String>,
    transport_id: Option<String>,
    media_session_id: Option<i32>,
}

impl CastSession {
    fn clear(&mut self) {
        self.receiver_session_id = None;
        self.transport_id = None;
        self.media_session_id = None;
    }
}

pub struct ChromecastDevice {
    name: String,
    address: SocketAddr,
    app_id: String,
    call_timeout: Duration,
    connected: AtomicBool,
    calls: CallSlots,
    session: Arc<Mutex<CastSession>>,
    listener_stop: Mutex<Option<Arc<AtomicBool>>>,
}

impl ChromecastDevice {
    pub fn new(name: &str, address: SocketAddr, app_id: &str, call_timeout: Duration) -> Self {
        debug!("Creating ChromecastDevice for {} at {}", name, address);
        Self {
            name: name.to_string(),
            address,
            app_id: app_id.to_string(),
            call_timeout,
            connected: AtomicBool::new(false),
            calls: CallSlots::default(),
            session: Arc::new(Mutex::new(CastSession::default())),
            listener_stop: Mutex::new(None),
        }
    }

    fn host(&self) -> String {
        self.address.ip().to_string()
    }

    /// Runs `f` against a fresh connection on a worker thread, bounded by `call_timeout`.
    fn call<R, F>(&self, action: &'static str, f: F) -> DeviceResult<R>
    where
        R: Send + 'static,
        F: FnOnce(&CastDevice<'static>) -> DeviceResult<R> + Send + 'static,
    {
        let Some(slot) = self.calls.try_acquire(MAX_CALLS_IN_FLIGHT) else {
            self.connected.store(false, Ordering::Release);
            return Err(DeviceError::no_response(format!(
                "{} on {}: {} earlier calls still pending",
                action,
                self.address,
                self.calls.in_flight()
            )));
        };
        let host = self.host();
        let port = self.address.port();
        let (tx, rx) = bounded(1);

        thread::Builder::new()
            .name(format!("cast-{}", action))
            .spawn(move || {
                let _slot = slot;
                let result = open_device(&host, port).and_then(|device| f(&device));
                let _ = tx.send(result);
            })
            .map_err(|e| DeviceError::action_failed(action, e))?;

        let result = match rx.recv_timeout(self.call_timeout) {
            Ok(result) => result,
            Err(_) => Err(DeviceError::no_response(format!(
                "{} on {} timed out after {}s",
                action,
                self.address,
                self.call_timeout.as_secs()
            ))),
        };
        if matches!(&result, Err(e) if e.is_connectivity()) {
            self.connected.store(false, Ordering::Release);
        }
        result
    }

    /// Transport and media session ids, fetching the latter if unknown.
    fn media_target(&self, action: &'static str) -> DeviceResult<(String, Option<i32>)> {
        let session = self.session.lock();
        let transport_id = session
            .transport_id
            .clone()
            .ok_or_else(|| DeviceError::action_failed(action, "no app session"))?;
        Ok((transport_id, session.media_session_id))
    }

    fn remember_app(&self, app: &Application) {
        if app.app_id.eq_ignore_ascii_case(&self.app_id) {
            let mut session = self.session.lock();
            if session.transport_id.as_deref() != Some(app.transport_id.as_str()) {
                session.media_session_id = None;
            }
            session.receiver_session_id = Some(app.session_id.clone());
            session.transport_id = Some(app.transport_id.clone());
        }
    }

    fn stop_listener(&self) {
        if let Some(stop) = self.listener_stop.lock().take() {
            stop.store(true, Ordering::Release);
        }
    }
}

/// rust_cast needs a process-wide rustls provider before the first TLS handshake.
pub fn install_crypto_provider() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        let _ = rustls::crypto::CryptoProvider::install_default(
            rustls::crypto::aws_lc_rs::default_provider(),
        );
    });
}

fn open_device(host: &str, port: u16) -> DeviceResult<CastDevice<'static>> {
    let device = CastDevice::connect_without_host_verification(host.to_string(), port)
        .map_err(|e| DeviceError::not_connected(format!("{}:{}: {}", host, port, e)))?;
    device
        .connection
        .connect(RECEIVER_DESTINATION)
        .map_err(|e| DeviceError::not_connected(format!("{}:{}: {}", host, port, e)))?;
    Ok(device)
}

fn cast_app(app_id: &str) -> CastDeviceApp {
    if app_id.eq_ignore_ascii_case(DEFAULT_MEDIA_RECEIVER_ID) {
        CastDeviceApp::DefaultMediaReceiver
    } else {
        CastDeviceApp::Custom(app_id.to_string())
    }
}

fn to_running_app(app: &Application) -> RunningApp {
    RunningApp {
        app_id: app.app_id.clone(),
        display_name: app.display_name.clone(),
        session_id: app.session_id.clone(),
        transport_id: app.transport_id.clone(),
        status_text: app.status_text.clone(),
    }
}

fn to_media_status(entry: &StatusEntry) -> MediaStatus {
    MediaStatus {
        media_session_id: Some(entry.media_session_id),
        player_state: match entry.player_state {
            CastPlayerState::Idle => PlayerState::Idle,
            CastPlayerState::Buffering => PlayerState::Buffering,
            CastPlayerState::Playing => PlayerState::Playing,
            CastPlayerState::Paused => PlayerState::Paused,
        },
        url: entry.media.as_ref().map(|m| m.content_id.clone()),
        current_time: entry.current_time.map(f64::from).unwrap_or(0.0),
        duration: entry
            .media
            .as_ref()
            .and_then(|m| m.duration)
            .map(f64::from),
        idle_reason: entry.idle_reason.as_ref().map(|reason| match reason {
            CastIdleReason::Cancelled => IdleReason::Cancelled,
            CastIdleReason::Interrupted => IdleReason::Interrupted,
            CastIdleReason::Finished => IdleReason::Finished,
            CastIdleReason::Error => IdleReason::Error,
        }),
    }
}

fn to_cast_media(request: &LoadRequest) -> Media {
    Media {
        content_id: request.content_id.clone(),
        content_type: request.content_type.clone(),
        stream_type: match request.stream_type {
            StreamKind::Buffered => StreamType::Buffered,
            StreamKind::Live => StreamType::Live,
        },
        metadata: Some(Metadata::Generic(GenericMediaMetadata {
            title: Some(request.metadata.title.clone()),
            subtitle: None,
            images: request
                .metadata
                .images
                .iter()
                .map(|image| Image {
                    url: image.url.clone(),
                    dimensions: None,
                })
                .collect(),
            release_date: None,
        })),
        duration: request.duration.map(|d| d as f32),
    }
}

impl DeviceClient for ChromecastDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn address(&self) -> SocketAddr {
        self.address
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn connect(&self) -> DeviceResult<()> {
        self.call("connect", |device| {
            device
                .heartbeat
                .ping()
                .map_err(|e| DeviceError::not_connected(e.to_string()))
        })?;
        self.connected.store(true, Ordering::Release);
        Ok(())
    }

    fn disconnect(&self) {
        self.stop_listener();
        self.connected.store(false, Ordering::Release);
        self.session.lock().clear();
        debug!("Disconnected from {}", self.address);
    }

    fn status(&self) -> DeviceResult<DeviceStatus> {
        let status = self.call("get_status", |device| {
            device
                .receiver
                .get_status()
                .map_err(|e| DeviceError::no_response(e.to_string()))
        })?;

        let running = status.applications.first();
        match running {
            Some(app) if app.app_id.eq_ignore_ascii_case(&self.app_id) => self.remember_app(app),
            _ => self.session.lock().clear(),
        }
        Ok(DeviceStatus {
            running_app: running.map(to_running_app),
        })
    }

    fn media_status(&self) -> DeviceResult<Option<MediaStatus>> {
        let Ok((transport_id, _)) = self.media_target("get_media_status") else {
            return Ok(None);
        };
        let status = self.call("get_media_status", move |device| {
            device
                .connection
                .connect(transport_id.clone())
                .map_err(|e| DeviceError::not_connected(e.to_string()))?;
            device
                .media
                .get_status(transport_id.clone(), None)
                .map_err(|e| DeviceError::no_response(e.to_string()))
        })?;

        let entry = status.entries.first().map(to_media_status);
        if let Some(entry) = &entry {
            self.session.lock().media_session_id = entry.media_session_id;
        }
        Ok(entry)
    }

    fn load(&self, request: &LoadRequest) -> DeviceResult<Option<MediaStatus>> {
        let (transport_id, session_id) = {
            let session = self.session.lock();
            match (&session.transport_id, &session.receiver_session_id) {
                (Some(t), Some(s)) => (t.clone(), s.clone()),
                _ => return Err(DeviceError::action_failed("load", "no app session")),
            }
        };
        let media = to_cast_media(request);
        let status = self.call("load", move |device| {
            device
                .connection
                .connect(transport_id.clone())
                .map_err(|e| DeviceError::not_connected(e.to_string()))?;
            device
                .media
                .load(transport_id.clone(), session_id.clone(), &media)
                .map_err(|e| DeviceError::action_failed("load", e))
        })?;

        let entry = status.entries.first().map(to_media_status);
        self.session.lock().media_session_id = entry.as_ref().and_then(|e| e.media_session_id);
        Ok(entry)
    }

    fn play(&self) -> DeviceResult<()> {
        let (transport_id, media_session_id) = self.media_target("play")?;
        let entry = self.call("play", move |device| {
            let msid = resolve_media_session(device, &transport_id, media_session_id, "play")?;
            device
                .media
                .play(transport_id.clone(), msid)
                .map_err(|e| DeviceError::action_failed("play", e))
        })?;
        self.session.lock().media_session_id = Some(entry.media_session_id);
        Ok(())
    }

    fn pause(&self) -> DeviceResult<()> {
        let (transport_id, media_session_id) = self.media_target("pause")?;
        let entry = self.call("pause", move |device| {
            let msid = resolve_media_session(device, &transport_id, media_session_id, "pause")?;
            device
                .media
                .pause(transport_id.clone(), msid)
                .map_err(|e| DeviceError::action_failed("pause", e))
        })?;
        self.session.lock().media_session_id = Some(entry.media_session_id);
        Ok(())
    }

    fn seek(&self, position_secs: f64) -> DeviceResult<()> {
        let (transport_id, media_session_id) = self.media_target("seek")?;
        let entry = self.call("seek", move |device| {
            let msid = resolve_media_session(device, &transport_id, media_session_id, "seek")?;
            device
                .media
                .seek(transport_id.clone(), msid, Some(position_secs as f32), None)
                .map_err(|e| DeviceError::action_failed("seek", e))
        })?;
        self.session.lock().media_session_id = Some(entry.media_session_id);
        Ok(())
    }

    fn launch_app(&self, app_id: &str) -> DeviceResult<()> {
        let app = cast_app(app_id);
        let launched = self.call("launch_app", move |device| {
            device
                .receiver
                .launch_app(&app)
                .map_err(|e| DeviceError::action_failed("launch_app", e))
        })?;
        debug!(
            "Launched app with session_id: {}, transport_id: {}",
            launched.session_id, launched.transport_id
        );
        self.remember_app(&launched);
        Ok(())
    }

    fn stop_app(&self) -> DeviceResult<()> {
        self.call("stop_app", |device| {
            let status = device
                .receiver
                .get_status()
                .map_err(|e| DeviceError::no_response(e.to_string()))?;
            match status.applications.first() {
                Some(app) => device
                    .receiver
                    .stop_app(app.session_id.clone())
                    .map_err(|e| DeviceError::action_failed("stop_app", e)),
                None => Ok(()),
            }
        })?;
        self.session.lock().clear();
        Ok(())
    }

    fn subscribe(&self, sink: EventSink) {
        self.stop_listener();
        let stop = Arc::new(AtomicBool::new(false));
        *self.listener_stop.lock() = Some(Arc::clone(&stop));

        let host = self.host();
        let port = self.address.port();
        let app_id = self.app_id.clone();
        let spawned = thread::Builder::new()
            .name("cast-listener".to_string())
            .spawn(move || listen(&host, port, &app_id, &sink, &stop));
        if let Err(e) = spawned {
            warn!("Failed to start cast event listener: {}", e);
        }
    }
}

impl Drop for ChromecastDevice {
    fn drop(&mut self) {
        self.stop_listener();
    }
}

fn resolve_media_session(
    device: &CastDevice<'static>,
    transport_id: &str,
    known: Option<i32>,
    action: &'static str,
) -> DeviceResult<i32> {
    device
        .connection
        .connect(transport_id.to_string())
        .map_err(|e| DeviceError::not_connected(e.to_string()))?;
    if let Some(msid) = known {
        return Ok(msid);
    }
    let status = device
        .media
        .get_status(transport_id.to_string(), None)
        .map_err(|e| DeviceError::no_response(e.to_string()))?;
    status
        .entries
        .first()
        .map(|entry| entry.media_session_id)
        .ok_or_else(|| DeviceError::action_failed(action, "no media session"))
}

fn listen(host: &str, port: u16, app_id: &str, sink: &EventSink, stop: &AtomicBool) {
    info!("Listening for events from {}:{}", host, port);
    while !stop.load(Ordering::Acquire) {
        match open_device(host, port) {
            Ok(device) => {
                if let Err(e) = pump_events(&device, app_id, sink, stop) {
                    debug!("Event listener for {}:{} interrupted: {}", host, port, e);
                }
            }
            Err(e) => debug!("Event listener cannot connect: {}", e),
        }
        if stop.load(Ordering::Acquire) {
            break;
        }
        thread::sleep(LISTENER_RETRY);
    }
    debug!("Event listener for {}:{} stopped", host, port);
}

fn pump_events(
    device: &CastDevice<'static>,
    app_id: &str,
    sink: &EventSink,
    stop: &AtomicBool,
) -> Result<(), rust_cast::errors::Error> {
    let mut joined: Option<String> = None;
    let status = device.receiver.get_status()?;
    join_app(device, &status.applications, app_id, &mut joined)?;

    while !stop.load(Ordering::Acquire) {
        match device.receive()? {
            ChannelMessage::Heartbeat(HeartbeatResponse::Ping) => device.heartbeat.pong()?,
            ChannelMessage::Receiver(ReceiverResponse::Status(status)) => {
                join_app(device, &status.applications, app_id, &mut joined)?;
            }
            ChannelMessage::Media(MediaResponse::Status(status)) => {
                for entry in &status.entries {
                    sink.push_media_status(to_media_status(entry));
                }
            }
            ChannelMessage::Connection(ConnectionResponse::Close) => joined = None,
            _ => {}
        }
    }
    Ok(())
}

fn join_app(
    device: &CastDevice<'static>,
    applications: &[Application],
    app_id: &str,
    joined: &mut Option<String>,
) -> Result<(), rust_cast::errors::Error> {
    let ours = applications
        .iter()
        .find(|app| app.app_id.eq_ignore_ascii_case(app_id));
    match ours {
        Some(app) if joined.as_deref() != Some(app.transport_id.as_str()) => {
            device.connection.connect(app.transport_id.clone())?;
            debug!("Event listener joined transport {}", app.transport_id);
            *joined = Some(app.transport_id.clone());
        }
        Some(_) => {}
        None => *joined = None,
    }
    Ok(())
}

/// Opens [`ChromecastDevice`] clients for discovered candidates.
#[derive(Debug, Clone)]
pub struct ChromecastConnector {
    app_id: String,
    call_timeout: Duration,
}

impl ChromecastConnector {
    pub fn new(app_id: &str, call_timeout: Duration) -> Self {
        install_crypto_provider();
        Self {
            app_id: app_id.to_string(),
            call_timeout,
        }
    }
}

impl Default for ChromecastConnector {
    fn default() -> Self {
        Self::new(DEFAULT_MEDIA_RECEIVER_ID, DEFAULT_CALL_TIMEOUT)
    }
}

impl DeviceConnector for ChromecastConnector {
    fn open(&self, candidate: &DeviceCandidate) -> Arc<dyn DeviceClient> {
        Arc::new(ChromecastDevice::new(
            &candidate.name,
            candidate.address,
            &self.app_id,
            self.call_timeout,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{ItemDetails, MediaDescriptor};

    #[test]
    fn test_call_slots_cap_pending_workers() {
        let slots = CallSlots::default();
        let held: Vec<CallSlot> = (0..MAX_CALLS_IN_FLIGHT)
            .map(|_| slots.try_acquire(MAX_CALLS_IN_FLIGHT).unwrap())
            .collect();
        assert_eq!(slots.in_flight(), MAX_CALLS_IN_FLIGHT);
        assert!(slots.try_acquire(MAX_CALLS_IN_FLIGHT).is_none());

        drop(held);
        assert_eq!(slots.in_flight(), 0);
        assert!(slots.try_acquire(MAX_CALLS_IN_FLIGHT).is_some());
    }

    #[test]
    fn test_cast_app_mapping() {
        assert!(matches!(
            cast_app("cc1ad845"),
            CastDeviceApp::DefaultMediaReceiver
        ));
        assert!(matches!(cast_app("ABCD1234"), CastDeviceApp::Custom(id) if id == "ABCD1234"));
    }

    #[test]
    fn test_cast_media_from_load_request() {
        let request = MediaDescriptor::from_item(
            "http://nas/a.flac",
            "",
            Some(ItemDetails {
                title: Some("Song".into()),
                art_uri: Some("http://nas/a.jpg".into()),
                content_type: Some("audio/flac".into()),
                duration_secs: Some(90),
            }),
        )
        .to_load_request();

        let media = to_cast_media(&request);
        assert_eq!(media.content_id, "http://nas/a.flac");
        assert_eq!(media.content_type, "audio/flac");
        assert_eq!(media.duration, Some(90.0));
        match media.metadata {
            Some(Metadata::Generic(meta)) => {
                assert_eq!(meta.title.as_deref(), Some("Song"));
                assert_eq!(meta.images.len(), 1);
                assert_eq!(meta.images[0].url, "http://nas/a.jpg");
            }
            _ => panic!("expected generic metadata"),
        }
    }

    #[test]
    fn test_calls_without_session_fail_fast() {
        let device = ChromecastDevice::new(
            "Kitchen",
            "127.0.0.1:8009".parse().unwrap(),
            DEFAULT_MEDIA_RECEIVER_ID,
            Duration::from_millis(10),
        );
        assert!(!device.is_connected());
        assert_eq!(device.media_status().unwrap(), None);
        assert!(matches!(
            device.play(),
            Err(DeviceError::ActionFailed { .. })
        ));
    }
}
