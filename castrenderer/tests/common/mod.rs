#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use castcontrol::events::{DEFAULT_EVENT_CAPACITY, channel};
use castcontrol::{
    DeviceCandidate, DeviceClient, DeviceConnector, DeviceError, DeviceResult, DeviceStatus,
    DiscoverySource, EventSink, LoadRequest, ManualClock, MediaStatus, PlayerState, Reconciler,
    ReconcilerConfig, ReconcilerHandle, RunningApp, SessionManager,
};
use castrenderer::ProtocolTranslator;
use parking_lot::Mutex;

#[derive(Default)]
struct ReceiverState {
    connected: bool,
    app: Option<RunningApp>,
    media: Option<MediaStatus>,
    loads: Vec<LoadRequest>,
    next_session: i32,
}

/// Receiver that obeys every command instantly.
pub struct ScriptedReceiver {
    address: SocketAddr,
    state: Mutex<ReceiverState>,
}

pub fn app(app_id: &str, display_name: &str) -> RunningApp {
    RunningApp {
        app_id: app_id.to_string(),
        display_name: display_name.to_string(),
        session_id: "s".to_string(),
        transport_id: "t".to_string(),
        status_text: String::new(),
    }
}

impl ScriptedReceiver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            address: "10.0.0.7:8009".parse().unwrap(),
            state: Mutex::new(ReceiverState {
                next_session: 1,
                ..Default::default()
            }),
        })
    }

    pub fn loads(&self) -> Vec<LoadRequest> {
        self.state.lock().loads.clone()
    }

    pub fn set_foreign_app(&self, app_id: &str, display_name: &str) {
        let mut state = self.state.lock();
        state.app = Some(app(app_id, display_name));
        state.media = None;
    }

    /// The receiver app timed out and dropped its media session.
    pub fn drop_media(&self) {
        self.state.lock().media = None;
    }

    pub fn set_position(&self, secs: f64) {
        if let Some(media) = self.state.lock().media.as_mut() {
            media.current_time = secs;
        }
    }

    fn set_player_state(&self, player_state: PlayerState) {
        if let Some(media) = self.state.lock().media.as_mut() {
            media.player_state = player_state;
        }
    }
}

impl DeviceClient for ScriptedReceiver {
    fn name(&self) -> &str {
        "Kitchen speaker"
    }

    fn address(&self) -> SocketAddr {
        self.address
    }

    fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    fn connect(&self) -> DeviceResult<()> {
        self.state.lock().connected = true;
        Ok(())
    }

    fn disconnect(&self) {
        self.state.lock().connected = false;
    }

    fn status(&self) -> DeviceResult<DeviceStatus> {
        Ok(DeviceStatus {
            running_app: self.state.lock().app.clone(),
        })
    }

    fn media_status(&self) -> DeviceResult<Option<MediaStatus>> {
        Ok(self.state.lock().media.clone())
    }

    fn load(&self, request: &LoadRequest) -> DeviceResult<Option<MediaStatus>> {
        let mut state = self.state.lock();
        let session = state.next_session;
        state.next_session += 1;
        state.loads.push(request.clone());
        let media = MediaStatus {
            media_session_id: Some(session),
            player_state: PlayerState::Playing,
            url: Some(request.content_id.clone()),
            current_time: 0.0,
            duration: request.duration,
            idle_reason: None,
        };
        state.media = Some(media.clone());
        Ok(Some(media))
    }

    fn play(&self) -> DeviceResult<()> {
        self.set_player_state(PlayerState::Playing);
        Ok(())
    }

    fn pause(&self) -> DeviceResult<()> {
        self.set_player_state(PlayerState::Paused);
        Ok(())
    }

    fn seek(&self, position_secs: f64) -> DeviceResult<()> {
        self.set_position(position_secs);
        Ok(())
    }

    fn launch_app(&self, app_id: &str) -> DeviceResult<()> {
        let mut state = self.state.lock();
        state.app = Some(app(app_id, "Default Media Receiver"));
        state.media = None;
        Ok(())
    }

    fn stop_app(&self) -> DeviceResult<()> {
        let mut state = self.state.lock();
        state.app = None;
        state.media = None;
        Ok(())
    }

    fn subscribe(&self, _sink: EventSink) {}
}

struct OneReceiver(Arc<ScriptedReceiver>);

impl DeviceConnector for OneReceiver {
    fn open(&self, _candidate: &DeviceCandidate) -> Arc<dyn DeviceClient> {
        self.0.clone()
    }
}

/// A real loop, its handle, and a translator on top of it.
pub struct Rig {
    pub clock: Arc<ManualClock>,
    pub session: Arc<SessionManager>,
    pub receiver: Arc<ScriptedReceiver>,
    pub reconciler: Reconciler,
    pub handle: ReconcilerHandle,
}

impl Rig {
    pub fn unbound() -> Self {
        let clock = Arc::new(ManualClock::new());
        let receiver = ScriptedReceiver::new();
        let (sink, events) = channel(DEFAULT_EVENT_CAPACITY);
        let session = Arc::new(SessionManager::new(
            "kitchen",
            Arc::new(OneReceiver(receiver.clone())),
            sink.clone(),
        ));
        let reconciler = Reconciler::new(
            session.clone(),
            sink,
            events,
            clock.clone(),
            ReconcilerConfig::default(),
        );
        let handle = reconciler.handle();
        Self {
            clock,
            session,
            receiver,
            reconciler,
            handle,
        }
    }

    pub fn bound() -> Self {
        let rig = Self::unbound();
        let candidate = DeviceCandidate {
            name: "Kitchen speaker".to_string(),
            address: rig.receiver.address,
            model: None,
            uuid: None,
        };
        assert!(rig.session.offer(candidate, DiscoverySource::Manual));
        rig
    }

    pub fn translator(&self) -> ProtocolTranslator {
        ProtocolTranslator::new(self.handle.clone())
    }

    pub fn step(&mut self) -> Result<(), DeviceError> {
        self.reconciler.step()
    }

    pub fn tick(&mut self, secs: u64) -> Result<(), DeviceError> {
        self.clock.advance(Duration::from_secs(secs));
        self.step()
    }
}

pub const TRACK_DIDL: &str = r#"<DIDL-Lite xmlns="urn:schemas-upnp-org:metadata-1-0/DIDL-Lite/" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:upnp="urn:schemas-upnp-org:metadata-1-0/upnp/"><item id="42" parentID="7" restricted="1"><dc:title>So What</dc:title><upnp:class>object.item.audioItem.musicTrack</upnp:class><upnp:albumArtURI>http://nas/art/42.jpg</upnp:albumArtURI><res protocolInfo="http-get:*:audio/flac:*" duration="0:09:22">http://nas/a/42.flac</res></item></DIDL-Lite>"#;
