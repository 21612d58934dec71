#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use castcontrol::events::{DEFAULT_EVENT_CAPACITY, channel};
use castcontrol::{
    DeviceCandidate, DeviceClient, DeviceConnector, DeviceError, DeviceResult, DeviceStatus,
    DiscoveryControl, DiscoverySource, EventSink, IdleReason, LoadRequest, ManualClock,
    MediaDescriptor, MediaStatus, PlayerState, Reconciler, ReconcilerConfig, ReconcilerHandle,
    RunningApp, SessionManager,
};
use parking_lot::Mutex;

pub const APP_ID: &str = "CC1AD845";

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Connect,
    Disconnect,
    Launch(String),
    StopApp,
    Load(String),
    Play,
    Pause,
    Seek(f64),
}

#[derive(Default)]
struct FakeState {
    connected: bool,
    unreachable: bool,
    running_app: Option<RunningApp>,
    media: Option<MediaStatus>,
    next_session: i32,
    sink: Option<EventSink>,
}

/// In-memory cast device that behaves like a well-mannered receiver.
pub struct FakeDevice {
    name: String,
    address: SocketAddr,
    state: Mutex<FakeState>,
    calls: Mutex<Vec<Call>>,
}

impl FakeDevice {
    pub fn new(name: &str, address: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            address: address.parse().unwrap(),
            state: Mutex::new(FakeState {
                next_session: 1,
                ..Default::default()
            }),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn record(&self, call: Call) {
        self.calls.lock().push(call);
    }

    fn reachable(&self) -> DeviceResult<()> {
        let mut state = self.state.lock();
        if state.unreachable {
            state.connected = false;
            return Err(DeviceError::not_connected(format!("{} unreachable", self.address)));
        }
        Ok(())
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    /// Calls that change the device, without connection bookkeeping.
    pub fn commands(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| !matches!(c, Call::Connect | Call::Disconnect))
            .collect()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    pub fn count(&self, wanted: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| wanted(c)).count()
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.lock().unreachable = unreachable;
    }

    pub fn set_foreign_app(&self, app_id: &str, display_name: &str) {
        let mut state = self.state.lock();
        state.running_app = Some(running_app(app_id, display_name));
        state.media = None;
    }

    pub fn set_position(&self, secs: f64) {
        if let Some(media) = self.state.lock().media.as_mut() {
            media.current_time = secs;
        }
    }

    pub fn set_player_state(&self, player_state: PlayerState) {
        if let Some(media) = self.state.lock().media.as_mut() {
            media.player_state = player_state;
        }
    }

    /// Media session vanished without any event (receiver app restarted).
    pub fn drop_media(&self) {
        self.state.lock().media = None;
    }

    pub fn media(&self) -> Option<MediaStatus> {
        self.state.lock().media.clone()
    }

    /// Ends the current session and pushes the matching MEDIA_STATUS.
    pub fn finish(&self, reason: IdleReason) {
        let (event, sink) = {
            let mut state = self.state.lock();
            let Some(media) = state.media.as_mut() else {
                return;
            };
            media.player_state = PlayerState::Idle;
            media.idle_reason = Some(reason);
            (media.clone(), state.sink.clone())
        };
        if let Some(sink) = sink {
            sink.push_media_status(event);
        }
    }

    pub fn push(&self, status: MediaStatus) {
        let sink = self.state.lock().sink.clone();
        if let Some(sink) = sink {
            sink.push_media_status(status);
        }
    }
}

pub fn running_app(app_id: &str, display_name: &str) -> RunningApp {
    RunningApp {
        app_id: app_id.to_string(),
        display_name: display_name.to_string(),
        session_id: format!("session-{}", app_id),
        transport_id: format!("transport-{}", app_id),
        status_text: String::new(),
    }
}

impl DeviceClient for FakeDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn address(&self) -> SocketAddr {
        self.address
    }

    fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    fn connect(&self) -> DeviceResult<()> {
        self.reachable()?;
        self.state.lock().connected = true;
        self.record(Call::Connect);
        Ok(())
    }

    fn disconnect(&self) {
        self.state.lock().connected = false;
        self.record(Call::Disconnect);
    }

    fn status(&self) -> DeviceResult<DeviceStatus> {
        self.reachable()?;
        Ok(DeviceStatus {
            running_app: self.state.lock().running_app.clone(),
        })
    }

    fn media_status(&self) -> DeviceResult<Option<MediaStatus>> {
        self.reachable()?;
        Ok(self.state.lock().media.clone())
    }

    fn load(&self, request: &LoadRequest) -> DeviceResult<Option<MediaStatus>> {
        self.reachable()?;
        self.record(Call::Load(request.content_id.clone()));
        let mut state = self.state.lock();
        let session = state.next_session;
        state.next_session += 1;
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
        self.reachable()?;
        self.record(Call::Play);
        self.set_player_state(PlayerState::Playing);
        Ok(())
    }

    fn pause(&self) -> DeviceResult<()> {
        self.reachable()?;
        self.record(Call::Pause);
        self.set_player_state(PlayerState::Paused);
        Ok(())
    }

    fn seek(&self, position_secs: f64) -> DeviceResult<()> {
        self.reachable()?;
        self.record(Call::Seek(position_secs));
        self.set_position(position_secs);
        Ok(())
    }

    fn launch_app(&self, app_id: &str) -> DeviceResult<()> {
        self.reachable()?;
        self.record(Call::Launch(app_id.to_string()));
        let mut state = self.state.lock();
        state.running_app = Some(running_app(app_id, "Default Media Receiver"));
        state.media = None;
        Ok(())
    }

    fn stop_app(&self) -> DeviceResult<()> {
        self.reachable()?;
        self.record(Call::StopApp);
        let mut state = self.state.lock();
        state.running_app = None;
        state.media = None;
        Ok(())
    }

    fn subscribe(&self, sink: EventSink) {
        self.state.lock().sink = Some(sink);
    }
}

/// Hands out pre-built fake devices by address.
pub struct FakeConnector {
    devices: Vec<Arc<FakeDevice>>,
}

impl FakeConnector {
    pub fn new(devices: Vec<Arc<FakeDevice>>) -> Self {
        Self { devices }
    }
}

impl DeviceConnector for FakeConnector {
    fn open(&self, candidate: &DeviceCandidate) -> Arc<dyn DeviceClient> {
        let device = self
            .devices
            .iter()
            .find(|d| d.address == candidate.address)
            .cloned()
            .unwrap_or_else(|| FakeDevice::new(&candidate.name, &candidate.address.to_string()));
        device
    }
}

/// Discovery producer that only counts what it is asked to do.
#[derive(Default)]
pub struct CountingProducer {
    pub stops: AtomicUsize,
    pub restarts: AtomicUsize,
}

impl CountingProducer {
    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn restarts(&self) -> usize {
        self.restarts.load(Ordering::SeqCst)
    }
}

impl DiscoveryControl for CountingProducer {
    fn name(&self) -> &str {
        "counting"
    }

    fn stop(&self) -> anyhow::Result<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn restart(&self) -> anyhow::Result<()> {
        self.restarts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn candidate(name: &str, address: &str) -> DeviceCandidate {
    DeviceCandidate {
        name: name.to_string(),
        address: address.parse().unwrap(),
        model: Some("Chromecast Audio".to_string()),
        uuid: None,
    }
}

pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub session: Arc<SessionManager>,
    pub device: Arc<FakeDevice>,
    pub producer: Arc<CountingProducer>,
    pub reconciler: Reconciler,
    pub handle: ReconcilerHandle,
}

impl Harness {
    /// A loop bound to one fake device named "Kitchen speaker".
    pub fn bound() -> Self {
        let harness = Self::unbound();
        assert!(
            harness
                .session
                .offer(candidate("Kitchen speaker", "10.0.0.7:8009"), DiscoverySource::Manual)
        );
        harness
    }

    pub fn unbound() -> Self {
        let clock = Arc::new(ManualClock::new());
        let device = FakeDevice::new("Kitchen speaker", "10.0.0.7:8009");
        let (sink, events) = channel(DEFAULT_EVENT_CAPACITY);
        let connector = Arc::new(FakeConnector::new(vec![device.clone()]));
        let session = Arc::new(SessionManager::new("kitchen", connector, sink.clone()));
        let producer = Arc::new(CountingProducer::default());
        session.add_producer(producer.clone());

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
            device,
            producer,
            reconciler,
            handle,
        }
    }

    pub fn step(&mut self) {
        self.reconciler.step().unwrap();
    }

    /// Advances the clock then runs one pass.
    pub fn tick(&mut self, secs: u64) {
        self.clock.advance(std::time::Duration::from_secs(secs));
        self.step();
    }

    pub fn play(&self, uri: &str) {
        self.handle
            .set_target_playing(MediaDescriptor::new(uri, ""));
    }
}
