//! Goal Reconciliation Loop.
//!
//! The loop compares what the controller wants ([`TargetState`]) with what the
//! device last reported and issues at most one converging action per pass:
//!
//! 1. no device bound: nothing to do
//! 2. connect when the transport is down
//! 3. poll the receiver status, and the media status when our app owns the device
//! 4. merge pushed events, a matching end-of-session event clears the target
//! 5. decide: stop, load, pause, resume, seek, or record the position
//! 6. give up on the device when nothing succeeded for too long
//!
//! Protocol threads only talk to the loop through a [`ReconcilerHandle`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::device::{DeviceClient, DeviceHandle, DeviceStatus, MediaStatus, PlayerState};
use crate::errors::{DeviceError, DeviceResult};
use crate::events::{EventSink, LoopEvent};
use crate::media::MediaDescriptor;
use crate::session::SessionManager;
use crate::timestamped::Timestamped;

pub const DEFAULT_APP_ID: &str = "CC1AD845";

#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Receiver application launched to play media.
    pub app_id: String,
    /// Display names of foreign apps that may be stopped to make room.
    pub interruptible_apps: Vec<String>,
    pub poll_interval: Duration,
    pub give_up: Duration,
    pub min_restore_secs: f64,
    pub grace: Duration,
    pub stale: Duration,
    pub error_cooldown: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            app_id: DEFAULT_APP_ID.to_string(),
            interruptible_apps: vec!["Backdrop".to_string()],
            poll_interval: Duration::from_secs(1),
            give_up: Duration::from_secs(60),
            min_restore_secs: 1.0,
            grace: Duration::from_secs(5),
            stale: Duration::from_secs(10),
            error_cooldown: Duration::from_secs(10),
        }
    }
}

/// What the controller currently wants.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TargetState {
    pub media: Option<Arc<MediaDescriptor>>,
    pub paused: bool,
    pub pending_seek: Option<f64>,
}

impl TargetState {
    /// URI the device should be playing, `None` when blank or absent.
    pub fn media_uri(&self) -> Option<&str> {
        self.media
            .as_deref()
            .map(|m| m.media_uri().trim())
            .filter(|u| !u.is_empty())
    }
}

/// Target plus the recovery position, kept under one lock so a pass never
/// records a position for a target that was replaced meanwhile.
struct Intent {
    target: TargetState,
    recovery: Timestamped<f64>,
    generation: u64,
}

struct Shared {
    intent: Mutex<Intent>,
    observed: ArcSwap<Timestamped<MediaStatus>>,
    fault: Mutex<Option<DeviceError>>,
    stop: AtomicBool,
    session: Arc<SessionManager>,
    clock: Arc<dyn Clock>,
    sink: EventSink,
    stale: Duration,
}

impl Shared {
    fn snapshot(&self) -> (TargetState, u64) {
        let intent = self.intent.lock();
        (intent.target.clone(), intent.generation)
    }

    fn set_observed(&self, status: Option<MediaStatus>) {
        let now = self.clock.now();
        self.observed.store(Arc::new(Timestamped::at(status, now)));
    }

    fn recovery(&self) -> Timestamped<f64> {
        self.intent.lock().recovery.clone()
    }

    fn set_recovery(&self, generation: u64, position: f64) {
        let now = self.clock.now();
        let mut intent = self.intent.lock();
        if intent.generation == generation {
            intent.recovery = Timestamped::new(position, now);
        }
    }

    /// Clears the target if it is still the descriptor that was loaded.
    fn goal_reached(&self, loaded: Option<&Arc<MediaDescriptor>>) -> bool {
        let now = self.clock.now();
        let mut intent = self.intent.lock();
        let still_loaded = match (&intent.target.media, loaded) {
            (Some(current), Some(loaded)) => Arc::ptr_eq(current, loaded),
            _ => false,
        };
        if still_loaded {
            intent.target.media = None;
            intent.target.pending_seek = None;
            intent.recovery = Timestamped::new(0.0, now);
            intent.generation += 1;
        }
        still_loaded
    }

    fn clear_pending_seek(&self, served: f64) {
        let mut intent = self.intent.lock();
        if intent.target.pending_seek == Some(served) {
            intent.target.pending_seek = None;
        }
    }
}

/// Cloneable surface used by the protocol side.
#[derive(Clone)]
pub struct ReconcilerHandle {
    shared: Arc<Shared>,
}

impl ReconcilerHandle {
    pub fn set_target_playing(&self, media: MediaDescriptor) {
        let now = self.shared.clock.now();
        {
            let mut intent = self.shared.intent.lock();
            intent.recovery = Timestamped::missing(now);
            intent.target.media = Some(Arc::new(media));
            intent.target.paused = false;
            intent.target.pending_seek = None;
            intent.generation += 1;
        }
        self.shared.fault.lock().take();
        self.shared.sink.wake();
    }

    pub fn set_paused(&self) {
        self.shared.intent.lock().target.paused = true;
        self.shared.sink.wake();
    }

    pub fn set_resumed(&self) {
        self.shared.intent.lock().target.paused = false;
        self.shared.sink.wake();
    }

    pub fn set_stopped(&self) {
        let now = self.shared.clock.now();
        {
            let mut intent = self.shared.intent.lock();
            intent.target.media = None;
            intent.target.pending_seek = None;
            intent.recovery = Timestamped::missing(now);
            intent.generation += 1;
        }
        self.shared.sink.wake();
    }

    pub fn request_seek(&self, position_secs: f64) {
        self.shared.intent.lock().target.pending_seek = Some(position_secs.max(0.0));
        self.shared.sink.wake();
    }

    /// Last polled media status with its capture time.
    pub fn observed(&self) -> Arc<Timestamped<MediaStatus>> {
        self.shared.observed.load_full()
    }

    /// Last polled media status, `None` when absent or stale.
    pub fn current_status(&self) -> Option<MediaStatus> {
        let observed = self.observed();
        if observed.is_older_than(self.shared.clock.now(), self.shared.stale) {
            return None;
        }
        observed.value().cloned()
    }

    pub fn target(&self) -> TargetState {
        self.shared.intent.lock().target.clone()
    }

    pub fn is_paused(&self) -> bool {
        self.shared.intent.lock().target.paused
    }

    pub fn is_device_bound(&self) -> bool {
        self.shared.session.is_bound()
    }

    /// Last failure that needs the controller's attention.
    pub fn last_fault(&self) -> Option<DeviceError> {
        self.shared.fault.lock().clone()
    }

    pub fn shutdown(&self) {
        self.shared.stop.store(true, Ordering::Release);
        self.shared.sink.wake();
    }
}

pub struct Reconciler {
    shared: Arc<Shared>,
    events: Receiver<LoopEvent>,
    config: ReconcilerConfig,
    last_success: Instant,
    bound: Option<Arc<DeviceHandle>>,
    session_id: Option<i32>,
    loaded: Option<Arc<MediaDescriptor>>,
    pending: Vec<LoopEvent>,
}

impl Reconciler {
    pub fn new(
        session: Arc<SessionManager>,
        sink: EventSink,
        events: Receiver<LoopEvent>,
        clock: Arc<dyn Clock>,
        config: ReconcilerConfig,
    ) -> Self {
        let now = clock.now();
        let shared = Arc::new(Shared {
            intent: Mutex::new(Intent {
                target: TargetState::default(),
                recovery: Timestamped::missing(now),
                generation: 0,
            }),
            observed: ArcSwap::from_pointee(Timestamped::missing(now)),
            fault: Mutex::new(None),
            stop: AtomicBool::new(false),
            session,
            clock,
            sink,
            stale: config.stale,
        });
        Self {
            shared,
            events,
            config,
            last_success: now,
            bound: None,
            session_id: None,
            loaded: None,
            pending: Vec::new(),
        }
    }

    pub fn handle(&self) -> ReconcilerHandle {
        ReconcilerHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Session id of the last load, `None` when no valid session exists.
    pub fn session_id(&self) -> Option<i32> {
        self.session_id
    }

    pub fn recovery_position(&self) -> Option<f64> {
        self.shared.recovery().into_value()
    }

    pub fn spawn(self) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("reconciler".to_string())
            .spawn(move || self.run())
    }

    /// Runs until [`ReconcilerHandle::shutdown`] is called.
    pub fn run(mut self) {
        info!("Reconciliation loop started");
        while !self.shared.stop.load(Ordering::Acquire) {
            match self.events.recv_timeout(self.config.poll_interval) {
                Ok(event) => self.pending.push(event),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
            if self.shared.stop.load(Ordering::Acquire) {
                break;
            }
            if let Err(e) = self.step() {
                warn!("Unhandled error while reconciling device state: {}", e);
                self.shared.clock.sleep(self.config.error_cooldown);
            }
        }
        info!("Reconciliation loop stopped");
    }

    /// One pass. Connectivity failures are absorbed into the give-up accounting,
    /// anything else is returned to the caller.
    pub fn step(&mut self) -> DeviceResult<()> {
        let events = self.drain_events();

        let Some(handle) = self.shared.session.current() else {
            if self.bound.take().is_some() {
                self.forget_device();
            }
            self.mark_success();
            return Ok(());
        };

        if !self.bound.as_ref().is_some_and(|b| Arc::ptr_eq(b, &handle)) {
            self.forget_device();
            self.bound = Some(Arc::clone(&handle));
            self.mark_success();
        }

        let outcome = self.converge(&handle, events);
        self.check_give_up(&handle);
        match outcome {
            Err(e) if e.is_connectivity() => {
                info!("Device connection error: {}", e);
                Ok(())
            }
            other => other,
        }
    }

    fn drain_events(&mut self) -> Vec<LoopEvent> {
        let mut events = std::mem::take(&mut self.pending);
        events.extend(self.events.try_iter());
        events
    }

    fn forget_device(&mut self) {
        self.session_id = None;
        self.loaded = None;
        self.shared.set_observed(None);
    }

    fn mark_success(&mut self) {
        self.last_success = self.shared.clock.now();
    }

    fn check_give_up(&mut self, handle: &Arc<DeviceHandle>) {
        let since = self
            .shared
            .clock
            .now()
            .saturating_duration_since(self.last_success);
        if since > self.config.give_up && self.shared.session.abandon(handle) {
            info!(
                "Abandoned non-responsive device {} after {}s, re-discovering...",
                handle,
                since.as_secs()
            );
            self.bound = None;
            self.forget_device();
        }
    }

    fn converge(&mut self, handle: &Arc<DeviceHandle>, events: Vec<LoopEvent>) -> DeviceResult<()> {
        let (status, media) = match self.poll(handle) {
            Ok(polled) => polled,
            Err(e) => {
                // Unmerged events wait for the next successful poll.
                self.requeue(events);
                return Err(e);
            }
        };
        self.shared.set_observed(media.clone());

        self.merge_events(events);
        self.decide(handle.client(), &status, media.as_ref())
    }

    fn poll(&mut self, handle: &Arc<DeviceHandle>) -> DeviceResult<(DeviceStatus, Option<MediaStatus>)> {
        let client = handle.client();
        if !client.is_connected() {
            client.connect()?;
            info!("Connected to device {}.", handle);
            self.mark_success();
        }

        let status = client.status()?;
        self.mark_success();

        // A foreign app's media session is none of our business.
        let media = if status.is_running(&self.config.app_id) {
            client.media_status()?
        } else {
            None
        };
        Ok((status, media))
    }

    fn requeue(&mut self, mut events: Vec<LoopEvent>) {
        events.append(&mut self.pending);
        self.pending = events;
    }

    fn merge_events(&mut self, events: Vec<LoopEvent>) {
        for event in events {
            let LoopEvent::MediaStatus(pushed) = event else {
                continue;
            };
            let Some(session_id) = self.session_id else {
                continue;
            };
            if pushed.media_session_id != Some(session_id) {
                continue;
            }
            if let Some(reason) = pushed.idle_reason {
                info!("Session {} goal reached by idle reason: {:?}", session_id, reason);
                if !self.shared.goal_reached(self.loaded.as_ref()) {
                    debug!("Target changed since session {}, keeping it", session_id);
                }
                self.session_id = None;
                self.loaded = None;
            }
        }
    }

    fn decide(
        &mut self,
        client: &dyn DeviceClient,
        status: &DeviceStatus,
        media: Option<&MediaStatus>,
    ) -> DeviceResult<()> {
        let (target, generation) = self.shared.snapshot();
        let observed_url = media.and_then(MediaStatus::media_url);
        let player_state = media.map(|m| m.player_state);

        let (Some(target_media), Some(target_uri)) = (target.media.as_ref(), target.media_uri())
        else {
            if !status.is_running(&self.config.app_id) {
                return Ok(());
            }
            if matches!(
                player_state,
                Some(PlayerState::Buffering) | Some(PlayerState::Playing)
            ) {
                client.pause()?;
                self.mark_success();
                info!("Stopped.");
            }
            return Ok(());
        };

        if observed_url != Some(target_uri) {
            if target.paused {
                debug!("Target paused, deferring load of {}", target_uri);
                return Ok(());
            }
            let now = self.shared.clock.now();
            let recovery = self.shared.recovery();
            if self.session_id.is_some() && recovery.is_fresh(now, self.config.grace) {
                debug!(
                    "Session {:?} may still be ending, deferring reload",
                    self.session_id
                );
                return Ok(());
            }

            self.ensure_app(client, status)?;
            let after_load = client.load(&target_media.to_load_request())?;
            self.mark_success();

            let restore = recovery
                .value()
                .copied()
                .filter(|p| *p > self.config.min_restore_secs);
            if let Some(position) = restore {
                client.seek(position)?;
                info!("Restored position to {}s.", position);
            }

            self.session_id = after_load.as_ref().and_then(|s| s.media_session_id);
            self.loaded = Some(Arc::clone(target_media));
            self.shared.set_recovery(generation, restore.unwrap_or(0.0));
            if after_load.is_some() {
                self.shared.set_observed(after_load);
            }
            self.shared.fault.lock().take();
            info!("Loaded {} (session={:?}).", target_uri, self.session_id);
            return Ok(());
        }

        match (target.paused, player_state) {
            (true, Some(PlayerState::Playing)) => {
                client.pause()?;
                self.mark_success();
                info!("Paused.");
                return Ok(());
            }
            (false, Some(PlayerState::Paused)) => {
                client.play()?;
                self.mark_success();
                info!("Resumed.");
                return Ok(());
            }
            _ => {}
        }

        if let Some(position) = target.pending_seek {
            client.seek(position)?;
            self.mark_success();
            self.shared.clear_pending_seek(position);
            info!("Seeked to {}s.", position);
            return Ok(());
        }

        if let Some(media) = media {
            self.shared.set_recovery(generation, media.current_time);
        }
        Ok(())
    }

    /// Brings our app to the foreground, stopping an allow-listed foreign app if needed.
    fn ensure_app(&mut self, client: &dyn DeviceClient, status: &DeviceStatus) -> DeviceResult<()> {
        if status.is_running(&self.config.app_id) {
            return Ok(());
        }
        if let Some(app) = &status.running_app {
            let interruptible = self
                .config
                .interruptible_apps
                .iter()
                .any(|name| name.eq_ignore_ascii_case(&app.display_name));
            if !interruptible {
                let err = DeviceError::DeviceBusyWithForeignApp {
                    app_id: app.app_id.clone(),
                    display_name: app.display_name.clone(),
                };
                *self.shared.fault.lock() = Some(err.clone());
                return Err(err);
            }
            info!(
                "Interrupting running app: appId={}, name={}, status={}.",
                app.app_id, app.display_name, app.status_text
            );
            client.stop_app()?;
        }
        info!("Launching app {}...", self.config.app_id);
        client.launch_app(&self.config.app_id)?;
        self.mark_success();
        Ok(())
    }
}
