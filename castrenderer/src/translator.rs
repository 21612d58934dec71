//! Protocol Translator: AVTransport actions over the reconciliation loop.
//!
//! Actions only mutate the loop's target state and return immediately.
//! Queries read the loop's target and observed state; nothing here waits
//! for the device.

use std::sync::Arc;

use castcontrol::{MediaDescriptor, PlayerState, ReconcilerHandle, TranscodeGateway};
use parking_lot::Mutex;
use tracing::{debug, info};
use url::Url;

use crate::didl::parse_item_details;
use crate::errors::{AvResult, AvTransportError};
use crate::time::{format_time, parse_time};

/// Value reported for RelCount/AbsCount, which we do not track.
pub const COUNT_NOT_IMPLEMENTED: i32 = i32::MAX;

pub const PLAY_MEDIUM_NETWORK: &str = "NETWORK";
pub const NOT_IMPLEMENTED: &str = "NOT_IMPLEMENTED";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Stopped,
    Playing,
    Transitioning,
    PausedPlayback,
    NoMediaPresent,
    Custom,
}

impl TransportState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportState::Stopped => "STOPPED",
            TransportState::Playing => "PLAYING",
            TransportState::Transitioning => "TRANSITIONING",
            TransportState::PausedPlayback => "PAUSED_PLAYBACK",
            TransportState::NoMediaPresent => "NO_MEDIA_PRESENT",
            TransportState::Custom => "CUSTOM",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportStatus {
    Ok,
    ErrorOccurred,
}

impl TransportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportStatus::Ok => "OK",
            TransportStatus::ErrorOccurred => "ERROR_OCCURRED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportAction {
    Play,
    Stop,
    Pause,
    Seek,
}

impl TransportAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportAction::Play => "Play",
            TransportAction::Stop => "Stop",
            TransportAction::Pause => "Pause",
            TransportAction::Seek => "Seek",
        }
    }
}

/// Joins actions the way `CurrentTransportActions` expects them.
pub fn format_actions(actions: &[TransportAction]) -> String {
    actions
        .iter()
        .map(TransportAction::as_str)
        .collect::<Vec<_>>()
        .join(",")
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransportInfo {
    pub state: TransportState,
    pub status: TransportStatus,
    pub speed: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PositionInfo {
    pub track: u32,
    pub track_duration: String,
    pub track_metadata: String,
    pub track_uri: String,
    pub rel_time: String,
    pub abs_time: String,
    pub rel_count: i32,
    pub abs_count: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MediaInfo {
    pub nr_tracks: u32,
    pub media_duration: String,
    pub current_uri: String,
    pub current_uri_metadata: String,
    pub next_uri: String,
    pub next_uri_metadata: String,
    pub play_medium: String,
    pub record_medium: String,
    pub write_status: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeviceCapabilities {
    pub play_media: String,
    pub rec_media: String,
    pub rec_quality_modes: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransportSettings {
    pub play_mode: String,
    pub rec_quality_mode: String,
}

/// The AVTransport action surface, one method per action.
///
/// Optional actions we do not support have accepting defaults.
pub trait AvTransport: Send + Sync {
    fn set_av_transport_uri(&self, uri: &str, metadata: &str) -> AvResult<()>;
    fn get_media_info(&self) -> MediaInfo;
    fn get_transport_info(&self) -> TransportInfo;
    fn get_position_info(&self) -> PositionInfo;
    fn get_current_transport_actions(&self) -> Vec<TransportAction>;
    fn play(&self, speed: &str) -> AvResult<()>;
    fn pause(&self) -> AvResult<()>;
    fn stop(&self) -> AvResult<()>;
    fn seek(&self, unit: &str, target: &str) -> AvResult<()>;

    fn get_device_capabilities(&self) -> DeviceCapabilities {
        DeviceCapabilities {
            play_media: PLAY_MEDIUM_NETWORK.to_string(),
            rec_media: NOT_IMPLEMENTED.to_string(),
            rec_quality_modes: NOT_IMPLEMENTED.to_string(),
        }
    }

    fn get_transport_settings(&self) -> TransportSettings {
        TransportSettings {
            play_mode: "NORMAL".to_string(),
            rec_quality_mode: NOT_IMPLEMENTED.to_string(),
        }
    }

    fn set_next_av_transport_uri(&self, uri: &str, _metadata: &str) -> AvResult<()> {
        debug!("Ignoring SetNextAVTransportURI({})", uri);
        Ok(())
    }

    fn record(&self) -> AvResult<()> {
        info!("Ignoring Record");
        Ok(())
    }

    fn next(&self) -> AvResult<()> {
        info!("Ignoring Next");
        Ok(())
    }

    fn previous(&self) -> AvResult<()> {
        info!("Ignoring Previous");
        Ok(())
    }

    fn set_play_mode(&self, mode: &str) -> AvResult<()> {
        info!("Ignoring SetPlayMode({})", mode);
        Ok(())
    }

    fn set_record_quality_mode(&self, mode: &str) -> AvResult<()> {
        info!("Ignoring SetRecordQualityMode({})", mode);
        Ok(())
    }
}

/// Validates a controller supplied media URI.
pub fn validate_uri(uri: &str) -> AvResult<Url> {
    let parsed = Url::parse(uri.trim()).map_err(|_| {
        AvTransportError::InvalidArgs("CurrentURI can not be null or malformed".to_string())
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(AvTransportError::InvalidArgs(format!(
            "Only HTTP and HTTPS: resource identifiers are supported, not '{}'.",
            other
        ))),
    }
}

pub struct ProtocolTranslator {
    handle: ReconcilerHandle,
    staged: Mutex<Option<MediaDescriptor>>,
    transcoder: Option<Arc<dyn TranscodeGateway>>,
}

impl ProtocolTranslator {
    pub fn new(handle: ReconcilerHandle) -> Self {
        Self {
            handle,
            staged: Mutex::new(None),
            transcoder: None,
        }
    }

    /// Applies `transcoder` to every item handed to the loop.
    pub fn with_transcoder(mut self, transcoder: Arc<dyn TranscodeGateway>) -> Self {
        self.transcoder = Some(transcoder);
        self
    }

    pub fn handle(&self) -> &ReconcilerHandle {
        &self.handle
    }

    pub fn staged(&self) -> Option<MediaDescriptor> {
        self.staged.lock().clone()
    }

    /// Staged item first, then the loop's target.
    fn current_media(&self) -> Option<MediaDescriptor> {
        self.staged()
            .or_else(|| self.handle.target().media.map(|m| (*m).clone()))
    }

    /// Position of the observed media, when it is the targeted one.
    fn observed_position(&self) -> (Option<f64>, Option<f64>) {
        let target = self.handle.target();
        match (self.handle.current_status(), target.media_uri()) {
            (Some(status), Some(uri)) if status.media_url() == Some(uri) => {
                (Some(status.current_time), status.duration)
            }
            _ => (None, None),
        }
    }

    fn prepare(&self, media: MediaDescriptor) -> MediaDescriptor {
        match &self.transcoder {
            Some(transcoder) => match transcoder.rewrite(&media) {
                Some(rewritten) => {
                    info!(
                        "Transcoding {} via {}",
                        media.current_uri(),
                        rewritten.media_uri()
                    );
                    rewritten
                }
                None => media,
            },
            None => media,
        }
    }
}

impl AvTransport for ProtocolTranslator {
    fn set_av_transport_uri(&self, uri: &str, metadata: &str) -> AvResult<()> {
        info!("SetAVTransportURI({}, [{}])", uri, metadata.len());
        validate_uri(uri)?;
        let item = parse_item_details(metadata)?;
        let media = MediaDescriptor::from_item(uri.trim(), metadata, item);
        *self.staged.lock() = Some(media);
        Ok(())
    }

    fn get_media_info(&self) -> MediaInfo {
        let media = self.current_media();
        let (_, observed_duration) = self.observed_position();
        let duration = media
            .as_ref()
            .and_then(|m| m.duration_secs().map(|d| d as f64))
            .or(observed_duration)
            .unwrap_or(0.0);

        MediaInfo {
            nr_tracks: u32::from(media.is_some()),
            media_duration: format_time(duration),
            current_uri: media
                .as_ref()
                .map(|m| m.current_uri().to_string())
                .unwrap_or_default(),
            current_uri_metadata: media
                .as_ref()
                .map(|m| m.current_uri_metadata().to_string())
                .unwrap_or_default(),
            next_uri: String::new(),
            next_uri_metadata: String::new(),
            play_medium: PLAY_MEDIUM_NETWORK.to_string(),
            record_medium: NOT_IMPLEMENTED.to_string(),
            write_status: NOT_IMPLEMENTED.to_string(),
        }
    }

    fn get_transport_info(&self) -> TransportInfo {
        let target = self.handle.target();
        let observed = self.handle.current_status();

        let state = match target.media_uri() {
            None if self.handle.is_device_bound() => TransportState::NoMediaPresent,
            None => TransportState::Custom,
            Some(uri) => {
                let observed_uri = observed.as_ref().and_then(|s| s.media_url());
                if observed_uri == Some(uri) {
                    match observed.as_ref().map(|s| s.player_state) {
                        Some(PlayerState::Buffering) => TransportState::Transitioning,
                        Some(PlayerState::Playing) => TransportState::Playing,
                        Some(PlayerState::Paused) => TransportState::PausedPlayback,
                        _ => TransportState::NoMediaPresent,
                    }
                } else if target.paused && observed_uri.is_none() {
                    // The receiver app timed out while we were paused.
                    TransportState::PausedPlayback
                } else {
                    TransportState::Transitioning
                }
            }
        };

        let status = if self.handle.last_fault().is_some() {
            TransportStatus::ErrorOccurred
        } else {
            TransportStatus::Ok
        };

        TransportInfo {
            state,
            status,
            speed: "1".to_string(),
        }
    }

    fn get_position_info(&self) -> PositionInfo {
        let media = self.current_media();
        let (position, observed_duration) = self.observed_position();
        let duration = media
            .as_ref()
            .and_then(|m| m.duration_secs().map(|d| d as f64))
            .or(observed_duration)
            .unwrap_or(0.0);
        let position = format_time(position.unwrap_or(0.0));

        PositionInfo {
            track: u32::from(media.is_some()),
            track_duration: format_time(duration),
            track_metadata: media
                .as_ref()
                .map(|m| m.current_uri_metadata().to_string())
                .unwrap_or_default(),
            track_uri: media
                .as_ref()
                .map(|m| m.current_uri().to_string())
                .unwrap_or_default(),
            rel_time: position.clone(),
            abs_time: position,
            rel_count: COUNT_NOT_IMPLEMENTED,
            abs_count: COUNT_NOT_IMPLEMENTED,
        }
    }

    fn get_current_transport_actions(&self) -> Vec<TransportAction> {
        let mut actions = Vec::new();
        if self.staged.lock().is_some() {
            actions.push(TransportAction::Play);
        }

        let observed = self.handle.current_status().map(|s| s.player_state);
        let extra: &[TransportAction] = match observed {
            Some(PlayerState::Playing) => &[TransportAction::Pause, TransportAction::Stop],
            Some(PlayerState::Paused) => &[TransportAction::Play, TransportAction::Stop],
            Some(PlayerState::Buffering) => &[TransportAction::Stop],
            _ => &[],
        };
        for action in extra {
            if !actions.contains(action) {
                actions.push(*action);
            }
        }
        actions
    }

    fn play(&self, speed: &str) -> AvResult<()> {
        info!("Play({})", speed);
        let staged = self.staged();
        match staged {
            Some(media) => {
                self.handle.set_target_playing(self.prepare(media.clone()));
                let mut stage = self.staged.lock();
                // A newer SetAVTransportURI may have landed during the handoff.
                if stage.as_ref() == Some(&media) {
                    *stage = None;
                }
                Ok(())
            }
            None if self.handle.target().media.is_some() => {
                self.handle.set_resumed();
                Ok(())
            }
            None => Err(AvTransportError::ActionFailed(
                "No media set, call SetAVTransportURI first.".to_string(),
            )),
        }
    }

    fn pause(&self) -> AvResult<()> {
        info!("Pause");
        self.handle.set_paused();
        Ok(())
    }

    fn stop(&self) -> AvResult<()> {
        info!("Stop");
        self.handle.set_stopped();
        Ok(())
    }

    fn seek(&self, unit: &str, target: &str) -> AvResult<()> {
        info!("Seek({}, {})", unit, target);
        if !unit.trim().eq_ignore_ascii_case("REL_TIME") {
            return Err(AvTransportError::InvalidArgs(format!(
                "Seek unit '{}' is not supported, only REL_TIME.",
                unit
            )));
        }
        let position = parse_time(target)
            .ok_or_else(|| AvTransportError::IllegalSeekTarget(target.to_string()))?;
        self.handle.request_seek(position);
        Ok(())
    }
}
