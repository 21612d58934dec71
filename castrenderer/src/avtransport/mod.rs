//! # Service AVTransport:1
//!
//! Aiguillage des actions SOAP vers un [`AvTransport`]. Le service expose la
//! seule variable évènementielle `LastChange`, recalculée à chaque
//! publication à partir de l'état du traducteur.
//!
//! Actions supportées:
//! - SetAVTransportURI, Play, Pause, Stop, Seek (REL_TIME)
//! - GetMediaInfo, GetTransportInfo, GetPositionInfo
//! - GetDeviceCapabilities, GetTransportSettings, GetCurrentTransportActions
//!
//! SetNextAVTransportURI, Record, Next, Previous, SetPlayMode et
//! SetRecordQualityMode sont acceptées sans effet.

use std::sync::Arc;

use async_trait::async_trait;
use castupnp::{ServiceDescription, ServiceHandler, SoapAction, UpnpFault};

use crate::args::{check_instance_id, invalid_action, outputs, required};
use crate::lastchange::avtransport_last_change;
use crate::translator::{AvTransport, format_actions};

const SCPD: &str = include_str!("scpd.xml");

pub struct AvTransportService {
    description: ServiceDescription,
    transport: Arc<dyn AvTransport>,
}

impl AvTransportService {
    pub fn new(transport: Arc<dyn AvTransport>) -> Self {
        Self {
            description: ServiceDescription::standard("AVTransport", 1),
            transport,
        }
    }
}

#[async_trait]
impl ServiceHandler for AvTransportService {
    fn description(&self) -> &ServiceDescription {
        &self.description
    }

    fn scpd(&self) -> &str {
        SCPD
    }

    async fn invoke(&self, action: &SoapAction) -> Result<Vec<(String, String)>, UpnpFault> {
        check_instance_id(action)?;
        let t = &self.transport;

        match action.name.as_str() {
            "SetAVTransportURI" => {
                let uri = required(action, "CurrentURI")?;
                let metadata = action.arg("CurrentURIMetaData").unwrap_or("");
                t.set_av_transport_uri(uri, metadata)?;
                Ok(Vec::new())
            }
            "SetNextAVTransportURI" => {
                let uri = action.arg("NextURI").unwrap_or("");
                let metadata = action.arg("NextURIMetaData").unwrap_or("");
                t.set_next_av_transport_uri(uri, metadata)?;
                Ok(Vec::new())
            }
            "GetMediaInfo" => {
                let info = t.get_media_info();
                Ok(outputs([
                    ("NrTracks", info.nr_tracks.to_string()),
                    ("MediaDuration", info.media_duration),
                    ("CurrentURI", info.current_uri),
                    ("CurrentURIMetaData", info.current_uri_metadata),
                    ("NextURI", info.next_uri),
                    ("NextURIMetaData", info.next_uri_metadata),
                    ("PlayMedium", info.play_medium),
                    ("RecordMedium", info.record_medium),
                    ("WriteStatus", info.write_status),
                ]))
            }
            "GetTransportInfo" => {
                let info = t.get_transport_info();
                Ok(outputs([
                    ("CurrentTransportState", info.state.as_str().to_string()),
                    ("CurrentTransportStatus", info.status.as_str().to_string()),
                    ("CurrentSpeed", info.speed),
                ]))
            }
            "GetPositionInfo" => {
                let info = t.get_position_info();
                Ok(outputs([
                    ("Track", info.track.to_string()),
                    ("TrackDuration", info.track_duration),
                    ("TrackMetaData", info.track_metadata),
                    ("TrackURI", info.track_uri),
                    ("RelTime", info.rel_time),
                    ("AbsTime", info.abs_time),
                    ("RelCount", info.rel_count.to_string()),
                    ("AbsCount", info.abs_count.to_string()),
                ]))
            }
            "GetDeviceCapabilities" => {
                let caps = t.get_device_capabilities();
                Ok(outputs([
                    ("PlayMedia", caps.play_media),
                    ("RecMedia", caps.rec_media),
                    ("RecQualityModes", caps.rec_quality_modes),
                ]))
            }
            "GetTransportSettings" => {
                let settings = t.get_transport_settings();
                Ok(outputs([
                    ("PlayMode", settings.play_mode),
                    ("RecQualityMode", settings.rec_quality_mode),
                ]))
            }
            "GetCurrentTransportActions" => Ok(outputs([(
                "Actions",
                format_actions(&t.get_current_transport_actions()),
            )])),
            "Play" => {
                t.play(action.arg("Speed").unwrap_or("1"))?;
                Ok(Vec::new())
            }
            "Pause" => {
                t.pause()?;
                Ok(Vec::new())
            }
            "Stop" => {
                t.stop()?;
                Ok(Vec::new())
            }
            "Seek" => {
                let unit = required(action, "Unit")?;
                let target = required(action, "Target")?;
                t.seek(unit, target)?;
                Ok(Vec::new())
            }
            "Record" => {
                t.record()?;
                Ok(Vec::new())
            }
            "Next" => {
                t.next()?;
                Ok(Vec::new())
            }
            "Previous" => {
                t.previous()?;
                Ok(Vec::new())
            }
            "SetPlayMode" => {
                t.set_play_mode(action.arg("NewPlayMode").unwrap_or(""))?;
                Ok(Vec::new())
            }
            "SetRecordQualityMode" => {
                t.set_record_quality_mode(action.arg("NewRecordQualityMode").unwrap_or(""))?;
                Ok(Vec::new())
            }
            _ => Err(invalid_action(action)),
        }
    }

    fn evented_state(&self) -> Vec<(String, String)> {
        vec![(
            "LastChange".to_string(),
            avtransport_last_change(self.transport.as_ref()),
        )]
    }
}
