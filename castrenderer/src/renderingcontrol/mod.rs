//! # Service RenderingControl:1
//!
//! Le volume reste géré par l'appareil cast: le service annonce un volume
//! fixe de 100 sans mute sur le canal Master et accepte les modifications
//! sans effet.

use async_trait::async_trait;
use castupnp::{ServiceDescription, ServiceHandler, SoapAction, UpnpFault};
use tracing::info;

use crate::args::{check_instance_id, invalid_action, outputs};
use crate::lastchange::rendering_control_last_change;

const SCPD: &str = include_str!("scpd.xml");

pub const FIXED_VOLUME: u16 = 100;
pub const MASTER_CHANNEL: &str = "Master";

pub struct RenderingControlService {
    description: ServiceDescription,
}

impl RenderingControlService {
    pub fn new() -> Self {
        Self {
            description: ServiceDescription::standard("RenderingControl", 1),
        }
    }
}

impl Default for RenderingControlService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ServiceHandler for RenderingControlService {
    fn description(&self) -> &ServiceDescription {
        &self.description
    }

    fn scpd(&self) -> &str {
        SCPD
    }

    async fn invoke(&self, action: &SoapAction) -> Result<Vec<(String, String)>, UpnpFault> {
        check_instance_id(action)?;
        let channel = action.arg("Channel").unwrap_or(MASTER_CHANNEL);

        match action.name.as_str() {
            "ListPresets" => Ok(outputs([(
                "CurrentPresetNameList",
                "FactoryDefaults".to_string(),
            )])),
            "SelectPreset" => Ok(Vec::new()),
            "GetMute" => Ok(outputs([("CurrentMute", "0".to_string())])),
            "GetVolume" => Ok(outputs([("CurrentVolume", FIXED_VOLUME.to_string())])),
            "SetMute" => {
                info!(
                    "Ignoring SetMute({}, {})",
                    channel,
                    action.arg("DesiredMute").unwrap_or("")
                );
                Ok(Vec::new())
            }
            "SetVolume" => {
                info!(
                    "Ignoring SetVolume({}, {})",
                    channel,
                    action.arg("DesiredVolume").unwrap_or("")
                );
                Ok(Vec::new())
            }
            _ => Err(invalid_action(action)),
        }
    }

    fn evented_state(&self) -> Vec<(String, String)> {
        vec![(
            "LastChange".to_string(),
            rendering_control_last_change(FIXED_VOLUME, false),
        )]
    }
}
