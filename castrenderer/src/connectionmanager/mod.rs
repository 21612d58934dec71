//! # Service ConnectionManager:1
//!
//! Une seule connexion implicite (ID 0) en entrée.

use async_trait::async_trait;
use castupnp::soap::error_codes;
use castupnp::{ServiceDescription, ServiceHandler, SoapAction, UpnpFault};

use crate::args::{invalid_action, outputs, required};

const SCPD: &str = include_str!("scpd.xml");

/// Formats acceptés en tant que Sink
pub const SINK_PROTOCOL_INFO: &str = "http-get:*:audio/*:*,http-get:*:video/*:*";

pub struct ConnectionManagerService {
    description: ServiceDescription,
}

impl ConnectionManagerService {
    pub fn new() -> Self {
        Self {
            description: ServiceDescription::standard("ConnectionManager", 1),
        }
    }
}

impl Default for ConnectionManagerService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ServiceHandler for ConnectionManagerService {
    fn description(&self) -> &ServiceDescription {
        &self.description
    }

    fn scpd(&self) -> &str {
        SCPD
    }

    async fn invoke(&self, action: &SoapAction) -> Result<Vec<(String, String)>, UpnpFault> {
        match action.name.as_str() {
            "GetProtocolInfo" => Ok(outputs([
                ("Source", String::new()),
                ("Sink", SINK_PROTOCOL_INFO.to_string()),
            ])),
            "GetCurrentConnectionIDs" => Ok(outputs([("ConnectionIDs", "0".to_string())])),
            "GetCurrentConnectionInfo" => {
                let id = required(action, "ConnectionID")?.trim();
                if id != "0" {
                    return Err(UpnpFault::new(
                        error_codes::INVALID_ARGS,
                        format!("Unknown connection {}", id),
                    ));
                }
                Ok(outputs([
                    ("RcsID", "0".to_string()),
                    ("AVTransportID", "0".to_string()),
                    ("ProtocolInfo", String::new()),
                    ("PeerConnectionManager", String::new()),
                    ("PeerConnectionID", "-1".to_string()),
                    ("Direction", "Input".to_string()),
                    ("Status", "OK".to_string()),
                ]))
            }
            _ => Err(invalid_action(action)),
        }
    }

    fn evented_state(&self) -> Vec<(String, String)> {
        outputs([
            ("SourceProtocolInfo", String::new()),
            ("SinkProtocolInfo", SINK_PROTOCOL_INFO.to_string()),
            ("CurrentConnectionIDs", "0".to_string()),
        ])
    }
}
