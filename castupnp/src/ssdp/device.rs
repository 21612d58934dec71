//! Représentation d'un device SSDP

/// Device SSDP avec ses métadonnées pour les annonces
#[derive(Debug, Clone)]
pub struct SsdpDevice {
    /// UUID du device (sans le préfixe "uuid:")
    pub uuid: String,

    /// Type du device (ex: "urn:schemas-upnp-org:device:MediaRenderer:1")
    pub device_type: String,

    /// URL de la description du device
    pub location: String,

    /// Identifiant du serveur (ex: "Linux/6.1 UPnP/1.0 castbridge/0.1")
    pub server: String,

    /// Types de notification annoncés: uuid, rootdevice, type du device, services
    notification_types: Vec<String>,
}

impl SsdpDevice {
    pub fn new(uuid: &str, device_type: &str, location: &str, server: &str) -> Self {
        let notification_types = vec![
            format!("uuid:{}", uuid),
            "upnp:rootdevice".to_string(),
            device_type.to_string(),
        ];

        Self {
            uuid: uuid.to_string(),
            device_type: device_type.to_string(),
            location: location.to_string(),
            server: server.to_string(),
            notification_types,
        }
    }

    /// Ajoute un type de notification (ex: pour un service)
    pub fn add_notification_type(&mut self, nt: &str) {
        if !self.notification_types.iter().any(|n| n == nt) {
            self.notification_types.push(nt.to_string());
        }
    }

    pub fn notification_types(&self) -> &[String] {
        &self.notification_types
    }

    /// Types à répondre pour un M-SEARCH de cible `st`
    pub fn matching_types(&self, st: &str) -> Vec<String> {
        if st == "ssdp:all" {
            self.notification_types.clone()
        } else {
            self.notification_types
                .iter()
                .filter(|nt| nt.eq_ignore_ascii_case(st))
                .cloned()
                .collect()
        }
    }
}
