//! Définition du device MediaRenderer.

use std::sync::Arc;

use anyhow::Result;
use castconfig::Config;
use castupnp::{DeviceDescription, MEDIA_RENDERER_TYPE, ServiceHandler, UpnpDevice};

use crate::avtransport::AvTransportService;
use crate::connectionmanager::ConnectionManagerService;
use crate::renderingcontrol::RenderingControlService;
use crate::translator::AvTransport;

/// Type de device utilisé pour persister l'UDN dans la configuration
pub const UDN_DEVICE_TYPE: &str = "mediarenderer";

/// Nom affiché par défaut: `castbridge "<cible>" (<hôte>)`
pub fn default_friendly_name(target: &str, hostname: &str) -> String {
    format!("castbridge \"{}\" ({})", target, hostname)
}

/// Description du renderer à partir de la configuration.
///
/// L'UDN est lié au nom de l'appareil cible pour rester stable d'un
/// démarrage à l'autre.
pub fn renderer_description(
    config: &Config,
    target: &str,
    friendly_name: &str,
) -> Result<DeviceDescription> {
    Ok(DeviceDescription {
        device_type: MEDIA_RENDERER_TYPE.to_string(),
        friendly_name: friendly_name.to_string(),
        manufacturer: config.get_manufacturer()?,
        model_name: config.get_model_name()?,
        model_description: config.get_model_description()?,
        model_number: config.get_model_number()?,
        udn: config.get_device_udn(UDN_DEVICE_TYPE, target)?,
        services: Vec::new(),
    })
}

/// Device MediaRenderer et ses trois services
///
/// - **AVTransport:1** : aiguillé vers `transport`
/// - **RenderingControl:1** : volume fixe
/// - **ConnectionManager:1** : connexion unique
pub fn media_renderer(description: DeviceDescription, transport: Arc<dyn AvTransport>) -> UpnpDevice {
    let services: Vec<Arc<dyn ServiceHandler>> = vec![
        Arc::new(AvTransportService::new(transport)),
        Arc::new(RenderingControlService::new()),
        Arc::new(ConnectionManagerService::new()),
    ];
    UpnpDevice::new(description, services)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_friendly_name() {
        assert_eq!(
            default_friendly_name("Kitchen", "nas"),
            "castbridge \"Kitchen\" (nas)"
        );
    }

    #[test]
    fn test_description_from_config() {
        let config = Config::from_yaml_str("renderer:\n  model_number: v9\n").unwrap();
        let desc = renderer_description(&config, "Kitchen", "Kitchen bridge").unwrap();
        assert_eq!(desc.device_type, MEDIA_RENDERER_TYPE);
        assert_eq!(desc.friendly_name, "Kitchen bridge");
        assert_eq!(desc.model_number, "v9");
        assert_eq!(desc.manufacturer, "castbridge");
        assert_eq!(
            desc.udn,
            config.get_device_udn(UDN_DEVICE_TYPE, "Kitchen").unwrap()
        );
    }
}
