//! Documents de description UPnP (device.xml)

use xmltree::{Element, XMLNode};

/// Namespace des descriptions de device
pub const DEVICE_NS: &str = "urn:schemas-upnp-org:device-1-0";

/// Description d'un service exposé par le device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescription {
    /// Nom court utilisé dans les routes (ex: "AVTransport")
    pub name: String,

    /// Type complet (ex: "urn:schemas-upnp-org:service:AVTransport:1")
    pub service_type: String,

    /// Identifiant (ex: "urn:upnp-org:serviceId:AVTransport")
    pub service_id: String,
}

impl ServiceDescription {
    /// Service standard `urn:schemas-upnp-org:service:<name>:<version>`
    pub fn standard(name: &str, version: u32) -> Self {
        Self {
            name: name.to_string(),
            service_type: format!("urn:schemas-upnp-org:service:{}:{}", name, version),
            service_id: format!("urn:upnp-org:serviceId:{}", name),
        }
    }

    pub fn scpd_route(&self) -> String {
        format!("/{}/desc.xml", self.name)
    }

    pub fn control_route(&self) -> String {
        format!("/{}/control", self.name)
    }

    pub fn event_route(&self) -> String {
        format!("/{}/event", self.name)
    }

    fn to_xml_element(&self) -> Element {
        let mut elem = Element::new("service");
        push_text(&mut elem, "serviceType", &self.service_type);
        push_text(&mut elem, "serviceId", &self.service_id);
        push_text(&mut elem, "SCPDURL", &self.scpd_route());
        push_text(&mut elem, "controlURL", &self.control_route());
        push_text(&mut elem, "eventSubURL", &self.event_route());
        elem
    }
}

/// Description du device racine
#[derive(Debug, Clone)]
pub struct DeviceDescription {
    pub device_type: String,
    pub friendly_name: String,
    pub manufacturer: String,
    pub model_name: String,
    pub model_description: String,
    pub model_number: String,

    /// UDN sans le préfixe "uuid:"
    pub udn: String,

    pub services: Vec<ServiceDescription>,
}

impl DeviceDescription {
    /// UDN tel qu'il apparaît dans la description et les annonces
    pub fn udn_urn(&self) -> String {
        format!("uuid:{}", self.udn)
    }

    fn to_xml_element(&self) -> Element {
        let mut device = Element::new("device");
        push_text(&mut device, "deviceType", &self.device_type);
        push_text(&mut device, "friendlyName", &self.friendly_name);
        push_text(&mut device, "manufacturer", &self.manufacturer);
        push_text(&mut device, "modelDescription", &self.model_description);
        push_text(&mut device, "modelName", &self.model_name);
        push_text(&mut device, "modelNumber", &self.model_number);
        push_text(&mut device, "UDN", &self.udn_urn());

        if !self.services.is_empty() {
            let mut service_list = Element::new("serviceList");
            for service in &self.services {
                service_list
                    .children
                    .push(XMLNode::Element(service.to_xml_element()));
            }
            device.children.push(XMLNode::Element(service_list));
        }
        device
    }

    /// Sérialise le document complet servi sur `/device.xml`
    pub fn to_xml(&self) -> Result<String, xmltree::Error> {
        let mut root = Element::new("root");
        root.attributes
            .insert("xmlns".to_string(), DEVICE_NS.to_string());

        let mut spec = Element::new("specVersion");
        push_text(&mut spec, "major", "1");
        push_text(&mut spec, "minor", "0");
        root.children.push(XMLNode::Element(spec));
        root.children
            .push(XMLNode::Element(self.to_xml_element()));

        let mut buf = Vec::new();
        let config = xmltree::EmitterConfig::new()
            .write_document_declaration(true)
            .perform_indent(true)
            .indent_string("  ");
        root.write_with_config(&mut buf, config)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

fn push_text(parent: &mut Element, name: &str, text: &str) {
    let mut elem = Element::new(name);
    elem.children.push(XMLNode::Text(text.to_string()));
    parent.children.push(XMLNode::Element(elem));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn description() -> DeviceDescription {
        DeviceDescription {
            device_type: "urn:schemas-upnp-org:device:MediaRenderer:1".to_string(),
            friendly_name: "castbridge \"Kitchen\" (host)".to_string(),
            manufacturer: "castbridge".to_string(),
            model_name: "castbridge".to_string(),
            model_description: "DLNA to Cast bridge".to_string(),
            model_number: "v1".to_string(),
            udn: "1234".to_string(),
            services: vec![ServiceDescription::standard("AVTransport", 1)],
        }
    }

    #[test]
    fn test_service_routes() {
        let svc = ServiceDescription::standard("RenderingControl", 1);
        assert_eq!(
            svc.service_type,
            "urn:schemas-upnp-org:service:RenderingControl:1"
        );
        assert_eq!(svc.service_id, "urn:upnp-org:serviceId:RenderingControl");
        assert_eq!(svc.scpd_route(), "/RenderingControl/desc.xml");
        assert_eq!(svc.control_route(), "/RenderingControl/control");
        assert_eq!(svc.event_route(), "/RenderingControl/event");
    }

    #[test]
    fn test_device_xml() {
        let xml = description().to_xml().unwrap();
        assert!(xml.contains(r#"xmlns="urn:schemas-upnp-org:device-1-0""#));
        assert!(xml.contains("<UDN>uuid:1234</UDN>"));
        assert!(xml.contains("<controlURL>/AVTransport/control</controlURL>"));
        assert!(xml.contains("<deviceType>urn:schemas-upnp-org:device:MediaRenderer:1</deviceType>"));
        assert!(xml.contains("<major>1</major>"));
    }
}
