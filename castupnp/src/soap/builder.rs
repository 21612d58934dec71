//! Construction des réponses et des faults SOAP

use super::{SOAP_ENCODING, SOAP_ENVELOPE_NS, UPNP_CONTROL_NS};
use xmltree::{Element, XMLNode};

/// Erreur UPnP renvoyée dans le détail d'un SOAP Fault
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpnpFault {
    pub code: u16,
    pub description: String,
}

impl UpnpFault {
    pub fn new(code: u16, description: impl Into<String>) -> Self {
        Self {
            code,
            description: description.into(),
        }
    }

    /// Sérialise le fault complet (faultcode s:Client, faultstring UPnPError)
    pub fn to_xml(&self) -> Result<String, xmltree::Error> {
        build_soap_fault(
            "s:Client",
            "UPnPError",
            Some(&self.code.to_string()),
            Some(&self.description),
        )
    }
}

impl std::fmt::Display for UpnpFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "UPnP error {}: {}", self.code, self.description)
    }
}

fn text_element(name: &str, text: impl Into<String>) -> Element {
    let mut elem = Element::new(name);
    elem.children.push(XMLNode::Text(text.into()));
    elem
}

fn emit_envelope(body_child: Element) -> Result<String, xmltree::Error> {
    let mut body = Element::new("s:Body");
    body.children.push(XMLNode::Element(body_child));

    let mut envelope = Element::new("s:Envelope");
    envelope
        .attributes
        .insert("xmlns:s".to_string(), SOAP_ENVELOPE_NS.to_string());
    envelope
        .attributes
        .insert("s:encodingStyle".to_string(), SOAP_ENCODING.to_string());
    envelope.children.push(XMLNode::Element(body));

    let mut buf = Vec::new();
    let config = xmltree::EmitterConfig::new()
        .write_document_declaration(true)
        .perform_indent(true)
        .indent_string("  ");
    envelope.write_with_config(&mut buf, config)?;

    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Construit une réponse SOAP UPnP
///
/// Les valeurs sont échappées à la sérialisation, ce qui permet de renvoyer du
/// DIDL-Lite brut dans `CurrentURIMetaData`.
pub fn build_soap_response(
    service_urn: &str,
    action: &str,
    values: Vec<(String, String)>,
) -> Result<String, xmltree::Error> {
    let mut response = Element::new(&format!("u:{}Response", action));
    response
        .attributes
        .insert("xmlns:u".to_string(), service_urn.to_string());

    for (key, value) in values {
        response
            .children
            .push(XMLNode::Element(text_element(&key, value)));
    }

    emit_envelope(response)
}

/// Construit un SOAP Fault, avec un détail UPnPError si code et description sont fournis
pub fn build_soap_fault(
    fault_code: &str,
    fault_string: &str,
    upnp_error_code: Option<&str>,
    upnp_error_desc: Option<&str>,
) -> Result<String, xmltree::Error> {
    let mut fault = Element::new("s:Fault");
    fault
        .children
        .push(XMLNode::Element(text_element("faultcode", fault_code)));
    fault
        .children
        .push(XMLNode::Element(text_element("faultstring", fault_string)));

    if let (Some(code), Some(desc)) = (upnp_error_code, upnp_error_desc) {
        let mut upnp_error = Element::new("UPnPError");
        upnp_error
            .attributes
            .insert("xmlns".to_string(), UPNP_CONTROL_NS.to_string());
        upnp_error
            .children
            .push(XMLNode::Element(text_element("errorCode", code)));
        upnp_error
            .children
            .push(XMLNode::Element(text_element("errorDescription", desc)));

        let mut detail = Element::new("detail");
        detail.children.push(XMLNode::Element(upnp_error));
        fault.children.push(XMLNode::Element(detail));
    }

    emit_envelope(fault)
}
