//! Documents `LastChange` évènementiels d'AVTransport et RenderingControl

use xmltree::{Element, EmitterConfig, XMLNode};

use crate::translator::{AvTransport, format_actions};

pub const AVT_EVENT_NS: &str = "urn:schemas-upnp-org:metadata-1-0/AVT/";
pub const RCS_EVENT_NS: &str = "urn:schemas-upnp-org:metadata-1-0/RCS/";

/// Construit un document `<Event><InstanceID val="0">…</InstanceID></Event>`.
///
/// Chaque entrée devient `<Nom val="…"/>`, avec un attribut `channel` si fourni.
pub fn build_last_change(namespace: &str, entries: &[(&str, String, Option<&str>)]) -> String {
    let mut instance = Element::new("InstanceID");
    instance
        .attributes
        .insert("val".to_string(), "0".to_string());

    for (name, value, channel) in entries {
        let mut var = Element::new(name);
        if let Some(channel) = channel {
            var.attributes
                .insert("channel".to_string(), channel.to_string());
        }
        var.attributes.insert("val".to_string(), value.clone());
        instance.children.push(XMLNode::Element(var));
    }

    let mut event = Element::new("Event");
    event
        .attributes
        .insert("xmlns".to_string(), namespace.to_string());
    event.children.push(XMLNode::Element(instance));

    let mut buf = Vec::new();
    let config = EmitterConfig::new()
        .write_document_declaration(false)
        .perform_indent(false);
    // L'écriture dans un Vec ne peut échouer que sur un nom invalide
    if event.write_with_config(&mut buf, config).is_err() {
        return String::new();
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// État AVTransport courant tel qu'il est évènementé
pub fn avtransport_last_change(transport: &dyn AvTransport) -> String {
    let info = transport.get_transport_info();
    let media = transport.get_media_info();
    let position = transport.get_position_info();
    let settings = transport.get_transport_settings();
    let actions = transport.get_current_transport_actions();

    build_last_change(
        AVT_EVENT_NS,
        &[
            ("TransportState", info.state.as_str().to_string(), None),
            ("TransportStatus", info.status.as_str().to_string(), None),
            ("TransportPlaySpeed", info.speed, None),
            ("CurrentPlayMode", settings.play_mode, None),
            ("PlaybackStorageMedium", media.play_medium, None),
            ("NumberOfTracks", media.nr_tracks.to_string(), None),
            ("CurrentTrack", position.track.to_string(), None),
            ("CurrentTrackDuration", position.track_duration, None),
            ("CurrentMediaDuration", media.media_duration, None),
            ("CurrentTrackURI", position.track_uri, None),
            ("CurrentTrackMetaData", position.track_metadata, None),
            ("AVTransportURI", media.current_uri, None),
            ("AVTransportURIMetaData", media.current_uri_metadata, None),
            ("CurrentTransportActions", format_actions(&actions), None),
        ],
    )
}

/// État RenderingControl: volume et mute fixes sur le canal Master
pub fn rendering_control_last_change(volume: u16, mute: bool) -> String {
    build_last_change(
        RCS_EVENT_NS,
        &[
            ("Volume", volume.to_string(), Some("Master")),
            ("Mute", if mute { "1" } else { "0" }.to_string(), Some("Master")),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rendering_control_document() {
        let xml = rendering_control_last_change(100, false);
        let root = Element::parse(xml.as_bytes()).unwrap();
        assert_eq!(root.name, "Event");
        let instance = root.get_child("InstanceID").unwrap();
        assert_eq!(instance.attributes.get("val").map(String::as_str), Some("0"));

        let volume = instance.get_child("Volume").unwrap();
        assert_eq!(volume.attributes.get("val").map(String::as_str), Some("100"));
        assert_eq!(
            volume.attributes.get("channel").map(String::as_str),
            Some("Master")
        );
        let mute = instance.get_child("Mute").unwrap();
        assert_eq!(mute.attributes.get("val").map(String::as_str), Some("0"));
    }

    #[test]
    fn test_values_are_attribute_escaped() {
        let xml = build_last_change(
            AVT_EVENT_NS,
            &[("AVTransportURIMetaData", "<DIDL-Lite a=\"b\"/>".to_string(), None)],
        );
        assert!(!xml.contains("<DIDL-Lite"));

        let root = Element::parse(xml.as_bytes()).unwrap();
        let meta = root
            .get_child("InstanceID")
            .and_then(|i| i.get_child("AVTransportURIMetaData"))
            .unwrap();
        assert_eq!(
            meta.attributes.get("val").map(String::as_str),
            Some("<DIDL-Lite a=\"b\"/>")
        );
    }
}
