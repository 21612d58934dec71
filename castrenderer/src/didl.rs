//! Lecture des métadonnées DIDL-Lite fournies avec `SetAVTransportURI`.
//!
//! Seul ce dont la lecture a besoin est extrait: titre, pochette, type MIME
//! et durée de la ressource retenue.

use castcontrol::ItemDetails;
use serde::Deserialize;
use tracing::debug;

use crate::errors::{AvResult, AvTransportError};
use crate::time::parse_time;

#[derive(Debug, Deserialize)]
struct DidlLite {
    #[serde(rename = "item", default)]
    items: Vec<DidlItem>,
}

#[derive(Debug, Deserialize)]
struct DidlItem {
    #[serde(rename = "dc:title", alias = "title", default)]
    title: Option<String>,

    #[serde(rename = "upnp:albumArtURI", alias = "albumArtURI", default)]
    album_art: Vec<TextNode>,

    #[serde(rename = "res", default)]
    resources: Vec<DidlResource>,
}

#[derive(Debug, Deserialize)]
struct TextNode {
    #[serde(rename = "$text", default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct DidlResource {
    #[serde(rename = "@protocolInfo", default)]
    protocol_info: String,

    #[serde(rename = "@duration", default)]
    duration: Option<String>,
}

impl DidlResource {
    /// Type MIME du 3e champ de `protocolInfo`, sans paramètres
    fn mime_type(&self) -> Option<&str> {
        let mime = self.protocol_info.split(':').nth(2)?;
        let mime = mime.split(';').next().unwrap_or(mime).trim();
        if mime.is_empty() || mime == "*" {
            None
        } else {
            Some(mime)
        }
    }

    fn is_audio(&self) -> bool {
        self.mime_type()
            .and_then(|m| m.split('/').next())
            .is_some_and(|t| t.eq_ignore_ascii_case("audio"))
    }
}

/// Extrait l'unique item d'une enveloppe DIDL-Lite.
///
/// Une chaîne vide ou sans item donne `None`; plus d'un item est refusé.
pub fn parse_item_details(metadata: &str) -> AvResult<Option<ItemDetails>> {
    let metadata = metadata.trim();
    if metadata.is_empty() {
        return Ok(None);
    }

    let didl: DidlLite = quick_xml::de::from_str(metadata)
        .map_err(|e| AvTransportError::InvalidArgs(format!("Invalid DIDL metadata: {}", e)))?;

    let mut items = didl.items;
    if items.len() > 1 {
        return Err(AvTransportError::InvalidArgs(format!(
            "DIDL metadata should contain only one item, found {}.",
            items.len()
        )));
    }
    let Some(item) = items.pop() else {
        return Ok(None);
    };

    let resource = item
        .resources
        .iter()
        .find(|r| r.is_audio())
        .or_else(|| item.resources.first());

    let details = ItemDetails {
        title: item
            .title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty()),
        art_uri: item
            .album_art
            .into_iter()
            .map(|a| a.text.trim().to_string())
            .find(|a| !a.is_empty()),
        content_type: resource.and_then(|r| r.mime_type()).map(str::to_string),
        duration_secs: resource
            .and_then(|r| r.duration.as_deref())
            .and_then(parse_time)
            .map(|d| d.round() as u64),
    };
    debug!(
        title = ?details.title,
        content_type = ?details.content_type,
        duration = ?details.duration_secs,
        "Parsed DIDL item"
    );
    Ok(Some(details))
}
