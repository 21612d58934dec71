//! Playable item descriptors and the payload sent to the device on load.

use serde::Serialize;

pub const DEFAULT_TITLE: &str = "castbridge";
pub const DEFAULT_CONTENT_TYPE: &str = "audio/mpeg";

/// Details extracted from a controller's item metadata.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemDetails {
    pub title: Option<String>,
    pub art_uri: Option<String>,
    pub content_type: Option<String>,
    pub duration_secs: Option<u64>,
}

/// One playable item, immutable once built.
///
/// `current_uri` and `current_uri_metadata` are what the controller set and
/// what protocol queries report back. `media_uri` is what the device is
/// asked to load; it only differs after [`MediaDescriptor::with_alt_media`].
#[derive(Debug, Clone, PartialEq)]
pub struct MediaDescriptor {
    current_uri: String,
    current_uri_metadata: String,
    media_uri: String,
    title: String,
    art_uri: Option<String>,
    content_type: String,
    duration_secs: Option<u64>,
}

impl MediaDescriptor {
    pub fn new(uri: impl Into<String>, metadata: impl Into<String>) -> Self {
        Self::from_item(uri, metadata, None)
    }

    pub fn from_item(
        uri: impl Into<String>,
        metadata: impl Into<String>,
        item: Option<ItemDetails>,
    ) -> Self {
        let uri = uri.into();
        let item = item.unwrap_or_default();
        Self {
            media_uri: uri.clone(),
            current_uri: uri,
            current_uri_metadata: metadata.into(),
            title: item.title.unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            art_uri: item.art_uri,
            content_type: item
                .content_type
                .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
            duration_secs: item.duration_secs,
        }
    }

    /// Same item, served from another URL with another content type.
    pub fn with_alt_media(&self, url: impl Into<String>, content_type: impl Into<String>) -> Self {
        Self {
            media_uri: url.into(),
            content_type: content_type.into(),
            ..self.clone()
        }
    }

    pub fn current_uri(&self) -> &str {
        &self.current_uri
    }

    pub fn current_uri_metadata(&self) -> &str {
        &self.current_uri_metadata
    }

    pub fn media_uri(&self) -> &str {
        &self.media_uri
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn art_uri(&self) -> Option<&str> {
        self.art_uri.as_deref()
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn duration_secs(&self) -> Option<u64> {
        self.duration_secs
    }

    /// Builds the load payload. Duration is only sent when known and positive.
    pub fn to_load_request(&self) -> LoadRequest {
        LoadRequest {
            content_id: self.media_uri.clone(),
            content_type: self.content_type.clone(),
            stream_type: StreamKind::Buffered,
            duration: self.duration_secs.filter(|d| *d > 0).map(|d| d as f64),
            metadata: LoadMetadata {
                metadata_type: 0,
                title: self.title.clone(),
                images: self
                    .art_uri
                    .iter()
                    .map(|url| ImageRef { url: url.clone() })
                    .collect(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StreamKind {
    Buffered,
    Live,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageRef {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadMetadata {
    pub metadata_type: u8,
    pub title: String,
    pub images: Vec<ImageRef>,
}

/// `MediaInformation` sent with a LOAD request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadRequest {
    pub content_id: String,
    pub content_type: String,
    pub stream_type: StreamKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    pub metadata: LoadMetadata,
}

/// Rewrites a descriptor the device cannot play directly.
///
/// Returns `None` when the source can be played as is.
pub trait TranscodeGateway: Send + Sync {
    fn rewrite(&self, media: &MediaDescriptor) -> Option<MediaDescriptor>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_without_item() {
        let media = MediaDescriptor::new("http://nas/a.mp3", "");
        assert_eq!(media.title(), DEFAULT_TITLE);
        assert_eq!(media.content_type(), DEFAULT_CONTENT_TYPE);
        assert_eq!(media.media_uri(), "http://nas/a.mp3");
        assert_eq!(media.duration_secs(), None);
    }

    #[test]
    fn test_load_payload_shape() {
        let media = MediaDescriptor::from_item(
            "http://nas/a.flac",
            "<DIDL-Lite/>",
            Some(ItemDetails {
                title: Some("Song".into()),
                art_uri: Some("http://nas/a.jpg".into()),
                content_type: Some("audio/flac".into()),
                duration_secs: Some(215),
            }),
        );
        let payload = serde_json::to_value(media.to_load_request()).unwrap();
        assert_eq!(
            payload,
            json!({
                "contentId": "http://nas/a.flac",
                "contentType": "audio/flac",
                "streamType": "BUFFERED",
                "duration": 215.0,
                "metadata": {
                    "metadataType": 0,
                    "title": "Song",
                    "images": [{"url": "http://nas/a.jpg"}]
                }
            })
        );
    }

    #[test]
    fn test_zero_duration_is_omitted() {
        let media = MediaDescriptor::from_item(
            "http://nas/a.mp3",
            "",
            Some(ItemDetails {
                duration_secs: Some(0),
                ..Default::default()
            }),
        );
        let payload = serde_json::to_value(media.to_load_request()).unwrap();
        assert!(payload.get("duration").is_none());
        assert_eq!(payload["metadata"]["images"], json!([]));
    }

    #[test]
    fn test_alt_media_keeps_protocol_uri() {
        let media = MediaDescriptor::new("http://nas/v.mkv", "meta");
        let alt = media.with_alt_media("http://10.0.0.2:8182/transcode?url=x", "audio/mp3");
        assert_eq!(alt.current_uri(), "http://nas/v.mkv");
        assert_eq!(alt.current_uri_metadata(), "meta");
        assert_eq!(alt.media_uri(), "http://10.0.0.2:8182/transcode?url=x");
        assert_eq!(alt.content_type(), "audio/mp3");
        assert_eq!(alt.title(), media.title());
    }
}
