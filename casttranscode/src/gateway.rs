use std::net::SocketAddr;

use castcontrol::{MediaDescriptor, TranscodeGateway};
use tracing::warn;
use url::Url;

use crate::CONTENT_TYPE_MP3;

/// Seule la vidéo est transcodée
pub fn transcode_required(content_type: &str) -> bool {
    content_type
        .get(..5)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("video"))
}

/// Réécrit les descripteurs vidéo vers le serveur de transcodage
#[derive(Debug, Clone)]
pub struct Transcoder {
    external_http: String,
}

impl Transcoder {
    pub fn new(address: SocketAddr) -> Self {
        Self {
            external_http: format!("http://{}", address),
        }
    }

    pub fn external_http(&self) -> &str {
        &self.external_http
    }

    /// URL de transcodage pour `source`, paramètre encodé
    pub fn transcode_url(&self, source: &str) -> Option<String> {
        let endpoint = format!("{}/transcode", self.external_http);
        match Url::parse_with_params(&endpoint, [("url", source)]) {
            Ok(url) => Some(url.into()),
            Err(e) => {
                warn!("Cannot build transcode URL from {}: {}", endpoint, e);
                None
            }
        }
    }
}

impl TranscodeGateway for Transcoder {
    fn rewrite(&self, media: &MediaDescriptor) -> Option<MediaDescriptor> {
        if !transcode_required(media.content_type()) {
            return None;
        }
        let url = self.transcode_url(media.media_uri())?;
        Some(media.with_alt_media(url, CONTENT_TYPE_MP3))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use castcontrol::ItemDetails;

    fn descriptor(content_type: &str) -> MediaDescriptor {
        MediaDescriptor::from_item(
            "http://nas/v.mp4?a=1&b=2",
            "",
            Some(ItemDetails {
                title: Some("Clip".to_string()),
                content_type: Some(content_type.to_string()),
                ..Default::default()
            }),
        )
    }

    #[test]
    fn test_only_video_needs_transcoding() {
        assert!(transcode_required("video/mp4"));
        assert!(transcode_required("VIDEO/x-matroska"));
        assert!(!transcode_required("audio/flac"));
        assert!(!transcode_required("vid"));
        assert!(!transcode_required(""));
    }

    #[test]
    fn test_rewrite_video() {
        let transcoder = Transcoder::new("10.0.0.2:8182".parse().unwrap());
        let rewritten = transcoder.rewrite(&descriptor("video/mp4")).unwrap();

        assert_eq!(
            rewritten.media_uri(),
            "http://10.0.0.2:8182/transcode?url=http%3A%2F%2Fnas%2Fv.mp4%3Fa%3D1%26b%3D2"
        );
        assert_eq!(rewritten.content_type(), "audio/mp3");
        assert_eq!(rewritten.current_uri(), "http://nas/v.mp4?a=1&b=2");
        assert_eq!(rewritten.title(), "Clip");
    }

    #[test]
    fn test_audio_is_left_alone() {
        let transcoder = Transcoder::new("10.0.0.2:8182".parse().unwrap());
        assert!(transcoder.rewrite(&descriptor("audio/mpeg")).is_none());
    }
}
