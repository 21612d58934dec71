//! # casttranscode
//!
//! Passerelle de transcodage pour les appareils qui ne lisent pas la vidéo.
//!
//! Un serveur axum expose `GET /transcode?url=<source>` et renvoie la piste
//! audio de la source encodée en MP3 par `ffmpeg`. [`Transcoder`] réécrit les
//! descripteurs vidéo vers ce point d'entrée.
//!
//! ```ignore
//! let config = TranscodeConfig::new(iface, 8182);
//! let (transcoder, _server) = casttranscode::start(config).await?;
//! let translator = ProtocolTranslator::new(handle).with_transcoder(Arc::new(transcoder));
//! ```

pub mod errors;
pub mod ffmpeg;
pub mod gateway;
pub mod server;

pub use errors::TranscodeError;
pub use gateway::{Transcoder, transcode_required};
pub use server::{TranscodeConfig, TranscodeState, bind_from, router, start};

/// Type MIME de la sortie transcodée
pub const CONTENT_TYPE_MP3: &str = "audio/mp3";
