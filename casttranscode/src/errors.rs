use std::net::SocketAddr;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TranscodeError {
    #[error("Failed to bind transcode server on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("No free port for the transcode server from {0}")]
    NoFreePort(u16),

    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("ffmpeg {0} pipe unavailable")]
    MissingPipe(&'static str),
}
