//! Serveur HTTP `/transcode`.

use std::io::ErrorKind;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    extract::{Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::io::ReaderStream;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::errors::TranscodeError;
use crate::ffmpeg;
use crate::gateway::Transcoder;
use crate::CONTENT_TYPE_MP3;

pub const DEFAULT_TRANSCODE_PORT: u16 = 8182;
pub const DEFAULT_MAX_IN_PROGRESS: usize = 3;

#[derive(Debug, Clone)]
pub struct TranscodeConfig {
    /// Adresse d'écoute, aussi annoncée aux appareils
    pub interface: IpAddr,
    /// Premier port essayé
    pub port: u16,
    pub max_in_progress: usize,
    pub ffmpeg: String,
}

impl TranscodeConfig {
    pub fn new(interface: IpAddr, port: u16) -> Self {
        Self {
            interface,
            port,
            max_in_progress: DEFAULT_MAX_IN_PROGRESS,
            ffmpeg: "ffmpeg".to_string(),
        }
    }
}

#[derive(Clone)]
pub struct TranscodeState {
    ffmpeg: Arc<str>,
    slots: Arc<Semaphore>,
}

impl TranscodeState {
    pub fn new(ffmpeg: &str, max_in_progress: usize) -> Self {
        Self {
            ffmpeg: Arc::from(ffmpeg),
            slots: Arc::new(Semaphore::new(max_in_progress)),
        }
    }

    /// Créneaux libres
    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }
}

#[derive(Debug, Deserialize)]
struct TranscodeQuery {
    url: Option<String>,
}

pub fn router(state: TranscodeState) -> Router {
    Router::new()
        .route("/transcode", get(transcode_handler))
        .with_state(state)
}

async fn transcode_handler(
    State(state): State<TranscodeState>,
    Query(query): Query<TranscodeQuery>,
) -> Response {
    let Some(raw) = query.url.as_deref().map(str::trim).filter(|u| !u.is_empty()) else {
        return (StatusCode::BAD_REQUEST, "Missing param: url.").into_response();
    };

    if Url::parse(raw).is_err() {
        return (StatusCode::BAD_REQUEST, "Malformed URL.").into_response();
    }

    let Ok(permit) = Arc::clone(&state.slots).try_acquire_owned() else {
        warn!("Rejected transcode as overloaded: {}", raw);
        return (StatusCode::SERVICE_UNAVAILABLE, "Overloaded.").into_response();
    };

    match ffmpeg::spawn(&state.ffmpeg, raw, permit) {
        Ok(stream) => (
            [(header::CONTENT_TYPE, CONTENT_TYPE_MP3)],
            Body::from_stream(ReaderStream::new(stream)),
        )
            .into_response(),
        Err(e) => {
            error!("Transcode failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Transcode failed.").into_response()
        }
    }
}

/// Écoute sur `ip`, en partant de `first_port` et en montant tant que le port est pris
pub async fn bind_from(ip: IpAddr, first_port: u16) -> Result<TcpListener, TranscodeError> {
    let mut port = first_port;
    loop {
        let addr = SocketAddr::new(ip, port);
        match TcpListener::bind(addr).await {
            Ok(listener) => return Ok(listener),
            Err(e) if e.kind() == ErrorKind::AddrInUse => {
                debug!("Port {} in use, trying next", port);
                port = port
                    .checked_add(1)
                    .ok_or(TranscodeError::NoFreePort(first_port))?;
            }
            Err(source) => return Err(TranscodeError::Bind { addr, source }),
        }
    }
}

/// Démarre le serveur et retourne la passerelle qui pointe dessus
pub async fn start(config: TranscodeConfig) -> Result<(Transcoder, JoinHandle<()>), TranscodeError> {
    let listener = bind_from(config.interface, config.port).await?;
    let addr = listener
        .local_addr()
        .map_err(|source| TranscodeError::Bind {
            addr: SocketAddr::new(config.interface, config.port),
            source,
        })?;

    let app = router(TranscodeState::new(&config.ffmpeg, config.max_in_progress));
    let transcoder = Transcoder::new(addr);
    info!("✅ Transcode server listening on {}", transcoder.external_http());

    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Transcode server stopped: {}", e);
        }
    });
    Ok((transcoder, server))
}
