//! Processus `ffmpeg` et sa sortie standard vue comme un flux.
//!
//! Le processus est supervisé par une tâche qui:
//! - attend sa fin et journalise les dernières lignes de stderr en cas d'échec
//! - le tue dès que le flux est abandonné (client parti)
//! - libère le créneau de concurrence à la fin

use std::collections::VecDeque;
use std::pin::Pin;
use std::process::Stdio;
use std::task::{Context, Poll};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, ReadBuf};
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::{OwnedSemaphorePermit, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::errors::TranscodeError;

/// Nombre de lignes de stderr conservées pour le diagnostic
pub const ERR_HISTORY_LINES: usize = 100;

/// Arguments passés à ffmpeg pour extraire l'audio de `url` en MP3 sur stdout
pub fn ffmpeg_args(url: &str) -> Vec<String> {
    [
        "-hide_banner",
        "-nostats",
        "-seekable",
        "1",
        "-fflags",
        "+genpts",
        "-threads",
        "0",
        "-i",
        url,
        "-vn",
        "-b:a",
        "320k",
        "-f",
        "mp3",
        "-",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Sortie standard d'un ffmpeg en cours.
///
/// Lâcher le flux arrête le processus.
pub struct FfmpegStream {
    stdout: ChildStdout,
    _cancel: oneshot::Sender<()>,
}

impl AsyncRead for FfmpegStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.stdout).poll_read(cx, buf)
    }
}

/// Lance `program` sur `url`. Le créneau `permit` est rendu quand le processus se termine.
pub fn spawn(
    program: &str,
    url: &str,
    permit: OwnedSemaphorePermit,
) -> Result<FfmpegStream, TranscodeError> {
    let args = ffmpeg_args(url);
    info!("cmd: {} {}", program, args.join(" "));

    let mut child = Command::new(program)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| TranscodeError::Spawn {
            program: program.to_string(),
            source,
        })?;

    let stdout = child
        .stdout
        .take()
        .ok_or(TranscodeError::MissingPipe("stdout"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or(TranscodeError::MissingPipe("stderr"))?;

    let tail = tokio::spawn(read_tail(stderr, ERR_HISTORY_LINES));
    let (cancel_tx, cancel_rx) = oneshot::channel();
    tokio::spawn(supervise(child, tail, cancel_rx, permit));

    Ok(FfmpegStream {
        stdout,
        _cancel: cancel_tx,
    })
}

/// Garde les `limit` dernières lignes lues
pub async fn read_tail<R>(reader: R, limit: usize) -> VecDeque<String>
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    let mut tail = VecDeque::with_capacity(limit);
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if tail.len() == limit {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            Ok(None) => break,
            Err(e) => {
                debug!("ffmpeg stderr closed: {}", e);
                break;
            }
        }
    }
    tail
}

async fn supervise(
    mut child: Child,
    tail: JoinHandle<VecDeque<String>>,
    mut cancel: oneshot::Receiver<()>,
    _permit: OwnedSemaphorePermit,
) {
    tokio::select! {
        biased;
        status = child.wait() => match status {
            Ok(status) if status.success() => info!("Transcode complete."),
            Ok(status) => {
                info!("ffmpeg result: {}", status);
                match tail.await {
                    Ok(lines) => {
                        for line in lines {
                            info!("ffmpeg: {}", line);
                        }
                    }
                    Err(e) => warn!("ffmpeg stderr reader failed: {}", e),
                }
            }
            Err(e) => warn!("Failed to wait for ffmpeg: {}", e),
        },
        _ = &mut cancel => {
            debug!("Client went away, stopping ffmpeg");
            if let Err(e) = child.kill().await {
                warn!("ffmpeg did not stop when requested: {}", e);
            }
        }
    }
}
