//! Startup, wiring and shutdown of the bridge.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use castconfig::{Config, get_config, init_config};
use castcontrol::discovery::{MdnsDiscovery, UpnpCastDiscovery};
use castcontrol::events::{DEFAULT_EVENT_CAPACITY, channel};
use castcontrol::{
    ChromecastConnector, Reconciler, ReconcilerConfig, ReconcilerHandle, SessionManager,
    SystemClock,
};
use castrenderer::{
    AvTransport, ProtocolTranslator, default_friendly_name, media_renderer, renderer_description,
};
use castupnp::ssdp::SsdpServer;
use casttranscode::TranscodeConfig;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::cli::Cli;
use crate::logging::{LevelHandle, apply_level};
use crate::net;

const WAIT_STEP: Duration = Duration::from_secs(1);

fn server_header() -> String {
    format!(
        "{}/1.0 UPnP/1.0 castbridge/{}",
        std::env::consts::OS,
        env!("CARGO_PKG_VERSION")
    )
}

/// Loop settings from the `cast` and `reconciler` configuration sections.
pub fn reconciler_config(config: &Config) -> Result<ReconcilerConfig> {
    Ok(ReconcilerConfig {
        app_id: config.get_cast_app_id()?,
        interruptible_apps: config.get_interruptible_apps()?,
        poll_interval: config.get_poll_interval()?,
        give_up: config.get_give_up()?,
        min_restore_secs: config.get_min_restore_secs()? as f64,
        grace: config.get_grace()?,
        stale: config.get_stale()?,
        error_cooldown: config.get_error_cooldown()?,
    })
}

fn transcode_config(config: &Config, interface: IpAddr) -> Result<TranscodeConfig> {
    Ok(TranscodeConfig {
        interface,
        port: config.get_transcode_port()?,
        max_in_progress: usize::try_from(config.get_transcode_max_in_progress()?)
            .context("transcode.max_in_progress out of range")?,
        ffmpeg: config.get_ffmpeg_path()?,
    })
}

/// Runs the bridge until a shutdown signal, or until all `cli.paths` were played.
pub async fn run(cli: Cli, log_level: LevelHandle) -> Result<()> {
    let config = match cli.config.as_deref() {
        Some(dir) => init_config(dir).with_context(|| format!("Cannot load configuration from {}", dir))?,
        None => get_config(),
    };
    apply_level(&log_level, &config.get_log_min_level()?);

    let requested = cli.interface.clone().or_else(|| config.get_bind_interface());
    let interface = net::resolve_interface(requested.as_deref())?;

    // Device side: session, loop, discovery.
    let loop_config = reconciler_config(&config)?;
    let app_id = loop_config.app_id.clone();
    let connector = ChromecastConnector::new(&app_id, config.get_call_timeout()?);
    let (sink, events) = channel(DEFAULT_EVENT_CAPACITY);
    let session = Arc::new(SessionManager::new(
        &cli.chromecast,
        Arc::new(connector),
        sink.clone(),
    ));
    let guard = session.shutdown_guard(&app_id);

    let reconciler = Reconciler::new(
        Arc::clone(&session),
        sink,
        events,
        Arc::new(SystemClock),
        loop_config,
    );
    let handle = reconciler.handle();
    let loop_thread = reconciler.spawn().context("Cannot start the reconciliation loop")?;

    let mdns = MdnsDiscovery::new(Duration::from_secs(config.get_mdns_query_interval_secs()?));
    let mdns_switch = mdns.switch();
    mdns.spawn(Arc::clone(&session))
        .context("Cannot start mDNS discovery")?;
    let upnp = UpnpCastDiscovery::new(
        Duration::from_secs(config.get_upnp_search_interval_secs()?),
        config.get_chromecast_models()?,
    )
    .with_cast_port(config.get_cast_port()?);
    let upnp_switch = upnp.switch();
    let upnp_thread = upnp
        .spawn(Arc::clone(&session))
        .context("Cannot start UPnP discovery")?;
    info!("Watching for cast device {} ...", cli.chromecast);

    // Protocol side: translator, renderer, SSDP.
    let mut translator = ProtocolTranslator::new(handle.clone());
    if cli.audio_only {
        let (transcoder, _server) = casttranscode::start(transcode_config(&config, interface)?).await?;
        translator = translator.with_transcoder(Arc::new(transcoder));
    }
    let translator = Arc::new(translator);

    let friendly_name = cli
        .display_name
        .clone()
        .unwrap_or_else(|| default_friendly_name(&cli.chromecast, &net::hostname()));
    info!("Friendly name: {}", friendly_name);
    let description = renderer_description(&config, &cli.chromecast, &friendly_name)?;
    let device = Arc::new(media_renderer(description, translator.clone()));

    let http_addr = SocketAddr::new(interface, config.get_http_port());
    let listener = TcpListener::bind(http_addr)
        .await
        .with_context(|| format!("Cannot bind renderer HTTP server on {}", http_addr))?;
    let router = device.router();
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            error!("Renderer HTTP server stopped: {}", e);
        }
    });
    info!("✅ MediaRenderer ready at http://{}/device.xml", http_addr);

    let ssdp_interface = match interface {
        IpAddr::V4(v4) => v4,
        IpAddr::V6(_) => Ipv4Addr::UNSPECIFIED,
    };
    let mut ssdp = SsdpServer::new(ssdp_interface);
    ssdp.start().context("Cannot start SSDP server")?;
    ssdp.add_device(device.ssdp_device(
        &format!("http://{}/device.xml", http_addr),
        &server_header(),
    ));

    let publisher = device.spawn_event_publisher(Duration::from_secs(
        config.get_lastchange_interval_secs()?,
    ));

    let outcome = if cli.paths.is_empty() {
        shutdown_signal().await;
        Ok(())
    } else {
        tokio::select! {
            played = play_paths(&handle, translator.as_ref(), &cli.paths) => played,
            _ = shutdown_signal() => Ok(()),
        }
    };

    info!("Shutting down...");
    publisher.abort();
    // The mDNS browser only notices on its next response, it is not joined.
    mdns_switch.shutdown();
    upnp_switch.shutdown();
    handle.shutdown();
    let tidied = tokio::task::spawn_blocking(move || {
        if loop_thread.join().is_err() {
            warn!("Reconciliation loop panicked");
        }
        guard.tidy();
        if upnp_thread.join().is_err() {
            warn!("UPnP discovery panicked");
        }
    })
    .await;
    if let Err(e) = tidied {
        warn!("Shutdown tidy failed: {}", e);
    }
    drop(ssdp);
    outcome
}

/// Legacy single-shot mode: plays each URL in turn once a device is bound.
async fn play_paths(
    handle: &ReconcilerHandle,
    transport: &dyn AvTransport,
    paths: &[String],
) -> Result<()> {
    while !handle.is_device_bound() {
        tokio::time::sleep(WAIT_STEP).await;
    }

    for path in paths {
        info!("Playing {}", path);
        transport
            .set_av_transport_uri(path, "")
            .with_context(|| format!("Cannot play {}", path))?;
        transport.play("1")?;
        while handle.target().media.is_some() {
            tokio::time::sleep(WAIT_STEP).await;
        }
        info!("Finished {}", path);
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Cannot listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Cannot listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Ctrl+C received"),
        _ = terminate => info!("SIGTERM received"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconciler_config_from_yaml() {
        let config = Config::from_yaml_str(
            "cast:\n  interruptible_apps: [Backdrop, Spotify]\nreconciler:\n  poll_interval_ms: 250\n  give_up_secs: 30\n",
        )
        .unwrap();
        let loop_config = reconciler_config(&config).unwrap();
        assert_eq!(loop_config.app_id, "CC1AD845");
        assert_eq!(loop_config.interruptible_apps, ["Backdrop", "Spotify"]);
        assert_eq!(loop_config.poll_interval, Duration::from_millis(250));
        assert_eq!(loop_config.give_up, Duration::from_secs(30));
        assert_eq!(loop_config.stale, Duration::from_secs(10));
        assert_eq!(loop_config.min_restore_secs, 1.0);
    }

    #[test]
    fn test_transcode_config_defaults() {
        let config = Config::from_yaml_str("").unwrap();
        let interface: IpAddr = "10.0.0.2".parse().unwrap();
        let transcode = transcode_config(&config, interface).unwrap();
        assert_eq!(transcode.port, 8182);
        assert_eq!(transcode.max_in_progress, 3);
        assert_eq!(transcode.ffmpeg, "ffmpeg");
        assert_eq!(transcode.interface, interface);
    }
}
