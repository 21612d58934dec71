use tracing::Level;
use tracing_subscriber::{
    EnvFilter, Registry, filter::LevelFilter, layer::SubscriberExt, reload,
    util::SubscriberInitExt,
};

pub type LevelHandle = reload::Handle<LevelFilter, Registry>;

/// Installs the global subscriber at INFO.
///
/// The level can be changed later through the returned handle, once the
/// configuration is known. `RUST_LOG`, when set, filters on top of it.
pub fn init_logging(ansi: bool) -> LevelHandle {
    let (filter, handle) = reload::Layer::new(LevelFilter::INFO);
    let env_filter = std::env::var("RUST_LOG")
        .ok()
        .and_then(|spec| EnvFilter::try_new(spec).ok());

    tracing_subscriber::registry()
        .with(filter)
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_ansi(ansi),
        )
        .init();

    handle
}

/// Applies `level` from the configuration, keeping the current one when unknown.
pub fn apply_level(handle: &LevelHandle, level: &str) {
    let Some(filter) = level_filter(level) else {
        tracing::warn!("Unknown log level '{}', keeping current level", level);
        return;
    };
    if let Err(e) = handle.reload(filter) {
        eprintln!("❌ Failed to reload log level filter: {}", e);
    }
}

fn level_filter(level: &str) -> Option<LevelFilter> {
    match level.trim().to_ascii_uppercase().as_str() {
        "OFF" => Some(LevelFilter::OFF),
        "ERROR" => Some(Level::ERROR.into()),
        "WARN" | "WARNING" => Some(Level::WARN.into()),
        "INFO" => Some(Level::INFO.into()),
        "DEBUG" => Some(Level::DEBUG.into()),
        "TRACE" => Some(Level::TRACE.into()),
        _ => None,
    }
}
