//! # castbridge configuration
//!
//! YAML configuration for the bridge:
//! - embedded default configuration merged with `config.yaml` from the config directory
//! - environment variable overrides (`CASTBRIDGE_CONFIG__SECTION__KEY=value`)
//! - typed getters and setters, persisted back to disk
//! - process-wide singleton
//!
//! ## Usage
//!
//! ```no_run
//! use castconfig::get_config;
//!
//! let config = get_config();
//! let port = config.get_http_port();
//! let give_up = config.get_give_up()?;
//! # Ok::<(), anyhow::Error>(())
//! ```

use anyhow::{Result, anyhow};
use dirs::home_dir;
use lazy_static::lazy_static;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use serde_yaml::{Mapping, Number, Value};
use std::{
    env, fs,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tracing::{info, warn};
use uuid::Uuid;

// Configuration par défaut intégrée
const DEFAULT_CONFIG: &str = include_str!("castbridge.yaml");

const ENV_CONFIG_DIR: &str = "CASTBRIDGE_CONFIG";
const ENV_PREFIX: &str = "CASTBRIDGE_CONFIG__";
const CONFIG_DIR_NAME: &str = ".castbridge";

const DEFAULT_HTTP_PORT: u16 = 8180;
const DEFAULT_LOG_MIN_LEVEL: &str = "INFO";
const DEFAULT_LOG_ENABLE_CONSOLE: bool = true;
const DEFAULT_CAST_APP_ID: &str = "CC1AD845";
const DEFAULT_CAST_PORT: u64 = 8009;
const DEFAULT_CALL_TIMEOUT_SECS: u64 = 10;
const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
const DEFAULT_GIVE_UP_SECS: u64 = 60;
const DEFAULT_MIN_RESTORE_SECS: u64 = 1;
const DEFAULT_GRACE_SECS: u64 = 5;
const DEFAULT_STALE_SECS: u64 = 10;
const DEFAULT_ERROR_COOLDOWN_SECS: u64 = 10;
const DEFAULT_UPNP_SEARCH_INTERVAL_SECS: u64 = 30;
const DEFAULT_MDNS_QUERY_INTERVAL_SECS: u64 = 15;
const DEFAULT_LASTCHANGE_INTERVAL_SECS: u64 = 5;
const DEFAULT_TRANSCODE_PORT: u64 = 8182;
const DEFAULT_TRANSCODE_MAX_IN_PROGRESS: u64 = 3;

lazy_static! {
    static ref CONFIG: OnceCell<Arc<Config>> = OnceCell::new();
}

/// Generates a getter/setter pair for an unsigned value with a default.
macro_rules! impl_u64_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> Result<u64> {
            match self.get_value($path)? {
                Value::Number(n) => Ok(n.as_u64().unwrap_or($default)),
                Value::String(s) => Ok(s.trim().parse::<u64>().unwrap_or($default)),
                _ => Ok($default),
            }
        }

        pub fn $setter(&self, value: u64) -> Result<()> {
            self.set_value($path, Value::Number(Number::from(value)))
        }
    };
}

/// Generates a getter/setter pair for a boolean value with a default.
macro_rules! impl_bool_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> Result<bool> {
            match self.get_value($path)? {
                Value::Bool(b) => Ok(b),
                _ => Ok($default),
            }
        }

        pub fn $setter(&self, value: bool) -> Result<()> {
            self.set_value($path, Value::Bool(value))
        }
    };
}

/// Generates a getter/setter pair for a string value with a default.
macro_rules! impl_string_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> Result<String> {
            match self.get_value($path)? {
                Value::String(s) => Ok(s),
                _ => Ok($default.to_string()),
            }
        }

        pub fn $setter(&self, value: String) -> Result<()> {
            self.set_value($path, Value::String(value))
        }
    };
}

/// Generates a getter/setter pair for a list of strings.
macro_rules! impl_string_list_config {
    ($getter:ident, $setter:ident, $path:expr) => {
        pub fn $getter(&self) -> Result<Vec<String>> {
            match self.get_value($path)? {
                Value::Sequence(seq) => Ok(seq
                    .into_iter()
                    .filter_map(|v| match v {
                        Value::String(s) => Some(s),
                        _ => None,
                    })
                    .collect()),
                Value::String(s) => Ok(s
                    .split(',')
                    .map(|part| part.trim().to_string())
                    .filter(|part| !part.is_empty())
                    .collect()),
                _ => Ok(Vec::new()),
            }
        }

        pub fn $setter(&self, values: Vec<String>) -> Result<()> {
            self.set_value(
                $path,
                Value::Sequence(values.into_iter().map(Value::String).collect()),
            )
        }
    };
}

/// Configuration manager for the bridge.
///
/// Holds the merged YAML tree. Every setter writes the tree back to
/// `config.yaml` when the configuration is file-backed.
#[derive(Debug)]
pub struct Config {
    config_dir: String,
    path: Option<PathBuf>,
    data: Mutex<Value>,
}

impl Clone for Config {
    fn clone(&self) -> Self {
        Self {
            config_dir: self.config_dir.clone(),
            path: self.path.clone(),
            data: Mutex::new(self.data.lock().clone()),
        }
    }
}

impl Config {
    fn find_config_dir(directory: &str) -> String {
        if !directory.is_empty() {
            return directory.to_string();
        }

        if let Ok(env_path) = env::var(ENV_CONFIG_DIR) {
            info!(env_var = ENV_CONFIG_DIR, path = %env_path, "Trying to load config from env");
            return env_path;
        }

        if Path::new(CONFIG_DIR_NAME).exists() {
            return CONFIG_DIR_NAME.to_string();
        }

        if let Some(home) = home_dir() {
            let home_config = home.join(CONFIG_DIR_NAME);
            if home_config.exists() {
                return home_config.to_string_lossy().to_string();
            }
        }

        CONFIG_DIR_NAME.to_string()
    }

    fn validate_config_dir(path: &Path) -> Result<()> {
        if !path.exists() {
            fs::create_dir_all(path)?;
        }

        if !path.is_dir() {
            return Err(anyhow!("{} is not a directory", path.display()));
        }

        let test_file = path.join(".write_test");
        fs::write(&test_file, b"test")?;
        fs::remove_file(&test_file)?;

        fs::read_dir(path)?;
        Ok(())
    }

    /// Loads the configuration from `directory` (or the default search path when empty).
    ///
    /// The directory is searched in this order: the `directory` argument,
    /// the `CASTBRIDGE_CONFIG` environment variable, `./.castbridge`,
    /// `~/.castbridge`. It is created when missing.
    pub fn load_config(directory: &str) -> Result<Self> {
        let config_dir = Self::find_config_dir(directory);
        Self::validate_config_dir(Path::new(&config_dir))?;
        info!(config_dir = %config_dir, "Using config directory");

        let path = Path::new(&config_dir).join("config.yaml");

        let mut merged = Self::lower_keys_value(serde_yaml::from_str(DEFAULT_CONFIG)?);
        match fs::read(&path) {
            Ok(data) => {
                info!(config_file = %path.display(), "Loaded config file");
                let external = Self::lower_keys_value(serde_yaml::from_slice(&data)?);
                merge_yaml(&mut merged, &external);
            }
            Err(_) => {
                info!(config_file = %path.display(), "Config file not found, using embedded defaults");
            }
        }

        let mut value = merged;
        Self::apply_env_overrides(&mut value);

        let config = Config {
            config_dir,
            path: Some(path),
            data: Mutex::new(value),
        };
        config.save()?;
        Ok(config)
    }

    /// Builds an in-memory configuration from the embedded defaults plus `overlay`.
    ///
    /// Nothing is written to disk.
    pub fn from_yaml_str(overlay: &str) -> Result<Self> {
        let mut merged = Self::lower_keys_value(serde_yaml::from_str(DEFAULT_CONFIG)?);
        if !overlay.trim().is_empty() {
            let external = Self::lower_keys_value(serde_yaml::from_str(overlay)?);
            merge_yaml(&mut merged, &external);
        }
        Ok(Config {
            config_dir: String::new(),
            path: None,
            data: Mutex::new(merged),
        })
    }

    pub fn config_dir(&self) -> &str {
        &self.config_dir
    }

    /// Writes the current tree to `config.yaml` (no-op for in-memory configs).
    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let yaml = serde_yaml::to_string(&*self.data.lock())?;
        fs::write(path, yaml)?;
        Ok(())
    }

    /// Sets the value at `path` (e.g. `&["host", "http_port"]`) and saves.
    pub fn set_value(&self, path: &[&str], value: Value) -> Result<()> {
        {
            let mut data = self.data.lock();
            Self::set_value_internal(&mut data, path, value)?;
        }
        self.save()
    }

    fn set_value_internal(data: &mut Value, path: &[&str], value: Value) -> Result<()> {
        if path.is_empty() {
            *data = value;
            return Ok(());
        }
        if let Value::Mapping(map) = data {
            let key_value = Value::String(path[0].to_lowercase());
            if path.len() == 1 {
                map.insert(key_value, value);
            } else {
                let entry = map
                    .entry(key_value)
                    .or_insert(Value::Mapping(Mapping::new()));
                Self::set_value_internal(entry, &path[1..], value)?;
            }
            Ok(())
        } else {
            Err(anyhow!("Current node is not a map"))
        }
    }

    /// Gets the value at `path`, or an error when the path does not exist.
    pub fn get_value(&self, path: &[&str]) -> Result<Value> {
        let data = self.data.lock();
        Self::get_value_internal(&data, path)
    }

    fn get_value_internal(data: &Value, path: &[&str]) -> Result<Value> {
        let mut current = data;
        for (i, key) in path.iter().enumerate() {
            if let Value::Mapping(map) = current {
                match map.get(Value::String(key.to_lowercase())) {
                    Some(next) => current = next,
                    None => return Err(anyhow!("Path {} does not exist", path[..=i].join("."))),
                }
            } else {
                return Err(anyhow!("Path {} is not a mapping", path[..i].join(".")));
            }
        }
        Ok(current.clone())
    }

    fn apply_env_overrides(config: &mut Value) {
        for (key, value) in env::vars() {
            if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                let key_path = stripped.split("__").collect::<Vec<_>>();
                let yaml_value = Self::convert_env_value(&value);
                if let Err(e) = Self::set_value_internal(config, &key_path, yaml_value) {
                    warn!(env_var = %key, "Ignoring config override: {}", e);
                }
            }
        }
    }

    fn convert_env_value(value: &str) -> Value {
        serde_yaml::from_str::<Value>(value).unwrap_or_else(|_| Value::String(value.to_string()))
    }

    fn lower_keys_value(value: Value) -> Value {
        match value {
            Value::Mapping(map) => {
                let mut new_map = Mapping::new();
                for (k, v) in map {
                    let key = match k {
                        Value::String(s) => Value::String(s.to_lowercase()),
                        other => other,
                    };
                    new_map.insert(key, Self::lower_keys_value(v));
                }
                Value::Mapping(new_map)
            }
            Value::Sequence(seq) => {
                Value::Sequence(seq.into_iter().map(Self::lower_keys_value).collect())
            }
            _ => value,
        }
    }

    /// Renderer HTTP port, falling back to 8180 when missing or invalid.
    pub fn get_http_port(&self) -> u16 {
        match self.get_value(&["host", "http_port"]) {
            Ok(Value::Number(n)) => n
                .as_u64()
                .and_then(|p| u16::try_from(p).ok())
                .unwrap_or(DEFAULT_HTTP_PORT),
            Ok(Value::String(s)) => s.trim().parse::<u16>().unwrap_or_else(|_| {
                warn!("Invalid HTTP port '{}', using default {}", s, DEFAULT_HTTP_PORT);
                DEFAULT_HTTP_PORT
            }),
            Ok(_) | Err(_) => DEFAULT_HTTP_PORT,
        }
    }

    pub fn set_http_port(&self, port: u16) -> Result<()> {
        self.set_value(&["host", "http_port"], Value::Number(Number::from(port)))
    }

    /// Interface address the servers bind to, `None` to pick one automatically.
    pub fn get_bind_interface(&self) -> Option<String> {
        match self.get_value(&["host", "bind_interface"]) {
            Ok(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
            _ => None,
        }
    }

    /// Gets the UDN for a device, generating and persisting one on first use.
    pub fn get_device_udn(&self, devtype: &str, name: &str) -> Result<String> {
        let path = &["devices", devtype, name, "udn"];
        match self.get_value(path) {
            Ok(Value::String(udn)) => {
                let udn = udn.trim();
                Ok(udn.strip_prefix("uuid:").unwrap_or(udn).to_string())
            }
            _ => {
                let new_udn = Uuid::new_v4().to_string();
                self.set_value(path, Value::String(new_udn.clone()))?;
                Ok(new_udn)
            }
        }
    }

    pub fn set_device_udn(&self, devtype: &str, name: &str, udn: String) -> Result<()> {
        let udn = udn.trim();
        let sanitized = udn.strip_prefix("uuid:").unwrap_or(udn).to_string();
        self.set_value(&["devices", devtype, name, "udn"], Value::String(sanitized))
    }

    impl_string_config!(
        get_log_min_level,
        set_log_min_level,
        &["host", "logger", "min_level"],
        DEFAULT_LOG_MIN_LEVEL
    );

    impl_bool_config!(
        get_log_enable_console,
        set_log_enable_console,
        &["host", "logger", "enable_console"],
        DEFAULT_LOG_ENABLE_CONSOLE
    );

    impl_string_config!(
        get_cast_app_id,
        set_cast_app_id,
        &["cast", "app_id"],
        DEFAULT_CAST_APP_ID
    );

    impl_u64_config!(
        get_cast_port_raw,
        set_cast_port,
        &["cast", "port"],
        DEFAULT_CAST_PORT
    );

    impl_u64_config!(
        get_call_timeout_secs,
        set_call_timeout_secs,
        &["cast", "call_timeout_secs"],
        DEFAULT_CALL_TIMEOUT_SECS
    );

    impl_string_list_config!(
        get_interruptible_apps,
        set_interruptible_apps,
        &["cast", "interruptible_apps"]
    );

    impl_u64_config!(
        get_poll_interval_ms,
        set_poll_interval_ms,
        &["reconciler", "poll_interval_ms"],
        DEFAULT_POLL_INTERVAL_MS
    );

    impl_u64_config!(
        get_give_up_secs,
        set_give_up_secs,
        &["reconciler", "give_up_secs"],
        DEFAULT_GIVE_UP_SECS
    );

    impl_u64_config!(
        get_min_restore_secs,
        set_min_restore_secs,
        &["reconciler", "min_restore_secs"],
        DEFAULT_MIN_RESTORE_SECS
    );

    impl_u64_config!(
        get_grace_secs,
        set_grace_secs,
        &["reconciler", "grace_secs"],
        DEFAULT_GRACE_SECS
    );

    impl_u64_config!(
        get_stale_secs,
        set_stale_secs,
        &["reconciler", "stale_secs"],
        DEFAULT_STALE_SECS
    );

    impl_u64_config!(
        get_error_cooldown_secs,
        set_error_cooldown_secs,
        &["reconciler", "error_cooldown_secs"],
        DEFAULT_ERROR_COOLDOWN_SECS
    );

    impl_u64_config!(
        get_upnp_search_interval_secs,
        set_upnp_search_interval_secs,
        &["discovery", "upnp_search_interval_secs"],
        DEFAULT_UPNP_SEARCH_INTERVAL_SECS
    );

    impl_u64_config!(
        get_mdns_query_interval_secs,
        set_mdns_query_interval_secs,
        &["discovery", "mdns_query_interval_secs"],
        DEFAULT_MDNS_QUERY_INTERVAL_SECS
    );

    impl_string_list_config!(
        get_chromecast_models,
        set_chromecast_models,
        &["discovery", "chromecast_models"]
    );

    impl_u64_config!(
        get_lastchange_interval_secs,
        set_lastchange_interval_secs,
        &["renderer", "lastchange_interval_secs"],
        DEFAULT_LASTCHANGE_INTERVAL_SECS
    );

    impl_string_config!(
        get_manufacturer,
        set_manufacturer,
        &["renderer", "manufacturer"],
        "castbridge"
    );

    impl_string_config!(
        get_model_name,
        set_model_name,
        &["renderer", "model_name"],
        "castbridge"
    );

    impl_string_config!(
        get_model_description,
        set_model_description,
        &["renderer", "model_description"],
        "DLNA to Cast bridge"
    );

    impl_string_config!(
        get_model_number,
        set_model_number,
        &["renderer", "model_number"],
        "v1"
    );

    impl_u64_config!(
        get_transcode_port_raw,
        set_transcode_port,
        &["transcode", "port"],
        DEFAULT_TRANSCODE_PORT
    );

    impl_u64_config!(
        get_transcode_max_in_progress,
        set_transcode_max_in_progress,
        &["transcode", "max_in_progress"],
        DEFAULT_TRANSCODE_MAX_IN_PROGRESS
    );

    impl_string_config!(
        get_ffmpeg_path,
        set_ffmpeg_path,
        &["transcode", "ffmpeg"],
        "ffmpeg"
    );

    pub fn get_cast_port(&self) -> Result<u16> {
        let raw = self.get_cast_port_raw()?;
        u16::try_from(raw).map_err(|_| anyhow!("cast.port out of range: {}", raw))
    }

    pub fn get_transcode_port(&self) -> Result<u16> {
        let raw = self.get_transcode_port_raw()?;
        u16::try_from(raw).map_err(|_| anyhow!("transcode.port out of range: {}", raw))
    }

    pub fn get_call_timeout(&self) -> Result<Duration> {
        Ok(Duration::from_secs(self.get_call_timeout_secs()?))
    }

    pub fn get_poll_interval(&self) -> Result<Duration> {
        Ok(Duration::from_millis(self.get_poll_interval_ms()?))
    }

    pub fn get_give_up(&self) -> Result<Duration> {
        Ok(Duration::from_secs(self.get_give_up_secs()?))
    }

    pub fn get_grace(&self) -> Result<Duration> {
        Ok(Duration::from_secs(self.get_grace_secs()?))
    }

    pub fn get_stale(&self) -> Result<Duration> {
        Ok(Duration::from_secs(self.get_stale_secs()?))
    }

    pub fn get_error_cooldown(&self) -> Result<Duration> {
        Ok(Duration::from_secs(self.get_error_cooldown_secs()?))
    }
}

/// Loads the global configuration from `directory` once.
///
/// Later calls return the already loaded configuration.
pub fn init_config(directory: &str) -> Result<Arc<Config>> {
    CONFIG
        .get_or_try_init(|| Config::load_config(directory).map(Arc::new))
        .cloned()
}

/// Returns the global configuration, loading it from the default location on first use.
///
/// When the config directory cannot be used the embedded defaults are served from memory.
pub fn get_config() -> Arc<Config> {
    CONFIG
        .get_or_init(|| match Config::load_config("") {
            Ok(config) => Arc::new(config),
            Err(e) => {
                warn!("Failed to load configuration ({}), using embedded defaults", e);
                match Config::from_yaml_str("") {
                    Ok(config) => Arc::new(config),
                    Err(_) => Arc::new(Config {
                        config_dir: String::new(),
                        path: None,
                        data: Mutex::new(Value::Mapping(Mapping::new())),
                    }),
                }
            }
        })
        .clone()
}

/// Recursively merges `external` into `default`.
///
/// Mappings are merged key by key; scalars and sequences are replaced.
fn merge_yaml(default: &mut Value, external: &Value) {
    match (default, external) {
        (Value::Mapping(dmap), Value::Mapping(emap)) => {
            for (k, v) in emap {
                match dmap.get_mut(k) {
                    Some(dv) => merge_yaml(dv, v),
                    None => {
                        dmap.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        (d, e) => *d = e.clone(),
    }
}
