use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

const DEFAULT_CONFIG_FILES: &[&str] = &[
    "relaycast.toml",
    "config/relaycast.toml",
    "crates/config/relaycast.toml",
    "../relaycast.toml",
    "../config/relaycast.toml",
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub hub: HubConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub address: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    /// Number of chat messages retained in memory.
    #[serde(default = "HubConfig::default_message_history")]
    pub message_history: usize,
}

impl HubConfig {
    const fn default_message_history() -> usize {
        100
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            message_history: Self::default_message_history(),
        }
    }
}

/// Load the application configuration by combining defaults, an optional
/// file, and environment overrides.
///
/// ```
/// use relaycast_config::load;
///
/// std::env::remove_var("RELAYCAST_CONFIG");
///
/// let config = load().expect("configuration should load with defaults");
/// assert!(!config.http.address.is_empty());
/// ```
pub fn load() -> anyhow::Result<AppConfig> {
    let defaults = AppConfig::default();

    let mut builder = config::Config::builder();
    builder = builder
        .set_default("http.address", defaults.http.address.clone())
        .unwrap()
        .set_default("http.port", i64::from(defaults.http.port))
        .unwrap()
        .set_default(
            "hub.message_history",
            i64::try_from(defaults.hub.message_history).unwrap_or(i64::MAX),
        )
        .unwrap();

    let mut config_file_attached = false;

    if let Ok(path) = std::env::var("RELAYCAST_CONFIG") {
        builder = builder.add_source(config::File::from(PathBuf::from(&path)));
        config_file_attached = true;
        debug!(path, "loading configuration via RELAYCAST_CONFIG");
    } else if let Ok(cwd) = std::env::current_dir() {
        let fallback = DEFAULT_CONFIG_FILES
            .iter()
            .map(|candidate| cwd.join(candidate))
            .find(|path| path.exists());

        if let Some(path) = fallback {
            debug!(path = %path.display(), "loading configuration file");
            builder = builder.add_source(config::File::from(path));
            config_file_attached = true;
        }
    }

    if !config_file_attached {
        debug!("no configuration file found, relying on defaults and environment overrides");
    }

    builder = builder.add_source(config::Environment::with_prefix("RELAYCAST").separator("__"));

    let cfg = builder.build().context("unable to build configuration")?;

    let mut config = cfg
        .try_deserialize::<AppConfig>()
        .context("invalid configuration")?;

    // hosting platforms commonly inject the listen port as PORT
    if let Ok(port) = std::env::var("PORT") {
        config.http.port = port
            .parse()
            .with_context(|| format!("PORT environment variable '{port}' is not a valid port"))?;
    }

    debug!(?config, "loaded relaycast configuration");
    Ok(config)
}
