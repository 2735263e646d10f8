use anyhow::{Context, Result};
use feedback_session::{DEFAULT_PLACEHOLDER, Endpoints, ReconnectPolicy, SessionConfig};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

// =============================================================================
// Unified config (figment-deserialized from defaults / config.toml / env vars)
// =============================================================================
//
//   config.toml:     [session]
//                    submit_timeout_secs = 5
//
//   env var:         NEO_SESSION__SUBMIT_TIMEOUT_SECS=5   (double underscore = nesting)

/// Named configuration presets.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    /// host=127.0.0.1
    Local,
    /// host=0.0.0.0
    Server,
}

/// Top-level tunable configuration, deserialized by figment.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub profile: Option<Profile>,
    #[serde(default)]
    pub server: ServerFileConfig,
    #[serde(default)]
    pub session: SessionFileConfig,
    #[serde(default)]
    pub client: ClientFileConfig,
    #[serde(default)]
    pub feedback: FeedbackFileConfig,
}

/// Lives under `[server]` in config.toml.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerFileConfig {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerFileConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: default_port(),
        }
    }
}

/// Session tunables for the editor (lives under `[session]`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionFileConfig {
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_submit_timeout_secs")]
    pub submit_timeout_secs: u64,
    #[serde(default = "default_close_timeout_secs")]
    pub close_timeout_secs: u64,
    /// 0 disables reconnection.
    #[serde(default = "default_reconnect_attempts")]
    pub reconnect_attempts: u32,
    #[serde(default = "default_reconnect_initial_backoff_ms")]
    pub reconnect_initial_backoff_ms: u64,
    #[serde(default = "default_reconnect_max_backoff_ms")]
    pub reconnect_max_backoff_ms: u64,
    #[serde(default = "default_placeholder")]
    pub placeholder: String,
}

impl Default for SessionFileConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
            submit_timeout_secs: default_submit_timeout_secs(),
            close_timeout_secs: default_close_timeout_secs(),
            reconnect_attempts: default_reconnect_attempts(),
            reconnect_initial_backoff_ms: default_reconnect_initial_backoff_ms(),
            reconnect_max_backoff_ms: default_reconnect_max_backoff_ms(),
            placeholder: default_placeholder(),
        }
    }
}

/// Where `neo edit` connects (lives under `[client]`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClientFileConfig {
    #[serde(default = "default_server_url")]
    pub server_url: String,
}

impl Default for ClientFileConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
        }
    }
}

/// Feedback producer for `neo serve` (lives under `[feedback]`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FeedbackFileConfig {
    /// Upstream feedback service. Unset means acknowledge-only.
    #[serde(default)]
    pub upstream_url: Option<String>,
    #[serde(default = "default_upstream_timeout_secs")]
    pub upstream_timeout_secs: u64,
}

impl Default for FeedbackFileConfig {
    fn default() -> Self {
        Self {
            upstream_url: None,
            upstream_timeout_secs: default_upstream_timeout_secs(),
        }
    }
}

fn default_port() -> u16 {
    8000
}
fn default_connect_timeout_secs() -> u64 {
    10
}
fn default_submit_timeout_secs() -> u64 {
    30
}
fn default_close_timeout_secs() -> u64 {
    2
}
fn default_reconnect_attempts() -> u32 {
    3
}
fn default_reconnect_initial_backoff_ms() -> u64 {
    500
}
fn default_reconnect_max_backoff_ms() -> u64 {
    5000
}
fn default_placeholder() -> String {
    DEFAULT_PLACEHOLDER.to_string()
}
fn default_server_url() -> String {
    "http://127.0.0.1:8000".to_string()
}
fn default_upstream_timeout_secs() -> u64 {
    20
}

/// Build a figment that layers: defaults → profile defaults → config.toml → NEO_* env vars.
///
/// The CLI profile takes priority over the config file profile.
pub fn load_config(data_dir: &Path, cli_profile: Option<&Profile>) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    // Pass 1: peek at profile from config.toml/env
    let base = Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(data_dir.join("config.toml")))
        .merge(Env::prefixed("NEO_").split("__"));

    let profile: Option<Profile> = cli_profile
        .cloned()
        .or_else(|| base.extract_inner("profile").ok());

    // Pass 2: profile defaults between struct defaults and config.toml
    let profile_layer = profile_to_file_config(profile.as_ref());

    Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Serialized::defaults(profile_layer))
        .merge(Toml::file(data_dir.join("config.toml")))
        .merge(Env::prefixed("NEO_").split("__"))
}

fn profile_to_file_config(profile: Option<&Profile>) -> FileConfig {
    let host = match profile {
        Some(Profile::Local) => "127.0.0.1",
        Some(Profile::Server) => "0.0.0.0",
        None => return FileConfig::default(),
    };
    FileConfig {
        profile: profile.cloned(),
        server: ServerFileConfig {
            host: Some(host.to_string()),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Render the effective configuration as TOML.
pub fn render_toml(fc: &FileConfig) -> Result<String> {
    toml::to_string_pretty(fc).context("Failed to render configuration")
}

// =============================================================================
// Runtime config structs (derived from FileConfig)
// =============================================================================

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind: SocketAddr,
}

impl ServerConfig {
    pub fn from_file(fc: &ServerFileConfig) -> Result<Self> {
        let host = fc.host.as_deref().unwrap_or("127.0.0.1");
        let bind = format!("{}:{}", host, fc.port)
            .parse::<SocketAddr>()
            .with_context(|| format!("Invalid bind address {}:{}", host, fc.port))?;
        Ok(Self { bind })
    }
}

pub fn session_config_from_file(fc: &SessionFileConfig) -> SessionConfig {
    SessionConfig {
        connect_timeout: Duration::from_secs(fc.connect_timeout_secs),
        submit_timeout: Duration::from_secs(fc.submit_timeout_secs),
        close_timeout: Duration::from_secs(fc.close_timeout_secs),
        reconnect: ReconnectPolicy {
            max_attempts: fc.reconnect_attempts,
            initial_backoff: Duration::from_millis(fc.reconnect_initial_backoff_ms),
            max_backoff: Duration::from_millis(fc.reconnect_max_backoff_ms),
        },
        feedback_placeholder: fc.placeholder.clone(),
    }
}

pub fn endpoints_from_file(fc: &ClientFileConfig, override_url: Option<&str>) -> Endpoints {
    Endpoints::from_server_url(override_url.unwrap_or(&fc.server_url))
}

#[derive(Clone, Debug)]
pub struct FeedbackConfig {
    pub upstream_url: Option<String>,
    pub upstream_timeout: Duration,
}

impl FeedbackConfig {
    pub fn from_file(fc: &FeedbackFileConfig) -> Self {
        Self {
            upstream_url: fc
                .upstream_url
                .clone()
                .filter(|url| !url.trim().is_empty()),
            upstream_timeout: Duration::from_secs(fc.upstream_timeout_secs),
        }
    }
}

// =============================================================================
// Directory layout (not tunable via figment, derived from --data-dir)
// =============================================================================

#[derive(Clone, Debug)]
pub struct NeoConfig {
    pub data_dir: PathBuf,
}

impl NeoConfig {
    pub fn new(custom_dir: Option<PathBuf>) -> Result<Self> {
        let data_dir = match custom_dir {
            Some(dir) => dir,
            None => dirs::home_dir()
                .context("Could not find home directory")?
                .join(".neo-tutor"),
        };

        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {:?}", data_dir))?;

        info!("Data directory: {}", data_dir.display());
        Ok(Self { data_dir })
    }

    pub fn config_toml_path(&self) -> PathBuf {
        self.data_dir.join("config.toml")
    }
}
