//! Daemon configuration handling.
//!
//! Configuration is read from a TOML file. The file is looked up in order:
//! 1. the path in `$COMPANION_CONFIG`
//! 2. `companion.toml` in the platform config directory
//! 3. `config.toml` in the working directory
//!
//! A missing file yields the defaults. Adapter sections (`[feishu]`,
//! `[zitadel]`, `newapi.db_path`) are optional; without them the daemon runs
//! on in-memory stand-ins.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use companion_core::{Secret, WebhookRoute};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "COMPANION_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompanionConfig {
    /// Address to listen on. A leading `:` means all interfaces.
    pub listen_addr: String,

    /// Logging level, used when `RUST_LOG` is unset.
    pub log_level: String,

    pub newapi: NewApiConfig,

    pub feishu: Option<FeishuConfig>,

    pub zitadel: Option<ZitadelConfig>,

    pub http: HttpConfig,

    /// Path to the configuration file that was loaded.
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

/// Gateway settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NewApiConfig {
    /// The gateway's SQLite database.
    pub db_path: Option<PathBuf>,

    /// Notification routes.
    pub webhooks: Vec<WebhookRoute>,
}

/// Feishu app credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeishuConfig {
    pub app_id: String,

    pub app_secret: Secret,

    /// Token Feishu includes in event callbacks; checked when set.
    #[serde(default)]
    pub verification_token: Option<Secret>,

    #[serde(default = "default_feishu_base_url")]
    pub base_url: String,
}

/// ZITADEL instance settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZitadelConfig {
    /// Instance domain or base URL.
    pub domain: String,

    /// Personal access token of a service user with user-management rights.
    pub pat: Secret,

    /// ID of the Feishu identity provider configured in ZITADEL.
    #[serde(default)]
    pub feishu_idp_id: Option<String>,
}

/// Outbound HTTP settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
}

fn default_feishu_base_url() -> String {
    "https://open.feishu.cn".to_string()
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { timeout_secs: 10 }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for CompanionConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:1323".to_string(),
            log_level: "info".to_string(),
            newapi: NewApiConfig::default(),
            feishu: None,
            zitadel: None,
            http: HttpConfig::default(),
            config_path: None,
        }
    }
}

impl CompanionConfig {
    /// Parse the listen address, accepting the `:port` shorthand.
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let addr = if self.listen_addr.starts_with(':') {
            format!("0.0.0.0{}", self.listen_addr)
        } else {
            self.listen_addr.clone()
        };
        addr.parse()
            .with_context(|| format!("Invalid listen_addr {:?}", self.listen_addr))
    }

    /// Check values that would only fail later at runtime.
    pub fn validate(&self) -> Result<()> {
        self.socket_addr()?;

        if let Some(feishu) = &self.feishu {
            if feishu.app_id.is_empty() || feishu.app_secret.is_empty() {
                bail!("[feishu] requires app_id and app_secret");
            }
        }
        if let Some(zitadel) = &self.zitadel {
            if zitadel.domain.is_empty() || zitadel.pat.is_empty() {
                bail!("[zitadel] requires domain and pat");
            }
        }
        if self.http.timeout_secs == 0 {
            bail!("[http] timeout_secs must be positive");
        }
        Ok(())
    }
}

/// Load configuration from the first location that exists, or defaults.
pub fn load_config() -> Result<CompanionConfig> {
    if let Some(path) = std::env::var_os(CONFIG_ENV) {
        let path = PathBuf::from(path);
        if !path.exists() {
            bail!("{} points to missing file {:?}", CONFIG_ENV, path);
        }
        return load_config_from(&path);
    }

    let candidates = project_dirs()
        .map(|d| d.config_dir().join("companion.toml"))
        .into_iter()
        .chain(std::iter::once(PathBuf::from("config.toml")));

    for path in candidates {
        if path.exists() {
            return load_config_from(&path);
        }
    }

    Ok(CompanionConfig::default())
}

/// Load configuration from a specific file.
pub fn load_config_from(path: &Path) -> Result<CompanionConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config from {:?}", path))?;
    let mut config: CompanionConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config from {:?}", path))?;

    config.config_path = Some(path.to_path_buf());
    config.validate()?;

    Ok(config)
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "lakelink", "auth-companion")
}
