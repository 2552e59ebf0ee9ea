use std::{
    collections::HashMap,
    env, fmt,
    path::{Path, PathBuf},
    time::Duration,
};

use log::debug;
use serde::Deserialize;
use thiserror::Error;

use crate::exchange_rate::Origin;

pub const DEFAULT_API_URL: &str = "https://api.hacienda.go.cr/indicadores/tc";
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_LOG_DIR: &str = "logs";

pub const SETTINGS_FILE: &str = "config.ini";
pub const ENV_FILE: &str = ".env";

const REQUIRED_KEYS: [&str; 4] = ["DB_SERVER", "DB_NAME", "DB_USER", "DB_PASSWORD"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("MissingField: required configuration values are not set: {}", .0.join(", "))]
    MissingField(Vec<String>),

    #[error("FileNotFound: configuration file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("invalid settings file: {0}")]
    Settings(#[from] config::ConfigError),

    #[error("invalid environment file {}: {source}", path.display())]
    EnvFile {
        path: PathBuf,
        #[source]
        source: dotenvy::Error,
    },
}

/// Auxiliary settings read from `config.ini`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    #[serde(alias = "General")]
    pub general: GeneralSettings,
    #[serde(alias = "Api")]
    pub api: ApiSettings,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    pub log_path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    pub url: Option<String>,
    pub timeout_secs: Option<u64>,
}

impl Settings {
    pub fn log_dir(&self) -> PathBuf {
        self.general
            .log_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_DIR))
    }
}

/// Everything a single run needs, resolved once at start-up.
#[derive(Clone)]
pub struct RunConfig {
    pub server: String,
    pub database: String,
    pub username: String,
    pub password: String,
    pub trust_server_certificate: bool,
    pub origin: Origin,
    pub api_url: String,
    pub timeout: Duration,
}

impl fmt::Debug for RunConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunConfig")
            .field("server", &self.server)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"***")
            .field("trust_server_certificate", &self.trust_server_certificate)
            .field("origin", &self.origin)
            .field("api_url", &self.api_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Locates `config.ini` and `.env`.
///
/// With a config directory both files must exist inside it. Without one, an
/// optional `.env` in the working directory is read and settings fall back to
/// defaults.
#[derive(Debug, Clone, Default)]
pub struct ConfigResolver {
    config_dir: Option<PathBuf>,
}

impl ConfigResolver {
    pub fn new(config_dir: Option<PathBuf>) -> Self {
        Self { config_dir }
    }

    pub fn config_dir(&self) -> Option<&Path> {
        self.config_dir.as_deref()
    }

    pub fn resolve(&self) -> Result<RunConfig, ConfigError> {
        self.resolve_with_settings(self.load_settings()?)
    }

    /// Resolves against settings the caller already loaded.
    pub fn resolve_with_settings(&self, settings: Settings) -> Result<RunConfig, ConfigError> {
        let file_vars = self.load_env_file()?;

        // Process environment wins over the file, same as dotenv loading.
        resolve_with(settings, |key| {
            env::var(key).ok().or_else(|| file_vars.get(key).cloned())
        })
    }

    pub fn load_settings(&self) -> Result<Settings, ConfigError> {
        let Some(dir) = self.existing_dir()? else {
            return Ok(Settings::default());
        };
        let path = require_file(dir.join(SETTINGS_FILE))?;
        debug!("Loading settings from {}", path.display());

        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_path()).format(config::FileFormat::Ini))
            .build()?
            .try_deserialize::<Settings>()?;

        Ok(settings)
    }

    /// Reads `.env` pairs into a map without touching the process environment.
    pub fn load_env_file(&self) -> Result<HashMap<String, String>, ConfigError> {
        let path = match self.existing_dir()? {
            Some(dir) => require_file(dir.join(ENV_FILE))?,
            None => {
                let path = PathBuf::from(ENV_FILE);
                if !path.exists() {
                    return Ok(HashMap::new());
                }
                path
            }
        };
        debug!("Loading environment file {}", path.display());

        let env_err = |source| ConfigError::EnvFile {
            path: path.clone(),
            source,
        };
        let mut vars = HashMap::new();
        for item in dotenvy::from_path_iter(&path).map_err(env_err)? {
            let (key, value) = item.map_err(env_err)?;
            vars.insert(key, value);
        }

        Ok(vars)
    }

    fn existing_dir(&self) -> Result<Option<&Path>, ConfigError> {
        match self.config_dir.as_deref() {
            Some(dir) if !dir.is_dir() => Err(ConfigError::FileNotFound(dir.to_path_buf())),
            other => Ok(other),
        }
    }
}

fn require_file(path: PathBuf) -> Result<PathBuf, ConfigError> {
    if path.is_file() {
        Ok(path)
    } else {
        Err(ConfigError::FileNotFound(path))
    }
}

/// Builds a [`RunConfig`] from settings and a key lookup, reporting every
/// missing required key at once.
pub fn resolve_with<F>(settings: Settings, lookup: F) -> Result<RunConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    let missing: Vec<String> = REQUIRED_KEYS
        .iter()
        .filter(|key| get(**key).is_none())
        .map(|key| key.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(ConfigError::MissingField(missing));
    }

    let required = |key: &str| get(key).unwrap_or_default();
    let trust_server_certificate = get("DB_TRUST_SERVER_CERTIFICATE")
        .map(|v| is_truthy(&v))
        .unwrap_or(false);

    Ok(RunConfig {
        server: required("DB_SERVER"),
        database: required("DB_NAME"),
        username: required("DB_USER"),
        password: required("DB_PASSWORD"),
        trust_server_certificate,
        origin: Origin {
            host: get("DB_AUDIT_HOST").unwrap_or_default(),
            ip: get("DB_AUDIT_IP").unwrap_or_default(),
        },
        api_url: settings
            .api
            .url
            .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
        timeout: Duration::from_secs(settings.api.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
    })
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "y" | "on"
    )
}
