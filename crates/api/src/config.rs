use std::path::PathBuf;

use sitepress_worker::BuildConfig;

/// Output format of the tracing subscriber, from `LOG_FORMAT`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines (default).
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

impl LogFormat {
    /// Read `LOG_FORMAT` (`text` or `json`, unset means `text`).
    pub fn from_env() -> Self {
        match std::env::var("LOG_FORMAT") {
            Ok(value) => Self::parse(&value).expect("LOG_FORMAT must be `text` or `json`"),
            Err(_) => Self::default(),
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "text" | "pretty" => Some(Self::Text),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `4000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// How long shutdown waits for in-flight builds (default: `10`).
    pub shutdown_timeout_secs: u64,
    /// Directory holding packaged builds (default: `data/artifacts`).
    pub artifact_dir: PathBuf,
    /// Tailwind CLI binary. Unset means the built-in theme stylesheet.
    pub tailwind_bin: Option<PathBuf>,
    /// Worker pool, queue and expiry settings.
    pub build: BuildConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                    |
    /// |------------------------|----------------------------|
    /// | `HOST`                 | `0.0.0.0`                  |
    /// | `PORT`                 | `4000`                     |
    /// | `CORS_ORIGINS`         | `http://localhost:3000`    |
    /// | `REQUEST_TIMEOUT_SECS` | `30`                       |
    /// | `SHUTDOWN_TIMEOUT_SECS`| `10`                       |
    /// | `ARTIFACT_DIR`         | `data/artifacts`           |
    /// | `TAILWIND_BIN`         | unset                      |
    ///
    /// `LOG_FORMAT` is read separately by [`LogFormat::from_env`] before
    /// tracing starts. Build settings are read by [`BuildConfig::from_env`].
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "4000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let shutdown_timeout_secs: u64 = std::env::var("SHUTDOWN_TIMEOUT_SECS")
            .unwrap_or_else(|_| "10".into())
            .parse()
            .expect("SHUTDOWN_TIMEOUT_SECS must be a valid u64");

        let artifact_dir = std::env::var("ARTIFACT_DIR")
            .unwrap_or_else(|_| "data/artifacts".into())
            .into();

        let tailwind_bin = std::env::var("TAILWIND_BIN")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs,
            artifact_dir,
            tailwind_bin,
            build: BuildConfig::from_env(),
        }
    }
}
