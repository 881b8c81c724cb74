use std::env;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

const DEFAULT_STORAGE_BASE_URL: &str = "http://localhost:54321/storage/v1/object/public";
const DEFAULT_BUCKET: &str = "documents";

fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Deployment stage the portal runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn parse(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Everything the service binary reads from the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub storage: StorageConfig,
}

impl AppConfig {
    /// Read `.env` (if present) and the `APP_*` variables.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Self {
            environment: AppEnvironment::parse(&var_or("APP_ENV", "development")),
            server: ServerConfig::from_env()?,
            telemetry: TelemetryConfig {
                log_level: var_or("APP_LOG_LEVEL", "info"),
            },
            storage: StorageConfig::from_env()?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let raw_port = var_or("APP_PORT", "3000");
        let port = raw_port
            .trim()
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort(raw_port.clone()))?;

        Ok(Self {
            host: var_or("APP_HOST", "127.0.0.1"),
            port,
        })
    }

    /// Address to bind; `localhost` maps to the IPv4 loopback.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip = if self.host.eq_ignore_ascii_case("localhost") {
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        } else {
            self.host
                .parse::<IpAddr>()
                .map_err(|source| ConfigError::InvalidHost {
                    host: self.host.clone(),
                    source,
                })?
        };
        Ok(SocketAddr::new(ip, self.port))
    }
}

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Where uploaded documents land and where the master letter template is loaded from.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub base_url: String,
    pub bucket: String,
    pub template_path: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_STORAGE_BASE_URL.to_string(),
            bucket: DEFAULT_BUCKET.to_string(),
            template_path: None,
        }
    }
}

impl StorageConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let base_url = var_or("APP_STORAGE_BASE_URL", DEFAULT_STORAGE_BASE_URL);
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ConfigError::InvalidStorageUrl(base_url));
        }

        let bucket = var_or("APP_STORAGE_BUCKET", DEFAULT_BUCKET).trim().to_string();
        if bucket.is_empty() {
            return Err(ConfigError::MissingBucket);
        }

        let template_path = env::var("APP_TEMPLATE_PATH")
            .ok()
            .filter(|path| !path.trim().is_empty())
            .map(PathBuf::from);

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            bucket,
            template_path,
        })
    }

    /// Public URL of an object stored at `path` inside the bucket.
    pub fn public_url(&self, path: &str) -> String {
        format!("{}/{}/{}", self.base_url, self.bucket, path.trim_start_matches('/'))
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort(String),
    InvalidHost {
        host: String,
        source: std::net::AddrParseError,
    },
    InvalidStorageUrl(String),
    MissingBucket,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort(value) => {
                write!(f, "APP_PORT must be a port number, got '{value}'")
            }
            ConfigError::InvalidHost { host, .. } => {
                write!(f, "APP_HOST '{host}' is not an IP address or localhost")
            }
            ConfigError::InvalidStorageUrl(value) => {
                write!(f, "APP_STORAGE_BASE_URL must be an http(s) URL, got '{value}'")
            }
            ConfigError::MissingBucket => write!(f, "APP_STORAGE_BUCKET must not be empty"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, OnceLock};

    const KEYS: [&str; 7] = [
        "APP_ENV",
        "APP_HOST",
        "APP_PORT",
        "APP_LOG_LEVEL",
        "APP_STORAGE_BASE_URL",
        "APP_STORAGE_BUCKET",
        "APP_TEMPLATE_PATH",
    ];

    /// Run `check` with exactly `vars` set among the portal's variables.
    fn with_env<T>(vars: &[(&str, &str)], check: impl FnOnce() -> T) -> T {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        let _guard = LOCK
            .get_or_init(|| Mutex::new(()))
            .lock()
            .expect("env mutex poisoned");

        KEYS.iter().for_each(|key| env::remove_var(key));
        for (key, value) in vars {
            env::set_var(key, value);
        }
        let result = check();
        KEYS.iter().for_each(|key| env::remove_var(key));
        result
    }

    #[test]
    fn defaults_target_a_local_stack() {
        let config = with_env(&[], AppConfig::load).expect("defaults load");

        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(
            config.server.socket_addr().expect("addr"),
            SocketAddr::from(([127, 0, 0, 1], 3000))
        );
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.storage.base_url, DEFAULT_STORAGE_BASE_URL);
        assert_eq!(config.storage.bucket, "documents");
        assert!(config.storage.template_path.is_none());
    }

    #[test]
    fn localhost_binds_loopback() {
        let config = with_env(&[("APP_HOST", "LocalHost"), ("APP_PORT", "8088")], AppConfig::load)
            .expect("config loads");

        assert_eq!(
            config.server.socket_addr().expect("addr"),
            SocketAddr::from(([127, 0, 0, 1], 8088))
        );
    }

    #[test]
    fn unparseable_host_is_reported_on_bind() {
        let config =
            with_env(&[("APP_HOST", "portal.kampus")], AppConfig::load).expect("config loads");

        let err = config.server.socket_addr().expect_err("not an ip");
        assert!(err.to_string().contains("portal.kampus"));
    }

    #[test]
    fn storage_settings_build_public_urls() {
        let config = with_env(
            &[
                ("APP_ENV", "prod"),
                ("APP_STORAGE_BASE_URL", "https://files.kampus.ac.id/public/"),
                ("APP_STORAGE_BUCKET", " portal "),
                ("APP_TEMPLATE_PATH", "templates/undangan.docx"),
            ],
            AppConfig::load,
        )
        .expect("config loads");

        assert_eq!(config.environment, AppEnvironment::Production);
        assert_eq!(
            config.storage.public_url("/defenses/1-1.pdf"),
            "https://files.kampus.ac.id/public/portal/defenses/1-1.pdf"
        );
        assert_eq!(
            config.storage.template_path,
            Some(PathBuf::from("templates/undangan.docx"))
        );
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(matches!(
            with_env(&[("APP_PORT", "70000")], AppConfig::load),
            Err(ConfigError::InvalidPort(value)) if value == "70000"
        ));
        assert!(matches!(
            with_env(&[("APP_STORAGE_BASE_URL", "ftp://files")], AppConfig::load),
            Err(ConfigError::InvalidStorageUrl(_))
        ));
        assert!(matches!(
            with_env(&[("APP_STORAGE_BUCKET", "   ")], AppConfig::load),
            Err(ConfigError::MissingBucket)
        ));
    }
}
