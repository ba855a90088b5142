//! Authority client configuration.
//!
//! Selects the authority environment and its base URL. Defaults point at the
//! certification environment. Override via environment variables or explicit
//! construction for production or tests.

use std::time::Duration;

use url::Url;

/// Authority environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Certification (testing) environment.
    Certification,
    /// Production environment.
    Production,
}

impl Environment {
    /// Default base URL for this environment.
    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::Certification => "https://maullin.sii.cl",
            Self::Production => "https://palena.sii.cl",
        }
    }

    /// Parse `certification`/`cert` or `production`/`prod`, case-insensitive.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "certification" | "cert" => Ok(Self::Certification),
            "production" | "prod" => Ok(Self::Production),
            _ => Err(ConfigError::InvalidEnvironment(s.to_string())),
        }
    }
}

/// Configuration for talking to the authority.
#[derive(Debug, Clone)]
pub struct SiiConfig {
    /// Environment the base URL belongs to.
    pub environment: Environment,
    /// Base URL every endpoint path is joined to.
    pub base_url: Url,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Retries after the first attempt for seed and token requests.
    pub max_retries: u32,
    /// First backoff delay in milliseconds; doubles each retry.
    pub retry_base_delay_ms: u64,
}

impl SiiConfig {
    /// Defaults for `environment`.
    pub fn for_environment(environment: Environment) -> Result<Self, ConfigError> {
        Ok(Self {
            environment,
            base_url: parse_url("base_url", environment.default_base_url())?,
            timeout_secs: 30,
            max_retries: 3,
            retry_base_delay_ms: 200,
        })
    }

    /// Load configuration from environment variables.
    ///
    /// Variables:
    /// - `DTE_SII_ENV` (`certification` or `production`, default: `certification`)
    /// - `DTE_SII_BASE_URL` (default: the environment's authority host)
    /// - `DTE_SII_TIMEOUT_SECS` (default: 30)
    /// - `DTE_SII_MAX_RETRIES` (default: 3)
    pub fn from_env() -> Result<Self, ConfigError> {
        let environment = match std::env::var("DTE_SII_ENV") {
            Ok(raw) => Environment::parse(&raw)?,
            Err(_) => Environment::Certification,
        };
        let mut config = Self::for_environment(environment)?;
        if let Ok(raw) = std::env::var("DTE_SII_BASE_URL") {
            config.base_url = parse_url("DTE_SII_BASE_URL", &raw)?;
        }
        config.timeout_secs = env_number("DTE_SII_TIMEOUT_SECS", config.timeout_secs);
        config.max_retries = env_number("DTE_SII_MAX_RETRIES", config.max_retries);
        Ok(config)
    }

    /// Configuration pointing at a local mock server (for testing).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidUrl` if the localhost URL cannot be parsed.
    pub fn local_mock(port: u16) -> Result<Self, ConfigError> {
        Ok(Self {
            environment: Environment::Certification,
            base_url: parse_url("localhost", &format!("http://127.0.0.1:{port}"))?,
            timeout_secs: 5,
            max_retries: 2,
            retry_base_delay_ms: 1,
        })
    }

    /// Request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Absolute URL of `path` under the base URL.
    pub fn endpoint(&self, path: &str) -> Result<Url, ConfigError> {
        self.base_url
            .join(path)
            .map_err(|e| ConfigError::InvalidUrl(path.to_string(), e.to_string()))
    }
}

fn parse_url(var: &str, raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw).map_err(|e| ConfigError::InvalidUrl(var.to_string(), e.to_string()))
}

fn env_number<T: std::str::FromStr>(var: &str, default: T) -> T {
    std::env::var(var)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unknown authority environment {0:?} (expected certification or production)")]
    InvalidEnvironment(String),
    #[error("invalid URL for {0}: {1}")]
    InvalidUrl(String, String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_mock_builds_valid_config() {
        let cfg = SiiConfig::local_mock(9000).unwrap();
        assert_eq!(cfg.base_url.as_str(), "http://127.0.0.1:9000/");
        assert_eq!(cfg.timeout_secs, 5);
        assert_eq!(
            cfg.endpoint("/DTEWS/CrSeed.jws").unwrap().as_str(),
            "http://127.0.0.1:9000/DTEWS/CrSeed.jws"
        );
    }

    #[test]
    fn environments_have_distinct_hosts() {
        let cert = SiiConfig::for_environment(Environment::Certification).unwrap();
        let prod = SiiConfig::for_environment(Environment::Production).unwrap();
        assert_eq!(cert.base_url.host_str(), Some("maullin.sii.cl"));
        assert_eq!(prod.base_url.host_str(), Some("palena.sii.cl"));
    }

    #[test]
    fn environment_parse_accepts_aliases() {
        assert_eq!(Environment::parse("PROD").unwrap(), Environment::Production);
        assert_eq!(Environment::parse(" cert ").unwrap(), Environment::Certification);
        assert!(Environment::parse("staging").is_err());
    }

    #[test]
    fn env_number_falls_back_on_garbage() {
        std::env::set_var("TEST_DTE_SII_BAD_NUMBER", "many");
        let value = env_number("TEST_DTE_SII_BAD_NUMBER", 7u32);
        std::env::remove_var("TEST_DTE_SII_BAD_NUMBER");
        assert_eq!(value, 7);
        assert_eq!(env_number("NONEXISTENT_DTE_VAR_12345", 30u64), 30);
    }
}
