use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ExchangeConfig {
    pub api_key: Secret<String>,
    pub secret_key: Secret<String>,
    pub testnet: bool,
    pub base_url: Option<String>,
}

// Secrets are never serialized
impl Serialize for ExchangeConfig {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("ExchangeConfig", 4)?;
        state.serialize_field("api_key", "[REDACTED]")?;
        state.serialize_field("secret_key", "[REDACTED]")?;
        state.serialize_field("testnet", &self.testnet)?;
        state.serialize_field("base_url", &self.base_url)?;
        state.end()
    }
}

impl<'de> Deserialize<'de> for ExchangeConfig {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct ExchangeConfigHelper {
            #[serde(default)]
            api_key: String,
            #[serde(default)]
            secret_key: String,
            #[serde(default)]
            testnet: bool,
            base_url: Option<String>,
        }

        let helper = ExchangeConfigHelper::deserialize(deserializer)?;
        Ok(Self {
            api_key: Secret::new(helper.api_key),
            secret_key: Secret::new(helper.secret_key),
            testnet: helper.testnet,
            base_url: helper.base_url,
        })
    }
}

impl ExchangeConfig {
    /// Create a new configuration with API credentials
    #[must_use]
    pub fn new(api_key: String, secret_key: String) -> Self {
        Self {
            api_key: Secret::new(api_key),
            secret_key: Secret::new(secret_key),
            testnet: false,
            base_url: None,
        }
    }

    /// Create configuration from environment variables
    ///
    /// Expected environment variables:
    /// - `{PREFIX}_API_KEY` (e.g., `BYBIT_API_KEY`)
    /// - `{PREFIX}_SECRET_KEY`
    /// - `{PREFIX}_TESTNET` (optional, defaults to false)
    /// - `{PREFIX}_BASE_URL` (optional)
    pub fn from_env(prefix: &str) -> Result<Self, ConfigError> {
        let prefix = prefix.to_uppercase();
        let api_key_var = format!("{}_API_KEY", prefix);
        let secret_key_var = format!("{}_SECRET_KEY", prefix);

        let api_key = env::var(&api_key_var)
            .map_err(|_| ConfigError::MissingEnvironmentVariable(api_key_var))?;
        let secret_key = env::var(&secret_key_var)
            .map_err(|_| ConfigError::MissingEnvironmentVariable(secret_key_var))?;

        let testnet = env_override::<bool>(&format!("{}_TESTNET", prefix))?.unwrap_or(false);
        let base_url = env::var(format!("{}_BASE_URL", prefix)).ok();

        Ok(Self {
            api_key: Secret::new(api_key),
            secret_key: Secret::new(secret_key),
            testnet,
            base_url,
        })
    }

    /// Load `.env` (if present) and then read the standard variables.
    ///
    /// **Security Warning**: Never commit .env files to version control!
    #[cfg(feature = "env-file")]
    pub fn from_env_file(prefix: &str) -> Result<Self, ConfigError> {
        Self::from_env_file_with_path(prefix, ".env")
    }

    #[cfg(feature = "env-file")]
    pub fn from_env_file_with_path(prefix: &str, env_file_path: &str) -> Result<Self, ConfigError> {
        load_env_file(env_file_path)?;
        Self::from_env(prefix)
    }

    /// Configuration for public market data only
    #[must_use]
    pub fn read_only() -> Self {
        Self {
            api_key: Secret::new(String::new()),
            secret_key: Secret::new(String::new()),
            testnet: false,
            base_url: None,
        }
    }

    /// Check if this configuration has valid credentials for authenticated operations
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        !self.api_key.expose_secret().is_empty() && !self.secret_key.expose_secret().is_empty()
    }

    #[must_use]
    pub const fn testnet(mut self, testnet: bool) -> Self {
        self.testnet = testnet;
        self
    }

    #[must_use]
    pub fn base_url(mut self, base_url: String) -> Self {
        self.base_url = Some(base_url);
        self
    }

    /// Get API key (use carefully - exposes secret)
    pub fn api_key(&self) -> &str {
        self.api_key.expose_secret()
    }

    /// Get secret key (use carefully - exposes secret)
    pub fn secret_key(&self) -> &str {
        self.secret_key.expose_secret()
    }
}

/// Tunables for the connectivity layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectivitySettings {
    pub rate_limit_max_requests: usize,
    pub rate_limit_window: Duration,
    pub default_cache_ttl: Duration,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub reconnect_delay: Duration,
    pub buffer_capacity: usize,
    pub ping_interval: Duration,
    pub auth_expiry: Duration,
    pub auth_response_timeout: Duration,
}

impl Default for ConnectivitySettings {
    fn default() -> Self {
        Self {
            rate_limit_max_requests: 120,
            rate_limit_window: Duration::from_secs(60),
            default_cache_ttl: Duration::from_secs(30),
            max_retries: 3,
            retry_base_delay: Duration::from_secs(2),
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            reconnect_delay: Duration::from_secs(5),
            buffer_capacity: 1000,
            ping_interval: Duration::from_secs(20),
            auth_expiry: Duration::from_secs(10),
            auth_response_timeout: Duration::from_secs(10),
        }
    }
}

impl ConnectivitySettings {
    /// Defaults overridden by any `{PREFIX}_*` variables that are set.
    pub fn from_env(prefix: &str) -> Result<Self, ConfigError> {
        let prefix = prefix.to_uppercase();
        let var = |name: &str| format!("{}_{}", prefix, name);
        let mut settings = Self::default();

        if let Some(max) = env_override(&var("RATE_LIMIT_MAX_REQUESTS"))? {
            settings.rate_limit_max_requests = max;
        }
        if let Some(secs) = env_override(&var("RATE_LIMIT_WINDOW_SECS"))? {
            settings.rate_limit_window = Duration::from_secs(secs);
        }
        if let Some(secs) = env_override(&var("CACHE_TTL_SECS"))? {
            settings.default_cache_ttl = Duration::from_secs(secs);
        }
        if let Some(retries) = env_override(&var("MAX_RETRIES"))? {
            settings.max_retries = retries;
        }
        if let Some(secs) = env_override(&var("RECONNECT_DELAY_SECS"))? {
            settings.reconnect_delay = Duration::from_secs(secs);
        }
        if let Some(capacity) = env_override(&var("BUFFER_CAPACITY"))? {
            settings.buffer_capacity = capacity;
        }

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rate_limit_max_requests == 0 {
            return Err(ConfigError::InvalidConfiguration(
                "rate limit must admit at least one request".to_string(),
            ));
        }
        if self.rate_limit_window.is_zero() {
            return Err(ConfigError::InvalidConfiguration(
                "rate limit window must be non-zero".to_string(),
            ));
        }
        if self.buffer_capacity == 0 {
            return Err(ConfigError::InvalidConfiguration(
                "buffer capacity must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub const fn with_rate_limit(mut self, max_requests: usize, window: Duration) -> Self {
        self.rate_limit_max_requests = max_requests;
        self.rate_limit_window = window;
        self
    }

    #[must_use]
    pub const fn with_retries(mut self, max_retries: u32, base_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_base_delay = base_delay;
        self
    }

    #[must_use]
    pub const fn with_default_cache_ttl(mut self, ttl: Duration) -> Self {
        self.default_cache_ttl = ttl;
        self
    }

    #[must_use]
    pub const fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    #[must_use]
    pub const fn with_buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity;
        self
    }

    #[must_use]
    pub const fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    #[must_use]
    pub const fn with_auth_response_timeout(mut self, timeout: Duration) -> Self {
        self.auth_response_timeout = timeout;
        self
    }
}

fn env_override<T: FromStr>(name: &str) -> Result<Option<T>, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse::<T>().map(Some).map_err(|_| {
            ConfigError::InvalidConfiguration(format!("{} has an invalid value: {}", name, raw))
        }),
        Err(_) => Ok(None),
    }
}

#[cfg(feature = "env-file")]
fn load_env_file(path: &str) -> Result<(), ConfigError> {
    match dotenv::from_path(path) {
        Ok(()) => Ok(()),
        // No file is fine; system variables still apply
        Err(dotenv::Error::Io(io_err)) if io_err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ConfigError::InvalidConfiguration(format!(
            "Failed to load .env file '{}': {}",
            path, e
        ))),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvironmentVariable(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialization_redacts_secrets() {
        let config = ExchangeConfig::new("key".to_string(), "secret".to_string());
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("[REDACTED]"));
        assert!(!json.contains("secret\""));
        assert!(!json.contains("\"key\""));
    }

    #[test]
    fn test_read_only_has_no_credentials() {
        assert!(!ExchangeConfig::read_only().has_credentials());
        assert!(ExchangeConfig::new("k".into(), "s".into()).has_credentials());
    }

    #[test]
    fn test_default_settings() {
        let settings = ConnectivitySettings::default();
        assert_eq!(settings.rate_limit_max_requests, 120);
        assert_eq!(settings.rate_limit_window, Duration::from_secs(60));
        assert_eq!(settings.reconnect_delay, Duration::from_secs(5));
        assert_eq!(settings.buffer_capacity, 1000);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_quota() {
        let settings = ConnectivitySettings::default().with_rate_limit(0, Duration::from_secs(1));
        match settings.validate() {
            Err(ConfigError::InvalidConfiguration(msg)) => assert!(msg.contains("rate limit")),
            other => panic!("Expected InvalidConfiguration, got {:?}", other),
        }
    }

    #[test]
    fn test_settings_env_overrides() {
        env::set_var("BYBITLINKTEST_RATE_LIMIT_MAX_REQUESTS", "10");
        env::set_var("BYBITLINKTEST_BUFFER_CAPACITY", "50");
        let settings = ConnectivitySettings::from_env("bybitlinktest").unwrap();
        assert_eq!(settings.rate_limit_max_requests, 10);
        assert_eq!(settings.buffer_capacity, 50);
        assert_eq!(settings.max_retries, 3);

        env::set_var("BYBITLINKTEST2_MAX_RETRIES", "many");
        assert!(ConnectivitySettings::from_env("bybitlinktest2").is_err());
    }

    #[test]
    fn test_from_env_validates_overrides() {
        env::set_var("BYBITLINKTEST3_BUFFER_CAPACITY", "0");
        match ConnectivitySettings::from_env("bybitlinktest3") {
            Err(ConfigError::InvalidConfiguration(msg)) => assert!(msg.contains("buffer")),
            other => panic!("Expected InvalidConfiguration, got {:?}", other),
        }
    }
}
