//! Configuration management for the directory client and the aggregator
//!
//! Values are read through `ConfigProvider`s so that the same loaders work
//! from environment variables, static maps in tests, or a chain of both.

use std::env;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use once_cell::sync::Lazy;

use crate::error::{Result, ServiceError};
use crate::resilience::RetryConfig;
use crate::util::parse_duration;

/// Base trait for configuration providers
pub trait ConfigProvider: Send + Sync {
    /// Get a string configuration value
    fn get_string(&self, key: &str) -> Result<String>;
}

/// Extension methods for configuration providers
pub trait ConfigProviderExt: ConfigProvider {
    /// Get an integer configuration value
    fn get_int(&self, key: &str) -> Result<i64> {
        let value = self.get_string(key)?;
        value.parse::<i64>()
            .map_err(|e| ServiceError::configuration(format!("Invalid integer for key {}: {}", key, e)))
    }

    /// Get a duration such as `30s`, `500ms` or `2m`
    fn get_duration(&self, key: &str) -> Result<Duration> {
        let value = self.get_string(key)?;
        parse_duration(&value)
            .ok_or_else(|| ServiceError::configuration(format!("Invalid duration for key {}: {}", key, value)))
    }

    fn get_string_or(&self, key: &str, default: &str) -> String {
        self.get_string(key).unwrap_or_else(|_| default.to_string())
    }

    fn get_int_or(&self, key: &str, default: i64) -> i64 {
        self.get_int(key).unwrap_or(default)
    }

    /// Get a non-negative integer that must fit `N`, such as a count or a size
    fn get_unsigned_or<N>(&self, key: &str, default: N) -> Result<N>
    where
        N: TryFrom<i64>,
    {
        let value = match self.get_int(key) {
            Ok(value) => value,
            Err(_) => return Ok(default),
        };
        N::try_from(value)
            .map_err(|_| ServiceError::configuration(format!("Value out of range for key {}: {}", key, value)))
    }
}

impl<T: ConfigProvider + ?Sized> ConfigProviderExt for T {}

/// Environment variable based configuration provider
#[derive(Debug, Clone, Default)]
pub struct EnvConfigProvider {
    /// Optional prefix for environment variables
    prefix: Option<String>,

    /// Optional namespace for variables (e.g., "DIRECTORY")
    namespace: Option<String>,
}

impl EnvConfigProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Format a configuration key as an environment variable
    fn format_key(&self, key: &str) -> String {
        let mut env_key = String::new();

        if let Some(ref prefix) = self.prefix {
            env_key.push_str(prefix);
            env_key.push('_');
        }

        if let Some(ref namespace) = self.namespace {
            env_key.push_str(namespace);
            env_key.push('_');
        }

        env_key.push_str(&key.to_uppercase().replace(|c: char| !c.is_ascii_alphanumeric(), "_"));

        env_key
    }
}

impl ConfigProvider for EnvConfigProvider {
    fn get_string(&self, key: &str) -> Result<String> {
        let env_key = self.format_key(key);

        env::var(&env_key)
            .map_err(|e| match e {
                env::VarError::NotPresent => {
                    ServiceError::configuration(format!("Environment variable not set: {}", env_key))
                }
                env::VarError::NotUnicode(_) => {
                    ServiceError::configuration(format!("Environment variable is not valid unicode: {}", env_key))
                }
            })
    }
}

/// In-memory config provider for testing or static configuration
#[derive(Debug, Clone, Default)]
pub struct MemoryConfigProvider {
    values: HashMap<String, String>,
}

impl MemoryConfigProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_values(values: HashMap<String, String>) -> Self {
        Self { values }
    }

    pub fn set<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: ToString,
    {
        self.values.insert(key.into(), value.to_string());
    }
}

impl ConfigProvider for MemoryConfigProvider {
    fn get_string(&self, key: &str) -> Result<String> {
        self.values
            .get(key)
            .cloned()
            .ok_or_else(|| ServiceError::configuration(format!("Configuration key not found: {}", key)))
    }
}

/// A composite config provider that tries multiple providers in order
#[derive(Default)]
pub struct CompositeConfigProvider {
    providers: Vec<Box<dyn ConfigProvider>>,
}

impl CompositeConfigProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a provider to the end of the chain
    pub fn add_provider(&mut self, provider: impl ConfigProvider + 'static) {
        self.providers.push(Box::new(provider));
    }

    pub fn with_provider(mut self, provider: impl ConfigProvider + 'static) -> Self {
        self.add_provider(provider);
        self
    }
}

impl ConfigProvider for CompositeConfigProvider {
    fn get_string(&self, key: &str) -> Result<String> {
        self.providers
            .iter()
            .find_map(|provider| provider.get_string(key).ok())
            .ok_or_else(|| {
                ServiceError::configuration(format!("Configuration key not found in any provider: {}", key))
            })
    }
}

/// Global default configuration provider (`PROFILE_*` environment variables)
pub static DEFAULT_PROVIDER: Lazy<Arc<EnvConfigProvider>> = Lazy::new(|| {
    Arc::new(EnvConfigProvider::new().with_prefix("PROFILE"))
});

/// Trait for validated configuration sections
pub trait ServiceConfig: Debug + Send + Sync {
    fn validate(&self) -> Result<()>;

    fn service_name(&self) -> &str;
}

pub const DEFAULT_DIRECTORY_BASE_URL: &str = "https://graph.microsoft.com";
pub const DEFAULT_DIRECTORY_API_VERSION: &str = "v1.0";

/// Connection settings for the directory endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// Base URL of the directory endpoint, without the version segment
    pub base_url: String,

    /// API version path segment
    pub api_version: String,

    /// Static bearer token. Normally left empty and supplied by an
    /// `AccessTokenProvider` at request time.
    #[serde(default, skip_serializing)]
    pub access_token: String,

    /// Timeout in seconds for a single HTTP request
    pub timeout_seconds: u64,

    /// Maximum number of pages followed for a collection
    pub page_limit: usize,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_DIRECTORY_BASE_URL.to_string(),
            api_version: DEFAULT_DIRECTORY_API_VERSION.to_string(),
            access_token: String::new(),
            timeout_seconds: 30,
            page_limit: 10,
        }
    }
}

impl DirectoryConfig {
    /// Load configuration from a config provider
    pub fn from_provider<P: ConfigProvider + ?Sized>(provider: &P) -> Result<Self> {
        let defaults = Self::default();
        let config = Self {
            base_url: provider.get_string_or("directory_base_url", &defaults.base_url),
            api_version: provider.get_string_or("directory_api_version", &defaults.api_version),
            access_token: provider.get_string_or("directory_access_token", ""),
            timeout_seconds: provider.get_unsigned_or("directory_timeout_seconds", defaults.timeout_seconds)?,
            page_limit: provider.get_unsigned_or("directory_page_limit", defaults.page_limit)?,
        };

        config.validate()?;
        Ok(config)
    }
}

impl ServiceConfig for DirectoryConfig {
    fn validate(&self) -> Result<()> {
        if self.base_url.is_empty() {
            return Err(ServiceError::configuration("Directory base URL is required"));
        }

        if url::Url::parse(&self.base_url).is_err() {
            return Err(ServiceError::configuration(format!("Directory base URL is not a valid URL: {}", self.base_url)));
        }

        if self.api_version.is_empty() {
            return Err(ServiceError::configuration("Directory API version is required"));
        }

        if self.timeout_seconds == 0 {
            return Err(ServiceError::configuration("Directory timeout must be greater than zero"));
        }

        if self.page_limit == 0 {
            return Err(ServiceError::configuration("Directory page limit must be at least 1"));
        }

        Ok(())
    }

    fn service_name(&self) -> &str {
        "directory"
    }
}

/// Per-facet fetch policy for `ProfileAggregator`
///
/// Both knobs are off by default: a facet is fetched once, with no deadline
/// beyond whatever the backend client enforces.
#[derive(Debug, Clone, Default)]
pub struct AggregatorConfig {
    /// Upper bound on a single facet fetch, retries included
    pub facet_timeout: Option<Duration>,

    /// Retry policy applied to each facet fetch
    pub retry: Option<RetryConfig>,
}

impl AggregatorConfig {
    pub fn with_facet_timeout(mut self, timeout: Duration) -> Self {
        self.facet_timeout = Some(timeout);
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Load configuration from a config provider
    ///
    /// Reads `aggregator_facet_timeout` (e.g. `"10s"`) and
    /// `aggregator_max_retries`. A retry count of zero leaves retries off.
    pub fn from_provider<P: ConfigProvider + ?Sized>(provider: &P) -> Result<Self> {
        let facet_timeout = match provider.get_string("aggregator_facet_timeout") {
            Ok(_) => Some(provider.get_duration("aggregator_facet_timeout")?),
            Err(_) => None,
        };

        let max_retries: u32 = provider.get_unsigned_or("aggregator_max_retries", 0)?;
        let retry = if max_retries > 0 {
            Some(RetryConfig {
                max_retries,
                ..RetryConfig::default()
            })
        } else {
            None
        };

        let config = Self { facet_timeout, retry };
        config.validate()?;
        Ok(config)
    }
}

impl ServiceConfig for AggregatorConfig {
    fn validate(&self) -> Result<()> {
        if self.facet_timeout == Some(Duration::ZERO) {
            return Err(ServiceError::configuration("Facet timeout must be greater than zero"));
        }

        if let Some(ref retry) = self.retry {
            if retry.multiplier < 1.0 {
                return Err(ServiceError::configuration("Retry multiplier must be at least 1.0"));
            }
        }

        Ok(())
    }

    fn service_name(&self) -> &str {
        "aggregator"
    }
}
