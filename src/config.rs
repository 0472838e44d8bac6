// Gateway configuration, read from the environment at startup

use std::str::FromStr;
use std::time::Duration;

use crate::cache::DEFAULT_QUOTATION_WINDOW;
use crate::client::DEFAULT_TIMEOUT;
use crate::error::ConfigError;
use crate::retry::RetryConfig;

pub const AIRLINES_HUB_URL: &str = "AIRLINES_HUB_URL";
pub const EXCHANGE_URL: &str = "EXCHANGE_URL";
pub const FIDELITY_URL: &str = "FIDELITY_URL";
pub const GATEWAY_PORT: &str = "GATEWAY_PORT";
pub const GATEWAY_TIMEOUT_MS: &str = "GATEWAY_TIMEOUT_MS";
pub const GATEWAY_RETRY_ATTEMPTS: &str = "GATEWAY_RETRY_ATTEMPTS";
pub const GATEWAY_QUOTATION_WINDOW: &str = "GATEWAY_QUOTATION_WINDOW";
pub const GATEWAY_CONCURRENT_LOOKUPS: &str = "GATEWAY_CONCURRENT_LOOKUPS";

pub const DEFAULT_PORT: u16 = 8080;

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceUrls {
    pub airlines_hub: String,
    pub exchange: String,
    pub fidelity: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GatewayConfig {
    pub urls: ServiceUrls,
    pub port: u16,
    // per-call deadline for every downstream request
    pub request_timeout: Duration,
    pub retry_config: RetryConfig,
    pub quotation_window: usize,
    pub concurrent_lookups: bool,
}

impl GatewayConfig {
    // Settings for the given base URLs with every policy at its default
    pub fn with_urls(urls: ServiceUrls) -> Self {
        Self {
            urls,
            port: DEFAULT_PORT,
            request_timeout: DEFAULT_TIMEOUT,
            retry_config: RetryConfig::default(),
            quotation_window: DEFAULT_QUOTATION_WINDOW,
            concurrent_lookups: false,
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &'static str| {
            lookup(key)
                .map(|v| v.trim().trim_end_matches('/').to_string())
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::Missing(key))
        };

        let urls = ServiceUrls {
            airlines_hub: required(AIRLINES_HUB_URL)?,
            exchange: required(EXCHANGE_URL)?,
            fidelity: required(FIDELITY_URL)?,
        };

        let mut config = Self::with_urls(urls);

        if let Some(port) = parse_optional::<u16, _>(&lookup, GATEWAY_PORT)? {
            config.port = port;
        }
        if let Some(ms) = parse_optional::<u64, _>(&lookup, GATEWAY_TIMEOUT_MS)? {
            if ms == 0 {
                return Err(ConfigError::Invalid {
                    key: GATEWAY_TIMEOUT_MS,
                    value: ms.to_string(),
                });
            }
            config.request_timeout = Duration::from_millis(ms);
        }
        if let Some(attempts) = parse_optional::<u32, _>(&lookup, GATEWAY_RETRY_ATTEMPTS)? {
            if attempts == 0 {
                return Err(ConfigError::Invalid {
                    key: GATEWAY_RETRY_ATTEMPTS,
                    value: attempts.to_string(),
                });
            }
            config.retry_config.max_attempts = attempts;
        }
        if let Some(window) = parse_optional::<usize, _>(&lookup, GATEWAY_QUOTATION_WINDOW)? {
            if window == 0 {
                return Err(ConfigError::Invalid {
                    key: GATEWAY_QUOTATION_WINDOW,
                    value: window.to_string(),
                });
            }
            config.quotation_window = window;
        }
        if let Some(concurrent) = parse_optional::<bool, _>(&lookup, GATEWAY_CONCURRENT_LOOKUPS)? {
            config.concurrent_lookups = concurrent;
        }

        Ok(config)
    }
}

fn parse_optional<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
    }
}
