// Runtime configuration: which BioT environment to talk to and how the HTTP
// client behaves. Values come from the command line (environment selector)
// and a few optional environment variables.

use std::time::Duration;

use clap::ValueEnum;

pub const URL_PROD: &str = "https://api.onalabs.biot-med.com";
pub const URL_DEV: &str = "https://api.dev.onalabs.biot-med.com";

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_SETTLE_DELAY_MS: u64 = 1000;

/// BioT environment the device is onboarded into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Environment {
    Production,
    Development,
}

impl Environment {
    pub fn base_url(self) -> &'static str {
        match self {
            Environment::Production => URL_PROD,
            Environment::Development => URL_DEV,
        }
    }
}

/// HTTP and workflow settings for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URL of the BioT API (no trailing slash).
    pub base_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Pause between creating the registration code and creating the device,
    /// so the new code is visible when the device references it.
    pub settle_delay: Duration,
}

impl ClientConfig {
    /// Build the configuration for `environment`, honouring `BIOT_API_URL`,
    /// `BIOT_HTTP_TIMEOUT_SECS` and `BIOT_SETTLE_DELAY_MS` when set.
    pub fn from_env(environment: Environment) -> Self {
        Self::from_vars(environment, |key| std::env::var(key).ok())
    }

    pub fn from_vars<F>(environment: Environment, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url = lookup("BIOT_API_URL")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| environment.base_url().to_string());
        let timeout = lookup("BIOT_HTTP_TIMEOUT_SECS")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        let settle = lookup("BIOT_SETTLE_DELAY_MS")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(DEFAULT_SETTLE_DELAY_MS);

        ClientConfig {
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(timeout),
            settle_delay: Duration::from_millis(settle),
        }
    }
}
