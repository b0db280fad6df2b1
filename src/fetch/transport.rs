//! Shared HTTP transport client

use crate::error::FetchError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Transport security knobs.
///
/// Certificate verification is skipped unless `skip_tls_verify` is turned off, which
/// keeps self-hosted servers with private CAs reachable. Turn it off whenever the
/// remote presents a publicly trusted certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportSettings {
    pub timeout_secs: u64,
    pub skip_tls_verify: bool,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self { timeout_secs: DEFAULT_TIMEOUT_SECS, skip_tls_verify: true }
    }
}

impl TransportSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// HTTP client built once and handed to every downloader that talks HTTP.
///
/// `reqwest::blocking::Client` is reference-counted internally, so concurrent clones
/// share one connection pool.
#[derive(Debug, Clone)]
pub struct TransportClient {
    http: reqwest::blocking::Client,
    settings: TransportSettings,
}

impl TransportClient {
    pub fn new(settings: TransportSettings) -> Result<Self, FetchError> {
        if settings.skip_tls_verify {
            tracing::info!("TLS certificate verification is disabled for repository transfers");
        }

        let http = reqwest::blocking::Client::builder()
            .timeout(settings.timeout())
            .danger_accept_invalid_certs(settings.skip_tls_verify)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(FetchError::Transport)?;

        tracing::debug!(
            timeout_secs = settings.timeout_secs,
            skip_tls_verify = settings.skip_tls_verify,
            "Built transport client"
        );

        Ok(Self { http, settings })
    }

    pub fn http(&self) -> &reqwest::blocking::Client {
        &self.http
    }

    pub fn settings(&self) -> &TransportSettings {
        &self.settings
    }

    /// Whether certificate failures must be ignored by the git transport too.
    pub fn accepts_invalid_certs(&self) -> bool {
        self.settings.skip_tls_verify
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_behavior() {
        let settings = TransportSettings::default();
        assert_eq!(settings.timeout(), Duration::from_secs(300));
        assert!(settings.skip_tls_verify);
    }

    #[test]
    fn client_reflects_settings() {
        let settings = TransportSettings { timeout_secs: 12, skip_tls_verify: false };
        let client = TransportClient::new(settings.clone()).expect("client");
        assert_eq!(client.settings(), &settings);
        assert!(!client.accepts_invalid_certs());
    }
}
