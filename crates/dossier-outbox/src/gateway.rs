//! External API gateway execution.

use crate::{OutboxError, OutboxResult};
use async_trait::async_trait;
use dossier_database::QueuedAction;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Base URL for relative action URLs.
    pub base_url: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Optional bearer token attached to every request.
    pub auth_token: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: dossier_core::Config::default().gateway_url,
            timeout_secs: 30,
            auth_token: None,
        }
    }
}

/// Execution seam for queued actions. The outbox treats the gateway as a
/// black box: success means the write was accepted, any error leaves the
/// action failed.
#[async_trait]
pub trait ApiGateway: Send + Sync {
    /// Execute one queued action against the backend.
    async fn execute(&self, action: &QueuedAction) -> OutboxResult<()>;
}

/// HTTP gateway backed by reqwest.
pub struct HttpGateway {
    config: GatewayConfig,
    client: Client,
}

impl HttpGateway {
    /// Create a new HTTP gateway.
    pub fn new(config: GatewayConfig) -> OutboxResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }

    /// Update the auth token.
    pub fn set_auth_token(&mut self, token: &str) {
        self.config.auth_token = Some(token.to_string());
    }

    /// Resolve an action URL against the configured base URL.
    fn resolve_url(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            format!(
                "{}/{}",
                self.config.base_url.trim_end_matches('/'),
                url.trim_start_matches('/')
            )
        }
    }
}

#[async_trait]
impl ApiGateway for HttpGateway {
    async fn execute(&self, action: &QueuedAction) -> OutboxResult<()> {
        let method = reqwest::Method::from_bytes(action.method.as_bytes())
            .map_err(|_| OutboxError::Gateway(format!("invalid method: {}", action.method)))?;
        let url = self.resolve_url(&action.url);

        debug!(id = %action.id, method = %method, url = %url, "Executing action");

        let mut request = self
            .client
            .request(method, &url)
            // Lets a deduplicating backend recognize a replayed action.
            .header("X-Action-Id", action.id.as_str());

        for (name, value) in &action.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(token) = &self.config.auth_token {
            request = request.header("Authorization", format!("Bearer {token}"));
        }
        if let Some(body) = &action.body {
            request = request.json(body);
        }

        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OutboxError::Gateway(format!("HTTP {status}: {body}")));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_config_default() {
        let config = GatewayConfig::default();
        assert_eq!(config.timeout_secs, 30);
        assert!(config.auth_token.is_none());
        assert!(!config.base_url.is_empty());
    }

    #[test]
    fn test_resolve_url_relative() {
        let gateway = HttpGateway::new(GatewayConfig {
            base_url: "https://api.example.com/".to_string(),
            ..Default::default()
        })
        .unwrap();

        assert_eq!(
            gateway.resolve_url("/dossiers/42"),
            "https://api.example.com/dossiers/42"
        );
        assert_eq!(
            gateway.resolve_url("dossiers/42"),
            "https://api.example.com/dossiers/42"
        );
    }

    #[test]
    fn test_resolve_url_absolute_passthrough() {
        let gateway = HttpGateway::new(GatewayConfig::default()).unwrap();
        assert_eq!(
            gateway.resolve_url("https://other.example.com/x"),
            "https://other.example.com/x"
        );
    }

    #[test]
    fn test_auth_token_update() {
        let mut gateway = HttpGateway::new(GatewayConfig::default()).unwrap();
        gateway.set_auth_token("token-1");
        assert_eq!(gateway.config.auth_token.as_deref(), Some("token-1"));
    }
}
