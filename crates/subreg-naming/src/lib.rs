//! External-naming-system collaborators: submitting zone-file updates and
//! checking whether a subdomain already resolves.
//!
//! Both traits are injected into the committer/intake layers so tests can
//! substitute deterministic fakes (see `subreg-testkit`) without touching
//! the network.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

/// Shared HTTP configuration for talking to the naming API.
#[derive(Clone)]
pub struct NamingApiConfig {
    pub base_url: String,
    pub bearer_token: String,
    pub timeout: Duration,
}

impl std::fmt::Debug for NamingApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamingApiConfig")
            .field("base_url", &self.base_url)
            .field("bearer_token", &"<REDACTED>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Outcome of one `submit_zonefile` call, already decoded from the transport
/// error / HTTP status / response body for the committer to act on.
#[derive(Debug, Clone)]
pub struct NamingApiResponse {
    /// `true` only for an HTTP 202 response.
    pub accepted: bool,
    pub status: u16,
    pub txid: Option<String>,
    pub error: Option<String>,
}

impl NamingApiResponse {
    /// Does the response body (or error text) mention a max-length rejection?
    /// This is the signal the committer uses to shrink its batch size.
    pub fn is_max_length_signal(&self) -> bool {
        self.error
            .as_deref()
            .map(|e| e.to_ascii_lowercase().contains("maxlength"))
            .unwrap_or(false)
    }
}

#[derive(Debug, Deserialize)]
struct ZonefileSubmitResponseBody {
    transaction_hash: Option<String>,
    error: Option<String>,
}

/// Submits a parent domain's assembled zone-file text to the naming API.
#[async_trait]
pub trait NamingApiClient: Send + Sync {
    async fn submit_zonefile(&self, parent_domain: &str, zonefile_text: &str) -> NamingApiResponse;
}

/// Answers whether a subdomain already resolves on the naming system.
#[async_trait]
pub trait ExistenceOracle: Send + Sync {
    async fn exists(&self, parent_domain: &str, subdomain_name: &str) -> bool;
}

/// The real, HTTP-backed implementation of both naming-system collaborators.
#[derive(Clone)]
pub struct HttpNamingApi {
    config: NamingApiConfig,
    http: reqwest::Client,
}

impl HttpNamingApi {
    pub fn new(config: NamingApiConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, http })
    }

    fn request_headers(&self) -> reqwest::header::HeaderMap {
        let mut headers = reqwest::header::HeaderMap::new();
        if let Ok(v) = reqwest::header::HeaderValue::from_str(&format!("bearer {}", self.config.bearer_token)) {
            headers.insert(reqwest::header::AUTHORIZATION, v);
        }
        headers.insert(
            reqwest::header::ORIGIN,
            reqwest::header::HeaderValue::from_static("http://localhost:3000"),
        );
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        headers
    }
}

#[async_trait]
impl NamingApiClient for HttpNamingApi {
    async fn submit_zonefile(&self, parent_domain: &str, zonefile_text: &str) -> NamingApiResponse {
        let url = format!(
            "{}/v1/names/{}/zonefile",
            self.config.base_url.trim_end_matches('/'),
            parent_domain
        );

        let resp = self
            .http
            .put(&url)
            .headers(self.request_headers())
            .json(&serde_json::json!({ "zonefile": zonefile_text }))
            .send()
            .await;

        let resp = match resp {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(domain = parent_domain, error = %e, "naming API transport failure");
                return NamingApiResponse {
                    accepted: false,
                    status: 0,
                    txid: None,
                    error: Some(e.to_string()),
                };
            }
        };

        let status = resp.status();
        let body_text = resp.text().await.unwrap_or_default();

        if status.as_u16() != 202 {
            let error = serde_json::from_str::<ZonefileSubmitResponseBody>(&body_text)
                .ok()
                .and_then(|b| b.error)
                .unwrap_or_else(|| body_text.clone());
            return NamingApiResponse {
                accepted: false,
                status: status.as_u16(),
                txid: None,
                error: Some(error),
            };
        }

        match serde_json::from_str::<ZonefileSubmitResponseBody>(&body_text) {
            Ok(body) => {
                if let Some(err) = body.error {
                    NamingApiResponse {
                        accepted: true,
                        status: 202,
                        txid: None,
                        error: Some(err),
                    }
                } else if let Some(txid) = body.transaction_hash {
                    NamingApiResponse {
                        accepted: true,
                        status: 202,
                        txid: Some(txid),
                        error: None,
                    }
                } else {
                    NamingApiResponse {
                        accepted: true,
                        status: 202,
                        txid: None,
                        error: None,
                    }
                }
            }
            Err(e) => {
                tracing::error!(domain = parent_domain, error = %e, "naming API response parse failure");
                NamingApiResponse {
                    accepted: true,
                    status: 202,
                    txid: None,
                    error: None,
                }
            }
        }
    }
}

#[async_trait]
impl ExistenceOracle for HttpNamingApi {
    async fn exists(&self, parent_domain: &str, subdomain_name: &str) -> bool {
        let url = format!(
            "{}/v1/names/{}.{}/resolve",
            self.config.base_url.trim_end_matches('/'),
            subdomain_name,
            parent_domain
        );

        match self.http.get(&url).headers(self.request_headers()).send().await {
            Ok(resp) if resp.status().as_u16() == 404 => false,
            Ok(resp) if resp.status().is_success() => true,
            // Any ambiguous response is treated conservatively as "exists" so
            // intake never double-enqueues into an uncertain state.
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(domain = parent_domain, subdomain = subdomain_name, error = %e, "existence check failed, assuming exists");
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_max_length_signal_case_insensitively() {
        let resp = NamingApiResponse {
            accepted: false,
            status: 400,
            txid: None,
            error: Some("zonefile MaxLength exceeded".to_string()),
        };
        assert!(resp.is_max_length_signal());
    }

    #[test]
    fn config_debug_redacts_token() {
        let cfg = NamingApiConfig {
            base_url: "https://example.test".to_string(),
            bearer_token: "super-secret".to_string(),
            timeout: Duration::from_secs(10),
        };
        let rendered = format!("{cfg:?}");
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("REDACTED"));
    }
}
