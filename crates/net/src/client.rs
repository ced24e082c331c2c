//! The downloader (SPEC_FULL.md §4.4): issues one GET per call, never
//! follows redirects at the transport layer, and always turns its
//! outcome into data the caller can persist — a network failure is
//! not a bug, it's a [`FetchOutcome::Failed`].

use std::time::Duration;

use crystal_db::models::{RevisionError, RevisionMetadata};
use tracing::instrument;

use crate::error::{ErrorKind, Result};

/// Per-process HTTP client settings, read once at startup and handed
/// to every [`Downloader`] (SPEC_FULL.md §9: `app_prefs` → explicit
/// configuration object).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub user_agent: String,
    pub header_timeout: Duration,
    pub proxy: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user_agent: "Crystal/0.1 (+https://example.invalid/crystal)".to_string(),
            header_timeout: Duration::from_secs(10),
            proxy: None,
        }
    }
}

/// The result of one fetch attempt, modeled as a tagged variant
/// (SPEC_FULL.md §9: dynamic sum types → explicit enums) rather than
/// bubbling transport errors up as a `Result` — a failed fetch is
/// archived as an error revision, not propagated.
pub enum FetchOutcome {
    Body { metadata: RevisionMetadata, body: Vec<u8> },
    Failed(RevisionError),
}

pub struct Downloader {
    client: reqwest::Client,
}

impl Downloader {
    #[instrument(skip_all, fields(user_agent = %config.user_agent))]
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .redirect(reqwest::redirect::Policy::none())
            .timeout(config.header_timeout);

        if let Some(proxy) = &config.proxy {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|_| ErrorKind::InvalidProxy(proxy.clone()))?;
            builder = builder.proxy(proxy);
        }

        let client = builder.build().map_err(|_| ErrorKind::ClientBuild)?;
        Ok(Self { client })
    }

    /// Fetches `url`, attaching `cookie` as a `Cookie` header when the
    /// caller's `request_cookie_applies_to` check (decided by
    /// `crystal-model`, not here) holds.
    #[instrument(skip(self), fields(status))]
    pub async fn fetch(&self, url: &str, cookie: Option<&str>) -> FetchOutcome {
        let mut request = self.client.get(url);
        if let Some(cookie) = cookie {
            request = request.header(reqwest::header::COOKIE, cookie);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => return FetchOutcome::Failed(classify_error(&err)),
        };

        tracing::Span::current().record("status", response.status().as_u16());

        let status_code = response.status().as_u16();
        let reason_phrase = response.status().canonical_reason().map(str::to_string);
        let http_version = format!("{:?}", response.version());
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        let body = match response.bytes().await {
            Ok(body) => body,
            Err(err) => return FetchOutcome::Failed(classify_error(&err)),
        };

        FetchOutcome::Body {
            metadata: RevisionMetadata { http_version: Some(http_version), status_code: Some(status_code), reason_phrase, headers },
            body: body.to_vec(),
        }
    }
}

fn classify_error(err: &reqwest::Error) -> RevisionError {
    let kind = if err.is_timeout() {
        "timeout"
    } else if err.is_connect() {
        "connect"
    } else if err.is_redirect() {
        "redirect"
    } else {
        "request"
    };
    RevisionError { kind: kind.to_string(), message: err.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_a_sane_timeout_and_no_proxy() {
        let config = ClientConfig::default();
        assert_eq!(config.header_timeout, Duration::from_secs(10));
        assert!(config.proxy.is_none());
    }

    #[test]
    fn building_a_client_with_an_invalid_proxy_url_fails() {
        let config = ClientConfig { proxy: Some("not a url".to_string()), ..ClientConfig::default() };
        assert!(Downloader::new(&config).is_err());
    }

    #[test]
    fn building_a_client_with_default_config_succeeds() {
        assert!(Downloader::new(&ClientConfig::default()).is_ok());
    }
}
