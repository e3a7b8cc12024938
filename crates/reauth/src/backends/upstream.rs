//! Upstream HTTP probe
//!
//! Authenticates against another HTTP server: the request's basic-auth
//! credentials (and optionally its cookies) are replayed against a fixed URL and
//! a `200 OK` means the user is logged in. A `match` pattern can veto a `200`
//! when the final response URL shows the upstream actually served a login page.

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use http::request::Parts;
use regex::Regex;
use reqwest::redirect::Policy;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::config::{duration_str, regex_opt};
use crate::error::{ProviderError, ProviderResult};
use crate::request::{basic_auth, client_addr, cookies, request_uri};
use crate::types::Authenticator;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Which parts of the incoming request are forwarded as `X-Auth-*` headers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Forward {
    /// Send the request path and query as `X-Auth-URL`
    pub url: bool,
    /// Send the request method as `X-Auth-Method`
    pub method: bool,
    /// Send the client address as `X-Auth-IP`
    pub ip: bool,
    /// Send each listed header as `X-Auth-Header-<Name>`
    pub headers: Vec<String>,
}

/// Delegates authentication to an upstream HTTP endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamProbe {
    /// URL to authenticate against
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<Url>,
    /// Per-request timeout
    #[serde(with = "duration_str")]
    pub timeout: Duration,
    /// Skip certificate verification for `https` upstreams
    pub insecure_skip_verify: bool,
    /// Follow redirects issued by the upstream
    pub follow_redirects: bool,
    /// Replay the request's cookies
    pub pass_cookies: bool,
    /// Final response URLs matching this pattern are not logged in
    #[serde(
        rename = "match",
        with = "regex_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub match_url: Option<Regex>,
    /// Request context forwarded to the upstream
    pub forward: Forward,

    #[serde(skip)]
    client: OnceLock<reqwest::Client>,
}

impl Default for UpstreamProbe {
    fn default() -> Self {
        Self {
            url: None,
            timeout: DEFAULT_TIMEOUT,
            insecure_skip_verify: false,
            follow_redirects: false,
            pass_cookies: false,
            match_url: None,
            forward: Forward::default(),
            client: OnceLock::new(),
        }
    }
}

impl UpstreamProbe {
    /// Backend discriminator
    pub const KIND: &'static str = "upstream";

    /// Probe against `url` with default settings
    pub fn new(url: Url) -> Self {
        Self {
            url: Some(url),
            ..Self::default()
        }
    }

    fn build_client(&self, url: &Url) -> ProviderResult<reqwest::Client> {
        let redirect = if self.follow_redirects {
            Policy::default()
        } else {
            Policy::none()
        };

        Ok(reqwest::Client::builder()
            .timeout(self.timeout)
            .redirect(redirect)
            .danger_accept_invalid_certs(url.scheme() == "https" && self.insecure_skip_verify)
            .build()?)
    }

    fn forward_context(
        &self,
        parts: &Parts,
        mut req: reqwest::RequestBuilder,
    ) -> reqwest::RequestBuilder {
        if self.pass_cookies {
            let jar = cookies(parts)
                .into_iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join("; ");
            if !jar.is_empty() {
                req = req.header(http::header::COOKIE, jar);
            }
        }

        if self.forward.url {
            req = req.header("X-Auth-URL", request_uri(parts));
        }

        if self.forward.method {
            req = req.header("X-Auth-Method", parts.method.as_str());
        }

        if self.forward.ip
            && let Some(addr) = client_addr(parts)
        {
            req = req.header("X-Auth-IP", addr.to_string());
        }

        for header in &self.forward.headers {
            if let Some(value) = parts.headers.get(header.as_str())
                && !value.is_empty()
            {
                req = req.header(format!("X-Auth-Header-{header}"), value.clone());
            }
        }

        req
    }
}

#[async_trait]
impl Authenticator for UpstreamProbe {
    async fn validate(&self) -> ProviderResult<()> {
        let Some(url) = &self.url else {
            return Err(ProviderError::InvalidParameter(
                "url to auth against is a required parameter".to_string(),
            ));
        };

        if self.timeout.is_zero() {
            return Err(ProviderError::InvalidParameter(
                "timeout must be greater than 0".to_string(),
            ));
        }

        if self.client.get().is_none() {
            let client = self.build_client(url)?;
            let _ = self.client.set(client);
        }

        Ok(())
    }

    async fn authenticate(&self, parts: &Parts) -> ProviderResult<Option<String>> {
        let creds = basic_auth(parts);
        if creds.is_none() && !self.pass_cookies {
            return Ok(None);
        }

        let (Some(url), Some(client)) = (&self.url, self.client.get()) else {
            return Err(ProviderError::NotReady);
        };

        let mut req = client.get(url.clone());
        if let Some(creds) = &creds {
            req = req.basic_auth(creds.username(), Some(creds.password()));
        }
        let req = self.forward_context(parts, req);

        let resp = req.send().await?;
        let status = resp.status();
        if status != reqwest::StatusCode::OK {
            debug!(url = %url, status = status.as_u16(), "upstream did not accept credentials");
            return Ok(None);
        }

        if let Some(pattern) = &self.match_url
            && pattern.is_match(resp.url().as_str())
        {
            debug!(url = %resp.url(), "upstream response URL matched, not logged in");
            return Ok(None);
        }

        Ok(creds.map(|creds| creds.username().to_string()))
    }

    fn config(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }
}
