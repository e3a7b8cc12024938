//! Redirect to a login page
//!
//! The target is a URL template. Every `{uri}` in it is replaced with the
//! percent-encoded incoming request so the login page can send the user back:
//!
//! ```text
//! https://login.example.com/?next={uri}
//! ```
//!
//! When the login page lives on another host, the incoming request is made
//! absolute (scheme and host) so the way back leads to the right site. A
//! relative template such as `/login?next={uri}` stays on the request host.

use http::header::LOCATION;
use http::request::Parts;
use http::{HeaderValue, StatusCode};
use serde::{Deserialize, Serialize};
use url::{ParseError, Url};

use crate::error::{ProviderError, ProviderResult};
use crate::request::{host, is_tls, request_uri};
use crate::types::FailureHandler;

const DEFAULT_CODE: u16 = 303;
const URI_PLACEHOLDER: &str = "{uri}";

// Only used to check that a relative template is a well-formed reference
const RELATIVE_BASE: &str = "http://localhost/";

/// Redirects unauthenticated requests to a configurable URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Redirect {
    /// Target URL template
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Redirect status code
    pub code: u16,
}

impl Default for Redirect {
    fn default() -> Self {
        Self {
            url: None,
            code: DEFAULT_CODE,
        }
    }
}

impl Redirect {
    /// Failure mode discriminator
    pub const MODE: &'static str = "redirect";

    /// Redirect to `url` with the default status code
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }

    fn template(&self) -> ProviderResult<&str> {
        self.url.as_deref().ok_or_else(|| {
            ProviderError::InvalidParameter(
                "url to redirect to is a required parameter".to_string(),
            )
        })
    }

    fn status(&self) -> ProviderResult<StatusCode> {
        StatusCode::from_u16(self.code)
            .ok()
            .filter(StatusCode::is_redirection)
            .ok_or_else(|| {
                ProviderError::InvalidParameter(format!(
                    "redirect code must be 3xx, got {}",
                    self.code
                ))
            })
    }

    /// Absolute target URL, or `None` for a same-host relative template
    fn target(&self) -> ProviderResult<Option<Url>> {
        let template = self.template()?;
        match Url::parse(template) {
            Ok(target) => Ok(Some(target)),
            Err(ParseError::RelativeUrlWithoutBase) => {
                Url::parse(RELATIVE_BASE)?.join(template)?;
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Location for a request to `parts`
    ///
    /// # Errors
    ///
    /// Returns an error if no template is configured or it is not a valid URL.
    pub fn location(&self, parts: &Parts) -> ProviderResult<String> {
        let template = self.template()?;
        let target = self.target()?;

        let mut uri = request_uri(parts).to_string();

        if let Some(target_host) = target.as_ref().and_then(authority)
            && let Some(request_host) = host(parts)
            && target_host != request_host
        {
            let scheme = if is_tls(parts) { "https" } else { "http" };
            uri = format!("{scheme}://{request_host}{uri}");
        }

        Ok(template.replace(URI_PLACEHOLDER, &urlencoding::encode(&uri)))
    }
}

/// `host[:port]` as it would appear in a `Host` header
fn authority(url: &Url) -> Option<String> {
    let host = url.host_str().filter(|host| !host.is_empty())?;
    Some(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

impl FailureHandler for Redirect {
    fn validate(&self) -> ProviderResult<()> {
        self.target()?;
        self.status()?;
        Ok(())
    }

    fn handle(&self, parts: &Parts, response: &mut http::Response<()>) -> ProviderResult<()> {
        let location = self.location(parts)?;
        let location = HeaderValue::try_from(location).map_err(http::Error::from)?;

        response.headers_mut().insert(LOCATION, location);
        *response.status_mut() = self.status()?;
        Ok(())
    }

    fn config(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }
}
