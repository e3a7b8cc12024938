//! `WWW-Authenticate: Basic` challenge

use http::header::WWW_AUTHENTICATE;
use http::request::Parts;
use http::{HeaderValue, StatusCode};
use serde::{Deserialize, Serialize};

use crate::error::ProviderResult;
use crate::request::host;
use crate::types::FailureHandler;

/// Answers with `401` and a basic-auth challenge so browsers prompt for credentials
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChallengeResponse {
    /// Realm shown to the user; the request host when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub realm: Option<String>,
}

impl ChallengeResponse {
    /// Failure mode discriminator
    pub const MODE: &'static str = "httpbasic";

    /// Challenge with a fixed realm
    pub fn with_realm(realm: impl Into<String>) -> Self {
        Self {
            realm: Some(realm.into()),
        }
    }
}

/// Escape `realm` for use inside a quoted-string
fn quote(realm: &str) -> String {
    let mut quoted = String::with_capacity(realm.len());
    for c in realm.chars() {
        if matches!(c, '"' | '\\') {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted
}

impl FailureHandler for ChallengeResponse {
    fn validate(&self) -> ProviderResult<()> {
        Ok(())
    }

    fn handle(&self, parts: &Parts, response: &mut http::Response<()>) -> ProviderResult<()> {
        let realm = self
            .realm
            .as_deref()
            .filter(|realm| !realm.is_empty())
            .or_else(|| host(parts))
            .unwrap_or_default();

        let challenge = HeaderValue::try_from(format!("Basic realm=\"{}\"", quote(realm)))
            .map_err(http::Error::from)?;

        response.headers_mut().append(WWW_AUTHENTICATE, challenge);
        *response.status_mut() = StatusCode::UNAUTHORIZED;
        Ok(())
    }

    fn config(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }
}
