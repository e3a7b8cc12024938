//! Token probe against a GitLab instance
//!
//! Lets CI jobs authenticate with their job token instead of stored
//! credentials. The basic-auth username is the project path and the password is
//! the token; the token is confirmed by fetching the project's git refs with it.
//!
//! ```text
//! docker login docker.example.com -u "$CI_PROJECT_PATH" -p "$CI_JOB_TOKEN"
//! ```
//!
//! Redirects are never followed: the token must not be replayed to whatever
//! host a redirect points at.

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use http::request::Parts;
use reqwest::StatusCode;
use reqwest::redirect::Policy;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::config::duration_str;
use crate::error::{ProviderError, ProviderResult};
use crate::request::basic_auth;
use crate::types::Authenticator;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_USERNAME: &str = "gitlab-ci-token";
const REFS_QUERY: &str = "service=git-upload-pack";

/// Verifies CI job tokens against a GitLab instance
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenProbe {
    /// Base URL of the GitLab instance
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<Url>,
    /// Per-request timeout
    #[serde(with = "duration_str")]
    pub timeout: Duration,
    /// Username presented alongside the token
    pub username: String,
    /// Skip certificate verification for `https` instances
    pub insecure_skip_verify: bool,

    #[serde(skip)]
    client: OnceLock<reqwest::Client>,
}

impl Default for TokenProbe {
    fn default() -> Self {
        Self {
            url: None,
            timeout: DEFAULT_TIMEOUT,
            username: DEFAULT_USERNAME.to_string(),
            insecure_skip_verify: false,
            client: OnceLock::new(),
        }
    }
}

impl TokenProbe {
    /// Backend discriminator
    pub const KIND: &'static str = "gitlabci";

    /// Probe against the instance at `url` with default settings
    pub fn new(url: Url) -> Self {
        Self {
            url: Some(url),
            ..Self::default()
        }
    }

    /// URL of the refs advertisement for `project`
    ///
    /// The project path only ever adds segments below `base`, so the probe
    /// cannot be pointed at another host.
    ///
    /// # Errors
    ///
    /// Returns an error if the project path is not a plain `group/project` path
    /// or `base` cannot carry a path.
    pub fn refs_url(base: &Url, project: &str) -> ProviderResult<Url> {
        let segments = project_segments(project).ok_or_else(|| {
            ProviderError::InvalidParameter(format!("invalid project path {project:?}"))
        })?;
        let (name, groups) = segments
            .split_last()
            .ok_or_else(|| ProviderError::InvalidParameter("empty project path".to_string()))?;

        let mut url = base.clone();
        url.path_segments_mut()
            .map_err(|()| ProviderError::InvalidParameter(format!("url {base} cannot be a base")))?
            .pop_if_empty()
            .extend(groups)
            .push(&format!("{name}.git"))
            .extend(["info", "refs"]);
        url.set_query(Some(REFS_QUERY));
        url.set_fragment(None);

        Ok(url)
    }
}

/// Segments of a `group/subgroup/project` path
///
/// Empty, `.` and `..` segments and backslashes are refused.
fn project_segments(project: &str) -> Option<Vec<&str>> {
    if project.contains('\\') {
        return None;
    }

    let segments: Vec<&str> = project.split('/').collect();
    if segments
        .iter()
        .any(|segment| segment.is_empty() || *segment == "." || *segment == "..")
    {
        return None;
    }

    Some(segments)
}

#[async_trait]
impl Authenticator for TokenProbe {
    async fn validate(&self) -> ProviderResult<()> {
        if self.username.is_empty() {
            return Err(ProviderError::InvalidParameter(
                "username is a required option".to_string(),
            ));
        }

        if self.timeout.is_zero() {
            return Err(ProviderError::InvalidParameter(
                "timeout must be greater than 0".to_string(),
            ));
        }

        let Some(url) = &self.url else {
            return Err(ProviderError::InvalidParameter(
                "url to auth against is a required parameter".to_string(),
            ));
        };

        if self.client.get().is_none() {
            let client = reqwest::Client::builder()
                .timeout(self.timeout)
                .redirect(Policy::none())
                .danger_accept_invalid_certs(url.scheme() == "https" && self.insecure_skip_verify)
                .build()?;
            let _ = self.client.set(client);
        }

        Ok(())
    }

    async fn authenticate(&self, parts: &Parts) -> ProviderResult<Option<String>> {
        let Some(creds) = basic_auth(parts) else {
            return Ok(None);
        };

        let (Some(base), Some(client)) = (&self.url, self.client.get()) else {
            return Err(ProviderError::NotReady);
        };

        if project_segments(creds.username()).is_none() {
            debug!(username = %creds.username(), "not a project path");
            return Ok(None);
        }

        let repo = Self::refs_url(base, creds.username())?;

        let resp = client
            .get(repo.clone())
            .basic_auth(&self.username, Some(creds.password()))
            .send()
            .await?;

        match resp.status() {
            StatusCode::OK => Ok(Some(creds.username().to_string())),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => {
                debug!(repo = %repo, status = resp.status().as_u16(), "token rejected");
                Ok(None)
            }
            other => Err(ProviderError::UnexpectedStatus(other.as_u16())),
        }
    }

    fn config(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }
}
