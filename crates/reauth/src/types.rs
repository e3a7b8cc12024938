//! Core Authentication Types
//!
//! The two capability contracts every configured component implements, and the
//! values the chain hands back to its caller.

use std::collections::HashMap;
use std::fmt::Debug;

use async_trait::async_trait;
use http::request::Parts;
use serde::{Deserialize, Serialize};

use crate::error::ProviderResult;

/// Metadata key under which the matching backend's kind is recorded
pub const BACKEND_METADATA_KEY: &str = "reauth_backend";

/// Authentication backend
///
/// `authenticate` distinguishes three outcomes:
///
/// - `Ok(Some(identity))` - the request carries valid proof of `identity`
/// - `Ok(None)` - this backend does not recognise the request (no credentials,
///   wrong credentials, unknown user); the chain moves on
/// - `Err(_)` - the backend malfunctioned; the chain aborts
#[async_trait]
pub trait Authenticator: Send + Sync + Debug {
    /// Check that the configuration is usable and prepare runtime resources
    ///
    /// May perform network I/O.
    async fn validate(&self) -> ProviderResult<()>;

    /// Try to establish an identity for the request
    async fn authenticate(&self, parts: &Parts) -> ProviderResult<Option<String>>;

    /// Configuration fields, without the discriminator
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be represented as JSON.
    fn config(&self) -> serde_json::Result<serde_json::Value>;
}

/// Failure handler, invoked when no backend recognised the request
pub trait FailureHandler: Send + Sync + Debug {
    /// Check that the configuration is usable
    ///
    /// # Errors
    ///
    /// Returns an error describing the first configuration defect found.
    fn validate(&self) -> ProviderResult<()>;

    /// Write the client-visible denial into `response`
    ///
    /// # Errors
    ///
    /// Returns an error if the response could not be written.
    fn handle(&self, parts: &Parts, response: &mut http::Response<()>) -> ProviderResult<()>;

    /// Configuration fields, without the discriminator
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be represented as JSON.
    fn config(&self) -> serde_json::Result<serde_json::Value>;
}

/// An authenticated principal plus the backend that vouched for it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    id: String,
    backend: String,
}

impl Identity {
    /// Create an identity; empty ids are not identities
    pub fn new(id: impl Into<String>, backend: impl Into<String>) -> Option<Self> {
        let id = id.into();
        if id.is_empty() {
            return None;
        }
        Some(Self {
            id,
            backend: backend.into(),
        })
    }

    /// Principal name
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Kind of the backend that produced this identity
    pub fn backend(&self) -> &str {
        &self.backend
    }

    /// Request-scoped metadata attributing the identity
    pub fn metadata(&self) -> HashMap<String, String> {
        HashMap::from([(BACKEND_METADATA_KEY.to_string(), self.backend.clone())])
    }
}

/// Result of running the chain for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    /// A backend confirmed an identity
    Authenticated(Identity),
    /// No backend recognised the request; the failure handler has written the response
    Denied,
}

impl AuthOutcome {
    /// The identity, if authentication succeeded
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            Self::Authenticated(identity) => Some(identity),
            Self::Denied => None,
        }
    }

    /// Whether authentication succeeded
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }
}
