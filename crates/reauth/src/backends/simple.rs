//! Static credential table
//!
//! The simplest backend: a `username -> secret` map. Secrets are either compared
//! in constant time as plain text, or treated as bcrypt hashes.

use std::collections::HashMap;

use async_trait::async_trait;
use http::request::Parts;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use crate::error::ProviderResult;
use crate::request::basic_auth;
use crate::types::Authenticator;

/// `username -> secret` map
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialTable {
    /// Secrets are bcrypt hashes rather than plain text
    pub use_bcrypt: bool,
    /// Username to secret
    pub credentials: HashMap<String, String>,
}

impl CredentialTable {
    /// Backend discriminator
    pub const KIND: &'static str = "simple";

    /// Plain-text table
    pub fn new(credentials: HashMap<String, String>) -> Self {
        Self {
            use_bcrypt: false,
            credentials,
        }
    }

    /// Table of bcrypt hashes
    pub fn bcrypt(credentials: HashMap<String, String>) -> Self {
        Self {
            use_bcrypt: true,
            credentials,
        }
    }

    async fn matches(&self, stored: &str, supplied: &str) -> ProviderResult<bool> {
        if !self.use_bcrypt {
            return Ok(stored.as_bytes().ct_eq(supplied.as_bytes()).into());
        }

        // Hashing is CPU-bound, keep it off the async workers
        let (stored, supplied) = (stored.to_string(), supplied.to_string());
        let matched = tokio::task::spawn_blocking(move || {
            // A malformed stored hash is indistinguishable from a wrong password
            bcrypt::verify(supplied, &stored).unwrap_or(false)
        })
        .await?;

        Ok(matched)
    }
}

#[async_trait]
impl Authenticator for CredentialTable {
    async fn validate(&self) -> ProviderResult<()> {
        Ok(())
    }

    async fn authenticate(&self, parts: &Parts) -> ProviderResult<Option<String>> {
        let Some(creds) = basic_auth(parts) else {
            return Ok(None);
        };

        let Some(stored) = self.credentials.get(creds.username()) else {
            return Ok(None);
        };

        let matched = self.matches(stored, creds.password()).await?;
        Ok(matched.then(|| creds.username().to_string()))
    }

    fn config(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }
}
