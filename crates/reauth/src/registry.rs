//! Provider registry and resolver
//!
//! Configuration blobs are resolved in two phases: the discriminator is read on
//! its own, then the full blob is decoded into the concrete type registered for
//! it. The concrete type's `Default` supplies its defaults, so a blob only has to
//! carry the fields it wants to change. Every resolved value is validated before
//! it is handed out.
//!
//! The resolved [`Backend`] and [`Failure`] handles remember their discriminator
//! and serialize back into the tagged shape they were read from.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Serialize, Serializer};
use serde_json::Value;
use tracing::debug;

use crate::backends::{CredentialTable, DirectoryClient, TokenProbe, UpstreamProbe};
use crate::error::ConfigError;
use crate::failures::{ChallengeResponse, Redirect, StatusOnly};
use crate::types::{Authenticator, FailureHandler};

/// Field carrying the backend discriminator
pub const BACKEND_TAG: &str = "type";

/// Field carrying the failure-mode discriminator
pub const FAILURE_TAG: &str = "mode";

/// Decodes a full blob into a backend
pub type BackendConstructor = fn(Value) -> serde_json::Result<Arc<dyn Authenticator>>;

/// Decodes a full blob into a failure handler
pub type FailureConstructor = fn(Value) -> serde_json::Result<Arc<dyn FailureHandler>>;

fn backend<T>(value: Value) -> serde_json::Result<Arc<dyn Authenticator>>
where
    T: Authenticator + DeserializeOwned + 'static,
{
    Ok(Arc::new(serde_json::from_value::<T>(value)?))
}

fn failure<T>(value: Value) -> serde_json::Result<Arc<dyn FailureHandler>>
where
    T: FailureHandler + DeserializeOwned + 'static,
{
    Ok(Arc::new(serde_json::from_value::<T>(value)?))
}

/// A resolved, validated backend and its discriminator
#[derive(Debug, Clone)]
pub struct Backend {
    kind: String,
    driver: Arc<dyn Authenticator>,
}

impl Backend {
    /// Pair a backend implementation with its discriminator
    pub fn new(kind: impl Into<String>, driver: Arc<dyn Authenticator>) -> Self {
        Self {
            kind: kind.into(),
            driver,
        }
    }

    /// Discriminator the backend was resolved from
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// The backend implementation
    pub fn driver(&self) -> &Arc<dyn Authenticator> {
        &self.driver
    }
}

impl Serialize for Backend {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        tagged::<S::Error>(&self.kind, BACKEND_TAG, self.driver.config())?.serialize(serializer)
    }
}

/// A resolved, validated failure handler and its discriminator
#[derive(Debug, Clone)]
pub struct Failure {
    mode: String,
    driver: Arc<dyn FailureHandler>,
}

impl Failure {
    /// Pair a failure handler implementation with its discriminator
    pub fn new(mode: impl Into<String>, driver: Arc<dyn FailureHandler>) -> Self {
        Self {
            mode: mode.into(),
            driver,
        }
    }

    /// Discriminator the handler was resolved from
    pub fn mode(&self) -> &str {
        &self.mode
    }

    /// The failure handler implementation
    pub fn driver(&self) -> &Arc<dyn FailureHandler> {
        &self.driver
    }
}

impl Default for Failure {
    fn default() -> Self {
        Self::new(StatusOnly::MODE, Arc::new(StatusOnly::default()))
    }
}

impl Serialize for Failure {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        tagged::<S::Error>(&self.mode, FAILURE_TAG, self.driver.config())?.serialize(serializer)
    }
}

fn tagged<E: serde::ser::Error>(
    kind: &str,
    tag: &str,
    config: serde_json::Result<Value>,
) -> Result<Value, E> {
    let mut fields = match config.map_err(E::custom)? {
        Value::Object(fields) => fields,
        Value::Null => serde_json::Map::new(),
        other => return Err(E::custom(format!("{kind} config is not an object: {other}"))),
    };
    fields.insert(tag.to_string(), Value::String(kind.to_string()));
    Ok(Value::Object(fields))
}

/// Maps discriminators to constructors
#[derive(Clone)]
pub struct Registry {
    backends: HashMap<String, BackendConstructor>,
    failures: HashMap<String, FailureConstructor>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut backends: Vec<_> = self.backends.keys().collect();
        let mut failures: Vec<_> = self.failures.keys().collect();
        backends.sort();
        failures.sort();
        f.debug_struct("Registry")
            .field("backends", &backends)
            .field("failures", &failures)
            .finish()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl Registry {
    /// Registry with no kinds at all
    pub fn empty() -> Self {
        Self {
            backends: HashMap::new(),
            failures: HashMap::new(),
        }
    }

    /// Registry with every stock backend and failure mode
    pub fn builtin() -> Self {
        Self::empty()
            .register_backend(CredentialTable::KIND, backend::<CredentialTable>)
            .register_backend(UpstreamProbe::KIND, backend::<UpstreamProbe>)
            .register_backend(TokenProbe::KIND, backend::<TokenProbe>)
            .register_backend(DirectoryClient::KIND, backend::<DirectoryClient>)
            .register_failure(ChallengeResponse::MODE, failure::<ChallengeResponse>)
            .register_failure(Redirect::MODE, failure::<Redirect>)
            .register_failure(StatusOnly::MODE, failure::<StatusOnly>)
    }

    /// Add or replace a backend kind
    #[must_use]
    pub fn register_backend(mut self, kind: impl Into<String>, ctor: BackendConstructor) -> Self {
        self.backends.insert(kind.into(), ctor);
        self
    }

    /// Add or replace a failure mode
    #[must_use]
    pub fn register_failure(mut self, mode: impl Into<String>, ctor: FailureConstructor) -> Self {
        self.failures.insert(mode.into(), ctor);
        self
    }

    /// Registered backend kinds
    pub fn backend_kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<_> = self.backends.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    /// Decode and validate one backend blob
    ///
    /// # Errors
    ///
    /// - [`ConfigError::UnknownProviderKind`] if no constructor matches the `type` field
    /// - [`ConfigError::MalformedProviderConfig`] if the blob does not decode
    /// - [`ConfigError::ProviderValidationFailed`] if the backend rejects its config
    pub async fn resolve_backend(&self, raw: &Value) -> Result<Backend, ConfigError> {
        let kind = discriminator(raw, BACKEND_TAG)?;
        let ctor = self
            .backends
            .get(&kind)
            .ok_or_else(|| ConfigError::UnknownProviderKind {
                kind: kind.clone(),
                config: raw.to_string(),
            })?;

        let driver = ctor(strip_tag(raw, BACKEND_TAG)).map_err(|source| {
            ConfigError::MalformedProviderConfig {
                kind: kind.clone(),
                config: raw.to_string(),
                source,
            }
        })?;

        debug!(kind = %kind, "validating backend");
        driver
            .validate()
            .await
            .map_err(|source| ConfigError::ProviderValidationFailed {
                kind: kind.clone(),
                source,
            })?;

        Ok(Backend::new(kind, driver))
    }

    /// Decode and validate the failure blob
    ///
    /// # Errors
    ///
    /// Same as [`Registry::resolve_backend`], keyed on the `mode` field.
    pub fn resolve_failure(&self, raw: &Value) -> Result<Failure, ConfigError> {
        let mode = discriminator(raw, FAILURE_TAG)?;
        let ctor = self
            .failures
            .get(&mode)
            .ok_or_else(|| ConfigError::UnknownProviderKind {
                kind: mode.clone(),
                config: raw.to_string(),
            })?;

        let driver = ctor(strip_tag(raw, FAILURE_TAG)).map_err(|source| {
            ConfigError::MalformedProviderConfig {
                kind: mode.clone(),
                config: raw.to_string(),
                source,
            }
        })?;

        driver
            .validate()
            .map_err(|source| ConfigError::ProviderValidationFailed {
                kind: mode.clone(),
                source,
            })?;

        Ok(Failure::new(mode, driver))
    }
}

/// Phase one: read only the discriminator
fn discriminator(raw: &Value, tag: &str) -> Result<String, ConfigError> {
    let malformed = |source| ConfigError::MalformedProviderConfig {
        kind: String::new(),
        config: raw.to_string(),
        source,
    };

    let Value::Object(fields) = raw else {
        return Err(malformed(<serde_json::Error as serde::de::Error>::custom(
            "configuration must be an object",
        )));
    };

    fields
        .get(tag)
        .cloned()
        .map(serde_json::from_value::<String>)
        .transpose()
        .map(Option::unwrap_or_default)
        .map_err(malformed)
}

/// The concrete types don't know their own discriminator
fn strip_tag(raw: &Value, tag: &str) -> Value {
    let mut value = raw.clone();
    if let Value::Object(fields) = &mut value {
        fields.remove(tag);
    }
    value
}
