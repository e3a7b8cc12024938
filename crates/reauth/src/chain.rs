//! Authentication chain
//!
//! Backends are tried in configuration order. The first one to confirm an
//! identity wins and later backends are not consulted. A backend that fails
//! (as opposed to not recognising the request) aborts the whole chain: an error
//! never turns into a success, and it never falls through to a later backend.
//! When every backend passes, the failure handler writes the denial.

use http::request::Parts;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::ReauthConfig;
use crate::error::{ConfigError, ReauthError};
use crate::registry::{Backend, Failure, Registry};
use crate::types::{AuthOutcome, Identity};

/// Ordered backends plus a failure handler
#[derive(Debug, Clone, Default, Serialize)]
pub struct Reauth {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    backends: Vec<Backend>,
    failure: Failure,
}

impl Reauth {
    /// Chain from already-built parts
    ///
    /// Parts are used as given; call [`Reauth::validate`] before serving if
    /// they were not resolved through a [`Registry`].
    pub fn new(backends: Vec<Backend>, failure: Failure) -> Self {
        Self { backends, failure }
    }

    /// Resolve and validate every part of `config` with the stock kinds
    ///
    /// # Errors
    ///
    /// Returns the first configuration error encountered, in document order.
    pub async fn from_config(config: &ReauthConfig) -> Result<Self, ConfigError> {
        Self::from_config_with_registry(config, &Registry::builtin()).await
    }

    /// Resolve and validate every part of `config` with a custom registry
    ///
    /// # Errors
    ///
    /// Returns the first configuration error encountered, in document order.
    pub async fn from_config_with_registry(
        config: &ReauthConfig,
        registry: &Registry,
    ) -> Result<Self, ConfigError> {
        info!(backends = config.backends.len(), "resolving reauth configuration");

        let mut backends = Vec::with_capacity(config.backends.len());
        for (index, raw) in config.backends.iter().enumerate() {
            let backend = registry.resolve_backend(raw).await.inspect_err(|err| {
                warn!(index, error = %err, "backend failed to resolve");
            })?;
            backends.push(backend);
        }

        let failure = match &config.failure {
            Some(raw) => registry.resolve_failure(raw)?,
            None => Failure::default(),
        };

        Ok(Self::new(backends, failure))
    }

    /// Validate every backend and the failure handler
    ///
    /// Every defect is logged; the first one is returned.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ProviderValidationFailed`] for the first part that
    /// rejects its configuration.
    pub async fn validate(&self) -> Result<(), ConfigError> {
        let mut first = None;

        for (index, backend) in self.backends.iter().enumerate() {
            if let Err(source) = backend.driver().validate().await {
                warn!(index, kind = backend.kind(), error = %source, "backend failed validation");
                first.get_or_insert(ConfigError::ProviderValidationFailed {
                    kind: backend.kind().to_string(),
                    source,
                });
            }
        }

        if let Err(source) = self.failure.driver().validate() {
            warn!(mode = self.failure.mode(), error = %source, "failure mode failed validation");
            first.get_or_insert(ConfigError::ProviderValidationFailed {
                kind: self.failure.mode().to_string(),
                source,
            });
        }

        first.map_or(Ok(()), Err)
    }

    /// Run the chain for one request
    ///
    /// On [`AuthOutcome::Denied`] the failure handler has written its status and
    /// headers into `response`. On success and on error `response` is untouched.
    ///
    /// # Errors
    ///
    /// - [`ReauthError::Provider`] if a backend malfunctioned
    /// - [`ReauthError::Failure`] if the failure handler could not write the response
    pub async fn authenticate(
        &self,
        parts: &Parts,
        response: &mut http::Response<()>,
    ) -> Result<AuthOutcome, ReauthError> {
        for backend in &self.backends {
            debug!(kind = backend.kind(), "trying backend");

            let user = backend
                .driver()
                .authenticate(parts)
                .await
                .map_err(|source| {
                    error!(kind = backend.kind(), error = %source, "backend failed");
                    ReauthError::Provider {
                        kind: backend.kind().to_string(),
                        source,
                    }
                })?;

            if let Some(identity) = user.and_then(|id| Identity::new(id, backend.kind())) {
                info!(
                    identity = identity.id(),
                    backend = identity.backend(),
                    "request authenticated"
                );
                return Ok(AuthOutcome::Authenticated(identity));
            }
        }

        debug!(mode = self.failure.mode(), "no backend recognised the request");
        self.failure
            .driver()
            .handle(parts, response)
            .map_err(|source| ReauthError::Failure {
                mode: self.failure.mode().to_string(),
                source,
            })?;

        Ok(AuthOutcome::Denied)
    }

    /// Backends in evaluation order
    pub fn backends(&self) -> &[Backend] {
        &self.backends
    }

    /// The failure handler
    pub fn failure(&self) -> &Failure {
        &self.failure
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ProviderError, ProviderResult};
    use crate::failures::StatusOnly;
    use crate::types::Authenticator;
    use async_trait::async_trait;
    use http::StatusCode;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    enum Answer {
        Identity(&'static str),
        Nothing,
        Broken,
    }

    #[derive(Debug)]
    struct Scripted {
        answer: Answer,
        calls: AtomicUsize,
        validations: AtomicUsize,
    }

    impl Scripted {
        fn new(answer: Answer) -> Arc<Self> {
            Arc::new(Self {
                answer,
                calls: AtomicUsize::new(0),
                validations: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn validations(&self) -> usize {
            self.validations.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Authenticator for Scripted {
        async fn validate(&self) -> ProviderResult<()> {
            self.validations.fetch_add(1, Ordering::SeqCst);
            match self.answer {
                Answer::Broken => Err(ProviderError::InvalidParameter("broken".to_string())),
                _ => Ok(()),
            }
        }

        async fn authenticate(&self, _parts: &Parts) -> ProviderResult<Option<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.answer {
                Answer::Identity(id) => Ok(Some(id.to_string())),
                Answer::Nothing => Ok(None),
                Answer::Broken => Err(ProviderError::UnexpectedStatus(500)),
            }
        }

        fn config(&self) -> serde_json::Result<serde_json::Value> {
            Ok(serde_json::json!({}))
        }
    }

    fn parts() -> Parts {
        http::Request::new(()).into_parts().0
    }

    #[tokio::test]
    async fn test_first_identity_wins() {
        let a = Scripted::new(Answer::Nothing);
        let b = Scripted::new(Answer::Identity("bob"));
        let c = Scripted::new(Answer::Identity("carol"));
        let chain = Reauth::new(
            vec![
                Backend::new("a", a.clone()),
                Backend::new("b", b.clone()),
                Backend::new("c", c.clone()),
            ],
            Failure::default(),
        );

        let mut response = http::Response::new(());
        let outcome = chain.authenticate(&parts(), &mut response).await.unwrap();

        let identity = outcome.identity().unwrap();
        assert_eq!(identity.id(), "bob");
        assert_eq!(identity.backend(), "b");
        assert_eq!((a.calls(), b.calls(), c.calls()), (1, 1, 0));
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_swapped_order_attributes_same_backend() {
        let a = Scripted::new(Answer::Nothing);
        let b = Scripted::new(Answer::Identity("bob"));
        let chain = Reauth::new(
            vec![Backend::new("b", b.clone()), Backend::new("a", a.clone())],
            Failure::default(),
        );

        let mut response = http::Response::new(());
        let outcome = chain.authenticate(&parts(), &mut response).await.unwrap();

        assert_eq!(outcome.identity().map(Identity::backend), Some("b"));
        assert_eq!((a.calls(), b.calls()), (0, 1));
    }

    #[tokio::test]
    async fn test_error_aborts_without_failure_handler() {
        let broken = Scripted::new(Answer::Broken);
        let later = Scripted::new(Answer::Identity("bob"));
        let chain = Reauth::new(
            vec![
                Backend::new("broken", broken),
                Backend::new("later", later.clone()),
            ],
            Failure::default(),
        );

        let mut response = http::Response::new(());
        let err = chain.authenticate(&parts(), &mut response).await.unwrap_err();

        assert!(matches!(err, ReauthError::Provider { ref kind, .. } if kind == "broken"));
        assert_eq!(later.calls(), 0);
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_no_match_invokes_failure_handler() {
        let chain = Reauth::new(
            vec![Backend::new("a", Scripted::new(Answer::Nothing))],
            Failure::new(StatusOnly::MODE, Arc::new(StatusOnly::new(401))),
        );

        let mut response = http::Response::new(());
        let outcome = chain.authenticate(&parts(), &mut response).await.unwrap();

        assert_eq!(outcome, AuthOutcome::Denied);
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_empty_chain_denies_with_default() {
        let mut response = http::Response::new(());
        let outcome = Reauth::default()
            .authenticate(&parts(), &mut response)
            .await
            .unwrap();

        assert_eq!(outcome, AuthOutcome::Denied);
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_validate_reports_first_defect() {
        let fine = Scripted::new(Answer::Nothing);
        let first = Scripted::new(Answer::Broken);
        let second = Scripted::new(Answer::Broken);
        let last = Scripted::new(Answer::Nothing);
        let chain = Reauth::new(
            vec![
                Backend::new("fine", fine.clone()),
                Backend::new("first", first.clone()),
                Backend::new("second", second.clone()),
                Backend::new("last", last.clone()),
            ],
            Failure::new(StatusOnly::MODE, Arc::new(StatusOnly::new(7))),
        );

        let err = chain.validate().await.unwrap_err();
        assert!(
            matches!(err, ConfigError::ProviderValidationFailed { ref kind, .. } if kind == "first")
        );
        assert_eq!(
            (fine.validations(), first.validations(), second.validations(), last.validations()),
            (1, 1, 1, 1)
        );
        assert_eq!(first.calls() + second.calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_failure_defaults_to_forbidden() {
        let config = ReauthConfig::from_json(r#"{"backends": []}"#).unwrap();
        let chain = Reauth::from_config(&config).await.unwrap();

        assert_eq!(chain.failure().mode(), "status");
        assert_eq!(
            serde_json::to_value(&chain).unwrap(),
            serde_json::json!({"failure": {"mode": "status", "code": 403}})
        );
    }
}
