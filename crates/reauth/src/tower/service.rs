//! Tower Service implementation for the authentication chain

use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::future::BoxFuture;
use tower_service::Service;

use crate::chain::Reauth;
use crate::error::ReauthError;
use crate::types::AuthOutcome;

/// Tower Service that authenticates requests before forwarding them
///
/// # Type Parameters
///
/// * `S` - The inner service type
#[derive(Debug, Clone)]
pub struct ReauthService<S> {
    inner: S,
    chain: Arc<Reauth>,
}

impl<S> ReauthService<S> {
    /// Create a new service
    pub fn new(inner: S, chain: Arc<Reauth>) -> Self {
        Self { inner, chain }
    }

    /// Get a reference to the inner service
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Get a mutable reference to the inner service
    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    /// The chain run for every request
    pub fn chain(&self) -> &Arc<Reauth> {
        &self.chain
    }
}

/// Future type for [`ReauthService`] responses
pub type ReauthServiceFuture<T, E> = BoxFuture<'static, Result<T, E>>;

impl<S, B, ResBody> Service<http::Request<B>> for ReauthService<S>
where
    S: Service<http::Request<B>, Response = http::Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send,
    S::Error: Into<ReauthError>,
    B: Send + 'static,
    ResBody: Default + Send + 'static,
{
    type Response = http::Response<ResBody>;
    type Error = ReauthError;
    type Future = ReauthServiceFuture<Self::Response, Self::Error>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, req: http::Request<B>) -> Self::Future {
        let chain = Arc::clone(&self.chain);
        let inner = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, inner);

        Box::pin(async move {
            let (mut parts, body) = req.into_parts();
            let mut denial = http::Response::new(());

            match chain.authenticate(&parts, &mut denial).await? {
                AuthOutcome::Authenticated(identity) => {
                    parts.extensions.insert(identity);
                    inner
                        .call(http::Request::from_parts(parts, body))
                        .await
                        .map_err(Into::into)
                }
                AuthOutcome::Denied => {
                    let (head, ()) = denial.into_parts();
                    Ok(http::Response::from_parts(head, ResBody::default()))
                }
            }
        })
    }
}
