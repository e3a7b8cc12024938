//! Tower Layer implementation for the authentication chain

use std::sync::Arc;
use tower::Layer;

use crate::chain::Reauth;

use super::service::ReauthService;

/// Tower Layer that puts the authentication chain in front of a service
#[derive(Debug, Clone)]
pub struct ReauthLayer {
    chain: Arc<Reauth>,
}

impl ReauthLayer {
    /// Create a layer running `chain`
    pub fn new(chain: Reauth) -> Self {
        Self {
            chain: Arc::new(chain),
        }
    }

    /// Create a layer from a shared chain
    pub fn from_arc(chain: Arc<Reauth>) -> Self {
        Self { chain }
    }

    /// The chain run for every request
    pub fn chain(&self) -> &Arc<Reauth> {
        &self.chain
    }
}

impl<S> Layer<S> for ReauthLayer {
    type Service = ReauthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ReauthService::new(inner, Arc::clone(&self.chain))
    }
}
