//! # Tower Middleware
//!
//! [`ReauthLayer`] runs the chain in front of any `http::Request` service:
//!
//! ```rust,ignore
//! use tower::ServiceBuilder;
//! use reauth::tower::ReauthLayer;
//!
//! let chain = reauth::Reauth::from_config(&config).await?;
//!
//! let service = ServiceBuilder::new()
//!     .layer(ReauthLayer::new(chain))
//!     .service(my_inner_service);
//! ```
//!
//! ## Outcomes
//!
//! - Authenticated: the [`Identity`](crate::Identity) is inserted into the
//!   request's extensions and the inner service is called.
//! - Denied: the failure handler's status and headers are returned with an
//!   empty body; the inner service is not called.
//! - Backend malfunction: the service fails with a
//!   [`ReauthError`](crate::ReauthError). Hosts that need an infallible service
//!   (axum's `Router`) map it with a `HandleErrorLayer`.
//!
//! ```rust,ignore
//! // In your inner service handler
//! if let Some(identity) = req.extensions().get::<reauth::Identity>() {
//!     println!("Authenticated user: {}", identity.id());
//! }
//! ```

mod layer;
mod service;

pub use layer::ReauthLayer;
pub use service::{ReauthService, ReauthServiceFuture};
