//! # Reauth - Ordered HTTP Authentication Chain
//!
//! Authenticates inbound HTTP requests by trying an ordered list of backends
//! until one confirms an identity, and falls back to a configurable failure
//! response otherwise.
//!
//! ## Key Features
//!
//! - **Tagged configuration** - a heterogeneous JSON/TOML/YAML document is
//!   resolved into live backends by discriminator
//! - **Fail-closed chain** - a malfunctioning backend aborts the request, it
//!   never falls through to a later backend
//! - **Pooled LDAP** - bounded connection pool with service-account re-binds
//! - **Stock backends** - static credential table (plain or bcrypt), upstream
//!   HTTP probe, GitLab CI job tokens, LDAP bind/search
//! - **Failure modes** - basic-auth challenge, redirect to a login page, bare
//!   status code
//!
//! ## Architecture
//!
//! - [`types`] - capability traits ([`Authenticator`], [`FailureHandler`]) and
//!   the [`Identity`] the chain hands back
//! - [`registry`] - discriminator to constructor mapping and the two-phase resolver
//! - [`chain`] - the ordered evaluation chain ([`Reauth`])
//! - [`backends`] - stock authentication backends
//! - [`failures`] - stock failure handlers
//! - [`config`] - configuration document and file loading
//! - [`request`] - helpers for reading credentials and context off a request
//! - `tower` - Tower middleware (feature `middleware`)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use reauth::{AuthOutcome, Reauth, ReauthConfig};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ReauthConfig::from_json(
//!     r#"{
//!         "backends": [
//!             {"type": "simple", "credentials": {"alice": "secret"}}
//!         ],
//!         "failure": {"mode": "httpbasic", "realm": "example"}
//!     }"#,
//! )?;
//! let chain = Reauth::from_config(&config).await?;
//!
//! let (parts, ()) = http::Request::new(()).into_parts();
//! let mut response = http::Response::new(());
//! match chain.authenticate(&parts, &mut response).await? {
//!     AuthOutcome::Authenticated(identity) => println!("hello {}", identity.id()),
//!     AuthOutcome::Denied => println!("denied with {}", response.status()),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `middleware` (default) - Tower `ReauthLayer` / `ReauthService`
//! - `tower` - alias for `middleware`

pub mod backends;
pub mod chain;
pub mod config;
pub mod error;
pub mod failures;
pub mod registry;
pub mod request;
pub mod types;

#[cfg(feature = "middleware")]
pub mod tower;

#[doc(inline)]
pub use chain::Reauth;

#[doc(inline)]
pub use config::ReauthConfig;

#[doc(inline)]
pub use error::{BoxError, ConfigError, DirectoryError, ProviderError, ProviderResult, ReauthError};

#[doc(inline)]
pub use registry::{Backend, Failure, Registry};

#[doc(inline)]
pub use request::{BasicCredentials, ClientAddr};

#[doc(inline)]
pub use types::{AuthOutcome, Authenticator, BACKEND_METADATA_KEY, FailureHandler, Identity};

#[cfg(feature = "middleware")]
#[doc(inline)]
pub use crate::tower::{ReauthLayer, ReauthService};
