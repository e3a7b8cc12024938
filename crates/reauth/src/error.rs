//! Error types
//!
//! Errors are split along the lines of when they can happen:
//!
//! - [`ConfigError`] - raised while loading and resolving configuration. Always
//!   fatal, never retried.
//! - [`ProviderError`] - raised by an individual backend or failure handler,
//!   either while validating its configuration or while handling a request.
//! - [`ReauthError`] - what the chain and the middleware surface to callers.
//!
//! "No credentials" and "wrong credentials" are never errors. Backends report
//! them by returning no identity so the chain can move on.

use std::path::PathBuf;

use thiserror::Error;

/// Boxed error used for inner services wrapped by the middleware
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised while turning configuration into a live chain
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No constructor is registered for the discriminator
    #[error("invalid reauth configuration, unknown kind {kind:?}, config: {config}")]
    UnknownProviderKind {
        /// Discriminator found in the blob
        kind: String,
        /// Raw blob
        config: String,
    },

    /// The blob did not decode into the concrete type for its discriminator
    #[error("invalid reauth:{kind} configuration, error: {source}, config: {config}")]
    MalformedProviderConfig {
        /// Discriminator found in the blob
        kind: String,
        /// Raw blob
        config: String,
        /// Decoding error
        #[source]
        source: serde_json::Error,
    },

    /// The concrete value decoded but rejected its own configuration
    #[error("invalid reauth:{kind} configuration, error: {source}")]
    ProviderValidationFailed {
        /// Discriminator of the failing provider
        kind: String,
        /// Underlying validation error
        #[source]
        source: ProviderError,
    },

    /// Config file not found
    #[error("configuration file not found: {0}")]
    FileNotFound(PathBuf),

    /// Unsupported file format
    #[error("unsupported configuration file format, use .json, .toml, .yaml or .yml")]
    UnsupportedFormat,

    /// Configuration file or environment could not be parsed
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] config::ConfigError),

    /// Configuration document is not valid JSON
    #[error("failed to parse configuration document: {0}")]
    Document(#[from] serde_json::Error),
}

/// Errors talking to a directory service
#[derive(Debug, Clone, Error)]
pub enum DirectoryError {
    /// The server rejected the bind credentials (LDAP result code 49)
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Connecting or exchanging bytes with the server failed
    #[error("transport: {0}")]
    Transport(String),

    /// The server answered with an error result
    #[error("protocol: {0}")]
    Protocol(String),

    /// The operation did not complete within the configured timeout
    #[error("operation timed out")]
    Timeout,
}

/// LDAP result code for a rejected simple bind
const LDAP_INVALID_CREDENTIALS: u32 = 49;

impl From<ldap3::LdapError> for DirectoryError {
    fn from(err: ldap3::LdapError) -> Self {
        use ldap3::LdapError;

        match err {
            LdapError::LdapResult { result } if result.rc == LDAP_INVALID_CREDENTIALS => {
                Self::InvalidCredentials
            }
            LdapError::LdapResult { result } => {
                Self::Protocol(format!("rc={} {}", result.rc, result.text))
            }
            LdapError::Timeout { .. } => Self::Timeout,
            LdapError::Io { source } => Self::Transport(source.to_string()),
            other => Self::Transport(other.to_string()),
        }
    }
}

/// Errors raised by a single backend or failure handler
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Required configuration fields are absent
    #[error("missing the following required parameter{}: {}", if .0.len() > 1 { "s" } else { "" }, .0.join(", "))]
    MissingParameters(Vec<&'static str>),

    /// A configuration field has an unusable value
    #[error("{0}")]
    InvalidParameter(String),

    /// The provider was used before it was validated
    #[error("provider has not been validated")]
    NotReady,

    /// Dialing the directory failed
    #[error("connect to {target:?}: {source}")]
    Connect {
        /// URL that was dialed
        target: String,
        /// Underlying error
        #[source]
        source: DirectoryError,
    },

    /// Binding to the directory failed for a reason other than bad credentials
    #[error("bind with {dn:?}: {source}")]
    Bind {
        /// Distinguished name used for the bind
        dn: String,
        /// Underlying error
        #[source]
        source: DirectoryError,
    },

    /// Searching the directory failed
    #[error("search under {base:?} for {filter:?}: {source}")]
    Search {
        /// Search base
        base: String,
        /// Rendered filter
        filter: String,
        /// Underlying error
        #[source]
        source: DirectoryError,
    },

    /// More than one directory entry matched the principal
    #[error("too many entries returned for {filter:?}: {count}")]
    AmbiguousPrincipal {
        /// Rendered filter
        filter: String,
        /// Number of matching entries
        count: usize,
    },

    /// Outbound HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// A probe URL could not be built
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// A remote service answered with a status that is neither success nor denial
    #[error("unexpected status code: {0}")]
    UnexpectedStatus(u16),

    /// Writing the failure response failed
    #[error("failed to write response: {0}")]
    Response(#[from] http::Error),

    /// Offloaded blocking work panicked or was cancelled
    #[error("blocking task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Errors surfaced by the chain and the middleware
#[derive(Debug, Error)]
pub enum ReauthError {
    /// A backend malfunctioned while authenticating a request
    #[error("reauth:{kind} backend failed: {source}")]
    Provider {
        /// Discriminator of the failing backend
        kind: String,
        /// Underlying error
        #[source]
        source: ProviderError,
    },

    /// The failure handler could not produce a response
    #[error("reauth:{mode} failure handler failed: {source}")]
    Failure {
        /// Discriminator of the failure handler
        mode: String,
        /// Underlying error
        #[source]
        source: ProviderError,
    },

    /// Configuration could not be resolved
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The service wrapped by the middleware failed
    #[error("inner service failed: {0}")]
    Inner(#[from] BoxError),
}

impl From<std::convert::Infallible> for ReauthError {
    fn from(err: std::convert::Infallible) -> Self {
        match err {}
    }
}

/// Result alias for provider operations
pub type ProviderResult<T> = Result<T, ProviderError>;
