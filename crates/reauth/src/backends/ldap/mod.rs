//! Directory (LDAP) backend
//!
//! Authenticates basic-auth credentials against an LDAP directory such as
//! Active Directory. Each request:
//!
//! 1. checks out a connection bound as the service account,
//! 2. searches `base_dn` for the entry matching the username,
//! 3. binds as that entry with the supplied password.
//!
//! The identity is the DN of the matched entry. Connections come from a small
//! bounded [`ConnectionPool`] created during validation.

mod conn;
mod pool;

use std::num::NonZeroUsize;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use http::request::Parts;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

pub use conn::{
    DialTarget, DirectoryConnection, DirectoryConnector, GC_TLS_PORT, LDAPS_PORT, LDAP_PORT,
    Ldap3Connector,
};
pub use pool::{ConnectionPool, PooledConnection};

use crate::config::{duration_str, secret_str};
use crate::error::{DirectoryError, ProviderError, ProviderResult};
use crate::request::basic_auth;
use crate::types::Authenticator;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_POOL_SIZE: usize = 10;
const DEFAULT_FILTER: &str = "(&(objectClass=user)(sAMAccountName=%s))";
const PRINCIPAL_PLACEHOLDER: &str = "%s";

/// Pooled bind/search backend
#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryClient {
    /// Directory URL (`ldap://` or `ldaps://`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<Url>,
    /// Search base
    pub base_dn: String,
    /// Search filter; every `%s` is replaced with the escaped principal
    pub filter_dn: String,
    /// Appended to the username before substitution, e.g. `@example.com`
    pub principal_suffix: String,
    /// Service account DN
    pub bind_dn: String,
    /// Service account password
    #[serde(with = "secret_str")]
    pub bind_password: SecretString,
    /// Upgrade plaintext connections with StartTLS
    pub tls: bool,
    /// Skip certificate verification
    pub insecure_skip_verify: bool,
    /// Dial and per-operation timeout
    #[serde(with = "duration_str")]
    pub timeout: Duration,
    /// Maximum number of idle pooled connections
    pub connection_pool_size: usize,

    #[serde(skip)]
    pool: OnceLock<ConnectionPool>,
    #[serde(skip, default = "default_connector")]
    connector: Arc<dyn DirectoryConnector>,
}

fn default_connector() -> Arc<dyn DirectoryConnector> {
    Arc::new(Ldap3Connector)
}

impl Default for DirectoryClient {
    fn default() -> Self {
        Self {
            url: None,
            base_dn: String::new(),
            filter_dn: DEFAULT_FILTER.to_string(),
            principal_suffix: String::new(),
            bind_dn: String::new(),
            bind_password: SecretString::new(String::new()),
            tls: false,
            insecure_skip_verify: false,
            timeout: DEFAULT_TIMEOUT,
            connection_pool_size: DEFAULT_POOL_SIZE,
            pool: OnceLock::new(),
            connector: default_connector(),
        }
    }
}

impl DirectoryClient {
    /// Backend discriminator
    pub const KIND: &'static str = "ldap";

    /// Client for `url` with the given service account and search base
    pub fn new(
        url: Url,
        bind_dn: impl Into<String>,
        bind_password: SecretString,
        base_dn: impl Into<String>,
    ) -> Self {
        Self {
            url: Some(url),
            bind_dn: bind_dn.into(),
            bind_password,
            base_dn: base_dn.into(),
            ..Self::default()
        }
    }

    /// Use `connector` to open directory connections
    ///
    /// Has no effect once the client has been validated.
    #[must_use]
    pub fn with_connector(mut self, connector: Arc<dyn DirectoryConnector>) -> Self {
        self.connector = connector;
        self
    }

    /// The connection pool, once validated
    pub fn pool(&self) -> Option<&ConnectionPool> {
        self.pool.get()
    }

    /// Search filter for `username`
    ///
    /// The suffixed username is escaped so it can't alter the filter structure.
    pub fn render_filter(&self, username: &str) -> String {
        let principal = format!("{username}{}", self.principal_suffix);
        self.filter_dn
            .replace(PRINCIPAL_PLACEHOLDER, &ldap3::ldap_escape(principal))
    }

    fn missing_parameters(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.url.is_none() {
            missing.push("URL");
        }
        if self.bind_dn.is_empty() {
            missing.push("BindDN");
        }
        if self.bind_password.expose_secret().is_empty() {
            missing.push("BindPassword");
        }
        if self.base_dn.is_empty() {
            missing.push("BaseDN");
        }
        missing
    }

    async fn find_and_bind(
        &self,
        conn: &mut PooledConnection<'_>,
        filter: &str,
        password: &str,
    ) -> ProviderResult<Option<String>> {
        let entries = conn
            .search(&self.base_dn, filter)
            .await
            .map_err(|source| ProviderError::Search {
                base: self.base_dn.clone(),
                filter: filter.to_string(),
                source,
            })?;

        let dn = match entries.as_slice() {
            [] => {
                debug!(filter = %filter, "no directory entry for principal");
                return Ok(None);
            }
            [dn] => dn,
            many => {
                return Err(ProviderError::AmbiguousPrincipal {
                    filter: filter.to_string(),
                    count: many.len(),
                });
            }
        };

        match conn.bind(dn, password).await {
            Ok(()) => Ok(Some(dn.clone())),
            Err(DirectoryError::InvalidCredentials) => {
                debug!(dn = %dn, "directory rejected user credentials");
                Ok(None)
            }
            Err(source) => Err(ProviderError::Bind {
                dn: dn.clone(),
                source,
            }),
        }
    }
}

/// Transport and protocol failures leave the connection in an unknown state
fn breaks_connection(err: &ProviderError) -> bool {
    matches!(
        err,
        ProviderError::Search { .. } | ProviderError::Bind { .. }
    )
}

#[async_trait]
impl Authenticator for DirectoryClient {
    async fn validate(&self) -> ProviderResult<()> {
        let missing = self.missing_parameters();
        if !missing.is_empty() {
            return Err(ProviderError::MissingParameters(missing));
        }

        if self.timeout.is_zero() {
            return Err(ProviderError::InvalidParameter(
                "timeout must be greater than 0".to_string(),
            ));
        }

        let capacity = NonZeroUsize::new(self.connection_pool_size).ok_or_else(|| {
            ProviderError::InvalidParameter(
                "connection_pool_size must be greater than 0".to_string(),
            )
        })?;

        let Some(url) = &self.url else {
            return Err(ProviderError::MissingParameters(vec!["URL"]));
        };
        let target = DialTarget::from_url(url, self.tls, self.insecure_skip_verify, self.timeout)?;

        let pool = self.pool.get_or_init(|| {
            ConnectionPool::new(
                capacity,
                self.connector.clone(),
                target,
                self.bind_dn.clone(),
                SecretString::new(self.bind_password.expose_secret().clone()),
            )
        });

        // Prove connectivity; the connection stays in the pool for the first request
        drop(pool.acquire().await?);

        Ok(())
    }

    async fn authenticate(&self, parts: &Parts) -> ProviderResult<Option<String>> {
        let Some(creds) = basic_auth(parts) else {
            return Ok(None);
        };

        // An empty password is an unauthenticated bind, which most servers accept
        if creds.password().is_empty() {
            debug!(username = %creds.username(), "empty password, not binding");
            return Ok(None);
        }

        let pool = self.pool.get().ok_or(ProviderError::NotReady)?;
        let mut conn = pool.acquire().await?;

        let filter = self.render_filter(creds.username());
        let result = self.find_and_bind(&mut conn, &filter, creds.password()).await;
        match result {
            Err(err) if breaks_connection(&err) => {
                warn!(error = %err, "discarding directory connection");
                conn.discard();
                Err(err)
            }
            result => result,
        }
    }

    fn config(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }
}
