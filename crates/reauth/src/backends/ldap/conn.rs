//! Directory transport
//!
//! The directory client talks to the server through two small traits so the
//! pool and the bind/search flow don't depend on a particular LDAP library.
//! [`Ldap3Connector`] is the production implementation.

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, Scope, SearchEntry, SearchOptions};
use tracing::warn;
use url::Url;

use crate::error::{DirectoryError, ProviderError, ProviderResult};

/// Plain LDAP port
pub const LDAP_PORT: u16 = 389;
/// LDAP over TLS port
pub const LDAPS_PORT: u16 = 636;
/// Global catalog over TLS port
pub const GC_TLS_PORT: u16 = 3269;

/// Where and how to dial the directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialTarget {
    /// Host to connect to
    pub host: String,
    /// Port to connect to
    pub port: u16,
    /// Dial directly over TLS
    pub implicit_tls: bool,
    /// Upgrade a plaintext connection with StartTLS
    pub start_tls: bool,
    /// Skip certificate verification
    pub insecure_skip_verify: bool,
    /// Dial and per-operation timeout
    pub timeout: Duration,
}

impl DialTarget {
    /// Work out the dial target from the configured URL
    ///
    /// Ports 636 and 3269 and the `ldaps` scheme imply TLS from the first byte.
    /// An explicit `ldap` scheme forces plaintext even on those ports. A missing
    /// port defaults to 389, or 636 for implicit TLS.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL has no host.
    pub fn from_url(
        url: &Url,
        start_tls: bool,
        insecure_skip_verify: bool,
        timeout: Duration,
    ) -> ProviderResult<Self> {
        let host = url
            .host_str()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| ProviderError::InvalidParameter(format!("url {url} has no host")))?;

        let port = url.port().filter(|port| *port != 0);

        let mut implicit_tls =
            matches!(port, Some(LDAPS_PORT | GC_TLS_PORT)) || url.scheme() == "ldaps";
        if url.scheme() == "ldap" {
            implicit_tls = false;
        }

        let port = port.unwrap_or(if implicit_tls { LDAPS_PORT } else { LDAP_PORT });

        Ok(Self {
            host: host.to_string(),
            port,
            implicit_tls,
            // TLS over TLS is pointless, only upgrade plaintext connections
            start_tls: start_tls && !implicit_tls,
            insecure_skip_verify,
            timeout,
        })
    }

    /// URL handed to the LDAP library
    pub fn url(&self) -> String {
        let scheme = if self.implicit_tls { "ldaps" } else { "ldap" };
        format!("{scheme}://{}:{}", self.host, self.port)
    }
}

/// A live connection to the directory
#[async_trait]
pub trait DirectoryConnection: Send {
    /// Simple bind as `dn`
    async fn bind(&mut self, dn: &str, password: &str) -> Result<(), DirectoryError>;

    /// Subtree search under `base`, returning the DN of every matching entry
    async fn search(&mut self, base: &str, filter: &str) -> Result<Vec<String>, DirectoryError>;
}

/// Opens new directory connections
#[async_trait]
pub trait DirectoryConnector: Send + Sync + Debug {
    /// Dial `target` and complete any TLS negotiation
    async fn dial(&self, target: &DialTarget) -> Result<Box<dyn DirectoryConnection>, DirectoryError>;
}

/// [`DirectoryConnector`] backed by the `ldap3` crate
#[derive(Debug, Clone, Copy, Default)]
pub struct Ldap3Connector;

#[async_trait]
impl DirectoryConnector for Ldap3Connector {
    async fn dial(&self, target: &DialTarget) -> Result<Box<dyn DirectoryConnection>, DirectoryError> {
        let settings = LdapConnSettings::new()
            .set_conn_timeout(target.timeout)
            .set_starttls(target.start_tls)
            .set_no_tls_verify(target.insecure_skip_verify);

        let url = target.url();
        let (conn, ldap) = LdapConnAsync::with_settings(settings, &url).await?;

        tokio::spawn(async move {
            if let Err(err) = conn.drive().await {
                warn!(url = %url, error = %err, "directory connection terminated");
            }
        });

        Ok(Box::new(Ldap3Connection {
            ldap,
            timeout: target.timeout,
        }))
    }
}

/// Dropping the last handle closes the connection
struct Ldap3Connection {
    ldap: Ldap,
    timeout: Duration,
}

#[async_trait]
impl DirectoryConnection for Ldap3Connection {
    async fn bind(&mut self, dn: &str, password: &str) -> Result<(), DirectoryError> {
        self.ldap
            .with_timeout(self.timeout)
            .simple_bind(dn, password)
            .await?
            .success()?;
        Ok(())
    }

    async fn search(&mut self, base: &str, filter: &str) -> Result<Vec<String>, DirectoryError> {
        let time_limit = i32::try_from(self.timeout.as_secs()).unwrap_or(i32::MAX);

        let (entries, _) = self
            .ldap
            .with_timeout(self.timeout)
            .with_search_options(SearchOptions::new().timelimit(time_limit))
            .search(base, Scope::Subtree, filter, vec!["dn"])
            .await?
            .success()?;

        Ok(entries
            .into_iter()
            .map(|entry| SearchEntry::construct(entry).dn)
            .collect())
    }
}
