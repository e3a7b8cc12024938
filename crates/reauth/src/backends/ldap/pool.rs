//! Bounded pool of service-account directory connections
//!
//! Idle connections sit in a lock-free queue. Checking one out never blocks:
//! an empty pool dials a new connection, and a connection returned to a full
//! pool is closed.

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;

use crossbeam::queue::ArrayQueue;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, warn};

use super::conn::{DialTarget, DirectoryConnection, DirectoryConnector};
use crate::error::{DirectoryError, ProviderError, ProviderResult};

/// Pool of connections bound as the service account
pub struct ConnectionPool {
    idle: ArrayQueue<Box<dyn DirectoryConnection>>,
    connector: Arc<dyn DirectoryConnector>,
    target: DialTarget,
    bind_dn: String,
    bind_password: SecretString,
}

impl fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("capacity", &self.idle.capacity())
            .field("idle", &self.idle.len())
            .field("target", &self.target)
            .field("bind_dn", &self.bind_dn)
            .finish_non_exhaustive()
    }
}

impl ConnectionPool {
    /// Create an empty pool holding at most `capacity` idle connections
    pub fn new(
        capacity: NonZeroUsize,
        connector: Arc<dyn DirectoryConnector>,
        target: DialTarget,
        bind_dn: impl Into<String>,
        bind_password: SecretString,
    ) -> Self {
        Self {
            idle: ArrayQueue::new(capacity.get()),
            connector,
            target,
            bind_dn: bind_dn.into(),
            bind_password,
        }
    }

    /// Check out a connection bound as the service account
    ///
    /// An idle connection is re-bound before it is handed out, since a user
    /// bind on the previous checkout changed its identity. If the re-bind fails
    /// the connection is closed and a fresh one is dialed.
    ///
    /// # Errors
    ///
    /// Returns an error if dialing or the service-account bind fails.
    pub async fn acquire(&self) -> ProviderResult<PooledConnection<'_>> {
        if let Some(mut conn) = self.idle.pop() {
            match conn
                .bind(&self.bind_dn, self.bind_password.expose_secret())
                .await
            {
                Ok(()) => return Ok(self.checked_out(conn)),
                Err(err) => {
                    warn!(error = %err, "closing pooled directory connection after failed re-bind");
                }
            }
        }

        let url = self.target.url();
        debug!(url = %url, "dialing directory");

        let mut conn = self
            .connector
            .dial(&self.target)
            .await
            .map_err(|source| ProviderError::Connect {
                target: url,
                source,
            })?;

        conn.bind(&self.bind_dn, self.bind_password.expose_secret())
            .await
            .map_err(|source| ProviderError::Bind {
                dn: self.bind_dn.clone(),
                source,
            })?;

        Ok(self.checked_out(conn))
    }

    /// Number of idle connections
    pub fn idle(&self) -> usize {
        self.idle.len()
    }

    /// Maximum number of idle connections
    pub fn capacity(&self) -> usize {
        self.idle.capacity()
    }

    fn checked_out(&self, conn: Box<dyn DirectoryConnection>) -> PooledConnection<'_> {
        PooledConnection {
            conn: Some(conn),
            pool: self,
        }
    }

    fn release(&self, conn: Box<dyn DirectoryConnection>) {
        if self.idle.push(conn).is_err() {
            debug!("directory pool full, closing connection");
        }
    }
}

/// A checked-out connection, returned to its pool when dropped
pub struct PooledConnection<'a> {
    conn: Option<Box<dyn DirectoryConnection>>,
    pool: &'a ConnectionPool,
}

impl fmt::Debug for PooledConnection<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("live", &self.conn.is_some())
            .finish_non_exhaustive()
    }
}

impl PooledConnection<'_> {
    /// Simple bind as `dn`
    pub async fn bind(&mut self, dn: &str, password: &str) -> Result<(), DirectoryError> {
        self.live()?.bind(dn, password).await
    }

    /// Subtree search under `base`, returning matching DNs
    pub async fn search(&mut self, base: &str, filter: &str) -> Result<Vec<String>, DirectoryError> {
        self.live()?.search(base, filter).await
    }

    /// Close the connection instead of returning it to the pool
    pub fn discard(mut self) {
        self.conn.take();
    }

    fn live(&mut self) -> Result<&mut Box<dyn DirectoryConnection>, DirectoryError> {
        self.conn
            .as_mut()
            .ok_or_else(|| DirectoryError::Transport("connection already closed".to_string()))
    }
}

impl Drop for PooledConnection<'_> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn);
        }
    }
}
