//! Common test utilities for integration tests
//!
//! Request builders plus an in-memory directory that implements the directory
//! transport traits, so the LDAP backend can be exercised without a server.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use http::request::Parts;
use reauth::backends::DirectoryClient;
use reauth::backends::ldap::{DialTarget, DirectoryConnection, DirectoryConnector};
use reauth::{ClientAddr, DirectoryError};
use secrecy::SecretString;
use url::Url;

pub const SERVICE_DN: &str = "cn=svc,ou=services,dc=example,dc=com";
pub const SERVICE_PASSWORD: &str = "svc-secret";
pub const BASE_DN: &str = "dc=example,dc=com";

/// `Authorization: Basic` header value
pub fn basic_header(username: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{username}:{password}")))
}

/// Request parts carrying basic-auth credentials
pub fn basic_request(username: &str, password: &str) -> Parts {
    http::Request::builder()
        .uri("/private/report?year=2024")
        .header(http::header::HOST, "files.example.com")
        .header(http::header::AUTHORIZATION, basic_header(username, password))
        .body(())
        .expect("valid request")
        .into_parts()
        .0
}

/// Request parts without credentials
pub fn anonymous_request() -> Parts {
    http::Request::builder()
        .uri("/private/report")
        .header(http::header::HOST, "files.example.com")
        .body(())
        .expect("valid request")
        .into_parts()
        .0
}

/// Record the client address the way a hosting server would
pub fn with_client_addr(mut parts: Parts, addr: &str) -> Parts {
    let addr: SocketAddr = addr.parse().expect("valid socket address");
    parts.extensions.insert(ClientAddr(addr));
    parts
}

/// In-memory directory service
///
/// Entries are looked up by the exact rendered filter. Every account that can
/// bind, the service account included, lives in `passwords`.
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    entries: Mutex<HashMap<String, Vec<String>>>,
    passwords: Mutex<HashMap<String, String>>,
    filters: Mutex<Vec<String>>,
    pub dials: AtomicUsize,
    pub binds: AtomicUsize,
    pub search_fault: AtomicBool,
    pub bind_fault: AtomicBool,
}

impl MemoryDirectory {
    /// Directory that only knows the service account
    pub fn new() -> Arc<Self> {
        let directory = Self::default();
        directory.add_account(SERVICE_DN, SERVICE_PASSWORD);
        Arc::new(directory)
    }

    /// Let `dn` bind with `password`
    pub fn add_account(&self, dn: &str, password: &str) {
        self.passwords
            .lock()
            .expect("lock")
            .insert(dn.to_string(), password.to_string());
    }

    /// Answer searches for `filter` with `dns`
    pub fn add_entries(&self, filter: &str, dns: &[&str]) {
        self.entries.lock().expect("lock").insert(
            filter.to_string(),
            dns.iter().map(ToString::to_string).collect(),
        );
    }

    /// Filters searched so far, in order
    pub fn filters(&self) -> Vec<String> {
        self.filters.lock().expect("lock").clone()
    }

    pub fn dial_count(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }

    pub fn bind_count(&self) -> usize {
        self.binds.load(Ordering::SeqCst)
    }

    /// Connector dialing into this directory
    pub fn connector(self: &Arc<Self>) -> Arc<dyn DirectoryConnector> {
        Arc::new(MemoryConnector(Arc::clone(self)))
    }

    /// Client for this directory with default settings
    pub fn client(self: &Arc<Self>) -> DirectoryClient {
        DirectoryClient::new(
            Url::parse("ldap://ad.example.com").expect("valid url"),
            SERVICE_DN,
            SecretString::new(SERVICE_PASSWORD.to_string()),
            BASE_DN,
        )
        .with_connector(self.connector())
    }
}

#[derive(Debug)]
struct MemoryConnector(Arc<MemoryDirectory>);

#[async_trait]
impl DirectoryConnector for MemoryConnector {
    async fn dial(&self, _target: &DialTarget) -> Result<Box<dyn DirectoryConnection>, DirectoryError> {
        self.0.dials.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryConnection(Arc::clone(&self.0))))
    }
}

struct MemoryConnection(Arc<MemoryDirectory>);

#[async_trait]
impl DirectoryConnection for MemoryConnection {
    async fn bind(&mut self, dn: &str, password: &str) -> Result<(), DirectoryError> {
        self.0.binds.fetch_add(1, Ordering::SeqCst);

        if self.0.bind_fault.load(Ordering::SeqCst) {
            return Err(DirectoryError::Transport("connection reset by peer".to_string()));
        }

        let passwords = self.0.passwords.lock().expect("lock");
        match passwords.get(dn) {
            Some(expected) if expected == password => Ok(()),
            _ => Err(DirectoryError::InvalidCredentials),
        }
    }

    async fn search(&mut self, _base: &str, filter: &str) -> Result<Vec<String>, DirectoryError> {
        self.0
            .filters
            .lock()
            .expect("lock")
            .push(filter.to_string());

        if self.0.search_fault.load(Ordering::SeqCst) {
            return Err(DirectoryError::Protocol("rc=1 operations error".to_string()));
        }

        Ok(self
            .0
            .entries
            .lock()
            .expect("lock")
            .get(filter)
            .cloned()
            .unwrap_or_default())
    }
}
