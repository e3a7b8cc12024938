//! Request boundary helpers
//!
//! Backends only ever look at what is already on the inbound request: the
//! `Authorization` header, cookies, a handful of forwarded headers and the
//! client address. They never need the body, so everything here works on
//! [`http::request::Parts`].

use std::fmt;
use std::net::SocketAddr;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use http::header::{AUTHORIZATION, COOKIE, HOST};
use http::request::Parts;
use secrecy::{ExposeSecret, SecretString};

/// Client socket address, inserted into request extensions by the hosting server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientAddr(pub SocketAddr);

/// Username/password pair taken from an `Authorization: Basic` header
#[derive(Clone)]
pub struct BasicCredentials {
    username: String,
    password: SecretString,
}

impl BasicCredentials {
    /// Create credentials from their parts
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::new(password.into()),
        }
    }

    /// Username as supplied by the client
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Password as supplied by the client
    pub fn password(&self) -> &str {
        self.password.expose_secret()
    }
}

impl fmt::Debug for BasicCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicCredentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Decode `Authorization: Basic` credentials
///
/// Returns `None` when the header is absent, uses another scheme, or does not
/// decode to `user:password`.
pub fn basic_auth(parts: &Parts) -> Option<BasicCredentials> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }

    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;

    Some(BasicCredentials::new(username, password))
}

/// All `name=value` cookie pairs carried by the request
pub fn cookies(parts: &Parts) -> Vec<(String, String)> {
    parts
        .headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|header| header.split(';'))
        .filter_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some((name.to_string(), value.trim().to_string()))
        })
        .collect()
}

/// Host the client addressed, from the `Host` header or the absolute URI
pub fn host(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(HOST)
        .and_then(|value| value.to_str().ok())
        .or_else(|| parts.uri.authority().map(http::uri::Authority::as_str))
}

/// Whether the client reached us over TLS
///
/// Trusts `X-Forwarded-Proto` so that deployments behind a terminating proxy
/// still redirect back to `https`.
pub fn is_tls(parts: &Parts) -> bool {
    if parts.uri.scheme() == Some(&http::uri::Scheme::HTTPS) {
        return true;
    }

    parts
        .headers
        .get("x-forwarded-proto")
        .and_then(|value| value.to_str().ok())
        .is_some_and(|proto| proto.eq_ignore_ascii_case("https"))
}

/// Origin-form request target (path plus query)
pub fn request_uri(parts: &Parts) -> &str {
    parts
        .uri
        .path_and_query()
        .map_or_else(|| parts.uri.path(), http::uri::PathAndQuery::as_str)
}

/// Client socket address, if the hosting server recorded one
pub fn client_addr(parts: &Parts) -> Option<SocketAddr> {
    parts.extensions.get::<ClientAddr>().map(|addr| addr.0)
}
