//! Configuration Types
//!
//! The configuration document is a list of tagged backend blobs plus one tagged
//! failure blob:
//!
//! ```json
//! {
//!   "backends": [
//!     { "type": "simple", "credentials": { "alice": "secret" } },
//!     { "type": "ldap", "url": "ldaps://ad.example.com", "base_dn": "dc=example,dc=com",
//!       "bind_dn": "cn=svc,dc=example,dc=com", "bind_password": "..." }
//!   ],
//!   "failure": { "mode": "httpbasic", "realm": "example" }
//! }
//! ```
//!
//! Blobs are kept as raw JSON here; [`crate::registry::Registry`] turns them into
//! live backends once the whole document has been read.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Environment variable prefix that overrides file settings
pub const ENV_PREFIX: &str = "REAUTH";

/// Raw configuration document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReauthConfig {
    /// Tagged backend blobs, evaluated in order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub backends: Vec<serde_json::Value>,
    /// Tagged failure blob; `status`/403 when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<serde_json::Value>,
}

impl ReauthConfig {
    /// Parse a JSON configuration document
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Document`] if the text is not a valid document.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Load configuration from a file (JSON, TOML or YAML)
    ///
    /// The format is picked from the file extension. Environment variables with
    /// the `REAUTH_` prefix override file settings, using `__` as the nesting
    /// separator.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file doesn't exist
    /// - The file format is unsupported
    /// - The file contains an invalid document
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        use config::{Config, Environment, File, FileFormat};

        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let format = match path.extension().and_then(|s| s.to_str()) {
            Some("json") => FileFormat::Json,
            Some("toml") => FileFormat::Toml,
            Some("yaml" | "yml") => FileFormat::Yaml,
            _ => return Err(ConfigError::UnsupportedFormat),
        };

        let name = path.to_str().ok_or(ConfigError::UnsupportedFormat)?;

        let config = Config::builder()
            .add_source(File::new(name, format))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        Ok(config.try_deserialize()?)
    }
}

/// Human-readable durations (`"30s"`, `"1m"`)
pub(crate) mod duration_str {
    use super::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub(crate) fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub(crate) fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}

/// Optional regular expression stored as its source text
pub(crate) mod regex_opt {
    use regex::Regex;
    use serde::{Deserialize, Deserializer, Serializer};

    pub(crate) fn serialize<S>(pattern: &Option<Regex>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match pattern {
            Some(re) => serializer.serialize_some(re.as_str()),
            None => serializer.serialize_none(),
        }
    }

    pub(crate) fn deserialize<'de, D>(deserializer: D) -> Result<Option<Regex>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(deserializer)?
            .map(|text| Regex::new(&text).map_err(serde::de::Error::custom))
            .transpose()
    }
}

/// Secrets are written back verbatim so a resolved config round-trips
pub(crate) mod secret_str {
    use secrecy::{ExposeSecret, SecretString};
    use serde::{Deserialize, Deserializer, Serializer};

    pub(crate) fn serialize<S>(secret: &SecretString, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(secret.expose_secret())
    }

    pub(crate) fn deserialize<'de, D>(deserializer: D) -> Result<SecretString, D::Error>
    where
        D: Deserializer<'de>,
    {
        String::deserialize(deserializer).map(SecretString::new)
    }
}
