//! Bare status code

use http::StatusCode;
use http::request::Parts;
use serde::{Deserialize, Serialize};

use crate::error::{ProviderError, ProviderResult};
use crate::types::FailureHandler;

const DEFAULT_CODE: u16 = 403;

/// Answers with a fixed status code and nothing else
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusOnly {
    /// Status code to answer with
    pub code: u16,
}

impl Default for StatusOnly {
    fn default() -> Self {
        Self { code: DEFAULT_CODE }
    }
}

impl StatusOnly {
    /// Failure mode discriminator
    pub const MODE: &'static str = "status";

    /// Answer with `code`
    pub fn new(code: u16) -> Self {
        Self { code }
    }

    fn status(&self) -> ProviderResult<StatusCode> {
        StatusCode::from_u16(self.code)
            .map_err(|_| ProviderError::InvalidParameter(format!("invalid status code {}", self.code)))
    }
}

impl FailureHandler for StatusOnly {
    fn validate(&self) -> ProviderResult<()> {
        self.status().map(drop)
    }

    fn handle(&self, _parts: &Parts, response: &mut http::Response<()>) -> ProviderResult<()> {
        *response.status_mut() = self.status()?;
        Ok(())
    }

    fn config(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_forbidden() {
        let parts = http::Request::new(()).into_parts().0;
        let mut response = http::Response::new(());
        StatusOnly::default().handle(&parts, &mut response).unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(response.headers().is_empty());
    }

    #[test]
    fn test_rejects_out_of_range_code() {
        assert!(StatusOnly::new(42).validate().is_err());
        assert!(StatusOnly::new(418).validate().is_ok());
    }
}
