use crate::core::domain::error::ValidationError;
use url::Url;

const RPC_PATH: &str = "api/rpc";

/// A validated base URL of the management API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointUrl(Url);

impl EndpointUrl {
    /// Parses and validates a base URL.
    ///
    /// # Errors
    /// Returns `ValidationError` if the URL is malformed or not http(s).
    pub fn parse(url: &str) -> Result<Self, ValidationError> {
        validate_url(url)?;
        let parsed = Url::parse(url)
            .map_err(|e| ValidationError::Format(format!("Invalid URL format: {}", e)))?;
        Ok(Self(parsed))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Returns the full URL of the RPC endpoint.
    #[must_use]
    pub fn rpc_url(&self) -> String {
        format!("{}/{}", self.0.as_str().trim_end_matches('/'), RPC_PATH)
    }
}

/// Validates a base URL string.
pub(crate) fn validate_url(url: &str) -> Result<(), ValidationError> {
    if url.is_empty() {
        return Err(ValidationError::Field {
            field: "endpoint".to_string(),
            message: "URL cannot be empty".to_string(),
        });
    }
    if url.len() > 2083 {
        return Err(ValidationError::Format(
            "URL exceeds maximum length of 2083 characters".to_string(),
        ));
    }
    let parsed = Url::parse(url)
        .map_err(|e| ValidationError::Format(format!("Invalid URL format: {}", e)))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ValidationError::ConstraintViolation(format!(
            "Invalid scheme '{}'. Must be one of: http, https",
            parsed.scheme()
        )));
    }
    if parsed.host_str().is_none() {
        return Err(ValidationError::Field {
            field: "endpoint".to_string(),
            message: "URL must have a host".to_string(),
        });
    }
    Ok(())
}
