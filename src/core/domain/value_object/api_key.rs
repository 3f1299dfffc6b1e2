use crate::core::domain::error::ValidationError;

/// An API key used as a bearer token against the management API.
#[derive(Clone)]
pub struct ApiKey(String);

impl ApiKey {
    /// Creates a new key without validation.
    pub(crate) fn new_unchecked(key: String) -> Self {
        Self(key)
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Formats the key as an `Authorization` header value.
    #[must_use]
    pub fn as_bearer_header(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// Validates the format of an API key.
pub(crate) fn validate_api_key(key: &str) -> Result<(), ValidationError> {
    if key.is_empty() {
        return Err(ValidationError::Field {
            field: "api_key".to_string(),
            message: "API key cannot be empty".to_string(),
        });
    }
    if key.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(ValidationError::Format(
            "API key cannot contain whitespace or control characters".to_string(),
        ));
    }
    Ok(())
}
