use crate::core::domain::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The key the remote API uses to address one device of an instance.
///
/// Container-style devices are addressed by name (caller-supplied or generated
/// by the server), VM-style devices by a numeric id the server assigns. An
/// empty name is not an identity; unknown identities are `None` at the use
/// site.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(untagged)]
pub enum DeviceIdentity {
    Id(u64),
    Name(String),
}

impl DeviceIdentity {
    /// Creates a name identity after validating it.
    ///
    /// # Errors
    /// Returns `ValidationError` if the name is empty or malformed.
    pub fn name(name: impl Into<String>) -> Result<Self, ValidationError> {
        let name = name.into();
        validate_device_name(&name)?;
        Ok(Self::Name(name))
    }

    /// Creates a name identity without validation.
    pub(crate) fn new_unchecked(name: impl Into<String>) -> Self {
        Self::Name(name.into())
    }

    /// Converts a raw remote name into an identity, treating "" as unknown.
    pub(crate) fn from_remote_name(name: Option<&str>) -> Option<Self> {
        match name {
            Some(n) if !n.is_empty() => Some(Self::Name(n.to_string())),
            _ => None,
        }
    }

    /// Returns the identity as a JSON parameter for RPC calls.
    #[must_use]
    pub fn to_param(&self) -> serde_json::Value {
        match self {
            DeviceIdentity::Id(id) => serde_json::Value::from(*id),
            DeviceIdentity::Name(name) => serde_json::Value::from(name.as_str()),
        }
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceIdentity::Id(id) => write!(f, "{}", id),
            DeviceIdentity::Name(name) => f.write_str(name),
        }
    }
}

/// Validates a caller-supplied device name.
pub(crate) fn validate_device_name(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::Field {
            field: "device.name".to_string(),
            message: "Device name cannot be empty".to_string(),
        });
    }
    if name.len() > 64 {
        return Err(ValidationError::Format(
            "Device name cannot exceed 64 characters".to_string(),
        ));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        return Err(ValidationError::Format(format!(
            "Device name '{}' may only contain letters, digits, '-', '_' and '.'",
            name
        )));
    }
    Ok(())
}
