mod api_key;
mod device_identity;
mod endpoint_url;
mod instance_id;
pub(crate) mod serde_helpers;

pub use api_key::ApiKey;
pub use device_identity::DeviceIdentity;
pub use endpoint_url::EndpointUrl;
pub use instance_id::InstanceId;

// Re-export validation functions for internal use
pub(crate) use api_key::validate_api_key;
