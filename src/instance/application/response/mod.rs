pub mod device_response;
pub mod instance_response;
