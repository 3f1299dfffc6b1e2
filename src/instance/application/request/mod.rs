pub mod device_request;
pub mod instance_request;
