pub mod converge_config;
pub mod device;
pub mod instance;
pub mod power_state;
