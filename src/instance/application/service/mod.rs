pub mod device_reconciler;
pub mod identity_matcher;
pub mod power_converger;
pub mod state_refresher;
