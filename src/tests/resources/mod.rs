mod device_tests;
mod power_tests;
