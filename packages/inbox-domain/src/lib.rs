pub mod classify;
pub mod signature;
pub mod vendor_time;
