//! Command implementations

pub mod ips;
