//! IPS-RS library
//!
//! This library exposes the command definitions and helpers behind the
//! `ips-rs` binary.

pub mod cli;
pub mod commands;
pub mod utils;
