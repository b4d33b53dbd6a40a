//! Command implementations

pub mod config;
pub mod release;
pub mod version;
