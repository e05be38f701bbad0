//! Command implementations

pub mod operations;
pub mod profile;
