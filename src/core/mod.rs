//! Core types: errors, configuration, logging bootstrap.

pub mod config;
pub mod errors;
pub mod logging;
