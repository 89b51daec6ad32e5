#![warn(missing_docs)]

//! VoteGuard management daemon: admin API, moderation CLI, retention sweeper

/// Admin HTTP API.
pub mod api;
/// `vg-mgmt` command line.
pub mod cli;
/// Daemon configuration.
pub mod config;
/// Daemon entry point and background sweeper.
pub mod daemon;
/// Auth lockout and response hardening.
pub mod security;

pub use api::AdminApi;
pub use config::MgmtConfig;
