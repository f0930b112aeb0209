//! Warden CLI - settings, startup and commands of the `warden` binary

pub mod command;
pub mod config;
pub mod metrics;
pub mod startup;
