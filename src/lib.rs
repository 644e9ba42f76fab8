// Library interface for edugate
// The binary and tests import the modules from here

pub mod billing;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod entitlement;
pub mod logging;
pub mod paywall;
pub mod prelude;
