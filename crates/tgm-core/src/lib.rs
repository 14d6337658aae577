//! Core domain + application logic for the Telegram group manager bot.
//!
//! This crate is framework-agnostic. Telegram lives behind ports (traits)
//! implemented in the adapter crate.

pub mod audit;
pub mod commands;
pub mod config;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod guards;
pub mod keyboards;
pub mod logging;
pub mod messaging;
pub mod ports;
pub mod session;

pub use errors::{Error, Result};
