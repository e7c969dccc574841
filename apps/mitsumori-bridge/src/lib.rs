//! Request/response bridge between the Mitsumori UI core and its backend.
//!
//! The UI core talks to this crate over named channels on a [`port_bus::Bus`].
//! Every inbound request is answered by exactly one envelope on the paired
//! response channel; see [`bridge::Bridge`] for the dispatch rules.

pub mod auth;
pub mod bridge;
pub mod config;
pub mod logging;
pub mod ui;

pub use bridge::{Bridge, BridgeError, BridgeHandle};
pub use config::{BridgeConfig, ConfigError, UiFlags};
