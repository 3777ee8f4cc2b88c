//! wearlink: host-side protocol engine for Xiaomi-family watches.
//!
//! Frames, encrypts, reassembles and dispatches command messages over a
//! serial-port stream or a GATT service, tracks device status and drives
//! chunked firmware uploads. The host supplies the radio, preferences and
//! clock through port traits; see [`app::session::Session`].

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod error;
pub mod firmware;
pub mod link;

pub use app::session::{HostPorts, Session};
pub use error::{Error, Result};
