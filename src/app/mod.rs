//! Application layer: commands, services and the session that drives them.
//!
//! Nothing here touches a radio. Interaction with the host happens through
//! the **port traits** in [`ports`] and the radio queue in
//! [`crate::link::transport`], which keeps the whole layer testable with
//! mock adapters.

pub mod commands;
pub mod display_items;
pub mod events;
pub mod ports;
pub mod session;
pub mod system;
