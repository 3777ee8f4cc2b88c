//! Integration test suite for the wearlink session.
//!
//! Drives a [`wearlink::Session`] against a scripted watch: the watch side
//! derives the same session keys, encodes real frames and GATT values, and
//! decodes whatever the session queued on the radio.

mod gatt_tests;
mod mocks;
mod stream_tests;
