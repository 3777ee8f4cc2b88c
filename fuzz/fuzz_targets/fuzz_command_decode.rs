//! Fuzz target: command decoding as the dispatcher sees it
//!
//! Invariants checked:
//! - No panics under any byte sequence
//! - Whatever decodes re-encodes to bytes that decode to the same command
//!
//! cargo fuzz run fuzz_command_decode

#![no_main]

use libfuzzer_sys::fuzz_target;
use wearlink::app::commands::Command;
use wearlink::link::dispatch::Dispatcher;

fuzz_target!(|data: &[u8]| {
    let Some(cmd) = Dispatcher::decode(data) else {
        return;
    };
    let bytes = cmd.to_bytes().unwrap();
    assert_eq!(Command::from_bytes(&bytes).unwrap(), cmd);
    let _ = Dispatcher::new().route(cmd.kind);
});
