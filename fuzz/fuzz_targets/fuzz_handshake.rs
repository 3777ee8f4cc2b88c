//! Fuzz target: `Handshake::handle` on the encrypted path
//!
//! Splits the input into commands and feeds them to a handshake that has
//! sent its nonce.
//!
//! Invariants checked:
//! - No panics under any command sequence
//! - Never authenticated without a watch proof made from the secret
//! - No session cipher unless authenticated
//!
//! cargo fuzz run fuzz_handshake

#![no_main]

use libfuzzer_sys::fuzz_target;
use wearlink::app::commands::{Command, PhoneInfo};
use wearlink::link::auth::Handshake;

fuzz_target!(|data: &[u8]| {
    let info = PhoneInfo {
        api_level: 34,
        name: "fuzz".into(),
        region: "US".into(),
    };
    let mut handshake = Handshake::new([0x5A; 16], "0".into(), info);
    handshake.start_encrypted_with_nonce([0x11; 16]);

    for piece in data.split(|b| *b == 0xFF) {
        let Ok(cmd) = Command::from_bytes(piece) else {
            continue;
        };
        let _ = handshake.handle(&cmd);
        assert!(!handshake.is_authenticated());
        assert!(handshake.cipher().is_none());
    }
});
