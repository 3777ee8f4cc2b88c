//! Session key derivation and AES-128-CCM payload encryption.
//!
//! Keys come from HKDF-SHA256 keyed on both handshake nonces:
//!
//! ```text
//! prk = HMAC(phone_nonce || watch_nonce, secret)
//! okm = T1 || T2        Ti = HMAC(prk, T(i-1) || "miwear-auth" || i)
//!
//! okm[0..16]  dec key     okm[32..36] dec nonce
//! okm[16..32] enc key     okm[36..40] enc nonce
//! ```
//!
//! Per-packet nonce: `dir_nonce(4) || 0u32 || counter u16 LE || 0u16`.

use aes::Aes128;
use ccm::Ccm;
use ccm::aead::generic_array::GenericArray;
use ccm::aead::{Aead, KeyInit};
use ccm::consts::{U4, U12};
use hmac_sha256::HMAC;

use super::codec::PayloadCipher;
use crate::error::CipherError;

type AesCcm = Ccm<Aes128, U4, U12>;

const KDF_INFO: &[u8] = b"miwear-auth";
const TAG_LEN: usize = 4;

pub type Nonce16 = [u8; 16];

#[derive(Clone, PartialEq, Eq)]
pub struct SessionKeys {
    pub dec_key: [u8; 16],
    pub enc_key: [u8; 16],
    pub dec_nonce: [u8; 4],
    pub enc_nonce: [u8; 4],
}

impl core::fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("SessionKeys(..)")
    }
}

impl SessionKeys {
    pub fn derive(secret: &[u8; 16], phone_nonce: &Nonce16, watch_nonce: &Nonce16) -> Self {
        let mut salt = [0u8; 32];
        salt[..16].copy_from_slice(phone_nonce);
        salt[16..].copy_from_slice(watch_nonce);
        let prk = HMAC::mac(secret, salt);

        let mut okm = [0u8; 64];
        let mut previous: Vec<u8> = Vec::new();
        for (i, block) in okm.chunks_mut(32).enumerate() {
            let mut mac = HMAC::new(prk);
            mac.update(&previous);
            mac.update(KDF_INFO);
            mac.update([i as u8 + 1]);
            let t = mac.finalize();
            block.copy_from_slice(&t[..block.len()]);
            previous = t.to_vec();
        }

        let mut keys = Self {
            dec_key: [0; 16],
            enc_key: [0; 16],
            dec_nonce: [0; 4],
            enc_nonce: [0; 4],
        };
        keys.dec_key.copy_from_slice(&okm[0..16]);
        keys.enc_key.copy_from_slice(&okm[16..32]);
        keys.dec_nonce.copy_from_slice(&okm[32..36]);
        keys.enc_nonce.copy_from_slice(&okm[36..40]);
        keys
    }

    /// The same keys seen from the other end of the link.
    pub fn reversed(&self) -> Self {
        Self {
            dec_key: self.enc_key,
            enc_key: self.dec_key,
            dec_nonce: self.enc_nonce,
            enc_nonce: self.dec_nonce,
        }
    }

    /// Proof the watch sends with its nonce.
    pub fn watch_proof(&self, phone_nonce: &Nonce16, watch_nonce: &Nonce16) -> [u8; 32] {
        HMAC::mac(concat(watch_nonce, phone_nonce), self.dec_key)
    }

    /// Constant-time check of the watch proof.
    pub fn verify_watch_proof(
        &self,
        phone_nonce: &Nonce16,
        watch_nonce: &Nonce16,
        proof: &[u8; 32],
    ) -> bool {
        HMAC::verify(concat(watch_nonce, phone_nonce), self.dec_key, proof)
    }

    /// Proof the phone answers with.
    pub fn phone_proof(&self, phone_nonce: &Nonce16, watch_nonce: &Nonce16) -> [u8; 32] {
        HMAC::mac(concat(phone_nonce, watch_nonce), self.enc_key)
    }
}

fn concat(a: &Nonce16, b: &Nonce16) -> [u8; 32] {
    let mut out = [0u8; 32];
    out[..16].copy_from_slice(a);
    out[16..].copy_from_slice(b);
    out
}

fn packet_nonce(dir_nonce: &[u8; 4], counter: u16) -> [u8; 12] {
    let mut nonce = [0u8; 12];
    nonce[..4].copy_from_slice(dir_nonce);
    nonce[8..10].copy_from_slice(&counter.to_le_bytes());
    nonce
}

/// AES-CCM cipher bound to one session's keys.
pub struct SessionCipher {
    keys: SessionKeys,
    enc: AesCcm,
    dec: AesCcm,
}

impl SessionCipher {
    pub fn new(keys: SessionKeys) -> Self {
        let enc = AesCcm::new(GenericArray::from_slice(&keys.enc_key));
        let dec = AesCcm::new(GenericArray::from_slice(&keys.dec_key));
        Self { keys, enc, dec }
    }

    pub fn keys(&self) -> &SessionKeys {
        &self.keys
    }
}

impl PayloadCipher for SessionCipher {
    fn seal(&self, counter: u16, plain: &[u8]) -> Result<Vec<u8>, CipherError> {
        let nonce = packet_nonce(&self.keys.enc_nonce, counter);
        self.enc
            .encrypt(GenericArray::from_slice(&nonce), plain)
            .map_err(|_| CipherError::EncryptFailed)
    }

    fn open(&self, payload: &[u8]) -> Result<Vec<u8>, CipherError> {
        if payload.len() < 2 + TAG_LEN {
            return Err(CipherError::Truncated);
        }
        let counter = u16::from_le_bytes([payload[0], payload[1]]);
        let nonce = packet_nonce(&self.keys.dec_nonce, counter);
        self.dec
            .decrypt(GenericArray::from_slice(&nonce), &payload[2..])
            .map_err(|_| CipherError::DecryptFailed)
    }
}
