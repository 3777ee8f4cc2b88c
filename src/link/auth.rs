//! Authentication handshake (command type 1).
//!
//! Encrypted flow:
//!
//! 1. Phone sends `NONCE { phone_nonce }`
//! 2. Watch replies `NONCE { watch_nonce, HMAC(dec_key, watch || phone) }`
//! 3. Phone derives session keys, checks the proof, sends
//!    `AUTH { HMAC(enc_key, phone || watch), seal(phone_info) }`
//! 4. Watch replies `AUTH` with status 0 on success
//!
//! Clear-text flow: phone sends `SEND_USERID { user_id }`, watch replies
//! with a status.
//!
//! Any rejection lands in `Failed` and surfaces as
//! [`LinkError::AuthenticationFailed`]. A new attempt needs a new `start`.

use log::{info, warn};
use rand::RngCore;

use crate::app::commands::{AuthBody, Body, Command, PhoneInfo};
use crate::error::LinkError;

use super::cipher::{Nonce16, SessionCipher, SessionKeys};
use super::codec::PayloadCipher;
use super::transport::HandshakeMode;

// ── Constants ────────────────────────────────────────────────

pub const AUTH_COMMAND_TYPE: u8 = 1;

pub const CMD_SEND_USERID: u8 = 5;
pub const CMD_NONCE: u8 = 26;
pub const CMD_AUTH: u8 = 27;

// ── State machine ────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeState {
    Idle,
    AwaitingUserIdAck,
    AwaitingWatchNonce { phone_nonce: Nonce16 },
    AwaitingAuthResult,
    Authenticated,
    Failed,
}

/// What the session should do after feeding a command to the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeStep {
    Send(Command),
    Authenticated,
}

pub struct Handshake {
    state: HandshakeState,
    secret: [u8; 16],
    user_id: String,
    phone_info: PhoneInfo,
    pending: Option<SessionKeys>,
    cipher: Option<SessionCipher>,
}

impl Handshake {
    pub fn new(secret: [u8; 16], user_id: String, phone_info: PhoneInfo) -> Self {
        Self {
            state: HandshakeState::Idle,
            secret,
            user_id,
            phone_info,
            pending: None,
            cipher: None,
        }
    }

    pub fn state(&self) -> &HandshakeState {
        &self.state
    }

    pub fn is_authenticated(&self) -> bool {
        self.state == HandshakeState::Authenticated
    }

    /// Session cipher, once the encrypted handshake has completed.
    pub fn cipher(&self) -> Option<&dyn PayloadCipher> {
        self.cipher.as_ref().map(|c| c as &dyn PayloadCipher)
    }

    pub fn start(&mut self, mode: HandshakeMode) -> Command {
        match mode {
            HandshakeMode::Encrypted => self.start_encrypted(),
            HandshakeMode::ClearText => self.start_clear_text(),
        }
    }

    pub fn start_encrypted(&mut self) -> Command {
        let mut nonce = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut nonce);
        self.start_encrypted_with_nonce(nonce)
    }

    /// Encrypted start with a caller-chosen nonce.
    pub fn start_encrypted_with_nonce(&mut self, phone_nonce: Nonce16) -> Command {
        self.reset();
        info!("AUTH: starting encrypted handshake");
        self.state = HandshakeState::AwaitingWatchNonce { phone_nonce };
        Command::new(
            AUTH_COMMAND_TYPE,
            CMD_NONCE,
            Body::Auth(AuthBody::PhoneNonce { nonce: phone_nonce }),
        )
    }

    pub fn start_clear_text(&mut self) -> Command {
        self.reset();
        info!("AUTH: starting clear-text handshake");
        self.state = HandshakeState::AwaitingUserIdAck;
        Command::new(
            AUTH_COMMAND_TYPE,
            CMD_SEND_USERID,
            Body::Auth(AuthBody::UserId(self.user_id.clone())),
        )
    }

    /// Feed an auth-category command from the watch.
    pub fn handle(&mut self, cmd: &Command) -> Result<Option<HandshakeStep>, LinkError> {
        match (cmd.subtype, &self.state) {
            (CMD_NONCE, HandshakeState::AwaitingWatchNonce { phone_nonce }) => {
                let phone_nonce = *phone_nonce;
                let Body::Auth(AuthBody::WatchNonce { nonce, proof }) = &cmd.body else {
                    return Err(self.fail("nonce reply without watch nonce"));
                };
                self.answer_watch_nonce(&phone_nonce, nonce, proof).map(Some)
            }
            (CMD_AUTH, HandshakeState::AwaitingAuthResult) => {
                if status_of(cmd) != Some(0) {
                    return Err(self.fail("watch rejected auth"));
                }
                let Some(keys) = self.pending.take() else {
                    return Err(self.fail("no pending session keys"));
                };
                self.cipher = Some(SessionCipher::new(keys));
                self.state = HandshakeState::Authenticated;
                info!("AUTH: encrypted session established");
                Ok(Some(HandshakeStep::Authenticated))
            }
            (CMD_SEND_USERID, HandshakeState::AwaitingUserIdAck) => {
                if status_of(cmd) != Some(0) {
                    return Err(self.fail("watch rejected user id"));
                }
                self.state = HandshakeState::Authenticated;
                info!("AUTH: clear-text session established");
                Ok(Some(HandshakeStep::Authenticated))
            }
            (CMD_NONCE | CMD_AUTH | CMD_SEND_USERID, state) => {
                warn!("AUTH: ignoring subtype {} in state {:?}", cmd.subtype, state);
                Ok(None)
            }
            _ => Err(LinkError::UnknownCommand {
                kind: cmd.kind,
                subtype: cmd.subtype,
            }),
        }
    }

    pub fn reset(&mut self) {
        self.state = HandshakeState::Idle;
        self.pending = None;
        self.cipher = None;
    }

    fn answer_watch_nonce(
        &mut self,
        phone_nonce: &Nonce16,
        watch_nonce: &Nonce16,
        proof: &[u8; 32],
    ) -> Result<HandshakeStep, LinkError> {
        let keys = SessionKeys::derive(&self.secret, phone_nonce, watch_nonce);
        if !keys.verify_watch_proof(phone_nonce, watch_nonce, proof) {
            return Err(self.fail("watch proof mismatch, wrong auth key?"));
        }

        let info = postcard::to_allocvec(&self.phone_info)?;
        let sealed_info = SessionCipher::new(keys.clone())
            .seal(0, &info)
            .map_err(|_| self.fail("cannot seal phone info"))?;
        let proof = keys.phone_proof(phone_nonce, watch_nonce);

        self.pending = Some(keys);
        self.state = HandshakeState::AwaitingAuthResult;
        Ok(HandshakeStep::Send(Command::new(
            AUTH_COMMAND_TYPE,
            CMD_AUTH,
            Body::Auth(AuthBody::PhoneProof { proof, sealed_info }),
        )))
    }

    fn fail(&mut self, reason: &str) -> LinkError {
        warn!("AUTH: {reason}");
        self.state = HandshakeState::Failed;
        self.pending = None;
        self.cipher = None;
        LinkError::AuthenticationFailed
    }
}

fn status_of(cmd: &Command) -> Option<u32> {
    match cmd.body {
        Body::Status(status) => Some(status),
        _ => None,
    }
}
