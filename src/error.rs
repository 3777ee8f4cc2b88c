//! Unified error types for the wearlink protocol engine.
//!
//! Every subsystem has its own small `Copy` enum; the top-level [`Error`]
//! wraps them so the session and the CLI can funnel failures through one
//! type. Framing errors stay inside the link layer, only handshake and
//! upload failures are meant to reach the user.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A streaming-transport frame could not be decoded.
    Frame(FrameError),
    /// Payload encryption or decryption failed.
    Cipher(CipherError),
    /// Connection, handshake, dispatch or upload failure.
    Link(LinkError),
    /// A firmware image was rejected.
    Firmware(FirmwareError),
    /// Configuration is invalid.
    Config(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Frame(e) => write!(f, "frame: {e}"),
            Self::Cipher(e) => write!(f, "cipher: {e}"),
            Self::Link(e) => write!(f, "link: {e}"),
            Self::Firmware(e) => write!(f, "firmware: {e}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

impl core::error::Error for Error {}

// ---------------------------------------------------------------------------
// Frame errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// Fewer bytes than the frame declares. Retry once more bytes arrive.
    Incomplete,
    /// Bad preamble, epilogue or length field.
    Malformed,
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Incomplete => write!(f, "incomplete frame"),
            Self::Malformed => write!(f, "malformed frame"),
        }
    }
}

impl From<FrameError> for Error {
    fn from(e: FrameError) -> Self {
        Self::Frame(e)
    }
}

// ---------------------------------------------------------------------------
// Cipher errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherError {
    /// No session keys yet; the handshake has not completed.
    NoSessionKeys,
    /// Encrypted payload shorter than the counter prefix plus tag.
    Truncated,
    /// AEAD seal failed.
    EncryptFailed,
    /// AEAD open failed (bad tag or wrong counter).
    DecryptFailed,
}

impl fmt::Display for CipherError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSessionKeys => write!(f, "session keys not established"),
            Self::Truncated => write!(f, "encrypted payload truncated"),
            Self::EncryptFailed => write!(f, "encryption failed"),
            Self::DecryptFailed => write!(f, "decryption failed"),
        }
    }
}

impl From<CipherError> for Error {
    fn from(e: CipherError) -> Self {
        Self::Cipher(e)
    }
}

// ---------------------------------------------------------------------------
// Link errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkError {
    /// No known service template matched the discovered resources.
    UnknownService,
    /// A known service was found but some of its resources are missing.
    ResourceIncomplete,
    /// The handshake was rejected or the device proof did not verify.
    AuthenticationFailed,
    /// No handler for this (major type, subtype) pair.
    UnknownCommand { kind: u8, subtype: u8 },
    /// An upload is already running on this connection.
    UploadInProgress,
    /// The device rejected or aborted an upload.
    UploadFailed,
    /// Command bytes could not be encoded or decoded.
    Codec,
    /// The host radio refused a transaction.
    Radio,
    /// Operation requires an initialized connection.
    NotConnected,
    /// The model capabilities do not allow this operation.
    Unsupported,
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownService => write!(f, "no matching service template"),
            Self::ResourceIncomplete => write!(f, "service resources incomplete"),
            Self::AuthenticationFailed => write!(f, "authentication failed"),
            Self::UnknownCommand { kind, subtype } => {
                write!(f, "unknown command {kind}/{subtype}")
            }
            Self::UploadInProgress => write!(f, "upload already in progress"),
            Self::UploadFailed => write!(f, "upload failed"),
            Self::Codec => write!(f, "command codec error"),
            Self::Radio => write!(f, "radio rejected transaction"),
            Self::NotConnected => write!(f, "not connected"),
            Self::Unsupported => write!(f, "not supported by this model"),
        }
    }
}

impl From<LinkError> for Error {
    fn from(e: LinkError) -> Self {
        Self::Link(e)
    }
}

impl From<postcard::Error> for LinkError {
    fn from(_: postcard::Error) -> Self {
        Self::Codec
    }
}

// ---------------------------------------------------------------------------
// Firmware errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirmwareError {
    /// Header does not match any known image kind.
    UnknownFormat,
    /// Image is valid but not an installable firmware (watchface, GPS, ...).
    NotFirmware,
    /// Image is empty.
    Empty,
}

impl fmt::Display for FirmwareError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownFormat => write!(f, "unrecognised image header"),
            Self::NotFirmware => write!(f, "image is not a firmware"),
            Self::Empty => write!(f, "image is empty"),
        }
    }
}

impl From<FirmwareError> for Error {
    fn from(e: FirmwareError) -> Self {
        Self::Firmware(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

pub type Result<T> = core::result::Result<T, Error>;
