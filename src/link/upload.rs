//! Chunked bulk upload (command type 22).
//!
//! Flow: request → ack(chunk size) → N × part → N × part ack → done
//!
//! ```text
//! blob = [0, 0, type, md5(16), size u32 LE, bytes.., crc32 u32 LE]
//! part = [total u16 LE, index u16 LE (1-based), blob slice]
//! ack  = [status, index u16 LE]
//! ```
//!
//! One part is in flight at a time; the next goes out when the previous is
//! acknowledged. Only one job per connection. A request while a job is
//! active is refused without touching the job.

use core::fmt;
use log::{debug, info, warn};

use crate::app::commands::{Body, Command, UploadBody};
use crate::error::LinkError;
use crate::firmware::md5_digest;

// ── Constants ────────────────────────────────────────────────

pub const UPLOAD_COMMAND_TYPE: u8 = 22;
pub const CMD_UPLOAD_START: u8 = 0;

pub const TYPE_WATCHFACE: u8 = 16;
pub const TYPE_FIRMWARE: u8 = 32;
pub const TYPE_NOTIFICATION_ICON: u8 = 50;

const PART_HEADER: usize = 4;
/// Chunk size assumed when the watch's ack leaves it at zero.
const DEFAULT_CHUNK_SIZE: usize = 2048;

// ── Job state ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadPhase {
    AwaitingAck,
    Sending { part_size: usize, total: u16, sent: u16 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct UploadJob {
    kind: u8,
    blob: Vec<u8>,
    phase: UploadPhase,
}

/// Who gets progress and completion for the running job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadListener {
    SystemService,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadNotice {
    Progress(u8),
    Finished(Result<(), LinkError>),
}

/// Parts to write on the bulk channel and notices for the listener.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct UploadOutput {
    pub parts: Vec<Vec<u8>>,
    pub notices: Vec<UploadNotice>,
}

impl UploadOutput {
    fn failed() -> Self {
        Self {
            parts: Vec::new(),
            notices: vec![UploadNotice::Finished(Err(LinkError::UploadFailed))],
        }
    }
}

impl fmt::Display for UploadPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AwaitingAck => write!(f, "awaiting ack"),
            Self::Sending { total, sent, .. } => write!(f, "sending {sent}/{total}"),
        }
    }
}

// ── Orchestrator ─────────────────────────────────────────────

pub struct UploadOrchestrator {
    job: Option<UploadJob>,
    listener: Option<UploadListener>,
}

impl UploadOrchestrator {
    pub fn new() -> Self {
        Self {
            job: None,
            listener: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.job.is_some()
    }

    pub fn phase(&self) -> Option<UploadPhase> {
        self.job.as_ref().map(|j| j.phase)
    }

    pub fn listener(&self) -> Option<UploadListener> {
        self.listener
    }

    pub fn set_listener(&mut self, listener: Option<UploadListener>) {
        self.listener = listener;
    }

    /// Start a job. Returns the request command to send.
    pub fn request(&mut self, kind: u8, bytes: &[u8]) -> Result<Command, LinkError> {
        if let Some(job) = &self.job {
            warn!("UPLOAD: refusing type {kind}, type {} is {}", job.kind, job.phase);
            return Err(LinkError::UploadInProgress);
        }

        let digest = md5_digest(bytes);
        let size = bytes.len() as u32;
        let mut blob = Vec::with_capacity(bytes.len() + 27);
        blob.extend_from_slice(&[0, 0, kind]);
        blob.extend_from_slice(&digest);
        blob.extend_from_slice(&size.to_le_bytes());
        blob.extend_from_slice(bytes);
        let crc = crc32fast::hash(&blob);
        blob.extend_from_slice(&crc.to_le_bytes());

        info!("UPLOAD: requesting type {kind}, {size} bytes");
        self.job = Some(UploadJob {
            kind,
            blob,
            phase: UploadPhase::AwaitingAck,
        });

        Ok(Command::new(
            UPLOAD_COMMAND_TYPE,
            CMD_UPLOAD_START,
            Body::Upload(UploadBody::Request {
                kind,
                md5: digest,
                size,
            }),
        ))
    }

    /// Handle an upload-category command. `max_payload` is the largest
    /// bulk write the link currently carries.
    pub fn handle_command(
        &mut self,
        cmd: &Command,
        max_payload: usize,
    ) -> Result<UploadOutput, LinkError> {
        if cmd.subtype != CMD_UPLOAD_START {
            return Err(LinkError::UnknownCommand {
                kind: cmd.kind,
                subtype: cmd.subtype,
            });
        }
        let Body::Upload(UploadBody::Ack { status, chunk_size }) = cmd.body else {
            warn!("UPLOAD: start reply without ack body");
            return Ok(UploadOutput::default());
        };
        let Some(job) = self.job.as_mut() else {
            warn!("UPLOAD: ack with no job");
            return Ok(UploadOutput::default());
        };
        if job.phase != UploadPhase::AwaitingAck {
            warn!("UPLOAD: duplicate ack while {}", job.phase);
            return Ok(UploadOutput::default());
        }
        if status != 0 {
            warn!("UPLOAD: watch refused upload, status {status}");
            self.job = None;
            return Ok(UploadOutput::failed());
        }

        let chunk = match chunk_size as usize {
            0 => DEFAULT_CHUNK_SIZE,
            n => n,
        };
        let part_size = chunk.min(max_payload).saturating_sub(PART_HEADER);
        if part_size == 0 {
            warn!("UPLOAD: no room for part data in {chunk}/{max_payload}-byte writes");
            self.job = None;
            return Ok(UploadOutput::failed());
        }
        let total = job.blob.len().div_ceil(part_size);
        if total > usize::from(u16::MAX) {
            warn!("UPLOAD: cannot split {} bytes into {part_size}-byte parts", job.blob.len());
            self.job = None;
            return Ok(UploadOutput::failed());
        }

        let total = total as u16;
        debug!("UPLOAD: {total} parts of {part_size} bytes");
        job.phase = UploadPhase::Sending {
            part_size,
            total,
            sent: 1,
        };
        Ok(UploadOutput {
            parts: vec![part(&job.blob, part_size, total, 1)],
            notices: Vec::new(),
        })
    }

    /// Handle a part acknowledgement from the bulk channel.
    pub fn handle_ack(&mut self, ack: &[u8]) -> UploadOutput {
        let Some(job) = self.job.as_mut() else {
            debug!("UPLOAD: stray part ack");
            return UploadOutput::default();
        };
        let UploadPhase::Sending {
            part_size,
            total,
            sent,
        } = job.phase
        else {
            warn!("UPLOAD: part ack while {}", job.phase);
            return UploadOutput::default();
        };
        if ack.len() < 3 {
            warn!("UPLOAD: short part ack {ack:02x?}");
            return UploadOutput::default();
        }

        let status = ack[0];
        let index = u16::from_le_bytes([ack[1], ack[2]]);
        if index != sent {
            warn!("UPLOAD: ack for part {index}, expected {sent}");
            return UploadOutput::default();
        }
        if status != 0 {
            warn!("UPLOAD: part {index} rejected, status {status}");
            self.job = None;
            return UploadOutput::failed();
        }

        let percent = (u32::from(index) * 100 / u32::from(total)) as u8;
        let mut out = UploadOutput {
            parts: Vec::new(),
            notices: vec![UploadNotice::Progress(percent)],
        };

        if index == total {
            info!("UPLOAD: type {} complete", job.kind);
            self.job = None;
            out.notices.push(UploadNotice::Finished(Ok(())));
        } else {
            let next = index + 1;
            job.phase = UploadPhase::Sending {
                part_size,
                total,
                sent: next,
            };
            out.parts.push(part(&job.blob, part_size, total, next));
        }
        out
    }

    /// Drop the job and the listener (teardown).
    pub fn abort(&mut self) {
        if let Some(job) = self.job.take() {
            info!("UPLOAD: aborting type {} ({})", job.kind, job.phase);
        }
        self.listener = None;
    }
}

impl Default for UploadOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

fn part(blob: &[u8], part_size: usize, total: u16, index: u16) -> Vec<u8> {
    let start = usize::from(index - 1) * part_size;
    let end = (start + part_size).min(blob.len());
    let mut out = Vec::with_capacity(PART_HEADER + end - start);
    out.extend_from_slice(&total.to_le_bytes());
    out.extend_from_slice(&index.to_le_bytes());
    out.extend_from_slice(&blob[start..end]);
    out
}
