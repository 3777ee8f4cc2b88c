//! Serial-port (SPP) stream link.
//!
//! ```text
//! socket reads ──▶ StreamReassembler ──▶ Frame ──▶ decrypt ──▶ Inbound
//!                                                   │
//!                   proto-rx / proto-tx ──▶ Command ┤
//!                   fitness             ──▶ Activity┤
//!                   mass-storage        ──▶ UploadAck
//! ```
//!
//! The link owns the frame serial and the encryption counter for the whole
//! connection. Outbound commands always go out on proto-tx.

use log::{debug, warn};

use crate::app::commands::Command;
use crate::error::LinkError;

use super::auth::AUTH_COMMAND_TYPE;
use super::codec::{Channel, DataType, Frame, NoCipher, OPCODE_SEND, PayloadCipher};
use super::reassembly::StreamReassembler;
use super::transport::{
    ConnectionState, Discovery, Endpoint, HandshakeMode, Inbound, Link, Transaction,
};

/// Auth subtypes at or above this value travel as data type "auth".
const AUTH_DATA_TYPE_MIN_SUBTYPE: u8 = 17;

/// Default upload part size on the stream.
pub const DEFAULT_STREAM_CHUNK: usize = 2048;

pub struct StreamLink {
    reassembler: StreamReassembler,
    frame_serial: u8,
    encryption_counter: u16,
    chunk_size: usize,
}

impl StreamLink {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            reassembler: StreamReassembler::new(),
            frame_serial: 0,
            encryption_counter: 0,
            chunk_size,
        }
    }

    pub fn frame_serial(&self) -> u8 {
        self.frame_serial
    }

    pub fn encryption_counter(&self) -> u16 {
        self.encryption_counter
    }

    pub fn reassembler(&self) -> &StreamReassembler {
        &self.reassembler
    }

    fn data_type_for(cmd: &Command) -> DataType {
        if cmd.kind == AUTH_COMMAND_TYPE && cmd.subtype >= AUTH_DATA_TYPE_MIN_SUBTYPE {
            DataType::Auth
        } else {
            DataType::Encrypted
        }
    }

    /// Encode `frame` with the next serial, committing counters only on
    /// success.
    fn encode_next(
        &mut self,
        mut frame: Frame,
        cipher: Option<&dyn PayloadCipher>,
    ) -> Result<Vec<u8>, LinkError> {
        frame.serial = self.frame_serial;
        let mut counter = self.encryption_counter;
        let bytes = frame
            .encode(&mut counter, cipher.unwrap_or(&NoCipher))
            .map_err(|e| {
                warn!("SPP: cannot encode frame: {e}");
                LinkError::Codec
            })?;
        self.encryption_counter = counter;
        self.frame_serial = self.frame_serial.wrapping_add(1);
        Ok(bytes)
    }
}

impl Default for StreamLink {
    fn default() -> Self {
        Self::new(DEFAULT_STREAM_CHUNK)
    }
}

impl Link for StreamLink {
    fn tag(&self) -> &'static str {
        "SPP"
    }

    fn bind(&mut self, _discovery: &Discovery) -> Result<HandshakeMode, LinkError> {
        Ok(HandshakeMode::Encrypted)
    }

    fn startup(&self, tx: &mut Transaction) {
        tx.set_state(ConnectionState::Initializing);
    }

    fn receive(
        &mut self,
        endpoint: Endpoint,
        data: &[u8],
        cipher: Option<&dyn PayloadCipher>,
    ) -> Vec<Inbound> {
        if endpoint != Endpoint::Stream {
            warn!("SPP: ignoring data for {endpoint:?}");
            return Vec::new();
        }

        let mut out = Vec::new();
        for frame in self.reassembler.push(data) {
            debug!(
                "SPP: frame ch={:?} serial={} type={:?} len={}",
                frame.channel,
                frame.serial,
                frame.data_type,
                frame.payload.len()
            );

            let payload = if frame.data_type == DataType::Encrypted {
                match cipher.unwrap_or(&NoCipher).open(&frame.payload) {
                    Ok(plain) => plain,
                    Err(e) => {
                        warn!("SPP: dropping frame {}: {e}", frame.serial);
                        continue;
                    }
                }
            } else {
                frame.payload
            };

            match frame.channel {
                Channel::ProtoRx | Channel::ProtoTx => out.push(Inbound::Command(payload)),
                Channel::Fitness => out.push(Inbound::Activity(payload)),
                Channel::MassStorage => out.push(Inbound::UploadAck(payload)),
                other => debug!("SPP: no consumer for channel {other:?}"),
            }
        }
        out
    }

    fn write_command(
        &mut self,
        tx: &mut Transaction,
        cmd: &Command,
        cipher: Option<&dyn PayloadCipher>,
    ) -> Result<(), LinkError> {
        let frame = Frame::command(0, Self::data_type_for(cmd), cmd.to_bytes()?);
        let bytes = self.encode_next(frame, cipher)?;
        debug!("SPP: sending {}/{} ({} bytes)", cmd.kind, cmd.subtype, bytes.len());
        tx.write(Endpoint::Stream, bytes);
        Ok(())
    }

    fn write_bulk(
        &mut self,
        tx: &mut Transaction,
        part: Vec<u8>,
        cipher: Option<&dyn PayloadCipher>,
    ) -> Result<(), LinkError> {
        let frame = Frame {
            channel: Channel::MassStorage,
            flag: true,
            needs_response: false,
            opcode: OPCODE_SEND,
            serial: 0,
            data_type: DataType::Plain,
            payload: part,
        };
        let bytes = self.encode_next(frame, cipher)?;
        tx.write(Endpoint::Stream, bytes);
        Ok(())
    }

    fn max_bulk_payload(&self) -> usize {
        self.chunk_size
    }

    fn reset_counters(&mut self) {
        self.frame_serial = 0;
        self.encryption_counter = 0;
    }

    fn resync(&mut self) {
        if self.reassembler.buffered() > 0 {
            warn!("SPP: input lost, dropping {} buffered bytes", self.reassembler.buffered());
        }
        self.reassembler.reset();
    }

    fn teardown(&mut self) {
        self.reassembler.reset();
        self.reset_counters();
    }
}
