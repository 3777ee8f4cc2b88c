//! BLE GATT link: four characteristics, no shared envelope.
//!
//! The watch exposes one of a few known service layouts. Discovery results
//! are matched against [`TEMPLATES`] and the four logical channels are bound
//! to concrete characteristics:
//!
//! | Channel       | Direction | FE95 (encrypted) | FDAB (clear) |
//! |---------------|-----------|------------------|--------------|
//! | command read  | notify    | `0051`           | `0001`       |
//! | command write | write     | `0052`           | `0002`       |
//! | activity data | notify    | `0053`           | `0003`       |
//! | bulk upload   | write     | `0055`           | `0004`       |
//!
//! Values are raw command bytes. On an encrypted layout, once session keys
//! exist, each value is `counter u16 LE || AES-CCM ciphertext`. Every
//! characteristic keeps its own counter; the bulk-upload one never advances.

use log::{debug, info, warn};

use crate::app::commands::Command;
use crate::error::LinkError;

use super::codec::PayloadCipher;
use super::transport::{
    ConnectionState, Discovery, Endpoint, HandshakeMode, Inbound, Link, Transaction,
};

// ── Constants ────────────────────────────────────────────────

/// Expand a 16-bit Bluetooth SIG short id onto the base UUID.
pub const fn bt_uuid(short: u16) -> u128 {
    ((short as u128) << 96) | 0x0000_0000_0000_1000_8000_0080_5f9b_34fb
}

pub const DEFAULT_MTU: usize = 23;
pub const MTU_REQUEST: u16 = 247;

/// ATT write header.
const ATT_OVERHEAD: usize = 3;
/// Counter prefix plus CCM tag.
const SEAL_OVERHEAD: usize = 2 + 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceTemplate {
    pub service: u128,
    pub command_read: u128,
    pub command_write: u128,
    pub activity_data: u128,
    pub data_upload: u128,
    pub encrypted: bool,
}

impl ServiceTemplate {
    fn resources(&self) -> [u128; 4] {
        [
            self.command_read,
            self.command_write,
            self.activity_data,
            self.data_upload,
        ]
    }
}

pub const TEMPLATES: [ServiceTemplate; 2] = [
    ServiceTemplate {
        service: bt_uuid(0xFE95),
        command_read: bt_uuid(0x0051),
        command_write: bt_uuid(0x0052),
        activity_data: bt_uuid(0x0053),
        data_upload: bt_uuid(0x0055),
        encrypted: true,
    },
    ServiceTemplate {
        service: bt_uuid(0xFDAB),
        command_read: bt_uuid(0x0001),
        command_write: bt_uuid(0x0002),
        activity_data: bt_uuid(0x0003),
        data_upload: bt_uuid(0x0004),
        encrypted: false,
    },
];

// ── Per-characteristic codec ─────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub uuid: u128,
    encrypted: bool,
    increments: bool,
    counter: u16,
}

impl Resource {
    fn new(uuid: u128, encrypted: bool) -> Self {
        Self {
            uuid,
            encrypted,
            increments: true,
            counter: 0,
        }
    }

    pub fn counter(&self) -> u16 {
        self.counter
    }

    fn encode(&mut self, value: Vec<u8>, cipher: Option<&dyn PayloadCipher>) -> Result<Vec<u8>, LinkError> {
        let Some(cipher) = cipher.filter(|_| self.encrypted) else {
            return Ok(value);
        };

        let counter = if self.increments {
            self.counter.wrapping_add(1)
        } else {
            self.counter
        };
        let sealed = cipher.seal(counter, &value).map_err(|e| {
            warn!("BLE: cannot seal value for {:032x}: {e}", self.uuid);
            LinkError::Codec
        })?;
        self.counter = counter;

        let mut out = Vec::with_capacity(2 + sealed.len());
        out.extend_from_slice(&counter.to_le_bytes());
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    fn decode(&self, value: &[u8], cipher: Option<&dyn PayloadCipher>) -> Option<Vec<u8>> {
        let Some(cipher) = cipher.filter(|_| self.encrypted) else {
            return Some(value.to_vec());
        };
        match cipher.open(value) {
            Ok(plain) => Some(plain),
            Err(e) => {
                warn!("BLE: dropping value from {:032x}: {e}", self.uuid);
                None
            }
        }
    }

    fn reset(&mut self) {
        self.counter = 0;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundResources {
    pub command_read: Resource,
    pub command_write: Resource,
    pub activity_data: Resource,
    pub data_upload: Resource,
    pub encrypted: bool,
}

impl BoundResources {
    fn from_template(t: &ServiceTemplate) -> Self {
        let mut data_upload = Resource::new(t.data_upload, t.encrypted);
        data_upload.increments = false;
        Self {
            command_read: Resource::new(t.command_read, t.encrypted),
            command_write: Resource::new(t.command_write, t.encrypted),
            activity_data: Resource::new(t.activity_data, t.encrypted),
            data_upload,
            encrypted: t.encrypted,
        }
    }

    fn all_mut(&mut self) -> [&mut Resource; 4] {
        [
            &mut self.command_read,
            &mut self.command_write,
            &mut self.activity_data,
            &mut self.data_upload,
        ]
    }
}

// ── GATT link ────────────────────────────────────────────────

pub struct GattLink {
    templates: Vec<ServiceTemplate>,
    bound: Option<BoundResources>,
    mtu: usize,
    mtu_request: u16,
}

impl GattLink {
    pub fn new(mtu_request: u16) -> Self {
        Self::with_templates(TEMPLATES.to_vec(), mtu_request)
    }

    pub fn with_templates(templates: Vec<ServiceTemplate>, mtu_request: u16) -> Self {
        Self {
            templates,
            bound: None,
            mtu: DEFAULT_MTU,
            mtu_request,
        }
    }

    pub fn bound(&self) -> Option<&BoundResources> {
        self.bound.as_ref()
    }
}

impl Default for GattLink {
    fn default() -> Self {
        Self::new(MTU_REQUEST)
    }
}

impl Link for GattLink {
    fn tag(&self) -> &'static str {
        "BLE"
    }

    fn bind(&mut self, discovery: &Discovery) -> Result<HandshakeMode, LinkError> {
        self.bound = None;
        let mut partial = false;

        for template in &self.templates {
            let Some(service) = discovery.service(template.service) else {
                continue;
            };
            let missing = template
                .resources()
                .iter()
                .filter(|uuid| !service.characteristics.contains(uuid))
                .count();
            if missing > 0 {
                warn!(
                    "BLE: service {:032x} found but {missing} characteristic(s) missing",
                    template.service
                );
                partial = true;
                continue;
            }

            info!(
                "BLE: bound service {:032x} (encrypted={})",
                template.service, template.encrypted
            );
            self.bound = Some(BoundResources::from_template(template));
            return Ok(if template.encrypted {
                HandshakeMode::Encrypted
            } else {
                HandshakeMode::ClearText
            });
        }

        if partial {
            Err(LinkError::ResourceIncomplete)
        } else {
            Err(LinkError::UnknownService)
        }
    }

    fn startup(&self, tx: &mut Transaction) {
        tx.request_mtu(self.mtu_request);
        tx.set_state(ConnectionState::Initializing);
        if let Some(b) = &self.bound {
            for uuid in [
                b.command_write.uuid,
                b.command_read.uuid,
                b.activity_data.uuid,
                b.data_upload.uuid,
            ] {
                tx.subscribe(Endpoint::Resource(uuid));
            }
        }
    }

    fn receive(
        &mut self,
        endpoint: Endpoint,
        data: &[u8],
        cipher: Option<&dyn PayloadCipher>,
    ) -> Vec<Inbound> {
        let (Endpoint::Resource(uuid), Some(b)) = (endpoint, &self.bound) else {
            warn!("BLE: unexpected data on {endpoint:?}");
            return Vec::new();
        };

        let inbound = if uuid == b.command_read.uuid || uuid == b.command_write.uuid {
            let res = if uuid == b.command_read.uuid {
                &b.command_read
            } else {
                &b.command_write
            };
            res.decode(data, cipher).map(Inbound::Command)
        } else if uuid == b.activity_data.uuid {
            b.activity_data.decode(data, cipher).map(Inbound::Activity)
        } else if uuid == b.data_upload.uuid {
            // Part acks arrive unsealed on both layouts.
            Some(Inbound::UploadAck(data.to_vec()))
        } else {
            warn!("BLE: unhandled characteristic {uuid:032x}");
            None
        };

        inbound.into_iter().collect()
    }

    fn write_command(
        &mut self,
        tx: &mut Transaction,
        cmd: &Command,
        cipher: Option<&dyn PayloadCipher>,
    ) -> Result<(), LinkError> {
        let Some(b) = self.bound.as_mut() else {
            warn!("BLE: command write characteristic not bound, dropping {}/{}", cmd.kind, cmd.subtype);
            return Err(LinkError::NotConnected);
        };
        let value = b.command_write.encode(cmd.to_bytes()?, cipher)?;
        debug!("BLE: sending {}/{} ({} bytes)", cmd.kind, cmd.subtype, value.len());
        tx.write(Endpoint::Resource(b.command_write.uuid), value);
        Ok(())
    }

    fn write_bulk(
        &mut self,
        tx: &mut Transaction,
        part: Vec<u8>,
        cipher: Option<&dyn PayloadCipher>,
    ) -> Result<(), LinkError> {
        let Some(b) = self.bound.as_mut() else {
            return Err(LinkError::NotConnected);
        };
        let value = b.data_upload.encode(part, cipher)?;
        tx.write(Endpoint::Resource(b.data_upload.uuid), value);
        Ok(())
    }

    fn max_bulk_payload(&self) -> usize {
        let seal = match &self.bound {
            Some(b) if b.encrypted => SEAL_OVERHEAD,
            _ => 0,
        };
        self.mtu.saturating_sub(ATT_OVERHEAD + seal)
    }

    fn set_mtu(&mut self, mtu: usize) {
        info!("BLE: MTU now {mtu}");
        self.mtu = mtu;
    }

    fn reset_counters(&mut self) {
        if let Some(b) = self.bound.as_mut() {
            for res in b.all_mut() {
                res.reset();
            }
        }
    }

    fn teardown(&mut self) {
        self.bound = None;
        self.mtu = DEFAULT_MTU;
    }
}
