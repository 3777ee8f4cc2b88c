//! Link layer: framing, encryption, reassembly and routing.
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                          Link Stack                           │
//! │                                                               │
//! │  ┌───────────┐   ┌────────────┐   ┌────────┐   ┌───────────┐  │
//! │  │ channels  │──▶│ StreamLink │──▶│ codec  │──▶│ dispatch  │  │
//! │  │ (inbound) │   │ GattLink   │   │ cipher │   │ → Service │  │
//! │  └───────────┘   └────────────┘   └────────┘   └───────────┘  │
//! │                        ▲                            │         │
//! │                        │        ┌───────────────────┘         │
//! │                        │        ▼                             │
//! │  ┌───────────┐   ┌────────────┐   ┌────────┐                  │
//! │  │ RadioPort │◀──│Transaction │◀──│ upload │  (bulk parts)    │
//! │  └───────────┘   └────────────┘   └────────┘                  │
//! └───────────────────────────────────────────────────────────────┘
//! ```

pub mod auth;
pub mod channels;
pub mod cipher;
pub mod codec;
pub mod dispatch;
pub mod gatt;
pub mod reassembly;
pub mod stream;
pub mod transport;
pub mod upload;
