//! Command dispatcher.
//!
//! Routes decoded [`Command`]s to their owner by major type. The auth,
//! system and upload categories are built in and handled by the session
//! directly; hosts can register further [`Service`]s for other categories.
//!
//! ```text
//!  command bytes ──▶ decode ──▶ route(kind) ──┬──▶ Auth      (handshake)
//!                                             ├──▶ System    (SystemService)
//!                                             ├──▶ Upload    (orchestrator)
//!                                             └──▶ Registered(n)
//! ```
//!
//! Handlers never touch the radio. They record what they want sent and
//! emitted in an [`Outbox`], which the session flushes in order once the
//! handler returns.

use std::collections::BTreeMap;

use log::{debug, warn};

use crate::app::commands::Command;
use crate::app::events::DeviceEvent;
use crate::app::ports::{PreferenceStore, TimeSource};
use crate::app::system::SYSTEM_COMMAND_TYPE;
use crate::error::LinkError;

use super::auth::AUTH_COMMAND_TYPE;
use super::upload::{UploadListener, UPLOAD_COMMAND_TYPE};

// ── Outbox ───────────────────────────────────────────────────

/// Upload a Service asked for, with the listener that gets its notices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    pub kind: u8,
    pub bytes: Vec<u8>,
    pub listener: UploadListener,
}

/// Side effects a handler produced, in the order it produced them.
#[derive(Debug, Default)]
pub struct Outbox {
    pub commands: Vec<(String, Command)>,
    pub events: Vec<DeviceEvent>,
    pub upload: Option<UploadRequest>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a command under a task name (the transaction name).
    pub fn send(&mut self, task: impl Into<String>, cmd: Command) {
        self.commands.push((task.into(), cmd));
    }

    pub fn emit(&mut self, event: DeviceEvent) {
        self.events.push(event);
    }

    pub fn start_upload(&mut self, kind: u8, bytes: Vec<u8>, listener: UploadListener) {
        self.upload = Some(UploadRequest {
            kind,
            bytes,
            listener,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty() && self.events.is_empty() && self.upload.is_none()
    }
}

/// What a Service handler can see of the host, plus where it writes.
pub struct ServiceContext<'a> {
    pub prefs: &'a dyn PreferenceStore,
    pub clock: &'a dyn TimeSource,
    pub out: Outbox,
}

impl<'a> ServiceContext<'a> {
    pub fn new(prefs: &'a dyn PreferenceStore, clock: &'a dyn TimeSource) -> Self {
        Self {
            prefs,
            clock,
            out: Outbox::new(),
        }
    }
}

// ── Service seam ─────────────────────────────────────────────

/// A handler for one command category.
pub trait Service {
    /// Major type this service owns.
    fn command_type(&self) -> u8;

    /// Requests to send once the connection is authenticated.
    fn initialize(&mut self, _ctx: &mut ServiceContext<'_>) {}

    /// Handle one inbound command. Return [`LinkError::UnknownCommand`] for
    /// subtypes this service does not know.
    fn handle_command(&mut self, cmd: &Command, ctx: &mut ServiceContext<'_>)
    -> Result<(), LinkError>;

    /// A host preference changed. Returns `true` if the key was consumed.
    fn send_configuration(&mut self, _key: &str, _ctx: &mut ServiceContext<'_>) -> bool {
        false
    }

    /// Drop per-connection state.
    fn on_disconnect(&mut self) {}
}

// ── Dispatcher ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Auth,
    System,
    Upload,
    /// Index into the registered services.
    Registered(usize),
}

pub struct Dispatcher {
    routes: BTreeMap<u8, Route>,
    services: Vec<Box<dyn Service>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        let routes = BTreeMap::from([
            (AUTH_COMMAND_TYPE, Route::Auth),
            (SYSTEM_COMMAND_TYPE, Route::System),
            (UPLOAD_COMMAND_TYPE, Route::Upload),
        ]);
        Self {
            routes,
            services: Vec::new(),
        }
    }

    /// Register a host service. Built-in categories cannot be taken over,
    /// and a second registration for a category replaces the first.
    pub fn register(&mut self, service: Box<dyn Service>) -> Result<(), LinkError> {
        let kind = service.command_type();
        match self.routes.get(&kind) {
            Some(Route::Registered(index)) => {
                debug!("dispatch: replacing service for type {kind}");
                self.services[*index] = service;
                Ok(())
            }
            Some(_) => {
                warn!("dispatch: type {kind} is built in");
                Err(LinkError::Unsupported)
            }
            None => {
                self.routes.insert(kind, Route::Registered(self.services.len()));
                self.services.push(service);
                Ok(())
            }
        }
    }

    pub fn route(&self, kind: u8) -> Option<Route> {
        self.routes.get(&kind).copied()
    }

    /// Decode command bytes, logging anything undecodable.
    pub fn decode(bytes: &[u8]) -> Option<Command> {
        match Command::from_bytes(bytes) {
            Ok(cmd) => Some(cmd),
            Err(e) => {
                warn!("dispatch: dropping {} undecodable bytes: {e}", bytes.len());
                None
            }
        }
    }

    pub fn service_mut(&mut self, index: usize) -> Option<&mut (dyn Service + 'static)> {
        self.services.get_mut(index).map(|s| s.as_mut())
    }

    pub fn services_mut(&mut self) -> impl Iterator<Item = &mut (dyn Service + 'static)> {
        self.services.iter_mut().map(|s| s.as_mut())
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Log a handler error. Nothing past the dispatcher sees it.
pub fn log_handler_error(cmd: &Command, err: &LinkError) {
    match err {
        LinkError::UnknownCommand { kind, subtype } => {
            warn!("dispatch: unknown command {kind}/{subtype}, dropped");
        }
        other => warn!("dispatch: {}/{} failed: {other}", cmd.kind, cmd.subtype),
    }
}
