//! Connection session: the core the host drives.
//!
//! [`Session`] owns one [`Link`] plus everything with per-connection state:
//! handshake, dispatcher, System Service, upload orchestrator, the inbound
//! queue, the connection state and the busy flag. It never performs I/O
//! itself; all of it flows through [`HostPorts`] injected at call sites.
//!
//! ```text
//!  radio callback ──▶ InboundQueue ──▶ process_pending ──▶ Link::receive
//!                                                             │
//!      EventSink ◀── Services ◀── Dispatcher ◀── Command ◀────┘
//!                       │
//!      RadioPort ◀── Transaction ◀── Link::write_command
//! ```

use std::sync::Arc;

use log::{debug, error, info, warn};

use crate::config::{Capabilities, LinkConfig};
use crate::error::{Error, LinkError};
use crate::firmware::FirmwareImage;
use crate::link::auth::{Handshake, HandshakeStep};
use crate::link::channels::InboundQueue;
use crate::link::dispatch::{log_handler_error, Dispatcher, Outbox, Route, Service, ServiceContext, UploadRequest};
use crate::link::transport::{ConnectionState, Discovery, Endpoint, Inbound, Link, RadioPort, Transaction};
use crate::link::upload::{UploadListener, UploadNotice, UploadOrchestrator, UploadOutput};

use super::commands::Command;
use super::events::DeviceEvent;
use super::ports::{EventSink, PreferenceStore, TimeSource};
use super::system::SystemService;

/// Host collaborators, borrowed for the duration of one call.
pub struct HostPorts<'a> {
    pub radio: &'a mut dyn RadioPort,
    pub events: &'a mut dyn EventSink,
    pub prefs: &'a dyn PreferenceStore,
    pub clock: &'a dyn TimeSource,
}

pub struct Session<L: Link> {
    link: L,
    handshake: Handshake,
    dispatcher: Dispatcher,
    system: SystemService,
    upload: UploadOrchestrator,
    inbound: Arc<InboundQueue>,
    state: ConnectionState,
    busy: Option<String>,
}

impl<L: Link> Session<L> {
    /// Build a session. Fails if the configuration is unusable.
    pub fn new(link: L, config: &LinkConfig, caps: Capabilities) -> crate::error::Result<Self> {
        config.validate()?;
        let secret = config.secret()?;
        Ok(Self {
            link,
            handshake: Handshake::new(secret, config.user_id.clone(), config.phone_info()),
            dispatcher: Dispatcher::new(),
            system: SystemService::new(caps, config),
            upload: UploadOrchestrator::new(),
            inbound: Arc::new(InboundQueue::new()),
            state: ConnectionState::NotConnected,
            busy: None,
        })
    }

    // ── Accessors ─────────────────────────────────────────────

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn busy(&self) -> Option<&str> {
        self.busy.as_deref()
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn handshake(&self) -> &Handshake {
        &self.handshake
    }

    pub fn system(&self) -> &SystemService {
        &self.system
    }

    pub fn upload(&self) -> &UploadOrchestrator {
        &self.upload
    }

    /// Queue handle for the radio callback context.
    pub fn queue(&self) -> Arc<InboundQueue> {
        Arc::clone(&self.inbound)
    }

    pub fn register_service(&mut self, service: Box<dyn Service>) -> Result<(), LinkError> {
        self.dispatcher.register(service)
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Bind to the discovered layout and start the handshake.
    pub fn connect(&mut self, discovery: &Discovery, io: &mut HostPorts<'_>) -> Result<(), LinkError> {
        if self.state != ConnectionState::NotConnected {
            self.reset_connection();
        }
        self.set_state(ConnectionState::Connecting, io);

        let mode = match self.link.bind(discovery) {
            Ok(mode) => mode,
            Err(e @ LinkError::ResourceIncomplete) => {
                warn!("{}: {e}, waiting for reconnect", self.link.tag());
                self.set_state(ConnectionState::WaitingForReconnect, io);
                return Err(e);
            }
            Err(e) => {
                error!("{}: cannot connect: {e}", self.link.tag());
                self.set_state(ConnectionState::NotConnected, io);
                return Err(e);
            }
        };

        self.system.reset_status();
        self.link.reset_counters();

        let mut tx = Transaction::new("initialize");
        self.link.startup(&mut tx);
        let hello = self.handshake.start(mode);
        let sent = self
            .link
            .write_command(&mut tx, &hello, None)
            .and_then(|()| io.radio.submit(tx));
        if let Err(e) = sent {
            error!("{}: cannot start handshake: {e}", self.link.tag());
            self.reset_connection();
            self.set_state(ConnectionState::NotConnected, io);
            return Err(e);
        }

        info!("{}: connected, handshake {mode:?}", self.link.tag());
        self.set_state(ConnectionState::Initializing, io);
        Ok(())
    }

    /// Tear down everything tied to the connection.
    pub fn disconnect(&mut self, io: &mut HostPorts<'_>) {
        info!("{}: disconnect", self.link.tag());
        self.reset_connection();
        self.set_state(ConnectionState::NotConnected, io);
    }

    fn reset_connection(&mut self) {
        self.upload.abort();
        self.link.teardown();
        self.inbound.clear();
        self.handshake.reset();
        self.system.on_disconnect();
        for service in self.dispatcher.services_mut() {
            service.on_disconnect();
        }
        self.busy = None;
    }

    pub fn on_mtu_changed(&mut self, mtu: usize) {
        self.link.set_mtu(mtu);
    }

    // ── Inbound ───────────────────────────────────────────────

    /// Enqueue received bytes. Safe to call from the radio callback.
    /// Returns `false` if the read was dropped; the link then discards its
    /// partial input before the next read is processed.
    pub fn deliver(&self, endpoint: Endpoint, data: &[u8]) -> bool {
        self.inbound.deliver(endpoint, data)
    }

    /// Drain the inbound queue, one item at a time.
    pub fn process_pending(&mut self, io: &mut HostPorts<'_>) {
        while let Some(chunk) = self.inbound.next() {
            if chunk.resync {
                self.link.resync();
            }
            self.receive_now(chunk.endpoint, &chunk.data, io);
        }
    }

    /// Receive and process in one go, for hosts without a separate
    /// callback context. Anything already queued is handled first; `data`
    /// itself goes straight to the link, whatever its size.
    pub fn on_receive(&mut self, endpoint: Endpoint, data: &[u8], io: &mut HostPorts<'_>) {
        self.process_pending(io);
        if self.inbound.take_lost() {
            self.link.resync();
        }
        self.receive_now(endpoint, data, io);
    }

    fn receive_now(&mut self, endpoint: Endpoint, data: &[u8], io: &mut HostPorts<'_>) {
        let payloads = self.link.receive(endpoint, data, self.handshake.cipher());
        for inbound in payloads {
            self.handle_inbound(inbound, io);
        }
    }

    fn handle_inbound(&mut self, inbound: Inbound, io: &mut HostPorts<'_>) {
        match inbound {
            Inbound::Command(bytes) => {
                if let Some(cmd) = Dispatcher::decode(&bytes) {
                    self.dispatch(cmd, io);
                }
            }
            Inbound::Activity(bytes) => io.events.emit(&DeviceEvent::ActivityData(bytes)),
            Inbound::UploadAck(bytes) => {
                let out = self.upload.handle_ack(&bytes);
                self.apply_upload_output(out, io);
            }
        }
    }

    fn dispatch(&mut self, cmd: Command, io: &mut HostPorts<'_>) {
        debug!("{}: received {}/{}", self.link.tag(), cmd.kind, cmd.subtype);
        match self.dispatcher.route(cmd.kind) {
            Some(Route::Auth) => self.handle_auth(&cmd, io),
            Some(Route::System) => {
                let mut ctx = ServiceContext::new(io.prefs, io.clock);
                if let Err(e) = self.system.handle_command(&cmd, &mut ctx) {
                    log_handler_error(&cmd, &e);
                }
                self.flush(ctx.out, io);
            }
            Some(Route::Upload) => match self.upload.handle_command(&cmd, self.link.max_bulk_payload()) {
                Ok(out) => self.apply_upload_output(out, io),
                Err(e) => log_handler_error(&cmd, &e),
            },
            Some(Route::Registered(index)) => {
                let mut ctx = ServiceContext::new(io.prefs, io.clock);
                if let Some(service) = self.dispatcher.service_mut(index) {
                    if let Err(e) = service.handle_command(&cmd, &mut ctx) {
                        log_handler_error(&cmd, &e);
                    }
                }
                self.flush(ctx.out, io);
            }
            None => log_handler_error(
                &cmd,
                &LinkError::UnknownCommand {
                    kind: cmd.kind,
                    subtype: cmd.subtype,
                },
            ),
        }
    }

    fn handle_auth(&mut self, cmd: &Command, io: &mut HostPorts<'_>) {
        match self.handshake.handle(cmd) {
            Ok(Some(HandshakeStep::Send(reply))) => {
                if let Err(e) = self.send_command("auth step", reply, io) {
                    warn!("AUTH: cannot send reply: {e}");
                }
            }
            Ok(Some(HandshakeStep::Authenticated)) => self.on_authenticated(io),
            Ok(None) => {}
            Err(LinkError::AuthenticationFailed) => {
                error!("{}: authentication failed", self.link.tag());
                io.events.emit(&DeviceEvent::AuthenticationFailed);
                self.reset_connection();
                self.set_state(ConnectionState::NotConnected, io);
            }
            Err(e) => log_handler_error(cmd, &e),
        }
    }

    fn on_authenticated(&mut self, io: &mut HostPorts<'_>) {
        self.link.reset_counters();

        let mut tx = Transaction::new("initialized");
        tx.set_state(ConnectionState::Initialized);
        if let Err(e) = io.radio.submit(tx) {
            warn!("{}: cannot queue state change: {e}", self.link.tag());
        }
        self.set_state(ConnectionState::Initialized, io);

        let mut ctx = ServiceContext::new(io.prefs, io.clock);
        self.system.initialize(&mut ctx);
        for service in self.dispatcher.services_mut() {
            service.initialize(&mut ctx);
        }
        self.flush(ctx.out, io);
    }

    // ── Outbound ──────────────────────────────────────────────

    /// Encode `cmd` into `tx` with the link's next serial and counter.
    pub fn send_command_in(&mut self, tx: &mut Transaction, cmd: &Command) -> Result<(), LinkError> {
        self.link.write_command(tx, cmd, self.handshake.cipher())
    }

    /// Send `cmd` in its own transaction named `task`.
    pub fn send_command(&mut self, task: &str, cmd: Command, io: &mut HostPorts<'_>) -> Result<(), LinkError> {
        let mut tx = Transaction::new(task);
        self.send_command_in(&mut tx, &cmd)?;
        io.radio.submit(tx)
    }

    /// Write out what a handler produced: events, then commands, then any
    /// upload it asked for.
    fn flush(&mut self, out: Outbox, io: &mut HostPorts<'_>) {
        for event in out.events {
            if let DeviceEvent::Busy(task) = &event {
                self.busy = task.clone();
            }
            io.events.emit(&event);
        }
        for (task, cmd) in out.commands {
            if let Err(e) = self.send_command(&task, cmd, io) {
                warn!("{}: cannot send {task}: {e}", self.link.tag());
            }
        }
        if let Some(request) = out.upload {
            self.start_upload(request, io);
        }
    }

    fn start_upload(&mut self, request: UploadRequest, io: &mut HostPorts<'_>) {
        let UploadRequest {
            kind,
            bytes,
            listener,
        } = request;
        let cmd = match self.upload.request(kind, &bytes) {
            Ok(cmd) => cmd,
            Err(e) => {
                warn!("UPLOAD: {e}");
                self.finish_for(listener, false, io);
                return;
            }
        };
        self.upload.set_listener(Some(listener));
        if let Err(e) = self.send_command("upload request", cmd, io) {
            warn!("UPLOAD: cannot send request: {e}");
            self.upload.abort();
            self.finish_for(listener, false, io);
        }
    }

    fn apply_upload_output(&mut self, out: UploadOutput, io: &mut HostPorts<'_>) {
        let mut tx = Transaction::new("upload part");
        for part in out.parts {
            if let Err(e) = self.link.write_bulk(&mut tx, part, self.handshake.cipher()) {
                warn!("UPLOAD: cannot write part: {e}");
                let listener = self.upload.listener();
                self.upload.abort();
                if let Some(listener) = listener {
                    self.finish_for(listener, false, io);
                }
                return;
            }
        }

        let mut finished = None;
        for notice in out.notices {
            match (notice, self.upload.listener()) {
                (UploadNotice::Progress(percent), Some(UploadListener::SystemService)) => {
                    self.system.on_upload_progress(percent, &mut tx);
                }
                (UploadNotice::Finished(result), Some(listener)) => {
                    self.upload.set_listener(None);
                    if let Err(e) = result {
                        warn!("UPLOAD: {e}");
                    }
                    finished = Some((listener, result.is_ok()));
                }
                (notice, None) => debug!("UPLOAD: {notice:?} with no listener"),
            }
        }

        if !tx.is_empty() {
            if let Err(e) = io.radio.submit(tx) {
                warn!("UPLOAD: cannot queue upload ops: {e}");
            }
        }
        if let Some((listener, success)) = finished {
            self.finish_for(listener, success, io);
        }
    }

    fn finish_for(&mut self, listener: UploadListener, success: bool, io: &mut HostPorts<'_>) {
        let mut out = Outbox::new();
        match listener {
            UploadListener::SystemService => self.system.on_upload_finish(success, &mut out),
        }
        self.flush(out, io);
    }

    // ── Host operations ───────────────────────────────────────

    fn ensure_initialized(&self) -> Result<(), LinkError> {
        if self.state == ConnectionState::Initialized {
            Ok(())
        } else {
            Err(LinkError::NotConnected)
        }
    }

    /// Start a firmware install. The upload follows once the watch agrees.
    pub fn install_firmware(&mut self, image: FirmwareImage, io: &mut HostPorts<'_>) -> crate::error::Result<()> {
        self.ensure_initialized().map_err(Error::Link)?;
        let mut out = Outbox::new();
        self.system.install_firmware(image, &mut out)?;
        self.flush(out, io);
        Ok(())
    }

    /// A host preference changed; push it to the watch. Returns `false`
    /// if no service handles `key`.
    pub fn send_configuration(&mut self, key: &str, io: &mut HostPorts<'_>) -> bool {
        if self.ensure_initialized().is_err() {
            debug!("{}: not connected, skipping config {key}", self.link.tag());
            return false;
        }
        let mut ctx = ServiceContext::new(io.prefs, io.clock);
        let mut handled = self.system.send_configuration(key, &mut ctx);
        if !handled {
            for service in self.dispatcher.services_mut() {
                if service.send_configuration(key, &mut ctx) {
                    handled = true;
                    break;
                }
            }
        }
        self.flush(ctx.out, io);
        if !handled {
            debug!("{}: no service for config {key}", self.link.tag());
        }
        handled
    }

    pub fn set_current_time(&mut self, io: &mut HostPorts<'_>) -> Result<(), LinkError> {
        self.ensure_initialized()?;
        let mut ctx = ServiceContext::new(io.prefs, io.clock);
        self.system.set_current_time(&mut ctx);
        self.flush(ctx.out, io);
        Ok(())
    }

    pub fn find_phone_stop(&mut self, io: &mut HostPorts<'_>) -> Result<(), LinkError> {
        self.ensure_initialized()?;
        let mut out = Outbox::new();
        self.system.find_phone_stop(&mut out);
        self.flush(out, io);
        Ok(())
    }

    pub fn find_watch(&mut self, start: bool, io: &mut HostPorts<'_>) -> Result<(), LinkError> {
        self.ensure_initialized()?;
        let mut out = Outbox::new();
        self.system.find_watch(start, &mut out)?;
        self.flush(out, io);
        Ok(())
    }

    pub fn set_vibration_preset(
        &mut self,
        notification: &str,
        preset: u32,
        io: &mut HostPorts<'_>,
    ) -> Result<(), LinkError> {
        self.ensure_initialized()?;
        let mut out = Outbox::new();
        self.system.set_vibration_preset(notification, preset, &mut out)?;
        self.flush(out, io);
        Ok(())
    }

    fn set_state(&mut self, state: ConnectionState, io: &mut HostPorts<'_>) {
        if self.state != state {
            debug!("{}: {:?} -> {:?}", self.link.tag(), self.state, state);
        }
        self.state = state;
        io.events.emit(&DeviceEvent::ConnectionState(state));
    }
}
