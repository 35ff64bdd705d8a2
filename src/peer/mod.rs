use crate::command::Command;
use crate::dialog::{
    CallDialog, CommandResult, Dialog, DialogResult, LagDialog, RegisterDialog, RegistrarDialog,
};
use crate::event::Event;
use crate::frame::{Frame, FrameShell, Iax2Subclass, DEFAULT_IAX2_PORT};
use crate::{Error, Result};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

pub mod formats;
pub(crate) mod timer;

use timer::{TimerQueue, TimerTarget};

/// Sleep horizon for the run loop when no timer is pending.
const IDLE_POLL_INTERVAL: Duration = Duration::from_secs(3600);

/// Datagram receive buffer size. IAX2 frames comfortably fit a single
/// unfragmented UDP payload.
const RECV_BUF_LEN: usize = 4096;

/// The role decides what unsolicited traffic may open a new dialog: both
/// roles take calls and answer lag requests, but only a server acts as a
/// registrar and originates calls to its registered peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerRole {
    Client,
    Server,
}

/// A handler for events from a peer. Handlers run serially on the peer's
/// event dispatch worker, in registration order.
pub type EventHandler = Box<dyn Fn(&Event) + Send>;

/// A completed inbound registration on a server peer: where the named
/// peer can be reached, and the expiry timer keeping the record alive.
#[derive(Debug)]
pub(crate) struct Registration {
    pub(crate) addr: SocketAddr,
    pub(crate) timer_id: u64,
}

/// An outbound registration queued by the application before `run`.
#[derive(Debug, Clone)]
struct OutboundRegistration {
    username: String,
    addr: SocketAddr,
}

/// Protocol-task state shared with the dialogs: the socket, the timer
/// queue, the event channel and the negotiation parameters. Everything
/// here is touched only from the protocol task and needs no locking.
pub(crate) struct PeerCore {
    pub(crate) socket: Arc<UdpSocket>,
    pub(crate) timers: TimerQueue,
    pub(crate) event_tx: UnboundedSender<Event>,
    pub(crate) capabilities: u32,
    pub(crate) preferred_format: u32,
    pub(crate) reference_time: Instant,
    pub(crate) registrations: HashMap<String, Registration>,
}

impl PeerCore {
    /// Default registration refresh interval
    pub(crate) const DEFAULT_REFRESH: Duration = Duration::from_secs(10);

    /// Encode and transmit a frame. On success the frame is flagged as a
    /// retransmission so that any later physical re-send is labelled as
    /// such on the wire.
    pub(crate) async fn send_frame(&self, frame: &mut Frame, dest: SocketAddr) -> Result<()> {
        let bytes = frame.encode()?;
        trace!("{} -> {}", frame, dest);
        self.socket
            .send_to(&bytes, dest)
            .await
            .map_err(|e| Error::TransportError(e.to_string(), dest))?;
        frame.retransmission = true;
        Ok(())
    }

    /// Queue an event for the dispatch worker.
    pub(crate) fn queue_event(&self, event: Event) {
        if self.event_tx.send(event).is_err() {
            warn!("event dispatch worker is gone, dropping event");
        }
    }

    /// Milliseconds since this peer's reference time, the basis for lag
    /// measurement timestamps.
    pub(crate) fn reference_elapsed_ms(&self) -> u32 {
        crate::time::elapsed_ms(self.reference_time)
    }

    /// Record a completed inbound registration, or refresh the expiry
    /// timer of an existing one. Usernames compare case-insensitively.
    pub(crate) fn register_peer(&mut self, username: &str, addr: SocketAddr) {
        if let Some((key, reg)) = self
            .registrations
            .iter_mut()
            .find(|(key, _)| key.eq_ignore_ascii_case(username))
        {
            debug!("refreshing registration for peer '{}'", key);
            let key = key.clone();
            self.timers.cancel(reg.timer_id);
            reg.timer_id = self
                .timers
                .schedule(Self::DEFAULT_REFRESH, TimerTarget::Registration(key));
            return;
        }

        let timer_id = self.timers.schedule(
            Self::DEFAULT_REFRESH,
            TimerTarget::Registration(username.to_string()),
        );
        self.registrations
            .insert(username.to_string(), Registration { addr, timer_id });
        self.queue_event(Event::RegistrationNew {
            call_num: 0,
            username: username.to_string(),
        });
    }

    /// Resolve an `iax2:<name>` URI against the completed inbound
    /// registrations.
    pub(crate) fn resolve_uri(&self, uri: &str) -> Option<SocketAddr> {
        let name = strip_iax2_scheme(uri)?;
        self.registrations
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, reg)| reg.addr)
    }
}

fn strip_iax2_scheme(uri: &str) -> Option<&str> {
    let scheme = uri.get(..5)?;
    if scheme.eq_ignore_ascii_case("iax2:") {
        Some(&uri[5..])
    } else {
        None
    }
}

pub struct PeerBuilder {
    local_addr: SocketAddr,
    role: PeerRole,
    capabilities: u32,
    cancel_token: Option<CancellationToken>,
}

impl PeerBuilder {
    pub fn new() -> Self {
        PeerBuilder {
            local_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_IAX2_PORT)),
            role: PeerRole::Client,
            capabilities: crate::frame::format::SLINEAR,
            cancel_token: None,
        }
    }

    pub fn local_addr(&mut self, local_addr: SocketAddr) -> &mut Self {
        self.local_addr = local_addr;
        self
    }

    pub fn role(&mut self, role: PeerRole) -> &mut Self {
        self.role = role;
        self
    }

    /// Codec capabilities this peer will offer and accept, as a format
    /// bitmask. The default is just SLINEAR.
    pub fn capabilities(&mut self, capabilities: u32) -> &mut Self {
        self.capabilities = capabilities;
        self
    }

    pub fn cancel_token(&mut self, cancel_token: CancellationToken) -> &mut Self {
        self.cancel_token.replace(cancel_token);
        self
    }

    pub fn build(&mut self) -> Peer {
        let (command_tx, command_rx) = unbounded_channel();
        let (event_tx, event_rx) = unbounded_channel();
        Peer {
            role: self.role,
            local_addr: self.local_addr,
            capabilities: self.capabilities,
            cancel_token: self.cancel_token.take().unwrap_or_default(),
            command_tx,
            command_rx: Some(command_rx),
            event_tx,
            event_rx: Some(event_rx),
            event_handlers: Arc::new(Mutex::new(Vec::new())),
            next_call_num: Arc::new(Mutex::new(1)),
            outbound_registrations: Vec::new(),
        }
    }
}

impl Default for PeerBuilder {
    fn default() -> Self {
        PeerBuilder::new()
    }
}

/// An IAX2 peer
///
/// A peer owns the UDP socket, the dialog table, the timer queue and the
/// queues that connect it to the application. [`Peer::run`] is the
/// blocking protocol task; the application talks to a running peer
/// through a [`PeerHandle`] and hears back through registered event
/// handlers.
pub struct Peer {
    role: PeerRole,
    local_addr: SocketAddr,
    capabilities: u32,
    cancel_token: CancellationToken,
    command_tx: UnboundedSender<Command>,
    command_rx: Option<UnboundedReceiver<Command>>,
    event_tx: UnboundedSender<Event>,
    event_rx: Option<UnboundedReceiver<Event>>,
    event_handlers: Arc<Mutex<Vec<EventHandler>>>,
    next_call_num: Arc<Mutex<u16>>,
    outbound_registrations: Vec<OutboundRegistration>,
}

impl Peer {
    /// A clonable handle for submitting commands from any thread or
    /// task.
    pub fn handle(&self) -> PeerHandle {
        PeerHandle {
            command_tx: self.command_tx.clone(),
            next_call_num: self.next_call_num.clone(),
        }
    }

    /// Register a handler for events from this peer. This is how the
    /// library communicates registrations, call progress and received
    /// media back to the application.
    pub fn register_event_handler<F>(&self, handler: F)
    where
        F: Fn(&Event) + Send + 'static,
    {
        self.event_handlers.lock().unwrap().push(Box::new(handler));
    }

    /// Queue an outbound registration. MUST be called before [`Peer::run`];
    /// the registrations go out as soon as the peer starts and are
    /// refreshed from then on.
    pub fn add_outbound_registration(&mut self, username: &str, addr: SocketAddr) {
        self.outbound_registrations.push(OutboundRegistration {
            username: username.to_string(),
            addr,
        });
    }

    /// Set the codec capability bitmask. This value is global; there is
    /// currently no way to set capabilities per remote peer.
    pub fn set_capabilities(&mut self, capabilities: u32) {
        self.capabilities = capabilities;
    }

    pub fn capabilities(&self) -> u32 {
        self.capabilities
    }

    /// Run the peer until a shutdown command arrives or the cancellation
    /// token fires.
    ///
    /// Binds the socket, sends the queued outbound registrations,
    /// signals `ready` with the bound address and then multiplexes the
    /// socket, the command queue and the timer queue. `select!`'s random
    /// branch ordering keeps the socket and the command queue from
    /// starving each other under load.
    pub async fn run(&mut self, ready: Option<oneshot::Sender<SocketAddr>>) -> Result<()> {
        let mut command_rx = self
            .command_rx
            .take()
            .ok_or_else(|| Error::PeerError("run() may only be called once".to_string()))?;
        let event_rx = self
            .event_rx
            .take()
            .ok_or_else(|| Error::PeerError("run() may only be called once".to_string()))?;

        // bind failure is the only fatal startup condition
        let socket = Arc::new(UdpSocket::bind(self.local_addr).await?);
        info!("iax2 peer listening on {}", socket.local_addr()?);

        let worker = spawn_event_worker(
            event_rx,
            self.event_handlers.clone(),
            self.cancel_token.clone(),
        );

        let mut core = PeerCore {
            socket: socket.clone(),
            timers: TimerQueue::new(),
            event_tx: self.event_tx.clone(),
            capabilities: self.capabilities,
            preferred_format: formats::preferred_format(self.capabilities),
            reference_time: Instant::now(),
            registrations: HashMap::new(),
        };
        let mut dialogs: HashMap<u16, Dialog> = HashMap::new();

        for reg in std::mem::take(&mut self.outbound_registrations) {
            let call_num = alloc_call_num(&self.next_call_num);
            let mut dialog = RegisterDialog::new(call_num, reg.addr, reg.username);
            if let Err(e) = dialog.start(&mut core).await {
                warn!("failed to start registration for call_num {}: {}", call_num, e);
            }
            dialogs.insert(call_num, Dialog::Register(dialog));
        }

        if let Some(ready) = ready {
            ready.send(socket.local_addr()?).ok();
        }

        let role = self.role;
        let mut buf = vec![0u8; RECV_BUF_LEN];
        loop {
            // Run everything that is due, including entries that become
            // due while earlier ones are processed.
            while let Some((_, target)) = core.timers.pop_due(Instant::now()) {
                run_timer(&mut core, &mut dialogs, target).await;
            }

            let deadline = core
                .timers
                .next_deadline()
                .unwrap_or_else(|| Instant::now() + IDLE_POLL_INTERVAL);

            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("peer cancelled");
                    break;
                }
                command = command_rx.recv() => {
                    match command {
                        None | Some(Command::Shutdown) => {
                            info!("peer shutting down");
                            break;
                        }
                        Some(command) => {
                            handle_command(role, &mut core, &mut dialogs, command).await;
                        }
                    }
                }
                received = socket.recv_from(&mut buf) => {
                    match received {
                        Ok((len, src)) => {
                            handle_packet(
                                role,
                                &mut core,
                                &mut dialogs,
                                &self.next_call_num,
                                &buf[..len],
                                src,
                            )
                            .await;
                        }
                        Err(e) => warn!("recv error: {}", e),
                    }
                }
                _ = tokio::time::sleep_until(deadline.into()) => {}
            }
        }

        // teardown destroys every dialog with its pending timer
        dialogs.clear();
        self.cancel_token.cancel();
        worker.await.ok();
        Ok(())
    }
}

/// A clonable handle to a peer, usable from arbitrary threads. Commands
/// enqueue onto the peer's command channel, which wakes the protocol
/// task exactly once per submission.
#[derive(Clone)]
pub struct PeerHandle {
    command_tx: UnboundedSender<Command>,
    next_call_num: Arc<Mutex<u16>>,
}

impl PeerHandle {
    /// Send a command for an active call.
    pub fn send_command(&self, command: Command) -> Result<()> {
        self.command_tx.send(command).map_err(Error::from)
    }

    /// Start a new call to `iax2:<name>`, where `<name>` is a registered
    /// peer. Returns the call number for the new call.
    pub fn new_call(&self, uri: &str) -> Result<u16> {
        let call_num = alloc_call_num(&self.next_call_num);
        self.send_command(Command::NewCall {
            call_num,
            uri: uri.to_string(),
        })?;
        Ok(call_num)
    }

    /// Start a lag measurement against `iax2:<name>`. The result comes
    /// back as an [`Event::Lag`] carrying the round trip milliseconds.
    pub fn new_lag(&self, uri: &str) -> Result<u16> {
        let call_num = alloc_call_num(&self.next_call_num);
        self.send_command(Command::LagRequest {
            call_num,
            uri: uri.to_string(),
        })?;
        Ok(call_num)
    }

    /// Ask the peer's run loop to return.
    pub fn shutdown(&self) {
        self.command_tx.send(Command::Shutdown).ok();
    }
}

/// Allocate the next call number: a lock-guarded counter seeded at 1
/// that stays within the 14-bit space and skips 0 on wrap.
fn alloc_call_num(counter: &Mutex<u16>) -> u16 {
    let mut next = counter.lock().unwrap();
    let num = *next;
    *next = if num >= 0x7FFF { 1 } else { num + 1 };
    num
}

fn spawn_event_worker(
    mut event_rx: UnboundedReceiver<Event>,
    handlers: Arc<Mutex<Vec<EventHandler>>>,
    cancel_token: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                event = event_rx.recv() => {
                    match event {
                        Some(event) => dispatch_event(&handlers, &event),
                        None => break,
                    }
                }
                _ = cancel_token.cancelled() => {
                    // deliver whatever is already queued before leaving
                    while let Ok(event) = event_rx.try_recv() {
                        dispatch_event(&handlers, &event);
                    }
                    break;
                }
            }
        }
    })
}

fn dispatch_event(handlers: &Mutex<Vec<EventHandler>>, event: &Event) {
    trace!("dispatching event {}", event);
    let handlers = handlers.lock().unwrap();
    for handler in handlers.iter() {
        handler(event);
    }
}

async fn run_timer(
    core: &mut PeerCore,
    dialogs: &mut HashMap<u16, Dialog>,
    target: TimerTarget,
) {
    match target {
        TimerTarget::Dialog(call_num) => {
            let Some(dialog) = dialogs.get_mut(&call_num) else {
                debug!("timer fired for unknown call_num {}", call_num);
                return;
            };
            dialog.core_mut().timer_id = 0;
            match dialog.timer_callback(core).await {
                Ok(DialogResult::Success) => {}
                Ok(DialogResult::Destroy) | Ok(DialogResult::Delete) => {
                    remove_dialog(core, dialogs, call_num);
                }
                Ok(DialogResult::Inval) => {
                    warn!("timer produced an invalid transition for call_num {}", call_num);
                }
                Err(e) => warn!("timer callback failed for call_num {}: {}", call_num, e),
            }
        }
        TimerTarget::Registration(username) => {
            if core.registrations.remove(&username).is_some() {
                info!("registration for peer '{}' expired", username);
                core.queue_event(Event::RegistrationExpired {
                    call_num: 0,
                    username,
                });
            }
        }
    }
}

/// Remove a dialog from the table, cancelling its pending timer so the
/// queue never refers to a dead dialog.
fn remove_dialog(core: &mut PeerCore, dialogs: &mut HashMap<u16, Dialog>, call_num: u16) {
    if let Some(dialog) = dialogs.remove(&call_num) {
        let timer_id = dialog.core().timer_id;
        if timer_id != 0 {
            core.timers.cancel(timer_id);
        }
    }
}

async fn handle_command(
    role: PeerRole,
    core: &mut PeerCore,
    dialogs: &mut HashMap<u16, Dialog>,
    command: Command,
) {
    trace!("handling command {}", command);
    match command {
        Command::NewCall { call_num, uri } => {
            if role != PeerRole::Server {
                warn!("only a server peer can originate calls to registered peers");
                return;
            }
            let Some(addr) = core.resolve_uri(&uri) else {
                debug!("no registered peer for uri '{}'", uri);
                return;
            };
            let mut dialog = CallDialog::new(call_num, addr);
            if let Err(e) = dialog.start(core).await {
                warn!("failed to start call {}: {}", call_num, e);
            }
            dialogs.insert(call_num, Dialog::Call(dialog));
        }
        Command::LagRequest { call_num, uri } => {
            if role != PeerRole::Server {
                warn!("only a server peer can send lag requests to registered peers");
                return;
            }
            let Some(addr) = core.resolve_uri(&uri) else {
                debug!("no registered peer for uri '{}'", uri);
                return;
            };
            let mut dialog = LagDialog::new(call_num, addr);
            if let Err(e) = dialog.start(core).await {
                warn!("failed to start lag measurement {}: {}", call_num, e);
            }
            dialogs.insert(call_num, Dialog::Lag(dialog));
        }
        Command::Shutdown => {
            // handled by the run loop before dispatch
        }
        command => {
            let Some(call_num) = command.call_num() else {
                return;
            };
            let Some(dialog) = dialogs.get_mut(&call_num) else {
                debug!("found no dialog for command with call_num {}", call_num);
                return;
            };
            match dialog.process_command(core, &command).await {
                Ok(CommandResult::Success) => {}
                Ok(CommandResult::NoCall) => {
                    debug!("no call for command with call_num {}", call_num);
                }
                Ok(CommandResult::Unsupported) => {
                    debug!("command {} unsupported for call_num {}", command, call_num);
                }
                Err(e) => warn!("command failed for call_num {}: {}", call_num, e),
            }
        }
    }
}

async fn handle_packet(
    role: PeerRole,
    core: &mut PeerCore,
    dialogs: &mut HashMap<u16, Dialog>,
    counter: &Mutex<u16>,
    buf: &[u8],
    src: SocketAddr,
) {
    let frame = match Frame::parse(buf) {
        Ok(frame) => frame,
        Err(e) => {
            warn!("dropping undecodable datagram from {}: {}", src, e);
            return;
        }
    };
    trace!("{} from {}", frame, src);

    let call_num = match frame.iax2_subclass() {
        Some(Iax2Subclass::New) => {
            let call_num = alloc_call_num(counter);
            dialogs.insert(call_num, Dialog::Call(CallDialog::new(call_num, src)));
            call_num
        }
        Some(Iax2Subclass::RegReq) if role == PeerRole::Server => {
            let call_num = alloc_call_num(counter);
            dialogs.insert(
                call_num,
                Dialog::Registrar(RegistrarDialog::new(call_num, src)),
            );
            call_num
        }
        Some(Iax2Subclass::LagRq) => {
            let call_num = alloc_call_num(counter);
            dialogs.insert(call_num, Dialog::Lag(LagDialog::new(call_num, src)));
            call_num
        }
        _ => {
            // destined for an existing dialog, we hope
            let found = if frame.shell == FrameShell::Full {
                dialogs
                    .contains_key(&frame.dest_call_num)
                    .then_some(frame.dest_call_num)
            } else {
                find_dialog_media(dialogs, &frame, src)
            };
            match found {
                Some(call_num) => call_num,
                None => {
                    warn!("no dialog found for {} from {}", frame, src);
                    if frame.shell == FrameShell::Full {
                        send_inval(core, &frame, src).await;
                    }
                    return;
                }
            }
        }
    };

    let Some(dialog) = dialogs.get_mut(&call_num) else {
        return;
    };
    match dialog.process_incoming_frame(core, &frame, src).await {
        Ok(DialogResult::Success) => {}
        Ok(DialogResult::Destroy) | Ok(DialogResult::Delete) => {
            remove_dialog(core, dialogs, call_num);
        }
        Ok(DialogResult::Inval) => {
            warn!("invalid frame for call_num {}: {}", call_num, frame);
            send_inval(core, &frame, src).await;
        }
        Err(e) => warn!("failed to process frame for call_num {}: {}", call_num, e),
    }
}

/// Media frames carry the *source* call number, so the target dialog has
/// to be found by matching the remote side's call number and address
/// rather than our own table key.
fn find_dialog_media(
    dialogs: &HashMap<u16, Dialog>,
    frame: &Frame,
    src: SocketAddr,
) -> Option<u16> {
    dialogs
        .iter()
        .find(|(_, dialog)| {
            let core = dialog.core();
            core.remote_call_num == frame.source_call_num && core.remote_addr == src
        })
        .map(|(call_num, _)| *call_num)
}

async fn send_inval(core: &PeerCore, frame_in: &Frame, src: SocketAddr) {
    // never answer an INVAL with an INVAL
    if frame_in.iax2_subclass() == Some(Iax2Subclass::Inval) {
        return;
    }
    let mut frame = Frame::iax2(Iax2Subclass::Inval)
        .with_call_nums(frame_in.dest_call_num, frame_in.source_call_num)
        .with_timestamp(frame_in.timestamp);
    if let Err(e) = core.send_frame(&mut frame, src).await {
        warn!("failed to send INVAL to {}: {}", src, e);
    }
}
