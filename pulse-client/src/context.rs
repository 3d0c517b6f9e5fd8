//! Connection contexts: the top-level client handle, owning the server address list, autospawn
//! lifecycle, packet stream, dispatcher, and memory pool.
//!
//! A context is the basic object for a connection to a server. It multiplexes commands and
//! events through a single channel. There is no need for more than one context per application
//! unless connections to multiple servers are needed.
//!
//! All operations are asynchronous: the caller is handed an [`Operation`] and observes progress
//! via callbacks run from the owning [`Mainloop`].

use crate::addr::{self, ServerAddr};
use crate::autospawn::{self, AutospawnLock};
use crate::mainloop::{EventId, IoEventFlags, Mainloop};
use crate::operation::{self, Operation, OperationHandle};
use pulse_protocol::command::Command;
use pulse_protocol::error::PulseError;
use pulse_protocol::iochannel::{IoChannel, UnixChannel};
use pulse_protocol::memblock::Pool;
use pulse_protocol::pdispatch::{PDispatch, ReplyOutcome};
use pulse_protocol::proplist::{properties, Proplist};
use pulse_protocol::pstream::PStream;
use pulse_protocol::tagstruct::TagStructWriter;
use std::cell::RefCell;
use std::collections::HashMap;
use std::net::TcpStream;
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::rc::{Rc, Weak};

/// Minimum protocol version this client understands. A server negotiating anything older fails
/// the connect attempt with [`PulseError::Version`].
const PROTOCOL_VERSION_MIN: u16 = 8;
/// Highest protocol version this client speaks; sent as the client half of the `AUTH` negotiation.
const PROTOCOL_VERSION_MAX: u16 = 32;
/// Protocol version at which the server accepts a property list (rather than a bare string) in
/// `SET_CLIENT_NAME`.
const PROTOCOL_VERSION_PROPLIST: u16 = 13;
const COOKIE_LENGTH: usize = 256;

/// The state of a connection context.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum State {
    /// The context hasn't been connected yet.
    Unconnected,
    /// A connection is being established.
    Connecting,
    /// The client is authorizing itself to the daemon.
    Authorizing,
    /// The client is passing its application name to the daemon.
    SettingName,
    /// The connection is established; the context is ready to execute operations.
    Ready,
    /// The connection failed or was disconnected.
    Failed,
    /// The connection was terminated cleanly.
    Terminated,
}

impl State {
    /// Whether this state is one of the "connection still in progress or established" states, as
    /// opposed to one of the two terminal ones.
    pub fn is_good(self) -> bool {
        matches!(self, State::Connecting | State::Authorizing | State::SettingName | State::Ready)
    }
}

bitflags::bitflags! {
    /// Context connect flags.
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct ContextFlags: u8 {
        const NOFLAGS = 0;
        /// Disable autospawning of the daemon if required.
        const NOAUTOSPAWN = 0b01;
        /// Don't fail if the daemon is not available when [`Context::connect`] is called; instead
        /// enter [`State::Connecting`] and wait for it to appear. Not yet implemented by the
        /// connect loop below (see `DESIGN.md`); reserved for parity with the flag surface.
        const NOFAIL = 0b10;
    }
}

/// Connection parameters, constructed explicitly rather than read from implicit process-global
/// state.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Explicit server address list string (`unix:...`, `tcp:host:port`, space-separated). When
    /// `None`, resolution falls through to `$PULSE_SERVER` and then the built-in defaults.
    pub server: Option<String>,
    pub flags: ContextFlags,
    /// Path to the authentication cookie file. Defaults to `$PULSE_COOKIE` or
    /// `~/.config/pulse/cookie`.
    pub cookie_path: Option<PathBuf>,
    /// Daemon binary invoked by autospawn.
    pub spawn_binary: String,
}

impl Config {
    pub fn new() -> Self {
        Config { server: None, flags: ContextFlags::NOFLAGS, cookie_path: None, spawn_binary: "pulseaudio".to_string() }
    }
}

enum Transport {
    Unix(UnixStream),
    Tcp(TcpStream),
}

impl Transport {
    fn connect(addr: &ServerAddr) -> std::io::Result<Self> {
        match addr {
            ServerAddr::Unix(path) => Ok(Transport::Unix(UnixStream::connect(path)?)),
            ServerAddr::Tcp { host, port, .. } => Ok(Transport::Tcp(TcpStream::connect((host.as_str(), *port))?)),
        }
    }

    fn into_channel(self) -> std::io::Result<Box<dyn IoChannel>> {
        match self {
            Transport::Unix(s) => Ok(Box::new(UnixChannel::new(s)?)),
            Transport::Tcp(s) => Ok(Box::new(pulse_protocol::iochannel::TcpChannel::new(s)?)),
        }
    }
}

struct Inner {
    state: State,
    pid_at_creation: libc::pid_t,
    proplist: Proplist,
    client_index: Option<u32>,
    protocol_version: u16,
    pstream: Option<PStream>,
    pdispatch: PDispatch,
    pool: Pool,
    io_event: Option<EventId>,
    state_callback: Option<Box<dyn FnMut(State)>>,
    candidates: Vec<ServerAddr>,
    autospawn_lock: Option<AutospawnLock>,
    config: Config,
    last_error: Option<PulseError>,
    is_local: bool,
}

/// Streams created on a context, keyed by wire channel index, so unsolicited commands and
/// record-direction memblocks can be routed to their owner. Holds [`Weak`] references only — a
/// stream unregisters itself on failure/teardown, but a [`Weak`] means a stream dropped without
/// going through that path still can't leak the context (or vice versa).
///
/// Kept as its own `Rc<RefCell<_>>` rather than a field of [`Inner`] so that routing a command
/// (which needs only this table) never re-enters the borrow of `Inner` that's already held while
/// [`Context::on_io`] is driving the pstream and dispatcher.
type StreamTable = Rc<RefCell<HashMap<u32, Weak<RefCell<crate::stream::Inner>>>>>;

/// The 10 [`Command`] variants that belong to a stream's event stream rather than the
/// request/reply channel (see [`Command::is_stream_event`]), listed explicitly so they can be
/// registered with [`PDispatch::set_handler`] without iterating every `Command` variant.
const STREAM_EVENT_COMMANDS: [Command; 10] = [
    Command::Request,
    Command::Overflow,
    Command::Underflow,
    Command::PlaybackStreamKilled,
    Command::RecordStreamKilled,
    Command::StreamMoved,
    Command::StreamSuspended,
    Command::StreamStarted,
    Command::StreamEvent,
    Command::StreamBufferAttrChanged,
];

/// A non-owning handle to a [`Context`], used by permanent [`PDispatch::set_handler`] closures so
/// they don't keep the context alive via a strong `Rc` cycle through its own dispatcher.
#[derive(Clone)]
pub(crate) struct WeakContext {
    inner: Weak<RefCell<Inner>>,
    streams: Weak<RefCell<HashMap<u32, Weak<RefCell<crate::stream::Inner>>>>>,
}

impl WeakContext {
    pub(crate) fn upgrade(&self) -> Option<Context> {
        let inner = self.inner.upgrade()?;
        let streams = self.streams.upgrade()?;
        Some(Context { inner, streams })
    }
}

impl Inner {
    fn set_state(&mut self, state: State) {
        self.state = state;
        if let Some(cb) = self.state_callback.as_mut() {
            cb(state);
        }
    }
}

/// An asynchronous connection to a sound server, native-protocol implementation.
///
/// Note: Every public entry point first checks whether the owning process's PID has changed
/// since the context was created (see [`Context::check_fork`]); a context crossing a `fork()`
/// without an intervening `exec()` fails every call with [`PulseError::Forked`] rather than
/// risking corruption of shared pstream/pool state across the two processes.
#[derive(Clone)]
pub struct Context {
    inner: Rc<RefCell<Inner>>,
    streams: StreamTable,
}

impl Context {
    pub fn new(name: &str) -> Self {
        let mut proplist = Proplist::new();
        proplist.set_str(properties::APPLICATION_NAME, name);
        Self::new_with_proplist(proplist)
    }

    /// Instantiates a context with an initial client property list. In the absence of explicit
    /// entries, [`Context::connect`] fills in `application.process.id` and
    /// `application.process.binary` before sending `SET_CLIENT_NAME`.
    pub fn new_with_proplist(proplist: Proplist) -> Self {
        let inner = Inner {
            state: State::Unconnected,
            pid_at_creation: unsafe { libc::getpid() },
            proplist,
            client_index: None,
            protocol_version: PROTOCOL_VERSION_MAX,
            pstream: None,
            pdispatch: PDispatch::new(),
            pool: Pool::new(),
            io_event: None,
            state_callback: None,
            candidates: Vec::new(),
            autospawn_lock: None,
            config: Config::new(),
            last_error: None,
            is_local: false,
        };
        let context = Context { inner: Rc::new(RefCell::new(inner)), streams: Rc::new(RefCell::new(HashMap::new())) };
        context.install_stream_handlers();
        context
    }

    /// Registers one [`PDispatch::set_handler`] per stream-event command, each looking up the
    /// owning stream in the registry by the channel the event names and routing to it. Installed
    /// once at construction since the handler table, unlike `register_reply`'s one-shot rows,
    /// lives for the context's whole lifetime.
    fn install_stream_handlers(&self) {
        let weak_ctx = self.downgrade();
        let mut inner = self.inner.borrow_mut();
        for &command in STREAM_EVENT_COMMANDS.iter() {
            let weak_ctx = weak_ctx.clone();
            inner.pdispatch.set_handler(command, move |mut ts| {
                let ctx = match weak_ctx.upgrade() {
                    Some(ctx) => ctx,
                    None => return,
                };
                let channel = match ts.read_u32() {
                    Ok(c) => c,
                    Err(_) => return,
                };
                ctx.route_stream_command(channel, command, ts);
            });
        }
    }

    pub(crate) fn downgrade(&self) -> WeakContext {
        WeakContext { inner: Rc::downgrade(&self.inner), streams: Rc::downgrade(&self.streams) }
    }

    pub(crate) fn register_stream(&self, channel: u32, weak: Weak<RefCell<crate::stream::Inner>>) {
        self.streams.borrow_mut().insert(channel, weak);
    }

    pub(crate) fn unregister_stream(&self, channel: u32) {
        self.streams.borrow_mut().remove(&channel);
    }

    /// Looks up `channel` in the stream registry and hands it one unsolicited command. Prunes the
    /// registry entry if the stream no longer exists. Safe to call while `self.inner` is already
    /// borrowed (e.g. from inside [`Context::on_io`]'s dispatch), since the stream registry is its
    /// own `RefCell`.
    fn route_stream_command(&self, channel: u32, command: Command, ts: pulse_protocol::tagstruct::TagStructReader<'_>) {
        let weak = match self.streams.borrow().get(&channel) {
            Some(w) => w.clone(),
            None => return,
        };
        if !crate::stream::Stream::route_command(self, &weak, command, ts) {
            self.streams.borrow_mut().remove(&channel);
        }
    }

    /// Looks up `channel` in the stream registry and hands it one delivered memblock slice.
    /// Prunes the registry entry if the stream no longer exists.
    fn route_stream_memblock(&self, channel: u32, bytes: &[u8]) {
        let weak = match self.streams.borrow().get(&channel) {
            Some(w) => w.clone(),
            None => return,
        };
        if !crate::stream::Stream::route_memblock(self, &weak, bytes) {
            self.streams.borrow_mut().remove(&channel);
        }
    }

    fn check_fork(&self) -> Result<(), PulseError> {
        let current = unsafe { libc::getpid() };
        if current != self.inner.borrow().pid_at_creation {
            return Err(PulseError::Forked);
        }
        Ok(())
    }

    pub fn get_state(&self) -> State {
        self.inner.borrow().state
    }

    pub fn get_index(&self) -> Option<u32> {
        self.inner.borrow().client_index
    }

    pub fn set_state_callback(&mut self, callback: Option<Box<dyn FnMut(State)>>) {
        self.inner.borrow_mut().state_callback = callback;
    }

    pub fn last_error(&self) -> Option<PulseError> {
        self.inner.borrow().last_error
    }

    fn fail(&self, mainloop: &mut dyn Mainloop, err: PulseError) {
        let mut inner = self.inner.borrow_mut();
        inner.last_error = Some(err);
        if let Some(id) = inner.io_event.take() {
            mainloop.cancel_io(id);
        }
        inner.pdispatch.terminate_all();
        inner.set_state(State::Failed);
    }

    /// Begins connecting per the resolve → autospawn-lock → iterate → fork/exec → auth →
    /// set-client-name algorithm. Returns immediately; progress is reported through the state
    /// callback. `mainloop` must outlive the context's connection.
    pub fn connect(&mut self, mainloop: &mut dyn Mainloop, config: Config) -> Result<(), PulseError> {
        self.check_fork()?;
        {
            let mut inner = self.inner.borrow_mut();
            inner.candidates = addr::resolve(config.server.as_deref());
            if inner.candidates.is_empty() {
                return Err(PulseError::InvalidServer);
            }
            inner.config = config;
            inner.set_state(State::Connecting);
        }

        let autospawn_enabled = !self.inner.borrow().config.flags.contains(ContextFlags::NOAUTOSPAWN);
        if self.inner.borrow().config.server.is_none() && autospawn_enabled {
            let lock = AutospawnLock::acquire()?;
            self.inner.borrow_mut().autospawn_lock = Some(lock);
        }

        let channel = self.connect_candidates(autospawn_enabled)?;
        self.inner.borrow_mut().autospawn_lock = None;

        let is_local = channel.is_local();
        let fd = std::os::unix::io::AsRawFd::as_raw_fd(&*channel);
        {
            let mut inner = self.inner.borrow_mut();
            inner.pstream = Some(PStream::new(channel));
            inner.is_local = is_local;
        }

        let ctx = self.clone();
        let id = mainloop.new_io(
            fd,
            IoEventFlags::READABLE | IoEventFlags::WRITABLE,
            Box::new(move |flags| {
                ctx.on_io(flags.contains(IoEventFlags::READABLE), flags.contains(IoEventFlags::WRITABLE));
            }),
        );
        self.inner.borrow_mut().io_event = Some(id);

        self.send_auth()?;
        Ok(())
    }

    /// Tries each resolved candidate in order, falling back to autospawn once the list is
    /// exhausted (if enabled). `ECONNREFUSED`/timeout/unreachable errors try the next candidate;
    /// anything else fails the connect attempt immediately.
    fn connect_candidates(&self, autospawn_enabled: bool) -> Result<Box<dyn IoChannel>, PulseError> {
        let candidates = self.inner.borrow().candidates.clone();
        for addr in &candidates {
            match Transport::connect(addr) {
                Ok(t) => return t.into_channel().map_err(PulseError::from),
                Err(e) => match e.kind() {
                    std::io::ErrorKind::ConnectionRefused | std::io::ErrorKind::TimedOut => continue,
                    _ => {
                        #[cfg(target_os = "linux")]
                        if e.raw_os_error() == Some(libc::EHOSTUNREACH) {
                            continue;
                        }
                        return Err(e.into());
                    }
                },
            }
        }

        if !autospawn_enabled {
            return Err(PulseError::ConnectionRefused);
        }

        let binary = self.inner.borrow().config.spawn_binary.clone();
        let result = autospawn::spawn(&binary, &[])?;
        let channel = UnixChannel::new(result.socket)?;
        Ok(Box::new(channel))
    }

    fn send_auth(&mut self) -> Result<(), PulseError> {
        self.inner.borrow_mut().set_state(State::Authorizing);
        let cookie = load_cookie(self.inner.borrow().config.cookie_path.as_deref());
        let is_local = self.inner.borrow().is_local;

        let ctx = self.clone();
        let tag = {
            let mut inner = self.inner.borrow_mut();
            inner.pdispatch.register_reply_default(move |_tag, outcome| ctx.handle_auth_reply(outcome))
        };

        let mut framed = TagStructWriter::new();
        framed.write_u32(Command::Auth.to_wire());
        framed.write_u32(tag);
        framed.write_u32(PROTOCOL_VERSION_MAX as u32);
        framed.write_arbitrary(&cookie);

        let mut inner = self.inner.borrow_mut();
        inner.pstream.as_mut().unwrap().send_packet(framed.into_bytes(), is_local)?;
        Ok(())
    }

    fn handle_auth_reply(&self, outcome: ReplyOutcome<'_>) {
        match outcome {
            ReplyOutcome::Reply(mut ts) => {
                let negotiated = match ts.read_u32() {
                    Ok(v) => v as u16,
                    Err(e) => return self.fail_local(e),
                };
                let version = negotiated.min(PROTOCOL_VERSION_MAX);
                if version < PROTOCOL_VERSION_MIN {
                    return self.fail_local(PulseError::Version);
                }

                let mut inner = self.inner.borrow_mut();
                inner.protocol_version = version;
                let local_euid_match = inner.is_local && unsafe { libc::geteuid() == libc::getuid() };
                if local_euid_match {
                    inner.pstream.as_mut().unwrap().enable_shared_memory();
                }
                drop(inner);

                if let Err(e) = self.send_set_client_name() {
                    self.fail_local(e);
                }
            }
            ReplyOutcome::Error(e) => self.fail_local(e),
            ReplyOutcome::Timeout => self.fail_local(PulseError::Timeout),
            ReplyOutcome::ConnectionTerminated => self.fail_local(PulseError::ConnectionTerminated),
        }
    }

    fn send_set_client_name(&self) -> Result<(), PulseError> {
        self.inner.borrow_mut().set_state(State::SettingName);
        let version = self.inner.borrow().protocol_version;

        {
            let mut inner = self.inner.borrow_mut();
            let pid = unsafe { libc::getpid() };
            if !inner.proplist.contains(properties::APPLICATION_PROCESS_ID) {
                inner.proplist.set_str(properties::APPLICATION_PROCESS_ID, pid.to_string());
            }
            if !inner.proplist.contains(properties::APPLICATION_PROCESS_BINARY) {
                if let Ok(exe) = std::env::current_exe() {
                    inner.proplist.set_str(properties::APPLICATION_PROCESS_BINARY, exe.display().to_string());
                }
            }
            apply_env_properties(&mut inner.proplist);
        }

        let ctx = self.clone();
        let tag = {
            let mut inner = self.inner.borrow_mut();
            inner.pdispatch.register_reply_default(move |_tag, outcome| ctx.handle_set_name_reply(outcome))
        };

        let mut framed = TagStructWriter::new();
        framed.write_u32(Command::SetClientName.to_wire());
        framed.write_u32(tag);
        if version >= PROTOCOL_VERSION_PROPLIST {
            let proplist = self.inner.borrow().proplist.clone();
            framed.write_proplist(&proplist);
        } else {
            let name = self.inner.borrow().proplist.get_str(properties::APPLICATION_NAME).unwrap_or("").to_string();
            framed.write_string(Some(&name));
        }

        let mut inner = self.inner.borrow_mut();
        inner.pstream.as_mut().unwrap().send_packet(framed.into_bytes(), false)?;
        Ok(())
    }

    fn handle_set_name_reply(&self, outcome: ReplyOutcome<'_>) {
        match outcome {
            ReplyOutcome::Reply(mut ts) => {
                let index = match ts.read_u32() {
                    Ok(v) => v,
                    Err(e) => return self.fail_local(e),
                };
                let mut inner = self.inner.borrow_mut();
                inner.client_index = Some(index);
                inner.set_state(State::Ready);
            }
            ReplyOutcome::Error(e) => self.fail_local(e),
            ReplyOutcome::Timeout => self.fail_local(PulseError::Timeout),
            ReplyOutcome::ConnectionTerminated => self.fail_local(PulseError::ConnectionTerminated),
        }
    }

    fn fail_local(&self, err: PulseError) {
        let mut inner = self.inner.borrow_mut();
        inner.last_error = Some(err);
        inner.pdispatch.terminate_all();
        inner.set_state(State::Failed);
    }

    /// Called by the concrete mainloop implementation when the context's fd becomes readable or
    /// writable. Drives the pstream's send queue and receive state machine, then the dispatcher.
    pub fn on_io(&self, readable: bool, writable: bool) {
        let mut inner = self.inner.borrow_mut();
        let Inner { pstream, pdispatch, pool, .. } = &mut *inner;
        let pstream = match pstream.as_mut() {
            Some(p) => p,
            None => return,
        };

        if writable {
            if let Err(e) = pstream.on_writable() {
                pdispatch.terminate_all();
                inner_set_failed(&mut inner.state, &mut inner.state_callback, &mut inner.last_error, e);
                return;
            }
        }
        if readable {
            let result = pstream.on_readable(
                pool,
                |data| {
                    if data.len() < 8 {
                        return;
                    }
                    let command = Command::from_wire(u32::from_be_bytes([data[0], data[1], data[2], data[3]]));
                    let tag = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
                    pdispatch.dispatch(command, tag, &data[8..]);
                },
                |delivery| {
                    // Safe to call back into `self` here even though `inner` is mutably
                    // borrowed above: the stream registry is its own `RefCell`, not a field of
                    // `Inner`, so this never re-enters that borrow.
                    self.route_stream_memblock(delivery.channel, delivery.bytes);
                },
            );
            if let Err(e) = result {
                pdispatch.terminate_all();
                inner_set_failed(&mut inner.state, &mut inner.state_callback, &mut inner.last_error, e);
            }
        }
    }

    /// Checks every dispatcher row's deadline; call on every mainloop timer tick while any
    /// request is outstanding.
    pub fn check_timeouts(&self) {
        self.inner.borrow_mut().pdispatch.check_timeouts(std::time::Instant::now());
    }

    /// Unlinks the pstream, cancels outstanding operations, and transitions to `Terminated`.
    pub fn disconnect(&mut self, mainloop: &mut dyn Mainloop) {
        let mut inner = self.inner.borrow_mut();
        if let Some(id) = inner.io_event.take() {
            mainloop.cancel_io(id);
        }
        if let Some(pstream) = inner.pstream.as_mut() {
            pstream.close();
        }
        inner.pdispatch.terminate_all();
        inner.autospawn_lock = None;
        if inner.state != State::Terminated {
            inner.set_state(State::Terminated);
        }
    }

    /// Starts an operation whose completion is reported through `callback` once a reply with tag
    /// `tag` arrives (used by higher-level request helpers that need a user-visible handle).
    pub(crate) fn new_operation(
        &self,
        timeout: std::time::Duration,
        on_reply: impl FnOnce(ReplyOutcome<'_>, &OperationHandle) + 'static,
    ) -> (Operation, u32) {
        let (op, handle) = operation::new_pair();
        let tag = self.inner.borrow_mut().pdispatch.register_reply(timeout, move |_tag, outcome| {
            if !handle.is_cancelled() {
                on_reply(outcome, &handle);
            }
            handle.complete();
        });
        (op, tag)
    }

    pub(crate) fn send_packet(&self, data: Vec<u8>) -> Result<(), PulseError> {
        let mut inner = self.inner.borrow_mut();
        match inner.pstream.as_mut() {
            Some(p) => p.send_packet(data, false),
            None => Err(PulseError::BadState),
        }
    }

    pub(crate) fn send_memblock(
        &self,
        channel: u32,
        chunk: pulse_protocol::memblock::MemChunk,
        offset: i64,
        seek: pulse_protocol::frame::SeekMode,
    ) -> Result<(), PulseError> {
        let mut inner = self.inner.borrow_mut();
        match inner.pstream.as_mut() {
            Some(p) => p.send_memblock(channel, chunk, offset, seek),
            None => Err(PulseError::BadState),
        }
    }

    /// The tag that will be assigned to whichever command is sent next, without registering one.
    /// [`crate::stream::Stream::write`] keys a write-index correction against this so that once
    /// a later timing-update reply arrives bearing a tag `>=` this one, the correction is known
    /// to have been applied server-side and can be folded into the reconstructed write index.
    pub(crate) fn next_pending_tag(&self) -> Option<u32> {
        Some(self.inner.borrow().pdispatch.peek_next_tag())
    }
}

fn inner_set_failed(
    state: &mut State,
    callback: &mut Option<Box<dyn FnMut(State)>>,
    last_error: &mut Option<PulseError>,
    err: PulseError,
) {
    *last_error = Some(err);
    *state = State::Failed;
    if let Some(cb) = callback.as_mut() {
        cb(State::Failed);
    }
}

/// Loads the 256-byte shared secret used in `AUTH`. Tries the explicit path, then `$PULSE_COOKIE`,
/// then `~/.config/pulse/cookie`; a missing or short cookie file yields 256 zero bytes rather than
/// failing outright, matching the original client's tolerant behaviour (the daemon still accepts
/// the connection on a loopback or SO_PEERCRED-verified local socket).
fn load_cookie(explicit: Option<&std::path::Path>) -> Vec<u8> {
    let candidate = explicit.map(PathBuf::from).or_else(|| std::env::var("PULSE_COOKIE").ok().map(PathBuf::from)).or_else(|| {
        std::env::var("HOME").ok().map(|home| PathBuf::from(home).join(".config/pulse/cookie"))
    });
    if let Some(path) = candidate {
        if let Ok(bytes) = std::fs::read(&path) {
            if bytes.len() >= COOKIE_LENGTH {
                return bytes[..COOKIE_LENGTH].to_vec();
            }
        }
    }
    vec![0u8; COOKIE_LENGTH]
}

/// Copies `$PULSE_PROP_<NAME>`-style environment variables into the client proplist: everything
/// after the prefix, lower-cased with underscores turned to dots, becomes the property key.
fn apply_env_properties(proplist: &mut Proplist) {
    const PREFIX: &str = "PULSE_PROP_";
    for (key, value) in std::env::vars() {
        if let Some(rest) = key.strip_prefix(PREFIX) {
            let prop_key = rest.to_lowercase().replace('_', ".");
            proplist.set_str(prop_key, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_context_starts_unconnected() {
        let ctx = Context::new("probe");
        assert_eq!(ctx.get_state(), State::Unconnected);
        assert_eq!(ctx.get_index(), None);
    }

    #[test]
    fn env_properties_are_copied_with_dotted_keys() {
        std::env::set_var("PULSE_PROP_MEDIA_ROLE", "game");
        let mut p = Proplist::new();
        apply_env_properties(&mut p);
        assert_eq!(p.get_str("media.role"), Some("game"));
        std::env::remove_var("PULSE_PROP_MEDIA_ROLE");
    }

    #[test]
    fn missing_cookie_file_yields_zeroed_cookie() {
        let cookie = load_cookie(Some(std::path::Path::new("/nonexistent/cookie/path")));
        assert_eq!(cookie.len(), COOKIE_LENGTH);
        assert!(cookie.iter().all(|b| *b == 0));
    }

    #[test]
    fn state_is_good_covers_in_progress_states() {
        assert!(State::Connecting.is_good());
        assert!(State::Ready.is_good());
        assert!(!State::Failed.is_good());
        assert!(!State::Terminated.is_good());
    }

    #[test]
    fn registered_stream_receives_routed_request_command() {
        let context = Context::new("probe");
        let spec = pulse_protocol::sample::Spec { format: pulse_protocol::sample::Format::S16le, rate: 44100, channels: 2 };
        let mut stream = crate::stream::Stream::new(
            &context,
            crate::stream::Direction::Playback,
            spec,
            pulse_protocol::channelmap::Map::init_stereo(),
        );
        let observed = Rc::new(RefCell::new(0usize));
        let observed_clone = observed.clone();
        stream.set_write_callback(Some(Box::new(move |n| *observed_clone.borrow_mut() = n)));
        context.register_stream(7, stream.downgrade());

        let mut body = TagStructWriter::new();
        body.write_u32(7);
        body.write_u32(512);
        let payload = body.into_bytes();
        context.inner.borrow_mut().pdispatch.dispatch(Command::Request, 0, &payload);

        assert_eq!(*observed.borrow(), 512);
    }

    #[test]
    fn unregistering_a_channel_stops_routing_to_it() {
        let context = Context::new("probe");
        let spec = pulse_protocol::sample::Spec { format: pulse_protocol::sample::Format::S16le, rate: 44100, channels: 2 };
        let mut stream = crate::stream::Stream::new(
            &context,
            crate::stream::Direction::Playback,
            spec,
            pulse_protocol::channelmap::Map::init_stereo(),
        );
        let observed = Rc::new(RefCell::new(0usize));
        let observed_clone = observed.clone();
        stream.set_write_callback(Some(Box::new(move |n| *observed_clone.borrow_mut() = n)));
        context.register_stream(7, stream.downgrade());
        context.unregister_stream(7);

        let mut body = TagStructWriter::new();
        body.write_u32(7);
        body.write_u32(512);
        let payload = body.into_bytes();
        context.inner.borrow_mut().pdispatch.dispatch(Command::Request, 0, &payload);

        assert_eq!(*observed.borrow(), 0);
    }
}
