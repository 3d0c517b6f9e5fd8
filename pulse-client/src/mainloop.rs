//! Mainloop abstraction: the single-threaded, cooperative event-source interface every concrete
//! reactor (e.g. `pulse-tokio`'s) must provide. Nothing in this crate's `Context`/`Stream` engine
//! depends on a specific reactor; they depend only on this trait.

use std::os::unix::io::RawFd;
use std::time::Instant;

bitflags::bitflags! {
    /// Which readiness events an I/O source is interested in.
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct IoEventFlags: u8 {
        const READABLE = 0b001;
        const WRITABLE = 0b010;
        const HANGUP   = 0b100;
    }
}

/// A handle to a registered event source. Dropping it does not deregister the source — call
/// [`Mainloop::cancel_io`]/[`Mainloop::cancel_time`]/[`Mainloop::cancel_defer`] explicitly, the
/// same discipline the underlying C library uses (an event must be freed, not merely forgotten).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct EventId(pub u64);

/// A single-threaded cooperative mainloop: I/O readiness, absolute-deadline timers, and
/// run-every-iteration deferred work.
///
/// Implementors run callbacks synchronously from within [`Mainloop::run_once`]/equivalent; this
/// trait does not assume any particular executor, only that callbacks never run concurrently
/// with each other or with the caller.
pub trait Mainloop {
    /// Registers interest in `fd` becoming ready per `flags`. `callback` receives the flags that
    /// actually fired.
    fn new_io(&mut self, fd: RawFd, flags: IoEventFlags, callback: Box<dyn FnMut(IoEventFlags)>) -> EventId;

    /// Updates the readiness mask of an existing I/O source.
    fn set_io_flags(&mut self, id: EventId, flags: IoEventFlags);

    fn cancel_io(&mut self, id: EventId);

    /// Registers a one-shot timer firing at `deadline`.
    fn new_time(&mut self, deadline: Instant, callback: Box<dyn FnOnce()>) -> EventId;

    /// Reschedules an existing timer to a new absolute deadline.
    fn restart_time(&mut self, id: EventId, deadline: Instant);

    fn cancel_time(&mut self, id: EventId);

    /// Registers a callback that runs once per mainloop iteration until cancelled.
    fn new_defer(&mut self, callback: Box<dyn FnMut()>) -> EventId;

    fn enable_defer(&mut self, id: EventId, enabled: bool);

    fn cancel_defer(&mut self, id: EventId);

    /// Orderly termination signal; implementations interpret this as "stop after the current
    /// iteration".
    fn quit(&mut self, retval: i32);
}
