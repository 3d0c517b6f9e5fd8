//! Tokio reactor for `pulse-client`'s [`Mainloop`] trait.
//!
//! One [`AsyncFd`] per registered I/O source, a single [`tokio::time::Sleep`] armed against the
//! nearest timer deadline, and a plain map of deferred callbacks drained every iteration — the
//! same three event classes the trait exposes, each given the straightforward tokio primitive for
//! it rather than routed through a C-style callback table.

use pulse_client::context::{Context, State as ContextState};
use pulse_client::mainloop::{EventId, IoEventFlags, Mainloop};
use std::collections::HashMap;
use std::future::Future;
use std::os::unix::io::{AsRawFd, RawFd};
use std::pin::Pin;
use std::task::{self, Poll};
use std::time::Instant;
use tokio::io::unix::AsyncFd;

struct Fd(RawFd);

impl AsRawFd for Fd {
    fn as_raw_fd(&self) -> RawFd {
        self.0
    }
}

struct IoItem {
    flags: IoEventFlags,
    async_fd: AsyncFd<Fd>,
    callback: Box<dyn FnMut(IoEventFlags)>,
}

struct TimerItem {
    deadline: Instant,
    callback: Option<Box<dyn FnOnce()>>,
}

struct DeferItem {
    enabled: bool,
    callback: Box<dyn FnMut()>,
}

/// A single-threaded [`Mainloop`] driven by a tokio reactor.
///
/// Not `Send`/`Sync` — like the trait it implements, a `TokioMain` (and every context/stream
/// registered against it) lives on one task.
pub struct TokioMain {
    next_id: u64,
    io: HashMap<u64, IoItem>,
    timers: HashMap<u64, TimerItem>,
    defers: HashMap<u64, DeferItem>,
    sleep: Option<Pin<Box<tokio::time::Sleep>>>,
    quit: Option<i32>,
}

impl Default for TokioMain {
    fn default() -> Self {
        Self::new()
    }
}

impl TokioMain {
    pub fn new() -> Self {
        TokioMain { next_id: 0, io: HashMap::new(), timers: HashMap::new(), defers: HashMap::new(), sleep: None, quit: None }
    }

    fn alloc_id(&mut self) -> EventId {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        EventId(id)
    }

    /// Runs every deferred callback, fires any timer past its deadline, and polls every I/O
    /// source's registered interest, returning `Ready` as soon as anything fired (so the caller's
    /// `poll_fn` loop re-checks context/stream state before sleeping again) or the quit retval
    /// once [`Mainloop::quit`] has been called.
    fn tick(&mut self, cx: &mut task::Context<'_>) -> Poll<Option<i32>> {
        let mut progressed = false;

        let defer_ids: Vec<u64> = self.defers.keys().copied().collect();
        for id in defer_ids {
            if let Some(item) = self.defers.get_mut(&id) {
                if item.enabled {
                    (item.callback)();
                    progressed = true;
                }
            }
        }

        let now = Instant::now();
        let due: Vec<u64> = self.timers.iter().filter(|(_, t)| t.deadline <= now).map(|(id, _)| *id).collect();
        for id in due {
            if let Some(mut item) = self.timers.remove(&id) {
                if let Some(cb) = item.callback.take() {
                    cb();
                    progressed = true;
                }
            }
        }

        let io_ids: Vec<u64> = self.io.keys().copied().collect();
        for id in io_ids {
            let Some(item) = self.io.get_mut(&id) else { continue };
            let mut fired = IoEventFlags::empty();

            let mut read_guard = None;
            if item.flags.contains(IoEventFlags::READABLE) {
                if let Poll::Ready(guard) = item.async_fd.poll_read_ready(cx) {
                    match guard {
                        Ok(g) => {
                            fired |= IoEventFlags::READABLE;
                            read_guard = Some(g);
                        }
                        Err(_) => fired |= IoEventFlags::HANGUP,
                    }
                }
            }
            let mut write_guard = None;
            if item.flags.contains(IoEventFlags::WRITABLE) {
                if let Poll::Ready(guard) = item.async_fd.poll_write_ready(cx) {
                    match guard {
                        Ok(g) => {
                            fired |= IoEventFlags::WRITABLE;
                            write_guard = Some(g);
                        }
                        Err(_) => fired |= IoEventFlags::HANGUP,
                    }
                }
            }
            if fired.is_empty() {
                continue;
            }

            (item.callback)(fired);
            progressed = true;

            // The registered callback always drains its side of the fd to `WouldBlock` (see
            // `pulse_protocol::pstream::PStream::on_readable`/`on_writable`), so re-check the raw
            // fd once more before deciding whether to keep tokio's cached readiness: if the kernel
            // still reports the fd ready, a guard drop's default `clear_ready` would mean the next
            // `poll_tick` misses readiness that's genuinely still there.
            let raw_fd = item.async_fd.as_raw_fd();
            let mut pfd = libc::pollfd { fd: raw_fd, events: 0, revents: 0 };
            if read_guard.is_some() {
                pfd.events |= libc::POLLIN;
            }
            if write_guard.is_some() {
                pfd.events |= libc::POLLOUT;
            }
            if pfd.events != 0 {
                unsafe { libc::poll(&mut pfd, 1, 0) };
            }
            if let Some(mut g) = read_guard {
                if pfd.revents & libc::POLLIN != 0 {
                    g.retain_ready();
                } else {
                    g.clear_ready();
                }
            }
            if let Some(mut g) = write_guard {
                if pfd.revents & libc::POLLOUT != 0 {
                    g.retain_ready();
                } else {
                    g.clear_ready();
                }
            }
        }

        if let Some(retval) = self.quit.take() {
            return Poll::Ready(Some(retval));
        }
        if progressed {
            return Poll::Ready(None);
        }

        let next_deadline = self.timers.values().map(|t| t.deadline).min();
        match next_deadline {
            Some(deadline) => {
                let target = tokio::time::Instant::now() + deadline.saturating_duration_since(now);
                let mut sleep = match self.sleep.take() {
                    Some(mut s) => {
                        s.as_mut().reset(target);
                        s
                    }
                    None => Box::pin(tokio::time::sleep_until(target)),
                };
                match sleep.as_mut().poll(cx) {
                    Poll::Ready(()) => Poll::Ready(None),
                    Poll::Pending => {
                        self.sleep = Some(sleep);
                        Poll::Pending
                    }
                }
            }
            None => {
                self.sleep = None;
                Poll::Pending
            }
        }
    }

    /// Drives the reactor until `context` leaves the in-progress states (reaches `Ready`,
    /// `Failed`, or `Terminated`).
    pub async fn wait_for_ready(&mut self, context: &Context) -> ContextState {
        loop {
            std::future::poll_fn(|cx| self.tick(cx)).await;
            let state = context.get_state();
            if !state.is_good() || state == ContextState::Ready {
                return state;
            }
        }
    }

    /// Runs the reactor until [`Mainloop::quit`] is called, returning its retval.
    pub async fn run(&mut self) -> i32 {
        loop {
            if let Some(retval) = std::future::poll_fn(|cx| self.tick(cx)).await {
                return retval;
            }
        }
    }
}

impl Mainloop for TokioMain {
    fn new_io(&mut self, fd: RawFd, flags: IoEventFlags, callback: Box<dyn FnMut(IoEventFlags)>) -> EventId {
        let async_fd = AsyncFd::new(Fd(fd)).expect("fd registered with a dead tokio reactor");
        let id = self.alloc_id();
        self.io.insert(id.0, IoItem { flags, async_fd, callback });
        id
    }

    fn set_io_flags(&mut self, id: EventId, flags: IoEventFlags) {
        if let Some(item) = self.io.get_mut(&id.0) {
            item.flags = flags;
        }
    }

    fn cancel_io(&mut self, id: EventId) {
        self.io.remove(&id.0);
    }

    fn new_time(&mut self, deadline: Instant, callback: Box<dyn FnOnce()>) -> EventId {
        let id = self.alloc_id();
        self.timers.insert(id.0, TimerItem { deadline, callback: Some(callback) });
        id
    }

    fn restart_time(&mut self, id: EventId, deadline: Instant) {
        if let Some(item) = self.timers.get_mut(&id.0) {
            item.deadline = deadline;
        }
    }

    fn cancel_time(&mut self, id: EventId) {
        self.timers.remove(&id.0);
    }

    fn new_defer(&mut self, callback: Box<dyn FnMut()>) -> EventId {
        let id = self.alloc_id();
        self.defers.insert(id.0, DeferItem { enabled: true, callback });
        id
    }

    fn enable_defer(&mut self, id: EventId, enabled: bool) {
        if let Some(item) = self.defers.get_mut(&id.0) {
            item.enabled = enabled;
        }
    }

    fn cancel_defer(&mut self, id: EventId) {
        self.defers.remove(&id.0);
    }

    fn quit(&mut self, retval: i32) {
        self.quit = Some(retval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn defer_fires_and_can_be_cancelled() {
        let mut main = TokioMain::new();
        let fired = Rc::new(Cell::new(0));
        let fired2 = fired.clone();
        let id = main.new_defer(Box::new(move || fired2.set(fired2.get() + 1)));

        let waker = futures_test_waker();
        let mut cx = task::Context::from_waker(&waker);
        assert!(matches!(main.tick(&mut cx), Poll::Ready(None)));
        assert_eq!(fired.get(), 1);

        main.cancel_defer(id);
        assert!(matches!(main.tick(&mut cx), Poll::Pending));
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn quit_is_reported_on_next_tick() {
        let mut main = TokioMain::new();
        main.quit(7);
        let waker = futures_test_waker();
        let mut cx = task::Context::from_waker(&waker);
        assert!(matches!(main.tick(&mut cx), Poll::Ready(Some(7))));
    }

    fn futures_test_waker() -> task::Waker {
        use std::task::{RawWaker, RawWakerVTable, Waker};
        fn no_op(_: *const ()) {}
        fn clone(_: *const ()) -> RawWaker {
            RawWaker::new(std::ptr::null(), &VTABLE)
        }
        static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, no_op, no_op, no_op);
        unsafe { Waker::from_raw(RawWaker::new(std::ptr::null(), &VTABLE)) }
    }
}
