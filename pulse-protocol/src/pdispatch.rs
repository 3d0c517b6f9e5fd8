//! Packet dispatcher: correlates outbound commands with inbound replies via a monotonically
//! assigned tag, arms a per-request deadline, and routes unsolicited commands to a handler table.
//!
//! Deliberately has no opinion on *how* time passes — [`PDispatch::check_timeouts`] is driven by
//! whatever mainloop timer implementation the caller (`pulse-client`'s `Context`) is using, so
//! this crate stays independent of any particular mainloop.

use crate::command::Command;
use crate::error::PulseError;
use crate::tagstruct::TagStructReader;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// The default time a caller waits for a reply before [`PDispatch::check_timeouts`] synthesizes
/// one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Outcome handed to a registered reply callback.
pub enum ReplyOutcome<'a> {
    /// A `REPLY` command arrived with this tag-struct payload.
    Reply(TagStructReader<'a>),
    /// An `ERROR` command arrived, carrying the server's error code.
    Error(PulseError),
    /// No reply arrived before the deadline.
    Timeout,
    /// The owning connection died before a reply arrived.
    ConnectionTerminated,
}

struct Row {
    deadline: Instant,
    callback: Box<dyn FnOnce(u32, ReplyOutcome<'_>)>,
}

/// Correlates replies to outbound requests by tag, and routes everything else to per-command
/// unsolicited handlers.
pub struct PDispatch {
    next_tag: u32,
    rows: HashMap<u32, Row>,
    unsolicited: HashMap<Command, Box<dyn FnMut(TagStructReader<'_>)>>,
    drain_callback: Option<Box<dyn FnMut()>>,
}

impl Default for PDispatch {
    fn default() -> Self {
        Self::new()
    }
}

impl PDispatch {
    pub fn new() -> Self {
        PDispatch { next_tag: 0, rows: HashMap::new(), unsolicited: HashMap::new(), drain_callback: None }
    }

    /// Assigns the next tag and arms a row awaiting its reply. Returns the tag to write into the
    /// outbound command frame; the same tag is passed back into `callback` so a caller that needs
    /// to correlate against its own request-time bookkeeping (e.g. a stream's write-index
    /// correction ring) doesn't have to capture it separately.
    pub fn register_reply(
        &mut self,
        timeout: Duration,
        callback: impl FnOnce(u32, ReplyOutcome<'_>) + 'static,
    ) -> u32 {
        let tag = self.next_tag;
        self.next_tag = self.next_tag.wrapping_add(1);
        self.rows.insert(tag, Row { deadline: Instant::now() + timeout, callback: Box::new(callback) });
        tag
    }

    pub fn register_reply_default(&mut self, callback: impl FnOnce(u32, ReplyOutcome<'_>) + 'static) -> u32 {
        self.register_reply(DEFAULT_TIMEOUT, callback)
    }

    pub fn set_handler(&mut self, command: Command, handler: impl FnMut(TagStructReader<'_>) + 'static) {
        self.unsolicited.insert(command, Box::new(handler));
    }

    pub fn set_drain_callback(&mut self, callback: Option<Box<dyn FnMut()>>) {
        self.drain_callback = callback;
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The tag that will be assigned by the *next* [`PDispatch::register_reply`] call, without
    /// consuming it.
    pub fn peek_next_tag(&self) -> u32 {
        self.next_tag
    }

    /// Feeds one decoded control packet to the dispatcher. `payload` starts right after the
    /// 32-bit command id and 32-bit tag, which the caller has already peeled off.
    pub fn dispatch(&mut self, command: Command, tag: u32, payload: &[u8]) {
        match command {
            Command::Reply => {
                if let Some(row) = self.rows.remove(&tag) {
                    (row.callback)(tag, ReplyOutcome::Reply(TagStructReader::new(payload)));
                }
            }
            Command::Error => {
                if let Some(row) = self.rows.remove(&tag) {
                    let code = {
                        let mut ts = TagStructReader::new(payload);
                        ts.read_u32().ok().map(error_from_wire).unwrap_or(PulseError::Unknown)
                    };
                    (row.callback)(tag, ReplyOutcome::Error(code));
                }
            }
            other => {
                if let Some(handler) = self.unsolicited.get_mut(&other) {
                    handler(TagStructReader::new(payload));
                }
            }
        }
        if self.rows.is_empty() {
            if let Some(cb) = self.drain_callback.as_mut() {
                cb();
            }
        }
    }

    /// Synthesizes a [`ReplyOutcome::Timeout`] for every row past its deadline as of `now`.
    pub fn check_timeouts(&mut self, now: Instant) {
        let expired: Vec<u32> = self.rows.iter().filter(|(_, r)| r.deadline <= now).map(|(t, _)| *t).collect();
        for tag in expired {
            if let Some(row) = self.rows.remove(&tag) {
                (row.callback)(tag, ReplyOutcome::Timeout);
            }
        }
        if self.rows.is_empty() {
            if let Some(cb) = self.drain_callback.as_mut() {
                cb();
            }
        }
    }

    /// The earliest deadline still pending, for the caller to arm its mainloop timer against.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.rows.values().map(|r| r.deadline).min()
    }

    /// Invokes every pending row with [`ReplyOutcome::ConnectionTerminated`] and clears the
    /// table. Called once the owning pstream dies.
    pub fn terminate_all(&mut self) {
        for (tag, row) in self.rows.drain() {
            (row.callback)(tag, ReplyOutcome::ConnectionTerminated);
        }
    }
}

fn error_from_wire(code: u32) -> PulseError {
    match code {
        1 => PulseError::Access,
        3 => PulseError::Invalid,
        6 => PulseError::ConnectionRefused,
        7 => PulseError::Protocol,
        8 => PulseError::Timeout,
        9 => PulseError::AuthKey,
        10 => PulseError::Internal,
        11 => PulseError::ConnectionTerminated,
        12 => PulseError::Killed,
        13 => PulseError::InvalidServer,
        15 => PulseError::BadState,
        16 => PulseError::NoData,
        17 => PulseError::Version,
        19 => PulseError::NotSupported,
        24 => PulseError::Forked,
        _ => PulseError::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn reply_is_routed_to_its_tag() {
        let mut d = PDispatch::new();
        let got = Rc::new(RefCell::new(false));
        let got2 = got.clone();
        let tag = d.register_reply_default(move |reply_tag, outcome| {
            assert!(matches!(outcome, ReplyOutcome::Reply(_)));
            *got2.borrow_mut() = true;
            let _ = reply_tag;
        });
        d.dispatch(Command::Reply, tag, &[]);
        assert!(*got.borrow());
    }

    #[test]
    fn callback_receives_its_own_registration_tag() {
        let mut d = PDispatch::new();
        let seen = Rc::new(RefCell::new(None));
        let seen2 = seen.clone();
        let tag = d.register_reply_default(move |reply_tag, _outcome| {
            *seen2.borrow_mut() = Some(reply_tag);
        });
        d.dispatch(Command::Reply, tag, &[]);
        assert_eq!(*seen.borrow(), Some(tag));
    }

    #[test]
    fn timeout_fires_past_deadline() {
        let mut d = PDispatch::new();
        let got = Rc::new(RefCell::new(false));
        let got2 = got.clone();
        d.register_reply(Duration::from_secs(0), move |_tag, outcome| {
            assert!(matches!(outcome, ReplyOutcome::Timeout));
            *got2.borrow_mut() = true;
        });
        d.check_timeouts(Instant::now() + Duration::from_millis(1));
        assert!(*got.borrow());
    }

    #[test]
    fn drain_callback_fires_when_table_empties() {
        let mut d = PDispatch::new();
        let drained = Rc::new(RefCell::new(false));
        let drained2 = drained.clone();
        d.set_drain_callback(Some(Box::new(move || *drained2.borrow_mut() = true)));
        let tag = d.register_reply_default(|_, _| {});
        assert!(!*drained.borrow());
        d.dispatch(Command::Reply, tag, &[]);
        assert!(*drained.borrow());
    }

    #[test]
    fn terminate_all_notifies_every_pending_row() {
        let mut d = PDispatch::new();
        let count = Rc::new(RefCell::new(0));
        for _ in 0..3 {
            let count2 = count.clone();
            d.register_reply_default(move |_tag, outcome| {
                assert!(matches!(outcome, ReplyOutcome::ConnectionTerminated));
                *count2.borrow_mut() += 1;
            });
        }
        d.terminate_all();
        assert_eq!(*count.borrow(), 3);
        assert!(d.is_empty());
    }
}
