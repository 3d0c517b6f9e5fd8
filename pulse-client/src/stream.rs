//! Streams: one playback, record, or sample-cache upload flow multiplexed over a context's
//! packet stream, carrying its own buffer attribute negotiation, flow-control accounting, and
//! timing model.

use crate::context::Context;
use crate::smoother::Smoother;
use pulse_protocol::channelmap::Map;
use pulse_protocol::command::Command;
use pulse_protocol::def::{BufferAttr, StreamFlagSet, TimingInfo};
use pulse_protocol::error::PulseError;
use pulse_protocol::memblock::MemChunk;
use pulse_protocol::pdispatch::ReplyOutcome;
use pulse_protocol::sample::Spec;
use pulse_protocol::tagstruct::{TagStructReader, TagStructWriter};
use pulse_protocol::volume::ChannelVolumes;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

/// Direction of a stream. `Upload` shares playback's write path but targets the sample cache
/// rather than a live sink.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Direction {
    Playback,
    Record,
    Upload,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum State {
    Unconnected,
    Creating,
    Ready,
    Failed,
    Terminated,
}

/// One pending local adjustment to the server-reported write index, keyed by the tag of the
/// command that caused it. Capacity ~10: old enough slots are dropped once their tag is applied.
#[derive(Debug, Copy, Clone)]
struct Correction {
    tag: u32,
    valid: bool,
    corrupt: bool,
    absolute: bool,
    delta: i64,
}

const CORRECTION_RING_CAPACITY: usize = 10;

/// Per-stream state. `pub(crate)` so [`crate::context::Context`] can hold a [`Weak`] reference
/// into it for channel-indexed routing of unsolicited commands and record-direction memblocks,
/// without the context ever owning a strong, cycle-forming handle to the stream.
pub(crate) struct Inner {
    direction: Direction,
    state: State,
    spec: Spec,
    channel_map: Map,
    attr: BufferAttr,
    flags: StreamFlagSet,
    corked: bool,
    channel: Option<u32>,
    requested_bytes: u64,
    corrections: Vec<Correction>,
    timing_info: Option<TimingInfo>,
    timing_update_pending: bool,
    smoother: Smoother,
    /// Bytes delivered by the server for a `Record` stream and not yet consumed via
    /// [`Stream::discard`].
    read_buffer: Vec<u8>,
    state_callback: Option<Box<dyn FnMut(State)>>,
    write_callback: Option<Box<dyn FnMut(usize)>>,
    read_callback: Option<Box<dyn FnMut(usize)>>,
    overflow_callback: Option<Box<dyn FnMut()>>,
    underflow_callback: Option<Box<dyn FnMut()>>,
    last_error: Option<PulseError>,
}

impl Inner {
    fn set_state(&mut self, s: State) {
        self.state = s;
        if let Some(cb) = self.state_callback.as_mut() {
            cb(s);
        }
    }

    /// Pushes a correction keyed by `tag`, evicting the oldest slot if the ring is at capacity.
    fn push_correction(&mut self, tag: u32, corrupt: bool, absolute: bool, delta: i64) {
        if self.corrections.len() >= CORRECTION_RING_CAPACITY {
            self.corrections.remove(0);
        }
        self.corrections.push(Correction { tag, valid: true, corrupt, absolute, delta });
    }

    /// Applies every correction with `tag >= reply_tag` on top of the server-reported write
    /// index to reconstruct the client's current view, then invalidates everything with
    /// `tag <= reply_tag`.
    fn reconcile_write_index(&mut self, reply_tag: u32, server_index: i64) -> i64 {
        let mut index = server_index;
        let mut corrupt = false;
        for c in self.corrections.iter().filter(|c| c.valid && c.tag >= reply_tag) {
            if c.corrupt {
                corrupt = true;
            } else if c.absolute {
                index = c.delta;
            } else {
                index += c.delta;
            }
        }
        for c in self.corrections.iter_mut().filter(|c| c.tag <= reply_tag) {
            c.valid = false;
        }
        self.corrections.retain(|c| c.valid);
        if let Some(t) = self.timing_info.as_mut() {
            t.write_index_corrupt = corrupt;
        }
        index
    }
}

/// A playback, record, or sample-cache upload stream.
#[derive(Clone)]
pub struct Stream {
    context: Context,
    inner: Rc<RefCell<Inner>>,
}

impl Stream {
    pub fn new(context: &Context, direction: Direction, spec: Spec, channel_map: Map) -> Self {
        let inner = Inner {
            direction,
            state: State::Unconnected,
            spec,
            channel_map,
            attr: BufferAttr::default(),
            flags: StreamFlagSet::NOFLAGS,
            corked: false,
            channel: None,
            requested_bytes: 0,
            corrections: Vec::new(),
            timing_info: None,
            timing_update_pending: false,
            smoother: Smoother::new(),
            read_buffer: Vec::new(),
            state_callback: None,
            write_callback: None,
            read_callback: None,
            overflow_callback: None,
            underflow_callback: None,
            last_error: None,
        };
        Stream { context: context.clone(), inner: Rc::new(RefCell::new(inner)) }
    }

    /// Convenience constructor for the sample-cache upload variant (module I): shares this
    /// type's state machine and write path, differing only in the `CREATE_UPLOAD_STREAM`
    /// command shape and in what the create-reply's index refers to (see
    /// [`Stream::finish_upload`]).
    pub fn new_upload(context: &Context, spec: Spec, channel_map: Map) -> Self {
        Self::new(context, Direction::Upload, spec, channel_map)
    }

    pub fn get_state(&self) -> State {
        self.inner.borrow().state
    }

    /// The error that drove this stream into `Failed`, if any.
    pub fn last_error(&self) -> Option<PulseError> {
        self.inner.borrow().last_error
    }

    pub fn set_state_callback(&mut self, callback: Option<Box<dyn FnMut(State)>>) {
        self.inner.borrow_mut().state_callback = callback;
    }

    pub fn set_write_callback(&mut self, callback: Option<Box<dyn FnMut(usize)>>) {
        self.inner.borrow_mut().write_callback = callback;
    }

    pub fn set_read_callback(&mut self, callback: Option<Box<dyn FnMut(usize)>>) {
        self.inner.borrow_mut().read_callback = callback;
    }

    pub fn set_overflow_callback(&mut self, callback: Option<Box<dyn FnMut()>>) {
        self.inner.borrow_mut().overflow_callback = callback;
    }

    pub fn set_underflow_callback(&mut self, callback: Option<Box<dyn FnMut()>>) {
        self.inner.borrow_mut().underflow_callback = callback;
    }

    pub fn get_buffer_attr(&self) -> BufferAttr {
        self.inner.borrow().attr
    }

    pub fn is_corked(&self) -> bool {
        self.inner.borrow().corked
    }

    /// Sends `CREATE_{PLAYBACK,RECORD,UPLOAD}_STREAM`; the reply carries the server-assigned
    /// channel (or sample-cache index, for uploads) and the resolved buffer attributes.
    ///
    /// `flags` pins which of sample format/rate/channel-map the server must honor exactly: a
    /// reply that negotiates a different value for a field whose `FIX_*` bit isn't set fails the
    /// stream with [`PulseError::Protocol`] (see [`Stream::handle_create_reply`]).
    pub fn connect(
        &mut self,
        device: Option<&str>,
        attr: BufferAttr,
        corked: bool,
        flags: StreamFlagSet,
        sample_name: Option<&str>,
    ) -> Result<(), PulseError> {
        self.inner.borrow_mut().set_state(State::Creating);
        self.inner.borrow_mut().attr = attr;
        self.inner.borrow_mut().corked = corked;
        self.inner.borrow_mut().flags = flags;

        let (direction, inner_spec, inner_map) = {
            let inner = self.inner.borrow();
            (inner.direction, inner.spec, inner.channel_map)
        };

        let command = match direction {
            Direction::Playback => Command::CreatePlaybackStream,
            Direction::Record => Command::CreateRecordStream,
            Direction::Upload => Command::CreateUploadStream,
        };

        let mut body = TagStructWriter::new();
        body.write_sample_spec(&inner_spec);
        body.write_channel_map(&inner_map);
        body.write_index(None); // device index: server resolves from name
        body.write_string(device);
        body.write_u32(attr.maxlength);
        match direction {
            Direction::Playback | Direction::Upload => {
                body.write_bool(corked);
                body.write_u32(attr.tlength);
                body.write_u32(attr.prebuf);
                body.write_u32(attr.minreq);
                body.write_index(None); // sync group
                body.write_cvolume(&ChannelVolumes::init());
            }
            Direction::Record => {
                body.write_u32(attr.fragsize);
                body.write_bool(corked);
            }
        }
        body.write_u32(flags.bits());
        if direction == Direction::Upload {
            body.write_string(sample_name);
            body.write_u32(attr.maxlength);
        }

        let stream = self.clone();
        let (_op, tag) = self.context.new_operation(pulse_protocol::pdispatch::DEFAULT_TIMEOUT, move |outcome, _handle| {
            stream.handle_create_reply(outcome)
        });

        let mut framed = TagStructWriter::new();
        framed.write_u32(command.to_wire());
        framed.write_u32(tag);
        // `body`'s bytes already encode the tagged payload; re-emit them after the header.
        let payload = body.into_bytes();
        let mut bytes = framed.into_bytes();
        bytes.extend_from_slice(&payload);
        self.context.send_packet(bytes)
    }

    /// Reads back the server-assigned channel, the negotiated sample spec and channel map, and
    /// (for non-upload directions) the resolved buffer attributes. A pinned field (its `FIX_*`
    /// flag set at [`Stream::connect`]) that the server nonetheless changed fails the stream with
    /// [`PulseError::Protocol`] instead of silently adopting the server's value.
    fn handle_create_reply(&self, outcome: ReplyOutcome<'_>) {
        match outcome {
            ReplyOutcome::Reply(mut ts) => {
                let index = match ts.read_u32() {
                    Ok(v) => v,
                    Err(e) => return self.fail(e),
                };
                let (actual_spec, actual_map) = match (ts.read_sample_spec(), ts.read_channel_map()) {
                    (Ok(s), Ok(m)) => (s, m),
                    _ => return self.fail(PulseError::Protocol),
                };

                let (requested_spec, requested_map, flags) = {
                    let inner = self.inner.borrow();
                    (inner.spec, inner.channel_map, inner.flags)
                };
                if !flags.contains(StreamFlagSet::FIX_FORMAT) && actual_spec.format != requested_spec.format {
                    return self.fail(PulseError::Protocol);
                }
                if !flags.contains(StreamFlagSet::FIX_RATE) && actual_spec.rate != requested_spec.rate {
                    return self.fail(PulseError::Protocol);
                }
                if !flags.contains(StreamFlagSet::FIX_CHANNELS)
                    && (actual_spec.channels != requested_spec.channels || actual_map != requested_map)
                {
                    return self.fail(PulseError::Protocol);
                }

                let mut inner = self.inner.borrow_mut();
                inner.channel = Some(index);
                inner.spec = actual_spec;
                inner.channel_map = actual_map;
                if inner.direction != Direction::Upload {
                    if let (Ok(maxlength), Ok(tlength_or_fragsize)) = (ts.read_u32(), ts.read_u32()) {
                        inner.attr.maxlength = maxlength;
                        match inner.direction {
                            Direction::Playback => inner.attr.tlength = tlength_or_fragsize,
                            Direction::Record => inner.attr.fragsize = tlength_or_fragsize,
                            Direction::Upload => unreachable!(),
                        }
                    }
                }
                inner.set_state(State::Ready);
                drop(inner);
                self.context.register_stream(index, self.downgrade());
            }
            ReplyOutcome::Error(e) => self.fail(e),
            ReplyOutcome::Timeout => self.fail(PulseError::Timeout),
            ReplyOutcome::ConnectionTerminated => self.fail(PulseError::ConnectionTerminated),
        }
    }

    fn fail(&self, err: PulseError) {
        let mut inner = self.inner.borrow_mut();
        inner.last_error = Some(err);
        let channel = inner.channel;
        inner.set_state(State::Failed);
        drop(inner);
        if let Some(channel) = channel {
            self.context.unregister_stream(channel);
        }
    }

    /// A weak handle into this stream's state, suitable for a channel-indexed registry that must
    /// not keep the stream alive by itself (see [`crate::context::Context`]'s stream table).
    pub(crate) fn downgrade(&self) -> Weak<RefCell<Inner>> {
        Rc::downgrade(&self.inner)
    }

    /// Upgrades `weak` and routes one unsolicited command to it via [`Stream::handle_event`].
    /// Returns `false` if the stream no longer exists, so the caller can prune a stale registry
    /// entry.
    pub(crate) fn route_command(context: &Context, weak: &Weak<RefCell<Inner>>, command: Command, ts: TagStructReader<'_>) -> bool {
        match weak.upgrade() {
            Some(inner) => {
                Stream { context: context.clone(), inner }.handle_event(command, ts);
                true
            }
            None => false,
        }
    }

    /// Upgrades `weak` and appends one delivered slice of a `Record` stream's audio to its read
    /// buffer, firing the read callback. Returns `false` if the stream no longer exists.
    pub(crate) fn route_memblock(context: &Context, weak: &Weak<RefCell<Inner>>, bytes: &[u8]) -> bool {
        match weak.upgrade() {
            Some(inner) => {
                Stream { context: context.clone(), inner }.handle_memblock(bytes);
                true
            }
            None => false,
        }
    }

    /// Writes a chunk of playback (or upload) audio. Decrements `requested_bytes` and, if a
    /// timing update is currently pending, records a write-index correction keyed by the next
    /// outbound command's tag.
    pub fn write(&mut self, chunk: MemChunk, offset: i64, seek: pulse_protocol::frame::SeekMode) -> Result<(), PulseError> {
        let (channel, len) = {
            let inner = self.inner.borrow();
            if inner.direction == Direction::Record {
                return Err(PulseError::BadState);
            }
            let channel = inner.channel.ok_or(PulseError::BadState)?;
            (channel, chunk.length as i64)
        };

        {
            let mut inner = self.inner.borrow_mut();
            inner.requested_bytes = inner.requested_bytes.saturating_sub(len as u64);
            if inner.timing_update_pending {
                if let Some(tag) = self.context.next_pending_tag() {
                    use pulse_protocol::frame::SeekMode as S;
                    match seek {
                        S::Absolute => inner.push_correction(tag, false, true, offset + len),
                        S::Relative => inner.push_correction(tag, false, false, offset + len),
                        S::RelativeOnRead | S::RelativeOnEnd => inner.push_correction(tag, true, false, 0),
                    }
                }
            }
        }

        self.context.send_memblock(channel, chunk, offset, seek)
    }

    /// How many bytes of `Record` audio are buffered and not yet consumed by
    /// [`Stream::discard`].
    pub fn readable_size(&self) -> usize {
        self.inner.borrow().read_buffer.len()
    }

    /// A copy of the currently buffered `Record` audio. Call [`Stream::discard`] once the bytes
    /// have been consumed to advance past them; a `peek` on its own never shrinks the buffer.
    pub fn peek(&self) -> Vec<u8> {
        self.inner.borrow().read_buffer.clone()
    }

    /// Drops the first `len` buffered bytes (clamped to what's actually available), completing
    /// the read started by a prior [`Stream::peek`].
    pub fn discard(&mut self, len: usize) {
        let mut inner = self.inner.borrow_mut();
        let len = len.min(inner.read_buffer.len());
        inner.read_buffer.drain(..len);
    }

    /// Appends one delivered slice of `Record` audio and fires the read callback with the new
    /// total buffered size, mirroring `Request`'s effect on the write side.
    fn handle_memblock(&self, bytes: &[u8]) {
        let mut inner = self.inner.borrow_mut();
        if inner.direction != Direction::Record {
            return;
        }
        inner.read_buffer.extend_from_slice(bytes);
        let size = inner.read_buffer.len();
        if let Some(cb) = inner.read_callback.as_mut() {
            cb(size);
        }
    }

    /// `CORK_*_STREAM`/`FLUSH_*_STREAM`/`PREBUF_PLAYBACK_STREAM`/`TRIGGER_PLAYBACK_STREAM`: a
    /// tagged command whose acknowledgement updates the local corked flag and pauses/resumes the
    /// smoother. `prebuf`/`trigger` are rejected locally when the negotiated `prebuf == 0`.
    pub fn cork(&mut self, pause: bool) -> Result<(), PulseError> {
        let command = match self.inner.borrow().direction {
            Direction::Playback | Direction::Upload => Command::CorkPlaybackStream,
            Direction::Record => Command::CorkRecordStream,
        };
        self.send_simple_ack(command, move |ts| ts.write_bool(pause), move |stream| {
            let mut inner = stream.inner.borrow_mut();
            inner.corked = pause;
            let now = inner.smoother_now();
            if pause {
                inner.smoother.pause(now);
            } else {
                inner.smoother.resume(now);
            }
        })
    }

    pub fn flush(&mut self) -> Result<(), PulseError> {
        let direction = self.inner.borrow().direction;
        let command = match direction {
            Direction::Playback | Direction::Upload => Command::FlushPlaybackStream,
            Direction::Record => Command::FlushRecordStream,
        };
        self.send_simple_ack(command, |_| {}, move |stream| {
            let mut inner = stream.inner.borrow_mut();
            if direction == Direction::Record {
                if let Some(t) = inner.timing_info.as_mut() {
                    t.read_index_corrupt = true;
                }
                inner.read_buffer.clear();
            } else {
                let tag = inner.corrections.last().map(|c| c.tag);
                if let Some(tag) = tag {
                    inner.push_correction(tag, true, false, 0);
                }
            }
        })
    }

    pub fn prebuf(&mut self) -> Result<(), PulseError> {
        if self.inner.borrow().attr.prebuf == 0 {
            return Err(PulseError::BadState);
        }
        self.send_simple_ack(Command::PrebufPlaybackStream, |_| {}, |_| {})
    }

    pub fn trigger(&mut self) -> Result<(), PulseError> {
        if self.inner.borrow().attr.prebuf == 0 {
            return Err(PulseError::BadState);
        }
        self.send_simple_ack(Command::TriggerPlaybackStream, |_| {}, |_| {})
    }

    fn send_simple_ack(
        &mut self,
        command: Command,
        write_extra: impl FnOnce(&mut TagStructWriter),
        on_ack: impl FnOnce(&Stream) + 'static,
    ) -> Result<(), PulseError> {
        let channel = self.inner.borrow().channel.ok_or(PulseError::BadState)?;
        let stream = self.clone();
        let (_op, tag) = self.context.new_operation(pulse_protocol::pdispatch::DEFAULT_TIMEOUT, move |outcome, _handle| {
            if matches!(outcome, ReplyOutcome::Reply(_)) {
                on_ack(&stream);
            }
        });
        let mut framed = TagStructWriter::new();
        framed.write_u32(command.to_wire());
        framed.write_u32(tag);
        framed.write_index(Some(channel));
        write_extra(&mut framed);
        self.context.send_packet(framed.into_bytes())
    }

    /// `scache` upload completion: carries the sample name and total length via
    /// `FINISH_UPLOAD_STREAM`; the create-reply's index (stashed as `channel` during
    /// [`Stream::connect`]) identified the allocated cache slot rather than a playback channel.
    pub fn finish_upload(&mut self) -> Result<(), PulseError> {
        if self.inner.borrow().direction != Direction::Upload {
            return Err(PulseError::BadState);
        }
        let index = self.inner.borrow().channel.ok_or(PulseError::BadState)?;
        let mut framed = TagStructWriter::new();
        framed.write_u32(Command::FinishUploadStream.to_wire());
        framed.write_u32(0);
        framed.write_index(Some(index));
        self.context.send_packet(framed.into_bytes())
    }

    /// The current playback/record position estimate: the smoother's output if a smoother
    /// update is in effect, else derived directly from the last timing snapshot.
    pub fn get_time(&self) -> Result<pulse_protocol::time::MicroSeconds, PulseError> {
        let inner = self.inner.borrow();
        let info = inner.timing_info.as_ref().ok_or(PulseError::NoData)?;
        let usable = match inner.direction {
            Direction::Record => info.read_index_usable(),
            Direction::Playback | Direction::Upload => info.write_index_usable(),
        };
        if !usable {
            return Err(PulseError::NoData);
        }
        let bytes = match inner.direction {
            Direction::Record => info.read_index,
            Direction::Playback | Direction::Upload => info.write_index,
        };
        let base = inner.spec.bytes_to_usec(bytes.max(0) as u64);
        let usec = match inner.direction {
            Direction::Playback | Direction::Upload => {
                base.0 as i64 + info.transport_usec.0 as i64 - info.sink_usec.0 as i64
            }
            Direction::Record => base.0 as i64 + info.transport_usec.0 as i64 + info.source_usec.0 as i64 - info.sink_usec.0 as i64,
        };
        Ok(pulse_protocol::time::MicroSeconds(usec.max(0) as u64))
    }

    /// Requests a fresh timing snapshot; on reply, reconciles the correction ring against the
    /// server-reported write index per [`Inner::reconcile_write_index`] and feeds the result to
    /// the smoother.
    pub fn update_timing_info(&mut self) -> Result<(), PulseError> {
        let channel = self.inner.borrow().channel.ok_or(PulseError::BadState)?;
        let command = match self.inner.borrow().direction {
            Direction::Playback | Direction::Upload => Command::GetPlaybackLatency,
            Direction::Record => Command::GetRecordLatency,
        };
        self.inner.borrow_mut().timing_update_pending = true;
        let stream = self.clone();
        let (_op, tag) = self.context.new_operation(pulse_protocol::pdispatch::DEFAULT_TIMEOUT, move |outcome, _handle| {
            stream.handle_timing_reply(outcome, tag)
        });
        let mut framed = TagStructWriter::new();
        framed.write_u32(command.to_wire());
        framed.write_u32(tag);
        framed.write_index(Some(channel));
        self.context.send_packet(framed.into_bytes())
    }

    fn handle_timing_reply(&self, outcome: ReplyOutcome<'_>, reply_tag: u32) {
        let mut inner = self.inner.borrow_mut();
        inner.timing_update_pending = false;
        if let ReplyOutcome::Reply(mut ts) = outcome {
            if let Ok(write_index) = ts.read_i64() {
                let reconciled = inner.reconcile_write_index(reply_tag, write_index);
                let now = inner.smoother_now();
                inner.smoother.put(now, reconciled);
            }
        }
    }

    /// Handles one unsolicited command addressed to this stream's channel.
    pub fn handle_event(&self, command: Command, mut ts: pulse_protocol::tagstruct::TagStructReader<'_>) {
        match command {
            Command::Request => {
                if let Ok(bytes) = ts.read_u32() {
                    let mut inner = self.inner.borrow_mut();
                    inner.requested_bytes += bytes as u64;
                    if let Some(cb) = inner.write_callback.as_mut() {
                        cb(bytes as usize);
                    }
                }
            }
            Command::Overflow => {
                if let Some(cb) = self.inner.borrow_mut().overflow_callback.as_mut() {
                    cb();
                }
            }
            Command::Underflow => {
                let mut inner = self.inner.borrow_mut();
                if let Some(cb) = inner.underflow_callback.as_mut() {
                    cb();
                }
                if inner.attr.prebuf > 0 {
                    let now = inner.smoother_now();
                    inner.smoother.pause(now);
                }
            }
            Command::StreamSuspended | Command::StreamMoved | Command::StreamBufferAttrChanged => {
                drop(ts);
                let _ = self.update_timing_info();
            }
            Command::StreamStarted => {
                let mut inner = self.inner.borrow_mut();
                let now = inner.smoother_now();
                inner.smoother.resume(now);
                drop(inner);
                let _ = self.update_timing_info();
            }
            Command::PlaybackStreamKilled | Command::RecordStreamKilled => {
                self.fail(PulseError::Killed);
            }
            _ => {}
        }
    }
}

impl Inner {
    /// Arbitrary monotonic clock used as the smoother's `x` axis; µs since process start.
    fn smoother_now(&self) -> i64 {
        static START: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();
        let start = *START.get_or_init(std::time::Instant::now);
        start.elapsed().as_micros() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correction_ring_evicts_oldest_past_capacity() {
        let mut inner = Inner {
            direction: Direction::Playback,
            state: State::Unconnected,
            spec: Spec { format: pulse_protocol::sample::Format::S16le, rate: 44100, channels: 2 },
            channel_map: Map::init_stereo(),
            attr: BufferAttr::default(),
            flags: StreamFlagSet::NOFLAGS,
            corked: false,
            channel: Some(0),
            requested_bytes: 0,
            corrections: Vec::new(),
            timing_info: None,
            timing_update_pending: false,
            smoother: Smoother::new(),
            read_buffer: Vec::new(),
            state_callback: None,
            write_callback: None,
            read_callback: None,
            overflow_callback: None,
            underflow_callback: None,
            last_error: None,
        };
        for i in 0..(CORRECTION_RING_CAPACITY as u32 + 5) {
            inner.push_correction(i, false, false, 10);
        }
        assert_eq!(inner.corrections.len(), CORRECTION_RING_CAPACITY);
    }

    #[test]
    fn reconcile_applies_deltas_at_or_after_tag_and_invalidates_up_to_it() {
        let mut inner = Inner {
            direction: Direction::Playback,
            state: State::Unconnected,
            spec: Spec { format: pulse_protocol::sample::Format::S16le, rate: 44100, channels: 2 },
            channel_map: Map::init_stereo(),
            attr: BufferAttr::default(),
            flags: StreamFlagSet::NOFLAGS,
            corked: false,
            channel: Some(0),
            requested_bytes: 0,
            corrections: Vec::new(),
            timing_info: None,
            timing_update_pending: false,
            smoother: Smoother::new(),
            read_buffer: Vec::new(),
            state_callback: None,
            write_callback: None,
            read_callback: None,
            overflow_callback: None,
            underflow_callback: None,
            last_error: None,
        };
        inner.push_correction(5, false, false, 500);
        inner.push_correction(6, false, false, 700);
        inner.push_correction(7, false, false, 300);
        let reconciled = inner.reconcile_write_index(5, 8000);
        assert_eq!(reconciled, 9500);
        assert_eq!(inner.corrections.len(), 2);
    }

    fn stereo_spec() -> Spec {
        Spec { format: pulse_protocol::sample::Format::S16le, rate: 44100, channels: 2 }
    }

    #[test]
    fn record_stream_buffers_memblocks_until_discarded() {
        let context = Context::new("probe");
        let mut stream = Stream::new(&context, Direction::Record, stereo_spec(), Map::init_stereo());
        stream.handle_memblock(&[1, 2, 3, 4]);
        assert_eq!(stream.readable_size(), 4);
        assert_eq!(stream.peek(), vec![1, 2, 3, 4]);
        stream.discard(2);
        assert_eq!(stream.readable_size(), 2);
        assert_eq!(stream.peek(), vec![3, 4]);
    }

    #[test]
    fn playback_stream_ignores_memblocks() {
        let context = Context::new("probe");
        let stream = Stream::new(&context, Direction::Playback, stereo_spec(), Map::init_stereo());
        stream.handle_memblock(&[1, 2, 3]);
        assert_eq!(stream.readable_size(), 0);
    }

    #[test]
    fn discard_past_end_clamps_to_buffer_len() {
        let context = Context::new("probe");
        let mut stream = Stream::new(&context, Direction::Record, stereo_spec(), Map::init_stereo());
        stream.handle_memblock(&[1, 2, 3]);
        stream.discard(100);
        assert_eq!(stream.readable_size(), 0);
    }

    #[test]
    fn weak_handle_upgrades_only_while_stream_is_alive() {
        let context = Context::new("probe");
        let stream = Stream::new(&context, Direction::Playback, stereo_spec(), Map::init_stereo());
        let weak = stream.downgrade();
        assert!(weak.upgrade().is_some());
        drop(stream);
        assert!(weak.upgrade().is_none());
    }
}
