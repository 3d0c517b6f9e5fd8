//! Packet stream: frames control packets and audio memory blocks over a single [`IoChannel`],
//! in both directions, enforcing [`crate::frame::MAX_FRAME_SIZE`] and delivering audio
//! incrementally as bytes arrive rather than only once a whole frame has been buffered.

use crate::error::PulseError;
use crate::frame::{Descriptor, SeekMode, CHANNEL_CONTROL, DESCRIPTOR_SIZE, MAX_FRAME_SIZE};
use crate::iochannel::{IoChannel, IoResult};
use crate::memblock::{MemChunk, Pool};
use std::collections::VecDeque;

/// Largest slice of a memblock frame delivered to the callback in one go. Chosen to bound latency
/// of delivery without fragmenting every small frame into many callback invocations.
const RECV_CHUNK_SIZE: usize = 8192;

/// One queued outbound item: an atomic control packet, or a slice of audio destined for a
/// channel at a given queue position.
enum SendItem {
    Packet { data: Vec<u8>, with_creds: bool },
    Memblock { chunk: MemChunk, channel: u32, offset: i64, seek: SeekMode },
}

impl SendItem {
    fn descriptor(&self) -> Descriptor {
        match self {
            SendItem::Packet { data, .. } => Descriptor::control(data.len() as u32),
            SendItem::Memblock { chunk, channel, offset, seek } => {
                Descriptor::audio(*channel, chunk.length as u32, *offset, *seek)
            }
        }
    }

    fn payload(&self) -> &[u8] {
        match self {
            SendItem::Packet { data, .. } => data,
            SendItem::Memblock { chunk, .. } => chunk.as_slice(),
        }
    }
}

/// In-flight send state: the descriptor and payload bytes already written for the head of the
/// queue.
struct SendInFlight {
    item: SendItem,
    header: [u8; DESCRIPTOR_SIZE],
    header_sent: usize,
    payload_sent: usize,
}

/// Receive-side state machine.
enum RecvState {
    /// Reading the fixed-size descriptor.
    Header { buf: [u8; DESCRIPTOR_SIZE], filled: usize },
    /// Reading a control packet's payload.
    Packet { descriptor: Descriptor, buf: Vec<u8>, filled: usize },
    /// Streaming an audio frame's payload; `delivered` tracks how many bytes have already been
    /// handed to the memblock callback so seek info is only reported once per frame.
    Memblock { descriptor: Descriptor, delivered: u32 },
}

/// What a completed memblock delivery carries: the payload slice plus, on the first delivery for
/// a frame, the seek positioning.
pub struct MemblockDelivery<'a> {
    pub channel: u32,
    pub bytes: &'a [u8],
    /// `Some` only on the first delivery of a given frame.
    pub seek: Option<(i64, SeekMode)>,
    pub frame_complete: bool,
}

/// Frames control packets and audio over an [`IoChannel`]. Driven externally by a mainloop
/// (`pulse-tokio`'s reactor, or any other implementation of the mainloop trait) calling
/// [`PStream::on_readable`]/[`PStream::on_writable`] when the underlying fd is ready.
pub struct PStream {
    io: Box<dyn IoChannel>,
    send_queue: VecDeque<SendItem>,
    in_flight: Option<SendInFlight>,
    recv_state: RecvState,
    dead: bool,
    shared_memory_enabled: bool,
}

impl PStream {
    pub fn new(io: Box<dyn IoChannel>) -> Self {
        PStream {
            io,
            send_queue: VecDeque::new(),
            in_flight: None,
            recv_state: RecvState::Header { buf: [0u8; DESCRIPTOR_SIZE], filled: 0 },
            dead: false,
            shared_memory_enabled: false,
        }
    }

    pub fn enable_shared_memory(&mut self) {
        self.shared_memory_enabled = true;
    }

    pub fn is_shared_memory_enabled(&self) -> bool {
        self.shared_memory_enabled
    }

    pub fn is_dead(&self) -> bool {
        self.dead
    }

    /// True iff a send item is mid-transmit or the queue is non-empty.
    pub fn is_pending(&self) -> bool {
        self.in_flight.is_some() || !self.send_queue.is_empty()
    }

    /// Queues a control packet for transmission.
    pub fn send_packet(&mut self, data: Vec<u8>, with_creds: bool) -> Result<(), PulseError> {
        if self.dead {
            return Ok(());
        }
        if data.len() as u32 > MAX_FRAME_SIZE {
            return Err(PulseError::Invalid);
        }
        self.send_queue.push_back(SendItem::Packet { data, with_creds });
        Ok(())
    }

    /// Queues an audio chunk for transmission on `channel`.
    pub fn send_memblock(&mut self, channel: u32, chunk: MemChunk, offset: i64, seek: SeekMode) -> Result<(), PulseError> {
        if self.dead {
            return Ok(());
        }
        if channel == CHANNEL_CONTROL {
            return Err(PulseError::Invalid);
        }
        if chunk.length as u32 > MAX_FRAME_SIZE {
            return Err(PulseError::Invalid);
        }
        self.send_queue.push_back(SendItem::Memblock { chunk, channel, offset, seek });
        Ok(())
    }

    /// Idempotent: after the first call, all queued sends are dropped and the channel reports
    /// dead.
    pub fn close(&mut self) {
        self.dead = true;
        self.send_queue.clear();
        self.in_flight = None;
    }

    /// Drains as much of the outbound queue as the channel will currently accept.
    /// Returns `true` if the queue transitioned from pending to fully idle this call (the
    /// "drain" edge).
    pub fn on_writable(&mut self) -> Result<bool, PulseError> {
        if self.dead {
            return Ok(false);
        }
        let was_pending = self.is_pending();
        loop {
            if self.in_flight.is_none() {
                match self.send_queue.pop_front() {
                    None => break,
                    Some(item) => {
                        let header = item.descriptor().encode();
                        self.in_flight = Some(SendInFlight { item, header, header_sent: 0, payload_sent: 0 });
                    }
                }
            }
            let done = {
                let inflight = self.in_flight.as_mut().unwrap();
                if inflight.header_sent < DESCRIPTOR_SIZE {
                    match self.io.write(&inflight.header[inflight.header_sent..])? {
                        IoResult::Done(n) => {
                            inflight.header_sent += n;
                            if n == 0 {
                                return Ok(false);
                            }
                        }
                        IoResult::WouldBlock => return Ok(false),
                    }
                    false
                } else {
                    let payload = inflight.item.payload();
                    if inflight.payload_sent >= payload.len() {
                        true
                    } else {
                        match self.io.write(&payload[inflight.payload_sent..])? {
                            IoResult::Done(n) => {
                                inflight.payload_sent += n;
                                if n == 0 {
                                    return Ok(false);
                                }
                                inflight.payload_sent >= payload.len()
                            }
                            IoResult::WouldBlock => return Ok(false),
                        }
                    }
                }
            };
            if done {
                self.in_flight = None;
            }
        }
        Ok(was_pending && !self.is_pending())
    }

    /// Reads as much as the channel currently offers, advancing the receive state machine and
    /// invoking `on_packet`/`on_memblock` as frames (or slices of frames) complete.
    ///
    /// `alloc` is used to materialize a fresh [`MemChunk`] for each delivered slice of an audio
    /// frame, via the pool the caller's context owns.
    pub fn on_readable(
        &mut self,
        pool: &Pool,
        mut on_packet: impl FnMut(Vec<u8>),
        mut on_memblock: impl FnMut(MemblockDelivery<'_>),
    ) -> Result<(), PulseError> {
        if self.dead {
            return Ok(());
        }
        let mut scratch = [0u8; RECV_CHUNK_SIZE];
        loop {
            match &mut self.recv_state {
                RecvState::Header { buf, filled } => {
                    match self.io.read(&mut buf[*filled..])? {
                        IoResult::WouldBlock => return Ok(()),
                        IoResult::Done(n) => {
                            *filled += n;
                            if *filled < DESCRIPTOR_SIZE {
                                continue;
                            }
                            let descriptor = Descriptor::decode(buf).map_err(|e| {
                                self.dead = true;
                                e
                            })?;
                            self.recv_state = if descriptor.is_control() {
                                RecvState::Packet { descriptor, buf: Vec::with_capacity(descriptor.length as usize), filled: 0 }
                            } else {
                                RecvState::Memblock { descriptor, delivered: 0 }
                            };
                        }
                    }
                }
                RecvState::Packet { descriptor, buf, filled } => {
                    let remaining = descriptor.length as usize - *filled;
                    if remaining == 0 {
                        let data = std::mem::take(buf);
                        self.recv_state = RecvState::Header { buf: [0u8; DESCRIPTOR_SIZE], filled: 0 };
                        on_packet(data);
                        continue;
                    }
                    let want = remaining.min(scratch.len());
                    match self.io.read(&mut scratch[..want])? {
                        IoResult::WouldBlock => return Ok(()),
                        IoResult::Done(n) => {
                            buf.extend_from_slice(&scratch[..n]);
                            *filled += n;
                        }
                    }
                }
                RecvState::Memblock { descriptor, delivered } => {
                    let remaining = descriptor.length - *delivered;
                    if remaining == 0 {
                        self.recv_state = RecvState::Header { buf: [0u8; DESCRIPTOR_SIZE], filled: 0 };
                        continue;
                    }
                    let want = (remaining as usize).min(scratch.len());
                    match self.io.read(&mut scratch[..want])? {
                        IoResult::WouldBlock => return Ok(()),
                        IoResult::Done(n) => {
                            if n == 0 {
                                return Ok(());
                            }
                            let is_first = *delivered == 0;
                            let _ = pool; // delivered slice is transient; caller copies what it needs
                            *delivered += n as u32;
                            let frame_complete = *delivered >= descriptor.length;
                            on_memblock(MemblockDelivery {
                                channel: descriptor.channel,
                                bytes: &scratch[..n],
                                seek: if is_first { Some((descriptor.offset, descriptor.seek_mode)) } else { None },
                                frame_complete,
                            });
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iochannel::UnixChannel;
    use std::os::unix::net::UnixStream;

    fn pair() -> (PStream, PStream) {
        let (a, b) = UnixStream::pair().unwrap();
        let a = PStream::new(Box::new(UnixChannel::new(a).unwrap()));
        let b = PStream::new(Box::new(UnixChannel::new(b).unwrap()));
        (a, b)
    }

    #[test]
    fn packet_round_trips_end_to_end() {
        let (mut a, mut b) = pair();
        a.send_packet(b"hello world".to_vec(), false).unwrap();
        assert!(a.is_pending());
        a.on_writable().unwrap();

        let pool = Pool::new();
        let mut received = None;
        b.on_readable(&pool, |data| received = Some(data), |_| panic!("unexpected memblock")).unwrap();
        assert_eq!(received, Some(b"hello world".to_vec()));
    }

    #[test]
    fn oversized_packet_is_rejected_at_enqueue() {
        let (mut a, _b) = pair();
        let big = vec![0u8; (MAX_FRAME_SIZE + 1) as usize];
        assert_eq!(a.send_packet(big, false), Err(PulseError::Invalid));
    }

    #[test]
    fn close_is_idempotent_and_drops_queue() {
        let (mut a, _b) = pair();
        a.send_packet(b"x".to_vec(), false).unwrap();
        a.close();
        a.close();
        assert!(!a.is_pending());
        assert!(a.is_dead());
    }

    #[test]
    fn memblock_delivery_reports_seek_only_on_first_chunk() {
        let (mut a, mut b) = pair();
        let pool = Pool::new();
        let block = pool.new_user(vec![7u8; 100]);
        let chunk = MemChunk::new(block, 0, 100).unwrap();
        a.send_memblock(3, chunk, 0, SeekMode::Relative).unwrap();
        a.on_writable().unwrap();

        let mut seeks = 0;
        let mut total = 0usize;
        b.on_readable(
            &pool,
            |_| panic!("unexpected packet"),
            |d| {
                total += d.bytes.len();
                if d.seek.is_some() {
                    seeks += 1;
                }
            },
        )
        .unwrap();
        assert_eq!(seeks, 1);
        assert_eq!(total, 100);
    }
}
