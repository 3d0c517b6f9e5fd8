//! Memory-block pool: reference-counted audio buffers, optionally backed by a shared-memory arena
//! so that local peers with matching effective UIDs can exchange audio without a copy.
//!
//! The actual POSIX shared-memory segment is a collaborator out of this crate's scope (it would
//! live behind [`crate::iochannel`]'s credential-passing path); what's modeled here is the
//! ownership and chunking discipline every caller must follow regardless of backing store.

use crate::error::PulseError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Where a block's bytes live. `Shared` blocks are never mutated after publish, which is what
/// makes handing out an `Arc` to another thread/peer safe without further synchronization.
#[derive(Debug, Clone)]
enum Backing {
    Shared(Arc<[u8]>),
    Private(Arc<Vec<u8>>),
}

impl Backing {
    fn as_slice(&self) -> &[u8] {
        match self {
            Backing::Shared(b) => b,
            Backing::Private(b) => b,
        }
    }
}

/// A reference-counted buffer of audio or control payload bytes.
///
/// `acquire`/`release` track how many callers currently hold a direct pointer into the block's
/// bytes (e.g. a pending write or an in-flight pstream send), independent of how many [`MemBlock`]
/// handles (Rust-level `Clone`s) exist. A pool reclaiming shared-memory storage checks
/// [`MemBlock::acquire_count`] to avoid invalidating a chunk still in use.
#[derive(Debug, Clone)]
pub struct MemBlock {
    backing: Backing,
    acquire_count: Arc<AtomicUsize>,
}

impl MemBlock {
    pub fn len(&self) -> usize {
        self.backing.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        self.backing.as_slice()
    }

    /// True if this block was allocated from the shared arena (i.e. is eligible to be handed to
    /// the peer by reference rather than copied onto the wire).
    pub fn is_shared(&self) -> bool {
        matches!(self.backing, Backing::Shared(_))
    }

    /// Marks the block as in use for direct pointer access and returns its bytes. Every `acquire`
    /// must be paired with a [`MemBlock::release`].
    pub fn acquire(&self) -> &[u8] {
        self.acquire_count.fetch_add(1, Ordering::SeqCst);
        self.backing.as_slice()
    }

    /// Ends one pending [`MemBlock::acquire`].
    pub fn release(&self) {
        let prev = self.acquire_count.fetch_sub(1, Ordering::SeqCst);
        debug_assert!(prev > 0, "memblock released without a matching acquire");
    }

    /// How many `acquire`s are currently outstanding. A block must reach zero here before its
    /// backing storage is reclaimed.
    pub fn acquire_count(&self) -> usize {
        self.acquire_count.load(Ordering::SeqCst)
    }
}

/// A borrowed view into a [`MemBlock`]: `index + length <= block.len()` is an invariant of every
/// chunk, enforced by [`MemChunk::new`] rather than left to panic lazily in `as_slice`.
#[derive(Debug, Clone)]
pub struct MemChunk {
    pub block: MemBlock,
    pub index: usize,
    pub length: usize,
}

impl MemChunk {
    /// Fails with [`PulseError::Invalid`] if `index + length` would run past `block`'s end.
    pub fn new(block: MemBlock, index: usize, length: usize) -> Result<Self, PulseError> {
        let end = index.checked_add(length).ok_or(PulseError::Invalid)?;
        if end > block.len() {
            return Err(PulseError::Invalid);
        }
        Ok(MemChunk { block, index, length })
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.block.as_slice()[self.index..self.index + self.length]
    }
}

/// Allocates [`MemBlock`]s, deciding per-allocation whether to use the shared arena.
///
/// `enable_shared` mirrors the context connect algorithm's decision to turn on shared-memory
/// transport once both peers are confirmed local and EUID-matched; until that happens every
/// block is private-heap.
#[derive(Debug, Default)]
pub struct Pool {
    shared_enabled: bool,
    /// Maximum single-block size this pool will allocate.
    max_block_size: usize,
}

/// Default maximum block size: large enough for any single audio frame under
/// [`crate::frame::MAX_FRAME_SIZE`].
pub const DEFAULT_MAX_BLOCK_SIZE: usize = 1024 * 1024 * 16;

impl Pool {
    pub fn new() -> Self {
        Pool { shared_enabled: false, max_block_size: DEFAULT_MAX_BLOCK_SIZE }
    }

    /// Enables handing out shared-arena blocks. Called once the context connect algorithm
    /// confirms the peer is local with a matching effective UID.
    pub fn enable_shared(&mut self) {
        self.shared_enabled = true;
    }

    pub fn is_shared_enabled(&self) -> bool {
        self.shared_enabled
    }

    /// Allocates a fresh, zero-initialized block of exactly `len` bytes. `None` if `len` exceeds
    /// the pool's maximum block size.
    pub fn new_block(&self, len: usize) -> Option<MemBlock> {
        if len > self.max_block_size {
            return None;
        }
        let backing = if self.shared_enabled {
            Backing::Shared(Arc::from(vec![0u8; len].into_boxed_slice()))
        } else {
            Backing::Private(Arc::new(vec![0u8; len]))
        };
        Some(MemBlock { backing, acquire_count: Arc::new(AtomicUsize::new(0)) })
    }

    /// Wraps caller-supplied bytes as a private block, skipping the shared arena regardless of
    /// pool state (mirrors `pa_memblock_new_user`, which always allocates privately since the
    /// caller's free callback cannot run across a shared-memory boundary).
    pub fn new_user(&self, data: Vec<u8>) -> MemBlock {
        MemBlock { backing: Backing::Private(Arc::new(data)), acquire_count: Arc::new(AtomicUsize::new(0)) }
    }

    pub fn max_block_size(&self) -> usize {
        self.max_block_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_block_respects_max_size() {
        let mut pool = Pool::new();
        pool.max_block_size = 16;
        assert!(pool.new_block(16).is_some());
        assert!(pool.new_block(17).is_none());
    }

    #[test]
    fn shared_enable_switches_backing() {
        let mut pool = Pool::new();
        let private = pool.new_block(4).unwrap();
        assert!(!private.is_shared());
        pool.enable_shared();
        let shared = pool.new_block(4).unwrap();
        assert!(shared.is_shared());
    }

    #[test]
    fn chunk_slice_respects_index_and_length() {
        let pool = Pool::new();
        let block = pool.new_user(vec![1, 2, 3, 4, 5]);
        let chunk = MemChunk::new(block, 1, 3).unwrap();
        assert_eq!(chunk.as_slice(), &[2, 3, 4]);
    }

    #[test]
    fn chunk_construction_rejects_out_of_range_bounds() {
        let pool = Pool::new();
        let block = pool.new_user(vec![1, 2, 3]);
        assert!(matches!(MemChunk::new(block.clone(), 2, 2), Err(PulseError::Invalid)));
        assert!(matches!(MemChunk::new(block, usize::MAX, 1), Err(PulseError::Invalid)));
    }

    #[test]
    fn acquire_release_tracks_outstanding_count() {
        let pool = Pool::new();
        let block = pool.new_user(vec![1, 2, 3]);
        assert_eq!(block.acquire_count(), 0);
        let _bytes = block.acquire();
        assert_eq!(block.acquire_count(), 1);
        let _bytes2 = block.acquire();
        assert_eq!(block.acquire_count(), 2);
        block.release();
        assert_eq!(block.acquire_count(), 1);
        block.release();
        assert_eq!(block.acquire_count(), 0);
    }
}
