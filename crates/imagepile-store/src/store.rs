//! Dedup resolution over pool, index and lookup.

use std::path::Path;

use tracing::debug;

use crate::fingerprint::{xxh3_fingerprint, FingerprintFn};
use crate::index::HashIndex;
use crate::lookup::BucketTable;
use crate::pool::BlockPool;
use crate::{Block, Result, StoreError};

/// Fixed file name of the block pool inside the pile directory.
pub const POOL_FILE: &str = "imagepile.db";
/// Fixed file name of the fingerprint index inside the pile directory.
pub const INDEX_FILE: &str = "imagepile.hash_index";

/// Outcome of resolving one block against the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    /// Ordinal the block now lives at (existing or freshly appended).
    pub ordinal: u32,
    /// True if the block was novel and appended to the pool.
    pub was_new: bool,
}

/// Running dedup counters for one store lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Candidate ordinals examined across all lookups.
    pub probes: u64,
    /// Fingerprint matches rejected by the byte comparison.
    pub collisions: u64,
}

/// Single-writer deduplicating block store.
///
/// Owns the pool, the persistent index and the in-memory lookup, and keeps
/// them in lockstep: every novel block appends once to the pool and once to
/// the index, in that order, with no early exit in between. A fingerprint
/// match is never trusted on its own; candidates are compared byte-for-byte
/// against the pool before reuse.
pub struct DedupStore {
    pool: BlockPool,
    index: HashIndex,
    lookup: BucketTable,
    fingerprint: FingerprintFn,
    stats: StoreStats,
    scratch: Block,
}

impl DedupStore {
    /// Open (or create) the store inside `dir` and rebuild the lookup from
    /// the index file.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        Self::open_with_fingerprint(dir, xxh3_fingerprint)
    }

    /// Open with a caller-supplied fingerprint function.
    ///
    /// The pool format does not depend on the hash, so an existing pool can
    /// be driven by any 64-bit function as long as the index file was built
    /// with the same one.
    pub fn open_with_fingerprint<P: AsRef<Path>>(
        dir: P,
        fingerprint: FingerprintFn,
    ) -> Result<Self> {
        let dir = dir.as_ref();
        let pool = BlockPool::open(dir.join(POOL_FILE))?;
        let mut index = HashIndex::open(dir.join(INDEX_FILE))?;

        if pool.blocks() != index.records() {
            return Err(StoreError::Lockstep {
                pool_blocks: pool.blocks(),
                index_records: index.records(),
            });
        }

        let mut lookup = BucketTable::new();
        let loaded = index.rebuild(&mut lookup)?;
        debug!(fingerprints = loaded, "lookup rebuilt from hash index");

        Ok(Self {
            pool,
            index,
            lookup,
            fingerprint,
            stats: StoreStats::default(),
            scratch: [0u8; crate::BLOCK_SIZE],
        })
    }

    /// Find `block` in the pool, or append it, returning its ordinal.
    ///
    /// The append path (pool, then index, then lookup) runs to completion
    /// with no intermediate fallible exit besides hard I/O failure, so a
    /// cooperative interruption polled between calls can never observe the
    /// pool and index out of lockstep.
    pub fn resolve(&mut self, block: &Block) -> Result<Resolution> {
        let fingerprint = (self.fingerprint)(block);

        let mut matches = self.lookup.find(fingerprint);
        while let Some(candidate) = matches.next() {
            self.stats.probes += 1;
            self.pool.read_block(candidate, &mut self.scratch)?;
            if &self.scratch == block {
                return Ok(Resolution {
                    ordinal: candidate,
                    was_new: false,
                });
            }
            self.stats.collisions += 1;
            debug!(fingerprint, candidate, "fingerprint collision rejected");
        }

        let ordinal = self.pool.append(block)?;
        self.index.append(fingerprint)?;
        self.lookup.insert(fingerprint, ordinal);
        Ok(Resolution {
            ordinal,
            was_new: true,
        })
    }

    /// Read the block at `ordinal` into `buf`.
    pub fn read_block(&mut self, ordinal: u32, buf: &mut Block) -> Result<()> {
        self.pool.read_block(ordinal, buf)
    }

    /// Number of blocks in the pool (== records in the index).
    pub fn blocks(&self) -> u32 {
        self.pool.blocks()
    }

    /// Dedup counters accumulated since open.
    pub fn stats(&self) -> StoreStats {
        self.stats
    }

    /// Flush pool and index to the OS.
    pub fn flush(&mut self) -> Result<()> {
        self.pool.flush()?;
        self.index.flush()
    }
}
