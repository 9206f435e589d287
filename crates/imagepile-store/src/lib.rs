//! # imagepile-store
//!
//! Deduplicated block storage for disk images.
//!
//! The store keeps every unique 4096-byte block exactly once in an
//! append-only pool file and records one 64-bit fingerprint per block in an
//! append-only index file. Blocks are addressed by ordinal (their position
//! in the pool), which stays stable for the lifetime of the pool.
//!
//! ## On-disk layout
//!
//! ```text
//! $IMGDIR/
//! ├── imagepile.db          # pool: unframed 4096-byte blocks
//! └── imagepile.hash_index  # index: unframed little-endian u64 fingerprints
//! ```
//!
//! The index always holds exactly one fingerprint per pool block, in
//! ordinal order. The in-memory lookup table is rebuilt from the index at
//! startup; fingerprints are a lossy hint and every candidate match is
//! verified byte-for-byte against the pool before a block is reused.

mod fingerprint;
mod index;
mod lookup;
mod pool;
mod store;

pub use fingerprint::{xxh3_fingerprint, FingerprintFn};
pub use index::HashIndex;
pub use lookup::{BucketTable, Matches};
pub use pool::BlockPool;
pub use store::{DedupStore, Resolution, StoreStats, INDEX_FILE, POOL_FILE};

use std::io;

use thiserror::Error;

/// Universal block size for the whole system. Pool addressing, descriptor
/// math and the ingest padding rules all assume this value; changing it
/// invalidates every existing pool.
pub const BLOCK_SIZE: usize = 4096;

/// A single pool block.
pub type Block = [u8; BLOCK_SIZE];

/// Errors that can occur against the pool, index or lookup.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("pool corrupt: size {size} is not a whole number of blocks")]
    PoolMisaligned { size: u64 },

    #[error("pool truncated: block {ordinal} unreadable")]
    ShortBlock { ordinal: u32 },

    #[error("hash index corrupt: size {size} is not a whole number of fingerprints")]
    IndexMisaligned { size: u64 },

    #[error("hash index truncated while rebuilding lookup at record {record}")]
    IndexShortRead { record: u32 },

    #[error("pool and index out of lockstep: {pool_blocks} blocks vs {index_records} fingerprints")]
    Lockstep {
        pool_blocks: u32,
        index_records: u32,
    },

    #[error("pool full: 32-bit ordinal space exhausted")]
    PoolFull,
}

pub type Result<T> = std::result::Result<T, StoreError>;
