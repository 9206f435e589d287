//! # imagepile-image
//!
//! Image descriptors and the pipelines that produce and replay them.
//!
//! An image descriptor is the entire metadata for one ingested disk image:
//! a 12-byte header followed by a packed run of 32-bit pool ordinals, one
//! per 4096-byte block of the original stream, in input order. Given the
//! pool it was built against, a descriptor reconstructs the original bytes
//! exactly, including a head-truncated first block (legacy sector
//! misalignment) and a zero-padded final block.
//!
//! ## Wire format
//!
//! ```text
//! offset  size  field
//! 0       4     'IPIL'
//! 4       4     head_skip   (u32 LE, 0 <= head_skip < 4096)
//! 8       4     tail_bytes  (u32 LE, 0 < tail_bytes <= 4096)
//! 12      4n    ordinals    (n x u32 LE)
//! ```
//!
//! All fields are little-endian on the wire.
//!
//! ## Block slicing
//!
//! Reconstruction emits ordinal `i` of `n` as `block[start..end]`, where
//! `start` is `head_skip` on the first block (0 after) and `end` is
//! `tail_bytes` on the last block (4096 before). Both bounds apply to the
//! same block when `n == 1`, so a descriptor always reconstructs to
//! exactly `(n-1) * 4096 + tail_bytes - head_skip` bytes. Ingest mirrors
//! the rule: a head-truncated first block carries its payload at
//! `buf[head_skip..]` with zeroes in front, and `tail_bytes` counts the
//! significant prefix of the final block.

mod descriptor;
mod ingest;
mod interrupt;
mod reconstruct;

pub use descriptor::{DescriptorHeader, DescriptorReader, DescriptorWriter, HEADER_LEN, MAGIC};
pub use ingest::{ingest, IngestReport};
pub use interrupt::{Interruption, Uninterruptible};
pub use reconstruct::{reconstruct, ReconstructReport};

use std::io;

use imagepile_store::StoreError;
use thiserror::Error;

/// Errors from descriptor parsing and the two pipelines.
#[derive(Error, Debug)]
pub enum ImageError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("bad signature at start of descriptor")]
    BadMagic,

    #[error("descriptor truncated: incomplete header")]
    ShortHeader,

    #[error("descriptor head_skip {head_skip} not below block size")]
    HeadSkipRange { head_skip: u32 },

    #[error("descriptor tail_bytes {tail_bytes} above block size")]
    TailBytesRange { tail_bytes: u32 },

    #[error("descriptor truncated: partial ordinal record")]
    PartialOrdinal,

    #[error("descriptor header fields reconstruct to a negative length")]
    HeadTailConflict,

    #[error("terminated by signal")]
    Interrupted,
}

pub type Result<T> = std::result::Result<T, ImageError>;
