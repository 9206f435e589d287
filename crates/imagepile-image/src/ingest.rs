//! Ingest pipeline: byte stream in, descriptor out, pool grown as needed.

use std::io::{Read, Seek, Write};

use imagepile_store::{DedupStore, BLOCK_SIZE};
use tracing::debug;

use crate::descriptor::{read_full, DescriptorWriter};
use crate::interrupt::Interruption;
use crate::{ImageError, Result};

/// Counters for one ingest run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Blocks written to the descriptor.
    pub blocks: u64,
    /// Input bytes consumed.
    pub bytes: u64,
    /// Blocks appended to the pool by this run.
    pub new_blocks: u64,
    /// Blocks resolved to an existing ordinal.
    pub reused_blocks: u64,
    /// Candidate ordinals byte-compared against the pool.
    pub probes: u64,
    /// Fingerprint matches rejected by the byte comparison.
    pub collisions: u64,
}

/// Split `input` into 4096-byte blocks, resolve each against `store` and
/// write the resulting descriptor to `output`.
///
/// `head_skip` truncates the very first block: its payload lands at
/// `buf[head_skip..]` with zeroes in front, so reconstruction can slice
/// the skip back off. A short final read is zero-padded to a full block
/// and its significant length recorded as `tail_bytes`; input ending on a
/// block boundary leaves `tail_bytes` at the full block size.
///
/// `output` must be seekable because `tail_bytes` is patched into the
/// header after the last block; callers streaming to a pipe stage the
/// descriptor through an in-memory buffer first.
///
/// On interruption the store and the partial descriptor are flushed and
/// `ImageError::Interrupted` is returned.
pub fn ingest<R: Read, W: Write + Seek>(
    store: &mut DedupStore,
    input: &mut R,
    output: W,
    head_skip: u32,
    interrupt: &dyn Interruption,
) -> Result<IngestReport> {
    let mut writer = DescriptorWriter::new(output, head_skip)?;
    let mut report = IngestReport::default();
    let stats_before = store.stats();

    let mut buf = [0u8; BLOCK_SIZE];
    let mut skip = head_skip as usize;
    let mut tail_bytes = BLOCK_SIZE as u32;

    loop {
        if interrupt.interrupted() {
            store.flush()?;
            writer.flush()?;
            return Err(ImageError::Interrupted);
        }

        // The first block reads short when head_skip is in play; all
        // later blocks request the full block size.
        let request = BLOCK_SIZE - skip;
        let got = read_full(input, &mut buf[skip..skip + request])?;
        if got == 0 {
            // Input ended on a block boundary; the tail placeholder
            // stays at the full block size.
            break;
        }

        let at_eof = got < request;
        if at_eof {
            buf[skip + got..].fill(0);
            tail_bytes = (skip + got) as u32;
        }
        buf[..skip].fill(0);

        let resolution = store.resolve(&buf)?;
        writer.push_ordinal(resolution.ordinal)?;
        report.blocks += 1;
        report.bytes += got as u64;
        if resolution.was_new {
            report.new_blocks += 1;
        } else {
            report.reused_blocks += 1;
        }

        skip = 0;
        if at_eof {
            break;
        }
    }

    let stats_after = store.stats();
    report.probes = stats_after.probes - stats_before.probes;
    report.collisions = stats_after.collisions - stats_before.collisions;

    store.flush()?;
    writer.finish(tail_bytes)?;
    debug!(
        blocks = report.blocks,
        new = report.new_blocks,
        reused = report.reused_blocks,
        "ingest complete"
    );
    Ok(report)
}
