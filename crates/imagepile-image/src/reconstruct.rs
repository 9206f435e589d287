//! Reconstruct pipeline: descriptor in, original byte stream out.

use std::io::{BufWriter, Read, Write};

use imagepile_store::{BlockPool, BLOCK_SIZE};
use tracing::debug;

use crate::descriptor::DescriptorReader;
use crate::interrupt::Interruption;
use crate::{ImageError, Result};

/// Counters for one reconstruct run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconstructReport {
    /// Ordinals replayed from the descriptor.
    pub blocks: u64,
    /// Bytes written to the output.
    pub bytes: u64,
}

/// Replay `descriptor` against `pool`, writing the original bytes to
/// `output`.
///
/// Each block is emitted as `block[start..end]` where `start` is
/// `head_skip` on the first block (0 after) and `end` is `tail_bytes` on
/// the last block (the block size before). A single-block descriptor
/// applies both at once, which is what makes the reconstructed length
/// come out to `(n-1)*B + tail_bytes - head_skip` for every n.
///
/// Reconstruction mutates no persistent state, so an interruption simply
/// stops the run.
pub fn reconstruct<R: Read, W: Write>(
    pool: &mut BlockPool,
    descriptor: R,
    output: W,
    interrupt: &dyn Interruption,
) -> Result<ReconstructReport> {
    let mut reader = DescriptorReader::new(descriptor)?;
    let header = reader.header();
    let mut out = BufWriter::new(output);
    let mut report = ReconstructReport::default();

    let mut buf = [0u8; BLOCK_SIZE];
    let mut start = header.head_skip as usize;

    while let Some((ordinal, last)) = reader.next_ordinal()? {
        if interrupt.interrupted() {
            return Err(ImageError::Interrupted);
        }

        let end = if last {
            header.tail_bytes as usize
        } else {
            BLOCK_SIZE
        };
        if start > end {
            // Only possible on a single-block descriptor whose header
            // fields contradict each other.
            return Err(ImageError::HeadTailConflict);
        }

        pool.read_block(ordinal, &mut buf)?;
        out.write_all(&buf[start..end])?;
        report.blocks += 1;
        report.bytes += (end - start) as u64;
        start = 0;
    }

    out.flush()?;
    debug!(
        blocks = report.blocks,
        bytes = report.bytes,
        "reconstruct complete"
    );
    Ok(report)
}
