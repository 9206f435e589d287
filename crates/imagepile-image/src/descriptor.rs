//! Descriptor wire format: header codec, ordinal writer, ordinal reader.

use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};

use imagepile_store::BLOCK_SIZE;

use crate::{ImageError, Result};

/// Descriptor signature bytes.
pub const MAGIC: [u8; 4] = *b"IPIL";
/// Fixed header length in bytes.
pub const HEADER_LEN: usize = 12;

/// Byte offset of the `tail_bytes` field, patched at end of ingest.
const TAIL_FIELD_OFFSET: u64 = 8;
/// Ordinals decoded per refill while reading a descriptor.
const ORDINAL_BATCH: usize = 1024;

/// Parsed descriptor header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorHeader {
    /// Bytes omitted from the start of the first reconstructed block.
    pub head_skip: u32,
    /// Significant bytes of the final block.
    pub tail_bytes: u32,
}

impl DescriptorHeader {
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[0..4].copy_from_slice(&MAGIC);
        buf[4..8].copy_from_slice(&self.head_skip.to_le_bytes());
        buf[8..12].copy_from_slice(&self.tail_bytes.to_le_bytes());
        buf
    }

    pub fn decode(buf: &[u8; HEADER_LEN]) -> Result<Self> {
        if buf[0..4] != MAGIC {
            return Err(ImageError::BadMagic);
        }
        let head_skip = u32::from_le_bytes(buf[4..8].try_into().unwrap());
        let tail_bytes = u32::from_le_bytes(buf[8..12].try_into().unwrap());
        if head_skip >= BLOCK_SIZE as u32 {
            return Err(ImageError::HeadSkipRange { head_skip });
        }
        if tail_bytes > BLOCK_SIZE as u32 {
            return Err(ImageError::TailBytesRange { tail_bytes });
        }
        Ok(Self {
            head_skip,
            tail_bytes,
        })
    }
}

/// Read `buf.len()` bytes unless end of input arrives first.
///
/// Plain `Read::read` may return short on pipes without meaning EOF, so
/// this loops; a short total therefore always means end of input.
pub(crate) fn read_full<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Streaming descriptor writer.
///
/// Writes the header up front with a placeholder `tail_bytes`, then packs
/// ordinals as they are resolved; `finish` seeks back and patches the real
/// tail size. The sink must be seekable for that patch, which is why the
/// CLI stages stdout descriptors through an in-memory buffer.
pub struct DescriptorWriter<W: Write + Seek> {
    out: BufWriter<W>,
    ordinals: u64,
}

impl<W: Write + Seek> DescriptorWriter<W> {
    pub fn new(out: W, head_skip: u32) -> Result<Self> {
        if head_skip >= BLOCK_SIZE as u32 {
            return Err(ImageError::HeadSkipRange { head_skip });
        }
        let header = DescriptorHeader {
            head_skip,
            tail_bytes: BLOCK_SIZE as u32,
        };
        let mut out = BufWriter::new(out);
        out.write_all(&header.encode())?;
        Ok(Self { out, ordinals: 0 })
    }

    pub fn push_ordinal(&mut self, ordinal: u32) -> Result<()> {
        self.out.write_all(&ordinal.to_le_bytes())?;
        self.ordinals += 1;
        Ok(())
    }

    /// Ordinals written so far.
    pub fn ordinals(&self) -> u64 {
        self.ordinals
    }

    /// Patch `tail_bytes` into the header and flush, returning the sink.
    pub fn finish(mut self, tail_bytes: u32) -> Result<W> {
        if tail_bytes > BLOCK_SIZE as u32 {
            return Err(ImageError::TailBytesRange { tail_bytes });
        }
        self.out.seek(SeekFrom::Start(TAIL_FIELD_OFFSET))?;
        self.out.write_all(&tail_bytes.to_le_bytes())?;
        self.out.seek(SeekFrom::End(0))?;
        self.out
            .into_inner()
            .map_err(|e| ImageError::Io(e.into_error()))
    }

    /// Flush buffered ordinals without finishing, for interruption paths
    /// that still want the partial descriptor on disk.
    pub fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}

/// Streaming descriptor reader with one-ordinal lookahead.
///
/// The lookahead is what lets the caller apply `tail_bytes` to the final
/// block: an ordinal is only handed out together with the knowledge of
/// whether another one follows, independent of how the ordinal run is
/// split across read batches.
pub struct DescriptorReader<R: Read> {
    input: R,
    header: DescriptorHeader,
    batch: [u8; ORDINAL_BATCH * 4],
    filled: usize,
    pos: usize,
    pending: Option<u32>,
}

impl<R: Read> DescriptorReader<R> {
    pub fn new(mut input: R) -> Result<Self> {
        let mut raw = [0u8; HEADER_LEN];
        let n = read_full(&mut input, &mut raw)?;
        if n < HEADER_LEN {
            return Err(ImageError::ShortHeader);
        }
        let header = DescriptorHeader::decode(&raw)?;
        Ok(Self {
            input,
            header,
            batch: [0u8; ORDINAL_BATCH * 4],
            filled: 0,
            pos: 0,
            pending: None,
        })
    }

    pub fn header(&self) -> DescriptorHeader {
        self.header
    }

    /// Next ordinal, paired with `true` when it is the descriptor's last.
    pub fn next_ordinal(&mut self) -> Result<Option<(u32, bool)>> {
        let current = match self.pending.take() {
            Some(ordinal) => ordinal,
            None => match self.decode_one()? {
                Some(ordinal) => ordinal,
                None => return Ok(None),
            },
        };
        self.pending = self.decode_one()?;
        Ok(Some((current, self.pending.is_none())))
    }

    fn decode_one(&mut self) -> Result<Option<u32>> {
        if self.pos == self.filled {
            let n = read_full(&mut self.input, &mut self.batch)?;
            if n == 0 {
                return Ok(None);
            }
            if n % 4 != 0 {
                return Err(ImageError::PartialOrdinal);
            }
            self.filled = n;
            self.pos = 0;
        }
        let raw: [u8; 4] = self.batch[self.pos..self.pos + 4].try_into().unwrap();
        self.pos += 4;
        Ok(Some(u32::from_le_bytes(raw)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn descriptor_bytes(head_skip: u32, tail_bytes: u32, ordinals: &[u32]) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&MAGIC);
        bytes.extend_from_slice(&head_skip.to_le_bytes());
        bytes.extend_from_slice(&tail_bytes.to_le_bytes());
        for o in ordinals {
            bytes.extend_from_slice(&o.to_le_bytes());
        }
        bytes
    }

    #[test]
    fn header_roundtrip() {
        let header = DescriptorHeader {
            head_skip: 512,
            tail_bytes: 3000,
        };
        assert_eq!(DescriptorHeader::decode(&header.encode()).unwrap(), header);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut raw = DescriptorHeader {
            head_skip: 0,
            tail_bytes: 4096,
        }
        .encode();
        raw[3] = b'Z';
        assert!(matches!(
            DescriptorHeader::decode(&raw),
            Err(ImageError::BadMagic)
        ));
    }

    #[test]
    fn out_of_range_fields_are_rejected() {
        let raw = DescriptorHeader {
            head_skip: 4096,
            tail_bytes: 4096,
        }
        .encode();
        assert!(matches!(
            DescriptorHeader::decode(&raw),
            Err(ImageError::HeadSkipRange { head_skip: 4096 })
        ));

        let raw = DescriptorHeader {
            head_skip: 0,
            tail_bytes: 4097,
        }
        .encode();
        assert!(matches!(
            DescriptorHeader::decode(&raw),
            Err(ImageError::TailBytesRange { tail_bytes: 4097 })
        ));
    }

    #[test]
    fn writer_emits_header_ordinals_and_patched_tail() {
        let mut writer = DescriptorWriter::new(Cursor::new(Vec::new()), 512).unwrap();
        writer.push_ordinal(0).unwrap();
        writer.push_ordinal(7).unwrap();
        let out = writer.finish(3000).unwrap().into_inner();

        assert_eq!(out, descriptor_bytes(512, 3000, &[0, 7]));
    }

    #[test]
    fn reader_flags_only_the_last_ordinal() {
        let bytes = descriptor_bytes(0, 4096, &[5, 6, 7]);
        let mut reader = DescriptorReader::new(Cursor::new(bytes)).unwrap();

        assert_eq!(reader.next_ordinal().unwrap(), Some((5, false)));
        assert_eq!(reader.next_ordinal().unwrap(), Some((6, false)));
        assert_eq!(reader.next_ordinal().unwrap(), Some((7, true)));
        assert_eq!(reader.next_ordinal().unwrap(), None);
    }

    #[test]
    fn lookahead_works_across_batch_boundaries() {
        // Exactly one full batch, then one more batch of one ordinal.
        let ordinals: Vec<u32> = (0..ORDINAL_BATCH as u32 + 1).collect();
        let bytes = descriptor_bytes(0, 100, &ordinals);
        let mut reader = DescriptorReader::new(Cursor::new(bytes)).unwrap();

        let mut seen = Vec::new();
        let mut last_flags = Vec::new();
        while let Some((ordinal, last)) = reader.next_ordinal().unwrap() {
            seen.push(ordinal);
            last_flags.push(last);
        }
        assert_eq!(seen, ordinals);
        assert_eq!(last_flags.iter().filter(|l| **l).count(), 1);
        assert_eq!(last_flags.last(), Some(&true));
    }

    #[test]
    fn last_flag_correct_when_count_is_a_batch_multiple() {
        let ordinals: Vec<u32> = (0..ORDINAL_BATCH as u32).collect();
        let bytes = descriptor_bytes(0, 100, &ordinals);
        let mut reader = DescriptorReader::new(Cursor::new(bytes)).unwrap();

        let mut count = 0usize;
        while let Some((_, last)) = reader.next_ordinal().unwrap() {
            count += 1;
            assert_eq!(last, count == ORDINAL_BATCH);
        }
        assert_eq!(count, ORDINAL_BATCH);
    }

    #[test]
    fn empty_ordinal_run_is_valid() {
        let bytes = descriptor_bytes(0, 4096, &[]);
        let mut reader = DescriptorReader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.next_ordinal().unwrap(), None);
    }

    #[test]
    fn partial_ordinal_is_corruption() {
        let mut bytes = descriptor_bytes(0, 4096, &[1, 2]);
        bytes.extend_from_slice(&[0xFF, 0xFF]);
        let mut reader = DescriptorReader::new(Cursor::new(bytes)).unwrap();

        // The torn record arrives in the first batch refill.
        assert!(matches!(
            reader.next_ordinal(),
            Err(ImageError::PartialOrdinal)
        ));
    }

    #[test]
    fn short_header_is_rejected() {
        let bytes = b"IPIL\x00\x00".to_vec();
        assert!(matches!(
            DescriptorReader::new(Cursor::new(bytes)),
            Err(ImageError::ShortHeader)
        ));
    }
}
