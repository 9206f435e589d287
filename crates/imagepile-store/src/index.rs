//! Persistent fingerprint index.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::lookup::BucketTable;
use crate::{Result, StoreError};

const RECORD_LEN: u64 = 8;

/// Append-only file of little-endian u64 fingerprints, one per pool block.
///
/// Record `i` is the fingerprint of pool block `i` (lockstep invariant);
/// the file is the persistent form of the in-memory lookup and is replayed
/// into it at startup.
pub struct HashIndex {
    file: File,
    records: u32,
}

impl HashIndex {
    /// Open an index for reading and appending, creating it if absent.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(path)?;
        let size = file.metadata()?.len();
        if size % RECORD_LEN != 0 {
            // A torn trailing record means the last append never completed.
            return Err(StoreError::IndexMisaligned { size });
        }
        let records = u32::try_from(size / RECORD_LEN)
            .map_err(|_| StoreError::IndexMisaligned { size })?;
        Ok(Self { file, records })
    }

    /// Append one fingerprint record.
    pub fn append(&mut self, fingerprint: u64) -> Result<()> {
        self.file.write_all(&fingerprint.to_le_bytes())?;
        self.records += 1;
        Ok(())
    }

    /// Replay every record into `lookup`, assigning ordinals in file order.
    ///
    /// Returns the number of fingerprints loaded.
    pub fn rebuild(&mut self, lookup: &mut BucketTable) -> Result<u32> {
        self.file.seek(SeekFrom::Start(0))?;
        let mut reader = BufReader::new(&mut self.file);
        let mut record = [0u8; RECORD_LEN as usize];
        for ordinal in 0..self.records {
            reader
                .read_exact(&mut record)
                .map_err(|_| StoreError::IndexShortRead { record: ordinal })?;
            lookup.insert(u64::from_le_bytes(record), ordinal);
        }
        Ok(self.records)
    }

    /// Number of fingerprint records in the file.
    pub fn records(&self) -> u32 {
        self.records
    }

    pub fn flush(&mut self) -> Result<()> {
        self.file.flush()?;
        Ok(())
    }
}
