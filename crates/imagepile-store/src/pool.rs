//! Append-only block pool.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::{Block, Result, StoreError, BLOCK_SIZE};

/// Append-only file of fixed-size blocks, addressed by ordinal.
///
/// The pool is only ever grown at the tail; a block, once appended, keeps
/// its ordinal and its bytes forever. The file carries no header: byte
/// offset of block `i` is exactly `i * BLOCK_SIZE`.
pub struct BlockPool {
    file: File,
    blocks: u32,
}

impl BlockPool {
    /// Open a pool for reading and appending, creating it if absent.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(path)?;
        Self::from_file(file)
    }

    /// Open an existing pool read-only. Reconstruction never appends, so
    /// it must not create an empty pool on a mistyped directory.
    pub fn open_readonly<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new().read(true).open(path)?;
        Self::from_file(file)
    }

    fn from_file(file: File) -> Result<Self> {
        let size = file.metadata()?.len();
        if size % BLOCK_SIZE as u64 != 0 {
            return Err(StoreError::PoolMisaligned { size });
        }
        let blocks = u32::try_from(size / BLOCK_SIZE as u64)
            .map_err(|_| StoreError::PoolMisaligned { size })?;
        Ok(Self { file, blocks })
    }

    /// Append one block, returning its new ordinal.
    pub fn append(&mut self, block: &Block) -> Result<u32> {
        if self.blocks == u32::MAX {
            return Err(StoreError::PoolFull);
        }
        let ordinal = self.blocks;
        // Append mode: the kernel positions every write at end-of-file, so
        // interleaved reads cannot misplace an append.
        self.file.write_all(block)?;
        self.blocks += 1;
        Ok(ordinal)
    }

    /// Read the block at `ordinal` into `buf`.
    pub fn read_block(&mut self, ordinal: u32, buf: &mut Block) -> Result<()> {
        if ordinal >= self.blocks {
            return Err(StoreError::ShortBlock { ordinal });
        }
        self.file
            .seek(SeekFrom::Start(ordinal as u64 * BLOCK_SIZE as u64))?;
        self.file
            .read_exact(buf)
            .map_err(|_| StoreError::ShortBlock { ordinal })?;
        Ok(())
    }

    /// Number of blocks currently in the pool.
    pub fn blocks(&self) -> u32 {
        self.blocks
    }

    pub fn flush(&mut self) -> Result<()> {
        self.file.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn block_of(byte: u8) -> Block {
        [byte; BLOCK_SIZE]
    }

    #[test]
    fn append_assigns_dense_ordinals() {
        let dir = TempDir::new().unwrap();
        let mut pool = BlockPool::open(dir.path().join("imagepile.db")).unwrap();

        assert_eq!(pool.append(&block_of(0x00)).unwrap(), 0);
        assert_eq!(pool.append(&block_of(0xAA)).unwrap(), 1);
        assert_eq!(pool.append(&block_of(0x55)).unwrap(), 2);
        assert_eq!(pool.blocks(), 3);
    }

    #[test]
    fn read_returns_appended_bytes() {
        let dir = TempDir::new().unwrap();
        let mut pool = BlockPool::open(dir.path().join("imagepile.db")).unwrap();

        pool.append(&block_of(0x11)).unwrap();
        pool.append(&block_of(0x22)).unwrap();

        let mut buf = [0u8; BLOCK_SIZE];
        pool.read_block(0, &mut buf).unwrap();
        assert_eq!(buf, block_of(0x11));
        pool.read_block(1, &mut buf).unwrap();
        assert_eq!(buf, block_of(0x22));
    }

    #[test]
    fn read_past_end_fails() {
        let dir = TempDir::new().unwrap();
        let mut pool = BlockPool::open(dir.path().join("imagepile.db")).unwrap();
        pool.append(&block_of(0x11)).unwrap();

        let mut buf = [0u8; BLOCK_SIZE];
        assert!(matches!(
            pool.read_block(1, &mut buf),
            Err(StoreError::ShortBlock { ordinal: 1 })
        ));
    }

    #[test]
    fn reopen_preserves_block_count() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("imagepile.db");
        {
            let mut pool = BlockPool::open(&path).unwrap();
            pool.append(&block_of(0x11)).unwrap();
            pool.append(&block_of(0x22)).unwrap();
        }
        let pool = BlockPool::open(&path).unwrap();
        assert_eq!(pool.blocks(), 2);
    }

    #[test]
    fn misaligned_pool_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("imagepile.db");
        std::fs::write(&path, vec![0u8; BLOCK_SIZE + 17]).unwrap();

        assert!(matches!(
            BlockPool::open(&path),
            Err(StoreError::PoolMisaligned { .. })
        ));
    }

    #[test]
    fn readonly_open_requires_existing_pool() {
        let dir = TempDir::new().unwrap();
        assert!(BlockPool::open_readonly(dir.path().join("imagepile.db")).is_err());
    }
}
