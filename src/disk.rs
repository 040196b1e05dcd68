//! Block devices backing a volume:
//! [`DiskImage`] keeps the blocks in a host file, [`MemDisk`] keeps them in memory.

use super::*;
use block_device::BlockDevice;
use common::*;

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

fn check_request(blockno: usize, nblocks: usize, len: usize) -> io::Result<()> {
    if blockno >= nblocks {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("block {blockno} is out of range for a {nblocks}-block device"),
        ));
    }
    if len != BLOCK_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("buffer of {len} bytes is not a complete block"),
        ));
    }
    Ok(())
}

/// # of block reads / writes served by a device
#[derive(Debug, Default)]
struct IoStats {
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl IoStats {
    fn read(&self) {
        self.reads.fetch_add(1, Ordering::Relaxed);
    }

    fn write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }
}

/// A disk image file of exactly `nblocks * BLOCK_SIZE` bytes.
pub struct DiskImage {
    file: Mutex<File>,
    nblocks: usize,
    stats: IoStats,
}

impl DiskImage {
    /// Opens `path`, creating it if needed, and sizes it to `nblocks` blocks.
    pub fn open(path: impl AsRef<Path>, nblocks: usize) -> io::Result<Self> {
        let len = nblocks
            .checked_mul(BLOCK_SIZE)
            .and_then(|len| u64::try_from(len).ok())
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("{nblocks} blocks do not fit in an image file"),
                )
            })?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.as_ref())?;
        file.set_len(len)?;
        log::debug!("opened {} with {nblocks} blocks", path.as_ref().display());
        Ok(Self {
            file: Mutex::new(file),
            nblocks,
            stats: IoStats::default(),
        })
    }

    pub fn reads(&self) -> usize {
        self.stats.reads.load(Ordering::Relaxed)
    }

    pub fn writes(&self) -> usize {
        self.stats.writes.load(Ordering::Relaxed)
    }

    fn lock(&self) -> io::Result<std::sync::MutexGuard<'_, File>> {
        self.file
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "disk image lock poisoned"))
    }
}

impl BlockDevice for DiskImage {
    fn read_block(&self, blockno: usize, buf: &mut [u8]) -> io::Result<()> {
        check_request(blockno, self.nblocks, buf.len())?;
        let mut file = self.lock()?;
        file.seek(SeekFrom::Start((blockno * BLOCK_SIZE) as u64))?;
        file.read_exact(buf)?;
        self.stats.read();
        Ok(())
    }

    fn write_block(&self, blockno: usize, buf: &[u8]) -> io::Result<()> {
        check_request(blockno, self.nblocks, buf.len())?;
        let mut file = self.lock()?;
        file.seek(SeekFrom::Start((blockno * BLOCK_SIZE) as u64))?;
        file.write_all(buf)?;
        self.stats.write();
        Ok(())
    }

    fn num_blocks(&self) -> usize {
        self.nblocks
    }
}

/// An in-memory device, zero-filled on creation.
pub struct MemDisk {
    blocks: Mutex<Vec<Block>>,
    nblocks: usize,
    stats: IoStats,
}

impl MemDisk {
    pub fn new(nblocks: usize) -> Self {
        Self {
            blocks: Mutex::new(vec![[0; BLOCK_SIZE]; nblocks]),
            nblocks,
            stats: IoStats::default(),
        }
    }

    pub fn reads(&self) -> usize {
        self.stats.reads.load(Ordering::Relaxed)
    }

    pub fn writes(&self) -> usize {
        self.stats.writes.load(Ordering::Relaxed)
    }

    /// Copy of the whole device, block by block.
    pub fn snapshot(&self) -> Vec<Block> {
        match self.blocks.lock() {
            Ok(blocks) => blocks.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn lock(&self) -> io::Result<std::sync::MutexGuard<'_, Vec<Block>>> {
        self.blocks
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "memory disk lock poisoned"))
    }
}

impl BlockDevice for MemDisk {
    fn read_block(&self, blockno: usize, buf: &mut [u8]) -> io::Result<()> {
        check_request(blockno, self.nblocks, buf.len())?;
        buf.copy_from_slice(&self.lock()?[blockno]);
        self.stats.read();
        Ok(())
    }

    fn write_block(&self, blockno: usize, buf: &[u8]) -> io::Result<()> {
        check_request(blockno, self.nblocks, buf.len())?;
        self.lock()?[blockno].copy_from_slice(buf);
        self.stats.write();
        Ok(())
    }

    fn num_blocks(&self) -> usize {
        self.nblocks
    }
}
