use super::*;
use block_device::BlockDevice;
use common::*;
use error::Result;
use layout::{decode_inodes, decode_pointers, SuperBlock};

/// Free block map, derived from the inode graph and never written to disk.
///
/// Only [`BitMap::rebuild`], [`BitMap::alloc`] and [`BitMap::dealloc`] change it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitMap {
    used: Vec<bool>,
    /// first block `alloc` may hand out
    data_start: usize,
}

impl BitMap {
    /// Scans every inode block and marks what the superblock and valid inodes reach.
    pub fn rebuild(sb: &SuperBlock, blk_dev: &dyn BlockDevice) -> Result<Self> {
        let mut bitmap = Self {
            used: vec![false; sb.nblocks()],
            data_start: sb.data_start(),
        };
        bitmap.mark(0);

        let mut block = [0; BLOCK_SIZE];
        for iblock in 1..=sb.ninodeblocks() {
            blk_dev.read_block(iblock, &mut block)?;
            for inode in decode_inodes(&block)?.iter().filter(|inode| inode.valid) {
                bitmap.mark(iblock);

                for &bno in inode.direct.iter().filter(|&&bno| bno != 0) {
                    bitmap.mark(sb.check_pointer(bno)?);
                }

                if inode.indirect != 0 {
                    let indirect = sb.check_pointer(inode.indirect)?;
                    bitmap.mark(indirect);

                    let mut ind_block = [0; BLOCK_SIZE];
                    blk_dev.read_block(indirect, &mut ind_block)?;
                    for &bno in decode_pointers(&ind_block)?.iter().filter(|&&bno| bno != 0) {
                        bitmap.mark(sb.check_pointer(bno)?);
                    }
                }
            }
        }

        log::debug!(
            "bitmap rebuilt: {} of {} blocks in use",
            bitmap.used_count(),
            bitmap.len()
        );
        Ok(bitmap)
    }

    fn mark(&mut self, bno: usize) {
        self.used[bno] = true;
    }

    /// Lowest free block in the data region.
    pub fn alloc(&mut self) -> Option<usize> {
        let bno = (self.data_start..self.used.len()).find(|&bno| !self.used[bno])?;
        self.mark(bno);
        Some(bno)
    }

    /// Freeing a free block is a no-op.
    pub fn dealloc(&mut self, bno: usize) {
        if let Some(used) = self.used.get_mut(bno) {
            *used = false;
        }
    }

    pub fn is_used(&self, bno: usize) -> bool {
        self.used.get(bno).copied().unwrap_or(false)
    }

    pub fn used_count(&self) -> usize {
        self.used.iter().filter(|&&used| used).count()
    }

    pub fn len(&self) -> usize {
        self.used.len()
    }

    pub fn is_empty(&self) -> bool {
        self.used.is_empty()
    }
}
