use super::*;
use bitmap::BitMap;
use block_device::BlockDevice;
use common::*;
use error::{FsError, Result};
use layout::{decode_inodes, decode_pointers, encode_inodes, encode_pointers, Inode, SuperBlock};

use std::sync::Arc;

/// State that only exists while the volume is mounted.
struct Mounted {
    super_blk: SuperBlock,
    bitmap: BitMap,
}

pub struct FileSystem {
    blk_dev: Arc<dyn BlockDevice>,
    mounted: Option<Mounted>,
}

impl FileSystem {
    /// Wraps a device. Nothing is read until [`FileSystem::mount`].
    pub fn new(blk_dev: Arc<dyn BlockDevice>) -> Self {
        Self {
            blk_dev,
            mounted: None,
        }
    }

    pub fn blk_dev(&self) -> Arc<dyn BlockDevice> {
        self.blk_dev.clone()
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.is_some()
    }

    pub fn super_block(&self) -> Option<&SuperBlock> {
        self.mounted.as_ref().map(|m| &m.super_blk)
    }

    pub fn bitmap(&self) -> Option<&BitMap> {
        self.mounted.as_ref().map(|m| &m.bitmap)
    }

    /// Writes an empty file system over the whole device.
    pub fn format(&self) -> Result<()> {
        if self.is_mounted() {
            return Err(FsError::AlreadyMounted);
        }
        let sb = SuperBlock::new(self.blk_dev.num_blocks())?;

        self.write_block(0, &sb.encode()?)?;
        let empty_inodes = encode_inodes(&[Inode::default(); INODES_PER_BLOCK])?;
        for iblock in 1..=sb.ninodeblocks() {
            self.write_block(iblock, &empty_inodes)?;
        }
        for bno in sb.data_start()..sb.nblocks() {
            self.bzero(bno)?;
        }

        log::info!(
            "formatted {} blocks: {} inode blocks, {} inodes",
            sb.nblocks,
            sb.ninodeblocks,
            sb.ninodes
        );
        Ok(())
    }

    /// Validates the superblock and derives the free block map from the inode table.
    ///
    /// Mounting an already mounted volume rescans it.
    pub fn mount(&mut self) -> Result<()> {
        self.mounted = None;

        let sb = SuperBlock::decode(&self.read_block(0)?)?;
        sb.check(self.blk_dev.num_blocks())?;
        let bitmap = BitMap::rebuild(&sb, self.blk_dev.as_ref())?;

        log::info!(
            "mounted {} blocks, {} in use",
            sb.nblocks,
            bitmap.used_count()
        );
        self.mounted = Some(Mounted {
            super_blk: sb,
            bitmap,
        });
        Ok(())
    }

    pub fn unmount(&mut self) {
        if self.mounted.take().is_some() {
            log::info!("unmounted");
        }
    }

    /// Human readable dump of the superblock and every valid inode.
    /// Reads the device directly, so it works on unmounted volumes too.
    pub fn debug(&self) -> Result<String> {
        let sb = SuperBlock::decode(&self.read_block(0)?)?;
        let mut lines = vec![
            "superblock:".to_string(),
            if sb.is_valid() {
                "    magic number is valid".to_string()
            } else {
                "    magic number is invalid!".to_string()
            },
            format!("    {} blocks", sb.nblocks),
            format!("    {} inode blocks", sb.ninodeblocks),
            format!("    {} inodes", sb.ninodes),
        ];

        if let Err(err) = sb.check(self.blk_dev.num_blocks()) {
            lines.push(format!("cannot list inodes: {err}"));
            return Ok(lines.join("\n") + "\n");
        }

        for iblock in 1..=sb.ninodeblocks() {
            let inodes = decode_inodes(&self.read_block(iblock)?)?;
            for (slot, inode) in inodes.iter().enumerate().filter(|(_, inode)| inode.valid) {
                let inumber = (iblock - 1) * INODES_PER_BLOCK + slot + 1;
                lines.push(format!("inode {inumber}:"));
                lines.push(format!("    size: {} bytes", inode.size));
                lines.push(format!("    direct blocks:{}", join_pointers(&inode.direct)));
                if inode.indirect == 0 {
                    continue;
                }

                lines.push(format!("    indirect block: {}", inode.indirect));
                match sb.check_pointer(inode.indirect) {
                    Ok(indirect) => {
                        let pointers = self.read_pointers(indirect)?;
                        lines.push(format!("    indirect data blocks:{}", join_pointers(&pointers)));
                    }
                    Err(err) => lines.push(format!("    indirect data blocks: unreadable, {err}")),
                }
            }
        }
        Ok(lines.join("\n") + "\n")
    }
}

/// " 3 4 5" for the non-zero entries
fn join_pointers(pointers: &[u32]) -> String {
    pointers
        .iter()
        .filter(|&&bno| bno != 0)
        .map(|bno| format!(" {bno}"))
        .collect()
}

// Helpers shared by the inode table, the translator and the read/write path.
impl FileSystem {
    /// Cached superblock, or `NotMounted`.
    pub(crate) fn sb(&self) -> Result<SuperBlock> {
        self.mounted
            .as_ref()
            .map(|m| m.super_blk)
            .ok_or(FsError::NotMounted)
    }

    fn bitmap_mut(&mut self) -> Result<&mut BitMap> {
        self.mounted
            .as_mut()
            .map(|m| &mut m.bitmap)
            .ok_or(FsError::NotMounted)
    }

    /// Replaces the free block map with a fresh scan of the inode table.
    /// On error the current map is left as it was.
    pub(crate) fn rebuild_bitmap(&mut self) -> Result<()> {
        let sb = self.sb()?;
        let bitmap = BitMap::rebuild(&sb, self.blk_dev.as_ref())?;
        self.set_bitmap(bitmap)
    }

    pub(crate) fn set_bitmap(&mut self, bitmap: BitMap) -> Result<()> {
        *self.bitmap_mut()? = bitmap;
        Ok(())
    }

    pub(crate) fn read_block(&self, bno: usize) -> Result<Block> {
        let mut block = [0; BLOCK_SIZE];
        self.blk_dev.read_block(bno, &mut block)?;
        Ok(block)
    }

    pub(crate) fn write_block(&self, bno: usize, block: &Block) -> Result<()> {
        self.blk_dev.write_block(bno, block)?;
        Ok(())
    }

    /// zero a block
    fn bzero(&self, bno: usize) -> Result<()> {
        self.write_block(bno, &[0; BLOCK_SIZE])
    }

    /// Allocates a zeroed data block.
    pub(crate) fn balloc(&mut self) -> Result<u32> {
        let bno = self.bitmap_mut()?.alloc().ok_or(FsError::NoSpace)?;
        if let Err(err) = self.bzero(bno) {
            self.bitmap_mut()?.dealloc(bno);
            return Err(err);
        }
        log::debug!("balloc: block {bno}");
        Ok(bno as u32)
    }

    pub(crate) fn bfree(&mut self, bno: u32) -> Result<()> {
        self.bitmap_mut()?.dealloc(bno as usize);
        log::debug!("bfree: block {bno}");
        Ok(())
    }

    pub(crate) fn read_pointers(&self, bno: usize) -> Result<layout::PointerBlock> {
        decode_pointers(&self.read_block(bno)?)
    }

    pub(crate) fn write_pointers(&self, bno: usize, pointers: &layout::PointerBlock) -> Result<()> {
        self.write_block(bno, &encode_pointers(pointers)?)
    }
}
