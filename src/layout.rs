//! Disk layout:
//! [ super block | inode blocks (ceil(nblocks / 10)) | data blocks ]
//!
//! Every block is a plain byte buffer; the views below decode and encode it
//! with bincode (fixed-width little-endian integers, no length prefixes).

use super::*;
use common::*;
use error::{FsError, Result};

use serde::{Deserialize, Serialize};

#[repr(C)]
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SuperBlock {
    /// Must be FS_MAGIC
    pub magic: u32,
    /// Size of file system image (blocks)
    pub nblocks: u32,
    /// Number of inode blocks
    pub ninodeblocks: u32,
    /// Number of inodes
    pub ninodes: u32,
}

impl SuperBlock {
    /// Layout of a fresh volume spanning `nblocks` blocks.
    pub fn new(nblocks: usize) -> Result<Self> {
        let ninodeblocks = nblocks.div_ceil(INODE_BLOCK_DIVISOR);
        if nblocks < ninodeblocks + 1 || u32::try_from(nblocks).is_err() {
            return Err(FsError::DeviceTooSmall(nblocks));
        }
        Ok(Self {
            magic: FS_MAGIC,
            nblocks: nblocks as u32,
            ninodeblocks: ninodeblocks as u32,
            ninodes: (ninodeblocks * INODES_PER_BLOCK) as u32,
        })
    }

    pub fn is_valid(&self) -> bool {
        self.magic == FS_MAGIC
    }

    /// Checks the counts against each other and against a device of `dev_blocks` blocks.
    pub fn check(&self, dev_blocks: usize) -> Result<()> {
        if !self.is_valid() {
            return Err(FsError::InvalidMagic(self.magic));
        }
        if self.nblocks as usize > dev_blocks {
            return Err(FsError::CorruptSuperblock("volume is larger than the device"));
        }
        if self.ninodeblocks == 0 || self.ninodeblocks >= self.nblocks {
            return Err(FsError::CorruptSuperblock("inode table does not fit the volume"));
        }
        if self.ninodes as usize != self.ninodeblocks as usize * INODES_PER_BLOCK {
            return Err(FsError::CorruptSuperblock("inode count does not match inode blocks"));
        }
        Ok(())
    }

    pub fn nblocks(&self) -> usize {
        self.nblocks as usize
    }

    pub fn ninodeblocks(&self) -> usize {
        self.ninodeblocks as usize
    }

    pub fn ninodes(&self) -> usize {
        self.ninodes as usize
    }

    /// first block of the data region
    pub fn data_start(&self) -> usize {
        self.ninodeblocks() + 1
    }

    /// Block holding inode `inumber`, and its slot in that block.
    pub fn iblock(&self, inumber: usize) -> (usize, usize) {
        (
            1 + (inumber - 1) / INODES_PER_BLOCK,
            (inumber - 1) % INODES_PER_BLOCK,
        )
    }

    /// Whether `bno` is a non-zero pointer into the data region.
    pub fn check_pointer(&self, bno: u32) -> Result<usize> {
        let bno_usize = bno as usize;
        if bno_usize < self.data_start() || bno_usize >= self.nblocks() {
            return Err(FsError::BlockOutOfBounds {
                block: bno,
                nblocks: self.nblocks(),
            });
        }
        Ok(bno_usize)
    }

    pub fn decode(block: &Block) -> Result<Self> {
        Ok(bincode::deserialize(block)?)
    }

    pub fn encode(&self) -> Result<Block> {
        let mut block = [0; BLOCK_SIZE];
        bincode::serialize_into(&mut block[..], self)?;
        Ok(block)
    }
}

/// inode on disk
#[repr(C)]
#[derive(Serialize, Deserialize, Default, Clone, Copy)]
struct DiskInode {
    isvalid: u32,
    size: u32,
    direct: [u32; POINTERS_PER_INODE],
    indirect: u32,
}

/// inode in memory
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Inode {
    pub valid: bool,
    /// Size of file (bytes)
    pub size: u32,
    /// Direct data block addresses, 0 for a hole
    pub direct: [u32; POINTERS_PER_INODE],
    /// Indirect block address, 0 if absent
    pub indirect: u32,
}

impl Inode {
    /// A valid, empty inode as handed out by `create`.
    pub fn empty() -> Self {
        Self {
            valid: true,
            ..Default::default()
        }
    }
}

impl From<DiskInode> for Inode {
    fn from(dinode: DiskInode) -> Self {
        Self {
            valid: dinode.isvalid != 0,
            size: dinode.size,
            direct: dinode.direct,
            indirect: dinode.indirect,
        }
    }
}

impl From<&Inode> for DiskInode {
    fn from(inode: &Inode) -> Self {
        Self {
            isvalid: inode.valid as u32,
            size: inode.size,
            direct: inode.direct,
            indirect: inode.indirect,
        }
    }
}

pub type InodeBlock = [Inode; INODES_PER_BLOCK];

pub fn decode_inodes(block: &Block) -> Result<InodeBlock> {
    let mut inodes = [Inode::default(); INODES_PER_BLOCK];
    let mut reader = &block[..];
    for inode in inodes.iter_mut() {
        *inode = bincode::deserialize_from::<_, DiskInode>(&mut reader)?.into();
    }
    Ok(inodes)
}

pub fn encode_inodes(inodes: &InodeBlock) -> Result<Block> {
    let mut block = [0; BLOCK_SIZE];
    let mut writer = &mut block[..];
    for inode in inodes {
        bincode::serialize_into(&mut writer, &DiskInode::from(inode))?;
    }
    Ok(block)
}

pub type PointerBlock = [u32; POINTERS_PER_BLOCK];

pub fn decode_pointers(block: &Block) -> Result<PointerBlock> {
    let mut pointers = [0; POINTERS_PER_BLOCK];
    let mut reader = &block[..];
    for ptr in pointers.iter_mut() {
        *ptr = bincode::deserialize_from(&mut reader)?;
    }
    Ok(pointers)
}

pub fn encode_pointers(pointers: &PointerBlock) -> Result<Block> {
    let mut block = [0; BLOCK_SIZE];
    let mut writer = &mut block[..];
    for ptr in pointers {
        bincode::serialize_into(&mut writer, ptr)?;
    }
    Ok(block)
}
