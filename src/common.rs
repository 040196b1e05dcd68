use std::mem::size_of;

pub const FS_MAGIC: u32 = 0xf0f03410;

/// block size
pub const BLOCK_SIZE: usize = 1024;

/// direct blocks in inode
pub const POINTERS_PER_INODE: usize = 5;

/// block ids held by an indirect block
pub const POINTERS_PER_BLOCK: usize = BLOCK_SIZE / size_of::<u32>();

/// isvalid + size + direct pointers + indirect pointer
pub const INODE_SIZE: usize = (2 + POINTERS_PER_INODE + 1) * size_of::<u32>();

/// inodes per block
pub const INODES_PER_BLOCK: usize = BLOCK_SIZE / INODE_SIZE;

/// max # of logical blocks a file can have
pub const MAX_FILE_BLOCKS: usize = POINTERS_PER_INODE + POINTERS_PER_BLOCK;

/// max file size in bytes
pub const MAX_FILE_SIZE: usize = MAX_FILE_BLOCKS * BLOCK_SIZE;

/// one tenth of the volume, rounded up, holds the inode table
pub const INODE_BLOCK_DIVISOR: usize = 10;

pub type Block = [u8; BLOCK_SIZE];
