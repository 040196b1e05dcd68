use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum FsError {
    #[error("file system is not mounted")]
    NotMounted,
    #[error("file system is already mounted")]
    AlreadyMounted,
    #[error("invalid magic number {0:#010x}")]
    InvalidMagic(u32),
    #[error("superblock is inconsistent: {0}")]
    CorruptSuperblock(&'static str),
    #[error("device has {0} blocks, which cannot hold a file system")]
    DeviceTooSmall(usize),
    #[error("inumber {0} is out of range or not in use")]
    InvalidInumber(usize),
    #[error("inode table is full")]
    InodeTableFull,
    #[error("no free data blocks left")]
    NoSpace,
    /// logical block index past the direct + indirect range
    #[error("logical block {0} exceeds the maximum file size")]
    FileTooLarge(usize),
    #[error("offset {offset} is past the end of the file ({size} bytes)")]
    InvalidOffset { offset: usize, size: usize },
    /// a pointer read from disk does not address a data block. This indicates a corrupted image
    #[error("block pointer {block} is outside the data region of a {nblocks}-block volume")]
    BlockOutOfBounds { block: u32, nblocks: usize },
    #[error("block device error: {0}")]
    Io(#[from] io::Error),
    #[error("malformed on-disk structure: {0}")]
    Codec(#[from] bincode::Error),
}

pub type Result<T> = std::result::Result<T, FsError>;
