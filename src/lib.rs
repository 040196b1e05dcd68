mod bitmap; // free block map, derived from the inode table
mod block_device;
mod bmap; // logical -> physical block translation
mod common;
mod disk;
mod error;
mod file; // byte-range read / write
mod fs; // file system
mod fuse;
mod inode; // inode table
mod layout; // on-disk structures


pub use bitmap::BitMap;
pub use block_device::BlockDevice;
pub use common::*;
pub use disk::{DiskImage, MemDisk};
pub use error::{FsError, Result};
pub use fs::FileSystem;
pub use fuse::SimpleFuse;
pub use layout::{Inode, SuperBlock};
