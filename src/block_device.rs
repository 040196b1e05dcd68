use std::any::Any;
use std::io;

/// Fixed-size block storage. Ids are contiguous in `[0, num_blocks())`.
pub trait BlockDevice: Send + Sync + Any {
    fn read_block(&self, blockno: usize, buf: &mut [u8]) -> io::Result<()>;
    fn write_block(&self, blockno: usize, buf: &[u8]) -> io::Result<()>;
    fn num_blocks(&self) -> usize;
}
