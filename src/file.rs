//! Byte-range reads and writes on top of the block translator.

use super::*;
use common::*;
use error::{FsError, Result};
use fs::FileSystem;
use layout::Inode;

/// The part of logical block `pos / BLOCK_SIZE` covered by `[pos, pos + remaining)`:
/// (block index, offset inside the block, byte count)
fn span(pos: usize, remaining: usize) -> (usize, usize, usize) {
    let start = pos % BLOCK_SIZE;
    (pos / BLOCK_SIZE, start, (BLOCK_SIZE - start).min(remaining))
}

impl FileSystem {
    /// Reads up to `buf.len()` bytes starting at `offset` and returns how many were read.
    ///
    /// Holes read as zeroes. Reading at the end of file returns 0.
    pub fn read(&self, inumber: usize, buf: &mut [u8], offset: usize) -> Result<usize> {
        let inode = self.load_valid_inode(inumber)?;
        let size = inode.size as usize;
        if offset > size {
            return Err(FsError::InvalidOffset { offset, size });
        }

        let len = buf.len().min(size - offset);
        let mut done = 0;
        while done < len {
            let (index, start, n) = span(offset + done, len - done);
            let dst = &mut buf[done..done + n];
            match self.resolve(&inode, index)? {
                0 => dst.fill(0),
                bno => dst.copy_from_slice(&self.read_block(bno)?[start..start + n]),
            }
            done += n;
        }
        Ok(len)
    }

    /// Writes `data` at `offset`, growing the file as needed, and returns how many bytes were written.
    ///
    /// Running out of blocks or hitting the maximum file size stops the write after the
    /// last complete chunk; the bytes written until then are kept and counted. The error
    /// is only returned when nothing could be written.
    pub fn write(&mut self, inumber: usize, data: &[u8], offset: usize) -> Result<usize> {
        let mut inode = self.load_valid_inode(inumber)?;
        if data.is_empty() {
            return Ok(0);
        }
        if offset >= MAX_FILE_SIZE {
            return Err(FsError::FileTooLarge(offset / BLOCK_SIZE));
        }

        let mut written = 0;
        let mut failure = None;
        while written < data.len() {
            let (index, start, n) = span(offset + written, data.len() - written);
            if let Err(err) = self.write_chunk(&mut inode, index, start, &data[written..written + n])
            {
                failure = Some(err);
                break;
            }
            written += n;
        }

        if written > 0 {
            inode.size = inode.size.max((offset + written) as u32);
        }
        // pointers may have been allocated even when no byte made it
        self.save_inode(inumber, &inode)?;

        match failure {
            None => Ok(written),
            Some(err @ (FsError::NoSpace | FsError::FileTooLarge(_))) if written > 0 => {
                log::warn!(
                    "write: inode {inumber} stopped after {written} of {} bytes, {err}",
                    data.len()
                );
                Ok(written)
            }
            Some(err) => Err(err),
        }
    }

    fn write_chunk(&mut self, inode: &mut Inode, index: usize, start: usize, chunk: &[u8]) -> Result<()> {
        let bno = self.resolve_or_alloc(inode, index)?;
        let mut block = if chunk.len() == BLOCK_SIZE {
            [0; BLOCK_SIZE]
        } else {
            self.read_block(bno)?
        };
        block[start..start + chunk.len()].copy_from_slice(chunk);
        self.write_block(bno, &block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use disk::MemDisk;

    use std::sync::Arc;

    fn mounted_fs(nblocks: usize) -> FileSystem {
        let mut fs = FileSystem::new(Arc::new(MemDisk::new(nblocks)));
        fs.format().unwrap();
        fs.mount().unwrap();
        fs
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn span_splits_on_block_boundaries() {
        assert_eq!(span(0, 5000), (0, 0, BLOCK_SIZE));
        assert_eq!(span(1000, 100), (0, 1000, 24));
        assert_eq!(span(1024, 10), (1, 0, 10));
        assert_eq!(span(2047, 1), (1, 1023, 1));
    }

    #[test]
    fn unaligned_round_trip() {
        let mut fs = mounted_fs(40);
        let inumber = fs.create().unwrap();
        let data = pattern(3000);
        assert_eq!(fs.write(inumber, &data, 0).unwrap(), 3000);

        let patch = [0xAAu8; 700];
        assert_eq!(fs.write(inumber, &patch, 900).unwrap(), 700);
        assert_eq!(fs.getsize(inumber).unwrap(), 3000);

        let mut expected = data.clone();
        expected[900..1600].copy_from_slice(&patch);
        let mut buf = vec![0u8; 3000];
        assert_eq!(fs.read(inumber, &mut buf, 0).unwrap(), 3000);
        assert_eq!(buf, expected);

        let mut mid = vec![0u8; 1500];
        assert_eq!(fs.read(inumber, &mut mid, 1000).unwrap(), 1500);
        assert_eq!(mid, expected[1000..2500]);
    }

    #[test]
    fn read_at_and_past_end() {
        let mut fs = mounted_fs(20);
        let inumber = fs.create().unwrap();
        fs.write(inumber, b"hello", 0).unwrap();

        let mut buf = [0u8; 16];
        assert_eq!(fs.read(inumber, &mut buf, 5).unwrap(), 0);
        assert!(matches!(
            fs.read(inumber, &mut buf, 6),
            Err(FsError::InvalidOffset { offset: 6, size: 5 })
        ));
        assert_eq!(fs.read(inumber, &mut buf, 2).unwrap(), 3);
        assert_eq!(&buf[..3], b"llo");
    }

    #[test]
    fn write_past_end_leaves_a_hole() {
        let mut fs = mounted_fs(20);
        let inumber = fs.create().unwrap();
        assert_eq!(fs.write(inumber, b"tail", 3 * BLOCK_SIZE + 10).unwrap(), 4);
        assert_eq!(fs.getsize(inumber).unwrap(), 3 * BLOCK_SIZE + 14);

        let inode = fs.load_inode(inumber).unwrap();
        assert_eq!(inode.direct[..3], [0, 0, 0]);
        assert_ne!(inode.direct[3], 0);

        let mut buf = vec![0xFFu8; 3 * BLOCK_SIZE + 14];
        assert_eq!(fs.read(inumber, &mut buf, 0).unwrap(), buf.len());
        assert!(buf[..3 * BLOCK_SIZE + 10].iter().all(|&b| b == 0));
        assert_eq!(&buf[3 * BLOCK_SIZE + 10..], b"tail");
    }

    #[test]
    fn reused_block_does_not_leak_old_bytes() {
        let mut fs = mounted_fs(20);
        let first = fs.create().unwrap();
        fs.write(first, &[0x55u8; BLOCK_SIZE], 0).unwrap();
        fs.delete(first).unwrap();

        let second = fs.create().unwrap();
        fs.write(second, b"x", 100).unwrap();
        let mut buf = [0xFFu8; 101];
        fs.read(second, &mut buf, 0).unwrap();
        assert!(buf[..100].iter().all(|&b| b == 0));
        assert_eq!(buf[100], b'x');
    }

    #[test]
    fn write_stops_when_volume_is_full() {
        // data region: blocks 2..5, three blocks
        let mut fs = mounted_fs(5);
        let inumber = fs.create().unwrap();
        let data = pattern(4 * BLOCK_SIZE);
        assert_eq!(fs.write(inumber, &data, 0).unwrap(), 3 * BLOCK_SIZE);
        assert_eq!(fs.getsize(inumber).unwrap(), 3 * BLOCK_SIZE);

        assert!(matches!(
            fs.write(inumber, b"more", 3 * BLOCK_SIZE),
            Err(FsError::NoSpace)
        ));

        let mut buf = vec![0u8; 3 * BLOCK_SIZE];
        fs.read(inumber, &mut buf, 0).unwrap();
        assert_eq!(buf, data[..3 * BLOCK_SIZE]);
    }

    #[test]
    fn write_stops_at_max_file_size() {
        let mut fs = mounted_fs(300);
        let inumber = fs.create().unwrap();
        let start = MAX_FILE_SIZE - 100;
        let data = pattern(300);
        assert_eq!(fs.write(inumber, &data, start).unwrap(), 100);
        assert_eq!(fs.getsize(inumber).unwrap(), MAX_FILE_SIZE);

        assert!(matches!(
            fs.write(inumber, b"x", MAX_FILE_SIZE),
            Err(FsError::FileTooLarge(_))
        ));

        let mut buf = [0u8; 100];
        assert_eq!(fs.read(inumber, &mut buf, start).unwrap(), 100);
        assert_eq!(buf[..], data[..100]);
    }

    #[test]
    fn io_needs_valid_inode() {
        let mut fs = mounted_fs(20);
        let mut buf = [0u8; 4];
        assert!(matches!(fs.read(1, &mut buf, 0), Err(FsError::InvalidInumber(1))));
        assert!(matches!(fs.write(1, b"abc", 0), Err(FsError::InvalidInumber(1))));
        assert!(matches!(fs.write(99, b"abc", 0), Err(FsError::InvalidInumber(99))));
    }

    #[test]
    fn write_refuses_metadata_pointers() {
        let mut fs = mounted_fs(20);
        let inumber = fs.create().unwrap();
        let inode = Inode {
            valid: true,
            size: 0,
            direct: [1, 0, 0, 0, 0],
            indirect: 2,
        };
        fs.save_inode(inumber, &inode).unwrap();
        let first = fs.read_block(1).unwrap();
        let second = fs.read_block(2).unwrap();

        assert!(matches!(
            fs.write(inumber, b"xx", 0),
            Err(FsError::BlockOutOfBounds { block: 1, .. })
        ));
        assert!(matches!(
            fs.write(inumber, b"xx", POINTERS_PER_INODE * BLOCK_SIZE),
            Err(FsError::BlockOutOfBounds { block: 2, .. })
        ));

        assert_eq!(fs.read_block(1).unwrap(), first);
        assert_eq!(fs.read_block(2).unwrap(), second);
        assert_eq!(fs.load_inode(inumber).unwrap(), inode);
        assert_eq!(fs.bitmap().unwrap().used_count(), 2);
    }
}
