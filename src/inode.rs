//! Inode table: inodes are addressed by a 1-based inumber,
//! `INODES_PER_BLOCK` of them packed into each inode block.

use super::*;
use error::{FsError, Result};
use fs::FileSystem;
use layout::{decode_inodes, encode_inodes, Inode, SuperBlock};

fn check_inumber(sb: &SuperBlock, inumber: usize) -> Result<()> {
    if inumber == 0 || inumber > sb.ninodes() {
        return Err(FsError::InvalidInumber(inumber));
    }
    Ok(())
}

impl FileSystem {
    pub fn load_inode(&self, inumber: usize) -> Result<Inode> {
        let sb = self.sb()?;
        check_inumber(&sb, inumber)?;
        let (iblock, slot) = sb.iblock(inumber);
        Ok(decode_inodes(&self.read_block(iblock)?)?[slot])
    }

    /// Read-modify-write of the containing block, so the other inodes in it are kept.
    pub fn save_inode(&self, inumber: usize, inode: &Inode) -> Result<()> {
        let sb = self.sb()?;
        check_inumber(&sb, inumber)?;
        let (iblock, slot) = sb.iblock(inumber);
        let mut inodes = decode_inodes(&self.read_block(iblock)?)?;
        inodes[slot] = *inode;
        self.write_block(iblock, &encode_inodes(&inodes)?)
    }

    /// Loads `inumber` and requires it to be in use.
    pub(crate) fn load_valid_inode(&self, inumber: usize) -> Result<Inode> {
        let inode = self.load_inode(inumber)?;
        if !inode.valid {
            return Err(FsError::InvalidInumber(inumber));
        }
        Ok(inode)
    }

    /// Claims the lowest free inode and returns its inumber.
    ///
    /// The inode block is written back unchanged if the rescan fails.
    pub fn create(&mut self) -> Result<usize> {
        let sb = self.sb()?;
        for iblock in 1..=sb.ninodeblocks() {
            let original = self.read_block(iblock)?;
            let mut inodes = decode_inodes(&original)?;
            let Some(slot) = inodes.iter().position(|inode| !inode.valid) else {
                continue;
            };

            inodes[slot] = Inode::empty();
            self.write_block(iblock, &encode_inodes(&inodes)?)?;
            if let Err(err) = self.rebuild_bitmap() {
                self.write_block(iblock, &original)?;
                return Err(err);
            }

            let inumber = (iblock - 1) * INODES_PER_BLOCK + slot + 1;
            log::debug!("create: inode {inumber}");
            return Ok(inumber);
        }
        Err(FsError::InodeTableFull)
    }

    /// Releases every block the inode reaches, then invalidates it.
    ///
    /// If the rescan afterwards fails, the inode block and the free block map
    /// are put back and the inode stays valid.
    pub fn delete(&mut self, inumber: usize) -> Result<()> {
        let sb = self.sb()?;
        let inode = self.load_valid_inode(inumber)?;
        let (iblock, _) = sb.iblock(inumber);
        let original = self.read_block(iblock)?;
        let bitmap = self.bitmap().cloned().ok_or(FsError::NotMounted)?;

        if let Err(err) = self.release(&sb, inumber, &inode) {
            self.write_block(iblock, &original)?;
            self.set_bitmap(bitmap)?;
            return Err(err);
        }

        log::debug!("delete: inode {inumber}");
        Ok(())
    }

    fn release(&mut self, sb: &SuperBlock, inumber: usize, inode: &Inode) -> Result<()> {
        for &bno in inode.direct.iter().filter(|&&bno| bno != 0) {
            self.bfree(bno)?;
        }
        if inode.indirect != 0 {
            match sb.check_pointer(inode.indirect) {
                Ok(indirect) => {
                    for &bno in self.read_pointers(indirect)?.iter().filter(|&&bno| bno != 0) {
                        self.bfree(bno)?;
                    }
                    self.bfree(inode.indirect)?;
                }
                Err(err) => log::warn!("delete: inode {inumber} has a bad indirect block, {err}"),
            }
        }

        self.save_inode(inumber, &Inode::default())?;
        self.rebuild_bitmap()
    }

    pub fn getsize(&self, inumber: usize) -> Result<usize> {
        Ok(self.load_valid_inode(inumber)?.size as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::*;
    use disk::MemDisk;

    use std::sync::Arc;

    fn mounted_fs(nblocks: usize) -> FileSystem {
        let mut fs = FileSystem::new(Arc::new(MemDisk::new(nblocks)));
        fs.format().unwrap();
        fs.mount().unwrap();
        fs
    }

    fn point_outside(fs: &FileSystem, inumber: usize) {
        let mut inode = fs.load_inode(inumber).unwrap();
        inode.direct[0] = 500;
        fs.save_inode(inumber, &inode).unwrap();
    }

    #[test]
    fn inumber_bounds() {
        let fs = mounted_fs(20);
        assert!(matches!(fs.load_inode(0), Err(FsError::InvalidInumber(0))));
        assert!(matches!(fs.load_inode(65), Err(FsError::InvalidInumber(65))));
        assert!(!fs.load_inode(64).unwrap().valid);
        assert!(matches!(
            fs.save_inode(65, &Inode::empty()),
            Err(FsError::InvalidInumber(65))
        ));
    }

    #[test]
    fn save_keeps_sibling_inodes() {
        let fs = mounted_fs(20);
        let a = Inode {
            valid: true,
            size: 10,
            direct: [3, 0, 0, 0, 0],
            indirect: 0,
        };
        let b = Inode {
            valid: true,
            size: 20,
            direct: [4, 5, 0, 0, 0],
            indirect: 0,
        };
        fs.save_inode(1, &a).unwrap();
        fs.save_inode(2, &b).unwrap();
        fs.save_inode(33, &b).unwrap();

        assert_eq!(fs.load_inode(1).unwrap(), a);
        assert_eq!(fs.load_inode(2).unwrap(), b);
        assert_eq!(fs.load_inode(33).unwrap(), b);
        assert!(!fs.load_inode(3).unwrap().valid);
    }

    #[test]
    fn create_marks_inode_block_used() {
        let mut fs = mounted_fs(20);
        assert!(!fs.bitmap().unwrap().is_used(1));
        assert_eq!(fs.create().unwrap(), 1);
        assert!(fs.bitmap().unwrap().is_used(1));
        assert!(!fs.bitmap().unwrap().is_used(2));
        assert_eq!(fs.getsize(1).unwrap(), 0);
    }

    #[test]
    fn inode_table_fills_up() {
        let mut fs = mounted_fs(10);
        let ninodes = fs.super_block().unwrap().ninodes();
        assert_eq!(ninodes, INODES_PER_BLOCK);
        for expected in 1..=ninodes {
            assert_eq!(fs.create().unwrap(), expected);
        }
        assert!(matches!(fs.create(), Err(FsError::InodeTableFull)));

        fs.delete(17).unwrap();
        assert_eq!(fs.create().unwrap(), 17);
    }

    #[test]
    fn delete_requires_valid_inode() {
        let mut fs = mounted_fs(20);
        assert!(matches!(fs.delete(1), Err(FsError::InvalidInumber(1))));
        assert!(matches!(fs.getsize(1), Err(FsError::InvalidInumber(1))));
        let inumber = fs.create().unwrap();
        fs.delete(inumber).unwrap();
        assert!(matches!(fs.delete(inumber), Err(FsError::InvalidInumber(_))));
    }

    #[test]
    fn operations_need_a_mounted_volume() {
        let mut fs = FileSystem::new(Arc::new(MemDisk::new(20)));
        fs.format().unwrap();
        assert!(matches!(fs.create(), Err(FsError::NotMounted)));
        assert!(matches!(fs.delete(1), Err(FsError::NotMounted)));
        assert!(matches!(fs.getsize(1), Err(FsError::NotMounted)));
        assert!(matches!(fs.load_inode(1), Err(FsError::NotMounted)));
    }

    #[test]
    fn failed_create_leaves_table_unchanged() {
        let mut fs = mounted_fs(20);
        let broken = fs.create().unwrap();
        point_outside(&fs, broken);
        let bitmap = fs.bitmap().unwrap().clone();

        for _ in 0..3 {
            assert!(matches!(
                fs.create(),
                Err(FsError::BlockOutOfBounds { block: 500, .. })
            ));
        }
        assert!((2..=64).all(|inumber| !fs.load_inode(inumber).unwrap().valid));
        assert_eq!(fs.bitmap().unwrap(), &bitmap);

        // the broken inode can still be deleted, which unblocks create
        fs.delete(broken).unwrap();
        assert_eq!(fs.create().unwrap(), 1);
        assert_eq!(fs.create().unwrap(), 2);
    }

    #[test]
    fn failed_delete_keeps_the_inode() {
        let mut fs = mounted_fs(20);
        let keep = fs.create().unwrap();
        fs.write(keep, b"data", 0).unwrap();
        let broken = fs.create().unwrap();
        point_outside(&fs, broken);

        let inode = fs.load_inode(keep).unwrap();
        let bitmap = fs.bitmap().unwrap().clone();
        assert!(bitmap.is_used(3));

        assert!(matches!(
            fs.delete(keep),
            Err(FsError::BlockOutOfBounds { block: 500, .. })
        ));
        assert_eq!(fs.load_inode(keep).unwrap(), inode);
        assert_eq!(fs.bitmap().unwrap(), &bitmap);
        assert_eq!(fs.getsize(keep).unwrap(), 4);
    }

    #[test]
    fn delete_skips_a_bad_indirect_block() {
        let mut fs = mounted_fs(20);
        let inumber = fs.create().unwrap();
        fs.write(inumber, b"x", 0).unwrap();
        let mut inode = fs.load_inode(inumber).unwrap();
        assert_eq!(inode.direct[0], 3);
        inode.indirect = 900;
        fs.save_inode(inumber, &inode).unwrap();

        fs.delete(inumber).unwrap();
        assert!(!fs.load_inode(inumber).unwrap().valid);
        assert!(!fs.bitmap().unwrap().is_used(3));
        assert_eq!(fs.bitmap().unwrap().used_count(), 1);
    }
}
