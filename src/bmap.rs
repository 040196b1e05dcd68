//! Logical block index -> physical block id.
//!
//! Indices `0..POINTERS_PER_INODE` use the inode's direct pointers, the next
//! `POINTERS_PER_BLOCK` go through the single indirect block. 0 means a hole.

use super::*;
use common::*;
use error::{FsError, Result};
use fs::FileSystem;
use layout::Inode;

/// Slot of `index` inside the indirect block, if it is past the direct pointers.
fn indirect_slot(index: usize) -> Result<Option<usize>> {
    if index < POINTERS_PER_INODE {
        return Ok(None);
    }
    let offset = index - POINTERS_PER_INODE;
    if offset >= POINTERS_PER_BLOCK {
        return Err(FsError::FileTooLarge(index));
    }
    Ok(Some(offset))
}

impl FileSystem {
    /// Physical block of logical block `index`, or 0 for a hole.
    pub(crate) fn resolve(&self, inode: &Inode, index: usize) -> Result<usize> {
        let sb = self.sb()?;
        let bno = match indirect_slot(index)? {
            None => inode.direct[index],
            Some(_) if inode.indirect == 0 => 0,
            Some(offset) => self.read_pointers(sb.check_pointer(inode.indirect)?)?[offset],
        };
        if bno == 0 {
            return Ok(0);
        }
        sb.check_pointer(bno)
    }

    /// Like [`FileSystem::resolve`], but fills holes with freshly zeroed blocks.
    ///
    /// New direct and indirect pointers land in `inode`; the caller persists it.
    pub(crate) fn resolve_or_alloc(&mut self, inode: &mut Inode, index: usize) -> Result<usize> {
        let sb = self.sb()?;
        let Some(offset) = indirect_slot(index)? else {
            if inode.direct[index] == 0 {
                inode.direct[index] = self.balloc()?;
            }
            return sb.check_pointer(inode.direct[index]);
        };

        if inode.indirect == 0 {
            inode.indirect = self.balloc()?;
        }
        let indirect = sb.check_pointer(inode.indirect)?;
        let mut pointers = self.read_pointers(indirect)?;
        if pointers[offset] == 0 {
            pointers[offset] = self.balloc()?;
            if let Err(err) = self.write_pointers(indirect, &pointers) {
                self.bfree(pointers[offset])?;
                return Err(err);
            }
        }
        sb.check_pointer(pointers[offset])
    }
}
