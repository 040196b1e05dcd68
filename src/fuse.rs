//! FUSE front end: the root directory holds one regular file per valid inode,
//! named after its inumber. FUSE ino 1 is the root, so inumber `n` is ino `n + 1`.

use super::*;
use common::*;
use error::FsError;
use fs::FileSystem;
use layout::Inode;

use fuser::{
    FileAttr, FileType, Filesystem, MountOption, ReplyAttr, ReplyData, ReplyDirectory, ReplyEmpty,
    ReplyEntry, ReplyWrite, Request, TimeOrNow, FUSE_ROOT_ID,
};
use libc::{c_int, getgid, getuid};
use std::ffi::OsStr;
use std::io;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const TTL: Duration = Duration::from_secs(1);

impl From<&FsError> for c_int {
    fn from(err: &FsError) -> Self {
        match err {
            FsError::NotMounted => libc::ENODEV,
            FsError::InvalidInumber(_) => libc::ENOENT,
            FsError::InodeTableFull | FsError::NoSpace => libc::ENOSPC,
            FsError::FileTooLarge(_) => libc::EFBIG,
            FsError::InvalidOffset { .. } => libc::EINVAL,
            _ => libc::EIO,
        }
    }
}

pub struct SimpleFuse {
    fs: FileSystem,
    uid: u32,
    gid: u32,
}

impl SimpleFuse {
    /// `fs` should already be mounted.
    pub fn new(fs: FileSystem) -> Self {
        let uid = unsafe { getuid() };
        let gid = unsafe { getgid() };
        Self { fs, uid, gid }
    }

    /// Serves the volume at `mountpoint` until it is unmounted.
    pub fn mount(self, mountpoint: impl AsRef<Path>) -> io::Result<()> {
        let options = [
            MountOption::FSName("simplefs".to_string()),
            MountOption::RW,
            MountOption::DefaultPermissions,
        ];
        log::info!("serving FUSE at {}", mountpoint.as_ref().display());
        fuser::mount2(self, mountpoint, &options)
    }

    fn root_attr(&self) -> FileAttr {
        FileAttr {
            ino: FUSE_ROOT_ID,
            size: 0,
            blocks: 0,
            atime: UNIX_EPOCH,
            mtime: UNIX_EPOCH,
            ctime: UNIX_EPOCH,
            crtime: UNIX_EPOCH,
            kind: FileType::Directory,
            perm: 0o755,
            nlink: 2,
            uid: self.uid,
            gid: self.gid,
            rdev: 0,
            blksize: BLOCK_SIZE as u32,
            flags: 0,
        }
    }

    fn file_attr(&self, inumber: usize, inode: &Inode) -> FileAttr {
        FileAttr {
            ino: inumber as u64 + 1,
            size: inode.size as u64,
            blocks: (inode.size as usize).div_ceil(BLOCK_SIZE) as u64,
            atime: UNIX_EPOCH,
            mtime: UNIX_EPOCH,
            ctime: UNIX_EPOCH,
            crtime: UNIX_EPOCH,
            kind: FileType::RegularFile,
            perm: 0o644,
            nlink: 1,
            uid: self.uid,
            gid: self.gid,
            rdev: 0,
            blksize: BLOCK_SIZE as u32,
            flags: 0,
        }
    }

    fn lookup_attr(&self, inumber: usize) -> std::result::Result<FileAttr, c_int> {
        self.fs
            .load_inode(inumber)
            .map_err(|err| c_int::from(&err))
            .and_then(|inode| {
                if inode.valid {
                    Ok(self.file_attr(inumber, &inode))
                } else {
                    Err(libc::ENOENT)
                }
            })
    }

    /// Attributes after a setattr. Files cannot be truncated or extended this way,
    /// every other change is accepted and ignored.
    fn resized_attr(&self, ino: u64, size: Option<u64>) -> std::result::Result<FileAttr, c_int> {
        if ino == FUSE_ROOT_ID {
            return match size {
                Some(_) => Err(libc::EISDIR),
                None => Ok(self.root_attr()),
            };
        }
        let inumber = inumber_of(ino).ok_or(libc::ENOENT)?;
        let attr = self.lookup_attr(inumber)?;
        match size {
            Some(size) if size != attr.size => {
                log::warn!("setattr: inode {inumber} cannot change size to {size}");
                Err(libc::ENOTSUP)
            }
            _ => Ok(attr),
        }
    }
}

/// "7" -> 7; anything but the canonical decimal spelling is not a file here.
fn parse_name(name: &OsStr) -> Option<usize> {
    let name = name.to_str()?;
    let inumber: usize = name.parse().ok()?;
    (inumber.to_string() == name).then_some(inumber)
}

fn inumber_of(ino: u64) -> Option<usize> {
    (ino > FUSE_ROOT_ID).then(|| (ino - 1) as usize)
}

impl Filesystem for SimpleFuse {
    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        if parent != FUSE_ROOT_ID {
            reply.error(libc::ENOENT);
            return;
        }
        match parse_name(name).map(|inumber| self.lookup_attr(inumber)) {
            Some(Ok(attr)) => reply.entry(&TTL, &attr, 0),
            Some(Err(errno)) => reply.error(errno),
            None => reply.error(libc::ENOENT),
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyAttr) {
        if ino == FUSE_ROOT_ID {
            reply.attr(&TTL, &self.root_attr());
            return;
        }
        match inumber_of(ino).map(|inumber| self.lookup_attr(inumber)) {
            Some(Ok(attr)) => reply.attr(&TTL, &attr),
            Some(Err(errno)) => reply.error(errno),
            None => reply.error(libc::ENOENT),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let (Some(inumber), Ok(offset)) = (inumber_of(ino), usize::try_from(offset)) else {
            reply.error(libc::EINVAL);
            return;
        };
        let mut buf = vec![0; size as usize];
        match self.fs.read(inumber, &mut buf, offset) {
            Ok(n) => reply.data(&buf[..n]),
            Err(FsError::InvalidOffset { .. }) => reply.data(&[]),
            Err(err) => reply.error(c_int::from(&err)),
        }
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let (Some(inumber), Ok(offset)) = (inumber_of(ino), usize::try_from(offset)) else {
            reply.error(libc::EINVAL);
            return;
        };
        match self.fs.write(inumber, data, offset) {
            Ok(n) => reply.written(n as u32),
            Err(err) => reply.error(c_int::from(&err)),
        }
    }

    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
        _atime: Option<TimeOrNow>,
        _mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        match self.resized_attr(ino, size) {
            Ok(attr) => reply.attr(&TTL, &attr),
            Err(errno) => reply.error(errno),
        }
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let Some(inumber) = parse_name(name).filter(|_| parent == FUSE_ROOT_ID) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.fs.delete(inumber) {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(c_int::from(&err)),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        if ino != FUSE_ROOT_ID {
            reply.error(libc::ENOTDIR);
            return;
        }
        let Some(ninodes) = self.fs.super_block().map(|sb| sb.ninodes()) else {
            reply.error(libc::ENODEV);
            return;
        };

        let mut entries = vec![
            (FUSE_ROOT_ID, FileType::Directory, ".".to_string()),
            (FUSE_ROOT_ID, FileType::Directory, "..".to_string()),
        ];
        for inumber in 1..=ninodes {
            match self.fs.load_inode(inumber) {
                Ok(inode) if inode.valid => {
                    entries.push((inumber as u64 + 1, FileType::RegularFile, inumber.to_string()))
                }
                Ok(_) => {}
                Err(err) => {
                    reply.error(c_int::from(&err));
                    return;
                }
            }
        }

        for (i, (ino, kind, name)) in entries.into_iter().enumerate().skip(offset as usize) {
            // i + 1 means the index of the next entry
            if reply.add(ino, (i + 1) as i64, kind, name) {
                break;
            }
        }
        reply.ok();
    }
}
