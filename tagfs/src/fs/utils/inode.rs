// SPDX-License-Identifier: MPL-2.0

use super::DeviceId;
use crate::prelude::*;

#[repr(u16)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum InodeType {
    NamedPipe = 0o010000,
    CharDevice = 0o020000,
    Dir = 0o040000,
    BlockDevice = 0o060000,
    File = 0o100000,
    SymLink = 0o120000,
    Socket = 0o140000,
}

impl InodeType {
    pub fn is_directory(&self) -> bool {
        *self == InodeType::Dir
    }
}

bitflags! {
    /// The permission bits of a node.
    pub struct InodeMode: u16 {
        /// set-user-ID
        const S_ISUID = 0o4000;
        /// set-group-ID
        const S_ISGID = 0o2000;
        /// sticky bit
        const S_ISVTX = 0o1000;
        /// read by owner
        const S_IRUSR = 0o0400;
        /// write by owner
        const S_IWUSR = 0o0200;
        /// execute/search by owner
        const S_IXUSR = 0o0100;
        /// read by group
        const S_IRGRP = 0o0040;
        /// write by group
        const S_IWGRP = 0o0020;
        /// execute/search by group
        const S_IXGRP = 0o0010;
        /// read by others
        const S_IROTH = 0o0004;
        /// write by others
        const S_IWOTH = 0o0002;
        /// execute/search by others
        const S_IXOTH = 0o0001;
    }
}

impl InodeMode {
    /// `S_IRWXUGO`: read, write and execute for everyone.
    pub const fn rwx_all() -> Self {
        Self::from_bits_truncate(0o777)
    }

    pub fn has_set_gid(&self) -> bool {
        self.contains(Self::S_ISGID)
    }
}

/// The kinds of special node `mknod` can create.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MknodType {
    CharDevice(DeviceId),
    BlockDevice(DeviceId),
    NamedPipe,
    Socket,
}

impl MknodType {
    pub fn inode_type(&self) -> InodeType {
        match self {
            MknodType::CharDevice(_) => InodeType::CharDevice,
            MknodType::BlockDevice(_) => InodeType::BlockDevice,
            MknodType::NamedPipe => InodeType::NamedPipe,
            MknodType::Socket => InodeType::Socket,
        }
    }

    pub fn device_id(&self) -> DeviceId {
        match self {
            MknodType::CharDevice(id) | MknodType::BlockDevice(id) => *id,
            MknodType::NamedPipe | MknodType::Socket => DeviceId::default(),
        }
    }
}

/// A snapshot of a node's attributes, the counterpart of `struct stat`.
#[derive(Debug, Clone, Copy)]
pub struct Metadata {
    /// The inode number, which uniquely identifies the node within the volume.
    pub ino: u64,
    /// Bytes of content for files, the target length for symlinks and the
    /// number of entries (including `.` and `..`) for directories.
    pub size: usize,
    pub blk_size: usize,
    pub blocks: usize,
    pub atime: Duration,
    pub mtime: Duration,
    pub ctime: Duration,
    pub type_: InodeType,
    pub mode: InodeMode,
    pub nlinks: usize,
    pub uid: Uid,
    pub gid: Gid,
    /// The device ID for device nodes, zero otherwise.
    pub rdev: u64,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn mknod_types() {
        let dev = DeviceId::new(4, 64);
        assert_eq!(MknodType::CharDevice(dev).inode_type(), InodeType::CharDevice);
        assert_eq!(MknodType::CharDevice(dev).device_id(), dev);
        assert_eq!(MknodType::BlockDevice(dev).inode_type(), InodeType::BlockDevice);
        assert_eq!(MknodType::NamedPipe.device_id(), DeviceId::default());
        assert_eq!(MknodType::Socket.inode_type(), InodeType::Socket);
        assert!(!MknodType::Socket.inode_type().is_directory());
    }
}
