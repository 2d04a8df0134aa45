// SPDX-License-Identifier: MPL-2.0

use crate::prelude::*;

/// The figures a volume reports to `statfs`.
#[derive(Debug, Clone)]
pub struct SuperBlock {
    pub magic: u64,
    pub bsize: usize,
    pub blocks: usize,
    pub bfree: usize,
    pub bavail: usize,
    pub files: usize,
    pub ffree: usize,
    pub fsid: u64,
    pub namelen: usize,
    pub frsize: usize,
    pub flags: u64,
}

impl SuperBlock {
    pub fn new(magic: u64, block_size: usize, name_max_len: usize) -> Self {
        Self {
            magic,
            bsize: block_size,
            blocks: 0,
            bfree: 0,
            bavail: 0,
            files: 0,
            ffree: 0,
            fsid: 0,
            namelen: name_max_len,
            frsize: block_size,
            flags: 0,
        }
    }
}

pub trait FileSystem: Any + Sync + Send {
    /// Gets the name of this FS type such as `"tagfs"`.
    fn name(&self) -> &'static str;

    /// Syncs the file system.
    fn sync(&self) -> Result<()>;

    /// Returns the super block of this file system.
    fn sb(&self) -> SuperBlock;

    /// Tears the file system down.
    ///
    /// Every node is released, attached resources are given back and the
    /// mount configuration is dropped. Calling it twice is an error.
    fn unmount(&self) -> Result<()>;

    /// Returns the mount options that differ from their defaults, each
    /// prefixed with a comma, as `/proc/mounts` shows them.
    fn show_options(&self) -> String;

    fn as_any(&self) -> &dyn Any;
}
