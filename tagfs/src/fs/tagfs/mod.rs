// SPDX-License-Identifier: MPL-2.0

//! TagFS, a ramfs-like file system.
//!
//! Nodes live in an arena owned by the volume. Each node carries a keepalive
//! count of the directory entries and open [`NodeHandle`]s that refer to it,
//! and is released the moment that count drops to zero.

pub use fs::{TagFs, TagFsType};
pub use node::{Backing, NodeHandle, NodeId};
pub use options::MountConfig;

use crate::{
    fs::{registry::FsRegistry, utils::Clock},
    prelude::*,
};

mod dir;
mod fs;
mod node;
mod options;
mod tree;

pub const TAGFS_MAGIC: u64 = 0x8584_58f6;
pub const BLOCK_SIZE: usize = 4096;
pub const ROOT_INO: u64 = 1;
pub const NAME_MAX: usize = 255;
/// The permission bits of the root when the `mode` option is absent.
pub const TAGFS_DEFAULT_MODE: u16 = 0o755;

/// Registers the `tagfs` type, whose volumes take timestamps from `clock`.
pub fn init(registry: &FsRegistry, clock: Arc<dyn Clock>) -> Result<()> {
    registry.register(Arc::new(TagFsType::new(clock)))
}

/// Unregisters the `tagfs` type. Mounted volumes are not affected.
pub fn exit(registry: &FsRegistry) -> Result<()> {
    registry.unregister(TagFsType::NAME).map(|_| ())
}
