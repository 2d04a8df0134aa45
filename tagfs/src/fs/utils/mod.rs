// SPDX-License-Identifier: MPL-2.0

//! VFS components shared by file systems and the collaborators they rely on.

pub use clock::Clock;
#[cfg(feature = "std")]
pub use clock::SystemClock;
pub use content::{ContentHandle, LinkHandle, LinkStore, MemLinkStore, MemPageStore, PageStore};
pub use device::{AttachedResource, DeviceId};
pub use dirent_visitor::DirentVisitor;
pub use fs::{FileSystem, SuperBlock};
pub use inode::{InodeMode, InodeType, Metadata, MknodType};

mod clock;
mod content;
mod device;
mod dirent_visitor;
mod fs;
mod inode;
