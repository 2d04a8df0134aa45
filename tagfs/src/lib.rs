// SPDX-License-Identifier: MPL-2.0

//! TagFS: a volatile file system whose data and metadata exist only in memory.
//!
//! The crate is the node-lifecycle and tree-mutation engine of the file
//! system. Byte storage for regular files, symlink targets and timestamps are
//! obtained from collaborators (see [`fs::utils`]) that the host may replace.
//!
//! ```
//! use tagfs::{fs::registry::FsRegistry, fs::tagfs::TagFs, fs::utils::FileSystem, Credentials, InodeMode};
//!
//! let registry = FsRegistry::new();
//! tagfs::fs::tagfs::init(&registry, tagfs::fs::utils::SystemClock::new_arc()).unwrap();
//!
//! let ctx = Credentials::root();
//! let fs = registry.mount("tagfs", Some("mode=0750"), None, &ctx).unwrap();
//! let fs = fs.as_any().downcast_ref::<TagFs>().unwrap();
//!
//! let root = fs.root().unwrap();
//! let dir = fs.mkdir(&root, "d", InodeMode::from_bits_truncate(0o750), &ctx).unwrap();
//! assert_eq!(dir.metadata().mode.bits(), 0o750);
//! assert_eq!(fs.show_options(), ",mode=750");
//!
//! drop((root, dir));
//! fs.unmount().unwrap();
//! ```

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(unsafe_code)]

extern crate alloc;

pub mod cred;
pub mod error;
pub mod fs;
mod prelude;

pub use cred::{Credentials, Gid, Uid};
pub use error::{Errno, Error, Result};
pub use fs::utils::{InodeMode, InodeType, Metadata};
