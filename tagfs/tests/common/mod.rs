// SPDX-License-Identifier: MPL-2.0

//! Test doubles and helpers shared by the integration tests.

#![allow(dead_code)]

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use tagfs::{
    fs::{
        tagfs::{Backing, MountConfig, NodeHandle, TagFs},
        utils::{Clock, LinkHandle, LinkStore},
    },
    Credentials, Errno, InodeMode, Result,
};

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct FixedClock {
    secs: AtomicU64,
}

impl FixedClock {
    pub fn new(secs: u64) -> Arc<Self> {
        Arc::new(Self {
            secs: AtomicU64::new(secs),
        })
    }

    pub fn advance(&self, secs: u64) {
        self.secs.fetch_add(secs, Ordering::Relaxed);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> Duration {
        Duration::from_secs(self.secs.load(Ordering::Relaxed))
    }
}

/// A link store whose every `store` fails.
#[derive(Debug, Default)]
pub struct FailingLinkStore;

impl LinkStore for FailingLinkStore {
    fn store(&self, _target: &str) -> Result<LinkHandle> {
        Err(tagfs::Error::with_message(Errno::EIO, "link store is broken"))
    }

    fn load(&self, _handle: LinkHandle) -> Result<String> {
        Err(tagfs::Error::new(Errno::EIO))
    }

    fn release(&self, _handle: LinkHandle) {
        unreachable!("nothing was ever stored");
    }
}

pub fn mode(bits: u16) -> InodeMode {
    InodeMode::from_bits_truncate(bits)
}

pub fn root_ctx() -> Credentials {
    Credentials::root()
}

/// Mounts a volume with `args` on top of `backing`.
pub fn mount_with(args: &str, backing: Backing) -> (Arc<TagFs>, NodeHandle) {
    let config = MountConfig::parse(args).unwrap();
    let fs = TagFs::mount(config, backing, &root_ctx()).unwrap();
    let root = fs.root().unwrap();
    (fs, root)
}

pub fn mount(args: &str) -> (Arc<TagFs>, NodeHandle) {
    mount_with(args, Backing::new(FixedClock::new(0)))
}

/// Lists the names in `dir`, `.` and `..` excluded.
pub fn names(fs: &TagFs, dir: &NodeHandle) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    fs.readdir_at(dir, 0, &mut names).unwrap();
    names.split_off(2)
}

pub fn errno<T>(result: Result<T>) -> Errno {
    match result {
        Ok(_) => panic!("the operation should have failed"),
        Err(e) => e.error(),
    }
}
