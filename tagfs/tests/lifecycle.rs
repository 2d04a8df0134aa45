// SPDX-License-Identifier: MPL-2.0

//! Registration, mounting and unmounting of volumes.

mod common;

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use common::{errno, mode, root_ctx, FixedClock};
use tagfs::{
    fs::{
        registry::FsRegistry,
        tagfs::{self as tag, TagFs, TAGFS_MAGIC},
        utils::{AttachedResource, FileSystem},
    },
    Errno,
};

#[derive(Debug, Default)]
struct Disk {
    released: AtomicBool,
}

impl AttachedResource for Disk {
    fn name(&self) -> &str {
        "ram0"
    }

    fn release(&self) {
        assert!(!self.released.swap(true, Ordering::Relaxed));
    }
}

fn registry() -> FsRegistry {
    let registry = FsRegistry::new();
    tag::init(&registry, FixedClock::new(0)).unwrap();
    registry
}

#[test]
fn init_and_exit() {
    let registry = registry();
    assert_eq!(
        errno(tag::init(&registry, FixedClock::new(0))),
        Errno::EEXIST
    );
    assert_eq!(
        registry.with_iter(|iter| iter.map(|(name, _)| name.clone()).collect::<Vec<_>>()),
        vec!["tagfs"]
    );

    tag::exit(&registry).unwrap();
    assert!(registry.look_up("tagfs").is_none());
    assert_eq!(errno(tag::exit(&registry)), Errno::ENOENT);
}

#[test]
fn mode_option_scenario() {
    let registry = registry();
    let ctx = root_ctx();
    let fs = registry.mount("tagfs", Some("mode=0750"), None, &ctx).unwrap();
    assert_eq!(fs.name(), "tagfs");
    assert_eq!(fs.sb().magic, TAGFS_MAGIC);
    assert_eq!(fs.show_options(), ",mode=750");

    let tagfs = fs.as_any().downcast_ref::<TagFs>().unwrap();
    let root = tagfs.root().unwrap();
    assert_eq!(root.metadata().mode.bits(), 0o750);
    let dir = tagfs.mkdir(&root, "d", mode(0o750), &ctx).unwrap();
    assert_eq!(dir.metadata().mode.bits(), 0o750);
    assert_eq!(fs.sb().files, 2);

    drop((root, dir));
    fs.unmount().unwrap();
    assert_eq!(fs.sb().files, 0);
    assert_eq!(errno(fs.unmount()), Errno::EINVAL);
}

#[test]
fn default_mode_is_not_shown() {
    let registry = registry();
    let fs = registry
        .mount("tagfs", Some("mode=755,size=1g,source=none"), None, &root_ctx())
        .unwrap();
    assert_eq!(fs.show_options(), "");

    let tagfs = fs.as_any().downcast_ref::<TagFs>().unwrap();
    assert_eq!(tagfs.config().unwrap().source().as_deref(), Some("none"));
    fs.unmount().unwrap();
}

#[test]
fn bad_mode_fails_the_mount() {
    let registry = registry();
    let result = registry.mount("tagfs", Some("mode=9"), None, &root_ctx());
    assert_eq!(errno(result), Errno::EINVAL);
}

#[test]
fn disk_is_released_on_unmount() {
    let registry = registry();
    let disk = Arc::new(Disk::default());
    let fs = registry
        .mount("tagfs", None, Some(disk.clone()), &root_ctx())
        .unwrap();
    assert!(!disk.released.load(Ordering::Relaxed));

    fs.unmount().unwrap();
    assert!(disk.released.load(Ordering::Relaxed));
    // A second unmount must not release it again.
    assert_eq!(errno(fs.unmount()), Errno::EINVAL);
}

#[test]
fn deep_tree_is_torn_down() {
    let registry = registry();
    let ctx = root_ctx();
    let fs = registry.mount("tagfs", None, None, &ctx).unwrap();
    let tagfs = fs.as_any().downcast_ref::<TagFs>().unwrap();

    let mut dir = tagfs.root().unwrap();
    for depth in 0..500 {
        tagfs.create(&dir, "f", mode(0o644), &ctx).unwrap();
        dir = tagfs.mkdir(&dir, &format!("d{depth}"), mode(0o755), &ctx).unwrap();
    }
    assert_eq!(tagfs.live_nodes(), 1001);
    drop(dir);

    fs.unmount().unwrap();
    assert_eq!(tagfs.live_nodes(), 0);
}
