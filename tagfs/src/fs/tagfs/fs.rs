// SPDX-License-Identifier: MPL-2.0

use super::{
    node::{Backing, NodeHandle, NodeStore, TagInode},
    options::MountConfig,
    BLOCK_SIZE, NAME_MAX, TAGFS_MAGIC,
};
use crate::{
    fs::{
        registry::{FsProperties, FsType},
        utils::{AttachedResource, Clock, FileSystem, SuperBlock},
    },
    prelude::*,
};

/// A volatile file system whose data and metadata exists only in memory.
pub struct TagFs {
    /// The arena of nodes
    pub(super) store: Arc<NodeStore>,
    /// The root, or `None` once unmounted
    root: Mutex<Option<NodeHandle>>,
    config: Mutex<Option<Arc<MountConfig>>>,
    /// Attached resources in the order of acquisition
    resources: Mutex<Vec<Arc<dyn AttachedResource>>>,
    /// Serializes renames across directories
    pub(super) rename_lock: Mutex<()>,
}

impl TagFs {
    /// Mounts a new volume whose root directory takes the mode of `config`.
    pub fn mount(config: MountConfig, backing: Backing, ctx: &Credentials) -> Result<Arc<Self>> {
        let store = Arc::new(NodeStore::new(backing));
        let root = store.alloc_root(config.mode(), ctx).map_err(|e| {
            warn!("[tagfs] cannot allocate the root: {}", e);
            Error::with_message(Errno::ENOMEM, "cannot allocate the root")
        })?;
        info!(
            "[tagfs] mount: root mode = {:o}, options = \"{}\"",
            config.mode().bits(),
            config.render()
        );

        Ok(Arc::new(Self {
            store,
            root: Mutex::new(Some(root)),
            config: Mutex::new(Some(Arc::new(config))),
            resources: Mutex::new(Vec::new()),
            rename_lock: Mutex::new(()),
        }))
    }

    /// Returns a handle to the root directory.
    pub fn root(&self) -> Result<NodeHandle> {
        self.root
            .lock()
            .clone()
            .ok_or(Error::with_message(Errno::EINVAL, "the volume is unmounted"))
    }

    /// Returns the mount options.
    pub fn config(&self) -> Result<Arc<MountConfig>> {
        self.config
            .lock()
            .clone()
            .ok_or(Error::with_message(Errno::EINVAL, "the volume is unmounted"))
    }

    /// Records a resource to be released when the volume is unmounted.
    pub fn attach(&self, resource: Arc<dyn AttachedResource>) -> Result<()> {
        self.check_mounted()?;
        debug!("[tagfs] attach resource: {}", resource.name());
        self.resources.lock().push(resource);
        Ok(())
    }

    /// Returns the number of nodes that have not been released.
    pub fn live_nodes(&self) -> usize {
        self.store.live_nodes()
    }

    pub(super) fn check_mounted(&self) -> Result<()> {
        if self.root.lock().is_none() {
            return_errno_with_message!(Errno::EINVAL, "the volume is unmounted");
        }
        Ok(())
    }

    /// Detaches every node below `root`, depth first.
    ///
    /// Each directory is emptied and marked dead before its children are
    /// visited. The detached nodes are returned in visiting order, each still
    /// holding the reference its entry had.
    fn detach_tree(&self, root: &Arc<TagInode>) -> Vec<Arc<TagInode>> {
        let mut detached = Vec::new();
        let mut stack = vec![root.clone()];
        while let Some(dir) = stack.pop() {
            let Some(dir_entry) = dir.inner.as_direntry() else {
                continue;
            };

            let mut dir_entry = dir_entry.write();
            dir_entry.mark_dead();
            for child in dir_entry.drain() {
                let Ok(node) = self.store.get(child.id) else {
                    continue;
                };
                if node.is_dir() {
                    node.metadata().clear_nlinks();
                    stack.push(node.clone());
                } else {
                    node.metadata().dec_nlinks();
                }
                detached.push(node);
            }
            drop(dir_entry);

            let mut meta = dir.metadata();
            meta.resize(super::node::NUM_SPECIAL_ENTRIES);
            meta.clear_nlinks();
        }
        detached
    }
}

impl FileSystem for TagFs {
    fn name(&self) -> &'static str {
        TagFsType::NAME
    }

    fn sync(&self) -> Result<()> {
        // do nothing
        Ok(())
    }

    fn sb(&self) -> SuperBlock {
        let mut sb = SuperBlock::new(TAGFS_MAGIC, BLOCK_SIZE, NAME_MAX);
        sb.files = self.store.live_nodes();
        sb.ffree = self.store.max_nodes().saturating_sub(sb.files);
        sb
    }

    fn unmount(&self) -> Result<()> {
        let root = self
            .root
            .lock()
            .take()
            .ok_or(Error::with_message(Errno::EINVAL, "the volume is unmounted"))?;

        let detached = self.detach_tree(root.node());
        for node in detached.into_iter().rev() {
            self.store.put(node);
        }
        drop(root);

        let pinned = self.store.live_nodes();
        if pinned > 0 {
            warn!(
                "[tagfs] {} nodes are still open, they are released on close",
                pinned
            );
        }

        let resources = core::mem::take(&mut *self.resources.lock());
        for resource in resources.iter().rev() {
            debug!("[tagfs] release resource: {}", resource.name());
            resource.release();
        }

        self.config.lock().take();
        info!("[tagfs] unmount");
        Ok(())
    }

    fn show_options(&self) -> String {
        self.config()
            .map(|config| config.render())
            .unwrap_or_default()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Debug for TagFs {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TagFs")
            .field("live_nodes", &self.store.live_nodes())
            .field("mounted", &self.root.lock().is_some())
            .finish()
    }
}

/// The `tagfs` file system type.
pub struct TagFsType {
    clock: Arc<dyn Clock>,
    max_nodes: usize,
}

impl TagFsType {
    pub const NAME: &'static str = "tagfs";

    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            max_nodes: usize::MAX,
        }
    }

    /// Caps the number of nodes of every volume created by this type.
    pub fn with_max_nodes(mut self, max_nodes: usize) -> Self {
        self.max_nodes = max_nodes;
        self
    }
}

impl FsType for TagFsType {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn properties(&self) -> FsProperties {
        FsProperties::empty()
    }

    fn create(
        &self,
        args: Option<&str>,
        disk: Option<Arc<dyn AttachedResource>>,
        ctx: &Credentials,
    ) -> Result<Arc<dyn FileSystem>> {
        let config = match args {
            Some(args) => MountConfig::parse(args)?,
            None => MountConfig::new(),
        };
        let backing = Backing::new(self.clock.clone()).with_max_nodes(self.max_nodes);

        let fs = TagFs::mount(config, backing, ctx)?;
        if let Some(disk) = disk {
            fs.attach(disk)?;
        }
        Ok(fs)
    }
}

#[cfg(test)]
mod test {
    use core::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::fs::utils::InodeMode;

    struct ZeroClock;

    impl Clock for ZeroClock {
        fn now(&self) -> Duration {
            Duration::ZERO
        }
    }

    /// Records the order in which resources are released.
    #[derive(Debug)]
    struct Resource {
        name: &'static str,
        seq: Arc<AtomicUsize>,
        released_at: AtomicUsize,
    }

    impl Resource {
        fn new(name: &'static str, seq: &Arc<AtomicUsize>) -> Arc<Self> {
            Arc::new(Self {
                name,
                seq: seq.clone(),
                released_at: AtomicUsize::new(0),
            })
        }
    }

    impl AttachedResource for Resource {
        fn name(&self) -> &str {
            self.name
        }

        fn release(&self) {
            let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
            self.released_at.store(seq, Ordering::Relaxed);
        }
    }

    fn mount(args: &str) -> Arc<TagFs> {
        let config = MountConfig::parse(args).unwrap();
        TagFs::mount(config, Backing::new(Arc::new(ZeroClock)), &Credentials::root()).unwrap()
    }

    #[test]
    fn root_takes_configured_mode() {
        let fs = mount("mode=1777");
        let root = fs.root().unwrap();
        assert_eq!(root.metadata().mode.bits(), 0o1777);
        assert_eq!(fs.show_options(), ",mode=1777");

        let sb = fs.sb();
        assert_eq!(sb.magic, TAGFS_MAGIC);
        assert_eq!(sb.bsize, BLOCK_SIZE);
        assert_eq!(sb.namelen, NAME_MAX);
        assert_eq!(sb.files, 1);
    }

    #[test]
    fn root_allocation_failure_is_out_of_memory() {
        let backing = Backing::new(Arc::new(ZeroClock)).with_max_nodes(0);
        let err = TagFs::mount(MountConfig::new(), backing, &Credentials::root()).unwrap_err();
        assert_eq!(err.error(), Errno::ENOMEM);
    }

    #[test]
    fn unmount_releases_everything_once() {
        let fs = mount("");
        let seq = Arc::new(AtomicUsize::new(0));
        let disk = Resource::new("disk", &seq);
        let dax = Resource::new("dax", &seq);
        fs.attach(disk.clone()).unwrap();
        fs.attach(dax.clone()).unwrap();

        let root = fs.root().unwrap();
        let mode = InodeMode::from_bits_truncate(0o755);
        let ctx = Credentials::root();
        let a = fs.mkdir(&root, "a", mode, &ctx).unwrap();
        let b = fs.mkdir(&a, "b", mode, &ctx).unwrap();
        fs.create(&b, "f", mode, &ctx).unwrap();
        fs.symlink(&root, "l", "a/b/f", &ctx).unwrap();
        drop((root, a, b));
        assert_eq!(fs.live_nodes(), 5);

        fs.unmount().unwrap();
        assert_eq!(fs.live_nodes(), 0);
        assert_eq!(dax.released_at.load(Ordering::Relaxed), 1);
        assert_eq!(disk.released_at.load(Ordering::Relaxed), 2);
        assert_eq!(fs.show_options(), "");

        assert_eq!(fs.unmount().unwrap_err().error(), Errno::EINVAL);
        assert_eq!(fs.root().unwrap_err().error(), Errno::EINVAL);
        assert_eq!(seq.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn open_handles_outlive_unmount() {
        let fs = mount("");
        let root = fs.root().unwrap();
        let ctx = Credentials::root();
        let file = fs
            .create(&root, "f", InodeMode::from_bits_truncate(0o644), &ctx)
            .unwrap();
        file.write_at(0, b"data").unwrap();

        fs.unmount().unwrap();
        // The root and the file are still open.
        assert_eq!(fs.live_nodes(), 2);
        assert_eq!(file.metadata().nlinks, 0);
        let mut buf = [0u8; 4];
        assert_eq!(file.read_at(0, &mut buf).unwrap(), 4);

        assert_eq!(
            fs.create(&root, "g", InodeMode::from_bits_truncate(0o644), &ctx)
                .unwrap_err()
                .error(),
            Errno::EINVAL
        );
        drop(file);
        drop(root);
        assert_eq!(fs.live_nodes(), 0);
    }
}
