// SPDX-License-Identifier: MPL-2.0

//! The node store: an arena of nodes indexed by recyclable slots.

use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use id_alloc::IdAlloc;

use super::{dir::DirEntry, BLOCK_SIZE, ROOT_INO};
use crate::{
    fs::utils::{
        Clock, ContentHandle, DeviceId, InodeMode, InodeType, LinkHandle, LinkStore, MemLinkStore,
        MemPageStore, Metadata, MknodType, PageStore,
    },
    prelude::*,
};

/// The arena slot of a node.
///
/// Unlike the inode number, a slot is handed out again once its node is
/// released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

impl NodeId {
    pub const fn as_usize(&self) -> usize {
        self.0
    }

    #[cfg(test)]
    pub(super) const fn from_usize(id: usize) -> Self {
        Self(id)
    }
}

/// The collaborators and host limits a volume is built on.
pub struct Backing {
    pages: Arc<dyn PageStore>,
    links: Arc<dyn LinkStore>,
    clock: Arc<dyn Clock>,
    max_nodes: usize,
}

impl Backing {
    /// Uses in-memory stores and no cap on the number of nodes.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            pages: Arc::new(MemPageStore::new()),
            links: Arc::new(MemLinkStore::new()),
            clock,
            max_nodes: usize::MAX,
        }
    }

    pub fn with_page_store(mut self, pages: Arc<dyn PageStore>) -> Self {
        self.pages = pages;
        self
    }

    pub fn with_link_store(mut self, links: Arc<dyn LinkStore>) -> Self {
        self.links = links;
        self
    }

    /// Caps the number of nodes, the root included, that may exist at once.
    pub fn with_max_nodes(mut self, max_nodes: usize) -> Self {
        self.max_nodes = max_nodes;
        self
    }
}

/// A node of `TagFs`.
pub(super) struct TagInode {
    /// Node inner specifics
    pub(super) inner: Inner,
    /// Node metadata
    metadata: Mutex<InodeMeta>,
    /// Inode number
    pub(super) ino: u64,
    /// Arena slot
    pub(super) id: NodeId,
    /// Type of the node
    pub(super) typ: InodeType,
    /// Directory entries plus open handles that refer to this node
    keepalive: AtomicUsize,
}

/// Node inner specifics.
pub(super) enum Inner {
    Dir(RwLock<DirEntry>),
    File(ContentHandle),
    SymLink(LinkHandle),
    Special(DeviceId),
}

impl Inner {
    pub(super) fn as_direntry(&self) -> Option<&RwLock<DirEntry>> {
        match self {
            Self::Dir(dir_entry) => Some(dir_entry),
            _ => None,
        }
    }

    fn as_file(&self) -> Option<ContentHandle> {
        match self {
            Self::File(handle) => Some(*handle),
            _ => None,
        }
    }
}

/// Node metadata.
#[derive(Debug, Clone, Copy)]
pub(super) struct InodeMeta {
    size: usize,
    blocks: usize,
    atime: Duration,
    mtime: Duration,
    ctime: Duration,
    mode: InodeMode,
    nlinks: usize,
    uid: Uid,
    gid: Gid,
}

// Every directory has two special entries: "." and "..".
pub(super) const NUM_SPECIAL_ENTRIES: usize = 2;

impl InodeMeta {
    fn new(mode: InodeMode, uid: Uid, gid: Gid, now: Duration) -> Self {
        Self {
            size: 0,
            blocks: 0,
            atime: now,
            mtime: now,
            ctime: now,
            mode,
            nlinks: 1,
            uid,
            gid,
        }
    }

    fn new_dir(mode: InodeMode, uid: Uid, gid: Gid, now: Duration) -> Self {
        Self {
            size: NUM_SPECIAL_ENTRIES,
            blocks: 1,
            nlinks: NUM_SPECIAL_ENTRIES,
            ..Self::new(mode, uid, gid, now)
        }
    }

    pub(super) fn resize(&mut self, new_size: usize) {
        self.size = new_size;
        self.blocks = new_size.div_ceil(BLOCK_SIZE);
    }

    pub(super) fn inc_size(&mut self) {
        self.resize(self.size + 1);
    }

    pub(super) fn dec_size(&mut self) {
        debug_assert!(self.size > 0);
        self.resize(self.size - 1);
    }

    pub(super) fn set_atime(&mut self, time: Duration) {
        self.atime = time;
    }

    pub(super) fn set_ctime(&mut self, time: Duration) {
        self.ctime = time;
    }

    /// Records a change to the content, which is also a change to the node.
    pub(super) fn touch(&mut self, time: Duration) {
        self.mtime = time;
        self.ctime = time;
    }

    pub(super) fn nlinks(&self) -> usize {
        self.nlinks
    }

    pub(super) fn inc_nlinks(&mut self) {
        self.nlinks += 1;
    }

    pub(super) fn dec_nlinks(&mut self) {
        debug_assert!(self.nlinks > 0);
        self.nlinks -= 1;
    }

    pub(super) fn clear_nlinks(&mut self) {
        self.nlinks = 0;
    }
}

impl TagInode {
    pub(super) fn metadata(&self) -> MutexGuard<'_, InodeMeta> {
        self.metadata.lock()
    }

    pub(super) fn is_dir(&self) -> bool {
        self.typ.is_directory()
    }

    /// Adds a reference from a directory entry or a handle.
    pub(super) fn pin(&self) {
        self.keepalive.fetch_add(1, Ordering::Relaxed);
    }

    /// Drops a reference, returning whether it was the last one.
    fn unpin(&self) -> bool {
        let old = self.keepalive.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(old > 0);
        old == 1
    }

    #[cfg(test)]
    pub(super) fn keepalive(&self) -> usize {
        self.keepalive.load(Ordering::Relaxed)
    }
}

impl Debug for TagInode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TagInode")
            .field("ino", &self.ino)
            .field("id", &self.id)
            .field("typ", &self.typ)
            .field("keepalive", &self.keepalive.load(Ordering::Relaxed))
            .finish()
    }
}

/// What a new node is made of.
#[derive(Clone, Copy)]
enum NewNode<'a> {
    /// A directory. The root has no parent and is its own `..`.
    Dir(Option<&'a TagInode>),
    File,
    SymLink(&'a str),
    Special(MknodType),
}

struct Slots {
    id_alloc: IdAlloc,
    nodes: Vec<Option<Arc<TagInode>>>,
}

/// The arena of the nodes of one volume.
pub(super) struct NodeStore {
    slots: Mutex<Slots>,
    /// An inode number allocator
    next_ino: AtomicU64,
    pages: Arc<dyn PageStore>,
    links: Arc<dyn LinkStore>,
    clock: Arc<dyn Clock>,
}

impl NodeStore {
    pub(super) fn new(backing: Backing) -> Self {
        Self {
            slots: Mutex::new(Slots {
                id_alloc: IdAlloc::with_limit(backing.max_nodes),
                nodes: Vec::new(),
            }),
            next_ino: AtomicU64::new(ROOT_INO),
            pages: backing.pages,
            links: backing.links,
            clock: backing.clock,
        }
    }

    pub(super) fn now(&self) -> Duration {
        self.clock.now()
    }

    /// Returns the number of nodes that have not been released.
    pub(super) fn live_nodes(&self) -> usize {
        self.slots.lock().id_alloc.num_allocated()
    }

    /// Returns the cap on the number of nodes.
    pub(super) fn max_nodes(&self) -> usize {
        self.slots.lock().id_alloc.limit()
    }

    pub(super) fn get(&self, id: NodeId) -> Result<Arc<TagInode>> {
        self.slots
            .lock()
            .nodes
            .get(id.0)
            .and_then(|slot| slot.clone())
            .ok_or(Error::with_message(Errno::EIO, "dangling node id"))
    }

    pub(super) fn alloc_root(
        self: &Arc<Self>,
        mode: InodeMode,
        ctx: &Credentials,
    ) -> Result<NodeHandle> {
        self.alloc(NewNode::Dir(None), mode, ctx)
    }

    pub(super) fn alloc_dir(
        self: &Arc<Self>,
        parent: &TagInode,
        mode: InodeMode,
        ctx: &Credentials,
    ) -> Result<NodeHandle> {
        self.alloc(NewNode::Dir(Some(parent)), mode, ctx)
    }

    pub(super) fn alloc_file(
        self: &Arc<Self>,
        parent: &TagInode,
        mode: InodeMode,
        ctx: &Credentials,
    ) -> Result<NodeHandle> {
        let (uid, gid, mode) = inherit_owner(Some(parent), InodeType::File, mode, ctx);
        self.alloc_with_owner(NewNode::File, mode, uid, gid)
    }

    pub(super) fn alloc_symlink(
        self: &Arc<Self>,
        parent: &TagInode,
        target: &str,
        ctx: &Credentials,
    ) -> Result<NodeHandle> {
        let (uid, gid, mode) =
            inherit_owner(Some(parent), InodeType::SymLink, InodeMode::rwx_all(), ctx);
        self.alloc_with_owner(NewNode::SymLink(target), mode, uid, gid)
    }

    pub(super) fn alloc_special(
        self: &Arc<Self>,
        parent: &TagInode,
        mode: InodeMode,
        type_: MknodType,
        ctx: &Credentials,
    ) -> Result<NodeHandle> {
        let (uid, gid, mode) = inherit_owner(Some(parent), type_.inode_type(), mode, ctx);
        self.alloc_with_owner(NewNode::Special(type_), mode, uid, gid)
    }

    fn alloc(
        self: &Arc<Self>,
        new: NewNode<'_>,
        mode: InodeMode,
        ctx: &Credentials,
    ) -> Result<NodeHandle> {
        let parent = match new {
            NewNode::Dir(parent) => parent,
            _ => None,
        };
        let typ = match new {
            NewNode::Dir(_) => InodeType::Dir,
            NewNode::File => InodeType::File,
            NewNode::SymLink(_) => InodeType::SymLink,
            NewNode::Special(type_) => type_.inode_type(),
        };
        let (uid, gid, mode) = inherit_owner(parent, typ, mode, ctx);
        self.alloc_with_owner(new, mode, uid, gid)
    }

    /// Allocates a node and returns the only handle to it.
    ///
    /// If any step fails, nothing stays allocated.
    fn alloc_with_owner(
        self: &Arc<Self>,
        new: NewNode<'_>,
        mode: InodeMode,
        uid: Uid,
        gid: Gid,
    ) -> Result<NodeHandle> {
        let id = self.reserve_slot()?;
        let now = self.clock.now();

        let built = match new {
            NewNode::Dir(parent) => {
                let (parent_id, parent_ino) = match parent {
                    Some(parent) => (parent.id, parent.ino),
                    None => (id, ROOT_INO),
                };
                let inner = Inner::Dir(RwLock::new(DirEntry::new(parent_id, parent_ino)));
                Ok((inner, InodeType::Dir, InodeMeta::new_dir(mode, uid, gid, now)))
            }
            NewNode::File => self.pages.create().map(|handle| {
                let meta = InodeMeta::new(mode, uid, gid, now);
                (Inner::File(handle), InodeType::File, meta)
            }),
            NewNode::SymLink(target) => self.links.store(target).map(|handle| {
                let mut meta = InodeMeta::new(mode, uid, gid, now);
                meta.resize(target.len());
                (Inner::SymLink(handle), InodeType::SymLink, meta)
            }),
            NewNode::Special(type_) => {
                let meta = InodeMeta::new(mode, uid, gid, now);
                Ok((Inner::Special(type_.device_id()), type_.inode_type(), meta))
            }
        };
        let (inner, typ, meta) = match built {
            Ok(built) => built,
            Err(e) => {
                self.slots.lock().id_alloc.free(id.0);
                return Err(e);
            }
        };

        let node = Arc::new(TagInode {
            inner,
            metadata: Mutex::new(meta),
            ino: self.next_ino.fetch_add(1, Ordering::Relaxed),
            id,
            typ,
            keepalive: AtomicUsize::new(0),
        });
        self.slots.lock().nodes[id.0] = Some(node.clone());
        trace!(
            "[tagfs] alloc node: ino = {}, slot = {}, type = {:?}",
            node.ino,
            id.0,
            typ
        );

        Ok(NodeHandle::new(self.clone(), node))
    }

    fn reserve_slot(&self) -> Result<NodeId> {
        let mut slots = self.slots.lock();
        let Some(id) = slots.id_alloc.alloc() else {
            return_errno_with_message!(Errno::ENOSPC, "too many nodes");
        };
        if slots.nodes.len() <= id {
            slots.nodes.resize(id + 1, None);
        }
        Ok(NodeId(id))
    }

    /// Drops one keepalive reference of `node`.
    ///
    /// A node that loses its last reference is released. A directory released
    /// this way gives up the entries it still holds, and so on down the tree.
    pub(super) fn put(&self, node: Arc<TagInode>) {
        let mut pending = vec![node];
        while let Some(node) = pending.pop() {
            if !node.unpin() {
                continue;
            }

            if let Some(dir) = node.inner.as_direntry() {
                let mut dir = dir.write();
                dir.mark_dead();
                for child in dir.drain() {
                    if let Ok(child) = self.get(child.id) {
                        pending.push(child);
                    }
                }
            }
            self.release(&node);
        }
    }

    fn release(&self, node: &TagInode) {
        let mut slots = self.slots.lock();
        let removed = slots.nodes[node.id.0].take();
        debug_assert!(removed.is_some());
        slots.id_alloc.free(node.id.0);
        drop(slots);

        match &node.inner {
            Inner::File(handle) => self.pages.release(*handle),
            Inner::SymLink(handle) => self.links.release(*handle),
            Inner::Dir(_) | Inner::Special(_) => {}
        }
        trace!(
            "[tagfs] release node: ino = {}, slot = {}",
            node.ino,
            node.id.0
        );
    }
}

/// Computes the owner and mode of a new node the way `inode_init_owner` does.
///
/// The group comes from a set-group-ID parent, and new directories under such
/// a parent are set-group-ID themselves.
fn inherit_owner(
    parent: Option<&TagInode>,
    typ: InodeType,
    mut mode: InodeMode,
    ctx: &Credentials,
) -> (Uid, Gid, InodeMode) {
    let uid = ctx.fsuid();
    let Some(parent) = parent else {
        return (uid, ctx.fsgid(), mode);
    };

    let parent_meta = parent.metadata();
    if parent_meta.mode.has_set_gid() {
        if typ == InodeType::Dir {
            mode |= InodeMode::S_ISGID;
        }
        (uid, parent_meta.gid, mode)
    } else {
        (uid, ctx.fsgid(), mode)
    }
}

/// An open reference to a node.
///
/// A handle keeps its node alive even after the last name of the node is
/// removed. Cloning a handle takes another reference and dropping one gives
/// it back.
pub struct NodeHandle {
    node: Arc<TagInode>,
    store: Arc<NodeStore>,
}

impl NodeHandle {
    pub(super) fn new(store: Arc<NodeStore>, node: Arc<TagInode>) -> Self {
        node.pin();
        Self { node, store }
    }

    pub(super) fn node(&self) -> &Arc<TagInode> {
        &self.node
    }

    pub(super) fn store(&self) -> &Arc<NodeStore> {
        &self.store
    }

    pub fn ino(&self) -> u64 {
        self.node.ino
    }

    pub fn id(&self) -> NodeId {
        self.node.id
    }

    pub fn type_(&self) -> InodeType {
        self.node.typ
    }

    pub fn metadata(&self) -> Metadata {
        let meta = *self.node.metadata();
        let rdev = match &self.node.inner {
            Inner::Special(device) => device.as_encoded_u64(),
            _ => 0,
        };
        Metadata {
            ino: self.node.ino,
            size: meta.size,
            blk_size: BLOCK_SIZE,
            blocks: meta.blocks,
            atime: meta.atime,
            mtime: meta.mtime,
            ctime: meta.ctime,
            type_: self.node.typ,
            mode: meta.mode,
            nlinks: meta.nlinks,
            uid: meta.uid,
            gid: meta.gid,
            rdev,
        }
    }

    pub fn set_mode(&self, mode: InodeMode) {
        let now = self.store.now();
        let mut meta = self.node.metadata();
        meta.mode = mode;
        meta.set_ctime(now);
    }

    /// Reads the target of a symlink exactly as it was given.
    pub fn read_link(&self) -> Result<String> {
        match &self.node.inner {
            Inner::SymLink(handle) => self.store.links.load(*handle),
            _ => return_errno_with_message!(Errno::EINVAL, "not a symlink"),
        }
    }

    pub fn read_at(&self, offset: usize, buf: &mut [u8]) -> Result<usize> {
        let handle = self.file_content()?;
        let size = self.node.metadata().size;
        if offset >= size {
            return Ok(0);
        }

        let read_len = buf.len().min(size - offset);
        let read_len = self.store.pages.read_at(handle, offset, &mut buf[..read_len])?;
        let now = self.store.now();
        self.node.metadata().set_atime(now);
        Ok(read_len)
    }

    pub fn write_at(&self, offset: usize, buf: &[u8]) -> Result<usize> {
        let handle = self.file_content()?;
        let written = self.store.pages.write_at(handle, offset, buf)?;

        let now = self.store.now();
        let mut meta = self.node.metadata();
        let end = offset + written;
        if end > meta.size {
            meta.resize(end);
        }
        meta.touch(now);
        Ok(written)
    }

    pub fn resize(&self, new_size: usize) -> Result<()> {
        let handle = self.file_content()?;
        self.store.pages.resize(handle, new_size)?;

        let now = self.store.now();
        let mut meta = self.node.metadata();
        meta.resize(new_size);
        meta.touch(now);
        Ok(())
    }

    fn file_content(&self) -> Result<ContentHandle> {
        if self.node.is_dir() {
            return_errno_with_message!(Errno::EISDIR, "the node is a directory");
        }
        self.node
            .inner
            .as_file()
            .ok_or(Error::with_message(Errno::EINVAL, "not a regular file"))
    }
}

impl Clone for NodeHandle {
    fn clone(&self) -> Self {
        Self::new(self.store.clone(), self.node.clone())
    }
}

impl Drop for NodeHandle {
    fn drop(&mut self) {
        self.store.put(self.node.clone());
    }
}

impl Debug for NodeHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("NodeHandle")
            .field("node", &self.node)
            .finish()
    }
}
