// SPDX-License-Identifier: MPL-2.0

//! Namespace operations of `TagFs`.
//!
//! An operation that touches one directory holds its write lock throughout.
//! One that touches several (`rmdir` and `rename`) looks its targets up
//! without locks, locks every involved directory through `LockedDirs` and
//! then checks that the lookup still holds, retrying if it does not. Node
//! references dropped by an operation are given back only after all of its
//! locks are released.

use super::{
    dir::{Child, DirEntry, LockedDirs},
    fs::TagFs,
    node::{NodeHandle, TagInode},
    NAME_MAX,
};
use crate::{
    fs::utils::{DirentVisitor, InodeMode, MknodType},
    prelude::*,
};

impl TagFs {
    /// Creates a regular file named `name` in `parent`.
    pub fn create(
        &self,
        parent: &NodeHandle,
        name: &str,
        mode: InodeMode,
        ctx: &Credentials,
    ) -> Result<NodeHandle> {
        self.new_child(parent, name, |dir| self.store.alloc_file(dir, mode, ctx))
    }

    /// Creates a directory named `name` in `parent`.
    pub fn mkdir(
        &self,
        parent: &NodeHandle,
        name: &str,
        mode: InodeMode,
        ctx: &Credentials,
    ) -> Result<NodeHandle> {
        self.new_child(parent, name, |dir| self.store.alloc_dir(dir, mode, ctx))
    }

    /// Creates a symlink named `name` in `parent` pointing to `target`.
    ///
    /// The link gets mode `0777`. If the target cannot be stored, nothing is
    /// created.
    pub fn symlink(
        &self,
        parent: &NodeHandle,
        name: &str,
        target: &str,
        ctx: &Credentials,
    ) -> Result<NodeHandle> {
        if target.is_empty() {
            return_errno_with_message!(Errno::ENOENT, "empty symlink target");
        }
        self.new_child(parent, name, |dir| self.store.alloc_symlink(dir, target, ctx))
    }

    /// Creates a device node, a named pipe or a socket named `name` in `parent`.
    pub fn mknod(
        &self,
        parent: &NodeHandle,
        name: &str,
        mode: InodeMode,
        type_: MknodType,
        ctx: &Credentials,
    ) -> Result<NodeHandle> {
        self.new_child(parent, name, |dir| {
            self.store.alloc_special(dir, mode, type_, ctx)
        })
    }

    /// Creates a regular file without a name.
    ///
    /// The file is released as soon as the returned handle, and every clone
    /// of it, is dropped.
    pub fn tmpfile(
        &self,
        parent: &NodeHandle,
        mode: InodeMode,
        ctx: &Credentials,
    ) -> Result<NodeHandle> {
        let dir = self.dir_of(parent)?.read();
        if dir.is_dead() {
            return_errno_with_message!(Errno::ENOENT, "the directory is removed");
        }

        let file = self.store.alloc_file(parent.node(), mode, ctx)?;
        file.node().metadata().clear_nlinks();
        Ok(file)
    }

    /// Adds the name `name` in `parent` for `existing`.
    pub fn link(&self, existing: &NodeHandle, parent: &NodeHandle, name: &str) -> Result<()> {
        check_new_name(name)?;
        let dir = self.dir_of(parent)?;
        self.check_same_volume(existing)?;
        if existing.node().is_dir() {
            return_errno_with_message!(Errno::EISDIR, "hard link to a dir");
        }

        let mut dir = dir.write();
        if dir.is_dead() {
            return_errno_with_message!(Errno::ENOENT, "the directory is removed");
        }
        if dir.contains_entry(name) {
            return_errno_with_message!(Errno::EEXIST, "entry exists");
        }

        let now = self.store.now();
        {
            let mut existing_meta = existing.node().metadata();
            if existing_meta.nlinks() == 0 {
                return_errno_with_message!(Errno::ENOENT, "the node has no name left");
            }
            existing_meta.inc_nlinks();
            existing_meta.set_ctime(now);
        }
        existing.node().pin();
        dir.append_entry(Child::new(name, existing.node()));

        let mut parent_meta = parent.node().metadata();
        parent_meta.inc_size();
        parent_meta.touch(now);
        Ok(())
    }

    /// Removes the name `name` of a non-directory from `parent`.
    pub fn unlink(&self, parent: &NodeHandle, name: &str) -> Result<()> {
        if name == "." || name == ".." {
            return_errno_with_message!(Errno::EISDIR, "unlink . or ..");
        }
        check_name(name)?;

        let mut dir = self.dir_of(parent)?.write();
        let (idx, id, is_dir) = dir
            .get_entry(name)
            .map(|(idx, child)| (idx, child.id, child.typ.is_directory()))
            .ok_or(Error::new(Errno::ENOENT))?;
        if is_dir {
            return_errno_with_message!(Errno::EISDIR, "unlink on dir");
        }
        let target = self.store.get(id)?;
        dir.remove_entry(idx);

        let now = self.store.now();
        let mut target_meta = target.metadata();
        target_meta.dec_nlinks();
        target_meta.set_ctime(now);
        drop(target_meta);
        let mut parent_meta = parent.node().metadata();
        parent_meta.dec_size();
        parent_meta.touch(now);
        drop(parent_meta);
        drop(dir);

        self.store.put(target);
        Ok(())
    }

    /// Removes the empty directory named `name` from `parent`.
    pub fn rmdir(&self, parent: &NodeHandle, name: &str) -> Result<()> {
        if name == "." {
            return_errno_with_message!(Errno::EINVAL, "rmdir on .");
        }
        if name == ".." {
            return_errno_with_message!(Errno::ENOTEMPTY, "rmdir on ..");
        }
        check_name(name)?;

        let parent_dir = self.dir_of(parent)?;
        let parent_ino = parent.ino();
        loop {
            let target = self.find_child(parent_dir, name)?;
            let Some(target_dir) = target.inner.as_direntry() else {
                return_errno_with_message!(Errno::ENOTDIR, "rmdir on not dir");
            };

            // When we got the locks, the dir may have been modified by another thread
            let mut dirs =
                LockedDirs::lock(vec![(parent_ino, parent_dir), (target.ino, target_dir)]);
            let idx = match dirs.get(parent_ino).get_entry(name) {
                Some((idx, child)) if child.ino == target.ino => idx,
                _ => continue,
            };
            if !dirs.get(target.ino).is_empty_children() {
                return_errno_with_message!(Errno::ENOTEMPTY, "dir not empty");
            }
            dirs.get(parent_ino).remove_entry(idx);
            dirs.get(target.ino).mark_dead();

            let now = self.store.now();
            let mut target_meta = target.metadata();
            target_meta.clear_nlinks();
            target_meta.set_ctime(now);
            drop(target_meta);
            let mut parent_meta = parent.node().metadata();
            parent_meta.dec_size();
            parent_meta.dec_nlinks();
            parent_meta.touch(now);
            drop(parent_meta);
            drop(dirs);

            self.store.put(target);
            return Ok(());
        }
    }

    /// Moves the entry `old_name` of `old_parent` to `new_name` in
    /// `new_parent`, replacing what `new_name` referred to.
    ///
    /// If both names refer to the same node, nothing happens.
    pub fn rename(
        &self,
        old_parent: &NodeHandle,
        old_name: &str,
        new_parent: &NodeHandle,
        new_name: &str,
    ) -> Result<()> {
        for name in [old_name, new_name] {
            if name == "." || name == ".." {
                return_errno_with_message!(Errno::EINVAL, "rename . or ..");
            }
            check_name(name)?;
        }

        let old_dir = self.dir_of(old_parent)?;
        let new_dir = self.dir_of(new_parent)?;
        let old_ino = old_parent.ino();
        let new_ino = new_parent.ino();
        let is_same_dir = old_ino == new_ino;

        // Keeps the parent pointers of directories still.
        let _rename_guard = (!is_same_dir).then(|| self.rename_lock.lock());

        loop {
            let src = self.find_child(old_dir, old_name)?;
            let dst = self.try_find_child(new_dir, new_name)?;
            if !is_same_dir && src.is_dir() && self.is_ancestor(&src, new_parent.node())? {
                return_errno_with_message!(Errno::EINVAL, "rename a dir into its own subtree");
            }

            let mut locked = vec![(old_ino, old_dir), (new_ino, new_dir)];
            if !is_same_dir {
                if let Some(src_dir) = src.inner.as_direntry() {
                    locked.push((src.ino, src_dir));
                }
            }
            if let Some(dst) = dst.as_ref() {
                if let Some(dst_dir) = dst.inner.as_direntry() {
                    locked.push((dst.ino, dst_dir));
                }
            }

            // When we got the locks, the dirs may have been modified by another thread
            let mut dirs = LockedDirs::lock(locked);
            let src_idx = match dirs.get(old_ino).get_entry(old_name) {
                Some((idx, child)) if child.ino == src.ino => idx,
                _ => continue,
            };
            let dst_idx = match (dirs.get(new_ino).get_entry(new_name), dst.as_ref()) {
                (Some((idx, child)), Some(dst)) if child.ino == dst.ino => Some(idx),
                (None, None) => None,
                _ => continue,
            };
            if dirs.get(new_ino).is_dead() {
                return_errno_with_message!(Errno::ENOENT, "the directory is removed");
            }
            if let Some(dst) = dst.as_ref() {
                if dst.ino == src.ino {
                    return Ok(());
                }
                check_replace(&src, dst, &mut dirs)?;
            }

            if is_same_dir {
                let dir = dirs.get(old_ino);
                if let Some(dst_idx) = dst_idx {
                    dir.remove_entry(dst_idx);
                }
                dir.rename_entry(src_idx, new_name);
            } else {
                dirs.get(old_ino).remove_entry(src_idx);
                if let Some(dst_idx) = dst_idx {
                    dirs.get(new_ino).remove_entry(dst_idx);
                }
                dirs.get(new_ino).append_entry(Child::new(new_name, &src));
                if src.is_dir() {
                    dirs.get(src.ino).set_parent(new_parent.node());
                }
            }
            if let Some(dst) = dst.as_ref().filter(|dst| dst.is_dir()) {
                dirs.get(dst.ino).mark_dead();
            }

            let now = self.store.now();
            if !is_same_dir {
                let mut old_meta = old_parent.node().metadata();
                old_meta.dec_size();
                if src.is_dir() {
                    old_meta.dec_nlinks();
                }
                old_meta.touch(now);
                drop(old_meta);

                let mut new_meta = new_parent.node().metadata();
                new_meta.inc_size();
                if src.is_dir() {
                    new_meta.inc_nlinks();
                }
                drop(new_meta);
            }
            let mut new_meta = new_parent.node().metadata();
            if let Some(dst) = dst.as_ref() {
                new_meta.dec_size();
                if dst.is_dir() {
                    new_meta.dec_nlinks();
                }
            }
            new_meta.touch(now);
            drop(new_meta);
            src.metadata().set_ctime(now);
            if let Some(dst) = dst.as_ref() {
                let mut dst_meta = dst.metadata();
                if dst.is_dir() {
                    dst_meta.clear_nlinks();
                } else {
                    dst_meta.dec_nlinks();
                }
                dst_meta.set_ctime(now);
            }
            drop(dirs);

            if let Some(dst) = dst {
                self.store.put(dst);
            }
            return Ok(());
        }
    }

    /// Opens the node named `name` in `parent`.
    ///
    /// `.` is `parent` itself and `..` is its parent, or the root itself for
    /// the root.
    pub fn lookup(&self, parent: &NodeHandle, name: &str) -> Result<NodeHandle> {
        if name.len() > NAME_MAX {
            return_errno!(Errno::ENAMETOOLONG);
        }

        let dir = self.dir_of(parent)?.read();
        let node = match name {
            "." => return Ok(parent.clone()),
            ".." => {
                if dir.is_dead() {
                    return_errno_with_message!(Errno::ENOENT, "the directory is removed");
                }
                if dir.parent() == parent.id() {
                    return Ok(parent.clone());
                }
                self.store.get(dir.parent())?
            }
            _ => {
                let (_, child) = dir.get_entry(name).ok_or(Error::new(Errno::ENOENT))?;
                self.store.get(child.id)?
            }
        };
        // The entry keeps the node alive while the lock is held.
        let handle = NodeHandle::new(self.store.clone(), node);
        drop(dir);
        Ok(handle)
    }

    /// Feeds `visitor` with the entries of `dir` from `offset` on, returning
    /// how far the offset advanced.
    pub fn readdir_at(
        &self,
        dir: &NodeHandle,
        offset: usize,
        visitor: &mut dyn DirentVisitor,
    ) -> Result<usize> {
        let cnt = self
            .dir_of(dir)?
            .read()
            .visit_entry(offset, dir.ino(), visitor)?;

        let now = self.store.now();
        dir.node().metadata().set_atime(now);
        Ok(cnt)
    }

    fn new_child<F>(&self, parent: &NodeHandle, name: &str, alloc: F) -> Result<NodeHandle>
    where
        F: FnOnce(&TagInode) -> Result<NodeHandle>,
    {
        check_new_name(name)?;

        let mut dir = self.dir_of(parent)?.write();
        if dir.is_dead() {
            return_errno_with_message!(Errno::ENOENT, "the directory is removed");
        }
        if dir.contains_entry(name) {
            return_errno_with_message!(Errno::EEXIST, "entry exists");
        }

        let parent_node: &TagInode = parent.node();
        let new_node = alloc(parent_node)?;
        new_node.node().pin();
        dir.append_entry(Child::new(name, new_node.node()));

        let now = self.store.now();
        let mut parent_meta = parent.node().metadata();
        parent_meta.inc_size();
        if new_node.node().is_dir() {
            parent_meta.inc_nlinks();
        }
        parent_meta.touch(now);
        Ok(new_node)
    }

    fn dir_of<'a>(&self, handle: &'a NodeHandle) -> Result<&'a RwLock<DirEntry>> {
        self.check_mounted()?;
        self.check_same_volume(handle)?;
        handle
            .node()
            .inner
            .as_direntry()
            .ok_or(Error::with_message(Errno::ENOTDIR, "self is not dir"))
    }

    fn check_same_volume(&self, handle: &NodeHandle) -> Result<()> {
        if !Arc::ptr_eq(handle.store(), &self.store) {
            return_errno_with_message!(Errno::EXDEV, "not same fs");
        }
        Ok(())
    }

    fn find_child(&self, dir: &RwLock<DirEntry>, name: &str) -> Result<Arc<TagInode>> {
        self.try_find_child(dir, name)?
            .ok_or(Error::new(Errno::ENOENT))
    }

    fn try_find_child(&self, dir: &RwLock<DirEntry>, name: &str) -> Result<Option<Arc<TagInode>>> {
        let dir = dir.read();
        match dir.get_entry(name) {
            Some((_, child)) => self.store.get(child.id).map(Some),
            None => Ok(None),
        }
    }

    /// Returns whether `dir` is `ancestor` or lies below it.
    ///
    /// The caller must hold the rename lock.
    fn is_ancestor(&self, ancestor: &TagInode, dir: &Arc<TagInode>) -> Result<bool> {
        let mut current = dir.clone();
        loop {
            if current.ino == ancestor.ino {
                return Ok(true);
            }
            let Some(current_dir) = current.inner.as_direntry() else {
                return Ok(false);
            };
            let parent = {
                let current_dir = current_dir.read();
                if current_dir.is_dead() {
                    return Ok(false);
                }
                current_dir.parent()
            };
            if parent == current.id {
                return Ok(false);
            }
            current = self.store.get(parent)?;
        }
    }
}

/// Checks that `dst` can be replaced by `src`.
fn check_replace(src: &TagInode, dst: &TagInode, dirs: &mut LockedDirs<'_>) -> Result<()> {
    match (src.is_dir(), dst.is_dir()) {
        (true, true) => {
            if !dirs.get(dst.ino).is_empty_children() {
                return_errno_with_message!(Errno::ENOTEMPTY, "dir not empty");
            }
        }
        (true, false) => {
            return_errno_with_message!(Errno::ENOTDIR, "old is dir but new is not");
        }
        (false, true) => {
            return_errno_with_message!(Errno::EISDIR, "new is dir");
        }
        (false, false) => {}
    }
    Ok(())
}

fn check_name(name: &str) -> Result<()> {
    if name.len() > NAME_MAX {
        return_errno!(Errno::ENAMETOOLONG);
    }
    if name.is_empty() || name.contains('/') {
        return_errno_with_message!(Errno::EINVAL, "invalid name");
    }
    Ok(())
}

fn check_new_name(name: &str) -> Result<()> {
    check_name(name)?;
    if name == "." || name == ".." {
        return_errno_with_message!(Errno::EEXIST, "entry exists");
    }
    Ok(())
}
