// SPDX-License-Identifier: MPL-2.0

use hashbrown::HashMap;

use super::node::{NodeId, TagInode, NUM_SPECIAL_ENTRIES};
use crate::{
    fs::utils::{DirentVisitor, InodeType},
    prelude::*,
};

/// A name-to-node binding inside a directory.
#[derive(Debug, Clone)]
pub(super) struct Child {
    pub(super) name: String,
    pub(super) id: NodeId,
    pub(super) ino: u64,
    pub(super) typ: InodeType,
}

impl Child {
    pub(super) fn new(name: &str, node: &TagInode) -> Self {
        Self {
            name: String::from(name),
            id: node.id,
            ino: node.ino,
            typ: node.typ,
        }
    }
}

/// Represents the entries within a directory node.
///
/// Children keep their position until they are removed, so an offset handed
/// out by `visit_entry` stays valid across unrelated insertions and removals.
pub(super) struct DirEntry {
    children: Vec<Option<Child>>,
    idx_map: HashMap<String, usize>, // Used to accelerate indexing in `children`
    parent: NodeId,
    parent_ino: u64,
    is_dead: bool,
}

impl DirEntry {
    pub(super) fn new(parent: NodeId, parent_ino: u64) -> Self {
        Self {
            children: Vec::new(),
            idx_map: HashMap::new(),
            parent,
            parent_ino,
            is_dead: false,
        }
    }

    pub(super) fn parent(&self) -> NodeId {
        self.parent
    }

    pub(super) fn set_parent(&mut self, parent: &TagInode) {
        self.parent = parent.id;
        self.parent_ino = parent.ino;
    }

    /// Returns whether the directory has been removed from the tree.
    pub(super) fn is_dead(&self) -> bool {
        self.is_dead
    }

    pub(super) fn mark_dead(&mut self) {
        self.is_dead = true;
    }

    pub(super) fn contains_entry(&self, name: &str) -> bool {
        self.idx_map.contains_key(name)
    }

    pub(super) fn get_entry(&self, name: &str) -> Option<(usize, &Child)> {
        let idx = *self.idx_map.get(name)?;
        let child = self.children[idx].as_ref()?;
        debug_assert_eq!(child.name, name);
        Some((idx, child))
    }

    pub(super) fn append_entry(&mut self, child: Child) -> usize {
        debug_assert!(!self.idx_map.contains_key(&child.name));
        let idx = self.children.len();
        self.idx_map.insert(child.name.clone(), idx);
        self.children.push(Some(child));
        idx
    }

    pub(super) fn remove_entry(&mut self, idx: usize) -> Option<Child> {
        let removed = self.children.get_mut(idx)?.take()?;
        self.idx_map.remove(&removed.name);
        if self.idx_map.is_empty() {
            self.children.clear();
        }
        Some(removed)
    }

    /// Gives the entry at `idx` a new name, keeping its position.
    pub(super) fn rename_entry(&mut self, idx: usize, new_name: &str) {
        let Some(child) = self.children.get_mut(idx).and_then(|child| child.as_mut()) else {
            return;
        };
        self.idx_map.remove(&child.name);
        child.name = String::from(new_name);
        self.idx_map.insert(child.name.clone(), idx);
    }

    /// Removes all entries, returning them in insertion order.
    pub(super) fn drain(&mut self) -> Vec<Child> {
        self.idx_map.clear();
        self.children.drain(..).flatten().collect()
    }

    pub(super) fn num_entries(&self) -> usize {
        self.idx_map.len()
    }

    pub(super) fn is_empty_children(&self) -> bool {
        self.idx_map.is_empty()
    }

    /// Feeds `visitor` with the entries starting from offset `idx`.
    ///
    /// Offsets 0 and 1 are `.` and `..`. Returns the number of offsets
    /// consumed, which is the amount to advance `idx` by to resume.
    pub(super) fn visit_entry(
        &self,
        idx: usize,
        this_ino: u64,
        visitor: &mut dyn DirentVisitor,
    ) -> Result<usize> {
        if self.is_dead {
            return Ok(0);
        }

        let try_visit = |idx: &mut usize, visitor: &mut dyn DirentVisitor| -> Result<()> {
            // Read the two special entries("." and "..").
            if *idx == 0 {
                visitor.visit(".", this_ino, InodeType::Dir, *idx)?;
                *idx += 1;
            }
            if *idx == 1 {
                visitor.visit("..", self.parent_ino, InodeType::Dir, *idx)?;
                *idx += 1;
            }
            // Read the normal child entries.
            let start_idx = *idx;
            for (offset_children, child) in self
                .children
                .iter()
                .enumerate()
                .skip(start_idx - NUM_SPECIAL_ENTRIES)
                .filter_map(|(offset, child)| Some((offset, child.as_ref()?)))
            {
                let offset = offset_children + NUM_SPECIAL_ENTRIES;
                visitor.visit(&child.name, child.ino, child.typ, offset)?;
                *idx = offset + 1;
            }
            Ok(())
        };

        let mut iterate_idx = idx;
        match try_visit(&mut iterate_idx, visitor) {
            Err(e) if idx == iterate_idx => Err(e),
            _ => Ok(iterate_idx - idx),
        }
    }
}

/// Write guards of several directories, acquired in ascending inode number
/// order.
///
/// Every path that holds more than one directory lock at a time goes through
/// this type, so two such paths cannot wait on each other.
pub(super) struct LockedDirs<'a> {
    guards: Vec<(u64, RwLockWriteGuard<'a, DirEntry>)>,
}

impl<'a> LockedDirs<'a> {
    pub(super) fn lock(mut dirs: Vec<(u64, &'a RwLock<DirEntry>)>) -> Self {
        dirs.sort_by_key(|(ino, _)| *ino);
        dirs.dedup_by_key(|(ino, _)| *ino);
        let guards = dirs
            .into_iter()
            .map(|(ino, dir)| (ino, dir.write()))
            .collect();
        Self { guards }
    }

    /// Returns the locked directory with inode number `ino`.
    ///
    /// # Panics
    ///
    /// Panics if that directory is not one of the locked ones.
    pub(super) fn get(&mut self, ino: u64) -> &mut DirEntry {
        self.guards
            .iter_mut()
            .find(|(locked_ino, _)| *locked_ino == ino)
            .map(|(_, guard)| &mut **guard)
            .unwrap()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn child(name: &str, ino: u64) -> Child {
        Child {
            name: String::from(name),
            id: NodeId::from_usize(ino as usize),
            ino,
            typ: InodeType::File,
        }
    }

    fn names(dir: &DirEntry, offset: usize) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        dir.visit_entry(offset, 1, &mut names).unwrap();
        names
    }

    #[test]
    fn entries_keep_their_offsets() {
        let mut dir = DirEntry::new(NodeId::from_usize(0), 1);
        dir.append_entry(child("a", 2));
        let b_idx = dir.append_entry(child("b", 3));
        dir.append_entry(child("c", 4));
        assert_eq!(names(&dir, 0), vec![".", "..", "a", "b", "c"]);

        dir.remove_entry(b_idx).unwrap();
        assert!(!dir.contains_entry("b"));
        assert_eq!(names(&dir, 0), vec![".", "..", "a", "c"]);
        // Offset 3 was "b"; resuming there continues with "c".
        assert_eq!(names(&dir, 3), vec!["c"]);
        assert_eq!(dir.num_entries(), 2);
    }

    #[test]
    fn rename_in_place() {
        let mut dir = DirEntry::new(NodeId::from_usize(0), 1);
        let idx = dir.append_entry(child("old", 2));
        dir.append_entry(child("z", 3));

        dir.rename_entry(idx, "new");
        assert!(dir.get_entry("old").is_none());
        let (new_idx, renamed) = dir.get_entry("new").unwrap();
        assert_eq!(new_idx, idx);
        assert_eq!(renamed.ino, 2);
        assert_eq!(names(&dir, 0), vec![".", "..", "new", "z"]);
    }

    #[test]
    fn emptied_directory_is_compacted() {
        let mut dir = DirEntry::new(NodeId::from_usize(0), 1);
        let a = dir.append_entry(child("a", 2));
        let b = dir.append_entry(child("b", 3));
        dir.remove_entry(a);
        dir.remove_entry(b);
        assert!(dir.is_empty_children());

        assert_eq!(dir.append_entry(child("c", 4)), 0);
        assert_eq!(dir.drain().len(), 1);
        assert!(dir.is_empty_children());
    }

    #[test]
    fn visit_counts_consumed_offsets() {
        let mut dir = DirEntry::new(NodeId::from_usize(0), 7);
        dir.append_entry(child("a", 2));

        let mut entries: Vec<(String, u64, InodeType)> = Vec::new();
        assert_eq!(dir.visit_entry(0, 5, &mut entries).unwrap(), 3);
        assert_eq!(entries[0], (String::from("."), 5, InodeType::Dir));
        assert_eq!(entries[1], (String::from(".."), 7, InodeType::Dir));
        assert_eq!(dir.visit_entry(3, 5, &mut entries).unwrap(), 0);

        dir.mark_dead();
        assert_eq!(dir.visit_entry(0, 5, &mut entries).unwrap(), 0);
    }
}
