// SPDX-License-Identifier: MPL-2.0

//! Identities of the context that creates nodes.

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Uid(u32);

impl Uid {
    pub const fn new(uid: u32) -> Self {
        Self(uid)
    }

    pub const fn new_root() -> Self {
        Self(0)
    }
}

impl From<u32> for Uid {
    fn from(value: u32) -> Self {
        Self::new(value)
    }
}

impl From<Uid> for u32 {
    fn from(value: Uid) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Gid(u32);

impl Gid {
    pub const fn new(gid: u32) -> Self {
        Self(gid)
    }

    pub const fn new_root() -> Self {
        Self(0)
    }
}

impl From<u32> for Gid {
    fn from(value: u32) -> Self {
        Self::new(value)
    }
}

impl From<Gid> for u32 {
    fn from(value: Gid) -> Self {
        value.0
    }
}

/// The file-system identities of a caller.
///
/// New nodes take their owner from `fsuid` and, unless the parent directory
/// has the set-group-ID bit, their group from `fsgid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Credentials {
    fsuid: Uid,
    fsgid: Gid,
}

impl Credentials {
    pub const fn new(fsuid: Uid, fsgid: Gid) -> Self {
        Self { fsuid, fsgid }
    }

    pub const fn root() -> Self {
        Self::new(Uid::new_root(), Gid::new_root())
    }

    pub const fn fsuid(&self) -> Uid {
        self.fsuid
    }

    pub const fn fsgid(&self) -> Gid {
        self.fsgid
    }
}

impl Default for Credentials {
    fn default() -> Self {
        Self::root()
    }
}
