// SPDX-License-Identifier: MPL-2.0

//! The table of file system types a host can mount.
//!
//! The registry is an ordinary object owned by the host. File system modules
//! add their type in their `init` routine and remove it in their `exit`
//! routine, e.g., [`crate::fs::tagfs::init`].

use alloc::borrow::ToOwned;

use crate::{
    fs::utils::{AttachedResource, FileSystem},
    prelude::*,
};

/// A type of file system.
pub trait FsType: Send + Sync + 'static {
    /// Gets the name of this FS type such as `"tagfs"`.
    fn name(&self) -> &'static str;

    /// Gets the properties of this FS type.
    fn properties(&self) -> FsProperties;

    /// Creates an instance of this FS type.
    ///
    /// `args` is the comma-separated option string given to `mount`.
    /// The optional `disk` argument must be provided
    /// if `self.properties()` contains `FsProperties::NEED_DISK`.
    fn create(
        &self,
        args: Option<&str>,
        disk: Option<Arc<dyn AttachedResource>>,
        ctx: &Credentials,
    ) -> Result<Arc<dyn FileSystem>>;
}

bitflags! {
    /// The properties common to all FS instances.
    pub struct FsProperties: u32 {
        /// Whether a FS needs to be backed by a disk.
        ///
        /// A volatile FS such as TagFS does not, though it may still be
        /// given one.
        const NEED_DISK = 1 << 1;
    }
}

/// A name-to-type table of file systems.
pub struct FsRegistry {
    fs_table: Mutex<BTreeMap<String, Arc<dyn FsType>>>,
}

impl Debug for FsRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let fs_table = self.fs_table.lock();
        f.debug_struct("FsRegistry")
            .field("fs_types", &fs_table.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for FsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FsRegistry {
    pub fn new() -> Self {
        Self {
            fs_table: Mutex::new(BTreeMap::new()),
        }
    }

    /// Registers a new FS type.
    pub fn register(&self, new_type: Arc<dyn FsType>) -> Result<()> {
        let mut fs_table = self.fs_table.lock();
        if fs_table.contains_key(new_type.name()) {
            return_errno_with_message!(Errno::EEXIST, "File system type already registered");
        }

        info!("[tagfs] register file system type: {}", new_type.name());
        fs_table.insert(new_type.name().to_owned(), new_type);
        Ok(())
    }

    /// Unregisters a FS type.
    pub fn unregister(&self, name: &str) -> Result<Arc<dyn FsType>> {
        let removed = self
            .fs_table
            .lock()
            .remove(name)
            .ok_or(Error::with_message(Errno::ENOENT, "File system type not registered"))?;

        info!("[tagfs] unregister file system type: {}", name);
        Ok(removed)
    }

    /// Looks up a FS type.
    pub fn look_up(&self, name: &str) -> Option<Arc<dyn FsType>> {
        self.fs_table.lock().get(name).cloned()
    }

    /// Executes a user-provided operation with an iterator that can access each
    /// and every FS type.
    pub fn with_iter<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut dyn Iterator<Item = (&String, &Arc<dyn FsType>)>) -> R,
    {
        let guard = self.fs_table.lock();
        let mut iter = guard.iter();

        f(&mut iter)
    }

    /// Creates an instance of the FS type registered under `name`.
    pub fn mount(
        &self,
        name: &str,
        args: Option<&str>,
        disk: Option<Arc<dyn AttachedResource>>,
        ctx: &Credentials,
    ) -> Result<Arc<dyn FileSystem>> {
        let fs_type = self
            .look_up(name)
            .ok_or(Error::with_message(Errno::ENODEV, "unknown file system type"))?;
        if fs_type.properties().contains(FsProperties::NEED_DISK) && disk.is_none() {
            return_errno_with_message!(Errno::EINVAL, "the file system needs a disk");
        }

        fs_type.create(args, disk, ctx)
    }
}
