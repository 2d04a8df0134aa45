// SPDX-License-Identifier: MPL-2.0

//! Collaborators that own the bytes behind regular files and symlinks.
//!
//! The file system never interprets the bytes. It only binds a handle to a
//! node at allocation time and gives it back when the node is released.

use core::sync::atomic::{AtomicU64, Ordering};

use hashbrown::HashMap;

use crate::prelude::*;

/// An opaque reference to the content of one regular file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHandle(u64);

impl ContentHandle {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

/// An opaque reference to a stored symlink target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinkHandle(u64);

impl LinkHandle {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

/// The content cache of regular files.
pub trait PageStore: Send + Sync {
    /// Creates an empty content object.
    fn create(&self) -> Result<ContentHandle>;

    /// Reads bytes at `offset` into `buf`, returning the number of bytes read.
    ///
    /// Bytes that were never written read as zeros.
    fn read_at(&self, handle: ContentHandle, offset: usize, buf: &mut [u8]) -> Result<usize>;

    /// Writes `buf` at `offset`, growing the content as needed.
    fn write_at(&self, handle: ContentHandle, offset: usize, buf: &[u8]) -> Result<usize>;

    /// Truncates or zero-extends the content to `new_size` bytes.
    fn resize(&self, handle: ContentHandle, new_size: usize) -> Result<()>;

    /// Drops the content. The handle must not be used afterwards.
    fn release(&self, handle: ContentHandle);
}

/// The store of symlink targets.
pub trait LinkStore: Send + Sync {
    /// Stores `target` and returns a handle to read it back.
    fn store(&self, target: &str) -> Result<LinkHandle>;

    /// Returns the target exactly as it was stored.
    fn load(&self, handle: LinkHandle) -> Result<String>;

    /// Drops the stored target. The handle must not be used afterwards.
    fn release(&self, handle: LinkHandle);
}

/// A `PageStore` that keeps every file in a growable buffer.
pub struct MemPageStore {
    files: Mutex<HashMap<ContentHandle, Vec<u8>>>,
    next_handle: AtomicU64,
    max_file_size: usize,
}

impl MemPageStore {
    /// The largest file this store accepts.
    pub const DEFAULT_MAX_FILE_SIZE: usize = isize::MAX as usize;

    pub fn new() -> Self {
        Self::with_max_file_size(Self::DEFAULT_MAX_FILE_SIZE)
    }

    pub fn with_max_file_size(max_file_size: usize) -> Self {
        Self {
            files: Mutex::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
            max_file_size,
        }
    }

    /// Returns the number of live content objects.
    pub fn len(&self) -> usize {
        self.files.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_size(&self, size: Option<usize>) -> Result<usize> {
        match size {
            Some(size) if size <= self.max_file_size => Ok(size),
            _ => Err(Error::with_message(Errno::EFBIG, "file exceeds the size limit")),
        }
    }
}

impl Default for MemPageStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for MemPageStore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MemPageStore")
            .field("files", &self.len())
            .field("max_file_size", &self.max_file_size)
            .finish()
    }
}

impl PageStore for MemPageStore {
    fn create(&self) -> Result<ContentHandle> {
        let handle = ContentHandle::new(self.next_handle.fetch_add(1, Ordering::Relaxed));
        self.files.lock().insert(handle, Vec::new());
        Ok(handle)
    }

    fn read_at(&self, handle: ContentHandle, offset: usize, buf: &mut [u8]) -> Result<usize> {
        let files = self.files.lock();
        let data = files
            .get(&handle)
            .ok_or(Error::with_message(Errno::EIO, "stale content handle"))?;
        if offset >= data.len() {
            return Ok(0);
        }
        let read_len = buf.len().min(data.len() - offset);
        buf[..read_len].copy_from_slice(&data[offset..offset + read_len]);
        Ok(read_len)
    }

    fn write_at(&self, handle: ContentHandle, offset: usize, buf: &[u8]) -> Result<usize> {
        let end = self.check_size(offset.checked_add(buf.len()))?;
        if buf.is_empty() {
            return Ok(0);
        }
        let mut files = self.files.lock();
        let data = files
            .get_mut(&handle)
            .ok_or(Error::with_message(Errno::EIO, "stale content handle"))?;
        if end > data.len() {
            grow(data, end)?;
        }
        data[offset..end].copy_from_slice(buf);
        Ok(buf.len())
    }

    fn resize(&self, handle: ContentHandle, new_size: usize) -> Result<()> {
        let new_size = self.check_size(Some(new_size))?;
        let mut files = self.files.lock();
        let data = files
            .get_mut(&handle)
            .ok_or(Error::with_message(Errno::EIO, "stale content handle"))?;
        if new_size > data.len() {
            grow(data, new_size)?;
        } else {
            data.truncate(new_size);
        }
        Ok(())
    }

    fn release(&self, handle: ContentHandle) {
        let removed = self.files.lock().remove(&handle);
        debug_assert!(removed.is_some());
    }
}

/// Zero-extends `data` to `new_len` bytes without aborting on allocation
/// failure.
fn grow(data: &mut Vec<u8>, new_len: usize) -> Result<()> {
    data.try_reserve(new_len - data.len())
        .map_err(|_| Error::with_message(Errno::ENOMEM, "cannot grow the file"))?;
    data.resize(new_len, 0);
    Ok(())
}

/// A `LinkStore` keeping targets in a map.
///
/// Like a page-backed symlink, a target (plus its terminating NUL) must fit
/// in one block.
pub struct MemLinkStore {
    targets: Mutex<HashMap<LinkHandle, String>>,
    next_handle: AtomicU64,
}

impl MemLinkStore {
    pub const MAX_TARGET_LEN: usize = crate::fs::tagfs::BLOCK_SIZE - 1;

    pub fn new() -> Self {
        Self {
            targets: Mutex::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
        }
    }

    pub fn len(&self) -> usize {
        self.targets.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemLinkStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for MemLinkStore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MemLinkStore")
            .field("targets", &self.len())
            .finish()
    }
}

impl LinkStore for MemLinkStore {
    fn store(&self, target: &str) -> Result<LinkHandle> {
        if target.len() > Self::MAX_TARGET_LEN {
            return_errno_with_message!(Errno::ENAMETOOLONG, "symlink target is too long");
        }
        let handle = LinkHandle::new(self.next_handle.fetch_add(1, Ordering::Relaxed));
        self.targets.lock().insert(handle, String::from(target));
        Ok(handle)
    }

    fn load(&self, handle: LinkHandle) -> Result<String> {
        self.targets
            .lock()
            .get(&handle)
            .cloned()
            .ok_or(Error::with_message(Errno::EIO, "stale link handle"))
    }

    fn release(&self, handle: LinkHandle) {
        let removed = self.targets.lock().remove(&handle);
        debug_assert!(removed.is_some());
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn page_store_zero_fills_holes() {
        let store = MemPageStore::new();
        let handle = store.create().unwrap();
        assert_eq!(store.write_at(handle, 4, b"abcd").unwrap(), 4);

        let mut buf = [0xffu8; 16];
        assert_eq!(store.read_at(handle, 0, &mut buf).unwrap(), 8);
        assert_eq!(&buf[..8], b"\0\0\0\0abcd");

        store.resize(handle, 2).unwrap();
        assert_eq!(store.read_at(handle, 0, &mut buf).unwrap(), 2);
        assert_eq!(store.read_at(handle, 10, &mut buf).unwrap(), 0);

        store.release(handle);
        assert!(store.is_empty());
        assert!(store.read_at(handle, 0, &mut buf).is_err());
    }

    #[test]
    fn page_store_size_limit() {
        let store = MemPageStore::with_max_file_size(8);
        let handle = store.create().unwrap();
        assert_eq!(
            store.write_at(handle, 6, b"xyz").unwrap_err().error(),
            Errno::EFBIG
        );
        assert_eq!(store.resize(handle, 9).unwrap_err().error(), Errno::EFBIG);
        assert!(store.write_at(handle, 5, b"xyz").is_ok());
    }

    #[test]
    fn huge_offset_fails_without_aborting() {
        let store = MemPageStore::new();
        let handle = store.create().unwrap();
        let offset = isize::MAX as usize - 16;
        assert_eq!(
            store.write_at(handle, offset, b"x").unwrap_err().error(),
            Errno::ENOMEM
        );
        assert_eq!(store.resize(handle, offset).unwrap_err().error(), Errno::ENOMEM);

        // The content is left as it was.
        let mut buf = [0u8; 4];
        assert_eq!(store.read_at(handle, 0, &mut buf).unwrap(), 0);
        assert!(store.write_at(handle, 0, b"ok").is_ok());
    }

    #[test]
    fn link_store_returns_target_unmodified() {
        let store = MemLinkStore::new();
        let handle = store.store("../a b/./c").unwrap();
        assert_eq!(store.load(handle).unwrap(), "../a b/./c");
        store.release(handle);
        assert!(store.is_empty());

        let long = "x".repeat(MemLinkStore::MAX_TARGET_LEN + 1);
        assert_eq!(
            store.store(&long).unwrap_err().error(),
            Errno::ENAMETOOLONG
        );
    }
}
