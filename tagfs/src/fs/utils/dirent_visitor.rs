// SPDX-License-Identifier: MPL-2.0

use super::InodeType;
use crate::prelude::*;

/// A visitor for dir entries.
pub trait DirentVisitor {
    /// Visit a dir entry.
    ///
    /// If the visitor succeeds in visiting the given inode, an `Ok(())` is returned;
    /// Otherwise, an error is returned. Different implementations for `DirentVisitor`
    /// may choose to report errors for different reasons. Regardless of the exact
    /// errors and reasons, `readdir`-family methods shall stop feeding the visitor
    /// with the next inode as long as an error is returned by the visitor.
    fn visit(&mut self, name: &str, ino: u64, type_: InodeType, offset: usize) -> Result<()>;
}

/// Collects the names, which is handy for tests and diagnostics.
impl DirentVisitor for Vec<String> {
    fn visit(&mut self, name: &str, _ino: u64, _type: InodeType, _offset: usize) -> Result<()> {
        self.push(name.into());
        Ok(())
    }
}

/// Collects `(name, ino, type)` triples.
impl DirentVisitor for Vec<(String, u64, InodeType)> {
    fn visit(&mut self, name: &str, ino: u64, type_: InodeType, _offset: usize) -> Result<()> {
        self.push((name.into(), ino, type_));
        Ok(())
    }
}
