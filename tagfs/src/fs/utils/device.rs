// SPDX-License-Identifier: MPL-2.0

use crate::prelude::*;

/// A device ID, containing a major device number and a minor device number.
///
/// Special nodes created by `mknod` carry one of these. FIFOs and sockets
/// carry the zero ID.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct DeviceId {
    major: u32,
    minor: u32,
}

impl DeviceId {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    pub const fn major(&self) -> u32 {
        self.major
    }

    pub const fn minor(&self) -> u32 {
        self.minor
    }

    /// Encodes the ID the way glibc's `makedev` does.
    pub const fn as_encoded_u64(&self) -> u64 {
        let major = self.major as u64;
        let minor = self.minor as u64;
        ((major & 0xffff_f000) << 32)
            | ((major & 0x0000_0fff) << 8)
            | ((minor & 0xffff_ff00) << 12)
            | (minor & 0x0000_00ff)
    }
}

/// A resource attached to a volume for its whole lifetime, such as a backing
/// block device or a mapped memory region.
///
/// A volume releases its resources in the reverse order of attachment when it
/// is unmounted.
pub trait AttachedResource: Send + Sync + Debug {
    /// Gets a name for diagnostics.
    fn name(&self) -> &str;

    /// Gives the resource back to its owner.
    fn release(&self);
}
