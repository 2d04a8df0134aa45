// SPDX-License-Identifier: MPL-2.0

use crate::prelude::*;

/// A source of the timestamps stamped on nodes.
pub trait Clock: Send + Sync {
    /// Returns the current time as a duration since the Unix epoch.
    fn now(&self) -> Duration;
}

/// The wall clock of the host.
#[cfg(feature = "std")]
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

#[cfg(feature = "std")]
impl SystemClock {
    pub fn new_arc() -> Arc<dyn Clock> {
        Arc::new(SystemClock)
    }
}

#[cfg(feature = "std")]
impl Clock for SystemClock {
    fn now(&self) -> Duration {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
    }
}
