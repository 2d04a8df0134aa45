// SPDX-License-Identifier: MPL-2.0

//! Mount options of a TagFS volume.

use super::TAGFS_DEFAULT_MODE;
use crate::{fs::utils::InodeMode, prelude::*};

/// The option record of a mounted volume.
///
/// The record is shared between the mount path, which parses options into it,
/// and `show_options`, which renders it back.
#[derive(Debug)]
pub struct MountConfig {
    inner: Mutex<MountOptions>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct MountOptions {
    mode: InodeMode,
    source: Option<String>,
}

impl Default for MountOptions {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            source: None,
        }
    }
}

/// Returns the permission bits of the root when no `mode` option is given.
pub const fn default_mode() -> InodeMode {
    InodeMode::from_bits_truncate(TAGFS_DEFAULT_MODE)
}

impl Default for MountConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl MountConfig {
    /// Creates a record holding the defaults.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MountOptions::default()),
        }
    }

    /// Parses a comma-separated list of `key=value` (or bare `key`) options.
    ///
    /// Empty items such as the one in `"mode=700,,"` are skipped.
    pub fn parse(args: &str) -> Result<Self> {
        let config = Self::new();
        for option in args.split(',').filter(|option| !option.is_empty()) {
            let mut kv = option.splitn(2, '=');
            let key = kv.next().unwrap_or_default();
            config.parse_option(key, kv.next())?;
        }
        Ok(config)
    }

    /// Applies one option to the record.
    ///
    /// Keys other than `mode` and `source` are accepted and ignored.
    pub fn parse_option(&self, key: &str, value: Option<&str>) -> Result<()> {
        match key {
            "mode" => {
                let value =
                    value.ok_or(Error::with_message(Errno::EINVAL, "mode needs a value"))?;
                let mode = u32::from_str_radix(value, 8)?;
                self.inner.lock().mode = InodeMode::from_bits_truncate((mode & 0o7777) as u16);
            }
            "source" => {
                self.inner.lock().source = value.map(String::from);
            }
            _ => {
                debug!("[tagfs] ignore unknown mount option: {}", key);
            }
        }
        Ok(())
    }

    /// Renders the options that differ from the defaults, as `/proc/mounts`
    /// shows them.
    pub fn render(&self) -> String {
        let mode = self.inner.lock().mode;
        if mode != default_mode() {
            format!(",mode={:o}", mode.bits())
        } else {
            String::new()
        }
    }

    /// Returns the mode given to the root directory.
    pub fn mode(&self) -> InodeMode {
        self.inner.lock().mode
    }

    /// Returns the recorded `source`, if any.
    pub fn source(&self) -> Option<String> {
        self.inner.lock().source.clone()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn mode_is_octal_and_masked() {
        let config = MountConfig::parse("mode=0750").unwrap();
        assert_eq!(config.mode().bits(), 0o750);

        let config = MountConfig::parse("mode=177777").unwrap();
        assert_eq!(config.mode().bits(), 0o7777);

        for bad in ["mode=8", "mode=", "mode=abc", "mode"] {
            assert_eq!(
                MountConfig::parse(bad).unwrap_err().error(),
                Errno::EINVAL,
                "{bad}"
            );
        }
    }

    #[test]
    fn unknown_options_are_ignored() {
        let config = MountConfig::parse("size=10m,nr_inodes=5,,mode=700,noatime").unwrap();
        assert_eq!(config.mode().bits(), 0o700);
        assert_eq!(config.source(), None);

        let config = MountConfig::parse("source=none").unwrap();
        assert_eq!(config.source().as_deref(), Some("none"));
    }

    #[test]
    fn render_only_non_default_mode() {
        assert_eq!(MountConfig::new().render(), "");
        assert_eq!(MountConfig::parse("mode=755").unwrap().render(), "");
        assert_eq!(MountConfig::parse("mode=1777").unwrap().render(), ",mode=1777");
        assert_eq!(MountConfig::parse("mode=0").unwrap().render(), ",mode=0");
    }
}
