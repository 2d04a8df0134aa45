// SPDX-License-Identifier: MPL-2.0

#![allow(unused_imports)]

pub(crate) use alloc::{
    boxed::Box,
    collections::BTreeMap,
    format,
    string::{String, ToString},
    sync::{Arc, Weak},
    vec,
    vec::Vec,
};
pub(crate) use core::{any::Any, fmt::Debug, time::Duration};

pub(crate) use bitflags::bitflags;
pub(crate) use log::{debug, error, info, trace, warn};
pub(crate) use spin::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

pub(crate) use crate::{
    cred::{Credentials, Gid, Uid},
    error::{Errno, Error, Result},
    return_errno, return_errno_with_message,
};
