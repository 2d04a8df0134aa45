// SPDX-License-Identifier: MPL-2.0

pub mod registry;
pub mod tagfs;
pub mod utils;
