// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! The `bootdisc-rs` library crate.
//!
//! This is the discovery and dispatch engine of a UEFI boot manager. Given the volumes the firmware exposes, it
//! finds boot loaders on them, classifies what operating system each one starts, keeps the firmware `Boot####`
//! entries and `BootOrder` in shape, and finally decides how a selected entry is handed control.
//!
//! The crate is split the same way the work is split at runtime:
//!
//! - [`volume`]: the catalog of volumes discovered during a scan pass.
//! - [`system::strings`]: the path and string heuristics used by everything else.
//! - [`scan`]: the loader candidate scanner.
//! - [`classify`]: the OS/loader classifier, initrd matching and sub-menus.
//! - [`nvram`]: the `Boot####` codec and the boot order manager.
//! - [`dispatch`]: the per-selection trust and dispatch state machine.
//!
//! [`boot::BootMgr`] ties these together for frontends such as `bootdisc-rs-cli`.
//!
//! Anything that touches firmware does so through two seams, [`system::fs::VolumeFs`] and
//! [`system::variable::VariableStore`], so the engine can be exercised on the host in unit tests and fuzzers.
//!
//! ## MSRV
//!
//! The minimum supported rust version is 1.88.0.

#![cfg_attr(not(any(fuzzing, test, doctest)), no_std)]

/// The primary result type that wraps around [`crate::error::BootError`].
pub type BootResult<T> = Result<T, crate::error::BootError>;

pub mod boot;
pub mod classify;
pub mod config;
pub mod dispatch;
pub mod entry;
pub mod error;
pub mod nvram;
pub mod scan;
pub mod system;
pub mod volume;

extern crate alloc;
