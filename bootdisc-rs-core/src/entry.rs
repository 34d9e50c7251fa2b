// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! Menu-ready boot entries.
//!
//! A [`LoaderEntry`] is either found on a disk, in which case it knows its volume and loader path, or comes from
//! a firmware `Boot####` variable, in which case it knows the device path and boot number. [`EntryTarget`] makes
//! it impossible to have both, or neither.
//!
//! Entries live for one menu session and are rebuilt from scratch on every rescan.

use alloc::{rc::Rc, string::String, vec::Vec};
use core::cell::OnceCell;

use crate::{
    classify::{OsType, submenu},
    config::BootConfig,
    system::fs::VolumeFs,
    volume::Volume,
};

pub mod builder;

/// How an entry was found.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DiscoveryKind {
    /// Found by scanning a volume.
    #[default]
    Auto,

    /// Described by a manual stanza.
    Manual,

    /// Read from a firmware `Boot####` variable.
    Firmware,
}

/// What an entry starts.
#[derive(Clone, Debug)]
pub enum EntryTarget {
    /// A loader on a disk.
    Disk {
        /// The volume the loader is on.
        volume: Rc<Volume>,

        /// The volume relative path of the loader. It always starts with `\`.
        loader_path: String,
    },

    /// A firmware boot entry.
    Firmware {
        /// The raw device path of the firmware entry.
        device_path: Vec<u8>,

        /// The number of the `Boot####` variable.
        boot_num: u16,
    },
}

/// One variant of an entry in its sub-menu.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubEntry {
    /// The title shown in the sub-menu.
    pub title: String,

    /// The loader started by the variant, on the same volume as the entry.
    pub loader_path: String,

    /// The load options of the variant.
    pub options: String,

    /// If the variant is started in graphics mode.
    pub graphics: bool,
}

/// A classified boot option that can be shown in the menu.
#[derive(Clone, Debug)]
pub struct LoaderEntry {
    /// The title shown in the menu.
    pub title: String,

    /// The bare title the entry was created with, without the volume.
    pub short_title: String,

    /// What the entry starts.
    pub target: EntryTarget,

    /// What the loader is.
    pub os_type: OsType,

    /// The load options passed to the loader.
    pub options: String,

    /// The initrd found for a Linux kernel.
    pub initrd: Option<String>,

    /// How the entry was found.
    pub discovery: DiscoveryKind,

    /// If the loader is started in graphics mode.
    pub graphics: bool,

    /// A comma-delimited list of icon hints.
    pub hints: String,

    /// The shortcut key of the entry.
    pub shortcut: Option<char>,

    /// Kernels from the same directory that were folded into this entry.
    pub folded: Vec<String>,

    /// The sub-menu, built the first time it is asked for.
    submenu: OnceCell<Vec<SubEntry>>,
}

impl LoaderEntry {
    /// Returns the volume of a disk entry.
    #[must_use = "Has no effect if the result is unused"]
    pub fn volume(&self) -> Option<&Rc<Volume>> {
        match &self.target {
            EntryTarget::Disk { volume, .. } => Some(volume),
            EntryTarget::Firmware { .. } => None,
        }
    }

    /// Returns the loader path of a disk entry.
    #[must_use = "Has no effect if the result is unused"]
    pub fn loader_path(&self) -> Option<&str> {
        match &self.target {
            EntryTarget::Disk { loader_path, .. } => Some(loader_path),
            EntryTarget::Firmware { .. } => None,
        }
    }

    /// Returns the boot number of a firmware entry.
    #[must_use = "Has no effect if the result is unused"]
    pub const fn boot_num(&self) -> Option<u16> {
        match &self.target {
            EntryTarget::Firmware { boot_num, .. } => Some(*boot_num),
            EntryTarget::Disk { .. } => None,
        }
    }

    /// Returns the sub-menu of the entry, building it on first use.
    ///
    /// `fs` must be the filesystem of the entry's volume. Firmware entries have an empty sub-menu.
    pub fn submenu(&self, fs: &mut (impl VolumeFs + ?Sized), config: &BootConfig) -> &[SubEntry] {
        self.submenu
            .get_or_init(|| submenu::build_submenu(fs, self, config))
    }

    /// Checks if the sub-menu has been built yet.
    #[must_use = "Has no effect if the result is unused"]
    pub fn submenu_built(&self) -> bool {
        self.submenu.get().is_some()
    }

    /// Folds another kernel into the sub-menu of this entry.
    ///
    /// This invalidates a sub-menu that was already built.
    pub fn fold_kernel(&mut self, loader_path: impl Into<String>) {
        self.folded.push(loader_path.into());
        self.submenu = OnceCell::new();
    }
}
