// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! Loader entry builder.

use alloc::{format, rc::Rc, string::String, vec::Vec};
use core::cell::OnceCell;

use crate::{
    classify::{Classification, OsType},
    entry::{DiscoveryKind, EntryTarget, LoaderEntry},
    system::strings::merge_unique_words,
    volume::Volume,
};

/// The volume name that is never shown in titles.
const RECOVERY_HD: &str = "Recovery HD";

/// A builder to configure a [`LoaderEntry`].
///
/// # Example
///
/// ```
/// use bootdisc_rs_core::{
///     entry::builder::LoaderEntryBuilder,
///     volume::{DiskKind, FsType, Volume},
/// };
/// use std::rc::Rc;
///
/// let mut volume = Volume::new(FsType::Fat32, DiskKind::Internal);
/// volume.vol_name = Some("ESP".into());
///
/// let entry = LoaderEntryBuilder::disk(Rc::new(volume), "EFI\\debian\\grubx64.efi")
///     .title("debian")
///     .build();
///
/// assert_eq!(entry.title, "Boot debian from ESP");
/// assert_eq!(entry.loader_path(), Some("\\EFI\\debian\\grubx64.efi"));
/// ```
#[must_use = "Has no effect if the result is unused"]
pub struct LoaderEntryBuilder {
    /// The inner [`LoaderEntry`] that the builder operates on.
    entry: LoaderEntry,

    /// The title given to the builder, if any.
    title: Option<String>,
}

impl LoaderEntryBuilder {
    /// Starts building an entry for a loader on a disk.
    ///
    /// The loader path is given a leading `\` if it lacks one.
    pub fn disk(volume: Rc<Volume>, loader_path: impl Into<String>) -> Self {
        let mut loader_path = loader_path.into();
        if !loader_path.starts_with('\\') {
            loader_path.insert(0, '\\');
        }
        Self::new(EntryTarget::Disk {
            volume,
            loader_path,
        })
    }

    /// Starts building an entry for a firmware `Boot####` variable.
    pub fn firmware(device_path: Vec<u8>, boot_num: u16) -> Self {
        Self::new(EntryTarget::Firmware {
            device_path,
            boot_num,
        })
        .discovery(DiscoveryKind::Firmware)
    }

    /// Creates a builder around a target.
    fn new(target: EntryTarget) -> Self {
        Self {
            entry: LoaderEntry {
                title: String::new(),
                short_title: String::new(),
                target,
                os_type: OsType::Unknown,
                options: String::new(),
                initrd: None,
                discovery: DiscoveryKind::Auto,
                graphics: false,
                hints: String::new(),
                shortcut: None,
                folded: Vec::new(),
                submenu: OnceCell::new(),
            },
            title: None,
        }
    }

    /// Sets the title of the entry, without the volume.
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Applies the result of classifying the loader.
    pub fn classification(mut self, classification: Classification) -> Self {
        self.entry.os_type = classification.os_type;
        self.entry.hints = classification.hints;
        self.entry.shortcut = classification.shortcut;
        self.entry.graphics = classification.graphics;
        self.entry.options = classification.options;
        self.entry.initrd = classification.initrd;
        self
    }

    /// Sets the OS type of the entry.
    pub const fn os_type(mut self, os_type: OsType) -> Self {
        self.entry.os_type = os_type;
        self
    }

    /// Sets the load options of the entry.
    pub fn options(mut self, options: impl Into<String>) -> Self {
        self.entry.options = options.into();
        self
    }

    /// Sets how the entry was found.
    pub const fn discovery(mut self, discovery: DiscoveryKind) -> Self {
        self.entry.discovery = discovery;
        self
    }

    /// Sets the icon hints of the entry.
    pub fn hints(mut self, hints: impl Into<String>) -> Self {
        self.entry.hints = hints.into();
        self
    }

    /// Builds the [`LoaderEntry`].
    ///
    /// Disk entries are titled `Boot <title> from <volume>`. Firmware entries are titled `Reboot to <label>`, or
    /// `Unknown` without a label. The title only depends on the given title, the loader path and the volume names.
    #[must_use = "Has no effect if the result is unused"]
    pub fn build(mut self) -> LoaderEntry {
        match &self.entry.target {
            EntryTarget::Disk {
                volume,
                loader_path,
            } => {
                let short = self.title.unwrap_or_else(|| loader_path.clone());
                self.entry.title = match volume.vol_name.as_deref() {
                    Some(name) if !name.eq_ignore_ascii_case(RECOVERY_HD) => {
                        format!("Boot {short} from {name}")
                    }
                    _ => format!("Boot {short} "),
                };
                self.entry.short_title = short;
            }
            EntryTarget::Firmware { .. } => {
                self.entry.title = self
                    .title
                    .as_ref()
                    .map_or_else(|| "Unknown".into(), |label| format!("Reboot to {label}"));
                let label = self.title.unwrap_or_else(|| "Unknown".into());
                if self.entry.hints.is_empty() {
                    merge_unique_words(&mut self.entry.hints, &self.entry.title);
                    merge_unique_words(&mut self.entry.hints, "unknown");
                }
                self.entry.short_title = label;
            }
        }
        self.entry
    }
}
