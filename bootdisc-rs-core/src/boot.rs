// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! Provides [`BootMgr`], a struct which abstracts most of discovering and dispatching loaders.

use alloc::vec::Vec;
use core::convert::Infallible;

use log::{info, warn};

use crate::{
    BootResult,
    config::{BootConfig, ScanTargets, config_override},
    dispatch::{DispatchError, Dispatcher, platform::UefiPlatform},
    entry::{LoaderEntry, SubEntry},
    nvram::firmware::firmware_entries,
    scan::{ScanContext, ScanReport, scan_config, scan_volumes},
    system::{
        fs::UefiFileSystem,
        strings::{comma_items, contains_ignore_case},
        variable::{RuntimeVariableStore, previous_boot},
    },
    volume::{SelfLocation, VolumeCatalog, enumerate::enumerate_volumes},
};

/// The discovered entries and everything needed to rebuild and dispatch them.
pub struct BootMgr {
    /// The configuration of the boot manager.
    pub config: BootConfig,

    /// Where the boot manager was loaded from.
    location: SelfLocation,

    /// The volumes found by the last scan.
    catalog: VolumeCatalog,

    /// The entries found by the last scan.
    entries: Vec<LoaderEntry>,

    /// The failures of the last scan.
    report: ScanReport,
}

impl BootMgr {
    /// Creates a new [`BootMgr`], loads the configuration, then scans for entries.
    ///
    /// `load_options` are the load options of the boot manager itself. `-c <filename>` in them selects the
    /// configuration file.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the boot manager's own volume could not be opened, or the volumes could not be
    /// enumerated.
    pub fn new(load_options: &str) -> BootResult<Self> {
        let location = SelfLocation::current()?;
        let mut fs = UefiFileSystem::from_image_fs()?;
        let config = BootConfig::load(&mut fs, location.dir(), config_override(load_options));
        if let Some(level) = config.log_level {
            log::set_max_level(level);
        }

        let mut mgr = Self {
            config,
            location,
            catalog: VolumeCatalog::default(),
            entries: Vec::new(),
            report: ScanReport::default(),
        };
        mgr.rescan()?;
        Ok(mgr)
    }

    /// Discards every volume and entry, then scans again.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the volumes could not be enumerated. Failures while scanning single volumes are
    /// kept in [`Self::report`] instead.
    pub fn rescan(&mut self) -> BootResult<()> {
        self.entries.clear();
        self.catalog = enumerate_volumes()?;

        let config = scan_config(&mut RuntimeVariableStore, &self.config);
        let ctx = ScanContext::new(&config, Some(&self.location));
        let (mut entries, report) = scan_volumes(&self.catalog, &ctx, |x| x.open_fs());

        if self.config.scan_for.contains(ScanTargets::FIRMWARE) {
            match firmware_entries(&mut RuntimeVariableStore, &self.config) {
                Ok(firmware) => entries.extend(firmware),
                Err(e) => warn!("Failed to read the firmware boot entries: {e}"),
            }
        }

        if let Some(status) = report.errors().first().map(|x| x.status()) {
            warn!("Scan finished with errors, first status {status:?}");
        }
        info!(
            "Found {} entries on {} volumes",
            entries.len(),
            self.catalog.volumes().len()
        );

        self.entries = entries;
        self.report = report;
        Ok(())
    }

    /// Returns the entries found by the last scan.
    #[must_use = "Has no effect if the result is unused"]
    pub fn list(&self) -> &[LoaderEntry] {
        &self.entries
    }

    /// Returns the volumes found by the last scan.
    #[must_use = "Has no effect if the result is unused"]
    pub const fn catalog(&self) -> &VolumeCatalog {
        &self.catalog
    }

    /// Returns the failures of the last scan.
    #[must_use = "Has no effect if the result is unused"]
    pub const fn report(&self) -> &ScanReport {
        &self.report
    }

    /// Gets the default entry.
    ///
    /// The items of `default_selection` are tried in order. If none matches an entry, 0 is returned.
    #[must_use = "Has no effect if the result is unused"]
    pub fn get_default(&self) -> usize {
        let previous = if self.config.ignore_previous_boot {
            None
        } else {
            previous_boot(&mut RuntimeVariableStore).ok().flatten()
        };
        default_entry(&self.entries, &self.config.default_selection, previous.as_deref())
    }

    /// Returns the sub-menu of an entry, building it on first use.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the entry's volume could not be opened.
    pub fn submenu(&self, selected: usize) -> BootResult<&[SubEntry]> {
        let Some(entry) = self.entries.get(selected) else {
            return Ok(&[]);
        };
        let Some(volume) = entry.volume() else {
            return Ok(&[]);
        };
        let mut fs = volume.open_fs()?;
        Ok(entry.submenu(&mut fs, &self.config))
    }

    /// Dispatches an entry, optionally through one of its sub-menu variants.
    ///
    /// This only returns if the entry could not be started. The menu should then be shown again.
    ///
    /// # Errors
    ///
    /// Always returns an `Error` when it returns.
    pub fn boot(&self, selected: usize, variant: Option<usize>) -> BootResult<Infallible> {
        let Some(entry) = self.entries.get(selected) else {
            return Err(DispatchError::NoSuchEntry(selected).into());
        };
        let variant = match variant {
            Some(index) => self.submenu(selected)?.get(index),
            None => None,
        };

        let mut platform = UefiPlatform::new();
        Dispatcher::new(&self.config, &mut platform).run(entry, variant)
    }
}

/// Finds the entry selected by a `default_selection` list.
///
/// `+` selects the previously booted entry by exact title. Any other item selects the first entry whose title or
/// loader path contains it, ignoring case.
#[must_use = "Has no effect if the result is unused"]
pub fn default_entry(entries: &[LoaderEntry], selection: &str, previous: Option<&str>) -> usize {
    comma_items(selection)
        .find_map(|item| {
            if item == "+" {
                previous.and_then(|previous| entries.iter().position(|x| x.title == previous))
            } else {
                entries.iter().position(|x| {
                    contains_ignore_case(&x.title, item)
                        || x.loader_path().is_some_and(|path| contains_ignore_case(path, item))
                })
            }
        })
        .unwrap_or(0)
}
