// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! The loader candidate scanner.
//!
//! Every volume is scanned in the same order:
//!
//! 1. The macOS loader.
//! 2. The Microsoft loaders, which get fixed titles.
//! 3. The root directory.
//! 4. Every directory directly under `EFI`, except `tools` and hidden ones.
//! 5. The directories of `also_scan_dirs`.
//! 6. The removable media loader, unless it is a copy of something already found.
//!
//! Within a directory, Linux kernels after the newest one are folded into its sub-menu instead of getting their
//! own entries.
//!
//! A failing directory never stops a scan. Failures are collected in a [`ScanReport`] and scanning moves on to the
//! next directory or volume.

use alloc::{
    rc::Rc,
    string::{String, ToString},
    vec::Vec,
};
use log::{debug, warn};
use thiserror::Error;
use uefi::Status;

use crate::{
    BootResult,
    classify::{MACOS_LOADER_PATH, REFIND_CONFIGS, classify_loader, is_linux_kernel},
    config::BootConfig,
    entry::{LoaderEntry, builder::LoaderEntryBuilder},
    error::BootError,
    scan::{
        candidate::{Candidate, scan_directory},
        duplicate::is_duplicate_of_any,
        filter::{
            disk_kind_scanned, file_excluded, is_valid_loader, should_scan_dir, should_scan_volume,
        },
    },
    system::{
        fs::{FsError, VolumeFs},
        helper::Arch,
        strings::{
            basename, clean_path, comma_items, join_path, parent_dir, paths_equal,
            split_volume_and_path,
        },
        variable::{HIDDEN_TAGS, HIDDEN_TOOLS, VariableStore, merge_hidden_list},
    },
    volume::{SelfLocation, Volume, VolumeCatalog},
};

pub mod candidate;
pub mod duplicate;
pub mod filter;

/// The directory of the Microsoft loaders.
const MICROSOFT_DIR: &str = "\\EFI\\Microsoft\\Boot";

/// A directory under `EFI` that holds tools rather than loaders.
const TOOLS_DIR: &str = "tools";

/// An error that may result from scanning for loaders.
#[derive(Error, Debug)]
pub enum ScanError {
    /// A directory could not be read, or reading it ended badly.
    #[error("Could not scan \"{path}\" on {volume}: {status}")]
    Directory {
        /// The name of the volume.
        volume: String,
        /// The directory.
        path: String,
        /// The status the firmware reported.
        status: Status,
    },

    /// A volume could not be opened.
    #[error("Could not open volume {volume}: {status}")]
    Volume {
        /// The name of the volume.
        volume: String,
        /// The status the firmware reported.
        status: Status,
    },
}

impl ScanError {
    /// Returns the firmware status of the error.
    #[must_use = "Has no effect if the result is unused"]
    pub const fn status(&self) -> Status {
        match self {
            Self::Directory { status, .. } | Self::Volume { status, .. } => *status,
        }
    }
}

/// The failures collected during a scan.
#[derive(Debug, Default)]
pub struct ScanReport {
    /// The most severe status seen so far.
    worst: Option<Status>,

    /// Every failure, in the order they happened.
    errors: Vec<ScanError>,
}

impl ScanReport {
    /// Records a failure and keeps going.
    ///
    /// An error status replaces a warning as the worst status. Between two errors the first one stays.
    pub fn record(&mut self, error: ScanError) {
        warn!("{error}");
        let status = error.status();
        if self
            .worst
            .is_none_or(|worst| !worst.is_error() && status.is_error())
        {
            self.worst = Some(status);
        }
        self.errors.push(error);
    }

    /// Returns the most severe status seen, or `SUCCESS` if nothing failed.
    #[must_use = "Has no effect if the result is unused"]
    pub fn worst_status(&self) -> Status {
        self.worst.unwrap_or(Status::SUCCESS)
    }

    /// Returns every failure recorded.
    #[must_use = "Has no effect if the result is unused"]
    pub fn errors(&self) -> &[ScanError] {
        &self.errors
    }
}

/// Everything a scan needs to know besides the volume itself.
#[derive(Clone, Copy, Debug)]
pub struct ScanContext<'a> {
    /// The configuration of the boot manager.
    pub config: &'a BootConfig,

    /// Where the boot manager itself was loaded from, so that it does not list itself.
    pub location: Option<&'a SelfLocation>,

    /// The path of the removable media loader for the running architecture.
    pub fallback_path: Option<&'static str>,
}

impl<'a> ScanContext<'a> {
    /// Creates a context for the running architecture.
    #[must_use = "Has no effect if the result is unused"]
    pub fn new(config: &'a BootConfig, location: Option<&'a SelfLocation>) -> Self {
        Self {
            config,
            location,
            fallback_path: Arch::current().map(Arch::fallback_path),
        }
    }

    /// Checks if a path on a volume is the running boot manager.
    fn is_self(&self, volume: &Volume, path: &str) -> bool {
        self.location
            .is_some_and(|x| x.is_on(volume) && paths_equal(&x.loader_path, path))
    }
}

/// Builds the comma-delimited list of files that are not added.
///
/// This is `dont_scan_files` together with the loaders hidden from the menu.
///
/// # Errors
///
/// May return an `Error` if the hidden list could not be read.
pub fn hidden_tags_deny_list(
    store: &mut (impl VariableStore + ?Sized),
    config: &BootConfig,
) -> BootResult<String> {
    let mut list = config.dont_scan_files.clone();
    merge_hidden_list(store, HIDDEN_TAGS, &mut list)?;
    Ok(list)
}

/// Builds the comma-delimited list of tools that are not added.
///
/// This is `dont_scan_tools` together with the tools hidden from the menu.
///
/// # Errors
///
/// May return an `Error` if the hidden list could not be read.
pub fn hidden_tools_deny_list(
    store: &mut (impl VariableStore + ?Sized),
    config: &BootConfig,
) -> BootResult<String> {
    let mut list = config.dont_scan_tools.clone();
    merge_hidden_list(store, HIDDEN_TOOLS, &mut list)?;
    Ok(list)
}

/// Returns the configuration a scan runs with, where the deny lists also hold what the user hid.
///
/// A hidden list that cannot be read is left out.
#[must_use = "Has no effect if the result is unused"]
pub fn scan_config(store: &mut (impl VariableStore + ?Sized), config: &BootConfig) -> BootConfig {
    let mut scan_config = config.clone();
    match hidden_tags_deny_list(store, config) {
        Ok(list) => scan_config.dont_scan_files = list,
        Err(e) => warn!("Failed to read the hidden loaders: {e}"),
    }
    match hidden_tools_deny_list(store, config) {
        Ok(list) => scan_config.dont_scan_tools = list,
        Err(e) => warn!("Failed to read the hidden tools: {e}"),
    }
    scan_config
}

/// Extracts the firmware status from an error, for reporting.
fn status_of(error: &BootError) -> Status {
    match error {
        BootError::Uefi(e) => e.status(),
        BootError::FsError(FsError::OpenErr(status) | FsError::ReadErr(status)) => *status,
        _ => Status::ABORTED,
    }
}

/// The name of a volume as used in reports.
fn volume_label(volume: &Volume) -> String {
    volume.display_name().unwrap_or("unnamed volume").to_string()
}

/// Collects the entries of one volume.
struct VolumeScan<'a, F: VolumeFs + ?Sized> {
    /// The filesystem of the volume.
    fs: &'a mut F,

    /// The volume being scanned.
    volume: &'a Rc<Volume>,

    /// The context of the scan.
    ctx: &'a ScanContext<'a>,

    /// The entries found so far.
    entries: Vec<LoaderEntry>,
}

impl<F: VolumeFs + ?Sized> VolumeScan<'_, F> {
    /// Checks if a loader at a fixed path is present and allowed.
    fn loader_present(&mut self, path: &str) -> bool {
        should_scan_dir(self.volume, parent_dir(path), self.ctx)
            && !file_excluded(self.volume, path, self.ctx)
            && !self.ctx.is_self(self.volume, path)
            && is_valid_loader(self.fs, path)
    }

    /// Classifies a loader and adds an entry for it.
    fn add_entry(&mut self, path: &str, title: Option<&str>) {
        let classification = classify_loader(self.fs, self.volume, path, title, self.ctx.config);
        let mut builder =
            LoaderEntryBuilder::disk(Rc::clone(self.volume), path).classification(classification);
        if let Some(title) = title {
            builder = builder.title(title);
        }
        let entry = builder.build();
        debug!("Found {}", entry.title);
        self.entries.push(entry);
    }

    /// Adds the macOS and Microsoft loaders, which sit at fixed paths.
    fn scan_fixed_loaders(&mut self) {
        let macos = join_path("\\", MACOS_LOADER_PATH);
        if self.loader_present(&macos) {
            let title = if REFIND_CONFIGS.iter().any(|x| self.fs.exists(x)) {
                "RefindPlus"
            } else {
                "Mac OS"
            };
            self.add_entry(&macos, Some(title));
        }

        let backup = join_path(MICROSOFT_DIR, "bkpbootmgfw.efi");
        let has_backup = self.loader_present(&backup);
        if has_backup {
            self.add_entry(&backup, Some("UEFI Windows (BRBackup)"));
        }

        let bootmgfw = join_path(MICROSOFT_DIR, "bootmgfw.efi");
        if self.loader_present(&bootmgfw) {
            let title = if has_backup {
                "Assumed UEFI Windows (Potentially GRUB)"
            } else {
                "Windows (UEFI)"
            };
            self.add_entry(&bootmgfw, Some(title));
        }
    }

    /// Lists the directories to scan, in order, without duplicates.
    fn directories(&mut self) -> Vec<String> {
        let mut dirs = alloc::vec![String::from("\\")];

        if let Ok(listing) = self.fs.read_dir("\\EFI") {
            dirs.extend(
                listing
                    .entries
                    .iter()
                    .filter(|x| {
                        x.is_dir
                            && !x.name.starts_with('.')
                            && !x.name.eq_ignore_ascii_case(TOOLS_DIR)
                    })
                    .map(|x| join_path("\\EFI", &x.name)),
            );
        }

        for item in comma_items(&self.ctx.config.also_scan_dirs) {
            let (volume, path) = split_volume_and_path(item);
            if volume.is_some_and(|x| !self.volume.matches_description(x)) {
                continue;
            }
            let path = clean_path(path);
            if !dirs.iter().any(|x| paths_equal(x, &path)) {
                dirs.push(path);
            }
        }

        dirs
    }

    /// Scans one directory, folding Linux kernels into the newest one.
    fn scan_dir(&mut self, dir: &str, report: &mut ScanReport) {
        if !should_scan_dir(self.volume, dir, self.ctx) {
            return;
        }

        let scan = match scan_directory(self.fs, self.volume, dir, self.ctx) {
            Ok(scan) => scan,
            Err(FsError::OpenErr(Status::NOT_FOUND)) => return,
            Err(e) => {
                let status = match e {
                    FsError::OpenErr(status) | FsError::ReadErr(status) => status,
                    _ => Status::ABORTED,
                };
                report.record(ScanError::Directory {
                    volume: volume_label(self.volume),
                    path: dir.to_string(),
                    status,
                });
                return;
            }
        };

        if let Some(status) = scan.status {
            report.record(ScanError::Directory {
                volume: volume_label(self.volume),
                path: dir.to_string(),
                status,
            });
        }

        let fold = self.ctx.config.fold_linux_kernels;
        let mut first_kernel: Option<usize> = None;
        for Candidate { path, .. } in scan.candidates {
            if fold && is_linux_kernel(basename(&path), self.ctx.config) {
                if let Some(idx) = first_kernel
                    && let Some(entry) = self.entries.get_mut(idx)
                {
                    entry.fold_kernel(path);
                    continue;
                }
                first_kernel = Some(self.entries.len());
            }
            self.add_entry(&path, None);
        }
    }

    /// Adds the removable media loader if it is not a copy of anything found.
    fn scan_fallback(&mut self) {
        let Some(fallback) = self.ctx.fallback_path else {
            return;
        };
        if !self.fs.exists(fallback)
            || file_excluded(self.volume, fallback, self.ctx)
            || self.ctx.is_self(self.volume, fallback)
            || !is_valid_loader(self.fs, fallback)
        {
            return;
        }

        let found: Vec<String> = self
            .entries
            .iter()
            .flat_map(|x| {
                x.loader_path()
                    .map(String::from)
                    .into_iter()
                    .chain(x.folded.iter().cloned())
            })
            .collect();
        if is_duplicate_of_any(self.fs, fallback, found.iter().map(String::as_str)) {
            return;
        }

        self.add_entry(fallback, Some("Fallback Boot Loader"));
    }
}

/// Scans one volume for loaders.
///
/// `fs` must be the filesystem of `volume`. Failures are added to `report`.
pub fn scan_volume(
    fs: &mut (impl VolumeFs + ?Sized),
    volume: &Rc<Volume>,
    ctx: &ScanContext<'_>,
    report: &mut ScanReport,
) -> Vec<LoaderEntry> {
    let mut scan = VolumeScan {
        fs,
        volume,
        ctx,
        entries: Vec::new(),
    };

    scan.scan_fixed_loaders();
    for dir in scan.directories() {
        scan.scan_dir(&dir, report);
    }
    scan.scan_fallback();

    scan.entries
}

/// Scans every eligible volume of a catalog.
///
/// `open` opens the filesystem of a volume. A volume that fails to open is reported and skipped.
pub fn scan_volumes<F: VolumeFs>(
    catalog: &VolumeCatalog,
    ctx: &ScanContext<'_>,
    mut open: impl FnMut(&Volume) -> BootResult<F>,
) -> (Vec<LoaderEntry>, ScanReport) {
    let mut entries = Vec::new();
    let mut report = ScanReport::default();

    for volume in catalog.volumes() {
        if !disk_kind_scanned(volume, ctx.config.scan_for) || !should_scan_volume(volume, ctx) {
            continue;
        }

        match open(volume) {
            Ok(mut fs) => entries.extend(scan_volume(&mut fs, volume, ctx, &mut report)),
            Err(e) => report.record(ScanError::Volume {
                volume: volume_label(volume),
                status: status_of(&e),
            }),
        }
    }

    (entries, report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        classify::OsType,
        config::ScanTargets,
        system::{
            fs::mock::{MemFs, pe_image},
            helper::str_to_utf16z,
            variable::{BOOTDISC_GUID, PERSISTENT, mock::MemoryVariableStore},
        },
        volume::{DiskKind, FsType},
    };
    use uefi::runtime::VariableVendor;

    const FALLBACK: &str = "\\EFI\\BOOT\\bootx64.efi";

    fn ctx(config: &BootConfig) -> ScanContext<'_> {
        ScanContext {
            config,
            location: None,
            fallback_path: Some(FALLBACK),
        }
    }

    fn esp(name: &str, disk_kind: DiskKind) -> Volume {
        let mut volume = Volume::new(FsType::Fat32, disk_kind);
        volume.vol_name = Some(name.into());
        volume
    }

    fn titles(entries: &[LoaderEntry]) -> Vec<&str> {
        entries.iter().map(|x| x.title.as_str()).collect()
    }

    #[test]
    fn test_debian_volume() {
        let mut fs = MemFs::new()
            .file("\\EFI\\debian\\vmlinuz-6.1.0.efi", pe_image(1), 20)
            .file("\\EFI\\debian\\vmlinuz-6.1.0-rescue.efi", pe_image(2), 30)
            .file("\\EFI\\debian\\initrd.img-6.1.0", "initrd", 20)
            .file("\\EFI\\debian\\grubx64.efi", pe_image(3), 10)
            .file(FALLBACK, pe_image(3), 10)
            .file("\\EFI\\Microsoft\\Boot\\bootmgfw.efi", pe_image(4), 1)
            .file("\\EFI\\tools\\memtest.efi", pe_image(5), 1);
        let volume = Rc::new(esp("ESP", DiskKind::Internal));
        let config = BootConfig::default();
        let mut report = ScanReport::default();

        let entries = scan_volume(&mut fs, &volume, &ctx(&config), &mut report);
        assert_eq!(
            titles(&entries),
            [
                "Boot Windows (UEFI) from ESP",
                "Boot \\EFI\\debian\\vmlinuz-6.1.0.efi from ESP",
                "Boot \\EFI\\debian\\grubx64.efi from ESP",
            ]
        );

        let kernel = &entries[1];
        assert_eq!(kernel.os_type, OsType::LinuxStub);
        assert_eq!(kernel.folded, ["\\EFI\\debian\\vmlinuz-6.1.0-rescue.efi"]);
        assert_eq!(kernel.initrd.as_deref(), Some("\\EFI\\debian\\initrd.img-6.1.0"));
        assert_eq!(kernel.options, "initrd=\\EFI\\debian\\initrd.img-6.1.0");
        assert_eq!(report.worst_status(), Status::SUCCESS);
    }

    #[test]
    fn test_fixed_loaders_and_fallback() {
        let mut fs = MemFs::new()
            .file("\\System\\Library\\CoreServices\\boot.efi", pe_image(1), 1)
            .file("\\EFI\\refind\\refind.conf", "timeout 5", 1)
            .file("\\EFI\\Microsoft\\Boot\\bkpbootmgfw.efi", pe_image(2), 1)
            .file("\\EFI\\Microsoft\\Boot\\bootmgfw.efi", pe_image(3), 1)
            .file(FALLBACK, pe_image(4), 1);
        let volume = Rc::new(esp("Macintosh HD", DiskKind::Internal));
        let config = BootConfig::default();

        let entries = scan_volume(&mut fs, &volume, &ctx(&config), &mut ScanReport::default());
        assert_eq!(
            titles(&entries),
            [
                "Boot RefindPlus from Macintosh HD",
                "Boot UEFI Windows (BRBackup) from Macintosh HD",
                "Boot Assumed UEFI Windows (Potentially GRUB) from Macintosh HD",
                "Boot Fallback Boot Loader from Macintosh HD",
            ]
        );
        assert_eq!(entries[0].os_type, OsType::RefindFamily);
        assert_eq!(entries[3].loader_path(), Some(FALLBACK));
    }

    #[test]
    fn test_self_is_not_listed() {
        let mut fs = MemFs::new()
            .file(FALLBACK, pe_image(1), 1)
            .file("\\EFI\\BOOT\\grubx64.efi", pe_image(2), 1);
        let mut volume = esp("ESP", DiskKind::Internal);
        volume.partition_guid = Some(uefi::guid!("6f0c1a5e-8d2b-4c8e-b1a3-0f5d2e7c9a41"));
        let volume = Rc::new(volume);
        let location = SelfLocation {
            device: None,
            partition_guid: volume.partition_guid,
            loader_path: FALLBACK.into(),
        };
        let config = BootConfig::default();
        let ctx = ScanContext {
            location: Some(&location),
            ..ctx(&config)
        };

        let entries = scan_volume(&mut fs, &volume, &ctx, &mut ScanReport::default());
        assert!(entries.is_empty());
    }

    #[test]
    fn test_also_scan_dirs_and_failures() {
        let mut fs = MemFs::new()
            .file("\\boot\\vmlinuz-linux", pe_image(1), 1)
            .file("\\EFI\\arch\\grubx64.efi", pe_image(2), 1)
            .close_status(Status::DEVICE_ERROR);
        let volume = Rc::new(esp("ARCH", DiskKind::Internal));
        let config = BootConfig {
            also_scan_dirs: "OTHER:\\EFI\\other,boot".into(),
            ..BootConfig::default()
        };
        let mut report = ScanReport::default();

        let entries = scan_volume(&mut fs, &volume, &ctx(&config), &mut report);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].loader_path(), Some("\\boot\\vmlinuz-linux"));
        assert_eq!(report.worst_status(), Status::DEVICE_ERROR);
        assert_eq!(report.errors().len(), 3);
    }

    #[test]
    fn test_scan_volumes() {
        let catalog = VolumeCatalog::new(alloc::vec![
            esp("INTERNAL", DiskKind::Internal),
            esp("USB", DiskKind::External),
            esp("BROKEN", DiskKind::Internal),
        ]);
        let config = BootConfig {
            scan_for: ScanTargets::INTERNAL,
            ..BootConfig::default()
        };

        let (entries, report) = scan_volumes(&catalog, &ctx(&config), |volume| {
            match volume.vol_name.as_deref() {
                Some("BROKEN") => Err(BootError::FsError(FsError::OpenErr(Status::NO_MEDIA))),
                _ => Ok(MemFs::new().file("\\EFI\\ubuntu\\grubx64.efi", pe_image(1), 1)),
            }
        });

        assert_eq!(titles(&entries), ["Boot \\EFI\\ubuntu\\grubx64.efi from INTERNAL"]);
        assert_eq!(report.worst_status(), Status::NO_MEDIA);
    }

    #[test]
    fn test_hidden_loader_dropped() -> BootResult<()> {
        let mut store = MemoryVariableStore::new();
        store.set(
            HIDDEN_TAGS,
            &VariableVendor(BOOTDISC_GUID),
            PERSISTENT,
            &str_to_utf16z("ESP:\\EFI\\ubuntu\\shimx64.efi"),
        )?;
        let mut fs = MemFs::new()
            .file("\\EFI\\ubuntu\\grubx64.efi", pe_image(1), 1)
            .file("\\EFI\\ubuntu\\shimx64.efi", pe_image(2), 1);
        let volume = Rc::new(esp("ESP", DiskKind::Internal));
        let config = BootConfig {
            dont_scan_files: "mmx64.efi".into(),
            ..BootConfig::default()
        };

        let config = scan_config(&mut store, &config);
        assert_eq!(config.dont_scan_files, "mmx64.efi,ESP:\\EFI\\ubuntu\\shimx64.efi");

        let entries = scan_volume(&mut fs, &volume, &ctx(&config), &mut ScanReport::default());
        assert_eq!(titles(&entries), ["Boot \\EFI\\ubuntu\\grubx64.efi from ESP"]);
        Ok(())
    }

    #[test]
    fn test_hidden_lists_without_variables() -> BootResult<()> {
        let mut store = MemoryVariableStore::new();
        let config = BootConfig {
            dont_scan_tools: "gdisk_x64.efi".into(),
            ..BootConfig::default()
        };
        assert_eq!(hidden_tags_deny_list(&mut store, &config)?, "");
        assert_eq!(hidden_tools_deny_list(&mut store, &config)?, "gdisk_x64.efi");

        store.set(
            HIDDEN_TOOLS,
            &VariableVendor(BOOTDISC_GUID),
            PERSISTENT,
            &str_to_utf16z("shell,gdisk_x64.efi"),
        )?;
        assert_eq!(hidden_tools_deny_list(&mut store, &config)?, "gdisk_x64.efi,shell");
        Ok(())
    }
}
