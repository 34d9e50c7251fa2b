// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! Decides which volumes, directories and files are looked at.

use log::{debug, trace};
use object::pe::ImageDosHeader;

use crate::{
    config::{ApfsSkip, ScanTargets},
    scan::ScanContext,
    system::{
        fs::VolumeFs,
        helper::Arch,
        strings::{
            basename, comma_items, contains_ignore_case, ends_with_ignore_case, paths_equal,
            split_volume_and_path, starts_with_ignore_case,
        },
    },
    volume::{ApfsRole, DiskKind, FsType, Volume},
};

/// The only directory scanned on a Boot Camp NTFS volume.
const BOOTCAMP_DIR: &str = "\\EFI\\Microsoft\\Boot";

/// Filename prefixes of UEFI shells, which are tools rather than loaders.
const SHELL_NAMES: &str = "shell";

/// Directories that only hold memory testers.
const MEMTEST_LOCATIONS: &str =
    "\\EFI\\tools,\\EFI\\tools\\memtest86,\\EFI\\tools\\memtest,\\EFI\\memtest86,\\EFI\\memtest";

/// Filename stems of memory testers.
///
/// A stem may also carry the architecture, as in `memtest86_x64.efi` or `x64_memtest.efi`.
const MEMTEST_NAMES: [&str; 2] = ["memtest", "memtest86"];

/// Extensions of icon files that sit next to loaders.
const ICON_EXTENSIONS: [&str; 2] = [".icns", ".png"];

/// How much of a file is read to check that it is a loader.
const HEADER_READ_SIZE: usize = 4096;

/// The magic of an Apple fat binary, which holds several PE images.
const FAT_BINARY_MAGIC: u32 = 0x0ef1_fab9;

/// The signature of PE headers, `PE\0\0`.
const PE_SIGNATURE: u32 = 0x0000_4550;

/// Checks if an item of a configuration list refers to a path on a volume.
///
/// Items are `path` or `volume:path`. A path without any separator is matched against the last component of
/// `path` only.
fn item_matches(item: &str, volume: &Volume, path: &str) -> bool {
    let (item_volume, item_path) = split_volume_and_path(item);
    if item_volume.is_some_and(|x| !volume.matches_description(x)) {
        return false;
    }
    if item_path.contains(['\\', '/']) {
        paths_equal(item_path, path)
    } else {
        item_path.eq_ignore_ascii_case(basename(path))
    }
}

/// Checks if a volume sits on a disk kind that is scanned.
#[must_use = "Has no effect if the result is unused"]
pub fn disk_kind_scanned(volume: &Volume, targets: ScanTargets) -> bool {
    let target = match volume.disk_kind {
        DiskKind::Internal => ScanTargets::INTERNAL,
        DiskKind::External => ScanTargets::EXTERNAL,
        DiskKind::Optical => ScanTargets::OPTICAL,
        DiskKind::Network => ScanTargets::NETBOOT,
    };
    targets.contains(target)
}

/// Checks if a volume may be scanned at all.
#[must_use = "Has no effect if the result is unused"]
pub fn should_scan_volume(volume: &Volume, ctx: &ScanContext<'_>) -> bool {
    if volume.bitlocker {
        debug!("Skipping BitLocker volume {:?}", volume.display_name());
        return false;
    }

    if comma_items(&ctx.config.dont_scan_volumes).any(|x| volume.matches_description(x)) {
        debug!("Skipping excluded volume {:?}", volume.display_name());
        return false;
    }

    if volume.fs_type == FsType::Apfs && !volume.is_ventoy() {
        let skip = ctx.config.skip_apfs_roles;
        let skipped = match volume.apfs_role {
            ApfsRole::System => skip.contains(ApfsSkip::SYSTEM),
            ApfsRole::Data => skip.contains(ApfsSkip::DATA),
            ApfsRole::Preboot => skip.contains(ApfsSkip::PREBOOT),
            ApfsRole::Undefined => false,
        };
        if skipped {
            debug!("Skipping APFS {:?} volume", volume.apfs_role);
            return false;
        }
    }

    true
}

/// Checks if a directory of a volume may be scanned.
#[must_use = "Has no effect if the result is unused"]
pub fn should_scan_dir(volume: &Volume, dir: &str, ctx: &ScanContext<'_>) -> bool {
    if let Some(location) = ctx.location
        && location.is_on(volume)
        && paths_equal(dir, location.dir())
    {
        return false;
    }

    if volume.fs_type == FsType::Ntfs
        && volume.names().any(|x| contains_ignore_case(x, "BOOTCAMP"))
        && !paths_equal(dir, BOOTCAMP_DIR)
    {
        return false;
    }

    !is_memtest_dir(dir)
        && !comma_items(&ctx.config.dont_scan_dirs).any(|x| item_matches(x, volume, dir))
}

/// Checks if a file is excluded by `dont_scan_files` or `dont_scan_tools`.
#[must_use = "Has no effect if the result is unused"]
pub fn file_excluded(volume: &Volume, path: &str, ctx: &ScanContext<'_>) -> bool {
    comma_items(&ctx.config.dont_scan_files)
        .chain(comma_items(&ctx.config.dont_scan_tools))
        .any(|x| item_matches(x, volume, path))
}

/// Checks if a directory is one of the places memory testers are installed to.
#[must_use = "Has no effect if the result is unused"]
pub fn is_memtest_dir(dir: &str) -> bool {
    comma_items(MEMTEST_LOCATIONS).any(|x| paths_equal(x, dir))
}

/// Checks if a filename is that of a memory tester for the running architecture.
#[must_use = "Has no effect if the result is unused"]
pub fn is_memtest_name(name: &str) -> bool {
    let Some(stem) = name
        .len()
        .checked_sub(4)
        .filter(|_| ends_with_ignore_case(name, ".efi"))
        .and_then(|x| name.get(..x))
    else {
        return false;
    };
    let arch = Arch::current().map(Arch::suffix);

    MEMTEST_NAMES.iter().any(|base| {
        stem.eq_ignore_ascii_case(base)
            || arch.is_some_and(|arch| {
                stem.split_once('_').is_some_and(|(a, b)| {
                    (a.eq_ignore_ascii_case(base) && b.eq_ignore_ascii_case(arch))
                        || (a.eq_ignore_ascii_case(arch) && b.eq_ignore_ascii_case(base))
                })
            })
    })
}

/// Checks if a filename can never be a loader.
///
/// Memory testers are skipped by name anywhere, and everything in their install directories is skipped too.
///
/// `fallback_name` is the name of the removable media loader, which is skipped in `EFI\BOOT` since it is added on
/// its own after every other directory.
#[must_use = "Has no effect if the result is unused"]
pub fn name_skipped(dir: &str, name: &str, fallback_name: Option<&str>) -> bool {
    name.starts_with('.')
        || ICON_EXTENSIONS
            .iter()
            .any(|x| ends_with_ignore_case(name, x))
        || (paths_equal(dir, "\\EFI\\BOOT")
            && fallback_name.is_some_and(|x| x.eq_ignore_ascii_case(name)))
        || starts_with_ignore_case(name, SHELL_NAMES)
        || is_memtest_name(name)
        || is_memtest_dir(dir)
}

/// Checks if a file only looks like a file in the directory listing.
///
/// HFS+ reports symbolic links with a different size in the listing than the file that is opened through them.
/// A file that cannot be opened counts as empty.
pub fn is_link(fs: &mut (impl VolumeFs + ?Sized), path: &str, listed_size: u64) -> bool {
    fs.file_size(path).unwrap_or(0) != listed_size
}

/// Checks if a signed copy of a loader sits next to it, in which case only the signed copy is used.
pub fn has_signed_copy(fs: &mut (impl VolumeFs + ?Sized), path: &str) -> bool {
    ends_with_ignore_case(path, ".efi") && fs.exists(&alloc::format!("{path}.signed"))
}

/// Checks if a file starts like an EFI application.
///
/// Both PE images and Apple fat binaries are accepted.
pub fn is_valid_loader(fs: &mut (impl VolumeFs + ?Sized), path: &str) -> bool {
    let Ok(header) = fs.read_prefix(path, HEADER_READ_SIZE) else {
        return false;
    };

    if header
        .get(..4)
        .is_some_and(|x| u32::from_le_bytes([x[0], x[1], x[2], x[3]]) == FAT_BINARY_MAGIC)
    {
        return true;
    }

    let Ok(dos) = ImageDosHeader::parse(header.as_slice()) else {
        trace!("{path} has no DOS header");
        return false;
    };
    let Ok(offset) = usize::try_from(dos.nt_headers_offset()) else {
        return false;
    };
    header
        .get(offset..offset.saturating_add(4))
        .is_some_and(|x| u32::from_le_bytes([x[0], x[1], x[2], x[3]]) == PE_SIGNATURE)
}
