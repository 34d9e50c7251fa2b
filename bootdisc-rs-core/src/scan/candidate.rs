// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! Finds the loader candidates of a single directory.
//!
//! Candidates come back newest first, so the kernel that is folded into is the most recent one. Rescue kernels are
//! always placed last, however recent they are, since they are rarely the kernel that should be booted by default.

use alloc::{string::String, vec::Vec};
use log::trace;
use uefi::Status;

use crate::{
    scan::{
        ScanContext,
        filter::{file_excluded, has_signed_copy, is_link, is_valid_loader, name_skipped},
    },
    system::{
        fs::{FsError, VolumeFs},
        strings::{basename, contains_ignore_case, join_path, matches_any_pattern, paths_equal},
    },
    volume::Volume,
};

/// The pattern every EFI application matches.
const EFI_PATTERN: &str = "*.efi";

/// A file that passed every filter and is likely a loader.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Candidate {
    /// The volume relative path of the file.
    pub path: String,

    /// The modification stamp of the file.
    pub modified: u64,
}

impl Candidate {
    /// Checks if the candidate is a rescue kernel.
    #[must_use = "Has no effect if the result is unused"]
    pub fn is_rescue(&self) -> bool {
        contains_ignore_case(basename(&self.path), "rescue")
    }
}

/// The candidates of one directory.
#[derive(Debug, Default)]
pub struct DirScan {
    /// The candidates, newest first with rescue kernels last.
    pub candidates: Vec<Candidate>,

    /// The status the directory walk ended with, if it should be reported.
    pub status: Option<Status>,
}

/// Inserts a candidate into a list, keeping the list in boot order.
///
/// Newer files come first. A file with the same stamp as one already in the list goes after it.
pub fn insert_sorted(list: &mut Vec<Candidate>, candidate: Candidate) {
    let idx = if candidate.is_rescue() {
        list.len()
    } else {
        list.iter()
            .position(|x| x.is_rescue() || x.modified < candidate.modified)
            .unwrap_or(list.len())
    };
    list.insert(idx, candidate);
}

/// Checks if a filename is of a type that is scanned.
fn name_matches(name: &str, ctx: &ScanContext<'_>) -> bool {
    matches_any_pattern(name, EFI_PATTERN)
        || (ctx.config.scan_all_linux_kernels
            && matches_any_pattern(name, &ctx.config.linux_match_patterns))
}

/// Lists the loader candidates of a directory.
///
/// # Errors
///
/// May return an `Error` if the directory could not be opened. A directory that does not exist is an error too,
/// and callers that look into optional directories should treat it as an empty result.
pub fn scan_directory(
    fs: &mut (impl VolumeFs + ?Sized),
    volume: &Volume,
    dir: &str,
    ctx: &ScanContext<'_>,
) -> Result<DirScan, FsError> {
    let listing = fs.read_dir(dir)?;
    let fallback_name = ctx.fallback_path.map(basename);
    let self_path = ctx
        .location
        .filter(|x| x.is_on(volume))
        .map(|x| x.loader_path.as_str());

    let mut candidates = Vec::new();
    for entry in listing.entries.iter().filter(|x| !x.is_dir) {
        let name = entry.name.as_str();
        if name_skipped(dir, name, fallback_name) || !name_matches(name, ctx) {
            continue;
        }

        let path = join_path(dir, name);
        if self_path.is_some_and(|x| paths_equal(x, &path)) {
            continue;
        }
        if is_link(fs, &path, entry.size) {
            trace!("Skipping {path}, which looks like a link");
            continue;
        }
        if has_signed_copy(fs, &path) || file_excluded(volume, &path, ctx) {
            continue;
        }
        if !is_valid_loader(fs, &path) {
            trace!("Skipping {path}, which is not an EFI application");
            continue;
        }

        insert_sorted(
            &mut candidates,
            Candidate {
                path,
                modified: entry.modified,
            },
        );
    }

    Ok(DirScan {
        candidates,
        status: listing.close_error(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::BootConfig,
        system::fs::mock::{MemFs, pe_image},
        volume::{DiskKind, FsType},
    };
    use alloc::{format, vec};
    use proptest::prelude::*;

    fn candidate(name: &str, modified: u64) -> Candidate {
        Candidate {
            path: format!("\\EFI\\linux\\{name}"),
            modified,
        }
    }

    fn names(list: &[Candidate]) -> Vec<&str> {
        list.iter().map(|x| basename(&x.path)).collect()
    }

    #[test]
    fn test_insert_sorted() {
        let mut list = Vec::new();
        for x in [
            candidate("vmlinuz-0-rescue", 50),
            candidate("vmlinuz-5.0", 10),
            candidate("vmlinuz-6.0", 30),
            candidate("vmlinuz-5.5", 10),
        ] {
            insert_sorted(&mut list, x);
        }
        assert_eq!(
            names(&list),
            ["vmlinuz-6.0", "vmlinuz-5.0", "vmlinuz-5.5", "vmlinuz-0-rescue"]
        );
    }

    #[test]
    fn test_scan_directory() -> Result<(), FsError> {
        let mut fs = MemFs::new()
            .file("\\EFI\\debian\\grubx64.efi", pe_image(1), 10)
            .file("\\EFI\\debian\\shimx64.efi", pe_image(2), 20)
            .file("\\EFI\\debian\\fwupdx64.efi", pe_image(3), 30)
            .file("\\EFI\\debian\\fwupdx64.efi.signed", pe_image(3), 30)
            .file("\\EFI\\debian\\grub.cfg", "set root", 40)
            .file("\\EFI\\debian\\broken.efi", "garbage", 50)
            .file("\\EFI\\debian\\vmlinuz-6.1.0", pe_image(4), 5)
            .file("\\EFI\\debian\\vmlinuz-6.1.0.efi.signed", "sig", 5);
        let config = BootConfig::default();
        let ctx = ScanContext {
            config: &config,
            location: None,
            fallback_path: None,
        };
        let volume = Volume::new(FsType::Fat32, DiskKind::Internal);

        let scan = scan_directory(&mut fs, &volume, "\\EFI\\debian", &ctx)?;
        assert_eq!(names(&scan.candidates), ["grubx64.efi", "vmlinuz-6.1.0"]);
        assert_eq!(scan.status, None);

        let config = BootConfig {
            scan_all_linux_kernels: false,
            ..BootConfig::default()
        };
        let ctx = ScanContext {
            config: &config,
            ..ctx
        };
        let scan = scan_directory(&mut fs, &volume, "\\EFI\\debian", &ctx)?;
        assert_eq!(names(&scan.candidates), ["grubx64.efi"]);
        Ok(())
    }

    #[test]
    fn test_close_status() -> Result<(), FsError> {
        let volume = Volume::new(FsType::Fat32, DiskKind::Internal);
        let config = BootConfig::default();
        let ctx = ScanContext {
            config: &config,
            location: None,
            fallback_path: None,
        };

        let mut fs = MemFs::new()
            .file("\\a.efi", pe_image(1), 1)
            .close_status(Status::INVALID_PARAMETER);
        assert_eq!(scan_directory(&mut fs, &volume, "\\", &ctx)?.status, None);

        let mut fs = MemFs::new()
            .file("\\a.efi", pe_image(1), 1)
            .close_status(Status::DEVICE_ERROR);
        let scan = scan_directory(&mut fs, &volume, "\\", &ctx)?;
        assert_eq!(scan.status, Some(Status::DEVICE_ERROR));
        assert_eq!(scan.candidates.len(), 1);
        Ok(())
    }

    #[test]
    fn test_memtest_skipped() -> Result<(), FsError> {
        let mut fs = MemFs::new()
            .file("\\memtest86.efi", pe_image(1), 1)
            .file("\\grubx64.efi", pe_image(2), 1)
            .file("\\EFI\\memtest86\\memtest86x64.efi", pe_image(3), 1)
            .file("\\EFI\\memtest86\\loader.efi", pe_image(4), 1);
        let config = BootConfig::default();
        let ctx = ScanContext {
            config: &config,
            location: None,
            fallback_path: None,
        };
        let volume = Volume::new(FsType::Fat32, DiskKind::Internal);

        let root = scan_directory(&mut fs, &volume, "\\", &ctx)?;
        assert_eq!(names(&root.candidates), ["grubx64.efi"]);

        let dir = scan_directory(&mut fs, &volume, "\\EFI\\memtest86", &ctx)?;
        assert!(dir.candidates.is_empty());
        Ok(())
    }

    #[test]
    fn test_tools_excluded() -> Result<(), FsError> {
        let mut fs = MemFs::new()
            .file("\\EFI\\misc\\gdisk_x64.efi", pe_image(1), 1)
            .file("\\EFI\\misc\\grubx64.efi", pe_image(2), 1);
        let config = BootConfig {
            dont_scan_tools: "gdisk_x64.efi".into(),
            ..BootConfig::default()
        };
        let ctx = ScanContext {
            config: &config,
            location: None,
            fallback_path: None,
        };
        let volume = Volume::new(FsType::Fat32, DiskKind::Internal);

        let scan = scan_directory(&mut fs, &volume, "\\EFI\\misc", &ctx)?;
        assert_eq!(names(&scan.candidates), ["grubx64.efi"]);
        Ok(())
    }

    proptest! {
        #[test]
        fn rescue_kernels_never_sort_first(entries in proptest::collection::vec((any::<bool>(), 0u64..8), 1..24)) {
            let mut list = Vec::new();
            for (i, (rescue, modified)) in entries.iter().enumerate() {
                let name = if *rescue { format!("vmlinuz-{i}-rescue") } else { format!("vmlinuz-{i}") };
                insert_sorted(&mut list, candidate(&name, *modified));
            }

            let first_rescue = list.iter().position(Candidate::is_rescue).unwrap_or(list.len());
            prop_assert!(list[first_rescue..].iter().all(Candidate::is_rescue));
            prop_assert!(list[..first_rescue].windows(2).all(|x| x[0].modified >= x[1].modified));
            prop_assert_eq!(list.len(), entries.len());
        }
    }

    #[test]
    fn test_rescue_only_list() {
        let mut list = vec![];
        insert_sorted(&mut list, candidate("vmlinuz-rescue-a", 1));
        insert_sorted(&mut list, candidate("vmlinuz-rescue-b", 9));
        assert_eq!(names(&list), ["vmlinuz-rescue-a", "vmlinuz-rescue-b"]);
    }
}
