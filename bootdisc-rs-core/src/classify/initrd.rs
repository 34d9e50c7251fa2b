// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! Matches Linux kernels with their initial RAM disks.
//!
//! An initrd belongs to a kernel when both carry the same version string, or when neither carries one. A kernel
//! `bzImage-3.3.0.efi` next to `initramfs-3.3.0.img` gets that initrd, but never `initramfs-3.3.0-rc7.img` or
//! `initramfs-13.3.0.img`.
//!
//! When several initrds carry the right version, the one whose name continues the most like the kernel's name
//! after the version wins, and the shortest name breaks ties. For `bzImage-5.10.0.efi`, `initrd-5.10.0.img`
//! beats `initrd-5.10.0-debug.img`.

use alloc::string::String;
use log::debug;

use crate::system::{
    fs::VolumeFs,
    strings::{
        VERSION_TOKEN, basename, chars_in_common, contains_ignore_case, find_numbers, join_path,
        matches_any_pattern, parent_dir, version_tail,
    },
};

/// The filename patterns of initrd files.
pub const INITRD_PATTERNS: &str = "init*,booster*";

/// Checks if two version strings allow a kernel and an initrd to be paired.
fn versions_match(kernel: Option<&str>, initrd: Option<&str>) -> bool {
    match (kernel, initrd) {
        (Some(kernel), Some(initrd)) => kernel.eq_ignore_ascii_case(initrd),
        (None, None) => true,
        _ => false,
    }
}

/// Picks the initrd for a kernel out of a list of filenames.
///
/// Candidates are compared by name only, so they should all come from the kernel's directory. The result does not
/// depend on anything but the names given, so the same inputs always pick the same initrd.
#[must_use = "Has no effect if the result is unused"]
pub fn select_initrd<'a>(
    kernel_name: &str,
    candidates: impl IntoIterator<Item = &'a str>,
) -> Option<&'a str> {
    let kernel_version = find_numbers(kernel_name);
    let kernel_tail = version_tail(kernel_name);

    let mut best: Option<(&str, usize)> = None;
    for candidate in candidates {
        if !versions_match(kernel_version, find_numbers(candidate)) {
            continue;
        }

        let shared = chars_in_common(kernel_tail, version_tail(candidate));
        best = match best {
            Some((current, max))
                if shared < max || (shared == max && candidate.len() >= current.len()) =>
            {
                Some((current, max))
            }
            _ => Some((candidate, shared)),
        };
    }

    best.map(|(name, _)| name)
}

/// Finds the initrd of a kernel in the kernel's directory.
///
/// Returns the volume relative path of the initrd, or [`None`] if no file in the directory belongs to the kernel.
pub fn find_initrd(fs: &mut (impl VolumeFs + ?Sized), loader_path: &str) -> Option<String> {
    let dir = parent_dir(loader_path);
    let dir = if dir.is_empty() { "\\" } else { dir };

    let listing = fs.read_dir(dir).ok()?;
    let names = listing
        .entries
        .iter()
        .filter(|x| !x.is_dir && matches_any_pattern(&x.name, INITRD_PATTERNS))
        .map(|x| x.name.as_str());

    let initrd = select_initrd(basename(loader_path), names).map(|x| join_path(dir, x));
    debug!("Initrd for {loader_path}: {initrd:?}");
    initrd
}

/// Adds an initrd to a kernel's load options.
///
/// If the options contain a version token, it is replaced by the version of the initrd instead, so the options
/// can name the initrd themselves. Options that already carry an `initrd=` are left alone.
#[must_use = "Has no effect if the result is unused"]
pub fn add_initrd_to_options(options: &str, initrd: Option<&str>) -> String {
    let Some(initrd) = initrd else {
        return options.into();
    };

    if options.contains(VERSION_TOKEN) {
        return options.replace(VERSION_TOKEN, find_numbers(basename(initrd)).unwrap_or_default());
    }
    if contains_ignore_case(options, "initrd=") {
        return options.into();
    }

    let mut options = String::from(options);
    if !options.is_empty() {
        options.push(' ');
    }
    options.push_str("initrd=");
    options.push_str(initrd);
    options
}
