// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! Builds the sub-menu of variant boot options for an entry.
//!
//! Every disk entry gets a first variant that boots it with its default options. What follows depends on what the
//! loader is. Building a sub-menu reads files from the volume, so [`LoaderEntry::submenu`] only does it on demand.

use alloc::{format, string::String, vec, vec::Vec};

use crate::{
    classify::{
        OsType,
        initrd::{add_initrd_to_options, find_initrd},
        linux::{OptionsLine, read_options_file},
    },
    config::{BootConfig, GraphicsFor},
    entry::{LoaderEntry, SubEntry},
    system::{
        fs::VolumeFs,
        strings::{basename, find_numbers, substitute_version},
    },
};

/// The path of the Apple hardware diagnostics, relative to the root of the volume.
pub const APPLE_DIAGS_PATH: &str = "\\System\\Library\\CoreServices\\.diagnostics\\diags.efi";

/// The label of Linux variants that have no options file.
const BOOT_LINUX: &str = "Boot Linux";

/// Creates a variant of the entry's own loader.
fn variant(loader_path: &str, title: &str, options: &str, graphics: bool) -> SubEntry {
    SubEntry {
        title: title.into(),
        loader_path: loader_path.into(),
        options: options.into(),
        graphics,
    }
}

/// Builds the sub-menu of an entry.
///
/// `fs` must be the filesystem of the entry's volume. Firmware entries have no sub-menu.
pub fn build_submenu(
    fs: &mut (impl VolumeFs + ?Sized),
    entry: &LoaderEntry,
    config: &BootConfig,
) -> Vec<SubEntry> {
    let Some(loader_path) = entry.loader_path() else {
        return Vec::new();
    };
    let graphics = |flag| config.graphics_for.contains(flag);

    let mut submenu = vec![variant(
        loader_path,
        "Boot using default options",
        &add_initrd_to_options(&entry.options, entry.initrd.as_deref()),
        entry.graphics,
    )];

    match entry.os_type {
        OsType::MacOs => {
            submenu.extend([
                variant(loader_path, "Boot Mac OS in verbose mode", "-v", false),
                variant(loader_path, "Boot Mac OS in single user mode", "-v -s", false),
                variant(loader_path, "Boot Mac OS in safe mode", "-v -x", false),
            ]);
            if fs.exists(APPLE_DIAGS_PATH) {
                submenu.push(variant(
                    APPLE_DIAGS_PATH,
                    "Run Apple Hardware Test",
                    "",
                    graphics(GraphicsFor::OSX),
                ));
            }
        }
        OsType::LinuxStub => {
            linux_variants(fs, entry, loader_path, graphics(GraphicsFor::LINUX), &mut submenu);
        }
        OsType::Elilo => {
            let graphics = graphics(GraphicsFor::ELILO);
            submenu.extend([
                variant(loader_path, "Run ELILO in interactive mode", "-p", graphics),
                variant(
                    loader_path,
                    "Boot Linux for a 17\" iMac or a 15\" MacBook Pro (*)",
                    "-d 0 i17",
                    graphics,
                ),
                variant(loader_path, "Boot Linux for a 20\" iMac (*)", "-d 0 i20", graphics),
                variant(loader_path, "Boot Linux for a Mac Mini (*)", "-d 0 mini", graphics),
            ]);
        }
        OsType::Xom => {
            let graphics = graphics(GraphicsFor::WINDOWS);
            submenu.extend([
                variant(loader_path, "Boot Windows from Hard Disk", "-s -h", graphics),
                variant(loader_path, "Boot Windows from CD-ROM", "-s -c", graphics),
                variant(loader_path, "Run XOM in text mode", "-v", graphics),
            ]);
        }
        _ => (),
    }

    submenu
}

/// Options for one kernel, with its version substituted and its initrd added.
fn kernel_options(options: &str, kernel: &str, initrd: Option<&str>) -> String {
    let version = find_numbers(basename(kernel)).unwrap_or_default();
    add_initrd_to_options(&substitute_version(options, version), initrd)
}

/// Adds the variants of a Linux kernel and of the kernels folded into it.
fn linux_variants(
    fs: &mut (impl VolumeFs + ?Sized),
    entry: &LoaderEntry,
    loader_path: &str,
    graphics: bool,
    submenu: &mut Vec<SubEntry>,
) {
    let lines = read_options_file(fs, loader_path)
        .filter(|x| !x.is_empty())
        .unwrap_or_else(|| {
            vec![OptionsLine {
                label: BOOT_LINUX.into(),
                options: String::new(),
            }]
        });

    if let (Some(default), Some(first)) = (submenu.first_mut(), lines.first()) {
        default.title.clone_from(&first.label);
    }

    let initrd = entry.initrd.clone().or_else(|| find_initrd(fs, loader_path));
    for line in lines.iter().skip(1) {
        submenu.push(variant(
            loader_path,
            &line.label,
            &kernel_options(&line.options, loader_path, initrd.as_deref()),
            graphics,
        ));
    }

    for kernel in &entry.folded {
        let initrd = find_initrd(fs, kernel);
        for line in &lines {
            submenu.push(variant(
                kernel,
                &format!("{}: {}", basename(kernel), line.label),
                &kernel_options(&line.options, kernel, initrd.as_deref()),
                graphics,
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        classify::classify_loader,
        entry::builder::LoaderEntryBuilder,
        system::fs::mock::MemFs,
        volume::{DiskKind, FsType, Volume},
    };
    use alloc::rc::Rc;

    fn entry(fs: &mut MemFs, path: &str) -> LoaderEntry {
        let volume = Rc::new(Volume::new(FsType::Ext4, DiskKind::Internal));
        let class = classify_loader(fs, &volume, path, None, &BootConfig::default());
        LoaderEntryBuilder::disk(volume, path)
            .classification(class)
            .build()
    }

    fn titles(submenu: &[SubEntry]) -> Vec<&str> {
        submenu.iter().map(|x| x.title.as_str()).collect()
    }

    #[test]
    fn test_macos_variants() {
        let mut fs = MemFs::new().file(APPLE_DIAGS_PATH, "d", 1);
        let entry = entry(&mut fs, "\\System\\Library\\CoreServices\\boot.efi");
        let submenu = entry.submenu(&mut fs, &BootConfig::default());

        assert_eq!(submenu.len(), 5);
        assert_eq!(submenu[2].options, "-v -s");
        assert_eq!(submenu[4].loader_path, APPLE_DIAGS_PATH);
        assert!(submenu[4].graphics);
    }

    #[test]
    fn test_linux_variants_from_options_file() {
        let mut fs = MemFs::new()
            .file("\\boot\\vmlinuz-6.1.0", "k", 2)
            .file("\\boot\\vmlinuz-6.0.0", "k", 1)
            .file("\\boot\\initrd.img-6.1.0", "i", 2)
            .file("\\boot\\initrd.img-6.0.0", "i", 1)
            .file(
                "\\boot\\refind_linux.conf",
                "\"Standard\" \"ro quiet\"\n\"Single user\" \"ro single\"\n",
                1,
            );
        let mut entry = entry(&mut fs, "\\boot\\vmlinuz-6.1.0");
        entry.fold_kernel("\\boot\\vmlinuz-6.0.0");

        let submenu = entry.submenu(&mut fs, &BootConfig::default());
        assert_eq!(
            titles(submenu),
            [
                "Standard",
                "Single user",
                "vmlinuz-6.0.0: Standard",
                "vmlinuz-6.0.0: Single user"
            ]
        );
        assert_eq!(submenu[0].options, "ro quiet initrd=\\boot\\initrd.img-6.1.0");
        assert_eq!(submenu[1].options, "ro single initrd=\\boot\\initrd.img-6.1.0");
        assert_eq!(submenu[3].options, "ro single initrd=\\boot\\initrd.img-6.0.0");
        assert_eq!(submenu[3].loader_path, "\\boot\\vmlinuz-6.0.0");
    }

    #[test]
    fn test_linux_without_options_file() {
        let mut fs = MemFs::new()
            .file("\\EFI\\arch\\vmlinuz-linux.efi", "k", 2)
            .file("\\EFI\\arch\\vmlinuz-lts.efi", "k", 1);
        let mut entry = entry(&mut fs, "\\EFI\\arch\\vmlinuz-linux.efi");
        entry.fold_kernel("\\EFI\\arch\\vmlinuz-lts.efi");

        let submenu = entry.submenu(&mut fs, &BootConfig::default());
        assert_eq!(titles(submenu), ["Boot Linux", "vmlinuz-lts.efi: Boot Linux"]);
        assert_eq!(submenu[1].options, "");
    }

    #[test]
    fn test_simple_variants() {
        let mut fs = MemFs::new();
        let elilo = entry(&mut fs, "\\EFI\\elilo\\elilo.efi");
        assert_eq!(elilo.submenu(&mut fs, &BootConfig::default()).len(), 5);

        let xom = entry(&mut fs, "\\xom.efi");
        let submenu = xom.submenu(&mut fs, &BootConfig::default());
        assert_eq!(submenu[0].options, "-s -h");
        assert_eq!(submenu[2].options, "-s -c");

        let windows = entry(&mut fs, "\\EFI\\Microsoft\\Boot\\bootmgfw.efi");
        assert!(!windows.submenu_built());
        assert_eq!(
            titles(windows.submenu(&mut fs, &BootConfig::default())),
            ["Boot using default options"]
        );
        assert!(windows.submenu_built());
    }
}
