// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! The OS/loader classifier.
//!
//! Given the path of a loader and the volume it is on, [`classify_loader`] works out what the loader starts. The
//! rules are tried in a fixed order and the first match wins:
//!
//! 1. The macOS `CoreServices` loader. If a rEFInd configuration sits on the same volume, this is a RefindPlus
//!    install under a macOS looking path instead.
//! 2. The Windows boot managers.
//! 3. Linux kernels, by filename prefix.
//! 4. GRUB, then `OpenCore` and Clover.
//! 5. The rEFInd family, by path.
//! 6. Apple hardware diagnostics.
//! 7. ELILO.
//! 8. `xom.efi`.
//! 9. iPXE.
//!
//! Anything else is an unknown EFI application.
//!
//! Next to the [`OsType`], classification produces a comma-delimited list of icon hints, a shortcut letter and
//! whether the loader wants graphics mode. Linux kernels also get their load options and initrd.

use alloc::string::String;

use crate::{
    config::{BootConfig, GraphicsFor},
    system::{
        fs::VolumeFs,
        strings::{
            basename, comma_items, contains_ignore_case, merge_unique_item, merge_unique_items,
            merge_unique_words, parent_dir, starts_with_ignore_case,
        },
    },
    volume::{DiskKind, Volume},
};

pub mod initrd;
pub mod linux;
pub mod submenu;

/// The path of the macOS loader, relative to the root of its volume.
pub const MACOS_LOADER_PATH: &str = "System\\Library\\CoreServices\\boot.efi";

/// Configuration files that mark a rEFInd family install.
pub const REFIND_CONFIGS: [&str; 2] = ["\\EFI\\refind\\config.conf", "\\EFI\\refind\\refind.conf"];

/// Filenames of the Windows boot managers.
pub const WINDOWS_LOADERS: [&str; 4] = [
    "bootmgfw.efi",
    "bootmgr.efi",
    "cdboot.efi",
    "bkpbootmgfw.efi",
];

/// Path fragments of the rEFInd family, in the order they are checked.
const REFIND_FAMILY: [&str; 3] = ["refindplus", "refind", "refit"];

/// What a loader starts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OsType {
    /// macOS.
    MacOs,

    /// A macOS installer.
    MacOsInstaller,

    /// Windows.
    Windows,

    /// A Linux kernel with an EFI stub.
    LinuxStub,

    /// ELILO.
    Elilo,

    /// GRUB.
    Grub,

    /// `xom.efi`, which starts Windows XP.
    Xom,

    /// rEFInd, rEFIt or RefindPlus.
    RefindFamily,

    /// `OpenCore`.
    OpenCore,

    /// Clover.
    Clover,

    /// A network loader such as iPXE.
    Network,

    /// Anything else.
    #[default]
    Unknown,
}

impl OsType {
    /// Returns the single character code of the type, if it has one.
    #[must_use = "Has no effect if the result is unused"]
    pub const fn letter(self) -> Option<char> {
        match self {
            Self::MacOs | Self::MacOsInstaller => Some('M'),
            Self::Windows => Some('W'),
            Self::LinuxStub => Some('L'),
            Self::Elilo => Some('E'),
            Self::Grub => Some('G'),
            Self::Xom => Some('X'),
            Self::RefindFamily => Some('R'),
            Self::OpenCore => Some('O'),
            Self::Clover => Some('C'),
            Self::Network => Some('N'),
            Self::Unknown => None,
        }
    }

    /// Returns the graphics flag that applies to the type.
    #[must_use = "Has no effect if the result is unused"]
    pub const fn graphics_flag(self) -> Option<GraphicsFor> {
        match self {
            Self::MacOs | Self::MacOsInstaller => Some(GraphicsFor::OSX),
            Self::Windows | Self::Xom => Some(GraphicsFor::WINDOWS),
            Self::LinuxStub => Some(GraphicsFor::LINUX),
            Self::Elilo => Some(GraphicsFor::ELILO),
            Self::Grub => Some(GraphicsFor::GRUB),
            Self::OpenCore => Some(GraphicsFor::OPENCORE),
            Self::Clover => Some(GraphicsFor::CLOVER),
            Self::RefindFamily | Self::Network | Self::Unknown => None,
        }
    }
}

/// The result of classifying a loader.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Classification {
    /// What the loader starts.
    pub os_type: OsType,

    /// A comma-delimited list of icon hints.
    pub hints: String,

    /// The shortcut letter of the entry.
    pub shortcut: Option<char>,

    /// If the loader is started in graphics mode.
    pub graphics: bool,

    /// The load options of the loader.
    pub options: String,

    /// The initrd bound to a Linux kernel.
    pub initrd: Option<String>,
}

/// Returns the name of the directory a loader is in, if it is not in the root directory.
fn last_dir_name(loader_path: &str) -> Option<&str> {
    let dir = parent_dir(loader_path);
    Some(basename(dir)).filter(|x| !x.is_empty())
}

/// Strips the `.efi` extension from a filename, ignoring case.
fn strip_efi_extension(name: &str) -> &str {
    match name.len().checked_sub(4) {
        Some(idx) if name.is_char_boundary(idx) && name[idx..].eq_ignore_ascii_case(".efi") => {
            &name[..idx]
        }
        _ => name,
    }
}

/// Collects the icon hints that come from where the loader is, rather than what it is.
///
/// Returns the hints and the shortcut letter they imply.
fn location_hints(volume: &Volume, loader_path: &str, title: Option<&str>) -> (String, Option<char>) {
    let mut hints = String::new();

    if volume.is_ventoy() {
        merge_unique_item(&mut hints, "ventoy");
        return (hints, None);
    }

    if volume.disk_kind == DiskKind::Network {
        if let Some(title) = title {
            merge_unique_words(&mut hints, title);
        }
        return (hints, None);
    }

    let shortcut = last_dir_name(loader_path).and_then(|x| x.chars().next());
    if let Some(dir) = last_dir_name(loader_path) {
        merge_unique_item(&mut hints, dir);
    }
    for name in [&volume.fs_name, &volume.part_name].into_iter().flatten() {
        merge_unique_words(&mut hints, name);
    }

    (hints, shortcut)
}

/// Checks if a filename is a Linux kernel, by the configured prefixes.
#[must_use = "Has no effect if the result is unused"]
pub fn is_linux_kernel(name: &str, config: &BootConfig) -> bool {
    comma_items(&config.linux_prefixes).any(|x| starts_with_ignore_case(name, x))
}

/// Classifies a loader on a volume.
///
/// `title` is the title the loader is shown with, if it has one already; it only feeds the icon hints of network
/// loaders. Reading Linux options and release files goes through `fs`, which must be the filesystem of `volume`.
pub fn classify_loader(
    fs: &mut (impl VolumeFs + ?Sized),
    volume: &Volume,
    loader_path: &str,
    title: Option<&str>,
    config: &BootConfig,
) -> Classification {
    let name = basename(loader_path);
    let stem = strip_efi_extension(name);
    let ventoy = volume.is_ventoy();

    let (mut hints, mut shortcut) = location_hints(volume, loader_path, title);
    let mut options = String::new();
    let mut initrd = None;
    let add_hints = |hints: &mut String, new: &str| {
        if !ventoy {
            merge_unique_items(hints, new);
        }
    };

    let os_type = if contains_ignore_case(loader_path, MACOS_LOADER_PATH) {
        if REFIND_CONFIGS.iter().any(|x| fs.exists(x)) {
            add_hints(&mut hints, "refind");
            shortcut = Some('R');
            OsType::RefindFamily
        } else {
            add_hints(&mut hints, "mac");
            shortcut = Some('M');
            OsType::MacOs
        }
    } else if WINDOWS_LOADERS.iter().any(|x| x.eq_ignore_ascii_case(name)) {
        add_hints(&mut hints, "win8");
        shortcut = Some('W');
        OsType::Windows
    } else if is_linux_kernel(name, config) {
        if volume.disk_kind != DiskKind::Network {
            if !ventoy {
                linux::guess_distribution(fs, loader_path, &mut hints);
            }
            (options, initrd) = linux::main_linux_options(fs, loader_path);
        }
        add_hints(&mut hints, "linux");
        shortcut = shortcut.or(Some('L'));
        OsType::LinuxStub
    } else if contains_ignore_case(name, "grub") {
        add_hints(&mut hints, "grub,linux");
        shortcut = Some('G');
        OsType::Grub
    } else if stem.eq_ignore_ascii_case("opencore") {
        add_hints(&mut hints, "opencore");
        OsType::OpenCore
    } else if stem.eq_ignore_ascii_case("clover") || stem.eq_ignore_ascii_case("cloverx64") {
        add_hints(&mut hints, "clover");
        OsType::Clover
    } else if let Some(family) = REFIND_FAMILY
        .iter()
        .find(|x| contains_ignore_case(loader_path, x))
    {
        add_hints(&mut hints, family);
        shortcut = Some('R');
        OsType::RefindFamily
    } else if name.eq_ignore_ascii_case("diags.efi") {
        add_hints(&mut hints, "hwtest");
        OsType::Unknown
    } else if name.eq_ignore_ascii_case("e.efi") || contains_ignore_case(name, "elilo") {
        add_hints(&mut hints, "elilo,linux");
        shortcut = shortcut.or(Some('L'));
        OsType::Elilo
    } else if name.eq_ignore_ascii_case("xom.efi") {
        add_hints(&mut hints, "xom,win,win8");
        shortcut = Some('W');
        options = "-s -h".into();
        OsType::Xom
    } else if contains_ignore_case(name, "ipxe") {
        add_hints(&mut hints, "network");
        shortcut = Some('N');
        OsType::Network
    } else {
        OsType::Unknown
    };

    let graphics = os_type
        .graphics_flag()
        .is_some_and(|x| config.graphics_for.contains(x));

    Classification {
        os_type,
        hints,
        shortcut: shortcut.map(|x| x.to_ascii_uppercase()),
        graphics,
        options,
        initrd,
    }
}
