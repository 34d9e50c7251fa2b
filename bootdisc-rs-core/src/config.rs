// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! Provides [`BootConfig`], the configuration record read by every part of the engine.
//!
//! This parses space separated key value pairs, the format of which is defined in the [`BootConfig`] struct. Lists
//! are comma-delimited strings, and are walked with the helpers in [`crate::system::strings`].
//!
//! The record is built once at startup and passed around by reference. Nothing reads it through global state.
//!
//! Example configuration:
//!
//! ```text
//! # Seconds before the default entry is booted
//! timeout 10
//!
//! # Boot whatever was booted last, or Windows if nothing was
//! default_selection +,Windows
//!
//! # Which disks to look for loaders on
//! scan_for internal,external,firmware
//!
//! # Directories and volumes that should never be scanned
//! dont_scan_dirs ESP:\EFI\tools,\EFI\old
//! dont_scan_volumes Recovery
//!
//! # Relaunch Windows through a firmware boot entry
//! enforce_trust windows
//!
//! # Append to boot-args when booting macOS
//! set_boot_args -no_compat_check
//! disable_amfi true
//! ```

use alloc::{borrow::ToOwned, string::String};
use bitflags::{Flags, bitflags};
use log::{LevelFilter, warn};
use thiserror::Error;

use crate::system::{
    fs::VolumeFs,
    strings::{comma_items, join_path},
};

/// The name of the configuration file.
pub const CONFIG_NAME: &str = "bootdisc.conf";

/// The name of the configuration file of older releases, read when [`CONFIG_NAME`] is missing.
pub const LEGACY_CONFIG_NAME: &str = "refind.conf";

/// The largest configuration file that will be read.
pub const MAX_CONFIG_SIZE: u64 = 64 * 1024;

/// Errors that may result from reading a configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file was larger than [`MAX_CONFIG_SIZE`].
    #[error("Configuration file is too large ({0} bytes)")]
    TooLarge(u64),

    /// The file was not valid UTF-8.
    #[error("Configuration file is not valid UTF-8")]
    NotUtf8,
}

bitflags! {
    /// The disk kinds and sources that are scanned for loaders.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct ScanTargets: u8 {
        /// Internal disks.
        const INTERNAL = 1 << 0;
        /// External and removable disks.
        const EXTERNAL = 1 << 1;
        /// Optical discs.
        const OPTICAL = 1 << 2;
        /// Network boot sources.
        const NETBOOT = 1 << 3;
        /// Entries already present in the firmware boot order.
        const FIRMWARE = 1 << 4;
    }

    /// The OS families that are relaunched through a firmware boot entry instead of being loaded directly.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct TrustEnforcement: u8 {
        /// macOS, including installers.
        const MACOS = 1 << 0;
        /// Windows.
        const WINDOWS = 1 << 1;
        /// Linux kernels and GRUB.
        const LINUX = 1 << 2;
        /// `OpenCore`.
        const OPENCORE = 1 << 3;
        /// Clover.
        const CLOVER = 1 << 4;
        /// Anything else.
        const OTHER = 1 << 5;
    }

    /// APFS volume roles that are not scanned.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct ApfsSkip: u8 {
        /// The sealed system volume.
        const SYSTEM = 1 << 0;
        /// The data volume.
        const DATA = 1 << 1;
        /// The preboot volume.
        const PREBOOT = 1 << 2;
    }

    /// The loaders that are started in graphics mode rather than text mode.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct GraphicsFor: u8 {
        /// macOS.
        const OSX = 1 << 0;
        /// Linux kernels.
        const LINUX = 1 << 1;
        /// ELILO.
        const ELILO = 1 << 2;
        /// GRUB.
        const GRUB = 1 << 3;
        /// Windows.
        const WINDOWS = 1 << 4;
        /// `OpenCore`.
        const OPENCORE = 1 << 5;
        /// Clover.
        const CLOVER = 1 << 6;
    }
}

/// How the Bluetooth controller variables are synced before booting macOS or `OpenCore`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SyncPolicy {
    /// Sync every time, unless the same selection was just synced.
    Always,

    /// Ask before syncing.
    Ask,

    /// Never sync.
    #[default]
    Never,
}

/// The configuration record of the boot manager.
#[derive(Clone, Debug)]
pub struct BootConfig {
    /// The timeout before the default entry is selected.
    pub timeout: i64,

    /// Titles of entries that may be selected by default, in order. `+` means the previously booted entry.
    pub default_selection: String,

    /// The maximum level of log records, overriding the frontend.
    pub log_level: Option<LevelFilter>,

    /// What is scanned for loaders.
    pub scan_for: ScanTargets,

    /// Volumes that are never scanned, by name or partition GUID.
    pub dont_scan_volumes: String,

    /// Directories that are never scanned, optionally prefixed with `volume:`.
    pub dont_scan_dirs: String,

    /// Files that are never added, by name, path or `volume:path`.
    pub dont_scan_files: String,

    /// Tools that are never added, in the same form as `dont_scan_files`.
    pub dont_scan_tools: String,

    /// Firmware boot entries that are not shown, by label substring.
    pub dont_scan_firmware: String,

    /// Directories scanned on top of the usual ones, optionally prefixed with `volume:`.
    pub also_scan_dirs: String,

    /// Filename prefixes that mark a Linux kernel.
    pub linux_prefixes: String,

    /// Glob patterns of Linux kernels without an `.efi` extension.
    pub linux_match_patterns: String,

    /// Scans for kernels matching [`Self::linux_match_patterns`] even without an `.efi` extension.
    pub scan_all_linux_kernels: bool,

    /// Folds every kernel of a directory into the sub-menu of the newest one.
    pub fold_linux_kernels: bool,

    /// APFS roles that are skipped.
    pub skip_apfs_roles: ApfsSkip,

    /// OS families that are relaunched through a firmware boot entry.
    pub enforce_trust: TrustEnforcement,

    /// Asks the user before relaunching through a firmware boot entry.
    pub require_trust_verify: bool,

    /// Filters NVRAM writes while Windows is being loaded.
    pub protect_nvram: bool,

    /// Filters NVRAM writes for unidentified loaders too.
    pub nvram_protect_ex: bool,

    /// The largest non-volatile write allowed through the filter.
    pub nvram_size_limit: usize,

    /// Arguments appended to `boot-args` before booting macOS.
    pub set_boot_args: Option<String>,

    /// Adds `amfi_get_out_of_my_way=1` to `boot-args`.
    pub disable_amfi: bool,

    /// Adds `-no_compat_check` to `boot-args`.
    pub disable_compat_check: bool,

    /// Adds `-nopanicdialog` to `boot-args`.
    pub disable_panic_log: bool,

    /// Clears the Apple internal bit from `csr-active-config`.
    pub normalise_csr: bool,

    /// Enables TRIM for third party SSDs.
    pub force_trim: bool,

    /// How Bluetooth controller variables are synced.
    pub sync_bluetooth: SyncPolicy,

    /// Never records or reads back the previously booted entry.
    pub ignore_previous_boot: bool,

    /// Loaders started in graphics mode.
    pub graphics_for: GraphicsFor,
}

impl BootConfig {
    /// Loads the configuration from the directory the boot manager was started from.
    ///
    /// `override_name` comes from the `-c` load option. Without it, [`CONFIG_NAME`] is tried, then
    /// [`LEGACY_CONFIG_NAME`]. If no file can be read, the defaults are used.
    pub fn load(fs: &mut (impl VolumeFs + ?Sized), dir: &str, override_name: Option<&str>) -> Self {
        if let Some(name) = override_name {
            match Self::read(fs, &join_path(dir, name)) {
                Ok(Some(config)) => return config,
                Ok(None) => warn!("Configuration file {name} not found, using {CONFIG_NAME}"),
                Err(e) => warn!("{e}"),
            }
        }

        match Self::read(fs, &join_path(dir, CONFIG_NAME)) {
            Ok(Some(config)) => return config,
            Ok(None) => (),
            Err(e) => {
                warn!("{e}");
                return Self::default();
            }
        }

        match Self::read(fs, &join_path(dir, LEGACY_CONFIG_NAME)) {
            Ok(Some(config)) => {
                warn!(
                    "{CONFIG_NAME} not found, read {LEGACY_CONFIG_NAME} instead. Some options may not be recognized"
                );
                config
            }
            Ok(None) => Self::default(),
            Err(e) => {
                warn!("{e}");
                Self::default()
            }
        }
    }

    /// Reads and parses one configuration file, if it exists.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the file is too large or not UTF-8.
    pub fn read(
        fs: &mut (impl VolumeFs + ?Sized),
        path: &str,
    ) -> Result<Option<Self>, ConfigError> {
        let Some(size) = fs.file_size(path) else {
            return Ok(None);
        };
        if size > MAX_CONFIG_SIZE {
            return Err(ConfigError::TooLarge(size));
        }

        let Ok(content) = fs.read(path) else {
            return Ok(None);
        };
        let content = str::from_utf8(&content).map_err(|_| ConfigError::NotUtf8)?;
        Ok(Some(Self::parse(content)))
    }

    /// Parses the contents of a [`BootConfig`] format string.
    #[must_use = "Has no effect if the result is unused"]
    pub fn parse(content: &str) -> Self {
        let mut config = Self::default();

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (key, value) = line.split_once([' ', '\t']).unwrap_or((line, ""));
            let value = value.trim();
            match &*key.to_ascii_lowercase() {
                "timeout" => parse_into(&mut config.timeout, key, value),
                "default_selection" => value.clone_into(&mut config.default_selection),
                "log_level" => {
                    if let Ok(value) = value.parse() {
                        config.log_level = Some(value);
                    } else {
                        warn!("Unknown log level \"{value}\"");
                    }
                }
                "scan_for" => config.scan_for = flags_from_list(value),
                "dont_scan_volumes" => value.clone_into(&mut config.dont_scan_volumes),
                "dont_scan_dirs" => value.clone_into(&mut config.dont_scan_dirs),
                "dont_scan_files" => value.clone_into(&mut config.dont_scan_files),
                "dont_scan_tools" => value.clone_into(&mut config.dont_scan_tools),
                "dont_scan_firmware" => value.clone_into(&mut config.dont_scan_firmware),
                "also_scan_dirs" => value.clone_into(&mut config.also_scan_dirs),
                "linux_prefixes" => value.clone_into(&mut config.linux_prefixes),
                "linux_match_patterns" => value.clone_into(&mut config.linux_match_patterns),
                "scan_all_linux_kernels" => {
                    parse_into(&mut config.scan_all_linux_kernels, key, value);
                }
                "fold_linux_kernels" => parse_into(&mut config.fold_linux_kernels, key, value),
                "skip_apfs_roles" => config.skip_apfs_roles = flags_from_list(value),
                "enforce_trust" => config.enforce_trust = flags_from_list(value),
                "require_trust_verify" => {
                    parse_into(&mut config.require_trust_verify, key, value);
                }
                "protect_nvram" => parse_into(&mut config.protect_nvram, key, value),
                "nvram_protect_ex" => parse_into(&mut config.nvram_protect_ex, key, value),
                "nvram_size_limit" => parse_into(&mut config.nvram_size_limit, key, value),
                "set_boot_args" => {
                    config.set_boot_args = Some(value.trim_matches('"').to_owned())
                        .filter(|x| !x.is_empty());
                }
                "disable_amfi" => parse_into(&mut config.disable_amfi, key, value),
                "disable_compat_check" => {
                    parse_into(&mut config.disable_compat_check, key, value);
                }
                "disable_panic_log" => parse_into(&mut config.disable_panic_log, key, value),
                "normalise_csr" => parse_into(&mut config.normalise_csr, key, value),
                "force_trim" => parse_into(&mut config.force_trim, key, value),
                "sync_bluetooth" => match &*value.to_ascii_lowercase() {
                    "always" => config.sync_bluetooth = SyncPolicy::Always,
                    "ask" => config.sync_bluetooth = SyncPolicy::Ask,
                    "never" => config.sync_bluetooth = SyncPolicy::Never,
                    _ => warn!("Unknown sync_bluetooth policy \"{value}\""),
                },
                "ignore_previous_boot" => {
                    parse_into(&mut config.ignore_previous_boot, key, value);
                }
                "graphics_for" => config.graphics_for = flags_from_list(value),
                _ => (),
            }
        }

        config
    }
}

impl Default for BootConfig {
    fn default() -> Self {
        Self {
            timeout: 5,
            default_selection: "+".to_owned(),
            log_level: None,
            scan_for: ScanTargets::INTERNAL | ScanTargets::EXTERNAL | ScanTargets::OPTICAL,
            dont_scan_volumes: "LRS_ESP".to_owned(),
            dont_scan_dirs: String::new(),
            dont_scan_files: "shim.efi,shim-fedora.efi,shimx64.efi,PreLoader.efi,TextMode.efi,ebounce.efi,GraphicsConsole.efi,MokManager.efi,HashTool.efi,HashTool-signed.efi,fbx64.efi,fbia32.efi,fbaa64.efi,mmx64.efi,mmia32.efi,mmaa64.efi".to_owned(),
            dont_scan_tools: String::new(),
            dont_scan_firmware: String::new(),
            also_scan_dirs: "boot,@/boot".to_owned(),
            linux_prefixes: "vmlinuz,bzImage,kernel".to_owned(),
            linux_match_patterns: "vmlinuz*,bzImage*,kernel*".to_owned(),
            scan_all_linux_kernels: true,
            fold_linux_kernels: true,
            skip_apfs_roles: ApfsSkip::SYSTEM | ApfsSkip::DATA,
            enforce_trust: TrustEnforcement::empty(),
            require_trust_verify: false,
            protect_nvram: false,
            nvram_protect_ex: false,
            nvram_size_limit: 0,
            set_boot_args: None,
            disable_amfi: false,
            disable_compat_check: false,
            disable_panic_log: false,
            normalise_csr: false,
            force_trim: false,
            sync_bluetooth: SyncPolicy::Never,
            ignore_previous_boot: false,
            graphics_for: GraphicsFor::OSX,
        }
    }
}

/// Parses a value into a field, keeping the current value (and warning) if it does not parse.
fn parse_into<T: core::str::FromStr>(field: &mut T, key: &str, value: &str) {
    if let Ok(value) = value.parse() {
        *field = value;
    } else {
        warn!("Ignoring malformed value \"{value}\" for {key}");
    }
}

/// Builds a set of flags from a comma-delimited list of flag names, ignoring case.
///
/// Unknown names are skipped with a warning.
fn flags_from_list<F: Flags>(list: &str) -> F {
    let mut flags = F::empty();
    for item in comma_items(list) {
        match F::FLAGS.iter().find(|x| x.name().eq_ignore_ascii_case(item)) {
            Some(flag) => flags.insert(F::from_bits_retain(flag.value().bits())),
            None => warn!("Unknown option \"{item}\""),
        }
    }
    flags
}

/// Extracts the configuration filename from the `-c <filename>` load option.
#[must_use = "Has no effect if the result is unused"]
pub fn config_override(load_options: &str) -> Option<&str> {
    let mut tokens = load_options.split_whitespace();
    while let Some(token) = tokens.next() {
        if token == "-c" {
            return tokens.next();
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::fs::mock::MemFs;

    #[test]
    fn test_parse() {
        let config = BootConfig::parse(
            "# comment\n\
             timeout 10\n\
             scan_for internal,Firmware,bogus\n\
             enforce_trust windows,linux\n\
             fold_linux_kernels false\n\
             nvram_size_limit notanumber\n\
             sync_bluetooth ask\n\
             dont_scan_tools gptsync_x64.efi,gdisk_x64.efi\n\
             log_level debug\n\
             set_boot_args \"-v keepsyms=1\"\n",
        );
        assert_eq!(config.timeout, 10);
        assert_eq!(config.scan_for, ScanTargets::INTERNAL | ScanTargets::FIRMWARE);
        assert_eq!(
            config.enforce_trust,
            TrustEnforcement::WINDOWS | TrustEnforcement::LINUX
        );
        assert!(!config.fold_linux_kernels);
        assert_eq!(config.nvram_size_limit, 0);
        assert_eq!(config.sync_bluetooth, SyncPolicy::Ask);
        assert_eq!(config.dont_scan_tools, "gptsync_x64.efi,gdisk_x64.efi");
        assert_eq!(config.log_level, Some(LevelFilter::Debug));
        assert_eq!(config.set_boot_args.as_deref(), Some("-v keepsyms=1"));
    }

    #[test]
    fn test_load_order() {
        let mut fs = MemFs::new()
            .file("\\EFI\\bootdisc\\refind.conf", b"timeout 3", 0)
            .file("\\EFI\\bootdisc\\custom.conf", b"timeout 7", 0);

        let config = BootConfig::load(&mut fs, "\\EFI\\bootdisc", None);
        assert_eq!(config.timeout, 3);

        let config = BootConfig::load(&mut fs, "\\EFI\\bootdisc", Some("custom.conf"));
        assert_eq!(config.timeout, 7);

        let mut fs = fs.file("\\EFI\\bootdisc\\bootdisc.conf", b"timeout 1", 0);
        let config = BootConfig::load(&mut fs, "\\EFI\\bootdisc", Some("missing.conf"));
        assert_eq!(config.timeout, 1);
    }

    #[test]
    fn test_too_large() {
        let big = alloc::vec![b'#'; 70_000];
        let mut fs = MemFs::new().file("\\bootdisc.conf", big.as_slice(), 0);
        assert!(matches!(
            BootConfig::read(&mut fs, "\\bootdisc.conf"),
            Err(ConfigError::TooLarge(70_000))
        ));
        assert_eq!(BootConfig::load(&mut fs, "\\", None).timeout, 5);
    }

    #[test]
    fn test_config_override() {
        assert_eq!(config_override("bootdisc.efi -c test.conf"), Some("test.conf"));
        assert_eq!(config_override("bootdisc.efi"), None);
        assert_eq!(config_override("-c"), None);
    }
}
