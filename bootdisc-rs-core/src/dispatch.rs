// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! The per-selection dispatch state machine.
//!
//! Once the user commits to an entry, the [`Dispatcher`] walks it through a fixed set of states:
//!
//! ```text
//! Idle -> Selected -> Classified -> TrustCheckSkipped  -> Dispatch
//!                                -> TrustCheckRequired -> Dispatch | Abort
//! ```
//!
//! Classification re-derives the OS family of the entry from its title, loader path and [`OsType`], since a title
//! may have been changed by a manual stanza after the scanner classified it. The family then decides which
//! platform mitigations run, whether the NVRAM write filter is installed, and whether the entry is relaunched
//! through a firmware boot entry ("trust sync") instead of being started directly.
//!
//! Both hand-offs never return on success. Any return is an error, which is logged as an unexpected return and
//! handed back to the caller so the menu can be shown again.

use alloc::string::String;
use core::convert::Infallible;

use log::{debug, error, info};
use thiserror::Error;
use tinyvec::ArrayVec;

use crate::{
    BootResult,
    classify::OsType,
    config::{BootConfig, TrustEnforcement},
    entry::{EntryTarget, LoaderEntry, SubEntry},
    nvram::manager::set_boot_next,
    system::{
        strings::{basename, contains_ignore_case, starts_with_ignore_case},
        variable::store_previous_boot,
    },
};

pub mod filter;
pub mod mitigations;
pub mod platform;
pub mod trust;

use filter::FilterPolicy;
use platform::Platform;

/// Phrases in a title that mark a macOS installer.
const INSTALLER_PHRASES: [&str; 5] = [
    "Install macOS",
    "macOS Installer",
    "Install OS X",
    "OS X Installer",
    "Mac OS Installer",
];

/// A path fragment that marks a macOS installer.
const INSTALLER_PATH: &str = "com.apple.installer";

/// Filename prefixes of Linux kernels.
const KERNEL_PREFIXES: [&str; 3] = ["vmlinuz", "bzImage", "kernel"];

/// An `Error` that may result from dispatching an entry.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// `OpenCore` was selected while it is already the running chain.
    #[error("OpenCore is already running and cannot be loaded again")]
    SelfChainload,

    /// The loader to relaunch is not an EFI application.
    #[error("\"{0}\" is not a valid EFI loader")]
    InvalidLoader(String),

    /// The user declined the trust sync confirmation.
    #[error("Trust sync was not confirmed")]
    NotConfirmed,

    /// A hand-off returned control to the boot manager.
    #[error("Unexpected return from \"{0}\"")]
    UnexpectedReturn(String),

    /// The firmware did not reset when asked to.
    #[error("The system did not reset")]
    ResetFailed,

    /// No entry exists at the selected index.
    #[error("No entry at index {0}")]
    NoSuchEntry(usize),
}

/// The states a selection moves through.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DispatchState {
    /// Nothing has been selected.
    #[default]
    Idle,

    /// The user committed to an entry.
    Selected,

    /// The OS family of the entry is known.
    Classified,

    /// The entry is started directly.
    TrustCheckSkipped,

    /// The entry is relaunched through a firmware boot entry.
    TrustCheckRequired,

    /// Control is being handed off.
    Dispatch,

    /// The selection was given up, and the menu is shown again.
    Abort,
}

/// The OS family of a selected entry, as far as dispatch is concerned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OsFamily {
    /// A macOS installer.
    MacOsInstaller,

    /// macOS.
    MacOs,

    /// Windows.
    Windows,

    /// GRUB.
    Grub,

    /// A bare Linux kernel, by filename.
    LinuxKernel,

    /// Some other Linux loader.
    Linux,

    /// rEFInd, rEFIt or RefindPlus.
    RefindFamily,

    /// `OpenCore`.
    OpenCore,

    /// Clover.
    Clover,

    /// A loader on a Ventoy volume.
    Ventoy,

    /// Anything else, started as a plain EFI application.
    Other,
}

impl OsFamily {
    /// Derives the family from an entry's title, loader path and type.
    ///
    /// The rules are tried in order and the first match wins. A macOS installer is checked before macOS itself,
    /// and a loader in the Microsoft boot directory is Windows whatever its title says.
    #[must_use = "Has no effect if the result is unused"]
    pub fn derive(title: &str, loader_path: &str, os_type: OsType, ventoy_volume: bool) -> Self {
        let name = basename(loader_path);

        if os_type == OsType::MacOsInstaller
            || INSTALLER_PHRASES.iter().any(|x| contains_ignore_case(title, x))
            || contains_ignore_case(loader_path, INSTALLER_PATH)
        {
            Self::MacOsInstaller
        } else if !contains_ignore_case(title, "Windows")
            && contains_ignore_case(loader_path, "EFI\\Microsoft\\Boot")
        {
            Self::Windows
        } else if os_type == OsType::MacOs
            || contains_ignore_case(title, "Mac OS")
            || contains_ignore_case(title, "macOS")
        {
            Self::MacOs
        } else if os_type == OsType::Windows || contains_ignore_case(title, "Windows") {
            Self::Windows
        } else if os_type == OsType::Grub || contains_ignore_case(title, "grub") {
            Self::Grub
        } else if KERNEL_PREFIXES
            .iter()
            .any(|x| starts_with_ignore_case(name, x))
        {
            Self::LinuxKernel
        } else if matches!(os_type, OsType::LinuxStub | OsType::Elilo)
            || contains_ignore_case(title, "Linux")
        {
            Self::Linux
        } else if os_type == OsType::RefindFamily
            || contains_ignore_case(loader_path, "refind")
            || contains_ignore_case(loader_path, "refit")
        {
            Self::RefindFamily
        } else if os_type == OsType::OpenCore
            || contains_ignore_case(title, "OpenCore")
            || contains_ignore_case(loader_path, "\\OpenCore")
        {
            Self::OpenCore
        } else if os_type == OsType::Clover
            || contains_ignore_case(title, "Clover")
            || contains_ignore_case(loader_path, "\\Clover")
        {
            Self::Clover
        } else if ventoy_volume || starts_with_ignore_case(title, "Ventoy") {
            Self::Ventoy
        } else {
            Self::Other
        }
    }

    /// Returns the enforcement flag that covers the family.
    ///
    /// Ventoy is never enforced.
    #[must_use = "Has no effect if the result is unused"]
    pub const fn enforcement_flag(self) -> Option<TrustEnforcement> {
        match self {
            Self::MacOsInstaller | Self::MacOs => Some(TrustEnforcement::MACOS),
            Self::Windows => Some(TrustEnforcement::WINDOWS),
            Self::Grub | Self::LinuxKernel | Self::Linux => Some(TrustEnforcement::LINUX),
            Self::OpenCore => Some(TrustEnforcement::OPENCORE),
            Self::Clover => Some(TrustEnforcement::CLOVER),
            Self::RefindFamily | Self::Other => Some(TrustEnforcement::OTHER),
            Self::Ventoy => None,
        }
    }

    /// Checks if an entry of this family must be relaunched through a firmware boot entry.
    #[must_use = "Has no effect if the result is unused"]
    pub fn trust_required(self, enforce: TrustEnforcement) -> bool {
        self.enforcement_flag().is_some_and(|x| enforce.contains(x))
    }

    /// Checks if the family is a macOS.
    #[must_use = "Has no effect if the result is unused"]
    pub const fn is_macos(self) -> bool {
        matches!(self, Self::MacOs | Self::MacOsInstaller)
    }

    /// Checks if the family is a bootstrap that loads macOS itself.
    #[must_use = "Has no effect if the result is unused"]
    pub const fn is_bootstrap(self) -> bool {
        matches!(self, Self::OpenCore | Self::Clover)
    }

    /// Checks if the NVRAM write filter covers the family with the current configuration.
    #[must_use = "Has no effect if the result is unused"]
    pub const fn filtered(self, config: &BootConfig) -> bool {
        config.protect_nvram
            && match self {
                Self::Windows => true,
                Self::Other => config.nvram_protect_ex,
                _ => false,
            }
    }
}

/// Walks one selection through the dispatch states.
pub struct Dispatcher<'a, P: Platform + ?Sized> {
    /// The configuration the selection is dispatched with.
    config: &'a BootConfig,

    /// Access to the firmware.
    platform: &'a mut P,

    /// Every state the selection has been in, oldest first.
    history: ArrayVec<[DispatchState; 8]>,

    /// The family of the selection, once classified.
    family: Option<OsFamily>,
}

impl<'a, P: Platform + ?Sized> Dispatcher<'a, P> {
    /// Creates a dispatcher in the [`DispatchState::Idle`] state.
    pub fn new(config: &'a BootConfig, platform: &'a mut P) -> Self {
        let mut history = ArrayVec::new();
        history.push(DispatchState::Idle);
        Self {
            config,
            platform,
            history,
            family: None,
        }
    }

    /// Returns the current state.
    #[must_use = "Has no effect if the result is unused"]
    pub fn state(&self) -> DispatchState {
        self.history.last().copied().unwrap_or_default()
    }

    /// Returns every state the selection has been in, oldest first.
    #[must_use = "Has no effect if the result is unused"]
    pub fn history(&self) -> &[DispatchState] {
        &self.history
    }

    /// Returns the family the selection was classified as.
    #[must_use = "Has no effect if the result is unused"]
    pub const fn family(&self) -> Option<OsFamily> {
        self.family
    }

    /// Moves to the next state.
    fn advance(&mut self, next: DispatchState) {
        debug!("Dispatch: {:?} -> {next:?}", self.state());
        if self.history.len() == self.history.capacity() {
            self.history.remove(1);
        }
        self.history.push(next);
    }

    /// Gives up on the selection, handing the error back.
    fn abort<T>(&mut self, e: impl Into<crate::error::BootError>) -> BootResult<T> {
        let e = e.into();
        self.advance(DispatchState::Abort);
        Err(e)
    }

    /// Dispatches an entry, or one of the variants of its sub-menu.
    ///
    /// This only returns on failure. The caller should report the error and show the menu again.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the entry was rejected, the user declined trust sync, a firmware variable could not
    /// be written, or the hand-off returned.
    pub fn run(&mut self, entry: &LoaderEntry, variant: Option<&SubEntry>) -> BootResult<Infallible> {
        self.advance(DispatchState::Selected);
        info!("Selected \"{}\"", entry.title);

        match &entry.target {
            EntryTarget::Firmware { boot_num, .. } => {
                self.family = Some(OsFamily::Other);
                self.advance(DispatchState::Classified);
                self.advance(DispatchState::TrustCheckSkipped);
                self.reboot_to_firmware_entry(entry, *boot_num)
            }
            EntryTarget::Disk {
                volume,
                loader_path,
            } => {
                let loader_path = variant.map_or(loader_path.as_str(), |x| x.loader_path.as_str());
                let options = variant.map_or(entry.options.as_str(), |x| x.options.as_str());

                let family = OsFamily::derive(
                    &entry.short_title,
                    loader_path,
                    entry.os_type,
                    volume.is_ventoy(),
                );
                self.family = Some(family);
                self.advance(DispatchState::Classified);
                debug!("Classified \"{}\" as {family:?}", entry.title);

                if family.is_bootstrap() && self.platform.opencore_running() {
                    self.platform
                        .warn_user("OpenCore is already running. Chainloading it again is not supported.");
                    return self.abort(DispatchError::SelfChainload);
                }

                self.apply_mitigations(entry, loader_path, family);

                if family.trust_required(self.config.enforce_trust) && !volume.is_ventoy() {
                    self.advance(DispatchState::TrustCheckRequired);
                    let result = trust::trust_sync(
                        &mut *self.platform,
                        self.config,
                        entry,
                        volume,
                        loader_path,
                    );
                    return match result {
                        Ok(never) => match never {},
                        Err(e) => {
                            error!("Trust sync of \"{}\" failed: {e}", entry.title);
                            self.abort(e)
                        }
                    };
                }

                self.advance(DispatchState::TrustCheckSkipped);
                if family.filtered(self.config) {
                    let policy = FilterPolicy::new(
                        &self.platform.firmware_vendor(),
                        self.config.nvram_size_limit,
                    );
                    if let Err(e) = self.platform.install_nvram_filter(policy) {
                        error!("Failed to install the NVRAM write filter: {e}");
                    }
                }
                self.stamp_previous_boot(&entry.title);

                self.advance(DispatchState::Dispatch);
                match self.platform.start_loader(volume, loader_path, options) {
                    Ok(never) => match never {},
                    Err(e) => {
                        error!("Unexpected return from \"{}\": {e}", entry.title);
                        self.abort(DispatchError::UnexpectedReturn(entry.title.clone()))
                    }
                }
            }
        }
    }

    /// Runs the side effects that belong to a family before it is started.
    ///
    /// Failures are logged and do not stop the dispatch.
    fn apply_mitigations(&mut self, entry: &LoaderEntry, loader_path: &str, family: OsFamily) {
        if !family.is_macos() && !family.is_bootstrap() {
            return;
        }

        let config = self.config;
        if family.is_macos() {
            mitigations::apply_macos_mitigations(self.platform.variables(), config);
        }

        let selection = mitigations::selection_digest(&entry.title, loader_path);
        if let Err(e) = mitigations::sync_bluetooth(&mut *self.platform, config.sync_bluetooth, selection) {
            error!("Failed to sync Bluetooth controller state: {e}");
        }
    }

    /// Records the title of the selection, unless previous boots are ignored.
    fn stamp_previous_boot(&mut self, title: &str) {
        if self.config.ignore_previous_boot {
            return;
        }
        if let Err(e) = store_previous_boot(self.platform.variables(), title) {
            error!("Failed to record the previous boot: {e}");
        }
    }

    /// Sets `BootNext` to a firmware entry and resets into it.
    fn reboot_to_firmware_entry(&mut self, entry: &LoaderEntry, boot_num: u16) -> BootResult<Infallible> {
        if let Err(e) = set_boot_next(self.platform.variables(), boot_num) {
            return self.abort(e);
        }
        self.stamp_previous_boot(&entry.title);

        self.advance(DispatchState::Dispatch);
        info!("Rebooting into Boot{boot_num:04x}");
        match self.platform.cold_reset() {
            Ok(never) => match never {},
            Err(e) => {
                error!("Unexpected return from \"{}\": {e}", entry.title);
                self.abort(DispatchError::UnexpectedReturn(entry.title.clone()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::SyncPolicy,
        dispatch::platform::mock::{Call, MockPlatform},
        entry::builder::LoaderEntryBuilder,
        error::BootError,
        nvram::{
            boot_var_name,
            manager::{BOOT_NEXT, read_boot_entry},
        },
        system::{
            fs::mock::{MemFs, pe_image},
            variable::{
                APPLE_BOOT_GUID, PREVIOUS_BOOT, VariableStore, get_value, previous_boot,
            },
        },
        volume::{DiskKind, FsType, Volume},
    };
    use alloc::{rc::Rc, vec};
    use uefi::runtime::VariableVendor;

    fn disk_entry(title: &str, path: &str, os_type: OsType) -> LoaderEntry {
        let mut volume = Volume::new(FsType::Fat32, DiskKind::Internal);
        volume.vol_name = Some("ESP".into());
        volume.device_path = crate::nvram::tests::volume_device_path();
        LoaderEntryBuilder::disk(Rc::new(volume), path)
            .title(title)
            .os_type(os_type)
            .build()
    }

    #[test]
    fn test_family_precedence() {
        use OsFamily::*;
        let cases = [
            ("Install macOS Sonoma", "\\System\\Library\\CoreServices\\boot.efi", OsType::MacOs, MacOsInstaller),
            ("Mac OS", "\\com.apple.installer\\boot.efi", OsType::Unknown, MacOsInstaller),
            ("GRUB", "\\EFI\\Microsoft\\Boot\\bootmgfw.efi", OsType::Grub, Windows),
            ("Mac OS", "\\System\\Library\\CoreServices\\boot.efi", OsType::MacOs, MacOs),
            ("Windows (UEFI)", "\\EFI\\Microsoft\\Boot\\bootmgfw.efi", OsType::Windows, Windows),
            ("debian", "\\EFI\\debian\\grubx64.efi", OsType::Grub, Grub),
            ("Arch", "\\EFI\\arch\\vmlinuz-linux.efi", OsType::LinuxStub, LinuxKernel),
            ("ELILO", "\\EFI\\elilo\\elilo.efi", OsType::Elilo, Linux),
            ("rEFInd", "\\EFI\\refind\\refind_x64.efi", OsType::RefindFamily, RefindFamily),
            ("OC", "\\EFI\\OC\\OpenCore.efi", OsType::OpenCore, OpenCore),
            ("Clover", "\\EFI\\CLOVER\\CLOVERX64.efi", OsType::Clover, Clover),
            ("Ventoy", "\\EFI\\BOOT\\BOOTX64.EFI", OsType::Unknown, Ventoy),
            ("Fallback Boot Loader", "\\EFI\\BOOT\\BOOTX64.EFI", OsType::Unknown, Other),
        ];
        for (title, path, os_type, family) in cases {
            assert_eq!(OsFamily::derive(title, path, os_type, false), family, "{title}");
        }
        assert_eq!(
            OsFamily::derive("Fallback", "\\EFI\\BOOT\\BOOTX64.EFI", OsType::Unknown, true),
            Ventoy
        );
    }

    #[test]
    fn test_trust_required() {
        let all = TrustEnforcement::all();
        assert!(OsFamily::Windows.trust_required(all));
        assert!(OsFamily::Other.trust_required(TrustEnforcement::OTHER));
        assert!(!OsFamily::Ventoy.trust_required(all));
        assert!(!OsFamily::MacOs.trust_required(TrustEnforcement::WINDOWS));
        assert!(!OsFamily::Grub.trust_required(TrustEnforcement::empty()));
    }

    #[test]
    fn test_direct_dispatch() {
        let config = BootConfig::default();
        let mut platform = MockPlatform::new();
        let entry = disk_entry("debian", "\\EFI\\debian\\grubx64.efi", OsType::Grub);

        let mut dispatcher = Dispatcher::new(&config, &mut platform);
        let result = dispatcher.run(&entry, None);
        assert!(matches!(
            result,
            Err(BootError::DispatchError(DispatchError::UnexpectedReturn(_)))
        ));
        assert_eq!(
            dispatcher.history(),
            [
                DispatchState::Idle,
                DispatchState::Selected,
                DispatchState::Classified,
                DispatchState::TrustCheckSkipped,
                DispatchState::Dispatch,
                DispatchState::Abort,
            ]
        );
        assert_eq!(dispatcher.family(), Some(OsFamily::Grub));

        assert_eq!(
            platform.calls,
            [Call::StartLoader(String::from("\\EFI\\debian\\grubx64.efi"))]
        );
        assert_eq!(
            previous_boot(&mut platform.store).ok().flatten().as_deref(),
            Some("Boot debian from ESP")
        );
    }

    #[test]
    fn test_variant_dispatch() {
        let config = BootConfig {
            ignore_previous_boot: true,
            ..BootConfig::default()
        };
        let mut platform = MockPlatform::new();
        let entry = disk_entry("Linux", "\\EFI\\linux\\vmlinuz-6.1", OsType::LinuxStub);
        let variant = SubEntry {
            title: String::from("vmlinuz-6.0: Boot Linux"),
            loader_path: String::from("\\EFI\\linux\\vmlinuz-6.0"),
            options: String::from("ro quiet"),
            graphics: false,
        };

        let _ = Dispatcher::new(&config, &mut platform).run(&entry, Some(&variant));
        assert_eq!(
            platform.calls,
            [Call::StartLoader(String::from("\\EFI\\linux\\vmlinuz-6.0"))]
        );
        assert_eq!(platform.last_options.as_deref(), Some("ro quiet"));
        assert_eq!(platform.store.write_count(PREVIOUS_BOOT), 0);
    }

    #[test]
    fn test_trust_sync_dispatch() -> BootResult<()> {
        let config = BootConfig {
            enforce_trust: TrustEnforcement::WINDOWS,
            ..BootConfig::default()
        };
        let mut platform = MockPlatform::new()
            .with_fs(MemFs::new().file("\\EFI\\Microsoft\\Boot\\bootmgfw.efi", pe_image(1), 1));
        let entry = disk_entry(
            "Windows (UEFI)",
            "\\EFI\\Microsoft\\Boot\\bootmgfw.efi",
            OsType::Windows,
        );

        let mut dispatcher = Dispatcher::new(&config, &mut platform);
        let result = dispatcher.run(&entry, None);
        assert!(matches!(
            result,
            Err(BootError::DispatchError(DispatchError::ResetFailed))
        ));
        assert!(dispatcher.history().contains(&DispatchState::TrustCheckRequired));
        assert_eq!(dispatcher.state(), DispatchState::Abort);

        assert_eq!(platform.calls, [Call::ColdReset]);
        let next: u16 = get_value(&mut platform.store, BOOT_NEXT, &VariableVendor::GLOBAL_VARIABLE)?;
        let created = read_boot_entry(&mut platform.store, next)?;
        assert_eq!(created.map(|x| x.label).as_deref(), Some("Windows (UEFI)"));
        Ok(())
    }

    #[test]
    fn test_trust_sync_declined() {
        let config = BootConfig {
            enforce_trust: TrustEnforcement::LINUX,
            require_trust_verify: true,
            ..BootConfig::default()
        };
        let mut platform = MockPlatform::new()
            .with_fs(MemFs::new().file("\\EFI\\debian\\grubx64.efi", pe_image(1), 1))
            .confirming(false);
        let entry = disk_entry("debian", "\\EFI\\debian\\grubx64.efi", OsType::Grub);

        let result = Dispatcher::new(&config, &mut platform).run(&entry, None);
        assert!(matches!(
            result,
            Err(BootError::DispatchError(DispatchError::NotConfirmed))
        ));
        assert!(matches!(platform.calls.as_slice(), [Call::Confirm(_)]));
        assert!(platform.store.writes().is_empty());
    }

    #[test]
    fn test_opencore_self_chainload() {
        let config = BootConfig::default();
        let mut platform = MockPlatform::new().opencore_running(true);
        let entry = disk_entry("OpenCore", "\\EFI\\OC\\OpenCore.efi", OsType::OpenCore);

        let mut dispatcher = Dispatcher::new(&config, &mut platform);
        let result = dispatcher.run(&entry, None);
        assert!(matches!(
            result,
            Err(BootError::DispatchError(DispatchError::SelfChainload))
        ));
        assert_eq!(dispatcher.state(), DispatchState::Abort);
        assert!(matches!(platform.calls.as_slice(), [Call::Warning(_)]));
    }

    #[test]
    fn test_filter_installed_for_windows() {
        let config = BootConfig {
            protect_nvram: true,
            nvram_size_limit: 0x800,
            ..BootConfig::default()
        };
        let mut platform = MockPlatform::new().vendor("Apple");
        let entry = disk_entry(
            "Windows (UEFI)",
            "\\EFI\\Microsoft\\Boot\\bootmgfw.efi",
            OsType::Windows,
        );
        let _ = Dispatcher::new(&config, &mut platform).run(&entry, None);
        assert!(platform.filter.is_some());

        let mut platform = MockPlatform::new();
        let entry = disk_entry("Tool", "\\EFI\\tools\\tool.efi", OsType::Unknown);
        let _ = Dispatcher::new(&config, &mut platform).run(&entry, None);
        assert!(platform.filter.is_none());

        let config = BootConfig {
            nvram_protect_ex: true,
            ..config
        };
        let _ = Dispatcher::new(&config, &mut platform).run(&entry, None);
        assert!(platform.filter.is_some());
    }

    #[test]
    fn test_macos_mitigations() -> BootResult<()> {
        let config = BootConfig {
            disable_amfi: true,
            force_trim: true,
            sync_bluetooth: SyncPolicy::Never,
            ..BootConfig::default()
        };
        let mut platform = MockPlatform::new();
        let entry = disk_entry(
            "Mac OS",
            "\\System\\Library\\CoreServices\\boot.efi",
            OsType::MacOs,
        );
        let _ = Dispatcher::new(&config, &mut platform).run(&entry, None);

        let args = platform
            .store
            .get(mitigations::BOOT_ARGS, &VariableVendor(APPLE_BOOT_GUID))?
            .map(|x| x.data);
        assert_eq!(args, Some(b"amfi_get_out_of_my_way=1\0".to_vec()));
        assert_eq!(platform.store.write_count(mitigations::ENABLE_TRIM), 1);
        Ok(())
    }

    #[test]
    fn test_firmware_entry_dispatch() -> BootResult<()> {
        let config = BootConfig::default();
        let mut platform = MockPlatform::new();
        let entry = LoaderEntryBuilder::firmware(vec![0x7f, 0xff, 0x04, 0x00], 0x0003)
            .title("ubuntu")
            .build();

        let result = Dispatcher::new(&config, &mut platform).run(&entry, None);
        assert!(matches!(
            result,
            Err(BootError::DispatchError(DispatchError::UnexpectedReturn(_)))
        ));
        assert_eq!(platform.calls, [Call::ColdReset]);
        let next: u16 = get_value(&mut platform.store, BOOT_NEXT, &VariableVendor::GLOBAL_VARIABLE)?;
        assert_eq!(next, 3);
        assert_eq!(platform.store.write_count(&boot_var_name(3)), 0);
        Ok(())
    }
}
