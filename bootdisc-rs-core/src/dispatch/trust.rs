// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! Trust sync: relaunching a loader through a firmware boot entry.
//!
//! Some platform features, such as measured boot or firmware-enforced signing, only work when the firmware itself
//! starts the loader. Instead of chainloading, trust sync makes sure a `Boot####` entry exists for the loader,
//! points `BootNext` at it and resets.

use core::convert::Infallible;

use alloc::format;
use log::info;

use crate::{
    BootResult,
    config::BootConfig,
    dispatch::{DispatchError, platform::Platform},
    entry::LoaderEntry,
    nvram::manager::{create_nvram_entry, set_boot_next},
    scan::filter::is_valid_loader,
    system::variable::store_previous_boot,
    volume::Volume,
};

/// Relaunches a loader through a firmware boot entry.
///
/// The steps are taken in a fixed order: the loader is validated, the user confirms if
/// [`BootConfig::require_trust_verify`] is set, the boot entry is created (or an identical one reused), `BootNext`
/// is set, the previous boot is stamped and the system is cold reset. Nothing is written before the user confirms.
///
/// # Errors
///
/// May return an `Error` if the loader is not an EFI application, the user declined, a variable could not be
/// written, or the system did not reset.
pub fn trust_sync<P: Platform + ?Sized>(
    platform: &mut P,
    config: &BootConfig,
    entry: &LoaderEntry,
    volume: &Volume,
    loader_path: &str,
) -> BootResult<Infallible> {
    let mut fs = platform.open_volume(volume)?;
    if !is_valid_loader(&mut *fs, loader_path) {
        return Err(DispatchError::InvalidLoader(loader_path.into()).into());
    }
    drop(fs);

    if config.require_trust_verify {
        let question = format!("Relaunch \"{}\" through the firmware boot menu?", entry.short_title);
        if !platform.confirm(&question) {
            return Err(DispatchError::NotConfirmed.into());
        }
    }

    let store = platform.variables();
    let boot_num = create_nvram_entry(
        &mut *store,
        &volume.device_path,
        loader_path,
        &entry.short_title,
        false,
    )?;
    set_boot_next(&mut *store, boot_num)?;
    if !config.ignore_previous_boot {
        store_previous_boot(&mut *store, &entry.title)?;
    }

    info!("Relaunching \"{}\" as Boot{boot_num:04x}", entry.title);
    platform.cold_reset()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dispatch::platform::mock::{Call, MockPlatform},
        entry::builder::LoaderEntryBuilder,
        error::BootError,
        nvram::{
            boot_var_name,
            manager::{BOOT_NEXT, find_boot_num},
            construct_boot_entry,
            tests::volume_device_path,
        },
        system::{
            fs::mock::{MemFs, pe_image},
            variable::{PERSISTENT, VariableStore, get_value, previous_boot},
        },
        volume::{DiskKind, FsType},
    };
    use alloc::rc::Rc;
    use uefi::runtime::VariableVendor;

    const LOADER: &str = "\\EFI\\fedora\\shimx64.efi";

    fn entry() -> (LoaderEntry, Rc<Volume>) {
        let mut volume = Volume::new(FsType::Fat32, DiskKind::Internal);
        volume.vol_name = Some("ESP".into());
        volume.device_path = volume_device_path();
        let volume = Rc::new(volume);
        let entry = LoaderEntryBuilder::disk(volume.clone(), LOADER)
            .title("fedora")
            .build();
        (entry, volume)
    }

    #[test]
    fn test_trust_sync() -> BootResult<()> {
        let (entry, volume) = entry();
        let mut platform = MockPlatform::new().with_fs(MemFs::new().file(LOADER, pe_image(1), 1));

        let result = trust_sync(&mut platform, &BootConfig::default(), &entry, &volume, LOADER);
        assert!(matches!(
            result,
            Err(BootError::DispatchError(DispatchError::ResetFailed))
        ));
        assert_eq!(platform.calls, [Call::ColdReset]);

        let next: u16 = get_value(&mut platform.store, BOOT_NEXT, &VariableVendor::GLOBAL_VARIABLE)?;
        let bytes = construct_boot_entry(&volume.device_path, LOADER, "fedora")?;
        assert_eq!(find_boot_num(&mut platform.store, &bytes)?, (next, true));
        assert_eq!(
            previous_boot(&mut platform.store)?.as_deref(),
            Some("Boot fedora from ESP")
        );
        Ok(())
    }

    #[test]
    fn test_trust_sync_reuses_entry() -> BootResult<()> {
        let (entry, volume) = entry();
        let mut platform = MockPlatform::new().with_fs(MemFs::new().file(LOADER, pe_image(1), 1));
        let bytes = construct_boot_entry(&volume.device_path, LOADER, "fedora")?;
        platform.store.set(
            &boot_var_name(0),
            &VariableVendor::GLOBAL_VARIABLE,
            PERSISTENT,
            &bytes,
        )?;

        let _ = trust_sync(&mut platform, &BootConfig::default(), &entry, &volume, LOADER);
        let next: u16 = get_value(&mut platform.store, BOOT_NEXT, &VariableVendor::GLOBAL_VARIABLE)?;
        assert_eq!(next, 0);
        assert_eq!(platform.store.write_count(&boot_var_name(0)), 1);
        Ok(())
    }

    #[test]
    fn test_invalid_loader() {
        let (entry, volume) = entry();
        let mut platform = MockPlatform::new().with_fs(MemFs::new().file(LOADER, "not a loader", 1));

        let result = trust_sync(&mut platform, &BootConfig::default(), &entry, &volume, LOADER);
        assert!(matches!(
            result,
            Err(BootError::DispatchError(DispatchError::InvalidLoader(_)))
        ));
        assert!(platform.calls.is_empty());
        assert!(platform.store.writes().is_empty());
    }

    #[test]
    fn test_ignore_previous_boot() -> BootResult<()> {
        let (entry, volume) = entry();
        let mut platform = MockPlatform::new().with_fs(MemFs::new().file(LOADER, pe_image(1), 1));
        let config = BootConfig {
            ignore_previous_boot: true,
            ..BootConfig::default()
        };

        let _ = trust_sync(&mut platform, &config, &entry, &volume, LOADER);
        assert!(previous_boot(&mut platform.store)?.is_none());
        assert_eq!(platform.calls, [Call::ColdReset]);
        Ok(())
    }
}
