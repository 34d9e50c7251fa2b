// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! Platform mitigations applied before macOS and its bootstraps are started.
//!
//! These all work by writing Apple NVRAM variables that macOS reads during its own boot:
//!
//! - `boot-args`, with the configured arguments and the AMFI, compatibility check and panic dialog flags.
//! - `csr-active-config`, with the Apple internal bit cleared.
//! - `EnableTRIM`, which turns on TRIM for third party SSDs.
//! - The Bluetooth controller variables, copied into the boot manager's own namespace.
//!
//! Every write is skipped when the variable already holds the value, so booting the same entry repeatedly does not
//! wear out NVRAM or stack up duplicate `boot-args` tokens.

use alloc::{string::String, vec::Vec};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tinyvec::TinyVec;
use uefi::runtime::VariableVendor;

use crate::{
    BootResult,
    config::{BootConfig, SyncPolicy},
    dispatch::platform::Platform,
    system::variable::{
        APPLE_BOOT_GUID, BOOTDISC_GUID, PERSISTENT, UefiVariable, VarWrite, VariableStore,
        set_if_changed,
    },
};

/// The variable holding the macOS kernel command line.
pub const BOOT_ARGS: &str = "boot-args";

/// The variable holding the System Integrity Protection configuration.
pub const CSR_ACTIVE_CONFIG: &str = "csr-active-config";

/// The variable that makes macOS enable TRIM for third party SSDs.
pub const ENABLE_TRIM: &str = "EnableTRIM";

/// The Bluetooth controller variables that are synced.
pub const BLUETOOTH_VARS: [&str; 2] = [
    "bluetoothActiveControllerInfo",
    "bluetoothInternalControllerInfo",
];

/// The private variable remembering the last Bluetooth sync.
pub const BLUETOOTH_MEMO: &str = "BluetoothSync";

/// The `csr-active-config` bit that only Apple internal builds should have.
const CSR_ALLOW_APPLE_INTERNAL: u32 = 0x10;

/// Disables Apple Mobile File Integrity.
const AMFI_OFF: &str = "amfi_get_out_of_my_way=1";

/// Skips the board compatibility check.
const NO_COMPAT_CHECK: &str = "-no_compat_check";

/// Skips the panic report dialog.
const NO_PANIC_DIALOG: &str = "-nopanicdialog";

/// The whitespace separated tokens of `boot-args`.
type BootArgs<'a> = TinyVec<[&'a str; 8]>;

/// What was synced last, and for which selection.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
struct SyncMemo {
    /// The digest of the selection.
    selection: [u8; 32],

    /// If the selection was synced.
    synced: bool,
}

/// Builds the new `boot-args` value from the current one.
///
/// Configured arguments replace the current ones. Each enabled flag is then appended unless it is already there.
#[must_use = "Has no effect if the result is unused"]
pub fn merge_boot_args(current: &str, config: &BootConfig) -> String {
    let mut args: BootArgs<'_> = config
        .set_boot_args
        .as_deref()
        .unwrap_or(current)
        .split_whitespace()
        .collect();

    for (enabled, flag) in [
        (config.disable_amfi, AMFI_OFF),
        (config.disable_compat_check, NO_COMPAT_CHECK),
        (config.disable_panic_log, NO_PANIC_DIALOG),
    ] {
        if enabled && !args.contains(&flag) {
            args.push(flag);
        }
    }

    args.join(" ")
}

/// Checks if any `boot-args` change is configured.
const fn boot_args_configured(config: &BootConfig) -> bool {
    config.set_boot_args.is_some()
        || config.disable_amfi
        || config.disable_compat_check
        || config.disable_panic_log
}

/// Reads the current `boot-args`, without its terminator.
fn current_boot_args(store: &mut (impl VariableStore + ?Sized)) -> BootResult<String> {
    let Some(var) = store.get(BOOT_ARGS, &VariableVendor(APPLE_BOOT_GUID))? else {
        return Ok(String::new());
    };
    let data = var.data.split(|x| *x == 0).next().unwrap_or_default();
    Ok(String::from_utf8_lossy(data).into_owned())
}

/// Writes the merged `boot-args`.
///
/// # Errors
///
/// May return an `Error` if the variable could not be read or written.
pub fn apply_boot_args(
    store: &mut (impl VariableStore + ?Sized),
    config: &BootConfig,
) -> BootResult<VarWrite> {
    let current = current_boot_args(store)?;
    let merged = merge_boot_args(&current, config);

    let mut data: Vec<u8> = merged.into_bytes();
    data.push(0);
    set_if_changed(store, BOOT_ARGS, &VariableVendor(APPLE_BOOT_GUID), PERSISTENT, &data)
}

/// Clears the Apple internal bit from `csr-active-config`.
///
/// A missing variable is left alone.
///
/// # Errors
///
/// May return an `Error` if the variable could not be read or written.
pub fn normalise_csr(store: &mut (impl VariableStore + ?Sized)) -> BootResult<VarWrite> {
    let vendor = VariableVendor(APPLE_BOOT_GUID);
    let Some(var) = store.get(CSR_ACTIVE_CONFIG, &vendor)? else {
        return Ok(VarWrite::AlreadyCurrent);
    };
    let Some(csr) = u32::from_bytes(&var.data) else {
        warn!("Ignoring {CSR_ACTIVE_CONFIG} of {} bytes", var.data.len());
        return Ok(VarWrite::AlreadyCurrent);
    };
    if csr & CSR_ALLOW_APPLE_INTERNAL == 0 {
        return Ok(VarWrite::AlreadyCurrent);
    }

    let csr = csr & !CSR_ALLOW_APPLE_INTERNAL;
    store.set(CSR_ACTIVE_CONFIG, &vendor, var.attributes, &csr.to_bytes())?;
    info!("Normalised {CSR_ACTIVE_CONFIG} to {csr:#x}");
    Ok(VarWrite::Written)
}

/// Enables TRIM for third party SSDs.
///
/// # Errors
///
/// May return an `Error` if the variable could not be read or written.
pub fn force_trim(store: &mut (impl VariableStore + ?Sized)) -> BootResult<VarWrite> {
    set_if_changed(store, ENABLE_TRIM, &VariableVendor(APPLE_BOOT_GUID), PERSISTENT, &[1])
}

/// Runs the configured mitigations for macOS.
///
/// Each mitigation is attempted even if an earlier one fails. Failures are only logged.
pub fn apply_macos_mitigations(store: &mut (impl VariableStore + ?Sized), config: &BootConfig) {
    if config.force_trim
        && let Err(e) = force_trim(store)
    {
        warn!("Failed to enable TRIM: {e}");
    }
    if boot_args_configured(config)
        && let Err(e) = apply_boot_args(store, config)
    {
        warn!("Failed to set {BOOT_ARGS}: {e}");
    }
    if config.normalise_csr
        && let Err(e) = normalise_csr(store)
    {
        warn!("Failed to normalise {CSR_ACTIVE_CONFIG}: {e}");
    }
}

/// Hashes a selection so it can be recognised on the next boot.
#[must_use = "Has no effect if the result is unused"]
pub fn selection_digest(title: &str, loader_path: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update(b"|");
    hasher.update(loader_path.as_bytes());
    hasher.finalize().into()
}

/// Reads the memo of the last Bluetooth sync. A memo that does not decode is ignored.
fn read_memo(store: &mut (impl VariableStore + ?Sized)) -> BootResult<Option<SyncMemo>> {
    Ok(store
        .get(BLUETOOTH_MEMO, &VariableVendor(BOOTDISC_GUID))?
        .and_then(|x| postcard::from_bytes(&x.data).ok()))
}

/// Writes the memo of a Bluetooth sync decision.
fn write_memo(store: &mut (impl VariableStore + ?Sized), memo: SyncMemo) -> BootResult<()> {
    if let Ok(content) = postcard::to_allocvec(&memo) {
        set_if_changed(
            store,
            BLUETOOTH_MEMO,
            &VariableVendor(BOOTDISC_GUID),
            PERSISTENT,
            &content,
        )?;
    }
    Ok(())
}

/// Copies the Bluetooth controller variables into the boot manager's namespace.
///
/// A selection is never synced twice in a row: if the last sync was for the same selection, this one is skipped and
/// the next one goes ahead again. With [`SyncPolicy::Ask`] the user is asked first.
///
/// Returns if the variables were synced.
///
/// # Errors
///
/// May return an `Error` if a variable could not be read or written.
pub fn sync_bluetooth<P: Platform + ?Sized>(
    platform: &mut P,
    policy: SyncPolicy,
    selection: [u8; 32],
) -> BootResult<bool> {
    if policy == SyncPolicy::Never {
        return Ok(false);
    }

    if read_memo(platform.variables())?.is_some_and(|x| x.synced && x.selection == selection) {
        debug!("Bluetooth state was synced for this selection last time, skipping");
        write_memo(
            platform.variables(),
            SyncMemo {
                selection,
                synced: false,
            },
        )?;
        return Ok(false);
    }

    if policy == SyncPolicy::Ask && !platform.confirm("Sync Bluetooth controller state?") {
        return Ok(false);
    }

    let store = platform.variables();
    for name in BLUETOOTH_VARS {
        if let Some(var) = store.get(name, &VariableVendor(APPLE_BOOT_GUID))? {
            set_if_changed(
                &mut *store,
                name,
                &VariableVendor(BOOTDISC_GUID),
                PERSISTENT,
                &var.data,
            )?;
        }
    }
    write_memo(
        store,
        SyncMemo {
            selection,
            synced: true,
        },
    )?;

    info!("Synced Bluetooth controller state");
    Ok(true)
}
