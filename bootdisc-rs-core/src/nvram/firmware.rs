// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! Menu entries for the boot options already known to the firmware.
//!
//! Booting one of these sets `BootNext` to its number and resets, so the firmware starts it natively.

use alloc::{string::String, vec::Vec};
use log::debug;

use crate::{
    BootResult,
    config::BootConfig,
    entry::{LoaderEntry, builder::LoaderEntryBuilder},
    nvram::manager::boot_order_entries,
    system::{
        strings::is_in_substring,
        variable::{HIDDEN_FIRMWARE, VariableStore, merge_hidden_list},
    },
};

/// Builds the comma-delimited list of labels that are not shown.
///
/// This is `dont_scan_firmware` together with the labels hidden from the menu.
///
/// # Errors
///
/// May return an `Error` if the hidden list could not be read.
pub fn firmware_deny_list(
    store: &mut (impl VariableStore + ?Sized),
    config: &BootConfig,
) -> BootResult<String> {
    let mut list = config.dont_scan_firmware.clone();
    merge_hidden_list(store, HIDDEN_FIRMWARE, &mut list)?;
    Ok(list)
}

/// Lists the firmware boot entries to show in the menu, in boot order.
///
/// Entries that do not decode, or whose label contains an item of the deny list, are left out.
///
/// # Errors
///
/// May return an `Error` if the boot order or the hidden list could not be read.
pub fn firmware_entries(
    store: &mut (impl VariableStore + ?Sized),
    config: &BootConfig,
) -> BootResult<Vec<LoaderEntry>> {
    let deny = firmware_deny_list(store, config)?;

    let entries = boot_order_entries(store)?
        .into_iter()
        .filter(|x| {
            let hidden = is_in_substring(&x.label, &deny);
            if hidden {
                debug!("Not showing {} ({})", x.var_name(), x.label);
            }
            !hidden
        })
        .map(|x| {
            let builder = LoaderEntryBuilder::firmware(x.device_path, x.boot_num);
            if x.label.is_empty() {
                builder.build()
            } else {
                builder.title(x.label).build()
            }
        })
        .collect();

    Ok(entries)
}
