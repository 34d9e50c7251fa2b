// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! Manages the firmware `BootOrder` and the `Boot####` variables it refers to.
//!
//! Nothing here is cached. Every operation rereads the variables it needs, since a program that was chainloaded
//! and returned may have changed them.

use alloc::{format, string::String, vec::Vec};
use log::{info, warn};
use uefi::runtime::VariableVendor;

use crate::{
    BootResult,
    nvram::{NvramBootEntry, NvramError, boot_var_name, construct_boot_entry},
    system::variable::{PERSISTENT, VariableStore, delete_variable, set_value},
};

/// The name of the variable holding the boot order.
pub const BOOT_ORDER: &str = "BootOrder";

/// The name of the variable holding the boot number to try on the next boot only.
pub const BOOT_NEXT: &str = "BootNext";

/// The operations offered on a firmware boot entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BootOrderOp {
    /// Moves the entry to the front of the boot order.
    Promote,

    /// Deletes the entry.
    Delete,
}

/// Reads and decodes one `Boot####` variable.
///
/// # Errors
///
/// May return an `Error` if the variable could not be read, or does not decode.
pub fn read_boot_entry(
    store: &mut (impl VariableStore + ?Sized),
    boot_num: u16,
) -> BootResult<Option<NvramBootEntry>> {
    let Some(var) = store.get(&boot_var_name(boot_num), &VariableVendor::GLOBAL_VARIABLE)? else {
        return Ok(None);
    };
    Ok(Some(NvramBootEntry::decode(boot_num, &var.data)?))
}

/// Finds the slot a new boot entry should be written to.
///
/// Slots are checked from `Boot0000` upwards, stopping at the first one that is either free or already holds
/// exactly `candidate`. The second value is `true` if the slot already holds the entry.
///
/// An identical entry sitting after a free slot is not found, so running this against a fragmented boot list can
/// create a second copy of an entry. If every slot is taken, slot `0xffff` is returned to be overwritten.
///
/// # Errors
///
/// May return an `Error` if a variable could not be read.
pub fn find_boot_num(
    store: &mut (impl VariableStore + ?Sized),
    candidate: &[u8],
) -> BootResult<(u16, bool)> {
    for boot_num in 0..=u16::MAX {
        match store.get(&boot_var_name(boot_num), &VariableVendor::GLOBAL_VARIABLE)? {
            None => return Ok((boot_num, false)),
            Some(var) if var.data == candidate => return Ok((boot_num, true)),
            Some(_) => (),
        }
    }

    warn!("Every boot slot is in use, overwriting Boot{:04x}", u16::MAX);
    Ok((u16::MAX, false))
}

/// Reads the boot order.
///
/// A missing `BootOrder` is an empty order. A trailing odd byte is ignored.
///
/// # Errors
///
/// May return an `Error` if the variable could not be read.
pub fn read_boot_order(store: &mut (impl VariableStore + ?Sized)) -> BootResult<Vec<u16>> {
    let Some(var) = store.get(BOOT_ORDER, &VariableVendor::GLOBAL_VARIABLE)? else {
        return Ok(Vec::new());
    };
    Ok(var
        .data
        .chunks_exact(2)
        .map(|x| u16::from_le_bytes([x[0], x[1]]))
        .collect())
}

/// Writes the boot order.
///
/// # Errors
///
/// May return an `Error` if the variable could not be written.
pub fn write_boot_order(store: &mut (impl VariableStore + ?Sized), order: &[u16]) -> BootResult<()> {
    let bytes: Vec<u8> = order.iter().flat_map(|x| x.to_le_bytes()).collect();
    store.set(
        BOOT_ORDER,
        &VariableVendor::GLOBAL_VARIABLE,
        PERSISTENT,
        &bytes,
    )
}

/// Makes a boot number the first entry of the boot order.
///
/// Every other occurrence of the number is removed in the same write. Returns `false` without writing anything if
/// it already comes first.
///
/// # Errors
///
/// May return an `Error` if the boot order could not be read or written.
pub fn set_boot_default(store: &mut (impl VariableStore + ?Sized), boot_num: u16) -> BootResult<bool> {
    let order = read_boot_order(store)?;
    if order.first() == Some(&boot_num) {
        return Ok(false);
    }

    let new_order: Vec<u16> = core::iter::once(boot_num)
        .chain(order.into_iter().filter(|&x| x != boot_num))
        .collect();
    write_boot_order(store, &new_order)?;
    Ok(true)
}

/// Drops every number from the boot order whose `Boot####` variable no longer exists.
///
/// Returns how many numbers were dropped. The boot order is only rewritten if something changed.
///
/// # Errors
///
/// May return an `Error` if a variable could not be read, or the boot order could not be written.
pub fn delete_invalid_boot_entries(store: &mut (impl VariableStore + ?Sized)) -> BootResult<usize> {
    let order = read_boot_order(store)?;

    let mut valid = Vec::with_capacity(order.len());
    for &boot_num in &order {
        if store
            .get(&boot_var_name(boot_num), &VariableVendor::GLOBAL_VARIABLE)?
            .is_some()
        {
            valid.push(boot_num);
        }
    }

    let removed = order.len() - valid.len();
    if removed > 0 {
        write_boot_order(store, &valid)?;
    }
    Ok(removed)
}

/// Lists the decoded entries of the boot order, in order.
///
/// Entries that are missing or do not decode are skipped.
///
/// # Errors
///
/// May return an `Error` if the boot order could not be read.
pub fn boot_order_entries(
    store: &mut (impl VariableStore + ?Sized),
) -> BootResult<Vec<NvramBootEntry>> {
    let order = read_boot_order(store)?;

    let mut entries = Vec::with_capacity(order.len());
    for boot_num in order {
        match read_boot_entry(store, boot_num) {
            Ok(Some(entry)) => entries.push(entry),
            Ok(None) => (),
            Err(e) => warn!("Skipping {}: {e}", boot_var_name(boot_num)),
        }
    }
    Ok(entries)
}

/// Creates a boot entry for a loader, reusing an identical entry if one is found first.
///
/// Returns the boot number of the entry.
///
/// # Errors
///
/// May return an `Error` if the entry could not be built, or a variable could not be read or written.
pub fn create_nvram_entry(
    store: &mut (impl VariableStore + ?Sized),
    volume_device_path: &[u8],
    loader_path: &str,
    label: &str,
    set_default: bool,
) -> BootResult<u16> {
    let bytes = construct_boot_entry(volume_device_path, loader_path, label)?;
    let (boot_num, exists) = find_boot_num(store, &bytes)?;

    if !exists {
        store.set(
            &boot_var_name(boot_num),
            &VariableVendor::GLOBAL_VARIABLE,
            PERSISTENT,
            &bytes,
        )?;
    }
    if set_default {
        set_boot_default(store, boot_num)?;
    }

    Ok(boot_num)
}

/// Deletes a `Boot####` variable, then drops it from the boot order.
///
/// # Errors
///
/// May return an `Error` if the variable could not be deleted, or the boot order could not be rewritten.
pub fn delete_boot_entry(store: &mut (impl VariableStore + ?Sized), boot_num: u16) -> BootResult<()> {
    delete_variable(
        store,
        &boot_var_name(boot_num),
        &VariableVendor::GLOBAL_VARIABLE,
    )?;
    delete_invalid_boot_entries(store)?;
    Ok(())
}

/// Makes the firmware boot an entry on the next boot only.
///
/// # Errors
///
/// May return an `Error` if the variable could not be written.
pub fn set_boot_next(store: &mut (impl VariableStore + ?Sized), boot_num: u16) -> BootResult<()> {
    set_value(
        store,
        BOOT_NEXT,
        &VariableVendor::GLOBAL_VARIABLE,
        PERSISTENT,
        Some(boot_num),
    )
}

/// Promotes or deletes a firmware boot entry after the user confirms it.
///
/// `confirm` is shown a question and returns if the user agreed. On success the message to show the user is
/// returned.
///
/// # Errors
///
/// May return an `Error` if the entry does not exist, the user declined, or a variable could not be written.
pub fn manage_boot_order(
    store: &mut (impl VariableStore + ?Sized),
    boot_num: u16,
    op: BootOrderOp,
    confirm: impl FnOnce(&str) -> bool,
) -> BootResult<String> {
    let entry = read_boot_entry(store, boot_num)?.ok_or(NvramError::Missing(boot_num))?;

    let question = match op {
        BootOrderOp::Promote => format!(
            "Make Boot{boot_num:04x} ({}) the default EFI boot option?",
            entry.label
        ),
        BootOrderOp::Delete => format!("Delete Boot{boot_num:04x} ({})?", entry.label),
    };
    if !confirm(&question) {
        return Err(NvramError::NotConfirmed.into());
    }

    let message = match op {
        BootOrderOp::Promote => {
            set_boot_default(store, boot_num)?;
            format!("Boot{boot_num:04x} is now the default EFI boot option.")
        }
        BootOrderOp::Delete => {
            delete_boot_entry(store, boot_num)?;
            format!("Boot{boot_num:04x} has been deleted.")
        }
    };
    info!("{message}");
    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        nvram::tests::volume_device_path,
        system::variable::{get_value, mock::MemoryVariableStore},
    };

    /// Writes a decodable entry with a label to a slot.
    fn put_entry(store: &mut MemoryVariableStore, boot_num: u16, label: &str) -> BootResult<()> {
        let bytes = NvramBootEntry::new(boot_num, label, alloc::vec![0x7f, 0xff, 0x04, 0x00]).encode()?;
        store.set(
            &boot_var_name(boot_num),
            &VariableVendor::GLOBAL_VARIABLE,
            PERSISTENT,
            &bytes,
        )
    }

    #[test]
    fn test_find_boot_num_stops_at_first_free_slot() -> BootResult<()> {
        let mut store = MemoryVariableStore::new();
        let candidate = construct_boot_entry(&volume_device_path(), "\\EFI\\x\\x.efi", "x")?;
        for boot_num in 0..5 {
            put_entry(&mut store, boot_num, "other")?;
        }
        store.set(
            &boot_var_name(6),
            &VariableVendor::GLOBAL_VARIABLE,
            PERSISTENT,
            &candidate,
        )?;

        assert_eq!(find_boot_num(&mut store, &candidate)?, (5, false));

        put_entry(&mut store, 5, "filler")?;
        assert_eq!(find_boot_num(&mut store, &candidate)?, (6, true));
        Ok(())
    }

    #[test]
    fn test_set_boot_default() -> BootResult<()> {
        let mut store = MemoryVariableStore::new();
        write_boot_order(&mut store, &[1, 3, 2, 3])?;

        assert!(set_boot_default(&mut store, 3)?);
        assert_eq!(read_boot_order(&mut store)?, [3, 1, 2]);

        let writes = store.write_count(BOOT_ORDER);
        assert!(!set_boot_default(&mut store, 3)?);
        assert_eq!(store.write_count(BOOT_ORDER), writes);
        Ok(())
    }

    #[test]
    fn test_delete_invalid_boot_entries() -> BootResult<()> {
        let mut store = MemoryVariableStore::new();
        put_entry(&mut store, 0, "a")?;
        put_entry(&mut store, 2, "c")?;
        write_boot_order(&mut store, &[0, 1, 2, 9])?;

        assert_eq!(delete_invalid_boot_entries(&mut store)?, 2);
        assert_eq!(read_boot_order(&mut store)?, [0, 2]);

        let labels: Vec<String> = boot_order_entries(&mut store)?
            .into_iter()
            .map(|x| x.label)
            .collect();
        assert_eq!(labels, ["a", "c"]);
        Ok(())
    }

    #[test]
    fn test_create_nvram_entry_reuses_identical() -> BootResult<()> {
        let mut store = MemoryVariableStore::new();
        let volume = volume_device_path();
        let first = create_nvram_entry(&mut store, &volume, "\\EFI\\x\\x.efi", "x", true)?;
        let second = create_nvram_entry(&mut store, &volume, "\\EFI\\x\\x.efi", "x", true)?;
        assert_eq!(first, second);
        assert_eq!(store.write_count(&boot_var_name(first)), 1);
        assert_eq!(read_boot_order(&mut store)?, [first]);

        set_boot_next(&mut store, first)?;
        assert_eq!(
            get_value::<u16>(&mut store, BOOT_NEXT, &VariableVendor::GLOBAL_VARIABLE)?,
            first
        );
        Ok(())
    }

    #[test]
    fn test_manage_boot_order() -> BootResult<()> {
        let mut store = MemoryVariableStore::new();
        put_entry(&mut store, 0, "Windows")?;
        put_entry(&mut store, 0x1a, "debian")?;
        write_boot_order(&mut store, &[0, 0x1a])?;

        assert!(matches!(
            manage_boot_order(&mut store, 0x1a, BootOrderOp::Promote, |_| false),
            Err(crate::error::BootError::NvramError(NvramError::NotConfirmed))
        ));
        assert_eq!(read_boot_order(&mut store)?, [0, 0x1a]);

        let message = manage_boot_order(&mut store, 0x1a, BootOrderOp::Promote, |question| {
            question.contains("debian")
        })?;
        assert_eq!(message, "Boot001a is now the default EFI boot option.");
        assert_eq!(read_boot_order(&mut store)?, [0x1a, 0]);

        let message = manage_boot_order(&mut store, 0, BootOrderOp::Delete, |_| true)?;
        assert_eq!(message, "Boot0000 has been deleted.");
        assert_eq!(read_boot_order(&mut store)?, [0x1a]);
        assert!(read_boot_entry(&mut store, 0)?.is_none());
        Ok(())
    }
}
