// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! UEFI variable storage helpers.
//!
//! Everything in the engine reads and writes NVRAM through the [`VariableStore`] trait. The firmware
//! implementation is [`RuntimeVariableStore`]. Values are never cached across calls, since a chainloaded program
//! may change the NVRAM namespace at any time.
//!
//! The application-private state (`PreviousBoot` and the `Hidden*` lists) lives in the boot manager's own vendor
//! namespace, with a legacy namespace that is still consulted when that state is cleared.

use alloc::{string::String, vec::Vec};
use log::warn;
use uefi::{
    Guid, Status, guid,
    runtime::{self, VariableAttributes, VariableVendor},
};

use crate::{
    BootResult,
    error::BootError,
    system::{
        helper::{str_to_cstr, str_to_utf16z, utf16z_to_string},
        strings::merge_unique_items,
    },
};

#[cfg(test)]
pub(crate) mod mock;

/// The custom variable namespace for the boot manager.
pub const BOOTDISC_GUID: Guid = guid!("23600d08-561e-4e68-a024-1d7d6e04ee4e");

/// The variable namespace used by older releases, still cleared on reset.
pub const LEGACY_GUID: Guid = guid!("36d08fa7-cf0b-42f5-8f14-68df73ed3740");

/// The namespace Apple firmware keeps `boot-args` and `csr-active-config` in.
pub const APPLE_BOOT_GUID: Guid = guid!("7c436110-ab2a-4bbb-a880-fe41995c9f82");

/// The name of the variable holding the title of the last booted entry.
pub const PREVIOUS_BOOT: &str = "PreviousBoot";

/// The variable listing disk loaders the user hid from the menu, as `volume:path` items.
pub const HIDDEN_TAGS: &str = "HiddenTags";

/// The variable listing tools the user hid from the menu.
pub const HIDDEN_TOOLS: &str = "HiddenTools";

/// The variable listing firmware boot entries the user hid from the menu, by label.
pub const HIDDEN_FIRMWARE: &str = "HiddenFirmware";

/// The variables holding entries the user has hidden from the menu.
pub const HIDDEN_STATE: [&str; 4] = [HIDDEN_TAGS, HIDDEN_TOOLS, "HiddenLegacy", HIDDEN_FIRMWARE];

/// The attributes the boot manager writes its persistent variables with.
pub const PERSISTENT: VariableAttributes = VariableAttributes::NON_VOLATILE
    .union(VariableAttributes::BOOTSERVICE_ACCESS)
    .union(VariableAttributes::RUNTIME_ACCESS);

/// The attributes of variables that only last until the next reset.
pub const VOLATILE: VariableAttributes =
    VariableAttributes::BOOTSERVICE_ACCESS.union(VariableAttributes::RUNTIME_ACCESS);

/// A variable as read back from storage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredVariable {
    /// The raw content of the variable.
    pub data: Vec<u8>,

    /// The attributes the variable was stored with.
    pub attributes: VariableAttributes,
}

/// Read and write access to the firmware variable namespace.
pub trait VariableStore {
    /// Reads a variable. A variable that does not exist is [`None`], not an error.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the firmware failed to read the variable for any other reason.
    fn get(&mut self, name: &str, vendor: &VariableVendor) -> BootResult<Option<StoredVariable>>;

    /// Writes a variable. Writing zero bytes deletes it.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the firmware rejected the write.
    fn set(
        &mut self,
        name: &str,
        vendor: &VariableVendor,
        attributes: VariableAttributes,
        data: &[u8],
    ) -> BootResult<()>;
}

/// UEFI variable storage implementation with runtime services.
#[derive(Clone, Copy, Debug, Default)]
pub struct RuntimeVariableStore;

impl VariableStore for RuntimeVariableStore {
    fn get(&mut self, name: &str, vendor: &VariableVendor) -> BootResult<Option<StoredVariable>> {
        let name = str_to_cstr(name)?;
        match runtime::get_variable_boxed(&name, vendor) {
            Ok((data, attributes)) => Ok(Some(StoredVariable {
                data: data.into_vec(),
                attributes,
            })),
            Err(e) if e.status() == Status::NOT_FOUND => Ok(None),
            Err(e) => Err(BootError::Uefi(e.to_err_without_payload())),
        }
    }

    fn set(
        &mut self,
        name: &str,
        vendor: &VariableVendor,
        attributes: VariableAttributes,
        data: &[u8],
    ) -> BootResult<()> {
        let name = str_to_cstr(name)?;
        match runtime::set_variable(&name, vendor, attributes, data) {
            Err(e) if data.is_empty() && e.status() == Status::NOT_FOUND => Ok(()), // deleting nothing
            result => Ok(result?),
        }
    }
}

/// A value that can be stored in a UEFI variable.
///
/// This is a type that can be converted into and from a fixed amount of little endian bytes.
pub trait UefiVariable: Sized {
    /// Convert `Self` to a vector of bytes.
    fn to_bytes(self) -> Vec<u8>;

    /// Convert a slice of bytes to `Self`, if the slice has the right length.
    fn from_bytes(bytes: &[u8]) -> Option<Self>;

    /// Return 0, or an equivalent value.
    fn default() -> Self;
}

/// Implements [`UefiVariable`] for unsigned integers.
macro_rules! impl_uefi_variable {
    ($($ty:ty),*) => {
        $(
            impl UefiVariable for $ty {
                fn to_bytes(self) -> Vec<u8> {
                    self.to_le_bytes().to_vec()
                }
                fn from_bytes(bytes: &[u8]) -> Option<Self> {
                    Some(Self::from_le_bytes(bytes.try_into().ok()?))
                }
                fn default() -> Self {
                    0
                }
            }
        )*
    };
}

impl_uefi_variable!(u8, u16, u32, u64);

impl UefiVariable for bool {
    fn to_bytes(self) -> Vec<u8> {
        u8::from(self).to_bytes()
    }
    fn from_bytes(bytes: &[u8]) -> Option<Self> {
        u8::from_bytes(bytes).map(|x| x > 0)
    }
    fn default() -> Self {
        false
    }
}

/// The outcome of a write that is skipped when nothing would change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VarWrite {
    /// The variable was written.
    Written,

    /// The variable already held the same bytes, so nothing was written.
    AlreadyCurrent,
}

/// Gets a UEFI variable of a [`UefiVariable`] given the name.
///
/// If the variable was not found, or it does not have the size of `T`, a default value of `0` will be returned.
///
/// # Errors
///
/// May return an `Error` if the firmware failed to read the variable.
pub fn get_value<T: UefiVariable>(
    store: &mut (impl VariableStore + ?Sized),
    name: &str,
    vendor: &VariableVendor,
) -> BootResult<T> {
    Ok(store
        .get(name, vendor)?
        .and_then(|x| T::from_bytes(&x.data))
        .unwrap_or_else(T::default))
}

/// Sets a UEFI variable to a [`UefiVariable`] given the name.
///
/// Passing None for value will result in the variable being deleted.
///
/// # Errors
///
/// May return an `Error` if the firmware rejected the write.
pub fn set_value<T: UefiVariable>(
    store: &mut (impl VariableStore + ?Sized),
    name: &str,
    vendor: &VariableVendor,
    attributes: VariableAttributes,
    value: Option<T>,
) -> BootResult<()> {
    let bytes = value.map_or_else(Vec::new, UefiVariable::to_bytes);
    store.set(name, vendor, attributes, &bytes)
}

/// Writes a variable unless it already holds exactly `data`.
///
/// The `Hidden*` lists are always written, since the menu relies on their write to reorder them.
///
/// # Errors
///
/// May return an `Error` if the variable could not be read or written.
pub fn set_if_changed(
    store: &mut (impl VariableStore + ?Sized),
    name: &str,
    vendor: &VariableVendor,
    attributes: VariableAttributes,
    data: &[u8],
) -> BootResult<VarWrite> {
    if !name.starts_with("Hidden")
        && let Some(current) = store.get(name, vendor)?
        && current.data == data
    {
        return Ok(VarWrite::AlreadyCurrent);
    }

    store.set(name, vendor, attributes, data)?;
    Ok(VarWrite::Written)
}

/// Deletes a variable.
///
/// # Errors
///
/// May return an `Error` if the firmware rejected the deletion.
pub fn delete_variable(
    store: &mut (impl VariableStore + ?Sized),
    name: &str,
    vendor: &VariableVendor,
) -> BootResult<()> {
    store.set(name, vendor, VariableAttributes::empty(), &[])
}

/// Reads the title of the entry that was booted last.
///
/// # Errors
///
/// May return an `Error` if the variable could not be read.
pub fn previous_boot(store: &mut (impl VariableStore + ?Sized)) -> BootResult<Option<String>> {
    let Some(var) = store.get(PREVIOUS_BOOT, &VariableVendor(BOOTDISC_GUID))? else {
        return Ok(None);
    };
    Ok(utf16z_to_string(&var.data).ok().map(|(title, _)| title))
}

/// Stamps the title of the entry about to be booted.
///
/// # Errors
///
/// May return an `Error` if the variable could not be read or written.
pub fn store_previous_boot(
    store: &mut (impl VariableStore + ?Sized),
    title: &str,
) -> BootResult<VarWrite> {
    set_if_changed(
        store,
        PREVIOUS_BOOT,
        &VariableVendor(BOOTDISC_GUID),
        PERSISTENT,
        &str_to_utf16z(title),
    )
}

/// Merges one of the `Hidden*` lists into a comma-delimited deny list.
///
/// A missing or undecodable list leaves `list` as it was.
///
/// # Errors
///
/// May return an `Error` if the variable could not be read.
pub fn merge_hidden_list(
    store: &mut (impl VariableStore + ?Sized),
    name: &str,
    list: &mut String,
) -> BootResult<()> {
    if let Some(var) = store.get(name, &VariableVendor(BOOTDISC_GUID))?
        && let Ok((hidden, _)) = utf16z_to_string(&var.data)
    {
        merge_unique_items(list, &hidden);
    }
    Ok(())
}

/// Deletes the `Hidden*` lists from both the current and the legacy namespace.
///
/// Every variable is attempted even if an earlier one fails; the last failure is returned.
///
/// # Errors
///
/// May return an `Error` if any of the deletions failed.
pub fn clear_hidden_state(store: &mut (impl VariableStore + ?Sized)) -> BootResult<()> {
    let mut result = Ok(());
    for vendor in [BOOTDISC_GUID, LEGACY_GUID] {
        for name in HIDDEN_STATE {
            if let Err(e) = delete_variable(store, name, &VariableVendor(vendor)) {
                warn!("Failed to clear {name}: {e}");
                result = Err(e);
            }
        }
    }
    result
}
