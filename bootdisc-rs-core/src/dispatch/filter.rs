// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! The NVRAM write filter.
//!
//! Some operating systems write variables that are harmful on the firmware they run on, such as Microsoft vendor
//! variables on Apple firmware, or secure boot databases that Apple firmware cannot cope with. While the filter is
//! active, such writes are reported as successful without being performed, and any stale value the variable
//! already held is erased.
//!
//! [`FilterPolicy`] decides which writes are blocked. [`NvramFilter`] applies a policy to any [`VariableStore`],
//! and [`FilterGuard`] applies it to the firmware itself by replacing `SetVariable` in the runtime services table.

use alloc::vec::Vec;
use core::{cell::RefCell, ffi::c_void, fmt, ptr};

use log::{info, warn};
use thiserror::Error;
use uefi::{
    CStr16, Char16, Guid, Status, StatusExt, guid,
    runtime::{VariableAttributes, VariableVendor},
};

use crate::{
    BootResult,
    system::{
        liveness::release_with,
        variable::{StoredVariable, VariableStore},
    },
};

/// The vendor namespace of Microsoft's own variables.
pub const MICROSOFT_VENDOR_GUID: Guid = guid!("77fa9abd-0359-4d32-bd60-28f4e78f784b");

/// Vendor strings of firmware that is known to tolerate Microsoft variables.
const PC_VENDORS: [&str; 4] = ["American Megatrends", "Phoenix", "Insyde", "EDK II"];

/// The secure boot key and signature database variables.
const SECURE_BOOT_DATABASES: [&str; 6] = ["PK", "KEK", "db", "dbx", "dbt", "dbr"];

/// The smallest size limit that is enforced.
pub const MIN_SIZE_LIMIT: usize = 0x400;

/// The signature of the firmware's `SetVariable`.
type SetVariableFn = unsafe extern "efiapi" fn(
    *const u16,
    *const Guid,
    VariableAttributes,
    usize,
    *const u8,
) -> Status;

/// An `Error` that may result from installing the filter.
#[derive(Error, Debug)]
pub enum FilterError {
    /// The system table is not available.
    #[error("The system table is not available")]
    NoSystemTable,

    /// A filter is already installed.
    #[error("The NVRAM write filter is already installed")]
    AlreadyInstalled,
}

/// Why a write was blocked.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockReason {
    /// A Microsoft vendor variable on firmware that is not a PC's.
    MicrosoftVendor,

    /// A persistent secure boot database on Apple firmware.
    SecureBootDatabase,

    /// A persistent variable over the size limit.
    TooLarge,
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::MicrosoftVendor => "Microsoft variable on non-PC firmware",
            Self::SecureBootDatabase => "secure boot database on Apple firmware",
            Self::TooLarge => "over the size limit",
        })
    }
}

/// Decides which variable writes are blocked.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FilterPolicy {
    /// If the firmware is a known PC firmware.
    pc_firmware: bool,

    /// If the firmware is Apple's.
    apple_firmware: bool,

    /// The size above which persistent writes are blocked.
    size_limit: Option<usize>,
}

impl FilterPolicy {
    /// Creates a policy for a firmware vendor.
    ///
    /// A size limit below [`MIN_SIZE_LIMIT`] is not enforced.
    #[must_use = "Has no effect if the result is unused"]
    pub fn new(vendor: &str, size_limit: usize) -> Self {
        Self {
            pc_firmware: PC_VENDORS.iter().any(|x| vendor.contains(x)),
            apple_firmware: vendor.contains("Apple"),
            size_limit: (size_limit >= MIN_SIZE_LIMIT).then_some(size_limit),
        }
    }

    /// Checks if a write is blocked, and why.
    ///
    /// The name is UTF-16 without a terminator.
    #[must_use = "Has no effect if the result is unused"]
    pub fn blocks(
        &self,
        name: &[u16],
        vendor: &Guid,
        attributes: VariableAttributes,
        size: usize,
    ) -> Option<BlockReason> {
        let persistent = attributes.contains(VariableAttributes::NON_VOLATILE);

        if !self.pc_firmware && *vendor == MICROSOFT_VENDOR_GUID {
            Some(BlockReason::MicrosoftVendor)
        } else if self.apple_firmware
            && persistent
            && SECURE_BOOT_DATABASES.iter().any(|x| name_is(name, x))
        {
            Some(BlockReason::SecureBootDatabase)
        } else if persistent && self.size_limit.is_some_and(|limit| size > limit) {
            Some(BlockReason::TooLarge)
        } else {
            None
        }
    }
}

/// Compares a UTF-16 name with a string.
fn name_is(name: &[u16], s: &str) -> bool {
    name.iter().copied().eq(s.encode_utf16())
}

/// A [`VariableStore`] that applies a [`FilterPolicy`] to every write.
///
/// A blocked write is reported as successful. The variable is then erased with a zero length write, so a value
/// written before the filter was applied does not survive.
pub struct NvramFilter<S: VariableStore> {
    /// The store writes pass through to.
    inner: S,

    /// The policy applied to every write.
    policy: FilterPolicy,
}

impl<S: VariableStore> NvramFilter<S> {
    /// Wraps a store with a policy.
    pub const fn new(inner: S, policy: FilterPolicy) -> Self {
        Self { inner, policy }
    }

    /// Unwraps the store.
    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: VariableStore> VariableStore for NvramFilter<S> {
    fn get(&mut self, name: &str, vendor: &VariableVendor) -> BootResult<Option<StoredVariable>> {
        self.inner.get(name, vendor)
    }

    fn set(
        &mut self,
        name: &str,
        vendor: &VariableVendor,
        attributes: VariableAttributes,
        data: &[u8],
    ) -> BootResult<()> {
        let wide: Vec<u16> = name.encode_utf16().collect();
        match self.policy.blocks(&wide, &vendor.0, attributes, data.len()) {
            Some(reason) => {
                warn!("Blocked write to {name}: {reason}");
                if let Err(e) = self.inner.set(name, vendor, attributes, &[]) {
                    warn!("Failed to erase {name}: {e}");
                }
                Ok(())
            }
            None => self.inner.set(name, vendor, attributes, data),
        }
    }
}

/// The firmware's `SetVariable` and the policy applied in front of it.
#[derive(Clone, Copy)]
struct FilterState {
    /// The unfiltered `SetVariable`.
    original: SetVariableFn,

    /// The policy applied to every write.
    policy: FilterPolicy,
}

/// An instance of `FilterCell` that remains for the lifetime of the program.
///
/// The replaced `SetVariable` may be called by anything that runs after the boot manager, so the state it reads
/// must outlive every loader.
static FILTER: FilterCell = FilterCell {
    state: RefCell::new(None),
};

/// Storage struct for the state of the installed filter.
struct FilterCell {
    /// [`RefCell`] wrapper around the filter state.
    state: RefCell<Option<FilterState>>,
}

// SAFETY: uefi is a single threaded environment, thread safety is irrelevant
unsafe impl Sync for FilterCell {}

/// The `SetVariable` installed while the filter is active.
///
/// This must not allocate, since it may run after boot services are gone.
unsafe extern "efiapi" fn filtered_set_variable(
    name: *const u16,
    vendor: *const Guid,
    attributes: VariableAttributes,
    size: usize,
    data: *const u8,
) -> Status {
    let Some(state) = FILTER.state.try_borrow().ok().and_then(|x| *x) else {
        return Status::NOT_READY;
    };
    if name.is_null() || vendor.is_null() {
        // SAFETY: the arguments are passed through unchanged to the firmware's own SetVariable
        return unsafe { (state.original)(name, vendor, attributes, size, data) };
    }

    // SAFETY: callers of SetVariable pass a null terminated name and a valid vendor
    let (wide, guid) = unsafe { (CStr16::from_ptr(name.cast::<Char16>()), *vendor) };
    match state.policy.blocks(wide.to_u16_slice(), &guid, attributes, size) {
        Some(reason) => {
            warn!("Blocked write to {wide}: {reason}");
            // SAFETY: a zero length write with the caller's own name and vendor erases the variable
            let _ = unsafe { (state.original)(name, vendor, attributes, 0, ptr::null()) };
            Status::SUCCESS
        }
        // SAFETY: the arguments are passed through unchanged to the firmware's own SetVariable
        None => unsafe { (state.original)(name, vendor, attributes, size, data) },
    }
}

/// Replaces `SetVariable` in the runtime services table, returning the previous function.
///
/// The table checksum is recomputed after the swap. If that fails, the table is left as it was.
fn swap_set_variable(new: SetVariableFn) -> BootResult<SetVariableFn> {
    let st = uefi::table::system_table_raw().ok_or(FilterError::NoSystemTable)?;

    // SAFETY: the system table and its service tables stay valid while boot services are active, and nothing else
    // runs while they are modified
    unsafe {
        let st = st.as_ptr();
        let rt = (*st).runtime_services;
        let bs = (*st).boot_services;
        if rt.is_null() || bs.is_null() {
            return Err(FilterError::NoSystemTable.into());
        }

        let old = (*rt).set_variable;
        let old_crc = (*rt).header.crc;
        (*rt).set_variable = new;
        (*rt).header.crc = 0;

        let mut crc = 0;
        let size = (*rt).header.size as usize;
        if let Err(e) = ((*bs).calculate_crc32)(rt.cast::<c_void>(), size, &raw mut crc).to_result() {
            (*rt).set_variable = old;
            (*rt).header.crc = old_crc;
            return Err(e.into());
        }
        (*rt).header.crc = crc;
        Ok(old)
    }
}

/// Keeps the filter installed in the firmware until dropped.
pub struct FilterGuard;

impl FilterGuard {
    /// Installs the filter with a policy.
    ///
    /// # Errors
    ///
    /// May return an `Error` if a filter is already installed, or the runtime services table could not be
    /// modified.
    pub fn new(policy: FilterPolicy) -> BootResult<Self> {
        if FILTER.state.borrow().is_some() {
            return Err(FilterError::AlreadyInstalled.into());
        }

        let original = swap_set_variable(filtered_set_variable)?;
        *FILTER.state.borrow_mut() = Some(FilterState { original, policy });
        info!("Installed the NVRAM write filter");
        Ok(Self)
    }
}

impl Drop for FilterGuard {
    fn drop(&mut self) {
        release_with(|| {
            if let Some(state) = FILTER.state.borrow_mut().take()
                && let Err(e) = swap_set_variable(state.original)
            {
                warn!("Failed to remove the NVRAM write filter: {e}");
            }
        });
    }
}
