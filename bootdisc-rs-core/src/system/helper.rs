// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! Various helper functions for other modules.

use alloc::{string::String, vec::Vec};
use thiserror::Error;
use uefi::{
    CString16, Handle,
    boot::{self, OpenProtocolAttributes, OpenProtocolParams, ScopedProtocol},
    data_types::PoolString,
    proto::{
        ProtocolPointer,
        device_path::{
            DevicePath,
            text::{AllowShortcuts, DevicePathToText, DisplayOnly},
        },
    },
};

use crate::BootResult;

/// An `Error` that may result from converting a [`String`] to another format.
#[derive(Error, Debug)]
pub enum StrError {
    /// A [`String`] could not be converted into a [`CString16`]
    #[error("Could not convert String to CString16")]
    CstrFromStr(#[from] uefi::data_types::FromStrError),

    /// A UTF-16 buffer did not hold a valid, terminated string.
    #[error("Could not convert a UTF-16 buffer to a String")]
    Utf16,
}

/// An `Error` that may result from building or parsing a [`DevicePath`]
#[derive(Error, Debug)]
pub enum DevicePathError {
    /// A Device Path could not be built. This can if the buffer was too small.
    #[error("Could not build DevicePath")]
    Build(#[from] uefi::proto::device_path::build::BuildError),

    /// A byte buffer did not hold a well formed Device Path.
    #[error("Malformed DevicePath bytes")]
    Malformed,
}

/// The firmware architecture the boot manager was built for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Arch {
    /// 32-bit x86.
    Ia32,

    /// `x86_64`.
    X64,

    /// 32-bit ARM.
    Arm,

    /// `AArch64`.
    Aa64,
}

impl Arch {
    /// Gets the target architecture of the boot manager binary.
    #[must_use = "Has no effect if the result is unused"]
    pub const fn current() -> Option<Self> {
        if cfg!(target_arch = "x86") {
            Some(Self::Ia32)
        } else if cfg!(target_arch = "x86_64") {
            Some(Self::X64)
        } else if cfg!(target_arch = "arm") {
            Some(Self::Arm)
        } else if cfg!(target_arch = "aarch64") {
            Some(Self::Aa64)
        } else {
            None
        }
    }

    /// The short name firmware uses for the architecture in loader filenames.
    #[must_use = "Has no effect if the result is unused"]
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Ia32 => "ia32",
            Self::X64 => "x64",
            Self::Arm => "arm",
            Self::Aa64 => "aa64",
        }
    }

    /// The full path of the removable media fallback loader.
    #[must_use = "Has no effect if the result is unused"]
    pub const fn fallback_path(self) -> &'static str {
        match self {
            Self::Ia32 => "\\EFI\\BOOT\\bootia32.efi",
            Self::X64 => "\\EFI\\BOOT\\bootx64.efi",
            Self::Arm => "\\EFI\\BOOT\\bootarm.efi",
            Self::Aa64 => "\\EFI\\BOOT\\bootaa64.efi",
        }
    }
}

/// Converts a [`DevicePath`] into a text representation.
///
/// # Errors
///
/// May return an `Error` if the system does not support [`DevicePathToText`], or there is not enough memory.
pub fn device_path_to_text(device_path: &DevicePath) -> BootResult<PoolString> {
    let handle = boot::get_handle_for_protocol::<DevicePathToText>()?;
    let device_path_to_text = boot::open_protocol_exclusive::<DevicePathToText>(handle)?;
    Ok(device_path_to_text.convert_device_path_to_text(
        device_path,
        DisplayOnly(true),
        AllowShortcuts(false),
    )?)
}

/// Parses raw bytes as a [`DevicePath`].
///
/// # Errors
///
/// May return an `Error` if the bytes are not a sequence of well formed device path nodes ending in an end node.
pub fn bytes_to_device_path(bytes: &[u8]) -> Result<&DevicePath, DevicePathError> {
    <&DevicePath>::try_from(bytes).map_err(|_| DevicePathError::Malformed)
}

/// Gets a [`CString16`] from an [`&str`].
///
/// # Errors
///
/// May return an `Error` if the string could not be converted into a [`CString16`], either due to unsupported
/// characters or an invalid nul character.
pub fn str_to_cstr(str: &str) -> Result<CString16, StrError> {
    Ok(CString16::try_from(str)?)
}

/// Encodes a string as little endian, NUL terminated UTF-16.
#[must_use = "Has no effect if the result is unused"]
pub fn str_to_utf16z(str: &str) -> Vec<u8> {
    let wide: Vec<u16> = str.encode_utf16().chain(core::iter::once(0)).collect();
    bytemuck::cast_slice(&wide).to_vec()
}

/// Decodes little endian UTF-16 up to its NUL terminator.
///
/// On success the decoded string is returned with the amount of bytes it took up, terminator included.
///
/// # Errors
///
/// May return an `Error` if there is no terminator within the buffer, or the buffer is not valid UTF-16.
pub fn utf16z_to_string(bytes: &[u8]) -> Result<(String, usize), StrError> {
    let units = bytes
        .chunks_exact(2)
        .map(|x| u16::from_le_bytes([x[0], x[1]]));

    let mut wide = Vec::new();
    for unit in units {
        if unit == 0 {
            let used = (wide.len() + 1) * 2;
            let str = String::from_utf16(&wide).map_err(|_| StrError::Utf16)?;
            return Ok((str, used));
        }
        wide.push(unit);
    }

    Err(StrError::Utf16)
}

/// Opens a protocol on a handle without taking exclusive ownership of it.
///
/// Exclusive opens of `BlockIO` or `PartitionInfo` disconnect the filesystem drivers sitting on top of a partition,
/// which would unmount the very volumes being scanned.
///
/// # Errors
///
/// May return an `Error` if the handle does not support the protocol.
pub fn open_shared<P: ProtocolPointer + ?Sized>(handle: Handle) -> BootResult<ScopedProtocol<P>> {
    // SAFETY: the protocol is only read from while the scoped protocol is alive, and nothing in the boot manager
    // uninstalls protocols from volume handles during a scan pass.
    let protocol = unsafe {
        boot::open_protocol::<P>(
            OpenProtocolParams {
                handle,
                agent: boot::image_handle(),
                controller: None,
            },
            OpenProtocolAttributes::GetProtocol,
        )
    }?;
    Ok(protocol)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_str_to_cstr() -> Result<(), StrError> {
        let cstr = str_to_cstr("foo bar")?;
        let str = String::from(&cstr);
        assert_eq!(str, "foo bar");
        Ok(())
    }

    #[test]
    fn test_utf16z() -> Result<(), StrError> {
        let bytes = str_to_utf16z("Debian");
        assert_eq!(bytes.len(), 14);
        let (str, used) = utf16z_to_string(&bytes)?;
        assert_eq!(str, "Debian");
        assert_eq!(used, 14);
        assert!(utf16z_to_string(&bytes[..12]).is_err());
        Ok(())
    }

    #[test]
    fn test_arch() {
        if cfg!(target_arch = "x86_64") {
            assert_eq!(Arch::current(), Some(Arch::X64));
            assert_eq!(Arch::X64.fallback_path(), "\\EFI\\BOOT\\bootx64.efi");
        }
        assert_eq!(Arch::Aa64.suffix(), "aa64");
    }

    #[test]
    fn test_bytes_to_device_path() {
        let end_only = [0x7f, 0xff, 0x04, 0x00];
        assert!(bytes_to_device_path(&end_only).is_ok());
        assert!(bytes_to_device_path(&[0x7f, 0xff]).is_err());
    }
}
