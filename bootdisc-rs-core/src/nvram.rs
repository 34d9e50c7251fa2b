// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! The codec for firmware `Boot####` variables.
//!
//! A `Boot####` variable is laid out as:
//!
//! ```text
//! u32 attributes | u16 device path size | UTF-16Z label | device path | 2 reserved bytes
//! ```
//!
//! All integers are little endian. Entries written by the boot manager always end with two reserved zero bytes and
//! never carry optional data. Entries written by other programs may carry arbitrary optional data after the device
//! path, which decoding ignores.
//!
//! The label is sized by its own terminator rather than by the header, so decoding bounds every field against the
//! size of the variable before trusting it.

use alloc::{format, string::String, vec::Vec};
use bitflags::bitflags;
use thiserror::Error;
use uefi::proto::device_path::{
    DevicePath, DeviceSubType, DeviceType,
    build::{self, DevicePathBuilder},
};

use crate::{
    BootResult,
    system::helper::{
        DevicePathError, bytes_to_device_path, str_to_cstr, str_to_utf16z, utf16z_to_string,
    },
};

pub mod firmware;
pub mod manager;

/// The size of the fixed header of a `Boot####` variable.
const HEADER_SIZE: usize = 6;

/// The reserved bytes written after the device path.
const RESERVED: [u8; 2] = [0; 2];

/// Errors that may result from encoding, decoding or managing `Boot####` variables.
#[derive(Error, Debug)]
pub enum NvramError {
    /// The variable is shorter than the fixed header.
    #[error("Boot entry is shorter than its header ({0} bytes)")]
    Truncated(usize),

    /// The label is not terminated within the variable, or is not UTF-16.
    #[error("Boot entry label is malformed")]
    BadLabel,

    /// The device path size in the header runs past the end of the variable.
    #[error("Boot entry device path runs past the end of the variable")]
    DevicePathOverrun,

    /// The device path is too large to be described by the header.
    #[error("Device path of {0} bytes does not fit in a boot entry")]
    OutOfResources(usize),

    /// A boot number that was asked for has no variable.
    #[error("Boot{0:04x} does not exist")]
    Missing(u16),

    /// The user did not confirm a change to the boot order.
    #[error("Boot order change was not confirmed")]
    NotConfirmed,
}

bitflags! {
    /// The attributes of a load option.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct LoadOptionAttributes: u32 {
        /// The entry is shown and may be booted.
        const ACTIVE = 0x0000_0001;
        /// Drivers are reconnected after the entry is loaded.
        const FORCE_RECONNECT = 0x0000_0002;
        /// The entry is hidden from firmware menus.
        const HIDDEN = 0x0000_0008;
        /// The entry is an application rather than a boot option.
        const CATEGORY_APP = 0x0000_0100;
    }
}

/// One decoded `Boot####` variable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NvramBootEntry {
    /// The number of the variable.
    pub boot_num: u16,

    /// The attributes of the load option.
    pub attributes: LoadOptionAttributes,

    /// The label shown in firmware menus.
    pub label: String,

    /// The raw device path of the loader.
    pub device_path: Vec<u8>,
}

impl NvramBootEntry {
    /// Creates an active entry.
    #[must_use = "Has no effect if the result is unused"]
    pub fn new(boot_num: u16, label: &str, device_path: Vec<u8>) -> Self {
        Self {
            boot_num,
            attributes: LoadOptionAttributes::ACTIVE,
            label: label.into(),
            device_path,
        }
    }

    /// Encodes the entry as the content of a `Boot####` variable.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the device path is larger than a `u16` can describe.
    pub fn encode(&self) -> Result<Vec<u8>, NvramError> {
        let dp_size = u16::try_from(self.device_path.len())
            .map_err(|_| NvramError::OutOfResources(self.device_path.len()))?;
        let label = str_to_utf16z(&self.label);

        let mut buf =
            Vec::with_capacity(HEADER_SIZE + label.len() + self.device_path.len() + RESERVED.len());
        buf.extend_from_slice(&self.attributes.bits().to_le_bytes());
        buf.extend_from_slice(&dp_size.to_le_bytes());
        buf.extend_from_slice(&label);
        buf.extend_from_slice(&self.device_path);
        buf.extend_from_slice(&RESERVED);
        Ok(buf)
    }

    /// Decodes the content of a `Boot####` variable.
    ///
    /// No byte past the declared device path size is read.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the variable is shorter than its header, the label is not terminated, or the
    /// device path runs past the end of the variable.
    pub fn decode(boot_num: u16, data: &[u8]) -> Result<Self, NvramError> {
        let (Some(attributes), Some(dp_size)) = (data.get(0..4), data.get(4..6)) else {
            return Err(NvramError::Truncated(data.len()));
        };
        let attributes = u32::from_le_bytes([attributes[0], attributes[1], attributes[2], attributes[3]]);
        let dp_size = usize::from(u16::from_le_bytes([dp_size[0], dp_size[1]]));

        let (label, label_size) =
            utf16z_to_string(&data[HEADER_SIZE..]).map_err(|_| NvramError::BadLabel)?;

        let start = HEADER_SIZE + label_size;
        let device_path = data
            .get(start..start + dp_size)
            .ok_or(NvramError::DevicePathOverrun)?;

        Ok(Self {
            boot_num,
            attributes: LoadOptionAttributes::from_bits_retain(attributes),
            label,
            device_path: device_path.to_vec(),
        })
    }

    /// Returns the name of the variable holding this entry.
    #[must_use = "Has no effect if the result is unused"]
    pub fn var_name(&self) -> String {
        boot_var_name(self.boot_num)
    }

    /// Parses the raw device path of the entry.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the bytes are not a well formed device path.
    pub fn device_path(&self) -> Result<&DevicePath, DevicePathError> {
        bytes_to_device_path(&self.device_path)
    }

    /// Returns the file path the entry loads, if its device path ends in one.
    #[must_use = "Has no effect if the result is unused"]
    pub fn loader_path(&self) -> Option<String> {
        let device_path = self.device_path().ok()?;
        device_path
            .node_iter()
            .filter(|node| {
                node.full_type() == (DeviceType::MEDIA, DeviceSubType::MEDIA_FILE_PATH)
            })
            .filter_map(|node| utf16z_to_string(node.data()).ok())
            .map(|(path, _)| path)
            .last()
    }
}

/// Returns the name of the `Boot####` variable for a boot number.
#[must_use = "Has no effect if the result is unused"]
pub fn boot_var_name(boot_num: u16) -> String {
    format!("Boot{boot_num:04x}")
}

/// Builds the device path of a loader on a volume.
///
/// The nodes of the volume's device path are kept, and a file path node for the loader is appended.
///
/// # Errors
///
/// May return an `Error` if the volume's device path is malformed, or the loader path is not a valid UEFI string.
pub fn loader_device_path(volume_device_path: &[u8], loader_path: &str) -> BootResult<Vec<u8>> {
    let volume = bytes_to_device_path(volume_device_path)?;
    let path = str_to_cstr(loader_path)?;

    let mut buf = Vec::new();
    let mut builder = DevicePathBuilder::with_vec(&mut buf);
    for node in volume.node_iter() {
        builder = builder
            .push(&node)
            .map_err(DevicePathError::from)?;
    }
    let device_path = builder
        .push(&build::media::FilePath { path_name: &path })
        .map_err(DevicePathError::from)?
        .finalize()
        .map_err(DevicePathError::from)?;

    Ok(device_path.as_bytes().to_vec())
}

/// Builds the encoded content of a `Boot####` variable for a loader on a volume.
///
/// # Errors
///
/// May return an `Error` if the device path could not be built, or is too large for a boot entry.
pub fn construct_boot_entry(
    volume_device_path: &[u8],
    loader_path: &str,
    label: &str,
) -> BootResult<Vec<u8>> {
    let device_path = loader_device_path(volume_device_path, loader_path)?;
    Ok(NvramBootEntry::new(0, label, device_path).encode()?)
}
