// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! Provides [`BootError`], which encapsulates other errors

use thiserror::Error;

/// An `Error` resulting from the program.
#[derive(Error, Debug)]
pub enum BootError {
    /// An error with UEFI, or a service from the [`uefi`] crate.
    #[error("UEFI Error")]
    Uefi(#[from] uefi::Error),

    /// A `String` could not be converted into a `CString16`
    #[error("String Conversion Error")]
    StrError(#[from] crate::system::helper::StrError),

    /// An error occurred while performing filesystem operations.
    #[error("Filesystem Error")]
    FsError(#[from] crate::system::fs::FsError),

    /// An error occurred while building a `DevicePath`.
    #[error("DevicePath Error")]
    DevicePathError(#[from] crate::system::helper::DevicePathError),

    /// A volume could not be used.
    #[error("Volume Error")]
    VolumeError(#[from] crate::volume::VolumeError),

    /// A directory could not be scanned for loaders.
    #[error("Scan Error")]
    ScanError(#[from] crate::scan::ScanError),

    /// A configuration file could not be read.
    #[error("Config Error")]
    ConfigError(#[from] crate::config::ConfigError),

    /// A `Boot####` variable could not be encoded, decoded or stored.
    #[error("NVRAM Error")]
    NvramError(#[from] crate::nvram::NvramError),

    /// A selected entry could not be dispatched.
    #[error("Dispatch Error")]
    DispatchError(#[from] crate::dispatch::DispatchError),

    /// The NVRAM write filter could not be installed.
    #[error("Filter Error")]
    FilterError(#[from] crate::dispatch::filter::FilterError),
}
