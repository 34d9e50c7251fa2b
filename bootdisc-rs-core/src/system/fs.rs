// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! Filesystem helper functions for other modules.
//!
//! The scanner and classifier only ever see a volume through the [`VolumeFs`] trait. On firmware this is
//! [`UefiFileSystem`], a wrapper around the UEFI [`SimpleFileSystem`] protocol; in unit tests it is an in-memory
//! filesystem.
//!
//! Only FAT is guaranteed to be readable by the UEFI specification. Any other filesystem is readable only if the
//! firmware or a loaded driver publishes [`SimpleFileSystem`] for it.
//!
//! Paths given to [`VolumeFs`] are volume relative, rooted at `\`, and compared without regard to case.

use alloc::{borrow::ToOwned, string::String, vec, vec::Vec};
use thiserror::Error;
use uefi::{
    CString16, Handle, Status,
    boot::{self, ScopedProtocol},
    fs::COMMON_SKIP_DIRS,
    proto::media::{
        file::{Directory, File, FileAttribute, FileInfo, FileMode, FileSystemVolumeLabel, RegularFile},
        fs::SimpleFileSystem,
    },
    runtime::Time,
};

use crate::{BootResult, system::helper::str_to_cstr};

#[cfg(test)]
pub(crate) mod mock;

/// The size of one gigabyte in bytes. This is the default value if a file is too big to be read.
///
/// This is also a reasonable maximum size for files that may be read.
pub(crate) const ONE_GIGABYTE: usize = 1024 * 1024 * 1024;

/// An error that may result from performing filesystem operations
#[derive(Error, Debug)]
pub enum FsError {
    /// A file could not be opened.
    #[error("Failed to open file")]
    OpenErr(Status),

    /// A file could not be read.
    #[error("Failed to read file")]
    ReadErr(Status),

    /// The path pointed at a file where a directory was expected, or the other way around.
    #[error("Path \"{0}\" is not of the expected kind")]
    WrongKind(String),

    /// A file was larger than the caller allows.
    #[error("File is too large ({0} bytes)")]
    TooLarge(u64),

    /// Failed to get a volume label on a partition.
    #[error("Could not get volume label of a partition")]
    VolumeLabelErr,

    /// A path could not be converted into a UEFI string.
    #[error("Invalid path")]
    InvalidPath,
}

/// One entry of a directory listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirEntry {
    /// The filename of the entry.
    pub name: String,

    /// The size of the file as cached in the directory entry.
    pub size: u64,

    /// The modification time as a number that increases with time.
    pub modified: u64,

    /// If the entry is a directory.
    pub is_dir: bool,
}

/// The result of reading a directory.
#[derive(Debug)]
pub struct DirListing {
    /// The entries of the directory, excluding `.` and `..`.
    pub entries: Vec<DirEntry>,

    /// The status the directory walk ended with.
    ///
    /// Firmware reports the end of a directory in different ways. `NOT_FOUND` and `INVALID_PARAMETER` are known to
    /// be returned by buggy implementations at the end of a perfectly good listing.
    pub close_status: Status,
}

impl DirListing {
    /// Checks if the walk ended with a status that should be reported.
    #[must_use = "Has no effect if the result is unused"]
    pub fn close_error(&self) -> Option<Status> {
        match self.close_status {
            Status::SUCCESS | Status::NOT_FOUND | Status::INVALID_PARAMETER => None,
            status => Some(status),
        }
    }
}

/// Read access to the files of one volume.
pub trait VolumeFs {
    /// Lists the entries of a directory.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the directory could not be opened.
    fn read_dir(&mut self, path: &str) -> Result<DirListing, FsError>;

    /// Opens a file afresh and returns its size, or [`None`] if it could not be opened.
    fn file_size(&mut self, path: &str) -> Option<u64>;

    /// Reads up to `len` bytes from the start of a file.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the file could not be opened or read.
    fn read_prefix(&mut self, path: &str, len: usize) -> Result<Vec<u8>, FsError>;

    /// Reads the entire content of a file.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the file could not be opened or read.
    fn read(&mut self, path: &str) -> Result<Vec<u8>, FsError>;

    /// Checks if a file or directory exists.
    ///
    /// It makes no distinction between a file that could not be verified to exist and one that does not exist.
    fn exists(&mut self, path: &str) -> bool;
}

/// A rust-ier wrapper around [`SimpleFileSystem`].
pub struct UefiFileSystem(ScopedProtocol<SimpleFileSystem>);

impl UefiFileSystem {
    /// Create a new [`UefiFileSystem`].
    #[must_use = "Has no effect if the result is unused"]
    pub const fn new(fs: ScopedProtocol<SimpleFileSystem>) -> Self {
        Self(fs)
    }

    /// Create a new [`UefiFileSystem`] from a handle that supports [`SimpleFileSystem`].
    ///
    /// # Errors
    ///
    /// May return an `Error` if the handle does not actually support [`SimpleFileSystem`].
    pub fn from_handle(handle: Handle) -> BootResult<Self> {
        let fs = boot::open_protocol_exclusive(handle)?;
        Ok(Self(fs))
    }

    /// Create a new [`UefiFileSystem`] from the same filesystem as the boot manager.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the boot image's filesystem does not support [`SimpleFileSystem`] for some reason.
    pub fn from_image_fs() -> BootResult<Self> {
        let fs = boot::get_image_file_system(boot::image_handle())?;
        Ok(Self(fs))
    }

    /// Gets the volume label from a [`SimpleFileSystem`]
    ///
    /// # Errors
    ///
    /// May return an `Error` if the volume could not be opened, or the volume does not support [`FileSystemVolumeLabel`]
    pub fn get_volume_label(&mut self) -> Result<String, FsError> {
        let mut root = self.open_root()?;
        let info = root
            .get_boxed_info::<FileSystemVolumeLabel>()
            .map_err(|_| FsError::VolumeLabelErr)?;
        Ok(String::from(info.volume_label()))
    }

    /// Opens the root directory of the volume.
    fn open_root(&mut self) -> Result<Directory, FsError> {
        self.0
            .open_volume()
            .map_err(|e| FsError::OpenErr(e.status()))
    }

    /// Gets a handle to a [`RegularFile`] in the filesystem.
    fn get_regular_file(&mut self, path: &str) -> Result<RegularFile, FsError> {
        let cpath = to_cstr(path)?;
        let mut root = self.open_root()?;
        root.open(&cpath, FileMode::Read, FileAttribute::empty())
            .map_err(|e| FsError::OpenErr(e.status()))?
            .into_regular_file()
            .ok_or_else(|| FsError::WrongKind(path.to_owned()))
    }

    /// Gets a handle to a [`Directory`] in the filesystem.
    fn get_directory(&mut self, path: &str) -> Result<Directory, FsError> {
        let mut root = self.open_root()?;
        if path.trim_matches('\\').is_empty() {
            return Ok(root);
        }

        let cpath = to_cstr(path)?;
        root.open(&cpath, FileMode::Read, FileAttribute::empty())
            .map_err(|e| FsError::OpenErr(e.status()))?
            .into_directory()
            .ok_or_else(|| FsError::WrongKind(path.to_owned()))
    }
}

impl VolumeFs for UefiFileSystem {
    fn read_dir(&mut self, path: &str) -> Result<DirListing, FsError> {
        let mut dir = self.get_directory(path)?;
        let mut entries = Vec::new();

        let close_status = loop {
            match dir.read_entry_boxed() {
                Ok(Some(info)) => {
                    if COMMON_SKIP_DIRS.contains(&info.file_name()) {
                        continue; // excludes "." and ".."
                    }
                    entries.push(dir_entry(&info));
                }
                Ok(None) => break Status::SUCCESS,
                Err(e) => break e.status(),
            }
        };

        Ok(DirListing {
            entries,
            close_status,
        })
    }

    fn file_size(&mut self, path: &str) -> Option<u64> {
        let mut file = self.get_regular_file(path).ok()?;
        let info = file.get_boxed_info::<FileInfo>().ok()?;
        Some(info.file_size())
    }

    fn read_prefix(&mut self, path: &str, len: usize) -> Result<Vec<u8>, FsError> {
        let mut file = self.get_regular_file(path)?;
        let mut buf = vec![0; len];
        let read = file.read(&mut buf).map_err(|e| FsError::ReadErr(e.status()))?;
        buf.truncate(read);
        Ok(buf)
    }

    fn read(&mut self, path: &str) -> Result<Vec<u8>, FsError> {
        let mut file = self.get_regular_file(path)?;

        let info = file
            .get_boxed_info::<FileInfo>()
            .map_err(|e| FsError::ReadErr(e.status()))?;

        let size = usize::try_from(info.file_size()).unwrap_or(ONE_GIGABYTE);
        if size > ONE_GIGABYTE {
            return Err(FsError::TooLarge(info.file_size()));
        }

        let mut buf = vec![0; size];
        let read = file.read(&mut buf).map_err(|e| FsError::ReadErr(e.status()))?;
        buf.truncate(read);

        Ok(buf)
    }

    fn exists(&mut self, path: &str) -> bool {
        let Ok(cpath) = to_cstr(path) else {
            return false;
        };
        let Ok(mut root) = self.open_root() else {
            return false;
        };

        root.open(&cpath, FileMode::Read, FileAttribute::empty())
            .is_ok()
    }
}

/// Converts a volume relative path into a [`CString16`].
fn to_cstr(path: &str) -> Result<CString16, FsError> {
    str_to_cstr(path).map_err(|_| FsError::InvalidPath)
}

/// Converts a [`FileInfo`] into a [`DirEntry`].
fn dir_entry(info: &FileInfo) -> DirEntry {
    DirEntry {
        name: String::from(info.file_name()),
        size: info.file_size(),
        modified: time_to_stamp(info.modification_time()),
        is_dir: info.attribute().contains(FileAttribute::DIRECTORY),
    }
}

/// Converts a firmware [`Time`] into a number that increases with time.
///
/// The result is not a real epoch, but comparing two stamps orders them the same way as the times they came from.
#[must_use = "Has no effect if the result is unused"]
pub fn time_to_stamp(time: &Time) -> u64 {
    let days = u64::from(time.year()) * 372 + u64::from(time.month()) * 31 + u64::from(time.day());
    let seconds =
        u64::from(time.hour()) * 3600 + u64::from(time.minute()) * 60 + u64::from(time.second());
    days * 86_400 + seconds
}
