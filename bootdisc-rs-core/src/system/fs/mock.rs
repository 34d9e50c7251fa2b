// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! An in-memory [`VolumeFs`] for unit tests.

use alloc::{borrow::ToOwned, string::String, vec::Vec};
use uefi::Status;

use crate::system::{
    fs::{DirEntry, DirListing, FsError, VolumeFs},
    strings::{basename, clean_path, parent_dir},
};

/// A file held by [`MemFs`].
struct MemFile {
    /// The cleaned up path of the file.
    path: String,

    /// The content of the file.
    data: Vec<u8>,

    /// The modification stamp of the file.
    modified: u64,

    /// The size reported in directory listings, if it differs from the real size.
    listed_size: Option<u64>,
}

/// A volume that lives entirely in memory.
#[derive(Default)]
pub struct MemFs {
    /// Every file on the volume.
    files: Vec<MemFile>,

    /// Directories that exist without containing any file.
    dirs: Vec<String>,

    /// The status every directory walk ends with.
    close_status: Option<Status>,
}

impl MemFs {
    /// Creates an empty volume.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a file with a modification stamp.
    pub fn file(mut self, path: &str, data: impl Into<Vec<u8>>, modified: u64) -> Self {
        self.files.push(MemFile {
            path: clean_path(path),
            data: data.into(),
            modified,
            listed_size: None,
        });
        self
    }

    /// Adds an empty directory.
    pub fn dir(mut self, path: &str) -> Self {
        self.dirs.push(clean_path(path));
        self
    }

    /// Makes directory listings report a different size than the file really has.
    pub fn listed_size(mut self, path: &str, size: u64) -> Self {
        if let Some(file) = self.find_mut(path) {
            file.listed_size = Some(size);
        }
        self
    }

    /// Makes every directory walk end with a status.
    pub const fn close_status(mut self, status: Status) -> Self {
        self.close_status = Some(status);
        self
    }

    /// Finds a file by path.
    fn find(&self, path: &str) -> Option<&MemFile> {
        let path = clean_path(path);
        self.files.iter().find(|x| x.path.eq_ignore_ascii_case(&path))
    }

    /// Finds a file by path for modification.
    fn find_mut(&mut self, path: &str) -> Option<&mut MemFile> {
        let path = clean_path(path);
        self.files
            .iter_mut()
            .find(|x| x.path.eq_ignore_ascii_case(&path))
    }

    /// Checks if a directory exists, either explicitly or because a file lives under it.
    fn dir_exists(&self, path: &str) -> bool {
        let path = clean_path(path);
        if path == "\\" {
            return true;
        }
        let prefix = alloc::format!("{}\\", path.to_ascii_lowercase());
        self.dirs.iter().any(|x| x.eq_ignore_ascii_case(&path))
            || self
                .dirs
                .iter()
                .chain(self.files.iter().map(|x| &x.path))
                .any(|x| x.to_ascii_lowercase().starts_with(&prefix))
    }
}

impl VolumeFs for MemFs {
    fn read_dir(&mut self, path: &str) -> Result<DirListing, FsError> {
        if !self.dir_exists(path) {
            return Err(FsError::OpenErr(Status::NOT_FOUND));
        }
        let path = clean_path(path);
        let prefix = if path == "\\" {
            String::from("\\")
        } else {
            alloc::format!("{path}\\")
        };

        let mut entries: Vec<DirEntry> = Vec::new();
        let mut push = |entry: DirEntry| {
            if !entries.iter().any(|x| x.name.eq_ignore_ascii_case(&entry.name)) {
                entries.push(entry);
            }
        };

        for file in &self.files {
            if parent_dir(&file.path).eq_ignore_ascii_case(&path) {
                push(DirEntry {
                    name: basename(&file.path).to_owned(),
                    size: file.listed_size.unwrap_or(file.data.len() as u64),
                    modified: file.modified,
                    is_dir: false,
                });
            }
        }

        let nested = self
            .files
            .iter()
            .map(|x| &x.path)
            .chain(self.dirs.iter())
            .filter(|x| x.len() > prefix.len() && x[..prefix.len()].eq_ignore_ascii_case(&prefix));
        for nested in nested {
            let rest = &nested[prefix.len()..];
            if let Some((name, _)) = rest.split_once('\\') {
                push(DirEntry {
                    name: name.to_owned(),
                    size: 0,
                    modified: 0,
                    is_dir: true,
                });
            } else if self.dirs.iter().any(|x| x == nested) {
                push(DirEntry {
                    name: rest.to_owned(),
                    size: 0,
                    modified: 0,
                    is_dir: true,
                });
            }
        }

        Ok(DirListing {
            entries,
            close_status: self.close_status.unwrap_or(Status::SUCCESS),
        })
    }

    fn file_size(&mut self, path: &str) -> Option<u64> {
        self.find(path).map(|x| x.data.len() as u64)
    }

    fn read_prefix(&mut self, path: &str, len: usize) -> Result<Vec<u8>, FsError> {
        let file = self
            .find(path)
            .ok_or(FsError::OpenErr(Status::NOT_FOUND))?;
        Ok(file.data.iter().copied().take(len).collect())
    }

    fn read(&mut self, path: &str) -> Result<Vec<u8>, FsError> {
        self.find(path)
            .map(|x| x.data.clone())
            .ok_or(FsError::OpenErr(Status::NOT_FOUND))
    }

    fn exists(&mut self, path: &str) -> bool {
        self.find(path).is_some() || self.dir_exists(path)
    }
}

/// A minimal PE image that passes loader validation.
pub fn pe_image(marker: u8) -> Vec<u8> {
    let mut image = alloc::vec![0; 0x100];
    image[0] = b'M';
    image[1] = b'Z';
    image[0x3c] = 0x80;
    image[0x80..0x84].copy_from_slice(b"PE\0\0");
    image[0xff] = marker;
    image
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mem_fs_listing() -> Result<(), FsError> {
        let mut fs = MemFs::new()
            .file("\\EFI\\debian\\grubx64.efi", pe_image(1), 10)
            .file("\\EFI\\BOOT\\bootx64.efi", pe_image(2), 20)
            .dir("\\EFI\\tools");

        let root = fs.read_dir("\\")?;
        assert_eq!(root.entries.len(), 1);
        assert!(root.entries[0].is_dir);

        let efi = fs.read_dir("\\efi")?;
        let names: Vec<_> = efi.entries.iter().map(|x| x.name.as_str()).collect();
        assert_eq!(names, ["debian", "BOOT", "tools"]);

        let debian = fs.read_dir("\\EFI\\debian")?;
        assert_eq!(debian.entries[0].name, "grubx64.efi");
        assert_eq!(debian.entries[0].modified, 10);

        assert!(fs.exists("\\EFI\\TOOLS"));
        assert!(fs.read_dir("\\EFI\\missing").is_err());
        Ok(())
    }
}
