// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! The in-memory catalog of volumes found during a scan pass.
//!
//! A [`Volume`] is created once per enumeration pass, shared read-only through [`Rc`] by every candidate and entry
//! found on it, and thrown away wholesale on rescan. It never holds an open root directory: each consumer opens
//! the filesystem when it needs it, since a root directory handle is only valid while the volume stays mounted.
//!
//! Partition GUIDs identify volumes for lookups, but cloned disks share them, so lookups by GUID return every
//! match instead of assuming there is exactly one.

use alloc::{rc::Rc, string::String, vec::Vec};
use thiserror::Error;
use uefi::{Guid, Handle, proto::media::partition::GptPartitionType};

use crate::{
    BootResult,
    system::{
        fs::UefiFileSystem,
        strings::{contains_ignore_case, parent_dir},
    },
};

pub mod enumerate;

/// Errors that may result from using a [`Volume`].
#[derive(Error, Debug)]
pub enum VolumeError {
    /// The volume was not found through firmware, so it has no filesystem that can be opened.
    #[error("Volume {0:?} has no firmware handle")]
    NoHandle(Option<String>),
}

/// How many bytes from the start of a partition [`FsType::detect`] looks at.
pub const SUPERBLOCK_SPAN: usize = 65536 + 4096;

/// The filesystem found on a volume.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FsType {
    /// FAT12.
    Fat12,
    /// FAT16.
    Fat16,
    /// FAT32.
    Fat32,
    /// exFAT.
    ExFat,
    /// NTFS.
    Ntfs,
    /// ext2.
    Ext2,
    /// ext3.
    Ext3,
    /// ext4.
    Ext4,
    /// `ReiserFS`.
    ReiserFs,
    /// HFS+.
    HfsPlus,
    /// Btrfs.
    Btrfs,
    /// XFS.
    Xfs,
    /// JFS.
    Jfs,
    /// ISO-9660.
    Iso9660,
    /// APFS.
    Apfs,
    /// A filesystem that was not recognized.
    Unknown,
    /// A device without a partition table, read as a whole.
    WholeDisk,
}

impl FsType {
    /// Detects the filesystem from the first [`SUPERBLOCK_SPAN`] bytes of a partition.
    ///
    /// Shorter buffers are fine; any signature lying past the end of the buffer simply does not match.
    #[must_use = "Has no effect if the result is unused"]
    pub fn detect(buf: &[u8]) -> Self {
        let at = |offset: usize, magic: &[u8]| {
            buf.get(offset..offset + magic.len())
                .is_some_and(|x| x == magic)
        };
        let u32_at = |offset: usize| {
            buf.get(offset..offset + 4)
                .and_then(|x| x.try_into().ok())
                .map_or(0, u32::from_le_bytes)
        };

        if at(510, &[0x55, 0xaa]) {
            if at(3, b"EXFAT   ") {
                return Self::ExFat;
            }
            if at(3, b"NTFS    ") {
                return Self::Ntfs;
            }
            if at(54, b"FAT12   ") {
                return Self::Fat12;
            }
            if at(54, b"FAT16   ") {
                return Self::Fat16;
            }
            if at(82, b"FAT32   ") {
                return Self::Fat32;
            }
        }

        if at(1024 + 56, &[0x53, 0xef]) {
            let compat = u32_at(1024 + 92);
            let incompat = u32_at(1024 + 96);
            return if incompat & (0x0040 | 0x0200) != 0 {
                Self::Ext4
            } else if compat & 0x0004 != 0 {
                Self::Ext3
            } else {
                Self::Ext2
            };
        }

        if at(1024, b"H+") || at(1024, b"HX") {
            return Self::HfsPlus;
        }
        if at(65536 + 52, b"ReIsErFs")
            || at(65536 + 52, b"ReIsEr2Fs")
            || at(65536 + 52, b"ReIsEr3Fs")
        {
            return Self::ReiserFs;
        }
        if at(65536 + 64, b"_BHRfS_M") {
            return Self::Btrfs;
        }
        if at(0, b"XFSB") {
            return Self::Xfs;
        }
        if at(32768, b"JFS1") {
            return Self::Jfs;
        }
        if at(32769, b"CD001") {
            return Self::Iso9660;
        }
        if at(32, b"NXSB") || at(32, b"APSB") {
            return Self::Apfs;
        }

        Self::Unknown
    }

    /// Checks if a boot sector belongs to a BitLocker encrypted volume.
    #[must_use = "Has no effect if the result is unused"]
    pub fn is_bitlocker(buf: &[u8]) -> bool {
        buf.get(3..11).is_some_and(|x| x == b"-FVE-FS-")
    }

    /// Returns a human readable name for the filesystem.
    #[must_use = "Has no effect if the result is unused"]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Fat12 => "FAT12",
            Self::Fat16 => "FAT16",
            Self::Fat32 => "FAT32",
            Self::ExFat => "exFAT",
            Self::Ntfs => "NTFS",
            Self::Ext2 => "ext2",
            Self::Ext3 => "ext3",
            Self::Ext4 => "ext4",
            Self::ReiserFs => "ReiserFS",
            Self::HfsPlus => "HFS+",
            Self::Btrfs => "Btrfs",
            Self::Xfs => "XFS",
            Self::Jfs => "JFS",
            Self::Iso9660 => "ISO-9660",
            Self::Apfs => "APFS",
            Self::Unknown => "unknown",
            Self::WholeDisk => "whole disk",
        }
    }

    /// Checks if the filesystem is one of the FAT variants.
    #[must_use = "Has no effect if the result is unused"]
    pub const fn is_fat(self) -> bool {
        matches!(self, Self::Fat12 | Self::Fat16 | Self::Fat32)
    }
}

/// The kind of device a volume sits on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiskKind {
    /// A fixed, internal disk.
    Internal,

    /// A removable or USB disk.
    External,

    /// An optical disc.
    Optical,

    /// A network boot source.
    Network,
}

/// The role of an APFS volume within its container.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApfsRole {
    /// The sealed system volume.
    System,

    /// The preboot volume, which holds the loaders.
    Preboot,

    /// The user data volume.
    Data,

    /// Any other role, or not an APFS volume at all.
    Undefined,
}

impl ApfsRole {
    /// Derives the role of a volume from its filesystem and volume name.
    #[must_use = "Has no effect if the result is unused"]
    pub fn from_name(fs_type: FsType, name: Option<&str>) -> Self {
        if fs_type != FsType::Apfs {
            return Self::Undefined;
        }
        match name {
            Some(name) if name.eq_ignore_ascii_case("preboot") => Self::Preboot,
            Some(name)
                if name.eq_ignore_ascii_case("data")
                    || name.to_ascii_lowercase().ends_with(" - data") =>
            {
                Self::Data
            }
            Some(name)
                if ["recovery", "vm", "update"]
                    .iter()
                    .any(|x| name.eq_ignore_ascii_case(x)) =>
            {
                Self::Undefined
            }
            _ => Self::System,
        }
    }
}

/// One mounted, recognized partition.
#[derive(Debug)]
pub struct Volume {
    /// The firmware handle of the volume. There is none for volumes that do not come from firmware.
    pub device_handle: Option<Handle>,

    /// The unique GUID of the partition.
    pub partition_guid: Option<Guid>,

    /// The GUID of the partition's type.
    pub partition_type_guid: Option<Guid>,

    /// The UUID of the filesystem, if it could be read.
    pub volume_uuid: Option<Guid>,

    /// The filesystem on the volume.
    pub fs_type: FsType,

    /// If the volume is a BitLocker encrypted NTFS volume.
    pub bitlocker: bool,

    /// The kind of disk the volume is on.
    pub disk_kind: DiskKind,

    /// The APFS role of the volume.
    pub apfs_role: ApfsRole,

    /// The name of the filesystem, such as `ext4 volume`.
    pub fs_name: Option<String>,

    /// The GPT partition name.
    pub part_name: Option<String>,

    /// The filesystem label.
    pub vol_name: Option<String>,

    /// The badge icon to draw over entries from this volume.
    pub badge: Option<String>,

    /// The raw device path of the volume.
    pub device_path: Vec<u8>,
}

impl Volume {
    /// Creates a volume that only knows its filesystem and disk kind.
    #[must_use = "Has no effect if the result is unused"]
    pub const fn new(fs_type: FsType, disk_kind: DiskKind) -> Self {
        Self {
            device_handle: None,
            partition_guid: None,
            partition_type_guid: None,
            volume_uuid: None,
            fs_type,
            bitlocker: false,
            disk_kind,
            apfs_role: ApfsRole::Undefined,
            fs_name: None,
            part_name: None,
            vol_name: None,
            badge: None,
            device_path: Vec::new(),
        }
    }

    /// Returns every name the volume is known by, filesystem name first.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        [&self.fs_name, &self.vol_name, &self.part_name]
            .into_iter()
            .filter_map(|x| x.as_deref())
    }

    /// Returns the name shown to the user.
    #[must_use = "Has no effect if the result is unused"]
    pub fn display_name(&self) -> Option<&str> {
        self.vol_name
            .as_deref()
            .or(self.part_name.as_deref())
            .or(self.fs_name.as_deref())
            .filter(|x| !x.is_empty())
    }

    /// Checks if a description from the configuration refers to this volume.
    ///
    /// A description matches a volume name (ignoring case) or the partition GUID.
    #[must_use = "Has no effect if the result is unused"]
    pub fn matches_description(&self, description: &str) -> bool {
        self.names().any(|x| x.eq_ignore_ascii_case(description))
            || self.partition_guid.is_some_and(|guid| {
                alloc::format!("{guid}").eq_ignore_ascii_case(description)
            })
    }

    /// Checks if any name of the volume marks it as a Ventoy volume.
    #[must_use = "Has no effect if the result is unused"]
    pub fn is_ventoy(&self) -> bool {
        self.names().any(|x| contains_ignore_case(x, "ventoy"))
    }

    /// Opens the filesystem of the volume.
    ///
    /// The returned filesystem is only valid while the volume stays mounted, so it should not outlive a scan pass.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the volume has no handle, or the handle no longer supports a filesystem.
    pub fn open_fs(&self) -> BootResult<UefiFileSystem> {
        let handle = self
            .device_handle
            .ok_or_else(|| VolumeError::NoHandle(self.display_name().map(Into::into)))?;
        UefiFileSystem::from_handle(handle)
    }

    /// Checks if the volume is a FAT formatted EFI System Partition.
    #[must_use = "Has no effect if the result is unused"]
    pub fn is_esp(&self) -> bool {
        self.fs_type.is_fat()
            && self.partition_type_guid == Some(GptPartitionType::EFI_SYSTEM_PARTITION.0)
    }
}

/// Where the running boot manager was loaded from.
#[derive(Clone, Debug, Default)]
pub struct SelfLocation {
    /// The handle of the volume the boot manager is on.
    pub device: Option<Handle>,

    /// The partition GUID of that volume.
    pub partition_guid: Option<Guid>,

    /// The path of the boot manager binary on that volume.
    pub loader_path: String,
}

impl SelfLocation {
    /// Returns the directory the boot manager is installed in.
    #[must_use = "Has no effect if the result is unused"]
    pub fn dir(&self) -> &str {
        parent_dir(&self.loader_path)
    }

    /// Checks if a volume is the one the boot manager was loaded from.
    #[must_use = "Has no effect if the result is unused"]
    pub fn is_on(&self, volume: &Volume) -> bool {
        match (self.device, volume.device_handle) {
            (Some(a), Some(b)) => a == b,
            _ => self.partition_guid.is_some() && self.partition_guid == volume.partition_guid,
        }
    }
}

/// Every volume found in one enumeration pass.
#[derive(Debug, Default)]
pub struct VolumeCatalog {
    /// The volumes, in enumeration order.
    volumes: Vec<Rc<Volume>>,
}

impl VolumeCatalog {
    /// Creates a catalog from the volumes of an enumeration pass.
    #[must_use = "Has no effect if the result is unused"]
    pub fn new(volumes: Vec<Volume>) -> Self {
        Self {
            volumes: volumes.into_iter().map(Rc::new).collect(),
        }
    }

    /// Returns every volume in the catalog.
    #[must_use = "Has no effect if the result is unused"]
    pub fn volumes(&self) -> &[Rc<Volume>] {
        &self.volumes
    }

    /// Returns every volume with a partition GUID. Cloned disks may produce more than one.
    pub fn find_by_partition_guid(&self, guid: Guid) -> impl Iterator<Item = &Rc<Volume>> {
        self.volumes
            .iter()
            .filter(move |x| x.partition_guid == Some(guid))
    }

    /// Returns the volume the boot manager was loaded from.
    #[must_use = "Has no effect if the result is unused"]
    pub fn self_volume(&self, location: &SelfLocation) -> Option<&Rc<Volume>> {
        self.volumes.iter().find(|x| location.is_on(x))
    }

    /// Finds every EFI System Partition on an internal disk, other than the one the boot manager runs from.
    ///
    /// The returned list only borrows the volumes; dropping it leaves the catalog untouched.
    #[must_use = "Has no effect if the result is unused"]
    pub fn find_all_esps(&self, location: Option<&SelfLocation>) -> Vec<Rc<Volume>> {
        self.volumes
            .iter()
            .filter(|x| x.disk_kind == DiskKind::Internal && x.is_esp())
            .filter(|x| {
                location.is_none_or(|loc| {
                    loc.partition_guid.is_none() || loc.partition_guid != x.partition_guid
                })
            })
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::{borrow::ToOwned, vec};

    /// Creates a zeroed buffer with a signature written at an offset.
    fn with_magic(offset: usize, magic: &[u8]) -> Vec<u8> {
        let mut buf = vec![0; SUPERBLOCK_SPAN];
        buf[offset..offset + magic.len()].copy_from_slice(magic);
        buf
    }

    #[test]
    fn test_detect_fs() {
        let mut fat = with_magic(82, b"FAT32   ");
        fat[510] = 0x55;
        fat[511] = 0xaa;
        assert_eq!(FsType::detect(&fat), FsType::Fat32);

        let mut ext = with_magic(1024 + 56, &[0x53, 0xef]);
        assert_eq!(FsType::detect(&ext), FsType::Ext2);
        ext[1024 + 92] = 0x04;
        assert_eq!(FsType::detect(&ext), FsType::Ext3);
        ext[1024 + 96] = 0x40;
        assert_eq!(FsType::detect(&ext), FsType::Ext4);

        assert_eq!(FsType::detect(&with_magic(65536 + 64, b"_BHRfS_M")), FsType::Btrfs);
        assert_eq!(FsType::detect(&with_magic(32769, b"CD001")), FsType::Iso9660);
        assert_eq!(FsType::detect(&with_magic(32, b"NXSB")), FsType::Apfs);
        assert_eq!(FsType::detect(&[0; 16]), FsType::Unknown);
        assert!(FsType::is_bitlocker(&with_magic(3, b"-FVE-FS-")));
    }

    #[test]
    fn test_apfs_role() {
        assert_eq!(ApfsRole::from_name(FsType::Apfs, Some("Preboot")), ApfsRole::Preboot);
        assert_eq!(
            ApfsRole::from_name(FsType::Apfs, Some("Macintosh HD - Data")),
            ApfsRole::Data
        );
        assert_eq!(ApfsRole::from_name(FsType::Apfs, Some("Macintosh HD")), ApfsRole::System);
        assert_eq!(ApfsRole::from_name(FsType::Ext4, Some("Preboot")), ApfsRole::Undefined);
    }

    #[test]
    fn test_catalog_lookups() {
        let guid = uefi::guid!("0fc63daf-8483-4772-8e79-3d69d8477de4");
        let esp = |guid| Volume {
            partition_guid: Some(guid),
            partition_type_guid: Some(GptPartitionType::EFI_SYSTEM_PARTITION.0),
            vol_name: Some("ESP".to_owned()),
            ..Volume::new(FsType::Fat32, DiskKind::Internal)
        };
        let other = uefi::guid!("11111111-2222-3333-4444-555555555555");
        let catalog = VolumeCatalog::new(vec![esp(guid), esp(guid), esp(other)]);

        assert_eq!(catalog.find_by_partition_guid(guid).count(), 2);

        let location = SelfLocation {
            partition_guid: Some(guid),
            loader_path: "\\EFI\\bootdisc\\bootdisc.efi".to_owned(),
            ..SelfLocation::default()
        };
        assert_eq!(location.dir(), "\\EFI\\bootdisc");
        let esps = catalog.find_all_esps(Some(&location));
        assert_eq!(esps.len(), 1);
        assert_eq!(esps[0].partition_guid, Some(other));
        assert!(esps[0].matches_description("esp"));
        assert!(esps[0].matches_description("11111111-2222-3333-4444-555555555555"));
    }
}
