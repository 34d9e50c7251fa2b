// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! Builds a [`VolumeCatalog`] from the volumes the firmware exposes.
//!
//! Every handle supporting [`SimpleFileSystem`] becomes one [`Volume`]. The partition, block and device path
//! protocols on the same handle are only ever opened shared, so the filesystem drivers stay connected.

use alloc::{string::String, vec, vec::Vec};
use log::{debug, warn};
use uefi::{
    Guid, Handle,
    boot::{self, SearchType},
    proto::{
        device_path::{DevicePath, DeviceSubType, DeviceType},
        loaded_image::LoadedImage,
        media::{block::BlockIO, fs::SimpleFileSystem, partition::PartitionInfo},
    },
};

use crate::{
    BootResult,
    system::{
        fs::UefiFileSystem,
        helper::{device_path_to_text, open_shared},
        strings::clean_path,
    },
    volume::{ApfsRole, DiskKind, FsType, SUPERBLOCK_SPAN, SelfLocation, Volume, VolumeCatalog},
};

/// Enumerates every volume the firmware can read files from.
///
/// A volume that cannot be probed is skipped with a warning; the rest of the catalog is still built.
///
/// # Errors
///
/// May return an `Error` if the firmware could not list the [`SimpleFileSystem`] handles.
pub fn enumerate_volumes() -> BootResult<VolumeCatalog> {
    let handles = boot::locate_handle_buffer(SearchType::from_proto::<SimpleFileSystem>())?;

    let mut volumes = Vec::with_capacity(handles.len());
    for &handle in handles.iter() {
        match probe_volume(handle) {
            Ok(volume) => {
                debug!(
                    "Found {} volume {:?}",
                    volume.fs_type.name(),
                    volume.display_name()
                );
                volumes.push(volume);
            }
            Err(e) => warn!("Skipping a volume that could not be probed: {e}"),
        }
    }

    Ok(VolumeCatalog::new(volumes))
}

/// Gathers everything the catalog knows about one volume handle.
fn probe_volume(handle: Handle) -> BootResult<Volume> {
    let (device_path, mut disk_kind, partitioned) = {
        let device_path = open_shared::<DevicePath>(handle)?;
        let (disk_kind, partitioned) = inspect_device_path(&device_path);
        (device_path.as_bytes().to_vec(), disk_kind, partitioned)
    };

    let superblock = read_superblock(handle).unwrap_or_default();
    let mut fs_type = FsType::detect(&superblock);
    if fs_type == FsType::Unknown && !partitioned {
        fs_type = FsType::WholeDisk;
    }
    if fs_type == FsType::Iso9660 {
        disk_kind = DiskKind::Optical;
    }

    let (partition_guid, partition_type_guid, part_name) = partition_info(handle);
    let vol_name = UefiFileSystem::from_handle(handle)
        .ok()
        .and_then(|mut fs| fs.get_volume_label().ok())
        .filter(|x| !x.is_empty());

    Ok(Volume {
        device_handle: Some(handle),
        partition_guid,
        partition_type_guid,
        volume_uuid: volume_uuid(fs_type, &superblock),
        fs_type,
        bitlocker: FsType::is_bitlocker(&superblock),
        disk_kind,
        apfs_role: ApfsRole::from_name(fs_type, vol_name.as_deref()),
        fs_name: Some(alloc::format!("{} volume", fs_type.name())),
        part_name,
        vol_name,
        badge: Some(badge_for(disk_kind).into()),
        device_path,
    })
}

/// Works out the disk kind from the nodes of a device path, and if the path ends in a partition.
fn inspect_device_path(device_path: &DevicePath) -> (DiskKind, bool) {
    let mut kind = DiskKind::Internal;
    let mut partitioned = false;

    for node in device_path.node_iter() {
        match node.full_type() {
            (DeviceType::MESSAGING, DeviceSubType::MESSAGING_USB) => kind = DiskKind::External,
            (
                DeviceType::MESSAGING,
                DeviceSubType::MESSAGING_MAC_ADDRESS
                | DeviceSubType::MESSAGING_IPV4
                | DeviceSubType::MESSAGING_IPV6,
            ) => kind = DiskKind::Network,
            (DeviceType::MEDIA, DeviceSubType::MEDIA_CD_ROM) => {
                kind = DiskKind::Optical;
                partitioned = true;
            }
            (DeviceType::MEDIA, DeviceSubType::MEDIA_HARD_DRIVE) => partitioned = true,
            _ => (),
        }
    }

    (kind, partitioned)
}

/// Reads the start of a volume so its filesystem can be detected.
///
/// Volumes smaller than [`SUPERBLOCK_SPAN`] are read one block at a time instead, which is enough for FAT.
fn read_superblock(handle: Handle) -> BootResult<Vec<u8>> {
    let block_io = open_shared::<BlockIO>(handle)?;
    let media = block_io.media();
    if !media.is_media_present() {
        return Ok(Vec::new());
    }

    let block_size = usize::try_from(media.block_size()).unwrap_or(512).max(512);
    let mut buf = vec![0; SUPERBLOCK_SPAN.div_ceil(block_size) * block_size];
    if block_io.read_blocks(media.media_id(), 0, &mut buf).is_ok() {
        return Ok(buf);
    }

    buf.truncate(block_size);
    block_io.read_blocks(media.media_id(), 0, &mut buf)?;
    Ok(buf)
}

/// Reads the GPT partition GUID, partition type GUID and partition name of a volume.
fn partition_info(handle: Handle) -> (Option<Guid>, Option<Guid>, Option<String>) {
    let Ok(info) = open_shared::<PartitionInfo>(handle) else {
        return (None, None, None);
    };
    let Some(entry) = info.gpt_partition_entry() else {
        return (None, None, None);
    };

    let name = { entry.partition_name };
    let units: Vec<u16> = name
        .iter()
        .map(|&c| u16::from(c))
        .take_while(|&c| c != 0)
        .collect();
    let name = String::from_utf16_lossy(&units);

    (
        Some(entry.unique_partition_guid),
        Some(entry.partition_type_guid.0),
        Some(name).filter(|x| !x.is_empty()),
    )
}

/// Reads the filesystem UUID where the superblock carries one at a known place.
fn volume_uuid(fs_type: FsType, superblock: &[u8]) -> Option<Guid> {
    let offset = match fs_type {
        FsType::Ext2 | FsType::Ext3 | FsType::Ext4 => 1024 + 104,
        FsType::Btrfs => 65536 + 32,
        _ => return None,
    };
    let bytes: [u8; 16] = superblock.get(offset..offset + 16)?.try_into().ok()?;
    Some(Guid::from_bytes(bytes)).filter(|x| *x != Guid::ZERO)
}

/// The badge drawn over entries of a disk kind.
const fn badge_for(kind: DiskKind) -> &'static str {
    match kind {
        DiskKind::Internal => "vol_internal",
        DiskKind::External => "vol_external",
        DiskKind::Optical => "vol_optical",
        DiskKind::Network => "vol_net",
    }
}

impl SelfLocation {
    /// Finds where the running image was loaded from.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the image handle does not support [`LoadedImage`].
    pub fn current() -> BootResult<Self> {
        let loaded_image = boot::open_protocol_exclusive::<LoadedImage>(boot::image_handle())?;
        let device = loaded_image.device();

        let loader_path = match loaded_image.file_path() {
            Some(path) => clean_path(&String::from(&*device_path_to_text(path)?)),
            None => String::new(),
        };
        let partition_guid = device.and_then(|handle| partition_info(handle).0);

        Ok(Self {
            device,
            partition_guid,
            loader_path,
        })
    }
}
