use bootdisc_rs_core::{
    BootResult,
    scan::filter::is_valid_loader,
    system::fs::{UefiFileSystem, VolumeFs},
    volume::SelfLocation,
};
use uefi::println;

use crate::press_for_reboot;

pub fn test_filesystem() -> BootResult<()> {
    let location = SelfLocation::current()?;
    let mut fs = UefiFileSystem::from_image_fs()?;
    println!("Running from {}", location.loader_path);

    assert!(fs.exists(&location.loader_path));
    assert!(is_valid_loader(&mut fs, &location.loader_path));
    let size = fs.file_size(&location.loader_path).expect("Own image has no size");
    assert_eq!(fs.read(&location.loader_path)?.len() as u64, size);
    assert_eq!(fs.read_prefix(&location.loader_path, 2)?, b"MZ");

    let listing = fs.read_dir(location.dir())?;
    assert!(listing.entries.iter().any(|x| location.loader_path.ends_with(&*x.name)));
    assert!(!fs.exists("\\this\\does\\not\\exist.efi"));

    println!("Volume label: {}", fs.get_volume_label()?);
    println!("All filesystem assertions passed!");
    println!("Press a key to reboot");
    press_for_reboot();
}
