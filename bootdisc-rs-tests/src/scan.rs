use bootdisc_rs_core::{
    BootResult,
    config::BootConfig,
    scan::{ScanContext, scan_volumes},
    volume::{SelfLocation, enumerate::enumerate_volumes},
};
use uefi::println;

use crate::press_for_reboot;

pub fn test_scan() -> BootResult<()> {
    let location = SelfLocation::current()?;
    let catalog = enumerate_volumes()?;
    println!("Found {} volumes", catalog.volumes().len());
    for volume in catalog.volumes() {
        println!(
            "  {} ({}){}",
            volume.display_name().unwrap_or("unnamed"),
            volume.fs_type.name(),
            if location.is_on(volume) { " *" } else { "" }
        );
    }
    assert!(catalog.self_volume(&location).is_some());

    let config = BootConfig::default();
    let ctx = ScanContext::new(&config, Some(&location));
    let (entries, report) = scan_volumes(&catalog, &ctx, |x| x.open_fs());
    for entry in &entries {
        println!("  {} [{}]", entry.title, entry.loader_path().unwrap_or_default());
        assert!(entry.loader_path().is_some_and(|x| x.starts_with('\\')));
        assert!(
            entry.loader_path() != Some(location.loader_path.as_str()) || !location.is_on(&**entry.volume().expect("Disk entry without a volume")),
            "The running image was added as an entry"
        );
    }
    for error in report.errors() {
        println!("  Scan error: {error}");
    }

    println!("All scan assertions passed!");
    println!("Press a key to reboot");
    press_for_reboot();
}
