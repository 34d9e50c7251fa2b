use bootdisc_rs_core::{
    BootResult,
    nvram::{
        boot_var_name, construct_boot_entry,
        manager::{create_nvram_entry, delete_boot_entry, find_boot_num, read_boot_entry, read_boot_order},
    },
    system::variable::{BOOTDISC_GUID, PERSISTENT, RuntimeVariableStore, delete_variable, get_value, set_value},
    volume::{SelfLocation, enumerate::enumerate_volumes},
};
use uefi::{println, runtime::VariableVendor};

use crate::press_for_reboot;

const CREATED_VARIABLE_NAME: &str = "CreatedBootEntry";
const LABEL: &str = "bootdisc-rs integration test";

fn self_device_path() -> BootResult<(alloc::vec::Vec<u8>, SelfLocation)> {
    let location = SelfLocation::current()?;
    let catalog = enumerate_volumes()?;
    let volume = catalog
        .self_volume(&location)
        .expect("The running image was not found on any volume");
    Ok((volume.device_path.clone(), location))
}

pub fn check_nvram_entry() -> BootResult<()> {
    let mut store = RuntimeVariableStore;
    let vendor = VariableVendor(BOOTDISC_GUID);
    let created = get_value::<u32>(&mut store, CREATED_VARIABLE_NAME, &vendor)?;
    if created == 0 {
        return Ok(());
    }
    let boot_num = u16::try_from(created - 1).expect("Stored boot number out of range");
    delete_variable(&mut store, CREATED_VARIABLE_NAME, &vendor)?;

    let entry = read_boot_entry(&mut store, boot_num)?.expect("Boot entry did not persist");
    assert_eq!(entry.label, LABEL);
    println!("{} persisted across a reboot", boot_var_name(boot_num));

    delete_boot_entry(&mut store, boot_num)?;
    assert!(read_boot_entry(&mut store, boot_num)?.is_none());
    assert!(!read_boot_order(&mut store)?.contains(&boot_num));
    println!("Successfully deleted {}", boot_var_name(boot_num));
    println!("Press a key to reboot");
    press_for_reboot();
}

pub fn test_nvram_entry() -> BootResult<()> {
    let mut store = RuntimeVariableStore;
    let (device_path, location) = self_device_path()?;

    let boot_num = create_nvram_entry(&mut store, &device_path, &location.loader_path, LABEL, false)?;
    println!("Created {}", boot_var_name(boot_num));

    let bytes = construct_boot_entry(&device_path, &location.loader_path, LABEL)?;
    assert_eq!(find_boot_num(&mut store, &bytes)?, (boot_num, true));
    assert_eq!(
        create_nvram_entry(&mut store, &device_path, &location.loader_path, LABEL, false)?,
        boot_num
    );

    set_value(
        &mut store,
        CREATED_VARIABLE_NAME,
        &VariableVendor(BOOTDISC_GUID),
        PERSISTENT,
        Some(u32::from(boot_num) + 1),
    )?;
    println!("Will now test if the boot entry persists");
    println!("Press a key to reboot");
    press_for_reboot();
}
