use bootdisc_rs_core::{
    BootResult,
    system::variable::{
        BOOTDISC_GUID, PERSISTENT, RuntimeVariableStore, VarWrite, get_value, previous_boot,
        set_if_changed, set_value, store_previous_boot,
    },
};
use uefi::{println, runtime::VariableVendor};

use crate::press_for_reboot;

const VARIABLE_NAME: &str = "TestVariable";
const VARIABLE_CONTENT: u32 = 23;
const UPDATED_VARIABLE_CONTENT: u32 = 24;
const PREVIOUS_TITLE: &str = "Boot integration test from ESP";

pub fn check_variable() -> BootResult<()> {
    let mut store = RuntimeVariableStore;
    let vendor = VariableVendor(BOOTDISC_GUID);
    let num = get_value::<u32>(&mut store, VARIABLE_NAME, &vendor)?;
    if num != 0 {
        assert_ne!(num, UPDATED_VARIABLE_CONTENT);
        if num == VARIABLE_CONTENT {
            println!("Successfully got value of TestVariable: {num}");
            assert_eq!(previous_boot(&mut store)?.as_deref(), Some(PREVIOUS_TITLE));

            set_value(&mut store, VARIABLE_NAME, &vendor, PERSISTENT, Some(UPDATED_VARIABLE_CONTENT))?;
            assert_eq!(
                set_if_changed(
                    &mut store,
                    VARIABLE_NAME,
                    &vendor,
                    PERSISTENT,
                    &UPDATED_VARIABLE_CONTENT.to_le_bytes()
                )?,
                VarWrite::AlreadyCurrent
            );

            println!("Now testing if variable can be deleted");
            println!("A panic will result on reboot if it fails");
            set_value::<u32>(&mut store, VARIABLE_NAME, &vendor, PERSISTENT, None)?;
            println!("Press a key to reboot");
            press_for_reboot();
        }
    }
    Ok(())
}

pub fn test_variables() -> BootResult<()> {
    let mut store = RuntimeVariableStore;
    let vendor = VariableVendor(BOOTDISC_GUID);
    set_value(&mut store, VARIABLE_NAME, &vendor, PERSISTENT, Some(VARIABLE_CONTENT))?;
    store_previous_boot(&mut store, PREVIOUS_TITLE)?;
    println!("Set value of TestVariable to 23");
    assert_eq!(
        get_value::<u32>(&mut store, VARIABLE_NAME, &vendor)?,
        VARIABLE_CONTENT
    );
    println!("Will now test if variable persists");
    println!("Press a key to reboot");
    press_for_reboot();
}
