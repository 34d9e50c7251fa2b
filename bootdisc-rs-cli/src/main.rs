// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! A command line interface frontend to `bootdisc-rs`.

#![no_main]
#![no_std]

extern crate alloc;

use alloc::string::{String, ToString};

use bootdisc_rs_core::{
    BootResult,
    boot::BootMgr,
    dispatch::platform::{Platform, UefiPlatform},
    nvram::manager::{BootOrderOp, boot_order_entries, manage_boot_order},
    system::{log_backend::UefiLogger, variable::RuntimeVariableStore},
};
use getargs::{Arg, Options};
use uefi::{Status, boot, cstr16, entry, println, proto::loaded_image::LoadedImage};

/// The global logging instance.
static LOGGER: UefiLogger = UefiLogger::new();

/// What the program was asked to do.
enum Command {
    /// List the discovered entries.
    List,

    /// List the variants of an entry.
    Submenu(String),

    /// Boot an entry.
    Boot(String),

    /// List the firmware boot order.
    Nvram,

    /// Make a firmware boot entry the default.
    Promote(String),

    /// Delete a firmware boot entry.
    Delete(String),
}

/// Parses an entry index, with an optional sub-menu variant after a colon.
fn parse_selection(value: &str) -> Option<(usize, Option<usize>)> {
    match value.split_once(':') {
        Some((index, variant)) => Some((index.parse().ok()?, Some(variant.parse().ok()?))),
        None => Some((value.parse().ok()?, None)),
    }
}

/// Prints every entry with its index.
fn list_entries(boot_mgr: &BootMgr) {
    let default = boot_mgr.get_default();
    for (i, entry) in boot_mgr.list().iter().enumerate() {
        let marker = if i == default { '*' } else { ' ' };
        match entry.loader_path() {
            Some(path) => println!("{marker}{i}: {} ({path})", entry.title),
            None => println!("{marker}{i}: {}", entry.title),
        }
    }
    for error in boot_mgr.report().errors() {
        println!("Warning: {error}");
    }
}

/// Prints the sub-menu variants of an entry.
fn list_submenu(boot_mgr: &BootMgr, index: usize) -> BootResult<()> {
    for (i, variant) in boot_mgr.submenu(index)?.iter().enumerate() {
        println!("{index}:{i}: {} ({})", variant.title, variant.options);
    }
    Ok(())
}

/// Prints the firmware boot order.
fn list_nvram() -> BootResult<()> {
    for entry in boot_order_entries(&mut RuntimeVariableStore)? {
        println!("Boot{:04x}: {}", entry.boot_num, entry.label);
    }
    Ok(())
}

/// Promotes or deletes a firmware boot entry, after asking the user.
fn edit_nvram(value: &str, op: BootOrderOp) -> BootResult<()> {
    let Ok(boot_num) = u16::from_str_radix(value.trim_start_matches("Boot"), 16) else {
        println!("Error: {value} is not a boot number");
        return Ok(());
    };
    let mut platform = UefiPlatform::new();
    let message = manage_boot_order(&mut RuntimeVariableStore, boot_num, op, |question| {
        platform.confirm(question)
    })?;
    println!("{message}");
    Ok(())
}

/// The actual main function of the program.
///
/// # Errors
///
/// May return an `Error` if the program could not obtain the `LoadedImage` protocol, or if an operation failed.
fn main_func() -> BootResult<()> {
    uefi::helpers::init()?; // initialize helpers (for print)

    let load_options = {
        let handle = boot::image_handle();
        let loaded_image = boot::open_protocol_exclusive::<LoadedImage>(handle)?;
        loaded_image
            .load_options_as_cstr16()
            .unwrap_or(cstr16!("bootdisc-rs-cli.efi")) // there is at least one argument, which is the filename
            .to_string()
    }; // loaded_image dropped here

    let mut options = load_options.split_whitespace();

    let Some(app_filename) = options.next() else {
        println!("Error: No load options were passed to the program");
        return Ok(());
    };

    let _ = log::set_logger(&LOGGER).map(|()| log::set_max_level(log::LevelFilter::Warn));

    let mut opts = Options::new(options);
    let mut command = None;
    while let Ok(Some(arg)) = opts.next_arg() {
        match arg {
            Arg::Short('c') | Arg::Long("config") => {
                if opts.value().is_err() {
                    println!("Error: A filename was not passed into the config argument");
                    return Ok(());
                }
            }
            Arg::Short('l') | Arg::Long("list") => command = Some(Command::List),
            Arg::Short('n') | Arg::Long("nvram") => command = Some(Command::Nvram),
            Arg::Short(c @ ('b' | 's' | 'p' | 'd')) => {
                let Ok(value) = opts.value() else {
                    println!("Error: A value was not passed into the -{c} argument");
                    return Ok(());
                };
                let value = String::from(value);
                command = Some(match c {
                    'b' => Command::Boot(value),
                    's' => Command::Submenu(value),
                    'p' => Command::Promote(value),
                    _ => Command::Delete(value),
                });
            }
            Arg::Long(name @ ("boot" | "submenu" | "promote" | "delete")) => {
                let Ok(value) = opts.value() else {
                    println!("Error: A value was not passed into the --{name} argument");
                    return Ok(());
                };
                let value = String::from(value);
                command = Some(match name {
                    "boot" => Command::Boot(value),
                    "submenu" => Command::Submenu(value),
                    "promote" => Command::Promote(value),
                    _ => Command::Delete(value),
                });
            }
            Arg::Short('h') | Arg::Long("help") => {
                command = None;
                break; // ignore any other arguments when help is specified
            }
            Arg::Short(invalid) => println!("Error: Unknown short argument: -{invalid}"),
            Arg::Long(invalid) => println!("Error: Unknown long argument: --{invalid}"),
            Arg::Positional(invalid) => println!("Error: Unknown positional argument: {invalid}"),
        }
    }

    let Some(command) = command else {
        println!(
            r"Usage: {app_filename} [OPTIONS] [ARGS]...

-h, --help              display this help and exit
-c, --config <FILE>     read the configuration from FILE
-l, --list              display the discovered entries and exit
-s, --submenu <N>       display the variants of entry N and exit
-b, --boot <N[:V]>      boot entry N, or its variant V
-n, --nvram             display the firmware boot order and exit
-p, --promote <####>    make Boot#### the default firmware boot option
-d, --delete <####>     delete Boot####
"
        );
        return Ok(());
    };

    let boot_mgr = match &command {
        Command::Nvram => return list_nvram(),
        Command::Promote(value) => return edit_nvram(value, BootOrderOp::Promote),
        Command::Delete(value) => return edit_nvram(value, BootOrderOp::Delete),
        _ => BootMgr::new(&load_options)?,
    };

    match command {
        Command::List => list_entries(&boot_mgr),
        Command::Submenu(value) => match value.parse() {
            Ok(index) => list_submenu(&boot_mgr, index)?,
            Err(e) => println!("Error: {e} (The value passed to the submenu argument could not be parsed as a number)"),
        },
        Command::Boot(value) => {
            let Some((index, variant)) = parse_selection(&value) else {
                println!("Error: The value passed to the boot argument could not be parsed as N or N:V");
                return Ok(());
            };
            match boot_mgr.boot(index, variant) {
                Ok(never) => match never {},
                Err(e) => return Err(e),
            }
        }
        Command::Nvram | Command::Promote(_) | Command::Delete(_) => (),
    }

    Ok(())
}

/// The main function of the program.
///
/// This will not panic on a fatal error, rather, it will return control to the UEFI shell (or the firmware menu).
/// This program is intended to be ran as a shell script, so panicking here would not make any sense.
#[entry]
fn main() -> Status {
    match main_func() {
        Ok(()) => Status::SUCCESS,
        Err(e) => {
            println!("Error: {e}");
            Status::ABORTED // dont panic when an error occurs, instead, just exit.
        }
    }
}
