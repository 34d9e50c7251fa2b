// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! The firmware services dispatch needs.
//!
//! Handing control to a loader or resetting the system cannot be exercised on the host, so the
//! [`Dispatcher`](crate::dispatch::Dispatcher) only reaches the firmware through [`Platform`]. [`UefiPlatform`]
//! is the real implementation.

use alloc::{boxed::Box, string::String};
use core::{cell::RefCell, convert::Infallible, ffi::c_void, fmt::Write, ptr::NonNull};

use log::{debug, error};
use uefi::{
    CStr16, CString16, Event, Guid, Status,
    boot::{self, EventType, ScopedProtocol, SearchType, Tpl},
    guid,
    proto::{BootPolicy, loaded_image::LoadedImage},
    runtime::{self, ResetType},
    system,
};

use crate::{
    BootResult,
    dispatch::{
        DispatchError,
        filter::{FilterGuard, FilterPolicy},
    },
    nvram::loader_device_path,
    system::{
        fs::VolumeFs,
        helper::{bytes_to_device_path, str_to_cstr},
        liveness::mark_kernel_started,
        variable::{RuntimeVariableStore, VariableStore},
    },
    volume::Volume,
};

#[cfg(test)]
pub(crate) mod mock;

/// The protocol `OpenCore` installs while it is the running bootstrap.
const OC_BOOTSTRAP_PROTOCOL: Guid = guid!("ba1eb455-b182-4f14-8521-e422c325def6");

/// How long a warning stays on screen without a key press, in microseconds.
const WARNING_STALL: usize = 4_000_000;

/// The firmware services used while dispatching an entry.
pub trait Platform {
    /// Returns the firmware variable namespace.
    fn variables(&mut self) -> &mut dyn VariableStore;

    /// Opens the filesystem of a volume.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the volume no longer has a filesystem.
    fn open_volume(&mut self, volume: &Volume) -> BootResult<Box<dyn VolumeFs>>;

    /// Loads and starts a loader with load options.
    ///
    /// This only returns if the loader could not be started, or if it exited.
    ///
    /// # Errors
    ///
    /// Always returns an `Error` when it returns.
    fn start_loader(&mut self, volume: &Volume, loader_path: &str, options: &str) -> BootResult<Infallible>;

    /// Cold resets the system.
    ///
    /// # Errors
    ///
    /// Always returns an `Error` when it returns.
    fn cold_reset(&mut self) -> BootResult<Infallible>;

    /// Asks the user a yes or no question.
    fn confirm(&mut self, question: &str) -> bool;

    /// Shows a warning, pausing until it is dismissed or a short time has passed.
    fn warn_user(&mut self, message: &str);

    /// Checks if `OpenCore` is the running bootstrap.
    fn opencore_running(&mut self) -> bool;

    /// Returns the vendor string of the firmware.
    fn firmware_vendor(&self) -> String;

    /// Installs the NVRAM write filter for the rest of the session.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the filter could not be installed.
    fn install_nvram_filter(&mut self, policy: FilterPolicy) -> BootResult<()>;
}

/// An instance of `LoadOptions` that remains for the lifetime of the program.
///
/// The loaded image only keeps a pointer to its load options, so they must outlive it.
static LOAD_OPTIONS: LoadOptions = LoadOptions {
    options: RefCell::new(None),
};

/// Storage struct for a [`CString16`] with load options.
struct LoadOptions {
    /// [`RefCell`] wrapper around the load options.
    options: RefCell<Option<CString16>>,
}

impl LoadOptions {
    /// Set the current load options from a [`CStr16`] slice.
    fn set(&self, s: &CStr16) {
        *self.options.borrow_mut() = Some(s.into());
    }

    /// Set the load options of an image to the load options of the struct.
    fn apply(&self, image: &mut ScopedProtocol<LoadedImage>) {
        let options = self.options.borrow();
        if let Some(options) = options.as_ref() {
            let size = u32::try_from(options.num_bytes()).unwrap_or(u32::MAX);
            // SAFETY: the options are stored in a static cell, so they outlive the loaded image
            unsafe {
                image.set_load_options(options.as_ptr().cast::<u8>(), size);
            }
        }
    }
}

// SAFETY: uefi is a single threaded environment, thread safety is irrelevant
unsafe impl Sync for LoadOptions {}

/// Flags the hand-off once the loader exits boot services.
unsafe extern "efiapi" fn on_exit_boot_services(_event: Event, _ctx: Option<NonNull<c_void>>) {
    mark_kernel_started();
}

/// The [`Platform`] backed by UEFI boot and runtime services.
#[derive(Default)]
pub struct UefiPlatform {
    /// The runtime variable store.
    store: RuntimeVariableStore,

    /// The NVRAM write filter, once installed.
    filter: Option<FilterGuard>,

    /// The event that flags the exit from boot services.
    exit_event: Option<Event>,
}

impl UefiPlatform {
    /// Creates a platform without a filter installed.
    #[must_use = "Has no effect if the result is unused"]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the exit boot services notification, once.
    fn watch_exit_boot_services(&mut self) {
        if self.exit_event.is_some() {
            return;
        }
        // SAFETY: the notify function only touches an atomic flag, which is sound at any TPL
        let event = unsafe {
            boot::create_event(
                EventType::SIGNAL_EXIT_BOOT_SERVICES,
                Tpl::NOTIFY,
                Some(on_exit_boot_services),
                None,
            )
        };
        match event {
            Ok(event) => self.exit_event = Some(event),
            Err(e) => debug!("Could not watch for the exit from boot services: {e}"),
        }
    }

    /// Reads a single key press.
    fn read_key() -> Option<char> {
        system::with_stdin(|stdin| {
            let event = stdin.wait_for_key_event()?;
            boot::wait_for_event(&mut [event]).ok()?;
            match stdin.read_key().ok()?? {
                uefi::proto::console::text::Key::Printable(c) => Some(char::from(c)),
                uefi::proto::console::text::Key::Special(_) => None,
            }
        })
    }
}

impl Platform for UefiPlatform {
    fn variables(&mut self) -> &mut dyn VariableStore {
        &mut self.store
    }

    fn open_volume(&mut self, volume: &Volume) -> BootResult<Box<dyn VolumeFs>> {
        Ok(Box::new(volume.open_fs()?))
    }

    fn start_loader(&mut self, volume: &Volume, loader_path: &str, options: &str) -> BootResult<Infallible> {
        let device_path = loader_device_path(&volume.device_path, loader_path)?;
        let device_path = bytes_to_device_path(&device_path)?;

        let src = boot::LoadImageSource::FromDevicePath {
            device_path,
            boot_policy: BootPolicy::ExactMatch,
        };
        let handle = boot::load_image(boot::image_handle(), src)?;

        {
            let mut image = boot::open_protocol_exclusive::<LoadedImage>(handle)?;
            LOAD_OPTIONS.set(&str_to_cstr(options)?);
            LOAD_OPTIONS.apply(&mut image);
        }

        self.watch_exit_boot_services();
        boot::start_image(handle)?;
        Err(DispatchError::UnexpectedReturn(loader_path.into()).into())
    }

    fn cold_reset(&mut self) -> BootResult<Infallible> {
        runtime::reset(ResetType::COLD, Status::SUCCESS, None)
    }

    fn confirm(&mut self, question: &str) -> bool {
        system::with_stdout(|stdout| {
            let _ = write!(stdout, "{question} [y/N] ");
        });
        let answer = Self::read_key();
        system::with_stdout(|stdout| {
            let _ = writeln!(stdout);
        });
        matches!(answer, Some('y' | 'Y'))
    }

    fn warn_user(&mut self, message: &str) {
        error!("{message}");
        system::with_stdout(|stdout| {
            let _ = writeln!(stdout, "{message}");
        });
        boot::stall(WARNING_STALL);
    }

    fn opencore_running(&mut self) -> bool {
        boot::locate_handle_buffer(SearchType::ByProtocol(&OC_BOOTSTRAP_PROTOCOL))
            .is_ok_and(|x| !x.is_empty())
    }

    fn firmware_vendor(&self) -> String {
        String::from(&*system::firmware_vendor())
    }

    fn install_nvram_filter(&mut self, policy: FilterPolicy) -> BootResult<()> {
        if self.filter.is_some() {
            return Ok(());
        }
        self.filter = Some(FilterGuard::new(policy)?);
        Ok(())
    }
}
