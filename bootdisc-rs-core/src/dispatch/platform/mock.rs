// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! A [`Platform`] that records what dispatch asked of it.

use alloc::{boxed::Box, string::String, vec::Vec};
use core::convert::Infallible;

use uefi::Status;

use crate::{
    BootResult,
    dispatch::{DispatchError, filter::FilterPolicy, platform::Platform},
    system::{
        fs::{FsError, VolumeFs, mock::MemFs},
        variable::{VariableStore, mock::MemoryVariableStore},
    },
    volume::Volume,
};

/// A hand-off or prompt made through [`MockPlatform`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    /// A loader was started, by path.
    StartLoader(String),

    /// The system was reset.
    ColdReset,

    /// A confirmation was asked for.
    Confirm(String),

    /// A warning was shown.
    Warning(String),
}

/// A platform without firmware.
pub struct MockPlatform {
    /// The variable namespace.
    pub store: MemoryVariableStore,

    /// Every hand-off and prompt, in order.
    pub calls: Vec<Call>,

    /// The load options of the last started loader.
    pub last_options: Option<String>,

    /// The installed filter policy.
    pub filter: Option<FilterPolicy>,

    /// The filesystem handed out by [`Platform::open_volume`], once.
    fs: Option<MemFs>,

    /// The answer to every confirmation.
    answer: bool,

    /// If `OpenCore` is reported as running.
    opencore: bool,

    /// The firmware vendor.
    vendor: String,
}

impl MockPlatform {
    /// Creates a platform that confirms everything and runs on EDK II.
    pub fn new() -> Self {
        Self {
            store: MemoryVariableStore::new(),
            calls: Vec::new(),
            last_options: None,
            filter: None,
            fs: None,
            answer: true,
            opencore: false,
            vendor: String::from("EDK II"),
        }
    }

    /// Sets the filesystem every volume opens to.
    pub fn with_fs(mut self, fs: MemFs) -> Self {
        self.fs = Some(fs);
        self
    }

    /// Sets the answer to every confirmation.
    pub const fn confirming(mut self, answer: bool) -> Self {
        self.answer = answer;
        self
    }

    /// Sets if `OpenCore` is reported as running.
    pub const fn opencore_running(mut self, running: bool) -> Self {
        self.opencore = running;
        self
    }

    /// Sets the firmware vendor.
    pub fn vendor(mut self, vendor: &str) -> Self {
        vendor.clone_into(&mut self.vendor);
        self
    }
}

impl Platform for MockPlatform {
    fn variables(&mut self) -> &mut dyn VariableStore {
        &mut self.store
    }

    fn open_volume(&mut self, _volume: &Volume) -> BootResult<Box<dyn VolumeFs>> {
        match self.fs.take() {
            Some(fs) => Ok(Box::new(fs)),
            None => Err(FsError::OpenErr(Status::NO_MEDIA).into()),
        }
    }

    fn start_loader(&mut self, _volume: &Volume, loader_path: &str, options: &str) -> BootResult<Infallible> {
        self.calls.push(Call::StartLoader(loader_path.into()));
        self.last_options = Some(options.into());
        Err(DispatchError::UnexpectedReturn(loader_path.into()).into())
    }

    fn cold_reset(&mut self) -> BootResult<Infallible> {
        self.calls.push(Call::ColdReset);
        Err(DispatchError::ResetFailed.into())
    }

    fn confirm(&mut self, question: &str) -> bool {
        self.calls.push(Call::Confirm(question.into()));
        self.answer
    }

    fn warn_user(&mut self, message: &str) {
        self.calls.push(Call::Warning(message.into()));
    }

    fn opencore_running(&mut self) -> bool {
        self.opencore
    }

    fn firmware_vendor(&self) -> String {
        self.vendor.clone()
    }

    fn install_nvram_filter(&mut self, policy: FilterPolicy) -> BootResult<()> {
        self.filter = Some(policy);
        Ok(())
    }
}
