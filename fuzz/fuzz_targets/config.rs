// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

#![no_main]

use bootdisc_rs_core::config::{BootConfig, config_override};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(content) = str::from_utf8(data) {
        let _ = BootConfig::parse(content);
        let _ = config_override(content);
    }
});
