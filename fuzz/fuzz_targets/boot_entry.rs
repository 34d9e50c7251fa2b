// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

#![no_main]

use bootdisc_rs_core::nvram::NvramBootEntry;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(entry) = NvramBootEntry::decode(0, data) {
        let _ = entry.loader_path();
        let _ = entry.encode();
    }
});
