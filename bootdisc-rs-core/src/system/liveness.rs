// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! Tracks whether firmware resources may still be released.
//!
//! Once control is about to pass to a kernel, or boot services are about to be exited, the firmware heap may
//! already be gone. From that point on every release of memory or of a firmware resource is skipped.

use core::sync::atomic::{AtomicBool, Ordering};

/// Set once a hand-off has begun.
static KERNEL_STARTED: AtomicBool = AtomicBool::new(false);

/// Flags that a hand-off has begun. This cannot be undone.
pub fn mark_kernel_started() {
    KERNEL_STARTED.store(true, Ordering::SeqCst);
}

/// Checks if resources may still be released.
#[must_use = "Has no effect if the result is unused"]
pub fn resources_live() -> bool {
    !KERNEL_STARTED.load(Ordering::SeqCst)
}

/// Runs a release action only while resources are still live.
///
/// Returns if the action was run.
pub fn release_with(release: impl FnOnce()) -> bool {
    release_unless(&KERNEL_STARTED, release)
}

fn release_unless(started: &AtomicBool, release: impl FnOnce()) -> bool {
    if started.load(Ordering::SeqCst) {
        false
    } else {
        release();
        true
    }
}
