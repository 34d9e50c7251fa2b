// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! Use the UEFI allocator as the global allocator.
//!
//! This is enabled when the `global_allocator` feature is enabled, in case the user wanted to roll their
//! own custom allocator or for fuzzing/testing.
//!
//! Frees become no-ops once [`crate::system::liveness::mark_kernel_started`] has been called.

#![cfg(feature = "global_allocator")]
use core::alloc::{GlobalAlloc, Layout};

use uefi::allocator::Allocator;

use crate::system::liveness::resources_live;

/// The UEFI pool allocator, with frees gated on resource liveness.
struct LivenessAllocator;

// SAFETY: every call is forwarded to the UEFI pool allocator, except frees after the hand-off, which leak memory
// that the firmware is about to reclaim anyways.
unsafe impl GlobalAlloc for LivenessAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        // SAFETY: the caller upholds the contract of `GlobalAlloc::alloc`.
        unsafe { Allocator.alloc(layout) }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        if resources_live() {
            // SAFETY: the caller upholds the contract of `GlobalAlloc::dealloc`, and the pointer came from `alloc`.
            unsafe { Allocator.dealloc(ptr, layout) }
        }
    }
}

/// The UEFI global allocator.
#[global_allocator]
static ALLOCATOR: LivenessAllocator = LivenessAllocator;
