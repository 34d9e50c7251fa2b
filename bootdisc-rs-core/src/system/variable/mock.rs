// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! An in-memory [`VariableStore`] for unit tests.

use alloc::{borrow::ToOwned, string::String, vec::Vec};
use uefi::{
    Guid,
    runtime::{VariableAttributes, VariableVendor},
};

use crate::{
    BootResult,
    system::variable::{StoredVariable, VariableStore},
};

/// One variable held by [`MemoryVariableStore`].
struct MemoryVariable {
    /// The name of the variable.
    name: String,

    /// The vendor namespace of the variable.
    vendor: Guid,

    /// The stored content and attributes.
    stored: StoredVariable,
}

/// A variable namespace that lives entirely in memory.
#[derive(Default)]
pub struct MemoryVariableStore {
    /// Every variable that currently exists.
    vars: Vec<MemoryVariable>,

    /// The name and length of every write made, in order.
    writes: Vec<(String, usize)>,
}

impl MemoryVariableStore {
    /// Creates an empty namespace.
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts how many writes were made to a variable name, deletions included.
    pub fn write_count(&self, name: &str) -> usize {
        self.writes.iter().filter(|(x, _)| x == name).count()
    }

    /// Returns the name and length of every write made, in order.
    pub fn writes(&self) -> &[(String, usize)] {
        &self.writes
    }
}

impl VariableStore for MemoryVariableStore {
    fn get(&mut self, name: &str, vendor: &VariableVendor) -> BootResult<Option<StoredVariable>> {
        Ok(self
            .vars
            .iter()
            .find(|x| x.name == name && x.vendor == vendor.0)
            .map(|x| x.stored.clone()))
    }

    fn set(
        &mut self,
        name: &str,
        vendor: &VariableVendor,
        attributes: VariableAttributes,
        data: &[u8],
    ) -> BootResult<()> {
        self.writes.push((name.to_owned(), data.len()));
        self.vars.retain(|x| !(x.name == name && x.vendor == vendor.0));
        if !data.is_empty() {
            self.vars.push(MemoryVariable {
                name: name.to_owned(),
                vendor: vendor.0,
                stored: StoredVariable {
                    data: data.to_vec(),
                    attributes,
                },
            });
        }
        Ok(())
    }
}
