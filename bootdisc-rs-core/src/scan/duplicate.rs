// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! Detects a removable media loader that is a copy of a loader found elsewhere on the volume.
//!
//! Distributions often install their loader twice, once in their own directory and once as `EFI\BOOT\bootx64.efi`.
//! Only showing one of them needs a byte for byte comparison, since a false positive would hide a loader.

use log::debug;

use crate::system::{fs::VolumeFs, strings::paths_equal};

/// Checks if two files on a volume have identical content.
///
/// A file is never a duplicate of itself, and a missing file is never a duplicate of anything.
pub fn is_duplicate(fs: &mut (impl VolumeFs + ?Sized), a: &str, b: &str) -> bool {
    if paths_equal(a, b) {
        return false;
    }

    let (Some(size_a), Some(size_b)) = (fs.file_size(a), fs.file_size(b)) else {
        return false;
    };
    if size_a != size_b {
        return false;
    }

    match (fs.read(a), fs.read(b)) {
        (Ok(x), Ok(y)) => x == y,
        _ => false,
    }
}

/// Checks if a file is a duplicate of any file in a list.
pub fn is_duplicate_of_any<'a>(
    fs: &mut (impl VolumeFs + ?Sized),
    path: &str,
    others: impl IntoIterator<Item = &'a str>,
) -> bool {
    for other in others {
        if is_duplicate(fs, path, other) {
            debug!("{path} is a copy of {other}");
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::fs::mock::{MemFs, pe_image};

    #[test]
    fn test_is_duplicate() {
        let mut fs = MemFs::new()
            .file("\\EFI\\BOOT\\bootx64.efi", pe_image(1), 1)
            .file("\\EFI\\debian\\grubx64.efi", pe_image(1), 2)
            .file("\\EFI\\debian\\shimx64.efi", pe_image(2), 3)
            .file("\\EFI\\debian\\mmx64.efi", "short", 4);

        assert!(is_duplicate(&mut fs, "\\EFI\\BOOT\\bootx64.efi", "\\EFI\\debian\\grubx64.efi"));
        assert!(!is_duplicate(&mut fs, "\\EFI\\BOOT\\bootx64.efi", "\\EFI\\debian\\shimx64.efi"));
        assert!(!is_duplicate(&mut fs, "\\EFI\\BOOT\\bootx64.efi", "\\EFI\\debian\\mmx64.efi"));
        assert!(!is_duplicate(&mut fs, "\\EFI\\BOOT\\bootx64.efi", "\\efi\\boot\\BOOTX64.EFI"));
        assert!(!is_duplicate(&mut fs, "\\EFI\\BOOT\\bootx64.efi", "\\EFI\\missing.efi"));

        assert!(is_duplicate_of_any(
            &mut fs,
            "\\EFI\\BOOT\\bootx64.efi",
            ["\\EFI\\debian\\shimx64.efi", "\\EFI\\debian\\grubx64.efi"]
        ));
    }
}
