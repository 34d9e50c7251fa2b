// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! Load options and distribution hints for Linux kernels started through their EFI stub.
//!
//! Options come from a `refind_linux.conf` file, where every line is a quoted label followed by quoted options:
//!
//! ```text
//! "Boot with standard options"  "ro root=UUID=1234 quiet"
//! "Boot to single-user mode"    "ro root=UUID=1234 single"
//! ```
//!
//! The first line gives the options of the main entry; every line becomes a sub-menu variant.

use alloc::{string::String, vec::Vec};
use log::debug;

use crate::{
    classify::initrd::{add_initrd_to_options, find_initrd},
    system::{
        fs::VolumeFs,
        strings::{
            basename, contains_ignore_case, find_numbers, join_path, merge_unique_item,
            merge_unique_words, parent_dir, substitute_version,
        },
    },
};

/// The name of the file holding kernel load options.
pub const OPTIONS_FILE: &str = "refind_linux.conf";

/// The directory searched for [`OPTIONS_FILE`] when the kernel's own directory has none.
const OPTIONS_FALLBACK_DIR: &str = "\\boot";

/// Files on a Linux root filesystem that name the distribution.
const RELEASE_FILES: [&str; 2] = ["\\etc\\lsb-release", "\\etc\\os-release"];

/// The keys of [`RELEASE_FILES`] whose values are distribution names.
const RELEASE_KEYS: [&str; 3] = ["ID", "NAME", "DISTRIB_ID"];

/// One line of an options file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OptionsLine {
    /// The label shown in the sub-menu.
    pub label: String,

    /// The kernel command line.
    pub options: String,
}

/// Splits a line into whitespace separated tokens.
///
/// Double quotes group whitespace into a token, and a `#` outside quotes ends the line.
#[must_use = "Has no effect if the result is unused"]
pub fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quoted = false;

    for c in line.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                in_token = true;
            }
            '#' if !quoted => break,
            c if c.is_whitespace() && !quoted => {
                if in_token {
                    tokens.push(core::mem::take(&mut current));
                    in_token = false;
                }
            }
            c => {
                current.push(c);
                in_token = true;
            }
        }
    }
    if in_token {
        tokens.push(current);
    }

    tokens
}

/// Parses the content of an options file. Lines without both a label and options are skipped.
#[must_use = "Has no effect if the result is unused"]
pub fn parse_options_file(content: &str) -> Vec<OptionsLine> {
    content
        .lines()
        .map(tokenize)
        .filter(|x| x.len() > 1)
        .map(|mut tokens| {
            let options = tokens.swap_remove(1);
            let label = tokens.swap_remove(0);
            OptionsLine { label, options }
        })
        .collect()
}

/// Reads the options file for a kernel.
///
/// The kernel's directory is searched first, then `\boot`. Returns [`None`] if neither has the file.
pub fn read_options_file(
    fs: &mut (impl VolumeFs + ?Sized),
    loader_path: &str,
) -> Option<Vec<OptionsLine>> {
    for dir in [parent_dir(loader_path), OPTIONS_FALLBACK_DIR] {
        let path = join_path(dir, OPTIONS_FILE);
        if let Ok(content) = fs.read(&path) {
            debug!("Reading kernel options from {path}");
            return Some(parse_options_file(&String::from_utf8_lossy(&content)));
        }
    }
    None
}

/// Returns the options of the first line of the options file for a kernel.
pub fn first_options(fs: &mut (impl VolumeFs + ?Sized), loader_path: &str) -> Option<String> {
    read_options_file(fs, loader_path)?
        .into_iter()
        .next()
        .map(|x| x.options)
}

/// Works out the load options and initrd of the main entry of a kernel.
///
/// A version token in the options is replaced by the initrd's version, or removed if there is no initrd.
pub fn main_linux_options(
    fs: &mut (impl VolumeFs + ?Sized),
    loader_path: &str,
) -> (String, Option<String>) {
    let options = first_options(fs, loader_path).unwrap_or_default();
    let initrd = find_initrd(fs, loader_path);

    let version = initrd
        .as_deref()
        .and_then(|x| find_numbers(basename(x)))
        .unwrap_or_default();
    let options = substitute_version(&options, version);

    (add_initrd_to_options(&options, initrd.as_deref()), initrd)
}

/// Adds guesses of the Linux distribution a kernel belongs to to a hint list.
///
/// Release files on the volume are read first, then the kernel's filename is checked for Fedora and Red Hat
/// release tags.
pub fn guess_distribution(fs: &mut (impl VolumeFs + ?Sized), loader_path: &str, hints: &mut String) {
    for file in RELEASE_FILES {
        let Ok(content) = fs.read(file) else {
            continue;
        };
        for line in String::from_utf8_lossy(&content).lines() {
            if let Some((key, value)) = line.split_once('=')
                && RELEASE_KEYS.iter().any(|x| x.eq_ignore_ascii_case(key.trim()))
            {
                merge_unique_words(hints, value.trim().trim_matches(['"', '\'']));
            }
        }
    }

    if contains_ignore_case(loader_path, ".fc") {
        merge_unique_item(hints, "fedora");
    }
    if contains_ignore_case(loader_path, ".el") {
        merge_unique_item(hints, "redhat");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::fs::mock::MemFs;
    use alloc::vec;

    const OPTIONS: &str = "# generated\n\
        \"Boot with standard options\"  \"ro root=UUID=1234 quiet\"\n\
        \n\
        \"Boot to single-user mode\" \"ro root=UUID=1234 single\" # comment\n\
        \"Lonely label\"\n";

    #[test]
    fn test_tokenize() {
        assert_eq!(
            tokenize("\"Boot with options\"   \"ro quiet\""),
            vec!["Boot with options", "ro quiet"]
        );
        assert_eq!(tokenize("plain tokens # ignored"), vec!["plain", "tokens"]);
        assert_eq!(tokenize("\"\" \"x\""), vec!["", "x"]);
        assert!(tokenize("   ").is_empty());
    }

    #[test]
    fn test_parse_options_file() {
        let lines = parse_options_file(OPTIONS);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].label, "Boot with standard options");
        assert_eq!(lines[1].options, "ro root=UUID=1234 single");
    }

    #[test]
    fn test_options_file_fallback_dir() {
        let mut fs = MemFs::new().file("\\boot\\refind_linux.conf", OPTIONS, 1);
        assert_eq!(
            first_options(&mut fs, "\\boot\\efi\\vmlinuz-6.1.0").as_deref(),
            Some("ro root=UUID=1234 quiet")
        );
        assert!(read_options_file(&mut MemFs::new(), "\\vmlinuz").is_none());
    }

    #[test]
    fn test_main_linux_options() {
        let mut fs = MemFs::new()
            .file("\\boot\\vmlinuz-6.1.0", "k", 1)
            .file("\\boot\\initrd.img-6.1.0", "i", 1)
            .file(
                "\\boot\\refind_linux.conf",
                "\"Default\" \"ro root=/dev/sda2 modules=%v\"",
                1,
            );

        let (options, initrd) = main_linux_options(&mut fs, "\\boot\\vmlinuz-6.1.0");
        assert_eq!(initrd.as_deref(), Some("\\boot\\initrd.img-6.1.0"));
        assert_eq!(
            options,
            "ro root=/dev/sda2 modules=6.1.0 initrd=\\boot\\initrd.img-6.1.0"
        );

        let mut fs = MemFs::new().file(
            "\\boot\\refind_linux.conf",
            "\"Default\" \"modules=%v\"",
            1,
        );
        let (options, initrd) = main_linux_options(&mut fs, "\\boot\\vmlinuz-6.1.0");
        assert_eq!(initrd, None);
        assert_eq!(options, "modules=");
    }

    #[test]
    fn test_guess_distribution() {
        let mut fs = MemFs::new()
            .file("\\etc\\os-release", "NAME=\"Fedora Linux\"\nID=fedora\nVERSION_ID=40\n", 1);
        let mut hints = String::from("boot");
        guess_distribution(&mut fs, "\\boot\\vmlinuz-6.8.5-301.fc40.x86_64", &mut hints);
        assert_eq!(hints, "boot,fedora,linux");

        let mut hints = String::new();
        guess_distribution(&mut MemFs::new(), "\\vmlinuz-4.18.0-513.el8.x86_64", &mut hints);
        assert_eq!(hints, "redhat");
    }
}
