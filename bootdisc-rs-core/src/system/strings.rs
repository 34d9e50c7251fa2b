// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! Path and string heuristics shared by the scanner and the classifier.
//!
//! Firmware filesystems are case insensitive, so nearly every comparison in this module folds ASCII case. Lists
//! coming from the configuration are plain comma-delimited strings, and are only ever walked through
//! [`comma_items`] or [`nth_item`].

use alloc::{format, string::String};

/// The characters that separate words in volume, filesystem and partition names.
const WORD_SEPARATORS: [char; 4] = [' ', '-', '_', ':'];

/// The token in load options that is replaced by a version string.
pub const VERSION_TOKEN: &str = "%v";

/// Returns an iterator over the tokens of a comma-delimited list.
///
/// Tokens are trimmed, and empty tokens are skipped.
pub fn comma_items(list: &str) -> impl Iterator<Item = &str> {
    list.split(',').map(str::trim).filter(|x| !x.is_empty())
}

/// Returns the nth token of a comma-delimited list, if there is one.
#[must_use = "Has no effect if the result is unused"]
pub fn nth_item(list: &str, n: usize) -> Option<&str> {
    comma_items(list).nth(n)
}

/// Checks if `item` is equal (ignoring case) to any token of a comma-delimited list.
#[must_use = "Has no effect if the result is unused"]
pub fn is_in(item: &str, list: &str) -> bool {
    comma_items(list).any(|x| x.eq_ignore_ascii_case(item))
}

/// Checks if any token of a comma-delimited list is contained (ignoring case) in `big`.
#[must_use = "Has no effect if the result is unused"]
pub fn is_in_substring(big: &str, list: &str) -> bool {
    comma_items(list).any(|x| contains_ignore_case(big, x))
}

/// Checks if `haystack` contains `needle`, ignoring case.
#[must_use = "Has no effect if the result is unused"]
pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack
        .to_ascii_lowercase()
        .contains(&needle.to_ascii_lowercase())
}

/// Checks if `s` starts with `prefix`, ignoring case.
#[must_use = "Has no effect if the result is unused"]
pub fn starts_with_ignore_case(s: &str, prefix: &str) -> bool {
    s.len() >= prefix.len()
        && s.is_char_boundary(prefix.len())
        && s[..prefix.len()].eq_ignore_ascii_case(prefix)
}

/// Checks if `s` ends with `suffix`, ignoring case.
#[must_use = "Has no effect if the result is unused"]
pub fn ends_with_ignore_case(s: &str, suffix: &str) -> bool {
    s.len() >= suffix.len()
        && s.is_char_boundary(s.len() - suffix.len())
        && s[s.len() - suffix.len()..].eq_ignore_ascii_case(suffix)
}

/// Returns the byte range of the version substring of a filename.
///
/// The version runs from the first digit to the last digit of the name, inclusive.
fn version_range(name: &str) -> Option<(usize, usize)> {
    let first = name.find(|c: char| c.is_ascii_digit())?;
    let last = name.rfind(|c: char| c.is_ascii_digit())?;
    Some((first, last + 1))
}

/// Extracts the version substring of a filename.
///
/// For `vmlinuz-6.1.0.efi` this is `6.1.0`, and for `initramfs-5.10.0-rc7.img` this is `5.10.0-rc7`.
/// Names without any digit have no version.
#[must_use = "Has no effect if the result is unused"]
pub fn find_numbers(name: &str) -> Option<&str> {
    version_range(name).map(|(start, end)| &name[start..end])
}

/// Returns the part of a filename right after its version substring.
///
/// If the name has no version, the whole name is returned.
#[must_use = "Has no effect if the result is unused"]
pub fn version_tail(name: &str) -> &str {
    version_range(name).map_or(name, |(_, end)| &name[end..])
}

/// Counts the characters two strings share from their start, ignoring case.
#[must_use = "Has no effect if the result is unused"]
pub fn chars_in_common(a: &str, b: &str) -> usize {
    a.chars()
        .zip(b.chars())
        .take_while(|(x, y)| x.eq_ignore_ascii_case(y))
        .count()
}

/// Adds an item to a comma-delimited list, unless it is already present.
pub fn merge_unique_item(list: &mut String, item: &str) {
    let item = item.trim();
    if item.is_empty() || is_in(item, list) {
        return;
    }
    if !list.is_empty() {
        list.push(',');
    }
    list.push_str(item);
}

/// Adds every token of a comma-delimited list to another comma-delimited list, skipping duplicates.
pub fn merge_unique_items(list: &mut String, items: &str) {
    for item in comma_items(items) {
        merge_unique_item(list, item);
    }
}

/// Splits a name into words and adds each of them, lowercased, to a comma-delimited list.
///
/// Words are separated by spaces, dashes, underscores or colons.
pub fn merge_unique_words(list: &mut String, source: &str) {
    for word in source.split(WORD_SEPARATORS).filter(|x| !x.is_empty()) {
        merge_unique_item(list, &word.to_ascii_lowercase());
    }
}

/// Returns the last component of a path.
#[must_use = "Has no effect if the result is unused"]
pub fn basename(path: &str) -> &str {
    path.rsplit(['\\', '/']).next().unwrap_or(path)
}

/// Returns the directory a path is in.
///
/// A file directly in the root directory returns `\`, and a bare filename returns an empty string.
#[must_use = "Has no effect if the result is unused"]
pub fn parent_dir(path: &str) -> &str {
    match path.rfind(['\\', '/']) {
        Some(0) => "\\",
        Some(idx) => &path[..idx],
        None => "",
    }
}

/// Joins a directory and a filename into a rooted path.
#[must_use = "Has no effect if the result is unused"]
pub fn join_path(dir: &str, name: &str) -> String {
    let dir = dir.trim_end_matches(['\\', '/']);
    let name = name.trim_start_matches(['\\', '/']);
    if dir.is_empty() {
        format!("\\{name}")
    } else if dir.starts_with(['\\', '/']) {
        clean_path(&format!("{dir}\\{name}"))
    } else {
        clean_path(&format!("\\{dir}\\{name}"))
    }
}

/// Cleans up a path so that it can be compared and opened.
///
/// Forward slashes become backslashes, runs of separators are collapsed, trailing separators are removed, and the
/// path always starts at the root.
#[must_use = "Has no effect if the result is unused"]
pub fn clean_path(path: &str) -> String {
    let mut cleaned = String::with_capacity(path.len() + 1);
    for component in path.split(['\\', '/']).filter(|x| !x.is_empty()) {
        cleaned.push('\\');
        cleaned.push_str(component);
    }
    if cleaned.is_empty() {
        cleaned.push('\\');
    }
    cleaned
}

/// Compares two paths after cleaning them up, ignoring case.
#[must_use = "Has no effect if the result is unused"]
pub fn paths_equal(a: &str, b: &str) -> bool {
    clean_path(a).eq_ignore_ascii_case(&clean_path(b))
}

/// Splits a `volume:path` specification into its volume and path parts.
#[must_use = "Has no effect if the result is unused"]
pub fn split_volume_and_path(spec: &str) -> (Option<&str>, &str) {
    match spec.split_once(':') {
        Some((volume, path)) if !volume.is_empty() => (Some(volume), path),
        Some((_, path)) => (None, path),
        None => (None, spec),
    }
}

/// Matches a name against a glob pattern, ignoring case.
///
/// `*` matches any run of characters and `?` matches exactly one character.
#[must_use = "Has no effect if the result is unused"]
pub fn glob_match(pattern: &str, name: &str) -> bool {
    let pattern = pattern.as_bytes();
    let name = name.as_bytes();

    let (mut p, mut n) = (0, 0);
    let mut backtrack = None;

    while n < name.len() {
        match pattern.get(p) {
            Some(b'*') => {
                backtrack = Some((p, n));
                p += 1;
            }
            Some(b'?') => {
                p += 1;
                n += 1;
            }
            Some(c) if c.eq_ignore_ascii_case(&name[n]) => {
                p += 1;
                n += 1;
            }
            _ => match backtrack {
                Some((star, matched)) => {
                    p = star + 1;
                    n = matched + 1;
                    backtrack = Some((star, matched + 1));
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|&c| c == b'*')
}

/// Checks if a name matches any of the glob patterns of a comma-delimited list.
#[must_use = "Has no effect if the result is unused"]
pub fn matches_any_pattern(name: &str, patterns: &str) -> bool {
    comma_items(patterns).any(|x| glob_match(x, name))
}

/// Replaces every version token in load options with a version string.
#[must_use = "Has no effect if the result is unused"]
pub fn substitute_version(options: &str, version: &str) -> String {
    options.replace(VERSION_TOKEN, version)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_comma_items() {
        let list = "vmlinuz, bzImage,,kernel ";
        assert_eq!(nth_item(list, 0), Some("vmlinuz"));
        assert_eq!(nth_item(list, 1), Some("bzImage"));
        assert_eq!(nth_item(list, 2), Some("kernel"));
        assert_eq!(nth_item(list, 3), None);
        assert!(is_in("BZIMAGE", list));
        assert!(!is_in("bz", list));
        assert!(is_in_substring("\\EFI\\refind\\refind_x64.efi", "refit,refind"));
    }

    #[test]
    fn test_find_numbers() {
        assert_eq!(find_numbers("vmlinuz-6.1.0.efi"), Some("6.1.0"));
        assert_eq!(find_numbers("initramfs-5.10.0-rc7.img"), Some("5.10.0-rc7"));
        assert_eq!(find_numbers("initrd.img"), None);
        assert_eq!(version_tail("initrd-5.10.0-debug.img"), "-debug.img");
        assert_eq!(version_tail("initrd.img"), "initrd.img");
    }

    #[test]
    fn test_chars_in_common() {
        assert_eq!(chars_in_common(".efi", ".img"), 1);
        assert_eq!(chars_in_common("ABC", "abd"), 2);
        assert_eq!(chars_in_common("", "abc"), 0);
    }

    #[test]
    fn test_merge_unique_words() {
        let mut hints = String::new();
        merge_unique_words(&mut hints, "Macintosh HD - Data");
        merge_unique_words(&mut hints, "macintosh_hd");
        assert_eq!(hints, "macintosh,hd,data");
    }

    #[test]
    fn test_paths() {
        assert_eq!(basename("\\EFI\\debian\\vmlinuz"), "vmlinuz");
        assert_eq!(parent_dir("\\EFI\\debian\\vmlinuz"), "\\EFI\\debian");
        assert_eq!(parent_dir("\\vmlinuz"), "\\");
        assert_eq!(join_path("\\", "vmlinuz"), "\\vmlinuz");
        assert_eq!(join_path("EFI/debian/", "vmlinuz"), "\\EFI\\debian\\vmlinuz");
        assert_eq!(clean_path("//EFI//BOOT/"), "\\EFI\\BOOT");
        assert_eq!(clean_path(""), "\\");
        assert!(paths_equal("EFI\\Boot", "\\efi\\BOOT\\"));
        assert_eq!(
            split_volume_and_path("ESP:\\EFI\\tools"),
            (Some("ESP"), "\\EFI\\tools")
        );
        assert_eq!(split_volume_and_path("\\EFI\\tools"), (None, "\\EFI\\tools"));
    }

    #[test]
    fn test_glob_match() {
        assert!(glob_match("*.efi", "grubx64.EFI"));
        assert!(glob_match("init*", "initrd.img-6.1.0"));
        assert!(glob_match("vmlinu?-*", "vmlinuz-6.1.0"));
        assert!(!glob_match("*.efi", "grubx64.efi.signed"));
        assert!(glob_match("*", ""));
        assert!(matches_any_pattern("booster-linux.img", "init*,booster*"));
    }

    proptest! {
        #[test]
        fn find_numbers_is_bounded_by_digits(name in "\\PC*") {
            if let Some(version) = find_numbers(&name) {
                prop_assert!(version.starts_with(|c: char| c.is_ascii_digit()));
                prop_assert!(version.ends_with(|c: char| c.is_ascii_digit()));
                prop_assert!(!version_tail(&name).contains(|c: char| c.is_ascii_digit()));
            } else {
                prop_assert!(!name.contains(|c: char| c.is_ascii_digit()));
            }
        }

        #[test]
        fn glob_star_matches_everything(name in "\\PC*") {
            prop_assert!(glob_match("*", &name));
        }
    }
}
