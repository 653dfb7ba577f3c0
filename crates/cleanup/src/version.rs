//! Version ordering for cache artifacts and cellar kegs

use std::cmp::Ordering;

use semver::Version;

/// Compare two version strings: semver when both parse, segment-wise
/// otherwise. Keg directories are not guaranteed to be semver (`1.8`,
/// `1.0.2k`, `8.2.1_1`), so the fallback splits on `.` and `_` and compares
/// numeric segments numerically. Plain lexicographic ordering would put
/// `1.8` above `1.10`.
pub(crate) fn compare_versions(a: &str, b: &str) -> Ordering {
    match (Version::parse(a), Version::parse(b)) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        _ => compare_segments(a, b),
    }
}

fn compare_segments(a: &str, b: &str) -> Ordering {
    let mut left = a.split(['.', '_']);
    let mut right = b.split(['.', '_']);
    loop {
        let ord = match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => match (x.parse::<u64>(), y.parse::<u64>()) {
                (Ok(x), Ok(y)) => x.cmp(&y),
                _ => x.cmp(y),
            },
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
}

/// Split a cached artifact filename into package name and version.
///
/// Artifacts are named `<name>-<version><archive suffix>`, with the version
/// starting at the last dash followed by a digit (`wget-1.21.4.tar.gz`,
/// `libx11-1.8.tar.xz`). Unversioned files yield `None`.
pub(crate) fn split_artifact_name(filename: &str) -> Option<(&str, &str)> {
    let stem = strip_archive_suffix(filename);
    let dash = stem
        .char_indices()
        .rev()
        .find(|&(i, c)| {
            c == '-'
                && stem[i + 1..]
                    .chars()
                    .next()
                    .is_some_and(|next| next.is_ascii_digit())
        })
        .map(|(i, _)| i)?;
    let (name, version) = (&stem[..dash], &stem[dash + 1..]);
    if name.is_empty() || version.is_empty() {
        None
    } else {
        Some((name, version))
    }
}

fn strip_archive_suffix(filename: &str) -> &str {
    const SUFFIXES: &[&str] = &[
        ".bottle.tar.gz",
        ".tar.gz",
        ".tar.bz2",
        ".tar.xz",
        ".tgz",
        ".zip",
        ".dmg",
        ".pkg",
    ];
    for suffix in SUFFIXES {
        if let Some(stem) = filename.strip_suffix(suffix) {
            return stem;
        }
    }
    filename
}
