//! File name helpers for uploaded attachments

use regex::Regex;
use std::sync::OnceLock;

fn counter_suffix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(?P<base>.*)\((?P<n>\d+)\)$").expect("static pattern"))
}

/// Split `name` into stem and extension (without the dot).
///
/// A leading dot (`.env`) is part of the stem, not an extension separator.
pub fn split_extension(name: &str) -> (&str, Option<&str>) {
    match name.rfind('.') {
        Some(idx) if idx > 0 => (&name[..idx], Some(&name[idx + 1..])),
        _ => (name, None),
    }
}

/// Next name in the `name(1).ext`, `name(2).ext`, ... sequence.
///
/// ```
/// use grants_common::deduplicate_filename;
/// assert_eq!(deduplicate_filename("report.pdf"), "report(1).pdf");
/// assert_eq!(deduplicate_filename("report(1).pdf"), "report(2).pdf");
/// ```
pub fn deduplicate_filename(name: &str) -> String {
    let (stem, ext) = split_extension(name);

    let next_stem = match counter_suffix().captures(stem) {
        Some(caps) => {
            let base = caps.name("base").map_or("", |m| m.as_str());
            match caps.name("n").and_then(|m| m.as_str().parse::<u64>().ok()) {
                Some(n) => format!("{}({})", base, n.saturating_add(1)),
                None => format!("{}(1)", stem),
            }
        }
        None => format!("{}(1)", stem),
    };

    match ext {
        Some(ext) => format!("{}.{}", next_stem, ext),
        None => next_stem,
    }
}

/// First name derived from `name` that `taken` does not report as used.
pub fn unique_filename(name: &str, taken: impl Fn(&str) -> bool) -> String {
    let mut candidate = name.to_string();
    while taken(&candidate) {
        candidate = deduplicate_filename(&candidate);
    }
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deduplicate_filename() {
        assert_eq!(deduplicate_filename("report.pdf"), "report(1).pdf");
        assert_eq!(deduplicate_filename("report(1).pdf"), "report(2).pdf");
        assert_eq!(deduplicate_filename("report(9).pdf"), "report(10).pdf");
        assert_eq!(deduplicate_filename("archive.tar.gz"), "archive.tar(1).gz");
        assert_eq!(deduplicate_filename("README"), "README(1)");
        assert_eq!(deduplicate_filename(".env"), ".env(1)");
        assert_eq!(deduplicate_filename("budget (draft).xlsx"), "budget (draft)(1).xlsx");
    }

    #[test]
    fn test_unique_filename() {
        let existing = ["report.pdf", "report(1).pdf"];
        let name = unique_filename("report.pdf", |n| existing.contains(&n));
        assert_eq!(name, "report(2).pdf");

        let name = unique_filename("other.pdf", |n| existing.contains(&n));
        assert_eq!(name, "other.pdf");
    }
}
