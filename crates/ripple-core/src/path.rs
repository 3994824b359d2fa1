#![forbid(unsafe_code)]

//! Dotted key paths (`a.b.c`).

/// Keys starting with one of these characters are never tracked by default.
pub const DEFAULT_RESERVED_PREFIXES: [char; 2] = ['$', '_'];

/// Prefix used when rewriting child keys under `raw_path`: `""` for the root,
/// `"a."` otherwise.
#[must_use]
pub fn prefix_of(raw_path: &str) -> String {
    if raw_path.is_empty() {
        String::new()
    } else {
        format!("{raw_path}.")
    }
}

/// Join a parent path and a child key.
#[must_use]
pub fn join(parent: &str, key: &str) -> String {
    match (parent.is_empty(), key.is_empty()) {
        (true, _) => key.to_string(),
        (false, true) => parent.to_string(),
        (false, false) => format!("{parent}.{key}"),
    }
}

/// Split a dotted path into its segments. The empty path has none.
pub fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('.').filter(|segment| !segment.is_empty())
}

/// Whether `key` begins with one of `prefixes`.
#[must_use]
pub fn is_reserved(key: &str, prefixes: &[char]) -> bool {
    key.chars().next().is_some_and(|c| prefixes.contains(&c))
}
