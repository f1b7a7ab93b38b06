//! Document identifier algebra.
//!
//! A document id is `<remote>:<path>` (`photos:` is the root of the `photos`
//! remote, `photos:2024/beach.jpg` a child) or an absolute local path
//! starting with `/`. Everything here is pure string manipulation: nothing
//! touches the backend.
//!
//! The root prefix of an id (`remote:` or `/`) is never split or dropped, so
//! `split_path` on a root yields an empty parent and leaf.

use crate::error::{GatewayError, Result};

/// Separates the remote name from its path.
pub const REMOTE_DELIMITER: char = ':';

/// Path separator inside an id.
pub const SEPARATOR: char = '/';

/// Length of the root prefix of `id`, including any separators directly after
/// it. Zero for bare names such as `"file.txt"`.
fn root_len(id: &str) -> usize {
    if id.starts_with(SEPARATOR) {
        return id.len() - id.trim_start_matches(SEPARATOR).len();
    }
    match remote_delimiter_index(id) {
        Some(colon) => {
            let after = &id[colon + 1..];
            colon + 1 + (after.len() - after.trim_start_matches(SEPARATOR).len())
        }
        None => 0,
    }
}

/// Position of the remote delimiter, if it comes before any separator.
fn remote_delimiter_index(id: &str) -> Option<usize> {
    let colon = id.find(REMOTE_DELIMITER)?;
    match id.find(SEPARATOR) {
        Some(slash) if slash < colon => None,
        _ => Some(colon),
    }
}

/// Whether `id` is nothing but a root prefix (`r:`, `r://`, `/`).
fn is_root_prefix(id: &str) -> bool {
    !id.is_empty() && root_len(id) == id.len()
}

/// Canonical form of the root prefix: `remote:` or `/`.
fn canonical_root(id: &str) -> &str {
    if id.starts_with(SEPARATOR) {
        "/"
    } else {
        match remote_delimiter_index(id) {
            Some(colon) => &id[..=colon],
            None => "",
        }
    }
}

/// Split an id into its remote name and the path within the remote.
///
/// Local ids (starting with `/`) return an empty remote name and the id
/// itself as the path.
pub fn split_remote(id: &str) -> Result<(String, String)> {
    if id.starts_with(SEPARATOR) {
        return Ok((String::new(), id.to_string()));
    }
    match remote_delimiter_index(id) {
        Some(colon) if colon > 0 => Ok((id[..colon].to_string(), id[colon + 1..].to_string())),
        _ => Err(GatewayError::InvalidIdentifier(id.to_string())),
    }
}

/// Split an id into its parent id and leaf name.
///
/// Trailing separators are ignored. A root id returns `("", "")` and a bare
/// name returns `("", name)`.
pub fn split_path(id: &str) -> (String, String) {
    let root = root_len(id);
    let rest = id[root..].trim_end_matches(SEPARATOR);
    if rest.is_empty() {
        return (String::new(), String::new());
    }

    match rest.rfind(SEPARATOR) {
        Some(slash) => {
            let parent_rest = rest[..slash].trim_end_matches(SEPARATOR);
            let parent = format!("{}{}", &id[..root], parent_rest);
            (parent, rest[slash + 1..].to_string())
        }
        None => (id[..root].to_string(), rest.to_string()),
    }
}

/// Split an id or name into `(base, extension)`. Neither part contains the dot.
///
/// `base` keeps the parent portion, so `split_ext("r:a/b.txt", false)` is
/// `("r:a/b", Some("txt"))`. Directories never have an extension.
pub fn split_ext(id_or_name: &str, is_dir: bool) -> (String, Option<String>) {
    let (parent, name) = split_path(id_or_name);
    match name.rfind('.') {
        Some(dot) if !is_dir => (
            join(&parent, &name[..dot]),
            Some(name[dot + 1..].to_string()),
        ),
        _ => (join(&parent, &name), None),
    }
}

/// Append `segment` to `parent` with exactly one separator between them.
///
/// Only a bare root prefix is joined without a separator: `r:dir:` is a
/// directory named `dir:`, so `join("r:dir:", "x")` is `r:dir:/x`.
pub fn join(parent: &str, segment: &str) -> String {
    if parent.is_empty() {
        segment.to_string()
    } else if is_root_prefix(parent) || parent.ends_with(SEPARATOR) {
        format!("{}{}", parent, segment)
    } else {
        format!("{}{}{}", parent, SEPARATOR, segment)
    }
}

/// The non-empty path segments of `id`, root excluded.
pub fn segments(id: &str) -> Vec<&str> {
    id[root_len(id)..]
        .split(SEPARATOR)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Remove duplicate and trailing separators.
///
/// The root prefix is kept even when the path is empty: `"r://"` becomes
/// `"r:"`, `"//"` becomes `"/"`.
pub fn normalize(id: &str) -> String {
    let mut out = canonical_root(id).to_string();
    for segment in segments(id) {
        out = join(&out, segment);
    }
    out
}

/// Whether `id` equals `parent` or lies somewhere beneath it, compared on
/// normalized forms. Pure string comparison.
pub fn is_child(parent: &str, id: &str) -> bool {
    let parent = normalize(parent);
    let id = normalize(id);
    if id == parent {
        return true;
    }
    if is_root_prefix(&parent) {
        // Root: every id under the same root is a descendant.
        id.starts_with(&parent)
    } else {
        id.starts_with(&format!("{}{}", parent, SEPARATOR))
    }
}

/// Whether `id` names the root of a remote (or the local root).
pub fn is_root(id: &str) -> bool {
    segments(id).is_empty()
}

/// The root id for a remote.
pub fn remote_root(remote: &str) -> String {
    format!("{}{}", remote, REMOTE_DELIMITER)
}
