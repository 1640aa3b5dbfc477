//! Client path to object key resolution.
//!
//! Every client-supplied path collapses onto a key under the `firmwares/`
//! namespace before anything touches the backend. Resolution is pure and
//! idempotent; a path that cannot be normalized safely is rejected rather
//! than guessed at.

use crate::{Error, Result};

/// Key namespace every session is rooted in.
pub const NAMESPACE: &str = "firmwares";

/// Prefix form of [`NAMESPACE`], for listing calls.
pub const NAMESPACE_PREFIX: &str = "firmwares/";

/// Resolve a client path to an object key.
///
/// `""`, `"."`, `"/"` and `"/firmwares"` all resolve to the namespace
/// root `"firmwares/"`. Other paths resolve to `firmwares/<rest>` with
/// the prefix applied exactly once, so re-resolving an already resolved
/// key returns it unchanged.
///
/// Rejects paths containing NUL bytes or `..` segments. `.` segments and
/// empty segments (doubled slashes) are dropped.
pub fn resolve(path: &str) -> Result<String> {
    if path.contains('\0') {
        return Err(Error::InvalidPath("Path contains NUL byte".into()));
    }

    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                return Err(Error::InvalidPath(
                    "Path contains traversal segment".into(),
                ));
            }
            other => segments.push(other),
        }
    }

    // Apply the namespace exactly once.
    if segments.first() == Some(&NAMESPACE) {
        segments.remove(0);
    }

    if segments.is_empty() {
        return Ok(NAMESPACE_PREFIX.to_string());
    }

    let mut key = String::with_capacity(NAMESPACE_PREFIX.len() + path.len());
    key.push_str(NAMESPACE_PREFIX);
    key.push_str(&segments.join("/"));

    // A trailing slash on the input marks a directory; keep it so the
    // key stays usable as a listing prefix.
    if path.ends_with('/') {
        key.push('/');
    }

    Ok(key)
}

/// True when the key is the namespace root itself.
pub fn is_root(key: &str) -> bool {
    key == NAMESPACE_PREFIX || key == NAMESPACE
}

/// Model segment of a resolved key: the first path component under the
/// namespace. `None` for the namespace root.
pub fn model_segment(key: &str) -> Option<&str> {
    let rest = key.strip_prefix(NAMESPACE_PREFIX)?;
    let model = rest.split('/').next()?;
    if model.is_empty() { None } else { Some(model) }
}

/// Key as a listing prefix: guaranteed trailing slash.
pub fn as_prefix(key: &str) -> String {
    if key.ends_with('/') {
        key.to_string()
    } else {
        format!("{key}/")
    }
}

/// Final path component of a key, for display in directory listings.
pub fn basename(key: &str) -> &str {
    key.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(key)
}
