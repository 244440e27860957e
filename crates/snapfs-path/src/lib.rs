//! Reversible mangling between logical paths and store paths.
//!
//! The object store reserves a small set of entry names for its own use --
//! most importantly the [`PLACEHOLDER`] entry that keeps otherwise-empty
//! directories representable (a tree with no entries simply does not exist).
//! To guarantee those names can never collide with a user-chosen name, every
//! user path component is prefixed with a fixed marker character before it is
//! written to the store, and the marker is stripped again on the way out.
//!
//! The mapping is a bijection over non-reserved names: [`demangle`] fails
//! closed on any stored component that lacks the marker, so reserved entries
//! are invisible to callers without any explicit reserved-name scan. The
//! special components `""`, `"."` and `".."` pass through unchanged in both
//! directions, which keeps absolute paths and `/`-runs intact.
//!
//! Both functions are pure; no I/O happens here.

/// Marker character prefixed to every user path component in the store.
pub const MARKER: char = '$';

/// Entry name used to keep an otherwise-empty directory representable.
///
/// It carries no marker, so it can never be produced by [`mangle`] and is
/// always rejected by [`demangle`].
pub const PLACEHOLDER: &str = ".keep";

/// Error returned when a store path has no logical counterpart.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// A component of the store path lacks the marker prefix (or is the
    /// marker alone), so the path was not produced by [`mangle`].
    #[error("store path has no logical counterpart: {0}")]
    NotRepresentable(String),
}

/// Result alias for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

fn passes_through(component: &str) -> bool {
    matches!(component, "" | "." | "..")
}

/// Convert a logical path into its store form.
///
/// Every `/`-separated component except `""`, `"."` and `".."` is prefixed
/// with [`MARKER`]. Separators are preserved exactly, so a leading `/` or a
/// run of slashes survives a round trip.
pub fn mangle(path: &str) -> String {
    let mangled: Vec<String> = path
        .split('/')
        .map(|part| {
            if passes_through(part) {
                part.to_string()
            } else {
                format!("{MARKER}{part}")
            }
        })
        .collect();
    mangled.join("/")
}

/// Convert a store path back into its logical form.
///
/// Fails closed: any component that is not `""`, `"."` or `".."` and does not
/// carry the marker makes the whole path non-representable. Callers turn that
/// into "omit from listing" or "no such file".
pub fn demangle(path: &str) -> CodecResult<String> {
    let mut logical: Vec<&str> = Vec::new();
    for part in path.split('/') {
        if passes_through(part) {
            logical.push(part);
            continue;
        }
        match part.strip_prefix(MARKER) {
            Some(rest) if !rest.is_empty() => logical.push(rest),
            _ => return Err(CodecError::NotRepresentable(path.to_string())),
        }
    }
    Ok(logical.join("/"))
}
