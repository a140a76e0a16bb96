//! Path normalization and containment checks.
//!
//! Every path written into a project store is the output of [`normalize`]
//! (and, for file rows, of [`relative_within`]). Keeping this in one place
//! is what makes the containment guarantee auditable.

use std::path::{Component, Path, PathBuf};

use crate::error::{Result, SemIndexError};

/// Normalize a path string: trim whitespace, resolve `.` and `..`
/// lexically, and convert separators to forward slashes.
///
/// Fails with `InvalidPath` on empty input. `..` components that would
/// climb above the start of a relative path are preserved so that
/// containment checks can still reject them.
pub fn normalize(path: &str) -> Result<String> {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return Err(SemIndexError::InvalidPath("empty path".to_string()));
    }
    Ok(to_slash(&normalize_components(Path::new(trimmed))))
}

/// Lexically resolve `.` and `..` components without touching the filesystem.
fn normalize_components(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                // Pop a normal component if there is one; otherwise keep the
                // `..` (it may be climbing above a relative start).
                let popped = matches!(
                    out.components().next_back(),
                    Some(Component::Normal(_))
                );
                if popped {
                    out.pop();
                } else {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

/// Convert a path to a forward-slash string.
pub fn to_slash(path: &Path) -> String {
    let s = path.to_string_lossy();
    if std::path::MAIN_SEPARATOR == '/' {
        s.into_owned()
    } else {
        s.replace(std::path::MAIN_SEPARATOR, "/")
    }
}

/// Return the relative, slash-normalized path of `absolute` under `root`,
/// or `None` when `absolute` is neither `root` itself nor a descendant.
///
/// Symlinks are resolved before comparison so a link inside the root cannot
/// smuggle a target outside it. For paths that do not exist yet (e.g. a
/// just-deleted file), the existing ancestor is canonicalized and the
/// remaining suffix appended lexically.
pub fn relative_within(root: &Path, absolute: &Path) -> Option<String> {
    let root = canonicalize_lenient(root)?;
    let abs = canonicalize_lenient(absolute)?;

    if abs == root {
        return Some(".".to_string());
    }
    let rel = abs.strip_prefix(&root).ok()?;
    Some(to_slash(rel))
}

/// Canonicalize a path, tolerating a missing tail.
///
/// `std::fs::canonicalize` fails on paths that do not exist; here the deepest
/// existing ancestor is canonicalized and the lexically-normalized remainder
/// is re-attached. A `..` left in the remainder means the path climbs out of
/// anything we can verify, so the whole lookup fails.
fn canonicalize_lenient(path: &Path) -> Option<PathBuf> {
    let normalized = normalize_components(path);
    if let Ok(canon) = normalized.canonicalize() {
        return Some(canon);
    }

    let mut existing = normalized.clone();
    let mut suffix: Vec<std::ffi::OsString> = Vec::new();
    while !existing.exists() {
        let name = existing.file_name()?.to_os_string();
        suffix.push(name);
        if !existing.pop() {
            return None;
        }
    }
    let mut canon = existing.canonicalize().ok()?;
    for part in suffix.iter().rev() {
        if part == ".." {
            return None;
        }
        canon.push(part);
    }
    Some(canon)
}

/// Derive a project slug from a display name.
///
/// Lowercases, collapses whitespace and `_` to `-`, strips anything outside
/// `[a-z0-9-]`, collapses runs of `-`, and trims leading/trailing `-`.
/// Falls back to `"project"` when nothing survives.
pub fn generate_slug(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_dash = true; // suppress a leading dash
    for ch in name.trim().chars() {
        let mapped = if ch.is_ascii_alphanumeric() {
            Some(ch.to_ascii_lowercase())
        } else if ch.is_whitespace() || ch == '_' || ch == '-' {
            None
        } else {
            continue;
        };
        match mapped {
            Some(c) => {
                slug.push(c);
                last_dash = false;
            }
            None => {
                if !last_dash {
                    slug.push('-');
                    last_dash = true;
                }
            }
        }
    }
    let slug = slug.trim_end_matches('-').to_string();
    if slug.is_empty() {
        "project".to_string()
    } else {
        slug
    }
}

/// Sanitize an arbitrary identifier for use in a filename.
/// Anything outside `[A-Za-z0-9._-]` becomes `_`.
pub fn sanitize_for_filename(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
