//! Canonical path handling.
//!
//! Every client-supplied path or name passes through here exactly once, so
//! path hygiene (and traversal protection) lives in one place. A canonical
//! path starts with `/`, contains no `.`/`..`/empty components and no
//! backslashes, and is never the empty string.

use crate::error::{FsError, FsResult};

/// Normalize a raw client path into canonical form.
///
/// Backslashes are treated as separators (Windows-origin clients), `.` and
/// empty segments are dropped, and `..` pops the previous segment. Popping
/// past the root is a traversal attempt and fails with EINVAL.
pub fn normalize(raw: &str) -> FsResult<String> {
    let unified = raw.replace('\\', "/");
    let mut segments: Vec<&str> = Vec::new();

    for segment in unified.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return Err(FsError::invalid(format!("path escapes root: {raw:?}")));
                }
            }
            s => segments.push(s),
        }
    }

    if segments.is_empty() {
        Ok("/".to_string())
    } else {
        Ok(format!("/{}", segments.join("/")))
    }
}

/// Canonical path of `name` inside the directory at `parent`.
///
/// `name` must be a single component: non-empty, not `.` or `..`, and free
/// of separators.
pub fn child_of(parent: &str, name: &str) -> FsResult<String> {
    validate_name(name)?;
    if parent == "/" {
        Ok(format!("/{name}"))
    } else {
        Ok(format!("{parent}/{name}"))
    }
}

/// Final component of a canonical path; `"/"` for the root itself.
pub fn basename(path: &str) -> &str {
    match path.rsplit_once('/') {
        Some((_, name)) if !name.is_empty() => name,
        _ => "/",
    }
}

/// Reject names that cannot be a single directory entry.
pub fn validate_name(name: &str) -> FsResult<()> {
    if name.is_empty() || name == "." || name == ".." {
        return Err(FsError::invalid(format!("illegal name: {name:?}")));
    }
    if name.contains('/') || name.contains('\\') {
        return Err(FsError::invalid(format!(
            "name contains a separator: {name:?}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_basic() {
        assert_eq!(normalize("/docs/hello.txt").unwrap(), "/docs/hello.txt");
        assert_eq!(normalize("docs/hello.txt").unwrap(), "/docs/hello.txt");
        assert_eq!(normalize("/").unwrap(), "/");
        assert_eq!(normalize("").unwrap(), "/");
    }

    #[test]
    fn test_normalize_cleans_components() {
        assert_eq!(normalize("/docs//hello.txt").unwrap(), "/docs/hello.txt");
        assert_eq!(normalize("/docs/./hello.txt").unwrap(), "/docs/hello.txt");
        assert_eq!(normalize("/docs/sub/../hello.txt").unwrap(), "/docs/hello.txt");
        assert_eq!(normalize("\\docs\\hello.txt").unwrap(), "/docs/hello.txt");
    }

    #[test]
    fn test_normalize_rejects_escape() {
        assert!(normalize("/..").is_err());
        assert!(normalize("../outside.txt").is_err());
        assert!(normalize("/docs/../../outside.txt").is_err());
    }

    #[test]
    fn test_child_of() {
        assert_eq!(child_of("/", "docs").unwrap(), "/docs");
        assert_eq!(child_of("/docs", "hello.txt").unwrap(), "/docs/hello.txt");
        assert!(child_of("/docs", "").is_err());
        assert!(child_of("/docs", ".").is_err());
        assert!(child_of("/docs", "..").is_err());
        assert!(child_of("/docs", "a/b").is_err());
        assert!(child_of("/docs", "a\\b").is_err());
    }

    #[test]
    fn test_basename() {
        assert_eq!(basename("/docs/hello.txt"), "hello.txt");
        assert_eq!(basename("/docs"), "docs");
        assert_eq!(basename("/"), "/");
    }
}
