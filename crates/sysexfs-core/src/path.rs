//! Path validation
//!
//! Every path reaching a command handler is validated here before any
//! storage call. Paths are `/`-separated and rooted at `/`; the length
//! bound counts the NUL terminator the storage layer appends.

use crate::error::ProtocolError;
use crate::MAX_PATH_LEN;

/// Validate a protocol path.
///
/// Accepts `/` and rooted paths like `/SONGS/demo.xml`. Rejects paths
/// whose on-storage length (string plus terminator) would exceed
/// [`MAX_PATH_LEN`], unrooted paths, empty components, `.`/`..`
/// components, and embedded NUL bytes.
pub fn validate_path(path: &str) -> Result<(), ProtocolError> {
    if path.len() + 1 > MAX_PATH_LEN {
        return Err(ProtocolError::PathTooLong { len: path.len() + 1 });
    }

    if path.contains('\0') {
        return Err(ProtocolError::InvalidPath("path contains NUL byte"));
    }

    if !path.starts_with('/') {
        return Err(ProtocolError::InvalidPath("path is not rooted"));
    }

    if path == "/" {
        return Ok(());
    }

    for component in path[1..].split('/') {
        if component.is_empty() {
            return Err(ProtocolError::InvalidPath("empty path component"));
        }
        if component == "." || component == ".." {
            return Err(ProtocolError::InvalidPath("relative path component"));
        }
    }

    Ok(())
}

/// Iterate the components of a validated path, skipping the root.
///
/// `components("/a/b")` yields `"a"`, `"b"`; `components("/")` yields
/// nothing.
pub fn components(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|c| !c.is_empty())
}

/// Parent of a rooted path; `/a/b` -> `/a`, `/a` -> `/`.
pub fn parent(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(idx) => &path[..idx],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_ok() {
        assert!(validate_path("/").is_ok());
        assert!(validate_path("/file.txt").is_ok());
        assert!(validate_path("/SONGS/demo.xml").is_ok());
        assert!(validate_path("/a/b/c/d/e").is_ok());
    }

    #[test]
    fn test_validate_length_bound() {
        // 253 chars + terminator = 254 <= 255
        let ok = format!("/{}", "a".repeat(252));
        assert!(validate_path(&ok).is_ok());

        // 254 chars + terminator = 255 <= 255, still inside the bound
        let edge = format!("/{}", "a".repeat(253));
        assert!(validate_path(&edge).is_ok());

        // 255 chars + terminator = 256, rejected
        let long = format!("/{}", "a".repeat(254));
        assert!(matches!(
            validate_path(&long),
            Err(ProtocolError::PathTooLong { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_unrooted() {
        assert!(validate_path("file.txt").is_err());
        assert!(validate_path("").is_err());
    }

    #[test]
    fn test_validate_rejects_empty_component() {
        assert!(validate_path("/a//b").is_err());
        assert!(validate_path("/a/").is_err());
    }

    #[test]
    fn test_validate_rejects_relative_components() {
        assert!(validate_path("/a/../b").is_err());
        assert!(validate_path("/./a").is_err());
    }

    #[test]
    fn test_validate_rejects_nul() {
        assert!(validate_path("/fi\0le").is_err());
    }

    #[test]
    fn test_components() {
        let parts: Vec<_> = components("/a/b/c").collect();
        assert_eq!(parts, vec!["a", "b", "c"]);
        assert_eq!(components("/").count(), 0);
    }

    #[test]
    fn test_parent() {
        assert_eq!(parent("/a/b/c"), "/a/b");
        assert_eq!(parent("/a"), "/");
        assert_eq!(parent("/"), "/");
    }
}
