//! Filesystem policy for submitted project files.
//!
//! Uploaded file names come from untrusted clients. Before a file is written
//! under a project directory its name is normalized to a relative path that
//! cannot escape that directory.

use crate::Result;
use std::path::{Component, Path, PathBuf};

/// Validates a client-supplied file name for placement under `root`.
///
/// Returns the normalized path relative to `root`:
/// 1. Absolute paths (Unix or Windows style) are rejected.
/// 2. `..` components may not climb above `root`.
/// 3. Empty names and names that normalize to nothing are rejected.
pub fn validate_upload_path(root: &Path, input_path: &str) -> Result<PathBuf> {
    if input_path.len() >= 2
        && input_path.as_bytes()[1] == b':'
        && input_path.as_bytes()[0].is_ascii_alphabetic()
    {
        return Err(crate::Error::SecurityViolation(format!(
            "Absolute paths are not allowed in uploads: {}",
            input_path
        )));
    }

    let mut normalized = PathBuf::new();
    for component in Path::new(input_path).components() {
        match component {
            Component::Normal(c) => normalized.push(c),
            Component::ParentDir => {
                if !normalized.pop() {
                    return Err(crate::Error::SecurityViolation(format!(
                        "Path traversal detected in upload: {}",
                        input_path
                    )));
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(crate::Error::SecurityViolation(format!(
                    "Absolute paths are not allowed in uploads: {}",
                    input_path
                )));
            }
            Component::CurDir => {}
        }
    }

    if normalized.as_os_str().is_empty() {
        return Err(crate::Error::invalid_request(format!(
            "Invalid upload file name: {:?}",
            input_path
        )));
    }

    if !root.join(&normalized).starts_with(root) {
        return Err(crate::Error::SecurityViolation(format!(
            "Access denied: upload {} is outside of {}",
            input_path,
            root.display()
        )));
    }

    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root() -> PathBuf {
        PathBuf::from("/tmp/uploads/project-1")
    }

    #[test]
    fn test_valid_paths() {
        assert_eq!(
            validate_upload_path(&root(), "main.py").unwrap(),
            PathBuf::from("main.py")
        );
        assert_eq!(
            validate_upload_path(&root(), "pkg/helper.py").unwrap(),
            PathBuf::from("pkg/helper.py")
        );
        assert_eq!(
            validate_upload_path(&root(), "./pkg/../util.py").unwrap(),
            PathBuf::from("util.py")
        );
    }

    #[test]
    fn test_traversal_rejection() {
        assert!(validate_upload_path(&root(), "../secrets.py").is_err());
        assert!(validate_upload_path(&root(), "pkg/../../etc/passwd").is_err());
    }

    #[test]
    fn test_absolute_path_rejection() {
        assert!(validate_upload_path(&root(), "/etc/passwd").is_err());
        assert!(validate_upload_path(&root(), "C:\\Windows\\win.ini").is_err());
    }

    #[test]
    fn test_empty_name_rejection() {
        assert!(validate_upload_path(&root(), "").is_err());
        assert!(validate_upload_path(&root(), ".").is_err());
    }
}
