//! In-memory tar packaging of project directories.

use bytes::Bytes;
use std::path::Path;

use code_runner_core::{Error, Result};

/// Pack `dir` into a tar archive held in memory.
///
/// The archive root is `dir` itself, so entries carry paths relative to the
/// project (`main.py`, `pkg/helper.py`) and never the host location.
/// Symlinks are stored as links, not followed.
pub fn archive_directory(dir: &Path) -> Result<Bytes> {
    if !dir.is_dir() {
        return Err(Error::invalid_request(format!(
            "Project directory does not exist: {}",
            dir.display()
        )));
    }

    let mut builder = tar::Builder::new(Vec::new());
    builder.follow_symlinks(false);
    builder.append_dir_all(".", dir)?;
    let data = builder.into_inner()?;

    Ok(Bytes::from(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn entries(archive: &Bytes) -> Vec<(String, String)> {
        let mut reader = tar::Archive::new(archive.as_ref());
        let mut out = Vec::new();
        for entry in reader.entries().unwrap() {
            let mut entry = entry.unwrap();
            if !entry.header().entry_type().is_file() {
                continue;
            }
            let path = entry.path().unwrap().to_string_lossy().into_owned();
            let mut content = String::new();
            entry.read_to_string(&mut content).unwrap();
            out.push((path, content));
        }
        out.sort();
        out
    }

    #[test]
    fn test_entries_are_relative() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("main.py"), "import helper\n").unwrap();
        std::fs::create_dir(dir.path().join("pkg")).unwrap();
        std::fs::write(dir.path().join("pkg/util.py"), "X = 1\n").unwrap();

        let archive = archive_directory(dir.path()).unwrap();
        let files = entries(&archive);

        let host_root = dir.path().to_string_lossy().trim_start_matches('/').to_string();
        for (path, _) in &files {
            assert!(!path.starts_with('/'), "absolute entry: {}", path);
            assert!(!path.contains(&host_root), "host path leaked: {}", path);
        }

        let names: Vec<String> = files
            .iter()
            .map(|(p, _)| p.trim_start_matches("./").to_string())
            .collect();
        assert_eq!(names, vec!["main.py".to_string(), "pkg/util.py".to_string()]);
        assert_eq!(files[0].1, "import helper\n");
    }

    #[test]
    fn test_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let err = archive_directory(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }
}
