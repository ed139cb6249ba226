//! Source-text helpers: line counting and shell quoting.

use std::path::Path;

use code_runner_core::Result;

/// Number of lines containing anything other than whitespace.
pub fn count_code_lines(code: &str) -> usize {
    code.lines().filter(|line| !line.trim().is_empty()).count()
}

/// Total line count of every file under `dir` whose extension is `extension`.
///
/// Walks the tree recursively without following symlinks. Blank lines are
/// counted. Files that cannot be read as text are decoded lossily.
pub fn count_project_lines(dir: &Path, extension: &str) -> Result<usize> {
    let mut total = 0;
    let mut pending = vec![dir.to_path_buf()];

    while let Some(current) = pending.pop() {
        for entry in std::fs::read_dir(&current)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            let path = entry.path();

            if file_type.is_dir() {
                pending.push(path);
            } else if file_type.is_file()
                && path.extension().and_then(|e| e.to_str()) == Some(extension)
            {
                let bytes = std::fs::read(&path)?;
                total += String::from_utf8_lossy(&bytes).lines().count();
            }
        }
    }

    Ok(total)
}

/// Escape `code` for embedding between single quotes in a POSIX shell.
///
/// Each `'` closes the quoted string, emits a double-quoted quote and reopens.
pub fn escape_single_quoted(code: &str) -> String {
    code.replace('\'', "'\"'\"'")
}

/// Shell command line that runs `code` through `interpreter -c`.
pub fn inline_command(interpreter: &str, code: &str) -> Vec<String> {
    vec![
        "sh".to_string(),
        "-c".to_string(),
        format!("{} -c '{}'", interpreter, escape_single_quoted(code)),
    ]
}
