//! Multipart project uploads.
//!
//! Each upload lands in a fresh directory under the configured root. The
//! directory is removed here if the upload is rejected; once accepted it
//! belongs to the project run, which deletes it when finished.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use axum::extract::Multipart;
use code_runner_core::{fs_policy::validate_upload_path, Error, Result};

/// A project written to disk and ready for submission.
#[derive(Debug)]
pub struct UploadedProject {
    pub dir: PathBuf,
    pub entry_file: String,
    pub timeout: Option<u64>,
}

/// Write the `files` parts of `multipart` into a new directory under `root`.
///
/// Also reads the `entry_file` and optional `timeout` fields. The entry file
/// must name one of the uploaded files.
pub async fn receive_project(root: &Path, multipart: Multipart) -> Result<UploadedProject> {
    let dir = root.join(uuid::Uuid::new_v4().to_string());
    tokio::fs::create_dir_all(&dir).await?;

    match write_parts(&dir, multipart).await {
        Ok((entry_file, timeout)) => Ok(UploadedProject {
            dir,
            entry_file,
            timeout,
        }),
        Err(e) => {
            if let Err(cleanup) = tokio::fs::remove_dir_all(&dir).await {
                tracing::warn!(path = %dir.display(), error = %cleanup, "Failed to remove rejected upload");
            }
            Err(e)
        }
    }
}

async fn write_parts(dir: &Path, mut multipart: Multipart) -> Result<(String, Option<u64>)> {
    let mut uploaded = HashSet::new();
    let mut entry_file = None;
    let mut timeout = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::invalid_request(format!("Malformed multipart body: {}", e)))?
    {
        let part = field.name().unwrap_or_default().to_string();
        match part.as_str() {
            "files" => {
                let name = field
                    .file_name()
                    .map(str::to_string)
                    .ok_or_else(|| Error::invalid_request("File part without a file name"))?;
                let relative = validate_upload_path(dir, &name)?;
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| Error::invalid_request(format!("Failed to read {}: {}", name, e)))?;

                let target = dir.join(&relative);
                if let Some(parent) = target.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::write(&target, &data).await?;
                tracing::debug!(file = %relative.display(), bytes = data.len(), "Stored uploaded file");
                uploaded.insert(relative);
            }
            "entry_file" => {
                entry_file = Some(text(field).await?);
            }
            "timeout" => {
                let raw = text(field).await?;
                let secs = raw
                    .trim()
                    .parse::<u64>()
                    .map_err(|_| Error::invalid_request(format!("Invalid timeout: {:?}", raw)))?;
                timeout = Some(secs);
            }
            other => {
                tracing::debug!(field = other, "Ignoring unknown multipart field");
            }
        }
    }

    if uploaded.is_empty() {
        return Err(Error::invalid_request("No files uploaded"));
    }

    let entry_file = entry_file.ok_or_else(|| Error::invalid_request("Missing entry_file"))?;
    let entry = validate_upload_path(dir, &entry_file)?;
    if !uploaded.contains(&entry) {
        return Err(Error::invalid_request(format!(
            "Entry file {} not found in uploaded files",
            entry_file
        )));
    }

    Ok((entry.to_string_lossy().into_owned(), timeout))
}

async fn text(field: axum::extract::multipart::Field<'_>) -> Result<String> {
    field
        .text()
        .await
        .map_err(|e| Error::invalid_request(format!("Failed to read form field: {}", e)))
}
