//! Atomic publication of generated guide documents
//!
//! Content is written to a temporary file in the destination directory and
//! then renamed over the target, so readers see either the previous document
//! or the new one, never a partial write.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::errors::{AppError, AppResult};

/// Publish `content` to `path`, creating the parent directory when needed
pub async fn publish_document(path: &Path, content: String) -> AppResult<PathBuf> {
    let target = path.to_path_buf();
    let bytes = content.len();

    let published = tokio::task::spawn_blocking(move || {
        write_atomically(&target, content.as_bytes())?;
        Ok::<_, AppError>(target)
    })
    .await
    .map_err(|e| AppError::internal(format!("Publish task failed: {e}")))??;

    info!("Published {} bytes to {}", bytes, published.display());
    Ok(published)
}

fn write_atomically(target: &Path, content: &[u8]) -> AppResult<()> {
    let dir = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    std::fs::create_dir_all(&dir).map_err(|e| {
        AppError::publish(target.display().to_string(), format!("Cannot create {}: {e}", dir.display()))
    })?;

    let mut temp = NamedTempFile::new_in(&dir)
        .map_err(|e| AppError::publish(target.display().to_string(), format!("Cannot create temp file: {e}")))?;
    temp.write_all(content)
        .and_then(|_| temp.as_file().sync_all())
        .map_err(|e| AppError::publish(target.display().to_string(), format!("Write failed: {e}")))?;

    debug!("Atomic move {} -> {}", temp.path().display(), target.display());
    temp.persist(target)
        .map_err(|e| AppError::publish(target.display().to_string(), format!("Rename failed: {}", e.error)))?;
    Ok(())
}
