//! Status endpoint

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use std::path::Path;
use tracing::debug;

use crate::web::{
    responses::{ConfigSummary, FileInfo, StatusResponse},
    AppState,
};

/// Server, scheduler and published-file summary built from cached state only
pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let now = Utc::now();
    let output_dir = &state.config.output.directory;

    Json(StatusResponse {
        server: "running",
        version: env!("CARGO_PKG_VERSION"),
        time: now,
        config: ConfigSummary {
            sources: state
                .config
                .sources
                .iter()
                .map(|s| s.name().to_string())
                .collect(),
            output_dir: output_dir.display().to_string(),
            merge_sources: state.config.merge.merge_sources,
        },
        scheduler: state.scheduler.status(now).await,
        last_refresh_record: state.scheduler.state().last_record().await,
        files: list_published_files(output_dir).await,
    })
}

/// `.xml` files in `dir`, sorted by name. Unreadable entries are skipped.
pub async fn list_published_files(dir: &Path) -> Vec<FileInfo> {
    let mut files = Vec::new();
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) => {
            debug!("Cannot list {}: {}", dir.display(), e);
            return files;
        }
    };

    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        let is_xml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("xml"));
        if !is_xml {
            continue;
        }
        let Ok(metadata) = entry.metadata().await else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }
        files.push(FileInfo {
            name: entry.file_name().to_string_lossy().into_owned(),
            size: metadata.len(),
            modified: metadata.modified().ok().map(DateTime::<Utc>::from),
        });
    }

    files.sort_by(|a, b| a.name.cmp(&b.name));
    files
}
