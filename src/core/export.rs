use crate::core::photo::{Photo, PhotoStatus};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Invalid output directory: {path}")]
    InvalidOutput { path: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportResult {
    pub exported: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Copy every kept photo still on disk into `output_dir` under its file
/// name. Existing destinations are never overwritten.
pub fn export_photos(photos: &[Photo], output_dir: &Path) -> Result<ExportResult, ExportError> {
    if !output_dir.is_dir() {
        return Err(ExportError::InvalidOutput {
            path: output_dir.to_string_lossy().to_string(),
        });
    }

    let mut result = ExportResult::default();

    for photo in photos
        .iter()
        .filter(|p| p.status == PhotoStatus::Keep && p.file_exists)
    {
        let dest_path = output_dir.join(&photo.file_name);
        if dest_path.exists() {
            result.skipped += 1;
            continue;
        }

        match fs::copy(&photo.source_path, &dest_path) {
            Ok(_) => result.exported += 1,
            Err(e) => {
                log::warn!(
                    "Failed to export {} to {}: {}",
                    photo.source_path.display(),
                    dest_path.display(),
                    e
                );
                result.failed += 1;
            }
        }
    }

    log::info!(
        "Exported {} photos to {} ({} skipped, {} failed)",
        result.exported,
        output_dir.display(),
        result.skipped,
        result.failed
    );
    Ok(result)
}
