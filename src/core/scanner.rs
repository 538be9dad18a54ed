use crate::config::ScanConfig;
use crate::core::exif::{CaptureMetadata, ExifService};
use crate::core::hash::ContentHasher;
use crate::core::perceptual::PerceptualFingerprinter;
use crate::core::photo::Photo;
use chrono::{DateTime, Utc};
use glob::Pattern;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Invalid path: {path}")]
    InvalidPath { path: String },

    #[error("Invalid exclude pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("Worker pool error: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Operation cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanProgress {
    pub files_processed: usize,
    pub total_files: usize,
    pub current_file: String,
    pub phase: ScanPhase,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ScanPhase {
    Discovery,
    Processing,
    Complete,
}

/// Photos found in one collection folder plus per-file failure counts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    pub photos: Vec<Photo>,
    pub discovered_count: usize,
    /// Files that vanished or could not be read while hashing.
    pub missing_file_count: usize,
    /// Files kept without a fingerprint because they could not be decoded.
    pub unsupported_count: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

enum FileOutcome {
    Scanned { photo: Photo, fingerprinted: bool },
    Missing,
}

pub struct ScannerService {
    progress_sender: Option<mpsc::UnboundedSender<ScanProgress>>,
    cancellation_token: Arc<AtomicBool>,
    config: ScanConfig,
    supported_formats: HashSet<String>,
    hasher: ContentHasher,
    fingerprinter: PerceptualFingerprinter,
    exif_service: ExifService,
}

impl ScannerService {
    pub fn new(config: ScanConfig) -> Self {
        let supported_formats = config
            .supported_formats
            .iter()
            .map(|ext| ext.trim_start_matches('.').to_lowercase())
            .collect();

        Self {
            progress_sender: None,
            cancellation_token: Arc::new(AtomicBool::new(false)),
            config,
            supported_formats,
            hasher: ContentHasher::new(),
            fingerprinter: PerceptualFingerprinter::new(),
            exif_service: ExifService::new(),
        }
    }

    pub fn with_progress_sender(mut self, sender: mpsc::UnboundedSender<ScanProgress>) -> Self {
        self.progress_sender = Some(sender);
        self
    }

    pub fn get_cancellation_token(&self) -> Arc<AtomicBool> {
        self.cancellation_token.clone()
    }

    pub fn cancel_scan(&self) {
        self.cancellation_token.store(true, Ordering::Relaxed);
    }

    fn is_cancelled(&self) -> bool {
        self.cancellation_token.load(Ordering::Relaxed)
    }

    /// Scan one collection folder. Per-file failures are counted in the
    /// report; only a bad root, a bad pattern or cancellation fail the scan.
    pub fn scan_collection(
        &self,
        collection_id: &str,
        dir: &Path,
    ) -> Result<ScanReport, ScanError> {
        let started_at = Utc::now();

        if self.is_cancelled() {
            return Err(ScanError::Cancelled);
        }

        // An unreadable root must not look like an emptied folder.
        if !dir.exists() {
            return Err(ScanError::InvalidPath {
                path: dir.to_string_lossy().to_string(),
            });
        }
        if !dir.is_dir() {
            return Err(ScanError::InvalidPath {
                path: format!("{} is not a directory", dir.to_string_lossy()),
            });
        }

        let exclude_patterns = self
            .config
            .exclude_patterns
            .iter()
            .map(|pattern| Pattern::new(pattern))
            .collect::<Result<Vec<_>, _>>()?;

        self.send_progress(ScanProgress {
            files_processed: 0,
            total_files: 0,
            current_file: "Discovering files...".to_string(),
            phase: ScanPhase::Discovery,
        });

        let discovered_files = self.discover_files(dir, &exclude_patterns)?;
        let total_files = discovered_files.len();
        log::info!("Discovered {} photos in {}", total_files, dir.display());

        let outcomes = self.process_files(collection_id, &discovered_files)?;

        let mut photos = Vec::with_capacity(outcomes.len());
        let mut missing_file_count = 0;
        let mut unsupported_count = 0;
        for outcome in outcomes {
            match outcome {
                FileOutcome::Scanned { photo, fingerprinted } => {
                    if !fingerprinted {
                        unsupported_count += 1;
                    }
                    photos.push(photo);
                }
                FileOutcome::Missing => missing_file_count += 1,
            }
        }

        self.send_progress(ScanProgress {
            files_processed: total_files,
            total_files,
            current_file: "Scan complete".to_string(),
            phase: ScanPhase::Complete,
        });

        log::info!(
            "Scanned {}: {} photos, {} missing, {} without fingerprint",
            dir.display(),
            photos.len(),
            missing_file_count,
            unsupported_count
        );

        Ok(ScanReport {
            photos,
            discovered_count: total_files,
            missing_file_count,
            unsupported_count,
            started_at,
            finished_at: Utc::now(),
        })
    }

    /// Supported files directly under `dir` (or below it when recursive),
    /// sorted by path.
    fn discover_files(
        &self,
        dir: &Path,
        exclude_patterns: &[Pattern],
    ) -> Result<Vec<PathBuf>, ScanError> {
        let max_depth = if self.config.recursive { usize::MAX } else { 1 };
        let mut discovered_files = Vec::new();

        for entry in WalkDir::new(dir)
            .min_depth(1)
            .max_depth(max_depth)
            .follow_links(false)
        {
            if self.is_cancelled() {
                return Err(ScanError::Cancelled);
            }

            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    log::warn!("Skipping unreadable entry in {}: {}", dir.display(), e);
                    continue;
                }
            };

            let path = entry.path();
            if !entry.file_type().is_file() {
                continue;
            }

            let path_str = path.to_string_lossy();
            if exclude_patterns.iter().any(|pattern| pattern.matches(&path_str)) {
                continue;
            }

            if let Some(extension) = path.extension() {
                let ext = extension.to_string_lossy().to_lowercase();
                if self.supported_formats.contains(&ext) {
                    discovered_files.push(path.to_path_buf());
                }
            }
        }

        discovered_files.sort();
        Ok(discovered_files)
    }

    fn process_files(
        &self,
        collection_id: &str,
        files: &[PathBuf],
    ) -> Result<Vec<FileOutcome>, ScanError> {
        let total_files = files.len();
        let processed_count = AtomicUsize::new(0);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.max_workers.max(1))
            .build()?;

        let outcomes: Option<Vec<FileOutcome>> = pool.install(|| {
            files
                .par_iter()
                .map(|file_path| {
                    if self.is_cancelled() {
                        return None;
                    }

                    let outcome = self.process_single_file(collection_id, file_path);

                    let current_count = processed_count.fetch_add(1, Ordering::Relaxed) + 1;
                    self.send_progress(ScanProgress {
                        files_processed: current_count,
                        total_files,
                        current_file: file_path.to_string_lossy().to_string(),
                        phase: ScanPhase::Processing,
                    });

                    Some(outcome)
                })
                .collect()
        });

        match outcomes {
            Some(outcomes) if !self.is_cancelled() => Ok(outcomes),
            _ => Err(ScanError::Cancelled),
        }
    }

    fn process_single_file(&self, collection_id: &str, file_path: &Path) -> FileOutcome {
        let metadata = match fs::metadata(file_path) {
            Ok(metadata) => metadata,
            Err(e) => {
                log::warn!("Skipping {}: {}", file_path.display(), e);
                return FileOutcome::Missing;
            }
        };

        let content_hash = match self.hasher.hash_file(file_path) {
            Ok(hash) => hash,
            Err(e) => {
                log::warn!("Skipping {}: {}", file_path.display(), e);
                return FileOutcome::Missing;
            }
        };

        let mut photo = Photo::new(collection_id, file_path.to_path_buf(), metadata.len());
        photo.content_hash = Some(content_hash);
        if let Ok(modified) = metadata.modified() {
            photo.imported_at = DateTime::<Utc>::from(modified);
        }

        let capture = self.extract_capture_metadata(file_path);
        photo.taken_at = capture.taken_at;

        if let Some((width, height)) = self.get_image_dimensions(file_path) {
            let (width, height) = if capture.swaps_dimensions() {
                (height, width)
            } else {
                (width, height)
            };
            photo.width = Some(width);
            photo.height = Some(height);
        }

        let fingerprinted = match self.fingerprinter.fingerprint_file(file_path) {
            Ok(fingerprint) => {
                photo.perceptual_fingerprint = Some(fingerprint);
                true
            }
            Err(e) => {
                log::warn!("No fingerprint for {}: {}", file_path.display(), e);
                false
            }
        };

        FileOutcome::Scanned { photo, fingerprinted }
    }

    fn get_image_dimensions(&self, file_path: &Path) -> Option<(u32, u32)> {
        match image::image_dimensions(file_path) {
            Ok(dimensions) => Some(dimensions),
            Err(e) => {
                log::debug!("Could not read dimensions for {}: {}", file_path.display(), e);
                None
            }
        }
    }

    fn extract_capture_metadata(&self, file_path: &Path) -> CaptureMetadata {
        match self.exif_service.extract_capture_metadata(file_path) {
            Ok(metadata) => metadata.unwrap_or_default(),
            Err(e) => {
                log::warn!("Failed to extract EXIF from {}: {}", file_path.display(), e);
                CaptureMetadata::default()
            }
        }
    }

    fn send_progress(&self, progress: ScanProgress) {
        if let Some(sender) = &self.progress_sender {
            let _ = sender.send(progress);
        }
    }
}
