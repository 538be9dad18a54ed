use crate::core::photo::{Photo, PhotoId, StoredPhoto};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// What must change in the store for it to match the disk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncDiff {
    pub to_insert: Vec<Photo>,
    pub to_remove: Vec<PhotoId>,
    pub to_restore: Vec<PhotoId>,
}

impl SyncDiff {
    pub fn is_empty(&self) -> bool {
        self.to_insert.is_empty() && self.to_remove.is_empty() && self.to_restore.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResult {
    pub added: usize,
    pub removed: usize,
    pub restored: usize,
    pub total: usize,
}

impl SyncResult {
    pub fn from_diff(diff: &SyncDiff, stored_count: usize) -> Self {
        Self {
            added: diff.to_insert.len(),
            removed: diff.to_remove.len(),
            restored: diff.to_restore.len(),
            total: stored_count + diff.to_insert.len(),
        }
    }
}

/// Reconcile a fresh scan against the store's records, matching on file
/// name so a relocated collection root still lines up.
pub fn diff_collection(scanned: &[Photo], stored: &[StoredPhoto]) -> SyncDiff {
    let stored_names: HashSet<&str> = stored.iter().map(|p| p.file_name.as_str()).collect();

    let mut seen: HashMap<&str, &Photo> = HashMap::new();
    let mut to_insert = Vec::new();

    for photo in scanned {
        if let Some(first) = seen.get(photo.file_name.as_str()) {
            log::warn!(
                "Ignoring {}: file name already taken by {}",
                photo.source_path.display(),
                first.source_path.display()
            );
            continue;
        }
        seen.insert(photo.file_name.as_str(), photo);

        if !stored_names.contains(photo.file_name.as_str()) {
            to_insert.push(photo.clone());
        }
    }

    let mut to_remove = Vec::new();
    let mut to_restore = Vec::new();

    for record in stored {
        let on_disk = seen.contains_key(record.file_name.as_str());
        if !on_disk && record.file_exists {
            to_remove.push(record.id);
        } else if on_disk && !record.file_exists {
            to_restore.push(record.id);
        }
    }

    SyncDiff {
        to_insert,
        to_remove,
        to_restore,
    }
}
