use crate::core::perceptual::Fingerprint;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Stable photo identifier. Derived from the collection and file name so a
/// re-scan reproduces it without asking the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhotoId(Uuid);

impl PhotoId {
    pub fn derive(collection_id: &str, file_name: &str) -> Self {
        let digest = Sha256::digest(format!("{collection_id}:{file_name}").as_bytes());
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&digest[..16]);
        Self(uuid::Builder::from_random_bytes(bytes).into_uuid())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn parse(value: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(value).map(Self)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for PhotoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PhotoStatus {
    #[default]
    Unreviewed,
    Keep,
    Maybe,
    Discard,
}

impl PhotoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhotoStatus::Unreviewed => "unreviewed",
            PhotoStatus::Keep => "keep",
            PhotoStatus::Maybe => "maybe",
            PhotoStatus::Discard => "discard",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown photo status {0:?}")]
pub struct UnknownStatus(pub String);

impl FromStr for PhotoStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unreviewed" => Ok(PhotoStatus::Unreviewed),
            "keep" => Ok(PhotoStatus::Keep),
            "maybe" => Ok(PhotoStatus::Maybe),
            "discard" => Ok(PhotoStatus::Discard),
            _ => Err(UnknownStatus(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Photo {
    pub id: PhotoId,
    pub collection_id: String,
    pub file_name: String,
    pub source_path: PathBuf,
    pub file_size_bytes: u64,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub mime_type: String,
    pub taken_at: Option<DateTime<Utc>>,
    pub imported_at: DateTime<Utc>,
    pub content_hash: Option<String>,
    pub perceptual_fingerprint: Option<Fingerprint>,
    pub status: PhotoStatus,
    pub file_exists: bool,
}

impl Photo {
    /// A freshly discovered photo with nothing computed yet.
    pub fn new(collection_id: &str, source_path: PathBuf, file_size_bytes: u64) -> Self {
        let file_name = source_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        Self {
            id: PhotoId::derive(collection_id, &file_name),
            collection_id: collection_id.to_string(),
            mime_type: mime_type_for(&file_name).to_string(),
            file_name,
            source_path,
            file_size_bytes,
            width: None,
            height: None,
            taken_at: None,
            imported_at: Utc::now(),
            content_hash: None,
            perceptual_fingerprint: None,
            status: PhotoStatus::Unreviewed,
            file_exists: true,
        }
    }

    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.width.zip(self.height)
    }
}

/// The store's minimal view of a photo, enough to reconcile a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredPhoto {
    pub id: PhotoId,
    pub file_name: String,
    pub file_exists: bool,
}

impl From<&Photo> for StoredPhoto {
    fn from(photo: &Photo) -> Self {
        Self {
            id: photo.id,
            file_name: photo.file_name.clone(),
            file_exists: photo.file_exists,
        }
    }
}

/// Earliest capture first; unknown capture times sort last; ties by path.
pub fn capture_order(left: &Photo, right: &Photo) -> Ordering {
    match (left.taken_at, right.taken_at) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| left.source_path.cmp(&right.source_path))
}

pub fn mime_type_for(file_name: &str) -> &'static str {
    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "heic" => "image/heic",
        "webp" => "image/webp",
        "tif" | "tiff" => "image/tiff",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn photo_at(path: &str, taken_at: Option<i64>) -> Photo {
        let mut photo = Photo::new("c1", PathBuf::from(path), 10);
        photo.taken_at = taken_at.map(|secs| Utc.timestamp_opt(secs, 0).unwrap());
        photo
    }

    #[test]
    fn test_photo_id_is_deterministic() {
        let a = PhotoId::derive("collection", "IMG_0001.jpg");
        let b = PhotoId::derive("collection", "IMG_0001.jpg");
        assert_eq!(a, b);
        assert_ne!(a, PhotoId::derive("collection", "IMG_0002.jpg"));
        assert_ne!(a, PhotoId::derive("other", "IMG_0001.jpg"));
    }

    #[test]
    fn test_photo_id_is_v4_shaped() {
        let id = PhotoId::derive("collection", "IMG_0001.jpg");
        assert_eq!(id.as_uuid().get_version_num(), 4);
        assert_eq!(id.as_uuid().get_variant(), uuid::Variant::RFC4122);
        assert_eq!(PhotoId::parse(&id.to_string()).unwrap(), id);
    }

    #[test]
    fn test_new_photo_derives_name_and_mime() {
        let photo = Photo::new("c1", PathBuf::from("/photos/IMG_1.JPG"), 42);
        assert_eq!(photo.file_name, "IMG_1.JPG");
        assert_eq!(photo.mime_type, "image/jpeg");
        assert_eq!(photo.id, PhotoId::derive("c1", "IMG_1.JPG"));
        assert!(photo.file_exists);
        assert_eq!(photo.status, PhotoStatus::Unreviewed);
    }

    #[test]
    fn test_capture_order() {
        let mut photos = vec![
            photo_at("/b.jpg", None),
            photo_at("/z.jpg", Some(200)),
            photo_at("/a.jpg", None),
            photo_at("/y.jpg", Some(100)),
            photo_at("/x.jpg", Some(200)),
        ];
        photos.sort_by(capture_order);

        let paths: Vec<_> = photos
            .iter()
            .map(|p| p.source_path.to_string_lossy().into_owned())
            .collect();
        assert_eq!(paths, vec!["/y.jpg", "/x.jpg", "/z.jpg", "/a.jpg", "/b.jpg"]);
    }

    #[test]
    fn test_status_round_trip_names() {
        for status in [
            PhotoStatus::Unreviewed,
            PhotoStatus::Keep,
            PhotoStatus::Maybe,
            PhotoStatus::Discard,
        ] {
            assert_eq!(status.as_str().parse::<PhotoStatus>(), Ok(status));
        }
        assert_eq!(
            "bogus".parse::<PhotoStatus>(),
            Err(UnknownStatus("bogus".to_string()))
        );
    }

    #[test]
    fn test_unknown_extension_mime() {
        assert_eq!(mime_type_for("notes"), "application/octet-stream");
        assert_eq!(mime_type_for("x.heic"), "image/heic");
    }
}
