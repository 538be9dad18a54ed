use chrono::{DateTime, NaiveDateTime, Utc};
use exif::{In, Reader, Tag, Value};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExifError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("EXIF parsing error: {0}")]
    Parse(#[from] exif::Error),
}

/// The EXIF fields grouping cares about.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureMetadata {
    pub taken_at: Option<DateTime<Utc>>,
    pub orientation: Option<u32>,
}

impl CaptureMetadata {
    /// Orientations 5-8 store the image rotated by 90 or 270 degrees.
    pub fn swaps_dimensions(&self) -> bool {
        matches!(self.orientation, Some(5..=8))
    }
}

pub struct ExifService;

impl ExifService {
    pub fn new() -> Self {
        Self
    }

    /// Read capture time and orientation. Files without an EXIF block (or
    /// in a container kamadak-exif does not know) yield `Ok(None)`.
    pub fn extract_capture_metadata(
        &self,
        file_path: &Path,
    ) -> Result<Option<CaptureMetadata>, ExifError> {
        let file = File::open(file_path)?;
        let mut buf_reader = BufReader::new(file);

        let exif_reader = match Reader::new().read_from_container(&mut buf_reader) {
            Ok(reader) => reader,
            Err(exif::Error::Io(e)) => return Err(ExifError::Io(e)),
            Err(_) => return Ok(None),
        };

        let taken_at = [Tag::DateTimeOriginal, Tag::DateTime]
            .iter()
            .filter_map(|tag| exif_reader.get_field(*tag, In::PRIMARY))
            .find_map(|field| self.field_to_string(&field.value))
            .and_then(|value| self.parse_exif_datetime(&value));

        let orientation = exif_reader
            .get_field(Tag::Orientation, In::PRIMARY)
            .and_then(|field| field.value.get_uint(0));

        let metadata = CaptureMetadata {
            taken_at,
            orientation,
        };

        if metadata == CaptureMetadata::default() {
            Ok(None)
        } else {
            Ok(Some(metadata))
        }
    }

    fn field_to_string(&self, value: &Value) -> Option<String> {
        match value {
            Value::Ascii(vec) => vec.first().map(|ascii_val| {
                String::from_utf8_lossy(ascii_val)
                    .trim_end_matches('\0')
                    .to_string()
            }),
            _ => None,
        }
    }

    /// EXIF datetimes carry no zone; they are read as UTC.
    fn parse_exif_datetime(&self, datetime_str: &str) -> Option<DateTime<Utc>> {
        match NaiveDateTime::parse_from_str(datetime_str.trim(), "%Y:%m:%d %H:%M:%S") {
            Ok(dt) => Some(dt.and_utc()),
            Err(_) => {
                log::warn!("Failed to parse EXIF datetime: {}", datetime_str);
                None
            }
        }
    }
}

impl Default for ExifService {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_io_error() {
        let exif_service = ExifService::new();
        let result = exif_service.extract_capture_metadata(Path::new("/non/existent/file.jpg"));
        assert!(matches!(result, Err(ExifError::Io(_))));
    }

    #[test]
    fn test_file_without_exif() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("no_exif.jpg");
        fs::write(&file_path, b"This is not an image file").unwrap();

        let result = ExifService::new().extract_capture_metadata(&file_path);
        assert!(result.unwrap().is_none());
    }

    #[test]
    fn test_parse_exif_datetime() {
        use chrono::{Datelike, Timelike};

        let exif_service = ExifService::new();
        let parsed = exif_service.parse_exif_datetime("2023:12:25 14:30:45").unwrap();

        assert_eq!(parsed.year(), 2023);
        assert_eq!(parsed.month(), 12);
        assert_eq!(parsed.day(), 25);
        assert_eq!(parsed.hour(), 14);
        assert_eq!(parsed.minute(), 30);
        assert_eq!(parsed.second(), 45);

        assert!(exif_service.parse_exif_datetime("0000:00:00 00:00:00").is_none());
    }

    #[test]
    fn test_orientation_swaps_dimensions() {
        for orientation in 1..=8 {
            let metadata = CaptureMetadata {
                taken_at: None,
                orientation: Some(orientation),
            };
            assert_eq!(metadata.swaps_dimensions(), orientation >= 5);
        }
        assert!(!CaptureMetadata::default().swaps_dimensions());
    }
}
