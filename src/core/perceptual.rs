use crate::core::distance::hamming_distance;
use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, ImageReader};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Resample target. One extra column gives eight horizontal pairs per row.
pub const GRID_WIDTH: u32 = 9;
pub const GRID_HEIGHT: u32 = 8;
pub const FINGERPRINT_BITS: u32 = (GRID_WIDTH - 1) * GRID_HEIGHT;

const HEX_WIDTH: usize = (FINGERPRINT_BITS / 4) as usize;

#[derive(Debug, Error)]
pub enum FingerprintError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported image {path}: {message}")]
    UnsupportedImage { path: String, message: String },

    #[error("Malformed fingerprint: {0:?}")]
    Malformed(String),
}

/// 64-bit difference hash. Bit `row * 8 + col` is set when the pixel at
/// `col` is brighter than its right-hand neighbour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Fingerprint(u64);

impl Fingerprint {
    pub fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    pub fn bits(&self) -> u64 {
        self.0
    }

    pub fn to_hex(&self) -> String {
        format!("{:0width$x}", self.0, width = HEX_WIDTH)
    }

    pub fn distance(&self, other: &Fingerprint) -> u32 {
        hamming_distance(self.0, other.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Fingerprint {
    type Err = FingerprintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != HEX_WIDTH || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(FingerprintError::Malformed(s.to_string()));
        }
        u64::from_str_radix(s, 16)
            .map(Self)
            .map_err(|_| FingerprintError::Malformed(s.to_string()))
    }
}

impl From<Fingerprint> for String {
    fn from(fingerprint: Fingerprint) -> Self {
        fingerprint.to_hex()
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = FingerprintError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Computes difference-hash fingerprints that survive resizing and
/// recompression but move with real visual change.
#[derive(Debug, Clone)]
pub struct PerceptualFingerprinter {
    filter: FilterType,
}

impl PerceptualFingerprinter {
    pub fn new() -> Self {
        Self {
            filter: FilterType::Triangle,
        }
    }

    /// Decode the file (format sniffed from content, not only the
    /// extension) and fingerprint it.
    pub fn fingerprint_file(&self, path: &Path) -> Result<Fingerprint, FingerprintError> {
        let unsupported = |e: image::ImageError| FingerprintError::UnsupportedImage {
            path: path.display().to_string(),
            message: e.to_string(),
        };

        let image = ImageReader::open(path)?
            .with_guessed_format()?
            .decode()
            .map_err(|e| match e {
                image::ImageError::IoError(io) => FingerprintError::Io(io),
                other => unsupported(other),
            })?;

        Ok(self.fingerprint_image(&image))
    }

    pub fn fingerprint_image(&self, image: &DynamicImage) -> Fingerprint {
        let grid = image
            .grayscale()
            .resize_exact(GRID_WIDTH, GRID_HEIGHT, self.filter)
            .to_luma8();
        Fingerprint(dhash_bits(&grid))
    }
}

impl Default for PerceptualFingerprinter {
    fn default() -> Self {
        Self::new()
    }
}

/// Emit one bit per horizontal pair of an already resampled grid.
fn dhash_bits(grid: &GrayImage) -> u64 {
    let mut bits = 0u64;
    for row in 0..GRID_HEIGHT {
        for col in 0..GRID_WIDTH - 1 {
            let left = grid.get_pixel(col, row)[0];
            let right = grid.get_pixel(col + 1, row)[0];
            if left > right {
                bits |= 1 << (row * (GRID_WIDTH - 1) + col);
            }
        }
    }
    bits
}

/// Fingerprint a single file with the default fingerprinter.
pub fn compute_fingerprint(path: &Path) -> Result<Fingerprint, FingerprintError> {
    PerceptualFingerprinter::new().fingerprint_file(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Luma, Rgb, RgbImage};
    use std::fs;
    use tempfile::TempDir;

    /// White on the left, black from `edge` onward.
    fn split_image(width: u32, height: u32, edge: u32) -> DynamicImage {
        let img: RgbImage = ImageBuffer::from_fn(width, height, |x, _| {
            if x < edge {
                Rgb([255, 255, 255])
            } else {
                Rgb([0, 0, 0])
            }
        });
        DynamicImage::ImageRgb8(img)
    }

    fn flat_gray(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(ImageBuffer::from_pixel(width, height, Rgb([128, 128, 128])))
    }

    #[test]
    fn test_fingerprint_is_deterministic() {
        let fingerprinter = PerceptualFingerprinter::new();
        let img = split_image(120, 90, 60);
        assert_eq!(
            fingerprinter.fingerprint_image(&img),
            fingerprinter.fingerprint_image(&img)
        );
    }

    #[test]
    fn test_scaled_copy_has_identical_fingerprint() {
        let fingerprinter = PerceptualFingerprinter::new();
        let small = split_image(90, 80, 50);
        let large = split_image(900, 800, 500);

        let small_fp = fingerprinter.fingerprint_image(&small);
        let large_fp = fingerprinter.fingerprint_image(&large);
        assert_eq!(small_fp, large_fp);
        assert_ne!(small_fp.bits(), 0);
    }

    #[test]
    fn test_structure_differs_from_flat_gray() {
        let fingerprinter = PerceptualFingerprinter::new();
        let structured = fingerprinter.fingerprint_image(&split_image(90, 80, 50));
        let gray = fingerprinter.fingerprint_image(&flat_gray(90, 80));

        assert_eq!(gray.bits(), 0);
        assert_ne!(structured, gray);
    }

    #[test]
    fn test_bit_order_is_row_major_lsb_first() {
        let mut grid: GrayImage = ImageBuffer::from_pixel(GRID_WIDTH, GRID_HEIGHT, Luma([100]));
        // Row 0, pair (0, 1): brighter on the left.
        grid.put_pixel(0, 0, Luma([200]));
        // Row 7, pair (7, 8): brighter on the left.
        grid.put_pixel(7, 7, Luma([150]));

        let bits = dhash_bits(&grid);
        assert_eq!(bits, 1 | (1 << 63));
    }

    #[test]
    fn test_hex_rendering_is_zero_padded() {
        let fp = Fingerprint::from_bits(0x1f);
        assert_eq!(fp.to_hex(), "000000000000001f");
        assert_eq!(fp.to_string().len(), 16);
        assert_eq!("000000000000001f".parse::<Fingerprint>().unwrap(), fp);
    }

    #[test]
    fn test_parse_rejects_wrong_width() {
        assert!(matches!(
            "abc".parse::<Fingerprint>(),
            Err(FingerprintError::Malformed(_))
        ));
        assert!(matches!(
            "zzzzzzzzzzzzzzzz".parse::<Fingerprint>(),
            Err(FingerprintError::Malformed(_))
        ));
    }

    #[test]
    fn test_parse_rejects_sign_prefix() {
        assert!(matches!(
            "+00000000000001f".parse::<Fingerprint>(),
            Err(FingerprintError::Malformed(_))
        ));
        assert!(matches!(
            "-00000000000001f".parse::<Fingerprint>(),
            Err(FingerprintError::Malformed(_))
        ));
    }

    #[test]
    fn test_serde_uses_hex_string() {
        let fp = Fingerprint::from_bits(0xabcdef);
        let json = serde_json::to_string(&fp).unwrap();
        assert_eq!(json, "\"0000000000abcdef\"");
        let back: Fingerprint = serde_json::from_str(&json).unwrap();
        assert_eq!(back, fp);
    }

    #[test]
    fn test_fingerprint_file_png() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("split.png");
        split_image(90, 80, 50).save(&path).unwrap();

        let from_file = compute_fingerprint(&path).unwrap();
        let in_memory = PerceptualFingerprinter::new().fingerprint_image(&split_image(90, 80, 50));
        assert_eq!(from_file, in_memory);
    }

    #[test]
    fn test_corrupt_file_is_unsupported() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("broken.jpg");
        fs::write(&path, b"This is not an image file").unwrap();

        let result = compute_fingerprint(&path);
        assert!(matches!(
            result,
            Err(FingerprintError::UnsupportedImage { .. })
        ));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let temp_dir = TempDir::new().unwrap();
        let result = compute_fingerprint(&temp_dir.path().join("missing.png"));
        assert!(matches!(result, Err(FingerprintError::Io(_))));
    }
}
