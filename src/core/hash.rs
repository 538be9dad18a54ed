use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HashError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Streaming SHA-256 content hasher. The digest is the identity key for
/// exact duplicates, so two files hash equal iff their bytes are equal.
#[derive(Debug, Clone, Default)]
pub struct ContentHasher;

impl ContentHasher {
    pub fn new() -> Self {
        Self
    }

    /// Compute the SHA-256 content hash of a file as 64 lowercase hex characters.
    pub fn hash_file(&self, file_path: &Path) -> Result<String, HashError> {
        let file = File::open(file_path)?;
        let mut reader = BufReader::new(file);
        let mut hasher = Sha256::new();
        let mut buffer = [0; 8192]; // 8KB buffer for efficient reading

        loop {
            let bytes_read = reader.read(&mut buffer)?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
        }

        Ok(format!("{:x}", hasher.finalize()))
    }

    /// Hash many files in parallel. Results keep the order of `file_paths`.
    pub fn hash_files_batch<'a>(
        &self,
        file_paths: &[&'a Path],
    ) -> Vec<(&'a Path, Result<String, HashError>)> {
        use rayon::prelude::*;

        file_paths
            .par_iter()
            .map(|path| (*path, self.hash_file(path)))
            .collect()
    }
}

/// Hash a single file with the default hasher.
pub fn hash_content(path: &Path) -> Result<String, HashError> {
    ContentHasher::new().hash_file(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_hash_is_stable_hex() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("test.jpg");
        fs::write(&file_path, b"Hello, World!").unwrap();

        let hasher = ContentHasher::new();
        let hash = hasher.hash_file(&file_path).unwrap();
        let again = hasher.hash_file(&file_path).unwrap();

        assert_eq!(hash, again);
        assert_eq!(hash.len(), 64);
        assert!(hash
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
        assert_eq!(
            hash,
            "dffd6021bb2bd5b0af676290809ec3a53191dd81c7f70a4b28688a362182986f"
        );
    }

    #[test]
    fn test_identical_bytes_different_paths() {
        let temp_dir = TempDir::new().unwrap();
        let file1 = temp_dir.path().join("a.jpg");
        let nested = temp_dir.path().join("nested");
        fs::create_dir(&nested).unwrap();
        let file2 = nested.join("renamed.png");

        fs::write(&file1, b"Identical content").unwrap();
        fs::write(&file2, b"Identical content").unwrap();

        let hasher = ContentHasher::new();
        assert_eq!(
            hasher.hash_file(&file1).unwrap(),
            hasher.hash_file(&file2).unwrap()
        );
    }

    #[test]
    fn test_single_byte_change_changes_digest() {
        let temp_dir = TempDir::new().unwrap();
        let file1 = temp_dir.path().join("a.jpg");
        let file2 = temp_dir.path().join("b.jpg");

        let mut content = vec![7u8; 20_000];
        fs::write(&file1, &content).unwrap();
        content[12_345] = 8;
        fs::write(&file2, &content).unwrap();

        let hasher = ContentHasher::new();
        assert_ne!(
            hasher.hash_file(&file1).unwrap(),
            hasher.hash_file(&file2).unwrap()
        );
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let temp_dir = TempDir::new().unwrap();
        let result = hash_content(&temp_dir.path().join("gone.jpg"));
        assert!(matches!(result, Err(HashError::Io(_))));
    }

    #[test]
    fn test_batch_hashing_keeps_order() {
        let temp_dir = TempDir::new().unwrap();
        let file1 = temp_dir.path().join("file1.jpg");
        let file2 = temp_dir.path().join("file2.jpg");
        let missing = temp_dir.path().join("missing.jpg");

        fs::write(&file1, b"Content 1").unwrap();
        fs::write(&file2, b"Content 2").unwrap();

        let hasher = ContentHasher::new();
        let paths = vec![file1.as_path(), missing.as_path(), file2.as_path()];
        let results = hasher.hash_files_batch(&paths);

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].0, file1.as_path());
        assert!(results[0].1.is_ok());
        assert!(results[1].1.is_err());
        assert_eq!(results[2].0, file2.as_path());
        assert_ne!(
            results[0].1.as_ref().unwrap(),
            results[2].1.as_ref().unwrap()
        );
    }
}
