use thiserror::Error;

/// Comparing bit strings of different widths is a programming error: a
/// collection only ever holds fingerprints from one scheme.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DistanceError {
    #[error("fingerprint widths differ: {left} bits vs {right} bits")]
    WidthMismatch { left: usize, right: usize },

    #[error("invalid hex digit {digit:?} in fingerprint")]
    InvalidDigit { digit: char },
}

/// Number of differing bits between two 64-bit fingerprints.
pub fn hamming_distance(a: u64, b: u64) -> u32 {
    (a ^ b).count_ones()
}

/// Hamming distance between two hex-encoded bit strings of equal width.
pub fn hamming_distance_hex(a: &str, b: &str) -> Result<u32, DistanceError> {
    if a.len() != b.len() {
        return Err(DistanceError::WidthMismatch {
            left: a.len() * 4,
            right: b.len() * 4,
        });
    }

    a.chars().zip(b.chars()).try_fold(0u32, |acc, (x, y)| {
        let x = x.to_digit(16).ok_or(DistanceError::InvalidDigit { digit: x })?;
        let y = y.to_digit(16).ok_or(DistanceError::InvalidDigit { digit: y })?;
        Ok(acc + (x ^ y).count_ones())
    })
}
