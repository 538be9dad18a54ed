use crate::core::perceptual::FINGERPRINT_BITS;
use crate::core::photo::{capture_order, Photo};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_THRESHOLD: u32 = 10;

#[derive(Debug, Error, PartialEq)]
pub enum PolicyError {
    #[error("Invalid {field}: {reason}")]
    InvalidSetting { field: &'static str, reason: String },
}

fn invalid(field: &'static str, reason: impl Into<String>) -> PolicyError {
    PolicyError::InvalidSetting {
        field,
        reason: reason.into(),
    }
}

/// Strategy deciding which photo pairs are "similar". The group builder
/// enumerates pairs and clusters them; a policy only judges.
pub trait SimilarityPolicy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether the photo can take part in any pair at all.
    fn is_candidate(&self, photo: &Photo) -> bool;

    /// Reorder candidates before the pairwise scan.
    fn order_candidates(&self, _candidates: &mut [&Photo]) {}

    /// True once `right` (and everything after it in scan order) is too far
    /// from `left` to ever match, ending that row of the scan.
    fn beyond_window(&self, _left: &Photo, _right: &Photo) -> bool {
        false
    }

    /// Score in `[0, 1]` when the pair should be joined, otherwise `None`.
    fn evaluate_pair(&self, left: &Photo, right: &Photo) -> Option<f64>;

    /// Confidence of a finished component, given its members and the scores
    /// of the edges that joined them. Defaults to the mean edge score.
    fn component_confidence(&self, _members: &[&Photo], edge_scores: &[f64]) -> f64 {
        if edge_scores.is_empty() {
            return 0.0;
        }
        edge_scores.iter().sum::<f64>() / edge_scores.len() as f64
    }
}

/// Joins photos whose difference hashes are within `threshold` bits.
#[derive(Debug, Clone)]
pub struct PerceptualPolicy {
    threshold: u32,
}

impl PerceptualPolicy {
    pub fn new(threshold: u32) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }
}

impl Default for PerceptualPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

impl SimilarityPolicy for PerceptualPolicy {
    fn name(&self) -> &'static str {
        "perceptual"
    }

    fn is_candidate(&self, photo: &Photo) -> bool {
        photo.perceptual_fingerprint.is_some()
    }

    fn evaluate_pair(&self, left: &Photo, right: &Photo) -> Option<f64> {
        let distance = left
            .perceptual_fingerprint?
            .distance(&right.perceptual_fingerprint?);

        (distance <= self.threshold).then(|| similarity(distance))
    }

    /// One minus the mean distance over every member pair, including pairs
    /// only joined through a chain.
    fn component_confidence(&self, members: &[&Photo], _edge_scores: &[f64]) -> f64 {
        let fingerprints: Vec<_> = members
            .iter()
            .filter_map(|photo| photo.perceptual_fingerprint)
            .collect();

        let mut total = 0u64;
        let mut pairs = 0u64;
        for (i, left) in fingerprints.iter().enumerate() {
            for right in &fingerprints[i + 1..] {
                total += u64::from(left.distance(right));
                pairs += 1;
            }
        }

        if pairs == 0 {
            return 0.0;
        }
        1.0 - total as f64 / pairs as f64 / f64::from(FINGERPRINT_BITS)
    }
}

fn similarity(distance: u32) -> f64 {
    1.0 - f64::from(distance) / f64::from(FINGERPRINT_BITS)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeuristicConfig {
    pub time_window_secs: i64,
    pub min_dimension_score: f64,
    pub min_size_ratio: f64,
    pub min_score: f64,
    pub time_weight: f64,
    pub dimension_weight: f64,
    pub size_weight: f64,
}

impl Default for HeuristicConfig {
    fn default() -> Self {
        Self {
            time_window_secs: 45,
            min_dimension_score: 0.9,
            min_size_ratio: 0.55,
            min_score: 0.72,
            time_weight: 0.45,
            dimension_weight: 0.35,
            size_weight: 0.2,
        }
    }
}

impl HeuristicConfig {
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.time_window_secs < 0 {
            return Err(invalid("time_window_secs", "must not be negative"));
        }
        if self.time_window_secs.checked_mul(1000).is_none() {
            return Err(invalid("time_window_secs", "is too large"));
        }

        for (field, weight) in [
            ("time_weight", self.time_weight),
            ("dimension_weight", self.dimension_weight),
            ("size_weight", self.size_weight),
        ] {
            if !weight.is_finite() || weight < 0.0 {
                return Err(invalid(field, format!("{weight} is not a non-negative weight")));
            }
        }

        for (field, value) in [
            ("min_dimension_score", self.min_dimension_score),
            ("min_size_ratio", self.min_size_ratio),
            ("min_score", self.min_score),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(invalid(field, format!("{value} is outside [0, 1]")));
            }
        }
        Ok(())
    }
}

/// Joins photos shot close together with matching dimensions and file
/// sizes: burst frames and near-identical re-exports.
#[derive(Debug, Clone, Default)]
pub struct HeuristicPolicy {
    config: HeuristicConfig,
}

impl HeuristicPolicy {
    pub fn new(config: HeuristicConfig) -> Self {
        Self { config }
    }

    fn window_millis(&self) -> i64 {
        self.config.time_window_secs.saturating_mul(1000)
    }
}

fn ratio(a: f64, b: f64) -> f64 {
    let max = a.max(b);
    if max == 0.0 {
        1.0
    } else {
        a.min(b) / max
    }
}

impl SimilarityPolicy for HeuristicPolicy {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    fn is_candidate(&self, photo: &Photo) -> bool {
        photo.taken_at.is_some() && photo.dimensions().is_some()
    }

    fn order_candidates(&self, candidates: &mut [&Photo]) {
        candidates.sort_by(|a, b| capture_order(a, b));
    }

    fn beyond_window(&self, left: &Photo, right: &Photo) -> bool {
        match (left.taken_at, right.taken_at) {
            (Some(l), Some(r)) => (r - l).num_milliseconds() > self.window_millis(),
            _ => false,
        }
    }

    fn evaluate_pair(&self, left: &Photo, right: &Photo) -> Option<f64> {
        let (left_taken, right_taken) = (left.taken_at?, right.taken_at?);
        let (left_w, left_h) = left.dimensions()?;
        let (right_w, right_h) = right.dimensions()?;

        // Byte-identical pairs belong to exact grouping.
        if let (Some(a), Some(b)) = (&left.content_hash, &right.content_hash) {
            if a == b {
                return None;
            }
        }

        let time_difference = (left_taken - right_taken).num_milliseconds().abs();
        let window = self.window_millis();
        if time_difference > window {
            return None;
        }

        let width_ratio = ratio(f64::from(left_w), f64::from(right_w));
        let height_ratio = ratio(f64::from(left_h), f64::from(right_h));
        let dimension_score = (width_ratio + height_ratio) / 2.0;
        let size_ratio = ratio(left.file_size_bytes as f64, right.file_size_bytes as f64);
        let time_score = if window == 0 {
            1.0
        } else {
            1.0 - time_difference as f64 / window as f64
        };

        if dimension_score < self.config.min_dimension_score
            || size_ratio < self.config.min_size_ratio
        {
            return None;
        }

        let score = time_score * self.config.time_weight
            + dimension_score * self.config.dimension_weight
            + size_ratio * self.config.size_weight;

        (score >= self.config.min_score).then_some(score)
    }
}

/// Serializable policy selection, as it appears in configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum PolicyConfig {
    Perceptual {
        #[serde(default = "default_threshold")]
        threshold: u32,
    },
    Heuristic(HeuristicConfig),
}

fn default_threshold() -> u32 {
    DEFAULT_THRESHOLD
}

impl PolicyConfig {
    pub fn validate(&self) -> Result<(), PolicyError> {
        match self {
            PolicyConfig::Perceptual { threshold } if *threshold > FINGERPRINT_BITS => Err(invalid(
                "threshold",
                format!("{threshold} exceeds {FINGERPRINT_BITS} bits"),
            )),
            PolicyConfig::Perceptual { .. } => Ok(()),
            PolicyConfig::Heuristic(config) => config.validate(),
        }
    }

    pub fn build(&self) -> Box<dyn SimilarityPolicy> {
        match self {
            PolicyConfig::Perceptual { threshold } => Box::new(PerceptualPolicy::new(*threshold)),
            PolicyConfig::Heuristic(config) => Box::new(HeuristicPolicy::new(config.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::perceptual::Fingerprint;
    use chrono::{Duration, TimeZone, Utc};
    use std::path::PathBuf;

    fn fingerprinted(name: &str, bits: u64) -> Photo {
        let mut photo = Photo::new("c", PathBuf::from(name), 1000);
        photo.perceptual_fingerprint = Some(Fingerprint::from_bits(bits));
        photo
    }

    fn shot(name: &str, offset_secs: i64, width: u32, height: u32, size: u64) -> Photo {
        let base = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let mut photo = Photo::new("c", PathBuf::from(name), size);
        photo.taken_at = Some(base + Duration::seconds(offset_secs));
        photo.width = Some(width);
        photo.height = Some(height);
        photo
    }

    #[test]
    fn test_perceptual_threshold_boundary() {
        let policy = PerceptualPolicy::new(3);
        let a = fingerprinted("a.jpg", 0);
        let at_threshold = fingerprinted("b.jpg", 0b111);
        let past_threshold = fingerprinted("c.jpg", 0b1111);

        assert!(policy.evaluate_pair(&a, &at_threshold).is_some());
        assert!(policy.evaluate_pair(&a, &past_threshold).is_none());
    }

    #[test]
    fn test_perceptual_score_decreases_with_distance() {
        let policy = PerceptualPolicy::default();
        let a = fingerprinted("a.jpg", 0);
        let same = policy.evaluate_pair(&a, &fingerprinted("b.jpg", 0)).unwrap();
        let near = policy.evaluate_pair(&a, &fingerprinted("c.jpg", 0b11)).unwrap();

        assert_eq!(same, 1.0);
        assert!((near - (1.0 - 2.0 / 64.0)).abs() < 1e-12);
    }

    #[test]
    fn test_perceptual_requires_fingerprint() {
        let policy = PerceptualPolicy::default();
        let bare = Photo::new("c", PathBuf::from("x.jpg"), 1);
        assert!(!policy.is_candidate(&bare));
        assert!(policy.evaluate_pair(&bare, &fingerprinted("a.jpg", 0)).is_none());
    }

    #[test]
    fn test_heuristic_burst_pair_scores() {
        let policy = HeuristicPolicy::default();
        let a = shot("a.jpg", 0, 4000, 3000, 5_000_000);
        let b = shot("b.jpg", 2, 4000, 3000, 4_800_000);

        let score = policy.evaluate_pair(&a, &b).unwrap();
        // time 1 - 2/45, dimensions 1.0, size 0.96
        let expected = (1.0 - 2.0 / 45.0) * 0.45 + 0.35 + 0.96 * 0.2;
        assert!((score - expected).abs() < 1e-9);
    }

    #[test]
    fn test_heuristic_rejects_outside_window() {
        let policy = HeuristicPolicy::default();
        let a = shot("a.jpg", 0, 4000, 3000, 5_000_000);
        let b = shot("b.jpg", 46, 4000, 3000, 5_000_000);

        assert!(policy.evaluate_pair(&a, &b).is_none());
        assert!(policy.beyond_window(&a, &b));
        assert!(!policy.beyond_window(&a, &shot("c.jpg", 45, 1, 1, 1)));
    }

    #[test]
    fn test_heuristic_rejects_mismatched_dimensions_and_sizes() {
        let policy = HeuristicPolicy::default();
        let a = shot("a.jpg", 0, 4000, 3000, 5_000_000);
        let rotated = shot("b.jpg", 1, 3000, 4000, 5_000_000);
        let tiny = shot("c.jpg", 1, 4000, 3000, 1_000_000);

        assert!(policy.evaluate_pair(&a, &rotated).is_none());
        assert!(policy.evaluate_pair(&a, &tiny).is_none());
    }

    #[test]
    fn test_heuristic_skips_exact_hash_matches() {
        let policy = HeuristicPolicy::default();
        let mut a = shot("a.jpg", 0, 4000, 3000, 5_000_000);
        let mut b = shot("b.jpg", 0, 4000, 3000, 5_000_000);
        assert!(policy.evaluate_pair(&a, &b).is_some());

        a.content_hash = Some("h1".to_string());
        b.content_hash = Some("h1".to_string());
        assert!(policy.evaluate_pair(&a, &b).is_none());
    }

    #[test]
    fn test_heuristic_candidates_need_time_and_dimensions() {
        let policy = HeuristicPolicy::default();
        let mut no_time = shot("a.jpg", 0, 10, 10, 10);
        no_time.taken_at = None;
        let mut no_height = shot("b.jpg", 0, 10, 10, 10);
        no_height.height = None;

        assert!(!policy.is_candidate(&no_time));
        assert!(!policy.is_candidate(&no_height));
        assert!(policy.is_candidate(&shot("c.jpg", 0, 10, 10, 10)));
        assert!(policy.evaluate_pair(&no_time, &shot("d.jpg", 0, 10, 10, 10)).is_none());
    }

    #[test]
    fn test_perceptual_component_confidence_uses_all_pairs() {
        let policy = PerceptualPolicy::new(3);
        let photos = [
            fingerprinted("a.jpg", 0),
            fingerprinted("b.jpg", 0b111),
            fingerprinted("c.jpg", 0b111111),
        ];
        let members: Vec<&Photo> = photos.iter().collect();
        let edge_scores = [similarity(3), similarity(3)];

        let confidence = policy.component_confidence(&members, &edge_scores);
        assert!((confidence - (1.0 - 4.0 / 64.0)).abs() < 1e-12);
    }

    #[test]
    fn test_default_component_confidence_is_edge_mean() {
        let policy = HeuristicPolicy::default();
        assert!((policy.component_confidence(&[], &[0.8, 0.9]) - 0.85).abs() < 1e-12);
    }

    #[test]
    fn test_heuristic_config_validation() {
        assert!(HeuristicConfig::default().validate().is_ok());

        let negative_window = HeuristicConfig {
            time_window_secs: -5,
            ..HeuristicConfig::default()
        };
        assert!(matches!(
            negative_window.validate(),
            Err(PolicyError::InvalidSetting { field: "time_window_secs", .. })
        ));

        let huge_window = HeuristicConfig {
            time_window_secs: i64::MAX,
            ..HeuristicConfig::default()
        };
        assert!(huge_window.validate().is_err());

        let negative_weight = HeuristicConfig {
            size_weight: -0.1,
            ..HeuristicConfig::default()
        };
        assert!(matches!(
            negative_weight.validate(),
            Err(PolicyError::InvalidSetting { field: "size_weight", .. })
        ));

        let ratio_above_one = HeuristicConfig {
            min_size_ratio: 1.5,
            ..HeuristicConfig::default()
        };
        assert!(ratio_above_one.validate().is_err());

        let nan_score = HeuristicConfig {
            min_score: f64::NAN,
            ..HeuristicConfig::default()
        };
        assert!(nan_score.validate().is_err());
    }

    #[test]
    fn test_policy_config_validation() {
        let config: PolicyConfig =
            serde_json::from_str(r#"{"policy":"heuristic","time_window_secs":-5}"#).unwrap();
        assert!(config.validate().is_err());

        assert!(PolicyConfig::Perceptual { threshold: 64 }.validate().is_ok());
        assert!(PolicyConfig::Perceptual { threshold: 65 }.validate().is_err());
    }

    #[test]
    fn test_policy_config_from_json() {
        let perceptual: PolicyConfig = serde_json::from_str(r#"{"policy":"perceptual"}"#).unwrap();
        assert_eq!(perceptual, PolicyConfig::Perceptual { threshold: 10 });
        assert_eq!(perceptual.build().name(), "perceptual");

        let heuristic: PolicyConfig =
            serde_json::from_str(r#"{"policy":"heuristic","time_window_secs":30}"#).unwrap();
        match &heuristic {
            PolicyConfig::Heuristic(config) => {
                assert_eq!(config.time_window_secs, 30);
                assert_eq!(config.min_score, 0.72);
            }
            other => panic!("unexpected policy {other:?}"),
        }
        assert_eq!(heuristic.build().name(), "heuristic");
    }
}
