//! Duplicate and near-duplicate photo detection.
//!
//! Files are hashed ([`hash_content`]) and fingerprinted
//! ([`compute_fingerprint`]) independently; a collection snapshot is then
//! clustered into exact groups ([`build_exact_groups`]) or similar groups
//! under a [`SimilarityPolicy`] ([`build_similar_groups`]). A fresh folder
//! scan is reconciled against stored records with [`diff_collection`].

pub mod config;
pub mod core;
pub mod database;

pub use crate::config::{ConfigError, EngineConfig, ScanConfig};
pub use crate::core::distance::{hamming_distance, hamming_distance_hex, DistanceError};
pub use crate::core::duplicate::{
    build_exact_groups, build_similar_groups, DuplicateGroupBuilder, ExactAnalysis, Group,
    GroupKind, GroupMember, GroupingError, SimilarAnalysis, UnknownGroupKind,
};
pub use crate::core::hash::{hash_content, ContentHasher, HashError};
pub use crate::core::perceptual::{
    compute_fingerprint, Fingerprint, FingerprintError, PerceptualFingerprinter,
};
pub use crate::core::photo::{Photo, PhotoId, PhotoStatus, StoredPhoto, UnknownStatus};
pub use crate::core::policy::{
    HeuristicConfig, HeuristicPolicy, PerceptualPolicy, PolicyConfig, PolicyError,
    SimilarityPolicy,
};
pub use crate::core::sync::{diff_collection, SyncDiff, SyncResult};
pub use crate::core::union_find::UnionFind;
pub use crate::database::{Database, DatabaseError};
