use crate::core::hash::ContentHasher;
use crate::core::photo::{capture_order, Photo, PhotoId};
use crate::core::policy::SimilarityPolicy;
use crate::core::union_find::UnionFind;
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Files hashed between two cancellation checks.
const HASH_CHUNK: usize = 64;

#[derive(Debug, Error)]
pub enum GroupingError {
    #[error("Operation cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupKind {
    Exact,
    Similar,
}

impl GroupKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupKind::Exact => "exact",
            GroupKind::Similar => "similar",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown group kind {0:?}")]
pub struct UnknownGroupKind(pub String);

impl FromStr for GroupKind {
    type Err = UnknownGroupKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exact" => Ok(GroupKind::Exact),
            "similar" => Ok(GroupKind::Similar),
            _ => Err(UnknownGroupKind(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupMember {
    pub photo_id: PhotoId,
    pub rank: u32,
    pub score: f64,
}

/// A cluster of two or more photos. Members are kept sorted by rank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: Uuid,
    pub kind: GroupKind,
    pub confidence: f64,
    pub created_at: DateTime<Utc>,
    pub members: Vec<GroupMember>,
}

impl Group {
    fn new(
        kind: GroupKind,
        confidence: f64,
        created_at: DateTime<Utc>,
        members: Vec<GroupMember>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            confidence,
            created_at,
            members,
        }
    }

    /// The rank-0 member, kept by "keep first" curation.
    pub fn keeper(&self) -> Option<&GroupMember> {
        self.members.first()
    }

    pub fn contains(&self, photo_id: &PhotoId) -> bool {
        self.members.iter().any(|m| &m.photo_id == photo_id)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExactAnalysis {
    pub groups: Vec<Group>,
    pub scanned_count: usize,
    /// Photos hashed during this pass (their hash was absent before).
    pub hashed_count: usize,
    pub missing_file_count: usize,
    pub duplicate_photo_count: usize,
    /// Ids whose `content_hash` was filled in by this pass, for persisting.
    pub newly_hashed: Vec<PhotoId>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarAnalysis {
    pub policy: String,
    pub groups: Vec<Group>,
    pub scanned_count: usize,
    pub candidate_count: usize,
    pub skipped_count: usize,
    pub compared_pairs: usize,
    pub candidate_photo_count: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
struct Edge {
    left: usize,
    right: usize,
    score: f64,
}

/// Clusters a collection snapshot into exact or similar groups. Every run
/// recomputes groups from scratch; nothing here is incremental.
pub struct DuplicateGroupBuilder {
    hasher: ContentHasher,
    cancellation_token: Arc<AtomicBool>,
}

impl DuplicateGroupBuilder {
    pub fn new() -> Self {
        Self {
            hasher: ContentHasher::new(),
            cancellation_token: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_cancellation_token(mut self, token: Arc<AtomicBool>) -> Self {
        self.cancellation_token = token;
        self
    }

    pub fn get_cancellation_token(&self) -> Arc<AtomicBool> {
        self.cancellation_token.clone()
    }

    pub fn cancel(&self) {
        self.cancellation_token.store(true, Ordering::Relaxed);
    }

    fn is_cancelled(&self) -> bool {
        self.cancellation_token.load(Ordering::Relaxed)
    }

    /// Partition photos by content hash. Missing hashes are computed and
    /// written back into `photos`; unreadable files are counted and left out.
    pub fn build_exact_groups(
        &self,
        photos: &mut [Photo],
    ) -> Result<ExactAnalysis, GroupingError> {
        let started_at = Utc::now();

        let pending: Vec<usize> = photos
            .iter()
            .enumerate()
            .filter(|(_, photo)| photo.content_hash.is_none())
            .map(|(index, _)| index)
            .collect();

        let mut missing = vec![false; photos.len()];
        let mut newly_hashed = Vec::new();

        for chunk in pending.chunks(HASH_CHUNK) {
            if self.is_cancelled() {
                return Err(GroupingError::Cancelled);
            }

            let paths: Vec<&Path> = chunk
                .iter()
                .map(|&index| photos[index].source_path.as_path())
                .collect();
            let results: Vec<Result<String, _>> = self
                .hasher
                .hash_files_batch(&paths)
                .into_iter()
                .map(|(_, result)| result)
                .collect();

            for (&index, result) in chunk.iter().zip(results) {
                match result {
                    Ok(hash) => {
                        photos[index].content_hash = Some(hash);
                        newly_hashed.push(photos[index].id);
                    }
                    Err(e) => {
                        log::warn!(
                            "Skipping {} for exact grouping: {}",
                            photos[index].source_path.display(),
                            e
                        );
                        missing[index] = true;
                    }
                }
            }
        }

        let mut bucket_by_hash: HashMap<&str, usize> = HashMap::new();
        let mut buckets: Vec<Vec<PhotoId>> = Vec::new();

        for photo in photos.iter() {
            let Some(hash) = photo.content_hash.as_deref() else {
                continue;
            };
            match bucket_by_hash.get(hash) {
                Some(&slot) => buckets[slot].push(photo.id),
                None => {
                    bucket_by_hash.insert(hash, buckets.len());
                    buckets.push(vec![photo.id]);
                }
            }
        }

        let created_at = Utc::now();
        let groups: Vec<Group> = buckets
            .into_iter()
            .filter(|bucket| bucket.len() >= 2)
            .map(|bucket| {
                let members = bucket
                    .into_iter()
                    .enumerate()
                    .map(|(rank, photo_id)| GroupMember {
                        photo_id,
                        rank: rank as u32,
                        score: 1.0,
                    })
                    .collect();
                Group::new(GroupKind::Exact, 1.0, created_at, members)
            })
            .collect();

        let analysis = ExactAnalysis {
            duplicate_photo_count: groups.iter().map(Group::len).sum(),
            scanned_count: photos.len(),
            hashed_count: newly_hashed.len(),
            missing_file_count: missing.iter().filter(|m| **m).count(),
            newly_hashed,
            groups,
            started_at,
            finished_at: Utc::now(),
        };

        log::info!(
            "Exact grouping: {} photos, {} hashed, {} missing, {} groups",
            analysis.scanned_count,
            analysis.hashed_count,
            analysis.missing_file_count,
            analysis.groups.len()
        );

        Ok(analysis)
    }

    /// Cluster photos the policy judges similar. Pair scoring runs in
    /// parallel per row; unions are applied afterwards in row order so the
    /// result does not depend on scheduling.
    pub fn build_similar_groups(
        &self,
        photos: &[Photo],
        policy: &dyn SimilarityPolicy,
    ) -> Result<SimilarAnalysis, GroupingError> {
        let started_at = Utc::now();

        let input_position: HashMap<PhotoId, usize> = photos
            .iter()
            .enumerate()
            .map(|(index, photo)| (photo.id, index))
            .collect();

        let mut candidates: Vec<&Photo> =
            photos.iter().filter(|p| policy.is_candidate(p)).collect();
        policy.order_candidates(&mut candidates);
        let n = candidates.len();

        let rows: Option<Vec<(Vec<Edge>, usize)>> = (0..n)
            .into_par_iter()
            .map(|left| {
                if self.is_cancelled() {
                    return None;
                }

                let mut edges = Vec::new();
                let mut compared = 0;
                for right in (left + 1)..n {
                    if policy.beyond_window(candidates[left], candidates[right]) {
                        break;
                    }
                    compared += 1;
                    if let Some(score) = policy.evaluate_pair(candidates[left], candidates[right]) {
                        edges.push(Edge { left, right, score });
                    }
                }
                Some((edges, compared))
            })
            .collect();

        let rows = rows.ok_or(GroupingError::Cancelled)?;
        if self.is_cancelled() {
            return Err(GroupingError::Cancelled);
        }

        let compared_pairs: usize = rows.iter().map(|(_, compared)| compared).sum();
        let edges: Vec<Edge> = rows.into_iter().flat_map(|(edges, _)| edges).collect();

        let mut uf = UnionFind::new(n);
        for edge in &edges {
            uf.union(edge.left, edge.right);
        }

        let mut scores_by_root: HashMap<usize, Vec<f64>> = HashMap::new();
        for edge in &edges {
            scores_by_root
                .entry(uf.find(edge.left))
                .or_default()
                .push(edge.score);
        }

        let created_at = Utc::now();
        let mut groups: Vec<(usize, Group)> = Vec::new();
        for component in uf.components().into_iter().filter(|c| c.len() >= 2) {
            let root = uf.find(component[0]);
            let Some(edge_scores) = scores_by_root.get(&root) else {
                continue;
            };

            let mut ranked: Vec<&Photo> =
                component.iter().map(|&index| candidates[index]).collect();
            ranked.sort_by(|a, b| capture_order(a, b));
            let confidence = policy.component_confidence(&ranked, edge_scores);

            let first_position = ranked
                .iter()
                .filter_map(|photo| input_position.get(&photo.id).copied())
                .min()
                .unwrap_or(usize::MAX);

            let members = ranked
                .iter()
                .enumerate()
                .map(|(rank, photo)| GroupMember {
                    photo_id: photo.id,
                    rank: rank as u32,
                    score: confidence,
                })
                .collect();

            let group = Group::new(GroupKind::Similar, confidence, created_at, members);
            groups.push((first_position, group));
        }
        groups.sort_by_key(|(position, _)| *position);
        let groups: Vec<Group> = groups.into_iter().map(|(_, group)| group).collect();

        let analysis = SimilarAnalysis {
            policy: policy.name().to_string(),
            candidate_photo_count: groups.iter().map(Group::len).sum(),
            scanned_count: photos.len(),
            candidate_count: n,
            skipped_count: photos.len() - n,
            compared_pairs,
            groups,
            started_at,
            finished_at: Utc::now(),
        };

        log::info!(
            "Similar grouping ({}): {} candidates of {}, {} pairs compared, {} groups",
            analysis.policy,
            analysis.candidate_count,
            analysis.scanned_count,
            analysis.compared_pairs,
            analysis.groups.len()
        );

        Ok(analysis)
    }
}

impl Default for DuplicateGroupBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Exact grouping with a fresh, never-cancelled builder.
pub fn build_exact_groups(photos: &mut [Photo]) -> Result<ExactAnalysis, GroupingError> {
    DuplicateGroupBuilder::new().build_exact_groups(photos)
}

/// Similar grouping under `policy` with a fresh, never-cancelled builder.
pub fn build_similar_groups(
    photos: &[Photo],
    policy: &dyn SimilarityPolicy,
) -> Result<SimilarAnalysis, GroupingError> {
    DuplicateGroupBuilder::new().build_similar_groups(photos, policy)
}
