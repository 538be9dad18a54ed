use crate::core::duplicate::{Group, GroupKind};
use crate::core::photo::{Photo, PhotoId, PhotoStatus};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReviewError {
    #[error("Photo {photo_id} is not a member of group {group_id}")]
    NotInGroup { group_id: Uuid, photo_id: PhotoId },

    #[error("Group {0} has no members")]
    EmptyGroup(Uuid),
}

/// Status changes for picking `keep_id` out of `group`. With
/// `reject_others`, every other member is marked for discard.
pub fn pick_group_photo(
    group: &Group,
    keep_id: PhotoId,
    reject_others: bool,
) -> Result<Vec<(PhotoId, PhotoStatus)>, ReviewError> {
    if !group.contains(&keep_id) {
        return Err(ReviewError::NotInGroup {
            group_id: group.id,
            photo_id: keep_id,
        });
    }

    let mut updates = vec![(keep_id, PhotoStatus::Keep)];
    if reject_others {
        updates.extend(
            group
                .members
                .iter()
                .filter(|member| member.photo_id != keep_id)
                .map(|member| (member.photo_id, PhotoStatus::Discard)),
        );
    }
    Ok(updates)
}

/// Keep the rank-0 member and discard the rest.
pub fn keep_first(group: &Group) -> Result<Vec<(PhotoId, PhotoStatus)>, ReviewError> {
    let keeper = group.keeper().ok_or(ReviewError::EmptyGroup(group.id))?;
    pick_group_photo(group, keeper.photo_id, true)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewSummary {
    pub total: usize,
    pub unreviewed: usize,
    pub keep: usize,
    pub maybe: usize,
    pub discard: usize,
    pub missing: usize,
    pub exact_groups: usize,
    pub similar_groups: usize,
}

impl ReviewSummary {
    pub fn from_photos(photos: &[Photo], groups: &[Group]) -> Self {
        let mut summary = ReviewSummary {
            total: photos.len(),
            ..Default::default()
        };

        for photo in photos {
            match photo.status {
                PhotoStatus::Unreviewed => summary.unreviewed += 1,
                PhotoStatus::Keep => summary.keep += 1,
                PhotoStatus::Maybe => summary.maybe += 1,
                PhotoStatus::Discard => summary.discard += 1,
            }
            if !photo.file_exists {
                summary.missing += 1;
            }
        }

        for group in groups {
            match group.kind {
                GroupKind::Exact => summary.exact_groups += 1,
                GroupKind::Similar => summary.similar_groups += 1,
            }
        }

        summary
    }

    pub fn reviewed(&self) -> usize {
        self.total - self.unreviewed
    }
}
