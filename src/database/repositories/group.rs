use super::{format_timestamp, parse_timestamp, Repository};
use crate::core::duplicate::{Group, GroupKind, GroupMember};
use crate::core::photo::PhotoId;
use crate::database::{conversion_error, DatabaseError};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

pub struct GroupRepository<'a> {
    conn: &'a Connection,
}

impl Repository for GroupRepository<'_> {
    fn conn(&self) -> &Connection {
        self.conn
    }
}

fn group_from_row(row: &Row<'_>) -> rusqlite::Result<Group> {
    let id: String = row.get(0)?;
    let kind: String = row.get(1)?;
    let created_at: String = row.get(3)?;

    Ok(Group {
        id: Uuid::parse_str(&id).map_err(|e| conversion_error(0, e))?,
        kind: kind.parse::<GroupKind>().map_err(|e| conversion_error(1, e))?,
        confidence: row.get(2)?,
        created_at: parse_timestamp(3, &created_at)?,
        members: Vec::new(),
    })
}

impl<'a> GroupRepository<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Swap every `kind` group of the collection for `groups`. Readers see
    /// either the old set or the new one, never a mix.
    pub fn replace_groups(
        &self,
        collection_id: &str,
        kind: GroupKind,
        groups: &[Group],
    ) -> Result<(), DatabaseError> {
        let tx = self.transaction()?;
        tx.execute(
            "DELETE FROM group_members WHERE group_id IN
                (SELECT id FROM photo_groups WHERE collection_id = ?1 AND kind = ?2)",
            params![collection_id, kind.as_str()],
        )?;
        let removed = tx.execute(
            "DELETE FROM photo_groups WHERE collection_id = ?1 AND kind = ?2",
            params![collection_id, kind.as_str()],
        )?;

        {
            let mut insert_group = tx.prepare(
                "INSERT INTO photo_groups (id, collection_id, kind, confidence, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            let mut insert_member = tx.prepare(
                "INSERT INTO group_members (group_id, photo_id, rank, score)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;

            for group in groups.iter().filter(|g| g.kind == kind) {
                let group_id = group.id.to_string();
                insert_group.execute(params![
                    group_id,
                    collection_id,
                    kind.as_str(),
                    group.confidence,
                    format_timestamp(&group.created_at),
                ])?;

                for member in &group.members {
                    insert_member.execute(params![
                        group_id,
                        member.photo_id.to_string(),
                        member.rank,
                        member.score,
                    ])?;
                }
            }
        }
        tx.commit()?;

        log::debug!(
            "Replaced {} {} groups of {} with {}",
            removed,
            kind.as_str(),
            collection_id,
            groups.len()
        );
        Ok(())
    }

    /// Groups of the collection in insertion order, optionally of one kind.
    pub fn load_groups(
        &self,
        collection_id: &str,
        kind: Option<GroupKind>,
    ) -> Result<Vec<Group>, DatabaseError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, kind, confidence, created_at FROM photo_groups
             WHERE collection_id = ?1 AND (?2 IS NULL OR kind = ?2)
             ORDER BY created_at, rowid",
        )?;
        let mut groups = stmt
            .query_map(params![collection_id, kind.map(|k| k.as_str())], group_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        for group in &mut groups {
            group.members = self.load_members(&group.id)?;
        }
        Ok(groups)
    }

    pub fn find_group(&self, id: &Uuid) -> Result<Option<Group>, DatabaseError> {
        let group = self
            .conn
            .query_row(
                "SELECT id, kind, confidence, created_at FROM photo_groups WHERE id = ?1",
                params![id.to_string()],
                group_from_row,
            )
            .optional()?;

        match group {
            Some(mut group) => {
                group.members = self.load_members(&group.id)?;
                Ok(Some(group))
            }
            None => Ok(None),
        }
    }

    fn load_members(&self, group_id: &Uuid) -> Result<Vec<GroupMember>, DatabaseError> {
        let mut stmt = self.conn.prepare(
            "SELECT photo_id, rank, score FROM group_members WHERE group_id = ?1 ORDER BY rank",
        )?;
        let members = stmt
            .query_map(params![group_id.to_string()], |row| {
                let photo_id: String = row.get(0)?;
                Ok(GroupMember {
                    photo_id: PhotoId::parse(&photo_id).map_err(|e| conversion_error(0, e))?,
                    rank: row.get(1)?,
                    score: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(members)
    }
}
