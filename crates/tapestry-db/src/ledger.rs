use std::collections::HashMap;

use crate::chores::{query_chore, write_completion};
use crate::models::{ChoreRow, PointRow};
use crate::{Database, OptionalExt};
use anyhow::Result;
use chrono::Utc;
use rusqlite::{Connection, params};
use tapestry_core::leaderboard::{self, ChoreSummary, LedgerEntry, MemberProfile};
use tapestry_core::{
    AwardScope, Chore, ChoreLedger, CoreError, GroupUncomplete, Member, NewAward, PointValue,
    Transactional, toggle_completion,
};
use tapestry_types::api::{ChoreCompletionResponse, LeaderboardEntry};
use tapestry_types::models::AwardKind;
use tapestry_types::{ChoreId, FamilyId, PointId, UserId};
use tracing::info;

/// [`ChoreLedger`] over a connection that is inside an open transaction.
struct SqliteLedger<'a> {
    conn: &'a Connection,
}

impl ChoreLedger for SqliteLedger<'_> {
    fn load_chore(&mut self, id: ChoreId) -> Result<Option<Chore>> {
        Ok(query_chore(self.conn, id)?.map(|row| row.completion()))
    }

    fn load_member(&mut self, id: UserId) -> Result<Option<Member>> {
        self.conn
            .query_row("SELECT id, family_id FROM users WHERE id = ?1", [id.0], |row| {
                Ok(Member {
                    id: UserId(row.get(0)?),
                    family_id: row.get::<_, Option<i64>>(1)?.map(FamilyId),
                })
            })
            .optional()
    }

    fn has_award(&mut self, chore: ChoreId, user: UserId) -> Result<bool> {
        let exists = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM points WHERE chore_id = ?1 AND user_id = ?2)",
            [chore.0, user.0],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn insert_award(&mut self, award: &NewAward) -> Result<()> {
        insert_point(self.conn, award)?;
        Ok(())
    }

    fn delete_chore_awards(&mut self, chore: ChoreId, scope: AwardScope) -> Result<usize> {
        let sql = match scope {
            AwardScope::All => "DELETE FROM points WHERE chore_id = ?1",
            AwardScope::CompletionOnly => {
                "DELETE FROM points WHERE chore_id = ?1 AND kind = 'completion'"
            }
        };
        Ok(self.conn.execute(sql, [chore.0])?)
    }

    fn delete_user_award(&mut self, chore: ChoreId, user: UserId) -> Result<usize> {
        Ok(self.conn.execute(
            "DELETE FROM points WHERE chore_id = ?1 AND user_id = ?2",
            [chore.0, user.0],
        )?)
    }

    fn save_completion(&mut self, chore: &Chore) -> Result<()> {
        write_completion(
            self.conn,
            chore.id,
            chore.completed,
            chore.completed_by_ids.iter().copied(),
        )
    }
}

impl Transactional for Database {
    fn atomically<T, F>(&self, f: F) -> Result<T, CoreError>
    where
        F: FnOnce(&mut dyn ChoreLedger) -> Result<T, CoreError>,
    {
        self.transaction(|tx| {
            let mut ledger = SqliteLedger { conn: tx };
            f(&mut ledger)
        })
    }
}

impl Database {
    /// Toggle a chore's completion for `actor` and return the chore as stored
    /// afterwards.
    pub fn toggle_chore_completion(
        &self,
        chore: ChoreId,
        actor: UserId,
        policy: GroupUncomplete,
    ) -> Result<ChoreRow, CoreError> {
        let toggled = toggle_completion(self, chore, actor, policy)?;
        info!(
            chore = %chore,
            user = %actor,
            completed = toggled.completed,
            completed_by = toggled.completed_by_ids.len(),
            "Chore completion toggled"
        );
        self.get_chore(chore)?.ok_or(CoreError::NotFound("chore"))
    }

    /// Manual award. Callers check that the user and the chore belong to the
    /// same family.
    pub fn award_points(&self, user: UserId, chore: Option<ChoreId>, points: i64) -> Result<PointRow> {
        self.with_conn_mut(|conn| {
            let id = insert_point(
                conn,
                &NewAward {
                    user_id: user,
                    chore_id: chore,
                    points,
                    kind: AwardKind::Manual,
                    awarded_at: Utc::now(),
                },
            )?;
            let row = conn.query_row(
                "SELECT id, user_id, chore_id, points, kind, awarded_at FROM points WHERE id = ?1",
                [id.0],
                PointRow::from_row,
            )?;
            Ok(row)
        })
    }

    /// Every ledger entry of the family's members, newest first.
    pub fn list_points(&self, family: FamilyId) -> Result<Vec<PointRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT p.id, p.user_id, p.chore_id, p.points, p.kind, p.awarded_at
                 FROM points p JOIN users u ON u.id = p.user_id
                 WHERE u.family_id = ?1
                 ORDER BY p.awarded_at DESC, p.id DESC",
            )?;
            let rows = stmt
                .query_map([family.0], PointRow::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// Completion entries of a chore with the completing user, newest first.
    pub fn chore_completions(&self, chore: ChoreId) -> Result<Vec<ChoreCompletionResponse>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT p.id, p.user_id, u.name, u.icon_emoji, p.awarded_at, p.points
                 FROM points p JOIN users u ON u.id = p.user_id
                 WHERE p.chore_id = ?1 AND p.kind = 'completion'
                 ORDER BY p.awarded_at DESC, p.id DESC",
            )?;
            let rows = stmt
                .query_map([chore.0], |row| {
                    Ok(ChoreCompletionResponse {
                        id: PointId(row.get(0)?),
                        user_id: UserId(row.get(1)?),
                        user_name: row.get(2)?,
                        user_emoji: row.get(3)?,
                        completed_at: row.get(4)?,
                        points_awarded: row.get(5)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// Family leaderboard, recomputed from the ledger on every call.
    pub fn leaderboard(&self, family: FamilyId) -> Result<Vec<LeaderboardEntry>> {
        self.with_conn(|conn| {
            // One read snapshot for members, entries and chores.
            let tx = conn.unchecked_transaction()?;

            let members = {
                let mut stmt =
                    tx.prepare("SELECT id, name, icon_emoji FROM users WHERE family_id = ?1")?;
                let rows = stmt
                    .query_map([family.0], |row| {
                        Ok(MemberProfile {
                            id: UserId(row.get(0)?),
                            name: row.get(1)?,
                            icon_emoji: row.get(2)?,
                        })
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            };

            let entries = {
                let mut stmt = tx.prepare(
                    "SELECT p.user_id, p.chore_id, p.points, p.awarded_at
                     FROM points p JOIN users u ON u.id = p.user_id
                     WHERE u.family_id = ?1",
                )?;
                let rows = stmt
                    .query_map([family.0], |row| {
                        Ok(LedgerEntry {
                            user_id: UserId(row.get(0)?),
                            chore_id: row.get::<_, Option<i64>>(1)?.map(ChoreId),
                            points: row.get(2)?,
                            awarded_at: row.get(3)?,
                        })
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            };

            let chores = {
                let mut stmt = tx.prepare(
                    "SELECT c.id, c.title, c.emoji, c.point_value FROM chores c
                     WHERE c.id IN (
                         SELECT p.chore_id FROM points p JOIN users u ON u.id = p.user_id
                         WHERE u.family_id = ?1 AND p.chore_id IS NOT NULL
                     )",
                )?;
                let rows = stmt
                    .query_map([family.0], |row| {
                        Ok((
                            ChoreId(row.get(0)?),
                            row.get::<_, String>(1)?,
                            row.get::<_, Option<String>>(2)?,
                            row.get::<_, i64>(3)?,
                        ))
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                let mut chores = HashMap::with_capacity(rows.len());
                for (id, title, emoji, raw_points) in rows {
                    let point_value = PointValue::new(raw_points)?;
                    chores.insert(id, ChoreSummary { title, emoji, point_value });
                }
                chores
            };

            tx.commit()?;
            Ok(leaderboard::compute(&members, &entries, &chores))
        })
    }
}

fn insert_point(conn: &Connection, award: &NewAward) -> Result<PointId> {
    conn.execute(
        "INSERT INTO points (user_id, chore_id, points, kind, awarded_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            award.user_id.0,
            award.chore_id.map(|c| c.0),
            award.points,
            award.kind.as_str(),
            award.awarded_at,
        ],
    )?;
    Ok(PointId(conn.last_insert_rowid()))
}
