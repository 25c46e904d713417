use crate::models::{ChoreRow, days_to_mask};
use crate::{Database, OptionalExt};
use anyhow::{Result, anyhow};
use chrono::{NaiveDate, Utc};
use rusqlite::{Connection, params};
use tapestry_core::PointValue;
use tapestry_types::models::Recurrence;
use tapestry_types::{ChoreId, FamilyId, UserId};

/// A validated chore ready to insert.
pub struct NewChore {
    pub family_id: FamilyId,
    pub title: String,
    pub description: Option<String>,
    pub emoji: Option<String>,
    pub point_value: PointValue,
    pub assigned_to: Option<UserId>,
    pub assigned_to_ids: Vec<UserId>,
    pub is_group_chore: bool,
    pub week_start: NaiveDate,
    pub recurrence: Recurrence,
}

impl Database {
    pub fn create_chore(&self, chore: &NewChore) -> Result<ChoreRow> {
        self.transaction(|tx| {
            let r = &chore.recurrence;
            tx.execute(
                "INSERT INTO chores (family_id, title, description, emoji, point_value, assigned_to,
                        is_group_chore, completed, week_start, is_recurring, recurrence_type,
                        recurrence_interval, recurrence_count, recurrence_days, recurrence_time_of_day,
                        recurrence_end_date, parent_chore_id, max_completions, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
                params![
                    chore.family_id.0,
                    chore.title,
                    chore.description,
                    chore.emoji,
                    chore.point_value.points(),
                    chore.assigned_to.map(|u| u.0),
                    chore.is_group_chore,
                    chore.week_start,
                    r.is_recurring,
                    r.recurrence_type.map(|t| t.as_str()),
                    r.recurrence_interval,
                    r.recurrence_count,
                    days_to_mask(&r.recurrence_days),
                    r.recurrence_time_of_day.map(|t| t.as_str()),
                    r.recurrence_end_date,
                    r.parent_chore_id.map(|c| c.0),
                    r.max_completions,
                    Utc::now(),
                ],
            )?;
            let id = ChoreId(tx.last_insert_rowid());
            replace_assignees(tx, id, &chore.assigned_to_ids)?;
            query_chore(tx, id)?.ok_or_else(|| anyhow!("chore {id} vanished after insert"))
        })
    }

    pub fn get_chore(&self, id: ChoreId) -> Result<Option<ChoreRow>> {
        self.with_conn(|conn| query_chore(conn, id))
    }

    pub fn list_chores(&self, family: FamilyId) -> Result<Vec<ChoreRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM chores WHERE family_id = ?1 ORDER BY week_start DESC, id",
                ChoreRow::COLUMNS
            ))?;
            let mut chores = stmt
                .query_map([family.0], ChoreRow::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            for chore in &mut chores {
                load_sets(conn, chore)?;
            }
            Ok(chores)
        })
    }

    /// Load-modify-store of a chore's editable fields in one transaction.
    ///
    /// `completed_by_ids` is never written here. For individual chores
    /// `completed` is re-derived after `apply`, since a changed assignee set
    /// can finish or reopen the chore.
    pub fn update_chore<F, E>(&self, id: ChoreId, apply: F) -> std::result::Result<Option<ChoreRow>, E>
    where
        F: FnOnce(&mut ChoreRow) -> std::result::Result<(), E>,
        E: From<anyhow::Error>,
    {
        self.transaction(|tx| {
            let Some(mut chore) = query_chore(tx, id)? else {
                return Ok(None);
            };
            apply(&mut chore)?;
            if !chore.is_group_chore {
                chore.completed = chore.completion().individual_completion();
            }
            write_chore(tx, &chore)?;
            replace_assignees(tx, id, &chore.assigned_to_ids)?;
            Ok(Some(chore))
        })
    }

    /// Removes the chore along with its assignees, completion set and
    /// every ledger entry linked to it.
    pub fn delete_chore(&self, id: ChoreId) -> Result<bool> {
        self.with_conn_mut(|conn| Ok(conn.execute("DELETE FROM chores WHERE id = ?1", [id.0])? > 0))
    }
}

pub(crate) fn query_chore(conn: &Connection, id: ChoreId) -> Result<Option<ChoreRow>> {
    let chore = conn
        .query_row(
            &format!("SELECT {} FROM chores WHERE id = ?1", ChoreRow::COLUMNS),
            [id.0],
            ChoreRow::from_row,
        )
        .optional()?;
    match chore {
        Some(mut chore) => {
            load_sets(conn, &mut chore)?;
            Ok(Some(chore))
        }
        None => Ok(None),
    }
}

fn load_sets(conn: &Connection, chore: &mut ChoreRow) -> Result<()> {
    chore.assigned_to_ids = user_ids(conn, "chore_assignees", chore.id)?;
    chore.completed_by_ids = user_ids(conn, "chore_completed_by", chore.id)?;
    Ok(())
}

fn user_ids(conn: &Connection, table: &str, chore: ChoreId) -> Result<Vec<UserId>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT user_id FROM {table} WHERE chore_id = ?1 ORDER BY user_id"
    ))?;
    let ids = stmt
        .query_map([chore.0], |row| row.get::<_, i64>(0).map(UserId))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(ids)
}

fn write_chore(conn: &Connection, chore: &ChoreRow) -> Result<()> {
    let r = &chore.recurrence;
    conn.execute(
        "UPDATE chores SET title = ?1, description = ?2, emoji = ?3, point_value = ?4,
                assigned_to = ?5, is_group_chore = ?6, completed = ?7, week_start = ?8,
                is_recurring = ?9, recurrence_type = ?10, recurrence_interval = ?11,
                recurrence_count = ?12, recurrence_days = ?13, recurrence_time_of_day = ?14,
                recurrence_end_date = ?15, parent_chore_id = ?16, max_completions = ?17
         WHERE id = ?18",
        params![
            chore.title,
            chore.description,
            chore.emoji,
            chore.point_value.points(),
            chore.assigned_to.map(|u| u.0),
            chore.is_group_chore,
            chore.completed,
            chore.week_start,
            r.is_recurring,
            r.recurrence_type.map(|t| t.as_str()),
            r.recurrence_interval,
            r.recurrence_count,
            days_to_mask(&r.recurrence_days),
            r.recurrence_time_of_day.map(|t| t.as_str()),
            r.recurrence_end_date,
            r.parent_chore_id.map(|c| c.0),
            r.max_completions,
            chore.id.0,
        ],
    )?;
    Ok(())
}

fn replace_assignees(conn: &Connection, chore: ChoreId, users: &[UserId]) -> Result<()> {
    conn.execute("DELETE FROM chore_assignees WHERE chore_id = ?1", [chore.0])?;
    let mut stmt =
        conn.prepare("INSERT OR IGNORE INTO chore_assignees (chore_id, user_id) VALUES (?1, ?2)")?;
    for user in users {
        stmt.execute([chore.0, user.0])?;
    }
    Ok(())
}

/// Rewrites the shared flag and the per-user completion set.
pub(crate) fn write_completion(
    conn: &Connection,
    chore: ChoreId,
    completed: bool,
    completed_by: impl IntoIterator<Item = UserId>,
) -> Result<()> {
    conn.execute(
        "UPDATE chores SET completed = ?1 WHERE id = ?2",
        params![completed, chore.0],
    )?;
    conn.execute("DELETE FROM chore_completed_by WHERE chore_id = ?1", [chore.0])?;
    let mut stmt =
        conn.prepare("INSERT INTO chore_completed_by (chore_id, user_id) VALUES (?1, ?2)")?;
    for user in completed_by {
        stmt.execute([chore.0, user.0])?;
    }
    Ok(())
}

/// Individual chores `user` is assigned to, directly or through the legacy
/// column, or has completed.
pub(crate) fn individual_chores_of(conn: &Connection, user: UserId) -> Result<Vec<ChoreId>> {
    let mut stmt = conn.prepare(
        "SELECT id FROM chores
         WHERE is_group_chore = 0
           AND (assigned_to = ?1
                OR id IN (SELECT chore_id FROM chore_assignees WHERE user_id = ?1)
                OR id IN (SELECT chore_id FROM chore_completed_by WHERE user_id = ?1))
         ORDER BY id",
    )?;
    let ids = stmt
        .query_map([user.0], |row| row.get::<_, i64>(0).map(ChoreId))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(ids)
}

/// Recomputes `completed` of an individual chore from its stored sets.
pub(crate) fn rederive_completion(conn: &Connection, id: ChoreId) -> Result<()> {
    if let Some(chore) = query_chore(conn, id)? {
        conn.execute(
            "UPDATE chores SET completed = ?1 WHERE id = ?2",
            params![chore.completion().individual_completion(), id.0],
        )?;
    }
    Ok(())
}
