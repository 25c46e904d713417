use crate::chores::{individual_chores_of, rederive_completion};
use crate::models::{EventRow, FamilyRow, GoalRow, NewUser, UserRow};
use crate::{Database, OptionalExt};
use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use std::collections::BTreeSet;
use tapestry_types::api::{CreateEventRequest, CreateGoalRequest};
use tapestry_types::{EventId, FamilyId, GoalId, UserId};

impl Database {
    // -- Users --

    pub fn create_user(&self, user: &NewUser<'_>) -> Result<UserRow> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (family_id, name, email, password_hash, role, profile_image_url, icon_emoji, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    user.family_id.map(|f| f.0),
                    user.name,
                    user.email,
                    user.password_hash,
                    user.role.as_str(),
                    user.profile_image_url,
                    user.icon_emoji,
                    Utc::now(),
                ],
            )?;
            let id = UserId(conn.last_insert_rowid());
            query_user_by_id(conn, id)?.ok_or_else(|| anyhow::anyhow!("user {id} vanished after insert"))
        })
    }

    pub fn get_user_by_id(&self, id: UserId) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_id(conn, id))
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {} FROM users WHERE email = ?1", UserRow::COLUMNS),
                [email],
                UserRow::from_row,
            )
            .optional()
        })
    }

    pub fn list_family_members(&self, family: FamilyId) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM users WHERE family_id = ?1 ORDER BY id",
                UserRow::COLUMNS
            ))?;
            let rows = stmt
                .query_map([family.0], UserRow::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// Ids of every user in `family`.
    pub fn family_member_ids(&self, family: FamilyId) -> Result<BTreeSet<UserId>> {
        self.with_conn(|conn| query_family_member_ids(conn, family))
    }

    /// Load-modify-store of a user inside one transaction. `apply` may reject
    /// the change by returning an error, in which case nothing is written.
    pub fn update_user<F, E>(&self, id: UserId, apply: F) -> std::result::Result<Option<UserRow>, E>
    where
        F: FnOnce(&mut UserRow) -> std::result::Result<(), E>,
        E: From<anyhow::Error>,
    {
        self.transaction(|tx| {
            let Some(mut user) = query_user_by_id(tx, id)? else {
                return Ok(None);
            };
            apply(&mut user)?;
            tx.execute(
                "UPDATE users SET name = ?1, profile_image_url = ?2, icon_emoji = ?3 WHERE id = ?4",
                params![user.name, user.profile_image_url, user.icon_emoji, id.0],
            )
            .map_err(anyhow::Error::from)?;
            Ok(Some(user))
        })
    }

    /// Removes a user and their ledger entries. Individual chores they were
    /// assigned to or had completed get `completed` re-derived from what is
    /// left, in the same transaction.
    pub fn delete_user(&self, id: UserId) -> Result<bool> {
        self.transaction(|tx| {
            let touched = individual_chores_of(tx, id)?;
            if tx.execute("DELETE FROM users WHERE id = ?1", [id.0])? == 0 {
                return Ok(false);
            }
            for chore in touched {
                rederive_completion(tx, chore)?;
            }
            Ok(true)
        })
    }

    // -- Families --

    /// Creates a family and moves `creator` into it, atomically.
    pub fn create_family(
        &self,
        creator: UserId,
        name: &str,
        admin_password_hash: &str,
    ) -> Result<FamilyRow> {
        self.transaction(|tx| {
            tx.execute(
                "INSERT INTO families (name, admin_password_hash, created_at) VALUES (?1, ?2, ?3)",
                params![name, admin_password_hash, Utc::now()],
            )?;
            let id = FamilyId(tx.last_insert_rowid());
            tx.execute(
                "UPDATE users SET family_id = ?1 WHERE id = ?2",
                params![id.0, creator.0],
            )?;
            query_family(tx, id)?.ok_or_else(|| anyhow::anyhow!("family {id} vanished after insert"))
        })
    }

    pub fn get_family(&self, id: FamilyId) -> Result<Option<FamilyRow>> {
        self.with_conn(|conn| query_family(conn, id))
    }

    pub fn update_family<F, E>(&self, id: FamilyId, apply: F) -> std::result::Result<Option<FamilyRow>, E>
    where
        F: FnOnce(&mut FamilyRow) -> std::result::Result<(), E>,
        E: From<anyhow::Error>,
    {
        self.transaction(|tx| {
            let Some(mut family) = query_family(tx, id)? else {
                return Ok(None);
            };
            apply(&mut family)?;
            tx.execute(
                "UPDATE families SET name = ?1, admin_password_hash = ?2 WHERE id = ?3",
                params![family.name, family.admin_password_hash, id.0],
            )
            .map_err(anyhow::Error::from)?;
            Ok(Some(family))
        })
    }

    /// Members, events, chores, goals and the members' points go with it.
    pub fn delete_family(&self, id: FamilyId) -> Result<bool> {
        self.with_conn_mut(|conn| Ok(conn.execute("DELETE FROM families WHERE id = ?1", [id.0])? > 0))
    }

    // -- Calendar events --

    /// Events of `family` that intersect `[start, end)`.
    pub fn list_events(
        &self,
        family: FamilyId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<EventRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM events
                 WHERE family_id = ?1 AND start_time < ?2 AND end_time > ?3
                 ORDER BY start_time, id",
                EventRow::COLUMNS
            ))?;
            let mut events = stmt
                .query_map(params![family.0, end, start], EventRow::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            for event in &mut events {
                event.participant_ids = query_participants(conn, event.id)?;
            }
            Ok(events)
        })
    }

    pub fn create_event(&self, family: FamilyId, event: &CreateEventRequest) -> Result<EventRow> {
        self.transaction(|tx| {
            tx.execute(
                "INSERT INTO events (family_id, title, description, emoji, start_time, end_time, source, source_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    family.0,
                    event.title,
                    event.description,
                    event.emoji,
                    event.start_time,
                    event.end_time,
                    event.source.map(|s| s.as_str()),
                    event.source_id,
                    Utc::now(),
                ],
            )?;
            let id = EventId(tx.last_insert_rowid());
            replace_participants(tx, id, &event.participant_ids)?;
            query_event(tx, id)?.ok_or_else(|| anyhow::anyhow!("event {id} vanished after insert"))
        })
    }

    pub fn get_event(&self, id: EventId) -> Result<Option<EventRow>> {
        self.with_conn(|conn| query_event(conn, id))
    }

    pub fn update_event<F, E>(&self, id: EventId, apply: F) -> std::result::Result<Option<EventRow>, E>
    where
        F: FnOnce(&mut EventRow) -> std::result::Result<(), E>,
        E: From<anyhow::Error>,
    {
        self.transaction(|tx| {
            let Some(mut event) = query_event(tx, id)? else {
                return Ok(None);
            };
            apply(&mut event)?;
            tx.execute(
                "UPDATE events SET title = ?1, description = ?2, emoji = ?3, start_time = ?4,
                        end_time = ?5, source = ?6, source_id = ?7
                 WHERE id = ?8",
                params![
                    event.title,
                    event.description,
                    event.emoji,
                    event.start_time,
                    event.end_time,
                    event.source.map(|s| s.as_str()),
                    event.source_id,
                    id.0,
                ],
            )
            .map_err(anyhow::Error::from)?;
            replace_participants(tx, id, &event.participant_ids)?;
            Ok(Some(event))
        })
    }

    pub fn delete_event(&self, id: EventId) -> Result<bool> {
        self.with_conn_mut(|conn| Ok(conn.execute("DELETE FROM events WHERE id = ?1", [id.0])? > 0))
    }

    // -- Goals --

    pub fn create_goal(&self, family: FamilyId, goal: &CreateGoalRequest) -> Result<GoalRow> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO goals (family_id, name, description, point_requirement, prize, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    family.0,
                    goal.name,
                    goal.description,
                    goal.point_requirement,
                    goal.prize,
                    Utc::now(),
                ],
            )?;
            let id = GoalId(conn.last_insert_rowid());
            query_goal(conn, id)?.ok_or_else(|| anyhow::anyhow!("goal {id} vanished after insert"))
        })
    }

    pub fn list_goals(&self, family: FamilyId) -> Result<Vec<GoalRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, family_id, name, description, point_requirement, prize, created_at
                 FROM goals WHERE family_id = ?1 ORDER BY id",
            )?;
            let rows = stmt
                .query_map([family.0], GoalRow::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    pub fn get_goal(&self, id: GoalId) -> Result<Option<GoalRow>> {
        self.with_conn(|conn| query_goal(conn, id))
    }

    pub fn update_goal<F, E>(&self, id: GoalId, apply: F) -> std::result::Result<Option<GoalRow>, E>
    where
        F: FnOnce(&mut GoalRow) -> std::result::Result<(), E>,
        E: From<anyhow::Error>,
    {
        self.transaction(|tx| {
            let Some(mut goal) = query_goal(tx, id)? else {
                return Ok(None);
            };
            apply(&mut goal)?;
            tx.execute(
                "UPDATE goals SET name = ?1, description = ?2, point_requirement = ?3, prize = ?4
                 WHERE id = ?5",
                params![goal.name, goal.description, goal.point_requirement, goal.prize, id.0],
            )
            .map_err(anyhow::Error::from)?;
            Ok(Some(goal))
        })
    }

    pub fn delete_goal(&self, id: GoalId) -> Result<bool> {
        self.with_conn_mut(|conn| Ok(conn.execute("DELETE FROM goals WHERE id = ?1", [id.0])? > 0))
    }
}

// -- Standalone query functions (take &Connection directly) --

pub(crate) fn query_user_by_id(conn: &Connection, id: UserId) -> Result<Option<UserRow>> {
    conn.query_row(
        &format!("SELECT {} FROM users WHERE id = ?1", UserRow::COLUMNS),
        [id.0],
        UserRow::from_row,
    )
    .optional()
}

pub(crate) fn query_family_member_ids(conn: &Connection, family: FamilyId) -> Result<BTreeSet<UserId>> {
    let mut stmt = conn.prepare("SELECT id FROM users WHERE family_id = ?1")?;
    let ids = stmt
        .query_map([family.0], |row| row.get::<_, i64>(0).map(UserId))?
        .collect::<rusqlite::Result<BTreeSet<_>>>()?;
    Ok(ids)
}

fn query_family(conn: &Connection, id: FamilyId) -> Result<Option<FamilyRow>> {
    conn.query_row(
        "SELECT id, name, admin_password_hash, created_at FROM families WHERE id = ?1",
        [id.0],
        FamilyRow::from_row,
    )
    .optional()
}

fn query_event(conn: &Connection, id: EventId) -> Result<Option<EventRow>> {
    let event = conn
        .query_row(
            &format!("SELECT {} FROM events WHERE id = ?1", EventRow::COLUMNS),
            [id.0],
            EventRow::from_row,
        )
        .optional()?;
    match event {
        Some(mut event) => {
            event.participant_ids = query_participants(conn, id)?;
            Ok(Some(event))
        }
        None => Ok(None),
    }
}

fn query_participants(conn: &Connection, event: EventId) -> Result<Vec<UserId>> {
    let mut stmt =
        conn.prepare("SELECT user_id FROM event_participants WHERE event_id = ?1 ORDER BY user_id")?;
    let ids = stmt
        .query_map([event.0], |row| row.get::<_, i64>(0).map(UserId))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(ids)
}

fn replace_participants(conn: &Connection, event: EventId, users: &[UserId]) -> Result<()> {
    conn.execute("DELETE FROM event_participants WHERE event_id = ?1", [event.0])?;
    let mut stmt = conn.prepare(
        "INSERT OR IGNORE INTO event_participants (event_id, user_id) VALUES (?1, ?2)",
    )?;
    for user in users {
        stmt.execute([event.0, user.0])?;
    }
    Ok(())
}

fn query_goal(conn: &Connection, id: GoalId) -> Result<Option<GoalRow>> {
    conn.query_row(
        "SELECT id, family_id, name, description, point_requirement, prize, created_at
         FROM goals WHERE id = ?1",
        [id.0],
        GoalRow::from_row,
    )
    .optional()
}
