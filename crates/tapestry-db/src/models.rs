//! Database row types. They map directly to SQLite rows and convert into the
//! API shapes in `tapestry-types`, keeping the DB layer independent of HTTP.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Row;
use rusqlite::types::Type;
use tapestry_core::{Chore, PointValue};
use tapestry_types::api::{
    ChoreResponse, EventResponse, FamilyResponse, GoalResponse, PointResponse, UserResponse,
};
use tapestry_types::models::{AwardKind, EventSource, Recurrence, Role};
use tapestry_types::{ChoreId, EventId, FamilyId, GoalId, PointId, UserId};

/// Parse a TEXT column into one of the string enums.
fn text<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn opt_text<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match row.get::<_, Option<String>>(idx)? {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))),
        None => Ok(None),
    }
}

/// Weekdays 0-6 packed into the low seven bits.
pub fn days_to_mask(days: &[u8]) -> i64 {
    days.iter().filter(|d| **d < 7).fold(0i64, |mask, &d| mask | (1i64 << d))
}

pub fn mask_to_days(mask: i64) -> Vec<u8> {
    (0u8..7).filter(|&d| mask & (1i64 << d) != 0).collect()
}

// -- Users --

pub struct UserRow {
    pub id: UserId,
    pub family_id: Option<FamilyId>,
    pub name: String,
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub role: Role,
    pub profile_image_url: Option<String>,
    pub icon_emoji: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl UserRow {
    pub(crate) const COLUMNS: &'static str =
        "id, family_id, name, email, password_hash, role, profile_image_url, icon_emoji, created_at";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: UserId(row.get(0)?),
            family_id: row.get::<_, Option<i64>>(1)?.map(FamilyId),
            name: row.get(2)?,
            email: row.get(3)?,
            password_hash: row.get(4)?,
            role: text(row, 5)?,
            profile_image_url: row.get(6)?,
            icon_emoji: row.get(7)?,
            created_at: row.get(8)?,
        })
    }

    pub fn into_response(self) -> UserResponse {
        UserResponse {
            id: self.id,
            family_id: self.family_id,
            name: self.name,
            email: self.email,
            role: self.role,
            profile_image_url: self.profile_image_url,
            icon_emoji: self.icon_emoji,
            created_at: self.created_at,
        }
    }
}

pub struct NewUser<'a> {
    pub family_id: Option<FamilyId>,
    pub name: &'a str,
    pub email: Option<&'a str>,
    pub password_hash: Option<&'a str>,
    pub role: Role,
    pub profile_image_url: Option<&'a str>,
    pub icon_emoji: Option<&'a str>,
}

// -- Families --

pub struct FamilyRow {
    pub id: FamilyId,
    pub name: String,
    pub admin_password_hash: String,
    pub created_at: DateTime<Utc>,
}

impl FamilyRow {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: FamilyId(row.get(0)?),
            name: row.get(1)?,
            admin_password_hash: row.get(2)?,
            created_at: row.get(3)?,
        })
    }

    pub fn into_response(self) -> FamilyResponse {
        FamilyResponse { id: self.id, name: self.name, created_at: self.created_at }
    }
}

// -- Events --

pub struct EventRow {
    pub id: EventId,
    pub family_id: FamilyId,
    pub title: String,
    pub description: Option<String>,
    pub emoji: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub source: Option<EventSource>,
    pub source_id: Option<String>,
    pub participant_ids: Vec<UserId>,
    pub created_at: DateTime<Utc>,
}

impl EventRow {
    pub(crate) const COLUMNS: &'static str =
        "id, family_id, title, description, emoji, start_time, end_time, source, source_id, created_at";

    /// Participants are loaded separately.
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: EventId(row.get(0)?),
            family_id: FamilyId(row.get(1)?),
            title: row.get(2)?,
            description: row.get(3)?,
            emoji: row.get(4)?,
            start_time: row.get(5)?,
            end_time: row.get(6)?,
            source: opt_text(row, 7)?,
            source_id: row.get(8)?,
            participant_ids: Vec::new(),
            created_at: row.get(9)?,
        })
    }

    pub fn into_response(self) -> EventResponse {
        EventResponse {
            id: self.id,
            family_id: self.family_id,
            title: self.title,
            description: self.description,
            emoji: self.emoji,
            start_time: self.start_time,
            end_time: self.end_time,
            source: self.source,
            source_id: self.source_id,
            participant_ids: self.participant_ids,
            created_at: self.created_at,
        }
    }
}

// -- Chores --

#[derive(Debug)]
pub struct ChoreRow {
    pub id: ChoreId,
    pub family_id: FamilyId,
    pub title: String,
    pub description: Option<String>,
    pub emoji: Option<String>,
    pub point_value: PointValue,
    pub assigned_to: Option<UserId>,
    pub assigned_to_ids: Vec<UserId>,
    pub is_group_chore: bool,
    pub completed: bool,
    pub completed_by_ids: Vec<UserId>,
    pub week_start: NaiveDate,
    pub recurrence: Recurrence,
    pub created_at: DateTime<Utc>,
}

impl ChoreRow {
    pub(crate) const COLUMNS: &'static str = "id, family_id, title, description, emoji, point_value, \
         assigned_to, is_group_chore, completed, week_start, is_recurring, recurrence_type, \
         recurrence_interval, recurrence_count, recurrence_days, recurrence_time_of_day, \
         recurrence_end_date, parent_chore_id, max_completions, created_at";

    /// Assignee and completion sets are loaded separately.
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let raw_points: i64 = row.get(5)?;
        let point_value = PointValue::new(raw_points)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Integer, Box::new(e)))?;

        Ok(Self {
            id: ChoreId(row.get(0)?),
            family_id: FamilyId(row.get(1)?),
            title: row.get(2)?,
            description: row.get(3)?,
            emoji: row.get(4)?,
            point_value,
            assigned_to: row.get::<_, Option<i64>>(6)?.map(UserId),
            assigned_to_ids: Vec::new(),
            is_group_chore: row.get(7)?,
            completed: row.get(8)?,
            completed_by_ids: Vec::new(),
            week_start: row.get(9)?,
            recurrence: Recurrence {
                is_recurring: row.get(10)?,
                recurrence_type: opt_text(row, 11)?,
                recurrence_interval: row.get(12)?,
                recurrence_count: row.get(13)?,
                recurrence_days: mask_to_days(row.get(14)?),
                recurrence_time_of_day: opt_text(row, 15)?,
                recurrence_end_date: row.get(16)?,
                parent_chore_id: row.get::<_, Option<i64>>(17)?.map(ChoreId),
                max_completions: row.get(18)?,
            },
            created_at: row.get(19)?,
        })
    }

    /// The completion-relevant view used by the state machine.
    pub fn completion(&self) -> Chore {
        Chore {
            id: self.id,
            family_id: self.family_id,
            point_value: self.point_value,
            is_group_chore: self.is_group_chore,
            assigned_to: self.assigned_to,
            assignee_ids: self.assigned_to_ids.iter().copied().collect(),
            completed: self.completed,
            completed_by_ids: self.completed_by_ids.iter().copied().collect(),
        }
    }

    pub fn into_response(self) -> ChoreResponse {
        ChoreResponse {
            id: self.id,
            family_id: self.family_id,
            title: self.title,
            description: self.description,
            emoji: self.emoji,
            point_value: self.point_value.get(),
            assigned_to: self.assigned_to,
            assigned_to_ids: self.assigned_to_ids,
            is_group_chore: self.is_group_chore,
            completed: self.completed,
            completed_by_ids: self.completed_by_ids,
            week_start: self.week_start,
            recurrence: self.recurrence,
            created_at: self.created_at,
        }
    }
}

// -- Points --

pub struct PointRow {
    pub id: PointId,
    pub user_id: UserId,
    pub chore_id: Option<ChoreId>,
    pub points: i64,
    pub kind: AwardKind,
    pub awarded_at: DateTime<Utc>,
}

impl PointRow {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: PointId(row.get(0)?),
            user_id: UserId(row.get(1)?),
            chore_id: row.get::<_, Option<i64>>(2)?.map(ChoreId),
            points: row.get(3)?,
            kind: text(row, 4)?,
            awarded_at: row.get(5)?,
        })
    }

    pub fn into_response(self) -> PointResponse {
        PointResponse {
            id: self.id,
            user_id: self.user_id,
            chore_id: self.chore_id,
            points: self.points,
            kind: self.kind,
            awarded_at: self.awarded_at,
        }
    }
}

// -- Goals --

pub struct GoalRow {
    pub id: GoalId,
    pub family_id: FamilyId,
    pub name: String,
    pub description: Option<String>,
    pub point_requirement: Option<i64>,
    pub prize: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl GoalRow {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: GoalId(row.get(0)?),
            family_id: FamilyId(row.get(1)?),
            name: row.get(2)?,
            description: row.get(3)?,
            point_requirement: row.get(4)?,
            prize: row.get(5)?,
            created_at: row.get(6)?,
        })
    }

    pub fn into_response(self) -> GoalResponse {
        GoalResponse {
            id: self.id,
            family_id: self.family_id,
            name: self.name,
            description: self.description,
            point_requirement: self.point_requirement,
            prize: self.prize,
            created_at: self.created_at,
        }
    }
}

// -- Login tokens --

pub struct QrSessionRow {
    pub session_token: String,
    pub user_id: Option<UserId>,
    pub expires_at: DateTime<Utc>,
    pub scanned: bool,
}
