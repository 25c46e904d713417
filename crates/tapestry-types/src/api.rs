use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::models::{AwardKind, EventSource, Recurrence, Role};
use crate::{ChoreId, EventId, FamilyId, GoalId, PointId, UserId};

/// Distinguishes `Some(None)` (field sent as `null`) from `None` (field absent)
/// in partial updates.
fn nullable<'de, D, T>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(de).map(Some)
}

// -- JWT Claims --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    /// `sub` is a user id.
    User,
    /// `sub` is a family id; issued by the family admin login.
    Family,
}

/// JWT claims shared by token issuing (auth handlers) and verification
/// (the `require_auth` middleware).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub kind: TokenKind,
    pub iat: usize,
    pub exp: usize,
}

// -- Common --

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

// -- Auth --

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
}

impl TokenResponse {
    pub fn bearer(access_token: String) -> Self {
        Self { access_token, token_type: "bearer".into() }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignupRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default = "default_role")]
    pub role: Role,
}

fn default_role() -> Role {
    Role::Parent
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AdminLoginRequest {
    pub family_id: FamilyId,
    pub admin_password: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ForgotPasswordResponse {
    pub message: String,
    /// Only populated in development, where there is no mail transport.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QrSessionResponse {
    pub session_token: String,
    pub expires_at: DateTime<Utc>,
    /// Payload to encode in the QR image, e.g. `tapestry://login?token=...`.
    pub qr_code_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QrScanRequest {
    pub session_token: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QrStatus {
    Pending,
    Scanned,
    Expired,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QrStatusResponse {
    pub status: QrStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
}

// -- Users --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: UserId,
    pub family_id: Option<FamilyId>,
    pub name: String,
    pub email: Option<String>,
    pub role: Role,
    pub profile_image_url: Option<String>,
    pub icon_emoji: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Adds a member to the caller's family. Children may have neither an email
/// nor a password.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateMemberRequest {
    pub name: String,
    pub email: Option<String>,
    pub password: Option<String>,
    pub role: Role,
    pub profile_image_url: Option<String>,
    pub icon_emoji: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub profile_image_url: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub icon_emoji: Option<Option<String>>,
}

// -- Families --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateFamilyRequest {
    pub name: String,
    pub admin_password: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateFamilyRequest {
    pub name: Option<String>,
    pub admin_password: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InviteRequest {
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FamilyResponse {
    pub id: FamilyId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

// -- Calendar events --

#[derive(Debug, Deserialize)]
pub struct WeekQuery {
    pub week_start: DateTime<Utc>,
    /// Defaults to `week_start` + 7 days.
    pub week_end: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateEventRequest {
    pub title: String,
    pub description: Option<String>,
    pub emoji: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub source: Option<EventSource>,
    pub source_id: Option<String>,
    #[serde(default)]
    pub participant_ids: Vec<UserId>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateEventRequest {
    pub title: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub emoji: Option<Option<String>>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "nullable")]
    pub source: Option<Option<EventSource>>,
    #[serde(default, deserialize_with = "nullable")]
    pub source_id: Option<Option<String>>,
    pub participant_ids: Option<Vec<UserId>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventResponse {
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

// -- Chores --

#[derive(Debug, Deserialize)]
pub struct CreateChoreRequest {
    /// Must match the caller's family when present.
    pub family_id: Option<FamilyId>,
    pub title: String,
    pub description: Option<String>,
    pub emoji: Option<String>,
    pub point_value: i64,
    /// Legacy single assignee; used only when `assigned_to_ids` is empty.
    pub assigned_to: Option<UserId>,
    #[serde(default)]
    pub assigned_to_ids: Vec<UserId>,
    #[serde(default = "default_group_chore")]
    pub is_group_chore: bool,
    pub week_start: NaiveDate,
    #[serde(flatten)]
    pub recurrence: Recurrence,
}

fn default_group_chore() -> bool {
    true
}

/// Partial chore edit. Completion state is not editable here; it only changes
/// through the completion toggle so the ledger stays consistent.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateChoreRequest {
    pub title: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub emoji: Option<Option<String>>,
    pub point_value: Option<i64>,
    #[serde(default, deserialize_with = "nullable")]
    pub assigned_to: Option<Option<UserId>>,
    pub assigned_to_ids: Option<Vec<UserId>>,
    pub is_group_chore: Option<bool>,
    pub week_start: Option<NaiveDate>,
    /// Replaces the whole recurrence block when present.
    pub recurrence: Option<Recurrence>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChoreResponse {
    pub id: ChoreId,
    pub family_id: FamilyId,
    pub title: String,
    pub description: Option<String>,
    pub emoji: Option<String>,
    pub point_value: u8,
    pub assigned_to: Option<UserId>,
    pub assigned_to_ids: Vec<UserId>,
    pub is_group_chore: bool,
    pub completed: bool,
    pub completed_by_ids: Vec<UserId>,
    pub week_start: NaiveDate,
    #[serde(flatten)]
    pub recurrence: Recurrence,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChoreCompletionResponse {
    pub id: PointId,
    pub user_id: UserId,
    pub user_name: String,
    pub user_emoji: Option<String>,
    pub completed_at: DateTime<Utc>,
    pub points_awarded: i64,
}

// -- Points --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AwardPointsRequest {
    pub user_id: UserId,
    pub chore_id: Option<ChoreId>,
    pub points: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointResponse {
    pub id: PointId,
    pub user_id: UserId,
    pub chore_id: Option<ChoreId>,
    pub points: i64,
    pub kind: AwardKind,
    pub awarded_at: DateTime<Utc>,
}

// -- Leaderboard --

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedChore {
    /// Id of the chore the award belongs to.
    pub id: ChoreId,
    pub title: String,
    pub emoji: Option<String>,
    pub point_value: u8,
    pub awarded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub user_id: UserId,
    pub name: String,
    pub icon_emoji: Option<String>,
    pub total_points: i64,
    pub completed_chores: Vec<CompletedChore>,
}

// -- Goals --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateGoalRequest {
    pub name: String,
    pub description: Option<String>,
    pub point_requirement: Option<i64>,
    pub prize: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateGoalRequest {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub point_requirement: Option<Option<i64>>,
    #[serde(default, deserialize_with = "nullable")]
    pub prize: Option<Option<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoalResponse {
    pub id: GoalId,
    pub family_id: FamilyId,
    pub name: String,
    pub description: Option<String>,
    pub point_requirement: Option<i64>,
    pub prize: Option<String>,
    pub created_at: DateTime<Utc>,
}
