use std::collections::BTreeSet;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;

use tapestry_core::PointValue;
use tapestry_db::chores::NewChore;
use tapestry_types::api::{
    ChoreCompletionResponse, ChoreResponse, CreateChoreRequest, UpdateChoreRequest,
};
use tapestry_types::models::Recurrence;
use tapestry_types::{ChoreId, UserId};

use crate::middleware::Principal;
use crate::{ApiError, AppState, blocking};

/// Deduplicated, ordered assignee list; every id must be a family member.
fn checked_assignees(members: &BTreeSet<UserId>, ids: &[UserId]) -> Result<Vec<UserId>, ApiError> {
    let unique: BTreeSet<UserId> = ids.iter().copied().collect();
    if let Some(outsider) = unique.difference(members).next() {
        return Err(ApiError::bad_request(format!(
            "user {outsider} is not a member of this family"
        )));
    }
    Ok(unique.into_iter().collect())
}

fn checked_title(title: &str) -> Result<String, ApiError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(ApiError::bad_request("title must not be empty"));
    }
    Ok(title.to_string())
}

/// Weekdays are stored as a seven-bit mask, so only 0..=6 can be kept.
fn checked_recurrence(recurrence: &Recurrence) -> Result<(), ApiError> {
    if let Some(day) = recurrence.recurrence_days.iter().find(|d| **d > 6) {
        return Err(ApiError::bad_request(format!(
            "recurrence day {day} is out of range 0..=6"
        )));
    }
    Ok(())
}

pub async fn list_chores(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<Vec<ChoreResponse>>, ApiError> {
    let family = principal.family()?;
    let chores = blocking(&state, move |db| Ok(db.list_chores(family)?)).await?;
    Ok(Json(chores.into_iter().map(|c| c.into_response()).collect()))
}

pub async fn create_chore(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<CreateChoreRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let family = principal.family()?;
    if let Some(requested) = req.family_id {
        principal.ensure_family(requested)?;
    }
    let title = checked_title(&req.title)?;
    let point_value = PointValue::new(req.point_value)?;
    checked_recurrence(&req.recurrence)?;

    let chore = blocking(&state, move |db| {
        let members = db.family_member_ids(family)?;
        let assigned_to_ids = checked_assignees(&members, &req.assigned_to_ids)?;
        if let Some(legacy) = req.assigned_to {
            checked_assignees(&members, &[legacy])?;
        }
        Ok(db.create_chore(&NewChore {
            family_id: family,
            title,
            description: req.description,
            emoji: req.emoji,
            point_value,
            assigned_to: req.assigned_to,
            assigned_to_ids,
            is_group_chore: req.is_group_chore,
            week_start: req.week_start,
            recurrence: req.recurrence,
        })?)
    })
    .await?;

    info!(family = %family, chore = %chore.id, points = chore.point_value.get(), "Chore created");
    Ok((StatusCode::CREATED, Json(chore.into_response())))
}

pub async fn update_chore(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<ChoreId>,
    Json(req): Json<UpdateChoreRequest>,
) -> Result<Json<ChoreResponse>, ApiError> {
    let family = principal.family()?;
    if let Some(recurrence) = &req.recurrence {
        checked_recurrence(recurrence)?;
    }

    let chore = blocking(&state, move |db| {
        let members = db.family_member_ids(family)?;
        db.update_chore(id, |chore| {
            principal.ensure_family(chore.family_id)?;
            let assignees_before = chore.completion().assignees();
            if let Some(title) = req.title {
                chore.title = checked_title(&title)?;
            }
            if let Some(description) = req.description {
                chore.description = description;
            }
            if let Some(emoji) = req.emoji {
                chore.emoji = emoji;
            }
            if let Some(points) = req.point_value {
                chore.point_value = PointValue::new(points)?;
            }
            if let Some(group) = req.is_group_chore {
                if group != chore.is_group_chore && chore.completion().has_progress() {
                    return Err(ApiError::Conflict(
                        "cannot change chore type while it has completions".into(),
                    ));
                }
                chore.is_group_chore = group;
            }
            if let Some(legacy) = req.assigned_to {
                if let Some(user) = legacy {
                    checked_assignees(&members, &[user])?;
                }
                chore.assigned_to = legacy;
            }
            if let Some(ids) = req.assigned_to_ids {
                chore.assigned_to_ids = checked_assignees(&members, &ids)?;
            }
            if let Some(week_start) = req.week_start {
                chore.week_start = week_start;
            }
            if let Some(recurrence) = req.recurrence {
                chore.recurrence = recurrence;
            }
            // Group awards were granted to the assignees at completion time.
            let after = chore.completion();
            if after.is_group_chore
                && after.has_progress()
                && after.assignees() != assignees_before
            {
                return Err(ApiError::Conflict(
                    "cannot change assignees of a completed group chore".into(),
                ));
            }
            Ok(())
        })
    })
    .await?
    .ok_or(ApiError::NotFound("chore"))?;

    Ok(Json(chore.into_response()))
}

pub async fn delete_chore(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<ChoreId>,
) -> Result<StatusCode, ApiError> {
    blocking(&state, move |db| {
        let chore = db.get_chore(id)?.ok_or(ApiError::NotFound("chore"))?;
        principal.ensure_family(chore.family_id)?;
        db.delete_chore(id)?;
        Ok(())
    })
    .await?;

    info!(chore = %id, "Chore deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Toggle the caller's completion of a chore and return the stored chore.
pub async fn toggle_completion(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<ChoreId>,
) -> Result<Json<ChoreResponse>, ApiError> {
    let member = principal.member()?;
    let policy = state.settings.group_uncomplete;

    let chore = blocking(&state, move |db| {
        Ok(db.toggle_chore_completion(id, member.id, policy)?)
    })
    .await?;

    Ok(Json(chore.into_response()))
}

pub async fn completions(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<ChoreId>,
) -> Result<Json<Vec<ChoreCompletionResponse>>, ApiError> {
    let completions = blocking(&state, move |db| {
        let chore = db.get_chore(id)?.ok_or(ApiError::NotFound("chore"))?;
        principal.ensure_family(chore.family_id)?;
        Ok(db.chore_completions(id)?)
    })
    .await?;
    Ok(Json(completions))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assignees_are_deduplicated_and_checked() {
        let members: BTreeSet<UserId> = [UserId(3), UserId(4)].into_iter().collect();
        assert_eq!(
            checked_assignees(&members, &[UserId(4), UserId(3), UserId(4)]).unwrap(),
            vec![UserId(3), UserId(4)]
        );
        assert!(checked_assignees(&members, &[UserId(5)]).is_err());
        assert!(checked_assignees(&members, &[]).unwrap().is_empty());
    }

    #[test]
    fn recurrence_days_must_be_weekdays() {
        let days = |recurrence_days: Vec<u8>| Recurrence { recurrence_days, ..Recurrence::default() };
        assert!(checked_recurrence(&days(vec![0, 6])).is_ok());
        assert!(checked_recurrence(&days(vec![1, 9])).is_err());
    }

    #[test]
    fn blank_titles_are_rejected() {
        assert!(checked_title("   ").is_err());
        assert_eq!(checked_title(" Dishes ").unwrap(), "Dishes");
    }
}
