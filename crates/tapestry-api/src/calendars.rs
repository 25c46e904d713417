use std::collections::BTreeSet;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Duration, Utc};

use tapestry_types::api::{CreateEventRequest, EventResponse, UpdateEventRequest, WeekQuery};
use tapestry_types::{EventId, UserId};

use crate::middleware::Principal;
use crate::{ApiError, AppState, blocking};

fn check_span(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<(), ApiError> {
    if end <= start {
        return Err(ApiError::bad_request("end_time must be after start_time"));
    }
    Ok(())
}

fn check_participants(members: &BTreeSet<UserId>, participants: &[UserId]) -> Result<(), ApiError> {
    match participants.iter().find(|id| !members.contains(*id)) {
        Some(id) => Err(ApiError::bad_request(format!("user {id} is not a member of this family"))),
        None => Ok(()),
    }
}

/// Events intersecting `[week_start, week_end)`.
pub async fn list_events(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<WeekQuery>,
) -> Result<Json<Vec<EventResponse>>, ApiError> {
    let family = principal.family()?;
    let start = query.week_start;
    let end = query.week_end.unwrap_or(start + Duration::days(7));
    if end <= start {
        return Err(ApiError::bad_request("week_end must be after week_start"));
    }

    let events = blocking(&state, move |db| Ok(db.list_events(family, start, end)?)).await?;
    Ok(Json(events.into_iter().map(|e| e.into_response()).collect()))
}

pub async fn create_event(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<CreateEventRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let family = principal.family()?;
    if req.title.trim().is_empty() {
        return Err(ApiError::bad_request("title must not be empty"));
    }
    check_span(req.start_time, req.end_time)?;

    let event = blocking(&state, move |db| {
        check_participants(&db.family_member_ids(family)?, &req.participant_ids)?;
        Ok(db.create_event(family, &req)?)
    })
    .await?;

    Ok((StatusCode::CREATED, Json(event.into_response())))
}

pub async fn update_event(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<EventId>,
    Json(req): Json<UpdateEventRequest>,
) -> Result<Json<EventResponse>, ApiError> {
    let family = principal.family()?;

    let event = blocking(&state, move |db| {
        let members = db.family_member_ids(family)?;
        db.update_event(id, |event| {
            principal.ensure_family(event.family_id)?;
            if let Some(title) = req.title {
                if title.trim().is_empty() {
                    return Err(ApiError::bad_request("title must not be empty"));
                }
                event.title = title;
            }
            if let Some(description) = req.description {
                event.description = description;
            }
            if let Some(emoji) = req.emoji {
                event.emoji = emoji;
            }
            if let Some(start) = req.start_time {
                event.start_time = start;
            }
            if let Some(end) = req.end_time {
                event.end_time = end;
            }
            check_span(event.start_time, event.end_time)?;
            if let Some(source) = req.source {
                event.source = source;
            }
            if let Some(source_id) = req.source_id {
                event.source_id = source_id;
            }
            if let Some(participants) = req.participant_ids {
                check_participants(&members, &participants)?;
                event.participant_ids = participants;
            }
            Ok(())
        })
    })
    .await?
    .ok_or(ApiError::NotFound("event"))?;

    Ok(Json(event.into_response()))
}

pub async fn delete_event(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<EventId>,
) -> Result<StatusCode, ApiError> {
    blocking(&state, move |db| {
        let event = db.get_event(id)?.ok_or(ApiError::NotFound("event"))?;
        principal.ensure_family(event.family_id)?;
        db.delete_event(id)?;
        Ok(())
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}
