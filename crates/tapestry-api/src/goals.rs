use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use tapestry_types::GoalId;
use tapestry_types::api::{CreateGoalRequest, GoalResponse, UpdateGoalRequest};

use crate::middleware::Principal;
use crate::{ApiError, AppState, blocking};

fn check_requirement(requirement: Option<i64>) -> Result<(), ApiError> {
    if requirement.is_some_and(|points| points < 0) {
        return Err(ApiError::bad_request("point_requirement must not be negative"));
    }
    Ok(())
}

pub async fn list_goals(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<Vec<GoalResponse>>, ApiError> {
    let family = principal.family()?;
    let goals = blocking(&state, move |db| Ok(db.list_goals(family)?)).await?;
    Ok(Json(goals.into_iter().map(|g| g.into_response()).collect()))
}

pub async fn create_goal(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<CreateGoalRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let family = principal.family()?;
    if req.name.trim().is_empty() {
        return Err(ApiError::bad_request("name must not be empty"));
    }
    check_requirement(req.point_requirement)?;

    let goal = blocking(&state, move |db| Ok(db.create_goal(family, &req)?)).await?;
    Ok((StatusCode::CREATED, Json(goal.into_response())))
}

pub async fn update_goal(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<GoalId>,
    Json(req): Json<UpdateGoalRequest>,
) -> Result<Json<GoalResponse>, ApiError> {
    let goal = blocking(&state, move |db| {
        db.update_goal(id, |goal| {
            principal.ensure_family(goal.family_id)?;
            if let Some(name) = req.name {
                if name.trim().is_empty() {
                    return Err(ApiError::bad_request("name must not be empty"));
                }
                goal.name = name;
            }
            if let Some(description) = req.description {
                goal.description = description;
            }
            if let Some(requirement) = req.point_requirement {
                check_requirement(requirement)?;
                goal.point_requirement = requirement;
            }
            if let Some(prize) = req.prize {
                goal.prize = prize;
            }
            Ok(())
        })
    })
    .await?
    .ok_or(ApiError::NotFound("goal"))?;

    Ok(Json(goal.into_response()))
}

pub async fn delete_goal(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<GoalId>,
) -> Result<StatusCode, ApiError> {
    blocking(&state, move |db| {
        let goal = db.get_goal(id)?.ok_or(ApiError::NotFound("goal"))?;
        principal.ensure_family(goal.family_id)?;
        db.delete_goal(id)?;
        Ok(())
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}
