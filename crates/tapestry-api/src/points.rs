use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;

use tapestry_types::api::{AwardPointsRequest, LeaderboardEntry, PointResponse};

use crate::middleware::Principal;
use crate::{ApiError, AppState, blocking};

pub async fn list_points(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<Vec<PointResponse>>, ApiError> {
    let family = principal.family()?;
    let points = blocking(&state, move |db| Ok(db.list_points(family)?)).await?;
    Ok(Json(points.into_iter().map(|p| p.into_response()).collect()))
}

/// Manual award outside the completion toggle. Negative amounts deduct.
pub async fn award_points(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<AwardPointsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let family = principal.ensure_manager()?;
    if req.points == 0 {
        return Err(ApiError::bad_request("points must not be zero"));
    }

    let point = blocking(&state, move |db| {
        let user = db.get_user_by_id(req.user_id)?;
        if user.and_then(|u| u.family_id) != Some(family) {
            return Err(ApiError::bad_request("user is not a member of this family"));
        }
        if let Some(chore_id) = req.chore_id {
            let chore = db.get_chore(chore_id)?;
            if chore.map(|c| c.family_id) != Some(family) {
                return Err(ApiError::bad_request("chore does not belong to this family"));
            }
        }
        Ok(db.award_points(req.user_id, req.chore_id, req.points)?)
    })
    .await?;

    info!(user = %point.user_id, points = point.points, "Points awarded manually");
    Ok((StatusCode::CREATED, Json(point.into_response())))
}

pub async fn leaderboard(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<Vec<LeaderboardEntry>>, ApiError> {
    let family = principal.family()?;
    let board = blocking(&state, move |db| Ok(db.leaderboard(family)?)).await?;
    Ok(Json(board))
}
