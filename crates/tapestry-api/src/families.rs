use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;

use tapestry_types::FamilyId;
use tapestry_types::api::{
    CreateFamilyRequest, FamilyResponse, InviteRequest, MessageResponse, UpdateFamilyRequest,
};

use crate::auth::{check_password_strength, hash_password};
use crate::middleware::Principal;
use crate::{ApiError, AppState, blocking};

/// The caller's family, as a list of at most one.
pub async fn own_family(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<Vec<FamilyResponse>>, ApiError> {
    let family = match principal {
        Principal::Member(user) => user.family_id,
        Principal::FamilyAdmin(family) => Some(family),
    };
    let Some(family) = family else {
        return Ok(Json(Vec::new()));
    };
    let row = blocking(&state, move |db| Ok(db.get_family(family)?)).await?;
    Ok(Json(row.into_iter().map(|f| f.into_response()).collect()))
}

/// Creates a family and makes the caller its first member.
pub async fn create_family(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<CreateFamilyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let member = principal.member()?;
    if member.family_id.is_some() {
        return Err(ApiError::Conflict("already a member of a family".into()));
    }
    let name = req.name.trim().to_string();
    if name.is_empty() {
        return Err(ApiError::bad_request("name must not be empty"));
    }
    check_password_strength(&req.admin_password)?;
    let admin_hash = hash_password(&req.admin_password)?;

    let family = blocking(&state, move |db| Ok(db.create_family(member.id, &name, &admin_hash)?)).await?;

    info!(family = %family.id, user = %member.id, "Family created");
    Ok((StatusCode::CREATED, Json(family.into_response())))
}

pub async fn get_family(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<FamilyId>,
) -> Result<Json<FamilyResponse>, ApiError> {
    principal.ensure_family(id)?;
    let family = blocking(&state, move |db| Ok(db.get_family(id)?))
        .await?
        .ok_or(ApiError::NotFound("family"))?;
    Ok(Json(family.into_response()))
}

pub async fn update_family(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<FamilyId>,
    Json(req): Json<UpdateFamilyRequest>,
) -> Result<Json<FamilyResponse>, ApiError> {
    principal.ensure_family(id)?;
    principal.ensure_manager()?;

    let name = match req.name {
        Some(name) if name.trim().is_empty() => {
            return Err(ApiError::bad_request("name must not be empty"));
        }
        Some(name) => Some(name.trim().to_string()),
        None => None,
    };
    let admin_hash = match req.admin_password.as_deref() {
        Some(password) => {
            check_password_strength(password)?;
            Some(hash_password(password)?)
        }
        None => None,
    };

    let family = blocking(&state, move |db| {
        db.update_family(id, |family| {
            if let Some(name) = name {
                family.name = name;
            }
            if let Some(hash) = admin_hash {
                family.admin_password_hash = hash;
            }
            Ok::<_, ApiError>(())
        })
    })
    .await?
    .ok_or(ApiError::NotFound("family"))?;

    Ok(Json(family.into_response()))
}

pub async fn delete_family(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<FamilyId>,
) -> Result<StatusCode, ApiError> {
    principal.ensure_family(id)?;
    principal.ensure_manager()?;

    let deleted = blocking(&state, move |db| Ok(db.delete_family(id)?)).await?;
    if !deleted {
        return Err(ApiError::NotFound("family"));
    }
    info!(family = %id, "Family deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// There is no mail transport; the invite is only logged.
pub async fn invite(
    Extension(principal): Extension<Principal>,
    Path(id): Path<FamilyId>,
    Json(req): Json<InviteRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    principal.ensure_family(id)?;
    principal.ensure_manager()?;
    let email = req.email.trim().to_lowercase();
    if !email.contains('@') {
        return Err(ApiError::bad_request("invalid email address"));
    }

    info!(family = %id, email = %email, "Family invite requested");
    Ok(Json(MessageResponse::new(format!("Invitation sent to {email}"))))
}
