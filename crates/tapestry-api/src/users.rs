use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;

use tapestry_db::models::NewUser;
use tapestry_types::UserId;
use tapestry_types::api::{CreateMemberRequest, UpdateUserRequest, UserResponse};

use crate::auth::{check_password_strength, hash_password};
use crate::middleware::Principal;
use crate::{ApiError, AppState, blocking};

pub async fn list_members(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<Vec<UserResponse>>, ApiError> {
    let family = principal.family()?;
    let members = blocking(&state, move |db| Ok(db.list_family_members(family)?)).await?;
    Ok(Json(members.into_iter().map(|u| u.into_response()).collect()))
}

/// Adds a member (typically a child) to the caller's family.
pub async fn create_member(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<CreateMemberRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let family = principal.ensure_manager()?;

    let name = req.name.trim().to_string();
    if name.is_empty() {
        return Err(ApiError::bad_request("name must not be empty"));
    }
    let email = req.email.as_deref().map(|e| e.trim().to_lowercase());
    if email.as_deref().is_some_and(|e| !e.contains('@')) {
        return Err(ApiError::bad_request("invalid email address"));
    }
    let password_hash = match req.password.as_deref() {
        Some(password) => {
            check_password_strength(password)?;
            Some(hash_password(password)?)
        }
        None => None,
    };

    let user = blocking(&state, move |db| {
        if let Some(email) = email.as_deref() {
            if db.get_user_by_email(email)?.is_some() {
                return Err(ApiError::Conflict("email already registered".into()));
            }
        }
        Ok(db.create_user(&NewUser {
            family_id: Some(family),
            name: &name,
            email: email.as_deref(),
            password_hash: password_hash.as_deref(),
            role: req.role,
            profile_image_url: req.profile_image_url.as_deref(),
            icon_emoji: req.icon_emoji.as_deref(),
        })?)
    })
    .await?;

    info!(family = %family, user = %user.id, "Family member added");
    Ok((StatusCode::CREATED, Json(user.into_response())))
}

pub async fn get_user(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<UserId>,
) -> Result<Json<UserResponse>, ApiError> {
    let family = principal.family()?;
    let user = blocking(&state, move |db| Ok(db.get_user_by_id(id)?))
        .await?
        .ok_or(ApiError::NotFound("user"))?;
    if user.family_id != Some(family) {
        return Err(ApiError::NotFound("user"));
    }
    Ok(Json(user.into_response()))
}

pub async fn update_user(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<UserId>,
    Json(req): Json<UpdateUserRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    let family = principal.family()?;
    // Children may edit their own profile only.
    if let Principal::Member(me) = principal {
        if me.id != id {
            principal.ensure_manager()?;
        }
    }

    let user = blocking(&state, move |db| {
        db.update_user(id, |user| {
            if user.family_id != Some(family) {
                return Err(ApiError::NotFound("user"));
            }
            if let Some(name) = req.name {
                let name = name.trim().to_string();
                if name.is_empty() {
                    return Err(ApiError::bad_request("name must not be empty"));
                }
                user.name = name;
            }
            if let Some(url) = req.profile_image_url {
                user.profile_image_url = url;
            }
            if let Some(emoji) = req.icon_emoji {
                user.icon_emoji = emoji;
            }
            Ok(())
        })
    })
    .await?
    .ok_or(ApiError::NotFound("user"))?;

    Ok(Json(user.into_response()))
}

pub async fn delete_user(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<UserId>,
) -> Result<StatusCode, ApiError> {
    let family = principal.ensure_manager()?;

    blocking(&state, move |db| {
        let user = db.get_user_by_id(id)?.ok_or(ApiError::NotFound("user"))?;
        if user.family_id != Some(family) {
            return Err(ApiError::NotFound("user"));
        }
        db.delete_user(id)?;
        Ok(())
    })
    .await?;

    info!(family = %family, user = %id, "Family member removed");
    Ok(StatusCode::NO_CONTENT)
}
