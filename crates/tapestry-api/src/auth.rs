use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString,
};
use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use jsonwebtoken::{EncodingKey, Header, encode};
use rand::Rng;
use rand_core::OsRng;
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use uuid::Uuid;

use tapestry_db::models::NewUser;
use tapestry_db::tokens::{QrPoll, QrScan};
use tapestry_types::api::{
    AdminLoginRequest, Claims, ForgotPasswordRequest, ForgotPasswordResponse, LoginRequest,
    MessageResponse, QrScanRequest, QrSessionResponse, QrStatus, QrStatusResponse,
    ResetPasswordRequest, SignupRequest, TokenKind, TokenResponse, UserResponse,
};

use crate::middleware::Principal;
use crate::{ApiError, AppState, Settings, blocking};

pub const MIN_PASSWORD_LEN: usize = 8;

pub(crate) fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {e}"))?
        .to_string();
    Ok(hash)
}

pub(crate) fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

pub(crate) fn check_password_strength(password: &str) -> Result<(), ApiError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::bad_request(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

pub(crate) fn create_token(settings: &Settings, sub: i64, kind: TokenKind) -> Result<String, ApiError> {
    let now = Utc::now();
    let claims = Claims {
        sub,
        kind,
        iat: now.timestamp() as usize,
        exp: (now + settings.token_ttl).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(settings.jwt_secret.as_bytes()),
    )
    .map_err(anyhow::Error::from)?;

    Ok(token)
}

/// Reset tokens are stored as their SHA-256 digest only.
pub(crate) fn hash_reset_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

fn generate_reset_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = req.name.trim().to_string();
    if name.is_empty() {
        return Err(ApiError::bad_request("name must not be empty"));
    }
    let email = normalize_email(&req.email);
    if !email.contains('@') {
        return Err(ApiError::bad_request("invalid email address"));
    }
    check_password_strength(&req.password)?;

    let password_hash = hash_password(&req.password)?;
    let role = req.role;

    let user = blocking(&state, move |db| {
        if db.get_user_by_email(&email)?.is_some() {
            return Err(ApiError::Conflict("email already registered".into()));
        }
        Ok(db.create_user(&NewUser {
            family_id: None,
            name: &name,
            email: Some(&email),
            password_hash: Some(&password_hash),
            role,
            profile_image_url: None,
            icon_emoji: None,
        })?)
    })
    .await?;

    info!(user = %user.id, "User signed up");
    let token = create_token(&state.settings, user.id.0, TokenKind::User)?;
    Ok((StatusCode::CREATED, Json(TokenResponse::bearer(token))))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let email = normalize_email(&req.email);
    let user = blocking(&state, move |db| Ok(db.get_user_by_email(&email)?)).await?;

    // Same answer for unknown email and wrong password.
    let user = user.ok_or(ApiError::Unauthorized("invalid email or password"))?;
    let hash = user
        .password_hash
        .as_deref()
        .ok_or(ApiError::Unauthorized("invalid email or password"))?;
    if !verify_password(&req.password, hash) {
        return Err(ApiError::Unauthorized("invalid email or password"));
    }

    let token = create_token(&state.settings, user.id.0, TokenKind::User)?;
    Ok(Json(TokenResponse::bearer(token)))
}

pub async fn admin_login(
    State(state): State<AppState>,
    Json(req): Json<AdminLoginRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let family_id = req.family_id;
    let family = blocking(&state, move |db| Ok(db.get_family(family_id)?))
        .await?
        .ok_or(ApiError::Unauthorized("invalid family or admin password"))?;

    if !verify_password(&req.admin_password, &family.admin_password_hash) {
        return Err(ApiError::Unauthorized("invalid family or admin password"));
    }

    info!(family = %family.id, "Family admin login");
    let token = create_token(&state.settings, family.id.0, TokenKind::Family)?;
    Ok(Json(TokenResponse::bearer(token)))
}

pub async fn me(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<UserResponse>, ApiError> {
    let member = principal.member()?;
    let user = blocking(&state, move |db| Ok(db.get_user_by_id(member.id)?))
        .await?
        .ok_or(ApiError::NotFound("user"))?;
    Ok(Json(user.into_response()))
}

/// Always answers with the same message so the endpoint does not reveal which
/// emails are registered.
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(req): Json<ForgotPasswordRequest>,
) -> Result<Json<ForgotPasswordResponse>, ApiError> {
    let email = normalize_email(&req.email);
    let token = generate_reset_token();
    let token_hash = hash_reset_token(&token);
    let expires_at = Utc::now() + state.settings.reset_ttl;

    let issued = blocking(&state, move |db| {
        let Some(user) = db.get_user_by_email(&email)? else {
            return Ok(false);
        };
        db.insert_reset_token(user.id, &token_hash, expires_at)?;
        info!(user = %user.id, "Password reset requested");
        Ok(true)
    })
    .await?;

    Ok(Json(ForgotPasswordResponse {
        message: "If that email is registered, a reset link has been sent".into(),
        reset_token: (issued && state.settings.expose_reset_tokens).then_some(token),
    }))
}

pub async fn reset_password(
    State(state): State<AppState>,
    Json(req): Json<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    check_password_strength(&req.new_password)?;
    let token_hash = hash_reset_token(&req.token);
    let password_hash = hash_password(&req.new_password)?;

    let user = blocking(&state, move |db| {
        Ok(db.reset_password(&token_hash, &password_hash, Utc::now())?)
    })
    .await?
    .ok_or_else(|| ApiError::bad_request("invalid or expired reset token"))?;

    info!(user = %user, "Password reset");
    Ok(Json(MessageResponse::new("Password has been reset")))
}

pub async fn create_qr_session(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let session_token = Uuid::new_v4().to_string();
    let expires_at = Utc::now() + state.settings.qr_ttl;

    let token = session_token.clone();
    blocking(&state, move |db| Ok(db.create_qr_session(&token, expires_at)?)).await?;

    let qr_code_url = format!("{}?token={}", state.settings.qr_url_base, session_token);
    debug!(expires_at = %expires_at, "QR login session opened");
    Ok((
        StatusCode::CREATED,
        Json(QrSessionResponse { session_token, expires_at, qr_code_url }),
    ))
}

pub async fn poll_qr_session(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<QrStatusResponse>, ApiError> {
    let poll = blocking(&state, move |db| Ok(db.poll_qr_session(&token, Utc::now())?)).await?;

    let response = match poll {
        QrPoll::Pending => QrStatusResponse { status: QrStatus::Pending, access_token: None },
        QrPoll::Expired => QrStatusResponse { status: QrStatus::Expired, access_token: None },
        QrPoll::NotFound => return Err(ApiError::NotFound("QR session")),
        QrPoll::Approved(user) => {
            info!(user = %user, "QR login completed");
            QrStatusResponse {
                status: QrStatus::Scanned,
                access_token: Some(create_token(&state.settings, user.0, TokenKind::User)?),
            }
        }
    };
    Ok(Json(response))
}

pub async fn scan_qr_session(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<QrScanRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let member = principal.member()?;
    let scan = blocking(&state, move |db| {
        Ok(db.scan_qr_session(&req.session_token, member.id, Utc::now())?)
    })
    .await?;

    match scan {
        QrScan::Bound => Ok(Json(MessageResponse::new("Login approved"))),
        QrScan::NotFound => Err(ApiError::NotFound("QR session")),
        QrScan::Expired => Err(ApiError::bad_request("QR session expired")),
        QrScan::AlreadyScanned => Err(ApiError::Conflict("QR session already used".into())),
    }
}
