use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};
use jsonwebtoken::{DecodingKey, Validation, decode};
use tapestry_types::api::{Claims, TokenKind};
use tapestry_types::models::Role;
use tapestry_types::{FamilyId, UserId};

use crate::{ApiError, AppState, blocking};

/// A signed-in family member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: UserId,
    pub family_id: Option<FamilyId>,
    pub role: Role,
}

/// Who is calling, resolved from the bearer token by [`require_auth`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Principal {
    Member(CurrentUser),
    /// Holder of a family admin token.
    FamilyAdmin(FamilyId),
}

impl Principal {
    /// The family whose data the caller may access.
    pub fn family(&self) -> Result<FamilyId, ApiError> {
        match self {
            Self::Member(user) => user
                .family_id
                .ok_or(ApiError::Forbidden("join or create a family first")),
            Self::FamilyAdmin(family) => Ok(*family),
        }
    }

    /// The acting user. Family tokens cannot act as a member.
    pub fn member(&self) -> Result<CurrentUser, ApiError> {
        match self {
            Self::Member(user) => Ok(*user),
            Self::FamilyAdmin(_) => Err(ApiError::Forbidden("a family token cannot act as a member")),
        }
    }

    /// Checks that `family` is the caller's own.
    pub fn ensure_family(&self, family: FamilyId) -> Result<(), ApiError> {
        if self.family()? != family {
            return Err(ApiError::Forbidden("access denied"));
        }
        Ok(())
    }

    /// Family management is reserved for parents and the family admin token.
    pub fn ensure_manager(&self) -> Result<FamilyId, ApiError> {
        let family = self.family()?;
        match self {
            Self::Member(user) if user.role != Role::Parent => {
                Err(ApiError::Forbidden("only parents can manage the family"))
            }
            _ => Ok(family),
        }
    }
}

pub(crate) fn decode_claims(token: &str, secret: &str) -> Result<Claims, ApiError> {
    decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &Validation::default())
        .map(|data| data.claims)
        .map_err(|_| ApiError::Unauthorized("invalid or expired token"))
}

/// Validate the bearer token and attach the resolved [`Principal`] to the
/// request. The token's subject must still exist.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Authorization(bearer) = req
        .headers()
        .typed_get::<Authorization<Bearer>>()
        .ok_or(ApiError::Unauthorized("missing bearer token"))?;

    let claims = decode_claims(bearer.token(), &state.settings.jwt_secret)?;

    let principal = blocking(&state, move |db| match claims.kind {
        TokenKind::User => {
            let user = db
                .get_user_by_id(UserId(claims.sub))?
                .ok_or(ApiError::Unauthorized("unknown user"))?;
            Ok(Principal::Member(CurrentUser {
                id: user.id,
                family_id: user.family_id,
                role: user.role,
            }))
        }
        TokenKind::Family => {
            let family = db
                .get_family(FamilyId(claims.sub))?
                .ok_or(ApiError::Unauthorized("unknown family"))?;
            Ok(Principal::FamilyAdmin(family.id))
        }
    })
    .await?;

    req.extensions_mut().insert(principal);
    Ok(next.run(req).await)
}
