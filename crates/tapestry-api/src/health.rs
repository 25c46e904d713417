use axum::{Json, extract::State};
use serde_json::{Value, json};

use crate::{ApiError, AppState, blocking};

pub async fn healthz() -> &'static str {
    "ok"
}

/// Ready once the database answers.
pub async fn readyz(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    blocking(&state, |db| Ok(db.ping()?)).await?;
    Ok(Json(json!({ "status": "ready" })))
}
