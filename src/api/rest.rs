//! JSON API handlers.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Extension, Json,
};
use serde_json::{json, Value};

use crate::accounts::{self, AccountError, Registration};
use crate::db::Advertisement;
use crate::util::internal_error;

use super::routes::AppState;
use super::session::CurrentUser;
use super::types::{HealthResponse, MeResponse, RegisterResponse, UserSummary};

fn bad_request(body: Value) -> (StatusCode, Json<Value>) {
    (StatusCode::BAD_REQUEST, Json(body))
}

fn server_error<E: std::fmt::Display>(err: E) -> (StatusCode, Json<Value>) {
    let (status, message) = internal_error(err);
    (status, Json(json!({ "detail": message })))
}

/// Create an account and return its API token.
pub async fn register(
    State(state): State<Arc<AppState>>,
    body: Result<Json<Registration>, JsonRejection>,
) -> Result<(StatusCode, Json<RegisterResponse>), (StatusCode, Json<Value>)> {
    let Json(registration) = body.map_err(|rejection| {
        (
            rejection.status(),
            Json(json!({ "detail": rejection.body_text() })),
        )
    })?;
    let user = match accounts::register(&state.db, &registration).await {
        Ok(user) => user,
        Err(AccountError::Invalid(errors)) => return Err(bad_request(json!(errors))),
        Err(AccountError::DuplicateAccount) => {
            return Err(bad_request(json!({
                "username": ["A user with that username already exists."]
            })))
        }
        Err(e) => return Err(server_error(e)),
    };

    let token = state
        .db
        .get_or_create_token(user.id)
        .await
        .map_err(server_error)?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            token,
            user: UserSummary {
                id: user.id,
                username: user.username,
                email: user.email,
            },
        }),
    ))
}

pub async fn advertisements(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Advertisement>>, (StatusCode, String)> {
    let ads = state.db.list_advertisements().await.map_err(internal_error)?;
    Ok(Json(ads))
}

pub async fn me(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<MeResponse>, (StatusCode, String)> {
    let is_subscribed = state.db.is_subscribed(user.id).await.map_err(internal_error)?;
    Ok(Json(MeResponse {
        id: user.id,
        username: user.username,
        is_subscribed,
    }))
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        debug: state.config.debug,
    })
}
