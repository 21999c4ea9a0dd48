use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{Result, ServerError};
use crate::router::AppState;

#[derive(Deserialize)]
pub struct UserIdRequest {
    #[serde(default)]
    userid: Option<String>,
}

/// Space-joined active IDs, in insertion order.
pub async fn ids(State(state): State<AppState>) -> Json<Value> {
    let users = state.store.list_active().await;
    Json(json!({ "message": users.join(" ") }))
}

pub async fn list_ids(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "users": state.store.list_active().await }))
}

/// Fetch fresh profile data for every tracked ID, updating the cached
/// usernames on success.
pub async fn list_profiles(State(state): State<AppState>) -> Result<Json<Value>> {
    let ids = state.store.list_active().await;
    let profiles = state
        .profiles
        .fetch_all(&ids)
        .await
        .map_err(ServerError::Refresh)?;

    state.store.update_usernames(&profiles).await?;

    Ok(Json(json!({ "users": profiles })))
}

pub async fn add(
    State(state): State<AppState>,
    Json(req): Json<UserIdRequest>,
) -> Result<Json<Value>> {
    let userid = require_user_id(req.userid.as_deref())?;
    if !userid.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ServerError::Validation("invalid user id format".to_string()));
    }

    // Answer duplicates before touching the upstream API; the directory's
    // own add re-checks under its lock and stays the source of truth.
    if state.store.is_active(userid).await {
        return Err(ServerError::AlreadyExists);
    }

    let profile = state.profiles.fetch(userid).await?;
    let added = state.store.add(userid, &profile.username).await?;
    let users = state.store.list_active().await;

    tracing::info!(userid, username = %added.username, "tracked new user");

    Ok(Json(json!({
        "message": "success",
        "users": users,
        "addedUser": added,
    })))
}

pub async fn remove(
    State(state): State<AppState>,
    Json(req): Json<UserIdRequest>,
) -> Result<Json<Value>> {
    let userid = require_user_id(req.userid.as_deref())?;

    let removed = state.store.remove(userid).await?;
    let users = state.store.list_active().await;

    tracing::info!(userid, username = %removed.username, "untracked user");

    Ok(Json(json!({
        "message": "removed",
        "users": users,
        "removedUserId": userid,
    })))
}

fn require_user_id(userid: Option<&str>) -> Result<&str> {
    match userid {
        Some(id) if !id.is_empty() => Ok(id),
        _ => Err(ServerError::Validation("id required".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_id_must_be_present_and_non_empty() {
        assert!(require_user_id(None).is_err());
        assert!(require_user_id(Some("")).is_err());
        assert_eq!(require_user_id(Some("123")).unwrap(), "123");
    }
}
