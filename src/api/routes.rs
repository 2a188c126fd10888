//! HTTP handlers

use std::collections::HashSet;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::extract::AuthUser;
use super::SharedState;
use crate::accounts::{NewAccount, Profile};
use crate::error::{Error, Result};
use crate::messages::SyncResult;
use crate::types::{Coordinate, MessageId, UserId};

/// Health check endpoint
pub async fn health() -> impl IntoResponse {
    "OK"
}

#[derive(Debug, Deserialize)]
pub struct HeartbeatRequest {
    pub coords: Coordinate,
}

/// POST /heartbeat
///
/// Drains the caller's inbox, then records their position. Presence is only
/// updated once the sync has committed.
pub async fn heartbeat(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    Json(req): Json<HeartbeatRequest>,
) -> Result<Json<SyncResult>> {
    let result = state
        .db
        .transaction_with_retry(|tx| state.messages.sync_inbox(tx, user))
        .await?;

    state.window.record(user, req.coords).await;
    Ok(Json(result))
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub coords: Coordinate,
    /// Radius in the distance function's unit (meters by default)
    pub dist: f64,
}

/// POST /search
pub async fn search(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    Json(req): Json<SearchRequest>,
) -> Result<Json<Vec<Profile>>> {
    if !req.dist.is_finite() || req.dist < 0.0 {
        return Err(Error::validation("dist must be a non-negative number"));
    }

    // Removed users linger in the window until they age out. A full result
    // that loses profiles is rescanned without them so they do not hold
    // cap slots.
    let mut excluded = HashSet::from([user]);
    let mut scans = 0usize;
    let profiles = loop {
        scans += 1;
        let ids = state
            .matcher
            .query_excluding_all(&req.coords, req.dist, &excluded)
            .await;
        let profiles = state
            .db
            .read(|conn| state.accounts.profiles(conn, &ids))
            .await?;

        if ids.len() < state.matcher.cap() || profiles.len() == ids.len() {
            break profiles;
        }
        let kept: HashSet<UserId> = profiles.iter().map(|p| p.user_id).collect();
        excluded.extend(ids.into_iter().filter(|id| !kept.contains(id)));
    };

    debug!(user_id = user, scans, returned = profiles.len(), "Search");
    Ok(Json(profiles))
}

#[derive(Debug, Deserialize)]
pub struct SendRequest {
    pub to_user_id: UserId,
    pub contents: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SendResponse {
    pub message_id: MessageId,
}

/// POST /message/send
pub async fn send_message(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    Json(req): Json<SendRequest>,
) -> Result<Json<SendResponse>> {
    let message_id = state
        .db
        .transaction(|tx| {
            if !state.accounts.exists(tx, req.to_user_id)? {
                return Err(Error::NotFound(format!("user {}", req.to_user_id)));
            }
            state.messages.send(tx, user, req.to_user_id, &req.contents)
        })
        .await?;

    Ok(Json(SendResponse { message_id }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserIdResponse {
    pub user_id: UserId,
}

/// POST /user/register
pub async fn register(
    State(state): State<SharedState>,
    Json(account): Json<NewAccount>,
) -> Result<(StatusCode, Json<UserIdResponse>)> {
    let prepared = state.accounts.prepare(account).await?;
    let user_id = state
        .db
        .transaction(|tx| state.accounts.register(tx, &prepared))
        .await?;

    Ok((StatusCode::CREATED, Json(UserIdResponse { user_id })))
}

/// POST /user/login
pub async fn login(AuthUser(user_id): AuthUser) -> Json<UserIdResponse> {
    Json(UserIdResponse { user_id })
}

/// POST /user/delete
///
/// The user's presence entry is left to age out; search drops ids whose
/// profile no longer exists.
pub async fn delete_user(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
) -> Result<StatusCode> {
    state
        .db
        .transaction(|tx| state.accounts.remove(tx, user, &state.messages))
        .await?;

    Ok(StatusCode::NO_CONTENT)
}
