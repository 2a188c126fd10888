//! HTTP API
//!
//! - `POST /heartbeat`: sync the inbox and report position
//! - `POST /search`: nearby users
//! - `POST /message/send`
//! - `POST /user/register`, `/user/login`, `/user/delete`
//! - `GET /health`

pub mod error;
pub mod extract;
pub mod routes;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::accounts::Accounts;
use crate::config::Config;
use crate::geo::Haversine;
use crate::messages::MessageStore;
use crate::presence::PresenceWindow;
use crate::proximity::ProximityMatcher;
use crate::store::Database;

pub use extract::AuthUser;

/// State shared across handlers
pub struct AppState {
    pub db: Database,
    pub window: Arc<PresenceWindow>,
    pub matcher: ProximityMatcher,
    pub messages: MessageStore,
    pub accounts: Accounts,
}

impl AppState {
    /// Wire the default collaborators (haversine distance) around `db` and `window`.
    pub fn new(db: Database, window: Arc<PresenceWindow>, config: &Config) -> Self {
        let matcher = ProximityMatcher::new(
            window.clone(),
            Arc::new(Haversine),
            config.proximity.result_cap,
        );

        Self {
            db,
            window,
            matcher,
            messages: MessageStore::new(config.messages.max_contents_len),
            accounts: Accounts,
        }
    }
}

pub type SharedState = Arc<AppState>;

/// Create the API router
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/heartbeat", post(routes::heartbeat))
        .route("/search", post(routes::search))
        .route("/message/send", post(routes::send_message))
        .route("/user/register", post(routes::register))
        .route("/user/login", post(routes::login))
        .route("/user/delete", post(routes::delete_user))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
