pub mod config;
pub mod identities;
pub mod messages;
pub mod middleware;

use std::sync::Arc;

use axum::{
    Extension, Router,
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
    routing::{get, put},
};

use vellum_db::Database;
use vellum_relay::Relay;

use crate::middleware::{Caller, require_identity};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub relay: Relay,
    pub history_limit: u32,
}

impl AppStateInner {
    pub fn new(db: Arc<Database>, history_limit: u32) -> AppState {
        let relay = Relay::new(db.clone());
        Arc::new(Self {
            db,
            relay,
            history_limit,
        })
    }
}

/// Every route requires an authenticated caller.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route(
            "/identities/{id}/public-key",
            put(identities::publish_key).get(identities::get_key),
        )
        .route(
            "/rooms/{room_id}/messages",
            get(messages::get_messages).post(messages::send_message),
        )
        .route("/gateway", get(ws_upgrade))
        .layer(axum::middleware::from_fn(require_identity))
        .with_state(state)
}

async fn ws_upgrade(
    State(state): State<AppState>,
    Extension(Caller(identity_id)): Extension<Caller>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let relay = state.relay.clone();
    ws.on_upgrade(move |socket| vellum_relay::handle_connection(socket, relay, identity_id))
}
