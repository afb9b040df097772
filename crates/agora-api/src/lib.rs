pub mod accounts;
pub mod ads;
pub mod chat;
pub mod comments;
pub mod convert;
pub mod error;
pub mod extract;
pub mod middleware;
pub mod news;
pub mod posts;
pub mod profiles;
pub mod reports;
pub mod response;
pub mod shares;
pub mod state;
pub mod upload;
pub mod ws;

use axum::{Router, routing::get};

pub use state::{ApiConfig, AppState, AppStateInner};

/// Every HTTP route the server exposes, media files aside.
pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/acc/api/auth", accounts::auth_routes())
        .nest("/api/v1/admin", accounts::admin_routes(&state))
        .nest("/api/v1", profiles::routes(&state))
        .nest("/api/v1.0", posts::routes(&state))
        .nest("/api/v1.1", chat::routes(&state))
        .nest("/api/v1.2", news::routes(&state))
        .nest("/api/v1.3", ads::routes(&state))
        .nest("/api/v1.4", reports::routes(&state))
        .route("/ws/chat", get(ws::chat_socket))
        .with_state(state)
}
