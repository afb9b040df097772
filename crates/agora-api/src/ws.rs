use axum::{
    extract::{Query, State, WebSocketUpgrade},
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::debug;

use agora_gateway::connection;

use crate::error::{ApiError, ApiResult};
use crate::middleware::decode_token;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct GatewayAuth {
    pub token: Option<String>,
}

/// `GET /ws/chat?token=<jwt>`. The token is checked before the upgrade so a
/// bad one gets a plain 401.
pub async fn chat_socket(
    State(state): State<AppState>,
    Query(auth): Query<GatewayAuth>,
    ws: WebSocketUpgrade,
) -> ApiResult<impl IntoResponse> {
    let token = auth.token.filter(|t| !t.is_empty()).ok_or_else(ApiError::unauthorized)?;
    let claims = decode_token(&state.config.jwt_secret, &token).ok_or_else(ApiError::unauthorized)?;

    let user_id = claims.sub;
    let user = state
        .blocking(move |db| db.user_ref(user_id)?.ok_or_else(ApiError::unauthorized))
        .await?;
    debug!("Upgrading chat socket for {}", claims.email);

    let dispatcher = state.dispatcher.clone();
    let db = state.db.clone();
    Ok(ws.on_upgrade(move |socket| {
        connection::handle_connection(socket, dispatcher, db, user_id, user.display_name())
    }))
}
