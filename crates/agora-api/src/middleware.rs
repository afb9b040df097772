use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use axum_extra::TypedHeader;
use axum_extra::headers::{Authorization, authorization::Bearer};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use uuid::Uuid;

use agora_types::api::Claims;

use crate::error::ApiError;
use crate::state::AppState;

pub fn create_token(secret: &str, user_id: Uuid, email: &str, is_staff: bool, days: i64) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        email: email.to_string(),
        is_staff,
        exp: (chrono::Utc::now() + chrono::Duration::days(days)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

pub fn decode_token(secret: &str, token: &str) -> Option<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .ok()
    .map(|data| data.claims)
}

async fn bearer_claims(parts: &mut Parts, state: &AppState) -> Option<Claims> {
    let TypedHeader(Authorization(bearer)) =
        TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state).await.ok()?;
    decode_token(&state.config.jwt_secret, bearer.token())
}

/// Extract and validate the bearer JWT.
pub async fn require_auth(State(state): State<AppState>, req: Request, next: Next) -> Result<Response, ApiError> {
    let (mut parts, body) = req.into_parts();
    let claims = bearer_claims(&mut parts, &state)
        .await
        .ok_or_else(ApiError::unauthorized)?;

    let mut req = Request::from_parts(parts, body);
    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// Layered inside `require_auth`.
pub async fn require_staff(req: Request, next: Next) -> Result<Response, ApiError> {
    let is_staff = req
        .extensions()
        .get::<Claims>()
        .is_some_and(|claims| claims.is_staff);
    if !is_staff {
        return Err(ApiError::forbidden("You do not have permission to perform this action."));
    }
    Ok(next.run(req).await)
}

/// Claims of the caller on public routes, when a valid token was sent.
pub struct MaybeClaims(pub Option<Claims>);

impl MaybeClaims {
    pub fn user_id(&self) -> Option<Uuid> {
        self.0.as_ref().map(|claims| claims.sub)
    }
}

impl FromRequestParts<AppState> for MaybeClaims {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(claims) = parts.extensions.get::<Claims>() {
            return Ok(MaybeClaims(Some(claims.clone())));
        }
        Ok(MaybeClaims(bearer_claims(parts, state).await))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_round_trip() {
        let id = Uuid::new_v4();
        let token = create_token("secret", id, "a@example.com", true, 7).unwrap();
        let claims = decode_token("secret", &token).unwrap();
        assert_eq!(claims.sub, id);
        assert!(claims.is_staff);
        assert!(decode_token("other", &token).is_none());
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let token = create_token("secret", Uuid::new_v4(), "a@example.com", false, -2).unwrap();
        assert!(decode_token("secret", &token).is_none());
    }
}
