use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{
    Extension, Router,
    extract::{Path, State},
    middleware,
    response::IntoResponse,
    routing::{patch, post},
};
use tracing::info;
use uuid::Uuid;

use agora_db::models::NewAccount;
use agora_types::api::Claims;
use agora_types::api::accounts::{AuthResponse, LoginRequest, RegisterRequest, VerificationUpdate};

use crate::convert::user_summary;
use crate::error::{ApiError, ApiResult};
use crate::extract::ValidJson;
use crate::middleware::{create_token, require_auth, require_staff};
use crate::response::{created, ok_with};
use crate::state::AppState;

/// `/acc/api/auth`
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
}

/// `/api/v1/admin`
pub fn admin_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/accounts/{acc_id}/verification", patch(set_verification))
        .route_layer(middleware::from_fn(require_staff))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
}

pub async fn register(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<RegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    let is_staff = state.is_staff_email(&req.email);
    let account_id = Uuid::new_v4();
    let email = req.email.trim().to_lowercase();
    let full_name = req.full_name.trim().to_string();

    let new = NewAccount {
        id: account_id,
        profile_id: Uuid::new_v4(),
        email: email.clone(),
        full_name: full_name.clone(),
        password_hash: String::new(),
        is_staff,
    };
    let password = req.password;
    state
        .blocking(move |db| {
            // Hash with Argon2id
            let salt = SaltString::generate(&mut OsRng);
            let password_hash = Argon2::default()
                .hash_password(password.as_bytes(), &salt)
                .map_err(|e| ApiError::Internal(anyhow::anyhow!("password hashing failed: {}", e)))?
                .to_string();
            db.create_account(&NewAccount { password_hash, ..new })?;
            Ok(())
        })
        .await?;

    let token = create_token(
        &state.config.jwt_secret,
        account_id,
        &email,
        is_staff,
        state.config.token_days,
    )?;
    info!("Registered account {} ({})", email, account_id);

    Ok(created(
        AuthResponse {
            acc_id: account_id,
            email,
            full_name,
            is_staff,
            token,
        },
        "Account created successfully.",
    ))
}

pub async fn login(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    let invalid = || ApiError::Unauthorized("Invalid email or password.".into());

    let email = req.email.clone();
    let account = state
        .blocking(move |db| Ok(db.account_by_email(&email)?))
        .await?
        .ok_or_else(invalid)?;

    let stored = account.password.clone();
    let password = req.password;
    let verified = tokio::task::spawn_blocking(move || {
        PasswordHash::new(&stored)
            .map(|parsed| Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok())
            .unwrap_or(false)
    })
    .await
    .map_err(|e| ApiError::Internal(e.into()))?;
    if !verified {
        return Err(invalid());
    }

    let token = create_token(
        &state.config.jwt_secret,
        account.id,
        &account.email,
        account.is_staff,
        state.config.token_days,
    )?;

    Ok(ok_with(
        AuthResponse {
            acc_id: account.id,
            email: account.email,
            full_name: account.full_name,
            is_staff: account.is_staff,
            token,
        },
        "Login successful.",
    ))
}

pub async fn set_verification(
    State(state): State<AppState>,
    Path(acc_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    ValidJson(req): ValidJson<VerificationUpdate>,
) -> ApiResult<impl IntoResponse> {
    let user = state
        .blocking(move |db| {
            if !db.set_verification(acc_id, req.is_verified, req.badge.as_deref())? {
                return Err(ApiError::not_found("Account not found."));
            }
            db.user_ref(acc_id)?
                .ok_or_else(|| ApiError::not_found("Account not found."))
        })
        .await?;

    info!("{} updated verification of {}", claims.email, acc_id);
    Ok(ok_with(
        user_summary(&user, &state.storage),
        "Verification status updated.",
    ))
}
