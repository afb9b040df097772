use axum::{Json, http::StatusCode};
use serde::Serialize;

use agora_types::api::ApiResponse;

pub type Reply<T> = (StatusCode, Json<ApiResponse<T>>);

pub fn ok<T: Serialize>(data: T) -> Reply<T> {
    (StatusCode::OK, Json(ApiResponse::new(data)))
}

pub fn ok_with<T: Serialize>(data: T, message: impl Into<String>) -> Reply<T> {
    (StatusCode::OK, Json(ApiResponse::with_message(data, message)))
}

pub fn created<T: Serialize>(data: T, message: impl Into<String>) -> Reply<T> {
    (StatusCode::CREATED, Json(ApiResponse::with_message(data, message)))
}

/// 201 when something new was stored, 200 otherwise.
pub fn created_or_ok<T: Serialize>(created_new: bool, data: T, message: impl Into<String>) -> Reply<T> {
    let status = if created_new { StatusCode::CREATED } else { StatusCode::OK };
    (status, Json(ApiResponse::with_message(data, message)))
}
