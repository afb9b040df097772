use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// JWT claims shared by the REST middleware and the chat gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub is_staff: bool,
    pub exp: usize,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email(message = "Enter a valid email address."))]
    pub email: String,
    #[validate(length(min = 8, max = 128, message = "Password must be at least 8 characters long."))]
    pub password: String,
    #[validate(length(min = 1, max = 255, message = "Full name is required."))]
    pub full_name: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Enter a valid email address."))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required."))]
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub acc_id: Uuid,
    pub email: String,
    pub full_name: String,
    pub is_staff: bool,
    pub token: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct VerificationUpdate {
    pub is_verified: Option<bool>,
    #[validate(length(max = 50, message = "Badge cannot exceed 50 characters."))]
    pub badge: Option<String>,
}
