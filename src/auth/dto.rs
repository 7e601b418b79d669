use serde::{Deserialize, Serialize};

use crate::users::dto::PublicUser;

/// Request body for account signup.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    pub full_name: String,
}

/// Request body for login.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Body of resend-verification and forgot-password.
#[derive(Debug, Deserialize)]
pub struct EmailRequest {
    pub email: String,
}

/// Missing query parameters deserialize as empty and fail token checks.
#[derive(Debug, Deserialize)]
pub struct VerifyEmailQuery {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetTokenQuery {
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub token: String,
    pub password: String,
    pub confirm_password: String,
}

/// Returned after login or refresh. The refresh token travels in the cookie only.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthPayload {
    pub access_token: String,
    pub user: PublicUser,
}

#[derive(Debug, Serialize)]
pub struct ResetTokenStatus {
    pub valid: bool,
    pub email: String,
}
