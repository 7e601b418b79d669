use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{
        header::{InvalidHeaderValue, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        cookies::{clear_refresh_cookie, extract_refresh_token, refresh_cookie},
        dto::{
            AuthPayload, EmailRequest, LoginRequest, ResetPasswordRequest, ResetTokenQuery,
            ResetTokenStatus, SignupRequest, VerifyEmailQuery,
        },
        jwt::{JwtKeys, TokenError},
        services::{AuthService, Session},
    },
    config::AppConfig,
    error::AppError,
    response::ApiResponse,
    state::AppState,
    users::dto::UserEnvelope,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/signup", post(signup))
        .route("/auth/login", post(login))
        .route("/auth/refresh-token", post(refresh_token))
        .route("/auth/logout", post(logout))
        .route("/auth/verify-email", get(verify_email))
        .route("/auth/resend-verification", post(resend_verification))
        .route("/auth/forgot-password", post(forgot_password))
        .route("/auth/verify-reset-token", get(verify_reset_token))
        .route("/auth/reset-password", post(reset_password))
}

fn set_cookie(value: Result<HeaderValue, InvalidHeaderValue>) -> Result<HeaderMap, AppError> {
    let mut headers = HeaderMap::new();
    headers.insert(SET_COOKIE, value.map_err(anyhow::Error::from)?);
    Ok(headers)
}

fn session_response(
    config: &AppConfig,
    session: Session,
    message: &str,
) -> Result<(HeaderMap, Json<ApiResponse<AuthPayload>>), AppError> {
    let headers = set_cookie(refresh_cookie(config, &session.refresh_token))?;
    let payload = AuthPayload {
        access_token: session.access_token,
        user: (&session.user).into(),
    };
    Ok((headers, Json(ApiResponse::with_message(message, payload))))
}

#[instrument(skip(auth, payload))]
pub async fn signup(
    State(auth): State<AuthService>,
    Json(payload): Json<SignupRequest>,
) -> Result<(StatusCode, Json<ApiResponse<UserEnvelope>>), AppError> {
    let user = auth.signup(payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message(
            "Registration successful. Please check your email to verify your account.",
            UserEnvelope::from(&user),
        )),
    ))
}

#[instrument(skip(auth, config, payload))]
pub async fn login(
    State(auth): State<AuthService>,
    State(config): State<Arc<AppConfig>>,
    Json(payload): Json<LoginRequest>,
) -> Result<(HeaderMap, Json<ApiResponse<AuthPayload>>), AppError> {
    let session = auth.login(payload).await?;
    session_response(&config, session, "Login successful")
}

/// Rotate the token pair using the refresh cookie. An expired cookie is
/// cleared on the way out.
#[instrument(skip_all)]
pub async fn refresh_token(
    State(auth): State<AuthService>,
    State(keys): State<JwtKeys>,
    State(config): State<Arc<AppConfig>>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let token = extract_refresh_token(&headers)
        .ok_or(AppError::Unauthenticated("Refresh token not found"))?;

    let claims = match keys.verify_refresh(&token) {
        Ok(claims) => claims,
        Err(TokenError::Expired) => {
            warn!("refresh token expired");
            let cleared = set_cookie(clear_refresh_cookie(&config))?;
            let err = AppError::Unauthenticated("Refresh token expired, please log in again");
            return Ok((cleared, err).into_response());
        }
        Err(e) => {
            warn!(error = %e, "refresh token rejected");
            return Err(e.into());
        }
    };

    let session = auth.session_for(claims.sub).await?;
    info!(user_id = %session.user.id, "session refreshed");
    Ok(session_response(&config, session, "Token refreshed")?.into_response())
}

#[instrument(skip_all)]
pub async fn logout(
    State(config): State<Arc<AppConfig>>,
) -> Result<(HeaderMap, Json<ApiResponse<()>>), AppError> {
    let headers = set_cookie(clear_refresh_cookie(&config))?;
    Ok((headers, Json(ApiResponse::message("Logged out successfully"))))
}

#[instrument(skip_all)]
pub async fn verify_email(
    State(auth): State<AuthService>,
    Query(query): Query<VerifyEmailQuery>,
) -> Result<Json<ApiResponse<UserEnvelope>>, AppError> {
    let user = auth.verify_email(&query.email, &query.token).await?;
    Ok(Json(ApiResponse::with_message(
        "Email verified successfully",
        UserEnvelope::from(&user),
    )))
}

#[instrument(skip(auth, payload))]
pub async fn resend_verification(
    State(auth): State<AuthService>,
    Json(payload): Json<EmailRequest>,
) -> Result<Json<ApiResponse<()>>, AppError> {
    auth.resend_verification(&payload.email).await?;
    Ok(Json(ApiResponse::message(
        "If the account exists and is not yet verified, a verification email has been sent",
    )))
}

#[instrument(skip(auth, payload))]
pub async fn forgot_password(
    State(auth): State<AuthService>,
    Json(payload): Json<EmailRequest>,
) -> Result<Json<ApiResponse<()>>, AppError> {
    auth.forgot_password(&payload.email).await?;
    Ok(Json(ApiResponse::message(
        "If an account with that email exists, a password reset link has been sent",
    )))
}

#[instrument(skip_all)]
pub async fn verify_reset_token(
    State(auth): State<AuthService>,
    Query(query): Query<ResetTokenQuery>,
) -> Result<Json<ApiResponse<ResetTokenStatus>>, AppError> {
    let user = auth.verify_reset_token(&query.token).await?;
    Ok(Json(ApiResponse::data(ResetTokenStatus {
        valid: true,
        email: user.email,
    })))
}

#[instrument(skip_all)]
pub async fn reset_password(
    State(auth): State<AuthService>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<Json<ApiResponse<()>>, AppError> {
    auth.reset_password(payload).await?;
    Ok(Json(ApiResponse::message("Password has been reset successfully")))
}
