use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    auth::extractors::AuthUser,
    db::StoreError,
    error::AppError,
    profiles::dto::{ProfileEnvelope, ProfileRequest},
    response::ApiResponse,
    state::AppState,
};

pub fn profile_routes() -> Router<AppState> {
    Router::new()
        .route("/profiles", post(create_profile))
        .route(
            "/profiles/me",
            get(get_my_profile)
                .put(update_my_profile)
                .delete(delete_my_profile),
        )
        .route("/profiles/:user_id", get(get_profile))
}

#[instrument(skip(state, user, payload), fields(user_id = %user.id))]
pub async fn create_profile(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(payload): Json<ProfileRequest>,
) -> Result<(StatusCode, Json<ApiResponse<ProfileEnvelope>>), AppError> {
    let fields = payload.into_fields()?;
    let exists = || AppError::Conflict("Profile already exists for this user".into());
    if state.profiles.find_by_user(user.id).await?.is_some() {
        return Err(exists());
    }
    let profile = state
        .profiles
        .create(user.id, fields)
        .await
        .map_err(|e| match e {
            StoreError::DuplicateKey(_) => exists(),
            other => other.into(),
        })?;
    info!(profile_id = %profile.id, "profile created");
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message(
            "Profile created",
            ProfileEnvelope { profile },
        )),
    ))
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn get_my_profile(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<ApiResponse<ProfileEnvelope>>, AppError> {
    let profile = state
        .profiles
        .find_by_user(user.id)
        .await?
        .ok_or(AppError::NotFound("Profile"))?;
    Ok(Json(ApiResponse::data(ProfileEnvelope { profile })))
}

#[instrument(skip(state, user, payload), fields(user_id = %user.id))]
pub async fn update_my_profile(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(payload): Json<ProfileRequest>,
) -> Result<Json<ApiResponse<ProfileEnvelope>>, AppError> {
    let fields = payload.into_fields()?;
    let mut profile = state
        .profiles
        .find_by_user(user.id)
        .await?
        .ok_or(AppError::NotFound("Profile"))?;
    profile.apply(fields);
    let profile = state.profiles.save(&profile).await?;
    info!(profile_id = %profile.id, "profile updated");
    Ok(Json(ApiResponse::with_message(
        "Profile updated",
        ProfileEnvelope { profile },
    )))
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn delete_my_profile(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<ApiResponse<()>>, AppError> {
    if !state.profiles.delete_by_user(user.id).await? {
        return Err(AppError::NotFound("Profile"));
    }
    info!("profile deleted");
    Ok(Json(ApiResponse::message("Profile deleted")))
}

#[instrument(skip(state, _caller))]
pub async fn get_profile(
    State(state): State<AppState>,
    AuthUser(_caller): AuthUser,
    Path(user_id): Path<Uuid>,
) -> Result<Json<ApiResponse<ProfileEnvelope>>, AppError> {
    let profile = state
        .profiles
        .find_by_user(user_id)
        .await?
        .ok_or(AppError::NotFound("Profile"))?;
    Ok(Json(ApiResponse::data(ProfileEnvelope { profile })))
}
