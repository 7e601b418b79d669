use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::{
        extractors::{AdminUser, AuthUser},
        services::AuthService,
    },
    error::AppError,
    response::{ApiResponse, Page},
    state::AppState,
    users::{
        dto::{
            AdminUpdateUserRequest, ChangePasswordRequest, PublicUser, UpdateMeRequest,
            UserEnvelope, UserListQuery,
        },
        repo_types::{UserFilter, UserStats},
    },
    validation::Validator,
};

const MAX_NAME_LEN: usize = 100;

pub fn me_routes() -> Router<AppState> {
    Router::new()
        .route("/users/me", get(get_me).patch(update_me))
        .route("/users/me/password", post(change_password))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/stats", get(user_stats))
        .route(
            "/users/:id",
            get(get_user).patch(update_user).delete(delete_user),
        )
}

fn check_name(name: &str) -> Result<(), AppError> {
    let mut v = Validator::new();
    v.required("fullName", name)
        .max_len("fullName", Some(name), MAX_NAME_LEN);
    v.finish()
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn get_me(AuthUser(user): AuthUser) -> Json<ApiResponse<UserEnvelope>> {
    Json(ApiResponse::data(UserEnvelope::from(&user)))
}

#[instrument(skip(state, user, payload), fields(user_id = %user.id))]
pub async fn update_me(
    State(state): State<AppState>,
    AuthUser(mut user): AuthUser,
    Json(payload): Json<UpdateMeRequest>,
) -> Result<Json<ApiResponse<UserEnvelope>>, AppError> {
    let full_name = payload.full_name.trim().to_string();
    check_name(&full_name)?;
    user.full_name = full_name;
    let user = state.users.save(&user).await?;
    info!("profile name updated");
    Ok(Json(ApiResponse::with_message(
        "Profile updated",
        UserEnvelope::from(&user),
    )))
}

#[instrument(skip(auth, user, payload), fields(user_id = %user.id))]
pub async fn change_password(
    State(auth): State<AuthService>,
    AuthUser(user): AuthUser,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<Json<ApiResponse<()>>, AppError> {
    auth.change_password(user, payload).await?;
    Ok(Json(ApiResponse::message("Password changed successfully")))
}

#[instrument(skip(state, _admin))]
pub async fn list_users(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Query(query): Query<UserListQuery>,
) -> Result<Json<ApiResponse<Page<PublicUser>>>, AppError> {
    let pagination = query.pagination();
    let (page, limit) = pagination.normalized();
    let filter = UserFilter {
        role: query.role,
        verified: query.verified,
        limit,
        offset: pagination.offset(),
    };
    let users = state.users.list(&filter).await?;
    let total = state.users.count(&filter).await?;
    Ok(Json(ApiResponse::data(Page {
        items: users.iter().map(PublicUser::from).collect(),
        page,
        limit,
        total,
    })))
}

#[instrument(skip_all)]
pub async fn user_stats(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
) -> Result<Json<ApiResponse<UserStats>>, AppError> {
    Ok(Json(ApiResponse::data(state.users.stats().await?)))
}

#[instrument(skip(state, _admin))]
pub async fn get_user(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<UserEnvelope>>, AppError> {
    let user = state
        .users
        .find_by_id(id)
        .await?
        .ok_or(AppError::NotFound("User"))?;
    Ok(Json(ApiResponse::data(UserEnvelope::from(&user))))
}

#[instrument(skip(state, admin, payload), fields(admin_id = %admin.id))]
pub async fn update_user(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<AdminUpdateUserRequest>,
) -> Result<Json<ApiResponse<UserEnvelope>>, AppError> {
    let mut user = state
        .users
        .find_by_id(id)
        .await?
        .ok_or(AppError::NotFound("User"))?;

    if let Some(name) = payload.full_name {
        let name = name.trim().to_string();
        check_name(&name)?;
        user.full_name = name;
    }
    if let Some(role) = payload.role {
        if user.id == admin.id && role != user.role {
            warn!("admin attempted to change own role");
            return Err(AppError::BadRequest("You cannot change your own role".into()));
        }
        user.role = role;
    }
    if let Some(verified) = payload.is_email_verified {
        user.is_email_verified = verified;
        if verified {
            user.email_verification = None;
        }
    }

    let user = state.users.save(&user).await?;
    info!(user_id = %user.id, role = %user.role, "user updated by admin");
    Ok(Json(ApiResponse::with_message(
        "User updated",
        UserEnvelope::from(&user),
    )))
}

/// Removes the account and its profile. Admins cannot delete themselves.
#[instrument(skip(state, admin), fields(admin_id = %admin.id))]
pub async fn delete_user(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<()>>, AppError> {
    if id == admin.id {
        return Err(AppError::BadRequest("You cannot delete your own account".into()));
    }
    if state.users.find_by_id(id).await?.is_none() {
        return Err(AppError::NotFound("User"));
    }
    state.profiles.delete_by_user(id).await?;
    state.users.delete(id).await?;
    info!(user_id = %id, "user deleted by admin");
    Ok(Json(ApiResponse::message("User deleted successfully")))
}
