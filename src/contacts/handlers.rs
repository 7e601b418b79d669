use axum::{
    extract::{Path, Query, State},
    http::{header::USER_AGENT, HeaderMap, StatusCode},
    routing::{get, patch, post},
    Json, Router,
};
use time::OffsetDateTime;
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::{
    auth::extractors::{AdminUser, MaybeAuthUser},
    contacts::{
        dto::{
            ContactEnvelope, ContactListQuery, CreateContactRequest, ReplyRequest,
            StatusUpdateRequest,
        },
        repo_types::{ContactFilter, ContactMessage, ContactStats, ContactStatus, NewContact},
    },
    error::AppError,
    mail::{self, templates, EmailMessage},
    response::{ApiResponse, Page},
    state::AppState,
    validation::{normalize_email, Validator},
};

pub fn contact_routes() -> Router<AppState> {
    Router::new()
        .route("/contacts", post(submit_contact).get(list_contacts))
        .route("/contacts/stats", get(contact_stats))
        .route("/contacts/:id", get(get_contact).delete(delete_contact))
        .route("/contacts/:id/reply", post(reply_to_contact))
        .route("/contacts/:id/status", patch(update_status))
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// First hop of `x-forwarded-for`, else `x-real-ip`.
pub fn client_ip(headers: &HeaderMap) -> Option<String> {
    header_str(headers, "x-forwarded-for")
        .and_then(|v| v.split(',').next().map(|ip| ip.trim().to_string()))
        .filter(|ip| !ip.is_empty())
        .or_else(|| header_str(headers, "x-real-ip"))
}

async fn load(state: &AppState, id: Uuid) -> Result<ContactMessage, AppError> {
    state
        .contacts
        .find_by_id(id)
        .await?
        .ok_or(AppError::NotFound("Contact message"))
}

#[instrument(skip_all)]
pub async fn submit_contact(
    State(state): State<AppState>,
    MaybeAuthUser(caller): MaybeAuthUser,
    headers: HeaderMap,
    Json(payload): Json<CreateContactRequest>,
) -> Result<(StatusCode, Json<ApiResponse<ContactEnvelope>>), AppError> {
    let name = payload.name.trim().to_string();
    let email = normalize_email(&payload.email);
    let subject = payload.subject.trim().to_string();
    let message = payload.message.trim().to_string();

    let mut v = Validator::new();
    v.required("name", &name)
        .max_len("name", Some(name.as_str()), 100)
        .email("email", &email)
        .required("subject", &subject)
        .max_len("subject", Some(subject.as_str()), 200)
        .required("message", &message)
        .max_len("message", Some(message.as_str()), 5000);
    v.finish()?;

    let contact = state
        .contacts
        .create(NewContact {
            user_id: caller.as_ref().map(|u| u.id),
            name,
            email,
            subject,
            message,
            ip_address: client_ip(&headers),
            user_agent: header_str(&headers, USER_AGENT.as_str()),
        })
        .await?;
    info!(contact_id = %contact.id, authenticated = caller.is_some(), "contact message received");

    mail::send_best_effort(
        state.mailer.clone(),
        EmailMessage::new(
            &state.config.mail.from,
            &contact.email,
            templates::contact_received(&contact.name, &contact.subject),
        ),
        "contact_received",
    );

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message(
            "Your message has been received. We will get back to you soon.",
            ContactEnvelope { contact },
        )),
    ))
}

#[instrument(skip(state, _admin))]
pub async fn list_contacts(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Query(query): Query<ContactListQuery>,
) -> Result<Json<ApiResponse<Page<ContactMessage>>>, AppError> {
    let pagination = query.pagination();
    let (page, limit) = pagination.normalized();
    let filter = ContactFilter {
        status: query.status,
        limit,
        offset: pagination.offset(),
    };
    let items = state.contacts.list(&filter).await?;
    let total = state.contacts.count(&filter).await?;
    Ok(Json(ApiResponse::data(Page {
        items,
        page,
        limit,
        total,
    })))
}

#[instrument(skip_all)]
pub async fn contact_stats(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
) -> Result<Json<ApiResponse<ContactStats>>, AppError> {
    Ok(Json(ApiResponse::data(state.contacts.stats().await?)))
}

/// Opening a `new` message marks it `read`.
#[instrument(skip(state, _admin))]
pub async fn get_contact(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<ContactEnvelope>>, AppError> {
    let mut contact = load(&state, id).await?;
    if contact.status == ContactStatus::New {
        contact.status = ContactStatus::Read;
        contact = state.contacts.save(&contact).await?;
    }
    Ok(Json(ApiResponse::data(ContactEnvelope { contact })))
}

/// The reply is recorded only after the email has gone out.
#[instrument(skip(state, admin, payload), fields(admin_id = %admin.id))]
pub async fn reply_to_contact(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReplyRequest>,
) -> Result<Json<ApiResponse<ContactEnvelope>>, AppError> {
    let reply = payload.reply.trim().to_string();
    let mut v = Validator::new();
    v.required("reply", &reply)
        .max_len("reply", Some(reply.as_str()), 5000);
    v.finish()?;

    let mut contact = load(&state, id).await?;
    let message = EmailMessage::new(
        &state.config.mail.from,
        &contact.email,
        templates::contact_reply(&contact.name, &contact.subject, &contact.message, &reply),
    );
    state.mailer.send(&message).await.map_err(|e| {
        error!(error = %e, contact_id = %contact.id, "contact reply email failed");
        AppError::UpstreamFailure("Failed to send reply email. Please try again later.".into())
    })?;

    contact.reply = Some(reply);
    contact.replied_at = Some(OffsetDateTime::now_utc());
    contact.replied_by = Some(admin.id);
    contact.status = ContactStatus::Replied;
    let contact = state.contacts.save(&contact).await?;
    info!(contact_id = %contact.id, "contact message replied");
    Ok(Json(ApiResponse::with_message(
        "Reply sent",
        ContactEnvelope { contact },
    )))
}

#[instrument(skip(state, _admin))]
pub async fn update_status(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<StatusUpdateRequest>,
) -> Result<Json<ApiResponse<ContactEnvelope>>, AppError> {
    let mut contact = load(&state, id).await?;
    contact.status = payload.status;
    let contact = state.contacts.save(&contact).await?;
    info!(contact_id = %contact.id, status = contact.status.as_str(), "contact status updated");
    Ok(Json(ApiResponse::with_message(
        "Status updated",
        ContactEnvelope { contact },
    )))
}

#[instrument(skip(state, _admin))]
pub async fn delete_contact(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<()>>, AppError> {
    if !state.contacts.delete(id).await? {
        return Err(AppError::NotFound("Contact message"));
    }
    info!(contact_id = %id, "contact message deleted");
    Ok(Json(ApiResponse::message("Contact message deleted")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::build_app;
    use crate::test_support::{bearer, mail_to, seed_user, send, state_with_outbox};
    use crate::users::repo_types::Role;
    use axum::http::HeaderValue;
    use serde_json::json;

    #[test]
    fn client_ip_prefers_first_forwarded_hop() {
        let mut headers = HeaderMap::new();
        assert!(client_ip(&headers).is_none());
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.9"));
        assert_eq!(client_ip(&headers).as_deref(), Some("10.0.0.9"));
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        assert_eq!(client_ip(&headers).as_deref(), Some("203.0.113.7"));
    }

    fn contact_body() -> serde_json::Value {
        json!({
            "name": "Visitor",
            "email": "Visitor@X.com",
            "subject": "Question",
            "message": "How does this work?"
        })
    }

    #[tokio::test]
    async fn anonymous_submission_is_recorded_and_acknowledged() {
        let (state, outbox) = state_with_outbox();
        let app = build_app(state.clone());
        let (status, _, body) = send(
            &app,
            "POST",
            "/api/v1/contacts",
            Some(contact_body()),
            &[("x-forwarded-for", "198.51.100.4"), ("user-agent", "test-agent")],
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let contact = &body["data"]["contact"];
        assert_eq!(contact["status"], "new");
        assert_eq!(contact["email"], "visitor@x.com");
        assert_eq!(contact["ipAddress"], "198.51.100.4");
        assert_eq!(contact["userAgent"], "test-agent");
        assert!(contact["userId"].is_null());
        assert!(mail_to(&outbox, "visitor@x.com", "We received your message: Question")
            .await
            .is_some());
    }

    #[tokio::test]
    async fn authenticated_submission_links_user() {
        let (state, _) = state_with_outbox();
        let (user, token) = seed_user(&state, "a@x.com", Role::User).await;
        let app = build_app(state);
        let auth = bearer(&token);
        let (status, _, body) = send(
            &app,
            "POST",
            "/api/v1/contacts",
            Some(contact_body()),
            &[("authorization", auth.as_str())],
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["contact"]["userId"], user.id.to_string());
    }

    #[tokio::test]
    async fn bad_bearer_on_submission_is_treated_as_anonymous() {
        let (state, _) = state_with_outbox();
        let app = build_app(state);
        let (status, _, body) = send(
            &app,
            "POST",
            "/api/v1/contacts",
            Some(contact_body()),
            &[("authorization", "Bearer not-a-jwt")],
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(body["data"]["contact"]["userId"].is_null());
    }

    #[tokio::test]
    async fn invalid_submission_lists_fields() {
        let (state, _) = state_with_outbox();
        let app = build_app(state);
        let (status, _, body) = send(
            &app,
            "POST",
            "/api/v1/contacts",
            Some(json!({"name": "", "email": "nope", "subject": "s", "message": "m"})),
            &[],
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["errors"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn admin_triage_and_reply() {
        let (state, outbox) = state_with_outbox();
        let (admin, token) = seed_user(&state, "admin@x.com", Role::Admin).await;
        let app = build_app(state);
        let auth = bearer(&token);
        let auth = [("authorization", auth.as_str())];

        let (_, _, created) =
            send(&app, "POST", "/api/v1/contacts", Some(contact_body()), &[]).await;
        let id = created["data"]["contact"]["id"].as_str().unwrap().to_string();
        let uri = format!("/api/v1/contacts/{id}");

        let (status, _, opened) = send(&app, "GET", &uri, None, &auth).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(opened["data"]["contact"]["status"], "read");

        outbox.set_failing(true);
        let reply_uri = format!("{uri}/reply");
        let (status, _, _) = send(
            &app,
            "POST",
            &reply_uri,
            Some(json!({"reply": "Thanks!"})),
            &auth,
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let (_, _, unchanged) = send(&app, "GET", &uri, None, &auth).await;
        assert_eq!(unchanged["data"]["contact"]["status"], "read");
        assert!(unchanged["data"]["contact"]["reply"].is_null());

        outbox.set_failing(false);
        let (status, _, replied) = send(
            &app,
            "POST",
            &reply_uri,
            Some(json!({"reply": "Thanks!"})),
            &auth,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let contact = &replied["data"]["contact"];
        assert_eq!(contact["status"], "replied");
        assert_eq!(contact["reply"], "Thanks!");
        assert_eq!(contact["repliedBy"], admin.id.to_string());
        assert!(contact["repliedAt"].is_string());
        assert!(mail_to(&outbox, "visitor@x.com", "Re: Question").await.is_some());

        let (_, _, stats) = send(&app, "GET", "/api/v1/contacts/stats", None, &auth).await;
        assert_eq!(stats["data"]["total"], 1);
        assert_eq!(stats["data"]["byStatus"]["replied"], 1);
        assert_eq!(stats["data"]["byStatus"]["new"], 0);

        let (status, _, closed) = send(
            &app,
            "PATCH",
            &format!("{uri}/status"),
            Some(json!({"status": "closed"})),
            &auth,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(closed["data"]["contact"]["status"], "closed");

        let (_, _, listed) =
            send(&app, "GET", "/api/v1/contacts?status=closed", None, &auth).await;
        assert_eq!(listed["data"]["total"], 1);

        let (status, _, _) = send(&app, "DELETE", &uri, None, &auth).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _, _) = send(&app, "GET", &uri, None, &auth).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn listing_requires_admin() {
        let (state, _) = state_with_outbox();
        let (_, token) = seed_user(&state, "u@x.com", Role::User).await;
        let app = build_app(state);
        let auth = bearer(&token);
        let (status, _, _) = send(
            &app,
            "GET",
            "/api/v1/contacts",
            None,
            &[("authorization", auth.as_str())],
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _, _) = send(&app, "GET", "/api/v1/contacts", None, &[]).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn listing_past_the_last_page_is_empty() {
        let (state, _) = state_with_outbox();
        let (_, token) = seed_user(&state, "admin@x.com", Role::Admin).await;
        let app = build_app(state);
        let auth = bearer(&token);
        send(&app, "POST", "/api/v1/contacts", Some(contact_body()), &[]).await;
        let (status, _, body) = send(
            &app,
            "GET",
            "/api/v1/contacts?page=9223372036854775807&limit=100",
            None,
            &[("authorization", auth.as_str())],
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["total"], 1);
        assert!(body["data"]["items"].as_array().unwrap().is_empty());
    }
}
