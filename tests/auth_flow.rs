use std::sync::Arc;

use axum::{
    body::Body,
    http::{header::SET_COOKIE, HeaderMap, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use rosterd::{
    app::build_app,
    config::{AppConfig, Environment, JwtConfig, MailConfig, MailTransport},
    mail::{EmailMessage, MemoryOutbox},
    state::AppState,
};

fn config() -> AppConfig {
    AppConfig {
        database_url: "postgres://unused".into(),
        listen_addr: ([127, 0, 0, 1], 0).into(),
        environment: Environment::Development,
        frontend_url: "http://localhost:3000".into(),
        verification_ttl_hours: 24,
        jwt: JwtConfig {
            secret: "integration-secret".into(),
            issuer: "rosterd".into(),
            audience: "rosterd-users".into(),
            ttl_minutes: 15,
            refresh_ttl_minutes: 60 * 24 * 7,
            reset_ttl_minutes: 60,
        },
        mail: MailConfig {
            from: "Rosterd <no-reply@test.local>".into(),
            primary: MailTransport::Log,
            fallback: None,
        },
    }
}

struct Harness {
    app: Router,
    state: AppState,
    outbox: Arc<MemoryOutbox>,
}

impl Harness {
    fn new() -> Self {
        let outbox = Arc::new(MemoryOutbox::new());
        let state = AppState::in_memory(config(), outbox.clone());
        Self {
            app: build_app(state.clone()),
            state,
            outbox,
        }
    }

    async fn call(
        &self,
        method: &str,
        uri: &str,
        body: Option<Value>,
        cookie: Option<&str>,
    ) -> (StatusCode, HeaderMap, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header("cookie", cookie);
        }
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, headers, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    async fn mail(&self, to: &str, subject: &str) -> EmailMessage {
        for _ in 0..50 {
            if let Some(m) = self
                .outbox
                .sent()
                .await
                .into_iter()
                .rev()
                .find(|m| m.to == to && m.subject == subject)
            {
                return m;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("no '{subject}' email to {to}");
    }

    async fn signup(&self, email: &str) -> (StatusCode, Value) {
        let (status, _, body) = self
            .call(
                "POST",
                "/api/v1/auth/signup",
                Some(json!({
                    "email": email,
                    "password": "longenough1",
                    "confirmPassword": "longenough1",
                    "fullName": "A"
                })),
                None,
            )
            .await;
        (status, body)
    }

    async fn login(&self, email: &str, password: &str) -> (StatusCode, HeaderMap, Value) {
        self.call(
            "POST",
            "/api/v1/auth/login",
            Some(json!({"email": email, "password": password})),
            None,
        )
        .await
    }

    async fn verify(&self, email: &str, token: &str) -> StatusCode {
        let uri = format!(
            "/api/v1/auth/verify-email?token={token}&email={}",
            email.replace('@', "%40")
        );
        self.call("GET", &uri, None, None).await.0
    }
}

fn token_after(text: &str, marker: &str) -> String {
    let start = text.find(marker).expect("marker in link") + marker.len();
    text[start..]
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        .collect()
}

fn refresh_cookie(headers: &HeaderMap) -> String {
    let raw = headers.get(SET_COOKIE).expect("set-cookie").to_str().unwrap();
    raw.split(';').next().unwrap().to_string()
}

#[tokio::test]
async fn signup_verify_login_scenario() {
    let h = Harness::new();

    let (status, body) = h.signup("a@x.com").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["user"]["isEmailVerified"], false);

    let (status, _, body) = h.login("a@x.com", "longenough1").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["message"].as_str().unwrap().contains("verify your email"));

    let mail = h.mail("a@x.com", "Verify your email address").await;
    let token = token_after(&mail.text, "token=");
    assert_eq!(h.verify("a@x.com", &token).await, StatusCode::OK);

    let (status, headers, body) = h.login("a@x.com", "longenough1").await;
    assert_eq!(status, StatusCode::OK);
    assert!(!body["data"]["accessToken"].as_str().unwrap().is_empty());
    let cookie = headers.get(SET_COOKIE).unwrap().to_str().unwrap();
    assert!(cookie.starts_with("refreshToken="));
    assert!(cookie.contains("HttpOnly"));

    let stored = h
        .state
        .users
        .find_by_email("a@x.com")
        .await
        .unwrap()
        .unwrap();
    assert_ne!(stored.password_hash, "longenough1");
}

#[tokio::test]
async fn unverified_login_error_is_independent_of_password() {
    let h = Harness::new();
    h.signup("a@x.com").await;
    let (s1, _, b1) = h.login("a@x.com", "longenough1").await;
    let (s2, _, b2) = h.login("a@x.com", "totallywrong9").await;
    assert_eq!(s1, s2);
    assert_eq!(b1, b2);
}

#[tokio::test]
async fn consumed_verification_token_cannot_be_reused() {
    let h = Harness::new();
    h.signup("a@x.com").await;
    let token = token_after(
        &h.mail("a@x.com", "Verify your email address").await.text,
        "token=",
    );
    assert_eq!(h.verify("a@x.com", &token).await, StatusCode::OK);
    assert_eq!(h.verify("a@x.com", &token).await, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn duplicate_signup_conflicts() {
    let h = Harness::new();
    assert_eq!(h.signup("a@x.com").await.0, StatusCode::CREATED);
    let (status, body) = h.signup("A@x.com").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn forgot_password_responses_do_not_reveal_accounts() {
    let h = Harness::new();
    h.signup("a@x.com").await;

    let known = h
        .call(
            "POST",
            "/api/v1/auth/forgot-password",
            Some(json!({"email": "a@x.com"})),
            None,
        )
        .await;
    let unknown = h
        .call(
            "POST",
            "/api/v1/auth/forgot-password",
            Some(json!({"email": "ghost@x.com"})),
            None,
        )
        .await;
    assert_eq!(known.0, StatusCode::OK);
    assert_eq!(known.0, unknown.0);
    assert_eq!(known.2, unknown.2);
}

#[tokio::test]
async fn reset_flow_over_http() {
    let h = Harness::new();
    h.signup("a@x.com").await;
    let token = token_after(
        &h.mail("a@x.com", "Verify your email address").await.text,
        "token=",
    );
    h.verify("a@x.com", &token).await;

    h.call(
        "POST",
        "/api/v1/auth/forgot-password",
        Some(json!({"email": "a@x.com"})),
        None,
    )
    .await;
    let reset = token_after(&h.mail("a@x.com", "Reset your password").await.text, "token=");

    let (status, _, body) = h
        .call(
            "GET",
            &format!("/api/v1/auth/verify-reset-token?token={reset}"),
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["valid"], true);
    assert_eq!(body["data"]["email"], "a@x.com");

    let (status, _, _) = h
        .call(
            "POST",
            "/api/v1/auth/reset-password",
            Some(json!({
                "token": reset,
                "password": "brandnew22",
                "confirmPassword": "brandnew22"
            })),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, _) = h
        .call(
            "POST",
            "/api/v1/auth/reset-password",
            Some(json!({
                "token": reset,
                "password": "another333",
                "confirmPassword": "another333"
            })),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(h.login("a@x.com", "brandnew22").await.0, StatusCode::OK);
    h.mail("a@x.com", "Your password was changed").await;
}

#[tokio::test]
async fn refresh_issues_new_access_token_and_cookie() {
    let h = Harness::new();
    h.signup("a@x.com").await;
    let token = token_after(
        &h.mail("a@x.com", "Verify your email address").await.text,
        "token=",
    );
    h.verify("a@x.com", &token).await;
    let (_, headers, login) = h.login("a@x.com", "longenough1").await;
    let cookie = refresh_cookie(&headers);

    tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
    let (status, headers, body) = h
        .call("POST", "/api/v1/auth/refresh-token", None, Some(&cookie))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_ne!(body["data"]["accessToken"], login["data"]["accessToken"]);
    assert_ne!(refresh_cookie(&headers), cookie);

    let access = body["data"]["accessToken"].as_str().unwrap().to_string();
    let request = Request::builder()
        .uri("/api/v1/users/me")
        .header("authorization", format!("Bearer {access}"))
        .body(Body::empty())
        .unwrap();
    let response = h.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn health_is_public() {
    let h = Harness::new();
    let (status, _, body) = h.call("GET", "/api/v1/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
}
