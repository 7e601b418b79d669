//! Credential lifecycle: signup, login, session issuance, email verification
//! and password reset.
//!
//! Per account there are two independent state machines:
//! `Unverified -> Verified`, driven by the emailed verification token, and
//! `NoResetPending -> ResetPending -> NoResetPending`, driven by the emailed
//! reset token. Tokens are single-use and stored only as digests.
//!
//! Consumption is read-then-write. Two concurrent submissions of the same
//! valid token can both pass validation before either clears it; there is
//! no compare-and-swap on the token column.
use std::{fmt, sync::Arc};

use axum::extract::FromRef;
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    auth::{
        dto::{LoginRequest, ResetPasswordRequest, SignupRequest},
        jwt::JwtKeys,
        password::{
            hash_password_blocking, verify_against_dummy_blocking, verify_password_blocking,
        },
        tokens,
    },
    config::AppConfig,
    db::StoreError,
    error::AppError,
    mail::{self, templates, EmailMessage, Mailer},
    state::AppState,
    users::{
        dto::ChangePasswordRequest,
        repo::UserStore,
        repo_types::{NewUser, Role, UserAccount},
    },
    validation::{is_valid_email, normalize_email, Validator},
};

const MAX_NAME_LEN: usize = 100;

/// Freshly minted credentials for an account.
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub user: UserAccount,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("user_id", &self.user.id)
            .finish()
    }
}

#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserStore>,
    mailer: Arc<dyn Mailer>,
    keys: JwtKeys,
    config: Arc<AppConfig>,
}

impl FromRef<AppState> for AuthService {
    fn from_ref(state: &AppState) -> Self {
        Self {
            users: state.users.clone(),
            mailer: state.mailer.clone(),
            keys: JwtKeys::from_ref(state),
            config: state.config.clone(),
        }
    }
}

fn check_email(email: &str) -> Result<(), AppError> {
    let mut v = Validator::new();
    v.email("email", email);
    v.finish()
}

impl AuthService {
    fn message(&self, to: &str, template: templates::Template) -> EmailMessage {
        EmailMessage::new(&self.config.mail.from, to, template)
    }

    fn frontend(&self) -> &str {
        self.config.frontend_url.trim_end_matches('/')
    }

    fn verification_link(&self, token: &str, email: &str) -> String {
        format!(
            "{}/verify-email?token={token}&email={}",
            self.frontend(),
            urlencoding::encode(email)
        )
    }

    fn reset_link(&self, token: &str) -> String {
        format!("{}/reset-password?token={token}", self.frontend())
    }

    fn verification_ttl(&self) -> TimeDuration {
        TimeDuration::hours(self.config.verification_ttl_hours)
    }

    fn reset_ttl(&self) -> TimeDuration {
        TimeDuration::seconds(self.keys.reset_ttl.as_secs() as i64)
    }

    fn verification_email(&self, user: &UserAccount, raw_token: &str) -> EmailMessage {
        let link = self.verification_link(raw_token, &user.email);
        self.message(
            &user.email,
            templates::verification(
                &user.full_name,
                &link,
                self.config.verification_ttl_hours,
            ),
        )
    }

    /// Create an unverified account and email its verification link.
    /// Delivery failure is logged; the account is still created.
    pub async fn signup(&self, req: SignupRequest) -> Result<UserAccount, AppError> {
        let email = normalize_email(&req.email);
        let full_name = req.full_name.trim().to_string();

        let mut v = Validator::new();
        v.email("email", &email)
            .password("password", &req.password)
            .check(
                req.password == req.confirm_password,
                "confirmPassword",
                "Passwords do not match",
            )
            .required("fullName", &full_name)
            .max_len("fullName", Some(full_name.as_str()), MAX_NAME_LEN);
        v.finish()?;

        if self.users.find_by_email(&email).await?.is_some() {
            warn!(email = %email, "email already registered");
            return Err(AppError::DuplicateAccount);
        }

        let password_hash = hash_password_blocking(req.password).await?;
        let raw_token = tokens::generate_token()?;

        let user = self
            .users
            .create(NewUser {
                email,
                password_hash,
                full_name,
                role: Role::User,
                email_verification: Some(tokens::pending(&raw_token, self.verification_ttl())),
            })
            .await
            .map_err(|e| match e {
                StoreError::DuplicateKey(_) => AppError::DuplicateAccount,
                other => other.into(),
            })?;

        info!(user_id = %user.id, email = %user.email, "user registered");

        let message = self.verification_email(&user, &raw_token);
        if let Err(e) = self.mailer.send(&message).await {
            error!(error = %e, user_id = %user.id, "verification email failed after signup");
        }
        Ok(user)
    }

    /// Issue a new verification token, overwriting any pending one.
    /// Unknown addresses get the same outcome as known ones.
    pub async fn resend_verification(&self, email: &str) -> Result<(), AppError> {
        let email = normalize_email(email);
        check_email(&email)?;

        let Some(mut user) = self.users.find_by_email(&email).await? else {
            info!(email = %email, "resend requested for unknown email");
            return Ok(());
        };
        if user.is_email_verified {
            return Err(AppError::BadRequest("Email is already verified".into()));
        }

        let raw_token = tokens::generate_token()?;
        user.email_verification = Some(tokens::pending(&raw_token, self.verification_ttl()));
        let user = self.users.save(&user).await?;

        let message = self.verification_email(&user, &raw_token);
        self.mailer.send(&message).await.map_err(|e| {
            error!(error = %e, user_id = %user.id, "verification email resend failed");
            AppError::UpstreamFailure(
                "Failed to send verification email. Please try again later.".into(),
            )
        })?;
        info!(user_id = %user.id, "verification email re-sent");
        Ok(())
    }

    /// Consume a verification token. Wrong email, wrong token and expired
    /// token are indistinguishable to the caller.
    pub async fn verify_email(&self, email: &str, token: &str) -> Result<UserAccount, AppError> {
        let email = normalize_email(email);
        let token = token.trim();
        if token.is_empty() || email.is_empty() {
            return Err(AppError::InvalidOrExpiredToken);
        }

        let digest = tokens::digest(token);
        let now = OffsetDateTime::now_utc();
        let mut user = match self.users.find_by_verification_token(&email, &digest).await? {
            Some(u) if u.email_verification.as_ref().is_some_and(|p| p.accepts(&digest, now)) => u,
            _ => {
                warn!(email = %email, "invalid or expired verification token");
                return Err(AppError::InvalidOrExpiredToken);
            }
        };

        user.is_email_verified = true;
        user.email_verification = None;
        let user = self.users.save(&user).await?;
        info!(user_id = %user.id, "email verified");

        mail::send_best_effort(
            self.mailer.clone(),
            self.message(&user.email, templates::welcome(&user.full_name)),
            "welcome",
        );
        Ok(user)
    }

    pub fn issue_session(&self, user: UserAccount) -> Result<Session, AppError> {
        let access_token = self.keys.sign_access(user.id)?;
        let refresh_token = self.keys.sign_refresh(user.id)?;
        Ok(Session {
            access_token,
            refresh_token,
            user,
        })
    }

    /// Rotate credentials for the subject of an already-validated refresh token.
    pub async fn session_for(&self, user_id: Uuid) -> Result<Session, AppError> {
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(AppError::Unauthenticated("Account no longer exists"))?;
        self.issue_session(user)
    }

    pub async fn login(&self, req: LoginRequest) -> Result<Session, AppError> {
        let email = normalize_email(&req.email);
        if !is_valid_email(&email) {
            return Err(AppError::InvalidCredentials);
        }

        let Some(mut user) = self.users.find_by_email(&email).await? else {
            warn!(email = %email, "login unknown email");
            verify_against_dummy_blocking(req.password).await;
            return Err(AppError::InvalidCredentials);
        };

        if !user.is_email_verified {
            warn!(user_id = %user.id, "login before email verification");
            return Err(AppError::EmailNotVerified);
        }

        let ok = verify_password_blocking(req.password, user.password_hash.clone()).await?;
        if !ok {
            warn!(user_id = %user.id, "login invalid password");
            return Err(AppError::InvalidCredentials);
        }

        user.last_login_at = Some(OffsetDateTime::now_utc());
        let user = self.users.save(&user).await?;
        info!(user_id = %user.id, "user logged in");
        self.issue_session(user)
    }

    /// Start a password reset. The outcome for an unknown address is the
    /// same as for a known one; a delivery failure for a real account is
    /// surfaced as `UpstreamFailure`.
    pub async fn forgot_password(&self, email: &str) -> Result<(), AppError> {
        let email = normalize_email(email);
        check_email(&email)?;

        let Some(mut user) = self.users.find_by_email(&email).await? else {
            info!(email = %email, "password reset requested for unknown email");
            return Ok(());
        };

        let raw_token = self.keys.sign_reset(user.id)?;
        user.password_reset = Some(tokens::pending(&raw_token, self.reset_ttl()));
        let mut user = self.users.save(&user).await?;

        let message = self.message(
            &user.email,
            templates::password_reset(
                &user.full_name,
                &self.reset_link(&raw_token),
                self.reset_ttl().whole_minutes(),
            ),
        );
        if let Err(e) = self.mailer.send(&message).await {
            error!(error = %e, user_id = %user.id, "password reset email failed");
            user.password_reset = None;
            if let Err(e) = self.users.save(&user).await {
                error!(error = %e, user_id = %user.id, "failed to clear unsent reset token");
            }
            return Err(AppError::UpstreamFailure(
                "Failed to send password reset email. Please try again later.".into(),
            ));
        }
        info!(user_id = %user.id, "password reset email sent");
        Ok(())
    }

    /// Read-only check of a presented reset token against the stored one.
    pub async fn verify_reset_token(&self, token: &str) -> Result<UserAccount, AppError> {
        let claims = self.keys.verify_reset(token.trim()).map_err(|e| {
            warn!(error = %e, "reset token rejected");
            AppError::InvalidOrExpiredToken
        })?;
        let user = self
            .users
            .find_by_id(claims.sub)
            .await?
            .ok_or(AppError::InvalidOrExpiredToken)?;

        let digest = tokens::digest(token.trim());
        let now = OffsetDateTime::now_utc();
        match &user.password_reset {
            Some(pending) if pending.accepts(&digest, now) => Ok(user),
            _ => {
                warn!(user_id = %user.id, "reset token not pending or expired");
                Err(AppError::InvalidOrExpiredToken)
            }
        }
    }

    pub async fn reset_password(&self, req: ResetPasswordRequest) -> Result<(), AppError> {
        let mut v = Validator::new();
        v.required("token", &req.token)
            .password("password", &req.password)
            .check(
                req.password == req.confirm_password,
                "confirmPassword",
                "Passwords do not match",
            );
        v.finish()?;

        let mut user = self.verify_reset_token(&req.token).await?;
        user.password_hash = hash_password_blocking(req.password).await?;
        user.password_reset = None;
        let user = self.users.save(&user).await?;
        info!(user_id = %user.id, "password reset completed");

        mail::send_best_effort(
            self.mailer.clone(),
            self.message(&user.email, templates::password_changed(&user.full_name)),
            "password_changed",
        );
        Ok(())
    }

    pub async fn change_password(
        &self,
        mut user: UserAccount,
        req: ChangePasswordRequest,
    ) -> Result<UserAccount, AppError> {
        let mut v = Validator::new();
        v.required("currentPassword", &req.current_password)
            .password("newPassword", &req.new_password)
            .check(
                req.new_password == req.confirm_password,
                "confirmPassword",
                "Passwords do not match",
            );
        v.finish()?;

        let ok = verify_password_blocking(req.current_password, user.password_hash.clone()).await?;
        if !ok {
            warn!(user_id = %user.id, "change password with wrong current password");
            return Err(AppError::BadRequest("Current password is incorrect".into()));
        }

        user.password_hash = hash_password_blocking(req.new_password).await?;
        user.password_reset = None;
        let user = self.users.save(&user).await?;
        info!(user_id = %user.id, "password changed");

        mail::send_best_effort(
            self.mailer.clone(),
            self.message(&user.email, templates::password_changed(&user.full_name)),
            "password_changed",
        );
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mail::MemoryOutbox;
    use crate::test_support::{mail_to, state_with_outbox, token_from_link};

    fn signup_req(email: &str) -> SignupRequest {
        SignupRequest {
            email: email.into(),
            password: "longenough1".into(),
            confirm_password: "longenough1".into(),
            full_name: "A".into(),
        }
    }

    fn login_req(email: &str, password: &str) -> LoginRequest {
        LoginRequest {
            email: email.into(),
            password: password.into(),
        }
    }

    async fn service() -> (AuthService, AppState, Arc<MemoryOutbox>) {
        let (state, outbox) = state_with_outbox();
        (AuthService::from_ref(&state), state, outbox)
    }

    async fn verification_token(outbox: &MemoryOutbox, email: &str) -> String {
        let mail = mail_to(outbox, email, "Verify your email address")
            .await
            .expect("verification email");
        token_from_link(&mail.text, "token=").expect("token in link")
    }

    #[tokio::test]
    async fn signup_stores_hash_not_plaintext() {
        let (svc, state, _) = service().await;
        let user = svc.signup(signup_req("A@X.com")).await.unwrap();
        assert_eq!(user.email, "a@x.com");
        assert!(!user.is_email_verified);
        assert_ne!(user.password_hash, "longenough1");
        let stored = state.users.find_by_id(user.id).await.unwrap().unwrap();
        assert_ne!(stored.password_hash, "longenough1");
        let pending = stored.email_verification.expect("pending verification");
        assert!(pending.expires_at > OffsetDateTime::now_utc() + TimeDuration::hours(23));
    }

    #[tokio::test]
    async fn signup_succeeds_when_mail_fails() {
        let (svc, _, outbox) = service().await;
        outbox.set_failing(true);
        assert!(svc.signup(signup_req("a@x.com")).await.is_ok());
    }

    #[tokio::test]
    async fn duplicate_signup_is_rejected() {
        let (svc, _, _) = service().await;
        svc.signup(signup_req("a@x.com")).await.unwrap();
        let err = svc.signup(signup_req(" a@X.COM")).await.unwrap_err();
        assert!(matches!(err, AppError::DuplicateAccount));
    }

    #[tokio::test]
    async fn mismatched_confirmation_is_a_validation_error() {
        let (svc, _, _) = service().await;
        let mut req = signup_req("a@x.com");
        req.confirm_password = "different1".into();
        let err = svc.signup(req).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(ref e) if e[0].field == "confirmPassword"));
    }

    #[tokio::test]
    async fn unknown_email_login_is_invalid_credentials() {
        let (svc, _, _) = service().await;
        let err = svc.login(login_req("ghost@x.com", "longenough1")).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidCredentials));
    }

    #[tokio::test]
    async fn session_debug_hides_tokens() {
        let (svc, _, outbox) = service().await;
        let user = verified_user(&svc, &outbox, "a@x.com").await;
        let session = svc.issue_session(user).unwrap();
        let printed = format!("{session:?}");
        assert!(printed.contains("<redacted>"));
        assert!(!printed.contains(&session.access_token));
        assert!(!printed.contains(&session.refresh_token));
    }

    #[tokio::test]
    async fn login_before_verification_fails_regardless_of_password() {
        let (svc, _, _) = service().await;
        svc.signup(signup_req("a@x.com")).await.unwrap();
        for password in ["longenough1", "wrong-password9"] {
            let err = svc.login(login_req("a@x.com", password)).await.unwrap_err();
            assert!(matches!(err, AppError::EmailNotVerified));
        }
    }

    #[tokio::test]
    async fn verification_token_is_single_use() {
        let (svc, _, outbox) = service().await;
        svc.signup(signup_req("a@x.com")).await.unwrap();
        let token = verification_token(&outbox, "a@x.com").await;

        let user = svc.verify_email("a@x.com", &token).await.unwrap();
        assert!(user.is_email_verified);
        assert!(user.email_verification.is_none());

        let err = svc.verify_email("a@x.com", &token).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidOrExpiredToken));

        let session = svc.login(login_req("a@x.com", "longenough1")).await.unwrap();
        assert!(!session.access_token.is_empty());
        assert!(session.user.last_login_at.is_some());
    }

    #[tokio::test]
    async fn token_for_another_email_is_rejected() {
        let (svc, _, outbox) = service().await;
        svc.signup(signup_req("a@x.com")).await.unwrap();
        svc.signup(signup_req("b@x.com")).await.unwrap();
        let token = verification_token(&outbox, "a@x.com").await;
        let err = svc.verify_email("b@x.com", &token).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidOrExpiredToken));
    }

    #[tokio::test]
    async fn expired_verification_token_is_rejected() {
        let (svc, state, outbox) = service().await;
        let user = svc.signup(signup_req("a@x.com")).await.unwrap();
        let token = verification_token(&outbox, "a@x.com").await;

        let mut stored = state.users.find_by_id(user.id).await.unwrap().unwrap();
        if let Some(p) = stored.email_verification.as_mut() {
            p.expires_at = OffsetDateTime::now_utc() - TimeDuration::minutes(1);
        }
        state.users.save(&stored).await.unwrap();

        let err = svc.verify_email("a@x.com", &token).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidOrExpiredToken));
    }

    #[tokio::test]
    async fn resend_invalidates_previous_token() {
        let (svc, _, outbox) = service().await;
        svc.signup(signup_req("a@x.com")).await.unwrap();
        let old = verification_token(&outbox, "a@x.com").await;

        svc.resend_verification("a@x.com").await.unwrap();
        let new = verification_token(&outbox, "a@x.com").await;
        assert_ne!(old, new);

        assert!(matches!(
            svc.verify_email("a@x.com", &old).await.unwrap_err(),
            AppError::InvalidOrExpiredToken
        ));
        assert!(svc.verify_email("a@x.com", &new).await.is_ok());
    }

    #[tokio::test]
    async fn resend_rules() {
        let (svc, _, outbox) = service().await;
        assert!(svc.resend_verification("nobody@x.com").await.is_ok());

        svc.signup(signup_req("a@x.com")).await.unwrap();
        outbox.set_failing(true);
        assert!(matches!(
            svc.resend_verification("a@x.com").await.unwrap_err(),
            AppError::UpstreamFailure(_)
        ));
        outbox.set_failing(false);
        svc.resend_verification("a@x.com").await.unwrap();
        let token = verification_token(&outbox, "a@x.com").await;
        svc.verify_email("a@x.com", &token).await.unwrap();

        assert!(matches!(
            svc.resend_verification("a@x.com").await.unwrap_err(),
            AppError::BadRequest(_)
        ));
    }

    async fn verified_user(svc: &AuthService, outbox: &MemoryOutbox, email: &str) -> UserAccount {
        svc.signup(signup_req(email)).await.unwrap();
        let token = verification_token(outbox, email).await;
        svc.verify_email(email, &token).await.unwrap()
    }

    async fn reset_token(outbox: &MemoryOutbox, email: &str) -> String {
        let mail = mail_to(outbox, email, "Reset your password")
            .await
            .expect("reset email");
        token_from_link(&mail.text, "token=").expect("token in link")
    }

    #[tokio::test]
    async fn password_reset_lifecycle() {
        let (svc, state, outbox) = service().await;
        let user = verified_user(&svc, &outbox, "a@x.com").await;

        svc.forgot_password("a@x.com").await.unwrap();
        let token = reset_token(&outbox, "a@x.com").await;
        assert_eq!(svc.verify_reset_token(&token).await.unwrap().id, user.id);

        svc.reset_password(ResetPasswordRequest {
            token: token.clone(),
            password: "brandnew22".into(),
            confirm_password: "brandnew22".into(),
        })
        .await
        .unwrap();

        let stored = state.users.find_by_id(user.id).await.unwrap().unwrap();
        assert!(stored.password_reset.is_none());
        assert!(matches!(
            svc.verify_reset_token(&token).await.unwrap_err(),
            AppError::InvalidOrExpiredToken
        ));
        assert!(matches!(
            svc.login(login_req("a@x.com", "longenough1")).await.unwrap_err(),
            AppError::InvalidCredentials
        ));
        assert!(svc.login(login_req("a@x.com", "brandnew22")).await.is_ok());
    }

    #[tokio::test]
    async fn expired_reset_token_fails_even_if_well_formed() {
        let (svc, state, outbox) = service().await;
        let user = verified_user(&svc, &outbox, "a@x.com").await;
        svc.forgot_password("a@x.com").await.unwrap();
        let token = reset_token(&outbox, "a@x.com").await;

        let mut stored = state.users.find_by_id(user.id).await.unwrap().unwrap();
        if let Some(p) = stored.password_reset.as_mut() {
            p.expires_at = OffsetDateTime::now_utc() - TimeDuration::seconds(1);
        }
        state.users.save(&stored).await.unwrap();

        assert!(matches!(
            svc.verify_reset_token(&token).await.unwrap_err(),
            AppError::InvalidOrExpiredToken
        ));
    }

    #[tokio::test]
    async fn superseded_reset_token_is_rejected() {
        let (svc, _, outbox) = service().await;
        verified_user(&svc, &outbox, "a@x.com").await;
        svc.forgot_password("a@x.com").await.unwrap();
        let first = reset_token(&outbox, "a@x.com").await;
        // Tokens minted within the same second would be identical JWTs.
        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
        svc.forgot_password("a@x.com").await.unwrap();
        let second = reset_token(&outbox, "a@x.com").await;
        assert_ne!(first, second);
        assert!(svc.verify_reset_token(&first).await.is_err());
        assert!(svc.verify_reset_token(&second).await.is_ok());
    }

    #[tokio::test]
    async fn forgot_password_for_unknown_email_sends_nothing() {
        let (svc, _, outbox) = service().await;
        svc.forgot_password("ghost@x.com").await.unwrap();
        assert!(outbox.last_to("ghost@x.com").await.is_none());
    }

    #[tokio::test]
    async fn forgot_password_surfaces_mail_failure_and_clears_token() {
        let (svc, state, outbox) = service().await;
        let user = verified_user(&svc, &outbox, "a@x.com").await;
        outbox.set_failing(true);
        let err = svc.forgot_password("a@x.com").await.unwrap_err();
        assert!(matches!(err, AppError::UpstreamFailure(_)));
        let stored = state.users.find_by_id(user.id).await.unwrap().unwrap();
        assert!(stored.password_reset.is_none());
    }

    #[tokio::test]
    async fn change_password_requires_current_password() {
        let (svc, _, outbox) = service().await;
        let user = verified_user(&svc, &outbox, "a@x.com").await;
        let err = svc
            .change_password(
                user.clone(),
                ChangePasswordRequest {
                    current_password: "wrongpass1".into(),
                    new_password: "brandnew22".into(),
                    confirm_password: "brandnew22".into(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));

        svc.change_password(
            user,
            ChangePasswordRequest {
                current_password: "longenough1".into(),
                new_password: "brandnew22".into(),
                confirm_password: "brandnew22".into(),
            },
        )
        .await
        .unwrap();
        assert!(svc.login(login_req("a@x.com", "brandnew22")).await.is_ok());
    }
}
