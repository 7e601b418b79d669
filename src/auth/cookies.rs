//! Refresh-token cookie carrier.
use axum::http::{
    header::{InvalidHeaderValue, COOKIE},
    HeaderMap, HeaderValue,
};

use crate::config::AppConfig;

pub const REFRESH_COOKIE_NAME: &str = "refreshToken";

fn attributes(config: &AppConfig) -> &'static str {
    // Cross-site frontends need SameSite=None, which browsers only honour with Secure.
    if config.is_production() {
        "Path=/; HttpOnly; Secure; SameSite=None"
    } else {
        "Path=/; HttpOnly; SameSite=Lax"
    }
}

/// Build the `Set-Cookie` value that carries a refresh token.
pub fn refresh_cookie(config: &AppConfig, token: &str) -> Result<HeaderValue, InvalidHeaderValue> {
    let max_age = config.jwt.refresh_ttl_minutes.max(0) * 60;
    HeaderValue::from_str(&format!(
        "{REFRESH_COOKIE_NAME}={token}; {}; Max-Age={max_age}",
        attributes(config)
    ))
}

pub fn clear_refresh_cookie(config: &AppConfig) -> Result<HeaderValue, InvalidHeaderValue> {
    HeaderValue::from_str(&format!(
        "{REFRESH_COOKIE_NAME}=; {}; Max-Age=0",
        attributes(config)
    ))
}

pub fn extract_refresh_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == REFRESH_COOKIE_NAME)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
