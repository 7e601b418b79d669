use std::{net::SocketAddr, str::FromStr};

use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Production,
}

impl FromStr for Environment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(Environment::Production),
            "development" | "dev" | "test" => Ok(Environment::Development),
            other => anyhow::bail!("unsupported APP_ENV '{other}'"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
    pub reset_ttl_minutes: i64,
}

/// How outbound email leaves the process.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub enum MailTransport {
    /// Log the message instead of sending it.
    Log,
    /// POST the message as JSON to an HTTP email API.
    Http { endpoint: String, api_key: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    pub from: String,
    pub primary: MailTransport,
    pub fallback: Option<MailTransport>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    /// Address the HTTP listener binds to.
    pub listen_addr: SocketAddr,
    pub environment: Environment,
    /// Base URL used to build links in outbound email.
    pub frontend_url: String,
    pub verification_ttl_hours: i64,
    pub jwt: JwtConfig,
    pub mail: MailConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let environment = match std::env::var("APP_ENV") {
            Ok(v) => v.parse()?,
            Err(_) => Environment::Development,
        };
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "rosterd".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "rosterd-users".into()),
            ttl_minutes: env_or("JWT_TTL_MINUTES", 15),
            refresh_ttl_minutes: env_or("JWT_REFRESH_TTL_MINUTES", 60 * 24 * 7),
            reset_ttl_minutes: env_or("JWT_RESET_TTL_MINUTES", 60),
        };
        let mail = MailConfig {
            from: std::env::var("MAIL_FROM")
                .unwrap_or_else(|_| "Rosterd <no-reply@localhost>".into()),
            primary: http_transport("MAIL_API_URL", "MAIL_API_KEY").unwrap_or(MailTransport::Log),
            fallback: http_transport("MAIL_FALLBACK_API_URL", "MAIL_FALLBACK_API_KEY"),
        };
        let listen_addr = listen_addr(
            &std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            &std::env::var("APP_PORT").unwrap_or_else(|_| "8080".into()),
        )?;
        Ok(Self {
            database_url,
            listen_addr,
            environment,
            frontend_url: std::env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:3000".into()),
            verification_ttl_hours: env_or("EMAIL_VERIFICATION_TTL_HOURS", 24),
            jwt,
            mail,
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

fn listen_addr(host: &str, port: &str) -> anyhow::Result<SocketAddr> {
    format!("{}:{}", host.trim(), port.trim())
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid APP_HOST/APP_PORT '{host}:{port}': {e}"))
}

fn http_transport(url_key: &str, key_key: &str) -> Option<MailTransport> {
    let endpoint = std::env::var(url_key).ok().filter(|v| !v.trim().is_empty())?;
    let api_key = std::env::var(key_key).unwrap_or_default();
    Some(MailTransport::Http { endpoint, api_key })
}
