use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub host: String,
    pub port: u16,
    pub client_url: String,
    pub auth: AuthConfig,
    pub smtp: Option<SmtpConfig>,
}

/// Signing secrets, token lifetimes and cookie policy.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_refresh_secret: String,
    pub jwt_reset_secret: String,
    pub access_ttl_secs: u64,
    pub refresh_ttl_secs: u64,
    pub remember_refresh_ttl_secs: u64,
    pub reset_ttl_secs: u64,
    /// Enables `Secure` and `SameSite=Strict` on every auth cookie.
    pub production: bool,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let jwt_secret = required("JWT_SECRET")?;
        let auth = AuthConfig {
            jwt_refresh_secret: required("JWT_REFRESH_SECRET")?,
            jwt_reset_secret: env::var("JWT_RESET_SECRET")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| jwt_secret.clone()),
            jwt_secret,
            access_ttl_secs: duration_var("JWT_EXPIRE", "15m")?,
            refresh_ttl_secs: duration_var("JWT_REFRESH_EXPIRE", "7d")?,
            remember_refresh_ttl_secs: duration_var("JWT_REMEMBER_REFRESH_EXPIRE", "30d")?,
            reset_ttl_secs: duration_var("JWT_RESET_EXPIRE", "15m")?,
            production: env::var("APP_ENV").map(|v| v == "production").unwrap_or(false),
        };

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            redis_url: env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into()),
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "3000".into())
                .parse()?,
            client_url: env::var("CLIENT_URL").unwrap_or_else(|_| "http://localhost:5173".into()),
            auth,
            smtp: smtp_from_env(),
        })
    }
}

/// SMTP is optional: all of host, username, password and sender must be set.
fn smtp_from_env() -> Option<SmtpConfig> {
    let var = |key: &str| env::var(key).ok().filter(|s| !s.is_empty());
    Some(SmtpConfig {
        host: var("SMTP_HOST")?,
        port: var("SMTP_PORT").and_then(|v| v.parse().ok()).unwrap_or(587),
        username: var("SMTP_USERNAME")?,
        password: var("SMTP_PASSWORD")?,
        from: var("SMTP_FROM")?,
    })
}

fn required(key: &str) -> anyhow::Result<String> {
    env::var(key).map_err(|_| anyhow::anyhow!("Missing required env var: {}", key))
}

fn duration_var(key: &str, default: &str) -> anyhow::Result<u64> {
    let raw = env::var(key).unwrap_or_else(|_| default.into());
    parse_duration_secs(&raw).map_err(|e| anyhow::anyhow!("Invalid {key}: {e}"))
}

/// Longest accepted expiry; keeps every TTL representable as a signed timestamp offset.
pub const MAX_DURATION_SECS: u64 = u32::MAX as u64;

/// Parses expiry strings such as `900`, `45s`, `15m`, `12h` or `7d` into seconds.
pub fn parse_duration_secs(raw: &str) -> anyhow::Result<u64> {
    let raw = raw.trim();
    let (digits, unit) = match raw.char_indices().last() {
        Some((idx, c)) if c.is_ascii_alphabetic() => (&raw[..idx], c),
        Some(_) => (raw, 's'),
        None => anyhow::bail!("empty duration"),
    };
    let value: u64 = digits
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("not a duration: {raw:?}"))?;
    let multiplier = match unit {
        's' => 1,
        'm' => 60,
        'h' => 3_600,
        'd' => 86_400,
        other => anyhow::bail!("unknown duration unit {other:?}"),
    };
    value
        .checked_mul(multiplier)
        .filter(|secs| *secs <= MAX_DURATION_SECS)
        .ok_or_else(|| anyhow::anyhow!("duration too large: {raw:?}"))
}
