use chrono::Utc;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

use crate::{
    config::AuthConfig,
    models::auth::{Claims, Identity, ResetClaims},
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("invalid token")]
    Invalid,
    #[error("token expired")]
    Expired,
}

/// The three token classes. Each has its own secret and audience so a token
/// minted for one purpose never verifies as another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
    Reset,
}

impl TokenKind {
    pub fn audience(self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
            TokenKind::Reset => "reset",
        }
    }
}

struct SigningKey {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SigningKey {
    fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

/// Stateless HS256 issuance and verification of access, refresh and reset tokens.
pub struct TokenService {
    access: SigningKey,
    refresh: SigningKey,
    reset: SigningKey,
    access_ttl: u64,
    refresh_ttl: u64,
    remember_refresh_ttl: u64,
    reset_ttl: u64,
}

impl TokenService {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            access: SigningKey::from_secret(&config.jwt_secret),
            refresh: SigningKey::from_secret(&config.jwt_refresh_secret),
            reset: SigningKey::from_secret(&config.jwt_reset_secret),
            access_ttl: config.access_ttl_secs,
            refresh_ttl: config.refresh_ttl_secs,
            remember_refresh_ttl: config.remember_refresh_ttl_secs,
            reset_ttl: config.reset_ttl_secs,
        }
    }

    pub fn access_ttl(&self) -> u64 {
        self.access_ttl
    }

    pub fn refresh_ttl(&self, remember: bool) -> u64 {
        if remember {
            self.remember_refresh_ttl
        } else {
            self.refresh_ttl
        }
    }

    pub fn reset_ttl(&self) -> u64 {
        self.reset_ttl
    }

    pub fn issue_access_token(&self, identity: &Identity) -> anyhow::Result<String> {
        let claims = Self::identity_claims(identity, TokenKind::Access, self.access_ttl);
        self.sign(TokenKind::Access, &claims)
    }

    pub fn issue_refresh_token(&self, identity: &Identity, remember: bool) -> anyhow::Result<String> {
        let claims = Self::identity_claims(identity, TokenKind::Refresh, self.refresh_ttl(remember));
        self.sign(TokenKind::Refresh, &claims)
    }

    pub fn issue_reset_token(&self, email: &str) -> anyhow::Result<String> {
        let now = Utc::now().timestamp();
        let claims = ResetClaims {
            email: email.to_string(),
            aud: TokenKind::Reset.audience().to_string(),
            iat: now,
            exp: expires_at(now, self.reset_ttl),
        };
        self.sign(TokenKind::Reset, &claims)
    }

    pub fn verify_access(&self, token: &str) -> Result<Identity, TokenError> {
        self.verify::<Claims>(token, TokenKind::Access)
            .map(|c| c.identity())
    }

    pub fn verify_refresh(&self, token: &str) -> Result<Identity, TokenError> {
        self.verify::<Claims>(token, TokenKind::Refresh)
            .map(|c| c.identity())
    }

    /// Returns the email the reset token was issued for.
    pub fn verify_reset(&self, token: &str) -> Result<String, TokenError> {
        self.verify::<ResetClaims>(token, TokenKind::Reset)
            .map(|c| c.email)
    }

    pub fn verify<C: DeserializeOwned>(&self, token: &str, kind: TokenKind) -> Result<C, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;
        validation.set_audience(&[kind.audience()]);

        decode::<C>(token, &self.key(kind).decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            })
    }

    fn identity_claims(identity: &Identity, kind: TokenKind, ttl: u64) -> Claims {
        let now = Utc::now().timestamp();
        Claims {
            id: identity.id,
            role: identity.role.clone(),
            aud: kind.audience().to_string(),
            iat: now,
            exp: expires_at(now, ttl),
        }
    }

    pub(crate) fn sign<C: Serialize>(&self, kind: TokenKind, claims: &C) -> anyhow::Result<String> {
        let token = encode(
            &Header::new(Algorithm::HS256),
            claims,
            &self.key(kind).encoding,
        )?;
        Ok(token)
    }

    fn key(&self, kind: TokenKind) -> &SigningKey {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
            TokenKind::Reset => &self.reset,
        }
    }
}

/// `now + ttl`, saturating instead of wrapping for out-of-range TTLs.
fn expires_at(now: i64, ttl: u64) -> i64 {
    now.saturating_add(i64::try_from(ttl).unwrap_or(i64::MAX))
}
