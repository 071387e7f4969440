use std::sync::Arc;

use crate::{
    db::UserStore,
    error::{AppError, AppResult},
    models::{auth::Identity, user::User},
    services::{
        email::{otp_email, Mailer},
        otp::OtpService,
        password::{hash_password, verify_password},
        token::TokenService,
    },
};

const INVALID_CREDENTIALS: &str = "Invalid email or password";

/// Tokens minted by a successful login.
pub struct LoginOutcome {
    pub user: User,
    pub access_token: String,
    pub refresh_token: String,
    pub remember: bool,
}

/// Login, refresh, forgot/verify/reset password flows.
pub struct AuthService {
    users: Arc<dyn UserStore>,
    tokens: Arc<TokenService>,
    otp: OtpService,
    mailer: Arc<dyn Mailer>,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserStore>,
        tokens: Arc<TokenService>,
        otp: OtpService,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        Self { users, tokens, otp, mailer }
    }

    /// Unknown email and wrong password fail with the same error.
    pub async fn login(&self, email: &str, password: &str, remember: bool) -> AppResult<LoginOutcome> {
        let Some(user) = self.users.find_by_email(email).await? else {
            tracing::info!("login rejected: unknown email");
            return Err(AppError::unauthorized(INVALID_CREDENTIALS));
        };

        if !verify_password(password, &user.password_hash).await? {
            tracing::info!(user_id = user.id, "login rejected: wrong password");
            return Err(AppError::unauthorized(INVALID_CREDENTIALS));
        }

        if !user.active {
            tracing::info!(user_id = user.id, "login rejected: account deactivated");
            return Err(AppError::forbidden("Account is deactivated"));
        }

        let identity = Identity {
            id: user.id,
            role: user.role.name.clone(),
        };
        let access_token = self.tokens.issue_access_token(&identity)?;
        let refresh_token = self.tokens.issue_refresh_token(&identity, remember)?;
        tracing::info!(user_id = user.id, remember, "user logged in");

        Ok(LoginOutcome {
            user,
            access_token,
            refresh_token,
            remember,
        })
    }

    /// Mints a new access token from a refresh token. The refresh token itself is not rotated.
    pub fn refresh(&self, refresh_token: Option<&str>) -> AppResult<String> {
        let token = refresh_token.ok_or_else(|| AppError::unauthorized("Refresh token required"))?;
        let identity = self
            .tokens
            .verify_refresh(token)
            .map_err(|_| AppError::forbidden("Invalid refresh token"))?;
        Ok(self.tokens.issue_access_token(&identity)?)
    }

    pub async fn current_user(&self, identity: &Identity) -> AppResult<User> {
        self.users
            .find_by_id(identity.id)
            .await?
            .ok_or_else(|| AppError::not_found("User not found"))
    }

    /// Issues an OTP and queues the email carrying it.
    pub async fn forgot_password(&self, email: &str) -> AppResult<()> {
        if self.users.find_by_email(email).await?.is_none() {
            return Err(AppError::not_found("User not found"));
        }

        let issued = self.otp.issue(email).await?;
        let Some(code) = issued.code else {
            return Err(AppError::TooManyRequests(
                "OTP already exists. Please wait before requesting a new one".into(),
            ));
        };

        if let Err(e) = self.mailer.send(&otp_email(email, &code)).await {
            // Undelivered code must not block the next request for the full TTL.
            if let Err(revoke_err) = self.otp.revoke(email).await {
                tracing::error!(error = %revoke_err, "failed to revoke undelivered OTP");
            }
            return Err(e.into());
        }
        tracing::info!("password reset OTP issued");
        Ok(())
    }

    /// Consumes the OTP and returns a reset token bound to `email`.
    pub async fn verify_otp(&self, email: &str, otp: &str) -> AppResult<String> {
        self.otp.verify(email, otp).await?;
        tracing::info!("password reset OTP verified");
        Ok(self.tokens.issue_reset_token(email)?)
    }

    /// Checks the reset cookie and returns the email it was issued for.
    pub fn reset_email(&self, reset_token: Option<&str>) -> AppResult<String> {
        let token = reset_token.ok_or_else(|| AppError::unauthorized("Reset token required"))?;
        self.tokens.verify_reset(token).map_err(|_| {
            AppError::forbidden(
                "Invalid or expired reset token. Please restart the password reset process",
            )
        })
    }

    /// Sets a new password for the account behind a verified reset token.
    pub async fn reset_password(
        &self,
        email: &str,
        password: Option<&str>,
        confirm_password: Option<&str>,
    ) -> AppResult<()> {
        let (password, confirm) = match (password, confirm_password) {
            (Some(p), Some(c)) if !p.is_empty() && !c.is_empty() => (p, c),
            _ => return Err(AppError::validation("Password and confirm password are required")),
        };
        if password != confirm {
            return Err(AppError::validation("Passwords do not match"));
        }

        let user = self
            .users
            .find_by_email(email)
            .await?
            .ok_or_else(|| AppError::not_found("User not found"))?;

        if verify_password(password, &user.password_hash).await? {
            return Err(AppError::validation(
                "New password must be different from the current password",
            ));
        }

        let hash = hash_password(password).await?;
        self.users.update_password(user.id, &hash).await?;
        tracing::info!(user_id = user.id, "password reset");
        Ok(())
    }
}
