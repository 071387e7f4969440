//! Session cookie builders. Names are part of the client contract.

use axum_extra::extract::cookie::{Cookie, SameSite};
use time::Duration;

use crate::config::AuthConfig;

pub const ACCESS_COOKIE: &str = "accessToken";
pub const REFRESH_COOKIE: &str = "refreshToken";
pub const RESET_COOKIE: &str = "resetToken";

/// Cookie attributes shared by every auth cookie.
#[derive(Debug, Clone, Copy)]
pub struct CookiePolicy {
    pub secure: bool,
    pub same_site: SameSite,
}

impl CookiePolicy {
    /// Production gets `Secure` + `SameSite=Strict`; anything else `SameSite=Lax` over plain HTTP.
    pub fn from_config(config: &AuthConfig) -> Self {
        if config.production {
            Self { secure: true, same_site: SameSite::Strict }
        } else {
            Self { secure: false, same_site: SameSite::Lax }
        }
    }

    pub fn build(&self, name: &'static str, value: String, max_age_secs: u64) -> Cookie<'static> {
        Cookie::build((name, value))
            .http_only(true)
            .secure(self.secure)
            .same_site(self.same_site)
            .path("/")
            .max_age(Duration::seconds(i64::try_from(max_age_secs).unwrap_or(i64::MAX)))
            .build()
    }

    /// An already-expired cookie with the same attributes, so the browser drops it.
    pub fn clear(&self, name: &'static str) -> Cookie<'static> {
        Cookie::build((name, ""))
            .http_only(true)
            .secure(self.secure)
            .same_site(self.same_site)
            .path("/")
            .max_age(Duration::ZERO)
            .build()
    }
}
