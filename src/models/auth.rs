use serde::{Deserialize, Serialize};

use super::user::ADMIN_ROLE;

/// Who the caller is, as established by the session middleware.
///
/// `role` is a snapshot taken when the token was issued; it only changes when
/// a new token is minted from fresh data (login) or from the refresh token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: i64,
    pub role: String,
}

impl Identity {
    pub fn is_admin(&self) -> bool {
        self.role == ADMIN_ROLE
    }
}

/// Claims embedded in access and refresh tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub id: i64,
    pub role: String,
    pub aud: String, // token class
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn identity(&self) -> Identity {
        Identity {
            id: self.id,
            role: self.role.clone(),
        }
    }
}

/// Claims embedded in the password-reset token: only the email.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetClaims {
    pub email: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}
