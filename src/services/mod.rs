pub mod auth;
pub mod cookies;
pub mod email;
pub mod email_queue;
pub mod otp;
pub mod password;
pub mod token;
