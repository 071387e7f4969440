use anyhow::Context;

/// bcrypt cost used for every stored password.
pub const HASH_COST: u32 = 10;

/// Hash a plaintext password for storage.
pub async fn hash_password(plain: &str) -> anyhow::Result<String> {
    let plain = plain.to_owned();
    tokio::task::spawn_blocking(move || bcrypt::hash(plain, HASH_COST))
        .await
        .context("password hashing task failed")?
        .context("failed to hash password")
}

/// Compare a plaintext password with a stored bcrypt hash.
///
/// A malformed hash is an error, not a mismatch: it means the stored record is
/// corrupt rather than the caller being wrong.
pub async fn verify_password(plain: &str, hash: &str) -> anyhow::Result<bool> {
    let plain = plain.to_owned();
    let hash = hash.to_owned();
    tokio::task::spawn_blocking(move || bcrypt::verify(plain, &hash))
        .await
        .context("password verification task failed")?
        .context("stored password hash is malformed")
}
