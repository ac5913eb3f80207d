//! # Password hashing and verification with Argon2id
//!
//! Provides the two functions used by registration and login:
//!
//! - [`hash_password`]: generates a random salt via [`OsRng`], hashes the plaintext
//!   password with the default Argon2id parameters, and returns the result as a
//!   PHC-format string (e.g. `$argon2id$v=19$m=19456,t=2,p=1$...`). This string is
//!   stored in the `password_hash` column of the `users` table.
//!
//! - [`verify_password`]: parses a PHC-format hash and checks whether the provided
//!   plaintext matches. Returns `Ok(true)` on success, `Ok(false)` on mismatch, or
//!   `Err` if the stored hash is malformed.
//!
//! Both are CPU-bound; async callers should go through [`hash_blocking`] and
//! [`verify_blocking`], which move the work onto tokio's blocking pool.

use argon2::{
    password_hash::{
        self, rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
    },
    Argon2,
};

use crate::error::ApiError;

/// Hash a password using Argon2id. Returns a PHC-format string.
pub fn hash_password(password: &str) -> Result<String, password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verify a password against a PHC-format hash string.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, password_hash::Error> {
    let parsed_hash = PasswordHash::new(hash)?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

pub async fn hash_blocking(password: String) -> Result<String, ApiError> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "password hashing task failed");
            ApiError::Internal
        })?
        .map_err(|e| {
            tracing::error!(error = %e, "failed to hash password");
            ApiError::Internal
        })
}

/// A malformed stored hash counts as a mismatch so login failures stay uniform.
pub async fn verify_blocking(password: String, hash: String) -> Result<bool, ApiError> {
    let outcome = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "password verification task failed");
            ApiError::Internal
        })?;
    Ok(outcome.unwrap_or_else(|e| {
        tracing::warn!(error = %e, "stored password hash is malformed");
        false
    }))
}
