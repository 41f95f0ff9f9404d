//! Password hashing, verification and temporary password generation.

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use rand::Rng;

use crate::config::PasswordConfig;
use crate::errors::{Error, ErrorCode};

/// Characters used for server-generated temporary passwords.
const TEMPORARY_PASSWORD_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789!@#$%^&*";

/// Length of server-generated temporary passwords.
pub const TEMPORARY_PASSWORD_LENGTH: usize = 12;

/// Argon2 hashing parameters.
#[derive(Debug, Clone, Copy)]
pub struct Argon2Params {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Argon2Params {
    /// Create Argon2 instance with these parameters.
    fn to_argon2(self) -> Result<Argon2<'static>, Error> {
        let params = Params::new(self.memory_kib, self.iterations, self.parallelism, None)
            .map_err(|e| Error::internal(format!("create argon2 params: {e}")))?;

        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }
}

impl Default for Argon2Params {
    /// Secure defaults for production (Argon2id RFC recommendations)
    fn default() -> Self {
        Self {
            memory_kib: 19456, // 19 MB
            iterations: 2,
            parallelism: 1,
        }
    }
}

/// Hash a string using Argon2 with the provided parameters or secure defaults if None.
pub fn hash_string_with_params(input: &str, params: Option<Argon2Params>) -> Result<String, Error> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = params.unwrap_or_default().to_argon2()?;

    let hash = argon2
        .hash_password(input.as_bytes(), &salt)
        .map_err(|e| Error::internal(format!("hash string: {e}")))?;

    Ok(hash.to_string())
}

/// Hash a string using Argon2 with default secure parameters.
pub fn hash_string(input: &str) -> Result<String, Error> {
    hash_string_with_params(input, None)
}

/// Verify a string against a hash.
///
/// Note: Verification uses the parameters embedded in the hash itself.
pub fn verify_string(input: &str, hash: &str) -> Result<bool, Error> {
    let parsed_hash = PasswordHash::new(hash).map_err(|e| Error::internal(format!("parse hash: {e}")))?;

    // Verification always uses params from the hash
    let argon2 = Argon2::default();
    Ok(argon2.verify_password(input.as_bytes(), &parsed_hash).is_ok())
}

/// Hash a password on the blocking pool so the async runtime is not stalled.
pub async fn hash_password(password: String, params: Argon2Params) -> Result<String, Error> {
    tokio::task::spawn_blocking(move || hash_string_with_params(&password, Some(params)))
        .await
        .map_err(|e| Error::internal(format!("spawn password hashing task: {e}")))?
}

/// Verify a password on the blocking pool so the async runtime is not stalled.
pub async fn verify_password(password: String, hash: String) -> Result<bool, Error> {
    tokio::task::spawn_blocking(move || verify_string(&password, &hash))
        .await
        .map_err(|e| Error::internal(format!("spawn password verification task: {e}")))?
}

/// Check a candidate password against the configured length rules.
pub fn validate_password(password: &str, config: &PasswordConfig) -> Result<(), Error> {
    let length = password.chars().count();
    if length < config.min_length {
        return Err(Error::BadRequest {
            message: format!("Password must be at least {} characters", config.min_length),
            code: ErrorCode::ValidationError,
        });
    }
    if length > config.max_length {
        return Err(Error::BadRequest {
            message: format!("Password must be at most {} characters", config.max_length),
            code: ErrorCode::ValidationError,
        });
    }
    Ok(())
}

/// Generate a random temporary password for accounts created by an admin
pub fn generate_temporary_password() -> String {
    let mut rng = rand::thread_rng();
    (0..TEMPORARY_PASSWORD_LENGTH)
        .map(|_| TEMPORARY_PASSWORD_CHARSET[rng.gen_range(0..TEMPORARY_PASSWORD_CHARSET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Cheap parameters so the tests don't spend seconds hashing
    fn fast_params() -> Option<Argon2Params> {
        Some(Argon2Params {
            memory_kib: 128,
            iterations: 1,
            parallelism: 1,
        })
    }

    #[test]
    fn test_string_hashing() {
        let input = "test_password_123";
        let hash = hash_string_with_params(input, fast_params()).unwrap();

        assert!(!hash.is_empty());
        assert!(verify_string(input, &hash).unwrap());
        assert!(!verify_string("wrong_password", &hash).unwrap());
    }

    #[test]
    fn test_same_input_different_hashes() {
        let input = "same_password";

        let hash1 = hash_string_with_params(input, fast_params()).unwrap();
        let hash2 = hash_string_with_params(input, fast_params()).unwrap();

        // Same input should produce different hashes due to salt
        assert_ne!(hash1, hash2);
        assert!(verify_string(input, &hash1).unwrap());
        assert!(verify_string(input, &hash2).unwrap());
    }

    #[test]
    fn test_default_params_hash_verifies() {
        let hash = hash_string("AdminSecure123!").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_string("AdminSecure123!", &hash).unwrap());
    }

    #[test]
    fn test_malformed_hash_is_an_error() {
        assert!(verify_string("anything", "not-a-phc-string").is_err());
    }

    #[tokio::test]
    async fn test_async_helpers() {
        let params = fast_params().unwrap();
        let hash = hash_password("async_secret".to_string(), params).await.unwrap();
        assert!(verify_password("async_secret".to_string(), hash.clone()).await.unwrap());
        assert!(!verify_password("other".to_string(), hash).await.unwrap());
    }

    #[test]
    fn test_generate_temporary_password() {
        let p1 = generate_temporary_password();
        let p2 = generate_temporary_password();

        assert_eq!(p1.chars().count(), TEMPORARY_PASSWORD_LENGTH);
        assert_ne!(p1, p2);
        assert!(p1.bytes().all(|b| TEMPORARY_PASSWORD_CHARSET.contains(&b)));
    }

    #[test]
    fn test_validate_password_lengths() {
        let config = PasswordConfig::default();
        assert!(validate_password("12345", &config).is_err());
        assert!(validate_password("123456", &config).is_ok());
        assert!(validate_password(&"x".repeat(129), &config).is_err());
    }
}
