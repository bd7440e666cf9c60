use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use std::fmt;
use std::sync::OnceLock;

/// Argon2id memory cost in KiB.
pub const ARGON2_MEMORY_KIB: u32 = 19_456;
/// Argon2id iteration count.
pub const ARGON2_ITERATIONS: u32 = 2;
/// Argon2id degree of parallelism.
pub const ARGON2_LANES: u32 = 1;

/// Newtype for password to prevent accidental logging
#[derive(Clone)]
pub struct Password(String);

impl Password {
    pub fn new(password: impl Into<String>) -> Self {
        Self(password.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(<redacted>)")
    }
}

/// Newtype for a PHC-encoded password hash. Never serialized.
#[derive(Clone, PartialEq, Eq)]
pub struct PasswordHashString(String);

impl PasswordHashString {
    pub fn new(hash: String) -> Self {
        Self(hash)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PasswordHashString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PasswordHashString(<redacted>)")
    }
}

fn hasher() -> Result<Argon2<'static>, anyhow::Error> {
    let params = Params::new(ARGON2_MEMORY_KIB, ARGON2_ITERATIONS, ARGON2_LANES, None)
        .map_err(|e| anyhow::anyhow!("Invalid Argon2 parameters: {}", e))?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

/// Hash a password using Argon2id with a fresh random salt.
///
/// CPU-bound; async callers should go through [`hash_password_blocking`].
pub fn hash_password(password: &Password) -> Result<PasswordHashString, anyhow::Error> {
    let salt = SaltString::generate(&mut OsRng);

    let password_hash = hasher()?
        .hash_password(password.as_str().as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?
        .to_string();

    Ok(PasswordHashString::new(password_hash))
}

/// Verify a password against a stored hash in constant time.
///
/// A stored hash that cannot be parsed verifies as `false`.
pub fn verify_password(password: &Password, password_hash: &PasswordHashString) -> bool {
    let parsed_hash = match PasswordHash::new(password_hash.as_str()) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::error!(error = %e, "Stored password hash is malformed");
            return false;
        }
    };

    // Parameters are read from the PHC string, so older hashes still verify.
    Argon2::default()
        .verify_password(password.as_str().as_bytes(), &parsed_hash)
        .is_ok()
}

/// Run [`hash_password`] on the blocking pool.
pub async fn hash_password_blocking(password: Password) -> Result<PasswordHashString, anyhow::Error> {
    tokio::task::spawn_blocking(move || hash_password(&password)).await?
}

/// Run [`verify_password`] on the blocking pool.
pub async fn verify_password_blocking(
    password: Password,
    password_hash: PasswordHashString,
) -> Result<bool, anyhow::Error> {
    Ok(tokio::task::spawn_blocking(move || verify_password(&password, &password_hash)).await?)
}

static DUMMY_HASH: OnceLock<Option<PasswordHashString>> = OnceLock::new();

/// Burn one verification against a fixed hash so that lookups for unknown
/// accounts take as long as a real password check.
pub async fn dummy_verify(password: Password) {
    let result = tokio::task::spawn_blocking(move || {
        let dummy = DUMMY_HASH.get_or_init(|| {
            hash_password(&Password::new("timing-equalization-placeholder")).ok()
        });
        if let Some(hash) = dummy {
            let _ = verify_password(&password, hash);
        }
    })
    .await;

    if let Err(e) = result {
        tracing::warn!(error = %e, "Dummy password verification task failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_password() {
        let password = Password::new("mySecurePassword123");
        let hash = hash_password(&password).expect("Failed to hash password");

        assert!(hash.as_str().starts_with("$argon2id$"));
        assert!(hash.as_str().contains("m=19456,t=2,p=1"));
    }

    #[test]
    fn test_verify_password_round_trip() {
        let password = Password::new("mySecurePassword123");
        let hash = hash_password(&password).expect("Failed to hash password");

        assert!(verify_password(&password, &hash));
        assert!(!verify_password(&Password::new("wrongPassword"), &hash));
    }

    #[test]
    fn test_different_hashes_for_same_password() {
        let password = Password::new("mySecurePassword123");
        let hash1 = hash_password(&password).expect("Failed to hash password");
        let hash2 = hash_password(&password).expect("Failed to hash password");

        // Random salt
        assert_ne!(hash1.as_str(), hash2.as_str());
        assert!(verify_password(&password, &hash1));
        assert!(verify_password(&password, &hash2));
    }

    #[test]
    fn test_malformed_hash_does_not_verify() {
        let hash = PasswordHashString::new("not-a-phc-string".to_string());
        assert!(!verify_password(&Password::new("anything"), &hash));
    }

    #[test]
    fn test_debug_output_is_redacted() {
        let password = Password::new("hunter2hunter2");
        let hash = hash_password(&password).unwrap();

        assert!(!format!("{:?}", password).contains("hunter2"));
        assert!(!format!("{:?}", hash).contains("argon2"));
    }

    #[tokio::test]
    async fn test_blocking_helpers() {
        let hash = hash_password_blocking(Password::new("Blocking#Pass1"))
            .await
            .unwrap();
        assert!(
            verify_password_blocking(Password::new("Blocking#Pass1"), hash.clone())
                .await
                .unwrap()
        );
        assert!(
            !verify_password_blocking(Password::new("Blocking#Pass2"), hash)
                .await
                .unwrap()
        );
    }
}
