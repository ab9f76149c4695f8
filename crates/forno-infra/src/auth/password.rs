//! Argon2id credential hashing.

use argon2::{
    Argon2,
    password_hash::{
        self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng,
    },
};

use forno_core::ports::{AuthError, PasswordService};

/// Hashes and checks passwords with Argon2id and a per-password random salt.
///
/// A wrong password is an `Ok(false)`; a hash string that does not parse is
/// an error, since that means corrupted storage rather than a bad login.
pub struct Argon2PasswordService {
    hasher: Argon2<'static>,
}

impl Argon2PasswordService {
    pub fn new() -> Self {
        Self {
            hasher: Argon2::default(),
        }
    }
}

impl Default for Argon2PasswordService {
    fn default() -> Self {
        Self::new()
    }
}

impl PasswordService for Argon2PasswordService {
    fn hash(&self, password: &str) -> Result<String, AuthError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .hasher
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AuthError::HashingError(e.to_string()))?;
        Ok(hash.to_string())
    }

    fn verify(&self, password: &str, hash: &str) -> Result<bool, AuthError> {
        let parsed = PasswordHash::new(hash).map_err(|e| AuthError::HashingError(e.to_string()))?;

        match self.hasher.verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(password_hash::Error::Password) => Ok(false),
            Err(e) => Err(AuthError::HashingError(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let service = Argon2PasswordService::new();
        let password = "quattro_formaggi_42";

        let hash = service.hash(password).unwrap();
        assert!(service.verify(password, &hash).unwrap());
        assert!(!service.verify("wrong_password", &hash).unwrap());
    }

    #[test]
    fn test_hashes_are_salted() {
        let service = Argon2PasswordService::new();

        let a = service.hash("same-password").unwrap();
        let b = service.hash("same-password").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_malformed_stored_hash_is_an_error_not_a_mismatch() {
        let service = Argon2PasswordService::new();

        let err = service.verify("whatever", "not-a-phc-string").unwrap_err();
        assert!(matches!(err, AuthError::HashingError(_)));
    }
}
