use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{
        self, PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString,
    },
};
use rand::rngs::OsRng;

/// PasswordHasher
///
/// One-way Argon2id hashing with a configurable cost. The cost is the log2 of the memory
/// used per hash in KiB: 12 is ~4MB (development), 16 is ~64MB (production).
#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    memory_cost_log2: u32,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new(12)
    }
}

impl PasswordHasher {
    pub fn new(memory_cost_log2: u32) -> Self {
        // Capped at 4GB per hash.
        Self {
            memory_cost_log2: memory_cost_log2.min(22),
        }
    }

    /// hash
    ///
    /// Produces a PHC string (`$argon2id$...`) with a fresh random salt.
    pub fn hash(&self, password: &str) -> Result<String, password_hash::Error> {
        let salt = SaltString::generate(&mut OsRng);
        let params = Params::new(1u32 << self.memory_cost_log2, 3, 1, None)
            .map_err(|_| password_hash::Error::Algorithm)?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
        Ok(argon2.hash_password(password.as_bytes(), &salt)?.to_string())
    }

    /// verify
    ///
    /// Returns `Ok(false)` on a mismatch. Errors only when the stored hash cannot be parsed.
    /// The parameters embedded in the hash are used, so old hashes keep verifying after the
    /// configured cost changes.
    pub fn verify(
        &self,
        password_hash: &str,
        candidate: &str,
    ) -> Result<bool, password_hash::Error> {
        let parsed = PasswordHash::new(password_hash)?;
        match Argon2::default().verify_password(candidate.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(password_hash::Error::Password) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
