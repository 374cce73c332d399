use crate::config::ConfigError;

use super::error::AuthResult;

const MIN_COST: u32 = 4;
const MAX_COST: u32 = 31;

/// Salted bcrypt hashing with a configurable cost factor.
#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    cost: u32,
}

impl PasswordHasher {
    pub fn new(cost: u32) -> Result<Self, ConfigError> {
        if !(MIN_COST..=MAX_COST).contains(&cost) {
            return Err(ConfigError::Invalid(format!(
                "bcrypt cost must be within {}..={}, got {}",
                MIN_COST, MAX_COST, cost
            )));
        }
        Ok(Self { cost })
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }

    /// One-way hash with a fresh random salt per call.
    pub fn hash(&self, plaintext: &str) -> AuthResult<String> {
        Ok(bcrypt::hash(plaintext, self.cost)?)
    }

    /// Check `plaintext` against a stored digest using bcrypt's own verifier.
    /// A digest that cannot be parsed never matches.
    pub fn matches(&self, plaintext: &str, digest: &str) -> bool {
        match bcrypt::verify(plaintext, digest) {
            Ok(matched) => matched,
            Err(e) => {
                tracing::warn!(error = %e, "stored password digest could not be verified");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher() -> PasswordHasher {
        PasswordHasher::new(MIN_COST).unwrap()
    }

    #[test]
    fn hash_matches_its_own_plaintext() {
        let hasher = hasher();
        for password in ["pw1", "correct horse battery staple", "ünïcødé", ""] {
            let digest = hasher.hash(password).unwrap();
            assert!(hasher.matches(password, &digest), "{password:?}");
        }
    }

    #[test]
    fn hash_rejects_other_plaintext() {
        let hasher = hasher();
        let digest = hasher.hash("pw1").unwrap();
        assert!(!hasher.matches("pw2", &digest));
        assert!(!hasher.matches("PW1", &digest));
        assert!(!hasher.matches("", &digest));
    }

    #[test]
    fn hashing_is_salted() {
        let hasher = hasher();
        let first = hasher.hash("pw1").unwrap();
        let second = hasher.hash("pw1").unwrap();

        assert_ne!(first, second);
        assert!(hasher.matches("pw1", &first));
        assert!(hasher.matches("pw1", &second));
    }

    #[test]
    fn digest_is_not_plaintext() {
        let digest = hasher().hash("pw1").unwrap();
        assert!(!digest.contains("pw1"));
        assert!(digest.starts_with("$2"));
    }

    #[test]
    fn garbage_digest_never_matches() {
        let hasher = hasher();
        assert!(!hasher.matches("pw1", "not-a-bcrypt-digest"));
        assert!(!hasher.matches("pw1", ""));
    }

    #[test]
    fn cost_is_validated() {
        assert!(PasswordHasher::new(3).is_err());
        assert!(PasswordHasher::new(32).is_err());
        assert_eq!(PasswordHasher::new(10).unwrap().cost(), 10);
    }
}
