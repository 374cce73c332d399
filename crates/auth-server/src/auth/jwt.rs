//! JWT token creation and validation.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};

use super::error::TokenError;
use super::types::Claims;
use crate::config::ConfigError;

/// HS256 needs a key at least as long as its digest.
pub const MIN_SECRET_LEN: usize = 32;

/// Issues and verifies stateless HS256 bearer tokens.
///
/// Holds only immutable keys, so one instance is shared by every request.
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl TokenCodec {
    pub fn new(secret: &[u8], ttl: Duration) -> Result<Self, ConfigError> {
        if secret.is_empty() {
            return Err(ConfigError::MissingSecret);
        }
        if secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::WeakSecret {
                min: MIN_SECRET_LEN,
                actual: secret.len(),
            });
        }
        if ttl <= Duration::zero() {
            return Err(ConfigError::Invalid(
                "token lifetime must be positive".to_string(),
            ));
        }
        if Utc::now().checked_add_signed(ttl).is_none() {
            return Err(ConfigError::Invalid(format!(
                "token lifetime of {} hours is out of range",
                ttl.num_hours()
            )));
        }

        // Expiry is checked by hand after the signature, without leeway.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["sub", "exp"]);

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            ttl,
        })
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Create a token whose subject is `email`, valid from now for the configured lifetime.
    pub fn issue(&self, email: &str) -> Result<String, TokenError> {
        self.issue_at(email, Utc::now())
    }

    pub(crate) fn issue_at(
        &self,
        email: &str,
        issued_at: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        let expires_at = issued_at
            .checked_add_signed(self.ttl)
            .ok_or(TokenError::ExpiryOutOfRange)?;
        let claims = Claims {
            sub: email.to_string(),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(TokenError::Signing)
    }

    /// Verify a token and return its subject email.
    pub fn verify(&self, token: &str) -> Result<String, TokenError> {
        self.verify_claims(token).map(|claims| claims.sub)
    }

    /// Verify signature then expiry, returning the full claim set.
    pub fn verify_claims(&self, token: &str) -> Result<Claims, TokenError> {
        let claims = self.decode_signed(token)?;
        if claims.is_expired_at(Utc::now()) {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }

    fn decode_signed(&self, token: &str) -> Result<Claims, TokenError> {
        let token_data = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                    TokenError::InvalidSignature
                }
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Malformed,
            })?;

        Ok(token_data.claims)
    }
}
