use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use time::{Duration, OffsetDateTime};

/// Validity window of a password reset secret.
pub const RESET_TOKEN_TTL: Duration = Duration::minutes(10);

/// A freshly generated one-time reset secret. Only `token_hash` and
/// `expires_at` are ever persisted; `raw` goes to the user by email and is
/// then forgotten.
pub struct ResetToken {
    pub raw: String,
    pub token_hash: String,
    pub expires_at: OffsetDateTime,
}

impl ResetToken {
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        let raw = hex::encode(bytes);
        let token_hash = hash_token(&raw);
        Self {
            raw,
            token_hash,
            expires_at: OffsetDateTime::now_utc() + RESET_TOKEN_TTL,
        }
    }
}

/// Digest applied to reset secrets before storage and lookup. A fast hash is
/// intentional here: the secret carries 32 bytes of entropy and lives ten
/// minutes, unlike human-chosen login passwords which get the adaptive hash.
pub fn hash_token(raw: &str) -> String {
    hex::encode(Sha256::digest(raw.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_secret_is_64_hex_chars() {
        let token = ResetToken::generate();
        assert_eq!(token.raw.len(), 64);
        assert!(token.raw.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn stored_hash_is_not_the_raw_secret() {
        let token = ResetToken::generate();
        assert_ne!(token.raw, token.token_hash);
    }

    #[test]
    fn hashing_the_raw_secret_matches_the_stored_hash() {
        let token = ResetToken::generate();
        assert_eq!(hash_token(&token.raw), token.token_hash);
    }

    #[test]
    fn hash_is_deterministic_and_hex() {
        let a = hash_token("some-secret");
        let b = hash_token("some-secret");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn successive_secrets_differ() {
        let a = ResetToken::generate();
        let b = ResetToken::generate();
        assert_ne!(a.raw, b.raw);
        assert_ne!(a.token_hash, b.token_hash);
    }

    #[test]
    fn expiry_is_ten_minutes_out() {
        let before = OffsetDateTime::now_utc();
        let token = ResetToken::generate();
        let after = OffsetDateTime::now_utc();
        assert!(token.expires_at >= before + RESET_TOKEN_TTL);
        assert!(token.expires_at <= after + RESET_TOKEN_TTL);
    }
}
