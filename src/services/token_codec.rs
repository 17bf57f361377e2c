//! Signed, short-lived access tokens.
//!
//! Tokens are HS256 JWTs carrying the account id as `sub` plus `iat`/`exp`.
//! Nothing is persisted: a token is trusted if its signature matches the
//! process secret and its expiry has not passed.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::config::TokenConfig;
use crate::domain::AccountId;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("Invalid token")]
    Invalid,

    #[error("Token expired")]
    Expired,

    #[error("Failed to sign token: {0}")]
    Signing(String),
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    iat: i64,
    exp: i64,
}

/// A freshly minted access token.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl TokenCodec {
    #[must_use]
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked by `verify_at` so tests can pin the clock.
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            ttl,
        }
    }

    /// Builds the codec from `[tokens]`. An empty `jwt_secret` yields a random
    /// per-process secret, so issued tokens die with the process.
    #[must_use]
    pub fn from_config(cfg: &TokenConfig) -> Self {
        let ttl = Duration::minutes(i64::from(cfg.access_token_ttl_minutes));
        if cfg.jwt_secret.is_empty() {
            warn!("tokens.jwt_secret is not set; using a random secret for this process");
            let mut secret = [0u8; 64];
            rand::rng().fill_bytes(&mut secret);
            Self::new(&secret, ttl)
        } else {
            Self::new(cfg.jwt_secret.as_bytes(), ttl)
        }
    }

    pub fn issue(&self, account_id: AccountId) -> Result<AccessToken, TokenError> {
        self.issue_at(account_id, Utc::now())
    }

    /// Issues a token as if the current time were `now`.
    ///
    /// `exp` has second resolution and is rounded up, so a token is never
    /// rejected before `now + ttl`.
    pub fn issue_at(
        &self,
        account_id: AccountId,
        now: DateTime<Utc>,
    ) -> Result<AccessToken, TokenError> {
        let deadline = now + self.ttl;
        let mut exp = deadline.timestamp();
        if deadline.timestamp_subsec_nanos() > 0 {
            exp += 1;
        }

        let claims = Claims {
            sub: account_id.to_string(),
            iat: now.timestamp(),
            exp,
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| TokenError::Signing(e.to_string()))?;

        let expires_at = DateTime::from_timestamp(exp, 0).ok_or(TokenError::Invalid)?;
        Ok(AccessToken { token, expires_at })
    }

    pub fn verify(&self, token: &str) -> Result<AccountId, TokenError> {
        self.verify_at(token, Utc::now())
    }

    /// Checks signature and structure, then expiry against `now`.
    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<AccountId, TokenError> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|_| TokenError::Invalid)?;

        let expires_at = DateTime::from_timestamp(data.claims.exp, 0).ok_or(TokenError::Invalid)?;
        if now > expires_at {
            return Err(TokenError::Expired);
        }

        data.claims
            .sub
            .parse::<i32>()
            .map(AccountId::new)
            .map_err(|_| TokenError::Invalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"0123456789abcdef0123456789abcdef";

    fn codec() -> TokenCodec {
        TokenCodec::new(SECRET, Duration::minutes(15))
    }

    fn issued_at() -> DateTime<Utc> {
        DateTime::from_timestamp(1_750_000_000, 0).unwrap()
    }

    #[test]
    fn round_trip_returns_subject() {
        let codec = codec();
        let t = issued_at();
        let token = codec.issue_at(AccountId::new(42), t).unwrap();

        assert_eq!(token.expires_at, t + Duration::minutes(15));
        assert_eq!(codec.verify_at(&token.token, t).unwrap(), AccountId::new(42));
    }

    #[test]
    fn accepted_through_expiry_and_rejected_after() {
        let codec = codec();
        let t = issued_at();
        let token = codec.issue_at(AccountId::new(1), t).unwrap().token;

        assert!(codec.verify_at(&token, t + Duration::minutes(14)).is_ok());
        assert!(codec.verify_at(&token, t + Duration::minutes(15)).is_ok());
        assert_eq!(
            codec.verify_at(&token, t + Duration::minutes(15) + Duration::milliseconds(1)),
            Err(TokenError::Expired)
        );
        assert_eq!(
            codec.verify_at(&token, t + Duration::hours(2)),
            Err(TokenError::Expired)
        );
    }

    #[test]
    fn fractional_issue_time_never_expires_early() {
        let codec = codec();
        let t = issued_at() + Duration::milliseconds(700);
        let token = codec.issue_at(AccountId::new(1), t).unwrap().token;

        assert!(codec.verify_at(&token, t + Duration::minutes(15)).is_ok());
        assert_eq!(
            codec.verify_at(&token, t + Duration::minutes(15) + Duration::seconds(1)),
            Err(TokenError::Expired)
        );
    }

    #[test]
    fn tampered_token_is_invalid() {
        let codec = codec();
        let token = codec.issue_at(AccountId::new(1), issued_at()).unwrap().token;
        let forged = codec.issue_at(AccountId::new(2), issued_at()).unwrap().token;

        let original: Vec<&str> = token.split('.').collect();
        let forged_payload = forged.split('.').nth(1).unwrap();
        let spliced = format!("{}.{}.{}", original[0], forged_payload, original[2]);

        assert_eq!(codec.verify_at(&spliced, issued_at()), Err(TokenError::Invalid));
    }

    #[test]
    fn other_secret_is_invalid() {
        let other = TokenCodec::new(b"another-secret-another-secret-!!", Duration::minutes(15));
        let token = other.issue_at(AccountId::new(1), issued_at()).unwrap().token;

        assert_eq!(codec().verify_at(&token, issued_at()), Err(TokenError::Invalid));
    }

    #[test]
    fn malformed_input_is_invalid() {
        let codec = codec();
        assert_eq!(codec.verify_at("", issued_at()), Err(TokenError::Invalid));
        assert_eq!(codec.verify_at("not.a.jwt", issued_at()), Err(TokenError::Invalid));
    }

    #[test]
    fn expiry_claim_is_required() {
        #[derive(Serialize)]
        struct NoExp {
            sub: String,
        }

        let token = encode(
            &Header::new(Algorithm::HS256),
            &NoExp { sub: "1".into() },
            &EncodingKey::from_secret(SECRET),
        )
        .unwrap();

        assert_eq!(codec().verify_at(&token, issued_at()), Err(TokenError::Invalid));
    }
}
