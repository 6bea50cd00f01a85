use anyhow::{anyhow, bail, Context};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde_json::{Map, Value};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

use crate::config::RelayConfig;
use crate::registry::UserId;

pub const ACCESS_TOKEN_TTL_SECONDS: i64 = 15 * 60;

#[derive(Debug, Error)]
pub enum VerificationError {
    #[error("access token is empty")]
    EmptyToken,
    #[error("access token rejected: {0}")]
    Rejected(#[from] jsonwebtoken::errors::Error),
    #[error("access token carries no `{0}` claim")]
    MissingUserClaim(String),
}

/// Resolves a bearer token to the user it was issued for.
pub trait TokenVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<UserId, VerificationError>;
}

/// Verifies signed JWT access tokens, HS256 with a shared secret or RS256
/// with the identity provider's public key.
#[derive(Clone)]
pub struct JwtTokenVerifier {
    encoding_key: Option<EncodingKey>,
    decoding_key: DecodingKey,
    validation: Validation,
    user_id_claim: String,
}

impl JwtTokenVerifier {
    pub fn with_secret(secret: &str, user_id_claim: impl Into<String>) -> anyhow::Result<Self> {
        if secret.len() < 32 {
            bail!("jwt secret must be at least 32 characters long");
        }

        Ok(Self {
            encoding_key: Some(EncodingKey::from_secret(secret.as_bytes())),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation: base_validation(Algorithm::HS256),
            user_id_claim: user_id_claim.into(),
        })
    }

    pub fn with_rsa_public_key(
        public_key_pem: &str,
        user_id_claim: impl Into<String>,
    ) -> anyhow::Result<Self> {
        let decoding_key = DecodingKey::from_rsa_pem(public_key_pem.as_bytes())
            .context("jwt public key is not a valid RSA PEM")?;

        Ok(Self {
            encoding_key: None,
            decoding_key,
            validation: base_validation(Algorithm::RS256),
            user_id_claim: user_id_claim.into(),
        })
    }

    pub fn from_config(config: &RelayConfig) -> anyhow::Result<Self> {
        let verifier = match config.jwt_public_key_pem.as_deref() {
            Some(pem) => Self::with_rsa_public_key(pem, config.user_id_claim.clone())?,
            None => Self::with_secret(&config.jwt_secret, config.user_id_claim.clone())?,
        };

        Ok(match config.jwt_issuer.as_deref() {
            Some(issuer) => verifier.with_issuer(issuer),
            None => verifier,
        })
    }

    pub fn with_issuer(mut self, issuer: &str) -> Self {
        self.validation.set_issuer(&[issuer]);
        self.validation.set_required_spec_claims(&["exp", "iss"]);
        self
    }

    /// Issues an HS256 token for `user_id`. Only available in shared-secret mode.
    #[cfg_attr(not(test), allow(dead_code))]
    pub fn issue_access_token(&self, user_id: &str) -> anyhow::Result<String> {
        self.issue_access_token_at(user_id, current_unix_timestamp()?)
    }

    fn issue_access_token_at(&self, user_id: &str, issued_at: i64) -> anyhow::Result<String> {
        let encoding_key = self
            .encoding_key
            .as_ref()
            .ok_or_else(|| anyhow!("token issuance requires a shared secret"))?;

        let mut claims = Map::new();
        claims.insert("sub".into(), Value::from(user_id));
        claims.insert(self.user_id_claim.clone(), Value::from(user_id));
        claims.insert("iat".into(), Value::from(issued_at));
        claims.insert("exp".into(), Value::from(issued_at + ACCESS_TOKEN_TTL_SECONDS));

        encode(&Header::new(Algorithm::HS256), &claims, encoding_key)
            .context("failed to encode access token")
    }
}

impl TokenVerifier for JwtTokenVerifier {
    fn verify(&self, token: &str) -> Result<UserId, VerificationError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(VerificationError::EmptyToken);
        }

        let claims = decode::<Map<String, Value>>(token, &self.decoding_key, &self.validation)?.claims;

        claims
            .get(&self.user_id_claim)
            .and_then(Value::as_str)
            .filter(|user_id| !user_id.is_empty())
            .map(UserId::new)
            .ok_or_else(|| VerificationError::MissingUserClaim(self.user_id_claim.clone()))
    }
}

fn base_validation(algorithm: Algorithm) -> Validation {
    let mut validation = Validation::new(algorithm);
    validation.validate_exp = true;
    validation.leeway = 0;
    validation.set_required_spec_claims(&["exp"]);
    validation
}

fn current_unix_timestamp() -> anyhow::Result<i64> {
    let duration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|error| anyhow!("system clock is before unix epoch: {error}"))?;

    i64::try_from(duration.as_secs()).context("unix timestamp overflow")
}
