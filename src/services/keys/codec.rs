//! Signed bearer token encoding for [`Key`]s.
//!
//! Tokens are JWTs. Standard claims carry the key id (`jti`), subject, issue
//! and expiry times; `type` and `issuer_id` are private claims. Expiry is NOT
//! checked by jsonwebtoken: whether a key is expired depends on its type
//! (see [`Key::expired`]), so the codec decides it after decoding.

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::error::AppError;
use crate::services::keys::key::{Key, KeyType};

#[derive(Debug, Serialize, Deserialize)]
struct KeyClaims {
    iss: String,
    #[serde(default)]
    jti: String,
    sub: String,
    iat: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    exp: Option<i64>,
    #[serde(rename = "type")]
    key_type: KeyType,
    issuer_id: String,
}

/// Signs and verifies key tokens.
///
/// - HS256 with a shared secret, or EdDSA with an Ed25519 PEM pair.
/// - Key material is intentionally not printable via Debug.
#[derive(Clone)]
pub struct TokenCodec {
    issuer: String,
    algorithm: Algorithm,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("issuer", &self.issuer)
            .field("algorithm", &self.algorithm)
            .finish()
    }
}

impl TokenCodec {
    pub fn from_secret(secret: &[u8], issuer: impl Into<String>) -> Self {
        Self::build(
            Algorithm::HS256,
            EncodingKey::from_secret(secret),
            DecodingKey::from_secret(secret),
            issuer.into(),
        )
    }

    /// Keys must be Ed25519: the private key in PKCS#8 PEM, the public key in SPKI PEM.
    pub fn from_ed_pem(
        private_key_pem: &str,
        public_key_pem: &str,
        issuer: impl Into<String>,
    ) -> Result<Self, AppError> {
        let encoding_key = EncodingKey::from_ed_pem(private_key_pem.as_bytes()).map_err(|e| {
            warn!(error = %e, "failed to parse token private key PEM (expected Ed25519 PKCS#8 PEM)");
            AppError::Internal
        })?;
        let decoding_key = DecodingKey::from_ed_pem(public_key_pem.as_bytes()).map_err(|e| {
            warn!(error = %e, "failed to parse token public key PEM (expected Ed25519 PEM)");
            AppError::Internal
        })?;

        Ok(Self::build(
            Algorithm::EdDSA,
            encoding_key,
            decoding_key,
            issuer.into(),
        ))
    }

    fn build(
        algorithm: Algorithm,
        encoding_key: EncodingKey,
        decoding_key: DecodingKey,
        issuer: String,
    ) -> Self {
        let mut validation = Validation::new(algorithm);
        validation.set_issuer(&[issuer.as_str()]);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        Self {
            issuer,
            algorithm,
            encoding_key,
            decoding_key,
            validation,
        }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn issue(&self, key: &Key) -> Result<String, AppError> {
        let claims = KeyClaims {
            iss: self.issuer.clone(),
            jti: key.id.clone(),
            sub: key.subject.clone(),
            iat: key.issued_at.timestamp(),
            exp: key.expires_at.map(|t| t.timestamp()),
            key_type: key.key_type,
            issuer_id: key.issuer_id.clone(),
        };

        let mut header = Header::new(self.algorithm);
        header.typ = Some("JWT".to_string());
        jsonwebtoken::encode(&header, &claims, &self.encoding_key).map_err(|e| {
            error!(error = %e, "failed to sign key token");
            AppError::Internal
        })
    }

    /// Verify signature and structure only; the returned key may be expired.
    pub fn decode(&self, token: &str) -> Result<Key, AppError> {
        let data = jsonwebtoken::decode::<KeyClaims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| {
                debug!(error = %e, "key token rejected");
                AppError::Authentication
            })?;
        let claims = data.claims;

        let issued_at = timestamp(claims.iat)?;
        let expires_at = claims.exp.map(timestamp).transpose()?;

        Ok(Key {
            id: claims.jti,
            key_type: claims.key_type,
            issuer_id: claims.issuer_id,
            subject: claims.sub,
            issued_at,
            expires_at,
        })
    }

    /// Verify the token and reject expired keys.
    pub fn parse(&self, token: &str) -> Result<Key, AppError> {
        let key = self.decode(token)?;
        if key.expired() {
            return Err(match key.key_type {
                KeyType::Api => AppError::ApiKeyExpired,
                KeyType::Login | KeyType::Recovery => AppError::KeyExpired,
            });
        }
        Ok(key)
    }
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>, AppError> {
    DateTime::from_timestamp(secs, 0).ok_or(AppError::Authentication)
}
