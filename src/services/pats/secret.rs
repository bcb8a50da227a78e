//! PAT secret format.
//!
//! `pat_<hex(user_id ":" pat_id)>_<base64url(32 random bytes)>`
//!
//! The identity part lets the service find the record without a secret index;
//! only the sha256 of the whole string is stored.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};
use tracing::error;

use crate::error::AppError;

const PREFIX: &str = "pat";
const SECRET_BYTES: usize = 32;

pub fn generate(user_id: &str, pat_id: &str) -> Result<String, AppError> {
    let mut bytes = [0u8; SECRET_BYTES];
    getrandom::fill(&mut bytes).map_err(|e| {
        error!(error = %e, "failed to read random bytes for pat secret");
        AppError::Internal
    })?;

    let identity = hex::encode(format!("{user_id}:{pat_id}"));
    Ok(format!("{PREFIX}_{identity}_{}", URL_SAFE_NO_PAD.encode(bytes)))
}

/// sha256 of the secret, hex encoded.
pub fn hash(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.as_bytes()))
}

/// Extract `(user_id, pat_id)` from a secret.
pub fn parse(secret: &str) -> Result<(String, String), AppError> {
    let mut parts = secret.splitn(3, '_');
    let (Some(PREFIX), Some(identity), Some(random)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(AppError::Authentication);
    };
    if random.is_empty() {
        return Err(AppError::Authentication);
    }

    let decoded = hex::decode(identity).map_err(|_| AppError::Authentication)?;
    let decoded = String::from_utf8(decoded).map_err(|_| AppError::Authentication)?;

    // pat ids are uuids; the user id may itself contain ':'
    match decoded.rsplit_once(':') {
        Some((user, pat)) if !user.is_empty() && !pat.is_empty() => {
            Ok((user.to_string(), pat.to_string()))
        }
        _ => Err(AppError::Authentication),
    }
}
