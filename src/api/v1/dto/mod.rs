pub mod keys;
pub mod pats;
pub mod policies;

use chrono::Duration;

use crate::error::AppError;

/// Optional positive lifetime given in seconds.
pub(crate) fn duration_from_seconds(seconds: Option<i64>) -> Result<Option<Duration>, AppError> {
    match seconds {
        None => Ok(None),
        Some(s) if s > 0 => Ok(Some(Duration::seconds(s))),
        Some(_) => Err(AppError::malformed("duration_seconds must be positive")),
    }
}
