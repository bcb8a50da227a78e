use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::services::pats::scope::Scope;

pub const DEFAULT_PAGE_LIMIT: u64 = 10;
pub const MAX_PAGE_LIMIT: u64 = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatRole {
    // Only user PATs are issued; the role is carried for the stored shape.
    #[default]
    User,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatStatus {
    #[default]
    Active,
    Revoked,
    Expired,
    All,
}

impl PatStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatStatus::Active => "active",
            PatStatus::Revoked => "revoked",
            PatStatus::Expired => "expired",
            PatStatus::All => "all",
        }
    }
}

impl fmt::Display for PatStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PatStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(PatStatus::Active),
            "revoked" => Ok(PatStatus::Revoked),
            "expired" => Ok(PatStatus::Expired),
            "all" => Ok(PatStatus::All),
            other => Err(AppError::malformed(format!("unknown pat status {other}"))),
        }
    }
}

/// Personal access token record.
///
/// `secret` holds the sha256 of the secret while stored; the plaintext is
/// placed here only in the value returned by create/reset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pat {
    pub id: String,
    pub user_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub secret: String,
    #[serde(default)]
    pub role: PatRole,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub revoked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revoked_at: Option<DateTime<Utc>>,
}

impl Pat {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.user_id.trim().is_empty() {
            return Err(AppError::malformed("pat user is required"));
        }
        if self.name.trim().is_empty() {
            return Err(AppError::malformed("pat name is required"));
        }
        Ok(())
    }

    pub fn expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Revocation wins over expiry.
    pub fn status_at(&self, now: DateTime<Utc>) -> PatStatus {
        if self.revoked {
            PatStatus::Revoked
        } else if self.expired_at(now) {
            PatStatus::Expired
        } else {
            PatStatus::Active
        }
    }

    pub fn status(&self) -> PatStatus {
        self.status_at(Utc::now())
    }

    /// Copy without the stored secret hash.
    pub fn redacted(mut self) -> Self {
        self.secret.clear();
        self
    }
}

/// Response shape for a PAT with its computed status.
#[derive(Debug, Clone, Serialize)]
pub struct PatView {
    #[serde(flatten)]
    pub pat: Pat,
    pub status: PatStatus,
}

impl From<Pat> for PatView {
    fn from(pat: Pat) -> Self {
        let status = pat.status();
        PatView { pat, status }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PatPageMeta {
    #[serde(default)]
    pub offset: u64,
    #[serde(default)]
    pub limit: u64,
    #[serde(default)]
    pub status: Option<PatStatus>,
}

impl PatPageMeta {
    pub fn normalized(mut self) -> Result<Self, AppError> {
        self.limit = normalize_limit(self.limit)?;
        Ok(self)
    }

    pub fn matches(&self, pat: &Pat, now: DateTime<Utc>) -> bool {
        match self.status {
            None | Some(PatStatus::All) => true,
            Some(status) => pat.status_at(now) == status,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PatsPage {
    pub total: u64,
    pub offset: u64,
    pub limit: u64,
    pub pats: Vec<PatView>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScopePageMeta {
    #[serde(default)]
    pub pat_id: String,
    #[serde(default)]
    pub offset: u64,
    #[serde(default)]
    pub limit: u64,
}

impl ScopePageMeta {
    pub fn normalized(mut self) -> Result<Self, AppError> {
        if self.pat_id.trim().is_empty() {
            return Err(AppError::MissingEntityId);
        }
        self.limit = normalize_limit(self.limit)?;
        Ok(self)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScopesPage {
    pub total: u64,
    pub offset: u64,
    pub limit: u64,
    pub scopes: Vec<Scope>,
}

fn normalize_limit(limit: u64) -> Result<u64, AppError> {
    match limit {
        0 => Ok(DEFAULT_PAGE_LIMIT),
        l if l > MAX_PAGE_LIMIT => Err(AppError::InvalidQueryParams),
        l => Ok(l),
    }
}
