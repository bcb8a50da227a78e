use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub const DEFAULT_PAGE_LIMIT: u64 = 10;
pub const MAX_PAGE_LIMIT: u64 = 100;

/// A directed authorization edge: `subject` may perform `actions` on `object`.
///
/// Unique per `(subject, object)`. Updates replace `actions` wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    #[serde(default)]
    pub owner_id: String,
    pub subject: String,
    pub object: String,
    pub actions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,
}

impl Policy {
    pub fn new(subject: impl Into<String>, object: impl Into<String>, actions: &[&str]) -> Self {
        Self {
            owner_id: String::new(),
            subject: subject.into(),
            object: object.into(),
            actions: actions.iter().map(|a| a.to_string()).collect(),
            created_at: None,
            updated_at: None,
            updated_by: None,
        }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.subject.trim().is_empty() || self.object.trim().is_empty() {
            return Err(AppError::MissingEntityId);
        }
        if self.actions.is_empty() || self.actions.iter().any(|a| a.trim().is_empty()) {
            return Err(AppError::malformed("policy actions must be non-empty"));
        }
        Ok(())
    }

    pub fn allows(&self, action: &str) -> bool {
        self.actions.iter().any(|a| a == action)
    }
}

/// Entity families with their own evaluation rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PolicyEntityType {
    Client,
    Group,
}

impl PolicyEntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyEntityType::Client => "client",
            PolicyEntityType::Group => "group",
        }
    }
}

impl fmt::Display for PolicyEntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PolicyEntityType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "client" | "clients" => Ok(PolicyEntityType::Client),
            "group" | "groups" => Ok(PolicyEntityType::Group),
            other => Err(AppError::malformed(format!(
                "unknown policy entity type {other}"
            ))),
        }
    }
}

/// Listing filter. `viewer` is set server-side for non-admin callers and
/// restricts results to policies where the viewer is subject or owner.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Page {
    #[serde(default)]
    pub offset: u64,
    #[serde(default)]
    pub limit: u64,
    pub subject: Option<String>,
    pub object: Option<String>,
    pub action: Option<String>,
    #[serde(skip)]
    pub viewer: Option<String>,
}

impl Page {
    pub fn normalized(mut self) -> Result<Self, AppError> {
        if self.limit == 0 {
            self.limit = DEFAULT_PAGE_LIMIT;
        }
        if self.limit > MAX_PAGE_LIMIT {
            return Err(AppError::InvalidQueryParams);
        }
        Ok(self)
    }

    pub fn matches(&self, policy: &Policy) -> bool {
        self.subject.as_ref().is_none_or(|s| *s == policy.subject)
            && self.object.as_ref().is_none_or(|o| *o == policy.object)
            && self.action.as_ref().is_none_or(|a| policy.allows(a))
            && self
                .viewer
                .as_ref()
                .is_none_or(|v| *v == policy.subject || *v == policy.owner_id)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PolicyPage {
    pub total: u64,
    pub offset: u64,
    pub limit: u64,
    pub policies: Vec<Policy>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_missing_parts() {
        assert!(Policy::new("s", "o", &["c_update"]).validate().is_ok());
        assert!(matches!(
            Policy::new("", "o", &["c_update"]).validate(),
            Err(AppError::MissingEntityId)
        ));
        assert!(matches!(
            Policy::new("s", "o", &[]).validate(),
            Err(AppError::MalformedEntity(_))
        ));
    }

    #[test]
    fn page_limits() {
        let page = Page::default().normalized().unwrap();
        assert_eq!(page.limit, DEFAULT_PAGE_LIMIT);

        let page = Page {
            limit: MAX_PAGE_LIMIT + 1,
            ..Page::default()
        };
        assert!(matches!(page.normalized(), Err(AppError::InvalidQueryParams)));
    }

    #[test]
    fn viewer_sees_own_subject_or_owned_policies() {
        let mut p = Policy::new("alice", "thing", &["c_list"]);
        p.owner_id = "bob".to_string();

        for (viewer, visible) in [("alice", true), ("bob", true), ("carol", false)] {
            let page = Page {
                viewer: Some(viewer.to_string()),
                ..Page::default()
            };
            assert_eq!(page.matches(&p), visible, "viewer {viewer}");
        }
    }

    #[test]
    fn entity_type_parsing() {
        assert_eq!("client".parse::<PolicyEntityType>().unwrap(), PolicyEntityType::Client);
        assert_eq!("groups".parse::<PolicyEntityType>().unwrap(), PolicyEntityType::Group);
        assert!("dashboard".parse::<PolicyEntityType>().is_err());
    }
}
