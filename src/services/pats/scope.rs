use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::AppError;

/// Matches any entity id of the scoped type.
pub const ANY_ENTITY: &str = "*";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Groups,
    Channels,
    Clients,
    Dashboard,
    Messages,
    Domains,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntityTypeError {
    #[error("unknown domain entity type {0}")]
    Unknown(String),
    #[error("unknown domain entity type {0}")]
    OutOfRange(u8),
}

impl From<EntityTypeError> for AppError {
    fn from(e: EntityTypeError) -> Self {
        AppError::malformed(e.to_string())
    }
}

impl EntityType {
    pub const ALL: [EntityType; 6] = [
        EntityType::Groups,
        EntityType::Channels,
        EntityType::Clients,
        EntityType::Dashboard,
        EntityType::Messages,
        EntityType::Domains,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Groups => "groups",
            EntityType::Channels => "channels",
            EntityType::Clients => "clients",
            EntityType::Dashboard => "dashboard",
            EntityType::Messages => "messages",
            EntityType::Domains => "domains",
        }
    }

    /// Canonical operation names accepted for this entity type.
    pub fn operations(&self) -> &'static [&'static str] {
        match self {
            EntityType::Clients => &[
                "create_clients",
                "list_clients",
                "view",
                "update",
                "delete",
                "enable",
                "disable",
                "share",
                "unshare",
                "connect_to_channel",
                "disconnect_from_channel",
            ],
            EntityType::Channels => &[
                "create_channels",
                "list_channels",
                "view",
                "update",
                "delete",
                "enable",
                "disable",
                "share",
                "unshare",
                "connect_client",
                "disconnect_client",
            ],
            EntityType::Groups => &[
                "create_groups",
                "list_groups",
                "view",
                "update",
                "delete",
                "enable",
                "disable",
                "share",
                "unshare",
                "add_children",
                "remove_children",
            ],
            EntityType::Dashboard => &[
                "create",
                "view",
                "update",
                "delete",
                "dashboard_share",
                "dashboard_unshare",
            ],
            EntityType::Messages => &["message_publish", "message_subscribe"],
            EntityType::Domains => &["view", "update", "enable", "disable", "share", "unshare", "list"],
        }
    }

    pub fn is_valid_operation(&self, operation: &str) -> bool {
        self.operations().contains(&operation)
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = EntityTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityType::ALL
            .into_iter()
            .find(|et| et.as_str() == s)
            .ok_or_else(|| EntityTypeError::Unknown(s.to_string()))
    }
}

impl TryFrom<u8> for EntityType {
    type Error = EntityTypeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        EntityType::ALL
            .get(usize::from(value))
            .copied()
            .ok_or(EntityTypeError::OutOfRange(value))
    }
}

impl From<EntityType> for u8 {
    fn from(value: EntityType) -> Self {
        value as u8
    }
}

/// Rewrite a generic verb into the entity-qualified operation name.
///
/// Unrecognized combinations are returned unchanged so that validation can
/// reject them later.
pub fn normalize_operation(entity_type: EntityType, operation: &str) -> String {
    let mapped = match (entity_type, operation) {
        (EntityType::Clients, "create") => "create_clients",
        (EntityType::Clients, "list") => "list_clients",
        (EntityType::Channels, "create") => "create_channels",
        (EntityType::Channels, "list") => "list_channels",
        (EntityType::Groups, "create") => "create_groups",
        (EntityType::Groups, "list") => "list_groups",
        (EntityType::Dashboard, "share") => "dashboard_share",
        (EntityType::Dashboard, "unshare") => "dashboard_unshare",
        (EntityType::Messages, "publish") => "message_publish",
        (EntityType::Messages, "subscribe") => "message_subscribe",
        (_, other) => other,
    };
    mapped.to_string()
}

/// One grant attached to a PAT.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ScopeRepr")]
pub struct Scope {
    pub id: String,
    pub pat_id: String,
    pub domain_id: String,
    pub entity_type: EntityType,
    pub entity_id: String,
    pub operation: String,
}

#[derive(Deserialize)]
struct ScopeRepr {
    #[serde(default)]
    id: String,
    #[serde(default)]
    pat_id: String,
    #[serde(default)]
    domain_id: String,
    entity_type: EntityType,
    #[serde(default)]
    entity_id: String,
    operation: String,
}

impl From<ScopeRepr> for Scope {
    fn from(r: ScopeRepr) -> Self {
        Scope {
            operation: normalize_operation(r.entity_type, &r.operation),
            id: r.id,
            pat_id: r.pat_id,
            domain_id: r.domain_id,
            entity_type: r.entity_type,
            entity_id: r.entity_id,
        }
    }
}

impl Scope {
    pub fn new(
        entity_type: EntityType,
        domain_id: impl Into<String>,
        operation: &str,
        entity_id: impl Into<String>,
    ) -> Self {
        Scope {
            id: String::new(),
            pat_id: String::new(),
            domain_id: domain_id.into(),
            entity_type,
            entity_id: entity_id.into(),
            operation: normalize_operation(entity_type, operation),
        }
    }

    pub fn authorized(
        &self,
        entity_type: EntityType,
        domain_id: &str,
        operation: &str,
        entity_id: &str,
    ) -> bool {
        self.entity_type == entity_type
            && self.operation == operation
            && (self.domain_id.is_empty() || self.domain_id == domain_id)
            && (self.entity_id == ANY_ENTITY || self.entity_id == entity_id)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.entity_id.trim().is_empty() {
            return Err(AppError::MissingEntityId);
        }
        if self.entity_type != EntityType::Domains && self.domain_id.trim().is_empty() {
            return Err(AppError::MissingDomainId);
        }
        if !self.entity_type.is_valid_operation(&self.operation) {
            return Err(AppError::malformed(format!(
                "invalid operation {} for entity type {}",
                self.operation, self.entity_type
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_entity_matches_any_id() {
        let s = Scope::new(EntityType::Clients, "d1", "view", ANY_ENTITY);
        for id in ["c1", "c2", ""] {
            assert!(s.authorized(EntityType::Clients, "d1", "view", id));
        }
        assert!(!s.authorized(EntityType::Channels, "d1", "view", "c1"));
        assert!(!s.authorized(EntityType::Clients, "d2", "view", "c1"));
        assert!(!s.authorized(EntityType::Clients, "d1", "update", "c1"));
    }

    #[test]
    fn empty_domain_matches_any_domain() {
        let s = Scope::new(EntityType::Domains, "", "view", "d9");
        assert!(s.authorized(EntityType::Domains, "anything", "view", "d9"));
        assert!(!s.authorized(EntityType::Domains, "anything", "view", "d8"));
    }

    #[test]
    fn operations_are_remapped_on_decode() {
        let scope: Scope = serde_json::from_value(serde_json::json!({
            "pat_id": "p1",
            "domain_id": "d1",
            "entity_type": "messages",
            "entity_id": "*",
            "operation": "publish",
        }))
        .unwrap();
        assert_eq!(scope.operation, "message_publish");
        assert_eq!(scope.pat_id, "p1");

        for (et, raw, want) in [
            (EntityType::Clients, "create", "create_clients"),
            (EntityType::Channels, "list", "list_channels"),
            (EntityType::Groups, "create", "create_groups"),
            (EntityType::Dashboard, "unshare", "dashboard_unshare"),
            (EntityType::Messages, "subscribe", "message_subscribe"),
            (EntityType::Domains, "list", "list"),
            (EntityType::Dashboard, "create", "create"),
        ] {
            assert_eq!(normalize_operation(et, raw), want, "{et} {raw}");
        }
    }

    #[test]
    fn validate_checks_ids_and_operation() {
        assert!(Scope::new(EntityType::Groups, "d1", "list", "*").validate().is_ok());
        assert!(Scope::new(EntityType::Domains, "", "view", "d1").validate().is_ok());

        assert!(matches!(
            Scope::new(EntityType::Groups, "d1", "view", "").validate(),
            Err(AppError::MissingEntityId)
        ));
        assert!(matches!(
            Scope::new(EntityType::Channels, "", "view", "ch1").validate(),
            Err(AppError::MissingDomainId)
        ));
        assert!(matches!(
            Scope::new(EntityType::Messages, "d1", "delete", "*").validate(),
            Err(AppError::MalformedEntity(_))
        ));
    }

    #[test]
    fn entity_type_conversions() {
        assert_eq!("channels".parse::<EntityType>().unwrap(), EntityType::Channels);
        let err = "unknown".parse::<EntityType>().unwrap_err();
        assert_eq!(err.to_string(), "unknown domain entity type unknown");

        assert_eq!(EntityType::try_from(3).unwrap(), EntityType::Dashboard);
        assert_eq!(u8::from(EntityType::Domains), 5);
        let err = EntityType::try_from(42).unwrap_err();
        assert_eq!(err.to_string(), "unknown domain entity type 42");
    }
}
