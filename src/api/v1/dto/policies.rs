/*
 * Responsibility
 * - Policies request DTO (the Policy itself doubles as create/update body)
 */
use serde::Deserialize;

use crate::services::policies::Policy;

#[derive(Debug, Deserialize)]
pub struct EvaluateRequest {
    pub object: String,
    pub actions: Vec<String>,
}

impl EvaluateRequest {
    // The subject is always the caller.
    pub fn into_policy(self) -> Policy {
        Policy {
            object: self.object,
            actions: self.actions,
            ..Policy::new("", "", &[])
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DeletePolicyRequest {
    pub subject: String,
    pub object: String,
}

impl DeletePolicyRequest {
    pub fn into_policy(self) -> Policy {
        Policy::new(self.subject, self.object, &[])
    }
}

#[derive(Debug, Deserialize)]
pub struct AssignOwnerRequest {
    pub owner_id: String,
}
