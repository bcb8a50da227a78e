/*
 * Responsibility
 * - Shared context attached to the Router (AppState)
 * - Cheap to clone (services live behind Arc)
 */
use std::sync::Arc;

use crate::services::keys::KeyService;
use crate::services::pats::PatService;
use crate::services::policies::PolicyService;

#[derive(Clone)]
pub struct AppState {
    pub keys: Arc<KeyService>,
    pub policies: Arc<PolicyService>,
    pub pats: Arc<PatService>,
}

impl AppState {
    pub fn new(keys: Arc<KeyService>, policies: Arc<PolicyService>, pats: Arc<PatService>) -> Self {
        Self {
            keys,
            policies,
            pats,
        }
    }
}
