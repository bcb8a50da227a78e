pub mod pat;
pub mod scope;
pub mod secret;
pub mod service;

pub use pat::{Pat, PatPageMeta, PatRole, PatStatus, PatView, PatsPage, ScopePageMeta, ScopesPage};
pub use scope::{ANY_ENTITY, EntityType, EntityTypeError, Scope, normalize_operation};
pub use service::{NewPat, PatService};
