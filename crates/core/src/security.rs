//! Access-control seam.
//!
//! The listing engine performs exactly one capability check: READ on the
//! container project resolved from the filter. Enforcement itself lives
//! outside this crate.

use crate::error::CoreError;
use crate::types::DbId;

/// Capability requested on a container project.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Read,
}

/// Checks a capability on a project before any query is built.
#[async_trait::async_trait]
pub trait AccessControl: Send + Sync {
    /// Returns `Err(CoreError::Forbidden)` when the current caller lacks
    /// `permission` on `project`.
    async fn check(&self, project: DbId, permission: Permission) -> Result<(), CoreError>;
}
