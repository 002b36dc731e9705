use crate::types::DbId;

/// Domain-level error taxonomy.
///
/// All checked errors are raised before a listing query is issued, so a
/// caller never observes a partially-executed result.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// A referenced entity id does not exist.
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    /// A reference that must be present is absent or resolves to nothing
    /// (e.g. an explicit empty image list, a missing base annotation).
    #[error("Missing reference: {0}")]
    MissingReference(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
