use slidepath_core::CoreError;

/// Error surface of the listing repositories: either a domain error raised
/// before execution, or a database failure during it.
#[derive(Debug, thiserror::Error)]
pub enum ListingError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}
