//! Pure listing logic for the annotation platform: filter specification,
//! query construction, adaptive sampling policy and result folding. No IO
//! happens here; the `slidepath-db` crate executes the built queries.

pub mod error;
pub mod gis;
pub mod listing;
pub mod security;
pub mod types;
pub mod urls;

pub use error::CoreError;
pub use types::{AnnotationKind, DbId, ReductionLevel, Timestamp};
