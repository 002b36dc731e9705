//! Database layer of the annotation listing engine: executes the queries
//! built by `slidepath-core` against PostgreSQL/PostGIS and returns folded
//! records or cluster summaries.

pub mod error;
pub mod models;
pub mod repositories;

pub use error::ListingError;
pub use models::{AnnotationLight, ClusteredRow, ListingOutput};
pub use repositories::{AnnotationListingRepo, KmeansRepo, LookupRepo, UserAnnotationRepo};
