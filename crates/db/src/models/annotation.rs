//! Output models of the listing repositories.

use serde::Serialize;
use slidepath_core::listing::AnnotationRecord;
use slidepath_core::types::DbId;
use sqlx::FromRow;

/// One cluster emitted by a reduced listing: cluster ordinal, member count
/// and the WKT centroid of the collected geometries.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ClusteredRow {
    pub kmeans: i32,
    pub count: i64,
    pub location: Option<String>,
}

/// Minimal annotation projection for bulk listings: identity, container
/// project and a crop link.
#[derive(Debug, Clone, Serialize)]
pub struct AnnotationLight {
    pub id: DbId,
    pub container: DbId,
    pub url: String,
}

/// What a listing request produced, depending on the resolved reduction
/// level.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ListingOutput {
    /// Full mode: folded records.
    Records(Vec<AnnotationRecord>),
    /// Clustered modes: cluster summaries instead of records.
    Clustered(Vec<ClusteredRow>),
}
