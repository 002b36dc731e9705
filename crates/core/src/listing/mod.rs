//! Annotation listing pipeline: column catalog, filter specification,
//! query construction, adaptive sampling and result folding.

pub mod columns;
pub mod filter;
pub mod fold;
pub mod params;
pub mod query;
pub mod sampling;

pub use filter::{AnnotationFilter, BaseAnnotationRef};
pub use fold::{fold_rows, AnnotationRecord, Row};
pub use params::{QueryParams, SqlParam};
pub use query::{build_listing_query, BuiltQuery, Preflight};
pub use sampling::{resolve_reduction, DensityOracle};
