//! Adaptive sampling policy.
//!
//! Viewport listings can ask for clustering (`kmeans`) without committing
//! to a reduction level; the decision is delegated to a density oracle that
//! knows how many annotations the viewport holds. The resolved level is
//! written back into the filter so the query builder and the dispatcher
//! agree on the execution mode.

use async_trait::async_trait;

use crate::error::CoreError;
use crate::listing::filter::AnnotationFilter;
use crate::types::{DbId, ReductionLevel};

/// Decides how much reduction a viewport needs.
#[async_trait]
pub trait DensityOracle: Send + Sync {
    /// Reduction level for the annotations of `user` on `slices` inside
    /// the viewport `bbox`.
    async fn reduction_for(
        &self,
        slices: &[DbId],
        user: Option<DbId>,
        bbox: &str,
    ) -> Result<ReductionLevel, CoreError>;
}

/// Resolve the filter's reduction level.
///
/// Without the `kmeans` flag the listing always runs full. With it, an
/// explicitly requested level wins; otherwise the oracle decides, which
/// requires a viewport and at least one slice. A single `slice` filter is
/// normalized into the `slices` list first; an explicitly empty list counts
/// as absent.
pub async fn resolve_reduction(
    filter: &mut AnnotationFilter,
    oracle: &dyn DensityOracle,
) -> Result<ReductionLevel, CoreError> {
    if !filter.kmeans {
        filter.reduction = Some(ReductionLevel::Full);
        return Ok(ReductionLevel::Full);
    }
    if let Some(level) = filter.reduction {
        return Ok(level);
    }

    let bbox = filter.bbox.clone().ok_or_else(|| {
        CoreError::Validation(
            "clustered listings require a viewport (bbox) filter".to_string(),
        )
    })?;
    if filter.slices.as_ref().map_or(true, |slices| slices.is_empty()) {
        filter.slices = filter.slice.map(|slice| vec![slice]);
    }
    let slices = filter.slices.clone().filter(|s| !s.is_empty()).ok_or_else(|| {
        CoreError::Validation(
            "clustered listings require a slice or slices filter".to_string(),
        )
    })?;

    let level = oracle
        .reduction_for(&slices, filter.user, &bbox)
        .await?;
    filter.reduction = Some(level);
    Ok(level)
}
