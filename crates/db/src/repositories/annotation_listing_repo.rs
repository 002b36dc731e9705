//! End-to-end execution of an annotation listing request: container
//! resolution, the access check, sampling resolution, query construction,
//! row retrieval and folding (or cluster aggregation in reduced modes).

use std::collections::HashMap;

use serde_json::Value;
use slidepath_core::listing::{
    build_listing_query, fold_rows, resolve_reduction, AnnotationFilter, BaseAnnotationRef,
    BuiltQuery, DensityOracle, Preflight, Row, SqlParam,
};
use slidepath_core::security::{AccessControl, Permission};
use slidepath_core::types::{DbId, ReductionLevel};
use slidepath_core::urls::UrlBuilder;
use slidepath_core::CoreError;
use sqlx::postgres::PgRow;
use sqlx::{Column, PgPool, Row as _, TypeInfo};
use tracing::debug;

use crate::error::ListingError;
use crate::models::ListingOutput;
use crate::repositories::kmeans_repo::KmeansRepo;
use crate::repositories::lookup_repo::LookupRepo;

/// Runs annotation listing requests against the store.
pub struct AnnotationListingRepo;

impl AnnotationListingRepo {
    /// Execute one listing request.
    ///
    /// Resolves the container project, checks READ on it, resolves the
    /// reduction level, builds the query and dispatches on the resolved
    /// mode. The filter is mutated along the way (group forcing, sampling
    /// state); callers hand over a fresh one per request.
    pub async fn list(
        pool: &PgPool,
        filter: &mut AnnotationFilter,
        access: &dyn AccessControl,
        oracle: &dyn DensityOracle,
        urls: &dyn UrlBuilder,
    ) -> Result<ListingOutput, ListingError> {
        let project = Self::container(pool, filter).await?;
        access.check(project, Permission::Read).await?;

        let level = resolve_reduction(filter, oracle).await?;
        let preflight = Self::preflight(pool, filter).await?;
        let built = build_listing_query(filter, &preflight)?;
        debug!(
            kind = ?filter.kind,
            project,
            reduction = ?level,
            params = built.params.len(),
            "annotation listing query built"
        );

        match level {
            ReductionLevel::Full => {
                let rows = Self::fetch_rows(pool, &built).await?;
                let records = fold_rows(filter, rows, urls)?;
                Ok(ListingOutput::Records(records))
            }
            ReductionLevel::KmeansSoft => {
                Ok(ListingOutput::Clustered(KmeansRepo::cluster_soft(pool, &built).await?))
            }
            ReductionLevel::KmeansFull => {
                Ok(ListingOutput::Clustered(KmeansRepo::cluster_full(pool, &built).await?))
            }
        }
    }

    /// Build the listing query without executing it, for callers that need
    /// the raw query text and parameters (export tooling). Runs the same
    /// preflight checks as [`Self::list`], but neither the access check nor
    /// sampling resolution.
    pub async fn build_query(
        pool: &PgPool,
        filter: &mut AnnotationFilter,
    ) -> Result<BuiltQuery, ListingError> {
        let preflight = Self::preflight(pool, filter).await?;
        Ok(build_listing_query(filter, &preflight)?)
    }

    /// Resolve the single project the filter's containers belong to.
    async fn container(pool: &PgPool, filter: &AnnotationFilter) -> Result<DbId, ListingError> {
        if let Some(project) = filter.project {
            if !LookupRepo::project_exists(pool, project).await? {
                return Err(CoreError::NotFound { entity: "project", id: project }.into());
            }
            return Ok(project);
        }
        if let Some(image) = filter.image {
            let project = LookupRepo::project_of_image(pool, image)
                .await?
                .ok_or(CoreError::NotFound { entity: "image", id: image })?;
            return Ok(project);
        }
        if let Some(images) = &filter.images {
            let first = *images.first().ok_or_else(|| {
                CoreError::MissingReference("the referenced images no longer exist".to_string())
            })?;
            let projects = LookupRepo::projects_of_images(pool, images).await?;
            return Ok(single_project(projects, "image", first)?);
        }
        if let Some(slice) = filter.slice {
            let project = LookupRepo::project_of_slice(pool, slice)
                .await?
                .ok_or(CoreError::NotFound { entity: "slice", id: slice })?;
            return Ok(project);
        }
        if let Some(slices) = &filter.slices {
            let first = *slices.first().ok_or_else(|| {
                CoreError::MissingReference("the referenced slices no longer exist".to_string())
            })?;
            let projects = LookupRepo::projects_of_slices(pool, slices).await?;
            return Ok(single_project(projects, "slice", first)?);
        }
        Err(CoreError::Validation(
            "a project, image or slice filter is required".to_string(),
        )
        .into())
    }

    /// Resolve the store-side facts the query builder needs, and fail early
    /// on filters referencing entities that no longer exist. Scalar id
    /// filters are checked here; container ids are validated during
    /// container resolution, and list filters constrain without per-element
    /// checks.
    async fn preflight(
        pool: &PgPool,
        filter: &AnnotationFilter,
    ) -> Result<Preflight, ListingError> {
        if filter.project.is_some() {
            // With a project set, container resolution never touched these.
            if let Some(image) = filter.image {
                if !LookupRepo::image_exists(pool, image).await? {
                    return Err(CoreError::NotFound { entity: "image", id: image }.into());
                }
            }
            if let Some(slice) = filter.slice {
                if !LookupRepo::slice_exists(pool, slice).await? {
                    return Err(CoreError::NotFound { entity: "slice", id: slice }.into());
                }
            }
        }
        if let Some(user) = filter.user {
            if !LookupRepo::user_exists(pool, user).await? {
                return Err(CoreError::NotFound { entity: "user", id: user }.into());
            }
        }
        for term in [filter.term, filter.suggested_term].into_iter().flatten() {
            if !LookupRepo::term_exists(pool, term).await? {
                return Err(CoreError::NotFound { entity: "term", id: term }.into());
            }
        }
        if let Some(track) = filter.track {
            if !LookupRepo::track_exists(pool, track).await? {
                return Err(CoreError::NotFound { entity: "track", id: track }.into());
            }
        }

        let mut preflight = Preflight::default();
        if let (Some(project), Some(_)) = (filter.project, &filter.images) {
            preflight.project_image_count =
                Some(LookupRepo::project_image_count(pool, project).await?);
        }
        if filter.max_distance_base_annotation.is_some() {
            if let Some(BaseAnnotationRef::Annotation(id)) = filter.base_annotation {
                let location = LookupRepo::annotation_location(pool, filter.kind, id)
                    .await?
                    .ok_or(CoreError::NotFound { entity: "annotation", id })?;
                preflight.base_annotation_location = Some(location);
            }
        }
        if filter.track_filtered() {
            if let Some(slice) = filter.before_slice.or(filter.after_slice) {
                preflight.slice_reference_rank = LookupRepo::slice_rank(pool, slice).await?;
            }
        }
        Ok(preflight)
    }

    async fn fetch_rows(pool: &PgPool, built: &BuiltQuery) -> Result<Vec<Row>, sqlx::Error> {
        let mut query = sqlx::query(&built.sql);
        for param in built.params.values() {
            query = match param {
                SqlParam::BigInt(v) => query.bind(*v),
                SqlParam::BigIntList(v) => query.bind(v.clone()),
                SqlParam::Float(v) => query.bind(*v),
                SqlParam::Text(v) => query.bind(v.clone()),
                SqlParam::Timestamp(v) => query.bind(*v),
            };
        }
        let rows = query.fetch_all(pool).await?;
        rows.iter().map(decode_row).collect()
    }
}

/// Exactly one distinct project, or the matching domain error.
fn single_project(
    projects: Vec<DbId>,
    entity: &'static str,
    id: DbId,
) -> Result<DbId, CoreError> {
    match projects.as_slice() {
        [] => Err(CoreError::NotFound { entity, id }),
        [project] => Ok(*project),
        _ => Err(CoreError::Validation(
            "annotations cannot be listed across several projects at once".to_string(),
        )),
    }
}

/// Decode a dynamically-shaped listing row into JSON values, keyed by the
/// (lowercased) result column names.
fn decode_row(row: &PgRow) -> Result<Row, sqlx::Error> {
    let mut out = HashMap::with_capacity(row.columns().len());
    for column in row.columns() {
        let i = column.ordinal();
        let value = match column.type_info().name() {
            "INT8" => row.try_get::<Option<i64>, _>(i)?.map(Value::from),
            "INT4" => row.try_get::<Option<i32>, _>(i)?.map(Value::from),
            "INT2" => row.try_get::<Option<i16>, _>(i)?.map(Value::from),
            "FLOAT8" => row
                .try_get::<Option<f64>, _>(i)?
                .and_then(|v| serde_json::Number::from_f64(v).map(Value::Number)),
            "FLOAT4" => row
                .try_get::<Option<f32>, _>(i)?
                .and_then(|v| serde_json::Number::from_f64(f64::from(v)).map(Value::Number)),
            "BOOL" => row.try_get::<Option<bool>, _>(i)?.map(Value::from),
            "TIMESTAMPTZ" => row
                .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(i)?
                .map(|v| Value::String(v.to_rfc3339())),
            _ => row.try_get::<Option<String>, _>(i)?.map(Value::String),
        };
        out.insert(column.name().to_string(), value.unwrap_or(Value::Null));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn single_project_requires_exactly_one() {
        assert_eq!(single_project(vec![3], "image", 10).unwrap(), 3);
        assert_matches!(
            single_project(vec![], "image", 10),
            Err(CoreError::NotFound { entity: "image", id: 10 })
        );
        assert_matches!(
            single_project(vec![3, 4], "image", 10),
            Err(CoreError::Validation(_))
        );
    }
}
