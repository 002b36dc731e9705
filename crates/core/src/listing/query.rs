//! Listing query builder.
//!
//! Composes the projection, join set and WHERE clause from the filter
//! specification and the column catalog. Every optional criterion
//! contributes one independent fragment, generated in a fixed order so the
//! resulting query text and parameter list are deterministic for a given
//! filter. Filters that reference a term/track association force-add the
//! matching column group first, then the whole base query is wrapped as a
//! derived table joined against the association table so the folder sees
//! one row per annotation/term/track combination.

use crate::error::CoreError;
use crate::listing::filter::{AnnotationFilter, BaseAnnotationRef, SelectedSource};
use crate::listing::params::{QueryParams, SqlParam};
use crate::types::{AnnotationKind, ReductionLevel};

/// Cluster count handed to `ST_ClusterKMeans` in reduced modes.
pub const KMEANS_CLUSTER_COUNT: u32 = 5;

/// Pixel bound for thumbnail crops attached by the folder.
pub const SMALL_CROP_MAX_SIZE: u32 = 256;

/// Computed channel/z/time position of a slice inside its image, used for
/// track ordering and the before/after-slice window.
const RANK_EXPR: &str = "(asl.channel + ai.channels * (asl.z_stack + ai.depth * asl.time))";

/// Query text plus its ordered bound parameters.
#[derive(Debug, Clone)]
pub struct BuiltQuery {
    pub sql: String,
    pub params: QueryParams,
}

/// Facts resolved against the store before query construction.
///
/// The builder itself never touches the database; the caller performs the
/// existence checks of the referenced entities and hands over whatever the
/// fragments need.
#[derive(Debug, Clone, Default)]
pub struct Preflight {
    /// Number of images in the filtered project, when known. An `images`
    /// list covering the whole project is dropped as a no-op constraint.
    pub project_image_count: Option<i64>,
    /// WKT geometry of the base annotation for the max-distance filter.
    pub base_annotation_location: Option<String>,
    /// Rank of the slice referenced by `before_slice`/`after_slice`.
    pub slice_reference_rank: Option<i64>,
}

/// Build the listing query for `filter`.
///
/// Mutates the filter: resolves the requested groups, force-adds groups
/// required by association filters, and (in soft-clustered mode) forces a
/// raw `location` column into the projection.
pub fn build_listing_query(
    filter: &mut AnnotationFilter,
    preflight: &Preflight,
) -> Result<BuiltQuery, CoreError> {
    filter.ensure_groups();
    check_kind_capabilities(filter)?;

    if filter.effective_reduction() == ReductionLevel::KmeansSoft {
        filter.add_extra_column("location", "a.location");
    }

    let mut params = QueryParams::new();
    let where_sql = build_where(filter, preflight, &mut params)?;

    // Groups are final only after the predicates ran.
    let wrapped = (filter.term_filtered() || filter.track_filtered())
        && filter.effective_reduction() == ReductionLevel::Full;
    let select = build_select(filter, wrapped);
    let from = build_from(filter);

    let sql = if wrapped {
        wrap_with_associations(filter, format!("{select}{from}{where_sql}"))
    } else {
        let mut sql = format!("{select}{from}{where_sql}");
        if filter.effective_reduction() == ReductionLevel::Full {
            sql.push_str("ORDER BY a.id DESC");
        }
        sql
    };

    Ok(BuiltQuery { sql, params })
}

/// Filters that only make sense for kinds with the matching association.
fn check_kind_capabilities(filter: &AnnotationFilter) -> Result<(), CoreError> {
    let kind = filter.kind;
    if !kind.supports_track()
        && (filter.track_filtered() || filter.multiple_track || filter.no_track)
    {
        return Err(CoreError::Validation(
            "track filters do not apply to reviewed annotations".to_string(),
        ));
    }
    if kind == AnnotationKind::Reviewed
        && (filter.suggested_term.is_some()
            || filter.suggested_terms.is_some()
            || filter.user_for_term_algo.is_some()
            || filter.users_for_term_algo.is_some()
            || filter.no_algo_term)
    {
        return Err(CoreError::Validation(
            "suggested-term filters do not apply to reviewed annotations".to_string(),
        ));
    }
    if filter.review_users.is_some() && kind != AnnotationKind::Reviewed {
        return Err(CoreError::Validation(
            "review-user filters only apply to reviewed annotations".to_string(),
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Projection
// ---------------------------------------------------------------------------

fn build_select(filter: &AnnotationFilter, wrapped: bool) -> String {
    if filter.effective_reduction() == ReductionLevel::KmeansFull {
        return format!(
            "SELECT ST_ClusterKMeans(a.location, {KMEANS_CLUSTER_COUNT}) OVER () AS kmeans, a.location AS location\n"
        );
    }

    let term_alias = filter.kind.term_alias();
    let mut head: Vec<String> = Vec::new();
    for column in filter.selected_columns() {
        let expr = match column.source {
            SelectedSource::Expr(expr) => expr,
            SelectedSource::Derived => continue,
        };
        // The wrap re-emits these from the association join.
        if wrapped && filter.term_filtered() {
            if matches!(column.name.as_str(), "term" | "annotationTerms" | "userTerm") {
                continue;
            }
        }
        if wrapped && filter.track_filtered() {
            if matches!(column.name.as_str(), "track" | "annotationTracks") {
                continue;
            }
        }
        if column.name == "term" && filter.kind.term_soft_delete() {
            // Null out terms whose association row was soft-deleted instead
            // of surfacing the stale join.
            head.push(format!(
                "CASE WHEN {term_alias}.deleted IS NOT NULL THEN NULL ELSE {expr} END AS term"
            ));
        } else {
            head.push(format!("{expr} AS {}", column.name));
        }
    }
    if filter.track_filtered() {
        head.push(format!("{RANK_EXPR} AS rank"));
    }
    format!("SELECT {}\n", head.join(", "))
}

// ---------------------------------------------------------------------------
// FROM / joins
// ---------------------------------------------------------------------------

fn build_from(filter: &AnnotationFilter) -> String {
    let kind = filter.kind;
    let needs_rank = filter.track_filtered();
    let needs_image = filter.has_group("image") || needs_rank;
    let needs_slice = filter.has_group("slice") || needs_rank;
    let needs_term = filter.has_group("term")
        || (kind == AnnotationKind::Algo && filter.has_group("algo"));
    let needs_algo = kind == AnnotationKind::User && filter.has_group("algo");
    let needs_track = filter.has_group("track") && kind.supports_track();
    let needs_tag = filter.tag.is_some() || filter.tags.is_some();

    let mut from = format!("FROM {} a\n", kind.base_table());
    if needs_image {
        from.push_str("LEFT OUTER JOIN image_instance ii ON a.image_id = ii.id\n");
        from.push_str("LEFT OUTER JOIN abstract_image ai ON ii.base_image_id = ai.id\n");
    }
    if needs_slice {
        from.push_str("LEFT OUTER JOIN abstract_slice asl ON a.slice_id = asl.id\n");
    }
    if needs_term {
        from.push_str(&format!(
            "LEFT OUTER JOIN {} {} ON {}.{} = a.id\n",
            kind.term_table(),
            kind.term_alias(),
            kind.term_alias(),
            kind.term_fk()
        ));
    }
    if needs_algo {
        from.push_str("LEFT OUTER JOIN algo_annotation_term aat ON aat.annotation_ident = a.id\n");
    }
    if needs_track {
        from.push_str("LEFT OUTER JOIN annotation_track atr ON atr.annotation_ident = a.id\n");
    }
    if needs_tag {
        from.push_str("LEFT OUTER JOIN tag_domain_association tda ON tda.domain_ident = a.id\n");
    }
    from
}

// ---------------------------------------------------------------------------
// WHERE fragments, in the documented order
// ---------------------------------------------------------------------------

fn build_where(
    filter: &mut AnnotationFilter,
    preflight: &Preflight,
    params: &mut QueryParams,
) -> Result<String, CoreError> {
    let mut sql = String::from("WHERE true\n");

    if let Some(project) = filter.project {
        let p = params.push(SqlParam::BigInt(project));
        sql.push_str(&format!("AND a.project_id = {p}\n"));
    }
    if let Some(user) = filter.user {
        let p = params.push(SqlParam::BigInt(user));
        sql.push_str(&format!("AND a.user_id = {p}\n"));
    }
    if let Some(users) = &filter.users {
        let p = params.push(SqlParam::BigIntList(users.clone()));
        sql.push_str(&format!("AND a.user_id = ANY({p})\n"));
    }
    if let Some(image) = filter.image {
        let p = params.push(SqlParam::BigInt(image));
        sql.push_str(&format!("AND a.image_id = {p}\n"));
    }
    if let Some(fragment) = images_const(filter, preflight, params)? {
        sql.push_str(&fragment);
    }
    if let Some(slice) = filter.slice {
        let p = params.push(SqlParam::BigInt(slice));
        sql.push_str(&format!("AND a.slice_id = {p}\n"));
    }
    if let Some(slices) = &filter.slices {
        if slices.is_empty() {
            return Err(CoreError::MissingReference(
                "the referenced slices no longer exist".to_string(),
            ));
        }
        let p = params.push(SqlParam::BigIntList(slices.clone()));
        sql.push_str(&format!("AND a.slice_id = ANY({p})\n"));
    }
    if let Some(tag) = filter.tag {
        let p = params.push(SqlParam::BigInt(tag));
        if filter.no_tag {
            sql.push_str(&format!("AND (tda.tag_id = {p} OR tda.tag_id IS NULL)\n"));
        } else {
            sql.push_str(&format!("AND tda.tag_id = {p}\n"));
        }
    }
    if let Some(tags) = &filter.tags {
        let p = params.push(SqlParam::BigIntList(tags.clone()));
        if filter.no_tag {
            sql.push_str(&format!(
                "AND (tda.tag_id = ANY({p}) OR tda.tag_id IS NULL)\n"
            ));
        } else {
            sql.push_str(&format!("AND tda.tag_id = ANY({p})\n"));
        }
    }
    if let Some(term) = filter.term {
        filter.force_group("term");
        let alias = filter.kind.term_alias();
        let p = params.push(SqlParam::BigInt(term));
        let no_term = no_term_branch(filter, alias);
        sql.push_str(&format!("AND ({alias}.term_id = {p}{no_term})\n"));
    }
    if let Some(terms) = filter.terms.clone() {
        filter.force_group("term");
        let alias = filter.kind.term_alias();
        let p = params.push(SqlParam::BigIntList(terms));
        let no_term = no_term_branch(filter, alias);
        sql.push_str(&format!("AND ({alias}.term_id = ANY({p}){no_term})\n"));
    }
    if filter.multiple_term {
        filter.force_group("term");
        sql.push_str(&multiple_term_const(filter.kind));
    }
    if let Some(track) = filter.track {
        filter.force_group("track");
        let p = params.push(SqlParam::BigInt(track));
        let no_track = no_track_branch(filter);
        sql.push_str(&format!("AND (atr.track_id = {p}{no_track})\n"));
    }
    if let Some(tracks) = filter.tracks.clone() {
        filter.force_group("track");
        let p = params.push(SqlParam::BigIntList(tracks));
        let no_track = no_track_branch(filter);
        sql.push_str(&format!("AND (atr.track_id = ANY({p}){no_track})\n"));
    }
    if filter.multiple_track {
        filter.force_group("track");
        sql.push_str(
            "AND a.id IN (SELECT annotation_ident FROM annotation_track \
             GROUP BY annotation_ident HAVING COUNT(DISTINCT track_id) > 1)\n",
        );
    }
    if let Some(fragment) = slice_window_const(filter, preflight, params)? {
        sql.push_str(&fragment);
    }
    if let Some(users_for_term) = filter.users_for_term.clone() {
        filter.force_group("term");
        let p = params.push(SqlParam::BigIntList(users_for_term));
        sql.push_str(&format!("AND {} = ANY({p})\n", filter.kind.term_user_column()));
    }
    if let Some(user_job) = filter.user_for_term_algo {
        filter.force_group("term");
        filter.force_group("algo");
        let p = params.push(SqlParam::BigInt(user_job));
        sql.push_str(&format!("AND aat.user_job_id = {p}\n"));
    }
    if let Some(user_jobs) = filter.users_for_term_algo.clone() {
        filter.force_group("algo");
        filter.force_group("term");
        let p = params.push(SqlParam::BigIntList(user_jobs));
        sql.push_str(&format!("AND aat.user_job_id = ANY({p})\n"));
    }
    if let Some(term) = filter.suggested_term {
        filter.force_group("algo");
        let p = params.push(SqlParam::BigInt(term));
        sql.push_str(&format!("AND aat.term_id = {p} AND aat.deleted IS NULL\n"));
    }
    if let Some(terms) = filter.suggested_terms.clone() {
        filter.force_group("algo");
        let p = params.push(SqlParam::BigIntList(terms));
        sql.push_str(&format!(
            "AND aat.term_id = ANY({p}) AND aat.deleted IS NULL\n"
        ));
    }
    if filter.no_algo_term {
        filter.force_group("algo");
        sql.push_str("AND aat.term_id IS NULL\n");
    }
    if filter.not_reviewed_only && filter.kind != AnnotationKind::Reviewed {
        sql.push_str("AND a.count_reviewed_annotations = 0\n");
    }
    if let Some(parents) = &filter.parents {
        let p = params.push(SqlParam::BigIntList(parents.clone()));
        sql.push_str(&format!("AND a.parent_ident = ANY({p})\n"));
    }
    if filter.avoid_empty_centroid {
        sql.push_str("AND ST_IsEmpty(ST_Centroid(a.location)) = false\n");
    }
    if let Some(review_users) = &filter.review_users {
        let p = params.push(SqlParam::BigIntList(review_users.clone()));
        sql.push_str(&format!("AND a.review_user_id = ANY({p})\n"));
    }
    if let Some(bbox) = &filter.bbox {
        let p = params.push(SqlParam::Text(bbox.clone()));
        sql.push_str(&format!(
            "AND ST_Intersects(a.location, ST_GeometryFromText({p}, 0))\n"
        ));
    }
    if let Some(bbox) = &filter.bbox_annotation {
        let p = params.push(SqlParam::Text(bbox.clone()));
        sql.push_str(&format!(
            "AND ST_Intersects(a.location, ST_GeometryFromText({p}, 0))\n"
        ));
    }
    if let Some(fragment) = max_distance_const(filter, preflight, params)? {
        sql.push_str(&fragment);
    }
    if let Some(excluded) = filter.excluded_annotation {
        let p = params.push(SqlParam::BigInt(excluded));
        sql.push_str(&format!("AND a.id <> {p}\n"));
    }
    if let Some(before) = filter.created_before {
        let p = params.push(SqlParam::Timestamp(before));
        sql.push_str(&format!("AND a.created < {p}\n"));
    }
    if let Some(after) = filter.created_after {
        let p = params.push(SqlParam::Timestamp(after));
        sql.push_str(&format!("AND a.created > {p}\n"));
    }

    Ok(sql)
}

fn no_term_branch(filter: &AnnotationFilter, alias: &str) -> String {
    if filter.no_term {
        format!(" OR {alias}.term_id IS NULL")
    } else {
        String::new()
    }
}

fn no_track_branch(filter: &AnnotationFilter) -> String {
    if filter.no_track {
        " OR atr.track_id IS NULL".to_string()
    } else {
        String::new()
    }
}

fn multiple_term_const(kind: AnnotationKind) -> String {
    let deleted = if kind.term_soft_delete() {
        "WHERE deleted IS NULL "
    } else {
        ""
    };
    format!(
        "AND a.id IN (SELECT {fk} FROM {table} {deleted}\
         GROUP BY {fk} HAVING COUNT(DISTINCT term_id) > 1)\n",
        fk = kind.term_fk(),
        table = kind.term_table(),
    )
}

fn images_const(
    filter: &AnnotationFilter,
    preflight: &Preflight,
    params: &mut QueryParams,
) -> Result<Option<String>, CoreError> {
    let Some(images) = &filter.images else {
        return Ok(None);
    };
    if images.is_empty() {
        return Err(CoreError::MissingReference(
            "the referenced images no longer exist".to_string(),
        ));
    }
    // A list covering every image of the project constrains nothing.
    if filter.project.is_some() && preflight.project_image_count == Some(images.len() as i64) {
        return Ok(None);
    }
    let p = params.push(SqlParam::BigIntList(images.clone()));
    Ok(Some(format!("AND a.image_id = ANY({p})\n")))
}

fn slice_window_const(
    filter: &mut AnnotationFilter,
    preflight: &Preflight,
    params: &mut QueryParams,
) -> Result<Option<String>, CoreError> {
    if !filter.track_filtered() {
        return Ok(None);
    }
    let (slice_id, sign) = match (filter.before_slice, filter.after_slice) {
        (Some(id), _) => (id, "<"),
        (None, Some(id)) => (id, ">"),
        (None, None) => return Ok(None),
    };
    filter.force_group("slice");
    let rank = preflight
        .slice_reference_rank
        .ok_or(CoreError::NotFound { entity: "slice", id: slice_id })?;
    let p = params.push(SqlParam::BigInt(rank));
    Ok(Some(format!("AND {RANK_EXPR} {sign} {p}\n")))
}

fn max_distance_const(
    filter: &AnnotationFilter,
    preflight: &Preflight,
    params: &mut QueryParams,
) -> Result<Option<String>, CoreError> {
    let Some(distance) = filter.max_distance_base_annotation else {
        return Ok(None);
    };
    let base = filter.base_annotation.as_ref().ok_or_else(|| {
        CoreError::MissingReference(
            "a 'base_annotation' reference is required when 'max_distance_base_annotation' is set"
                .to_string(),
        )
    })?;
    // Prefer the geometry resolved during preflight; fall back to treating
    // the stored reference as a literal geometry description.
    let location = match (&preflight.base_annotation_location, base) {
        (Some(wkt), _) => wkt.clone(),
        (None, BaseAnnotationRef::Location(wkt)) => wkt.clone(),
        (None, BaseAnnotationRef::Annotation(id)) => id.to_string(),
    };
    let w = params.push(SqlParam::Text(location));
    let d = params.push(SqlParam::BigInt(distance));
    Ok(Some(format!(
        "AND ST_Distance(a.location, ST_GeometryFromText({w})) <= {d}\n"
    )))
}

// ---------------------------------------------------------------------------
// Association wrap
// ---------------------------------------------------------------------------

/// Wrap the base query as a derived table and join the term/track
/// association tables, so every association lands on its own row with a
/// deterministic ordering the folder can rely on.
fn wrap_with_associations(filter: &AnnotationFilter, inner: String) -> String {
    let kind = filter.kind;
    let term_filtered = filter.term_filtered();
    let track_filtered = filter.track_filtered();
    let alias = kind.term_alias();

    let mut outer_cols: Vec<String> = Vec::new();
    if term_filtered {
        let user_expr = match kind {
            // Inside the wrap only the inner aliases of `a` are visible.
            AnnotationKind::Reviewed => "a.reviewuser",
            other => other.term_user_column(),
        };
        outer_cols.push(format!(
            "{alias}.term_id AS term, {} AS annotationTerms, {user_expr} AS userTerm",
            kind.term_assoc_id_column()
        ));
    }
    if track_filtered {
        outer_cols.push("atr.track_id AS track, atr.id AS annotationTracks".to_string());
    }

    let mut sql = format!(
        "SELECT DISTINCT a.*, {}\nFROM ({inner}) a\n",
        outer_cols.join(", ")
    );
    if term_filtered {
        sql.push_str(&format!(
            "LEFT OUTER JOIN {} {alias} ON {alias}.{} = a.id\n",
            kind.term_table(),
            kind.term_fk()
        ));
    }
    if track_filtered {
        sql.push_str("LEFT OUTER JOIN annotation_track atr ON atr.annotation_ident = a.id\n");
    }
    sql.push_str("WHERE true\n");
    if term_filtered && kind.term_soft_delete() {
        sql.push_str(&format!("AND {alias}.deleted IS NULL\n"));
    }
    sql.push_str("ORDER BY ");
    sql.push_str(if track_filtered { "a.rank ASC" } else { "a.id DESC" });
    if term_filtered {
        sql.push_str(&format!(", {alias}.term_id"));
    }
    if track_filtered {
        sql.push_str(", atr.track_id");
    }
    sql
}
