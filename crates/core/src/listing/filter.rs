//! Filter specification: the request-scoped value object holding every
//! optional listing criterion, the requested output groups and the sampling
//! state. Created per request, mutated only by group forcing and sampling
//! resolution, discarded after use.

use crate::listing::columns::{self, ColumnSource, DEFAULT_GROUPS};
use crate::types::{AnnotationKind, DbId, ReductionLevel, Timestamp};

/// Reference to the annotation a max-distance filter measures from.
///
/// Normally an annotation id resolved to its stored geometry; a literal
/// WKT description is accepted as a fallback.
#[derive(Debug, Clone, PartialEq)]
pub enum BaseAnnotationRef {
    Annotation(DbId),
    Location(String),
}

/// Source of one resolved projection column.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectedSource {
    /// SQL expression to project.
    Expr(String),
    /// Computed by the folder after retrieval.
    Derived,
}

/// One resolved projection column.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedColumn {
    pub name: String,
    pub source: SelectedSource,
}

/// All criteria for one annotation listing request.
#[derive(Debug, Clone)]
pub struct AnnotationFilter {
    pub kind: AnnotationKind,

    // Containers
    pub project: Option<DbId>,
    pub image: Option<DbId>,
    pub images: Option<Vec<DbId>>,
    pub slice: Option<DbId>,
    pub slices: Option<Vec<DbId>>,

    // Users
    pub user: Option<DbId>,
    pub users: Option<Vec<DbId>>,
    pub users_for_term: Option<Vec<DbId>>,
    pub user_for_term_algo: Option<DbId>,
    pub users_for_term_algo: Option<Vec<DbId>>,
    pub review_users: Option<Vec<DbId>>,

    // Associations
    pub term: Option<DbId>,
    pub terms: Option<Vec<DbId>>,
    pub suggested_term: Option<DbId>,
    pub suggested_terms: Option<Vec<DbId>>,
    pub track: Option<DbId>,
    pub tracks: Option<Vec<DbId>>,
    pub tag: Option<DbId>,
    pub tags: Option<Vec<DbId>>,
    pub parents: Option<Vec<DbId>>,

    // Track ordering window
    pub before_slice: Option<DbId>,
    pub after_slice: Option<DbId>,

    // Dates
    pub created_after: Option<Timestamp>,
    pub created_before: Option<Timestamp>,

    // Toggles
    pub not_reviewed_only: bool,
    pub no_term: bool,
    pub no_tag: bool,
    pub no_track: bool,
    pub no_algo_term: bool,
    pub multiple_term: bool,
    pub multiple_track: bool,
    pub avoid_empty_centroid: bool,

    // Geometry
    pub bbox: Option<String>,
    pub bbox_annotation: Option<String>,
    pub base_annotation: Option<BaseAnnotationRef>,
    pub max_distance_base_annotation: Option<i64>,
    pub excluded_annotation: Option<DbId>,

    // Sampling
    pub kmeans: bool,
    pub reduction: Option<ReductionLevel>,

    // Output shape
    pub groups: Option<Vec<String>>,
    pub extra_columns: Vec<(String, String)>,
}

impl AnnotationFilter {
    pub fn new(kind: AnnotationKind) -> Self {
        Self {
            kind,
            project: None,
            image: None,
            images: None,
            slice: None,
            slices: None,
            user: None,
            users: None,
            users_for_term: None,
            user_for_term_algo: None,
            users_for_term_algo: None,
            review_users: None,
            term: None,
            terms: None,
            suggested_term: None,
            suggested_terms: None,
            track: None,
            tracks: None,
            tag: None,
            tags: None,
            parents: None,
            before_slice: None,
            after_slice: None,
            created_after: None,
            created_before: None,
            not_reviewed_only: false,
            no_term: false,
            no_tag: false,
            no_track: false,
            no_algo_term: false,
            multiple_term: false,
            multiple_track: false,
            avoid_empty_centroid: false,
            bbox: None,
            bbox_annotation: None,
            base_annotation: None,
            max_distance_base_annotation: None,
            excluded_annotation: None,
            kmeans: false,
            reduction: None,
            groups: None,
            extra_columns: Vec::new(),
        }
    }

    /// Materialize the requested groups, applying the default set and
    /// forcing `basic`: identity and container linkage are mandatory.
    pub fn ensure_groups(&mut self) {
        let mut groups = self
            .groups
            .take()
            .unwrap_or_else(|| DEFAULT_GROUPS.iter().map(|g| g.to_string()).collect());
        if !groups.iter().any(|g| g == "basic") {
            groups.push("basic".to_string());
        }
        let mut seen = Vec::with_capacity(groups.len());
        for g in groups {
            if !seen.contains(&g) {
                seen.push(g);
            }
        }
        self.groups = Some(seen);
    }

    /// Add a column group required by a WHERE fragment, e.g. a term filter
    /// needs the term-association join alias present in the query.
    pub fn force_group(&mut self, name: &str) {
        self.ensure_groups();
        if let Some(groups) = self.groups.as_mut() {
            if !groups.iter().any(|g| g == name) {
                groups.push(name.to_string());
            }
        }
    }

    pub fn has_group(&self, name: &str) -> bool {
        match &self.groups {
            Some(groups) => groups.iter().any(|g| g == name),
            None => DEFAULT_GROUPS.contains(&name) || name == "basic",
        }
    }

    /// Overlay an ad-hoc output column; extras win on name collision.
    pub fn add_extra_column(&mut self, name: impl Into<String>, expr: impl Into<String>) {
        let name = name.into();
        let expr = expr.into();
        match self.extra_columns.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = expr,
            None => self.extra_columns.push((name, expr)),
        }
    }

    /// Resolve the projection: union of the active groups' fields in
    /// catalog order, then the ad-hoc extras (replacing same-named fields
    /// in place, appending new ones).
    pub fn selected_columns(&self) -> Vec<SelectedColumn> {
        let mut selected: Vec<SelectedColumn> = Vec::new();
        for group in columns::catalog(self.kind) {
            if !self.has_group(group.name) {
                continue;
            }
            for c in group.columns {
                if selected.iter().any(|s| s.name == c.name) {
                    continue;
                }
                selected.push(SelectedColumn {
                    name: c.name.to_string(),
                    source: match c.source {
                        ColumnSource::Native(expr) => SelectedSource::Expr(expr.to_string()),
                        ColumnSource::Derived => SelectedSource::Derived,
                    },
                });
            }
        }
        for (name, expr) in &self.extra_columns {
            match selected.iter_mut().find(|s| s.name == *name) {
                Some(s) => s.source = SelectedSource::Expr(expr.clone()),
                None => selected.push(SelectedColumn {
                    name: name.clone(),
                    source: SelectedSource::Expr(expr.clone()),
                }),
            }
        }
        selected
    }

    /// Every field name the folder may encounter for this kind, catalog
    /// fields first, then ad-hoc extras.
    pub fn all_field_names(&self) -> Vec<String> {
        let mut names: Vec<String> = columns::all_field_names(self.kind)
            .into_iter()
            .map(|n| n.to_string())
            .collect();
        for (name, _) in &self.extra_columns {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        names
    }

    pub fn term_filtered(&self) -> bool {
        self.term.is_some() || self.terms.is_some()
    }

    pub fn track_filtered(&self) -> bool {
        self.track.is_some() || self.tracks.is_some()
    }

    pub fn effective_reduction(&self) -> ReductionLevel {
        self.reduction.unwrap_or(ReductionLevel::Full)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_groups_applied_and_basic_forced() {
        let mut f = AnnotationFilter::new(AnnotationKind::User);
        f.ensure_groups();
        assert_eq!(
            f.groups.as_deref().unwrap(),
            &["basic".to_string(), "meta".to_string(), "term".to_string()]
        );

        let mut f = AnnotationFilter::new(AnnotationKind::User);
        f.groups = Some(vec!["gis".into()]);
        f.ensure_groups();
        assert!(f.has_group("basic"));
        assert!(f.has_group("gis"));
        assert!(!f.has_group("meta"));
    }

    #[test]
    fn duplicate_requested_groups_are_collapsed() {
        let mut f = AnnotationFilter::new(AnnotationKind::User);
        f.groups = Some(vec!["meta".into(), "meta".into(), "basic".into()]);
        f.ensure_groups();
        assert_eq!(
            f.groups.as_deref().unwrap(),
            &["meta".to_string(), "basic".to_string()]
        );
    }

    #[test]
    fn force_group_is_idempotent() {
        let mut f = AnnotationFilter::new(AnnotationKind::User);
        f.force_group("term");
        f.force_group("term");
        let groups = f.groups.as_deref().unwrap();
        assert_eq!(groups.iter().filter(|g| *g == "term").count(), 1);
    }

    #[test]
    fn projection_always_contains_basic_fields() {
        let mut f = AnnotationFilter::new(AnnotationKind::User);
        f.groups = Some(vec!["gis".into()]);
        f.ensure_groups();
        let names: Vec<_> = f.selected_columns().into_iter().map(|c| c.name).collect();
        assert!(names.contains(&"id".to_string()));
        assert!(names.contains(&"area".to_string()));
        assert!(!names.contains(&"created".to_string()));
    }

    #[test]
    fn extra_columns_win_on_collision_and_append_otherwise() {
        let mut f = AnnotationFilter::new(AnnotationKind::User);
        f.ensure_groups();
        f.add_extra_column("user", "a.user_id + 0");
        f.add_extra_column("customScore", "a.score");
        let selected = f.selected_columns();
        let user = selected.iter().find(|c| c.name == "user").unwrap();
        assert_eq!(user.source, SelectedSource::Expr("a.user_id + 0".into()));
        assert_eq!(selected.last().unwrap().name, "customScore");
    }

    #[test]
    fn add_extra_column_replaces_existing_extra() {
        let mut f = AnnotationFilter::new(AnnotationKind::User);
        f.add_extra_column("score", "a.score");
        f.add_extra_column("score", "a.score * 2");
        assert_eq!(f.extra_columns.len(), 1);
        assert_eq!(f.extra_columns[0].1, "a.score * 2");
    }

    #[test]
    fn all_field_names_cover_extras() {
        let mut f = AnnotationFilter::new(AnnotationKind::User);
        f.add_extra_column("customScore", "a.score");
        let names = f.all_field_names();
        assert!(names.contains(&"id".to_string()));
        assert!(names.contains(&"customScore".to_string()));
    }

    #[test]
    fn effective_reduction_defaults_to_full() {
        let f = AnnotationFilter::new(AnnotationKind::User);
        assert_eq!(f.effective_reduction(), ReductionLevel::Full);
    }
}
