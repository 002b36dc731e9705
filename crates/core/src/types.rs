use serde::Serialize;

/// All database primary keys are PostgreSQL BIGSERIAL.
pub type DbId = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Annotation provenance variant.
///
/// The three kinds share nearly all listing logic but differ in base table,
/// term-association join and track support. Everything kind-specific the
/// query builder and folder need is exposed here, so no other module has to
/// match on the variant for table names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationKind {
    /// Drawn by a human user.
    User,
    /// Produced by an algorithm (user job).
    Algo,
    /// A user annotation validated by a reviewer.
    Reviewed,
}

impl AnnotationKind {
    /// Class tag written into every folded record.
    pub fn class_tag(&self) -> &'static str {
        match self {
            Self::User => "user_annotation",
            Self::Algo => "algo_annotation",
            Self::Reviewed => "reviewed_annotation",
        }
    }

    /// Base annotation table, aliased `a` in every listing query.
    pub fn base_table(&self) -> &'static str {
        self.class_tag()
    }

    /// Term association table for this kind.
    pub fn term_table(&self) -> &'static str {
        match self {
            Self::User => "annotation_term",
            Self::Algo => "algo_annotation_term",
            Self::Reviewed => "reviewed_annotation_term",
        }
    }

    /// Alias used for the term association join.
    pub fn term_alias(&self) -> &'static str {
        match self {
            Self::Algo => "aat",
            _ => "at",
        }
    }

    /// Foreign key column linking the term association to the annotation.
    pub fn term_fk(&self) -> &'static str {
        match self {
            Self::User => "user_annotation_id",
            Self::Algo => "annotation_ident",
            Self::Reviewed => "reviewed_annotation_terms_id",
        }
    }

    /// Expression for the user who applied a term, valid inside the base
    /// query (where the term association join and `a` are in scope).
    pub fn term_user_column(&self) -> &'static str {
        match self {
            Self::User => "at.user_id",
            Self::Algo => "aat.user_job_id",
            Self::Reviewed => "a.review_user_id",
        }
    }

    /// Expression for the term association id.
    pub fn term_assoc_id_column(&self) -> &'static str {
        match self {
            Self::User => "at.id",
            Self::Algo => "aat.id",
            // Reviewed term rows carry no own identity.
            Self::Reviewed => "0",
        }
    }

    /// Whether the term association table has a soft-delete column.
    pub fn term_soft_delete(&self) -> bool {
        !matches!(self, Self::Reviewed)
    }

    /// Whether this kind can belong to tracks.
    pub fn supports_track(&self) -> bool {
        !matches!(self, Self::Reviewed)
    }
}

/// How much geometry reduction the listing query must apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReductionLevel {
    /// No reduction: raw rows, folded into nested records.
    Full,
    /// Cluster at read time without rewriting the base query.
    KmeansSoft,
    /// Rewrite the base query to emit cluster rows instead of geometries.
    KmeansFull,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reviewed_kind_has_no_track_support() {
        assert!(AnnotationKind::User.supports_track());
        assert!(AnnotationKind::Algo.supports_track());
        assert!(!AnnotationKind::Reviewed.supports_track());
    }

    #[test]
    fn reviewed_kind_has_no_term_soft_delete() {
        assert!(AnnotationKind::User.term_soft_delete());
        assert!(AnnotationKind::Algo.term_soft_delete());
        assert!(!AnnotationKind::Reviewed.term_soft_delete());
    }

    #[test]
    fn term_join_differs_per_kind() {
        assert_eq!(AnnotationKind::User.term_table(), "annotation_term");
        assert_eq!(AnnotationKind::Algo.term_table(), "algo_annotation_term");
        assert_eq!(
            AnnotationKind::Reviewed.term_table(),
            "reviewed_annotation_term"
        );
        assert_eq!(AnnotationKind::Algo.term_alias(), "aat");
        assert_eq!(AnnotationKind::User.term_alias(), "at");
    }
}
