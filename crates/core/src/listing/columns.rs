//! Column catalog: per annotation kind, the ordered mapping from output
//! group name to the fields that group contributes to a listing projection.
//!
//! A `Native` column is projected directly from SQL; a `Derived` column is
//! computed after row retrieval by the result folder (URLs, centroid).
//! Groups are looked up by name only, so the rest of the listing pipeline
//! is polymorphic over the kind.

use crate::types::AnnotationKind;

/// Where an output field's value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnSource {
    /// Projectable SQL expression.
    Native(&'static str),
    /// Computed by the folder after retrieval.
    Derived,
}

/// One output field of a column group.
#[derive(Debug, Clone, Copy)]
pub struct ColumnDef {
    pub name: &'static str,
    pub source: ColumnSource,
}

/// A named group of output fields.
#[derive(Debug, Clone, Copy)]
pub struct ColumnGroup {
    pub name: &'static str,
    pub columns: &'static [ColumnDef],
}

/// Groups included when a request names none.
pub const DEFAULT_GROUPS: &[&str] = &["basic", "meta", "term"];

/// Helper fields that exist in the row stream but are folded away and never
/// surface as plain record fields.
pub const INTERNAL_FIELDS: &[&str] = &["annotationTerms", "annotationTracks", "userTerm", "x", "y"];

const fn col(name: &'static str, expr: &'static str) -> ColumnDef {
    ColumnDef {
        name,
        source: ColumnSource::Native(expr),
    }
}

const fn derived(name: &'static str) -> ColumnDef {
    ColumnDef {
        name,
        source: ColumnSource::Derived,
    }
}

const WKT: &[ColumnDef] = &[
    col("location", "a.wkt_location"),
    col("geometryCompression", "a.geometry_compression"),
];

const GIS: &[ColumnDef] = &[
    col("area", "a.area"),
    col("areaUnit", "a.area_unit"),
    col("perimeter", "a.perimeter"),
    col("perimeterUnit", "a.perimeter_unit"),
    col("x", "ST_X(ST_Centroid(a.location))"),
    col("y", "ST_Y(ST_Centroid(a.location))"),
    derived("centroid"),
];

const IMAGE: &[ColumnDef] = &[
    col("originalFilename", "ai.original_filename"),
    col(
        "instanceFilename",
        "COALESCE(ii.instance_filename, ai.original_filename)",
    ),
];

const SLICE: &[ColumnDef] = &[
    col("channel", "asl.channel"),
    col("zStack", "asl.z_stack"),
    col("time", "asl.time"),
];

const TRACK: &[ColumnDef] = &[
    col("track", "atr.track_id"),
    col("annotationTracks", "atr.id"),
];

const ALGO: &[ColumnDef] = &[
    col("suggestedTerm", "aat.term_id"),
    col("algoAnnotationTerm", "aat.id"),
    col("userJob", "aat.user_job_id"),
    col("rate", "aat.rate"),
];

const USER_BASIC: &[ColumnDef] = &[col("id", "a.id")];

const USER_META: &[ColumnDef] = &[
    col("created", "a.created"),
    col("updated", "a.updated"),
    col("image", "a.image_id"),
    col("slice", "a.slice_id"),
    col("project", "a.project_id"),
    col("user", "a.user_id"),
    col("nbComments", "a.count_comments"),
    col("reviewed", "(a.count_reviewed_annotations > 0)"),
    col("countReviewedAnnotations", "a.count_reviewed_annotations"),
    derived("cropURL"),
    derived("smallCropURL"),
    derived("url"),
    derived("imageURL"),
];

const USER_TERM: &[ColumnDef] = &[
    col("term", "at.term_id"),
    col("annotationTerms", "at.id"),
    col("userTerm", "at.user_id"),
];

const ALGO_META: &[ColumnDef] = &[
    col("created", "a.created"),
    col("updated", "a.updated"),
    col("image", "a.image_id"),
    col("slice", "a.slice_id"),
    col("project", "a.project_id"),
    col("user", "a.user_id"),
    col("rate", "a.rate"),
    col("countReviewedAnnotations", "a.count_reviewed_annotations"),
    derived("cropURL"),
    derived("smallCropURL"),
    derived("url"),
    derived("imageURL"),
];

const ALGO_TERM: &[ColumnDef] = &[
    col("term", "aat.term_id"),
    col("annotationTerms", "aat.id"),
    col("userTerm", "aat.user_job_id"),
];

const REVIEWED_BASIC: &[ColumnDef] = &[col("id", "a.id"), col("reviewUser", "a.review_user_id")];

const REVIEWED_META: &[ColumnDef] = &[
    col("created", "a.created"),
    col("updated", "a.updated"),
    col("image", "a.image_id"),
    col("slice", "a.slice_id"),
    col("project", "a.project_id"),
    col("user", "a.user_id"),
    col("parentIdent", "a.parent_ident"),
    derived("cropURL"),
    derived("smallCropURL"),
    derived("url"),
    derived("imageURL"),
];

const REVIEWED_TERM: &[ColumnDef] = &[
    col("term", "at.term_id"),
    col("annotationTerms", "0"),
    col("userTerm", "a.review_user_id"),
];

const USER_CATALOG: &[ColumnGroup] = &[
    ColumnGroup { name: "basic", columns: USER_BASIC },
    ColumnGroup { name: "meta", columns: USER_META },
    ColumnGroup { name: "wkt", columns: WKT },
    ColumnGroup { name: "gis", columns: GIS },
    ColumnGroup { name: "term", columns: USER_TERM },
    ColumnGroup { name: "track", columns: TRACK },
    ColumnGroup { name: "image", columns: IMAGE },
    ColumnGroup { name: "slice", columns: SLICE },
    ColumnGroup { name: "algo", columns: ALGO },
];

const ALGO_CATALOG: &[ColumnGroup] = &[
    ColumnGroup { name: "basic", columns: USER_BASIC },
    ColumnGroup { name: "meta", columns: ALGO_META },
    ColumnGroup { name: "wkt", columns: WKT },
    ColumnGroup { name: "gis", columns: GIS },
    ColumnGroup { name: "term", columns: ALGO_TERM },
    ColumnGroup { name: "track", columns: TRACK },
    ColumnGroup { name: "image", columns: IMAGE },
    ColumnGroup { name: "slice", columns: SLICE },
];

const REVIEWED_CATALOG: &[ColumnGroup] = &[
    ColumnGroup { name: "basic", columns: REVIEWED_BASIC },
    ColumnGroup { name: "meta", columns: REVIEWED_META },
    ColumnGroup { name: "wkt", columns: WKT },
    ColumnGroup { name: "gis", columns: GIS },
    ColumnGroup { name: "term", columns: REVIEWED_TERM },
    ColumnGroup { name: "image", columns: IMAGE },
    ColumnGroup { name: "slice", columns: SLICE },
];

/// Ordered column catalog for a listing kind.
pub fn catalog(kind: AnnotationKind) -> &'static [ColumnGroup] {
    match kind {
        AnnotationKind::User => USER_CATALOG,
        AnnotationKind::Algo => ALGO_CATALOG,
        AnnotationKind::Reviewed => REVIEWED_CATALOG,
    }
}

/// Look up one group of a kind's catalog by name.
pub fn group(kind: AnnotationKind, name: &str) -> Option<&'static ColumnGroup> {
    catalog(kind).iter().find(|g| g.name == name)
}

/// Every output field name a kind can produce, in catalog order.
pub fn all_field_names(kind: AnnotationKind) -> Vec<&'static str> {
    catalog(kind)
        .iter()
        .flat_map(|g| g.columns.iter().map(|c| c.name))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_has_basic_with_id() {
        for kind in [
            AnnotationKind::User,
            AnnotationKind::Algo,
            AnnotationKind::Reviewed,
        ] {
            let basic = group(kind, "basic").unwrap();
            assert!(basic.columns.iter().any(|c| c.name == "id"));
        }
    }

    #[test]
    fn reviewed_catalog_has_no_track_or_algo_group() {
        assert!(group(AnnotationKind::Reviewed, "track").is_none());
        assert!(group(AnnotationKind::Reviewed, "algo").is_none());
        assert!(group(AnnotationKind::User, "track").is_some());
        assert!(group(AnnotationKind::Algo, "track").is_some());
    }

    #[test]
    fn term_group_uses_kind_association() {
        let user = group(AnnotationKind::User, "term").unwrap();
        assert!(matches!(
            user.columns[0].source,
            ColumnSource::Native("at.term_id")
        ));
        let algo = group(AnnotationKind::Algo, "term").unwrap();
        assert!(matches!(
            algo.columns[0].source,
            ColumnSource::Native("aat.term_id")
        ));
    }

    #[test]
    fn url_fields_are_derived() {
        let meta = group(AnnotationKind::User, "meta").unwrap();
        for name in ["cropURL", "smallCropURL", "url", "imageURL"] {
            let c = meta.columns.iter().find(|c| c.name == name).unwrap();
            assert!(matches!(c.source, ColumnSource::Derived));
        }
    }

    #[test]
    fn all_field_names_include_gis_helpers() {
        let names = all_field_names(AnnotationKind::User);
        assert!(names.contains(&"x"));
        assert!(names.contains(&"y"));
        assert!(names.contains(&"term"));
    }
}
