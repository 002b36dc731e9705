//! Result folder: turns the flat, wrap-multiplied row stream into one
//! nested record per annotation.
//!
//! The wrapped listing query emits one row per annotation/term/track
//! combination, ordered so all rows of an annotation are adjacent. The fold
//! walks the stream once, groups on `id`, merges the association columns
//! into nested lists and attaches the derived fields (units, centroid,
//! URLs) the query could not produce.
//!
//! Column lookups are case-insensitive: unquoted SQL aliases come back
//! lowercased from Postgres, and the canonical camelCase names are restored
//! here.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::CoreError;
use crate::gis;
use crate::listing::columns::INTERNAL_FIELDS;
use crate::listing::filter::AnnotationFilter;
use crate::listing::query::SMALL_CROP_MAX_SIZE;
use crate::types::DbId;
use crate::urls::UrlBuilder;

/// One raw row of the listing query, keyed by result column name.
pub type Row = HashMap<String, Value>;

/// A folded annotation with all requested output fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct AnnotationRecord {
    fields: Map<String, Value>,
}

impl AnnotationRecord {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn into_fields(self) -> Map<String, Value> {
        self.fields
    }
}

fn row_get<'a>(row: &'a Row, name: &str) -> Option<&'a Value> {
    if let Some(value) = row.get(name) {
        return Some(value);
    }
    let lower = name.to_lowercase();
    row.iter()
        .find(|(key, _)| key.to_lowercase() == lower)
        .map(|(_, value)| value)
}

fn as_id(value: Option<&Value>) -> Option<DbId> {
    value.and_then(Value::as_i64)
}

/// Fold the ordered row stream of a full (non-clustered) listing query.
///
/// The output schema is negotiated from the first row: every catalog or
/// extra field actually present in the stream becomes a record field,
/// except the fold helpers which are consumed here. An empty stream folds
/// to an empty list without touching the catalog.
pub fn fold_rows(
    filter: &AnnotationFilter,
    rows: Vec<Row>,
    urls: &dyn UrlBuilder,
) -> Result<Vec<AnnotationRecord>, CoreError> {
    let Some(first) = rows.first() else {
        return Ok(Vec::new());
    };

    let mut column_names: Vec<String> = filter
        .all_field_names()
        .into_iter()
        .filter(|name| !INTERNAL_FIELDS.contains(&name.as_str()))
        .filter(|name| row_get(first, name).is_some())
        .collect();
    let fold_terms = column_names.iter().any(|n| n == "term");
    let fold_tracks = column_names.iter().any(|n| n == "track");
    column_names.retain(|n| n != "term" && n != "track");

    let mut records: Vec<AnnotationRecord> = Vec::new();
    let mut current: Option<(DbId, Map<String, Value>)> = None;

    for row in &rows {
        let id = as_id(row_get(row, "id")).ok_or_else(|| {
            CoreError::Internal("listing row without an id column".to_string())
        })?;

        if current.as_ref().map(|(last, _)| *last) != Some(id) {
            if let Some((_, fields)) = current.take() {
                records.push(AnnotationRecord { fields });
            }
            current = Some((id, open_record(filter, urls, row, &column_names, fold_terms, fold_tracks, id)));
        }

        let (_, fields) = current.as_mut().ok_or_else(|| {
            CoreError::Internal("listing fold lost its open record".to_string())
        })?;
        if fold_terms {
            merge_term(fields, row);
        }
        if fold_tracks {
            merge_track(fields, row);
        }
    }

    if let Some((_, fields)) = current {
        records.push(AnnotationRecord { fields });
    }
    Ok(records)
}

fn open_record(
    filter: &AnnotationFilter,
    urls: &dyn UrlBuilder,
    row: &Row,
    column_names: &[String],
    fold_terms: bool,
    fold_tracks: bool,
    id: DbId,
) -> Map<String, Value> {
    let mut fields = Map::new();
    fields.insert(
        "class".to_string(),
        Value::String(filter.kind.class_tag().to_string()),
    );
    for name in column_names {
        fields.insert(
            name.clone(),
            row_get(row, name).cloned().unwrap_or(Value::Null),
        );
    }
    if fold_terms {
        fields.insert("term".to_string(), Value::Array(Vec::new()));
        fields.insert("userByTerm".to_string(), Value::Array(Vec::new()));
    }
    if fold_tracks {
        fields.insert("track".to_string(), Value::Array(Vec::new()));
        fields.insert("annotationTrack".to_string(), Value::Array(Vec::new()));
    }
    if filter.has_group("gis") {
        enrich_gis(&mut fields, row);
    }
    if filter.has_group("meta") {
        enrich_meta(filter, urls, &mut fields, row, id);
    }
    fields
}

/// Replace stored unit codes with their display names and expose the
/// centroid as a coordinate pair.
fn enrich_gis(fields: &mut Map<String, Value>, row: &Row) {
    for name in ["areaUnit", "perimeterUnit"] {
        if let Some(code) = as_id(fields.get(name)) {
            if let Some(unit) = gis::unit_name(code) {
                fields.insert(name.to_string(), Value::String(unit.to_string()));
            }
        }
    }
    let centroid = gis::Point::new(
        row_get(row, "x").and_then(Value::as_f64),
        row_get(row, "y").and_then(Value::as_f64),
    );
    if let Ok(value) = serde_json::to_value(centroid) {
        fields.insert("centroid".to_string(), value);
    }
}

fn enrich_meta(
    filter: &AnnotationFilter,
    urls: &dyn UrlBuilder,
    fields: &mut Map<String, Value>,
    row: &Row,
    id: DbId,
) {
    let kind = filter.kind;
    fields.insert(
        "cropURL".to_string(),
        Value::String(urls.crop_url(kind, id)),
    );
    fields.insert(
        "smallCropURL".to_string(),
        Value::String(urls.small_crop_url(kind, id, SMALL_CROP_MAX_SIZE)),
    );
    let project = as_id(row_get(row, "project"));
    let image = as_id(row_get(row, "image"));
    let (url, image_url) = match (project, image) {
        (Some(project), Some(image)) => (
            Value::String(urls.annotation_view_url(project, image, id)),
            Value::String(urls.image_view_url(project, image)),
        ),
        _ => (Value::Null, Value::Null),
    };
    fields.insert("url".to_string(), url);
    fields.insert("imageURL".to_string(), image_url);
}

/// Merge one row's term association into the record: the term joins the
/// `term` list once, and the user who applied it joins that term's
/// `userByTerm` entry without duplicates.
fn merge_term(fields: &mut Map<String, Value>, row: &Row) {
    let Some(term) = as_id(row_get(row, "term")) else {
        return;
    };
    let user = row_get(row, "userTerm").cloned().unwrap_or(Value::Null);

    let mut new_term = false;
    if let Some(Value::Array(by_term)) = fields.get_mut("userByTerm") {
        let existing = by_term
            .iter()
            .position(|entry| entry.get("term").and_then(Value::as_i64) == Some(term));
        match existing {
            Some(i) => {
                if let Some(Value::Array(users)) = by_term[i].get_mut("user") {
                    if !user.is_null() && !users.contains(&user) {
                        users.push(user);
                    }
                }
            }
            None => {
                let mut entry = Map::new();
                entry.insert("term".to_string(), Value::Number(term.into()));
                let users = if user.is_null() { Vec::new() } else { vec![user] };
                entry.insert("user".to_string(), Value::Array(users));
                by_term.push(Value::Object(entry));
                new_term = true;
            }
        }
    }
    if new_term {
        if let Some(Value::Array(terms)) = fields.get_mut("term") {
            terms.push(Value::Number(term.into()));
        }
    }
}

fn merge_track(fields: &mut Map<String, Value>, row: &Row) {
    let Some(track) = as_id(row_get(row, "track")) else {
        return;
    };
    let Some(Value::Array(tracks)) = fields.get_mut("track") else {
        return;
    };
    if tracks.iter().any(|t| t.as_i64() == Some(track)) {
        return;
    }
    tracks.push(Value::Number(track.into()));

    let assoc = row_get(row, "annotationTracks").cloned().unwrap_or(Value::Null);
    if let Some(Value::Array(assocs)) = fields.get_mut("annotationTrack") {
        let mut entry = Map::new();
        entry.insert("id".to_string(), assoc);
        entry.insert("track".to_string(), Value::Number(track.into()));
        assocs.push(Value::Object(entry));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AnnotationKind;
    use crate::urls::ServerUrlBuilder;
    use serde_json::json;

    fn urls() -> ServerUrlBuilder {
        ServerUrlBuilder::new("https://img.example.org")
    }

    fn filter() -> AnnotationFilter {
        let mut f = AnnotationFilter::new(AnnotationKind::User);
        f.ensure_groups();
        f
    }

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn term_row(id: i64, term: Value, user: Value) -> Row {
        row(&[
            ("id", json!(id)),
            ("project", json!(1)),
            ("image", json!(2)),
            ("term", term),
            ("userterm", user),
            ("annotationterms", json!(100 + id)),
        ])
    }

    // ---- Grouping and term merging ----

    #[test]
    fn adjacent_rows_fold_into_one_record_per_annotation() {
        let rows = vec![
            term_row(1, json!(5), json!(10)),
            term_row(1, json!(6), json!(11)),
            term_row(1, json!(6), json!(12)),
            term_row(2, Value::Null, Value::Null),
        ];
        let records = fold_rows(&filter(), rows, &urls()).unwrap();
        assert_eq!(records.len(), 2);

        let first = &records[0];
        assert_eq!(first.get("id"), Some(&json!(1)));
        assert_eq!(first.get("term"), Some(&json!([5, 6])));
        assert_eq!(
            first.get("userByTerm"),
            Some(&json!([
                { "term": 5, "user": [10] },
                { "term": 6, "user": [11, 12] },
            ]))
        );

        let second = &records[1];
        assert_eq!(second.get("id"), Some(&json!(2)));
        assert_eq!(second.get("term"), Some(&json!([])));
        assert_eq!(second.get("userByTerm"), Some(&json!([])));
    }

    #[test]
    fn repeated_term_user_pairs_are_deduplicated() {
        let rows = vec![
            term_row(1, json!(5), json!(10)),
            term_row(1, json!(5), json!(10)),
        ];
        let records = fold_rows(&filter(), rows, &urls()).unwrap();
        assert_eq!(records[0].get("term"), Some(&json!([5])));
        assert_eq!(
            records[0].get("userByTerm"),
            Some(&json!([{ "term": 5, "user": [10] }]))
        );
    }

    #[test]
    fn empty_stream_folds_to_no_records() {
        let records = fold_rows(&filter(), Vec::new(), &urls()).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn row_without_id_is_an_internal_error() {
        let rows = vec![row(&[("term", json!(5))])];
        let err = fold_rows(&filter(), rows, &urls()).unwrap_err();
        assert!(matches!(err, CoreError::Internal(_)));
    }

    // ---- Schema negotiation ----

    #[test]
    fn lowercased_aliases_surface_under_canonical_names() {
        let rows = vec![row(&[
            ("id", json!(1)),
            ("project", json!(1)),
            ("image", json!(2)),
            ("countreviewedannotations", json!(3)),
        ])];
        let records = fold_rows(&filter(), rows, &urls()).unwrap();
        assert_eq!(
            records[0].get("countReviewedAnnotations"),
            Some(&json!(3))
        );
        assert!(records[0].get("countreviewedannotations").is_none());
    }

    #[test]
    fn fold_helpers_never_surface_as_fields() {
        let rows = vec![term_row(1, json!(5), json!(10))];
        let records = fold_rows(&filter(), rows, &urls()).unwrap();
        for name in ["annotationTerms", "userTerm", "x", "y"] {
            assert!(records[0].get(name).is_none(), "{name} leaked");
        }
        assert_eq!(records[0].get("class"), Some(&json!("user_annotation")));
    }

    #[test]
    fn absent_columns_are_dropped_from_the_schema() {
        // No wkt group requested, so `location` never shows up.
        let rows = vec![row(&[("id", json!(1)), ("project", json!(1)), ("image", json!(2))])];
        let records = fold_rows(&filter(), rows, &urls()).unwrap();
        assert!(records[0].get("location").is_none());
    }

    // ---- Derived enrichment ----

    #[test]
    fn gis_group_translates_units_and_builds_centroid() {
        let mut f = AnnotationFilter::new(AnnotationKind::User);
        f.groups = Some(vec!["gis".into()]);
        f.ensure_groups();
        let rows = vec![row(&[
            ("id", json!(1)),
            ("area", json!(12.5)),
            ("areaunit", json!(3)),
            ("perimeter", json!(40.0)),
            ("perimeterunit", json!(0)),
            ("x", json!(4.5)),
            ("y", json!(9.25)),
        ])];
        let records = fold_rows(&f, rows, &urls()).unwrap();
        let record = &records[0];
        assert_eq!(record.get("areaUnit"), Some(&json!("px²")));
        assert_eq!(record.get("perimeterUnit"), Some(&json!("px")));
        assert_eq!(record.get("centroid"), Some(&json!({ "x": 4.5, "y": 9.25 })));
        assert!(record.get("x").is_none());
    }

    #[test]
    fn meta_group_attaches_urls() {
        let rows = vec![row(&[
            ("id", json!(7)),
            ("project", json!(1)),
            ("image", json!(2)),
        ])];
        let records = fold_rows(&filter(), rows, &urls()).unwrap();
        let record = &records[0];
        assert_eq!(
            record.get("cropURL"),
            Some(&json!("https://img.example.org/api/userannotation/7/crop.png"))
        );
        assert_eq!(
            record.get("smallCropURL"),
            Some(&json!(
                "https://img.example.org/api/userannotation/7/crop.png?maxSize=256"
            ))
        );
        assert_eq!(
            record.get("url"),
            Some(&json!(
                "https://img.example.org/#/project/1/image/2/annotation/7"
            ))
        );
        assert_eq!(
            record.get("imageURL"),
            Some(&json!("https://img.example.org/#/project/1/image/2"))
        );
    }

    #[test]
    fn meta_urls_degrade_without_container_columns() {
        let mut f = AnnotationFilter::new(AnnotationKind::User);
        f.groups = Some(vec!["meta".into()]);
        f.ensure_groups();
        let rows = vec![row(&[("id", json!(7))])];
        let records = fold_rows(&f, rows, &urls()).unwrap();
        assert_eq!(records[0].get("url"), Some(&Value::Null));
        assert_eq!(records[0].get("imageURL"), Some(&Value::Null));
    }

    // ---- Track merging ----

    #[test]
    fn track_rows_fold_into_track_lists() {
        let mut f = AnnotationFilter::new(AnnotationKind::User);
        f.track = Some(42);
        f.ensure_groups();
        f.force_group("track");
        let rows = vec![
            row(&[
                ("id", json!(1)),
                ("project", json!(1)),
                ("image", json!(2)),
                ("term", Value::Null),
                ("track", json!(42)),
                ("annotationtracks", json!(900)),
            ]),
            row(&[
                ("id", json!(1)),
                ("project", json!(1)),
                ("image", json!(2)),
                ("term", Value::Null),
                ("track", json!(43)),
                ("annotationtracks", json!(901)),
            ]),
        ];
        let records = fold_rows(&f, rows, &urls()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get("track"), Some(&json!([42, 43])));
        assert_eq!(
            records[0].get("annotationTrack"),
            Some(&json!([
                { "id": 900, "track": 42 },
                { "id": 901, "track": 43 },
            ]))
        );
        assert!(records[0].get("annotationTracks").is_none());
    }
}
