//! URL building for the `meta` output group.
//!
//! The listing engine never serves pixels itself; it attaches links to the
//! imaging endpoints. The builder is a trait so embedders can point records
//! at a different host or URL scheme.

use crate::types::{AnnotationKind, DbId};

/// Builds crop/thumbnail/view URLs for folded annotation records.
pub trait UrlBuilder: Send + Sync {
    /// Full-size crop of the annotation geometry.
    fn crop_url(&self, kind: AnnotationKind, annotation: DbId) -> String;

    /// Crop bounded to `max_size` pixels on its longest side.
    fn small_crop_url(&self, kind: AnnotationKind, annotation: DbId, max_size: u32) -> String;

    /// Viewer deep-link to the annotation inside its image.
    fn annotation_view_url(&self, project: DbId, image: DbId, annotation: DbId) -> String;

    /// Viewer deep-link to the image itself.
    fn image_view_url(&self, project: DbId, image: DbId) -> String;
}

/// Default [`UrlBuilder`] serving from a single base URL.
#[derive(Debug, Clone)]
pub struct ServerUrlBuilder {
    pub base_url: String,
}

impl ServerUrlBuilder {
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self { base_url }
    }

    fn kind_path(kind: AnnotationKind) -> &'static str {
        match kind {
            AnnotationKind::User => "userannotation",
            AnnotationKind::Algo => "algoannotation",
            AnnotationKind::Reviewed => "reviewedannotation",
        }
    }
}

impl UrlBuilder for ServerUrlBuilder {
    fn crop_url(&self, kind: AnnotationKind, annotation: DbId) -> String {
        format!(
            "{}/api/{}/{}/crop.png",
            self.base_url,
            Self::kind_path(kind),
            annotation
        )
    }

    fn small_crop_url(&self, kind: AnnotationKind, annotation: DbId, max_size: u32) -> String {
        format!(
            "{}/api/{}/{}/crop.png?maxSize={}",
            self.base_url,
            Self::kind_path(kind),
            annotation,
            max_size
        )
    }

    fn annotation_view_url(&self, project: DbId, image: DbId, annotation: DbId) -> String {
        format!(
            "{}/#/project/{}/image/{}/annotation/{}",
            self.base_url, project, image, annotation
        )
    }

    fn image_view_url(&self, project: DbId, image: DbId) -> String {
        format!("{}/#/project/{}/image/{}", self.base_url, project, image)
    }
}
