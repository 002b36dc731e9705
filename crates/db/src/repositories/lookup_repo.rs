//! Small existence and resolution probes run before a listing query is
//! built: container projects, image counts, slice ranks and annotation
//! geometries.

use slidepath_core::types::{AnnotationKind, DbId};
use sqlx::PgPool;

/// Provides the per-request lookups the query builder cannot do itself.
pub struct LookupRepo;

impl LookupRepo {
    async fn exists_in(pool: &PgPool, table: &'static str, id: DbId) -> Result<bool, sqlx::Error> {
        let sql = format!("SELECT EXISTS(SELECT 1 FROM {table} WHERE id = $1)");
        sqlx::query_scalar(&sql).bind(id).fetch_one(pool).await
    }

    pub async fn project_exists(pool: &PgPool, project: DbId) -> Result<bool, sqlx::Error> {
        Self::exists_in(pool, "project", project).await
    }

    pub async fn image_exists(pool: &PgPool, image: DbId) -> Result<bool, sqlx::Error> {
        Self::exists_in(pool, "image_instance", image).await
    }

    pub async fn slice_exists(pool: &PgPool, slice: DbId) -> Result<bool, sqlx::Error> {
        Self::exists_in(pool, "abstract_slice", slice).await
    }

    pub async fn user_exists(pool: &PgPool, user: DbId) -> Result<bool, sqlx::Error> {
        Self::exists_in(pool, "app_user", user).await
    }

    pub async fn term_exists(pool: &PgPool, term: DbId) -> Result<bool, sqlx::Error> {
        Self::exists_in(pool, "term", term).await
    }

    pub async fn track_exists(pool: &PgPool, track: DbId) -> Result<bool, sqlx::Error> {
        Self::exists_in(pool, "track", track).await
    }

    /// Number of images inside a project.
    pub async fn project_image_count(pool: &PgPool, project: DbId) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM image_instance WHERE project_id = $1")
            .bind(project)
            .fetch_one(pool)
            .await
    }

    /// Project an image belongs to, if the image exists.
    pub async fn project_of_image(
        pool: &PgPool,
        image: DbId,
    ) -> Result<Option<DbId>, sqlx::Error> {
        sqlx::query_scalar("SELECT project_id FROM image_instance WHERE id = $1")
            .bind(image)
            .fetch_optional(pool)
            .await
    }

    /// Distinct projects a set of images belongs to. Unknown ids simply
    /// contribute nothing.
    pub async fn projects_of_images(
        pool: &PgPool,
        images: &[DbId],
    ) -> Result<Vec<DbId>, sqlx::Error> {
        sqlx::query_scalar("SELECT DISTINCT project_id FROM image_instance WHERE id = ANY($1)")
            .bind(images.to_vec())
            .fetch_all(pool)
            .await
    }

    /// Project a slice belongs to, through its image.
    pub async fn project_of_slice(
        pool: &PgPool,
        slice: DbId,
    ) -> Result<Option<DbId>, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT ii.project_id FROM abstract_slice asl \
             JOIN image_instance ii ON ii.base_image_id = asl.image_id \
             WHERE asl.id = $1",
        )
        .bind(slice)
        .fetch_optional(pool)
        .await
    }

    /// Distinct projects a set of slices belongs to.
    pub async fn projects_of_slices(
        pool: &PgPool,
        slices: &[DbId],
    ) -> Result<Vec<DbId>, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT DISTINCT ii.project_id FROM abstract_slice asl \
             JOIN image_instance ii ON ii.base_image_id = asl.image_id \
             WHERE asl.id = ANY($1)",
        )
        .bind(slices.to_vec())
        .fetch_all(pool)
        .await
    }

    /// WKT geometry of an annotation, from the kind's base table.
    pub async fn annotation_location(
        pool: &PgPool,
        kind: AnnotationKind,
        annotation: DbId,
    ) -> Result<Option<String>, sqlx::Error> {
        let sql = format!(
            "SELECT ST_AsText(location) FROM {} WHERE id = $1",
            kind.base_table()
        );
        sqlx::query_scalar(&sql)
            .bind(annotation)
            .fetch_optional(pool)
            .await
    }

    /// Channel/z/time rank of a slice inside its image, matching the rank
    /// expression the listing query orders tracks by.
    pub async fn slice_rank(pool: &PgPool, slice: DbId) -> Result<Option<i64>, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT (asl.channel + ai.channels * (asl.z_stack + ai.depth * asl.time)) \
             FROM abstract_slice asl \
             JOIN abstract_image ai ON asl.image_id = ai.id \
             WHERE asl.id = $1",
        )
        .bind(slice)
        .fetch_optional(pool)
        .await
    }
}
