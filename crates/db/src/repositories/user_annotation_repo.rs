//! Counting and lightweight listing for user annotations, outside the full
//! listing pipeline.

use slidepath_core::listing::query::SMALL_CROP_MAX_SIZE;
use slidepath_core::types::{AnnotationKind, DbId, Timestamp};
use slidepath_core::urls::UrlBuilder;
use sqlx::PgPool;

use crate::models::AnnotationLight;

/// Provides aggregate and minimal-projection queries over `user_annotation`.
pub struct UserAnnotationRepo;

impl UserAnnotationRepo {
    /// Number of live user annotations in a project.
    pub async fn count_by_project(pool: &PgPool, project: DbId) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM user_annotation \
             WHERE project_id = $1 AND deleted IS NULL",
        )
        .bind(project)
        .fetch_one(pool)
        .await
    }

    /// Number of live user annotations in a project created before `before`.
    pub async fn count_by_project_created_before(
        pool: &PgPool,
        project: DbId,
        before: Timestamp,
    ) -> Result<i64, sqlx::Error> {
        Self::count_by_project_created_between(pool, project, None, Some(before)).await
    }

    /// Number of live user annotations in a project created after `after`.
    pub async fn count_by_project_created_after(
        pool: &PgPool,
        project: DbId,
        after: Timestamp,
    ) -> Result<i64, sqlx::Error> {
        Self::count_by_project_created_between(pool, project, Some(after), None).await
    }

    /// Number of live user annotations in a project created inside the
    /// optional `(after, before)` window; an absent bound is open.
    pub async fn count_by_project_created_between(
        pool: &PgPool,
        project: DbId,
        after: Option<Timestamp>,
        before: Option<Timestamp>,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM user_annotation \
             WHERE project_id = $1 AND deleted IS NULL \
             AND ($2::timestamptz IS NULL OR created > $2) \
             AND ($3::timestamptz IS NULL OR created < $3)",
        )
        .bind(project)
        .bind(after)
        .bind(before)
        .fetch_one(pool)
        .await
    }

    /// Live non-point annotations below an area ceiling, largest first,
    /// reduced to identity, container project and a thumbnail link.
    pub async fn list_light(
        pool: &PgPool,
        max_area: f64,
        urls: &dyn UrlBuilder,
    ) -> Result<Vec<AnnotationLight>, sqlx::Error> {
        let rows: Vec<(DbId, DbId)> = sqlx::query_as(
            "SELECT id, project_id FROM user_annotation \
             WHERE deleted IS NULL \
             AND ST_GeometryType(location) <> 'ST_Point' \
             AND area < $1 \
             ORDER BY area DESC",
        )
        .bind(max_area)
        .fetch_all(pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(id, container)| light_record(id, container, urls))
            .collect())
    }
}

fn light_record(id: DbId, container: DbId, urls: &dyn UrlBuilder) -> AnnotationLight {
    AnnotationLight {
        id,
        container,
        url: urls.small_crop_url(AnnotationKind::User, id, SMALL_CROP_MAX_SIZE),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slidepath_core::urls::ServerUrlBuilder;

    #[test]
    fn light_records_carry_the_bounded_crop_link() {
        let urls = ServerUrlBuilder::new("https://img.example.org");
        let light = light_record(7, 3, &urls);
        assert_eq!(light.id, 7);
        assert_eq!(light.container, 3);
        assert_eq!(
            light.url,
            "https://img.example.org/api/userannotation/7/crop.png?maxSize=256"
        );
    }
}
