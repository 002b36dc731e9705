//! Executes reduced listings: wraps the built base query in a
//! `ST_ClusterKMeans` aggregation and returns cluster summaries instead of
//! annotation records.

use slidepath_core::listing::{BuiltQuery, SqlParam};
use slidepath_core::listing::query::KMEANS_CLUSTER_COUNT;
use sqlx::PgPool;

use crate::models::ClusteredRow;

/// Runs the clustered execution modes of a listing query.
pub struct KmeansRepo;

impl KmeansRepo {
    /// Full reduction: the base query already projects cluster ordinals,
    /// only the aggregation remains.
    pub async fn cluster_full(
        pool: &PgPool,
        built: &BuiltQuery,
    ) -> Result<Vec<ClusteredRow>, sqlx::Error> {
        Self::fetch(pool, &full_wrap(&built.sql), built).await
    }

    /// Soft reduction: the base query still projects full rows with a raw
    /// `location` column; clustering happens around it.
    pub async fn cluster_soft(
        pool: &PgPool,
        built: &BuiltQuery,
    ) -> Result<Vec<ClusteredRow>, sqlx::Error> {
        Self::fetch(pool, &soft_wrap(&built.sql), built).await
    }

    async fn fetch(
        pool: &PgPool,
        sql: &str,
        built: &BuiltQuery,
    ) -> Result<Vec<ClusteredRow>, sqlx::Error> {
        let mut query = sqlx::query_as::<_, ClusteredRow>(sql);
        for param in built.params.values() {
            query = match param {
                SqlParam::BigInt(v) => query.bind(*v),
                SqlParam::BigIntList(v) => query.bind(v.clone()),
                SqlParam::Float(v) => query.bind(*v),
                SqlParam::Text(v) => query.bind(v.clone()),
                SqlParam::Timestamp(v) => query.bind(*v),
            };
        }
        query.fetch_all(pool).await
    }
}

/// Aggregate an already-clustered row stream into per-cluster summaries.
fn full_wrap(sql: &str) -> String {
    format!(
        "SELECT kmeans, COUNT(*) AS count, \
         ST_AsText(ST_Centroid(ST_Collect(location))) AS location \
         FROM ({sql}) kmeans_query GROUP BY kmeans"
    )
}

/// Cluster a full row stream on its `location` column, then aggregate.
fn soft_wrap(sql: &str) -> String {
    format!(
        "SELECT kmeans, COUNT(*) AS count, \
         ST_AsText(ST_Centroid(ST_Collect(location))) AS location \
         FROM (SELECT ST_ClusterKMeans(location, {KMEANS_CLUSTER_COUNT}) OVER () AS kmeans, \
         location FROM ({sql}) base) kmeans_query GROUP BY kmeans"
    )
}
