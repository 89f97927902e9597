//! Segment repository

use lettermill_common::types::{SegmentFilter, SegmentId, SubscriberId};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{CreateSegment, Segment, UpdateSegment};

/// Segment repository
#[derive(Clone)]
pub struct SegmentRepository {
    pool: PgPool,
}

impl SegmentRepository {
    /// Create a new segment repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a new segment
    pub async fn create(&self, input: CreateSegment) -> Result<Segment, sqlx::Error> {
        let id = Uuid::new_v4();
        let filter = serde_json::to_value(&input.filter).unwrap_or_default();

        sqlx::query_as::<_, Segment>(
            r#"
            INSERT INTO segments (id, name, description, filter)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&input.name)
        .bind(&input.description)
        .bind(&filter)
        .fetch_one(&self.pool)
        .await
    }

    /// Get a segment by ID
    pub async fn get(&self, id: SegmentId) -> Result<Option<Segment>, sqlx::Error> {
        sqlx::query_as::<_, Segment>("SELECT * FROM segments WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    /// List all segments
    pub async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Segment>, sqlx::Error> {
        sqlx::query_as::<_, Segment>(
            "SELECT * FROM segments ORDER BY created_at DESC LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
    }

    /// Update a segment
    pub async fn update(
        &self,
        id: SegmentId,
        input: UpdateSegment,
    ) -> Result<Option<Segment>, sqlx::Error> {
        let filter = input
            .filter
            .map(|f| serde_json::to_value(f).unwrap_or_default());

        sqlx::query_as::<_, Segment>(
            r#"
            UPDATE segments SET
                name = COALESCE($2, name),
                description = COALESCE($3, description),
                filter = COALESCE($4, filter),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&input.name)
        .bind(&input.description)
        .bind(&filter)
        .fetch_optional(&self.pool)
        .await
    }

    /// Delete a segment
    pub async fn delete(&self, id: SegmentId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM segments WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Evaluate a segment's filter predicate against current subscriber
    /// data, returning matching subscriber ids.
    ///
    /// Dynamic by design: membership is computed at call time, never
    /// cached, so resolver runs always see the current population.
    pub async fn evaluate(&self, filter: &SegmentFilter) -> Result<Vec<SubscriberId>, sqlx::Error> {
        let any_tags = serde_json::to_value(&filter.any_tags).unwrap_or_default();
        let all_tags = serde_json::to_value(&filter.all_tags).unwrap_or_default();

        let rows: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT id FROM subscribers
            WHERE deleted_at IS NULL
              AND status = 'active'
              AND ($1::jsonb = '[]'::jsonb OR tags ?| ARRAY(SELECT jsonb_array_elements_text($1)))
              AND ($2::jsonb = '[]'::jsonb OR tags @> $2)
              AND ($3::int IS NULL OR engagement_score >= $3)
              AND (NOT $4 OR verified)
            "#,
        )
        .bind(&any_tags)
        .bind(&all_tags)
        .bind(filter.min_engagement)
        .bind(filter.verified_only)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}
