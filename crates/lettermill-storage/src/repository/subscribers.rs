//! Subscriber repository

use chrono::{DateTime, Utc};
use lettermill_common::types::SubscriberId;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{CreateSubscriber, Subscriber, SubscriberStatus, UpdateSubscriber};

/// Subscriber repository
#[derive(Clone)]
pub struct SubscriberRepository {
    pool: PgPool,
}

impl SubscriberRepository {
    /// Create a new subscriber repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a new subscriber
    pub async fn create(&self, input: CreateSubscriber) -> Result<Subscriber, sqlx::Error> {
        let id = Uuid::new_v4();
        let tags = serde_json::to_value(input.tags.unwrap_or_default()).unwrap_or_default();
        let attributes = input.attributes.unwrap_or_else(|| serde_json::json!({}));

        sqlx::query_as::<_, Subscriber>(
            r#"
            INSERT INTO subscribers (
                id, email, name, verified, consent_given_at, consent_source_ip,
                tags, attributes
            )
            VALUES ($1, $2, $3, $4, NOW(), $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&input.email)
        .bind(&input.name)
        .bind(input.verified.unwrap_or(false))
        .bind(&input.consent_source_ip)
        .bind(&tags)
        .bind(&attributes)
        .fetch_one(&self.pool)
        .await
    }

    /// Get a subscriber by ID
    pub async fn get(&self, id: SubscriberId) -> Result<Option<Subscriber>, sqlx::Error> {
        sqlx::query_as::<_, Subscriber>("SELECT * FROM subscribers WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Get a subscriber by email
    pub async fn get_by_email(&self, email: &str) -> Result<Option<Subscriber>, sqlx::Error> {
        sqlx::query_as::<_, Subscriber>("SELECT * FROM subscribers WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
    }

    /// List subscribers, most recent first
    pub async fn list(
        &self,
        status: Option<SubscriberStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Subscriber>, sqlx::Error> {
        if let Some(status) = status {
            sqlx::query_as::<_, Subscriber>(
                r#"
                SELECT * FROM subscribers
                WHERE status = $1 AND deleted_at IS NULL
                ORDER BY created_at DESC
                LIMIT $2 OFFSET $3
                "#,
            )
            .bind(status.to_string())
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
        } else {
            sqlx::query_as::<_, Subscriber>(
                r#"
                SELECT * FROM subscribers
                WHERE deleted_at IS NULL
                ORDER BY created_at DESC
                LIMIT $1 OFFSET $2
                "#,
            )
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
        }
    }

    /// Update a subscriber
    pub async fn update(
        &self,
        id: SubscriberId,
        input: UpdateSubscriber,
    ) -> Result<Option<Subscriber>, sqlx::Error> {
        let tags = input
            .tags
            .map(|t| serde_json::to_value(t).unwrap_or_default());

        sqlx::query_as::<_, Subscriber>(
            r#"
            UPDATE subscribers SET
                name = COALESCE($2, name),
                verified = COALESCE($3, verified),
                tags = COALESCE($4, tags),
                attributes = COALESCE($5, attributes),
                updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&input.name)
        .bind(input.verified)
        .bind(&tags)
        .bind(&input.attributes)
        .fetch_optional(&self.pool)
        .await
    }

    /// Soft-delete a subscriber; the row is kept for audit purposes
    pub async fn soft_delete(&self, id: SubscriberId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE subscribers SET
                deleted_at = NOW(),
                updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Mark a subscriber as unsubscribed
    pub async fn unsubscribe(&self, id: SubscriberId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE subscribers SET
                status = 'unsubscribed',
                unsubscribed_at = NOW(),
                updated_at = NOW()
            WHERE id = $1 AND status != 'unsubscribed'
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Mark a subscriber globally undeliverable after a hard bounce
    pub async fn mark_bounced(&self, id: SubscriberId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE subscribers SET
                status = 'bounced',
                updated_at = NOW()
            WHERE id = $1 AND status = 'active'
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Mark a subscriber as having filed a spam complaint
    pub async fn mark_complained(&self, id: SubscriberId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE subscribers SET
                status = 'complained',
                updated_at = NOW()
            WHERE id = $1 AND status = 'active'
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Record an engagement (open/click): bump last_engaged_at and add
    /// points to the engagement score, clamped to 100
    pub async fn record_engagement(
        &self,
        id: SubscriberId,
        points: i32,
        at: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE subscribers SET
                engagement_score = LEAST(engagement_score + $2, 100),
                last_engaged_at = GREATEST(COALESCE(last_engaged_at, $3), $3),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(points)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Overwrite the engagement score (used by the decay recompute)
    pub async fn set_engagement_score(
        &self,
        id: SubscriberId,
        score: i32,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE subscribers SET
                engagement_score = $2,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(score.clamp(0, 100))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Fetch the deliverable subset of the given subscriber ids.
    ///
    /// Used by the recipient resolver: unsubscribed, bounced, complained,
    /// soft-deleted, and (per policy) unverified subscribers are filtered
    /// out here, against current data.
    pub async fn get_deliverable_by_ids(
        &self,
        ids: &[SubscriberId],
        require_verified: bool,
    ) -> Result<Vec<Subscriber>, sqlx::Error> {
        sqlx::query_as::<_, Subscriber>(
            r#"
            SELECT * FROM subscribers
            WHERE id = ANY($1)
              AND deleted_at IS NULL
              AND status = 'active'
              AND (NOT $2 OR verified)
            "#,
        )
        .bind(ids)
        .bind(require_verified)
        .fetch_all(&self.pool)
        .await
    }

    /// Count subscribers by status
    pub async fn count(&self, status: Option<SubscriberStatus>) -> Result<i64, sqlx::Error> {
        let count: (i64,) = if let Some(status) = status {
            sqlx::query_as(
                "SELECT COUNT(*) FROM subscribers WHERE status = $1 AND deleted_at IS NULL",
            )
            .bind(status.to_string())
            .fetch_one(&self.pool)
            .await?
        } else {
            sqlx::query_as("SELECT COUNT(*) FROM subscribers WHERE deleted_at IS NULL")
                .fetch_one(&self.pool)
                .await?
        };
        Ok(count.0)
    }
}
