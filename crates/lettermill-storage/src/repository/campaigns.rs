//! Campaign repository

use chrono::Utc;
use lettermill_common::types::CampaignId;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{Campaign, CampaignStatus, CreateCampaign, UpdateCampaign};

/// Campaign repository
#[derive(Clone)]
pub struct CampaignRepository {
    pool: PgPool,
}

impl CampaignRepository {
    /// Create a new campaign repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a new campaign in draft status
    pub async fn create(&self, input: CreateCampaign) -> Result<Campaign, sqlx::Error> {
        let id = Uuid::new_v4();
        let targeting = serde_json::to_value(&input.targeting).unwrap_or_default();

        sqlx::query_as::<_, Campaign>(
            r#"
            INSERT INTO campaigns (
                id, name, description, subject, from_address, from_name,
                reply_to, html_body, text_body, targeting, scheduled_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&input.name)
        .bind(&input.description)
        .bind(&input.subject)
        .bind(&input.from_address)
        .bind(&input.from_name)
        .bind(&input.reply_to)
        .bind(&input.html_body)
        .bind(&input.text_body)
        .bind(&targeting)
        .bind(input.scheduled_at)
        .fetch_one(&self.pool)
        .await
    }

    /// Get a campaign by ID
    pub async fn get(&self, id: CampaignId) -> Result<Option<Campaign>, sqlx::Error> {
        sqlx::query_as::<_, Campaign>("SELECT * FROM campaigns WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    /// List campaigns, most recent first
    pub async fn list(
        &self,
        status: Option<CampaignStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Campaign>, sqlx::Error> {
        if let Some(status) = status {
            sqlx::query_as::<_, Campaign>(
                r#"
                SELECT * FROM campaigns
                WHERE status = $1
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
            sqlx::query_as::<_, Campaign>(
                "SELECT * FROM campaigns ORDER BY created_at DESC LIMIT $1 OFFSET $2",
            )
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
        }
    }

    /// Update a campaign; only draft campaigns may be edited
    pub async fn update(
        &self,
        id: CampaignId,
        input: UpdateCampaign,
    ) -> Result<Option<Campaign>, sqlx::Error> {
        let targeting = input
            .targeting
            .map(|t| serde_json::to_value(t).unwrap_or_default());

        sqlx::query_as::<_, Campaign>(
            r#"
            UPDATE campaigns SET
                name = COALESCE($2, name),
                description = COALESCE($3, description),
                subject = COALESCE($4, subject),
                from_address = COALESCE($5, from_address),
                from_name = COALESCE($6, from_name),
                reply_to = COALESCE($7, reply_to),
                html_body = COALESCE($8, html_body),
                text_body = COALESCE($9, text_body),
                targeting = COALESCE($10, targeting),
                scheduled_at = COALESCE($11, scheduled_at),
                updated_at = NOW()
            WHERE id = $1 AND status = 'draft'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&input.name)
        .bind(&input.description)
        .bind(&input.subject)
        .bind(&input.from_address)
        .bind(&input.from_name)
        .bind(&input.reply_to)
        .bind(&input.html_body)
        .bind(&input.text_body)
        .bind(&targeting)
        .bind(input.scheduled_at)
        .fetch_optional(&self.pool)
        .await
    }

    /// Update campaign status, guarded by the expected current status so
    /// concurrent transitions cannot race each other.
    pub async fn transition(
        &self,
        id: CampaignId,
        from: &[CampaignStatus],
        to: CampaignStatus,
    ) -> Result<Option<Campaign>, sqlx::Error> {
        let from: Vec<String> = from.iter().map(|s| s.to_string()).collect();

        let started_at = if to == CampaignStatus::Sending {
            Some(Utc::now())
        } else {
            None
        };

        let completed_at = if to.is_terminal() {
            Some(Utc::now())
        } else {
            None
        };

        sqlx::query_as::<_, Campaign>(
            r#"
            UPDATE campaigns SET
                status = $2,
                started_at = COALESCE(started_at, $3),
                completed_at = COALESCE($4, completed_at),
                updated_at = NOW()
            WHERE id = $1 AND status = ANY($5)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(to.to_string())
        .bind(started_at)
        .bind(completed_at)
        .bind(&from)
        .fetch_optional(&self.pool)
        .await
    }

    /// Mark a campaign failed with a reportable reason
    pub async fn mark_failed(
        &self,
        id: CampaignId,
        reason: &str,
    ) -> Result<Option<Campaign>, sqlx::Error> {
        sqlx::query_as::<_, Campaign>(
            r#"
            UPDATE campaigns SET
                status = 'failed',
                failure_reason = $2,
                completed_at = NOW(),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(reason)
        .fetch_optional(&self.pool)
        .await
    }

    /// Set the scheduled send time
    pub async fn set_scheduled_at(
        &self,
        id: CampaignId,
        scheduled_at: chrono::DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE campaigns SET
                scheduled_at = $2,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(scheduled_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Set total recipients count after resolution
    pub async fn set_total_recipients(
        &self,
        id: CampaignId,
        total: i32,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE campaigns SET
                total_recipients = $2,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(total)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Delete a campaign; only drafts may be deleted
    pub async fn delete(&self, id: CampaignId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM campaigns WHERE id = $1 AND status = 'draft'")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Get scheduled campaigns whose send time has arrived
    pub async fn get_scheduled_ready(&self) -> Result<Vec<Campaign>, sqlx::Error> {
        sqlx::query_as::<_, Campaign>(
            r#"
            SELECT * FROM campaigns
            WHERE status = 'scheduled'
              AND scheduled_at IS NOT NULL
              AND scheduled_at <= NOW()
            ORDER BY scheduled_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
    }

    /// List campaign ids currently in the given status
    pub async fn list_ids_by_status(
        &self,
        status: CampaignStatus,
    ) -> Result<Vec<CampaignId>, sqlx::Error> {
        let rows: Vec<(Uuid,)> = sqlx::query_as("SELECT id FROM campaigns WHERE status = $1")
            .bind(status.to_string())
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}
