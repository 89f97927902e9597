//! Database models

use chrono::{DateTime, Utc};
use lettermill_common::types::{
    CampaignId, QueueItemId, SegmentFilter, SegmentId, SubscriberId, TargetingRule,
};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Subscriber status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriberStatus {
    Active,
    Unsubscribed,
    Bounced,
    Complained,
}

impl std::fmt::Display for SubscriberStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubscriberStatus::Active => write!(f, "active"),
            SubscriberStatus::Unsubscribed => write!(f, "unsubscribed"),
            SubscriberStatus::Bounced => write!(f, "bounced"),
            SubscriberStatus::Complained => write!(f, "complained"),
        }
    }
}

impl std::str::FromStr for SubscriberStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(SubscriberStatus::Active),
            "unsubscribed" => Ok(SubscriberStatus::Unsubscribed),
            "bounced" => Ok(SubscriberStatus::Bounced),
            "complained" => Ok(SubscriberStatus::Complained),
            _ => Err(format!("Invalid subscriber status: {}", s)),
        }
    }
}

/// Subscriber model
///
/// Subscribers are soft-deleted: `deleted_at` is set and the row kept for
/// audit purposes.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Subscriber {
    pub id: SubscriberId,
    pub email: String,
    pub name: Option<String>,
    pub status: String,
    pub verified: bool,
    pub consent_given_at: Option<DateTime<Utc>>,
    pub consent_source_ip: Option<String>,
    pub engagement_score: i32,
    pub tags: serde_json::Value,
    pub attributes: serde_json::Value,
    pub last_engaged_at: Option<DateTime<Utc>>,
    pub unsubscribed_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscriber {
    /// Get status enum
    pub fn status_enum(&self) -> Option<SubscriberStatus> {
        self.status.parse().ok()
    }

    /// Get tags as a vector
    pub fn tags_vec(&self) -> Vec<String> {
        serde_json::from_value(self.tags.clone()).unwrap_or_default()
    }

    /// Whether this subscriber may receive campaign mail
    pub fn is_deliverable(&self, require_verified: bool) -> bool {
        self.deleted_at.is_none()
            && self.status_enum() == Some(SubscriberStatus::Active)
            && (!require_verified || self.verified)
    }
}

/// Create subscriber input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSubscriber {
    pub email: String,
    pub name: Option<String>,
    pub verified: Option<bool>,
    pub consent_source_ip: Option<String>,
    pub tags: Option<Vec<String>>,
    pub attributes: Option<serde_json::Value>,
}

/// Update subscriber input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateSubscriber {
    pub name: Option<String>,
    pub verified: Option<bool>,
    pub tags: Option<Vec<String>>,
    pub attributes: Option<serde_json::Value>,
}

/// Segment model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Segment {
    pub id: SegmentId,
    pub name: String,
    pub description: Option<String>,
    pub filter: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Segment {
    /// Deserialize the stored filter predicate
    pub fn filter_predicate(&self) -> SegmentFilter {
        serde_json::from_value(self.filter.clone()).unwrap_or_default()
    }
}

/// Create segment input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSegment {
    pub name: String,
    pub description: Option<String>,
    pub filter: SegmentFilter,
}

/// Update segment input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateSegment {
    pub name: Option<String>,
    pub description: Option<String>,
    pub filter: Option<SegmentFilter>,
}

/// Campaign status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Draft,
    Scheduled,
    Sending,
    Paused,
    Sent,
    Cancelled,
    Failed,
}

impl CampaignStatus {
    /// Terminal campaign states never transition again
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CampaignStatus::Sent | CampaignStatus::Cancelled | CampaignStatus::Failed
        )
    }
}

impl std::fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CampaignStatus::Draft => write!(f, "draft"),
            CampaignStatus::Scheduled => write!(f, "scheduled"),
            CampaignStatus::Sending => write!(f, "sending"),
            CampaignStatus::Paused => write!(f, "paused"),
            CampaignStatus::Sent => write!(f, "sent"),
            CampaignStatus::Cancelled => write!(f, "cancelled"),
            CampaignStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for CampaignStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(CampaignStatus::Draft),
            "scheduled" => Ok(CampaignStatus::Scheduled),
            "sending" => Ok(CampaignStatus::Sending),
            "paused" => Ok(CampaignStatus::Paused),
            "sent" => Ok(CampaignStatus::Sent),
            "cancelled" => Ok(CampaignStatus::Cancelled),
            "failed" => Ok(CampaignStatus::Failed),
            _ => Err(format!("Invalid campaign status: {}", s)),
        }
    }
}

/// Campaign model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Campaign {
    pub id: CampaignId,
    pub name: String,
    pub description: Option<String>,
    pub subject: String,
    pub from_address: String,
    pub from_name: Option<String>,
    pub reply_to: Option<String>,
    pub html_body: Option<String>,
    pub text_body: Option<String>,
    pub targeting: serde_json::Value,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub status: String,
    pub failure_reason: Option<String>,
    pub total_recipients: i32,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Campaign {
    /// Get status enum
    pub fn status_enum(&self) -> Option<CampaignStatus> {
        self.status.parse().ok()
    }

    /// Deserialize the stored targeting rule
    pub fn targeting_rule(&self) -> TargetingRule {
        serde_json::from_value(self.targeting.clone()).unwrap_or_default()
    }
}

/// Create campaign input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCampaign {
    pub name: String,
    pub description: Option<String>,
    pub subject: String,
    pub from_address: String,
    pub from_name: Option<String>,
    pub reply_to: Option<String>,
    pub html_body: Option<String>,
    pub text_body: Option<String>,
    pub targeting: TargetingRule,
    pub scheduled_at: Option<DateTime<Utc>>,
}

/// Update campaign input (draft campaigns only)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateCampaign {
    pub name: Option<String>,
    pub description: Option<String>,
    pub subject: Option<String>,
    pub from_address: Option<String>,
    pub from_name: Option<String>,
    pub reply_to: Option<String>,
    pub html_body: Option<String>,
    pub text_body: Option<String>,
    pub targeting: Option<TargetingRule>,
    pub scheduled_at: Option<DateTime<Utc>>,
}

/// Queue item status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueItemStatus {
    Pending,
    Processing,
    Sent,
    Delivered,
    Bounced,
    Failed,
}

impl QueueItemStatus {
    /// Terminal statuses are never claimed again
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            QueueItemStatus::Sent
                | QueueItemStatus::Delivered
                | QueueItemStatus::Bounced
                | QueueItemStatus::Failed
        )
    }
}

impl std::fmt::Display for QueueItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueItemStatus::Pending => write!(f, "pending"),
            QueueItemStatus::Processing => write!(f, "processing"),
            QueueItemStatus::Sent => write!(f, "sent"),
            QueueItemStatus::Delivered => write!(f, "delivered"),
            QueueItemStatus::Bounced => write!(f, "bounced"),
            QueueItemStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for QueueItemStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(QueueItemStatus::Pending),
            "processing" => Ok(QueueItemStatus::Processing),
            "sent" => Ok(QueueItemStatus::Sent),
            "delivered" => Ok(QueueItemStatus::Delivered),
            "bounced" => Ok(QueueItemStatus::Bounced),
            "failed" => Ok(QueueItemStatus::Failed),
            _ => Err(format!("Invalid queue item status: {}", s)),
        }
    }
}

/// Queue item model - one row per (campaign, subscriber) pair
///
/// The address is a snapshot captured at resolve time so later subscriber
/// mutations do not affect in-flight deliveries.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: QueueItemId,
    pub campaign_id: CampaignId,
    pub subscriber_id: SubscriberId,
    pub address: String,
    pub status: String,
    pub attempts: i32,
    pub max_attempts: i32,
    pub next_attempt_at: DateTime<Utc>,
    pub claimed_by: Option<String>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub provider_message_id: Option<String>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl QueueItem {
    /// Get status enum
    pub fn status_enum(&self) -> Option<QueueItemStatus> {
        self.status.parse().ok()
    }

    /// Check if this item may still be retried
    pub fn can_retry(&self) -> bool {
        self.attempts < self.max_attempts
    }
}

/// Delivery event model - immutable fact row referencing a queue item
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DeliveryEvent {
    pub id: uuid::Uuid,
    pub queue_item_id: QueueItemId,
    pub campaign_id: CampaignId,
    pub subscriber_id: SubscriberId,
    pub event_type: String,
    pub dedup_fingerprint: String,
    pub bounce_class: Option<String>,
    pub url: Option<String>,
    pub metadata: serde_json::Value,
    pub occurred_at: DateTime<Utc>,
    pub recorded_at: DateTime<Utc>,
}

/// Input for recording a delivery event
#[derive(Debug, Clone)]
pub struct RecordDeliveryEvent {
    pub queue_item_id: QueueItemId,
    pub campaign_id: CampaignId,
    pub subscriber_id: SubscriberId,
    pub event_type: String,
    pub dedup_fingerprint: String,
    pub bounce_class: Option<String>,
    pub url: Option<String>,
    pub metadata: serde_json::Value,
    pub occurred_at: DateTime<Utc>,
}

/// Derived per-campaign rollup, keyed by campaign id
///
/// Not a source of truth: always reproducible from queue items and
/// delivery events.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CampaignStatistics {
    pub campaign_id: CampaignId,
    pub total_recipients: i64,
    pub sent: i64,
    pub delivered: i64,
    pub bounced: i64,
    pub failed: i64,
    pub total_opens: i64,
    pub unique_opens: i64,
    pub total_clicks: i64,
    pub unique_clicks: i64,
    pub unsubscribes: i64,
    pub open_rate: f64,
    pub click_rate: f64,
    pub bounce_rate: f64,
    pub unsubscribe_rate: f64,
    pub computed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_status_roundtrips() {
        for s in ["draft", "scheduled", "sending", "paused", "sent", "cancelled", "failed"] {
            let status: CampaignStatus = s.parse().unwrap();
            assert_eq!(status.to_string(), s);
        }
        for s in ["pending", "processing", "sent", "delivered", "bounced", "failed"] {
            let status: QueueItemStatus = s.parse().unwrap();
            assert_eq!(status.to_string(), s);
        }
        assert!("limbo".parse::<QueueItemStatus>().is_err());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(QueueItemStatus::Sent.is_terminal());
        assert!(QueueItemStatus::Delivered.is_terminal());
        assert!(QueueItemStatus::Bounced.is_terminal());
        assert!(QueueItemStatus::Failed.is_terminal());
        assert!(!QueueItemStatus::Pending.is_terminal());
        assert!(!QueueItemStatus::Processing.is_terminal());

        assert!(CampaignStatus::Sent.is_terminal());
        assert!(!CampaignStatus::Paused.is_terminal());
    }

    #[test]
    fn test_subscriber_deliverable() {
        let mut sub = Subscriber {
            id: uuid::Uuid::new_v4(),
            email: "a@example.com".to_string(),
            name: None,
            status: "active".to_string(),
            verified: true,
            consent_given_at: None,
            consent_source_ip: None,
            engagement_score: 50,
            tags: serde_json::json!([]),
            attributes: serde_json::json!({}),
            last_engaged_at: None,
            unsubscribed_at: None,
            deleted_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(sub.is_deliverable(true));

        sub.verified = false;
        assert!(!sub.is_deliverable(true));
        assert!(sub.is_deliverable(false));

        sub.status = "bounced".to_string();
        assert!(!sub.is_deliverable(false));

        sub.status = "active".to_string();
        sub.deleted_at = Some(Utc::now());
        assert!(!sub.is_deliverable(false));
    }
}
