//! Common types for Lettermill

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for subscribers
pub type SubscriberId = Uuid;

/// Unique identifier for segments
pub type SegmentId = Uuid;

/// Unique identifier for campaigns
pub type CampaignId = Uuid;

/// Unique identifier for queue items
pub type QueueItemId = Uuid;

/// Unique identifier for delivery events
pub type DeliveryEventId = Uuid;

/// Email address
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EmailAddress {
    pub local: String,
    pub domain: String,
}

impl EmailAddress {
    /// Create a new email address
    pub fn new(local: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            local: local.into(),
            domain: domain.into(),
        }
    }

    /// Parse an email address from a string
    pub fn parse(s: &str) -> Option<Self> {
        let parts: Vec<&str> = s.splitn(2, '@').collect();
        if parts.len() == 2 && !parts[0].is_empty() && !parts[1].is_empty() {
            Some(Self::new(parts[0], parts[1]))
        } else {
            None
        }
    }
}

impl std::fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.local, self.domain)
    }
}

impl std::str::FromStr for EmailAddress {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| crate::Error::Validation("Invalid email address".to_string()))
    }
}

///// Targeting rule for a campaign: segments plus explicit include/exclude
/// subscriber lists. Exclusions win over everything else.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetingRule {
    /// Dynamic segments evaluated at resolve time
    #[serde(default)]
    pub segment_ids: Vec<SegmentId>,

    /// Explicitly included subscribers
    #[serde(default)]
    pub include_subscriber_ids: Vec<SubscriberId>,

    /// Explicitly excluded subscribers
    #[serde(default)]
    pub exclude_subscriber_ids: Vec<SubscriberId>,
}

impl TargetingRule {
    /// A rule with no segments and no explicit includes cannot resolve
    /// to anyone.
    pub fn is_empty(&self) -> bool {
        self.segment_ids.is_empty() && self.include_subscriber_ids.is_empty()
    }
}

/// Dynamic segment filter predicate, evaluated against current subscriber
/// data whenever the recipient resolver runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentFilter {
    /// Match subscribers with at least one of these tags
    #[serde(default)]
    pub any_tags: Vec<String>,

    /// Match subscribers with all of these tags
    #[serde(default)]
    pub all_tags: Vec<String>,

    /// Minimum engagement score (0-100)
    pub min_engagement: Option<i32>,

    /// Restrict to verified subscribers
    #[serde(default)]
    pub verified_only: bool,
}

/// Delivery event types reported by the transport provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Delivered,
    Open,
    Click,
    Bounce,
    Complaint,
    Unsubscribe,
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventType::Delivered => write!(f, "delivered"),
            EventType::Open => write!(f, "open"),
            EventType::Click => write!(f, "click"),
            EventType::Bounce => write!(f, "bounce"),
            EventType::Complaint => write!(f, "complaint"),
            EventType::Unsubscribe => write!(f, "unsubscribe"),
        }
    }
}

impl std::str::FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "delivered" => Ok(EventType::Delivered),
            "open" => Ok(EventType::Open),
            "click" => Ok(EventType::Click),
            "bounce" => Ok(EventType::Bounce),
            "complaint" => Ok(EventType::Complaint),
            "unsubscribe" => Ok(EventType::Unsubscribe),
            _ => Err(format!("Invalid event type: {}", s)),
        }
    }
}

/// Bounce classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BounceClass {
    /// Permanent failure (invalid address) - never retried, propagates to
    /// the subscriber
    Hard,
    /// Transient failure (mailbox full) - may succeed on retry
    Soft,
}

impl std::fmt::Display for BounceClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BounceClass::Hard => write!(f, "hard"),
            BounceClass::Soft => write!(f, "soft"),
        }
    }
}

impl std::str::FromStr for BounceClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hard" => Ok(BounceClass::Hard),
            "soft" => Ok(BounceClass::Soft),
            _ => Err(format!("Invalid bounce class: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_email_address() {
        let addr = EmailAddress::parse("user@example.com").unwrap();
        assert_eq!(addr.local, "user");
        assert_eq!(addr.domain, "example.com");
        assert_eq!(addr.to_string(), "user@example.com");

        assert!(EmailAddress::parse("no-at-sign").is_none());
        assert!(EmailAddress::parse("@example.com").is_none());
        assert!(EmailAddress::parse("user@").is_none());
    }

    #[test]
    fn test_targeting_rule_empty() {
        let rule = TargetingRule::default();
        assert!(rule.is_empty());

        let rule = TargetingRule {
            segment_ids: vec![Uuid::new_v4()],
            ..Default::default()
        };
        assert!(!rule.is_empty());

        // Exclusions alone do not make a rule resolvable
        let rule = TargetingRule {
            exclude_subscriber_ids: vec![Uuid::new_v4()],
            ..Default::default()
        };
        assert!(rule.is_empty());
    }

    #[test]
    fn test_event_type_roundtrip() {
        for ty in [
            EventType::Delivered,
            EventType::Open,
            EventType::Click,
            EventType::Bounce,
            EventType::Complaint,
            EventType::Unsubscribe,
        ] {
            assert_eq!(ty.to_string().parse::<EventType>().unwrap(), ty);
        }
        assert!("pixel_load".parse::<EventType>().is_err());
    }
}
