//! Recipient Resolver - materializes a campaign's targeting rule into
//! queue items
//!
//! Resolution evaluates dynamic segments against current subscriber data,
//! unions them with explicit includes, subtracts exclusions and
//! ineligible subscribers, and upserts one queue item per remaining
//! (campaign, subscriber) pair. The upsert makes re-running resolution
//! safe: a resolve interrupted halfway, or a scheduler firing twice,
//! never duplicates rows.

use std::collections::HashSet;

use lettermill_common::types::{SubscriberId, TargetingRule};
use lettermill_storage::models::Campaign;
use lettermill_storage::repository::{
    NewQueueItem, QueueItemRepository, SegmentRepository, SubscriberRepository,
};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Resolution errors
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("Targeting rule is empty")]
    EmptyTargeting,

    #[error("Targeting rule resolved to zero recipients")]
    NoRecipients,

    #[error("Unknown segment: {0}")]
    UnknownSegment(uuid::Uuid),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Recipient resolver
pub struct RecipientResolver {
    subscriber_repo: SubscriberRepository,
    segment_repo: SegmentRepository,
    queue_repo: QueueItemRepository,
    /// Exclude unverified subscribers when set
    require_verified: bool,
    /// Per-item attempt budget copied onto new queue rows
    max_attempts: i32,
}

impl RecipientResolver {
    /// Create a new recipient resolver
    pub fn new(
        subscriber_repo: SubscriberRepository,
        segment_repo: SegmentRepository,
        queue_repo: QueueItemRepository,
        require_verified: bool,
        max_attempts: i32,
    ) -> Self {
        Self {
            subscriber_repo,
            segment_repo,
            queue_repo,
            require_verified,
            max_attempts,
        }
    }

    /// Materialize queue items for a campaign. Returns the number of
    /// recipients in the resolved set (not the number of rows inserted;
    /// re-runs insert nothing new but still report the full set).
    pub async fn resolve(&self, campaign: &Campaign) -> Result<u64, ResolveError> {
        let rule = campaign.targeting_rule();
        if rule.is_empty() {
            return Err(ResolveError::EmptyTargeting);
        }

        // Dynamic segments, evaluated now
        let mut segment_members = Vec::with_capacity(rule.segment_ids.len());
        for segment_id in &rule.segment_ids {
            let segment = self
                .segment_repo
                .get(*segment_id)
                .await?
                .ok_or(ResolveError::UnknownSegment(*segment_id))?;

            let members = self.segment_repo.evaluate(&segment.filter_predicate()).await?;
            debug!(
                campaign_id = %campaign.id,
                segment_id = %segment_id,
                members = members.len(),
                "Evaluated segment"
            );
            segment_members.push(members);
        }

        let candidates = combine_candidates(&rule, segment_members);

        if candidates.is_empty() {
            return Err(ResolveError::NoRecipients);
        }

        // Re-check eligibility against current subscriber data; explicit
        // includes may point at unsubscribed or deleted subscribers.
        let ids: Vec<uuid::Uuid> = candidates.into_iter().collect();
        let subscribers = self
            .subscriber_repo
            .get_deliverable_by_ids(&ids, self.require_verified)
            .await?;

        if subscribers.is_empty() {
            return Err(ResolveError::NoRecipients);
        }

        let total = subscribers.len() as u64;
        let items: Vec<NewQueueItem> = subscribers
            .into_iter()
            .map(|s| NewQueueItem {
                campaign_id: campaign.id,
                subscriber_id: s.id,
                // snapshot: the live email may change or be deleted later
                address: s.email,
                max_attempts: self.max_attempts,
            })
            .collect();

        let inserted = self.queue_repo.upsert_batch(items).await?;

        if inserted < total {
            // Expected on re-runs; the unique index absorbed duplicates
            warn!(
                campaign_id = %campaign.id,
                total,
                inserted,
                "Resolution skipped already-enqueued recipients"
            );
        }

        info!(
            campaign_id = %campaign.id,
            recipients = total,
            inserted,
            "Recipient resolution complete"
        );

        Ok(total)
    }
}

/// Union of segment matches and explicit includes, minus exclusions.
/// Exclusions win no matter how a subscriber entered the set.
fn combine_candidates(
    rule: &TargetingRule,
    segment_members: Vec<Vec<SubscriberId>>,
) -> HashSet<SubscriberId> {
    let mut candidates: HashSet<SubscriberId> =
        segment_members.into_iter().flatten().collect();

    candidates.extend(rule.include_subscriber_ids.iter().copied());

    for excluded in &rule.exclude_subscriber_ids {
        candidates.remove(excluded);
    }

    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ids(n: usize) -> Vec<SubscriberId> {
        (0..n).map(|_| uuid::Uuid::new_v4()).collect()
    }

    #[test]
    fn test_candidates_union_segments_and_includes() {
        let s = ids(4);
        let rule = TargetingRule {
            segment_ids: vec![],
            include_subscriber_ids: vec![s[3], s[0]],
            exclude_subscriber_ids: vec![],
        };

        // s[0] appears in both segments and in the includes; counted once
        let candidates =
            combine_candidates(&rule, vec![vec![s[0], s[1]], vec![s[0], s[2]]]);

        assert_eq!(candidates.len(), 4);
        for id in &s {
            assert!(candidates.contains(id));
        }
    }

    #[test]
    fn test_exclusion_wins_over_segment_and_include() {
        let s = ids(3);
        let rule = TargetingRule {
            segment_ids: vec![],
            include_subscriber_ids: vec![s[1]],
            exclude_subscriber_ids: vec![s[0], s[1]],
        };

        // s[0] excluded out of a segment, s[1] excluded despite the
        // explicit include
        let candidates = combine_candidates(&rule, vec![vec![s[0], s[2]]]);

        assert_eq!(candidates.len(), 1);
        assert!(candidates.contains(&s[2]));
    }

    #[test]
    fn test_everyone_excluded_leaves_empty_set() {
        let s = ids(2);
        let rule = TargetingRule {
            segment_ids: vec![],
            include_subscriber_ids: vec![s[0], s[1]],
            exclude_subscriber_ids: vec![s[0], s[1]],
        };

        assert!(combine_candidates(&rule, vec![]).is_empty());
    }
}
