use std::collections::HashMap;

use crate::DomainResult;
use crate::contacts::ContactMetrics;
use crate::endorsements::Endorsement;
use crate::error::DomainError;
use crate::ports::tx::Repositories;
use crate::rating::{RatingWeights, WeightedSample, age_days, endorsement_weight, weighted_average};

/// Recomputes a contact's derived trust metrics from its full endorsement
/// set. Never incremental: the same inputs always produce the same output, so
/// a retried or repeated recompute cannot drift the counters.
#[derive(Clone)]
pub struct ContactMetricsAggregator {
    weights: RatingWeights,
}

impl ContactMetricsAggregator {
    pub fn new(weights: RatingWeights) -> Self {
        Self { weights }
    }

    /// Reads all non-deleted endorsements for the contact and writes
    /// `endorsements_count`, `verified_endorsements_count`, and
    /// `average_rating` in one update. Callers run this inside the same
    /// transaction as the endorsement change that made it necessary.
    pub async fn recompute(
        &self,
        repos: &dyn Repositories,
        contact_id: &str,
        now_ms: i64,
    ) -> DomainResult<ContactMetrics> {
        repos
            .contacts()
            .get(contact_id)
            .await?
            .ok_or_else(|| DomainError::NotFound(format!("contact {contact_id}")))?;

        let endorsements = repos.endorsements().list_by_contact(contact_id).await?;

        let mut standings: HashMap<String, u64> = HashMap::new();
        for endorsement in &endorsements {
            if !standings.contains_key(&endorsement.user_id) {
                let verified = repos
                    .endorsements()
                    .count_verified_by_endorser(&endorsement.user_id)
                    .await?;
                standings.insert(endorsement.user_id.clone(), verified);
            }
        }

        let metrics = compute_metrics(&endorsements, &standings, now_ms, &self.weights);
        repos.contacts().update_metrics(contact_id, &metrics).await?;
        Ok(metrics)
    }
}

/// Pure metric computation over an endorsement snapshot. Soft-deleted
/// endorsements contribute to nothing.
pub fn compute_metrics(
    endorsements: &[Endorsement],
    endorser_standings: &HashMap<String, u64>,
    now_ms: i64,
    weights: &RatingWeights,
) -> ContactMetrics {
    let live: Vec<&Endorsement> = endorsements
        .iter()
        .filter(|endorsement| endorsement.deleted_at_ms.is_none())
        .collect();

    let endorsements_count = live.len() as u64;
    let verified_endorsements_count = live
        .iter()
        .filter(|endorsement| endorsement.is_verified)
        .count() as u64;

    let samples: Vec<WeightedSample> = live
        .iter()
        .map(|endorsement| WeightedSample {
            rating: endorsement.rating,
            weight: endorsement_weight(
                age_days(endorsement.created_at_ms, now_ms),
                endorsement.is_verified,
                endorser_standings
                    .get(&endorsement.user_id)
                    .copied()
                    .unwrap_or(0),
                weights,
            ),
        })
        .collect();

    ContactMetrics {
        endorsements_count,
        verified_endorsements_count,
        average_rating: weighted_average(&samples),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY_MS: i64 = 86_400_000;

    fn fixture(
        id: &str,
        user_id: &str,
        rating: u8,
        is_verified: bool,
        age_days: i64,
        now_ms: i64,
    ) -> Endorsement {
        Endorsement {
            endorsement_id: id.to_string(),
            contact_id: "contact-1".to_string(),
            user_id: user_id.to_string(),
            community_id: "community-1".to_string(),
            rating,
            comment: None,
            is_verified,
            verified_by: is_verified.then(|| "verifier-1".to_string()),
            verified_at_ms: is_verified.then_some(now_ms),
            deleted_at_ms: None,
            created_at_ms: now_ms - age_days * DAY_MS,
            updated_at_ms: now_ms - age_days * DAY_MS,
        }
    }

    #[test]
    fn counts_and_average_from_empty_set() {
        let metrics = compute_metrics(&[], &HashMap::new(), 0, &RatingWeights::default());
        assert_eq!(metrics.endorsements_count, 0);
        assert_eq!(metrics.verified_endorsements_count, 0);
        assert_eq!(metrics.average_rating, None);
    }

    #[test]
    fn verified_count_tracks_verification_flag() {
        let now = 1_000 * DAY_MS;
        let endorsements = vec![
            fixture("e-1", "u-1", 5, true, 1, now),
            fixture("e-2", "u-2", 4, false, 1, now),
            fixture("e-3", "u-3", 3, true, 1, now),
        ];
        let metrics = compute_metrics(
            &endorsements,
            &HashMap::new(),
            now,
            &RatingWeights::default(),
        );
        assert_eq!(metrics.endorsements_count, 3);
        assert_eq!(metrics.verified_endorsements_count, 2);
    }

    #[test]
    fn recompute_is_idempotent_for_a_fixed_snapshot() {
        let now = 2_000 * DAY_MS;
        let endorsements = vec![
            fixture("e-1", "u-1", 5, true, 10, now),
            fixture("e-2", "u-2", 2, false, 100, now),
        ];
        let standings = HashMap::from([("u-1".to_string(), 3_u64), ("u-2".to_string(), 0_u64)]);
        let weights = RatingWeights::default();

        let first = compute_metrics(&endorsements, &standings, now, &weights);
        let second = compute_metrics(&endorsements, &standings, now, &weights);
        assert_eq!(first, second);
    }

    #[test]
    fn soft_deleted_endorsements_contribute_nothing() {
        let now = 1_000 * DAY_MS;
        let mut retracted = fixture("e-2", "u-2", 1, false, 5, now);
        retracted.deleted_at_ms = Some(now);
        let endorsements = vec![fixture("e-1", "u-1", 5, true, 5, now), retracted];

        let metrics = compute_metrics(
            &endorsements,
            &HashMap::new(),
            now,
            &RatingWeights::default(),
        );
        assert_eq!(metrics.endorsements_count, 1);
        assert_eq!(metrics.verified_endorsements_count, 1);
        assert_eq!(metrics.average_rating, Some(5.0));
    }

    #[test]
    fn stale_unverified_endorsement_barely_moves_the_average() {
        // A fresh verified 5 against an unverified 3 past the decay horizon:
        // the naive mean would be 4.0, the weighted mean sits closer to 5.
        let now = 2_000 * DAY_MS;
        let endorsements = vec![
            fixture("e-1", "u-1", 5, true, 10, now),
            fixture("e-2", "u-2", 3, false, 400, now),
        ];
        let standings = HashMap::from([("u-1".to_string(), 2_u64), ("u-2".to_string(), 2_u64)]);

        let metrics = compute_metrics(&endorsements, &standings, now, &RatingWeights::default());
        let average = metrics.average_rating.expect("average");
        assert!(average > 4.4, "expected well above naive mean, got {average}");
        assert!(average < 5.0);
    }
}
