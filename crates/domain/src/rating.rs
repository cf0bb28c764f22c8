//! Weighted-rating math for contact endorsements.
//!
//! Everything here is pure and deterministic given its inputs; the aggregator
//! feeds it fixture-independent values (age in days, verification flag,
//! endorser standing) so it can be unit-tested against a fixed "now".

pub const DEFAULT_MAX_AGE_DAYS: f64 = 365.0;
pub const DEFAULT_RECENCY_FLOOR: f64 = 0.5;
pub const DEFAULT_UNVERIFIED_FACTOR: f64 = 0.7;

const MS_PER_DAY: f64 = 86_400_000.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RatingWeights {
    pub max_age_days: f64,
    pub recency_floor: f64,
    pub unverified_factor: f64,
}

impl Default for RatingWeights {
    fn default() -> Self {
        Self {
            max_age_days: DEFAULT_MAX_AGE_DAYS,
            recency_floor: DEFAULT_RECENCY_FLOOR,
            unverified_factor: DEFAULT_UNVERIFIED_FACTOR,
        }
    }
}

/// One endorsement's contribution to a contact's average rating.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WeightedSample {
    pub rating: u8,
    pub weight: f64,
}

pub fn age_days(created_at_ms: i64, now_ms: i64) -> f64 {
    if now_ms <= created_at_ms {
        return 0.0;
    }
    (now_ms - created_at_ms) as f64 / MS_PER_DAY
}

/// Linear decay from 1.0 at age zero down to the floor at `max_age_days`,
/// never below the floor.
pub fn recency_factor(age_days: f64, weights: &RatingWeights) -> f64 {
    if age_days <= 0.0 || weights.max_age_days <= 0.0 {
        return 1.0;
    }
    let span = 1.0 - weights.recency_floor;
    let decayed = 1.0 - (age_days / weights.max_age_days) * span;
    decayed.max(weights.recency_floor)
}

pub fn verification_factor(is_verified: bool, weights: &RatingWeights) -> f64 {
    if is_verified {
        1.0
    } else {
        weights.unverified_factor
    }
}

/// Endorser standing from their own verified-endorsement count, bucketed into
/// tiers. Capped at 1.2.
pub fn standing_factor(verified_endorsements: u64) -> f64 {
    match verified_endorsements {
        0..=1 => 0.8,
        2..=5 => 1.0,
        _ => 1.2,
    }
}

/// Combined multiplicative weight, clamped into (0, 1]. The standing boost can
/// offset the recency and verification penalties but never push the weight
/// above 1.0.
pub fn endorsement_weight(
    age_days: f64,
    is_verified: bool,
    endorser_verified_count: u64,
    weights: &RatingWeights,
) -> f64 {
    let raw = recency_factor(age_days, weights)
        * verification_factor(is_verified, weights)
        * standing_factor(endorser_verified_count);
    raw.clamp(f64::EPSILON, 1.0)
}

/// Weight-normalized mean `Σ(rating·w) / Σ(w)`, rounded to two decimals.
/// `None` when there is nothing to average.
pub fn weighted_average(samples: &[WeightedSample]) -> Option<f64> {
    let total_weight: f64 = samples.iter().map(|sample| sample.weight).sum();
    if total_weight <= 0.0 {
        return None;
    }
    let weighted_sum: f64 = samples
        .iter()
        .map(|sample| f64::from(sample.rating) * sample.weight)
        .sum();
    Some(round2(weighted_sum / total_weight))
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < EPS,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn fresh_endorsement_has_full_recency() {
        let weights = RatingWeights::default();
        assert_approx(recency_factor(0.0, &weights), 1.0);
    }

    #[test]
    fn recency_decays_linearly_to_floor() {
        let weights = RatingWeights::default();
        assert_approx(recency_factor(182.5, &weights), 0.75);
        assert_approx(recency_factor(365.0, &weights), 0.5);
    }

    #[test]
    fn recency_never_drops_below_floor() {
        let weights = RatingWeights::default();
        assert_approx(recency_factor(400.0, &weights), 0.5);
        assert_approx(recency_factor(10_000.0, &weights), 0.5);
    }

    #[test]
    fn standing_tiers_match_buckets() {
        assert_approx(standing_factor(0), 0.8);
        assert_approx(standing_factor(1), 0.8);
        assert_approx(standing_factor(2), 1.0);
        assert_approx(standing_factor(5), 1.0);
        assert_approx(standing_factor(6), 1.2);
        assert_approx(standing_factor(100), 1.2);
    }

    #[test]
    fn weight_is_clamped_to_one() {
        let weights = RatingWeights::default();
        // Fresh, verified, high-standing endorser: 1.0 * 1.0 * 1.2 clamps to 1.0.
        assert_approx(endorsement_weight(0.0, true, 10, &weights), 1.0);
    }

    #[test]
    fn stale_unverified_endorsement_is_discounted() {
        let weights = RatingWeights::default();
        // Floored recency (0.5) times unverified factor (0.7).
        assert_approx(endorsement_weight(400.0, false, 3, &weights), 0.35);
    }

    #[test]
    fn weighted_average_favours_fresh_verified_ratings() {
        let weights = RatingWeights::default();
        let samples = [
            WeightedSample {
                rating: 5,
                weight: endorsement_weight(10.0, true, 3, &weights),
            },
            WeightedSample {
                rating: 3,
                weight: endorsement_weight(400.0, false, 3, &weights),
            },
        ];
        let average = weighted_average(&samples).expect("average");
        // Materially above the naive unweighted mean of 4.0.
        assert!(average > 4.4, "expected > 4.4, got {average}");
        assert!(average < 5.0);
    }

    #[test]
    fn weighted_average_of_nothing_is_none() {
        assert_eq!(weighted_average(&[]), None);
    }

    #[test]
    fn age_days_never_negative() {
        assert_approx(age_days(2_000, 1_000), 0.0);
        assert_approx(age_days(0, 86_400_000), 1.0);
    }
}
