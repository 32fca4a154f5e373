//! Quality-control sampling sizes
//!
//! How many cards of each type must be pulled from a lot for testing. Lots
//! holding a single card type are sampled proportionally; mixed lots cap the
//! per-type effort at a small constant.

use serde::{Deserialize, Serialize};

use crate::error::{LotError, Result};

/// Divisor for the proportional single-type regime
const SINGLE_TYPE_DIVISOR: u32 = 50;

/// Sampling decision for one card-type line within a lot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamplingDecision {
    pub card_type: String,
    pub batch_quantity: u32,
    pub sample_size: u32,
}

/// Number of cards to pull for testing from one card-type line.
///
/// `distinct_type_count` is the number of distinct card types declared in the
/// same lot. With a single type the sample scales proportionally,
/// ceil(quantity / 50); mixed lots use fixed thresholds instead: up to 50
/// cards → 1, up to 100 → 2, above → 3. The two regimes are a business rule
/// and are deliberately not unified.
pub fn sample_size(batch_quantity: u32, distinct_type_count: u32) -> Result<u32> {
    if batch_quantity == 0 {
        return Err(LotError::InvalidQuantity(batch_quantity));
    }
    if distinct_type_count == 0 {
        return Err(LotError::InvalidTypeCount(distinct_type_count));
    }

    let size = if distinct_type_count == 1 {
        batch_quantity.div_ceil(SINGLE_TYPE_DIVISOR)
    } else if batch_quantity <= 50 {
        1
    } else if batch_quantity <= 100 {
        2
    } else {
        3
    };

    Ok(size)
}

/// Cards to test for a whole lot at registration time: ceil(quantity / 50)
pub fn cards_to_test(quantity: u32) -> Result<u32> {
    if quantity == 0 {
        return Err(LotError::InvalidQuantity(quantity));
    }
    Ok(quantity.div_ceil(SINGLE_TYPE_DIVISOR))
}

/// Build the sampling plan for a lot's card-type lines.
///
/// Each entry is a (card type, declared quantity) pair; the line count is the
/// distinct-type count fed to [`sample_size`]. Order is preserved.
pub fn plan_samples(entries: &[(String, u32)]) -> Result<Vec<SamplingDecision>> {
    let distinct_type_count = u32::try_from(entries.len()).unwrap_or(u32::MAX);

    entries
        .iter()
        .map(|(card_type, quantity)| {
            let size = sample_size(*quantity, distinct_type_count)?;
            Ok(SamplingDecision {
                card_type: card_type.clone(),
                batch_quantity: *quantity,
                sample_size: size,
            })
        })
        .collect()
}

/// A lot's total test burden across all of its card-type lines
pub fn total_sample_size(decisions: &[SamplingDecision]) -> u32 {
    decisions.iter().map(|d| d.sample_size).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_inputs_are_rejected() {
        assert!(matches!(
            sample_size(0, 1),
            Err(LotError::InvalidQuantity(0))
        ));
        assert!(matches!(
            sample_size(10, 0),
            Err(LotError::InvalidTypeCount(0))
        ));
        assert!(matches!(cards_to_test(0), Err(LotError::InvalidQuantity(0))));
    }

    #[test]
    fn single_type_lot_scales_proportionally() {
        let cases = [(1, 1), (49, 1), (50, 1), (51, 2), (100, 2), (101, 3)];
        for (quantity, expected) in cases {
            assert_eq!(sample_size(quantity, 1).unwrap(), expected, "q={}", quantity);
        }
        assert_eq!(sample_size(1000, 1).unwrap(), 20);
    }

    #[test]
    fn mixed_lot_uses_fixed_thresholds() {
        let cases = [(1, 1), (50, 1), (51, 2), (100, 2), (101, 3), (10_000, 3)];
        for (quantity, expected) in cases {
            assert_eq!(sample_size(quantity, 2).unwrap(), expected, "q={}", quantity);
            assert_eq!(sample_size(quantity, 5).unwrap(), expected, "q={}", quantity);
        }
    }

    #[test]
    fn sample_never_exceeds_batch() {
        for count in 1..=4 {
            for quantity in [1, 2, 49, 50, 51, 99, 100, 101, 500, 2500] {
                let size = sample_size(quantity, count).unwrap();
                assert!(size >= 1);
                assert!(size <= quantity, "q={} count={}", quantity, count);
            }
        }
    }

    #[test]
    fn sampling_is_deterministic() {
        assert_eq!(sample_size(777, 1).unwrap(), sample_size(777, 1).unwrap());
        assert_eq!(sample_size(777, 3).unwrap(), sample_size(777, 3).unwrap());
    }

    #[test]
    fn cards_to_test_matches_single_type_rule() {
        for quantity in [1, 49, 50, 51, 100, 101, 2600] {
            assert_eq!(
                cards_to_test(quantity).unwrap(),
                sample_size(quantity, 1).unwrap()
            );
        }
    }

    #[test]
    fn plan_uses_line_count_as_type_count() {
        let single = plan_samples(&[("open".to_string(), 120)]).unwrap();
        assert_eq!(single[0].sample_size, 3); // ceil(120/50)

        let mixed = plan_samples(&[
            ("open".to_string(), 120),
            ("challenge".to_string(), 40),
        ])
        .unwrap();
        assert_eq!(mixed[0].sample_size, 3); // >100 threshold
        assert_eq!(mixed[1].sample_size, 1);
        assert_eq!(total_sample_size(&mixed), 4);
    }

    #[test]
    fn plan_preserves_line_order() {
        let plan = plan_samples(&[
            ("visa leader".to_string(), 10),
            ("access".to_string(), 60),
            ("open".to_string(), 200),
        ])
        .unwrap();

        let types: Vec<&str> = plan.iter().map(|d| d.card_type.as_str()).collect();
        assert_eq!(types, ["visa leader", "access", "open"]);
    }

    #[test]
    fn plan_rejects_any_zero_quantity_line() {
        let err = plan_samples(&[
            ("open".to_string(), 100),
            ("challenge".to_string(), 0),
        ]);
        assert!(matches!(err, Err(LotError::InvalidQuantity(0))));
    }

    #[test]
    fn empty_plan_is_empty() {
        let plan = plan_samples(&[]).unwrap();
        assert!(plan.is_empty());
        assert_eq!(total_sample_size(&plan), 0);
    }
}
