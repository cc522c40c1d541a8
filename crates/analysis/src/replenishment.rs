use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use warehouse_core::{ProductId, StorageId};
use warehouse_inventory::{ChangeDirection, NewNotice, OperationKind, OperationRecord};

use crate::job::AnalysisJob;
use crate::result::{AnalysisError, AnalysisReport};

/// Thresholds of the replenishment decision rule, in percent.
///
/// Rule, first match wins:
/// 1. shipment > 0 and loading / shipment > `decrease_above_percent`% → LOADING / DECREASE
/// 2. loading > 0 and shipment / loading < `increase_below_percent`% → LOADING / INCREASE
/// 3. otherwise no notice.
///
/// Ratios are compared by cross-multiplication, so no precision is lost to integer division
/// (3 loadings against 5 shipments is 60%, not 0%).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplenishmentPolicy {
    pub decrease_above_percent: u32,
    pub increase_below_percent: u32,
}

impl Default for ReplenishmentPolicy {
    fn default() -> Self {
        Self {
            decrease_above_percent: 50,
            increase_below_percent: 30,
        }
    }
}

impl ReplenishmentPolicy {
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.decrease_above_percent == 0 {
            return Err(AnalysisError::InvalidPolicy(
                "decrease_above_percent must be positive".to_string(),
            ));
        }
        if self.increase_below_percent == 0 {
            return Err(AnalysisError::InvalidPolicy(
                "increase_below_percent must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Recommendation for one pair, if any.
    pub fn decide(&self, totals: &PairTotals) -> Option<ChangeDirection> {
        let loading = u128::from(totals.loading);
        let shipment = u128::from(totals.shipment);

        if shipment > 0 && loading * 100 > shipment * u128::from(self.decrease_above_percent) {
            return Some(ChangeDirection::Decrease);
        }

        if loading > 0 && shipment * 100 < loading * u128::from(self.increase_below_percent) {
            return Some(ChangeDirection::Increase);
        }

        None
    }
}

/// Loading and shipment volume of one (product, storage) pair within the window.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PairTotals {
    pub product_id: ProductId,
    pub storage_id: StorageId,
    pub loading: u64,
    pub shipment: u64,
}

/// Replenishment analysis over a trailing window of the audit trail.
///
/// Pairs are derived from the records themselves (not from a catalog), so a pair with no
/// activity in the window never produces a notice.
#[derive(Debug, Clone)]
pub struct ReplenishmentJob {
    window_start: DateTime<Utc>,
    generated_at: DateTime<Utc>,
    operations: Vec<OperationRecord>,
    policy: ReplenishmentPolicy,
}

impl ReplenishmentJob {
    pub fn new(
        window_start: DateTime<Utc>,
        generated_at: DateTime<Utc>,
        operations: Vec<OperationRecord>,
    ) -> Self {
        Self {
            window_start,
            generated_at,
            operations,
            policy: ReplenishmentPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: ReplenishmentPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Per-pair totals of records at or after `window_start`, ordered by (product, storage).
    pub fn totals(&self) -> Result<Vec<PairTotals>, AnalysisError> {
        let mut pairs: BTreeMap<(ProductId, StorageId), (u64, u64)> = BTreeMap::new();

        for op in self.operations.iter().filter(|op| op.occurred_at >= self.window_start) {
            let count = u64::try_from(op.count)
                .ok()
                .filter(|c| *c > 0)
                .ok_or_else(|| {
                    AnalysisError::InvalidInput(format!(
                        "operation {} has non-positive count {}",
                        op.id, op.count
                    ))
                })?;

            let entry = pairs.entry((op.product_id, op.storage_id)).or_insert((0, 0));
            match op.kind {
                OperationKind::Loading => entry.0 = entry.0.saturating_add(count),
                OperationKind::Shipment => entry.1 = entry.1.saturating_add(count),
            }
        }

        Ok(pairs
            .into_iter()
            .map(|((product_id, storage_id), (loading, shipment))| PairTotals {
                product_id,
                storage_id,
                loading,
                shipment,
            })
            .collect())
    }
}

impl AnalysisJob for ReplenishmentJob {
    fn run(&self) -> Result<AnalysisReport, AnalysisError> {
        self.policy.validate()?;

        if self.window_start > self.generated_at {
            return Err(AnalysisError::InvalidInput(format!(
                "window start {} is after generation time {}",
                self.window_start, self.generated_at
            )));
        }

        let totals = self.totals()?;
        let operations_considered = self
            .operations
            .iter()
            .filter(|op| op.occurred_at >= self.window_start)
            .count();

        let notices = totals
            .iter()
            .filter_map(|t| {
                self.policy.decide(t).map(|direction| NewNotice {
                    product_id: t.product_id,
                    storage_id: t.storage_id,
                    operation: OperationKind::Loading,
                    direction,
                    generated_at: self.generated_at,
                })
            })
            .collect();

        Ok(AnalysisReport {
            window_start: self.window_start,
            generated_at: self.generated_at,
            operations_considered,
            pairs_considered: totals.len(),
            notices,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use proptest::prelude::*;
    use warehouse_core::OperationId;

    fn op(
        id: i64,
        kind: OperationKind,
        count: i64,
        product: i64,
        storage: i64,
        at: DateTime<Utc>,
    ) -> OperationRecord {
        OperationRecord {
            id: OperationId::new(id),
            kind,
            count,
            occurred_at: at,
            product_id: ProductId::new(product),
            storage_id: StorageId::new(storage),
        }
    }

    fn totals(loading: u64, shipment: u64) -> PairTotals {
        PairTotals {
            product_id: ProductId::new(1),
            storage_id: StorageId::new(2),
            loading,
            shipment,
        }
    }

    #[test]
    fn loading_heavy_pair_gets_decrease_notice() {
        let now = Utc::now();
        let ops = vec![
            op(1, OperationKind::Loading, 50, 1, 2, now - Duration::minutes(2)),
            op(2, OperationKind::Loading, 30, 1, 2, now - Duration::minutes(1)),
            op(3, OperationKind::Shipment, 20, 1, 2, now - Duration::seconds(30)),
        ];

        let report = ReplenishmentJob::new(now - Duration::minutes(3), now, ops)
            .run()
            .unwrap();

        assert_eq!(report.operations_considered, 3);
        assert_eq!(report.pairs_considered, 1);
        assert_eq!(report.notices.len(), 1);
        let notice = &report.notices[0];
        assert_eq!(notice.product_id, ProductId::new(1));
        assert_eq!(notice.storage_id, StorageId::new(2));
        assert_eq!(notice.operation, OperationKind::Loading);
        assert_eq!(notice.direction, ChangeDirection::Decrease);
        assert_eq!(notice.generated_at, now);
    }

    // Polarity of both branches is a product-owner policy decision: loading-heavy pairs are
    // throttled (DECREASE) and shipment-light pairs are boosted (INCREASE), exactly as the
    // rule is written. Changing it means changing `decide`, not the thresholds.
    #[test]
    fn polarity_is_a_policy_decision_pending_product_owner_confirmation() {
        let policy = ReplenishmentPolicy::default();
        assert_eq!(policy.decide(&totals(80, 20)), Some(ChangeDirection::Decrease));
        assert_eq!(policy.decide(&totals(100, 0)), Some(ChangeDirection::Increase));
    }

    #[test]
    fn equal_volumes_cross_the_decrease_threshold() {
        // 10 / 10 = 100% which is above 50%, so the first branch fires.
        let policy = ReplenishmentPolicy::default();
        assert_eq!(policy.decide(&totals(10, 10)), Some(ChangeDirection::Decrease));
    }

    #[test]
    fn neither_threshold_crossed_emits_nothing() {
        let policy = ReplenishmentPolicy::default();
        // 4 / 10 = 40% (not > 50%); 10 / 4 = 250% (not < 30%).
        assert_eq!(policy.decide(&totals(4, 10)), None);
        // Shipment only: loading / shipment = 0%, and there is no loading to compare against.
        assert_eq!(policy.decide(&totals(0, 10)), None);
        assert_eq!(policy.decide(&totals(0, 0)), None);
    }

    #[test]
    fn fractional_ratios_are_not_truncated() {
        // Truncating division would compute 3 / 5 * 100 = 0 and never fire.
        let policy = ReplenishmentPolicy::default();
        assert_eq!(policy.decide(&totals(3, 5)), Some(ChangeDirection::Decrease));
    }

    #[test]
    fn threshold_boundaries_are_strict() {
        let policy = ReplenishmentPolicy::default();
        // Exactly 50% does not exceed 50%.
        assert_eq!(policy.decide(&totals(5, 10)), None);
        // 2 / 10 = 20% < 30% but the decrease branch wins first: 10 / 2 = 500% > 50%.
        assert_eq!(policy.decide(&totals(10, 2)), Some(ChangeDirection::Decrease));
    }

    #[test]
    fn custom_policy_changes_thresholds() {
        let policy = ReplenishmentPolicy {
            decrease_above_percent: 200,
            increase_below_percent: 30,
        };
        assert_eq!(policy.decide(&totals(10, 10)), None);
        assert_eq!(policy.decide(&totals(30, 10)), Some(ChangeDirection::Decrease));
    }

    #[test]
    fn records_before_window_start_are_ignored() {
        let now = Utc::now();
        let start = now - Duration::minutes(3);
        let ops = vec![
            op(1, OperationKind::Loading, 80, 1, 2, start - Duration::seconds(1)),
            op(2, OperationKind::Shipment, 20, 1, 2, start),
        ];

        let job = ReplenishmentJob::new(start, now, ops);
        let t = job.totals().unwrap();
        assert_eq!(t, vec![PairTotals { loading: 0, shipment: 20, ..totals(0, 0) }]);

        let report = job.run().unwrap();
        assert_eq!(report.operations_considered, 1);
        assert!(report.is_empty());
    }

    #[test]
    fn pairs_are_grouped_independently_and_ordered() {
        let now = Utc::now();
        let ops = vec![
            op(1, OperationKind::Loading, 10, 2, 1, now),
            op(2, OperationKind::Loading, 80, 1, 2, now),
            op(3, OperationKind::Shipment, 20, 1, 2, now),
            op(4, OperationKind::Shipment, 10, 1, 3, now),
        ];

        let report = ReplenishmentJob::new(now - Duration::minutes(1), now, ops)
            .run()
            .unwrap();

        assert_eq!(report.pairs_considered, 3);
        let pairs: Vec<_> = report
            .notices
            .iter()
            .map(|n| (n.product_id.get(), n.storage_id.get(), n.direction))
            .collect();
        assert_eq!(
            pairs,
            vec![(1, 2, ChangeDirection::Decrease), (2, 1, ChangeDirection::Increase)]
        );
    }

    #[test]
    fn empty_window_is_not_an_error() {
        let now = Utc::now();
        let report = ReplenishmentJob::new(now, now, vec![]).run().unwrap();
        assert!(report.is_empty());
        assert_eq!(report.pairs_considered, 0);
    }

    #[test]
    fn rejects_corrupt_counts_and_inverted_window() {
        let now = Utc::now();
        let bad = vec![op(1, OperationKind::Loading, 0, 1, 2, now)];
        assert!(matches!(
            ReplenishmentJob::new(now, now, bad).run(),
            Err(AnalysisError::InvalidInput(_))
        ));

        assert!(matches!(
            ReplenishmentJob::new(now, now - Duration::seconds(1), vec![]).run(),
            Err(AnalysisError::InvalidInput(_))
        ));

        let zero = ReplenishmentPolicy {
            decrease_above_percent: 0,
            increase_below_percent: 30,
        };
        assert!(matches!(
            ReplenishmentJob::new(now, now, vec![]).with_policy(zero).run(),
            Err(AnalysisError::InvalidPolicy(_))
        ));
    }

    proptest! {
        /// Property: the decision matches the real-valued ratios.
        #[test]
        fn decision_matches_real_ratios(loading in 0u64..10_000, shipment in 0u64..10_000) {
            let policy = ReplenishmentPolicy::default();
            let expected = if shipment > 0 && (loading as f64 / shipment as f64) > 0.5 {
                Some(ChangeDirection::Decrease)
            } else if loading > 0 && (shipment as f64 / loading as f64) < 0.3 {
                Some(ChangeDirection::Increase)
            } else {
                None
            };
            prop_assert_eq!(policy.decide(&totals(loading, shipment)), expected);
        }
    }
}
