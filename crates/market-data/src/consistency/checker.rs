use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use log::debug;
use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};

use super::config::ConsistencyConfig;
use crate::models::{MetricField, MetricsResult, ProviderId};

/// Primary means at or below this magnitude have no usable denominator; the
/// field is reported but excluded from significance testing.
pub const EPSILON: f64 = 1e-9;

/// How two disagreeing result sets should be reconciled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    /// Keep the primary values as they are.
    AcceptPrimary,
    /// Keep the primary values, filling absent ones from the secondary.
    PreferPrimaryFillGaps,
    /// Take the secondary's values for the disputed fields.
    MergeByFieldPriority,
    /// Keep the primary values but mark them provisional.
    FlagForManualReview,
}

impl ResolutionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AcceptPrimary => "accept_primary",
            Self::PreferPrimaryFillGaps => "prefer_primary_fill_gaps",
            Self::MergeByFieldPriority => "merge_by_field_priority",
            Self::FlagForManualReview => "flag_for_manual_review",
        }
    }
}

impl fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Comparison of one field across the joined entities.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDifference {
    /// Mean of the primary's values over the compared entities
    pub primary_value: Option<f64>,
    pub secondary_value: Option<f64>,
    /// `|primary - secondary| / |primary|`; `None` when the primary mean is
    /// zero and the field was excluded
    pub difference_pct: Option<f64>,
    pub is_significant: bool,
    pub tolerance_used: f64,
    /// Entities where both sources reported the field
    pub compared_entities: usize,
}

/// Outcome of comparing two providers' metrics for the same date.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsistencyReport {
    pub is_consistent: bool,
    pub confidence_score: f64,
    /// Strategy the comparison alone calls for.
    pub recommended_action: ResolutionStrategy,
    /// Strategy to apply. Differs from `recommended_action` only when
    /// automatic merging is disabled.
    pub resolution_strategy: ResolutionStrategy,
    pub primary_source: ProviderId,
    pub secondary_source: ProviderId,
    pub as_of: NaiveDate,
    pub overlapping_entities: usize,
    /// Populated values in the primary, over all of its rows
    pub primary_populated: usize,
    pub secondary_populated: usize,
    pub differences: BTreeMap<MetricField, FieldDifference>,
}

impl ConsistencyReport {
    /// Fields whose difference exceeded their tolerance.
    pub fn significant_fields(&self) -> Vec<MetricField> {
        self.differences
            .iter()
            .filter(|(_, diff)| diff.is_significant)
            .map(|(field, _)| *field)
            .collect()
    }
}

/// Compares metrics result sets from two providers.
///
/// The checker holds only configuration; `check` is a pure function of its
/// inputs and always yields the same report for the same result sets.
#[derive(Clone, Debug, Default)]
pub struct ConsistencyChecker {
    config: ConsistencyConfig,
}

impl ConsistencyChecker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ConsistencyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ConsistencyConfig {
        &self.config
    }

    /// Compare `primary` against `secondary`.
    ///
    /// Returns `None` when the result sets describe different dates or share
    /// no entities; there is nothing to reconcile in that case.
    pub fn check(
        &self,
        primary: &MetricsResult,
        secondary: &MetricsResult,
    ) -> Option<ConsistencyReport> {
        if primary.as_of != secondary.as_of {
            debug!(
                "Skipping consistency check: {} is for {}, {} is for {}",
                primary.source, primary.as_of, secondary.source, secondary.as_of
            );
            return None;
        }

        let joined: Vec<_> = primary
            .rows
            .iter()
            .filter_map(|(code, a)| secondary.rows.get(code).map(|b| (a, b)))
            .collect();
        if joined.is_empty() {
            debug!(
                "Skipping consistency check: {} and {} share no entities",
                primary.source, secondary.source
            );
            return None;
        }

        let mut differences = BTreeMap::new();
        for field in MetricField::ALL {
            let pairs: Vec<(f64, f64)> = joined
                .iter()
                .filter_map(|(a, b)| {
                    let a = a.get(field)?.to_f64()?;
                    let b = b.get(field)?.to_f64()?;
                    Some((a, b))
                })
                .collect();
            if pairs.is_empty() {
                continue;
            }
            differences.insert(field, self.compare_field(field, &pairs));
        }

        let confidence_score = self.confidence(&differences);
        let is_consistent = confidence_score >= self.config.acceptance_threshold;
        let primary_populated = primary.populated_values();
        let secondary_populated = secondary.populated_values();
        let recommended_action = self.recommend(
            is_consistent,
            confidence_score,
            primary_populated,
            secondary_populated,
        );
        let resolution_strategy = if self.config.auto_merge
            || recommended_action == ResolutionStrategy::AcceptPrimary
        {
            recommended_action
        } else {
            ResolutionStrategy::FlagForManualReview
        };

        debug!(
            "Consistency {} vs {} on {}: confidence {:.3}, {} of {} fields significant, {}",
            primary.source,
            secondary.source,
            primary.as_of,
            confidence_score,
            differences.values().filter(|d| d.is_significant).count(),
            differences.len(),
            resolution_strategy
        );

        Some(ConsistencyReport {
            is_consistent,
            confidence_score,
            recommended_action,
            resolution_strategy,
            primary_source: primary.source.clone(),
            secondary_source: secondary.source.clone(),
            as_of: primary.as_of,
            overlapping_entities: joined.len(),
            primary_populated,
            secondary_populated,
            differences,
        })
    }

    fn compare_field(&self, field: MetricField, pairs: &[(f64, f64)]) -> FieldDifference {
        let n = pairs.len() as f64;
        let mean_a = pairs.iter().map(|(a, _)| a).sum::<f64>() / n;
        let mean_b = pairs.iter().map(|(_, b)| b).sum::<f64>() / n;
        let tolerance = self.config.tolerance(field);
        let difference_pct = if mean_a.abs() < EPSILON {
            debug!("Consistency: primary mean of {} is zero, excluded", field);
            None
        } else {
            Some((mean_a - mean_b).abs() / mean_a.abs())
        };

        FieldDifference {
            primary_value: Some(mean_a),
            secondary_value: Some(mean_b),
            difference_pct,
            is_significant: difference_pct.is_some_and(|d| d > tolerance),
            tolerance_used: tolerance,
            compared_entities: pairs.len(),
        }
    }

    /// `1 - Σw(significant) / Σw(compared)`, or 1.0 with nothing compared.
    /// Excluded fields carry no weight.
    fn confidence(&self, differences: &BTreeMap<MetricField, FieldDifference>) -> f64 {
        let mut compared = 0.0;
        let mut significant = 0.0;
        for (field, diff) in differences {
            if diff.difference_pct.is_none() {
                continue;
            }
            let weight = self.config.weight(*field);
            compared += weight;
            if diff.is_significant {
                significant += weight;
            }
        }
        if compared <= 0.0 {
            return 1.0;
        }
        (1.0 - significant / compared).clamp(0.0, 1.0)
    }

    fn recommend(
        &self,
        is_consistent: bool,
        confidence: f64,
        primary_populated: usize,
        secondary_populated: usize,
    ) -> ResolutionStrategy {
        if is_consistent {
            return ResolutionStrategy::AcceptPrimary;
        }
        if confidence < self.config.review_threshold {
            return ResolutionStrategy::FlagForManualReview;
        }
        let materially_more =
            secondary_populated as f64 * (1.0 + self.config.completeness_margin);
        if primary_populated as f64 >= materially_more {
            ResolutionStrategy::PreferPrimaryFillGaps
        } else if secondary_populated > primary_populated {
            ResolutionStrategy::MergeByFieldPriority
        } else {
            ResolutionStrategy::PreferPrimaryFillGaps
        }
    }
}
