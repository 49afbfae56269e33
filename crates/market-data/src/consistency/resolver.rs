use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::checker::{ConsistencyReport, ResolutionStrategy};
use crate::models::{MetricField, MetricRecord, MetricsResult, ProviderId, StockCode};

/// One entity's metrics after reconciliation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedRecord {
    #[serde(flatten)]
    pub record: MetricRecord,
    /// Providers that contributed at least one value, primary first
    pub sources: Vec<ProviderId>,
    /// Set when the values await manual review
    pub provisional: bool,
}

/// Reconciled metrics for one date.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    pub as_of: NaiveDate,
    pub strategy: ResolutionStrategy,
    pub confidence_score: f64,
    /// Providers that contributed to any record, primary first
    pub contributors: Vec<ProviderId>,
    pub records: BTreeMap<StockCode, ResolvedRecord>,
}

/// Apply the report's strategy to the two result sets.
///
/// Without a secondary or a report the primary is taken as is with full
/// confidence.
pub fn resolve(
    primary: &MetricsResult,
    secondary: Option<&MetricsResult>,
    report: Option<&ConsistencyReport>,
) -> Resolution {
    let (secondary, report) = match (secondary, report) {
        (Some(secondary), Some(report)) => (secondary, report),
        _ => return accept(primary, ResolutionStrategy::AcceptPrimary, 1.0, false),
    };

    let strategy = report.resolution_strategy;
    let confidence = report.confidence_score;
    match strategy {
        ResolutionStrategy::AcceptPrimary => accept(primary, strategy, confidence, false),
        ResolutionStrategy::FlagForManualReview => accept(primary, strategy, confidence, true),
        ResolutionStrategy::PreferPrimaryFillGaps => {
            merge(primary, secondary, strategy, confidence, &[])
        }
        ResolutionStrategy::MergeByFieldPriority => {
            let disputed = report.significant_fields();
            merge(primary, secondary, strategy, confidence, &disputed)
        }
    }
}

fn accept(
    primary: &MetricsResult,
    strategy: ResolutionStrategy,
    confidence_score: f64,
    provisional: bool,
) -> Resolution {
    let records = primary
        .rows
        .iter()
        .map(|(code, record)| {
            let resolved = ResolvedRecord {
                record: record.clone(),
                sources: vec![primary.source.clone()],
                provisional,
            };
            (code.clone(), resolved)
        })
        .collect();

    Resolution {
        as_of: primary.as_of,
        strategy,
        confidence_score,
        contributors: vec![primary.source.clone()],
        records,
    }
}

/// Union of both result sets. Values come from the primary except for
/// `secondary_wins` fields, where the secondary's value is taken when it has
/// one; absent values are filled from whichever side has them.
fn merge(
    primary: &MetricsResult,
    secondary: &MetricsResult,
    strategy: ResolutionStrategy,
    confidence_score: f64,
    secondary_wins: &[MetricField],
) -> Resolution {
    let mut records = BTreeMap::new();
    let mut secondary_contributed = false;

    for (code, a) in &primary.rows {
        let mut record = a.clone();
        let mut from_secondary = false;
        if let Some(b) = secondary.rows.get(code) {
            if record.name.is_none() && b.name.is_some() {
                record.name = b.name.clone();
            }
            for (field, value) in &b.values {
                let take = secondary_wins.contains(field) || !record.values.contains_key(field);
                if take && record.values.get(field) != Some(value) {
                    record.values.insert(*field, *value);
                    from_secondary = true;
                }
            }
        }

        let mut sources = vec![primary.source.clone()];
        if from_secondary {
            sources.push(secondary.source.clone());
            secondary_contributed = true;
        }
        let resolved = ResolvedRecord {
            record,
            sources,
            provisional: false,
        };
        records.insert(code.clone(), resolved);
    }

    for (code, b) in &secondary.rows {
        if primary.rows.contains_key(code) {
            continue;
        }
        let resolved = ResolvedRecord {
            record: b.clone(),
            sources: vec![secondary.source.clone()],
            provisional: false,
        };
        records.insert(code.clone(), resolved);
        secondary_contributed = true;
    }

    let mut contributors = vec![primary.source.clone()];
    if secondary_contributed {
        contributors.push(secondary.source.clone());
    }

    Resolution {
        as_of: primary.as_of,
        strategy,
        confidence_score,
        contributors,
        records,
    }
}
