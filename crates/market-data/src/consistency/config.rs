use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::models::MetricField;

/// Consistency checker configuration.
///
/// Tolerances are relative differences (0.05 = 5%) between the two sources'
/// mean values for a field. Fields without an explicit tolerance or weight
/// use the defaults.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsistencyConfig {
    /// Per-field tolerances. Configured entries are merged over the defaults.
    #[serde(deserialize_with = "merge_over_default_tolerances")]
    pub tolerances: BTreeMap<MetricField, f64>,
    /// Tolerance for fields not listed in `tolerances`.
    pub default_tolerance: f64,
    /// Minimum confidence for the sources to count as consistent.
    pub acceptance_threshold: f64,
    /// Confidence below which the result is flagged for manual review.
    pub review_threshold: f64,
    /// Per-field weights in the confidence score. Unlisted fields weigh 1.0.
    pub weights: BTreeMap<MetricField, f64>,
    /// How much more populated (as a fraction) the primary must be to count
    /// as materially more complete.
    pub completeness_margin: f64,
    /// When false, every inconsistent result is flagged instead of merged.
    pub auto_merge: bool,
}

fn default_tolerances() -> BTreeMap<MetricField, f64> {
    BTreeMap::from([
        (MetricField::Close, 0.01),
        (MetricField::Pe, 0.05),
        (MetricField::PeTtm, 0.05),
        (MetricField::Pb, 0.05),
        (MetricField::Ps, 0.05),
        (MetricField::PsTtm, 0.05),
        (MetricField::TotalMv, 0.02),
        (MetricField::CircMv, 0.02),
        (MetricField::TotalShare, 0.01),
        (MetricField::FloatShare, 0.02),
        (MetricField::TurnoverRate, 0.10),
        (MetricField::VolumeRatio, 0.10),
    ])
}

fn merge_over_default_tolerances<'de, D>(deserializer: D) -> Result<BTreeMap<MetricField, f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let configured = BTreeMap::<MetricField, f64>::deserialize(deserializer)?;
    let mut tolerances = default_tolerances();
    tolerances.extend(configured);
    Ok(tolerances)
}

impl Default for ConsistencyConfig {
    fn default() -> Self {
        Self {
            tolerances: default_tolerances(),
            default_tolerance: 0.05,
            acceptance_threshold: 0.8,
            review_threshold: 0.5,
            weights: BTreeMap::new(),
            completeness_margin: 0.10,
            auto_merge: true,
        }
    }
}

impl ConsistencyConfig {
    pub fn tolerance(&self, field: MetricField) -> f64 {
        self.tolerances
            .get(&field)
            .copied()
            .unwrap_or(self.default_tolerance)
    }

    pub fn weight(&self, field: MetricField) -> f64 {
        self.weights.get(&field).copied().unwrap_or(1.0)
    }

    /// Problems that make the configuration unusable, if any.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        for (name, value) in [
            ("acceptance_threshold", self.acceptance_threshold),
            ("review_threshold", self.review_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                problems.push(format!("{} must be within [0, 1], got {}", name, value));
            }
        }
        if self.review_threshold > self.acceptance_threshold {
            problems.push(format!(
                "review_threshold ({}) must not exceed acceptance_threshold ({})",
                self.review_threshold, self.acceptance_threshold
            ));
        }
        if self.default_tolerance < 0.0 || self.tolerances.values().any(|t| *t < 0.0) {
            problems.push("tolerances must not be negative".to_string());
        }
        if self.weights.values().any(|w| *w < 0.0) {
            problems.push("weights must not be negative".to_string());
        }
        if self.completeness_margin < 0.0 {
            problems.push("completeness_margin must not be negative".to_string());
        }
        problems
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ConsistencyConfig::default();
        assert_eq!(config.tolerance(MetricField::Pe), 0.05);
        assert_eq!(config.tolerance(MetricField::TurnoverRate), 0.10);
        assert_eq!(config.weight(MetricField::Pb), 1.0);
        assert!(config.problems().is_empty());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: ConsistencyConfig = toml::from_str(
            r#"
            acceptance_threshold = 0.9
            [tolerances]
            pe = 0.08
            [weights]
            total_mv = 2.0
            "#,
        )
        .unwrap();
        assert_eq!(config.acceptance_threshold, 0.9);
        assert_eq!(config.review_threshold, 0.5);
        assert_eq!(config.tolerance(MetricField::Pe), 0.08);
        assert_eq!(config.tolerance(MetricField::Close), 0.01);
        assert_eq!(config.weight(MetricField::TotalMv), 2.0);
    }

    #[test]
    fn test_problems() {
        let config = ConsistencyConfig {
            acceptance_threshold: 0.4,
            review_threshold: 0.6,
            ..ConsistencyConfig::default()
        };
        assert_eq!(config.problems().len(), 1);

        let config = ConsistencyConfig {
            acceptance_threshold: 1.5,
            ..ConsistencyConfig::default()
        };
        assert_eq!(config.problems().len(), 1);
    }
}
