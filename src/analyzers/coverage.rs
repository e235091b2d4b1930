use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::analyzers::types::Aggregate;

/// Minimum data coverage an aggregate needs to be kept.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoveragePolicy {
    /// Lowest accepted `observed / expected`.
    pub min_ratio: f64,
    /// Lowest accepted number of observed subunits, if any.
    #[serde(default)]
    pub min_observed: Option<u32>,
}

impl CoveragePolicy {
    /// Keeps everything.
    pub const NONE: CoveragePolicy = CoveragePolicy {
        min_ratio: 0.0,
        min_observed: None,
    };

    pub fn admits(&self, aggregate: &Aggregate) -> bool {
        let enough_subunits = self
            .min_observed
            .is_none_or(|min| aggregate.observed() >= min);
        enough_subunits && aggregate.coverage_ratio() >= self.min_ratio
    }
}

/// Drops aggregates below the policy. Dropped periods are omitted, not
/// zero-filled, so partial periods never enter trend comparisons.
pub fn filter_coverage(aggregates: Vec<Aggregate>, policy: &CoveragePolicy) -> Vec<Aggregate> {
    aggregates
        .into_iter()
        .filter(|a| {
            let keep = policy.admits(a);
            if !keep {
                debug!(
                    period = %a.period(),
                    observed = a.observed(),
                    expected = a.expected(),
                    "Dropping period with insufficient coverage"
                );
            }
            keep
        })
        .collect()
}
