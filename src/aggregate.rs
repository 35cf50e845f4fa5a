use crate::{AggregatedResult, Configuration, RunResult, UnitOutcome, round2};
use log::{debug, warn};
use std::collections::BTreeMap;

/// Mean metric over every measured workload, `None` when nothing was measured.
///
/// Metrics are summed in sorted order so the mean does not depend on the order
/// runs arrive in. Traffic counters are only kept for single-workload sweeps.
pub fn aggregate(configuration: &Configuration, runs: &[RunResult]) -> Option<AggregatedResult> {
    let first = runs.first()?;
    if runs.iter().any(|run| run.size != first.size) {
        warn!(
            "{} reported different sizes across workloads, using {}",
            configuration, first.size
        );
    }

    let mut metrics: Vec<f64> = runs.iter().map(|run| run.metric).collect();
    metrics.sort_by(f64::total_cmp);
    let mean = metrics.iter().sum::<f64>() / metrics.len() as f64;

    let breakdown: BTreeMap<String, f64> = runs
        .iter()
        .map(|run| (run.workload.display().to_string(), round2(run.metric)))
        .collect();

    Some(AggregatedResult {
        configuration: configuration.clone(),
        size: first.size,
        metric: round2(mean),
        traffic: if runs.len() == 1 { first.traffic } else { None },
        breakdown,
    })
}

/// Rejected configurations never produce a result
pub fn aggregate_outcome(outcome: &UnitOutcome) -> Option<AggregatedResult> {
    match outcome {
        UnitOutcome::Measured {
            configuration,
            runs,
        } => aggregate(configuration, runs),
        UnitOutcome::Rejected {
            configuration,
            workload,
            metric,
            threshold,
        } => {
            debug!(
                "Discarding {}: {} scored {:.2} < {:.2}",
                configuration,
                workload.display(),
                metric,
                threshold
            );
            None
        }
    }
}
