use crate::{
    AggregatedResult, BinnedBest, CacheTarget, CommonSettings, Configuration, DispatchOptions,
    PredictorKind, RankedBest, Simulator, SweepError, SweepKind, SweepLog, SweepSpec, SweepTable,
    WorkloadCatalog, aggregate_outcome, bin, cache_space, combiner_candidates, compose, dispatch,
    get_best_path, get_binned_best_path, get_log_path, get_table_path, get_tqdm_style, load_json,
    predictor_space, rank, save_json, slot_candidates,
};
use anyhow::Context;
use log::info;
use std::{
    collections::HashSet,
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

/// What one sweep explores
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepTarget {
    Cache(CacheTarget),
    Predictor(PredictorKind),
    Combined,
}

impl SweepTarget {
    /// Prefix of every output file of this sweep
    pub fn label(&self) -> String {
        match self {
            SweepTarget::Cache(target) => target.name().to_string(),
            SweepTarget::Predictor(kind) => format!("bpred_{}", kind),
            SweepTarget::Combined => "bpred_combined".to_string(),
        }
    }

    pub fn kind(&self) -> SweepKind {
        match self {
            SweepTarget::Cache(target) => (*target).into(),
            SweepTarget::Predictor(_) | SweepTarget::Combined => SweepKind::Bpred,
        }
    }
}

impl fmt::Display for SweepTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// Everything a sweep needs besides its target
pub struct SweepContext {
    pub spec: SweepSpec,
    pub catalog: Arc<WorkloadCatalog>,
    pub simulator: Arc<dyn Simulator>,
    pub results_dir: PathBuf,
    pub max_workers: usize,
    /// Disable per-workload thresholds for every target, not only static baselines
    pub ignore_thresholds: bool,
    /// Load saved results instead of simulating when they exist
    pub reuse: bool,
    pub show_progress: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SweepOutcome {
    pub target: SweepTarget,
    pub table: SweepTable,
    pub binned: BinnedBest,
    pub best: RankedBest,
    /// true when the table was loaded from disk rather than simulated
    pub reused: bool,
}

fn bpred_settings(spec: &SweepSpec) -> Result<&CommonSettings, SweepError> {
    spec.hw_params
        .bpred
        .as_ref()
        .map(|bpred| &bpred.common_settings)
        .ok_or_else(|| SweepError::Config("hw_params has no bpred section".to_string()))
}

/// Common settings that govern `target`
pub fn settings_for<'a>(
    spec: &'a SweepSpec,
    target: SweepTarget,
) -> Result<&'a CommonSettings, SweepError> {
    match target {
        SweepTarget::Cache(cache) => spec
            .hw_params
            .cache(cache.into())
            .map(|domain| &domain.common_settings)
            .ok_or_else(|| SweepError::Config(format!("hw_params has no {} section", cache.name()))),
        SweepTarget::Predictor(_) | SweepTarget::Combined => bpred_settings(spec),
    }
}

/// Every single-predictor kind with a domain, then combined if configured
pub fn all_targets(spec: &SweepSpec) -> Vec<SweepTarget> {
    let mut targets = vec![];
    if spec.hw_params.icache.is_some() {
        targets.push(SweepTarget::Cache(CacheTarget::Icache));
    }
    if spec.hw_params.dcache.is_some() {
        targets.push(SweepTarget::Cache(CacheTarget::Dcache));
    }
    if let Some(bpred) = &spec.hw_params.bpred {
        targets.extend(bpred.kinds().into_iter().map(SweepTarget::Predictor));
        if bpred.combined.is_some() {
            targets.push(SweepTarget::Combined);
        }
    }
    targets
}

/// Unique candidate configurations of `target`, in generation order.
///
/// Combined candidates need the binned best sets of non-exhaustive slots under
/// `results_dir`; a missing one fails here, before anything is simulated.
pub fn candidates(
    spec: &SweepSpec,
    target: SweepTarget,
    results_dir: &Path,
) -> Result<Vec<Configuration>, SweepError> {
    let mut configurations = match target {
        SweepTarget::Cache(cache) => {
            let domain = spec.hw_params.cache(cache.into()).ok_or_else(|| {
                SweepError::Config(format!("hw_params has no {} section", cache.name()))
            })?;
            cache_space(cache, domain)
        }
        SweepTarget::Predictor(kind) => {
            let settings = bpred_settings(spec)?;
            let domain = spec
                .hw_params
                .bpred
                .as_ref()
                .and_then(|bpred| bpred.domain(kind))
                .ok_or_else(|| SweepError::Config(format!("hw_params.bpred has no {} section", kind)))?;
            predictor_space(kind, domain, settings.window())
        }
        SweepTarget::Combined => {
            let settings = bpred_settings(spec)?;
            let bpred = spec
                .hw_params
                .bpred
                .as_ref()
                .ok_or_else(|| SweepError::Config("hw_params has no bpred section".to_string()))?;
            let combined = bpred.combined.as_ref().ok_or_else(|| {
                SweepError::Config("hw_params.bpred has no combined section".to_string())
            })?;
            let window = settings.window();

            let mut pools = vec![];
            for (kind, exhaustive) in [
                (combined.bp1, combined.bp1_exhaustive),
                (combined.bp2, combined.bp2_exhaustive),
            ] {
                let label = SweepTarget::Predictor(kind).label();
                let prior_path = get_binned_best_path(results_dir, &label);
                let prior: Option<BinnedBest> = if exhaustive {
                    None
                } else {
                    load_json(&prior_path)?
                };
                pools.push(slot_candidates(
                    kind,
                    exhaustive,
                    bpred.domain(kind),
                    prior.as_ref(),
                    &prior_path,
                    window,
                )?);
            }
            compose(&pools[0], &pools[1], &combiner_candidates(combined), window)
                .into_iter()
                .map(Configuration::Combined)
                .collect()
        }
    };

    let mut seen = HashSet::new();
    configurations.retain(|config| seen.insert(config.clone()));
    Ok(configurations)
}

/// Run (or reload) one sweep and write its table, binned best and best files
pub fn run_sweep(ctx: &SweepContext, target: SweepTarget) -> anyhow::Result<SweepOutcome> {
    let label = target.label();
    let settings = settings_for(&ctx.spec, target)?.clone();
    let table_path = get_table_path(&ctx.results_dir, &label);

    if ctx.reuse {
        if let Some(table) = load_json::<SweepTable, _>(&table_path)? {
            println!("Reusing saved results from {}", table_path.display());
            let results = table.results();
            let binned = match load_json(get_binned_best_path(&ctx.results_dir, &label))? {
                Some(binned) => binned,
                None => bin(&results, &settings.bins()),
            };
            let best = match load_json(get_best_path(&ctx.results_dir, &label))? {
                Some(best) => best,
                None => rank(&results, settings.top_n, settings.best_threshold),
            };
            return Ok(SweepOutcome {
                target,
                table,
                binned,
                best,
                reused: true,
            });
        }
    }

    let configurations = candidates(&ctx.spec, target, &ctx.results_dir)
        .with_context(|| format!("failed to generate {} candidates", label))?;
    println!(
        "Sweeping {}: {} configurations x {} workloads",
        label,
        configurations.len(),
        ctx.catalog.len()
    );

    std::fs::create_dir_all(&ctx.results_dir)?;
    let log = SweepLog::create(get_log_path(&ctx.results_dir, &label), &label)?;
    let options = DispatchOptions {
        kind: target.kind(),
        max_workers: ctx.max_workers,
        enforce_thresholds: !ctx.ignore_thresholds
            && target != SweepTarget::Predictor(PredictorKind::Static),
        pass_marker: ctx.spec.pass_marker.clone(),
    };

    let pbar = if ctx.show_progress {
        indicatif::ProgressBar::new(configurations.len() as u64)
    } else {
        indicatif::ProgressBar::hidden()
    };
    pbar.set_style(get_tqdm_style());

    let mut results: Vec<AggregatedResult> = vec![];
    let mut rejected = 0;
    let mut failure = None;
    let units = dispatch(
        configurations,
        ctx.catalog.clone(),
        ctx.simulator.clone(),
        log.handle(),
        options,
    )?;
    for outcome in units {
        match outcome {
            Ok(outcome) => match aggregate_outcome(&outcome) {
                Some(result) => {
                    pbar.set_message(format!("{:.2}% {}", result.metric, result.configuration));
                    results.push(result);
                }
                None => rejected += 1,
            },
            Err(err) => {
                failure = Some(err);
                break;
            }
        }
        pbar.inc(1);
    }

    // units still running hold log handles; the writer exits once they are done
    log.finish()?;
    if let Some(err) = failure {
        pbar.abandon();
        return Err(anyhow::Error::new(err).context(format!("{} sweep aborted", label)));
    }
    pbar.finish();

    info!(
        "{}: {} configurations measured, {} rejected by thresholds",
        label,
        results.len(),
        rejected
    );

    let table = SweepTable::build(&results);
    let binned = bin(&results, &settings.bins());
    let best = rank(&results, settings.top_n, settings.best_threshold);

    save_json(&table_path, &table)?;
    save_json(get_binned_best_path(&ctx.results_dir, &label), &binned)?;
    save_json(get_best_path(&ctx.results_dir, &label), &best)?;
    println!("Results written to {}", ctx.results_dir.display());

    Ok(SweepOutcome {
        target,
        table,
        binned,
        best,
        reused: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::tests::{FakeSimulator, MARKER, workload};

    const SPEC: &str = r#"{
        "workloads": {},
        "hw_params": {
            "bpred": {
                "static": {},
                "bimodal": {"pc_bits": [2, 3, 4, 5, 6], "cnt_bits": [2]},
                "combined": {"bp1": "bimodal", "bp2": "static", "bp2_exhaustive": true,
                             "pc_bits": [1, 2], "cnt_bits": [2]},
                "common_settings": {"min_size": 2, "max_size": 8, "bins": [2, 4, 8], "top_n": 1, "best_threshold": 75}
            }
        }
    }"#;

    fn context(dir: &Path, simulator: FakeSimulator) -> SweepContext {
        let spec: SweepSpec = serde_json::from_str(SPEC).unwrap();
        spec.validate().unwrap();
        let workloads = ["w1", "w2"]
            .iter()
            .map(|name| workload(dir, name, Some(60.0)))
            .collect();
        SweepContext {
            spec,
            catalog: Arc::new(WorkloadCatalog::from_workloads(workloads)),
            simulator: Arc::new(simulator),
            results_dir: dir.join("results"),
            max_workers: 2,
            ignore_thresholds: false,
            reuse: false,
            show_progress: false,
        }
    }

    #[test]
    fn test_combined_requires_prior() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), FakeSimulator::new(&dir.path().join("out")));
        let err = candidates(&ctx.spec, SweepTarget::Combined, &ctx.results_dir).unwrap_err();
        assert!(matches!(err, SweepError::MissingPrior { .. }));
        // nothing was simulated
        assert!(!dir.path().join("results").exists());
    }

    #[test]
    fn test_bimodal_then_combined() {
        let dir = tempfile::tempdir().unwrap();
        let mut simulator = FakeSimulator::new(&dir.path().join("out"));
        // bimodal sizes: pc2 -> 1B (outside), pc3 -> 2B, pc4 -> 4B, pc5 -> 8B, pc6 -> 16B (outside)
        let spec: SweepSpec = serde_json::from_str(SPEC).unwrap();
        let bimodal = candidates(&spec, SweepTarget::Predictor(PredictorKind::Bimodal), Path::new("."))
            .unwrap();
        assert_eq!(bimodal.len(), 3);
        let accuracies = [(70, 80), (90, 40), (85, 95)];
        for (config, (a1, a2)) in bimodal.iter().zip(accuracies) {
            simulator.accuracy.insert((config.tag(), "w1".to_string()), a1);
            simulator.accuracy.insert((config.tag(), "w2".to_string()), a2);
        }
        let ctx = context(dir.path(), simulator);

        let outcome = run_sweep(&ctx, SweepTarget::Predictor(PredictorKind::Bimodal)).unwrap();
        // pc4 is rejected on w2 (40 < 60)
        assert_eq!(outcome.table.len(), 2);
        let binned: Vec<(u64, f64)> = outcome.binned.0.iter().map(|(k, v)| (*k, v.metric)).collect();
        assert_eq!(binned, vec![(2, 75.0), (8, 90.0)]);
        let best: Vec<f64> = outcome.best.iter().map(|r| r.metric).collect();
        assert_eq!(best, vec![75.0, 90.0]);
        assert!(get_binned_best_path(&ctx.results_dir, "bpred_bimodal").exists());
        let log = std::fs::read_to_string(get_log_path(&ctx.results_dir, "bpred_bimodal")).unwrap();
        assert!(log.contains(MARKER));

        // bimodal's binned best {2B, 8B} x static x combiners {1B, 1B}; 8B + 1B exceeds max_size
        let combined = candidates(&ctx.spec, SweepTarget::Combined, &ctx.results_dir).unwrap();
        let sizes: Vec<u64> = combined.iter().map(|c| c.size()).collect();
        assert_eq!(sizes, vec![3, 3]);
        assert!(combined.iter().all(|c| c.flags().join(" ").contains("--bp_combined_p2 static")));

        let again = run_sweep(
            &SweepContext {
                reuse: true,
                ..context(dir.path(), FakeSimulator::new(&dir.path().join("out")))
            },
            SweepTarget::Predictor(PredictorKind::Bimodal),
        )
        .unwrap();
        assert!(again.reused);
        assert_eq!(again.table, outcome.table);
        assert_eq!(again.binned, outcome.binned);
    }

    #[test]
    fn test_static_baseline_ignores_thresholds() {
        let dir = tempfile::tempdir().unwrap();
        // every run scores 50%, below the 60% thresholds
        let ctx = context(dir.path(), FakeSimulator::new(&dir.path().join("out")));
        let outcome = run_sweep(&ctx, SweepTarget::Predictor(PredictorKind::Static)).unwrap();
        assert_eq!(outcome.table.len(), 1);
        let result = outcome.binned.get(2).unwrap();
        assert_eq!(result.size, 0);
        assert_eq!(result.metric, 50.0);
    }

    #[test]
    fn test_fatal_failure_is_logged_before_returning() {
        let dir = tempfile::tempdir().unwrap();
        let spec: SweepSpec = serde_json::from_str(SPEC).unwrap();
        let bimodal = candidates(&spec, SweepTarget::Predictor(PredictorKind::Bimodal), Path::new("."))
            .unwrap();
        let mut simulator = FakeSimulator::new(&dir.path().join("out"));
        simulator.fail_tag = Some(bimodal[1].tag());
        let ctx = context(dir.path(), simulator);

        let err = run_sweep(&ctx, SweepTarget::Predictor(PredictorKind::Bimodal)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SweepError>(),
            Some(SweepError::SimulatorFailed { .. })
        ));

        let log = std::fs::read_to_string(get_log_path(&ctx.results_dir, "bpred_bimodal")).unwrap();
        let failing = format!("{} |", bimodal[1]);
        let block = log.split("---- ").find(|b| b.starts_with(&failing)).unwrap();
        assert!(block.contains("illegal instruction"));
        assert!(!get_table_path(&ctx.results_dir, "bpred_bimodal").exists());
    }

    #[test]
    fn test_all_targets_order() {
        let spec: SweepSpec = serde_json::from_str(SPEC).unwrap();
        assert_eq!(
            all_targets(&spec),
            vec![
                SweepTarget::Predictor(PredictorKind::Static),
                SweepTarget::Predictor(PredictorKind::Bimodal),
                SweepTarget::Combined
            ]
        );
    }
}
