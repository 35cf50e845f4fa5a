use crate::{
    Configuration, HwStats, Invocation, RunResult, STATS_FILE, Simulator, SweepError, SweepKind,
    SweepLogHandle, WorkloadCatalog, effective_workers,
};
use log::{debug, info};
use std::{
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
        mpsc::{Receiver, channel},
    },
};

#[derive(Debug, Clone)]
pub struct DispatchOptions {
    pub kind: SweepKind,
    /// Requested pool size, capped by host parallelism
    pub max_workers: usize,
    /// Stop a configuration at its first workload below threshold
    pub enforce_thresholds: bool,
    /// Substring of simulator stdout that marks a clean run
    pub pass_marker: String,
}

/// Result of running one configuration over the catalog
#[derive(Debug, Clone, PartialEq)]
pub enum UnitOutcome {
    /// Every workload was measured, in catalog order
    Measured {
        configuration: Configuration,
        runs: Vec<RunResult>,
    },
    /// A workload fell below its threshold; earlier runs were discarded
    Rejected {
        configuration: Configuration,
        workload: PathBuf,
        metric: f64,
        threshold: f64,
    },
}

impl UnitOutcome {
    pub fn configuration(&self) -> &Configuration {
        match self {
            UnitOutcome::Measured { configuration, .. } => configuration,
            UnitOutcome::Rejected { configuration, .. } => configuration,
        }
    }
}

struct Worker {
    catalog: Arc<WorkloadCatalog>,
    simulator: Arc<dyn Simulator>,
    log: SweepLogHandle,
    options: DispatchOptions,
    tag_outputs: bool,
}

impl Worker {
    fn run_unit(&self, configuration: Configuration) -> Result<UnitOutcome, SweepError> {
        let tag = self.tag_outputs.then(|| configuration.tag());
        let mut runs = Vec::with_capacity(self.catalog.len());

        for workload in self.catalog.iter() {
            let invocation = Invocation {
                workload,
                configuration: &configuration,
                tag: tag.as_deref(),
            };
            let output = self.simulator.run(&invocation)?;
            self.log.append(format!(
                "---- {} | {}\n$ {}\n{}",
                configuration,
                workload.binary_path.display(),
                output.command,
                output.stdout
            ));

            if !output.stdout.contains(&self.options.pass_marker) {
                return Err(SweepError::SimulatorFailed {
                    config: configuration.to_string(),
                    workload: workload.binary_path.clone(),
                    command: output.command,
                    stdout: output.stdout,
                    stderr: output.stderr,
                });
            }

            let out_dir = self.simulator.out_dir(tag.as_deref());
            let stats = HwStats::load(&out_dir)?;
            let run = RunResult::from_stats(
                &configuration,
                &workload.binary_path,
                self.options.kind,
                &stats,
                &out_dir.join(STATS_FILE),
            )?;
            std::fs::remove_dir_all(&out_dir)?;

            if self.options.enforce_thresholds {
                if let Some(threshold) = workload.threshold(self.options.kind) {
                    if run.metric < threshold {
                        debug!(
                            "{} rejected: {:.2}% on {} is below {:.2}%",
                            configuration,
                            run.metric,
                            workload.binary_path.display(),
                            threshold
                        );
                        return Ok(UnitOutcome::Rejected {
                            workload: workload.binary_path.clone(),
                            metric: run.metric,
                            threshold,
                            configuration,
                        });
                    }
                }
            }
            runs.push(run);
        }

        Ok(UnitOutcome::Measured {
            configuration,
            runs,
        })
    }
}

/// Outcomes in completion order.
///
/// The first error stops queued units from starting; units already running
/// finish but their outcomes are no longer waited for.
pub struct Dispatch {
    receiver: Receiver<Result<UnitOutcome, SweepError>>,
    remaining: usize,
    abort: Arc<AtomicBool>,
    workers: usize,
    _pool: rayon::ThreadPool,
}

impl Dispatch {
    pub fn len(&self) -> usize {
        self.remaining
    }

    pub fn is_empty(&self) -> bool {
        self.remaining == 0
    }

    pub fn workers(&self) -> usize {
        self.workers
    }
}

impl Iterator for Dispatch {
    type Item = Result<UnitOutcome, SweepError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        match self.receiver.recv() {
            Ok(outcome) => {
                self.remaining -= 1;
                if outcome.is_err() {
                    self.abort.store(true, Ordering::SeqCst);
                    self.remaining = 0;
                }
                Some(outcome)
            }
            // all senders gone: every remaining unit was skipped after an abort
            Err(_) => {
                self.remaining = 0;
                None
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining))
    }
}

impl Drop for Dispatch {
    fn drop(&mut self) {
        self.abort.store(true, Ordering::SeqCst);
    }
}

/// Submit every configuration to a pool of `options.max_workers` threads.
///
/// Configurations must be unique: their output-directory tags are derived from
/// their tunables, and tags are only used when more than one worker runs.
pub fn dispatch(
    configurations: Vec<Configuration>,
    catalog: Arc<WorkloadCatalog>,
    simulator: Arc<dyn Simulator>,
    log: SweepLogHandle,
    options: DispatchOptions,
) -> Result<Dispatch, SweepError> {
    let workers = effective_workers(options.max_workers);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|index| format!("sweep-worker-{}", index))
        .build()?;
    info!(
        "Dispatching {} configurations x {} workloads on {} workers",
        configurations.len(),
        catalog.len(),
        workers
    );

    let worker = Arc::new(Worker {
        catalog,
        simulator,
        log,
        options,
        tag_outputs: workers > 1,
    });
    let abort = Arc::new(AtomicBool::new(false));
    let (sender, receiver) = channel();
    let remaining = configurations.len();

    for configuration in configurations {
        let worker = worker.clone();
        let abort = abort.clone();
        let sender = sender.clone();
        pool.spawn(move || {
            if abort.load(Ordering::SeqCst) {
                return;
            }
            let outcome = worker.run_unit(configuration);
            if outcome.is_err() {
                abort.store(true, Ordering::SeqCst);
            }
            // receiver may already be gone after an abort
            let _ = sender.send(outcome);
        });
    }

    Ok(Dispatch {
        receiver,
        remaining,
        abort,
        workers,
        _pool: pool,
    })
}
