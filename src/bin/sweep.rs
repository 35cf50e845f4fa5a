//! Sweep cache and branch predictor configurations through the simulator
use anyhow::{Context, bail};
use clap::{Parser, Subcommand, ValueEnum};
use hwsweep::{
    CacheTarget, ExternalSimulator, PredictorKind, SweepContext, SweepSpec, SweepTarget,
    WorkloadCatalog, all_targets, ask_for_sweep_name, candidates, default_workers,
    get_results_dir, get_sweep_path, run_sweep,
};
use log::info;
use std::{path::PathBuf, sync::Arc};

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Sweep name under sweeps/, chosen interactively when omitted
    #[arg(short, long)]
    sweep_name: Option<String>,

    /// Simulator executable, overrides the one in sweep.json
    #[arg(long)]
    simulator: Option<PathBuf>,

    /// Maximum number of concurrent simulations
    #[arg(short, long, default_value_t = default_workers())]
    workers: usize,

    /// Keep every configuration regardless of per-workload thresholds
    #[arg(long)]
    no_thresholds: bool,

    /// Load saved tables instead of simulating again
    #[arg(long)]
    reuse: bool,

    /// Only count candidates, do not simulate
    #[arg(long)]
    dry_run: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, ValueEnum)]
enum Cache {
    Icache,
    Dcache,
}

#[derive(Copy, Clone, ValueEnum)]
enum Kind {
    Static,
    Bimodal,
    Global,
    Gshare,
    Gselect,
    Local,
}

#[derive(Subcommand)]
enum Commands {
    /// Sweep cache geometry and replacement policy
    Cache {
        #[arg(short, long)]
        target: Cache,
    },
    /// Sweep single branch predictors, every configured kind by default
    Bpred {
        #[arg(short, long)]
        kind: Option<Kind>,
    },
    /// Sweep combined predictors built from saved best sets
    Combined,
    /// Every configured sweep, single predictors before combined
    All,
}

impl From<Cache> for CacheTarget {
    fn from(cache: Cache) -> Self {
        match cache {
            Cache::Icache => CacheTarget::Icache,
            Cache::Dcache => CacheTarget::Dcache,
        }
    }
}

impl From<Kind> for PredictorKind {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Static => PredictorKind::Static,
            Kind::Bimodal => PredictorKind::Bimodal,
            Kind::Global => PredictorKind::Global,
            Kind::Gshare => PredictorKind::Gshare,
            Kind::Gselect => PredictorKind::Gselect,
            Kind::Local => PredictorKind::Local,
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Cli::parse();

    let sweep_name = match args.sweep_name {
        Some(name) => name,
        None => ask_for_sweep_name()?,
    };
    let spec_path = get_sweep_path(&sweep_name);
    let spec = SweepSpec::load(&spec_path)
        .with_context(|| format!("failed to load {}", spec_path.display()))?;
    let results_dir = get_results_dir(&sweep_name);

    let targets = match args.command {
        Commands::Cache { target } => vec![SweepTarget::Cache(target.into())],
        Commands::Bpred { kind: Some(kind) } => vec![SweepTarget::Predictor(kind.into())],
        Commands::Bpred { kind: None } => all_targets(&spec)
            .into_iter()
            .filter(|target| matches!(target, SweepTarget::Predictor(_)))
            .collect(),
        Commands::Combined => vec![SweepTarget::Combined],
        Commands::All => all_targets(&spec),
    };
    if targets.is_empty() {
        bail!("{} configures nothing to sweep here", spec_path.display());
    }

    if args.dry_run {
        for target in targets {
            match candidates(&spec, target, &results_dir) {
                Ok(configurations) => {
                    let sizes = configurations.iter().map(|config| config.size());
                    match (sizes.clone().min(), sizes.max()) {
                        (Some(min), Some(max)) => println!(
                            "{}: {} configurations, {} to {} bytes",
                            target,
                            configurations.len(),
                            min,
                            max
                        ),
                        _ => println!("{}: no configurations", target),
                    }
                }
                Err(err) => println!("{}: {}", target, err),
            }
        }
        return Ok(());
    }

    let Some(executable) = args.simulator.or_else(|| spec.simulator.clone()) else {
        bail!("No simulator given on the command line or in {}", spec_path.display());
    };
    let catalog = WorkloadCatalog::load(&spec.workload_dir, &spec.workloads)?;
    info!(
        "Loaded {} workloads from {}",
        catalog.len(),
        spec.workload_dir.display()
    );

    let ctx = SweepContext {
        simulator: Arc::new(ExternalSimulator::new(&executable, &spec.out_dir)),
        spec,
        catalog: Arc::new(catalog),
        results_dir,
        max_workers: args.workers,
        ignore_thresholds: args.no_thresholds,
        reuse: args.reuse,
        show_progress: true,
    };

    for target in targets {
        let outcome = run_sweep(&ctx, target)?;
        println!(
            "{}: {} results, {} size bins, {} in best set",
            target,
            outcome.table.len(),
            outcome.binned.len(),
            outcome.best.len()
        );
    }

    Ok(())
}
