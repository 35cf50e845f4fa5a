use crate::{Configuration, SweepError, SweepKind, Workload};
use serde::{Deserialize, Serialize};
use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    process::Command,
};

pub const STATS_FILE: &str = "hw_stats.json";

/// One (configuration, workload) simulation request
#[derive(Debug, Clone, Copy)]
pub struct Invocation<'a> {
    pub workload: &'a Workload,
    pub configuration: &'a Configuration,
    /// Output directory disambiguator for concurrent runs
    pub tag: Option<&'a str>,
}

impl Invocation<'_> {
    /// `<workload> <config flags> [--out_dir_tag <tag>] <workload args>`
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![self.workload.binary_path.display().to_string()];
        args.extend(self.configuration.flags());
        if let Some(tag) = self.tag {
            args.push("--out_dir_tag".to_string());
            args.push(tag.to_string());
        }
        args.extend(self.workload.args.iter().cloned());
        args
    }
}

#[derive(Debug, Clone, Default)]
pub struct SimulatorOutput {
    /// Command line as it would be typed in a shell, for the log and diagnostics
    pub command: String,
    pub stdout: String,
    pub stderr: String,
}

pub trait Simulator: Send + Sync {
    /// Run one simulation to completion and capture its console output
    fn run(&self, invocation: &Invocation<'_>) -> Result<SimulatorOutput, SweepError>;

    /// Directory the simulator writes its artifacts to for `tag`
    fn out_dir(&self, tag: Option<&str>) -> PathBuf;
}

/// Simulator executable spawned once per run
#[derive(Debug, Clone)]
pub struct ExternalSimulator {
    pub executable: PathBuf,
    pub out_dir: PathBuf,
}

impl ExternalSimulator {
    pub fn new<P1: AsRef<Path>, P2: AsRef<Path>>(executable: P1, out_dir: P2) -> Self {
        Self {
            executable: executable.as_ref().to_path_buf(),
            out_dir: out_dir.as_ref().to_path_buf(),
        }
    }
}

/// `<base>` untagged, `<base>_<tag>` tagged
pub fn tagged_out_dir(base: &Path, tag: Option<&str>) -> PathBuf {
    match tag {
        Some(tag) => {
            let mut name: OsString = base.as_os_str().to_owned();
            name.push("_");
            name.push(tag);
            PathBuf::from(name)
        }
        None => base.to_path_buf(),
    }
}

impl Simulator for ExternalSimulator {
    fn run(&self, invocation: &Invocation<'_>) -> Result<SimulatorOutput, SweepError> {
        let args = invocation.args();
        let command = format!("{} {}", self.executable.display(), args.join(" "));
        let output = Command::new(&self.executable).args(&args).output()?;
        Ok(SimulatorOutput {
            command,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    fn out_dir(&self, tag: Option<&str>) -> PathBuf {
        tagged_out_dir(&self.out_dir, tag)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadWrite {
    pub reads: u64,
    pub writes: u64,
}

/// Core-side and memory-side traffic of one cache
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Traffic {
    pub core: ReadWrite,
    pub mem: ReadWrite,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheStats {
    pub size: u64,
    pub hits: u64,
    pub references: u64,
    #[serde(default)]
    pub ct_core: Option<ReadWrite>,
    #[serde(default)]
    pub ct_mem: Option<ReadWrite>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BpredStats {
    pub size: u64,
    pub predicted: u64,
    pub branches: u64,
}

/// Parsed hw_stats.json; sections not swept may be absent
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HwStats {
    #[serde(default)]
    pub icache: Option<CacheStats>,
    #[serde(default)]
    pub dcache: Option<CacheStats>,
    #[serde(default)]
    pub bpred: Option<BpredStats>,
}

impl HwStats {
    pub fn load(out_dir: &Path) -> Result<HwStats, SweepError> {
        if !out_dir.is_dir() {
            return Err(SweepError::MissingArtifact {
                path: out_dir.to_path_buf(),
                reason: "output directory does not exist".to_string(),
            });
        }
        let path = out_dir.join(STATS_FILE);
        let content = std::fs::read(&path).map_err(|err| SweepError::MissingArtifact {
            path: path.clone(),
            reason: err.to_string(),
        })?;
        serde_json::from_slice(&content).map_err(|err| SweepError::MissingArtifact {
            path,
            reason: err.to_string(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Counters {
    Cache {
        hits: u64,
        misses: u64,
        references: u64,
    },
    Predictor {
        predicted: u64,
        mispredicted: u64,
        branches: u64,
    },
}

/// Measurement of one configuration on one workload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub configuration: Configuration,
    pub workload: PathBuf,
    /// hit rate or accuracy in percent
    pub metric: f64,
    /// storage size as reported by the simulator
    pub size: u64,
    pub counters: Counters,
    pub traffic: Option<Traffic>,
}

impl RunResult {
    /// Extract the counters relevant to `kind`. Zero references or branches means
    /// the workload never exercised the structure, which is treated as broken.
    pub fn from_stats(
        configuration: &Configuration,
        workload: &Path,
        kind: SweepKind,
        stats: &HwStats,
        stats_path: &Path,
    ) -> Result<RunResult, SweepError> {
        let missing = || SweepError::MissingArtifact {
            path: stats_path.to_path_buf(),
            reason: format!("no {} section", kind),
        };
        let empty = |counter| SweepError::EmptyWorkload {
            config: configuration.to_string(),
            workload: workload.to_path_buf(),
            counter,
        };

        match kind {
            SweepKind::Icache | SweepKind::Dcache => {
                let section = if kind == SweepKind::Icache {
                    stats.icache.as_ref()
                } else {
                    stats.dcache.as_ref()
                };
                let cache = section.ok_or_else(missing)?;
                if cache.references == 0 {
                    return Err(empty("references"));
                }
                let traffic = match (cache.ct_core, cache.ct_mem) {
                    (Some(core), Some(mem)) => Some(Traffic { core, mem }),
                    _ => None,
                };
                Ok(RunResult {
                    configuration: configuration.clone(),
                    workload: workload.to_path_buf(),
                    metric: cache.hits as f64 * 100.0 / cache.references as f64,
                    size: cache.size,
                    counters: Counters::Cache {
                        hits: cache.hits,
                        misses: cache.references.saturating_sub(cache.hits),
                        references: cache.references,
                    },
                    traffic,
                })
            }
            SweepKind::Bpred => {
                let bpred = stats.bpred.as_ref().ok_or_else(missing)?;
                if bpred.branches == 0 {
                    return Err(empty("branches"));
                }
                Ok(RunResult {
                    configuration: configuration.clone(),
                    workload: workload.to_path_buf(),
                    metric: bpred.predicted as f64 * 100.0 / bpred.branches as f64,
                    size: bpred.size,
                    counters: Counters::Predictor {
                        predicted: bpred.predicted,
                        mispredicted: bpred.branches.saturating_sub(bpred.predicted),
                        branches: bpred.branches,
                    },
                    traffic: None,
                })
            }
        }
    }
}
