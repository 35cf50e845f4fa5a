use crate::{SweepError, SweepKind};
use log::debug;
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, HashSet},
    path::{Path, PathBuf},
};

/// Minimum acceptable hit rate / accuracy (%) per sweep kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Thresholds {
    pub icache: Option<f64>,
    pub dcache: Option<f64>,
    pub bpred: Option<f64>,
}

impl Thresholds {
    pub fn get(&self, kind: SweepKind) -> Option<f64> {
        match kind {
            SweepKind::Icache => self.icache,
            SweepKind::Dcache => self.dcache,
            SweepKind::Bpred => self.bpred,
        }
    }
}

/// One entry of the `workloads` section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkloadSpec {
    /// Build flavors, each one a separate binary `<name>_<flavor>.elf`
    #[serde(default)]
    pub flavors: Vec<String>,
    #[serde(default)]
    pub thresholds: Thresholds,
    /// Extra simulator arguments passed after the configuration flags
    #[serde(default)]
    pub args: String,
    #[serde(default)]
    pub skip: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Workload {
    pub name: String,
    pub binary_path: PathBuf,
    pub args: Vec<String>,
    pub thresholds: Thresholds,
}

impl Workload {
    pub fn threshold(&self, kind: SweepKind) -> Option<f64> {
        self.thresholds.get(kind)
    }
}

/// Immutable, ordered list of workloads used by one sweep invocation
#[derive(Debug, Clone, Default)]
pub struct WorkloadCatalog {
    workloads: Vec<Workload>,
}

impl WorkloadCatalog {
    /// Resolve every non-skipped (workload, flavor) pair to a binary under `dir`.
    ///
    /// Missing binaries are reported before anything is simulated.
    pub fn load(
        dir: &Path,
        specs: &BTreeMap<String, WorkloadSpec>,
    ) -> Result<WorkloadCatalog, SweepError> {
        let mut workloads = vec![];
        let mut seen = HashSet::new();
        for (name, spec) in specs {
            if spec.skip {
                debug!("Skipping workload {}", name);
                continue;
            }

            let file_names = if spec.flavors.is_empty() {
                vec![format!("{}.elf", name)]
            } else {
                spec.flavors
                    .iter()
                    .map(|flavor| format!("{}_{}.elf", name, flavor))
                    .collect()
            };

            for file_name in file_names {
                let binary_path = dir.join(file_name);
                if !binary_path.is_file() {
                    return Err(SweepError::MissingBinary(binary_path));
                }
                if !seen.insert(binary_path.clone()) {
                    return Err(SweepError::Config(format!(
                        "workload binary {} listed twice",
                        binary_path.display()
                    )));
                }
                workloads.push(Workload {
                    name: name.clone(),
                    binary_path,
                    args: spec.args.split_whitespace().map(str::to_string).collect(),
                    thresholds: spec.thresholds,
                });
            }
        }

        if workloads.is_empty() {
            return Err(SweepError::Config(
                "no workloads left after applying skip flags".to_string(),
            ));
        }
        Ok(WorkloadCatalog { workloads })
    }

    pub fn from_workloads(workloads: Vec<Workload>) -> WorkloadCatalog {
        WorkloadCatalog { workloads }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Workload> {
        self.workloads.iter()
    }

    pub fn len(&self) -> usize {
        self.workloads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workloads.is_empty()
    }
}

impl<'a> IntoIterator for &'a WorkloadCatalog {
    type Item = &'a Workload;
    type IntoIter = std::slice::Iter<'a, Workload>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
