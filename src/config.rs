use crate::{
    FoldPc, PredictorKind, ReplacementPolicy, SweepError, SweepKind, Tunable, TunableValue,
    WorkloadSpec,
};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

/// Printed by the simulator when the workload exits cleanly
pub const DEFAULT_PASS_MARKER: &str = "a0 0x0000000000000000";

/// Largest power-of-two bin a u64 size can hold
const MAX_DEFAULT_BIN: u64 = 1 << 63;

fn default_workload_dir() -> PathBuf {
    PathBuf::from("workloads")
}

fn default_out_dir() -> PathBuf {
    PathBuf::from("out")
}

fn default_pass_marker() -> String {
    DEFAULT_PASS_MARKER.to_string()
}

fn default_line_bytes() -> u32 {
    32
}

fn default_top_n() -> usize {
    10
}

fn default_best_threshold() -> f64 {
    95.0
}

/// Inclusive byte-size bound applied before simulation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeWindow {
    pub min: u64,
    pub max: u64,
}

impl SizeWindow {
    pub fn new(min: u64, max: u64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, size: u64) -> bool {
        self.min <= size && size <= self.max
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommonSettings {
    pub min_size: u64,
    pub max_size: u64,
    /// Explicit ascending bin upper bounds, powers of two when absent
    #[serde(default)]
    pub bins: Option<Vec<u64>>,
    #[serde(default = "default_line_bytes")]
    pub line_bytes: u32,
    /// How many configurations the ranked best set keeps regardless of threshold
    #[serde(default = "default_top_n")]
    pub top_n: usize,
    /// Every configuration at or above this metric joins the ranked best set
    #[serde(default = "default_best_threshold")]
    pub best_threshold: f64,
}

impl CommonSettings {
    pub fn window(&self) -> SizeWindow {
        SizeWindow::new(self.min_size, self.max_size)
    }

    pub fn bins(&self) -> Vec<u64> {
        match &self.bins {
            Some(bins) => bins.clone(),
            None => {
                let mut bins = vec![];
                let Some(mut bin) = self.min_size.max(1).checked_next_power_of_two() else {
                    return bins;
                };
                loop {
                    bins.push(bin);
                    if bin >= self.max_size {
                        break;
                    }
                    match bin.checked_mul(2) {
                        Some(next) => bin = next,
                        None => break,
                    }
                }
                bins
            }
        }
    }

    fn validate(&self, section: &str) -> Result<(), SweepError> {
        if self.min_size > self.max_size {
            return Err(SweepError::Config(format!(
                "{}: min_size {} exceeds max_size {}",
                section, self.min_size, self.max_size
            )));
        }
        if self.bins.is_none() && self.max_size > MAX_DEFAULT_BIN {
            return Err(SweepError::Config(format!(
                "{}: max_size {} is above {} and needs explicit bins",
                section, self.max_size, MAX_DEFAULT_BIN
            )));
        }
        if let Some(bins) = &self.bins {
            if bins.is_empty() || bins.windows(2).any(|w| w[0] >= w[1]) {
                return Err(SweepError::Config(format!(
                    "{}: bins must be non-empty and strictly ascending",
                    section
                )));
            }
        }
        if self.line_bytes == 0 {
            return Err(SweepError::Config(format!("{}: line_bytes is zero", section)));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheDomain {
    pub sets: Vec<u32>,
    pub ways: Vec<u32>,
    pub policy: Vec<ReplacementPolicy>,
    pub common_settings: CommonSettings,
}

/// Enumerated values per predictor tunable; kinds only read the ones they use
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PredictorDomain {
    #[serde(default)]
    pub pc_bits: Vec<u32>,
    #[serde(default)]
    pub gr_bits: Vec<u32>,
    #[serde(default)]
    pub lr_bits: Vec<u32>,
    #[serde(default)]
    pub cnt_bits: Vec<u32>,
    #[serde(default)]
    pub fold_pc: Vec<FoldPc>,
}

impl PredictorDomain {
    pub fn values(&self, tunable: Tunable) -> Vec<TunableValue> {
        let bits = |values: &[u32]| -> Vec<TunableValue> {
            values.iter().copied().map(TunableValue::Bits).collect()
        };
        match tunable {
            Tunable::PcBits => bits(&self.pc_bits),
            Tunable::GrBits => bits(&self.gr_bits),
            Tunable::LrBits => bits(&self.lr_bits),
            Tunable::CntBits => bits(&self.cnt_bits),
            Tunable::FoldPc => self.fold_pc.iter().copied().map(TunableValue::Fold).collect(),
        }
    }

    fn validate(&self, kind: PredictorKind) -> Result<(), SweepError> {
        let used = kind.tunables();
        for tunable in [
            Tunable::PcBits,
            Tunable::GrBits,
            Tunable::LrBits,
            Tunable::CntBits,
            Tunable::FoldPc,
        ] {
            let empty = self.values(tunable).is_empty();
            if used.contains(&tunable) && empty {
                return Err(SweepError::Config(format!(
                    "bpred.{}: no values for {}",
                    kind,
                    tunable.name()
                )));
            }
            if !used.contains(&tunable) && !empty {
                warn!(
                    "bpred.{}: {} is not used by this predictor and is ignored",
                    kind,
                    tunable.name()
                );
            }
        }
        Ok(())
    }
}

/// Combined predictor: two slots plus the combiner's own tunables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CombinedDomain {
    pub bp1: PredictorKind,
    /// Regenerate slot 1 from its own domain instead of reusing its saved best set
    #[serde(default)]
    pub bp1_exhaustive: bool,
    pub bp2: PredictorKind,
    #[serde(default)]
    pub bp2_exhaustive: bool,
    pub pc_bits: Vec<u32>,
    pub cnt_bits: Vec<u32>,
    #[serde(default = "default_fold")]
    pub fold_pc: Vec<FoldPc>,
}

fn default_fold() -> Vec<FoldPc> {
    vec![FoldPc::None]
}

impl CombinedDomain {
    pub fn combiner(&self) -> PredictorDomain {
        PredictorDomain {
            pc_bits: self.pc_bits.clone(),
            cnt_bits: self.cnt_bits.clone(),
            fold_pc: self.fold_pc.clone(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BpredParams {
    #[serde(rename = "static")]
    pub static_predictor: Option<PredictorDomain>,
    pub bimodal: Option<PredictorDomain>,
    pub global: Option<PredictorDomain>,
    pub gshare: Option<PredictorDomain>,
    pub gselect: Option<PredictorDomain>,
    pub local: Option<PredictorDomain>,
    pub combined: Option<CombinedDomain>,
    pub common_settings: CommonSettings,
}

impl BpredParams {
    /// Domain of a single (non-combined) predictor kind, if it is swept
    pub fn domain(&self, kind: PredictorKind) -> Option<&PredictorDomain> {
        match kind {
            PredictorKind::Static => self.static_predictor.as_ref(),
            PredictorKind::Bimodal => self.bimodal.as_ref(),
            PredictorKind::Global => self.global.as_ref(),
            PredictorKind::Gshare => self.gshare.as_ref(),
            PredictorKind::Gselect => self.gselect.as_ref(),
            PredictorKind::Local => self.local.as_ref(),
            PredictorKind::Combined => None,
        }
    }

    /// Every single-predictor kind with a domain, in declaration order
    pub fn kinds(&self) -> Vec<PredictorKind> {
        PredictorKind::SINGLE
            .into_iter()
            .filter(|kind| self.domain(*kind).is_some())
            .collect()
    }

    fn validate(&self) -> Result<(), SweepError> {
        self.common_settings.validate("bpred")?;
        for kind in self.kinds() {
            if let Some(domain) = self.domain(kind) {
                domain.validate(kind)?;
            }
        }
        if let Some(combined) = &self.combined {
            for slot in [combined.bp1, combined.bp2] {
                if slot == PredictorKind::Combined {
                    return Err(SweepError::Config(
                        "bpred.combined: a slot cannot itself be combined".to_string(),
                    ));
                }
            }
            combined.combiner().validate(PredictorKind::Combined)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HwParams {
    pub icache: Option<CacheDomain>,
    pub dcache: Option<CacheDomain>,
    pub bpred: Option<BpredParams>,
}

impl HwParams {
    pub fn cache(&self, kind: SweepKind) -> Option<&CacheDomain> {
        match kind {
            SweepKind::Icache => self.icache.as_ref(),
            SweepKind::Dcache => self.dcache.as_ref(),
            SweepKind::Bpred => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SweepSpec {
    /// Simulator executable, the CLI may override it
    #[serde(default)]
    pub simulator: Option<PathBuf>,
    #[serde(default = "default_workload_dir")]
    pub workload_dir: PathBuf,
    #[serde(default = "default_pass_marker")]
    pub pass_marker: String,
    /// Default simulator output directory, tagged runs append `_<tag>`
    #[serde(default = "default_out_dir")]
    pub out_dir: PathBuf,
    pub workloads: BTreeMap<String, WorkloadSpec>,
    pub hw_params: HwParams,
}

impl SweepSpec {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<SweepSpec, SweepError> {
        let path = path.as_ref();
        let content = std::fs::read(path).map_err(|err| {
            SweepError::Config(format!("cannot read sweep parameters {}: {}", path.display(), err))
        })?;
        let spec: SweepSpec = serde_json::from_slice(&content)?;
        spec.validate()?;
        Ok(spec)
    }

    pub fn validate(&self) -> Result<(), SweepError> {
        if self.pass_marker.is_empty() {
            return Err(SweepError::Config("pass_marker is empty".to_string()));
        }
        for (name, domain) in [("icache", &self.hw_params.icache), ("dcache", &self.hw_params.dcache)] {
            if let Some(domain) = domain {
                domain.common_settings.validate(name)?;
            }
        }
        if let Some(bpred) = &self.hw_params.bpred {
            bpred.validate()?;
        }
        Ok(())
    }
}
