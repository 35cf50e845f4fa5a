use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};

/// What a sweep measures, also the section name in hw_stats.json
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SweepKind {
    Icache,
    Dcache,
    Bpred,
}

impl SweepKind {
    pub fn name(&self) -> &'static str {
        match self {
            SweepKind::Icache => "icache",
            SweepKind::Dcache => "dcache",
            SweepKind::Bpred => "bpred",
        }
    }
}

impl fmt::Display for SweepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheTarget {
    Icache,
    Dcache,
}

impl CacheTarget {
    pub fn name(&self) -> &'static str {
        match self {
            CacheTarget::Icache => "icache",
            CacheTarget::Dcache => "dcache",
        }
    }
}

impl From<CacheTarget> for SweepKind {
    fn from(target: CacheTarget) -> Self {
        match target {
            CacheTarget::Icache => SweepKind::Icache,
            CacheTarget::Dcache => SweepKind::Dcache,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplacementPolicy {
    Lru,
    Fifo,
    Random,
}

impl ReplacementPolicy {
    pub fn name(&self) -> &'static str {
        match self {
            ReplacementPolicy::Lru => "lru",
            ReplacementPolicy::Fifo => "fifo",
            ReplacementPolicy::Random => "random",
        }
    }
}

/// Direction predictor families understood by the simulator
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictorKind {
    Static,
    Bimodal,
    Global,
    Gshare,
    Gselect,
    Local,
    Combined,
}

impl PredictorKind {
    pub const SINGLE: [PredictorKind; 6] = [
        PredictorKind::Static,
        PredictorKind::Bimodal,
        PredictorKind::Global,
        PredictorKind::Gshare,
        PredictorKind::Gselect,
        PredictorKind::Local,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            PredictorKind::Static => "static",
            PredictorKind::Bimodal => "bimodal",
            PredictorKind::Global => "global",
            PredictorKind::Gshare => "gshare",
            PredictorKind::Gselect => "gselect",
            PredictorKind::Local => "local",
            PredictorKind::Combined => "combined",
        }
    }

    /// Tunables this kind is swept over, in simulator flag order.
    /// For `Combined` these are the combiner's own tunables.
    pub fn tunables(&self) -> &'static [Tunable] {
        use Tunable::*;
        match self {
            PredictorKind::Static => &[],
            PredictorKind::Bimodal => &[PcBits, CntBits],
            PredictorKind::Global => &[GrBits, CntBits],
            PredictorKind::Gshare | PredictorKind::Gselect => &[PcBits, GrBits, CntBits, FoldPc],
            PredictorKind::Local => &[PcBits, LrBits, CntBits, FoldPc],
            PredictorKind::Combined => &[PcBits, CntBits, FoldPc],
        }
    }
}

impl fmt::Display for PredictorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tunable {
    /// PC bits used to index the table
    PcBits,
    /// global history register length
    GrBits,
    /// per-branch local history length
    LrBits,
    /// saturating counter width
    CntBits,
    /// how PC bits above the index are folded in
    FoldPc,
}

impl Tunable {
    pub fn name(&self) -> &'static str {
        match self {
            Tunable::PcBits => "pc_bits",
            Tunable::GrBits => "gr_bits",
            Tunable::LrBits => "lr_bits",
            Tunable::CntBits => "cnt_bits",
            Tunable::FoldPc => "fold_pc",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FoldPc {
    None,
    Xor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TunableValue {
    Bits(u32),
    Fold(FoldPc),
}

impl fmt::Display for TunableValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TunableValue::Bits(bits) => write!(f, "{}", bits),
            TunableValue::Fold(FoldPc::None) => f.write_str("none"),
            TunableValue::Fold(FoldPc::Xor) => f.write_str("xor"),
        }
    }
}

/// Ordered tunable assignment of one predictor (or of a combiner)
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PredictorParams(BTreeMap<Tunable, TunableValue>);

impl PredictorParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, tunable: Tunable, value: TunableValue) -> Self {
        self.0.insert(tunable, value);
        self
    }

    pub fn insert(&mut self, tunable: Tunable, value: TunableValue) {
        self.0.insert(tunable, value);
    }

    pub fn get(&self, tunable: Tunable) -> Option<TunableValue> {
        self.0.get(&tunable).copied()
    }

    /// Width of a bit-count tunable, zero when absent
    pub fn bits(&self, tunable: Tunable) -> u32 {
        match self.0.get(&tunable) {
            Some(TunableValue::Bits(bits)) => *bits,
            _ => 0,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Tunable, TunableValue)> + '_ {
        self.0.iter().map(|(k, v)| (*k, *v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn flags(&self, prefix: &str) -> Vec<String> {
        let mut flags = vec![];
        for (tunable, value) in self.iter() {
            flags.push(format!("--{}_{}", prefix, tunable.name()));
            flags.push(value.to_string());
        }
        flags
    }

    fn values(&self) -> Vec<String> {
        self.iter().map(|(_, value)| value.to_string()).collect()
    }
}

impl fmt::Display for PredictorParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .iter()
            .map(|(tunable, value)| format!("{}={}", tunable.name(), value))
            .collect();
        f.write_str(&parts.join(" "))
    }
}

fn entries(index_bits: u32) -> u64 {
    1u64.checked_shl(index_bits).unwrap_or(u64::MAX)
}

fn bits_to_bytes(bits: u64) -> u64 {
    bits.div_ceil(8)
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CacheConfig {
    pub target: CacheTarget,
    pub sets: u32,
    pub ways: u32,
    pub policy: ReplacementPolicy,
    /// line size is fixed per sweep, only kept here so size() stays a pure function
    pub line_bytes: u32,
}

impl CacheConfig {
    pub fn size(&self) -> u64 {
        (self.sets as u64)
            .saturating_mul(self.ways as u64)
            .saturating_mul(self.line_bytes as u64)
    }

    pub fn flags(&self) -> Vec<String> {
        let name = self.target.name();
        vec![
            format!("--{}_sets", name),
            self.sets.to_string(),
            format!("--{}_ways", name),
            self.ways.to_string(),
            format!("--{}_policy", name),
            self.policy.name().to_string(),
        ]
    }

    pub fn tag(&self) -> String {
        format!(
            "{}_{}_{}_{}",
            self.target.name(),
            self.policy.name(),
            self.sets,
            self.ways
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PredictorConfig {
    pub kind: PredictorKind,
    pub params: PredictorParams,
}

impl PredictorConfig {
    pub fn new(kind: PredictorKind, params: PredictorParams) -> Self {
        Self { kind, params }
    }

    /// Estimated storage in bits: pattern tables plus history registers
    pub fn size_bits(&self) -> u64 {
        let p = &self.params;
        let pc = p.bits(Tunable::PcBits);
        let gr = p.bits(Tunable::GrBits);
        let lr = p.bits(Tunable::LrBits);
        let cnt = p.bits(Tunable::CntBits) as u64;
        match self.kind {
            PredictorKind::Static => 0,
            PredictorKind::Bimodal | PredictorKind::Combined => entries(pc).saturating_mul(cnt),
            PredictorKind::Global => entries(gr).saturating_mul(cnt).saturating_add(gr as u64),
            PredictorKind::Gshare => entries(pc.max(gr))
                .saturating_mul(cnt)
                .saturating_add(gr as u64),
            PredictorKind::Gselect => entries(pc.saturating_add(gr))
                .saturating_mul(cnt)
                .saturating_add(gr as u64),
            PredictorKind::Local => entries(pc)
                .saturating_mul(lr as u64)
                .saturating_add(entries(lr).saturating_mul(cnt)),
        }
    }

    pub fn size(&self) -> u64 {
        bits_to_bytes(self.size_bits())
    }

    pub fn flags(&self) -> Vec<String> {
        let mut flags = vec!["--bp".to_string(), self.kind.name().to_string()];
        flags.extend(self.params.flags("bp"));
        flags
    }

    pub fn tag(&self) -> String {
        let mut parts = vec![self.kind.name().to_string()];
        parts.extend(self.params.values());
        parts.join("_")
    }
}

/// Two sub-predictors arbitrated by a chooser table
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CombinedPredictorConfig {
    pub bp1: PredictorConfig,
    pub bp2: PredictorConfig,
    pub combiner: PredictorParams,
}

impl CombinedPredictorConfig {
    pub fn combiner_size(&self) -> u64 {
        PredictorConfig::new(PredictorKind::Combined, self.combiner.clone()).size()
    }

    pub fn size(&self) -> u64 {
        self.bp1
            .size()
            .saturating_add(self.bp2.size())
            .saturating_add(self.combiner_size())
    }

    /// Slot tags injected so the simulator knows which kind sits in each slot
    pub fn slot_tags(&self) -> [(Slot, PredictorKind); 2] {
        [
            (Slot::P1, self.bp1.kind),
            (Slot::P2, self.bp2.kind),
        ]
    }

    pub fn flags(&self) -> Vec<String> {
        let mut flags = vec!["--bp".to_string(), "combined".to_string()];
        flags.extend(self.combiner.flags("bp_combined"));
        for (slot, kind) in self.slot_tags() {
            flags.push(format!("--bp_combined_{}", slot.name()));
            flags.push(kind.name().to_string());
        }
        flags.extend(self.bp1.params.flags("bp1"));
        flags.extend(self.bp2.params.flags("bp2"));
        flags
    }

    pub fn tag(&self) -> String {
        let mut parts = vec![
            "combined".to_string(),
            self.bp1.tag(),
            self.bp2.tag(),
        ];
        parts.extend(self.combiner.values());
        parts.join("_")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    P1,
    P2,
}

impl Slot {
    pub fn name(&self) -> &'static str {
        match self {
            Slot::P1 => "p1",
            Slot::P2 => "p2",
        }
    }
}

/// One point of a configuration space
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "lowercase")]
pub enum Configuration {
    Cache(CacheConfig),
    Predictor(PredictorConfig),
    Combined(CombinedPredictorConfig),
}

impl Configuration {
    /// Estimated storage in bytes, no simulation needed
    pub fn size(&self) -> u64 {
        match self {
            Configuration::Cache(c) => c.size(),
            Configuration::Predictor(p) => p.size(),
            Configuration::Combined(c) => c.size(),
        }
    }

    pub fn sweep_kind(&self) -> SweepKind {
        match self {
            Configuration::Cache(c) => c.target.into(),
            Configuration::Predictor(_) | Configuration::Combined(_) => SweepKind::Bpred,
        }
    }

    /// Simulator command-line flags selecting this configuration
    pub fn flags(&self) -> Vec<String> {
        match self {
            Configuration::Cache(c) => c.flags(),
            Configuration::Predictor(p) => p.flags(),
            Configuration::Combined(c) => c.flags(),
        }
    }

    /// Output-directory tag, unique per distinct configuration
    pub fn tag(&self) -> String {
        match self {
            Configuration::Cache(c) => c.tag(),
            Configuration::Predictor(p) => p.tag(),
            Configuration::Combined(c) => c.tag(),
        }
    }

    /// Static predictors have no storage and serve as a baseline
    pub fn is_static(&self) -> bool {
        matches!(
            self,
            Configuration::Predictor(PredictorConfig {
                kind: PredictorKind::Static,
                ..
            })
        )
    }
}

impl fmt::Display for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Configuration::Cache(c) => write!(
                f,
                "{} sets={} ways={} policy={}",
                c.target.name(),
                c.sets,
                c.ways,
                c.policy.name()
            ),
            Configuration::Predictor(p) if p.params.is_empty() => write!(f, "{}", p.kind),
            Configuration::Predictor(p) => write!(f, "{} {}", p.kind, p.params),
            Configuration::Combined(c) => write!(
                f,
                "combined [{}] + [{}] combiner {}",
                Configuration::Predictor(c.bp1.clone()),
                Configuration::Predictor(c.bp2.clone()),
                c.combiner
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bits(n: u32) -> TunableValue {
        TunableValue::Bits(n)
    }

    fn gshare(pc: u32, gr: u32, cnt: u32) -> PredictorConfig {
        PredictorConfig::new(
            PredictorKind::Gshare,
            PredictorParams::new()
                .with(Tunable::PcBits, bits(pc))
                .with(Tunable::GrBits, bits(gr))
                .with(Tunable::CntBits, bits(cnt))
                .with(Tunable::FoldPc, TunableValue::Fold(FoldPc::None)),
        )
    }

    #[test]
    fn test_cache_size_and_flags() {
        let cache = CacheConfig {
            target: CacheTarget::Icache,
            sets: 4,
            ways: 2,
            policy: ReplacementPolicy::Lru,
            line_bytes: 32,
        };
        assert_eq!(cache.size(), 256);
        assert_eq!(
            cache.flags(),
            vec![
                "--icache_sets",
                "4",
                "--icache_ways",
                "2",
                "--icache_policy",
                "lru"
            ]
        );
        assert_eq!(cache.tag(), "icache_lru_4_2");
    }

    #[test]
    fn test_predictor_sizes() {
        // 2^5 entries * 2 bits + 5 history bits = 69 bits -> 9 bytes
        assert_eq!(gshare(5, 5, 2).size(), 9);
        assert_eq!(gshare(3, 5, 2).size_bits(), 69);

        let bimodal = PredictorConfig::new(
            PredictorKind::Bimodal,
            PredictorParams::new()
                .with(Tunable::PcBits, bits(10))
                .with(Tunable::CntBits, bits(2)),
        );
        assert_eq!(bimodal.size(), 256);

        let local = PredictorConfig::new(
            PredictorKind::Local,
            PredictorParams::new()
                .with(Tunable::PcBits, bits(4))
                .with(Tunable::LrBits, bits(3))
                .with(Tunable::CntBits, bits(2))
                .with(Tunable::FoldPc, TunableValue::Fold(FoldPc::Xor)),
        );
        // 16 * 3 + 8 * 2 = 64 bits
        assert_eq!(local.size(), 8);

        let stat = PredictorConfig::new(PredictorKind::Static, PredictorParams::new());
        assert_eq!(stat.size(), 0);
        assert!(Configuration::Predictor(stat).is_static());
    }

    #[test]
    fn test_huge_index_saturates() {
        let p = PredictorConfig::new(
            PredictorKind::Gselect,
            PredictorParams::new()
                .with(Tunable::PcBits, bits(40))
                .with(Tunable::GrBits, bits(40))
                .with(Tunable::CntBits, bits(2)),
        );
        assert_eq!(p.size_bits(), u64::MAX);
    }

    #[test]
    fn test_combined_flags_carry_slot_tags() {
        let combined = CombinedPredictorConfig {
            bp1: gshare(5, 5, 2),
            bp2: PredictorConfig::new(PredictorKind::Static, PredictorParams::new()),
            combiner: PredictorParams::new()
                .with(Tunable::PcBits, bits(4))
                .with(Tunable::CntBits, bits(2))
                .with(Tunable::FoldPc, TunableValue::Fold(FoldPc::None)),
        };
        assert_eq!(combined.size(), 9 + 0 + 4);

        let flags = combined.flags();
        let joined = flags.join(" ");
        assert!(joined.starts_with("--bp combined --bp_combined_pc_bits 4"));
        assert!(joined.contains("--bp_combined_p1 gshare --bp_combined_p2 static"));
        assert!(joined.ends_with("--bp1_pc_bits 5 --bp1_gr_bits 5 --bp1_cnt_bits 2 --bp1_fold_pc none"));
        assert_eq!(combined.tag(), "combined_gshare_5_5_2_none_static_4_2_none");
    }

    #[test]
    fn test_configuration_json() {
        let config = Configuration::Predictor(gshare(5, 4, 2));
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"family\":\"predictor\""));
        assert!(json.contains("\"fold_pc\":\"none\""));
        let back: Configuration = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
