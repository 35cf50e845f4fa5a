use crate::{Configuration, ReplacementPolicy, SweepError, Traffic};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::{
    cmp::Ordering,
    collections::{BTreeMap, HashSet},
    fs::File,
    io::{BufReader, BufWriter},
    path::Path,
};

/// One configuration's result averaged over all workloads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedResult {
    pub configuration: Configuration,
    /// storage size in bytes as reported by the simulator
    pub size: u64,
    /// mean hit rate / accuracy in percent, two decimals
    pub metric: f64,
    /// only present for single-workload cache sweeps
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traffic: Option<Traffic>,
    /// per-workload metric
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub breakdown: BTreeMap<String, f64>,
}

impl AggregatedResult {
    /// Result sized by the configuration's own estimate
    pub fn new(configuration: Configuration, metric: f64) -> Self {
        Self {
            size: configuration.size(),
            configuration,
            metric,
            traffic: None,
            breakdown: BTreeMap::new(),
        }
    }

    /// Higher metric first; ties go to the smaller, then lower-ordered configuration
    fn better(&self, other: &AggregatedResult) -> Ordering {
        other
            .metric
            .total_cmp(&self.metric)
            .then_with(|| self.size.cmp(&other.size))
            .then_with(|| self.configuration.cmp(&other.configuration))
    }
}

type CacheTable = BTreeMap<ReplacementPolicy, BTreeMap<u32, BTreeMap<u32, AggregatedResult>>>;

/// All aggregated results of a sweep, partitioned by its natural key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SweepTable {
    /// policy -> sets -> ways
    Cache(CacheTable),
    /// size -> results of that size
    Predictor(BTreeMap<u64, Vec<AggregatedResult>>),
}

impl SweepTable {
    pub fn build(results: &[AggregatedResult]) -> SweepTable {
        let is_cache = results
            .first()
            .is_some_and(|r| matches!(r.configuration, Configuration::Cache(_)));
        if is_cache {
            let mut table = CacheTable::new();
            for result in results {
                if let Configuration::Cache(cache) = &result.configuration {
                    table
                        .entry(cache.policy)
                        .or_default()
                        .entry(cache.sets)
                        .or_default()
                        .insert(cache.ways, result.clone());
                }
            }
            SweepTable::Cache(table)
        } else {
            let mut table: BTreeMap<u64, Vec<AggregatedResult>> = BTreeMap::new();
            for result in results {
                table.entry(result.size).or_default().push(result.clone());
            }
            for bucket in table.values_mut() {
                bucket.sort_by(|a, b| a.configuration.cmp(&b.configuration));
            }
            SweepTable::Predictor(table)
        }
    }

    /// Every result, in partition-key order
    pub fn results(&self) -> Vec<AggregatedResult> {
        match self {
            SweepTable::Cache(table) => table
                .values()
                .flat_map(|sets| sets.values())
                .flat_map(|ways| ways.values())
                .cloned()
                .collect(),
            SweepTable::Predictor(table) => table.values().flatten().cloned().collect(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            SweepTable::Cache(table) => table
                .values()
                .flat_map(|sets| sets.values())
                .map(|ways| ways.len())
                .sum(),
            SweepTable::Predictor(table) => table.values().map(|bucket| bucket.len()).sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Best result per size bin, keyed by the bin's upper bound
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BinnedBest(pub BTreeMap<u64, AggregatedResult>);

impl BinnedBest {
    pub fn values(&self) -> impl Iterator<Item = &AggregatedResult> {
        self.0.values()
    }

    pub fn get(&self, bin: u64) -> Option<&AggregatedResult> {
        self.0.get(&bin)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Top-N plus everything above threshold, ascending by metric
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RankedBest(pub Vec<AggregatedResult>);

impl RankedBest {
    pub fn iter(&self) -> std::slice::Iter<'_, AggregatedResult> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Keep the best result whose size falls in `(previous bin, bin]` for each bin.
///
/// The first bin's lower bound is exclusive -1 so zero-sized static predictors
/// land in it. Results larger than the last bin are dropped.
pub fn bin(results: &[AggregatedResult], bins: &[u64]) -> BinnedBest {
    let mut bins = bins.to_vec();
    bins.sort_unstable();
    bins.dedup();

    let mut best: BTreeMap<u64, AggregatedResult> = BTreeMap::new();
    let mut previous: i128 = -1;
    for bin in bins {
        for result in results {
            let size = result.size as i128;
            if size <= previous || result.size > bin {
                continue;
            }
            let replace = match best.get(&bin) {
                Some(current) => result.better(current) == Ordering::Less,
                None => true,
            };
            if replace {
                best.insert(bin, result.clone());
            }
        }
        previous = bin as i128;
    }
    BinnedBest(best)
}

/// Union of the `top_n` best results and all results with metric >= `threshold`
pub fn rank(results: &[AggregatedResult], top_n: usize, threshold: f64) -> RankedBest {
    let mut sorted: Vec<&AggregatedResult> = results.iter().collect();
    sorted.sort_by(|a, b| a.better(b));

    let mut seen: HashSet<&Configuration> = HashSet::new();
    let mut chosen = vec![];
    let top = sorted.iter().take(top_n);
    let above = sorted.iter().filter(|r| r.metric >= threshold);
    for result in top.chain(above) {
        if seen.insert(&result.configuration) {
            chosen.push((*result).clone());
        }
    }

    chosen.sort_by(|a, b| b.better(a));
    RankedBest(chosen)
}

pub fn save_json<T: Serialize, P: AsRef<Path>>(path: P, value: &T) -> Result<(), SweepError> {
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, value)?;
    Ok(())
}

/// `None` when the file does not exist
pub fn load_json<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> Result<Option<T>, SweepError> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(None);
    }
    let reader = BufReader::new(File::open(path)?);
    Ok(Some(serde_json::from_reader(reader)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        CacheConfig, CacheTarget, CombinedPredictorConfig, FoldPc, PredictorConfig,
        PredictorKind, PredictorParams, Tunable, TunableValue,
    };
    use pretty_assertions::assert_eq;

    fn predictor(pc: u32) -> Configuration {
        Configuration::Predictor(PredictorConfig::new(
            PredictorKind::Gshare,
            PredictorParams::new()
                .with(Tunable::PcBits, TunableValue::Bits(pc))
                .with(Tunable::GrBits, TunableValue::Bits(4))
                .with(Tunable::CntBits, TunableValue::Bits(2))
                .with(Tunable::FoldPc, TunableValue::Fold(FoldPc::Xor)),
        ))
    }

    fn sized(pc: u32, size: u64, metric: f64) -> AggregatedResult {
        AggregatedResult {
            size,
            ..AggregatedResult::new(predictor(pc), metric)
        }
    }

    #[test]
    fn test_bin_locality() {
        let results = vec![
            sized(1, 32, 70.0),
            sized(2, 200, 85.0),
            sized(3, 900, 80.0),
            sized(4, 1200, 95.0),
        ];
        let binned = bin(&results, &[64, 256, 1024]);
        let metrics: Vec<(u64, f64)> = binned.0.iter().map(|(k, v)| (*k, v.metric)).collect();
        assert_eq!(metrics, vec![(64, 70.0), (256, 85.0), (1024, 80.0)]);
    }

    #[test]
    fn test_bin_keeps_local_maximum_and_zero_size() {
        let results = vec![
            sized(1, 0, 60.0),
            sized(2, 64, 75.0),
            sized(3, 65, 90.0),
            sized(4, 100, 88.0),
            sized(5, 64, 74.0),
        ];
        let binned = bin(&results, &[128, 64]);
        assert_eq!(binned.get(64).unwrap().metric, 75.0);
        assert_eq!(binned.get(128).unwrap().metric, 90.0);

        let binned = bin(&results, &[0, 64]);
        assert_eq!(binned.get(0).unwrap().size, 0);
    }

    #[test]
    fn test_bin_ties_are_order_independent() {
        let a = sized(1, 40, 80.0);
        let b = sized(2, 30, 80.0);
        let forward = bin(&[a.clone(), b.clone()], &[64]);
        let backward = bin(&[b.clone(), a], &[64]);
        assert_eq!(forward, backward);
        assert_eq!(forward.get(64).unwrap().configuration, b.configuration);
    }

    #[test]
    fn test_rank_merge_dedup() {
        let a = sized(1, 8, 95.0);
        let b = sized(2, 8, 82.0);
        let c = sized(3, 8, 60.0);
        let ranked = rank(&[c, a.clone(), b.clone()], 1, 80.0);
        assert_eq!(ranked.0, vec![b, a]);
    }

    #[test]
    fn test_rank_top_n_below_threshold() {
        let results: Vec<_> = (0..5).map(|i| sized(i, 8, 50.0 + i as f64)).collect();
        let ranked = rank(&results, 2, 99.0);
        let metrics: Vec<f64> = ranked.iter().map(|r| r.metric).collect();
        assert_eq!(metrics, vec![53.0, 54.0]);
    }

    #[test]
    fn test_cache_table_nesting() {
        let cache = |sets, ways, policy| {
            AggregatedResult::new(
                Configuration::Cache(CacheConfig {
                    target: CacheTarget::Icache,
                    sets,
                    ways,
                    policy,
                    line_bytes: 32,
                }),
                90.0,
            )
        };
        let table = SweepTable::build(&[
            cache(8, 2, ReplacementPolicy::Fifo),
            cache(4, 2, ReplacementPolicy::Lru),
            cache(4, 1, ReplacementPolicy::Lru),
        ]);
        assert_eq!(table.len(), 3);
        let SweepTable::Cache(nested) = &table else {
            panic!("expected cache table");
        };
        let lru_sets: Vec<u32> = nested[&ReplacementPolicy::Lru].keys().copied().collect();
        assert_eq!(lru_sets, vec![4]);
        let lru_ways: Vec<u32> = nested[&ReplacementPolicy::Lru][&4].keys().copied().collect();
        assert_eq!(lru_ways, vec![1, 2]);
    }

    #[test]
    fn test_persisted_round_trip_keeps_integer_keys() {
        let dir = tempfile::tempdir().unwrap();
        let results = vec![
            sized(1, 3, 71.234),
            sized(2, 3, 72.5),
            sized(3, 40, 99.99),
        ];
        let table = SweepTable::build(&results);
        let binned = bin(&results, &[4, 64]);

        save_json(dir.path().join("table.json"), &table).unwrap();
        save_json(dir.path().join("binned.json"), &binned).unwrap();

        let raw = std::fs::read_to_string(dir.path().join("binned.json")).unwrap();
        assert!(raw.contains("\"64\""));

        let table_back: SweepTable = load_json(dir.path().join("table.json")).unwrap().unwrap();
        let binned_back: BinnedBest = load_json(dir.path().join("binned.json")).unwrap().unwrap();
        assert_eq!(table_back, table);
        assert_eq!(binned_back, binned);
        let keys: Vec<u64> = binned_back.0.keys().copied().collect();
        assert_eq!(keys, vec![4, 64]);

        let missing: Option<BinnedBest> = load_json(dir.path().join("nope.json")).unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn test_cache_table_reloads_nested_keys() {
        let dir = tempfile::tempdir().unwrap();
        let cache = |sets, ways, policy, metric| {
            let mut result = AggregatedResult::new(
                Configuration::Cache(CacheConfig {
                    target: CacheTarget::Dcache,
                    sets,
                    ways,
                    policy,
                    line_bytes: 64,
                }),
                metric,
            );
            result.breakdown.insert("coremark_O2".to_string(), metric);
            result
        };
        let table = SweepTable::build(&[
            cache(64, 4, ReplacementPolicy::Lru, 97.31),
            cache(64, 1, ReplacementPolicy::Lru, 91.07),
            cache(128, 2, ReplacementPolicy::Fifo, 95.5),
        ]);

        let path = dir.path().join("dcache_table.json");
        save_json(&path, &table).unwrap();
        let back: SweepTable = load_json(&path).unwrap().unwrap();
        assert_eq!(back, table);

        let SweepTable::Cache(nested) = &back else {
            panic!("expected cache table");
        };
        let ways: Vec<u32> = nested[&ReplacementPolicy::Lru][&64].keys().copied().collect();
        assert_eq!(ways, vec![1, 4]);
        assert_eq!(nested[&ReplacementPolicy::Fifo][&128][&2].metric, 95.5);
    }

    #[test]
    fn test_combined_results_reload() {
        let dir = tempfile::tempdir().unwrap();
        let combined = |pc: u32, metric: f64| {
            let Configuration::Predictor(bp1) = predictor(pc) else {
                unreachable!();
            };
            AggregatedResult::new(
                Configuration::Combined(CombinedPredictorConfig {
                    bp1,
                    bp2: PredictorConfig::new(PredictorKind::Static, PredictorParams::new()),
                    combiner: PredictorParams::new()
                        .with(Tunable::PcBits, TunableValue::Bits(2))
                        .with(Tunable::CntBits, TunableValue::Bits(2))
                        .with(Tunable::FoldPc, TunableValue::Fold(FoldPc::None)),
                }),
                metric,
            )
        };
        let results = vec![combined(3, 88.25), combined(5, 90.1), combined(6, 89.0)];
        let table = SweepTable::build(&results);
        let binned = bin(&results, &[64, 1024]);
        let ranked = rank(&results, 2, 89.5);

        save_json(dir.path().join("table.json"), &table).unwrap();
        save_json(dir.path().join("binned.json"), &binned).unwrap();
        save_json(dir.path().join("best.json"), &ranked).unwrap();

        let raw = std::fs::read_to_string(dir.path().join("binned.json")).unwrap();
        assert!(raw.contains("\"family\": \"combined\""));

        let table_back: SweepTable = load_json(dir.path().join("table.json")).unwrap().unwrap();
        let binned_back: BinnedBest = load_json(dir.path().join("binned.json")).unwrap().unwrap();
        let ranked_back: RankedBest = load_json(dir.path().join("best.json")).unwrap().unwrap();
        assert_eq!(table_back, table);
        assert_eq!(binned_back, binned);
        assert_eq!(ranked_back, ranked);
        assert!(!ranked_back.is_empty());
        assert!(ranked_back
            .iter()
            .all(|r| matches!(r.configuration, Configuration::Combined(_))));
    }
}
