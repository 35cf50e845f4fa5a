use crate::{
    CacheConfig, CacheDomain, CacheTarget, Configuration, PredictorConfig, PredictorDomain,
    PredictorKind, PredictorParams, SizeWindow, Tunable,
};
use log::debug;

/// Cartesian product of the values of `tunables`, first tunable varying slowest
pub fn params_product(tunables: &[Tunable], domain: &PredictorDomain) -> Vec<PredictorParams> {
    let mut product = vec![PredictorParams::new()];
    for tunable in tunables {
        let values = domain.values(*tunable);
        let mut next = Vec::with_capacity(product.len() * values.len());
        for partial in &product {
            for value in &values {
                next.push(partial.clone().with(*tunable, *value));
            }
        }
        product = next;
    }
    product
}

/// Unfiltered number of combinations for a predictor kind
pub fn predictor_space_size(kind: PredictorKind, domain: &PredictorDomain) -> usize {
    kind.tunables()
        .iter()
        .map(|tunable| domain.values(*tunable).len())
        .product()
}

/// All predictor configurations of `kind` whose estimated size lies in `window`.
///
/// The static predictor has no storage and is always kept as a baseline.
pub fn predictor_candidates(
    kind: PredictorKind,
    domain: &PredictorDomain,
    window: SizeWindow,
) -> Vec<PredictorConfig> {
    let mut candidates = vec![];
    let mut dropped = 0;
    for params in params_product(kind.tunables(), domain) {
        let config = PredictorConfig::new(kind, params);
        if kind == PredictorKind::Static || window.contains(config.size()) {
            candidates.push(config);
        } else {
            dropped += 1;
        }
    }
    debug!(
        "{}: {} candidates, {} outside size window [{}, {}]",
        kind,
        candidates.len(),
        dropped,
        window.min,
        window.max
    );
    candidates
}

pub fn predictor_space(
    kind: PredictorKind,
    domain: &PredictorDomain,
    window: SizeWindow,
) -> Vec<Configuration> {
    predictor_candidates(kind, domain, window)
        .into_iter()
        .map(Configuration::Predictor)
        .collect()
}

/// sets x ways x policy, filtered by the domain's own size window
pub fn cache_space(target: CacheTarget, domain: &CacheDomain) -> Vec<Configuration> {
    let window = domain.common_settings.window();
    let mut candidates = vec![];
    for &sets in &domain.sets {
        for &ways in &domain.ways {
            for &policy in &domain.policy {
                let config = CacheConfig {
                    target,
                    sets,
                    ways,
                    policy,
                    line_bytes: domain.common_settings.line_bytes,
                };
                if window.contains(config.size()) {
                    candidates.push(Configuration::Cache(config));
                }
            }
        }
    }
    debug!(
        "{}: {} candidates within [{}, {}]",
        target.name(),
        candidates.len(),
        window.min,
        window.max
    );
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CommonSettings, FoldPc, ReplacementPolicy};
    use proptest::prelude::*;

    fn settings(min_size: u64, max_size: u64) -> CommonSettings {
        CommonSettings {
            min_size,
            max_size,
            bins: None,
            line_bytes: 16,
            top_n: 10,
            best_threshold: 95.0,
        }
    }

    #[test]
    fn test_static_is_single_empty_candidate() {
        let candidates =
            predictor_candidates(PredictorKind::Static, &PredictorDomain::default(), SizeWindow::new(0, 0));
        assert_eq!(candidates.len(), 1);
        assert!(candidates[0].params.is_empty());
    }

    #[test]
    fn test_static_survives_window_excluding_zero() {
        let candidates = predictor_space(
            PredictorKind::Static,
            &PredictorDomain::default(),
            SizeWindow::new(100, 200),
        );
        assert_eq!(candidates.len(), 1);
        assert!(candidates[0].is_static());
    }

    #[test]
    fn test_irrelevant_tunables_ignored() {
        let domain = PredictorDomain {
            pc_bits: vec![2, 3],
            gr_bits: vec![1, 2, 3],
            cnt_bits: vec![2],
            ..Default::default()
        };
        let candidates = predictor_candidates(PredictorKind::Bimodal, &domain, SizeWindow::new(0, u64::MAX));
        assert_eq!(candidates.len(), 2);
        assert!(candidates.iter().all(|c| c.params.get(Tunable::GrBits).is_none()));
    }

    #[test]
    fn test_cache_window() {
        let domain = CacheDomain {
            sets: vec![1, 2, 4, 8],
            ways: vec![1, 2],
            policy: vec![ReplacementPolicy::Lru, ReplacementPolicy::Random],
            common_settings: settings(32, 64),
        };
        let candidates = cache_space(CacheTarget::Dcache, &domain);
        // sizes: sets*ways*16 in [32, 64] -> (1,2) (2,1) (2,2) (4,1), two policies each
        assert_eq!(candidates.len(), 8);
        assert!(candidates.iter().all(|c| (32..=64).contains(&c.size())));
    }

    proptest! {
        #[test]
        fn prop_generation_completeness(
            pc in prop::collection::vec(0u32..12, 1..4),
            gr in prop::collection::vec(0u32..12, 1..4),
            cnt in prop::collection::vec(1u32..4, 1..3),
            xor in any::<bool>(),
            min in 0u64..256,
            span in 0u64..4096,
        ) {
            let domain = PredictorDomain {
                pc_bits: pc.clone(),
                gr_bits: gr.clone(),
                lr_bits: vec![],
                cnt_bits: cnt.clone(),
                fold_pc: if xor { vec![FoldPc::None, FoldPc::Xor] } else { vec![FoldPc::None] },
            };
            let expected = pc.len() * gr.len() * cnt.len() * domain.fold_pc.len();
            prop_assert_eq!(predictor_space_size(PredictorKind::Gshare, &domain), expected);
            prop_assert_eq!(params_product(PredictorKind::Gshare.tunables(), &domain).len(), expected);

            let window = SizeWindow::new(min, min + span);
            let filtered = predictor_candidates(PredictorKind::Gselect, &domain, window);
            prop_assert!(filtered.len() <= expected);
            prop_assert!(filtered.iter().all(|c| window.contains(c.size())));
        }
    }
}
