use crate::{
    BinnedBest, CombinedDomain, CombinedPredictorConfig, Configuration, PredictorConfig,
    PredictorDomain, PredictorKind, PredictorParams, SizeWindow, SweepError, params_product,
    predictor_candidates,
};
use log::info;
use std::path::Path;

/// Candidate pool for one slot of a combined predictor.
///
/// Exhaustive slots are regenerated from their domain, with only the upper size
/// bound applied since the total is checked later. Other slots reuse the binned
/// best set saved by that kind's own sweep.
pub fn slot_candidates(
    kind: PredictorKind,
    exhaustive: bool,
    domain: Option<&PredictorDomain>,
    prior: Option<&BinnedBest>,
    prior_path: &Path,
    window: SizeWindow,
) -> Result<Vec<PredictorConfig>, SweepError> {
    if exhaustive {
        let empty = PredictorDomain::default();
        let domain = match (kind, domain) {
            (_, Some(domain)) => domain,
            (PredictorKind::Static, None) => &empty,
            (_, None) => {
                return Err(SweepError::Config(format!(
                    "combined slot {} is exhaustive but bpred.{} has no domain",
                    kind, kind
                )));
            }
        };
        return Ok(predictor_candidates(
            kind,
            domain,
            SizeWindow::new(0, window.max),
        ));
    }

    let prior = prior.ok_or_else(|| SweepError::MissingPrior {
        kind: kind.name().to_string(),
        path: prior_path.to_path_buf(),
    })?;

    let mut pool = vec![];
    for result in prior.values() {
        match &result.configuration {
            Configuration::Predictor(config) if config.kind == kind => pool.push(config.clone()),
            other => {
                return Err(SweepError::Config(format!(
                    "saved best set {} holds {} where a {} predictor was expected",
                    prior_path.display(),
                    other,
                    kind
                )));
            }
        }
    }
    pool.dedup();
    Ok(pool)
}

/// bp1 x bp2 x combiner, keeping triples whose summed size lies in `window`
pub fn compose(
    bp1: &[PredictorConfig],
    bp2: &[PredictorConfig],
    combiners: &[PredictorParams],
    window: SizeWindow,
) -> Vec<CombinedPredictorConfig> {
    let mut candidates = vec![];
    for first in bp1 {
        for second in bp2 {
            for combiner in combiners {
                let config = CombinedPredictorConfig {
                    bp1: first.clone(),
                    bp2: second.clone(),
                    combiner: combiner.clone(),
                };
                if window.contains(config.size()) {
                    candidates.push(config);
                }
            }
        }
    }
    info!(
        "Composed {} combined candidates out of {} x {} x {}",
        candidates.len(),
        bp1.len(),
        bp2.len(),
        combiners.len()
    );
    candidates
}

/// Combiner sub-space of a combined domain
pub fn combiner_candidates(domain: &CombinedDomain) -> Vec<PredictorParams> {
    params_product(PredictorKind::Combined.tunables(), &domain.combiner())
}
