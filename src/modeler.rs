//! Pairwise classifier tuning.
//!
//! [`PairwiseModeler`] wraps [`LinearPairClassifier`] training with a
//! bounded hyperparameter search: up to `n_iter` parameter combinations are
//! fitted on the training pairs, scored by log-loss on held-out validation
//! pairs, and the best trial's classifier is kept. Trials are independent
//! and run on the rayon pool; a failing trial is logged and skipped, and
//! only an all-trial wipeout aborts the fit. Equal scores resolve to the
//! lowest trial index.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::classifier::{LinearPairClassifier, PairFeaturizer, TrainParams};
use crate::error::{Error, Result};
use crate::signature::SignatureStore;

/// Default bound on search trials.
pub const DEFAULT_N_ITER: usize = 25;

/// Search configuration for [`PairwiseModeler`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelerConfig {
    /// Maximum number of parameter combinations to try.
    pub n_iter: usize,
    /// Parameter combinations, tried in order up to `n_iter`.
    pub grid: Vec<TrainParams>,
}

impl Default for ModelerConfig {
    fn default() -> Self {
        let mut grid = Vec::new();
        for &learning_rate in &[0.1, 0.3, 1.0] {
            for &epochs in &[100usize, 300, 600] {
                for &l2 in &[0.0, 1e-3, 1e-2] {
                    grid.push(TrainParams {
                        learning_rate,
                        epochs,
                        l2,
                    });
                }
            }
        }
        Self {
            n_iter: DEFAULT_N_ITER,
            grid,
        }
    }
}

impl ModelerConfig {
    /// Override the trial budget.
    #[must_use]
    pub fn with_n_iter(mut self, n_iter: usize) -> Self {
        self.n_iter = n_iter;
        self
    }

    /// Replace the parameter grid.
    #[must_use]
    pub fn with_grid(mut self, grid: Vec<TrainParams>) -> Self {
        self.grid = grid;
        self
    }
}

/// Outcome of a modeler fit: the winning classifier and how it won.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelerFit {
    /// Classifier from the best trial.
    pub classifier: LinearPairClassifier,
    /// Parameters of the best trial.
    pub params: TrainParams,
    /// Validation log-loss of the best trial.
    pub validation_loss: f64,
    /// Trials attempted (including failed ones).
    pub trials: usize,
}

/// Classifier trainer with bounded hyperparameter search.
#[derive(Debug, Clone, Default)]
pub struct PairwiseModeler {
    config: ModelerConfig,
}

impl PairwiseModeler {
    /// Modeler with the default grid and trial budget.
    #[must_use]
    pub fn new(config: ModelerConfig) -> Self {
        Self { config }
    }

    /// Fit over the grid and keep the trial with the lowest validation
    /// log-loss.
    ///
    /// # Errors
    ///
    /// [`Error::SearchFailed`] when the effective search space is empty or
    /// every trial fails; [`Error::EmptyInput`] when either pair set is
    /// empty.
    pub fn fit(
        &self,
        train: &[(Vec<f64>, bool)],
        validation: &[(Vec<f64>, bool)],
    ) -> Result<ModelerFit> {
        if train.is_empty() {
            return Err(Error::empty_input("no training pairs"));
        }
        if validation.is_empty() {
            return Err(Error::empty_input("no validation pairs"));
        }
        let budget = self.config.n_iter.min(self.config.grid.len());
        if budget == 0 {
            return Err(Error::search_failed("search space is empty"));
        }

        let outcomes: Vec<(usize, Result<(LinearPairClassifier, f64)>)> = self.config.grid
            [..budget]
            .par_iter()
            .enumerate()
            .map(|(index, params)| {
                let outcome = LinearPairClassifier::fit(train, params)
                    .and_then(|clf| clf.log_loss(validation).map(|loss| (clf, loss)));
                (index, outcome)
            })
            .collect();

        let mut best: Option<(usize, LinearPairClassifier, f64)> = None;
        for (index, outcome) in outcomes {
            match outcome {
                Ok((_, loss)) if !loss.is_finite() => {
                    log::warn!("trial {index} produced non-finite loss, skipping");
                }
                Ok((clf, loss)) => {
                    let improves = best.as_ref().map_or(true, |(_, _, b)| loss < *b);
                    if improves {
                        best = Some((index, clf, loss));
                    }
                }
                Err(e) => {
                    log::warn!("trial {index} failed: {e}");
                }
            }
        }
        let Some((index, classifier, loss)) = best else {
            return Err(Error::search_failed(format!(
                "all {budget} classifier trials failed"
            )));
        };
        let params = self.config.grid[index];
        log::info!(
            "pairwise modeler: {budget} trials, best loss {loss:.4} \
             (lr={}, epochs={}, l2={})",
            params.learning_rate,
            params.epochs,
            params.l2
        );
        Ok(ModelerFit {
            classifier,
            params,
            validation_loss: loss,
            trials: budget,
        })
    }
}

/// Labeled pairs split into train and validation sets.
#[derive(Debug, Clone, Default)]
pub struct TrainingPairs {
    /// Pairs the classifier trains on.
    pub train: Vec<(Vec<f64>, bool)>,
    /// Held-out pairs the search scores on.
    pub validation: Vec<(Vec<f64>, bool)>,
}

/// Derive labeled pairs from gold clusters.
///
/// Every unordered within-block pair whose two signatures both carry
/// non-orphan gold becomes one example, labeled positive when the gold
/// clusters match. Pairs are enumerated in block order and every fourth one
/// goes to validation; when that leaves validation empty the training set
/// doubles as validation.
///
/// # Errors
///
/// [`Error::EmptyInput`] if no labeled pair can be derived.
pub fn labeled_pairs(
    store: &SignatureStore,
    featurizer: &dyn PairFeaturizer,
    orphan_cluster_id: &str,
) -> Result<TrainingPairs> {
    let mut pairs = TrainingPairs::default();
    let mut count = 0usize;
    for block in store.blocks() {
        let labeled: Vec<(&str, &str)> = block
            .signatures
            .iter()
            .filter_map(|id| {
                let gold = store.gold_cluster(id)?;
                (gold != orphan_cluster_id).then_some((id.as_str(), gold))
            })
            .collect();
        for i in 0..labeled.len() {
            for j in (i + 1)..labeled.len() {
                let a = store.signature(labeled[i].0)?;
                let b = store.signature(labeled[j].0)?;
                let example = (featurizer.features(a, b), labeled[i].1 == labeled[j].1);
                if count % 4 == 3 {
                    pairs.validation.push(example);
                } else {
                    pairs.train.push(example);
                }
                count += 1;
            }
        }
    }
    if pairs.train.is_empty() {
        return Err(Error::empty_input(
            "no labeled signature pairs; dataset has no usable gold clusters",
        ));
    }
    if pairs.validation.is_empty() {
        log::warn!("too few pairs for a held-out split; validating on the training pairs");
        pairs.validation = pairs.train.clone();
    }
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{BaselineFeaturizer, PairClassifier};
    use crate::signature::{Block, Signature};

    fn toy_pairs() -> Vec<(Vec<f64>, bool)> {
        vec![
            (vec![0.9], true),
            (vec![1.0], true),
            (vec![0.8], true),
            (vec![0.1], false),
            (vec![0.0], false),
            (vec![0.2], false),
        ]
    }

    #[test]
    fn search_selects_a_separating_classifier() {
        let pairs = toy_pairs();
        let fit = PairwiseModeler::default().fit(&pairs, &pairs).unwrap();
        let probs = fit
            .classifier
            .predict_proba(&[vec![0.95], vec![0.05]])
            .unwrap();
        assert!(probs[0] > probs[1]);
        assert!(fit.validation_loss.is_finite());
        assert!(fit.trials >= 1);
    }

    #[test]
    fn empty_grid_is_a_search_failure() {
        let modeler = PairwiseModeler::new(ModelerConfig::default().with_grid(vec![]));
        let pairs = toy_pairs();
        let err = modeler.fit(&pairs, &pairs).unwrap_err();
        assert!(matches!(err, Error::SearchFailed(_)));
    }

    #[test]
    fn all_failing_trials_abort_the_fit() {
        let broken = TrainParams {
            learning_rate: -1.0,
            epochs: 10,
            l2: 0.0,
        };
        let modeler =
            PairwiseModeler::new(ModelerConfig::default().with_grid(vec![broken, broken]));
        let pairs = toy_pairs();
        let err = modeler.fit(&pairs, &pairs).unwrap_err();
        assert!(matches!(err, Error::SearchFailed(_)));
    }

    #[test]
    fn one_bad_trial_does_not_abort() {
        let broken = TrainParams {
            learning_rate: -1.0,
            epochs: 10,
            l2: 0.0,
        };
        let modeler = PairwiseModeler::new(
            ModelerConfig::default().with_grid(vec![broken, TrainParams::default()]),
        );
        let pairs = toy_pairs();
        let fit = modeler.fit(&pairs, &pairs).unwrap();
        assert_eq!(fit.params, TrainParams::default());
    }

    #[test]
    fn ties_resolve_to_the_first_trial() {
        let params = TrainParams::default();
        let modeler =
            PairwiseModeler::new(ModelerConfig::default().with_grid(vec![params, params]));
        let pairs = toy_pairs();
        let fit = modeler.fit(&pairs, &pairs).unwrap();
        assert_eq!(fit.params, params);
        assert_eq!(fit.trials, 2);
    }

    #[test]
    fn n_iter_caps_the_grid() {
        let modeler = PairwiseModeler::new(ModelerConfig::default().with_n_iter(1));
        let pairs = toy_pairs();
        let fit = modeler.fit(&pairs, &pairs).unwrap();
        assert_eq!(fit.trials, 1);
    }

    #[test]
    fn labeled_pairs_follow_gold_clusters() {
        let mk = |id: &str, tokens: &[&str]| {
            Signature::new(id, format!("paper-{id}"), 0, tokens.join(" "))
                .with_name_tokens(tokens.iter().map(ToString::to_string).collect())
        };
        let signatures = vec![
            mk("a", &["ito", "k"]),
            mk("b", &["ito", "k"]),
            mk("c", &["ito", "ken"]),
            mk("x", &["ito", "kaz"]),
        ];
        let block = Block::new(
            "ito_k",
            vec!["a".into(), "b".into(), "c".into(), "x".into()],
        );
        let mut store = SignatureStore::build(signatures, vec![block]).unwrap();
        store.set_gold("a", "g1");
        store.set_gold("b", "g1");
        store.set_gold("c", "g2");
        store.set_gold("x", "orphans");

        let pairs = labeled_pairs(&store, &BaselineFeaturizer, "orphans").unwrap();
        // Three usable signatures, so three pairs, one positive.
        let total = pairs.train.len() + pairs.validation.len();
        assert_eq!(total, 3);
        let positives = pairs
            .train
            .iter()
            .chain(&pairs.validation)
            .filter(|(_, label)| *label)
            .count();
        assert_eq!(positives, 1);
    }

    #[test]
    fn no_gold_means_no_pairs() {
        let store = SignatureStore::build(
            vec![Signature::new("a", "p", 0, "K. Ito")],
            vec![Block::new("ito_k", vec!["a".into()])],
        )
        .unwrap();
        assert!(labeled_pairs(&store, &BaselineFeaturizer, "orphans").is_err());
    }
}
