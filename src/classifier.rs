//! Pairwise scoring: featurizers, classifiers, and scorers.
//!
//! The clustering core never touches raw text. It consumes same-author
//! probabilities through the [`PairScorer`] capability, which is usually the
//! composition of a [`PairFeaturizer`] (signature pair to feature vector)
//! and a [`PairClassifier`] (feature vectors to probabilities). Both halves
//! are pluggable; the crate ships a small deterministic baseline of each so
//! the pipeline runs end to end without an external model:
//!
//! - [`BaselineFeaturizer`] computes cheap set-overlap features from already
//!   normalized signature attributes.
//! - [`LinearPairClassifier`] is a logistic model trained by batch gradient
//!   descent from a zero start, so identical inputs give identical weights.
//! - [`TableScorer`] maps explicit id pairs to fixed probabilities and is
//!   the workhorse of hand-checkable tests.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::signature::Signature;

/// Turns a signature pair into a feature vector of fixed dimension.
pub trait PairFeaturizer: Send + Sync {
    /// Feature vector length; every output has exactly this length.
    fn dimension(&self) -> usize;

    /// Compute features for one unordered pair.
    fn features(&self, a: &Signature, b: &Signature) -> Vec<f64>;
}

/// Binary classifier over pair feature vectors.
pub trait PairClassifier: Send + Sync {
    /// Dimensionality the classifier was fitted on.
    fn dimension(&self) -> usize;

    /// Same-author probability for each feature vector, in order.
    ///
    /// # Errors
    ///
    /// [`Error::DimensionMismatch`] if any vector's length differs from
    /// [`PairClassifier::dimension`]; [`Error::Inference`] for backend
    /// failures.
    fn predict_proba(&self, features: &[Vec<f64>]) -> Result<Vec<f64>>;
}

/// Same-author probability for a signature pair.
///
/// This is the only interface the distance-matrix builder and the
/// incremental predictor consume.
pub trait PairScorer: Send + Sync {
    /// Probability in `[0, 1]` that `a` and `b` are the same author.
    ///
    /// # Errors
    ///
    /// Propagates featurization and inference failures.
    fn same_author_probability(&self, a: &Signature, b: &Signature) -> Result<f64>;
}

fn jaccard(a: &[String], b: &[String]) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let sa: std::collections::BTreeSet<&str> = a.iter().map(String::as_str).collect();
    let sb: std::collections::BTreeSet<&str> = b.iter().map(String::as_str).collect();
    let intersection = sa.intersection(&sb).count() as f64;
    let union = sa.union(&sb).count() as f64;
    if union == 0.0 {
        0.0
    } else {
        intersection / union
    }
}

/// Set-overlap features over normalized signature attributes.
///
/// Five features per pair: name-token Jaccard, first-token match,
/// affiliation Jaccard, co-author Jaccard, and an author-position proximity
/// score. Deliberately simple; real deployments substitute their own
/// featurizer.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct BaselineFeaturizer;

impl BaselineFeaturizer {
    /// Feature vector length produced by this featurizer.
    pub const DIMENSION: usize = 5;
}

impl PairFeaturizer for BaselineFeaturizer {
    fn dimension(&self) -> usize {
        Self::DIMENSION
    }

    fn features(&self, a: &Signature, b: &Signature) -> Vec<f64> {
        let first_match = match (a.name_tokens.first(), b.name_tokens.first()) {
            (Some(fa), Some(fb)) if fa == fb => 1.0,
            (Some(_), Some(_)) => 0.0,
            _ => 0.5,
        };
        let position_gap = a.author_position.abs_diff(b.author_position) as f64;
        vec![
            jaccard(&a.name_tokens, &b.name_tokens),
            first_match,
            jaccard(&a.affiliations, &b.affiliations),
            jaccard(&a.coauthors, &b.coauthors),
            1.0 / (1.0 + position_gap),
        ]
    }
}

/// Training hyperparameters for [`LinearPairClassifier::fit`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainParams {
    /// Gradient-descent step size.
    pub learning_rate: f64,
    /// Full passes over the training pairs.
    pub epochs: usize,
    /// L2 penalty on the weights (not the bias).
    pub l2: f64,
}

impl Default for TrainParams {
    fn default() -> Self {
        Self {
            learning_rate: 0.5,
            epochs: 300,
            l2: 0.0,
        }
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

/// Logistic regression over pair features.
///
/// Trained by full-batch gradient descent from zero-initialized weights, so
/// fitting is deterministic without any random seed. Parameters serialize as
/// part of the model state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearPairClassifier {
    weights: Vec<f64>,
    bias: f64,
}

impl LinearPairClassifier {
    /// Fit on labeled pairs (`true` = same author).
    ///
    /// # Errors
    ///
    /// [`Error::EmptyInput`] with no pairs, [`Error::DimensionMismatch`] on
    /// ragged feature vectors, [`Error::InvalidParameter`] for a
    /// non-positive learning rate or zero epochs.
    pub fn fit(pairs: &[(Vec<f64>, bool)], params: &TrainParams) -> Result<Self> {
        let Some((first, _)) = pairs.first() else {
            return Err(Error::empty_input("no training pairs"));
        };
        let dim = first.len();
        for (features, _) in pairs {
            if features.len() != dim {
                return Err(Error::DimensionMismatch {
                    expected: dim,
                    actual: features.len(),
                });
            }
        }
        if params.learning_rate <= 0.0 || !params.learning_rate.is_finite() {
            return Err(Error::invalid_parameter(
                "learning_rate",
                format!("must be positive and finite, got {}", params.learning_rate),
            ));
        }
        if params.epochs == 0 {
            return Err(Error::invalid_parameter("epochs", "must be at least 1"));
        }

        let n = pairs.len() as f64;
        let mut weights = vec![0.0; dim];
        let mut bias = 0.0;
        for _ in 0..params.epochs {
            let mut grad_w = vec![0.0; dim];
            let mut grad_b = 0.0;
            for (features, label) in pairs {
                let z = bias
                    + weights
                        .iter()
                        .zip(features)
                        .map(|(w, x)| w * x)
                        .sum::<f64>();
                let residual = sigmoid(z) - f64::from(u8::from(*label));
                for (g, x) in grad_w.iter_mut().zip(features) {
                    *g += residual * x;
                }
                grad_b += residual;
            }
            for (w, g) in weights.iter_mut().zip(&grad_w) {
                *w -= params.learning_rate * (g / n + params.l2 * *w);
            }
            bias -= params.learning_rate * grad_b / n;
        }
        log::debug!(
            "fitted linear classifier: dim={dim}, pairs={}, epochs={}",
            pairs.len(),
            params.epochs
        );
        Ok(Self { weights, bias })
    }

    /// Mean log-loss of the classifier on labeled pairs.
    ///
    /// # Errors
    ///
    /// Same dimension validation as [`PairClassifier::predict_proba`].
    pub fn log_loss(&self, pairs: &[(Vec<f64>, bool)]) -> Result<f64> {
        if pairs.is_empty() {
            return Err(Error::empty_input("no evaluation pairs"));
        }
        let features: Vec<Vec<f64>> = pairs.iter().map(|(f, _)| f.clone()).collect();
        let probs = self.predict_proba(&features)?;
        let eps = 1e-12;
        let total: f64 = probs
            .iter()
            .zip(pairs)
            .map(|(p, (_, label))| {
                let p = p.clamp(eps, 1.0 - eps);
                if *label {
                    -p.ln()
                } else {
                    -(1.0 - p).ln()
                }
            })
            .sum();
        Ok(total / pairs.len() as f64)
    }
}

impl PairClassifier for LinearPairClassifier {
    fn dimension(&self) -> usize {
        self.weights.len()
    }

    fn predict_proba(&self, features: &[Vec<f64>]) -> Result<Vec<f64>> {
        let mut probs = Vec::with_capacity(features.len());
        for vector in features {
            if vector.len() != self.weights.len() {
                return Err(Error::DimensionMismatch {
                    expected: self.weights.len(),
                    actual: vector.len(),
                });
            }
            let z = self.bias
                + self
                    .weights
                    .iter()
                    .zip(vector)
                    .map(|(w, x)| w * x)
                    .sum::<f64>();
            probs.push(sigmoid(z));
        }
        Ok(probs)
    }
}

/// A featurizer and classifier composed into a [`PairScorer`].
pub struct FeaturizedScorer<F, C> {
    featurizer: F,
    classifier: C,
}

impl<F: PairFeaturizer, C: PairClassifier> FeaturizedScorer<F, C> {
    /// Compose a featurizer with a fitted classifier.
    ///
    /// # Errors
    ///
    /// [`Error::DimensionMismatch`] if their dimensions disagree.
    pub fn new(featurizer: F, classifier: C) -> Result<Self> {
        if featurizer.dimension() != classifier.dimension() {
            return Err(Error::DimensionMismatch {
                expected: classifier.dimension(),
                actual: featurizer.dimension(),
            });
        }
        Ok(Self {
            featurizer,
            classifier,
        })
    }

    /// The classifier half, for persistence.
    #[must_use]
    pub fn classifier(&self) -> &C {
        &self.classifier
    }
}

impl<F: PairFeaturizer, C: PairClassifier> PairScorer for FeaturizedScorer<F, C> {
    fn same_author_probability(&self, a: &Signature, b: &Signature) -> Result<f64> {
        let features = self.featurizer.features(a, b);
        let probs = self.classifier.predict_proba(std::slice::from_ref(&features))?;
        Ok(probs[0].clamp(0.0, 1.0))
    }
}

/// Fixed probabilities for explicit id pairs, with a fallback default.
///
/// Lookup is orientation-free. Intended for tests and worked examples where
/// the expected clustering must be checkable by hand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableScorer {
    table: BTreeMap<(String, String), f64>,
    default: f64,
}

impl TableScorer {
    /// Empty table; every pair scores `default`.
    #[must_use]
    pub fn new(default: f64) -> Self {
        Self {
            table: BTreeMap::new(),
            default: default.clamp(0.0, 1.0),
        }
    }

    /// Set the same-author probability for a pair.
    #[must_use]
    pub fn with_pair(mut self, a: impl Into<String>, b: impl Into<String>, p: f64) -> Self {
        let (a, b) = (a.into(), b.into());
        let key = if a <= b { (a, b) } else { (b, a) };
        self.table.insert(key, p.clamp(0.0, 1.0));
        self
    }
}

impl PairScorer for TableScorer {
    fn same_author_probability(&self, a: &Signature, b: &Signature) -> Result<f64> {
        let key = if a.id <= b.id {
            (a.id.clone(), b.id.clone())
        } else {
            (b.id.clone(), a.id.clone())
        };
        Ok(*self.table.get(&key).unwrap_or(&self.default))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(id: &str, tokens: &[&str]) -> Signature {
        Signature::new(id, format!("paper-{id}"), 0, tokens.join(" "))
            .with_name_tokens(tokens.iter().map(ToString::to_string).collect())
    }

    #[test]
    fn baseline_features_are_symmetric() {
        let featurizer = BaselineFeaturizer;
        let a = sig("a", &["nyberg", "a"]).with_affiliations(vec!["cmu".into()]);
        let b = sig("b", &["nyberg", "ann"]).with_affiliations(vec!["cmu".into(), "lti".into()]);
        assert_eq!(featurizer.features(&a, &b), featurizer.features(&b, &a));
        assert_eq!(featurizer.features(&a, &b).len(), BaselineFeaturizer::DIMENSION);
    }

    #[test]
    fn logistic_fit_separates_toy_pairs() {
        let pairs = vec![
            (vec![1.0], true),
            (vec![0.9], true),
            (vec![0.1], false),
            (vec![0.0], false),
        ];
        let params = TrainParams {
            learning_rate: 0.5,
            epochs: 500,
            l2: 0.0,
        };
        let clf = LinearPairClassifier::fit(&pairs, &params).unwrap();
        let probs = clf
            .predict_proba(&[vec![1.0], vec![0.0]])
            .unwrap();
        assert!(probs[0] > 0.6, "positive side scored {}", probs[0]);
        assert!(probs[1] < 0.4, "negative side scored {}", probs[1]);
    }

    #[test]
    fn fit_is_deterministic() {
        let pairs = vec![(vec![1.0, 0.0], true), (vec![0.0, 1.0], false)];
        let a = LinearPairClassifier::fit(&pairs, &TrainParams::default()).unwrap();
        let b = LinearPairClassifier::fit(&pairs, &TrainParams::default()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn predict_rejects_ragged_dimensions() {
        let clf =
            LinearPairClassifier::fit(&[(vec![0.0, 1.0], true)], &TrainParams::default()).unwrap();
        let err = clf.predict_proba(&[vec![1.0]]).unwrap_err();
        assert!(matches!(
            err,
            crate::error::Error::DimensionMismatch {
                expected: 2,
                actual: 1
            }
        ));
    }

    #[test]
    fn fit_rejects_empty_and_bad_params() {
        assert!(LinearPairClassifier::fit(&[], &TrainParams::default()).is_err());
        let bad = TrainParams {
            learning_rate: 0.0,
            ..TrainParams::default()
        };
        assert!(LinearPairClassifier::fit(&[(vec![1.0], true)], &bad).is_err());
    }

    #[test]
    fn featurized_scorer_checks_dimensions() {
        let clf =
            LinearPairClassifier::fit(&[(vec![1.0, 2.0], true)], &TrainParams::default()).unwrap();
        assert!(FeaturizedScorer::new(BaselineFeaturizer, clf).is_err());
    }

    #[test]
    fn table_scorer_is_orientation_free() {
        let scorer = TableScorer::new(0.2).with_pair("a", "b", 0.95);
        let a = sig("a", &[]);
        let b = sig("b", &[]);
        let c = sig("c", &[]);
        assert_eq!(scorer.same_author_probability(&a, &b).unwrap(), 0.95);
        assert_eq!(scorer.same_author_probability(&b, &a).unwrap(), 0.95);
        assert_eq!(scorer.same_author_probability(&a, &c).unwrap(), 0.2);
    }

    #[test]
    fn classifier_round_trips_through_json() {
        let clf =
            LinearPairClassifier::fit(&[(vec![1.0], true), (vec![0.0], false)], &TrainParams::default())
                .unwrap();
        let json = serde_json::to_string(&clf).unwrap();
        let back: LinearPairClassifier = serde_json::from_str(&json).unwrap();
        assert_eq!(back, clf);
    }
}
