//! Alternative-score regression model
//!
//! Learns the corpus labelling heuristic from synthesized drug pairs with a
//! deterministic gradient-boosted tree ensemble. Training is reproducible for
//! a given corpus and seed, and trained models round-trip through JSON so a
//! scoring run can reuse a model without retraining.

pub mod corpus;
pub mod features;
mod gbt;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::config::TrainingConfig;

pub use corpus::{alternative_score, synthesize, TrainingExample};
pub use features::{build_features, FeatureVector, FEATURE_NAMES};
pub use gbt::{BoostingParams, GradientBoostedRegressor};

#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("training corpus is empty: no therapeutic class has two distinct drugs")]
    EmptyCorpus,
    #[error("invalid training parameters: {0}")]
    InvalidParameters(String),
    #[error("model serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("model file is malformed: {0}")]
    InvalidModel(String),
}

/// Anything that can score a candidate replacement. Higher is better.
pub trait ScoringModel: Send + Sync {
    fn predict(&self, features: &FeatureVector) -> f64;
}

/// Scores with the labelling heuristic itself instead of a learned model.
#[derive(Clone, Copy, Debug, Default)]
pub struct HeuristicScorer;

impl ScoringModel for HeuristicScorer {
    fn predict(&self, features: &FeatureVector) -> f64 {
        alternative_score(features)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrainingParams {
    pub boosting: BoostingParams,
    pub test_fraction: f64,
    pub seed: u64,
}

impl Default for TrainingParams {
    fn default() -> Self {
        Self { boosting: BoostingParams::default(), test_fraction: 0.2, seed: 42 }
    }
}

impl From<&TrainingConfig> for TrainingParams {
    fn from(config: &TrainingConfig) -> Self {
        Self {
            boosting: BoostingParams {
                n_estimators: config.n_estimators,
                learning_rate: config.learning_rate,
                max_depth: config.max_depth,
                min_samples_leaf: config.min_samples_leaf,
            },
            test_fraction: config.test_fraction,
            seed: config.seed,
        }
    }
}

impl TrainingParams {
    fn validate(&self) -> Result<(), TrainingError> {
        if self.boosting.n_estimators == 0 {
            return Err(TrainingError::InvalidParameters("n_estimators must be > 0".into()));
        }
        if !(self.boosting.learning_rate > 0.0 && self.boosting.learning_rate <= 1.0) {
            return Err(TrainingError::InvalidParameters(
                "learning_rate must be in (0, 1]".into(),
            ));
        }
        if self.boosting.max_depth == 0 {
            return Err(TrainingError::InvalidParameters("max_depth must be > 0".into()));
        }
        if !(0.0..1.0).contains(&self.test_fraction) {
            return Err(TrainingError::InvalidParameters(
                "test_fraction must be in [0, 1)".into(),
            ));
        }
        Ok(())
    }
}

/// Trained regressor with version and metadata
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrainedModel {
    pub version: String,
    pub trained_at: DateTime<Utc>,
    pub training_samples: usize,
    pub validation_samples: usize,
    /// `None` when the corpus was too small to hold anything out.
    pub validation_rmse: Option<f64>,
    pub feature_names: Vec<String>,
    regressor: GradientBoostedRegressor,
}

impl TrainedModel {
    pub fn to_json(&self) -> Result<String, TrainingError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parses a saved model and rejects trees that could not have been
    /// produced by fitting.
    pub fn from_json(json: &str) -> Result<Self, TrainingError> {
        let model: Self = serde_json::from_str(json)?;
        if model.feature_names.len() != FeatureVector::DIM {
            return Err(TrainingError::InvalidModel(format!(
                "expected {} feature names, found {}",
                FeatureVector::DIM,
                model.feature_names.len()
            )));
        }
        model.regressor.validate().map_err(TrainingError::InvalidModel)?;
        Ok(model)
    }

    pub fn tree_count(&self) -> usize {
        self.regressor.tree_count()
    }
}

impl ScoringModel for TrainedModel {
    fn predict(&self, features: &FeatureVector) -> f64 {
        self.regressor.predict(&features.to_array())
    }
}

/// Shuffled `(train, test)` index split. Training is never empty for a
/// non-empty corpus.
pub fn train_test_split(len: usize, test_fraction: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut indices: Vec<usize> = (0..len).collect();
    indices.shuffle(&mut StdRng::seed_from_u64(seed));

    let test_size = ((len as f64) * test_fraction).ceil() as usize;
    let test_size = test_size.min(len.saturating_sub(1));
    let train = indices.split_off(test_size);
    (train, indices)
}

pub fn rmse(model: &dyn ScoringModel, examples: &[&TrainingExample]) -> Option<f64> {
    if examples.is_empty() {
        return None;
    }
    let squared: f64 = examples
        .iter()
        .map(|example| {
            let error = model.predict(&example.features) - example.alternative_score;
            error * error
        })
        .sum();
    Some((squared / examples.len() as f64).sqrt())
}

pub fn train(
    examples: &[TrainingExample],
    params: &TrainingParams,
) -> Result<TrainedModel, TrainingError> {
    if examples.is_empty() {
        return Err(TrainingError::EmptyCorpus);
    }
    params.validate()?;

    let (train_idx, test_idx) = train_test_split(examples.len(), params.test_fraction, params.seed);
    let rows: Vec<_> = train_idx.iter().map(|&i| examples[i].features.to_array()).collect();
    let targets: Vec<f64> = train_idx.iter().map(|&i| examples[i].alternative_score).collect();

    let regressor = GradientBoostedRegressor::fit(&rows, &targets, &params.boosting);
    let mut model = TrainedModel {
        version: Uuid::new_v4().to_string(),
        trained_at: Utc::now(),
        training_samples: train_idx.len(),
        validation_samples: test_idx.len(),
        validation_rmse: None,
        feature_names: FEATURE_NAMES.iter().map(|name| name.to_string()).collect(),
        regressor,
    };

    let held_out: Vec<&TrainingExample> = test_idx.iter().map(|&i| &examples[i]).collect();
    model.validation_rmse = rmse(&model, &held_out);

    info!(
        event_name = "rxalt.model.trained",
        version = %model.version,
        training_samples = model.training_samples,
        validation_samples = model.validation_samples,
        trees = model.tree_count(),
        validation_rmse = ?model.validation_rmse,
        "alternative-score model trained"
    );
    Ok(model)
}
