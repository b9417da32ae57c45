//! # Claim Prediction
//!
//! Two capabilities produce a claim verdict:
//!
//! - [`StressClassifier`]: is the parcel stressed, and with what probability
//! - [`PayoutEstimator`]: what percentage of cover should be paid out
//!
//! Both are injected into [`PredictionService`] at construction time. The
//! service holds no state beyond the loaded model parameters, so identical
//! inputs always produce identical verdicts for a given model version.

pub mod models;

use crate::config::pipeline::STRESS_THRESHOLD;
use crate::error::{ClaimError, ClaimResult};
use crate::features::{MergedFeatures, PayoutFeatures, StressFeatures};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

pub use models::{
    HeuristicPayoutModel, HeuristicStressModel, LinearPayoutModel, LogisticStressModel,
    ModelArtifacts,
};

/// Output of the stress classifier
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct StressAssessment {
    pub is_stressed: bool,
    /// Always within [0, 1]
    pub probability: f64,
}

impl StressAssessment {
    /// Build an assessment from a raw probability using the stress threshold
    pub fn from_probability(probability: f64) -> ClaimResult<Self> {
        let probability = checked(probability, "stress probability")?.clamp(0.0, 1.0);
        Ok(Self {
            is_stressed: probability >= STRESS_THRESHOLD,
            probability,
        })
    }
}

/// Model 1: crop stress classification
pub trait StressClassifier: Send + Sync {
    fn classify(&self, features: &StressFeatures) -> ClaimResult<StressAssessment>;

    fn model_version(&self) -> String;
}

/// Model 2: payout percentage estimation, in [0, 100]
pub trait PayoutEstimator: Send + Sync {
    fn estimate(&self, features: &PayoutFeatures) -> ClaimResult<f64>;

    fn model_version(&self) -> String;
}

/// The decision recorded against a claim
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Verdict {
    pub is_stressed: bool,
    pub stress_probability: f64,
    pub payout_percentage: f64,
    pub stress_model_version: String,
    pub payout_model_version: String,
}

impl Verdict {
    /// Stress level as sent to the ledger (0 or 1)
    pub fn stress_level(&self) -> u8 {
        u8::from(self.is_stressed)
    }
}

/// Runs both predictors over a merged feature set
#[derive(Clone)]
pub struct PredictionService {
    classifier: Arc<dyn StressClassifier>,
    estimator: Arc<dyn PayoutEstimator>,
}

impl std::fmt::Debug for PredictionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PredictionService")
            .field("stress_model", &self.classifier.model_version())
            .field("payout_model", &self.estimator.model_version())
            .finish()
    }
}

impl PredictionService {
    pub fn new(classifier: Arc<dyn StressClassifier>, estimator: Arc<dyn PayoutEstimator>) -> Self {
        Self {
            classifier,
            estimator,
        }
    }

    /// Closed-form reference models, used when no trained artifacts are available
    pub fn heuristic() -> Self {
        Self::new(
            Arc::new(HeuristicStressModel),
            Arc::new(HeuristicPayoutModel),
        )
    }

    /// Load trained parameters from a JSON artifact file.
    ///
    /// Sections missing from the file fall back to the heuristic models. An
    /// unreadable or malformed file is a configuration error: callers are
    /// expected to treat it as fatal at startup.
    pub fn from_artifacts(path: &Path) -> ClaimResult<Self> {
        let artifacts = ModelArtifacts::load(path)?;

        let classifier: Arc<dyn StressClassifier> = match artifacts.stress {
            Some(model) => Arc::new(model),
            None => {
                log::info!("No stress model in {}; using heuristic", path.display());
                Arc::new(HeuristicStressModel)
            }
        };
        let estimator: Arc<dyn PayoutEstimator> = match artifacts.payout {
            Some(model) => Arc::new(model),
            None => {
                log::info!("No payout model in {}; using heuristic", path.display());
                Arc::new(HeuristicPayoutModel)
            }
        };

        let service = Self::new(classifier, estimator);
        log::info!("Loaded prediction models: {:?}", service);
        Ok(service)
    }

    pub fn stress_model_version(&self) -> String {
        self.classifier.model_version()
    }

    pub fn payout_model_version(&self) -> String {
        self.estimator.model_version()
    }

    /// Classify stress on its own
    pub fn classify_stress(&self, features: &StressFeatures) -> ClaimResult<StressAssessment> {
        let assessment = self.classifier.classify(features)?;
        let probability = checked(assessment.probability, "stress probability")?;
        Ok(StressAssessment {
            is_stressed: assessment.is_stressed,
            probability: probability.clamp(0.0, 1.0),
        })
    }

    /// Estimate the payout on its own, clamped into [0, 100]
    pub fn estimate_payout(&self, features: &PayoutFeatures) -> ClaimResult<f64> {
        let payout = self.estimator.estimate(features)?;
        Ok(checked(payout, "payout percentage")?.clamp(0.0, 100.0))
    }

    /// Run both models and combine their outputs into a verdict
    pub fn predict(&self, features: &MergedFeatures) -> ClaimResult<Verdict> {
        let assessment = self.classify_stress(&features.stress)?;
        let payout = self.estimate_payout(&features.payout)?;

        log::debug!(
            "Prediction: stressed={} p={:.4} payout={:.2}%",
            assessment.is_stressed,
            assessment.probability,
            payout
        );

        Ok(Verdict {
            is_stressed: assessment.is_stressed,
            stress_probability: assessment.probability,
            payout_percentage: payout,
            stress_model_version: self.classifier.model_version(),
            payout_model_version: self.estimator.model_version(),
        })
    }
}

fn checked(value: f64, what: &str) -> ClaimResult<f64> {
    if value.is_nan() {
        Err(ClaimError::inference(format!("model produced NaN {}", what)))
    } else {
        Ok(value)
    }
}
