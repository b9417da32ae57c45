//! Concrete predictors: closed-form heuristics and parameterised models
//! loaded from a JSON artifact file.

use super::{PayoutEstimator, StressAssessment, StressClassifier};
use crate::error::{ClaimError, ClaimResult};
use crate::features::{PayoutFeatures, StressFeatures, PAYOUT_KEYS, STRESS_KEYS};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Stress probability from vegetation index and the optional stress indicator.
///
/// `p = clamp(1 - 0.8 * NDVI + CSI / 200, 0, 1)`; a missing indicator counts
/// as zero since it sits outside the required stress schema.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicStressModel;

impl StressClassifier for HeuristicStressModel {
    fn classify(&self, features: &StressFeatures) -> ClaimResult<StressAssessment> {
        let indicator = features.crop_stress_indicator.unwrap_or(0.0);
        let probability = 1.0 - features.ndvi * 0.8 + indicator / 200.0;
        StressAssessment::from_probability(probability.clamp(0.0, 1.0))
    }

    fn model_version(&self) -> String {
        "heuristic-stress-v1".to_string()
    }
}

/// Payout percentage as `max(0, CSI / 100 * 80 + (1 - NDVI) * 20)`, capped at 100
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicPayoutModel;

impl PayoutEstimator for HeuristicPayoutModel {
    fn estimate(&self, features: &PayoutFeatures) -> ClaimResult<f64> {
        let base = (features.crop_stress_indicator / 100.0) * 80.0 + (1.0 - features.ndvi) * 20.0;
        Ok(base.max(0.0).min(100.0))
    }

    fn model_version(&self) -> String {
        "heuristic-payout-v1".to_string()
    }
}

/// Standard-scaled features through a logistic layer
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LogisticStressModel {
    pub version: String,
    pub means: BTreeMap<String, f64>,
    pub scales: BTreeMap<String, f64>,
    pub weights: BTreeMap<String, f64>,
    pub intercept: f64,
}

impl LogisticStressModel {
    fn validate(&self) -> ClaimResult<()> {
        for (name, table) in [
            ("means", &self.means),
            ("scales", &self.scales),
            ("weights", &self.weights),
        ] {
            require_keys(&format!("stress {}", name), table, &STRESS_KEYS)?;
        }
        Ok(())
    }
}

impl StressClassifier for LogisticStressModel {
    fn classify(&self, features: &StressFeatures) -> ClaimResult<StressAssessment> {
        let mut z = self.intercept;
        for (key, value) in STRESS_KEYS.iter().zip(features.to_vector()) {
            let mean = lookup(&self.means, key)?;
            let scale = match lookup(&self.scales, key)? {
                s if s == 0.0 => 1.0,
                s => s,
            };
            z += lookup(&self.weights, key)? * (value - mean) / scale;
        }
        StressAssessment::from_probability(1.0 / (1.0 + (-z).exp()))
    }

    fn model_version(&self) -> String {
        self.version.clone()
    }
}

/// Weighted sum over the payout vector, clamped into [0, 100]
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LinearPayoutModel {
    pub version: String,
    pub weights: BTreeMap<String, f64>,
    pub intercept: f64,
}

impl LinearPayoutModel {
    fn validate(&self) -> ClaimResult<()> {
        require_keys("payout weights", &self.weights, &PAYOUT_KEYS)
    }
}

impl PayoutEstimator for LinearPayoutModel {
    fn estimate(&self, features: &PayoutFeatures) -> ClaimResult<f64> {
        let mut total = self.intercept;
        for (key, value) in PAYOUT_KEYS.iter().zip(features.to_vector()) {
            total += lookup(&self.weights, key)? * value;
        }
        if total.is_nan() {
            return Err(ClaimError::inference("payout model produced NaN"));
        }
        Ok(total.clamp(0.0, 100.0))
    }

    fn model_version(&self) -> String {
        self.version.clone()
    }
}

/// Contents of a model artifact file
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ModelArtifacts {
    #[serde(default)]
    pub stress: Option<LogisticStressModel>,
    #[serde(default)]
    pub payout: Option<LinearPayoutModel>,
}

impl ModelArtifacts {
    pub fn load(path: &Path) -> ClaimResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            ClaimError::config(format!(
                "Cannot read model artifacts {}: {}",
                path.display(),
                e
            ))
        })?;
        let artifacts: ModelArtifacts = serde_json::from_str(&content).map_err(|e| {
            ClaimError::config(format!(
                "Malformed model artifacts {}: {}",
                path.display(),
                e
            ))
        })?;

        if let Some(stress) = &artifacts.stress {
            stress.validate()?;
        }
        if let Some(payout) = &artifacts.payout {
            payout.validate()?;
        }
        Ok(artifacts)
    }
}

fn require_keys(table: &str, values: &BTreeMap<String, f64>, required: &[&str]) -> ClaimResult<()> {
    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|key| !values.contains_key(*key))
        .collect();
    if !missing.is_empty() {
        return Err(ClaimError::config(format!(
            "Model artifact table {} lacks {}",
            table,
            missing.join(", ")
        )));
    }
    if let Some((key, _)) = values.iter().find(|(_, v)| !v.is_finite()) {
        return Err(ClaimError::config(format!(
            "Model artifact table {} has a non-finite value for {}",
            table, key
        )));
    }
    Ok(())
}

fn lookup(table: &BTreeMap<String, f64>, key: &str) -> ClaimResult<f64> {
    table
        .get(key)
        .copied()
        .ok_or_else(|| ClaimError::inference(format!("model parameter missing for {}", key)))
}
