//! # Feature Payloads
//!
//! Raw request payloads arrive as loosely typed key/value maps. This module
//! turns them into the two typed records the predictors consume:
//!
//! - [`StressFeatures`]: input of the stress classifier (model 1)
//! - [`PayoutFeatures`]: input of the payout estimator (model 2)
//!
//! The two schemas overlap. [`FeatureMerger`] completes a payout payload from
//! the stress payload and the land's recorded crop, then validates both
//! records at the boundary so missing keys are reported instead of being
//! silently replaced by zero.

use crate::error::{ClaimError, ClaimResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Raw feature payload as received from a caller
pub type FeatureMap = BTreeMap<String, Value>;

/// Feature key names, exactly as they appear on the wire
pub mod keys {
    pub const NDVI: &str = "NDVI";
    pub const SAVI: &str = "SAVI";
    pub const CHLOROPHYLL_CONTENT: &str = "Chlorophyll_Content";
    pub const LEAF_AREA_INDEX: &str = "Leaf_Area_Index";
    pub const TEMPERATURE: &str = "Temperature";
    pub const HUMIDITY: &str = "Humidity";
    pub const RAINFALL: &str = "Rainfall";
    pub const SOIL_MOISTURE: &str = "Soil_Moisture";
    pub const EXPECTED_YIELD: &str = "Expected_Yield";
    pub const CROP_STRESS_INDICATOR: &str = "Crop_Stress_Indicator";
    pub const CANOPY_COVERAGE: &str = "Canopy_Coverage";
    pub const PEST_DAMAGE: &str = "Pest_Damage";
    pub const CROP_TYPE: &str = "Crop_Type";
    pub const CROP_TYPE_ENCODED: &str = "Crop_Type_encoded";
}

/// Model 1 inputs, in the order the classifier expects them
pub const STRESS_KEYS: [&str; 8] = [
    keys::NDVI,
    keys::SAVI,
    keys::CHLOROPHYLL_CONTENT,
    keys::LEAF_AREA_INDEX,
    keys::TEMPERATURE,
    keys::HUMIDITY,
    keys::RAINFALL,
    keys::SOIL_MOISTURE,
];

/// Model 2 inputs, in the order the estimator expects them
pub const PAYOUT_KEYS: [&str; 10] = [
    keys::NDVI,
    keys::EXPECTED_YIELD,
    keys::CROP_STRESS_INDICATOR,
    keys::TEMPERATURE,
    keys::RAINFALL,
    keys::SOIL_MOISTURE,
    keys::CROP_TYPE_ENCODED,
    keys::CANOPY_COVERAGE,
    keys::PEST_DAMAGE,
    keys::LEAF_AREA_INDEX,
];

/// Version of [`OVERLAP_KEYS_V1`], recorded in every claim snapshot
pub const OVERLAP_VERSION: u32 = 1;

/// Keys shared by both schemas; copied from the stress payload when the
/// payout payload lacks them.
pub const OVERLAP_KEYS_V1: [&str; 5] = [
    keys::NDVI,
    keys::LEAF_AREA_INDEX,
    keys::TEMPERATURE,
    keys::RAINFALL,
    keys::SOIL_MOISTURE,
];

/// Crop categories known to the payout model
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum CropType {
    Wheat,
    Maize,
    Rice,
}

impl CropType {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim() {
            "Wheat" => Some(CropType::Wheat),
            "Maize" => Some(CropType::Maize),
            "Rice" => Some(CropType::Rice),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            CropType::Wheat => 0,
            CropType::Maize => 1,
            CropType::Rice => 2,
        }
    }
}

impl fmt::Display for CropType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CropType::Wheat => write!(f, "Wheat"),
            CropType::Maize => write!(f, "Maize"),
            CropType::Rice => write!(f, "Rice"),
        }
    }
}

/// Encode a crop name for the payout model.
///
/// Unknown names encode to 0, the same code as Wheat. This keeps payloads
/// built for the deployed model scoring identically; it also means an
/// unrecognised crop is priced as wheat.
pub fn encode_crop_name(name: &str) -> u8 {
    match CropType::from_name(name) {
        Some(crop) => crop.code(),
        None => {
            log::warn!(
                "Unknown crop type {:?}; encoding as {} ({})",
                name,
                CropType::Wheat.code(),
                CropType::Wheat
            );
            CropType::Wheat.code()
        }
    }
}

/// Typed stress-classifier input
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct StressFeatures {
    #[serde(rename = "NDVI")]
    pub ndvi: f64,
    #[serde(rename = "SAVI")]
    pub savi: f64,
    #[serde(rename = "Chlorophyll_Content")]
    pub chlorophyll_content: f64,
    #[serde(rename = "Leaf_Area_Index")]
    pub leaf_area_index: f64,
    #[serde(rename = "Temperature")]
    pub temperature: f64,
    #[serde(rename = "Humidity")]
    pub humidity: f64,
    #[serde(rename = "Rainfall")]
    pub rainfall: f64,
    #[serde(rename = "Soil_Moisture")]
    pub soil_moisture: f64,

    /// Optional auxiliary signal; outside the required set
    #[serde(
        rename = "Crop_Stress_Indicator",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub crop_stress_indicator: Option<f64>,
}

impl StressFeatures {
    /// Validate a raw payload against the stress schema
    pub fn from_map(map: &FeatureMap) -> ClaimResult<Self> {
        let reader = SchemaReader::new("stress", map, &STRESS_KEYS)?;
        let optional = [keys::CROP_STRESS_INDICATOR];
        reader.report_extra(&optional);

        Ok(Self {
            ndvi: reader.number(keys::NDVI)?,
            savi: reader.number(keys::SAVI)?,
            chlorophyll_content: reader.number(keys::CHLOROPHYLL_CONTENT)?,
            leaf_area_index: reader.number(keys::LEAF_AREA_INDEX)?,
            temperature: reader.number(keys::TEMPERATURE)?,
            humidity: reader.number(keys::HUMIDITY)?,
            rainfall: reader.number(keys::RAINFALL)?,
            soil_moisture: reader.number(keys::SOIL_MOISTURE)?,
            crop_stress_indicator: reader.optional_number(keys::CROP_STRESS_INDICATOR)?,
        })
    }

    /// Feature vector in [`STRESS_KEYS`] order
    pub fn to_vector(&self) -> [f64; 8] {
        [
            self.ndvi,
            self.savi,
            self.chlorophyll_content,
            self.leaf_area_index,
            self.temperature,
            self.humidity,
            self.rainfall,
            self.soil_moisture,
        ]
    }
}

/// Typed payout-estimator input
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PayoutFeatures {
    #[serde(rename = "NDVI")]
    pub ndvi: f64,
    #[serde(rename = "Expected_Yield")]
    pub expected_yield: f64,
    #[serde(rename = "Crop_Stress_Indicator")]
    pub crop_stress_indicator: f64,
    #[serde(rename = "Temperature")]
    pub temperature: f64,
    #[serde(rename = "Rainfall")]
    pub rainfall: f64,
    #[serde(rename = "Soil_Moisture")]
    pub soil_moisture: f64,
    #[serde(rename = "Crop_Type_encoded")]
    pub crop_type_encoded: f64,
    #[serde(rename = "Canopy_Coverage")]
    pub canopy_coverage: f64,
    #[serde(rename = "Pest_Damage")]
    pub pest_damage: f64,
    #[serde(rename = "Leaf_Area_Index")]
    pub leaf_area_index: f64,
}

impl PayoutFeatures {
    /// Validate a merged payload against the payout schema
    pub fn from_map(map: &FeatureMap) -> ClaimResult<Self> {
        let reader = SchemaReader::new("payout", map, &PAYOUT_KEYS)?;
        reader.report_extra(&[keys::CROP_TYPE]);

        Ok(Self {
            ndvi: reader.number(keys::NDVI)?,
            expected_yield: reader.number(keys::EXPECTED_YIELD)?,
            crop_stress_indicator: reader.number(keys::CROP_STRESS_INDICATOR)?,
            temperature: reader.number(keys::TEMPERATURE)?,
            rainfall: reader.number(keys::RAINFALL)?,
            soil_moisture: reader.number(keys::SOIL_MOISTURE)?,
            crop_type_encoded: reader.number(keys::CROP_TYPE_ENCODED)?,
            canopy_coverage: reader.number(keys::CANOPY_COVERAGE)?,
            pest_damage: reader.number(keys::PEST_DAMAGE)?,
            leaf_area_index: reader.number(keys::LEAF_AREA_INDEX)?,
        })
    }

    /// Feature vector in [`PAYOUT_KEYS`] order
    pub fn to_vector(&self) -> [f64; 10] {
        [
            self.ndvi,
            self.expected_yield,
            self.crop_stress_indicator,
            self.temperature,
            self.rainfall,
            self.soil_moisture,
            self.crop_type_encoded,
            self.canopy_coverage,
            self.pest_damage,
            self.leaf_area_index,
        ]
    }
}

/// The exact inputs both predictors saw, kept with the claim for audit
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct MergedFeatures {
    pub stress: StressFeatures,
    pub payout: PayoutFeatures,
    /// Crop name the encoding was derived from, if any
    pub crop_type: Option<String>,
    pub overlap_version: u32,
}

/// Completes payout payloads from stress payloads and land records
#[derive(Debug, Clone)]
pub struct FeatureMerger {
    overlap: &'static [&'static str],
    version: u32,
}

impl Default for FeatureMerger {
    fn default() -> Self {
        Self {
            overlap: &OVERLAP_KEYS_V1,
            version: OVERLAP_VERSION,
        }
    }
}

impl FeatureMerger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map-level merge.
    ///
    /// 1. Overlap keys present in `stress` but absent from `payout` are copied.
    /// 2. A missing `Crop_Type` is filled with the land's recorded crop.
    /// 3. A `Crop_Type` name without `Crop_Type_encoded` is encoded.
    ///
    /// Keys already present in `payout` are never overwritten, so applying the
    /// merge to its own output changes nothing.
    pub fn merge_maps(
        &self,
        stress: &FeatureMap,
        payout: &FeatureMap,
        land_crop_type: &str,
    ) -> FeatureMap {
        let mut merged = payout.clone();

        for key in self.overlap {
            if let Some(value) = stress.get(*key) {
                merged
                    .entry((*key).to_string())
                    .or_insert_with(|| value.clone());
            }
        }

        merged
            .entry(keys::CROP_TYPE.to_string())
            .or_insert_with(|| Value::String(land_crop_type.to_string()));

        if !merged.contains_key(keys::CROP_TYPE_ENCODED) {
            let code = match merged.get(keys::CROP_TYPE) {
                Some(Value::String(name)) => encode_crop_name(name),
                Some(other) => {
                    log::warn!("Non-text crop type {}; encoding as 0", other);
                    0
                }
                None => 0,
            };
            merged.insert(keys::CROP_TYPE_ENCODED.to_string(), Value::from(code));
        }

        merged
    }

    /// Merge and validate both payloads into typed records
    pub fn merge(
        &self,
        stress: &FeatureMap,
        payout: &FeatureMap,
        land_crop_type: &str,
    ) -> ClaimResult<MergedFeatures> {
        let stress_features = StressFeatures::from_map(stress)?;
        let merged = self.merge_maps(stress, payout, land_crop_type);
        let payout_features = PayoutFeatures::from_map(&merged)?;

        let crop_type = match merged.get(keys::CROP_TYPE) {
            Some(Value::String(name)) => Some(name.clone()),
            _ => None,
        };

        Ok(MergedFeatures {
            stress: stress_features,
            payout: payout_features,
            crop_type,
            overlap_version: self.version,
        })
    }
}

/// Reads numeric values for one schema, after checking every key is present
struct SchemaReader<'a> {
    schema: &'static str,
    map: &'a FeatureMap,
    required: &'a [&'a str],
}

impl<'a> SchemaReader<'a> {
    fn new(
        schema: &'static str,
        map: &'a FeatureMap,
        required: &'a [&'a str],
    ) -> ClaimResult<Self> {
        let missing: Vec<String> = required
            .iter()
            .filter(|key| map.get(**key).map_or(true, Value::is_null))
            .map(|key| key.to_string())
            .collect();

        if !missing.is_empty() {
            return Err(ClaimError::IncompleteFeatures { schema, missing });
        }

        Ok(Self {
            schema,
            map,
            required,
        })
    }

    fn report_extra(&self, optional: &[&str]) {
        let extra: Vec<&str> = self
            .map
            .keys()
            .map(String::as_str)
            .filter(|key| !self.required.contains(key) && !optional.contains(key))
            .collect();
        if !extra.is_empty() {
            log::debug!("Ignoring keys outside the {} schema: {:?}", self.schema, extra);
        }
    }

    fn number(&self, key: &str) -> ClaimResult<f64> {
        self.optional_number(key)?.ok_or_else(|| ClaimError::IncompleteFeatures {
            schema: self.schema,
            missing: vec![key.to_string()],
        })
    }

    fn optional_number(&self, key: &str) -> ClaimResult<Option<f64>> {
        let value = match self.map.get(key) {
            None | Some(Value::Null) => return Ok(None),
            Some(value) => value,
        };

        let number = match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };

        match number {
            Some(n) if n.is_finite() => Ok(Some(n)),
            _ => Err(ClaimError::inference(format!(
                "{} feature {} is not a finite number: {}",
                self.schema, key, value
            ))),
        }
    }
}
