//! # Land Registry
//!
//! Verified farmer/land references supplied by the registration service. The
//! pipeline only needs to answer "does this land belong to this farmer, and
//! what does it grow", so the registry is a small lookup trait.

use crate::error::{ClaimError, ClaimResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::RwLock;

/// A registered parcel
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct LandRecord {
    pub land_id: u64,
    pub farmer_id: u64,
    /// Crop name as recorded at registration, e.g. `Maize`
    pub crop_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub land_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub farmer_wallet: Option<String>,
}

pub trait LandRegistry: Send + Sync {
    fn land(&self, land_id: u64) -> Option<LandRecord>;

    /// The land record, provided it is registered to `farmer_id`
    fn verify(&self, land_id: u64, farmer_id: u64) -> ClaimResult<LandRecord> {
        match self.land(land_id) {
            Some(land) if land.farmer_id == farmer_id => Ok(land),
            _ => Err(ClaimError::InvalidReference { land_id, farmer_id }),
        }
    }
}

/// Registry held in memory, optionally loaded from a JSON export
#[derive(Debug, Default)]
pub struct StaticLandRegistry {
    lands: RwLock<HashMap<u64, LandRecord>>,
}

impl StaticLandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lands(lands: impl IntoIterator<Item = LandRecord>) -> Self {
        let registry = Self::new();
        for land in lands {
            registry.insert(land);
        }
        registry
    }

    /// Load an array of land records
    pub fn from_file(path: &Path) -> ClaimResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            ClaimError::config(format!("Cannot read land registry {}: {}", path.display(), e))
        })?;
        let lands: Vec<LandRecord> = serde_json::from_str(&content).map_err(|e| {
            ClaimError::config(format!("Malformed land registry {}: {}", path.display(), e))
        })?;

        log::info!("Loaded {} lands from {}", lands.len(), path.display());
        Ok(Self::with_lands(lands))
    }

    pub fn insert(&self, land: LandRecord) {
        let mut lands = self.lands.write().unwrap_or_else(|e| e.into_inner());
        if lands.insert(land.land_id, land.clone()).is_some() {
            log::warn!("Land {} registered twice; keeping the later record", land.land_id);
        }
    }

    pub fn len(&self) -> usize {
        self.lands.read().map(|l| l.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LandRegistry for StaticLandRegistry {
    fn land(&self, land_id: u64) -> Option<LandRecord> {
        self.lands
            .read()
            .ok()
            .and_then(|lands| lands.get(&land_id).cloned())
    }
}
