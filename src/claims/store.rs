use super::model::{ClaimId, ClaimRecord, ClaimStatus, Transition};
use crate::error::{ClaimError, ClaimResult};
use crate::utils::fs::{ensure_dir_exists, write_file_atomic};
use chrono::Utc;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// Result of a stored transition
#[derive(Debug, Clone)]
pub struct TransitionOutcome {
    pub record: ClaimRecord,
    /// `false` when the claim already reflected the transition
    pub changed: bool,
}

/// Durable claim storage keyed by claim id.
///
/// `transition` reads the current record, applies the change and persists it
/// under one lock, so two callers can never both act on the same prior state.
pub trait ClaimStore: Send + Sync {
    fn create(&self, land_id: u64, farmer_id: u64) -> ClaimResult<ClaimRecord>;

    fn get(&self, id: ClaimId) -> ClaimResult<ClaimRecord>;

    fn transition(&self, id: ClaimId, transition: Transition) -> ClaimResult<TransitionOutcome>;

    /// All claims in id order, optionally only those in one status
    fn list(&self, status: Option<ClaimStatus>) -> ClaimResult<Vec<ClaimRecord>>;
}

#[derive(Debug, Default)]
struct ClaimTable {
    last_id: u64,
    claims: BTreeMap<ClaimId, ClaimRecord>,
}

impl ClaimTable {
    fn create(
        &mut self,
        land_id: u64,
        farmer_id: u64,
        persist: impl FnOnce(&ClaimRecord) -> ClaimResult<()>,
    ) -> ClaimResult<ClaimRecord> {
        let id = ClaimId(self.last_id + 1);
        let record = ClaimRecord::new(id, land_id, farmer_id, Utc::now());
        persist(&record)?;

        self.last_id = id.0;
        self.claims.insert(id, record.clone());
        log::info!("Created claim {} for land {} (farmer {})", id, land_id, farmer_id);
        Ok(record)
    }

    fn get(&self, id: ClaimId) -> ClaimResult<ClaimRecord> {
        self.claims
            .get(&id)
            .cloned()
            .ok_or(ClaimError::ClaimNotFound { claim_id: id.0 })
    }

    fn transition(
        &mut self,
        id: ClaimId,
        transition: Transition,
        persist: impl FnOnce(&ClaimRecord) -> ClaimResult<()>,
    ) -> ClaimResult<TransitionOutcome> {
        let mut record = self.get(id)?;
        let changed = record.apply(transition, Utc::now())?;
        if changed {
            persist(&record)?;
            self.claims.insert(id, record.clone());
        }
        Ok(TransitionOutcome { record, changed })
    }

    fn list(&self, status: Option<ClaimStatus>) -> Vec<ClaimRecord> {
        self.claims
            .values()
            .filter(|record| status.map_or(true, |s| record.status() == s))
            .cloned()
            .collect()
    }
}

fn lock(table: &Mutex<ClaimTable>) -> ClaimResult<MutexGuard<'_, ClaimTable>> {
    table
        .lock()
        .map_err(|_| ClaimError::storage("claim store lock poisoned"))
}

/// Process-local store, used by tests and simulated runs
#[derive(Debug, Default)]
pub struct InMemoryClaimStore {
    table: Mutex<ClaimTable>,
}

impl InMemoryClaimStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ClaimStore for InMemoryClaimStore {
    fn create(&self, land_id: u64, farmer_id: u64) -> ClaimResult<ClaimRecord> {
        lock(&self.table)?.create(land_id, farmer_id, |_| Ok(()))
    }

    fn get(&self, id: ClaimId) -> ClaimResult<ClaimRecord> {
        lock(&self.table)?.get(id)
    }

    fn transition(&self, id: ClaimId, transition: Transition) -> ClaimResult<TransitionOutcome> {
        lock(&self.table)?.transition(id, transition, |_| Ok(()))
    }

    fn list(&self, status: Option<ClaimStatus>) -> ClaimResult<Vec<ClaimRecord>> {
        Ok(lock(&self.table)?.list(status))
    }
}

/// One pretty-printed JSON file per claim
#[derive(Debug)]
pub struct FileClaimStore {
    storage_path: PathBuf,
    table: Mutex<ClaimTable>,
}

impl FileClaimStore {
    /// Open (or create) a claim directory and load every record in it
    pub fn open(storage_path: &Path) -> ClaimResult<Self> {
        ensure_dir_exists(storage_path)?;

        let store = Self {
            storage_path: storage_path.to_path_buf(),
            table: Mutex::new(ClaimTable::default()),
        };
        let loaded = store.refresh(&mut *lock(&store.table)?)?;
        log::debug!("Loaded {} claims from {}", loaded, storage_path.display());
        Ok(store)
    }

    pub fn storage_path(&self) -> &Path {
        &self.storage_path
    }

    /// Re-read the directory so records written by other processes are seen.
    /// Returns the number of claims loaded.
    fn refresh(&self, table: &mut ClaimTable) -> ClaimResult<usize> {
        let mut claims = BTreeMap::new();
        for entry in fs::read_dir(&self.storage_path)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let content = fs::read_to_string(&path)?;
            let record: ClaimRecord = serde_json::from_str(&content).map_err(|e| {
                ClaimError::storage(format!("Corrupt claim file {}: {}", path.display(), e))
            })?;
            table.last_id = table.last_id.max(record.id.0);
            claims.insert(record.id, record);
        }

        table.claims = claims;
        Ok(table.claims.len())
    }

    /// Lock the table with its contents synced to disk
    fn synced(&self) -> ClaimResult<MutexGuard<'_, ClaimTable>> {
        let mut table = lock(&self.table)?;
        self.refresh(&mut table)?;
        Ok(table)
    }

    fn save_claim(&self, record: &ClaimRecord) -> ClaimResult<()> {
        let claim_file = self.storage_path.join(format!("{}.json", record.id));
        let claim_json = serde_json::to_string_pretty(record)?;
        write_file_atomic(&claim_file, claim_json.as_bytes())
    }
}

impl ClaimStore for FileClaimStore {
    fn create(&self, land_id: u64, farmer_id: u64) -> ClaimResult<ClaimRecord> {
        self.synced()?
            .create(land_id, farmer_id, |record| self.save_claim(record))
    }

    fn get(&self, id: ClaimId) -> ClaimResult<ClaimRecord> {
        self.synced()?.get(id)
    }

    fn transition(&self, id: ClaimId, transition: Transition) -> ClaimResult<TransitionOutcome> {
        self.synced()?
            .transition(id, transition, |record| self.save_claim(record))
    }

    fn list(&self, status: Option<ClaimStatus>) -> ClaimResult<Vec<ClaimRecord>> {
        Ok(self.synced()?.list(status))
    }
}
