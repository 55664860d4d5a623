use std::{
    cell::RefCell,
    collections::BTreeMap,
    fmt,
    fs,
    path::{Path, PathBuf},
};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::BatchError;

/// Identity of one execution: the job name, its parameters and the step.
///
/// Two executions with the same key share a checkpoint, which is how a
/// failed execution is resumed. Running two of them at the same time is the
/// caller's responsibility to prevent.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ExecutionKey(String);

impl ExecutionKey {
    /// Builds a key from its parts. Parameters are rendered in key order so the
    /// key does not depend on insertion order.
    pub fn new(job_name: &str, parameters: &BTreeMap<String, String>, step_name: &str) -> Self {
        let parameters = parameters
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join(",");
        ExecutionKey(format!("{job_name}[{parameters}]/{step_name}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExecutionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ExecutionKey {
    fn from(value: &str) -> Self {
        ExecutionKey(value.to_string())
    }
}

/// Keyed counter store holding the number of items durably processed.
pub trait CheckpointStore {
    fn load(&self, key: &ExecutionKey) -> Result<Option<usize>, BatchError>;

    fn save(&self, key: &ExecutionKey, position: usize) -> Result<(), BatchError>;
}

/// Restart bookkeeping of one execution.
pub struct RestartState<'a> {
    store: &'a dyn CheckpointStore,
    key: ExecutionKey,
}

impl<'a> RestartState<'a> {
    pub fn new(store: &'a dyn CheckpointStore, key: ExecutionKey) -> Self {
        Self { store, key }
    }

    /// Count of items processed by previous executions, `0` on a first run.
    pub fn load(&self) -> Result<usize, BatchError> {
        Ok(self.store.load(&self.key)?.unwrap_or(0))
    }

    pub fn save(&self, position: usize) -> Result<(), BatchError> {
        debug!("Checkpoint {} -> {}", self.key, position);
        self.store.save(&self.key, position)
    }

    pub fn key(&self) -> &ExecutionKey {
        &self.key
    }
}

/// Process-local store, mostly for tests and one-shot runs.
#[derive(Default)]
pub struct InMemoryCheckpointStore {
    positions: RefCell<BTreeMap<ExecutionKey, usize>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CheckpointStore for InMemoryCheckpointStore {
    fn load(&self, key: &ExecutionKey) -> Result<Option<usize>, BatchError> {
        Ok(self.positions.borrow().get(key).copied())
    }

    fn save(&self, key: &ExecutionKey, position: usize) -> Result<(), BatchError> {
        self.positions.borrow_mut().insert(key.clone(), position);
        Ok(())
    }
}

/// Store persisting every checkpoint to a JSON file, so that positions survive
/// a process restart.
///
/// The whole map is rewritten through a temporary file and renamed into
/// place on each save.
pub struct JsonFileCheckpointStore {
    path: PathBuf,
}

impl JsonFileCheckpointStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    fn read_all(&self) -> Result<BTreeMap<String, usize>, BatchError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = fs::read_to_string(&self.path)
            .map_err(|e| BatchError::Checkpoint(format!("{}: {e}", self.path.display())))?;
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&content)
            .map_err(|e| BatchError::Checkpoint(format!("{}: {e}", self.path.display())))
    }
}

impl CheckpointStore for JsonFileCheckpointStore {
    fn load(&self, key: &ExecutionKey) -> Result<Option<usize>, BatchError> {
        Ok(self.read_all()?.get(key.as_str()).copied())
    }

    fn save(&self, key: &ExecutionKey, position: usize) -> Result<(), BatchError> {
        let mut positions = self.read_all()?;
        positions.insert(key.as_str().to_string(), position);

        let json = serde_json::to_string_pretty(&positions)
            .map_err(|e| BatchError::Checkpoint(e.to_string()))?;

        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, json)
            .and_then(|_| fs::rename(&tmp, &self.path))
            .map_err(|e| BatchError::Checkpoint(format!("{}: {e}", self.path.display())))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use tempfile::tempdir;

    use super::*;

    fn parameters(address: &str) -> BTreeMap<String, String> {
        let mut parameters = BTreeMap::new();
        parameters.insert("address".to_string(), address.to_string());
        parameters
    }

    #[test]
    fn key_depends_on_parameters() {
        let seoul = ExecutionKey::new("storeBackupBatch", &parameters("서울"), "step");
        let busan = ExecutionKey::new("storeBackupBatch", &parameters("부산"), "step");

        assert_ne!(seoul, busan);
        assert_eq!(seoul.as_str(), "storeBackupBatch[address=서울]/step");
    }

    #[test]
    fn restart_state_defaults_to_zero() {
        let store = InMemoryCheckpointStore::new();
        let state = RestartState::new(&store, ExecutionKey::from("job[]/step"));

        assert_eq!(state.load().unwrap(), 0);

        state.save(4).unwrap();
        assert_eq!(state.load().unwrap(), 4);
    }

    #[test]
    fn json_store_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("checkpoints.json");
        let key = ExecutionKey::from("job[]/step");

        JsonFileCheckpointStore::new(&path).save(&key, 6).unwrap();

        let reopened = JsonFileCheckpointStore::new(&path);
        assert_eq!(reopened.load(&key).unwrap(), Some(6));
        assert_eq!(reopened.load(&ExecutionKey::from("other")).unwrap(), None);
    }

    #[test]
    fn json_store_reports_corrupted_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("checkpoints.json");
        fs::write(&path, "not json").unwrap();

        let result = JsonFileCheckpointStore::new(&path).load(&ExecutionKey::from("job"));

        assert!(matches!(result, Err(BatchError::Checkpoint(_))));
    }
}
