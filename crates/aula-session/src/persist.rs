//! In-process [`SnapshotStorage`], for tests and for embedders that do not
//! need the snapshot to outlive the process.

use std::sync::Mutex;

use aula_core::{Error, provider::SnapshotStorage, snapshot::PersistedSnapshot};

#[derive(Debug, Default)]
pub struct MemoryStorage {
  slot: Mutex<Option<PersistedSnapshot>>,
}

impl MemoryStorage {
  /// Synchronous peek at the stored snapshot.
  pub fn load_now(&self) -> Option<PersistedSnapshot> {
    self.slot.lock().map(|s| s.clone()).unwrap_or_default()
  }
}

impl SnapshotStorage for MemoryStorage {
  type Error = Error;

  async fn load(&self) -> Result<Option<PersistedSnapshot>, Error> {
    Ok(self.load_now())
  }

  async fn save(&self, snapshot: &PersistedSnapshot) -> Result<(), Error> {
    let mut slot = self
      .slot
      .lock()
      .map_err(|_| Error::Backend("snapshot slot poisoned".into()))?;
    *slot = Some(snapshot.clone());
    Ok(())
  }

  async fn clear(&self) -> Result<(), Error> {
    let mut slot = self
      .slot
      .lock()
      .map_err(|_| Error::Backend("snapshot slot poisoned".into()))?;
    *slot = None;
    Ok(())
  }
}
