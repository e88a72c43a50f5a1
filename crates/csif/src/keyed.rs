use std::{
  collections::HashMap,
  sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Async mutual exclusion per string key. An entry lives exactly as long
/// as some task holds or waits for its key, including waiters that are
/// dropped before they get the lock.
#[derive(Debug, Default)]
pub(crate) struct KeyedLock {
  keys: Mutex<HashMap<String, KeyEntry>>,
}

#[derive(Debug, Default)]
struct KeyEntry {
  mutex: Arc<AsyncMutex<()>>,
  users: usize,
}

impl KeyedLock {
  fn keys(&self) -> MutexGuard<'_, HashMap<String, KeyEntry>> {
    self.keys.lock().unwrap_or_else(PoisonError::into_inner)
  }

  pub(crate) async fn lock(&self, key: &str) -> KeyGuard<'_> {
    let mutex = {
      let mut keys = self.keys();
      let entry = keys.entry(key.to_owned()).or_default();
      entry.users += 1;
      entry.mutex.clone()
    };

    // Registered before waiting so a cancelled waiter still releases its entry.
    let mut guard = KeyGuard {
      owner: self,
      key: key.to_owned(),
      guard: None,
    };
    guard.guard = Some(mutex.lock_owned().await);
    guard
  }

  #[cfg(test)]
  fn len(&self) -> usize {
    self.keys().len()
  }
}

pub(crate) struct KeyGuard<'a> {
  owner: &'a KeyedLock,
  key: String,
  guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyGuard<'_> {
  fn drop(&mut self) {
    drop(self.guard.take());

    let mut keys = self.owner.keys();
    if let Some(entry) = keys.get_mut(&self.key) {
      entry.users -= 1;
      if entry.users == 0 {
        keys.remove(&self.key);
      }
    }
  }
}
