use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::OwnedMutexGuard;

use crate::errors::AppError;
use crate::models::{ConversationPatch, ConversationState};

/// Per-sender conversation state. Keys are sender addresses, not tenants, so
/// one sender writing to two businesses shares a single state.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Returns the stored state, creating an idle one on first use.
    async fn get(&self, key: &str) -> Result<ConversationState, AppError>;
    async fn set(&self, key: &str, patch: ConversationPatch)
        -> Result<ConversationState, AppError>;
    async fn clear(&self, key: &str) -> Result<(), AppError>;
}

/// Process-local store. Entries never expire and are lost on restart.
#[derive(Default)]
pub struct InMemoryConversationStore {
    entries: Mutex<HashMap<String, ConversationState>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, ConversationState>>, AppError> {
        self.entries
            .lock()
            .map_err(|_| AppError::Logic("conversation store lock poisoned".to_string()))
    }

    pub fn len(&self) -> usize {
        self.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn get(&self, key: &str) -> Result<ConversationState, AppError> {
        let mut entries = self.lock()?;
        Ok(entries.entry(key.to_string()).or_default().clone())
    }

    async fn set(
        &self,
        key: &str,
        patch: ConversationPatch,
    ) -> Result<ConversationState, AppError> {
        let mut entries = self.lock()?;
        let state = entries.entry(key.to_string()).or_default();
        state.apply(patch);
        Ok(state.clone())
    }

    async fn clear(&self, key: &str) -> Result<(), AppError> {
        self.lock()?.remove(key);
        Ok(())
    }
}

type LockTable = Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>;

/// One async mutex per sender so a sender's messages are processed one at a time.
/// Entries live only while someone holds or waits on them.
#[derive(Default)]
pub struct SenderLocks {
    locks: LockTable,
}

/// Held while a sender's message is processed. Dropping it releases the lock
/// and forgets the sender when nobody else is queued.
pub struct SenderGuard {
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
    locks: LockTable,
}

fn lock_table(locks: &LockTable) -> MutexGuard<'_, HashMap<String, Arc<tokio::sync::Mutex<()>>>> {
    match locks.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl SenderLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(lock_table(&self.locks).entry(key.to_string()).or_default())
    }

    fn guard(&self, key: &str, guard: OwnedMutexGuard<()>) -> SenderGuard {
        SenderGuard {
            key: key.to_string(),
            guard: Some(guard),
            locks: Arc::clone(&self.locks),
        }
    }

    pub async fn acquire(&self, key: &str) -> SenderGuard {
        let slot = self.slot(key);
        let guard = slot.lock_owned().await;
        self.guard(key, guard)
    }

    pub fn try_acquire(&self, key: &str) -> Option<SenderGuard> {
        match self.slot(key).try_lock_owned() {
            Ok(guard) => Some(self.guard(key, guard)),
            Err(_) => {
                prune(&self.locks, key);
                None
            }
        }
    }

    /// Senders currently holding or waiting on a lock.
    pub fn len(&self) -> usize {
        lock_table(&self.locks).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn prune(locks: &LockTable, key: &str) {
    let mut table = lock_table(locks);
    // The table's own reference is the last one: no holder, no waiter.
    if table.get(key).is_some_and(|slot| Arc::strong_count(slot) == 1) {
        table.remove(key);
    }
}

impl Drop for SenderGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        prune(&self.locks, &self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ConversationData, Flow, Step};

    #[tokio::test]
    async fn test_get_creates_idle_state() {
        let store = InMemoryConversationStore::new();
        assert!(store.is_empty());

        let state = store.get("+5215511112222").await.unwrap();
        assert!(state.is_idle());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_set_merges_and_clear_removes() {
        let store = InMemoryConversationStore::new();
        let key = "+5215511112222";

        store
            .set(key, ConversationPatch::goto(Flow::SelectService, Step::ShowMenu))
            .await
            .unwrap();
        let state = store
            .set(
                key,
                ConversationPatch {
                    step: Some(Step::ConfirmService),
                    data: ConversationData {
                        service: Some("Cleaning".into()),
                        ..Default::default()
                    },
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(state.flow, Some(Flow::SelectService));
        assert_eq!(state.step, Some(Step::ConfirmService));
        assert_eq!(state.data.service.as_deref(), Some("Cleaning"));

        store.clear(key).await.unwrap();
        assert!(store.is_empty());
        assert!(store.get(key).await.unwrap().is_idle());
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let store = InMemoryConversationStore::new();
        store
            .set("a", ConversationPatch::goto(Flow::Appointment, Step::GetName))
            .await
            .unwrap();
        assert!(store.get("b").await.unwrap().is_idle());
        assert_eq!(store.get("a").await.unwrap().step, Some(Step::GetName));
    }

    #[tokio::test]
    async fn test_sender_locks_exclude_same_key_only() {
        let locks = SenderLocks::new();
        let guard = locks.acquire("a").await;

        assert!(locks.try_acquire("a").is_none());
        assert!(locks.try_acquire("b").is_some());

        drop(guard);
        assert!(locks.try_acquire("a").is_some());
    }

    #[tokio::test]
    async fn test_sender_locks_forget_idle_senders() {
        let locks = Arc::new(SenderLocks::new());
        for key in ["a", "b", "c"] {
            let guard = locks.acquire(key).await;
            assert_eq!(locks.len(), 1);
            drop(guard);
        }
        assert!(locks.is_empty());

        let first = locks.acquire("a").await;
        assert!(locks.try_acquire("a").is_none());
        assert_eq!(locks.len(), 1);

        let waiter = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _second = locks.acquire("a").await;
            })
        };
        tokio::task::yield_now().await;

        drop(first);
        waiter.await.unwrap();
        assert!(locks.is_empty());
    }
}
