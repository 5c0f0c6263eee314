use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use super::domain::{LedgerEntry, NewLedgerEntry, UserId, UserStreakState};
use super::repository::{
    PointsLedgerStore, RewardStore, RewardTransaction, StoreError, UserStreakStore,
};
use super::week::WeekId;

/// Process-local store with optimistic, per-user version checks.
///
/// A unit of work snapshots one user and commits only if no other unit of
/// work committed for that user in the meantime.
#[derive(Default, Clone)]
pub struct InMemoryRewardStore {
    inner: Arc<Mutex<MemoryState>>,
    next_id: Arc<AtomicU64>,
}

#[derive(Default)]
struct MemoryState {
    users: HashMap<UserId, VersionedState>,
    ledger: Vec<LedgerEntry>,
}

struct VersionedState {
    state: UserStreakState,
    version: u64,
}

struct MemoryTransaction<'store> {
    next_id: &'store AtomicU64,
    user_id: UserId,
    state: UserStreakState,
    ledger: Vec<LedgerEntry>,
    staged_entries: Vec<LedgerEntry>,
    staged_state: Option<UserStreakState>,
}

impl InMemoryRewardStore {
    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Unavailable("reward store mutex poisoned".to_string()))
    }

    /// Every ledger row held for `user_id`, oldest first.
    pub fn ledger(&self, user_id: &UserId) -> Result<Vec<LedgerEntry>, StoreError> {
        let guard = self.lock()?;
        Ok(guard
            .ledger
            .iter()
            .filter(|entry| &entry.user_id == user_id)
            .cloned()
            .collect())
    }
}

impl MemoryState {
    fn version_of(&self, user_id: &UserId) -> u64 {
        self.users
            .get(user_id)
            .map(|versioned| versioned.version)
            .unwrap_or(0)
    }
}

impl MemoryTransaction<'_> {
    fn ensure_scope(&self, user_id: &UserId) -> Result<(), StoreError> {
        if &self.user_id == user_id {
            Ok(())
        } else {
            Err(StoreError::Unavailable(format!(
                "transaction for {} cannot touch {}",
                self.user_id, user_id
            )))
        }
    }

    fn rows(&self) -> impl Iterator<Item = &LedgerEntry> {
        self.ledger.iter().chain(self.staged_entries.iter())
    }
}

impl UserStreakStore for MemoryTransaction<'_> {
    fn read_for_update(&mut self, user_id: &UserId) -> Result<UserStreakState, StoreError> {
        self.ensure_scope(user_id)?;
        Ok(self
            .staged_state
            .clone()
            .unwrap_or_else(|| self.state.clone()))
    }

    fn write(&mut self, state: &UserStreakState) -> Result<(), StoreError> {
        self.ensure_scope(&state.user_id)?;
        self.staged_state = Some(state.clone());
        Ok(())
    }
}

impl PointsLedgerStore for MemoryTransaction<'_> {
    fn exists_for_week(&mut self, user_id: &UserId, week: WeekId) -> Result<bool, StoreError> {
        self.ensure_scope(user_id)?;
        Ok(self.rows().any(|entry| entry.week == week))
    }

    fn append(&mut self, entry: NewLedgerEntry) -> Result<LedgerEntry, StoreError> {
        self.ensure_scope(&entry.user_id)?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let stored = entry.with_id(id);
        self.staged_entries.push(stored.clone());
        Ok(stored)
    }

    fn list_recent(
        &mut self,
        user_id: &UserId,
        limit: usize,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        self.ensure_scope(user_id)?;
        Ok(newest_first(self.rows().cloned().collect(), limit))
    }
}

impl RewardStore for InMemoryRewardStore {
    fn with_user_transaction<T, F>(&self, user_id: &UserId, work: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut dyn RewardTransaction) -> Result<T, StoreError>,
    {
        let (mut transaction, base_version) = {
            let guard = self.lock()?;
            let state = guard
                .users
                .get(user_id)
                .map(|versioned| versioned.state.clone())
                .unwrap_or_else(|| UserStreakState::new(user_id.clone()));
            let ledger = guard
                .ledger
                .iter()
                .filter(|entry| &entry.user_id == user_id)
                .cloned()
                .collect();
            let transaction = MemoryTransaction {
                next_id: &self.next_id,
                user_id: user_id.clone(),
                state,
                ledger,
                staged_entries: Vec::new(),
                staged_state: None,
            };
            (transaction, guard.version_of(user_id))
        };

        let output = work(&mut transaction)?;

        let mut guard = self.lock()?;
        if guard.version_of(user_id) != base_version {
            return Err(StoreError::Conflict);
        }

        let MemoryTransaction {
            staged_entries,
            staged_state,
            ..
        } = transaction;
        if staged_entries.is_empty() && staged_state.is_none() {
            return Ok(output);
        }

        let state = match staged_state {
            Some(state) => state,
            None => guard
                .users
                .get(user_id)
                .map(|versioned| versioned.state.clone())
                .unwrap_or_else(|| UserStreakState::new(user_id.clone())),
        };
        guard.ledger.extend(staged_entries);
        guard.users.insert(
            user_id.clone(),
            VersionedState {
                state,
                version: base_version + 1,
            },
        );

        Ok(output)
    }

    fn read_state(&self, user_id: &UserId) -> Result<Option<UserStreakState>, StoreError> {
        let guard = self.lock()?;
        Ok(guard
            .users
            .get(user_id)
            .map(|versioned| versioned.state.clone()))
    }

    fn list_recent(&self, user_id: &UserId, limit: usize) -> Result<Vec<LedgerEntry>, StoreError> {
        Ok(newest_first(self.ledger(user_id)?, limit))
    }

    fn exists_for_week(&self, user_id: &UserId, week: WeekId) -> Result<bool, StoreError> {
        let guard = self.lock()?;
        Ok(guard
            .ledger
            .iter()
            .any(|entry| &entry.user_id == user_id && entry.week == week))
    }

    fn all_states(&self) -> Result<Vec<UserStreakState>, StoreError> {
        let guard = self.lock()?;
        let mut states: Vec<UserStreakState> = guard
            .users
            .values()
            .map(|versioned| versioned.state.clone())
            .collect();
        states.sort_by(|left, right| left.user_id.cmp(&right.user_id));
        Ok(states)
    }

    fn ledger_for_week(&self, week: WeekId) -> Result<Vec<LedgerEntry>, StoreError> {
        let guard = self.lock()?;
        Ok(guard
            .ledger
            .iter()
            .filter(|entry| entry.week == week)
            .cloned()
            .collect())
    }
}

fn newest_first(mut entries: Vec<LedgerEntry>, limit: usize) -> Vec<LedgerEntry> {
    entries.sort_by(|left, right| {
        right
            .timestamp
            .cmp(&left.timestamp)
            .then(right.id.cmp(&left.id))
    });
    entries.truncate(limit);
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rewards::domain::{EntryId, LedgerReason};
    use chrono::{TimeZone, Utc};

    fn user() -> UserId {
        UserId("user-1".to_string())
    }

    fn row(points: u32) -> NewLedgerEntry {
        NewLedgerEntry {
            user_id: user(),
            points_earned: points,
            reason: LedgerReason::WeeklyEntry,
            streak_week: 1,
            week: "2025-W10".parse().expect("valid week"),
            source_entry_id: EntryId("entry-1".to_string()),
            timestamp: Utc
                .with_ymd_and_hms(2025, 3, 4, 9, 0, 0)
                .single()
                .expect("valid timestamp"),
        }
    }

    #[test]
    fn failed_work_leaves_no_rows_behind() {
        let store = InMemoryRewardStore::default();
        let result: Result<(), StoreError> = store.with_user_transaction(&user(), |tx| {
            tx.append(row(50))?;
            Err(StoreError::Unavailable("boom".to_string()))
        });

        assert!(result.is_err());
        assert!(store.ledger(&user()).expect("ledger readable").is_empty());
        assert!(store.read_state(&user()).expect("state readable").is_none());
    }

    #[test]
    fn interleaved_commit_is_reported_as_conflict() {
        let store = InMemoryRewardStore::default();
        let racing = store.clone();

        let result = store.with_user_transaction(&user(), |tx| {
            let state = tx.read_for_update(&user())?;
            racing
                .with_user_transaction(&user(), |inner| {
                    let state = inner.read_for_update(&user())?;
                    inner.write(&state.advance(1, row(1).week, 1))
                })
                .expect("racing commit succeeds");
            tx.write(&state.advance(1, row(1).week, 50))
        });

        assert_eq!(result, Err(StoreError::Conflict));
        let stored = store
            .read_state(&user())
            .expect("state readable")
            .expect("racing state stored");
        assert_eq!(stored.total_points, 1);
    }

    #[test]
    fn transaction_is_scoped_to_one_user() {
        let store = InMemoryRewardStore::default();
        let other = UserId("user-2".to_string());
        let result = store.with_user_transaction(&user(), |tx| tx.read_for_update(&other));
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
    }
}
