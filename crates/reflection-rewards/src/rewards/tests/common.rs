use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::config::RewardsConfig;
use crate::rewards::domain::{EntryId, LedgerEntry, RewardResult, UserId, UserStreakState};
use crate::rewards::repository::{RewardStore, RewardTransaction, StoreError};
use crate::rewards::week::WeekId;
use crate::rewards::{InMemoryRewardStore, RewardOrchestrator};

pub(super) fn user() -> UserId {
    UserId("user-1".to_string())
}

pub(super) fn entry(raw: &str) -> EntryId {
    EntryId(raw.to_string())
}

pub(super) fn week(raw: &str) -> WeekId {
    raw.parse().expect("valid week")
}

/// Noon UTC on the Monday of `raw`.
pub(super) fn noon_of(raw: &str) -> DateTime<Utc> {
    week(raw)
        .monday()
        .expect("monday exists")
        .and_hms_opt(12, 0, 0)
        .expect("valid time")
        .and_utc()
}

pub(super) fn rewards_config() -> RewardsConfig {
    RewardsConfig::default()
}

pub(super) fn build_service() -> (
    Arc<RewardOrchestrator<InMemoryRewardStore>>,
    InMemoryRewardStore,
) {
    let store = InMemoryRewardStore::default();
    let service = Arc::new(RewardOrchestrator::new(
        Arc::new(store.clone()),
        &rewards_config(),
    ));
    (service, store)
}

pub(super) fn record<S: RewardStore + 'static>(
    service: &RewardOrchestrator<S>,
    raw_week: &str,
    entry_id: &str,
) -> RewardResult {
    service
        .record_entry(&user(), &entry(entry_id), noon_of(raw_week))
        .expect("entry recorded")
}

pub(super) fn ledger_sum(store: &InMemoryRewardStore) -> u64 {
    store
        .ledger(&user())
        .expect("ledger readable")
        .iter()
        .map(|row| u64::from(row.points_earned))
        .sum()
}

type Interloper = Box<dyn FnOnce() + Send>;

/// Runs `interloper` inside the first unit of work, after the snapshot is
/// taken, so that unit of work loses the race.
pub(super) struct RacingStore {
    pub(super) inner: InMemoryRewardStore,
    interloper: Mutex<Option<Interloper>>,
    pub(super) attempts: AtomicU32,
}

impl RacingStore {
    pub(super) fn new(inner: InMemoryRewardStore, interloper: Interloper) -> Self {
        Self {
            inner,
            interloper: Mutex::new(Some(interloper)),
            attempts: AtomicU32::new(0),
        }
    }
}

impl RewardStore for RacingStore {
    fn with_user_transaction<T, F>(&self, user_id: &UserId, work: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut dyn RewardTransaction) -> Result<T, StoreError>,
    {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let interloper = self.interloper.lock().expect("interloper mutex").take();
        self.inner.with_user_transaction(user_id, |tx| {
            if let Some(interloper) = interloper {
                interloper();
            }
            work(tx)
        })
    }

    fn read_state(&self, user_id: &UserId) -> Result<Option<UserStreakState>, StoreError> {
        self.inner.read_state(user_id)
    }

    fn list_recent(&self, user_id: &UserId, limit: usize) -> Result<Vec<LedgerEntry>, StoreError> {
        RewardStore::list_recent(&self.inner, user_id, limit)
    }

    fn exists_for_week(&self, user_id: &UserId, week: WeekId) -> Result<bool, StoreError> {
        RewardStore::exists_for_week(&self.inner, user_id, week)
    }

    fn all_states(&self) -> Result<Vec<UserStreakState>, StoreError> {
        self.inner.all_states()
    }

    fn ledger_for_week(&self, week: WeekId) -> Result<Vec<LedgerEntry>, StoreError> {
        self.inner.ledger_for_week(week)
    }
}

/// Every unit of work loses its race.
#[derive(Default)]
pub(super) struct ConflictStore {
    pub(super) attempts: AtomicU32,
}

impl RewardStore for ConflictStore {
    fn with_user_transaction<T, F>(&self, _user_id: &UserId, _work: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut dyn RewardTransaction) -> Result<T, StoreError>,
    {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Conflict)
    }

    fn read_state(&self, _user_id: &UserId) -> Result<Option<UserStreakState>, StoreError> {
        Ok(None)
    }

    fn list_recent(&self, _user_id: &UserId, _limit: usize) -> Result<Vec<LedgerEntry>, StoreError> {
        Ok(Vec::new())
    }

    fn exists_for_week(&self, _user_id: &UserId, _week: WeekId) -> Result<bool, StoreError> {
        Ok(false)
    }

    fn all_states(&self) -> Result<Vec<UserStreakState>, StoreError> {
        Ok(Vec::new())
    }

    fn ledger_for_week(&self, _week: WeekId) -> Result<Vec<LedgerEntry>, StoreError> {
        Ok(Vec::new())
    }
}

#[derive(Default)]
pub(super) struct UnavailableStore {
    pub(super) attempts: AtomicU32,
}

fn offline() -> StoreError {
    StoreError::Unavailable("database offline".to_string())
}

impl RewardStore for UnavailableStore {
    fn with_user_transaction<T, F>(&self, _user_id: &UserId, _work: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut dyn RewardTransaction) -> Result<T, StoreError>,
    {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(offline())
    }

    fn read_state(&self, _user_id: &UserId) -> Result<Option<UserStreakState>, StoreError> {
        Err(offline())
    }

    fn list_recent(&self, _user_id: &UserId, _limit: usize) -> Result<Vec<LedgerEntry>, StoreError> {
        Err(offline())
    }

    fn exists_for_week(&self, _user_id: &UserId, _week: WeekId) -> Result<bool, StoreError> {
        Err(offline())
    }

    fn all_states(&self) -> Result<Vec<UserStreakState>, StoreError> {
        Err(offline())
    }

    fn ledger_for_week(&self, _week: WeekId) -> Result<Vec<LedgerEntry>, StoreError> {
        Err(offline())
    }
}

/// Panics inside every unit of work, as a broken store driver might.
pub(super) struct PanickingStore;

impl RewardStore for PanickingStore {
    fn with_user_transaction<T, F>(&self, _user_id: &UserId, _work: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut dyn RewardTransaction) -> Result<T, StoreError>,
    {
        panic!("store driver crashed");
    }

    fn read_state(&self, _user_id: &UserId) -> Result<Option<UserStreakState>, StoreError> {
        panic!("store driver crashed");
    }

    fn list_recent(&self, _user_id: &UserId, _limit: usize) -> Result<Vec<LedgerEntry>, StoreError> {
        panic!("store driver crashed");
    }

    fn exists_for_week(&self, _user_id: &UserId, _week: WeekId) -> Result<bool, StoreError> {
        panic!("store driver crashed");
    }

    fn all_states(&self) -> Result<Vec<UserStreakState>, StoreError> {
        panic!("store driver crashed");
    }

    fn ledger_for_week(&self, _week: WeekId) -> Result<Vec<LedgerEntry>, StoreError> {
        panic!("store driver crashed");
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("body readable");
    serde_json::from_slice(&bytes).expect("valid json")
}
