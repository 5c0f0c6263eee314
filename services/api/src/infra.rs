use chrono::{DateTime, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use reflection_rewards::config::{RewardsConfig, StorageConfig};
use reflection_rewards::rewards::{
    parse_timestamp, InMemoryRewardStore, LedgerEntry, RewardOrchestrator, RewardStore,
    RewardTransaction, SqliteRewardStore, StoreError, UserId, UserStreakState, WeekId,
};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Store selected by configuration at startup.
pub(crate) enum ConfiguredStore {
    Memory(InMemoryRewardStore),
    Sqlite(SqliteRewardStore),
}

impl ConfiguredStore {
    pub(crate) fn open(config: &StorageConfig) -> Result<Self, StoreError> {
        match config {
            StorageConfig::Memory => Ok(Self::Memory(InMemoryRewardStore::default())),
            StorageConfig::Sqlite(path) => SqliteRewardStore::open(path).map(Self::Sqlite),
        }
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Self::Memory(_) => "memory",
            Self::Sqlite(_) => "sqlite",
        }
    }
}

impl RewardStore for ConfiguredStore {
    fn with_user_transaction<T, F>(&self, user_id: &UserId, work: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut dyn RewardTransaction) -> Result<T, StoreError>,
    {
        match self {
            Self::Memory(store) => store.with_user_transaction(user_id, work),
            Self::Sqlite(store) => store.with_user_transaction(user_id, work),
        }
    }

    fn read_state(&self, user_id: &UserId) -> Result<Option<UserStreakState>, StoreError> {
        match self {
            Self::Memory(store) => store.read_state(user_id),
            Self::Sqlite(store) => store.read_state(user_id),
        }
    }

    fn list_recent(&self, user_id: &UserId, limit: usize) -> Result<Vec<LedgerEntry>, StoreError> {
        match self {
            Self::Memory(store) => store.list_recent(user_id, limit),
            Self::Sqlite(store) => store.list_recent(user_id, limit),
        }
    }

    fn exists_for_week(&self, user_id: &UserId, week: WeekId) -> Result<bool, StoreError> {
        match self {
            Self::Memory(store) => store.exists_for_week(user_id, week),
            Self::Sqlite(store) => store.exists_for_week(user_id, week),
        }
    }

    fn all_states(&self) -> Result<Vec<UserStreakState>, StoreError> {
        match self {
            Self::Memory(store) => store.all_states(),
            Self::Sqlite(store) => store.all_states(),
        }
    }

    fn ledger_for_week(&self, week: WeekId) -> Result<Vec<LedgerEntry>, StoreError> {
        match self {
            Self::Memory(store) => store.ledger_for_week(week),
            Self::Sqlite(store) => store.ledger_for_week(week),
        }
    }
}

pub(crate) fn build_service(
    config: &RewardsConfig,
) -> Result<Arc<RewardOrchestrator<ConfiguredStore>>, StoreError> {
    let store = ConfiguredStore::open(&config.storage)?;
    Ok(Arc::new(RewardOrchestrator::new(Arc::new(store), config)))
}

/// Accept a week identifier (its Monday, noon UTC), RFC 3339, or epoch millis.
pub(crate) fn parse_instant(raw: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(week) = raw.trim().parse::<WeekId>() {
        return noon_of(week).ok_or_else(|| format!("week '{raw}' has no calendar date"));
    }
    parse_timestamp(raw).map_err(|err| err.to_string())
}

pub(crate) fn noon_of(week: WeekId) -> Option<DateTime<Utc>> {
    week.monday()
        .and_then(|monday| monday.and_hms_opt(12, 0, 0))
        .map(|noon| noon.and_utc())
}

pub(crate) fn parse_week(raw: &str) -> Result<WeekId, String> {
    raw.trim()
        .parse::<WeekId>()
        .map_err(|err| err.to_string())
}
