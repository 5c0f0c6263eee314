use super::domain::{LedgerEntry, NewLedgerEntry, UserId, UserStreakState};
use super::week::WeekId;

/// Per-user streak row, accessed inside a unit of work.
pub trait UserStreakStore {
    /// Current state for `user_id`, or a zero state when the user is new.
    fn read_for_update(&mut self, user_id: &UserId) -> Result<UserStreakState, StoreError>;
    fn write(&mut self, state: &UserStreakState) -> Result<(), StoreError>;
}

/// Append-only points ledger, accessed inside a unit of work.
pub trait PointsLedgerStore {
    fn exists_for_week(&mut self, user_id: &UserId, week: WeekId) -> Result<bool, StoreError>;
    fn append(&mut self, entry: NewLedgerEntry) -> Result<LedgerEntry, StoreError>;
    /// Newest first.
    fn list_recent(&mut self, user_id: &UserId, limit: usize)
        -> Result<Vec<LedgerEntry>, StoreError>;
}

/// Handle passed to a unit of work; both ports share one snapshot.
pub trait RewardTransaction: UserStreakStore + PointsLedgerStore {}

impl<T> RewardTransaction for T where T: UserStreakStore + PointsLedgerStore {}

/// Storage abstraction so the orchestrator can be exercised in isolation.
///
/// `with_user_transaction` runs `work` against a handle scoped to one user.
/// An `Ok` result commits every staged write together; an `Err` discards
/// them all. Implementations report lost races as [`StoreError::Conflict`].
pub trait RewardStore: Send + Sync {
    fn with_user_transaction<T, F>(&self, user_id: &UserId, work: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut dyn RewardTransaction) -> Result<T, StoreError>;

    fn read_state(&self, user_id: &UserId) -> Result<Option<UserStreakState>, StoreError>;
    fn list_recent(&self, user_id: &UserId, limit: usize) -> Result<Vec<LedgerEntry>, StoreError>;
    fn exists_for_week(&self, user_id: &UserId, week: WeekId) -> Result<bool, StoreError>;
    fn all_states(&self) -> Result<Vec<UserStreakState>, StoreError>;
    fn ledger_for_week(&self, week: WeekId) -> Result<Vec<LedgerEntry>, StoreError>;
}

/// Error enumeration for persistence failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("concurrent update detected")]
    Conflict,
    #[error("store unavailable: {0}")]
    Unavailable(String),
}
