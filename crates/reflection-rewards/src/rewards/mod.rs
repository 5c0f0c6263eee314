//! Weekly reflection streaks and the points they earn.
//!
//! A submission is mapped to its ISO week, classified against the user's
//! last recorded week, priced by the reward schedule and then written, state
//! row and ledger rows together, as a single unit of work.

pub mod domain;
pub mod export;
pub mod memory;
pub mod points;
pub mod repository;
pub mod router;
pub mod service;
pub mod sqlite;
pub mod streak;
pub mod timestamp;
pub mod week;

#[cfg(test)]
mod tests;

pub use domain::{
    EngagementSummary, EntryId, LedgerEntry, LedgerReason, NewLedgerEntry, NextMilestone,
    RewardResult, StreakStats, UserId, UserStreakState,
};
pub use export::write_ledger_csv;
pub use memory::InMemoryRewardStore;
pub use points::{PointsBreakdown, PointsCalculator, PointsConfig};
pub use repository::{
    PointsLedgerStore, RewardStore, RewardTransaction, StoreError, UserStreakStore,
};
pub use router::rewards_router;
pub use service::{EntrySubmission, RewardError, RewardOrchestrator};
pub use sqlite::SqliteRewardStore;
pub use streak::{Classification, StreakEvaluation, StreakEvaluator};
pub use timestamp::{parse_timestamp, timestamp_from_millis};
pub use week::{weeks_in_year, WeekId, WeekIdError};
