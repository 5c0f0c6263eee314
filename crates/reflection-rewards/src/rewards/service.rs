use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::domain::{
    EngagementSummary, EntryId, LedgerEntry, LedgerReason, NewLedgerEntry, NextMilestone,
    RewardResult, StreakStats, UserId, UserStreakState,
};
use super::points::PointsCalculator;
use super::repository::{RewardStore, RewardTransaction, StoreError};
use super::streak::{Classification, StreakEvaluator};
use super::timestamp::parse_timestamp;
use super::week::WeekId;
use crate::config::RewardsConfig;

/// Service composing the streak evaluator, points calculator and store.
pub struct RewardOrchestrator<S> {
    store: Arc<S>,
    evaluator: StreakEvaluator,
    calculator: PointsCalculator,
    max_attempts: u32,
    recent_ledger_limit: usize,
}

/// Submission payload accepted from outer layers.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EntrySubmission {
    pub user_id: UserId,
    pub entry_id: EntryId,
    /// RFC 3339 or epoch milliseconds; the caller's clock when absent.
    #[serde(default)]
    pub submitted_at: Option<String>,
}

impl<S> RewardOrchestrator<S>
where
    S: RewardStore + 'static,
{
    pub fn new(store: Arc<S>, config: &RewardsConfig) -> Self {
        Self {
            store,
            evaluator: StreakEvaluator::new(config.week_offset),
            calculator: PointsCalculator::new(config.points.clone()),
            max_attempts: config.max_attempts.max(1),
            recent_ledger_limit: config.recent_ledger_limit,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn current_week(&self, now: DateTime<Utc>) -> WeekId {
        self.evaluator.week_of(now)
    }

    /// Validate the submission timestamp, then record it.
    pub fn submit(
        &self,
        submission: EntrySubmission,
        now: DateTime<Utc>,
    ) -> Result<RewardResult, RewardError> {
        let timestamp = match submission.submitted_at.as_deref() {
            Some(raw) => parse_timestamp(raw)?,
            None => now,
        };
        self.record_entry(&submission.user_id, &submission.entry_id, timestamp)
    }

    /// Apply one journal entry to the user's streak and ledger.
    ///
    /// The read, evaluation and both writes run as one unit of work. A lost
    /// race re-runs the whole unit, up to the configured attempt bound.
    pub fn record_entry(
        &self,
        user_id: &UserId,
        entry_id: &EntryId,
        timestamp: DateTime<Utc>,
    ) -> Result<RewardResult, RewardError> {
        let week = self.evaluator.week_of(timestamp);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let outcome = self.store.with_user_transaction(user_id, |tx| {
                self.apply(tx, user_id, entry_id, timestamp, week)
            });

            match outcome {
                Ok(result) => {
                    info!(
                        user_id = %user_id,
                        week = %result.week,
                        classification = result.classification.label(),
                        points = result.points_awarded,
                        streak = result.new_streak,
                        milestone = ?result.milestone_reached,
                        "weekly reflection rewarded"
                    );
                    return Ok(result);
                }
                Err(StoreError::Conflict) if attempt < self.max_attempts => {
                    warn!(user_id = %user_id, attempt, "reward update conflicted; retrying");
                }
                Err(StoreError::Conflict) => {
                    warn!(
                        user_id = %user_id,
                        attempts = attempt,
                        "reward update retries exhausted"
                    );
                    return Err(RewardError::PersistenceConflict { attempts: attempt });
                }
                Err(StoreError::Unavailable(reason)) => {
                    return Err(RewardError::PersistenceUnavailable(reason));
                }
            }
        }
    }

    fn apply(
        &self,
        tx: &mut dyn RewardTransaction,
        user_id: &UserId,
        entry_id: &EntryId,
        timestamp: DateTime<Utc>,
        week: WeekId,
    ) -> Result<RewardResult, StoreError> {
        let state = tx.read_for_update(user_id)?;
        let is_multiple_entry_this_week = tx.exists_for_week(user_id, week)?;
        let evaluation = self.evaluator.evaluate(
            state.last_entry_week,
            state.current_streak,
            timestamp,
        );
        let mut breakdown = self
            .calculator
            .calculate(evaluation.new_streak, is_multiple_entry_this_week);
        // The streak length did not change, so its milestone was already paid.
        if evaluation.classification == Classification::SameWeek {
            breakdown = breakdown.without_milestone();
        }
        let reason = LedgerReason::for_submission(
            evaluation.classification,
            state.current_streak,
            is_multiple_entry_this_week,
        );

        debug!(
            user_id = %user_id,
            week = %week,
            previous_streak = state.current_streak,
            weeks_skipped = evaluation.weeks_skipped,
            "evaluated reflection submission"
        );

        let row = |points_earned: u32, reason: LedgerReason| NewLedgerEntry {
            user_id: user_id.clone(),
            points_earned,
            reason,
            streak_week: evaluation.new_streak,
            week,
            source_entry_id: entry_id.clone(),
            timestamp,
        };

        let mut awarded: u32 = 0;
        let regular = breakdown.regular_total();
        if regular > 0 {
            awarded = awarded.saturating_add(tx.append(row(regular, reason))?.points_earned);
        }

        let milestone_reached = if breakdown.milestone_bonus > 0 {
            let milestone = LedgerReason::Milestone(evaluation.new_streak);
            let stored = tx.append(row(breakdown.milestone_bonus, milestone))?;
            awarded = awarded.saturating_add(stored.points_earned);
            Some(evaluation.new_streak)
        } else {
            None
        };

        let next = state.advance(evaluation.new_streak, week, u64::from(awarded));
        tx.write(&next)?;

        Ok(RewardResult {
            user_id: user_id.clone(),
            week,
            classification: evaluation.classification,
            reason,
            points_awarded: awarded,
            breakdown,
            new_streak: evaluation.new_streak,
            milestone_reached,
            streak_broken: evaluation.classification == Classification::Restarted
                && state.current_streak > 0,
            is_multiple_entry_this_week,
            is_new_record: evaluation.new_streak > state.longest_streak,
            total_points: next.total_points,
        })
    }

    pub fn streak_stats(&self, user_id: &UserId) -> Result<StreakStats, RewardError> {
        self.streak_stats_at(user_id, Utc::now())
    }

    /// Streak view as of `now`. Users without any submission get zeros.
    pub fn streak_stats_at(
        &self,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> Result<StreakStats, RewardError> {
        let current_week = self.current_week(now);
        let state = self
            .store
            .read_state(user_id)?
            .unwrap_or_else(|| UserStreakState::new(user_id.clone()));
        let has_entry_this_week = self.store.exists_for_week(user_id, current_week)?;
        let recent_entries = self.store.list_recent(user_id, self.recent_ledger_limit)?;

        let streak_active = state.current_streak > 0
            && state
                .last_entry_week
                .is_some_and(|last| last == current_week || last == current_week.predecessor());

        let next_milestone = self
            .calculator
            .config()
            .next_milestone_after(state.current_streak)
            .map(|(streak_length, reward)| NextMilestone {
                streak_length,
                weeks_remaining: streak_length - state.current_streak,
                reward,
            });

        Ok(StreakStats {
            user_id: user_id.clone(),
            current_streak: state.current_streak,
            longest_streak: state.longest_streak,
            total_points: state.total_points,
            current_week,
            has_entry_this_week,
            streak_active,
            next_milestone,
            recent_entries,
        })
    }

    pub fn has_entry_this_week(&self, user_id: &UserId) -> Result<bool, RewardError> {
        self.has_entry_in_week_of(user_id, Utc::now())
    }

    pub fn has_entry_in_week_of(
        &self,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> Result<bool, RewardError> {
        Ok(self.store.exists_for_week(user_id, self.current_week(now))?)
    }

    pub fn recent_entries(
        &self,
        user_id: &UserId,
        limit: usize,
    ) -> Result<Vec<LedgerEntry>, RewardError> {
        Ok(self.store.list_recent(user_id, limit)?)
    }

    pub fn engagement_summary(&self, week: WeekId) -> Result<EngagementSummary, RewardError> {
        let states = self.store.all_states()?;
        let ledger = self.store.ledger_for_week(week)?;

        let active: Vec<u32> = states
            .iter()
            .map(|state| state.current_streak)
            .filter(|streak| *streak > 0)
            .collect();
        let average_streak = if active.is_empty() {
            0
        } else {
            let sum: u64 = active.iter().map(|streak| u64::from(*streak)).sum();
            let count = active.len() as u64;
            ((sum + count / 2) / count) as u32
        };

        let mut regular_rows: HashMap<&UserId, usize> = HashMap::new();
        for entry in ledger.iter().filter(|entry| !entry.reason.is_milestone()) {
            *regular_rows.entry(&entry.user_id).or_default() += 1;
        }

        Ok(EngagementSummary {
            week,
            total_users: states.len(),
            active_streaks: active.len(),
            average_streak,
            longest_current_streak: active.iter().copied().max().unwrap_or(0),
            users_with_multiple_entries: regular_rows.values().filter(|rows| **rows > 1).count(),
        })
    }
}

/// Error raised by the reward orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RewardError {
    #[error("invalid timestamp '{raw}': {reason}")]
    InvalidTimestamp { raw: String, reason: String },
    #[error("persistence conflict persisted after {attempts} attempt(s)")]
    PersistenceConflict { attempts: u32 },
    #[error("persistence unavailable: {0}")]
    PersistenceUnavailable(String),
}

impl From<StoreError> for RewardError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Conflict => Self::PersistenceConflict { attempts: 1 },
            StoreError::Unavailable(reason) => Self::PersistenceUnavailable(reason),
        }
    }
}
