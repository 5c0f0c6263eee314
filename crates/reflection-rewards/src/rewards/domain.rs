use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::points::PointsBreakdown;
use super::streak::Classification;
use super::week::WeekId;

/// Identifier wrapper for the user earning rewards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

/// Identifier of the journal entry that triggered an award.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(pub String);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Persisted streak row, one per user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStreakState {
    pub user_id: UserId,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub total_points: u64,
    pub last_entry_week: Option<WeekId>,
}

impl UserStreakState {
    /// Zero-valued state for a user that has never submitted.
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            current_streak: 0,
            longest_streak: 0,
            total_points: 0,
            last_entry_week: None,
        }
    }

    pub(crate) fn advance(&self, new_streak: u32, week: WeekId, points: u64) -> Self {
        Self {
            user_id: self.user_id.clone(),
            current_streak: new_streak,
            longest_streak: self.longest_streak.max(new_streak),
            total_points: self.total_points.saturating_add(points),
            last_entry_week: Some(week),
        }
    }
}

/// Why a ledger row was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LedgerReason {
    WeeklyEntry,
    StreakContinuation,
    StreakRestart,
    AdditionalWeeklyEntry,
    Milestone(u32),
}

impl LedgerReason {
    /// Tag for the regular row of a submission. A restart wins over a
    /// continuation, which wins over an extra entry in the same week.
    pub fn for_submission(
        classification: Classification,
        previous_streak: u32,
        is_multiple_entry_this_week: bool,
    ) -> Self {
        match classification {
            Classification::Restarted if previous_streak > 0 => Self::StreakRestart,
            Classification::Continued => Self::StreakContinuation,
            _ if is_multiple_entry_this_week => Self::AdditionalWeeklyEntry,
            _ => Self::WeeklyEntry,
        }
    }

    pub fn is_milestone(&self) -> bool {
        matches!(self, Self::Milestone(_))
    }
}

impl fmt::Display for LedgerReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WeeklyEntry => f.write_str("weekly_entry"),
            Self::StreakContinuation => f.write_str("streak_continuation"),
            Self::StreakRestart => f.write_str("streak_restart"),
            Self::AdditionalWeeklyEntry => f.write_str("additional_weekly_entry"),
            Self::Milestone(weeks) => write!(f, "milestone_{weeks}_weeks"),
        }
    }
}

impl FromStr for LedgerReason {
    type Err = UnknownLedgerReason;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "weekly_entry" => Ok(Self::WeeklyEntry),
            "streak_continuation" => Ok(Self::StreakContinuation),
            "streak_restart" => Ok(Self::StreakRestart),
            "additional_weekly_entry" => Ok(Self::AdditionalWeeklyEntry),
            other => other
                .strip_prefix("milestone_")
                .and_then(|rest| rest.strip_suffix("_weeks"))
                .and_then(|weeks| weeks.parse::<u32>().ok())
                .map(Self::Milestone)
                .ok_or_else(|| UnknownLedgerReason(other.to_string())),
        }
    }
}

impl Serialize for LedgerReason {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for LedgerReason {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown ledger reason '{0}'")]
pub struct UnknownLedgerReason(pub String);

/// Ledger row as handed to the store; the store assigns the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLedgerEntry {
    pub user_id: UserId,
    pub points_earned: u32,
    pub reason: LedgerReason,
    pub streak_week: u32,
    pub week: WeekId,
    pub source_entry_id: EntryId,
    pub timestamp: DateTime<Utc>,
}

impl NewLedgerEntry {
    pub fn with_id(self, id: u64) -> LedgerEntry {
        LedgerEntry {
            id,
            user_id: self.user_id,
            points_earned: self.points_earned,
            reason: self.reason,
            streak_week: self.streak_week,
            week: self.week,
            source_entry_id: self.source_entry_id,
            timestamp: self.timestamp,
        }
    }
}

/// Immutable, append-only record of a single points award.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: u64,
    pub user_id: UserId,
    pub points_earned: u32,
    pub reason: LedgerReason,
    pub streak_week: u32,
    #[serde(rename = "week_identifier")]
    pub week: WeekId,
    pub source_entry_id: EntryId,
    pub timestamp: DateTime<Utc>,
}

/// Outcome of a single `record_entry` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RewardResult {
    pub user_id: UserId,
    #[serde(rename = "week_id")]
    pub week: WeekId,
    pub classification: Classification,
    pub reason: LedgerReason,
    pub points_awarded: u32,
    pub breakdown: PointsBreakdown,
    pub new_streak: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub milestone_reached: Option<u32>,
    pub streak_broken: bool,
    pub is_multiple_entry_this_week: bool,
    pub is_new_record: bool,
    pub total_points: u64,
}

/// Upcoming milestone relative to the current streak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NextMilestone {
    pub streak_length: u32,
    pub weeks_remaining: u32,
    pub reward: u32,
}

/// Read-only view consumed by presentation layers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreakStats {
    pub user_id: UserId,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub total_points: u64,
    pub current_week: WeekId,
    pub has_entry_this_week: bool,
    pub streak_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_milestone: Option<NextMilestone>,
    pub recent_entries: Vec<LedgerEntry>,
}

/// Aggregate engagement numbers for a single week.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngagementSummary {
    pub week: WeekId,
    pub total_users: usize,
    pub active_streaks: usize,
    pub average_streak: u32,
    pub longest_current_streak: u32,
    pub users_with_multiple_entries: usize,
}
