use chrono::{DateTime, FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};

use super::week::WeekId;

/// How a submission relates to the user's previously recorded week.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Classification {
    FirstEver,
    SameWeek,
    Continued,
    Restarted,
}

impl Classification {
    pub fn label(&self) -> &'static str {
        match self {
            Self::FirstEver => "first ever",
            Self::SameWeek => "same week",
            Self::Continued => "continued",
            Self::Restarted => "restarted",
        }
    }
}

/// Result of applying one submission to a streak.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreakEvaluation {
    pub new_streak: u32,
    pub classification: Classification,
    pub week: WeekId,
    /// Whole weeks missed between the last entry and this one. Informational.
    pub weeks_skipped: u32,
}

/// Stateless streak transition function. The offset fixes the wall clock on
/// which calendar weeks are cut.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreakEvaluator {
    offset: FixedOffset,
}

impl Default for StreakEvaluator {
    fn default() -> Self {
        Self::new(Utc.fix())
    }
}

impl StreakEvaluator {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    pub fn week_of(&self, timestamp: DateTime<Utc>) -> WeekId {
        WeekId::from_timestamp_in(timestamp, self.offset)
    }

    pub fn evaluate(
        &self,
        last_entry_week: Option<WeekId>,
        current_streak: u32,
        now: DateTime<Utc>,
    ) -> StreakEvaluation {
        transition(last_entry_week, current_streak, self.week_of(now))
    }
}

/// Classify a submission in `week` against the stored streak.
pub fn transition(
    last_entry_week: Option<WeekId>,
    current_streak: u32,
    week: WeekId,
) -> StreakEvaluation {
    let Some(last) = last_entry_week else {
        return StreakEvaluation {
            new_streak: 1,
            classification: Classification::FirstEver,
            week,
            weeks_skipped: 0,
        };
    };

    if last == week {
        return StreakEvaluation {
            new_streak: current_streak,
            classification: Classification::SameWeek,
            week,
            weeks_skipped: 0,
        };
    }

    if last == week.predecessor() {
        return StreakEvaluation {
            new_streak: current_streak.saturating_add(1),
            classification: Classification::Continued,
            week,
            weeks_skipped: 0,
        };
    }

    let weeks_skipped = last
        .weeks_until(&week)
        .map(|gap| gap.saturating_sub(1).clamp(0, i64::from(u32::MAX)) as u32)
        .unwrap_or(0);

    StreakEvaluation {
        new_streak: 1,
        classification: Classification::Restarted,
        week,
        weeks_skipped,
    }
}
