mod config;

pub use config::PointsConfig;

use serde::{Deserialize, Serialize};

/// Itemised award for a single submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PointsBreakdown {
    pub base: u32,
    pub streak_bonus: u32,
    pub milestone_bonus: u32,
    pub multiple_entry_bonus: u32,
    pub total: u32,
}

impl PointsBreakdown {
    /// Everything except the milestone bonus, which is ledgered separately.
    pub fn regular_total(&self) -> u32 {
        self.base
            .saturating_add(self.streak_bonus)
            .saturating_add(self.multiple_entry_bonus)
    }

    /// Same breakdown with the milestone bonus removed from the total.
    pub fn without_milestone(self) -> Self {
        Self {
            milestone_bonus: 0,
            total: self.regular_total(),
            ..self
        }
    }
}

/// Stateless calculator that applies the reward schedule to a streak length.
#[derive(Debug, Clone)]
pub struct PointsCalculator {
    config: PointsConfig,
}

impl PointsCalculator {
    pub fn new(config: PointsConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PointsConfig {
        &self.config
    }

    pub fn calculate(
        &self,
        resulting_streak: u32,
        is_multiple_entry_this_week: bool,
    ) -> PointsBreakdown {
        calculate(resulting_streak, is_multiple_entry_this_week, &self.config)
    }
}

pub fn calculate(
    resulting_streak: u32,
    is_multiple_entry_this_week: bool,
    config: &PointsConfig,
) -> PointsBreakdown {
    let base = config.base_points_per_entry;
    let multiple_entry_bonus = if is_multiple_entry_this_week {
        config.multiple_entry_bonus
    } else {
        0
    };

    let headroom = config
        .max_weekly_points
        .saturating_sub(base)
        .saturating_sub(multiple_entry_bonus);
    // Week one of a streak earns base only; the bonus counts weeks after it.
    let streak_bonus = resulting_streak
        .saturating_sub(1)
        .saturating_mul(config.streak_multiplier)
        .min(headroom);

    let milestone_bonus = config.milestone_reward(resulting_streak).unwrap_or(0);

    let total = base
        .saturating_add(streak_bonus)
        .saturating_add(milestone_bonus)
        .saturating_add(multiple_entry_bonus);

    PointsBreakdown {
        base,
        streak_bonus,
        milestone_bonus,
        multiple_entry_bonus,
        total,
    }
}
