use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Weekly reward schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointsConfig {
    pub base_points_per_entry: u32,
    pub streak_multiplier: u32,
    /// Exact streak length -> one-time bonus.
    pub milestone_rewards: BTreeMap<u32, u32>,
    /// Cap on base + streak + multiple-entry points. Milestones sit outside it.
    pub max_weekly_points: u32,
    pub multiple_entry_bonus: u32,
}

impl Default for PointsConfig {
    fn default() -> Self {
        Self {
            base_points_per_entry: 50,
            streak_multiplier: 10,
            milestone_rewards: BTreeMap::from([
                (4, 200),
                (12, 500),
                (26, 1000),
                (52, 2500),
                (104, 5000),
            ]),
            max_weekly_points: 300,
            multiple_entry_bonus: 20,
        }
    }
}

impl PointsConfig {
    pub fn milestone_reward(&self, streak: u32) -> Option<u32> {
        self.milestone_rewards
            .get(&streak)
            .copied()
            .filter(|reward| *reward > 0)
    }

    /// Smallest rewarded milestone strictly above `streak`.
    pub fn next_milestone_after(&self, streak: u32) -> Option<(u32, u32)> {
        self.milestone_rewards
            .range(streak.saturating_add(1)..)
            .find(|(_, reward)| **reward > 0)
            .map(|(length, reward)| (*length, *reward))
    }
}
