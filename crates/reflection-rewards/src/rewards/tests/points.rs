use std::collections::BTreeMap;

use crate::rewards::points::{calculate, PointsBreakdown, PointsCalculator, PointsConfig};

#[test]
fn first_week_earns_only_the_base_award() {
    let breakdown = calculate(1, false, &PointsConfig::default());
    assert_eq!(
        breakdown,
        PointsBreakdown {
            base: 50,
            streak_bonus: 0,
            milestone_bonus: 0,
            multiple_entry_bonus: 0,
            total: 50,
        }
    );
}

#[test]
fn additional_entry_adds_the_bonus() {
    let breakdown = calculate(1, true, &PointsConfig::default());
    assert_eq!(breakdown.multiple_entry_bonus, 20);
    assert_eq!(breakdown.total, 70);
}

#[test]
fn streak_bonus_is_capped_but_milestones_are_not() {
    let calculator = PointsCalculator::new(PointsConfig::default());

    let long = calculator.calculate(40, true);
    assert_eq!(long.streak_bonus, 230);
    assert_eq!(long.regular_total(), 300);

    let milestone = calculator.calculate(52, false);
    assert_eq!(milestone.streak_bonus, 250);
    assert_eq!(milestone.milestone_bonus, 2500);
    assert_eq!(milestone.total, 2800);
    assert_eq!(milestone.regular_total(), 300);
}

#[test]
fn milestones_match_the_exact_streak_length() {
    let config = PointsConfig::default();
    assert_eq!(calculate(4, false, &config).milestone_bonus, 200);
    assert_eq!(calculate(5, false, &config).milestone_bonus, 0);
    assert_eq!(calculate(3, false, &config).milestone_bonus, 0);
}

#[test]
fn cap_below_base_leaves_no_streak_bonus() {
    let config = PointsConfig {
        base_points_per_entry: 50,
        streak_multiplier: 10,
        milestone_rewards: BTreeMap::new(),
        max_weekly_points: 40,
        multiple_entry_bonus: 20,
    };
    let breakdown = calculate(9, true, &config);
    assert_eq!(breakdown.streak_bonus, 0);
    assert_eq!(breakdown.total, 70);
}

#[test]
fn next_milestone_skips_zero_rewards() {
    let config = PointsConfig {
        milestone_rewards: BTreeMap::from([(4, 0), (8, 300)]),
        ..PointsConfig::default()
    };
    assert_eq!(config.next_milestone_after(1), Some((8, 300)));
    assert_eq!(config.milestone_reward(4), None);
    assert_eq!(config.next_milestone_after(8), None);
}
