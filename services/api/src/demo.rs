use crate::infra::{noon_of, parse_week};
use chrono::Duration;
use clap::Args;
use reflection_rewards::config::RewardsConfig;
use reflection_rewards::error::AppError;
use reflection_rewards::rewards::{
    EntryId, InMemoryRewardStore, RewardError, RewardOrchestrator, RewardResult, RewardStore,
    UserId, WeekId,
};
use std::sync::Arc;

/// Weeks after the first one on which the scripted reader journals. The
/// repeat and the gap exercise every classification.
const SCRIPT: [u32; 9] = [0, 1, 2, 3, 3, 4, 5, 8, 9];

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// First week of the run (YYYY-Www)
    #[arg(long, value_parser = parse_week, default_value = "2025-W48")]
    pub(crate) start: WeekId,
    /// User id recorded in the ledger
    #[arg(long, default_value = "demo-reader")]
    pub(crate) user: String,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let config = RewardsConfig::default();
    let service = RewardOrchestrator::new(Arc::new(InMemoryRewardStore::default()), &config);
    let user = UserId(args.user);

    println!("Weekly reflection rewards demo");
    println!("  Reader: {user}");
    println!(
        "  Schedule: {} base, +{} per streak week, cap {}, +{} for extra entries",
        config.points.base_points_per_entry,
        config.points.streak_multiplier,
        config.points.max_weekly_points,
        config.points.multiple_entry_bonus
    );

    for result in run_script(&service, &user, args.start)? {
        print_result(&result);
    }

    let last_week = week_after(args.start, SCRIPT[SCRIPT.len() - 1]);
    let stats = service.streak_stats_at(&user, monday_noon(last_week)?)?;
    println!("\nStanding after {}", stats.current_week);
    println!(
        "  Streak {} (best {}), {} points",
        stats.current_streak, stats.longest_streak, stats.total_points
    );
    match stats.next_milestone {
        Some(next) => println!(
            "  Next milestone: {} weeks, {} to go, worth {}",
            next.streak_length, next.weeks_remaining, next.reward
        ),
        None => println!("  Next milestone: none configured"),
    }
    Ok(())
}

pub(crate) fn run_script<S>(
    service: &RewardOrchestrator<S>,
    user: &UserId,
    start: WeekId,
) -> Result<Vec<RewardResult>, AppError>
where
    S: RewardStore + 'static,
{
    let mut results = Vec::with_capacity(SCRIPT.len());
    let mut previous: Option<u32> = None;
    for (index, offset) in SCRIPT.iter().enumerate() {
        let week = week_after(start, *offset);
        let mut at = monday_noon(week)?;
        if previous == Some(*offset) {
            at += Duration::days(2);
        }
        previous = Some(*offset);
        let entry = EntryId(format!("demo-entry-{}", index + 1));
        results.push(service.record_entry(user, &entry, at)?);
    }
    Ok(results)
}

fn monday_noon(week: WeekId) -> Result<chrono::DateTime<chrono::Utc>, AppError> {
    noon_of(week).ok_or_else(|| {
        AppError::Rewards(RewardError::InvalidTimestamp {
            raw: week.to_string(),
            reason: "week has no calendar date".to_string(),
        })
    })
}

fn week_after(start: WeekId, weeks: u32) -> WeekId {
    (0..weeks).fold(start, |week, _| week.successor())
}

fn print_result(result: &RewardResult) {
    let mut notes = Vec::new();
    if result.is_multiple_entry_this_week {
        notes.push("extra entry".to_string());
    }
    if result.streak_broken {
        notes.push("streak broken".to_string());
    }
    if let Some(milestone) = result.milestone_reached {
        notes.push(format!("{milestone}-week milestone"));
    }
    let notes = if notes.is_empty() {
        String::new()
    } else {
        format!(" ({})", notes.join(", "))
    };
    println!(
        "  {} {:<11} streak {:>2}  +{:<4} total {}{}",
        result.week,
        result.classification.label(),
        result.new_streak,
        result.points_awarded,
        result.total_points,
        notes
    );
}
