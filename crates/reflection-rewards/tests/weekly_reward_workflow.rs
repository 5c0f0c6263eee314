//! End-to-end scenarios driven through the public orchestrator facade.
//!
//! A user journals across a few months, including a missed stretch, a
//! double entry and a new-year boundary, and the ledger must account for
//! every point the state row claims.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use reflection_rewards::config::RewardsConfig;
use reflection_rewards::rewards::{
    write_ledger_csv, Classification, EntryId, InMemoryRewardStore, LedgerReason,
    RewardOrchestrator, RewardStore, UserId, WeekId,
};

fn monday_noon(raw: &str) -> DateTime<Utc> {
    raw.parse::<WeekId>()
        .expect("valid week")
        .monday()
        .expect("monday exists")
        .and_hms_opt(12, 0, 0)
        .expect("valid time")
        .and_utc()
}

#[test]
fn season_of_reflections_keeps_ledger_and_state_in_step() {
    let store = InMemoryRewardStore::default();
    let service = RewardOrchestrator::new(Arc::new(store.clone()), &RewardsConfig::default());
    let user = UserId("reader-42".to_string());

    let weeks = [
        "2025-W48", "2025-W49", "2025-W50", "2025-W51", "2025-W52", "2026-W01", "2026-W04",
        "2026-W04", "2026-W05",
    ];
    let results: Vec<_> = weeks
        .iter()
        .enumerate()
        .map(|(index, raw)| {
            service
                .record_entry(&user, &EntryId(format!("entry-{index}")), monday_noon(raw))
                .expect("entry recorded")
        })
        .collect();

    let classifications: Vec<_> = results.iter().map(|result| result.classification).collect();
    assert_eq!(
        classifications,
        vec![
            Classification::FirstEver,
            Classification::Continued,
            Classification::Continued,
            Classification::Continued,
            Classification::Continued,
            Classification::Continued,
            Classification::Restarted,
            Classification::SameWeek,
            Classification::Continued,
        ]
    );
    assert_eq!(results[3].milestone_reached, Some(4));
    assert_eq!(results[5].new_streak, 6);
    assert!(results[6].streak_broken);
    assert!(results[7].is_multiple_entry_this_week);
    assert_eq!(results[8].new_streak, 2);

    let state = store
        .read_state(&user)
        .expect("state readable")
        .expect("state stored");
    assert_eq!(state.current_streak, 2);
    assert_eq!(state.longest_streak, 6);

    let ledger = store.ledger(&user).expect("ledger readable");
    let ledger_total: u64 = ledger.iter().map(|row| u64::from(row.points_earned)).sum();
    assert_eq!(state.total_points, ledger_total);
    assert_eq!(
        ledger
            .iter()
            .filter(|row| row.reason == LedgerReason::Milestone(4))
            .count(),
        1
    );

    let mut csv = Vec::new();
    write_ledger_csv(&mut csv, &ledger).expect("csv written");
    let csv = String::from_utf8(csv).expect("utf8");
    assert_eq!(csv.lines().count(), ledger.len() + 1);
    assert!(csv.contains("milestone_4_weeks"));
}

#[test]
fn users_do_not_share_streaks() {
    let store = InMemoryRewardStore::default();
    let service = RewardOrchestrator::new(Arc::new(store), &RewardsConfig::default());
    let alice = UserId("alice".to_string());
    let bob = UserId("bob".to_string());

    service
        .record_entry(&alice, &EntryId("a-1".to_string()), monday_noon("2025-W20"))
        .expect("entry recorded");
    let bob_first = service
        .record_entry(&bob, &EntryId("b-1".to_string()), monday_noon("2025-W21"))
        .expect("entry recorded");
    let alice_second = service
        .record_entry(&alice, &EntryId("a-2".to_string()), monday_noon("2025-W21"))
        .expect("entry recorded");

    assert_eq!(bob_first.classification, Classification::FirstEver);
    assert!(!bob_first.is_multiple_entry_this_week);
    assert_eq!(alice_second.new_streak, 2);
}
