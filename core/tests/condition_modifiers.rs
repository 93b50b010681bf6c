//! Condition modifier store tests.
//!
//! Tests cover: single-current invariant, archival on update, date queries
//! across current and archived lists, lookups, corruption detection and
//! concurrent updates.

use appraisal_core::{
    clock::{Clock, FixedClock},
    condition::{ConditionModifier, ConditionModifierList, ConditionModifierRegistry},
    error::AppraisalError,
    store::AppraisalStore,
    types::Money,
};
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use std::sync::Arc;

fn dec(s: &str) -> Money {
    s.parse().expect("decimal literal")
}

fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

struct Fixture {
    store:    Arc<AppraisalStore>,
    clock:    Arc<FixedClock>,
    registry: ConditionModifierRegistry,
}

fn fixture(now: DateTime<Utc>) -> Fixture {
    let store = AppraisalStore::in_memory().expect("in-memory store");
    store.migrate().expect("migrate");
    let store = Arc::new(store);
    let clock = Arc::new(FixedClock::new(now));
    let registry = ConditionModifierRegistry::new(store.clone(), clock.clone(), None);
    Fixture { store, clock, registry }
}

fn list(source: NaiveDate, entries: &[(&str, &str)]) -> ConditionModifierList {
    ConditionModifierList::new(
        source,
        entries.iter().map(|(code, factor)| ConditionModifier::new(*code, dec(factor))),
    )
    .expect("valid list")
}

fn january() -> ConditionModifierList {
    list(date(2024, 1, 1), &[("GOOD", "1.00"), ("FAIR", "0.85")])
}

fn june() -> ConditionModifierList {
    list(date(2024, 6, 1), &[("GOOD", "1.05"), ("FAIR", "0.90"), ("POOR", "0.70")])
}

#[test]
fn empty_store_has_no_current_list() {
    let fx = fixture(at(2024, 6, 1, 12));
    assert!(matches!(
        fx.registry.current_list(),
        Err(AppraisalError::NoCurrentConditionList)
    ));
}

#[test]
fn update_installs_list_with_id_and_timestamp() {
    let fx = fixture(at(2024, 6, 1, 12));
    let installed = fx.registry.update(&january()).unwrap();

    assert!(installed.id.is_some());
    assert_eq!(installed.last_updated, Some(at(2024, 6, 1, 12)));
    assert!(installed.same_content(&january()));
    assert_eq!(fx.registry.current_list().unwrap(), installed);
}

/// Replacing the current list moves it, unchanged, into history.
#[test]
fn update_archives_previous_list_unchanged() {
    let fx = fixture(at(2024, 6, 1, 12));
    let first = fx.registry.update(&january()).unwrap();

    fx.clock.advance(Duration::hours(2));
    let second = fx.registry.update(&june()).unwrap();

    let current = fx.registry.current_list().unwrap();
    assert_eq!(current, second);
    assert!(current.same_content(&june()));

    let history = fx.registry.history().unwrap();
    assert_eq!(history.len(), 1);
    let archived = &history[0];
    assert!(archived.list.same_content(&first));
    assert_eq!(archived.list.last_updated, first.last_updated);
    assert_eq!(archived.archived_at, at(2024, 6, 1, 14));
}

#[test]
fn exactly_one_list_is_current_after_many_updates() {
    let fx = fixture(at(2024, 6, 1, 12));
    for _ in 0..5 {
        fx.registry.update(&january()).unwrap();
        fx.registry.update(&june()).unwrap();
        fx.clock.advance(Duration::minutes(10));
    }

    assert_eq!(fx.store.current_condition_lists().unwrap().len(), 1);
    assert_eq!(fx.store.archived_condition_list_count().unwrap(), 9);
    assert!(fx.registry.current_list().unwrap().same_content(&june()));
}

#[test]
fn update_invalidates_cached_current_list() {
    let fx = fixture(at(2024, 6, 1, 12));
    fx.registry.update(&january()).unwrap();
    assert_eq!(fx.registry.lookup_modifier("GOOD").unwrap().factor, dec("1.00"));

    fx.registry.update(&june()).unwrap();
    assert_eq!(fx.registry.lookup_modifier("GOOD").unwrap().factor, dec("1.05"));
}

#[test]
fn lookup_unknown_code_fails() {
    let fx = fixture(at(2024, 6, 1, 12));
    fx.registry.update(&january()).unwrap();

    let err = fx.registry.lookup_modifier("POOR").unwrap_err();
    assert!(matches!(err, AppraisalError::ConditionModifierNotFound { code } if code == "POOR"));
}

#[test]
fn by_last_updated_searches_current_and_history() {
    let fx = fixture(at(2024, 5, 1, 9));
    fx.registry.update(&january()).unwrap();
    fx.clock.set(at(2024, 5, 2, 9));
    fx.registry.update(&june()).unwrap();
    fx.clock.set(at(2024, 6, 1, 12));

    let may_first = fx.registry.by_last_updated(date(2024, 5, 1)).unwrap();
    assert_eq!(may_first.len(), 1);
    assert!(may_first[0].same_content(&january()));

    let may_second = fx.registry.by_last_updated(date(2024, 5, 2)).unwrap();
    assert_eq!(may_second.len(), 1);
    assert!(may_second[0].same_content(&june()));
}

#[test]
fn by_last_updated_orders_same_day_lists_newest_first() {
    let fx = fixture(at(2024, 5, 1, 8));
    fx.registry.update(&january()).unwrap();
    fx.clock.set(at(2024, 5, 1, 17));
    fx.registry.update(&june()).unwrap();

    let lists = fx.registry.by_last_updated(date(2024, 5, 1)).unwrap();
    assert_eq!(lists.len(), 2);
    assert!(lists[0].same_content(&june()));
    assert!(lists[1].same_content(&january()));
}

#[test]
fn by_last_updated_rejects_future_and_empty_days() {
    let fx = fixture(at(2024, 6, 1, 12));
    fx.registry.update(&january()).unwrap();

    let tomorrow = fx.clock.today().succ_opt().unwrap();
    assert!(matches!(
        fx.registry.by_last_updated(tomorrow),
        Err(AppraisalError::FutureDate { .. })
    ));
    assert!(matches!(
        fx.registry.by_last_updated(date(2024, 5, 31)),
        Err(AppraisalError::NoConditionListForDate { .. })
    ));
}

/// Two current rows is corruption: reads and updates refuse to pick one.
#[test]
fn multiple_current_lists_are_reported_not_resolved() {
    let fx = fixture(at(2024, 6, 1, 12));
    fx.store.insert_condition_list(&january(), at(2024, 6, 1, 10)).unwrap();
    fx.store.insert_condition_list(&june(), at(2024, 6, 1, 11)).unwrap();

    assert!(matches!(
        fx.registry.current_list(),
        Err(AppraisalError::MultipleCurrentConditionLists { count: 2 })
    ));
    assert!(matches!(
        fx.registry.update(&january()),
        Err(AppraisalError::MultipleCurrentConditionLists { count: 2 })
    ));

    // The failed update changed nothing.
    assert_eq!(fx.store.current_condition_lists().unwrap().len(), 2);
    assert_eq!(fx.store.archived_condition_list_count().unwrap(), 0);
}

#[test]
fn invalid_lists_are_rejected() {
    let empty = ConditionModifierList::new(date(2024, 1, 1), Vec::<ConditionModifier>::new());
    assert!(matches!(empty, Err(AppraisalError::InvalidArgument(_))));

    let duplicate = ConditionModifierList::new(
        date(2024, 1, 1),
        vec![
            ConditionModifier::new("GOOD", dec("1.00")),
            ConditionModifier::new("GOOD", dec("1.10")),
        ],
    );
    assert!(matches!(duplicate, Err(AppraisalError::InvalidArgument(_))));

    let zero = ConditionModifierList::new(
        date(2024, 1, 1),
        vec![ConditionModifier::new("GOOD", Money::ZERO)],
    );
    assert!(matches!(zero, Err(AppraisalError::InvalidArgument(_))));
}

#[test]
fn concurrent_updates_leave_one_current_list() {
    let fx = fixture(at(2024, 6, 1, 12));
    fx.registry.update(&january()).unwrap();

    std::thread::scope(|s| {
        for i in 0..8 {
            let registry = &fx.registry;
            s.spawn(move || {
                let next = if i % 2 == 0 { june() } else { january() };
                registry.update(&next).unwrap();
                registry.current_list().unwrap();
            });
        }
    });

    assert_eq!(fx.store.current_condition_lists().unwrap().len(), 1);
    assert_eq!(fx.store.archived_condition_list_count().unwrap(), 8);
}
