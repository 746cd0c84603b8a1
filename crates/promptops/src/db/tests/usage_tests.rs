use super::*;
use crate::db::queries::usage_records::UsageMeasure;
use crate::test_both_dbs;
use chrono::{Days, NaiveDate, NaiveDateTime};
use promptops_api::Plan;
use pretty_assertions::assert_eq;

fn t0() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 1, 15)
        .unwrap()
        .and_hms_opt(10, 30, 0)
        .unwrap()
}

async fn create_test_user(db: &Arc<Database>, plan: Plan, now: NaiveDateTime) -> UserId {
    db.create_user("user@example.com", false, plan, now)
        .await
        .unwrap()
        .id
}

test_both_dbs!(
    test_create_user_creates_usage_record,
    test_create_user_creates_usage_record_postgres,
    test_create_user_creates_usage_record_sqlite
);

async fn test_create_user_creates_usage_record(db: Arc<Database>) {
    let user_id = create_test_user(&db, Plan::Free, t0()).await;

    let record = db.get_usage_record(user_id).await.unwrap();
    assert_eq!(record.user_id, user_id);
    assert_eq!(record.plan, "free");
    assert_eq!(record.prompts_used, 0);
    assert_eq!(record.enhancements_used, 0);
    assert_eq!(record.prompts_saved, 0);
    assert_eq!(record.period_start_at, t0());
    assert_eq!(
        record.period_end_at,
        NaiveDate::from_ymd_opt(2025, 2, 15)
            .unwrap()
            .and_hms_opt(10, 30, 0)
            .unwrap()
    );
}

test_both_dbs!(
    test_get_usage_record_for_unknown_user_fails,
    test_get_usage_record_for_unknown_user_fails_postgres,
    test_get_usage_record_for_unknown_user_fails_sqlite
);

async fn test_get_usage_record_for_unknown_user_fails(db: Arc<Database>) {
    let error = db.get_usage_record(UserId(42)).await.unwrap_err();
    assert!(matches!(error, Error::UserNotFound(UserId(42))));
}

test_both_dbs!(
    test_increment_usage_is_monotonic,
    test_increment_usage_is_monotonic_postgres,
    test_increment_usage_is_monotonic_sqlite
);

async fn test_increment_usage_is_monotonic(db: Arc<Database>) {
    let user_id = create_test_user(&db, Plan::Free, t0()).await;

    for expected in 1..=5 {
        let record = db
            .increment_usage(user_id, UsageMeasure::Prompts)
            .await
            .unwrap();
        assert_eq!(record.prompts_used, expected);
        assert_eq!(record.enhancements_used, 0);
    }

    let record = db
        .increment_usage(user_id, UsageMeasure::Enhancements)
        .await
        .unwrap();
    assert_eq!(record.prompts_used, 5);
    assert_eq!(record.enhancements_used, 1);
}

test_both_dbs!(
    test_concurrent_increments_lose_no_updates,
    test_concurrent_increments_lose_no_updates_postgres,
    test_concurrent_increments_lose_no_updates_sqlite
);

async fn test_concurrent_increments_lose_no_updates(db: Arc<Database>) {
    let user_id = create_test_user(&db, Plan::Free, t0()).await;

    futures::future::join_all((0..50).map(|_| {
        let db = db.clone();
        async move {
            db.increment_usage(user_id, UsageMeasure::Prompts)
                .await
                .unwrap();
        }
    }))
    .await;

    let record = db.get_usage_record(user_id).await.unwrap();
    assert_eq!(record.prompts_used, 50);
}

test_both_dbs!(
    test_adjust_saved_count_clamps_at_zero,
    test_adjust_saved_count_clamps_at_zero_postgres,
    test_adjust_saved_count_clamps_at_zero_sqlite
);

async fn test_adjust_saved_count_clamps_at_zero(db: Arc<Database>) {
    let user_id = create_test_user(&db, Plan::Free, t0()).await;

    assert_eq!(
        db.adjust_saved_count(user_id, 1).await.unwrap().prompts_saved,
        1
    );
    assert_eq!(
        db.adjust_saved_count(user_id, 1).await.unwrap().prompts_saved,
        2
    );
    assert_eq!(
        db.adjust_saved_count(user_id, -1).await.unwrap().prompts_saved,
        1
    );
    assert_eq!(
        db.adjust_saved_count(user_id, -1).await.unwrap().prompts_saved,
        0
    );
    // Deleting with nothing saved stays at zero rather than going negative.
    assert_eq!(
        db.adjust_saved_count(user_id, -1).await.unwrap().prompts_saved,
        0
    );
    assert_eq!(
        db.adjust_saved_count(user_id, -5).await.unwrap().prompts_saved,
        0
    );
}

test_both_dbs!(
    test_rollover_is_a_noop_within_the_period,
    test_rollover_is_a_noop_within_the_period_postgres,
    test_rollover_is_a_noop_within_the_period_sqlite
);

async fn test_rollover_is_a_noop_within_the_period(db: Arc<Database>) {
    let user_id = create_test_user(&db, Plan::Free, t0()).await;
    db.increment_usage(user_id, UsageMeasure::Prompts)
        .await
        .unwrap();
    let before = db.get_usage_record(user_id).await.unwrap();

    let after = db
        .rollover_usage_if_expired(user_id, t0() + Days::new(10))
        .await
        .unwrap();
    assert_eq!(after, before);

    // The boundary itself still counts as within the period.
    let after = db
        .rollover_usage_if_expired(user_id, before.period_end_at)
        .await
        .unwrap();
    assert_eq!(after, before);
}

test_both_dbs!(
    test_rollover_resets_counters_and_advances_the_window,
    test_rollover_resets_counters_and_advances_the_window_postgres,
    test_rollover_resets_counters_and_advances_the_window_sqlite
);

async fn test_rollover_resets_counters_and_advances_the_window(db: Arc<Database>) {
    let user_id = create_test_user(&db, Plan::Free, t0()).await;
    for _ in 0..3 {
        db.increment_usage(user_id, UsageMeasure::Prompts)
            .await
            .unwrap();
    }
    db.increment_usage(user_id, UsageMeasure::Enhancements)
        .await
        .unwrap();
    db.adjust_saved_count(user_id, 2).await.unwrap();
    let old = db.get_usage_record(user_id).await.unwrap();

    let rolled = db
        .rollover_usage_if_expired(user_id, t0() + Days::new(45))
        .await
        .unwrap();
    assert_eq!(rolled.prompts_used, 0);
    assert_eq!(rolled.enhancements_used, 0);
    // Saved prompts occupy slots across periods.
    assert_eq!(rolled.prompts_saved, 2);
    // The new window starts exactly where the old one ended.
    assert_eq!(rolled.period_start_at, old.period_end_at);
    assert_eq!(
        rolled.period_end_at,
        NaiveDate::from_ymd_opt(2025, 3, 15)
            .unwrap()
            .and_hms_opt(10, 30, 0)
            .unwrap()
    );
}

test_both_dbs!(
    test_rollover_catches_up_over_multiple_periods,
    test_rollover_catches_up_over_multiple_periods_postgres,
    test_rollover_catches_up_over_multiple_periods_sqlite
);

async fn test_rollover_catches_up_over_multiple_periods(db: Arc<Database>) {
    let user_id = create_test_user(&db, Plan::Free, t0()).await;

    let now = NaiveDate::from_ymd_opt(2025, 6, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    let rolled = db.rollover_usage_if_expired(user_id, now).await.unwrap();

    // Windows stay aligned to the signup date even after a long idle gap.
    assert_eq!(
        rolled.period_start_at,
        NaiveDate::from_ymd_opt(2025, 5, 15)
            .unwrap()
            .and_hms_opt(10, 30, 0)
            .unwrap()
    );
    assert_eq!(
        rolled.period_end_at,
        NaiveDate::from_ymd_opt(2025, 6, 15)
            .unwrap()
            .and_hms_opt(10, 30, 0)
            .unwrap()
    );
}

test_both_dbs!(
    test_rollover_sweep_only_touches_expired_records,
    test_rollover_sweep_only_touches_expired_records_postgres,
    test_rollover_sweep_only_touches_expired_records_sqlite
);

async fn test_rollover_sweep_only_touches_expired_records(db: Arc<Database>) {
    let expired_user = db
        .create_user("expired@example.com", false, Plan::Free, t0())
        .await
        .unwrap()
        .id;
    let current_user = db
        .create_user(
            "current@example.com",
            false,
            Plan::Free,
            t0() + Days::new(40),
        )
        .await
        .unwrap()
        .id;
    db.increment_usage(expired_user, UsageMeasure::Prompts)
        .await
        .unwrap();
    db.increment_usage(current_user, UsageMeasure::Prompts)
        .await
        .unwrap();

    let count = db
        .rollover_expired_periods(t0() + Days::new(45))
        .await
        .unwrap();
    assert_eq!(count, 1);

    let expired = db.get_usage_record(expired_user).await.unwrap();
    assert_eq!(expired.prompts_used, 0);
    let current = db.get_usage_record(current_user).await.unwrap();
    assert_eq!(current.prompts_used, 1);
}

test_both_dbs!(
    test_set_plan_preserves_counters_and_window,
    test_set_plan_preserves_counters_and_window_postgres,
    test_set_plan_preserves_counters_and_window_sqlite
);

async fn test_set_plan_preserves_counters_and_window(db: Arc<Database>) {
    let user_id = create_test_user(&db, Plan::Free, t0()).await;
    for _ in 0..3 {
        db.increment_usage(user_id, UsageMeasure::Prompts)
            .await
            .unwrap();
    }
    let before = db.get_usage_record(user_id).await.unwrap();

    let after = db.set_plan(user_id, Plan::Pro).await.unwrap();
    assert_eq!(after.plan, "pro");
    assert_eq!(after.prompts_used, before.prompts_used);
    assert_eq!(after.period_start_at, before.period_start_at);
    assert_eq!(after.period_end_at, before.period_end_at);
}

test_both_dbs!(
    test_destroy_user_removes_usage_record,
    test_destroy_user_removes_usage_record_postgres,
    test_destroy_user_removes_usage_record_sqlite
);

async fn test_destroy_user_removes_usage_record(db: Arc<Database>) {
    let user_id = create_test_user(&db, Plan::Free, t0()).await;
    db.destroy_user(user_id).await.unwrap();

    assert!(db.get_user_by_id(user_id).await.unwrap().is_none());
    let error = db.get_usage_record(user_id).await.unwrap_err();
    assert!(matches!(error, Error::UserNotFound(_)));
}
