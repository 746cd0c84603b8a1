use super::*;
use crate::test_both_dbs;
use chrono::{NaiveDate, NaiveDateTime};
use promptops_api::Plan;
use pretty_assertions::assert_eq;

fn t0() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 1, 15)
        .unwrap()
        .and_hms_opt(10, 30, 0)
        .unwrap()
}

test_both_dbs!(
    test_prompts_claim_and_release_slots,
    test_prompts_claim_and_release_slots_postgres,
    test_prompts_claim_and_release_slots_sqlite
);

async fn test_prompts_claim_and_release_slots(db: Arc<Database>) {
    let user_id = db
        .create_user("user@example.com", false, Plan::Free, t0())
        .await
        .unwrap()
        .id;

    let first = db
        .create_prompt(user_id, "summarizer", "Summarize this: {input}", t0())
        .await
        .unwrap();
    let second = db
        .create_prompt(user_id, "translator", "Translate to French: {input}", t0())
        .await
        .unwrap();
    assert_eq!(db.get_usage_record(user_id).await.unwrap().prompts_saved, 2);

    let prompts = db.list_prompts(user_id).await.unwrap();
    assert_eq!(
        prompts.iter().map(|p| p.title.as_str()).collect::<Vec<_>>(),
        ["summarizer", "translator"]
    );

    assert!(db.delete_prompt(user_id, first.id).await.unwrap());
    assert_eq!(db.get_usage_record(user_id).await.unwrap().prompts_saved, 1);

    // Deleting a prompt that's already gone releases nothing.
    assert!(!db.delete_prompt(user_id, first.id).await.unwrap());
    assert_eq!(db.get_usage_record(user_id).await.unwrap().prompts_saved, 1);

    // Another user's prompt is invisible to this one.
    let other_user = db
        .create_user("other@example.com", false, Plan::Free, t0())
        .await
        .unwrap()
        .id;
    assert!(!db.delete_prompt(other_user, second.id).await.unwrap());
    assert_eq!(db.get_usage_record(user_id).await.unwrap().prompts_saved, 1);
}

test_both_dbs!(
    test_create_prompt_for_unknown_user_fails,
    test_create_prompt_for_unknown_user_fails_postgres,
    test_create_prompt_for_unknown_user_fails_sqlite
);

async fn test_create_prompt_for_unknown_user_fails(db: Arc<Database>) {
    let error = db
        .create_prompt(UserId(42), "orphan", "body", t0())
        .await
        .unwrap_err();
    assert!(matches!(error, Error::UserNotFound(UserId(42))));
}
