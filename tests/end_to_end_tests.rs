use chrono::Duration;
use serde_json::json;

use mastery_progression::services::review_scheduler::DEFAULT_DUE_LIMIT;
use mastery_progression::Clock;

mod common;

#[tokio::test]
async fn test_review_cycle_from_first_outcome() {
    let t = common::setup().await;
    let scheduler = t.engine.scheduler();

    let start = common::start_time();
    let record = scheduler.update_review_outcome("l", "c", 100).await.unwrap();
    assert_eq!(record.mastery_level, 100);
    assert_eq!(record.review_count, 1);
    assert_eq!(record.next_review_due_at, Some(start + Duration::days(4)));

    t.clock.advance_days(4);
    let now = t.clock.now();
    let record = scheduler.update_review_outcome("l", "c", 40).await.unwrap();
    assert_eq!(record.mastery_level, 58);
    assert_eq!(record.review_count, 2);
    // ladder[2] = 7 days, 40 => x0.5
    assert_eq!(record.next_review_due_at, Some(now + Duration::days(3)));
}

#[tokio::test]
async fn test_review_cycle_after_initialize() {
    let t = common::setup().await;
    let scheduler = t.engine.scheduler();
    common::add_content(t.db(), "c", "Photosynthesis").await;

    let start = common::start_time();
    let record = scheduler.initialize_for_review("l", "c").await.unwrap();
    assert_eq!(record.mastery_level, 0);
    assert_eq!(record.review_count, 0);
    assert_eq!(record.next_review_due_at, Some(start + Duration::days(1)));

    t.clock.advance_days(1);
    let due = scheduler.get_due_reviews("l", DEFAULT_DUE_LIMIT).await.unwrap();
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].title, "Photosynthesis");

    let now = t.clock.now();
    let record = scheduler.update_review_outcome("l", "c", 100).await.unwrap();
    assert_eq!(record.mastery_level, 100);
    assert_eq!(record.review_count, 1);
    assert_eq!(record.next_review_due_at, Some(now + Duration::days(4)));

    assert!(scheduler
        .get_due_reviews("l", DEFAULT_DUE_LIMIT)
        .await
        .unwrap()
        .is_empty());

    t.clock.advance_days(4);
    let now = t.clock.now();
    let record = scheduler.update_review_outcome("l", "c", 40).await.unwrap();
    assert_eq!(record.mastery_level, 58);
    assert_eq!(record.review_count, 2);
    assert_eq!(record.next_review_due_at, Some(now + Duration::days(3)));
}

#[tokio::test]
async fn test_learning_session_awards_progress() {
    let t = common::setup().await;
    let scheduler = t.engine.scheduler();
    let ledger = t.engine.ledger();
    let badges = t.engine.badges();
    common::add_badge(t.db(), "xp-100", "xp_threshold", common::xp_badge(100), 10).await;
    common::add_badge(t.db(), "streak-2", "streak", json!({ "days": 2 }), 900).await;
    ledger.ensure_learner("l").await.unwrap();

    for _ in 0..2 {
        scheduler.update_review_outcome("l", "c", 90).await.unwrap();
        ledger.award_xp("l", 60).await.unwrap();
        ledger.update_streak("l").await.unwrap();
        badges.check_and_award_badges("l").await.unwrap();
        t.clock.advance_days(1);
    }

    // 120 from reviews, 10 from xp-100, 900 from streak-2
    let progress = ledger.get_overall_progress("l").await.unwrap();
    assert_eq!(progress.xp, 1030);
    assert_eq!(progress.level, 2);
    assert_eq!(progress.current_streak, 2);
    assert_eq!(progress.badges_earned, 2);

    let earned = badges.get_learner_badges("l").await.unwrap();
    let ids: Vec<&str> = earned.iter().map(|b| b.badge_id.as_str()).collect();
    assert_eq!(ids, vec!["streak-2", "xp-100"]);

    let overview = scheduler.get_student_mastery_overview("l").await.unwrap();
    assert_eq!(overview.total_items, 1);
    assert_eq!(overview.items_mastered, 1);

    t.clock.advance_days(1);
    assert_eq!(ledger.get_streak("l").await.unwrap().current_streak, 0);
    assert_eq!(ledger.get_overall_progress("l").await.unwrap().stored_streak, 2);
}
