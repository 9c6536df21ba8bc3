use chrono::Duration;

use mastery_progression::services::review_scheduler::DEFAULT_DUE_LIMIT;
use mastery_progression::EngineError;

mod common;

#[tokio::test]
async fn test_first_outcome_creates_record() {
    let t = common::setup().await;
    let scheduler = t.engine.scheduler();
    let now = common::start_time();

    let record = scheduler
        .update_review_outcome("learner-1", "content-1", 85)
        .await
        .unwrap();

    assert_eq!(record.mastery_level, 85);
    assert_eq!(record.review_count, 1);
    assert_eq!(record.last_reviewed_at, Some(now));
    // ladder[1] = 3 days, 85 => x1.5 => 4 days
    assert_eq!(record.next_review_due_at, Some(now + Duration::days(4)));
}

#[tokio::test]
async fn test_outcome_smooths_existing_mastery() {
    let t = common::setup().await;
    let scheduler = t.engine.scheduler();

    scheduler
        .update_review_outcome("learner-1", "content-1", 100)
        .await
        .unwrap();
    t.clock.advance_days(4);
    let record = scheduler
        .update_review_outcome("learner-1", "content-1", 40)
        .await
        .unwrap();

    assert_eq!(record.mastery_level, 58);
    assert_eq!(record.review_count, 2);
    let now = common::start_time() + Duration::days(4);
    assert_eq!(record.last_reviewed_at, Some(now));
    assert_eq!(record.next_review_due_at, Some(now + Duration::days(3)));
}

#[tokio::test]
async fn test_repeated_perfect_scores_never_exceed_100() {
    let t = common::setup().await;
    let scheduler = t.engine.scheduler();

    scheduler.initialize_for_review("l", "c").await.unwrap();
    let mut last = 0;
    for _ in 0..12 {
        let record = scheduler.update_review_outcome("l", "c", 100).await.unwrap();
        assert!(record.mastery_level >= last);
        assert!(record.mastery_level <= 100);
        last = record.mastery_level;
    }
    assert_eq!(last, 100);

    let record = scheduler.get_mastery("l", "c").await.unwrap().unwrap();
    assert_eq!(record.review_count, 12);
    // clamped ladder: 120 days * 1.5
    assert_eq!(
        record.next_review_due_at,
        Some(common::start_time() + Duration::days(180))
    );
}

#[tokio::test]
async fn test_out_of_range_score_is_rejected_without_writing() {
    let t = common::setup().await;
    let scheduler = t.engine.scheduler();

    let err = scheduler
        .update_review_outcome("learner-1", "content-1", 101)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    let err = scheduler
        .update_review_outcome("learner-1", "content-1", -5)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    assert!(scheduler
        .get_mastery("learner-1", "content-1")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_initialize_is_idempotent() {
    let t = common::setup().await;
    let scheduler = t.engine.scheduler();
    let now = common::start_time();

    let first = scheduler.initialize_for_review("l", "c").await.unwrap();
    assert_eq!(first.mastery_level, 0);
    assert_eq!(first.review_count, 0);
    assert_eq!(first.last_reviewed_at, None);
    assert_eq!(first.next_review_due_at, Some(now + Duration::days(1)));

    scheduler.update_review_outcome("l", "c", 90).await.unwrap();
    t.clock.advance_days(1);

    let again = scheduler.initialize_for_review("l", "c").await.unwrap();
    assert_eq!(again.review_count, 1);
    assert_eq!(again.mastery_level, 90);
}

#[tokio::test]
async fn test_due_reviews_ordered_enriched_and_limited() {
    let t = common::setup().await;
    let scheduler = t.engine.scheduler();
    common::add_content(t.db(), "c1", "Fractions").await;
    common::add_content(t.db(), "c2", "Decimals").await;

    scheduler.initialize_for_review("l", "c1").await.unwrap();
    assert!(scheduler
        .get_due_reviews("l", DEFAULT_DUE_LIMIT)
        .await
        .unwrap()
        .is_empty());

    t.clock.advance_days(1);
    scheduler.initialize_for_review("l", "c2").await.unwrap();
    // no catalogue entry for c3
    scheduler.initialize_for_review("l", "c3").await.unwrap();
    scheduler.initialize_for_review("other", "c1").await.unwrap();

    t.clock.advance_days(5);
    let due = scheduler.get_due_reviews("l", DEFAULT_DUE_LIMIT).await.unwrap();
    let ids: Vec<&str> = due.iter().map(|d| d.content_id.as_str()).collect();
    assert_eq!(ids, vec!["c1", "c2"]);
    assert_eq!(due[0].title, "Fractions");
    assert_eq!(due[0].content_type, "lesson");
    assert_eq!(due[0].days_overdue, 5);
    assert_eq!(due[1].days_overdue, 4);

    let limited = scheduler.get_due_reviews("l", 1).await.unwrap();
    assert_eq!(limited.len(), 1);
    assert_eq!(limited[0].content_id, "c1");

    assert!(scheduler.get_due_reviews("l", 0).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_mastery_overview_bands() {
    let t = common::setup().await;
    let scheduler = t.engine.scheduler();

    for (content, score) in [("a", 90), ("b", 90), ("c", 50), ("d", 10)] {
        scheduler.update_review_outcome("l", content, score).await.unwrap();
    }

    let overview = scheduler.get_student_mastery_overview("l").await.unwrap();
    assert_eq!(overview.total_items, 4);
    assert_eq!(overview.average_mastery, 60);
    assert_eq!(overview.items_mastered, 2);
    assert_eq!(overview.items_in_progress, 1);
    assert_eq!(overview.items_due_review, 0);

    // 50 and 10 were scheduled one day out, 90s four days out
    t.clock.advance_days(2);
    let overview = scheduler.get_student_mastery_overview("l").await.unwrap();
    assert_eq!(overview.items_due_review, 2);
}

#[tokio::test]
async fn test_mastery_overview_empty_learner() {
    let t = common::setup().await;
    let overview = t
        .engine
        .scheduler()
        .get_student_mastery_overview("nobody")
        .await
        .unwrap();
    assert_eq!(overview, Default::default());
}

#[tokio::test]
async fn test_all_mastery_levels() {
    let t = common::setup().await;
    let scheduler = t.engine.scheduler();

    scheduler.update_review_outcome("l", "x", 30).await.unwrap();
    scheduler.update_review_outcome("l", "y", 75).await.unwrap();
    scheduler.update_review_outcome("m", "z", 75).await.unwrap();

    let levels = scheduler.get_all_mastery_levels("l").await.unwrap();
    assert_eq!(levels.len(), 2);
    assert_eq!(levels.get("x"), Some(&30));
    assert_eq!(levels.get("y"), Some(&75));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_outcomes_are_all_applied() {
    let t = common::setup().await;

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let scheduler = t.engine.scheduler().clone();
            tokio::spawn(async move { scheduler.update_review_outcome("l", "c", 90).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let record = t.engine.scheduler().get_mastery("l", "c").await.unwrap().unwrap();
    assert_eq!(record.review_count, 8);
    assert_eq!(record.mastery_level, 90);
}
