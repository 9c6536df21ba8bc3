//! Spaced-repetition scheduling and mastery estimation per (learner, content) pair.
//!
//! The due date is a fixed two-factor product: an interval picked from
//! [`REVIEW_INTERVALS_DAYS`] by review count, scaled by a multiplier chosen from the
//! last performance score. The mastery estimate is an exponentially smoothed score.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::clock::SharedClock;
use crate::db::operations::{content, mastery};
use crate::db::operations::mastery::{MasteryRecord, MasteryUpdate, NewMasteryRecord};
use crate::db::Database;
use crate::error::{with_retry, EngineError, EngineResult};

pub const REVIEW_INTERVALS_DAYS: [i64; 7] = [1, 3, 7, 14, 30, 60, 120];

pub const MIN_SCORE: i64 = 0;
pub const MAX_SCORE: i64 = 100;

pub const MASTERED_THRESHOLD: i64 = 80;
pub const IN_PROGRESS_THRESHOLD: i64 = 40;

pub const DEFAULT_DUE_LIMIT: usize = 10;
pub const MAX_DUE_LIMIT: usize = 100;

/// Weight of the newest score in the smoothed estimate, in tenths.
const LATEST_WEIGHT_TENTHS: i64 = 7;

pub fn base_interval_days(review_count: i64) -> i64 {
    let last = REVIEW_INTERVALS_DAYS.len() - 1;
    let index = usize::try_from(review_count.max(0)).map_or(last, |c| c.min(last));
    REVIEW_INTERVALS_DAYS[index]
}

pub fn performance_multiplier(last_performance: i64) -> f64 {
    if last_performance >= 80 {
        1.5
    } else if last_performance >= 60 {
        1.0
    } else {
        0.5
    }
}

/// Whole days until the next review. Fractions truncate, so a weak score on the
/// first rung yields 0 (due immediately).
pub fn next_interval_days(review_count: i64, last_performance: i64) -> i64 {
    let base = base_interval_days(review_count) as f64;
    (base * performance_multiplier(last_performance)).floor() as i64
}

/// Due date for a pair. `_mastery_level` does not affect the interval: the schedule
/// depends only on how many reviews happened and how the last one went.
pub fn calculate_next_review(
    _mastery_level: i64,
    review_count: i64,
    last_performance: i64,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    now + Duration::days(next_interval_days(review_count, last_performance))
}

/// `round(0.7 * score + 0.3 * previous)`, halves rounding up, kept within 0..=100.
pub fn smooth_mastery(previous: i64, performance_score: i64) -> i64 {
    let previous = previous.clamp(MIN_SCORE, MAX_SCORE);
    let score = performance_score.clamp(MIN_SCORE, MAX_SCORE);
    let weighted = LATEST_WEIGHT_TENTHS * score + (10 - LATEST_WEIGHT_TENTHS) * previous;
    ((weighted + 5) / 10).clamp(MIN_SCORE, MAX_SCORE)
}

pub fn validate_score(performance_score: i64) -> EngineResult<i64> {
    if !(MIN_SCORE..=MAX_SCORE).contains(&performance_score) {
        return Err(EngineError::Validation(format!(
            "performance score must be within {MIN_SCORE}..={MAX_SCORE}, got {performance_score}"
        )));
    }
    Ok(performance_score)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DueReview {
    pub content_id: String,
    pub title: String,
    pub content_type: String,
    pub mastery_level: i64,
    pub review_count: i64,
    pub last_reviewed_at: Option<DateTime<Utc>>,
    pub next_review_due_at: DateTime<Utc>,
    pub days_overdue: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MasteryOverview {
    pub total_items: i64,
    pub average_mastery: i64,
    pub items_mastered: i64,
    pub items_in_progress: i64,
    pub items_due_review: i64,
}

#[derive(Clone)]
pub struct ReviewScheduler {
    db: Database,
    clock: SharedClock,
}

impl ReviewScheduler {
    pub fn new(db: Database, clock: SharedClock) -> Self {
        Self { db, clock }
    }

    /// Items due for `learner_id`, earliest due first, at most `limit` (capped at
    /// [`MAX_DUE_LIMIT`]). Records whose content no longer exists are skipped.
    pub async fn get_due_reviews(
        &self,
        learner_id: &str,
        limit: usize,
    ) -> EngineResult<Vec<DueReview>> {
        let limit = limit.min(MAX_DUE_LIMIT);
        if limit == 0 {
            return Ok(Vec::new());
        }

        let now = self.clock.now();
        let mut tx = self.db.begin().await?;
        let records = mastery::list_due(&mut tx, learner_id, now, limit as i64).await?;

        let mut due = Vec::with_capacity(records.len());
        for record in records {
            let (Some(content_id), Some(due_at)) = (record.content_id, record.next_review_due_at)
            else {
                continue;
            };
            let Some(summary) = content::find_summary(&mut tx, &content_id).await? else {
                tracing::debug!(learner_id, content_id = %content_id, "skipping due item with missing content");
                continue;
            };
            due.push(DueReview {
                content_id,
                title: summary.title,
                content_type: summary.content_type,
                mastery_level: record.mastery_level,
                review_count: record.review_count,
                last_reviewed_at: record.last_reviewed_at,
                next_review_due_at: due_at,
                days_overdue: (now - due_at).num_days().max(0),
            });
        }
        tx.commit().await?;

        tracing::debug!(learner_id, count = due.len(), "loaded due reviews");
        Ok(due)
    }

    /// Folds one review outcome into the pair's estimate and reschedules it. The new
    /// level, count and due date are written together or not at all.
    pub async fn update_review_outcome(
        &self,
        learner_id: &str,
        content_id: &str,
        performance_score: i64,
    ) -> EngineResult<MasteryRecord> {
        let score = validate_score(performance_score)?;
        with_retry("update_review_outcome", move || {
            self.apply_review_outcome(learner_id, content_id, score)
        })
        .await
    }

    async fn apply_review_outcome(
        &self,
        learner_id: &str,
        content_id: &str,
        score: i64,
    ) -> EngineResult<MasteryRecord> {
        let now = self.clock.now();
        let mut tx = self.db.begin_write().await?;

        match mastery::find(&mut tx, learner_id, content_id).await? {
            None => {
                let review_count = 1;
                let record = NewMasteryRecord {
                    learner_id,
                    content_id,
                    mastery_level: score,
                    review_count,
                    last_reviewed_at: Some(now),
                    next_review_due_at: calculate_next_review(score, review_count, score, now),
                };
                if !mastery::insert_if_absent(&mut tx, &record, now).await? {
                    return Err(EngineError::Conflict(format!(
                        "mastery record for {learner_id}/{content_id} created concurrently"
                    )));
                }
            }
            Some(existing) => {
                // An initialized record has no observation yet; its first score stands alone.
                let mastery_level = if existing.review_count == 0 {
                    score
                } else {
                    smooth_mastery(existing.mastery_level, score)
                };
                let review_count = existing.review_count + 1;
                let update = MasteryUpdate {
                    mastery_level,
                    review_count,
                    last_reviewed_at: now,
                    next_review_due_at: calculate_next_review(
                        mastery_level,
                        review_count,
                        score,
                        now,
                    ),
                };
                mastery::apply_update(&mut tx, &existing.id, existing.version, &update, now)
                    .await?;
            }
        }

        let stored = mastery::find(&mut tx, learner_id, content_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("mastery {learner_id}/{content_id}")))?;
        tx.commit().await?;

        tracing::debug!(
            learner_id,
            content_id,
            score,
            mastery_level = stored.mastery_level,
            review_count = stored.review_count,
            "review outcome recorded"
        );
        Ok(stored)
    }

    /// Creates a fresh record due tomorrow. An existing record is returned untouched.
    pub async fn initialize_for_review(
        &self,
        learner_id: &str,
        content_id: &str,
    ) -> EngineResult<MasteryRecord> {
        with_retry("initialize_for_review", move || async move {
            let now = self.clock.now();
            let mut tx = self.db.begin_write().await?;
            let record = NewMasteryRecord {
                learner_id,
                content_id,
                mastery_level: 0,
                review_count: 0,
                last_reviewed_at: None,
                next_review_due_at: now + Duration::days(REVIEW_INTERVALS_DAYS[0]),
            };
            let created = mastery::insert_if_absent(&mut tx, &record, now).await?;
            let stored = mastery::find(&mut tx, learner_id, content_id)
                .await?
                .ok_or_else(|| {
                    EngineError::NotFound(format!("mastery {learner_id}/{content_id}"))
                })?;
            tx.commit().await?;

            if created {
                tracing::debug!(learner_id, content_id, "initialized for review");
            }
            Ok(stored)
        })
        .await
    }

    pub async fn get_mastery(
        &self,
        learner_id: &str,
        content_id: &str,
    ) -> EngineResult<Option<MasteryRecord>> {
        let mut conn = self.db.pool().acquire().await?;
        mastery::find(&mut conn, learner_id, content_id).await
    }

    pub async fn get_student_mastery_overview(
        &self,
        learner_id: &str,
    ) -> EngineResult<MasteryOverview> {
        let mut conn = self.db.pool().acquire().await?;
        let counts = mastery::count_by_band(
            &mut conn,
            learner_id,
            self.clock.now(),
            MASTERED_THRESHOLD,
            IN_PROGRESS_THRESHOLD,
        )
        .await?;

        let average_mastery = if counts.total_items > 0 {
            counts.mastery_sum / counts.total_items
        } else {
            0
        };
        Ok(MasteryOverview {
            total_items: counts.total_items,
            average_mastery,
            items_mastered: counts.items_mastered,
            items_in_progress: counts.items_in_progress,
            items_due_review: counts.items_due_review,
        })
    }

    /// content id -> mastery level for every record with a content id.
    pub async fn get_all_mastery_levels(
        &self,
        learner_id: &str,
    ) -> EngineResult<HashMap<String, i64>> {
        let mut conn = self.db.pool().acquire().await?;
        mastery::mastery_levels(&mut conn, learner_id).await
    }
}
