//! Experience, levels and daily streaks on the learner record.
//!
//! All XP changes go through [`credit_xp`], which recomputes the level in the same
//! unit-of-work. Streaks have two deliberately different paths:
//! [`ProgressionLedger::update_streak`] mutates the stored streak when activity is
//! recorded, while [`ProgressionLedger::get_streak`] only reports a lapsed streak as 0
//! and leaves the stored value for the next recorded activity to reset.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::SqliteConnection;

use crate::clock::SharedClock;
use crate::db::operations::learner::{self, LearnerProgress};
use crate::db::operations::badge;
use crate::db::Database;
use crate::error::{with_retry, EngineError, EngineResult};

pub const XP_PER_LEVEL: i64 = 1000;

/// Level for an XP total: level 1 spans 0..1000, level 2 starts at 1000.
pub fn level_for_xp(xp: i64) -> i64 {
    xp.max(0) / XP_PER_LEVEL + 1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelProgress {
    pub level: i64,
    pub xp_into_level: i64,
    pub xp_for_next_level: i64,
}

pub fn level_progress(xp: i64) -> LevelProgress {
    let xp = xp.max(0);
    let xp_into_level = xp % XP_PER_LEVEL;
    LevelProgress {
        level: level_for_xp(xp),
        xp_into_level,
        xp_for_next_level: XP_PER_LEVEL - xp_into_level,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct XpAward {
    pub new_xp: i64,
    pub new_level: i64,
    pub leveled_up: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreakStatus {
    pub current_streak: i64,
    pub longest_streak: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreakState {
    pub current_streak: i64,
    pub longest_streak: i64,
    pub last_activity_date: Option<NaiveDate>,
}

/// Streak after recording activity on `today`, or `None` when nothing changes
/// (activity already recorded today, or `today` precedes the stored date).
pub fn advance_streak(state: StreakState, today: NaiveDate) -> Option<StreakState> {
    let Some(last) = state.last_activity_date else {
        return Some(StreakState {
            current_streak: 1,
            longest_streak: state.longest_streak.max(1),
            last_activity_date: Some(today),
        });
    };

    match (today - last).num_days() {
        gap if gap <= 0 => None,
        1 => {
            let current_streak = state.current_streak + 1;
            Some(StreakState {
                current_streak,
                longest_streak: state.longest_streak.max(current_streak),
                last_activity_date: Some(today),
            })
        }
        _ => Some(StreakState {
            current_streak: 1,
            longest_streak: state.longest_streak,
            last_activity_date: Some(today),
        }),
    }
}

/// Streak to show on `today`: a streak whose last activity is more than a day old
/// reads as 0.
pub fn displayed_streak(
    current_streak: i64,
    last_activity_date: Option<NaiveDate>,
    today: NaiveDate,
) -> i64 {
    match last_activity_date {
        Some(last) if (today - last).num_days() > 1 => 0,
        _ => current_streak,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverallProgress {
    pub learner_id: String,
    pub xp: i64,
    pub level: i64,
    pub level_progress: LevelProgress,
    pub current_streak: i64,
    pub stored_streak: i64,
    pub longest_streak: i64,
    pub last_activity_date: Option<NaiveDate>,
    pub badges_earned: i64,
}

/// Adds `amount` XP to the learner inside the caller's unit-of-work and recomputes the
/// level. This is the only writer of `xp`.
pub(crate) async fn credit_xp(
    conn: &mut SqliteConnection,
    learner_id: &str,
    amount: i64,
    now: DateTime<Utc>,
) -> EngineResult<XpAward> {
    let current = learner::require(conn, learner_id).await?;
    let old_level = current.level;
    let new_xp = current.xp + amount;
    let new_level = level_for_xp(new_xp);

    learner::store_xp(conn, &current, new_xp, new_level, now).await?;

    let leveled_up = new_level > old_level;
    if leveled_up {
        tracing::info!(learner_id, new_level, new_xp, "learner leveled up");
    }
    Ok(XpAward {
        new_xp,
        new_level,
        leveled_up,
    })
}

#[derive(Clone)]
pub struct ProgressionLedger {
    db: Database,
    clock: SharedClock,
}

impl ProgressionLedger {
    pub fn new(db: Database, clock: SharedClock) -> Self {
        Self { db, clock }
    }

    /// Creates the learner row (xp 0, level 1, no streak) if it does not exist yet.
    pub async fn ensure_learner(&self, learner_id: &str) -> EngineResult<LearnerProgress> {
        let mut tx = self.db.begin_write().await?;
        if learner::insert_if_absent(&mut tx, learner_id, self.clock.now()).await? {
            tracing::debug!(learner_id, "learner record created");
        }
        let progress = learner::require(&mut tx, learner_id).await?;
        tx.commit().await?;
        Ok(progress)
    }

    pub async fn award_xp(&self, learner_id: &str, amount: i64) -> EngineResult<XpAward> {
        if amount < 0 {
            return Err(EngineError::Validation(format!(
                "xp amount must not be negative, got {amount}"
            )));
        }

        with_retry("award_xp", move || async move {
            let mut tx = self.db.begin_write().await?;
            let award = credit_xp(&mut tx, learner_id, amount, self.clock.now()).await?;
            tx.commit().await?;
            tracing::debug!(learner_id, amount, new_xp = award.new_xp, "xp awarded");
            Ok(award)
        })
        .await
    }

    /// Records learning activity for today and returns the resulting streak.
    pub async fn update_streak(&self, learner_id: &str) -> EngineResult<StreakStatus> {
        with_retry("update_streak", move || async move {
            let now = self.clock.now();
            let today = self.clock.today();
            let mut tx = self.db.begin_write().await?;
            let current = learner::require(&mut tx, learner_id).await?;

            let state = StreakState {
                current_streak: current.current_streak,
                longest_streak: current.longest_streak,
                last_activity_date: current.last_activity_date,
            };
            let Some(next) = advance_streak(state, today) else {
                return Ok(StreakStatus {
                    current_streak: current.current_streak,
                    longest_streak: current.longest_streak,
                });
            };

            learner::store_streak(
                &mut tx,
                &current,
                next.current_streak,
                next.longest_streak,
                today,
                now,
            )
            .await?;
            tx.commit().await?;

            if next.current_streak == 1 && current.current_streak > 1 {
                tracing::info!(learner_id, previous = current.current_streak, "streak reset");
            }
            Ok(StreakStatus {
                current_streak: next.current_streak,
                longest_streak: next.longest_streak,
            })
        })
        .await
    }

    /// Streak as the learner should see it today. Never writes.
    pub async fn get_streak(&self, learner_id: &str) -> EngineResult<StreakStatus> {
        let mut conn = self.db.pool().acquire().await?;
        let current = learner::require(&mut conn, learner_id).await?;
        Ok(StreakStatus {
            current_streak: displayed_streak(
                current.current_streak,
                current.last_activity_date,
                self.clock.today(),
            ),
            longest_streak: current.longest_streak,
        })
    }

    pub async fn get_overall_progress(&self, learner_id: &str) -> EngineResult<OverallProgress> {
        let mut tx = self.db.begin().await?;
        let current = learner::require(&mut tx, learner_id).await?;
        let badges_earned = badge::count_earned(&mut tx, learner_id).await?;
        tx.commit().await?;

        Ok(OverallProgress {
            xp: current.xp,
            level: level_for_xp(current.xp),
            level_progress: level_progress(current.xp),
            current_streak: displayed_streak(
                current.current_streak,
                current.last_activity_date,
                self.clock.today(),
            ),
            stored_streak: current.current_streak,
            longest_streak: current.longest_streak,
            last_activity_date: current.last_activity_date,
            badges_earned,
            learner_id: current.learner_id,
        })
    }
}
