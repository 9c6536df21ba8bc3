use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqliteConnection;

use crate::clock::SharedClock;
use crate::db::operations::badge::{self, BadgeDefinition, EarnedBadge};
use crate::db::operations::learner::{self, LearnerProgress};
use crate::db::Database;
use crate::error::{with_retry, EngineResult};
use crate::services::progression::{credit_xp, displayed_streak};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BadgeCriteriaType {
    XpThreshold,
    Streak,
    Level,
}

impl BadgeCriteriaType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "xp_threshold" => Some(Self::XpThreshold),
            "streak" => Some(Self::Streak),
            "level" => Some(Self::Level),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::XpThreshold => "xp_threshold",
            Self::Streak => "streak",
            Self::Level => "level",
        }
    }

    fn payload_key(self) -> &'static str {
        match self {
            Self::XpThreshold => "threshold",
            Self::Streak => "days",
            Self::Level => "level",
        }
    }
}

/// Parsed badge condition. Anything that cannot be parsed is `Unrecognized` and never
/// satisfied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BadgeCriteria {
    XpThreshold(i64),
    Streak(i64),
    Level(i64),
    Unrecognized,
}

impl BadgeCriteria {
    pub fn parse(criteria_type: &str, criteria_value: &str) -> Self {
        let Some(kind) = BadgeCriteriaType::parse(criteria_type) else {
            return Self::Unrecognized;
        };
        let target = serde_json::from_str::<serde_json::Value>(criteria_value)
            .ok()
            .and_then(|v| v.get(kind.payload_key()).and_then(|t| t.as_i64()));

        match (kind, target) {
            (BadgeCriteriaType::XpThreshold, Some(t)) => Self::XpThreshold(t),
            (BadgeCriteriaType::Streak, Some(t)) => Self::Streak(t),
            (BadgeCriteriaType::Level, Some(t)) => Self::Level(t),
            (_, None) => Self::Unrecognized,
        }
    }

    pub fn from_definition(definition: &BadgeDefinition) -> Self {
        Self::parse(&definition.criteria_type, &definition.criteria_value)
    }

    pub fn is_satisfied(&self, learner: &LearnerProgress) -> bool {
        match self {
            Self::XpThreshold(threshold) => learner.xp >= *threshold,
            Self::Streak(days) => learner.current_streak >= *days,
            Self::Level(level) => learner.level >= *level,
            Self::Unrecognized => false,
        }
    }

    pub fn target(&self) -> Option<i64> {
        match self {
            Self::XpThreshold(t) | Self::Streak(t) | Self::Level(t) => Some(*t),
            Self::Unrecognized => None,
        }
    }

    fn current_value(&self, learner: &LearnerProgress, streak: i64) -> i64 {
        match self {
            Self::XpThreshold(_) => learner.xp,
            Self::Streak(_) => streak,
            Self::Level(_) => learner.level,
            Self::Unrecognized => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AwardedBadge {
    pub award_id: String,
    pub badge_id: String,
    pub name: String,
    pub description: String,
    pub xp_value: i64,
    pub earned_at: DateTime<Utc>,
}

/// Result of one badge evaluation. `new_xp` and `new_level` are the learner's totals
/// after every bonus in `badges` was credited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BadgeAwardOutcome {
    pub badges: Vec<AwardedBadge>,
    pub new_xp: i64,
    pub new_level: i64,
    pub leveled_up: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BadgeProgress {
    pub badge_id: String,
    pub current_value: i64,
    pub target_value: i64,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BadgeStatus {
    pub id: String,
    pub name: String,
    pub description: String,
    pub criteria_type: String,
    pub xp_value: i64,
    pub unlocked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unlocked_at: Option<DateTime<Utc>>,
    pub progress: i64,
}

fn percentage(current: i64, target: i64) -> f64 {
    if target <= 0 {
        return 100.0;
    }
    (current as f64 / target as f64 * 100.0).clamp(0.0, 100.0)
}

#[derive(Clone)]
pub struct BadgeEvaluator {
    db: Database,
    clock: SharedClock,
}

impl BadgeEvaluator {
    pub fn new(db: Database, clock: SharedClock) -> Self {
        Self { db, clock }
    }

    /// Grants every active badge the learner now qualifies for and has not earned,
    /// crediting each badge's XP bonus. XP from one grant can qualify the learner for
    /// another; those are granted in the same call. Nothing is written when nothing is
    /// earned.
    pub async fn check_and_award_badges(&self, learner_id: &str) -> EngineResult<BadgeAwardOutcome> {
        with_retry("check_and_award_badges", move || async move {
            let now = self.clock.now();
            let mut tx = self.db.begin_write().await?;
            let outcome = grant_qualifying_badges(&mut tx, learner_id, now).await?;
            if outcome.badges.is_empty() {
                return Ok(outcome);
            }
            tx.commit().await?;

            for badge in &outcome.badges {
                tracing::info!(
                    learner_id,
                    badge_id = %badge.badge_id,
                    xp_value = badge.xp_value,
                    "badge awarded"
                );
            }
            Ok(outcome)
        })
        .await
    }

    pub async fn get_learner_badges(&self, learner_id: &str) -> EngineResult<Vec<EarnedBadge>> {
        let mut conn = self.db.pool().acquire().await?;
        badge::list_earned(&mut conn, learner_id).await
    }

    pub async fn get_badge_progress(
        &self,
        learner_id: &str,
        badge_id: &str,
    ) -> EngineResult<Option<BadgeProgress>> {
        let mut tx = self.db.begin().await?;
        let Some(definition) = badge::find_definition(&mut tx, badge_id).await? else {
            return Ok(None);
        };
        let current = learner::require(&mut tx, learner_id).await?;
        tx.commit().await?;

        let criteria = BadgeCriteria::from_definition(&definition);
        let streak = self.visible_streak(&current);
        let current_value = criteria.current_value(&current, streak);
        let target_value = criteria.target().unwrap_or(0);

        Ok(Some(BadgeProgress {
            badge_id: definition.id,
            current_value,
            target_value,
            percentage: if criteria == BadgeCriteria::Unrecognized {
                0.0
            } else {
                percentage(current_value, target_value)
            },
        }))
    }

    pub async fn get_all_badges_with_status(&self, learner_id: &str) -> EngineResult<Vec<BadgeStatus>> {
        let mut tx = self.db.begin().await?;
        let current = learner::require(&mut tx, learner_id).await?;
        let definitions = badge::list_active(&mut tx).await?;
        let earned = badge::earned_map(&mut tx, learner_id).await?;
        tx.commit().await?;

        let streak = self.visible_streak(&current);
        Ok(definitions
            .into_iter()
            .map(|definition| {
                let unlocked_at = earned.get(&definition.id).copied();
                let progress = if unlocked_at.is_some() {
                    100
                } else {
                    let criteria = BadgeCriteria::from_definition(&definition);
                    match criteria.target() {
                        Some(target) => {
                            percentage(criteria.current_value(&current, streak), target).round()
                                as i64
                        }
                        None => 0,
                    }
                };
                BadgeStatus {
                    id: definition.id,
                    name: definition.name,
                    description: definition.description,
                    criteria_type: definition.criteria_type,
                    xp_value: definition.xp_value,
                    unlocked: unlocked_at.is_some(),
                    unlocked_at,
                    progress,
                }
            })
            .collect())
    }

    fn visible_streak(&self, learner: &LearnerProgress) -> i64 {
        displayed_streak(
            learner.current_streak,
            learner.last_activity_date,
            self.clock.today(),
        )
    }
}

/// Evaluates unearned badges against the learner until no further badge qualifies.
async fn grant_qualifying_badges(
    conn: &mut SqliteConnection,
    learner_id: &str,
    now: DateTime<Utc>,
) -> EngineResult<BadgeAwardOutcome> {
    let mut current = learner::require(conn, learner_id).await?;
    let starting_level = current.level;
    let mut pending = badge::list_active_unearned(conn, learner_id).await?;
    let mut awarded = Vec::new();

    loop {
        let (qualifying, rest): (Vec<_>, Vec<_>) = pending
            .into_iter()
            .partition(|definition| BadgeCriteria::from_definition(definition).is_satisfied(&current));
        pending = rest;
        if qualifying.is_empty() {
            break;
        }

        for definition in qualifying {
            let Some(award_id) = badge::insert_award(conn, learner_id, &definition.id, now).await?
            else {
                continue;
            };
            if definition.xp_value > 0 {
                credit_xp(conn, learner_id, definition.xp_value, now).await?;
            }
            awarded.push(AwardedBadge {
                award_id,
                badge_id: definition.id,
                name: definition.name,
                description: definition.description,
                xp_value: definition.xp_value,
                earned_at: now,
            });
        }

        current = learner::require(conn, learner_id).await?;
    }

    Ok(BadgeAwardOutcome {
        badges: awarded,
        new_xp: current.xp,
        new_level: current.level,
        leveled_up: current.level > starting_level,
    })
}
