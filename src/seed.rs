use serde_json::json;

use crate::db::operations::badge::{self, BadgeDefinition};
use crate::db::Database;
use crate::error::EngineResult;
use crate::services::badge::BadgeCriteriaType;

struct DefaultBadge {
    id: &'static str,
    name: &'static str,
    description: &'static str,
    criteria: BadgeCriteriaType,
    target: i64,
    xp_value: i64,
}

const DEFAULT_BADGES: &[DefaultBadge] = &[
    DefaultBadge {
        id: "xp-100",
        name: "First Steps",
        description: "Earn your first 100 XP",
        criteria: BadgeCriteriaType::XpThreshold,
        target: 100,
        xp_value: 10,
    },
    DefaultBadge {
        id: "xp-500",
        name: "Getting Serious",
        description: "Earn 500 XP",
        criteria: BadgeCriteriaType::XpThreshold,
        target: 500,
        xp_value: 25,
    },
    DefaultBadge {
        id: "xp-5000",
        name: "Scholar",
        description: "Earn 5000 XP",
        criteria: BadgeCriteriaType::XpThreshold,
        target: 5000,
        xp_value: 100,
    },
    DefaultBadge {
        id: "streak-3",
        name: "On a Roll",
        description: "Study three days in a row",
        criteria: BadgeCriteriaType::Streak,
        target: 3,
        xp_value: 15,
    },
    DefaultBadge {
        id: "streak-7",
        name: "Week Warrior",
        description: "Study seven days in a row",
        criteria: BadgeCriteriaType::Streak,
        target: 7,
        xp_value: 50,
    },
    DefaultBadge {
        id: "streak-30",
        name: "Unstoppable",
        description: "Study thirty days in a row",
        criteria: BadgeCriteriaType::Streak,
        target: 30,
        xp_value: 200,
    },
    DefaultBadge {
        id: "level-5",
        name: "Rising Star",
        description: "Reach level 5",
        criteria: BadgeCriteriaType::Level,
        target: 5,
        xp_value: 50,
    },
    DefaultBadge {
        id: "level-10",
        name: "Veteran",
        description: "Reach level 10",
        criteria: BadgeCriteriaType::Level,
        target: 10,
        xp_value: 150,
    },
];

fn criteria_payload(criteria: BadgeCriteriaType, target: i64) -> String {
    let payload = match criteria {
        BadgeCriteriaType::XpThreshold => json!({ "threshold": target }),
        BadgeCriteriaType::Streak => json!({ "days": target }),
        BadgeCriteriaType::Level => json!({ "level": target }),
    };
    payload.to_string()
}

pub fn default_badge_definitions() -> Vec<BadgeDefinition> {
    DEFAULT_BADGES
        .iter()
        .map(|b| BadgeDefinition {
            id: b.id.to_string(),
            name: b.name.to_string(),
            description: b.description.to_string(),
            criteria_type: b.criteria.as_str().to_string(),
            criteria_value: criteria_payload(b.criteria, b.target),
            xp_value: b.xp_value,
            is_active: true,
        })
        .collect()
}

/// Inserts the built-in badge catalogue. Existing ids are left as they are, so edits
/// made to seeded badges survive a restart. Returns how many badges were inserted.
pub async fn seed_default_badges(db: &Database) -> EngineResult<usize> {
    let mut tx = db.begin_write().await?;
    let mut inserted = 0;
    for definition in default_badge_definitions() {
        if badge::insert_definition_if_absent(&mut tx, &definition).await? {
            inserted += 1;
        }
    }
    tx.commit().await?;

    if inserted > 0 {
        tracing::info!(inserted, "seeded default badges");
    } else {
        tracing::debug!("default badges already present");
    }
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::badge::BadgeCriteria;

    #[test]
    fn default_catalogue_parses() {
        for definition in default_badge_definitions() {
            assert_ne!(
                BadgeCriteria::from_definition(&definition),
                BadgeCriteria::Unrecognized,
                "{}",
                definition.id
            );
        }
    }
}
