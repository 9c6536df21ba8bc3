use std::sync::Arc;

use crate::clock::{SharedClock, SystemClock};
use crate::db::Database;
use crate::services::badge::BadgeEvaluator;
use crate::services::progression::ProgressionLedger;
use crate::services::review_scheduler::ReviewScheduler;

/// The engine's services built around one store handle and one clock. Cheap to clone;
/// hand it (or a single service) to whatever layer drives learning events.
#[derive(Clone)]
pub struct ProgressionEngine {
    db: Database,
    clock: SharedClock,
    scheduler: ReviewScheduler,
    ledger: ProgressionLedger,
    badges: BadgeEvaluator,
}

impl ProgressionEngine {
    pub fn new(db: Database, clock: SharedClock) -> Self {
        Self {
            scheduler: ReviewScheduler::new(db.clone(), Arc::clone(&clock)),
            ledger: ProgressionLedger::new(db.clone(), Arc::clone(&clock)),
            badges: BadgeEvaluator::new(db.clone(), Arc::clone(&clock)),
            db,
            clock,
        }
    }

    pub fn with_system_clock(db: Database) -> Self {
        Self::new(db, Arc::new(SystemClock))
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    pub fn scheduler(&self) -> &ReviewScheduler {
        &self.scheduler
    }

    pub fn ledger(&self) -> &ProgressionLedger {
        &self.ledger
    }

    pub fn badges(&self) -> &BadgeEvaluator {
        &self.badges
    }
}
