pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod seed;
pub mod services;
pub mod state;

pub use clock::{Clock, FixedClock, SharedClock, SystemClock};
pub use db::Database;
pub use error::{EngineError, EngineResult};
pub use state::ProgressionEngine;
