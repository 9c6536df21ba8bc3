pub mod badge;
pub mod progression;
pub mod review_scheduler;
