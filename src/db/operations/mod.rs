pub mod badge;
pub mod content;
pub mod learner;
pub mod mastery;
