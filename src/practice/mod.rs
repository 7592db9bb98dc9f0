//! A practice session end to end: the controller around the scorer, the
//! ledger it reports to, and the pose feed that drives it.

pub mod commands;
pub mod controller;
pub mod feed;
pub mod ledger;

pub use controller::{PracticeController, PracticeSnapshot, DEFAULT_FEEDBACK};
pub use feed::{run_pose_feed, FeedFrame, FeedOptions, FeedStats};
pub use ledger::SessionLedger;
