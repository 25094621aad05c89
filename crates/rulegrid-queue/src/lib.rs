//! Tracking of remote group-expansion jobs.
//!
//! A [`JobTracker`] is a small state machine (`PENDING -> PROCESSING -> DONE | ERROR`)
//! fed by an injectable [`rulegrid_core::JobStatusSource`] and [`Clock`]. A
//! [`JobSlot`] holds the single job a rule-area scope may have outstanding.

pub mod clock;
pub mod slot;
pub mod tracker;

pub use clock::{Clock, ManualClock, SystemClock};
pub use slot::JobSlot;
pub use tracker::{
    ExpansionJob, JobState, JobTracker, PollOutcome, GENERIC_FAILURE_MESSAGE,
    UNKNOWN_STATUS_MESSAGE,
};

pub use rulegrid_core::{JobStatusReport, JobStatusSource};
