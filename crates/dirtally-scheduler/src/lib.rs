//! Lane-based job dispatch.
//!
//! A [`JobDispatcher`] owns a fixed set of lanes. Each lane is an unbounded FIFO
//! queue served by exactly one worker thread, so jobs on one lane run strictly
//! in submission order and never overlap. Jobs on different lanes run in
//! parallel with no ordering between them.
//!
//! The lane set is laid out by [`LaneLayout`]: one lane for posted directory
//! builds, one for event classification, and `N` sharded lanes picked by
//! hashing a path. Hashing gives per-path ordering: every job submitted for
//! the same path lands on the same lane.

mod dispatcher;
mod layout;

pub use dispatcher::{
    DispatcherConfig, JobDispatcher, JobError, JobResult, LaneStats, SchedulerError,
};
pub use layout::LaneLayout;
