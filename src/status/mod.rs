//! Status tracking for submitted hub transactions
//!
//! After a gateway call is mined, its effects land on the target chains
//! asynchronously. The status API reports per-payload execution, and a
//! [`StatusTracker`] polls it until the kind's [`CompletionPolicy`] holds or
//! the timeout expires.

mod client;
mod policy;
mod snapshot;
mod tracker;

pub use client::{HttpStatusClient, StatusClient};
pub use policy::CompletionPolicy;
pub use snapshot::{OverallStatus, Regression, StatusSnapshot, WritePayloadStatus};
pub use tracker::{
    StatusTracker, TerminalCallback, TrackOutcome, TrackerExit, TrackerHandle, TrackingOptions,
};
