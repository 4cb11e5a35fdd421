//! Application callback traits.
//!
//! The client never owns application logic. It calls back into it through
//! three small capability traits, each object-safe so registries can hold
//! `&dyn` references without generic parameters leaking into the client type.
//!
//! Callbacks run synchronously on the polling task. They must not block and
//! cannot call back into the client; anything that needs the client (such as
//! reporting a job result later) is done by the application task afterwards.
//!
//! Every trait has a blanket implementation for matching closures:
//!
//! ```ignore
//! let on_led = |index: usize, key: &str, value: &ShadowValue| {
//!     info!("shadow element {} ({}) changed", index, key);
//! };
//! client.register_shadow(None, &elements, &on_led)?;
//! ```

use crate::event::Event;
use crate::jobs::{Job, JobStatus};
use crate::shadow::ShadowValue;

/// Receives desired-state changes pushed by the cloud for one shadow table.
pub trait ShadowHandler {
    /// Called once per changed element, after the new value is stored.
    ///
    /// `index` is the element's position in the registered table.
    fn on_delta(&self, index: usize, key: &str, value: &ShadowValue);
}

/// Executes remote jobs for one registered action.
pub trait JobHandler {
    /// Starts a job and returns its initial status.
    ///
    /// - `InProgress`: the application reports the outcome later.
    /// - `Succeeded` / `Failed`: reported to the cloud right away.
    /// - `Rejected`: nothing is reported and the slot is freed.
    fn on_job(&self, job: &Job<'_>) -> JobStatus;

    /// Called when an in-progress job outlives its registered timeout.
    fn on_timeout(&self, _job_id: &str) {}
}

/// Receives connectivity and delivery events.
pub trait EventHandler {
    fn on_event(&self, event: Event);
}

impl<F> ShadowHandler for F
where
    F: Fn(usize, &str, &ShadowValue),
{
    fn on_delta(&self, index: usize, key: &str, value: &ShadowValue) {
        self(index, key, value)
    }
}

impl<F> JobHandler for F
where
    F: Fn(&Job<'_>) -> JobStatus,
{
    fn on_job(&self, job: &Job<'_>) -> JobStatus {
        self(job)
    }
}

impl<F> EventHandler for F
where
    F: Fn(Event),
{
    fn on_event(&self, event: Event) {
        self(event)
    }
}

/// A handler that ignores everything and rejects every job.
///
/// Useful as a placeholder or for testing.
pub struct NoopHandler;

impl ShadowHandler for NoopHandler {
    fn on_delta(&self, _index: usize, _key: &str, _value: &ShadowValue) {}
}

impl JobHandler for NoopHandler {
    fn on_job(&self, _job: &Job<'_>) -> JobStatus {
        JobStatus::Rejected
    }
}

impl EventHandler for NoopHandler {
    fn on_event(&self, _event: Event) {}
}
