//! # Jobs Registry
//!
//! Remote jobs are dispatched by action name to a registered [`JobHandler`].
//! Each action runs at most one job at a time; the slot stays busy while its
//! job is in progress and frees up once a terminal status is reported, the
//! handler rejects the job, or the job times out.

use embassy_time::{Duration, Instant};
use heapless::{String, Vec};
use serde::{Deserialize, Serialize};

use crate::error::{JobError, MessageError};
use crate::runtime::JobHandler;

/// Maximum number of registered job actions.
pub const MAX_JOBS: usize = 5;

/// Maximum length of a job action name.
pub const JOB_ACTION_LEN: usize = 32;

/// Maximum length of a job id.
pub const JOB_ID_LEN: usize = 64;

/// Execution status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    InProgress,
    Succeeded,
    Failed,
    Rejected,
}

impl JobStatus {
    /// Status name as used by the jobs service.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::InProgress => "IN_PROGRESS",
            JobStatus::Succeeded => "SUCCEEDED",
            JobStatus::Failed => "FAILED",
            JobStatus::Rejected => "REJECTED",
        }
    }

    /// `true` for statuses that end a job.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::InProgress)
    }
}

/// A job instance handed to a [`JobHandler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Job<'d> {
    pub id: &'d str,
    pub document: JobDocument<'d>,
    /// Seconds since the epoch when the job was queued.
    pub queued_at: u32,
    /// Seconds since the epoch when the notification was sent.
    pub current_timestamp: u32,
}

/// The still-encoded job document. Only the handler knows its shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobDocument<'d> {
    notification: &'d str,
}

impl<'d> JobDocument<'d> {
    /// Wraps the raw notification the document arrived in.
    pub fn new(notification: &'d str) -> Self {
        Self { notification }
    }

    /// Decodes the `jobDocument` object into the handler's own type.
    pub fn decode<D: Deserialize<'d>>(&self) -> Result<D, JobError> {
        serde_json_core::from_str::<Envelope<DocumentOnly<D>>>(self.notification)
            .map(|(envelope, _)| envelope.execution.job_document)
            .map_err(|_| JobError::MalformedNotification)
    }

    /// The whole notification text.
    pub fn notification(&self) -> &'d str {
        self.notification
    }
}

/// A parsed `notify-next` or `$next/get/accepted` message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobNotification<'d> {
    /// The `"action"` field of the job document.
    pub action: &'d str,
    pub job: Job<'d>,
}

#[derive(Deserialize)]
struct Envelope<E> {
    execution: E,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DocumentOnly<D> {
    job_document: D,
}

#[derive(Deserialize)]
struct NextJob<'a> {
    #[serde(borrow)]
    execution: Option<Execution<'a>>,
    #[serde(default)]
    timestamp: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Execution<'a> {
    job_id: &'a str,
    #[serde(default)]
    queued_at: u32,
    #[serde(borrow)]
    job_document: ActionOnly<'a>,
}

#[derive(Deserialize)]
struct ActionOnly<'a> {
    action: &'a str,
}

/// Extracts the next pending job from a jobs service message.
///
/// Returns `Ok(None)` when the message carries no execution, which is how the
/// service says the queue is empty.
pub fn parse_next(payload: &str) -> Result<Option<JobNotification<'_>>, JobError> {
    let (next, _) = serde_json_core::from_str::<NextJob<'_>>(payload)
        .map_err(|_| JobError::MalformedNotification)?;
    let Some(execution) = next.execution else {
        return Ok(None);
    };
    if execution.job_id.is_empty() {
        return Err(JobError::MalformedNotification);
    }
    Ok(Some(JobNotification {
        action: execution.job_document.action,
        job: Job {
            id: execution.job_id,
            document: JobDocument::new(payload),
            queued_at: execution.queued_at,
            current_timestamp: next.timestamp,
        },
    }))
}

/// A status update to send to the jobs service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    #[serde(skip)]
    pub job_id: String<JOB_ID_LEN>,
    pub status: JobStatus,
    /// Sent with `IN_PROGRESS` so the service enforces the same timeout.
    #[serde(rename = "stepTimeoutInMinutes", skip_serializing_if = "Option::is_none")]
    pub step_timeout_minutes: Option<u8>,
}

impl StatusReport {
    /// Writes the `jobs/<id>/update` request body into `out`.
    pub fn render(&self, out: &mut [u8]) -> Result<usize, MessageError> {
        serde_json_core::to_slice(self, out).map_err(|_| MessageError::PayloadTooLong)
    }
}

/// What the client should do after a job was dispatched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Send this status report.
    Report(StatusReport),
    /// The handler rejected the job; nothing is sent.
    Silent,
    /// The job is already running; the notification is a repeat.
    Duplicate,
}

struct ActiveJob {
    id: String<JOB_ID_LEN>,
    accepted_at: Instant,
}

struct JobSlot<'a> {
    action: String<JOB_ACTION_LEN>,
    timeout_minutes: u8,
    handler: &'a dyn JobHandler,
    active: Option<ActiveJob>,
}

impl JobSlot<'_> {
    fn step_timeout(&self) -> Option<u8> {
        (self.timeout_minutes > 0).then_some(self.timeout_minutes)
    }

    fn is_running(&self, job_id: &str) -> bool {
        self.active.as_ref().is_some_and(|a| a.id == job_id)
    }
}

/// Registered job actions.
pub struct JobRegistry<'a> {
    slots: Vec<JobSlot<'a>, MAX_JOBS>,
    limit: usize,
}

impl<'a> Default for JobRegistry<'a> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> JobRegistry<'a> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            limit: MAX_JOBS,
        }
    }

    /// Lowers the number of actions accepted by [`register`](Self::register).
    pub fn set_limit(&mut self, limit: usize) {
        self.limit = limit.min(MAX_JOBS);
    }

    /// Registers a handler for `action`.
    ///
    /// A `timeout_minutes` of zero means the job never expires locally.
    pub fn register(
        &mut self,
        action: &str,
        timeout_minutes: u8,
        handler: &'a dyn JobHandler,
    ) -> Result<(), JobError> {
        if action.is_empty() {
            return Err(JobError::InvalidAction);
        }
        if self.slots.iter().any(|s| s.action == action) {
            return Err(JobError::DuplicateAction);
        }
        if self.slots.len() >= self.limit {
            return Err(JobError::RegistryFull);
        }
        let mut owned = String::new();
        owned
            .push_str(action)
            .map_err(|_| JobError::InvalidAction)?;
        self.slots
            .push(JobSlot {
                action: owned,
                timeout_minutes,
                handler,
                active: None,
            })
            .map_err(|_| JobError::RegistryFull)?;
        debug!("registered job action {} (timeout {} min)", action, timeout_minutes);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of jobs currently in progress.
    pub fn active_count(&self) -> usize {
        self.slots.iter().filter(|s| s.active.is_some()).count()
    }

    pub fn is_active(&self, job_id: &str) -> bool {
        self.slots.iter().any(|s| s.is_running(job_id))
    }

    /// Hands a job to the handler registered for `action`.
    pub fn dispatch(&mut self, action: &str, job: &Job<'_>, now: Instant) -> Result<Dispatch, JobError> {
        let slot = self
            .slots
            .iter_mut()
            .find(|s| s.action == action)
            .ok_or(JobError::UnknownAction)?;
        if slot.is_running(job.id) {
            return Ok(Dispatch::Duplicate);
        }
        if slot.active.is_some() {
            return Err(JobError::Busy);
        }
        let mut id = String::new();
        id.push_str(job.id).map_err(|_| JobError::IdTooLong)?;

        let status = slot.handler.on_job(job);
        info!("job {} ({}): handler returned {}", job.id, action, status.as_str());
        let step_timeout_minutes = match status {
            JobStatus::Rejected => return Ok(Dispatch::Silent),
            JobStatus::InProgress => {
                slot.active = Some(ActiveJob {
                    id: id.clone(),
                    accepted_at: now,
                });
                slot.step_timeout()
            }
            JobStatus::Succeeded | JobStatus::Failed => None,
        };
        Ok(Dispatch::Report(StatusReport {
            job_id: id,
            status,
            step_timeout_minutes,
        }))
    }

    /// Builds the report for a status update of a running job.
    ///
    /// Returns `None` for unknown ids and for `Rejected`, which is never
    /// reported. Nothing changes until [`commit_status`](Self::commit_status).
    pub fn status_report(&self, job_id: &str, status: JobStatus) -> Option<StatusReport> {
        let slot = self.slots.iter().find(|s| s.is_running(job_id))?;
        if status == JobStatus::Rejected {
            return None;
        }
        let mut id = String::new();
        id.push_str(job_id).ok()?;
        Some(StatusReport {
            job_id: id,
            status,
            step_timeout_minutes: match status {
                JobStatus::InProgress => slot.step_timeout(),
                _ => None,
            },
        })
    }

    /// Records a status update. Terminal statuses free the slot.
    ///
    /// Returns `false` if no running job has this id.
    pub fn commit_status(&mut self, job_id: &str, status: JobStatus) -> bool {
        let Some(slot) = self.slots.iter_mut().find(|s| s.is_running(job_id)) else {
            warn!("status update for unknown job {}", job_id);
            return false;
        };
        if status.is_terminal() {
            slot.active = None;
        }
        true
    }

    /// Frees in-progress jobs that outlived their timeout and notifies their
    /// handlers. Returns the number of expired jobs.
    pub fn expire(&mut self, now: Instant) -> usize {
        let mut expired = 0;
        for slot in self.slots.iter_mut() {
            if slot.timeout_minutes == 0 {
                continue;
            }
            let limit = Duration::from_secs(u64::from(slot.timeout_minutes) * 60);
            let timed_out = slot
                .active
                .as_ref()
                .is_some_and(|a| now.saturating_duration_since(a.accepted_at) >= limit);
            if !timed_out {
                continue;
            }
            if let Some(active) = slot.active.take() {
                warn!("job {} timed out after {} min", active.id.as_str(), slot.timeout_minutes);
                slot.handler.on_timeout(&active.id);
                expired += 1;
            }
        }
        expired
    }

    /// Drops every in-progress job without notifying handlers.
    pub fn reset(&mut self) {
        for slot in self.slots.iter_mut() {
            slot.active = None;
        }
    }
}
