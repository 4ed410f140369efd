//! Run domain types
//!
//! A run is one execution of a pipeline template. Its state is owned by a
//! single engine driver; everyone else sees cloned snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::history::{RunHistoryEntry, StageRecord};
use crate::domain::stage::PipelineTemplate;

/// Unique identifier of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Uuid);

impl RunId {
    /// Allocates a fresh random run id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The underlying UUID
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// First eight characters, for compact log output
    pub fn short(&self) -> String {
        self.0.to_string().chars().take(8).collect()
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for RunId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Status of a run
///
/// Valid transitions:
/// - Idle -> Running
/// - Running -> Succeeded | Failed
/// - Failed -> Recovering
/// - Recovering -> Running | Failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Idle,
    Running,
    Succeeded,
    Failed,
    Recovering,
}

impl RunStatus {
    /// Returns true if a run in this status owns the engine
    pub fn is_active(&self) -> bool {
        matches!(self, RunStatus::Running | RunStatus::Recovering)
    }

    /// Returns true if the state machine allows moving to `next`
    pub fn can_transition_to(&self, next: RunStatus) -> bool {
        matches!(
            (self, next),
            (RunStatus::Idle, RunStatus::Running)
                | (RunStatus::Running, RunStatus::Succeeded)
                | (RunStatus::Running, RunStatus::Failed)
                | (RunStatus::Failed, RunStatus::Recovering)
                | (RunStatus::Recovering, RunStatus::Running)
                | (RunStatus::Recovering, RunStatus::Failed)
        )
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Idle => write!(f, "Idle"),
            RunStatus::Running => write!(f, "Running"),
            RunStatus::Succeeded => write!(f, "Succeeded"),
            RunStatus::Failed => write!(f, "Failed"),
            RunStatus::Recovering => write!(f, "Recovering"),
        }
    }
}

/// Outcome of a single stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageOutcome {
    Success,
    Failure,
    Skipped,
}

impl fmt::Display for StageOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageOutcome::Success => write!(f, "Success"),
            StageOutcome::Failure => write!(f, "Failure"),
            StageOutcome::Skipped => write!(f, "Skipped"),
        }
    }
}

/// Why a stage failed
///
/// Timeouts are a stage-level detail, not an engine fault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageFailure {
    /// The failure draw came up against the stage
    Drawn,
    /// A caller forced the failure while the stage was executing
    Forced,
    /// The stage exceeded its implicit timeout
    TimedOut { limit_ms: u64 },
    /// The stage handler reported an error
    Handler(String),
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageFailure::Drawn => write!(f, "stage failed"),
            StageFailure::Forced => write!(f, "failure forced by operator"),
            StageFailure::TimedOut { limit_ms } => write!(f, "timed out after {} ms", limit_ms),
            StageFailure::Handler(message) => write!(f, "{}", message),
        }
    }
}

/// Result of one entered stage within a run
#[derive(Debug, Clone, PartialEq)]
pub struct StageResult {
    pub stage_index: usize,
    pub outcome: StageOutcome,
    /// 1 for the first execution, 2 once the recovery retry ran
    pub attempts: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub failure: Option<StageFailure>,
}

impl StageResult {
    /// Wall time spent in the stage, zero while it is still executing
    pub fn duration_ms(&self) -> u64 {
        self.finished_at
            .map(|end| (end - self.started_at).num_milliseconds().max(0) as u64)
            .unwrap_or(0)
    }
}

/// The mutable record of one pipeline execution
///
/// Invariants upheld by the mutators below:
/// - `current_stage` only moves forward; a reset creates a new `RunState`
/// - once started, `stage_outcomes.len() == current_stage + 1`
/// - status changes follow [`RunStatus::can_transition_to`]
#[derive(Debug, Clone)]
pub struct RunState {
    pub run_id: RunId,
    pub template: Arc<PipelineTemplate>,
    pub status: RunStatus,
    /// `None` before the first stage is entered
    pub current_stage: Option<usize>,
    pub stage_outcomes: Vec<StageResult>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Present only while status is Failed
    pub error_detail: Option<String>,
    /// True between a stage failure and the end of its recovery attempt
    pub recovery_pending: bool,
}

impl RunState {
    /// Creates a fresh Idle run
    pub fn idle(run_id: RunId, template: Arc<PipelineTemplate>) -> Self {
        Self {
            run_id,
            template,
            status: RunStatus::Idle,
            current_stage: None,
            stage_outcomes: Vec::new(),
            started_at: None,
            finished_at: None,
            error_detail: None,
            recovery_pending: false,
        }
    }

    /// Returns true once the run reached Succeeded, or Failed with no
    /// recovery left
    pub fn is_terminal(&self) -> bool {
        match self.status {
            RunStatus::Succeeded => true,
            RunStatus::Failed => !self.recovery_pending,
            _ => false,
        }
    }

    /// Name of the stage currently entered, if any
    pub fn current_stage_name(&self) -> Option<&str> {
        self.current_stage
            .and_then(|index| self.template.stage(index))
            .map(|stage| stage.name.as_str())
    }

    /// Idle -> Running
    pub fn start(&mut self, now: DateTime<Utc>) {
        self.transition(RunStatus::Running);
        self.started_at = Some(now);
    }

    /// Enters the next stage; returns its index
    pub fn enter_next_stage(&mut self, now: DateTime<Utc>) -> usize {
        let index = self.current_stage.map(|i| i + 1).unwrap_or(0);
        self.current_stage = Some(index);
        self.stage_outcomes.push(StageResult {
            stage_index: index,
            outcome: StageOutcome::Skipped,
            attempts: 1,
            started_at: now,
            finished_at: None,
            failure: None,
        });
        index
    }

    /// Marks the current stage as succeeded
    pub fn complete_stage(&mut self, now: DateTime<Utc>) {
        if let Some(result) = self.stage_outcomes.last_mut() {
            result.outcome = StageOutcome::Success;
            result.finished_at = Some(now);
            result.failure = None;
        }
    }

    /// Running -> Failed on the current stage
    ///
    /// `recovery_pending` records whether a recovery attempt will follow.
    pub fn fail_stage(&mut self, failure: StageFailure, now: DateTime<Utc>, recovery_pending: bool) {
        self.transition(RunStatus::Failed);
        let detail = self.failure_detail(&failure);
        if let Some(result) = self.stage_outcomes.last_mut() {
            result.outcome = StageOutcome::Failure;
            result.finished_at = Some(now);
            result.failure = Some(failure);
        }
        self.error_detail = Some(detail);
        self.recovery_pending = recovery_pending;
        if !recovery_pending {
            self.finished_at = Some(now);
        }
    }

    /// Failed -> Recovering
    ///
    /// The stage keeps its first `started_at`, so its duration covers both
    /// attempts and the recovery delay between them.
    pub fn begin_recovery(&mut self) {
        self.transition(RunStatus::Recovering);
        self.error_detail = None;
        if let Some(result) = self.stage_outcomes.last_mut() {
            result.attempts += 1;
            result.finished_at = None;
        }
    }

    /// Recovering -> Running, the retried stage counts as succeeded
    pub fn recover_stage(&mut self, now: DateTime<Utc>) {
        self.transition(RunStatus::Running);
        self.error_detail = None;
        self.recovery_pending = false;
        self.complete_stage(now);
    }

    /// Recovering -> Failed, no further retries
    pub fn fail_recovery(&mut self, failure: StageFailure, now: DateTime<Utc>) {
        self.transition(RunStatus::Failed);
        let detail = self.failure_detail(&failure);
        if let Some(result) = self.stage_outcomes.last_mut() {
            result.outcome = StageOutcome::Failure;
            result.finished_at = Some(now);
            result.failure = Some(failure);
        }
        self.error_detail = Some(format!("{} (recovery failed)", detail));
        self.recovery_pending = false;
        self.finished_at = Some(now);
    }

    /// Running -> Succeeded
    pub fn succeed(&mut self, now: DateTime<Utc>) {
        self.transition(RunStatus::Succeeded);
        self.finished_at = Some(now);
    }

    /// Builds the immutable history snapshot of a terminal run
    ///
    /// Stages that were never entered are reported as skipped.
    pub fn to_history_entry(&self) -> Option<RunHistoryEntry> {
        if !self.is_terminal() {
            return None;
        }

        let entered = self.stage_outcomes.iter().map(|result| StageRecord {
            stage_index: result.stage_index,
            outcome: result.outcome,
            duration_ms: result.duration_ms(),
        });
        let skipped = (self.stage_outcomes.len()..self.template.len()).map(|stage_index| StageRecord {
            stage_index,
            outcome: StageOutcome::Skipped,
            duration_ms: 0,
        });

        Some(RunHistoryEntry {
            run_id: self.run_id,
            template_name: self.template.name().to_string(),
            status: self.status,
            started_at: self.started_at?,
            finished_at: self.finished_at?,
            stage_outcomes: entered.chain(skipped).collect(),
            error_detail: self.error_detail.clone(),
        })
    }

    fn failure_detail(&self, failure: &StageFailure) -> String {
        let stage = self.current_stage_name().unwrap_or("unknown");
        match failure {
            StageFailure::TimedOut { .. } => format!("TimedOut: stage '{}' {}", stage, failure),
            _ => format!("stage '{}': {}", stage, failure),
        }
    }

    fn transition(&mut self, next: RunStatus) {
        debug_assert!(
            self.status.can_transition_to(next),
            "invalid run transition {} -> {}",
            self.status,
            next
        );
        self.status = next;
    }
}
