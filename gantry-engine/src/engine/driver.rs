//! The single-writer driver task
//!
//! One driver owns the [`RunState`] of an engine. It executes stages inline
//! and keeps serving control commands while a stage, a timeout or a
//! recovery delay is pending, so concurrent callers are answered at the
//! driver's next decision point and never touch the state directly.

use gantry_core::domain::commit::Commit;
use gantry_core::domain::event::{Event, EventKind};
use gantry_core::domain::history::RunHistoryEntry;
use gantry_core::domain::run::{RunId, RunState, RunStatus, StageFailure, StageOutcome};
use gantry_core::domain::stage::{PipelineTemplate, StageDefinition};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use super::command::Command;
use crate::bias::SuccessBias;
use crate::bus::EventBus;
use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::diagnostics::{Diagnostic, DiagnosticChannel, DiagnosticSource};
use crate::error::{EngineError, Result};
use crate::executor::{StageContext, StageExecutor};
use crate::history::HistoryStore;
use crate::random::RandomSource;
use crate::recovery::{RECOVERY_ATTEMPT, RecoveryPolicy};

/// What currently owns the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Activity {
    Idle,
    FullRun,
    SingleStep,
}

/// How a pending wait ended
enum Waited<T> {
    Done(T),
    Forced,
}

/// How the stage work itself ended, before the failure draw
enum StageRun {
    Finished(std::result::Result<(), String>),
    TimedOut,
}

/// Collaborators a driver is built from
pub(crate) struct DriverParts {
    pub(crate) template: Arc<PipelineTemplate>,
    pub(crate) config: EngineConfig,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) random: Arc<dyn RandomSource>,
    pub(crate) executor: Arc<dyn StageExecutor>,
    pub(crate) store: Arc<dyn HistoryStore>,
    pub(crate) bus: EventBus,
    pub(crate) diagnostics: DiagnosticChannel,
    pub(crate) bias: SuccessBias,
}

pub(crate) struct Driver {
    template: Arc<PipelineTemplate>,
    config: EngineConfig,
    recovery: RecoveryPolicy,
    clock: Arc<dyn Clock>,
    random: Arc<dyn RandomSource>,
    executor: Arc<dyn StageExecutor>,
    store: Arc<dyn HistoryStore>,
    bus: EventBus,
    diagnostics: DiagnosticChannel,
    bias: SuccessBias,
    state: RunState,
    state_tx: watch::Sender<RunState>,
    commands: mpsc::Receiver<Command>,
    activity: Activity,
    /// Whether the current terminal state has reached the history store
    recorded: bool,
    shutdown: Option<oneshot::Sender<()>>,
}

impl Driver {
    pub(crate) fn new(
        parts: DriverParts,
        state_tx: watch::Sender<RunState>,
        commands: mpsc::Receiver<Command>,
    ) -> Self {
        let state = state_tx.borrow().clone();
        Self {
            recovery: RecoveryPolicy::from_config(&parts.config),
            template: parts.template,
            config: parts.config,
            clock: parts.clock,
            random: parts.random,
            executor: parts.executor,
            store: parts.store,
            bus: parts.bus,
            diagnostics: parts.diagnostics,
            bias: parts.bias,
            state,
            state_tx,
            commands,
            activity: Activity::Idle,
            recorded: false,
            shutdown: None,
        }
    }

    /// Serves commands until shutdown or until every handle is dropped
    pub(crate) async fn run(mut self) {
        info!(
            "Pipeline engine started for template '{}' ({} stages)",
            self.template.name(),
            self.template.len()
        );

        while let Some(command) = self.commands.recv().await {
            match command {
                Command::Trigger { cause, reply } => match self.start_run(cause.as_ref()) {
                    Ok(run_id) => {
                        let _ = reply.send(Ok(run_id));
                        self.drive_run().await;
                    }
                    Err(e) => {
                        let _ = reply.send(Err(e));
                    }
                },
                Command::RunSingleStep { stage, reply } => match self.check_single_step(&stage) {
                    Ok(index) => {
                        let outcome = self.single_step(index).await;
                        let _ = reply.send(Ok(outcome));
                    }
                    Err(e) => {
                        let _ = reply.send(Err(e));
                    }
                },
                Command::Reset { reply } => {
                    let result = self.reset().await;
                    let _ = reply.send(result);
                }
                Command::ForceError { reply } => {
                    let _ = reply.send(Err(EngineError::NotRunning));
                }
                Command::Shutdown { reply } => {
                    self.shutdown = Some(reply);
                }
            }

            if let Some(reply) = self.shutdown.take() {
                info!("Pipeline engine for '{}' shutting down", self.template.name());
                let _ = reply.send(());
                return;
            }
        }

        debug!("All engine handles dropped, driver for '{}' exiting", self.template.name());
    }

    fn start_run(&mut self, cause: Option<&Commit>) -> Result<RunId> {
        // An Idle run keeps the id handed out by reset
        if self.state.is_terminal() {
            self.state = RunState::idle(RunId::new(), self.template.clone());
        } else if self.state.status != RunStatus::Idle {
            return Err(EngineError::AlreadyRunning);
        }

        let now = self.clock.now();
        self.state.start(now);
        self.recorded = false;
        self.activity = Activity::FullRun;
        self.publish_state();

        let message = match cause {
            Some(commit) => format!(
                "Pipeline '{}' started for commit {} on {}: {}",
                self.template.name(),
                commit.short_hash(),
                commit.branch,
                commit.message
            ),
            None => format!("Pipeline '{}' started", self.template.name()),
        };
        info!("Run {}: {}", self.state.run_id.short(), message);
        self.emit(Event::run(EventKind::Started, self.state.run_id, now, message));

        Ok(self.state.run_id)
    }

    async fn drive_run(&mut self) {
        loop {
            let index = self.state.current_stage.map(|i| i + 1).unwrap_or(0);
            let Some(stage) = self.template.stage(index).cloned() else {
                break;
            };

            let now = self.clock.now();
            self.state.enter_next_stage(now);
            self.publish_state();
            self.emit_stage(EventKind::StageStarted, index, format!("Stage '{}' started", stage.name));

            match self.execute_stage(index, &stage, 1).await {
                Ok(()) => {
                    self.state.complete_stage(self.clock.now());
                    self.publish_state();
                    self.emit_stage(EventKind::StageSucceeded, index, success_message(&stage));
                }
                Err(failure) => {
                    if !self.handle_stage_failure(index, &stage, failure).await {
                        return;
                    }
                }
            }
        }

        let now = self.clock.now();
        self.state.succeed(now);
        let duration_ms = self
            .state
            .started_at
            .map(|start| (now - start).num_milliseconds().max(0))
            .unwrap_or(0);
        self.finish().await;
        self.emit(Event::run(
            EventKind::Completed,
            self.state.run_id,
            now,
            format!("Pipeline '{}' completed in {} ms", self.template.name(), duration_ms),
        ));
    }

    /// Failure path of a full-run stage; returns true if the run continues
    async fn handle_stage_failure(
        &mut self,
        index: usize,
        stage: &StageDefinition,
        failure: StageFailure,
    ) -> bool {
        let now = self.clock.now();
        let retry_after = self.recovery.retry_after(1);
        let stage_message = failure_message(stage, &failure);
        warn!("Run {}: {}", self.state.run_id.short(), stage_message);

        self.state.fail_stage(failure, now, retry_after.is_some());

        let Some(delay) = retry_after else {
            let detail = self.state.error_detail.clone().unwrap_or_default();
            self.finish().await;
            self.emit_stage(EventKind::StageFailed, index, stage_message);
            self.emit(Event::run(
                EventKind::Failed,
                self.state.run_id,
                now,
                format!("Pipeline failed: {}", detail),
            ));
            return false;
        };

        self.publish_state();
        self.emit_stage(EventKind::StageFailed, index, stage_message);
        self.emit(Event::run(
            EventKind::Failed,
            self.state.run_id,
            now,
            format!(
                "Pipeline failed at stage '{}'; recovery scheduled in {} ms",
                stage.name,
                delay.as_millis()
            ),
        ));

        self.attempt_recovery(index, stage, delay).await
    }

    async fn attempt_recovery(
        &mut self,
        index: usize,
        stage: &StageDefinition,
        delay: std::time::Duration,
    ) -> bool {
        let clock = self.clock.clone();
        let _ = self.serve_while(clock.sleep(delay)).await;

        self.state.begin_recovery();
        self.publish_state();
        self.emit_stage(
            EventKind::RecoveryAttempted,
            index,
            format!("Retrying stage '{}' (attempt {})", stage.name, RECOVERY_ATTEMPT),
        );

        match self.execute_stage(index, stage, RECOVERY_ATTEMPT).await {
            Ok(()) => {
                self.state.recover_stage(self.clock.now());
                self.publish_state();
                info!("Run {}: stage '{}' recovered", self.state.run_id.short(), stage.name);
                self.emit_stage(
                    EventKind::RecoverySucceeded,
                    index,
                    format!("Stage '{}' recovered, resuming pipeline", stage.name),
                );
                true
            }
            Err(failure) => {
                let now = self.clock.now();
                let message = format!(
                    "Recovery of stage '{}' failed: {}; pipeline halted",
                    stage.name, failure
                );
                warn!("Run {}: {}", self.state.run_id.short(), message);
                self.state.fail_recovery(failure, now);
                self.finish().await;
                self.emit_stage(EventKind::RecoveryFailed, index, message);
                false
            }
        }
    }

    fn check_single_step(&self, name: &str) -> Result<usize> {
        let (index, _) = self
            .template
            .find(name)
            .ok_or_else(|| EngineError::UnknownStage(name.to_string()))?;

        if self.state.status != RunStatus::Idle {
            return Err(EngineError::InvalidState(format!(
                "run {} is {}; reset before running a single stage",
                self.state.run_id.short(),
                self.state.status
            )));
        }

        Ok(index)
    }

    /// Runs one stage outside the template order
    ///
    /// The run state stays Idle. No recovery follows a failure and neither
    /// the bias nor the history is updated.
    async fn single_step(&mut self, index: usize) -> StageOutcome {
        let Some(stage) = self.template.stage(index).cloned() else {
            return StageOutcome::Skipped;
        };

        self.activity = Activity::SingleStep;
        info!("Running single stage '{}'", stage.name);
        self.emit_stage(
            EventKind::StageStarted,
            index,
            format!("Stage '{}' started (single step)", stage.name),
        );

        let outcome = match self.execute_stage(index, &stage, 1).await {
            Ok(()) => {
                self.emit_stage(EventKind::StageSucceeded, index, success_message(&stage));
                StageOutcome::Success
            }
            Err(failure) => {
                self.emit_stage(EventKind::StageFailed, index, failure_message(&stage, &failure));
                StageOutcome::Failure
            }
        };

        self.activity = Activity::Idle;
        outcome
    }

    async fn reset(&mut self) -> Result<RunId> {
        if self.state.status != RunStatus::Idle && !self.state.is_terminal() {
            return Err(EngineError::InvalidState(format!(
                "run {} is {}",
                self.state.run_id.short(),
                self.state.status
            )));
        }

        if !self.recorded {
            if let Some(entry) = self.state.to_history_entry() {
                self.record_history(entry).await;
            }
        }

        let previous = self.state.run_id;
        self.state = RunState::idle(RunId::new(), self.template.clone());
        self.recorded = false;
        self.publish_state();

        info!("Run {} reset, next run is {}", previous.short(), self.state.run_id.short());
        self.emit(Event::run(
            EventKind::Reset,
            self.state.run_id,
            self.clock.now(),
            "Pipeline reset",
        ));

        Ok(self.state.run_id)
    }

    /// Executes the stage work, races it against the timeout and a forced
    /// failure, then draws the failure decision
    async fn execute_stage(
        &mut self,
        index: usize,
        stage: &StageDefinition,
        attempt: u32,
    ) -> std::result::Result<(), StageFailure> {
        let ctx = StageContext {
            run_id: self.state.run_id,
            stage_index: index,
            attempt,
        };
        let limit = self.config.stage_timeout(stage.nominal_duration());
        let executor = self.executor.clone();
        let clock = self.clock.clone();

        let work = async {
            tokio::select! {
                biased;
                result = executor.execute(stage, &ctx) => StageRun::Finished(result),
                _ = clock.sleep(limit) => StageRun::TimedOut,
            }
        };

        match self.serve_while(work).await {
            Waited::Forced => Err(StageFailure::Forced),
            Waited::Done(StageRun::TimedOut) => Err(StageFailure::TimedOut {
                limit_ms: limit.as_millis() as u64,
            }),
            Waited::Done(StageRun::Finished(Err(message))) => Err(StageFailure::Handler(message)),
            Waited::Done(StageRun::Finished(Ok(()))) => {
                let probability = self.bias.effective(stage.base_failure_probability);
                let draw = self.random.next_unit();
                debug!(
                    "Stage '{}' attempt {}: draw {:.3} against p={:.3}",
                    stage.name, attempt, draw, probability
                );
                if draw < probability {
                    Err(StageFailure::Drawn)
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Awaits `fut` while answering control commands
    ///
    /// Commands are polled first, so a command queued before the future
    /// completes is applied before its result is acted on.
    async fn serve_while<F: Future>(&mut self, fut: F) -> Waited<F::Output> {
        tokio::pin!(fut);
        loop {
            tokio::select! {
                biased;
                Some(command) = self.commands.recv() => {
                    if self.handle_busy(command) {
                        return Waited::Forced;
                    }
                }
                output = &mut fut => return Waited::Done(output),
            }
        }
    }

    /// Answers a command that arrived while the driver is busy; returns
    /// true if the current stage must fail immediately
    fn handle_busy(&mut self, command: Command) -> bool {
        match command {
            Command::Trigger { reply, .. } => {
                let _ = reply.send(Err(EngineError::AlreadyRunning));
            }
            Command::RunSingleStep { reply, .. } => {
                let _ = reply.send(Err(EngineError::PipelineBusy));
            }
            Command::Reset { reply } => {
                let what = match self.activity {
                    Activity::SingleStep => "a single stage is executing".to_string(),
                    _ => format!("run {} is {}", self.state.run_id.short(), self.state.status),
                };
                let _ = reply.send(Err(EngineError::InvalidState(what)));
            }
            Command::ForceError { reply } => {
                if self.activity == Activity::FullRun && self.state.status == RunStatus::Running {
                    info!(
                        "Run {}: failure forced on stage '{}'",
                        self.state.run_id.short(),
                        self.state.current_stage_name().unwrap_or("unknown")
                    );
                    let _ = reply.send(Ok(()));
                    return true;
                }
                let _ = reply.send(Err(EngineError::NotRunning));
            }
            Command::Shutdown { reply } => {
                debug!("Shutdown requested while busy, deferring");
                self.shutdown = Some(reply);
            }
        }
        false
    }

    /// Terminal bookkeeping: bias, history hand-off, then the terminal
    /// state becomes visible to handles
    async fn finish(&mut self) {
        self.bias.record(self.state.status == RunStatus::Succeeded);
        debug!("Success bias now {:.3}", self.bias.value());

        if let Some(entry) = self.state.to_history_entry() {
            self.record_history(entry).await;
        }
        self.recorded = true;
        self.activity = Activity::Idle;
        self.publish_state();

        info!(
            "Run {} finished with status {}",
            self.state.run_id.short(),
            self.state.status
        );
    }

    async fn record_history(&self, entry: RunHistoryEntry) {
        let run_id = entry.run_id;
        if let Err(e) = self.store.record(entry).await {
            self.diagnostics.report(Diagnostic {
                source: DiagnosticSource::Storage,
                run_id: Some(run_id),
                timestamp: self.clock.now(),
                message: format!("failed to record run history: {}", e),
            });
        }
    }

    fn publish_state(&self) {
        self.state_tx.send_replace(self.state.clone());
    }

    fn emit_stage(&self, kind: EventKind, index: usize, message: String) {
        self.emit(Event::stage(kind, self.state.run_id, index, self.clock.now(), message));
    }

    fn emit(&self, event: Event) {
        self.bus.publish(&event);
    }
}

fn success_message(stage: &StageDefinition) -> String {
    match &stage.success_detail {
        Some(detail) => format!("Stage '{}' succeeded: {}", stage.name, detail),
        None => format!("Stage '{}' succeeded", stage.name),
    }
}

fn failure_message(stage: &StageDefinition, failure: &StageFailure) -> String {
    match (failure, &stage.failure_detail) {
        (StageFailure::Drawn, Some(detail)) => format!("Stage '{}' failed: {}", stage.name, detail),
        (StageFailure::Drawn, None) => format!("Stage '{}' failed", stage.name),
        _ => format!("Stage '{}' failed: {}", stage.name, failure),
    }
}
