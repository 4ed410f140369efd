//! Pipeline engine
//!
//! [`PipelineEngine`] is a cheap, cloneable handle to one engine instance.
//! Every control operation is queued as a command to the instance's driver
//! task, which is the only owner of the run state. Independent templates run
//! on independent engines and share nothing.

mod command;
mod driver;

use anyhow::Context;
use gantry_core::domain::commit::Commit;
use gantry_core::domain::event::Event;
use gantry_core::domain::run::{RunId, RunState, StageOutcome};
use gantry_core::domain::stage::PipelineTemplate;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::debug;

use self::command::{Command, Reply};
use self::driver::{Driver, DriverParts};
use crate::bias::SuccessBias;
use crate::bus::{EventBus, EventHandler, Subscription};
use crate::clock::{Clock, TokioClock};
use crate::commit::{BranchPolicy, CommitDecision};
use crate::config::EngineConfig;
use crate::diagnostics::{Diagnostic, DiagnosticChannel};
use crate::error::{EngineError, Result};
use crate::executor::{SimulatedExecutor, StageExecutor};
use crate::history::{HistoryStore, InMemoryHistoryStore};
use crate::random::{RandomSource, ThreadRandom};
use crate::template::validate_template;

/// Handle to a running pipeline engine
#[derive(Clone)]
pub struct PipelineEngine {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<RunState>,
    bus: EventBus,
    diagnostics: DiagnosticChannel,
    template: Arc<PipelineTemplate>,
    branch_policy: BranchPolicy,
}

impl PipelineEngine {
    /// Starts building an engine for `template`
    pub fn builder(template: PipelineTemplate) -> EngineBuilder {
        EngineBuilder::new(template)
    }

    /// Starts a full run
    ///
    /// Returns once `Started` has been delivered. Stage failures are never
    /// reported here; they show up in the run state and on the event bus.
    pub async fn trigger(&self) -> Result<RunId> {
        self.request(|reply| Command::Trigger { cause: None, reply }).await
    }

    /// Fails the currently executing stage immediately
    pub async fn force_error(&self) -> Result<()> {
        self.request(|reply| Command::ForceError { reply }).await
    }

    /// Executes one stage outside the template order and waits for it
    pub async fn run_single_step(&self, stage: &str) -> Result<StageOutcome> {
        let stage = stage.to_string();
        self.request(|reply| Command::RunSingleStep { stage, reply }).await
    }

    /// Replaces a finished run with a fresh Idle one; returns its id
    pub async fn reset(&self) -> Result<RunId> {
        self.request(|reply| Command::Reset { reply }).await
    }

    /// Triggers a run if the commit's branch auto-triggers
    pub async fn on_commit(&self, commit: Commit) -> Result<CommitDecision> {
        if !self.branch_policy.should_trigger(&commit) {
            debug!(
                "Commit {} on {} deferred to merge request",
                commit.short_hash(),
                commit.branch
            );
            return Ok(CommitDecision::Deferred);
        }

        let result = self
            .request(|reply| Command::Trigger {
                cause: Some(commit),
                reply,
            })
            .await;

        match result {
            Ok(run_id) => Ok(CommitDecision::Triggered(run_id)),
            Err(EngineError::AlreadyRunning) => Ok(CommitDecision::Skipped),
            Err(e) => Err(e),
        }
    }

    /// Snapshot of the current run state
    pub fn state(&self) -> RunState {
        self.state.borrow().clone()
    }

    /// Waits until the current run is terminal and returns its final state
    ///
    /// A terminal state is only published after its history entry has been
    /// handed to the store.
    pub async fn wait_for_terminal(&self) -> Result<RunState> {
        let mut state = self.state.clone();
        state
            .wait_for(|s| s.is_terminal())
            .await
            .map(|s| s.clone())
            .map_err(|_| EngineError::EngineStopped)
    }

    /// Registers a synchronous event handler
    pub fn subscribe(&self, handler: impl EventHandler + 'static) -> Subscription {
        self.bus.subscribe(handler)
    }

    /// Async stream of events
    pub fn events(&self) -> broadcast::Receiver<Event> {
        self.bus.stream()
    }

    /// Async stream of diagnostics
    pub fn diagnostics(&self) -> broadcast::Receiver<Diagnostic> {
        self.diagnostics.subscribe()
    }

    pub fn template(&self) -> &PipelineTemplate {
        &self.template
    }

    /// Stops the driver once any in-flight run or step has finished
    pub async fn shutdown(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Shutdown { reply })
            .await
            .map_err(|_| EngineError::EngineStopped)?;
        // The driver drops the sender if it exits for another reason
        let _ = rx.await;
        Ok(())
    }

    async fn request<T>(&self, command: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| EngineError::EngineStopped)?;
        rx.await.map_err(|_| EngineError::EngineStopped)?
    }
}

/// Configures and spawns a [`PipelineEngine`]
///
/// Every collaborator is optional: the defaults are the tokio clock, the
/// thread RNG for both failure draws and jitter, the simulated executor and
/// an in-memory history.
pub struct EngineBuilder {
    template: PipelineTemplate,
    config: EngineConfig,
    clock: Option<Arc<dyn Clock>>,
    random: Option<Arc<dyn RandomSource>>,
    jitter_random: Option<Arc<dyn RandomSource>>,
    executor: Option<Arc<dyn StageExecutor>>,
    history: Option<Arc<dyn HistoryStore>>,
    branch_policy: BranchPolicy,
    seed_bias: bool,
}

impl EngineBuilder {
    pub fn new(template: PipelineTemplate) -> Self {
        Self {
            template,
            config: EngineConfig::default(),
            clock: None,
            random: None,
            jitter_random: None,
            executor: None,
            history: None,
            branch_policy: BranchPolicy::default(),
            seed_bias: false,
        }
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn random(mut self, random: Arc<dyn RandomSource>) -> Self {
        self.random = Some(random);
        self
    }

    /// Source for the simulated executor's duration jitter
    ///
    /// Ignored when a custom executor is set.
    pub fn jitter_random(mut self, random: Arc<dyn RandomSource>) -> Self {
        self.jitter_random = Some(random);
        self
    }

    pub fn executor(mut self, executor: Arc<dyn StageExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn history(mut self, history: Arc<dyn HistoryStore>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn branch_policy(mut self, policy: BranchPolicy) -> Self {
        self.branch_policy = policy;
        self
    }

    /// Replays the store's history into the success bias at spawn time
    pub fn seed_bias_from_history(mut self, seed: bool) -> Self {
        self.seed_bias = seed;
        self
    }

    /// Validates the configuration and template and spawns the driver task
    ///
    /// Must be called from within a tokio runtime.
    pub async fn spawn(self) -> anyhow::Result<PipelineEngine> {
        self.config.validate().context("Invalid engine configuration")?;
        validate_template(&self.template).context("Invalid pipeline template")?;

        let template = Arc::new(self.template);
        let clock = self.clock.unwrap_or_else(|| Arc::new(TokioClock::new()));
        let random = self.random.unwrap_or_else(|| Arc::new(ThreadRandom));
        let jitter_random = self.jitter_random;
        let executor = self.executor.unwrap_or_else(|| {
            Arc::new(SimulatedExecutor::new(
                clock.clone(),
                jitter_random.unwrap_or_else(|| Arc::new(ThreadRandom)),
                self.config.duration_jitter,
            ))
        });
        let store = self
            .history
            .unwrap_or_else(|| Arc::new(InMemoryHistoryStore::default()));

        let mut bias = SuccessBias::new(self.config.bias);
        if self.seed_bias {
            let mut entries = store
                .recent(usize::MAX)
                .await
                .context("Failed to read history for bias seeding")?;
            entries.reverse();
            bias.replay(&entries);
            debug!(
                "Seeded success bias from {} runs: {:.3}",
                entries.len(),
                bias.value()
            );
        }

        let diagnostics = DiagnosticChannel::new(self.config.event_capacity);
        let bus = EventBus::new(self.config.event_capacity, diagnostics.clone());
        let (command_tx, command_rx) = mpsc::channel(self.config.command_capacity);
        let (state_tx, state_rx) = watch::channel(RunState::idle(RunId::new(), template.clone()));

        let driver = Driver::new(
            DriverParts {
                template: template.clone(),
                config: self.config,
                clock,
                random,
                executor,
                store,
                bus: bus.clone(),
                diagnostics: diagnostics.clone(),
                bias,
            },
            state_tx,
            command_rx,
        );
        tokio::spawn(driver.run());

        Ok(PipelineEngine {
            commands: command_tx,
            state: state_rx,
            bus,
            diagnostics,
            template,
            branch_policy: self.branch_policy,
        })
    }
}
