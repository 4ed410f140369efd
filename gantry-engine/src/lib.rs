//! Gantry pipeline engine
//!
//! Drives runs of a [`PipelineTemplate`](gantry_core::domain::stage::PipelineTemplate)
//! through their stages, applies the bounded recovery policy, tunes failure
//! rates from run history, and broadcasts lifecycle events.
//!
//! ```no_run
//! use gantry_core::domain::stage::PipelineTemplate;
//! use gantry_engine::PipelineEngine;
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let engine = PipelineEngine::builder(PipelineTemplate::default_ci()).spawn().await?;
//! let _subscription = engine.subscribe(|event: &gantry_core::domain::event::Event| -> anyhow::Result<()> {
//!     println!("{}", event.log_line());
//!     Ok(())
//! });
//! engine.trigger().await?;
//! let finished = engine.wait_for_terminal().await?;
//! println!("run {} ended {}", finished.run_id, finished.status);
//! # Ok(())
//! # }
//! ```

pub mod bias;
pub mod bus;
pub mod clock;
pub mod commit;
pub mod config;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod executor;
pub mod history;
pub mod random;
pub mod recovery;
pub mod simulator;
pub mod template;

pub use bus::{EventBus, EventHandler, Subscription};
pub use clock::{Clock, TokioClock, VirtualClock};
pub use commit::{BranchPolicy, CommitDecision};
pub use config::{BiasConfig, EngineConfig};
pub use diagnostics::{Diagnostic, DiagnosticSource};
pub use engine::{EngineBuilder, PipelineEngine};
pub use error::{EngineError, Result, StorageError};
pub use executor::{SimulatedExecutor, StageContext, StageExecutor};
pub use history::{HistoryStore, InMemoryHistoryStore, JsonFileHistoryStore};
pub use random::{FixedRandom, RandomSource, SequenceRandom, ThreadRandom};
pub use simulator::{CommitSimulator, SimulationTick, SimulatorConfig};
