#![allow(dead_code)]

use gantry_core::domain::event::{Event, EventKind};
use gantry_core::domain::stage::{PipelineTemplate, StageDefinition};
use gantry_engine::{
    EngineConfig, InMemoryHistoryStore, PipelineEngine, RandomSource, SequenceRandom, Subscription,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Template with one 100 ms stage per probability, named s0, s1, ...
pub fn template(probabilities: &[f64]) -> PipelineTemplate {
    let stages = probabilities
        .iter()
        .enumerate()
        .map(|(i, p)| StageDefinition::new(format!("s{}", i), 100, *p))
        .collect();
    PipelineTemplate::new("test", stages)
}

/// Defaults with jitter disabled, so every stage takes exactly its nominal
/// duration
pub fn config() -> EngineConfig {
    EngineConfig::default()
        .with_duration_jitter(0.0)
        .with_recovery_delay(Duration::from_millis(500))
}

pub struct Harness {
    pub engine: PipelineEngine,
    pub history: Arc<InMemoryHistoryStore>,
}

pub async fn spawn(template: PipelineTemplate, draws: Vec<f64>) -> Harness {
    spawn_with(template, Arc::new(SequenceRandom::new(draws)), config()).await
}

pub async fn spawn_with(
    template: PipelineTemplate,
    random: Arc<dyn RandomSource>,
    config: EngineConfig,
) -> Harness {
    let history = Arc::new(InMemoryHistoryStore::default());
    let engine = PipelineEngine::builder(template)
        .config(config)
        .random(random)
        .history(history.clone())
        .spawn()
        .await
        .unwrap();
    Harness { engine, history }
}

/// Records every delivered event
pub fn record_events(engine: &PipelineEngine) -> (Subscription, Arc<Mutex<Vec<Event>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let subscription = engine.subscribe(move |event: &Event| -> anyhow::Result<()> {
        sink.lock().unwrap().push(event.clone());
        Ok(())
    });
    (subscription, events)
}

pub fn kinds(events: &Mutex<Vec<Event>>) -> Vec<EventKind> {
    events.lock().unwrap().iter().map(|e| e.kind).collect()
}
