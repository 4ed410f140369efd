mod common;

use gantry_core::domain::event::{Event, EventKind};
use gantry_core::domain::run::{RunStatus, StageFailure, StageOutcome};
use gantry_engine::{
    EngineConfig, EngineError, FixedRandom, HistoryStore, PipelineEngine, ThreadRandom,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{config, kinds, record_events, spawn, spawn_with, template};

#[tokio::test(start_paused = true)]
async fn test_second_trigger_is_rejected_while_running() {
    let h = spawn(template(&[0.1, 0.1, 0.1]), vec![]).await;

    let first = h.engine.trigger().await.unwrap();
    assert_eq!(h.engine.state().status, RunStatus::Running);
    assert_eq!(h.engine.trigger().await, Err(EngineError::AlreadyRunning));
    assert_eq!(h.engine.run_single_step("s0").await, Err(EngineError::PipelineBusy));
    assert!(matches!(h.engine.reset().await, Err(EngineError::InvalidState(_))));

    let finished = h.engine.wait_for_terminal().await.unwrap();
    assert_eq!(finished.run_id, first);
    assert_eq!(finished.status, RunStatus::Succeeded);

    let second = h.engine.trigger().await.unwrap();
    assert_ne!(second, first);
    h.engine.wait_for_terminal().await.unwrap();
    assert_eq!(h.history.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_stages_progress_in_order() {
    let h = spawn(template(&[0.1, 0.1, 0.1, 0.1]), vec![]).await;
    let (_sub, events) = record_events(&h.engine);

    h.engine.trigger().await.unwrap();
    let finished = h.engine.wait_for_terminal().await.unwrap();

    let started: Vec<usize> = events
        .lock()
        .unwrap()
        .iter()
        .filter(|e| e.kind == EventKind::StageStarted)
        .filter_map(|e| e.stage_index)
        .collect();
    assert_eq!(started, vec![0, 1, 2, 3]);

    assert_eq!(finished.current_stage, Some(3));
    assert_eq!(finished.stage_outcomes.len(), 4);
    for (i, result) in finished.stage_outcomes.iter().enumerate() {
        assert_eq!(result.stage_index, i);
        assert_eq!(result.outcome, StageOutcome::Success);
        assert_eq!(result.attempts, 1);
        assert_eq!(result.duration_ms(), 100);
    }
}

#[tokio::test(start_paused = true)]
async fn test_success_emits_exact_event_sequence() {
    let h = spawn(template(&[0.1, 0.1]), vec![]).await;
    let (_sub, events) = record_events(&h.engine);

    let run_id = h.engine.trigger().await.unwrap();
    h.engine.wait_for_terminal().await.unwrap();

    assert_eq!(
        kinds(&events),
        vec![
            EventKind::Started,
            EventKind::StageStarted,
            EventKind::StageSucceeded,
            EventKind::StageStarted,
            EventKind::StageSucceeded,
            EventKind::Completed,
        ]
    );
    assert!(events.lock().unwrap().iter().all(|e| e.run_id == run_id));
}

#[tokio::test(start_paused = true)]
async fn test_recovery_resumes_from_failed_stage() {
    let h = spawn(template(&[0.08, 0.08, 0.08, 0.08]), vec![0.5, 0.5, 0.0, 0.5, 0.5]).await;

    let observed = Arc::new(Mutex::new(Vec::new()));
    let sink = observed.clone();
    let observer = h.engine.clone();
    let details = Arc::new(Mutex::new(Vec::new()));
    let detail_sink = details.clone();
    let _sub = h.engine.subscribe(move |event: &Event| -> anyhow::Result<()> {
        let state = observer.state();
        sink.lock().unwrap().push((event.kind, state.status));
        detail_sink
            .lock()
            .unwrap()
            .push((state.status, state.error_detail.is_some()));
        Ok(())
    });

    h.engine.trigger().await.unwrap();
    let finished = h.engine.wait_for_terminal().await.unwrap();

    // The error detail is only present while the run is Failed
    for (status, has_detail) in details.lock().unwrap().iter() {
        assert_eq!(*has_detail, *status == RunStatus::Failed, "{:?}", status);
    }

    assert_eq!(finished.status, RunStatus::Succeeded);
    assert_eq!(finished.stage_outcomes.len(), 4);
    assert_eq!(finished.stage_outcomes[2].attempts, 2);
    assert_eq!(finished.stage_outcomes[2].outcome, StageOutcome::Success);
    assert!(finished.error_detail.is_none());

    let observed = observed.lock().unwrap().clone();
    assert_eq!(
        observed,
        vec![
            (EventKind::Started, RunStatus::Running),
            (EventKind::StageStarted, RunStatus::Running),
            (EventKind::StageSucceeded, RunStatus::Running),
            (EventKind::StageStarted, RunStatus::Running),
            (EventKind::StageSucceeded, RunStatus::Running),
            (EventKind::StageStarted, RunStatus::Running),
            (EventKind::StageFailed, RunStatus::Failed),
            (EventKind::Failed, RunStatus::Failed),
            (EventKind::RecoveryAttempted, RunStatus::Recovering),
            (EventKind::RecoverySucceeded, RunStatus::Running),
            (EventKind::StageStarted, RunStatus::Running),
            (EventKind::StageSucceeded, RunStatus::Running),
            (EventKind::Completed, RunStatus::Succeeded),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_recovery_is_attempted_exactly_once() {
    let h = spawn(template(&[0.08, 0.08, 0.08]), vec![0.5, 0.0, 0.0]).await;
    let (_sub, events) = record_events(&h.engine);

    h.engine.trigger().await.unwrap();
    let finished = h.engine.wait_for_terminal().await.unwrap();

    assert_eq!(finished.status, RunStatus::Failed);
    assert!(!finished.recovery_pending);
    assert_eq!(finished.stage_outcomes.len(), 2);
    assert_eq!(finished.stage_outcomes[1].outcome, StageOutcome::Failure);
    assert_eq!(finished.stage_outcomes[1].attempts, 2);
    assert!(finished.error_detail.as_deref().unwrap().contains("recovery failed"));

    assert_eq!(
        kinds(&events),
        vec![
            EventKind::Started,
            EventKind::StageStarted,
            EventKind::StageSucceeded,
            EventKind::StageStarted,
            EventKind::StageFailed,
            EventKind::Failed,
            EventKind::RecoveryAttempted,
            EventKind::RecoveryFailed,
        ]
    );

    // Nothing else happens until an explicit reset
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(events.lock().unwrap().len(), 8);
    assert_eq!(h.engine.state().status, RunStatus::Failed);

    let entries = h.history.recent(1).await.unwrap();
    assert_eq!(entries[0].status, RunStatus::Failed);
    assert_eq!(entries[0].stage_outcomes[2].outcome, StageOutcome::Skipped);
}

#[tokio::test(start_paused = true)]
async fn test_failure_without_recovery_is_terminal() {
    let h = spawn_with(
        template(&[0.08, 0.08]),
        Arc::new(FixedRandom(0.0)),
        config().with_recovery_enabled(false),
    )
    .await;
    let (_sub, events) = record_events(&h.engine);

    let observed = Arc::new(Mutex::new(Vec::new()));
    let sink = observed.clone();
    let observer = h.engine.clone();
    let _status = h.engine.subscribe(move |event: &Event| -> anyhow::Result<()> {
        sink.lock().unwrap().push((event.kind, observer.state().status));
        Ok(())
    });

    h.engine.trigger().await.unwrap();
    let finished = h.engine.wait_for_terminal().await.unwrap();

    assert_eq!(finished.status, RunStatus::Failed);
    assert_eq!(
        kinds(&events),
        vec![
            EventKind::Started,
            EventKind::StageStarted,
            EventKind::StageFailed,
            EventKind::Failed,
        ]
    );

    let observed = observed.lock().unwrap().clone();
    assert_eq!(observed[2], (EventKind::StageFailed, RunStatus::Failed));
    assert_eq!(observed[3], (EventKind::Failed, RunStatus::Failed));
}

#[tokio::test(start_paused = true)]
async fn test_reset_creates_fresh_idle_state() {
    let h = spawn(template(&[0.1, 0.1]), vec![0.0, 0.0]).await;
    let (_sub, events) = record_events(&h.engine);

    let first = h.engine.trigger().await.unwrap();
    h.engine.wait_for_terminal().await.unwrap();

    let next = h.engine.reset().await.unwrap();
    assert_ne!(next, first);

    let state = h.engine.state();
    assert_eq!(state.run_id, next);
    assert_eq!(state.status, RunStatus::Idle);
    assert_eq!(state.current_stage, None);
    assert!(state.stage_outcomes.is_empty());
    assert!(state.error_detail.is_none());
    assert_eq!(kinds(&events).last(), Some(&EventKind::Reset));

    // The failed run was recorded once, at its terminal moment
    assert_eq!(h.history.len(), 1);

    let triggered = h.engine.trigger().await.unwrap();
    assert_eq!(triggered, next);
}

#[tokio::test(start_paused = true)]
async fn test_reset_from_idle_is_accepted() {
    let h = spawn(template(&[0.1]), vec![]).await;
    let before = h.engine.state().run_id;

    let after = h.engine.reset().await.unwrap();

    assert_ne!(before, after);
    assert!(h.history.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_zero_probability_always_succeeds() {
    let h = spawn_with(
        template(&[0.0, 0.0, 0.0, 0.0]),
        Arc::new(ThreadRandom),
        config(),
    )
    .await;

    for _ in 0..5 {
        h.engine.trigger().await.unwrap();
        let finished = h.engine.wait_for_terminal().await.unwrap();
        assert_eq!(finished.status, RunStatus::Succeeded);
        assert_eq!(finished.stage_outcomes.len(), 4);
        assert!(finished
            .stage_outcomes
            .iter()
            .all(|r| r.outcome == StageOutcome::Success));
    }
}

#[tokio::test(start_paused = true)]
async fn test_default_config_short_stages_never_time_out() {
    // Longest possible jitter on 100 ms stages
    let engine = PipelineEngine::builder(template(&[0.0, 0.0, 0.0]))
        .config(EngineConfig::default())
        .jitter_random(Arc::new(FixedRandom(0.999)))
        .spawn()
        .await
        .unwrap();

    engine.trigger().await.unwrap();
    let finished = engine.wait_for_terminal().await.unwrap();

    assert_eq!(finished.status, RunStatus::Succeeded);
    for result in &finished.stage_outcomes {
        assert_eq!(result.failure, None);
        let ms = result.duration_ms();
        assert!((100..=125).contains(&ms), "stage took {} ms", ms);
    }
}

#[tokio::test(start_paused = true)]
async fn test_jitter_does_not_consume_failure_draws() {
    // s0 passes, s1 fails once and recovers; jitter stays on its own source
    let h = spawn_with(
        template(&[0.08, 0.08]),
        Arc::new(gantry_engine::SequenceRandom::new([0.9, 0.0, 0.9])),
        EngineConfig::default().with_recovery_delay(Duration::from_millis(500)),
    )
    .await;

    h.engine.trigger().await.unwrap();
    let finished = h.engine.wait_for_terminal().await.unwrap();

    assert_eq!(finished.status, RunStatus::Succeeded);
    let attempts: Vec<(u32, StageOutcome)> = finished
        .stage_outcomes
        .iter()
        .map(|r| (r.attempts, r.outcome))
        .collect();
    assert_eq!(
        attempts,
        vec![(1, StageOutcome::Success), (2, StageOutcome::Success)]
    );
}

#[tokio::test(start_paused = true)]
async fn test_failed_run_raises_next_failure_rate() {
    // p = 0.08; the second run's draw of 0.1 only fails once the bias has
    // moved the effective probability to 0.13
    let h = spawn_with(
        template(&[0.08]),
        Arc::new(gantry_engine::SequenceRandom::with_fallback([0.0], 0.1)),
        config().with_recovery_enabled(false),
    )
    .await;

    h.engine.trigger().await.unwrap();
    assert_eq!(h.engine.wait_for_terminal().await.unwrap().status, RunStatus::Failed);

    h.engine.trigger().await.unwrap();
    assert_eq!(h.engine.wait_for_terminal().await.unwrap().status, RunStatus::Failed);
}

#[tokio::test(start_paused = true)]
async fn test_force_error_fails_current_stage_immediately() {
    let h = spawn_with(
        template(&[0.0, 0.0]),
        Arc::new(FixedRandom(0.9)),
        config().with_recovery_enabled(false),
    )
    .await;

    assert_eq!(h.engine.force_error().await, Err(EngineError::NotRunning));

    h.engine.trigger().await.unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;
    h.engine.force_error().await.unwrap();

    let finished = h.engine.wait_for_terminal().await.unwrap();
    assert_eq!(finished.status, RunStatus::Failed);
    assert_eq!(finished.stage_outcomes.len(), 1);
    assert_eq!(finished.stage_outcomes[0].failure, Some(StageFailure::Forced));
    assert_eq!(finished.stage_outcomes[0].duration_ms(), 30);
    assert!(finished.error_detail.as_deref().unwrap().contains("forced"));
}

#[tokio::test(start_paused = true)]
async fn test_force_error_is_rejected_during_recovery_delay() {
    let h = spawn(template(&[0.08]), vec![0.0, 0.5]).await;

    h.engine.trigger().await.unwrap();
    // stage takes 100 ms, recovery delay is 500 ms
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(h.engine.state().status, RunStatus::Failed);
    assert_eq!(h.engine.force_error().await, Err(EngineError::NotRunning));
    assert_eq!(h.engine.trigger().await, Err(EngineError::AlreadyRunning));

    let finished = h.engine.wait_for_terminal().await.unwrap();
    assert_eq!(finished.status, RunStatus::Succeeded);
}

#[tokio::test(start_paused = true)]
async fn test_single_step_runs_one_stage() {
    let h = spawn(template(&[0.1, 0.1, 0.1]), vec![]).await;
    let (_sub, events) = record_events(&h.engine);
    let idle = h.engine.state();

    let outcome = h.engine.run_single_step("s2").await.unwrap();

    assert_eq!(outcome, StageOutcome::Success);
    let delivered = events.lock().unwrap().clone();
    assert_eq!(delivered.len(), 2);
    assert_eq!(delivered[0].kind, EventKind::StageStarted);
    assert_eq!(delivered[1].kind, EventKind::StageSucceeded);
    assert!(delivered.iter().all(|e| e.stage_index == Some(2)));

    let state = h.engine.state();
    assert_eq!(state.status, RunStatus::Idle);
    assert_eq!(state.run_id, idle.run_id);
    assert!(state.stage_outcomes.is_empty());
    assert!(h.history.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_single_step_errors() {
    let h = spawn(template(&[0.1]), vec![]).await;

    assert_eq!(
        h.engine.run_single_step("deploy").await,
        Err(EngineError::UnknownStage("deploy".to_string()))
    );

    h.engine.trigger().await.unwrap();
    h.engine.wait_for_terminal().await.unwrap();
    assert!(matches!(
        h.engine.run_single_step("s0").await,
        Err(EngineError::InvalidState(_))
    ));

    h.engine.reset().await.unwrap();
    assert_eq!(h.engine.run_single_step("s0").await, Ok(StageOutcome::Success));
}

#[tokio::test(start_paused = true)]
async fn test_single_step_owns_the_engine_while_running() {
    let h = spawn(template(&[0.1]), vec![]).await;

    let engine = h.engine.clone();
    let step = tokio::spawn(async move { engine.run_single_step("s0").await });
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(h.engine.trigger().await, Err(EngineError::AlreadyRunning));
    assert_eq!(h.engine.run_single_step("s0").await, Err(EngineError::PipelineBusy));
    assert_eq!(h.engine.force_error().await, Err(EngineError::NotRunning));
    assert!(matches!(h.engine.reset().await, Err(EngineError::InvalidState(_))));

    assert_eq!(step.await.unwrap(), Ok(StageOutcome::Success));
    h.engine.trigger().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_failing_subscribers_do_not_disturb_the_run() {
    let h = spawn(template(&[0.1, 0.1]), vec![]).await;
    let mut diagnostics = h.engine.diagnostics();

    let _bad = h
        .engine
        .subscribe(|_: &Event| -> anyhow::Result<()> { anyhow::bail!("renderer offline") });
    let _panicky = h.engine.subscribe(|event: &Event| -> anyhow::Result<()> {
        if event.kind == EventKind::StageSucceeded {
            panic!("bad subscriber");
        }
        Ok(())
    });
    let (_good, events) = record_events(&h.engine);

    h.engine.trigger().await.unwrap();
    let finished = h.engine.wait_for_terminal().await.unwrap();

    assert_eq!(finished.status, RunStatus::Succeeded);
    assert_eq!(events.lock().unwrap().len(), 6);

    let first = diagnostics.recv().await.unwrap();
    assert_eq!(first.source, gantry_engine::DiagnosticSource::Subscriber);
    assert_eq!(first.run_id, Some(finished.run_id));
}

#[tokio::test(start_paused = true)]
async fn test_unsubscribed_handler_receives_nothing() {
    let h = spawn(template(&[0.1]), vec![]).await;
    let (sub, events) = record_events(&h.engine);
    sub.unsubscribe();

    h.engine.trigger().await.unwrap();
    h.engine.wait_for_terminal().await.unwrap();

    assert!(events.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_event_stream_mirrors_handlers() {
    let h = spawn(template(&[0.1]), vec![]).await;
    let mut stream = h.engine.events();

    h.engine.trigger().await.unwrap();
    h.engine.wait_for_terminal().await.unwrap();

    let mut streamed = Vec::new();
    while let Ok(event) = stream.try_recv() {
        streamed.push(event.kind);
    }
    assert_eq!(
        streamed,
        vec![
            EventKind::Started,
            EventKind::StageStarted,
            EventKind::StageSucceeded,
            EventKind::Completed,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_independent_engines_run_concurrently() {
    let a = spawn(template(&[0.0, 0.0]), vec![]).await;
    let b = spawn(template(&[0.0]), vec![]).await;

    a.engine.trigger().await.unwrap();
    b.engine.trigger().await.unwrap();

    let (ra, rb) = tokio::join!(a.engine.wait_for_terminal(), b.engine.wait_for_terminal());
    assert_eq!(ra.unwrap().status, RunStatus::Succeeded);
    assert_eq!(rb.unwrap().status, RunStatus::Succeeded);
    assert_eq!(a.history.len(), 1);
    assert_eq!(b.history.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_waits_for_active_run() {
    let h = spawn(template(&[0.0, 0.0]), vec![]).await;

    h.engine.trigger().await.unwrap();
    h.engine.shutdown().await.unwrap();

    assert_eq!(h.engine.state().status, RunStatus::Succeeded);
    assert_eq!(h.history.len(), 1);
    assert_eq!(h.engine.trigger().await, Err(EngineError::EngineStopped));
}
