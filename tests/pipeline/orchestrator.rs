use std::sync::Arc;
use std::time::Duration;

use crate::support::helpers::{drain, init_tracing, scripted_engine, Call, RecordingSink, ScriptedBackend};
use scribeline::{
    CircuitState, ErrorKind, JobId, JobStatus, RunId, RunOptions, ServiceError, Stage,
};
use tokio_util::sync::CancellationToken;

const URL: &str = "https://www.tiktok.com/@creator/video/7300000000000000000";

#[tokio::test(start_paused = true)]
async fn liveness_failure_stops_before_credit_and_token_calls() {
    init_tracing();
    let backend = ScriptedBackend::new(5);
    backend.script_health((0..3).map(|_| Err(ServiceError::from_status(503, "maintenance"))));
    let engine = scripted_engine(&backend, 5);

    let err = engine.process_video(URL).await.expect_err("health fails");

    assert_eq!(err.stage(), Stage::HealthCheck);
    assert_eq!(err.kind(), ErrorKind::Server);
    assert_eq!(backend.count(Call::Health), 3);
    assert_eq!(backend.count(Call::Balance), 0);
    assert_eq!(backend.count(Call::Vend), 0);
}

#[tokio::test(start_paused = true)]
async fn empty_balance_fails_credit_check_without_vending() {
    init_tracing();
    let backend = ScriptedBackend::new(0);
    let engine = scripted_engine(&backend, 5);

    let err = engine.process_video(URL).await.expect_err("no credits");

    assert_eq!(err.stage(), Stage::CreditCheck);
    assert_eq!(err.code(), "INSUFFICIENT_CREDITS");
    assert_eq!(backend.count(Call::Vend), 0);
    assert_eq!(engine.orchestrator().token_manager().balance(), Some(0));
}

#[tokio::test(start_paused = true)]
async fn completes_after_pending_polls() {
    init_tracing();
    let backend = ScriptedBackend::new(5);
    backend.script_polls([
        Ok(JobStatus::pending()),
        Ok(JobStatus::pending()),
        Ok(JobStatus::complete("hello from the video")),
    ]);
    let engine = scripted_engine(&backend, 5);
    let mut subscription = engine.broadcaster().subscribe();

    let handle = engine
        .process_video_with(URL, RunOptions::default().with_run_id("run-c"))
        .await
        .expect("run completes");

    assert_eq!(handle.transcript, "hello from the video");
    assert_eq!(handle.job_id, JobId::new("job-1"));
    assert_eq!(handle.run_id, RunId::new("run-c"));
    assert_eq!(backend.count(Call::Poll), 3);
    assert_eq!(backend.submit_tokens(), vec!["token-0".to_owned()]);

    let status = engine.orchestrator().current_status();
    assert_eq!(status.stage, Stage::Completed);
    assert_eq!(status.progress, 1.0);
    assert!(!status.busy);

    let records = drain(&mut subscription);
    let stages: Vec<Stage> = records.iter().map(|record| record.stage).collect();
    assert_eq!(
        stages,
        vec![
            Stage::HealthCheck,
            Stage::CreditCheck,
            Stage::TokenVending,
            Stage::TranscriptionSubmission,
            Stage::PollingCompletion,
            Stage::PollingCompletion,
            Stage::PollingCompletion,
            Stage::Completed,
        ]
    );
    assert!(records
        .windows(2)
        .all(|pair| pair[0].progress_percent <= pair[1].progress_percent));
    assert_eq!(records.last().map(|r| r.progress_percent), Some(100));

    let broadcaster = engine.broadcaster();
    assert!(broadcaster.snapshot().is_empty());
    assert_eq!(
        broadcaster.get(&RunId::new("run-c")).map(|r| r.stage),
        Some(Stage::Completed)
    );
}

#[tokio::test(start_paused = true)]
async fn poll_budget_exhaustion_times_out() {
    init_tracing();
    let backend = ScriptedBackend::new(5);
    let engine = scripted_engine(&backend, 4);

    let err = engine.process_video(URL).await.expect_err("never completes");

    assert_eq!(err.stage(), Stage::PollingCompletion);
    assert!(matches!(
        err.service_error(),
        ServiceError::TimeoutExceeded { attempts: 4, .. }
    ));
    assert_eq!(backend.count(Call::Poll), 4);
    assert_eq!(engine.telemetry().snapshot().polls, 4);
}

#[tokio::test(start_paused = true)]
async fn rejected_token_is_cleared_and_revended() {
    init_tracing();
    let backend = ScriptedBackend::new(5);
    backend.script_submits([Err(ServiceError::from_status(401, "token revoked"))]);
    let engine = scripted_engine(&backend, 5);
    let tokens = engine.orchestrator().token_manager().clone();

    let err = engine.process_video(URL).await.expect_err("submit rejected");

    assert_eq!(err.stage(), Stage::TranscriptionSubmission);
    assert_eq!(err.kind(), ErrorKind::Authentication);
    assert!(tokens.current_token().is_none());
    assert_eq!(backend.count(Call::Submit), 1);

    let identity = engine.config().identity();
    let fresh = tokens.get_valid_token(&identity).await.expect("fresh vend");
    assert_eq!(fresh.token(), "token-1");
    assert_eq!(backend.count(Call::Vend), 2);
}

#[tokio::test(start_paused = true)]
async fn remote_job_failure_fails_the_run() {
    init_tracing();
    let backend = ScriptedBackend::new(5);
    backend.script_polls([Ok(JobStatus::pending()), Ok(JobStatus::failed("audio unavailable"))]);
    let engine = scripted_engine(&backend, 5);

    let err = engine.process_video(URL).await.expect_err("job failed");

    assert_eq!(err.stage(), Stage::PollingCompletion);
    assert!(err.to_string().contains("audio unavailable"));
    assert_eq!(backend.count(Call::Poll), 2);
}

#[tokio::test(start_paused = true)]
async fn authoritative_credit_refusal_is_a_normal_failure() {
    init_tracing();
    let backend = ScriptedBackend::new(5);
    backend.script_vends([Err(ServiceError::from_status(402, "balance exhausted"))]);
    let engine = scripted_engine(&backend, 5);

    let err = engine.process_video(URL).await.expect_err("vend refused");

    assert_eq!(err.stage(), Stage::TokenVending);
    assert_eq!(err.code(), "INSUFFICIENT_CREDITS");
    assert_eq!(engine.orchestrator().token_manager().balance(), Some(0));
    assert_eq!(backend.count(Call::Submit), 0);
}

#[tokio::test(start_paused = true)]
async fn invalid_url_publishes_only_a_failed_record() {
    init_tracing();
    let backend = ScriptedBackend::new(5);
    let engine = scripted_engine(&backend, 5);
    let mut subscription = engine.broadcaster().subscribe();

    let err = engine
        .process_video("   mailto:someone@example.com ")
        .await
        .expect_err("rejected");

    assert_eq!(err.code(), "VALIDATION_ERROR");
    assert!(backend.calls().is_empty());
    let stages: Vec<Stage> = drain(&mut subscription).iter().map(|r| r.stage).collect();
    assert_eq!(stages, vec![Stage::Failed]);
}

#[tokio::test(start_paused = true)]
async fn cancellation_interrupts_polling() {
    init_tracing();
    let backend = ScriptedBackend::new(5);
    let engine = scripted_engine(&backend, 1_000);
    let orchestrator = engine.orchestrator().clone();
    let token = CancellationToken::new();

    let run = {
        let token = token.clone();
        tokio::spawn(async move {
            orchestrator
                .process_video_with(URL, RunOptions::default().with_cancellation(token))
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert!(engine.orchestrator().current_status().busy);
    token.cancel();

    let err = run.await.expect("task joins").expect_err("cancelled");
    assert!(err.is_cancelled());
    assert_eq!(err.stage(), Stage::PollingCompletion);
    assert_eq!(engine.telemetry().snapshot().runs_cancelled, 1);
    assert!(!engine.orchestrator().current_status().busy);
    assert!(backend.count(Call::Poll) < 1_000);
}

#[tokio::test(start_paused = true)]
async fn vend_finishing_after_cancellation_still_reaches_the_ledger() {
    init_tracing();
    let backend = ScriptedBackend::new(5);
    backend.set_vend_delay(Duration::from_secs(1));
    let engine = scripted_engine(&backend, 3);
    let orchestrator = engine.orchestrator().clone();
    let token = CancellationToken::new();

    let run = {
        let token = token.clone();
        tokio::spawn(async move {
            orchestrator
                .process_video_with(URL, RunOptions::default().with_cancellation(token))
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(backend.count(Call::Vend), 1);
    token.cancel();

    let err = run.await.expect("task joins").expect_err("cancelled");
    assert!(err.is_cancelled());
    assert_eq!(err.stage(), Stage::TokenVending);

    let tokens = engine.orchestrator().token_manager();
    assert!(!tokens.is_valid());
    assert_eq!(tokens.balance(), Some(5));

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(tokens.is_valid());
    assert_eq!(tokens.balance(), Some(4));
    assert_eq!(backend.count(Call::Submit), 0);

    // the next run reuses the credit already spent
    backend.set_default_poll(JobStatus::complete("late transcript"));
    engine.process_video(URL).await.expect("second run completes");
    assert_eq!(backend.count(Call::Vend), 1);
}

#[tokio::test(start_paused = true)]
async fn engine_shutdown_cancels_runs_without_their_own_token() {
    init_tracing();
    let backend = ScriptedBackend::new(5);
    let mut engine = scripted_engine(&backend, 1_000);
    let root = engine.cancellation_token();

    let outcome = {
        let run = engine.process_video(URL);
        tokio::pin!(run);
        tokio::select! {
            result = &mut run => panic!("run should still be polling: {result:?}"),
            _ = tokio::time::sleep(Duration::from_millis(250)) => {}
        }
        root.cancel();
        run.await
    };

    assert!(outcome.expect_err("cancelled").is_cancelled());
    engine.shutdown().await.expect("shutdown");
}

#[tokio::test(start_paused = true)]
async fn open_circuit_short_circuits_the_next_run() {
    init_tracing();
    let backend = ScriptedBackend::new(5);
    backend.script_health((0..10).map(|_| Err(ServiceError::network("connection refused"))));
    let mut config_policy = crate::support::helpers::fast_policy();
    config_policy.failure_threshold = 2;
    config_policy.max_attempts = 5;
    let config = scribeline::EngineConfig::builder()
        .service_url("http://scripted.invalid")
        .user_id("user-1")
        .credential("identity-secret")
        .retry_policy(config_policy)
        .build()
        .expect("valid config");
    let engine = scribeline::Engine::with_clients(
        config,
        scribeline::ServiceClients::from_backend(backend.clone()),
    );

    let first = engine.process_video(URL).await.expect_err("health down");
    assert_eq!(first.kind(), ErrorKind::Network);
    assert_eq!(backend.count(Call::Health), 2);

    let second = engine.process_video(URL).await.expect_err("circuit open");
    assert_eq!(second.kind(), ErrorKind::CircuitOpen);
    assert_eq!(second.stage(), Stage::HealthCheck);
    assert_eq!(backend.count(Call::Health), 2);
    assert_eq!(
        engine
            .orchestrator()
            .retry_engine()
            .breaker_snapshot("health")
            .map(|snapshot| snapshot.state),
        Some(CircuitState::Open)
    );
}

#[tokio::test(start_paused = true)]
async fn concurrent_runs_share_one_token() {
    init_tracing();
    let backend = ScriptedBackend::new(5);
    backend.set_default_poll(JobStatus::complete("shared transcript"));
    let engine = scripted_engine(&backend, 5);

    let (first, second) = tokio::join!(
        engine.process_video_with(URL, RunOptions::default().with_run_id("a")),
        engine.process_video_with(URL, RunOptions::default().with_run_id("b")),
    );

    assert_eq!(first.expect("first run").run_id, RunId::new("a"));
    assert_eq!(second.expect("second run").run_id, RunId::new("b"));
    assert_eq!(backend.count(Call::Vend), 1);
    assert_eq!(engine.telemetry().snapshot().runs_completed, 2);
    assert_eq!(engine.telemetry().snapshot().token_vends, 1);
}

#[tokio::test(start_paused = true)]
async fn sink_receives_transcript_and_its_failure_is_ignored() {
    init_tracing();
    let backend = ScriptedBackend::new(5);
    backend.set_default_poll(JobStatus::complete("stored transcript"));

    let sink = Arc::new(RecordingSink::default());
    let engine = scripted_engine(&backend, 5)
        .with_sink(sink.clone())
        .expect("sink attaches");
    let handle = engine.process_video(URL).await.expect("completes");
    assert_eq!(sink.stored(), vec![handle]);

    let failing = Arc::new(RecordingSink::failing());
    let engine = scripted_engine(&backend, 5)
        .with_sink(failing.clone())
        .expect("sink attaches");
    engine.process_video(URL).await.expect("sink failure is not fatal");
    assert_eq!(failing.stored().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn reset_returns_to_idle_after_a_run() {
    init_tracing();
    let backend = ScriptedBackend::new(0);
    let engine = scripted_engine(&backend, 5);

    engine.process_video(URL).await.expect_err("no credits");
    assert_eq!(engine.orchestrator().current_status().stage, Stage::Failed);
    assert_eq!(engine.orchestrator().current_status().progress, 0.2);

    engine.orchestrator().reset();
    let status = engine.orchestrator().current_status();
    assert_eq!(status.stage, Stage::Idle);
    assert_eq!(status.progress, 0.0);
    assert!(!status.busy);
}
