use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use scribeline::{init_tracing, Engine, EngineConfig};

const DEFAULT_SERVICE_URL: &str = "http://localhost:8787";
const DEFAULT_POLL_INTERVAL_MS: u64 = 3_000;
const DEFAULT_MAX_POLL_ATTEMPTS: usize = 20;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let url = env::args()
        .nth(1)
        .context("usage: transcribe <video-url> (service settings come from SCRIBELINE_* variables)")?;

    let config = config_from_env()?;
    let mut engine = Engine::from_config(config)?;
    engine.start_metrics_reporter();

    let mut subscription = engine.broadcaster().subscribe();
    let printer = tokio::spawn(async move {
        while let Some(record) = subscription.recv().await {
            println!(
                "[{:>3}%] {:<24} {}",
                record.progress_percent, record.title, record.detail
            );
            if record.is_terminal() {
                break;
            }
        }
    });

    let shutdown = engine.cancellation_token();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            shutdown.cancel();
        }
    });

    let outcome = engine.process_video(&url).await;
    ctrl_c.abort();
    let _ = printer.await;

    match outcome {
        Ok(handle) => {
            println!("\nrun {} finished (job {})\n", handle.run_id, handle.job_id);
            println!("{}", handle.transcript);
        }
        Err(err) => {
            let message = err.user_message();
            eprintln!("\n{}: {}", message.title, message.message);
            eprintln!("cause: {err}");
        }
    }

    engine.shutdown().await
}

fn config_from_env() -> Result<EngineConfig> {
    let credential = env::var("SCRIBELINE_CREDENTIAL")
        .context("SCRIBELINE_CREDENTIAL must hold the identity credential")?;

    EngineConfig::builder()
        .service_url(read_env_or_default("SCRIBELINE_SERVICE_URL", DEFAULT_SERVICE_URL))
        .user_id(read_env_or_default("SCRIBELINE_USER_ID", "demo-user"))
        .credential(credential)
        .poll_interval(Duration::from_millis(parse_env_with_default(
            "SCRIBELINE_POLL_INTERVAL_MS",
            DEFAULT_POLL_INTERVAL_MS,
        )?))
        .max_poll_attempts(parse_env_with_default(
            "SCRIBELINE_MAX_POLL_ATTEMPTS",
            DEFAULT_MAX_POLL_ATTEMPTS,
        )?)
        .build()
}

fn read_env_or_default(key: &str, default: &str) -> String {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => value,
        _ => default.to_string(),
    }
}

fn parse_env_with_default<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .with_context(|| format!("failed to parse {key}='{value}'")),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("failed to read {key}")),
    }
}
