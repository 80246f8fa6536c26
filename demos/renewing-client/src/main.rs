use std::time::Duration;

use sessionguard::prelude::*;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";
const POLL_PATH: &str = "/api/auth/me";

/// `SESSIONGUARD_CONFIG` (a JSON document) wins; otherwise defaults with
/// `SESSIONGUARD_BASE_URL` or the local default.
fn load_config(
    json: Option<String>,
    base_url: Option<String>,
) -> Result<SessionConfig, serde_json::Error> {
    match json {
        Some(doc) => SessionConfig::from_json_str(&doc),
        None => Ok(SessionConfig::with_base_url(
            base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        )),
    }
}

// ---------------------------------------------------------------------------
// Client loop
// ---------------------------------------------------------------------------

/// Polls the backend until the session ends or the user hits Ctrl-C.
async fn run<E: RequestExecutor>(
    pipeline: &AuthenticatedPipeline<E>,
    poll_every: Duration,
) -> Result<(), PipelineError> {
    let (sub, mut events) = pipeline.events().subscribe_channel();
    let url = format!("{}{POLL_PATH}", pipeline.config().base_url);
    let mut ticker = tokio::time::interval(poll_every);

    let result = loop {
        tokio::select! {
            _ = ticker.tick() => {
                match pipeline.execute(RequestDescriptor::get(url.as_str())).await {
                    Ok(resp) => tracing::info!(status = resp.status(), "polled {POLL_PATH}"),
                    Err(PipelineError::SessionExpired) => break Ok(()),
                    Err(PipelineError::Network(e)) => tracing::warn!(error = %e, "backend unreachable"),
                    Err(e) => break Err(e),
                }
            }
            Some(event) = events.recv() => match event {
                SessionEvent::Renewed(identity) => tracing::info!(%identity, "session renewed"),
                SessionEvent::LoggedOut => {
                    tracing::info!("signed out, stopping");
                    break Ok(());
                }
            },
            _ = tokio::signal::ctrl_c() => {
                pipeline.logout().await;
                break Ok(());
            }
        }
    };

    sub.unsubscribe();
    pipeline.shutdown();
    result
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    sessionguard::init_tracing();

    let config = load_config(
        std::env::var("SESSIONGUARD_CONFIG").ok(),
        std::env::var("SESSIONGUARD_BASE_URL").ok(),
    )?;
    eprintln!("renewing-client talking to {}", config.base_url);

    let pipeline = AuthenticatedPipeline::builder()
        .config(config)
        .build(HttpExecutor::new(HttpExecutorConfig::default())?);

    let outcome = pipeline.resume().await?;
    if !outcome.is_success() {
        eprintln!("no active session ({}); sign in first", outcome.tag());
        return Ok(());
    }

    run(&pipeline, Duration::from_secs(60)).await?;
    Ok(())
}
