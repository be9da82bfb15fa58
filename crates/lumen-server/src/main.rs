//! lumen-server
//!
//! HTTP front end: wires the Anthropic client, the Manim renderer and the
//! Tesseract extractor into the core pipeline and serves it with axum.

mod error;
mod http;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use lumen_core::app::{ChatService, Janitor, RenderOrchestrator, RenderSupervisor, VideoPoller};
use lumen_core::config::Settings;
use lumen_core::impls::{AnthropicClient, InMemoryOutcomeStore, ManimRenderer, TesseractExtractor};
use lumen_core::ports::{Clock, OutcomeStore, SystemClock};
use tracing_subscriber::EnvFilter;

use crate::http::{AppState, build_router, cors_layer};

const DEFAULT_LOG_FILTER: &str = "lumen_core=info,lumen_server=info";

#[derive(Debug, Parser)]
#[command(name = "lumen-server", version, about = "Explanations with rendered animations")]
struct Args {
    /// Override HOST.
    #[arg(long)]
    host: Option<String>,

    /// Override PORT.
    #[arg(long)]
    port: Option<u16>,

    /// Log filter used when RUST_LOG is unset.
    #[arg(long, default_value = DEFAULT_LOG_FILTER)]
    log_filter: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_filter)),
        )
        .init();

    let mut settings = Settings::from_env().context("failed to load configuration")?;
    if let Some(host) = args.host {
        settings.server.host = host;
    }
    if let Some(port) = args.port {
        settings.server.port = port;
    }

    for dir in [
        &settings.render.media_dir,
        &settings.render.work_dir,
        &settings.ocr.upload_dir,
    ] {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store: Arc<dyn OutcomeStore> = Arc::new(InMemoryOutcomeStore::new(clock.clone()));
    let anthropic = Arc::new(
        AnthropicClient::new(settings.anthropic).context("failed to build model client")?,
    );
    let renderer = Arc::new(ManimRenderer::new(&settings.render));
    let orchestrator = Arc::new(RenderOrchestrator::new(
        renderer,
        anthropic.clone(),
        store.clone(),
    ));
    let supervisor = Arc::new(RenderSupervisor::new(
        orchestrator,
        settings.render.max_concurrent_renders,
    ));
    let chat = Arc::new(ChatService::new(
        anthropic,
        Arc::new(TesseractExtractor::new(&settings.ocr)),
        supervisor.clone(),
        settings.ocr.upload_dir.clone(),
        &settings.pipeline,
    ));
    let janitor = Janitor::new(
        store.clone(),
        clock,
        settings.ocr.upload_dir.clone(),
        settings.janitor,
    )
    .spawn();

    let router = build_router(
        AppState {
            chat,
            poller: Arc::new(VideoPoller::new(store)),
            max_file_size: settings.server.max_file_size,
        },
        cors_layer(&settings.server.allowed_origins),
    );

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(
        %addr,
        quality = ?settings.render.quality,
        max_concurrent_renders = settings.render.max_concurrent_renders,
        allowed_origins = ?settings.server.allowed_origins,
        "listening"
    );

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!(in_flight = supervisor.in_flight(), "shutting down");
    supervisor.shutdown_and_join().await;
    janitor.shutdown_and_join().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
