use anyhow::{Context, Result};
use clap::Parser;
use scribe_stream::{
    create_router, AppState, ChunkPipeline, Config, FsChunkStore, MemorySessionStore,
    NatsTranscriber, SessionManager, StreamContext, WorkerPool,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "scribe-stream", about = "Real-time consultation transcription service")]
struct Args {
    /// Config file path (extension optional)
    #[arg(long, default_value = "config/scribe-stream")]
    config: String,

    /// Override the HTTP port from the config file
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let cfg = Config::load(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config))?;

    info!("Scribe Stream v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded config: {}", cfg.service.name);

    let chunks = FsChunkStore::new(&cfg.storage.chunks_path).await?;
    let transcriber = NatsTranscriber::connect(
        &cfg.transcription.nats_url,
        cfg.transcription.subject.clone(),
        Duration::from_secs(cfg.transcription.timeout_secs),
    )
    .await?;

    let sessions = Arc::new(SessionManager::new(Arc::new(
        MemorySessionStore::assume_consultations_active(),
    )));
    let stream = Arc::new(StreamContext {
        sessions,
        pipeline: Arc::new(ChunkPipeline::new(Arc::new(chunks), Arc::new(transcriber))),
        pool: WorkerPool::new(cfg.stream.worker_pool_size),
        limits: cfg.stream.limits(),
    });

    let app = create_router(AppState::new(stream, cfg.stream.outbound_buffer));

    let port = args.port.unwrap_or(cfg.service.http.port);
    let addr = format!("{}:{}", cfg.service.http.bind, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app)
        .await
        .context("HTTP server error")?;

    Ok(())
}
