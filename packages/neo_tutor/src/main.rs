use anyhow::{Context, Result};
use axum::{
    Router,
    routing::{any, get, post},
};
use clap::{Parser, Subcommand};
use feedback_session::SubmissionId;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::{MakeSpan, TraceLayer};
use tracing::info;
use tracing_subscriber::prelude::*;
use uuid::Uuid;

mod cli;
mod config;
mod handlers;
mod producer;
mod store;
#[cfg(test)]
mod test_helpers;

use crate::config::{
    FeedbackConfig, FileConfig, NeoConfig, Profile, ServerConfig, endpoints_from_file,
    load_config, session_config_from_file,
};
use crate::producer::{AcknowledgeProducer, FeedbackProducer, UpstreamProducer};
use crate::store::SubmissionStore;

/// Custom span maker that adds a unique request ID to each incoming request
#[derive(Clone)]
struct RequestIdMakeSpan;

impl<B> MakeSpan<B> for RequestIdMakeSpan {
    fn make_span(&mut self, request: &axum::http::Request<B>) -> tracing::Span {
        let request_id = Uuid::new_v4().to_string();
        tracing::info_span!(
            "request",
            method = %request.method(),
            uri = %request.uri(),
            request_id = %request_id,
        )
    }
}

#[derive(Parser)]
#[command(name = "neo")]
#[command(about = "Live pseudocode feedback sessions")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Custom data directory (defaults to ~/.neo-tutor)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Configuration profile
    #[arg(long, global = true, value_enum)]
    profile: Option<Profile>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the feedback server in the foreground
    Serve(ServeArgs),

    /// Edit a submission with live feedback
    Edit(EditArgs),

    /// Create a new submission for an assignment
    Create(CreateArgs),

    /// Print the effective configuration
    Config,
}

#[derive(Parser)]
struct ServeArgs {
    /// Port for the web server (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Host to bind to (overrides config)
    #[arg(short = 'b', long)]
    host: Option<String>,
}

#[derive(Parser)]
struct EditArgs {
    /// Submission to edit
    submission_id: String,

    /// Server URL (overrides config)
    #[arg(long)]
    server: Option<String>,
}

#[derive(Parser)]
struct CreateArgs {
    assignment_id: u64,

    /// Server URL (overrides config)
    #[arg(long)]
    server: Option<String>,
}

#[derive(Clone)]
pub(crate) struct AppState {
    pub store: Arc<SubmissionStore>,
    pub producer: Arc<dyn FeedbackProducer>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(matches!(cli.command, Commands::Serve(_)), cli.debug);

    let config = NeoConfig::new(cli.data_dir.clone())?;
    let fc: FileConfig = load_config(&config.data_dir, cli.profile.as_ref())
        .extract()
        .with_context(|| format!("Invalid configuration in {:?}", config.config_toml_path()))?;

    match cli.command {
        Commands::Serve(args) => run_server(args, fc).await,
        Commands::Edit(args) => {
            let endpoints = endpoints_from_file(&fc.client, args.server.as_deref());
            cli::edit_command(
                endpoints,
                session_config_from_file(&fc.session),
                SubmissionId::from(args.submission_id),
            )
            .await
        }
        Commands::Create(args) => {
            let endpoints = endpoints_from_file(&fc.client, args.server.as_deref());
            cli::create_command(&endpoints, args.assignment_id).await
        }
        Commands::Config => {
            print!("{}", crate::config::render_toml(&fc)?);
            Ok(())
        }
    }
}

/// Logs go to stderr so `neo edit` keeps stdout. The editor logs warnings only.
fn init_logging(server: bool, debug: bool) {
    let default_directive = match (server, debug) {
        (_, true) => "neo=debug,feedback_session=debug,tower_http=debug,info",
        (true, false) => "neo=info,feedback_session=info,tower_http=info,warn",
        (false, false) => "warn",
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
}

pub(crate) fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws/feedback/{id}", any(handlers::feedback_ws_handler))
        .route("/api/submissions", post(handlers::create_submission_handler))
        .route("/api/submissions/{id}", get(handlers::get_submission_handler))
        .route("/api/{id}/evaluate", post(handlers::evaluate_submission_handler))
        .route("/health", get(handlers::health_handler))
        .layer(TraceLayer::new_for_http().make_span_with(RequestIdMakeSpan))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn run_server(args: ServeArgs, mut fc: FileConfig) -> Result<()> {
    info!("Starting Neo Tutor feedback server");

    if let Some(host) = args.host {
        fc.server.host = Some(host);
    }
    if let Some(port) = args.port {
        fc.server.port = port;
    }
    let server_config = ServerConfig::from_file(&fc.server)?;
    let feedback_config = FeedbackConfig::from_file(&fc.feedback);

    let producer: Arc<dyn FeedbackProducer> = match &feedback_config.upstream_url {
        Some(url) => {
            info!("Feedback upstream: {}", url);
            Arc::new(UpstreamProducer::new(
                url.clone(),
                feedback_config.upstream_timeout,
            )?)
        }
        None => {
            info!("No feedback upstream configured, acknowledging snapshots only");
            Arc::new(AcknowledgeProducer)
        }
    };

    let state = AppState {
        store: Arc::new(SubmissionStore::new()),
        producer,
    };
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(server_config.bind)
        .await
        .with_context(|| format!("Failed to bind {}", server_config.bind))?;
    let actual_addr = listener.local_addr()?;

    info!("Neo Tutor listening on http://{}", actual_addr);
    info!("  GET  /ws/feedback/:id        - live edit channel");
    info!("  POST /api/submissions        - create submission");
    info!("  GET  /api/submissions/:id    - get submission");
    info!("  POST /api/:id/evaluate       - finalize for review");

    let shutdown_signal = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
        info!("Received shutdown signal, shutting down...");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .context("Server error")?;

    info!("Shutdown complete");
    Ok(())
}
