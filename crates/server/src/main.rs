//! PhDApply Server
//!
//! Axum server streaming application runs over SSE, plus a CLI that runs
//! one application locally and prints the result.

mod api;

use axum::{
    body::Body,
    http::{header, Response, StatusCode},
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use clap::{Parser, Subcommand};
use phdapply_core::config::CoordinatorConfig;
use phdapply_core::skills::tools::Toolbox;
use phdapply_core::swarm::{
    ApplicationRequest, Coordinator, FundingStatus, Language, PipelineEvent, StageKind, Upload,
};
use serde::Serialize;
use std::{net::SocketAddr, path::PathBuf, sync::Arc};
use tokio::{net::TcpListener, sync::mpsc};
use tracing_subscriber::EnvFilter;
use utoipa::{OpenApi, ToSchema};

/// Shared by every request; the toolbox reuses one HTTP client.
pub struct AppState {
    pub config: CoordinatorConfig,
    pub toolbox: Toolbox,
}

pub type SharedState = Arc<AppState>;

#[derive(Parser, Clone)]
#[command(author, version, about = "PhDApply - research-grounded PhD application drafts")]
struct Args {
    #[command(subcommand)]
    command: Option<CliCommand>,
}

#[derive(Subcommand, Clone)]
enum CliCommand {
    /// Start the HTTP server (default)
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
        /// Address to bind
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },
    /// Run one application locally and print the result JSON
    Run(RunArgs),
}

#[derive(clap::Args, Clone)]
struct RunArgs {
    /// CV as PDF
    #[arg(long)]
    cv: PathBuf,
    #[arg(long)]
    professor: String,
    #[arg(long)]
    university: String,
    /// english, german, french or other
    #[arg(long, default_value = "english")]
    language: String,
    #[arg(long)]
    custom_language: Option<String>,
    /// fully_funded, partially_funded, self_funded or seeking_funding
    #[arg(long, default_value = "fully_funded")]
    funding: String,
    #[arg(long, default_value = "")]
    interests: String,
    #[arg(long, default_value = "")]
    preferred_start: String,
    #[arg(long, default_value = "")]
    notes: String,
    /// File holding the position posting
    #[arg(long)]
    posting: Option<PathBuf>,
    /// Optional context image (lab photo, poster, slide)
    #[arg(long)]
    image: Option<PathBuf>,
    /// Write the result JSON here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Serialize, ToSchema)]
struct HealthResponse {
    status: String,
}

// === OpenAPI Definition ===

#[derive(OpenApi)]
#[openapi(
    info(
        title = "PhDApply API",
        version = "0.1.0",
        description = "Research-grounded PhD application drafting with streamed stage progress"
    ),
    paths(health, api::generate::generate),
    components(schemas(
        HealthResponse,
        api::generate::GenerateForm,
        api::generate::ErrorResponse
    )),
    tags(
        (name = "health", description = "Liveness"),
        (name = "generate", description = "Application runs")
    )
)]
struct ApiDoc;

/// Liveness check
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Service is up", body = HealthResponse)
    )
)]
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

async fn serve_openapi() -> impl IntoResponse {
    match ApiDoc::openapi().to_json() {
        Ok(spec) => Response::builder()
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(spec))
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()),
        Err(e) => {
            tracing::error!(error = %e, "Could not render OpenAPI document");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run_server(host: &str, port: u16) -> anyhow::Result<()> {
    let config = CoordinatorConfig::from_env();
    let toolbox = Toolbox::new(&config);
    let state: SharedState = Arc::new(AppState { config, toolbox });

    let app = Router::new()
        .route("/health", get(health))
        .route("/openapi.json", get(serve_openapi))
        .merge(api::generate::generate_routes())
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    tracing::info!(%addr, "PhDApply server listening");
    tracing::info!("Routes: GET /health, POST /generate, GET /openapi.json");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn read_upload(path: &PathBuf) -> anyhow::Result<Upload> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| anyhow::anyhow!("Could not read {}: {}", path.display(), e))?;
    Ok(Upload {
        bytes,
        filename: path.file_name().map(|n| n.to_string_lossy().to_string()),
        content_type: None,
    })
}

async fn run_once(args: RunArgs) -> anyhow::Result<()> {
    let RunArgs {
        cv,
        professor,
        university,
        language,
        custom_language,
        funding,
        interests,
        preferred_start,
        notes,
        posting,
        image,
        output,
    } = args;

    let posting_content = match posting {
        Some(path) => tokio::fs::read_to_string(&path).await?,
        None => String::new(),
    };
    let context_image = match image {
        Some(path) => Some(read_upload(&path).await?),
        None => None,
    };
    let input = ApplicationRequest {
        professor_name: professor,
        university,
        language: Language::parse(&language)
            .ok_or_else(|| anyhow::anyhow!("Unsupported language '{}'", language))?,
        custom_language,
        funding_status: FundingStatus::parse(&funding)
            .ok_or_else(|| anyhow::anyhow!("Unsupported funding status '{}'", funding))?,
        research_interests: interests,
        preferred_start,
        additional_notes: notes,
        posting_content,
        cv: read_upload(&cv).await?,
        context_image,
    }
    .validate()?;

    let (tx, mut rx) = mpsc::channel(64);
    let coordinator = Coordinator::new(CoordinatorConfig::from_env()).with_event_channel(tx);
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if let PipelineEvent::Status(status) = event {
                eprintln!(
                    "[{}/{}] {} ({:?}): {}",
                    status.step,
                    StageKind::ALL.len(),
                    status.name,
                    status.state,
                    status.current_action
                );
            }
        }
    });

    let result = coordinator.run(input).await;
    drop(coordinator);
    if let Err(e) = printer.await {
        tracing::warn!(error = %e, "Status printer task failed");
    }

    let json = serde_json::to_string_pretty(&result)?;
    match output {
        Some(path) => {
            tokio::fs::write(&path, json).await?;
            eprintln!("Result written to {}", path.display());
        }
        None => println!("{}", json),
    }

    match result.error {
        Some(error) if !result.success => anyhow::bail!(error),
        _ => Ok(()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_loaded = dotenvy::dotenv().is_ok();
    init_tracing();
    if env_loaded {
        tracing::debug!("Loaded environment from .env");
    }

    let args = Args::parse();
    match args.command {
        Some(CliCommand::Run(args)) => run_once(args).await,
        Some(CliCommand::Serve { port, host }) => run_server(&host, port).await,
        None => run_server("127.0.0.1", 8080).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_subcommand_defaults() {
        let args = Args::try_parse_from([
            "phdapply",
            "run",
            "--cv",
            "cv.pdf",
            "--professor",
            "Ada Lovelace",
            "--university",
            "University of London",
        ])
        .unwrap();

        let Some(CliCommand::Run(run)) = args.command else {
            panic!("expected the run subcommand");
        };
        assert_eq!(run.cv, PathBuf::from("cv.pdf"));
        assert_eq!(run.language, "english");
        assert_eq!(run.funding, "fully_funded");
        assert!(run.output.is_none());
    }

    #[test]
    fn test_no_subcommand_means_serve() {
        let args = Args::try_parse_from(["phdapply"]).unwrap();
        assert!(args.command.is_none());
    }
}
