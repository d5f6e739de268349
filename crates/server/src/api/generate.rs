//! # Generate API
//!
//! Multipart application form in, Server-Sent Events out. Invalid input is
//! rejected with a 400 before any run starts; afterwards every outcome,
//! failures included, arrives as events on the stream.

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Json, Response,
    },
    routing::post,
    Router,
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use utoipa::ToSchema;

use phdapply_core::error::PipelineError;
use phdapply_core::swarm::{
    ApplicationRequest, Coordinator, FundingStatus, Language, PipelineEvent, Upload,
};

use crate::SharedState;

const EVENT_BUFFER: usize = 64;

/// Multipart fields accepted by `POST /generate`.
///
/// Only documents the form for OpenAPI; [`read_form`] reads the fields
/// straight off the multipart stream, so nothing reads this struct.
#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
#[allow(dead_code)]
pub struct GenerateForm {
    professor_name: String,
    university: String,
    /// english, german, french or other
    language: Option<String>,
    custom_language: Option<String>,
    /// fully_funded, partially_funded, self_funded or seeking_funding
    funding_status: Option<String>,
    research_interests: Option<String>,
    /// Defaults to "Fall 2026"
    preferred_start: Option<String>,
    additional_notes: Option<String>,
    posting_content: Option<String>,
    #[schema(value_type = String, format = Binary)]
    cv_file: Vec<u8>,
    #[schema(value_type = Option<String>, format = Binary)]
    context_image: Option<Vec<u8>>,
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

pub fn generate_routes() -> Router<SharedState> {
    Router::new().route("/generate", post(generate))
}

fn invalid(e: impl ToString) -> PipelineError {
    PipelineError::InvalidInput(e.to_string())
}

fn apply_text_field(
    input: &mut ApplicationRequest,
    name: &str,
    value: String,
) -> Result<(), PipelineError> {
    match name {
        "professorName" => input.professor_name = value,
        "university" => input.university = value,
        "language" => {
            input.language = Language::parse(&value)
                .ok_or_else(|| invalid(format!("Unsupported language '{}'", value)))?;
        }
        "customLanguage" => input.custom_language = Some(value),
        "fundingStatus" => {
            input.funding_status = FundingStatus::parse(&value)
                .ok_or_else(|| invalid(format!("Unsupported funding status '{}'", value)))?;
        }
        "researchInterests" => input.research_interests = value,
        "preferredStart" => input.preferred_start = value,
        "additionalNotes" => input.additional_notes = value,
        "postingContent" => input.posting_content = value,
        other => tracing::debug!(field = other, "Ignoring unknown form field"),
    }
    Ok(())
}

/// Read the multipart form into a validated request.
pub async fn read_form(mut multipart: Multipart) -> Result<ApplicationRequest, PipelineError> {
    let mut input = ApplicationRequest::default();
    let mut has_cv = false;

    while let Some(field) = multipart.next_field().await.map_err(invalid)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "cvFile" | "contextImage" => {
                let filename = field.file_name().map(str::to_string);
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map_err(invalid)?.to_vec();
                let upload = Upload {
                    bytes,
                    filename,
                    content_type,
                };
                if name == "cvFile" {
                    has_cv = true;
                    input.cv = upload;
                } else {
                    input.context_image = Some(upload);
                }
            }
            _ => {
                let value = field.text().await.map_err(invalid)?;
                apply_text_field(&mut input, &name, value)?;
            }
        }
    }

    if !has_cv {
        return Err(invalid("CV file is required"));
    }
    input.validate()
}

fn sse_event(event: &PipelineEvent) -> Event {
    let data = event.payload().unwrap_or_else(|e| {
        tracing::error!(error = %e, "Could not serialize event");
        serde_json::json!({ "error": e.to_string() }).to_string()
    });
    Event::default().event(event.name()).data(data)
}

/// Run the pipeline and stream its events
#[utoipa::path(
    post,
    path = "/generate",
    tag = "generate",
    request_body(content = GenerateForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "`status` events, then one `complete` or `error` event", content_type = "text/event-stream"),
        (status = 400, description = "Invalid input", body = ErrorResponse)
    )
)]
pub async fn generate(State(state): State<SharedState>, multipart: Multipart) -> Response {
    let input = match read_form(multipart).await {
        Ok(input) => input,
        Err(e) => {
            tracing::warn!(error = %e, "Rejected generate request");
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            )
                .into_response();
        }
    };
    tracing::info!(
        professor = %input.professor_name,
        university = %input.university,
        has_image = input.context_image.is_some(),
        "Starting application run"
    );

    let (tx, rx) = mpsc::channel(EVENT_BUFFER);
    let coordinator =
        Coordinator::with_toolbox(state.config.clone(), &state.toolbox).with_event_channel(tx);
    // Dropping the response stream (client gone) cancels the run
    let guard = coordinator.cancellation_token().drop_guard();
    tokio::spawn(async move {
        let result = coordinator.run(input).await;
        tracing::info!(success = result.success, "Application run finished");
    });

    let stream = ReceiverStream::new(rx).map(move |event| {
        let _guard = &guard;
        Ok::<_, Infallible>(sse_event(&event))
    });
    Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response()
}
