//! # PDF Text
//!
//! Text extraction for the uploaded CV and for downloaded papers.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use super::http::ClientHandle;
use crate::error::PipelineError;
use crate::gather::{PaperFetcher, ResourceCandidate};

/// Characters of paper text kept per fetched paper
pub const MAX_PAPER_CHARS: usize = 60_000;

/// Extract text from PDF bytes; blank output is an [`PipelineError::EmptyDocument`].
pub fn extract_pdf_text(bytes: &[u8]) -> Result<String> {
    if bytes.is_empty() {
        return Err(PipelineError::EmptyDocument("PDF is empty".to_string()).into());
    }
    let text = pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| anyhow::anyhow!("Failed to extract PDF text: {}", e))?;
    let text = text.trim();
    if text.is_empty() {
        return Err(PipelineError::EmptyDocument(
            "Could not extract text from PDF".to_string(),
        )
        .into());
    }
    Ok(text.to_string())
}

/// Extraction is CPU-bound; keep it off the async workers.
pub async fn extract_pdf_text_blocking(bytes: Vec<u8>) -> Result<String> {
    tokio::task::spawn_blocking(move || extract_pdf_text(&bytes))
        .await
        .context("PDF extraction task panicked")?
}

/// HTML served where a PDF was expected (login walls, landing pages)
pub fn looks_like_html(bytes: &[u8], content_type: Option<&str>) -> bool {
    if bytes.starts_with(b"%PDF") {
        return false;
    }
    content_type.is_some_and(|ct| ct.to_ascii_lowercase().contains("text/html"))
        || bytes
            .iter()
            .take(512)
            .map(|b| b.to_ascii_lowercase())
            .collect::<Vec<u8>>()
            .windows(5)
            .any(|w| w == b"<html")
}

/// Downloads a candidate's PDF and returns its text
pub struct PdfPaperFetcher {
    http: Arc<ClientHandle>,
    timeout: Duration,
}

impl PdfPaperFetcher {
    pub fn new(http: Arc<ClientHandle>, timeout: Duration) -> Self {
        Self { http, timeout }
    }
}

#[async_trait]
impl PaperFetcher for PdfPaperFetcher {
    async fn fetch(&self, candidate: &ResourceCandidate) -> Result<String> {
        let locator = candidate
            .locator()
            .ok_or_else(|| PipelineError::fetch(&candidate.title, "no full-text locator"))?;

        let (bytes, content_type) = self
            .http
            .get_bytes(locator, self.timeout)
            .await
            .map_err(|e| PipelineError::fetch(locator, format!("{:#}", e)))?;
        if looks_like_html(&bytes, content_type.as_deref()) {
            return Err(PipelineError::fetch(locator, "response is HTML, not a PDF").into());
        }

        let mut text = extract_pdf_text_blocking(bytes)
            .await
            .map_err(|e| PipelineError::fetch(locator, format!("{:#}", e)))?;
        if let Some((idx, _)) = text.char_indices().nth(MAX_PAPER_CHARS) {
            text.truncate(idx);
        }
        tracing::debug!(title = %candidate.title, chars = text.len(), "Paper text extracted");
        Ok(text)
    }
}
