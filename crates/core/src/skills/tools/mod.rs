//! # External Tools
//!
//! Capabilities the stages reach outside the process for. Everything here
//! shares one [`ClientHandle`], built lazily on the first request.
//!
//! - `http` - Shared reqwest client with explicit reconnect state
//! - `academic_api` - OpenAlex and Semantic Scholar author and title search
//! - `web_context` - Bounded professor browsing over allowed domains
//! - `image_context` - Vision call over an uploaded context image
//! - `pdf_text` - PDF text extraction and the paper fetcher

pub mod academic_api;
pub mod http;
pub mod image_context;
pub mod pdf_text;
pub mod web_context;

use std::sync::Arc;

use crate::config::CoordinatorConfig;
use academic_api::AcademicSearch;
use http::ClientHandle;
use image_context::ImageAnalyzer;
use pdf_text::PdfPaperFetcher;
use web_context::WebBrowser;

/// The external capabilities one process shares across runs
#[derive(Clone)]
pub struct Toolbox {
    pub http: Arc<ClientHandle>,
    pub academic: Arc<AcademicSearch>,
    pub fetcher: Arc<PdfPaperFetcher>,
    pub browser: Arc<WebBrowser>,
    pub images: Arc<ImageAnalyzer>,
}

impl Toolbox {
    pub fn new(config: &CoordinatorConfig) -> Self {
        Self::with_client(config, Arc::new(ClientHandle::default()))
    }

    pub fn with_client(config: &CoordinatorConfig, http: Arc<ClientHandle>) -> Self {
        let timeouts = &config.timeouts;
        Self {
            academic: Arc::new(AcademicSearch::from_order(
                &config.academic_api_order,
                http.clone(),
                timeouts.search(),
            )),
            fetcher: Arc::new(PdfPaperFetcher::new(http.clone(), timeouts.fetch())),
            browser: Arc::new(WebBrowser::new(http.clone(), config.web.clone())),
            images: Arc::new(ImageAnalyzer::new(http.clone(), timeouts.image())),
            http,
        }
    }
}
