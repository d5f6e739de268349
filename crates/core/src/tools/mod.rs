//! # Deterministic Tools
//!
//! Plain Rust helpers that keep oracle guesswork honest: title matching,
//! JSON recovery from free text, and text cleanup.
//!
//! ## Modules
//!
//! - `titles` - Title normalization and fuzzy matching back to known candidates
//! - `json_extract` - Recover a JSON object from chatty model output
//! - `text` - Dedupe, truncation, word counts, HTML stripping

pub mod json_extract;
pub mod text;
pub mod titles;
