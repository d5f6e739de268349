//! # Resource Pool
//!
//! Candidates known to a gathering loop and the content fetched for them.
//! Fetched resources are keyed by normalized title, kept in fetch order,
//! and never exceed the pool's capacity.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::tools::titles::normalize_title;

/// A paper that could be fetched
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceCandidate {
    pub title: String,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub citation_count: Option<u64>,
    #[serde(default)]
    pub venue: Option<String>,
    #[serde(default, rename = "abstract")]
    pub abstract_text: Option<String>,
    /// Landing page
    #[serde(default)]
    pub url: Option<String>,
    /// Full-text locator
    #[serde(default)]
    pub pdf_url: Option<String>,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub doi: Option<String>,
}

impl ResourceCandidate {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    /// Identity key: the normalized title
    pub fn key(&self) -> String {
        normalize_title(&self.title)
    }

    pub fn locator(&self) -> Option<&str> {
        self.pdf_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }

    pub fn is_fetchable(&self) -> bool {
        self.locator().is_some()
    }
}

/// Where a fetched resource came from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResourceOrigin {
    Seed,
    External,
}

/// A successfully fetched resource
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchedResource {
    pub key: String,
    pub candidate: ResourceCandidate,
    pub content: String,
    pub iteration: usize,
    pub origin: ResourceOrigin,
}

/// A fetch attempt that did not produce content
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FetchFailure {
    pub title: String,
    pub locator: Option<String>,
    pub reason: String,
    pub iteration: usize,
}

/// Result of [`ResourcePool::insert`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    Duplicate,
    Full,
}

#[derive(Debug, Clone)]
pub struct ResourcePool {
    candidates: Vec<ResourceCandidate>,
    fetched: Vec<FetchedResource>,
    fetched_keys: HashSet<String>,
    failures: Vec<FetchFailure>,
    failed_keys: HashSet<String>,
    capacity: usize,
}

impl ResourcePool {
    /// Seed a pool. Candidates with an empty title or a repeated key are
    /// dropped so every known candidate has a distinct identity.
    pub fn new(seed: impl IntoIterator<Item = ResourceCandidate>, capacity: usize) -> Self {
        let mut pool = Self {
            candidates: Vec::new(),
            fetched: Vec::new(),
            fetched_keys: HashSet::new(),
            failures: Vec::new(),
            failed_keys: HashSet::new(),
            capacity,
        };
        for candidate in seed {
            pool.add_candidate(candidate);
        }
        pool
    }

    /// Register a candidate; returns false when its identity is already known.
    pub fn add_candidate(&mut self, candidate: ResourceCandidate) -> bool {
        let key = candidate.key();
        if key.is_empty() || self.knows(&key) {
            return false;
        }
        self.candidates.push(candidate);
        true
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn fetched_count(&self) -> usize {
        self.fetched.len()
    }

    pub fn remaining_slots(&self) -> usize {
        self.capacity.saturating_sub(self.fetched.len())
    }

    pub fn is_full(&self) -> bool {
        self.remaining_slots() == 0
    }

    /// Whether `key` (a normalized title) is a known candidate.
    pub fn knows(&self, key: &str) -> bool {
        self.candidates.iter().any(|c| c.key() == key)
    }

    pub fn is_fetched(&self, key: &str) -> bool {
        self.fetched_keys.contains(key)
    }

    pub fn has_failed(&self, key: &str) -> bool {
        self.failed_keys.contains(key)
    }

    pub fn candidates(&self) -> &[ResourceCandidate] {
        &self.candidates
    }

    /// Candidates neither fetched nor previously failed, in seed order.
    pub fn unfetched(&self) -> Vec<ResourceCandidate> {
        self.candidates
            .iter()
            .filter(|c| {
                let key = c.key();
                !self.fetched_keys.contains(&key) && !self.failed_keys.contains(&key)
            })
            .cloned()
            .collect()
    }

    /// Store fetched content. Never exceeds capacity and never stores the
    /// same identity twice.
    pub fn insert(
        &mut self,
        candidate: ResourceCandidate,
        content: String,
        iteration: usize,
        origin: ResourceOrigin,
    ) -> InsertOutcome {
        let key = candidate.key();
        if self.fetched_keys.contains(&key) {
            return InsertOutcome::Duplicate;
        }
        if self.is_full() {
            return InsertOutcome::Full;
        }
        if !self.knows(&key) {
            self.candidates.push(candidate.clone());
        }
        self.fetched_keys.insert(key.clone());
        self.fetched.push(FetchedResource {
            key,
            candidate,
            content,
            iteration,
            origin,
        });
        InsertOutcome::Inserted
    }

    /// Record a failed attempt; the candidate is excluded from later iterations.
    pub fn record_failure(
        &mut self,
        candidate: &ResourceCandidate,
        reason: impl Into<String>,
        iteration: usize,
    ) {
        self.failed_keys.insert(candidate.key());
        self.failures.push(FetchFailure {
            title: candidate.title.clone(),
            locator: candidate.locator().map(str::to_string),
            reason: reason.into(),
            iteration,
        });
    }

    /// Fetched resources in fetch order
    pub fn fetched(&self) -> &[FetchedResource] {
        &self.fetched
    }

    pub fn failures(&self) -> &[FetchFailure] {
        &self.failures
    }

    pub fn fetched_titles(&self) -> Vec<String> {
        self.fetched
            .iter()
            .map(|r| r.candidate.title.clone())
            .collect()
    }
}
