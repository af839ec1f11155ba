//! Mock Research Collaborators
//!
//! For testing and demo purposes. Deterministic search hits and reports.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use super::search::{SearchBackend, SearchHit};
use super::{ResearchPipeline, ResearchRequest};
use crate::error::{AdvisorError, Result};

/// Search backend returning the same hits for every query
pub struct StaticSearch {
    hits: Vec<SearchHit>,
    failure: Option<String>,
}

impl StaticSearch {
    pub fn new(hits: Vec<SearchHit>) -> Self {
        Self { hits, failure: None }
    }

    /// Fail every search
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            hits: Vec::new(),
            failure: Some(reason.into()),
        }
    }
}

#[async_trait]
impl SearchBackend for StaticSearch {
    async fn search(&self, _query: &str, max_results: usize) -> Result<Vec<SearchHit>> {
        match &self.failure {
            Some(reason) => Err(AdvisorError::ExternalService(reason.clone())),
            None => Ok(self.hits.iter().take(max_results).cloned().collect()),
        }
    }

    fn name(&self) -> &str {
        "static"
    }
}

#[derive(Clone, Debug)]
enum Outcome {
    Report(String),
    Echo,
    Empty,
    Fail(String),
}

/// Research pipeline with a fixed outcome
pub struct StaticResearchPipeline {
    outcome: Outcome,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl StaticResearchPipeline {
    fn with_outcome(outcome: Outcome) -> Self {
        Self {
            outcome,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Always return this report
    pub fn report(report: impl Into<String>) -> Self {
        Self::with_outcome(Outcome::Report(report.into()))
    }

    /// Return "report for {query}" so tests can tell calls apart
    pub fn echo() -> Self {
        Self::with_outcome(Outcome::Echo)
    }

    /// Run, but produce nothing
    pub fn empty() -> Self {
        Self::with_outcome(Outcome::Empty)
    }

    /// Fail as an unreachable collaborator
    pub fn failing(reason: impl Into<String>) -> Self {
        Self::with_outcome(Outcome::Fail(reason.into()))
    }

    /// Sleep before answering (for timeout tests)
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of times `run` was entered
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResearchPipeline for StaticResearchPipeline {
    async fn run(&self, request: &ResearchRequest) -> Result<Option<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match &self.outcome {
            Outcome::Report(report) => Ok(Some(report.clone())),
            Outcome::Echo => Ok(Some(format!("report for {}", request.query))),
            Outcome::Empty => Ok(None),
            Outcome::Fail(reason) => Err(AdvisorError::ExternalService(reason.clone())),
        }
    }

    fn name(&self) -> &str {
        "static"
    }
}
