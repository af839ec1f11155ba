//! LLM Research Pipeline
//!
//! Three phases: plan sub-queries, gather evidence from the search backend
//! concurrently, then compose a report grounded only in that evidence.

use std::collections::HashSet;
use std::sync::Arc;

use agent_core::{
    message::Message,
    provider::{GenerationOptions, LlmProvider},
};
use async_trait::async_trait;
use futures::future::join_all;

use super::search::{SearchBackend, SearchHit};
use super::{ReportType, ResearchPipeline, ResearchRequest};
use crate::config::ResearchSettings;
use crate::error::{AdvisorError, Result};

const PLANNER_PROMPT: &str = "You plan literature searches for a clinical research assistant. \
Given a clinical question, write focused web search queries that together cover diagnosis, \
differential diagnosis, recommended investigations and current treatment guidance. \
Reply with one query per line and nothing else.";

const WRITER_PROMPT: &str = "You write medical research reports for physicians. Use ONLY the \
numbered sources supplied by the user. Cite sources inline as [n]. Do not invent studies, \
statistics or citations. If the sources do not answer part of the question, say so explicitly.";

/// Research pipeline backed by a language model and a search backend
pub struct LlmResearchPipeline {
    provider: Arc<dyn LlmProvider>,
    search: Arc<dyn SearchBackend>,
    settings: ResearchSettings,
}

impl LlmResearchPipeline {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        search: Arc<dyn SearchBackend>,
        settings: ResearchSettings,
    ) -> Self {
        Self {
            provider,
            search,
            settings,
        }
    }

    fn options(&self) -> GenerationOptions {
        GenerationOptions {
            temperature: 0.2,
            max_tokens: 4096,
            ..GenerationOptions::for_model(self.settings.model.clone())
        }
    }

    /// Phase 1: the original query plus model-proposed sub-queries
    async fn plan(&self, query: &str) -> Vec<String> {
        let messages = [
            Message::system(PLANNER_PROMPT),
            Message::user(format!(
                "Clinical question: {}\nWrite at most {} queries.",
                query, self.settings.max_sub_queries
            )),
        ];

        let proposed = match self.provider.complete(&messages, &self.options()).await {
            Ok(completion) => completion.content,
            Err(e) => {
                tracing::warn!(error = %e, "Query planning failed, searching the original question only");
                String::new()
            }
        };

        parse_queries(query, &proposed, self.settings.max_sub_queries)
    }

    /// Phase 2: run every query, keep unique hits
    async fn gather(&self, queries: &[String]) -> Result<Vec<SearchHit>> {
        let searches = queries
            .iter()
            .map(|q| self.search.search(q, self.settings.max_results_per_query));
        let outcomes = join_all(searches).await;

        let mut seen = HashSet::new();
        let mut hits = Vec::new();
        let mut failures = 0usize;

        for (query, outcome) in queries.iter().zip(outcomes) {
            match outcome {
                Ok(found) => {
                    tracing::debug!(query = %query, hits = found.len(), "Search complete");
                    hits.extend(found.into_iter().filter(|h| seen.insert(h.url.clone())));
                }
                Err(e) => {
                    failures += 1;
                    tracing::warn!(query = %query, error = %e, "Search failed");
                }
            }
        }

        if failures == queries.len() {
            return Err(AdvisorError::ExternalService(format!(
                "all {} searches failed on {}",
                failures,
                self.search.name()
            )));
        }

        Ok(hits)
    }

    /// Phase 3: compose the report from the evidence
    async fn compose(&self, request: &ResearchRequest, hits: &[SearchHit]) -> Result<Option<String>> {
        let mut evidence = String::new();
        for (i, hit) in hits.iter().enumerate() {
            evidence.push_str(&format!("[{}] {} ({})\n{}\n\n", i + 1, hit.title, hit.url, hit.content));
        }

        let messages = [
            Message::system(WRITER_PROMPT),
            Message::user(format!(
                "Question: {}\n\n{}\n\nSources:\n{}",
                request.query,
                report_instructions(request.report_type),
                evidence
            )),
        ];

        let completion = self.provider.complete(&messages, &self.options()).await?;
        let body = completion.content.trim();
        if body.is_empty() {
            return Ok(None);
        }

        let mut report = body.to_string();
        report.push_str("\n\nReferences:\n");
        for (i, hit) in hits.iter().enumerate() {
            report.push_str(&format!("[{}] {} - {}\n", i + 1, hit.title, hit.url));
        }
        Ok(Some(report.trim_end().to_string()))
    }
}

#[async_trait]
impl ResearchPipeline for LlmResearchPipeline {
    async fn run(&self, request: &ResearchRequest) -> Result<Option<String>> {
        let queries = self.plan(&request.query).await;
        tracing::info!(queries = queries.len(), report_type = request.report_type.as_str(), "Research planned");

        let hits = self.gather(&queries).await?;
        if hits.is_empty() {
            tracing::info!("Research found no evidence");
            return Ok(None);
        }
        tracing::info!(sources = hits.len(), "Evidence gathered");

        self.compose(request, &hits).await
    }

    fn name(&self) -> &str {
        "llm-research"
    }
}

fn report_instructions(report_type: ReportType) -> &'static str {
    match report_type {
        ReportType::ResearchReport => {
            "Write a detailed research report with an introduction, findings organized by theme, \
             and a conclusion that states the strength of the evidence."
        }
        ReportType::ResourceReport => {
            "List the most relevant sources. For each, summarize what it contributes to the question \
             and how reliable it is."
        }
        ReportType::OutlineReport => {
            "Write a structured outline (headings and bullet points) of what the sources say."
        }
    }
}

/// Clean planner output into at most `max` queries, original question first
fn parse_queries(original: &str, proposed: &str, max: usize) -> Vec<String> {
    let mut queries = vec![original.trim().to_string()];

    for line in proposed.lines() {
        let cleaned = line
            .trim()
            .trim_start_matches(|c: char| c.is_ascii_digit() || matches!(c, '.' | ')' | '-' | '*' | '•'))
            .trim()
            .trim_matches('"')
            .trim();

        if cleaned.is_empty() || queries.iter().any(|q| q.eq_ignore_ascii_case(cleaned)) {
            continue;
        }
        if queries.len() > max {
            break;
        }
        queries.push(cleaned.to_string());
    }

    queries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::research::StaticSearch;
    use agent_core::mock::MockProvider;

    fn hit(n: u32) -> SearchHit {
        SearchHit {
            title: format!("Source {n}"),
            url: format!("https://example.org/{n}"),
            content: format!("Finding {n}"),
        }
    }

    #[test]
    fn test_parse_queries() {
        let proposed = "1. type 2 diabetes diagnostic criteria\n- \"HbA1c threshold\"\n\n3) Type 2 diabetes diagnostic criteria\n4. polyuria causes";
        let queries = parse_queries("fatigue and weight loss", proposed, 2);

        assert_eq!(
            queries,
            vec![
                "fatigue and weight loss".to_string(),
                "type 2 diabetes diagnostic criteria".to_string(),
                "HbA1c threshold".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_full_pipeline_cites_sources() {
        let provider = Arc::new(MockProvider::scripted(vec![
            "diabetes symptoms".into(),
            "Report body citing [1].".into(),
        ]));
        let search = Arc::new(StaticSearch::new(vec![hit(1), hit(1)]));
        let pipeline = LlmResearchPipeline::new(provider.clone(), search, ResearchSettings::default());

        let report = pipeline
            .run(&ResearchRequest::new("fatigue", ReportType::ResearchReport))
            .await
            .unwrap()
            .unwrap();

        assert!(report.starts_with("Report body citing [1]."));
        assert!(report.contains("[1] Source 1 - https://example.org/1"));
        // duplicate URL is listed once
        assert!(!report.contains("[2]"));

        let compose_prompt = &provider.requests()[1][1].content;
        assert!(compose_prompt.contains("Finding 1"));
    }

    #[tokio::test]
    async fn test_no_hits_yields_none() {
        let provider = Arc::new(MockProvider::scripted(vec!["q".into()]));
        let pipeline = LlmResearchPipeline::new(
            provider,
            Arc::new(StaticSearch::new(Vec::new())),
            ResearchSettings::default(),
        );

        let result = pipeline
            .run(&ResearchRequest::new("rare question", ReportType::ResearchReport))
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_all_searches_failing_is_external_failure() {
        let provider = Arc::new(MockProvider::failing("planner offline"));
        let pipeline = LlmResearchPipeline::new(
            provider,
            Arc::new(StaticSearch::failing("search offline")),
            ResearchSettings::default(),
        );

        let err = pipeline
            .run(&ResearchRequest::new("question", ReportType::ResearchReport))
            .await
            .unwrap_err();
        assert!(matches!(err, AdvisorError::ExternalService(_)));
    }

    #[tokio::test]
    async fn test_empty_composition_yields_none() {
        let provider = Arc::new(MockProvider::scripted(vec!["".into(), "   ".into()]));
        let pipeline = LlmResearchPipeline::new(
            provider,
            Arc::new(StaticSearch::new(vec![hit(1)])),
            ResearchSettings::default(),
        );

        let result = pipeline
            .run(&ResearchRequest::new("question", ReportType::OutlineReport))
            .await
            .unwrap();
        assert!(result.is_none());
    }
}
