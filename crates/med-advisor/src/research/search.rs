//! Web Search Backends
//!
//! Evidence gathering for the research pipeline.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{AdvisorError, Result};

const TAVILY_URL: &str = "https://api.tavily.com/search";

/// One search result
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub content: String,
}

/// Search backend trait
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>>;

    fn name(&self) -> &str;
}

/// Tavily web search (the default retriever of most research agents)
pub struct TavilySearch {
    http: reqwest::Client,
    api_key: String,
    url: String,
}

#[derive(Serialize)]
struct TavilyRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    max_results: usize,
    search_depth: &'static str,
}

#[derive(Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Deserialize)]
struct TavilyResult {
    #[serde(default)]
    title: String,
    url: String,
    #[serde(default)]
    content: String,
}

impl TavilySearch {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| AdvisorError::Config(e.to_string()))?;

        Ok(Self {
            http,
            api_key: api_key.into(),
            url: TAVILY_URL.into(),
        })
    }

    pub fn from_env() -> Result<Self> {
        let key = std::env::var("TAVILY_API_KEY")
            .map_err(|_| AdvisorError::Config("TAVILY_API_KEY is not set".into()))?;
        Self::new(key)
    }

    fn convert(response: TavilyResponse) -> Vec<SearchHit> {
        response
            .results
            .into_iter()
            .filter(|r| !r.content.trim().is_empty())
            .map(|r| SearchHit {
                title: r.title,
                url: r.url,
                content: r.content,
            })
            .collect()
    }
}

#[async_trait]
impl SearchBackend for TavilySearch {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>> {
        let response = self
            .http
            .post(&self.url)
            .json(&TavilyRequest {
                api_key: &self.api_key,
                query,
                max_results,
                search_depth: "advanced",
            })
            .send()
            .await
            .map_err(|e| AdvisorError::ExternalService(format!("search request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AdvisorError::ExternalService(format!(
                "search returned HTTP {}",
                response.status().as_u16()
            )));
        }

        let body: TavilyResponse = response
            .json()
            .await
            .map_err(|e| AdvisorError::ExternalService(format!("bad search response: {}", e)))?;

        Ok(Self::convert(body))
    }

    fn name(&self) -> &str {
        "Tavily"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_skips_empty_content() {
        let raw = r#"{"results": [
            {"title": "ADA guidelines", "url": "https://diabetes.org/a", "content": "HbA1c >= 6.5%"},
            {"title": "Empty", "url": "https://example.org/b", "content": "  "}
        ]}"#;
        let response: TavilyResponse = serde_json::from_str(raw).unwrap();
        let hits = TavilySearch::convert(response);

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].url, "https://diabetes.org/a");
    }
}
