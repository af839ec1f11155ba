//! Consultations
//!
//! A [`Consultation`] is one doctor-initiated conversation: its own
//! orchestrating agent, tools and [`CaseContext`]. The
//! [`ConsultationManager`] keys them by session id.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use agent_core::{
    provider::GenerationOptions,
    reasoning::AgentBuilder,
    Agent, AgentResponse, Attachment, Conversation, LlmProvider, Message, RunError, SessionId,
    ToolRegistry,
};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

use crate::case::CaseContext;
use crate::config::AdvisorConfig;
use crate::decision::DecisionReport;
use crate::error::{AdvisorError, Result};
use crate::research::ResearchPipeline;
use crate::svckit::{DecisionTool, ResearchTool, ResultsRetrievalTool};
use crate::workflow::{ConsultationStep, WorkflowSnapshot};
use crate::MEDICAL_ASSISTANT_PROMPT;

const DECISION_TOOL: &str = "decision_maker";

/// Answer to one doctor turn
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConsultationReply {
    pub session_id: String,

    /// Text shown to the doctor
    pub message: String,

    /// Whether `message` is a decision report
    pub decided: bool,

    /// Tools invoked during the turn, in call order
    pub tools: Vec<String>,

    pub step: ConsultationStep,
}

/// Shared collaborators for every consultation
#[derive(Clone)]
pub struct Collaborators {
    /// Model driving the tool-calling conversation
    pub agent_provider: Arc<dyn LlmProvider>,
    /// Model behind the decision reasoning session
    pub decision_provider: Arc<dyn LlmProvider>,
    pub pipeline: Arc<dyn ResearchPipeline>,
}

impl Collaborators {
    /// Same provider for orchestration and decisions
    pub fn new(provider: Arc<dyn LlmProvider>, pipeline: Arc<dyn ResearchPipeline>) -> Self {
        Self {
            agent_provider: provider.clone(),
            decision_provider: provider,
            pipeline,
        }
    }
}

pub struct Consultation {
    case: Arc<CaseContext>,
    agent: Agent,
    conversation: Mutex<Conversation>,
}

impl Consultation {
    pub fn new(id: SessionId, collaborators: &Collaborators, config: &AdvisorConfig) -> Result<Self> {
        let case = Arc::new(CaseContext::new(
            id,
            collaborators.decision_provider.clone(),
            config,
        ));

        let mut tools = ToolRegistry::new();
        tools.register(ResearchTool::new(
            case.clone(),
            collaborators.pipeline.clone(),
            config.research_timeout,
            config.report_type,
        ));
        tools.register(ResultsRetrievalTool::new(case.clone()));
        tools.register(DecisionTool::new(case.clone()));

        let agent = AgentBuilder::new()
            .provider(collaborators.agent_provider.clone())
            .tools(tools)
            .system_prompt(MEDICAL_ASSISTANT_PROMPT)
            .generation(GenerationOptions::for_model(config.agent_model.clone()))
            .max_iterations(config.max_iterations)
            .build()?;

        let conversation = Conversation::with_system_prompt(agent.build_system_prompt());
        tracing::info!(session = %case.id(), "Consultation opened");

        Ok(Self {
            case,
            agent,
            conversation: Mutex::new(conversation),
        })
    }

    pub fn id(&self) -> &SessionId {
        self.case.id()
    }

    pub fn case(&self) -> &Arc<CaseContext> {
        &self.case
    }

    /// Run one doctor turn through the agent
    ///
    /// When the decision tool succeeded during the turn, the reply is that
    /// decision's plain text rather than the model's own wording, even if
    /// the agent failed after the decision was made. A turn that fails
    /// without a decision is removed from the conversation.
    pub async fn send(&self, message: &str, attachments: Vec<Attachment>) -> Result<ConsultationReply> {
        self.case.ensure_active()?;
        if message.trim().is_empty() && attachments.is_empty() {
            return Err(AdvisorError::MissingInput("message"));
        }

        let mut conversation = self.conversation.lock().await;
        self.case.touch();
        self.case.workflow().observe_turn(message, &attachments);
        tracing::info!(
            session = %self.id(),
            attachments = attachments.len(),
            "Doctor turn"
        );

        conversation.push(Message::user(message).with_attachments(attachments));
        conversation.truncate_to_fit();
        let turn_start = conversation.len().saturating_sub(1);

        let (response, decision) = match self.agent.run(&mut conversation).await {
            Ok(response) => {
                let decision = decision_of(&response);
                (response, decision)
            }
            Err(RunError { error, partial }) => match decision_of(&partial) {
                Some(report) => {
                    tracing::warn!(
                        session = %self.id(),
                        error = %error,
                        "Agent stopped after a decision; presenting it"
                    );
                    conversation.push(Message::assistant(report.to_plain_text()));
                    (partial, Some(report))
                }
                None => {
                    conversation.messages_mut().truncate(turn_start);
                    tracing::error!(session = %self.id(), error = %error, "Agent run failed");
                    return Err(AdvisorError::from(error));
                }
            },
        };
        self.case.ensure_active()?;
        self.case.touch();

        let (text, decided) = match decision {
            Some(report) => {
                self.case.workflow().mark_presented();
                (report.to_plain_text(), true)
            }
            None => (response.content.trim().to_string(), false),
        };

        Ok(ConsultationReply {
            session_id: self.id().to_string(),
            message: text,
            decided,
            tools: response.tool_names(),
            step: self.case.workflow().current(),
        })
    }

    /// Contents of this consultation's research store
    pub async fn results(&self) -> Result<BTreeMap<String, String>> {
        self.case.ensure_active()?;
        Ok(self.case.store().read_all().await)
    }

    pub fn workflow(&self) -> WorkflowSnapshot {
        self.case.workflow().snapshot()
    }
}

/// Report of the last successful decision tool call in a run
fn decision_of(response: &AgentResponse) -> Option<DecisionReport> {
    response
        .last_success(DECISION_TOOL)
        .and_then(|inv| inv.result.data.clone())
        .and_then(|data| serde_json::from_value::<DecisionReport>(data).ok())
}

/// Consultations keyed by session id
///
/// Consultations idle past `session_idle_timeout` are ended, and at most
/// `max_sessions` are kept live. Ended ids are refused for one idle period
/// after they end.
pub struct ConsultationManager {
    collaborators: Collaborators,
    config: AdvisorConfig,
    sessions: RwLock<HashMap<SessionId, Arc<Consultation>>>,
    ended: RwLock<HashMap<SessionId, Instant>>,
}

impl ConsultationManager {
    pub fn new(collaborators: Collaborators, config: AdvisorConfig) -> Self {
        Self {
            collaborators,
            config,
            sessions: RwLock::new(HashMap::new()),
            ended: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &AdvisorConfig {
        &self.config
    }

    /// Start a consultation with a fresh id
    pub async fn open(&self) -> Result<Arc<Consultation>> {
        self.evict_idle().await;
        let id = SessionId::new();
        let consultation = Arc::new(Consultation::new(id.clone(), &self.collaborators, &self.config)?);

        let displaced = {
            let mut sessions = self.sessions.write().await;
            let displaced = self.make_room(&mut sessions);
            sessions.insert(id, consultation.clone());
            displaced
        };
        self.retire(displaced, "capacity").await;
        Ok(consultation)
    }

    /// Existing consultation for `id`, a new one under that id, or a fresh one without an id
    ///
    /// Ids of ended consultations are refused while their end is remembered.
    pub async fn get_or_open(&self, id: Option<&str>) -> Result<Arc<Consultation>> {
        let Some(raw) = id.map(str::trim).filter(|s| !s.is_empty()) else {
            return self.open().await;
        };
        let id = SessionId::from_string(raw);
        self.evict_idle().await;

        if self.ended.read().await.contains_key(&id) {
            return Err(AdvisorError::StaleSession(id.to_string()));
        }
        if let Some(existing) = self.sessions.read().await.get(&id) {
            return Ok(existing.clone());
        }

        let (consultation, displaced) = {
            let mut sessions = self.sessions.write().await;
            if let Some(existing) = sessions.get(&id) {
                return Ok(existing.clone());
            }
            let consultation = Arc::new(Consultation::new(id.clone(), &self.collaborators, &self.config)?);
            let displaced = self.make_room(&mut sessions);
            sessions.insert(id, consultation.clone());
            (consultation, displaced)
        };
        self.retire(displaced, "capacity").await;
        Ok(consultation)
    }

    pub async fn get(&self, id: &str) -> Option<Arc<Consultation>> {
        self.evict_idle().await;
        self.sessions.read().await.get(&SessionId::from_string(id)).cloned()
    }

    /// End a consultation, dropping its store and reasoning history
    pub async fn end(&self, id: &str) -> Result<()> {
        let id = SessionId::from_string(id);
        let removed = self.sessions.write().await.remove(&id);

        match removed {
            Some(consultation) => {
                self.retire(vec![consultation], "ended").await;
                Ok(())
            }
            None => Err(AdvisorError::StaleSession(id.to_string())),
        }
    }

    /// Research results of one live consultation
    pub async fn results(&self, id: &str) -> Result<BTreeMap<String, String>> {
        match self.get(id).await {
            Some(consultation) => consultation.results().await,
            None => Err(AdvisorError::StaleSession(id.to_string())),
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// End consultations idle past the timeout and forget old end markers
    async fn evict_idle(&self) {
        let timeout = self.config.session_idle_timeout;

        let idle: Vec<_> = {
            let mut sessions = self.sessions.write().await;
            let expired: Vec<SessionId> = sessions
                .iter()
                .filter(|(_, c)| c.case().idle_for() > timeout)
                .map(|(id, _)| id.clone())
                .collect();
            expired.iter().filter_map(|id| sessions.remove(id)).collect()
        };
        self.retire(idle, "idle").await;

        self.ended
            .write()
            .await
            .retain(|_, ended_at| ended_at.elapsed() <= timeout);
    }

    /// Remove least recently active consultations until one more fits
    fn make_room(&self, sessions: &mut HashMap<SessionId, Arc<Consultation>>) -> Vec<Arc<Consultation>> {
        let mut displaced = Vec::new();
        while !sessions.is_empty() && sessions.len() >= self.config.max_sessions {
            let oldest = sessions
                .iter()
                .min_by_key(|(_, c)| c.case().last_active())
                .map(|(id, _)| id.clone());
            match oldest.and_then(|id| sessions.remove(&id)) {
                Some(consultation) => displaced.push(consultation),
                None => break,
            }
        }
        displaced
    }

    /// End removed consultations and remember their ids
    async fn retire(&self, consultations: Vec<Arc<Consultation>>, reason: &'static str) {
        if consultations.is_empty() {
            return;
        }

        let now = Instant::now();
        for consultation in &consultations {
            consultation.case().end().await;
            tracing::info!(session = %consultation.id(), reason, "Consultation closed");
        }

        let mut ended = self.ended.write().await;
        for consultation in consultations {
            ended.insert(consultation.id().clone(), now);
        }
        while ended.len() > self.config.max_sessions {
            let oldest = ended.iter().min_by_key(|(_, at)| **at).map(|(id, _)| id.clone());
            match oldest {
                Some(id) => {
                    ended.remove(&id);
                }
                None => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::research::StaticResearchPipeline;
    use agent_core::mock::MockProvider;
    use agent_core::{AttachmentKind, Role};
    use std::time::Duration;

    fn tool_block(tool: &str, args: serde_json::Value) -> String {
        format!(
            "```tool\n{}\n```",
            serde_json::json!({ "tool": tool, "arguments": args })
        )
    }

    /// Orchestrating model that follows the routine: research, decide, then paraphrase
    fn routine_model() -> Arc<MockProvider> {
        Arc::new(MockProvider::from_fn(|messages| {
            let last = messages.last().map(|m| (m.role.clone(), m.content.clone()));
            let query = messages
                .iter()
                .rev()
                .find(|m| m.role == Role::User)
                .map(|m| m.content.clone())
                .unwrap_or_default();

            match last {
                Some((Role::User, _)) => tool_block("research", serde_json::json!({ "query": query })),
                Some((Role::Tool, content)) if content.starts_with("[Tool 'research' returned]") => {
                    let research = content.lines().skip(1).collect::<Vec<_>>().join("\n");
                    tool_block(
                        "decision_maker",
                        serde_json::json!({
                            "doctor_query": query,
                            "symptoms": "fatigue, weight loss, increased thirst",
                            "research_result": research,
                        }),
                    )
                }
                _ => "In my own words: probably diabetes.".into(),
            }
        }))
    }

    fn decision_model() -> Arc<MockProvider> {
        Arc::new(MockProvider::from_fn(|messages| {
            let prompt = messages.last().map(|m| m.content.clone()).unwrap_or_default();
            let research = prompt
                .split("### Research result\n")
                .nth(1)
                .and_then(|rest| rest.lines().next())
                .unwrap_or("none")
                .to_string();
            format!(
                "### UNDERSTANDING\n**Fatigue** with weight loss.\n### INPUT BREAKDOWN\nSymptoms and research.\n### UNCERTAINTY\nNo labs.\n### RECOMMENDATION\nOrder HbA1c, per {}",
                research
            )
        }))
    }

    fn manager(pipeline: StaticResearchPipeline) -> ConsultationManager {
        let collaborators = Collaborators {
            agent_provider: routine_model(),
            decision_provider: decision_model(),
            pipeline: Arc::new(pipeline),
        };
        ConsultationManager::new(collaborators, AdvisorConfig::default())
    }

    #[tokio::test]
    async fn test_presents_only_decision_text() {
        let manager = manager(StaticResearchPipeline::echo());
        let consultation = manager.open().await.unwrap();

        let reply = consultation.send("fatigue and weight loss", Vec::new()).await.unwrap();

        assert!(reply.decided);
        assert_eq!(reply.tools, vec!["research".to_string(), "decision_maker".to_string()]);
        assert_eq!(reply.step, ConsultationStep::Presenting);
        assert!(!reply.message.contains("In my own words"));
        assert!(!reply.message.contains("**"));
        assert!(reply.message.contains("Order HbA1c, per report for fatigue and weight loss"));
        assert!(reply.message.contains("no image analysis provided"));
        assert!(reply.message.contains("no document analysis provided"));
    }

    #[tokio::test]
    async fn test_failed_research_blocks_decision() {
        let manager = manager(StaticResearchPipeline::empty());
        let consultation = manager.open().await.unwrap();

        let reply = consultation.send("fatigue and weight loss", Vec::new()).await.unwrap();

        assert!(!reply.decided);
        assert_eq!(reply.message, "In my own words: probably diabetes.");
        assert!(consultation.results().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_turn_is_missing_input() {
        let manager = manager(StaticResearchPipeline::echo());
        let consultation = manager.open().await.unwrap();

        let err = consultation.send("  ", Vec::new()).await.unwrap_err();
        assert!(matches!(err, AdvisorError::MissingInput("message")));
    }

    #[tokio::test]
    async fn test_attachment_only_turn_is_accepted() {
        let manager = manager(StaticResearchPipeline::echo());
        let consultation = manager.open().await.unwrap();
        let scan = Attachment::new(AttachmentKind::Image, "scan.png", "image/png", "aGVsbG8=");

        consultation.send("", vec![scan]).await.unwrap();
        assert!(consultation
            .workflow()
            .completed
            .contains(&ConsultationStep::CollectingImages));
    }

    #[tokio::test]
    async fn test_concurrent_sessions_are_isolated() {
        let manager = Arc::new(manager(StaticResearchPipeline::echo()));
        let a = manager.get_or_open(Some("session-a")).await.unwrap();
        let b = manager.get_or_open(Some("session-b")).await.unwrap();

        let (ra, rb) = tokio::join!(
            a.send("polyuria in a 50 year old", Vec::new()),
            b.send("chest pain on exertion", Vec::new()),
        );
        ra.unwrap();
        rb.unwrap();

        let results_a = manager.results("session-a").await.unwrap();
        let results_b = manager.results("session-b").await.unwrap();
        assert_eq!(results_a["research"], "report for polyuria in a 50 year old");
        assert_eq!(results_b["research"], "report for chest pain on exertion");
        assert!(!results_a.values().any(|v| v.contains("chest pain")));
    }

    #[tokio::test]
    async fn test_get_or_open_reuses_session() {
        let manager = manager(StaticResearchPipeline::echo());
        let first = manager.get_or_open(Some("case-7")).await.unwrap();
        let again = manager.get_or_open(Some("case-7")).await.unwrap();

        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(manager.len().await, 1);
    }

    #[tokio::test]
    async fn test_ended_session_is_stale() {
        let manager = manager(StaticResearchPipeline::echo());
        let consultation = manager.get_or_open(Some("case-9")).await.unwrap();
        consultation.send("fatigue", Vec::new()).await.unwrap();

        manager.end("case-9").await.unwrap();

        let err = consultation.send("follow-up", Vec::new()).await.unwrap_err();
        assert_eq!(err.code(), "stale_session");
        assert!(matches!(
            manager.get_or_open(Some("case-9")).await,
            Err(AdvisorError::StaleSession(_))
        ));
        assert!(manager.results("case-9").await.is_err());
        assert!(manager.end("case-9").await.is_err());
        assert!(manager.is_empty().await);
    }

    #[tokio::test]
    async fn test_model_outage_is_external_failure() {
        let collaborators = Collaborators::new(
            Arc::new(MockProvider::failing("connection refused")),
            Arc::new(StaticResearchPipeline::echo()),
        );
        let manager = ConsultationManager::new(collaborators, AdvisorConfig::default());
        let consultation = manager.open().await.unwrap();

        let err = consultation.send("fatigue", Vec::new()).await.unwrap_err();
        assert_eq!(err.code(), "external_service_failure");
        assert!(!err.user_message().contains("connection refused"));
    }

    fn manager_with(agent: Arc<MockProvider>, config: AdvisorConfig) -> ConsultationManager {
        let collaborators = Collaborators {
            agent_provider: agent,
            decision_provider: decision_model(),
            pipeline: Arc::new(StaticResearchPipeline::echo()),
        };
        ConsultationManager::new(collaborators, config)
    }

    async fn roles(consultation: &Consultation) -> Vec<Role> {
        consultation
            .conversation
            .lock()
            .await
            .messages()
            .iter()
            .map(|m| m.role.clone())
            .collect()
    }

    #[tokio::test]
    async fn test_decision_is_presented_when_model_fails_afterwards() {
        // The model has no reply left once the decision tool has run
        let agent = Arc::new(MockProvider::scripted(vec![
            tool_block("research", serde_json::json!({ "query": "fatigue and weight loss" })),
            tool_block(
                "decision_maker",
                serde_json::json!({
                    "doctor_query": "fatigue and weight loss",
                    "symptoms": "fatigue, weight loss, increased thirst",
                }),
            ),
        ]));
        let manager = manager_with(agent, AdvisorConfig::default());
        let consultation = manager.open().await.unwrap();

        let reply = consultation.send("fatigue and weight loss", Vec::new()).await.unwrap();

        assert!(reply.decided);
        assert!(reply.message.contains("Order HbA1c, per report for fatigue and weight loss"));
        assert_eq!(reply.step, ConsultationStep::Presenting);
        assert_eq!(consultation.workflow().decisions, 1);
        assert_eq!(
            roles(&consultation).await,
            vec![
                Role::System,
                Role::User,
                Role::Assistant,
                Role::Tool,
                Role::Assistant,
                Role::Tool,
                Role::Assistant,
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_turn_is_removed_from_conversation() {
        let agent = Arc::new(MockProvider::scripted(vec![tool_block(
            "research",
            serde_json::json!({ "query": "fatigue" }),
        )]));
        let manager = manager_with(agent, AdvisorConfig::default());
        let consultation = manager.open().await.unwrap();

        let err = consultation.send("fatigue", Vec::new()).await.unwrap_err();

        assert_eq!(err.code(), "external_service_failure");
        assert_eq!(roles(&consultation).await, vec![Role::System]);
    }

    #[tokio::test]
    async fn test_step_limit_has_its_own_failure() {
        let agent = Arc::new(MockProvider::from_fn(|_| {
            tool_block("retrieve_tool_results", serde_json::json!({}))
        }));
        let config = AdvisorConfig {
            max_iterations: 2,
            ..AdvisorConfig::default()
        };
        let manager = manager_with(agent, config);
        let consultation = manager.open().await.unwrap();

        let err = consultation.send("fatigue", Vec::new()).await.unwrap_err();

        assert!(matches!(err, AdvisorError::StepLimit(2)));
        assert_eq!(roles(&consultation).await, vec![Role::System]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_sessions_are_ended() {
        let config = AdvisorConfig {
            session_idle_timeout: Duration::from_secs(60),
            ..AdvisorConfig::default()
        };
        let manager = manager_with(routine_model(), config);
        let idle = manager.get_or_open(Some("case-idle")).await.unwrap();

        tokio::time::advance(Duration::from_secs(61)).await;
        let fresh = manager.get_or_open(Some("case-fresh")).await.unwrap();

        assert_eq!(manager.len().await, 1);
        assert!(manager.get("case-idle").await.is_none());
        assert_eq!(idle.send("still there?", Vec::new()).await.unwrap_err().code(), "stale_session");
        assert!(matches!(
            manager.get_or_open(Some("case-idle")).await,
            Err(AdvisorError::StaleSession(_))
        ));
        assert!(fresh.case().is_active());

        // End markers are dropped after one more idle period
        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(manager.get_or_open(Some("case-idle")).await.is_ok());
        assert_eq!(manager.ended.read().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_ends_least_recently_active() {
        let config = AdvisorConfig {
            max_sessions: 2,
            ..AdvisorConfig::default()
        };
        let manager = manager_with(routine_model(), config);
        let first = manager.get_or_open(Some("case-1")).await.unwrap();
        tokio::time::advance(Duration::from_secs(1)).await;
        let second = manager.get_or_open(Some("case-2")).await.unwrap();
        tokio::time::advance(Duration::from_secs(1)).await;

        first.send("fatigue and weight loss", Vec::new()).await.unwrap();
        tokio::time::advance(Duration::from_secs(1)).await;
        manager.get_or_open(Some("case-3")).await.unwrap();

        assert_eq!(manager.len().await, 2);
        assert!(first.case().is_active());
        assert!(!second.case().is_active());
        assert!(manager.get("case-2").await.is_none());
        assert!(manager.ended.read().await.len() <= 2);
    }
}
