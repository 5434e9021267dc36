use std::sync::Arc;

use async_trait::async_trait;
use metabot_agent::AgentRuntime;
use metabot_core::InterfaceError;
use metabot_slack::events::{Question, QuestionService};
use tracing::info;

/// Answers chat questions through the agent runtime.
pub struct AgentQuestionService {
    runtime: Arc<AgentRuntime>,
}

impl AgentQuestionService {
    pub fn new(runtime: Arc<AgentRuntime>) -> Self {
        Self { runtime }
    }
}

#[async_trait]
impl QuestionService for AgentQuestionService {
    async fn answer(&self, question: &Question) -> Result<Vec<String>, InterfaceError> {
        let answer = self.runtime.answer(&question.thread_key, &question.prior, &question.text).await;
        info!(
            event_name = "agent.answer.completed",
            correlation_id = %question.correlation_id,
            agent_correlation_id = %answer.correlation_id,
            thread_id = %question.thread_key,
            outcome = ?answer.outcome,
            rounds = answer.rounds,
            llm_calls = answer.llm_calls,
            chunks = answer.chunks.len(),
            "question answered"
        );
        Ok(answer.chunks)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use metabot_agent::{
        AgentRuntime, GuardrailPolicy, LlmClient, LlmError, LlmRequest, LlmResponse,
        RuntimeSettings, ToolRegistry,
    };
    use metabot_catalog::{CatalogError, CatalogLookup, CatalogRequest};
    use metabot_core::{PriorMessage, Role, ToolCall};
    use metabot_slack::events::{Question, QuestionService};
    use serde_json::json;

    use super::AgentQuestionService;

    struct ScriptedLlm {
        replies: Mutex<VecDeque<LlmResponse>>,
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn complete(&self, _request: LlmRequest<'_>) -> Result<LlmResponse, LlmError> {
            self.replies
                .lock()
                .expect("lock")
                .pop_front()
                .ok_or_else(|| LlmError::Decode("script exhausted".to_string()))
        }
    }

    struct StaticCatalog;

    #[async_trait]
    impl CatalogLookup for StaticCatalog {
        async fn lookup(&self, request: &CatalogRequest) -> Result<String, CatalogError> {
            Ok(format!("{} ok", request.operation()))
        }
    }

    fn service(replies: Vec<LlmResponse>) -> AgentQuestionService {
        let llm = Arc::new(ScriptedLlm { replies: Mutex::new(replies.into()) });
        let tools = ToolRegistry::with_catalog_tools(Arc::new(StaticCatalog), Duration::from_secs(1))
            .expect("tools register");
        let runtime = AgentRuntime::new(
            llm,
            Arc::new(tools),
            GuardrailPolicy::default(),
            RuntimeSettings::default(),
        );
        AgentQuestionService::new(Arc::new(runtime))
    }

    fn question(text: &str) -> Question {
        Question {
            thread_key: "C1:1.0".to_string(),
            text: text.to_string(),
            prior: vec![PriorMessage::new(Role::User, "earlier question")],
            correlation_id: "env-1".to_string(),
        }
    }

    #[tokio::test]
    async fn returns_answer_chunks_after_a_lookup() {
        let service = service(vec![
            LlmResponse::tool_calls(
                "",
                vec![ToolCall::new("t1", "list_data_sources", json!({}))],
            ),
            LlmResponse::text("There are two data sources."),
        ]);

        let chunks = service.answer(&question("what sources exist?")).await.expect("answer");

        assert_eq!(chunks, vec!["There are two data sources.".to_string()]);
    }

    #[tokio::test]
    async fn model_failure_still_yields_a_reply() {
        let service = service(Vec::new());

        let chunks = service.answer(&question("anything?")).await.expect("answer");

        assert_eq!(chunks.len(), 1);
        assert!(!chunks[0].is_empty());
    }
}
