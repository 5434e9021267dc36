use std::sync::Arc;
use std::time::Duration;

use metabot_core::config::AppConfig;
use metabot_core::errors::APOLOGY_MESSAGE;
use metabot_core::{segment, ApplicationError, PriorMessage, RetryPolicy, ToolCall, Turn};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::guardrails::{AnswerCheck, GuardrailPolicy};
use crate::llm::{LlmClient, LlmError, LlmRequest, LlmResponse, ToolChoice, ToolSchema};
use crate::prompts::{SOFT_LIMIT_NUDGE, SYSTEM_PROMPT};
use crate::session::{RoundLimits, Session};
use crate::tools::ToolRegistry;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuntimeSettings {
    pub limits: RoundLimits,
    pub llm_timeout: Duration,
    pub llm_retry: RetryPolicy,
    pub max_chunk_chars: usize,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            limits: RoundLimits::default(),
            llm_timeout: Duration::from_secs(60),
            llm_retry: RetryPolicy::new(3),
            max_chunk_chars: 3_800,
        }
    }
}

impl RuntimeSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            limits: RoundLimits::from_config(&config.agent),
            llm_timeout: Duration::from_secs(config.llm.timeout_secs),
            llm_retry: RetryPolicy::new(config.llm.max_retries.saturating_add(1)),
            max_chunk_chars: config.slack.max_message_chars,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AnswerOutcome {
    /// The model finished on its own.
    Answered,
    /// The hard round limit forced a summary.
    ForcedSummary,
    /// A guardrail replaced the model's text.
    Refused,
    /// The session ended early with an apology.
    Failed,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AgentAnswer {
    pub correlation_id: String,
    pub text: String,
    pub chunks: Vec<String>,
    pub rounds: u32,
    pub llm_calls: u32,
    pub outcome: AnswerOutcome,
}

enum LoopState {
    AwaitingModel,
    DispatchingTools(Vec<ToolCall>),
    Done { text: String, forced: bool },
}

struct Completion {
    text: String,
    outcome: AnswerOutcome,
}

/// Drives one question through model turns and tool rounds until an answer exists.
pub struct AgentRuntime {
    llm: Arc<dyn LlmClient>,
    tools: Arc<ToolRegistry>,
    tool_schemas: Vec<ToolSchema>,
    guardrails: GuardrailPolicy,
    settings: RuntimeSettings,
}

impl AgentRuntime {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        tools: Arc<ToolRegistry>,
        guardrails: GuardrailPolicy,
        settings: RuntimeSettings,
    ) -> Self {
        let tool_schemas = tools.schemas();
        Self { llm, tools, tool_schemas, guardrails, settings }
    }

    pub fn settings(&self) -> &RuntimeSettings {
        &self.settings
    }

    /// Answers a question in a thread. Never fails: faults become an apology.
    pub async fn answer(
        &self,
        thread_key: &str,
        prior: &[PriorMessage],
        question: &str,
    ) -> AgentAnswer {
        let correlation_id = Uuid::new_v4().to_string();
        let mut session = Session::begin(thread_key, prior, question);
        let mut llm_calls = 0_u32;

        let completion = if self.tools.is_empty() {
            let decision = self.guardrails.evaluate(AnswerCheck::ToolsUnavailable);
            warn!(
                event_name = "agent.refused",
                correlation_id = %correlation_id,
                thread_id = %thread_key,
                reason_code = decision.reason_code().unwrap_or_default(),
                "no catalog tools registered"
            );
            Completion {
                text: decision.replacement().unwrap_or(APOLOGY_MESSAGE).to_string(),
                outcome: AnswerOutcome::Refused,
            }
        } else {
            match self.drive(&mut session, &correlation_id, &mut llm_calls).await {
                Ok(completion) => completion,
                Err(fault) => {
                    error!(
                        event_name = "agent.failed",
                        correlation_id = %correlation_id,
                        thread_id = %thread_key,
                        round = session.rounds(),
                        error = %fault,
                        "session ended early"
                    );
                    Completion { text: APOLOGY_MESSAGE.to_string(), outcome: AnswerOutcome::Failed }
                }
            }
        };

        info!(
            event_name = "agent.answered",
            correlation_id = %correlation_id,
            thread_id = %thread_key,
            rounds = session.rounds(),
            llm_calls,
            outcome = ?completion.outcome,
            "answer ready"
        );

        AgentAnswer {
            chunks: segment(&completion.text, self.settings.max_chunk_chars),
            correlation_id,
            text: completion.text,
            rounds: session.rounds(),
            llm_calls,
            outcome: completion.outcome,
        }
    }

    async fn drive(
        &self,
        session: &mut Session,
        correlation_id: &str,
        llm_calls: &mut u32,
    ) -> Result<Completion, ApplicationError> {
        let limits = self.settings.limits;
        let mut state = LoopState::AwaitingModel;

        loop {
            state = match state {
                LoopState::AwaitingModel if limits.is_hard_limit(session.rounds()) => {
                    warn!(
                        event_name = "agent.hard_limit",
                        correlation_id = %correlation_id,
                        round = session.rounds(),
                        "round limit reached, forcing a final answer"
                    );
                    let response = self.call_model(session, ToolChoice::None, llm_calls).await?;
                    LoopState::Done { text: response.text, forced: true }
                }
                LoopState::AwaitingModel => {
                    let tool_choice =
                        if session.rounds() == 0 { ToolChoice::Any } else { ToolChoice::Auto };
                    let response = self.call_model(session, tool_choice, llm_calls).await?;
                    if response.requests_tools() {
                        session.append_turn(Turn::assistant(
                            response.text,
                            response.tool_calls.clone(),
                        ));
                        LoopState::DispatchingTools(response.tool_calls)
                    } else {
                        LoopState::Done { text: response.text, forced: false }
                    }
                }
                LoopState::DispatchingTools(calls) => {
                    let results = self.tools.dispatch(&calls).await;
                    let failed = results.iter().filter(|result| !result.is_success()).count();
                    for result in results {
                        session.append_turn(Turn::tool(result));
                    }
                    let round = session.increment_round();
                    info!(
                        event_name = "agent.round",
                        correlation_id = %correlation_id,
                        thread_id = %session.thread_key(),
                        round,
                        tools = calls.len(),
                        failed,
                        "tool round finished"
                    );
                    if limits.is_soft_limit(round) {
                        session.append_turn(Turn::user(SOFT_LIMIT_NUDGE));
                    }
                    LoopState::AwaitingModel
                }
                LoopState::Done { text, forced } => {
                    session.append_turn(Turn::assistant(text.clone(), Vec::new()));
                    session.mark_terminal();
                    return Ok(self.finish(session, text, forced));
                }
            };
        }
    }

    fn finish(&self, session: &Session, text: String, forced: bool) -> Completion {
        let decision = self.guardrails.evaluate(AnswerCheck::FinalAnswer {
            used_tools: session.used_tools(),
            forced,
            empty: text.trim().is_empty(),
        });

        match decision.replacement() {
            Some(replacement) => {
                warn!(
                    event_name = "agent.guardrail",
                    thread_id = %session.thread_key(),
                    reason_code = decision.reason_code().unwrap_or_default(),
                    "final answer replaced"
                );
                let outcome = if forced { AnswerOutcome::ForcedSummary } else { AnswerOutcome::Refused };
                Completion { text: replacement.to_string(), outcome }
            }
            None if forced => Completion { text, outcome: AnswerOutcome::ForcedSummary },
            None => Completion { text, outcome: AnswerOutcome::Answered },
        }
    }

    /// One model turn with a per-call timeout and bounded retries.
    async fn call_model(
        &self,
        session: &Session,
        tool_choice: ToolChoice,
        llm_calls: &mut u32,
    ) -> Result<LlmResponse, ApplicationError> {
        let request = LlmRequest {
            system: SYSTEM_PROMPT,
            transcript: session.transcript(),
            tools: &self.tool_schemas,
            tool_choice,
        };
        let retry = &self.settings.llm_retry;
        let mut attempts = 0_u32;

        loop {
            attempts += 1;
            *llm_calls += 1;
            let outcome =
                match tokio::time::timeout(self.settings.llm_timeout, self.llm.complete(request)).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(LlmError::Timeout(self.settings.llm_timeout)),
                };

            match outcome {
                Ok(response) => return Ok(response),
                Err(error) if error.is_retryable() && retry.has_attempts_left(attempts) => {
                    let delay = retry.backoff(attempts - 1);
                    warn!(
                        event_name = "llm.retry",
                        thread_id = %session.thread_key(),
                        attempt = attempts,
                        delay = ?delay,
                        error = %error,
                        "retrying model call"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(error) => {
                    return Err(ApplicationError::Orchestration(format!(
                        "model call failed after {attempts} attempt(s): {error}"
                    )))
                }
            }
        }
    }
}
