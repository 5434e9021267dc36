use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use metabot_core::errors::APOLOGY_MESSAGE;
use metabot_core::{InterfaceError, PriorMessage, Role};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::platform::{ChatPlatform, PlatformError, ThreadMessage};

pub const PROCESSING_REACTION: &str = "eyes";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlackEnvelope {
    pub envelope_id: String,
    pub event: SlackEvent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlackEvent {
    AppMention(MessageEvent),
    DirectMessage(MessageEvent),
    Unsupported { event_type: String },
}

impl SlackEvent {
    pub fn event_type(&self) -> SlackEventType {
        match self {
            Self::AppMention(_) => SlackEventType::AppMention,
            Self::DirectMessage(_) => SlackEventType::DirectMessage,
            Self::Unsupported { .. } => SlackEventType::Unsupported,
        }
    }

    pub fn message(&self) -> Option<&MessageEvent> {
        match self {
            Self::AppMention(event) | Self::DirectMessage(event) => Some(event),
            Self::Unsupported { .. } => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SlackEventType {
    AppMention,
    DirectMessage,
    Unsupported,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageEvent {
    pub channel_id: String,
    pub user_id: String,
    pub text: String,
    pub ts: String,
    pub thread_ts: Option<String>,
    pub bot_id: Option<String>,
}

impl MessageEvent {
    /// Replies go to the existing thread, or start one under this message.
    pub fn thread_key(&self) -> &str {
        self.thread_ts.as_deref().unwrap_or(&self.ts)
    }

    pub fn question(&self) -> String {
        strip_mentions(&self.text)
    }

    pub fn is_from_bot(&self) -> bool {
        self.bot_id.is_some()
    }
}

/// Removes `<@U123>` user mentions.
pub fn strip_mentions(text: &str) -> String {
    let mut stripped = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("<@") {
        stripped.push_str(&rest[..start]);
        match rest[start..].find('>') {
            Some(end) => rest = &rest[start + end + 1..],
            None => {
                stripped.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    stripped.push_str(rest);
    stripped.trim().to_owned()
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    Answered { chunks: usize },
    Ignored,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventHandlerError {
    #[error(transparent)]
    Platform(#[from] PlatformError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] EventHandlerError),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> SlackEventType;
    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<SlackEventType, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.event_type(), Arc::new(handler));
    }

    pub async fn dispatch(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        let Some(handler) = self.handlers.get(&envelope.event.event_type()) else {
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(envelope, ctx).await.map_err(DispatchError::from)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

/// Mentions and direct messages both go to the same question service.
pub fn question_dispatcher(
    service: Arc<dyn QuestionService>,
    platform: Arc<dyn ChatPlatform>,
    history_limit: usize,
) -> EventDispatcher {
    let mut dispatcher = EventDispatcher::new();
    for event_type in [SlackEventType::AppMention, SlackEventType::DirectMessage] {
        dispatcher.register(QuestionHandler::new(
            event_type,
            service.clone(),
            platform.clone(),
            history_limit,
        ));
    }
    dispatcher
}

/// What the answering side receives for one user message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Question {
    /// `channel:thread_ts`, unique per conversation thread.
    pub thread_key: String,
    pub text: String,
    pub prior: Vec<PriorMessage>,
    pub correlation_id: String,
}

#[async_trait]
pub trait QuestionService: Send + Sync {
    /// Returns the answer as ordered chunks ready to post.
    async fn answer(&self, question: &Question) -> Result<Vec<String>, InterfaceError>;
}

pub struct QuestionHandler {
    event_type: SlackEventType,
    service: Arc<dyn QuestionService>,
    platform: Arc<dyn ChatPlatform>,
    history_limit: usize,
}

impl QuestionHandler {
    pub fn new(
        event_type: SlackEventType,
        service: Arc<dyn QuestionService>,
        platform: Arc<dyn ChatPlatform>,
        history_limit: usize,
    ) -> Self {
        Self { event_type, service, platform, history_limit }
    }

    async fn prior_messages(&self, event: &MessageEvent, ctx: &EventContext) -> Vec<PriorMessage> {
        let Some(thread_ts) = event.thread_ts.as_deref() else {
            return Vec::new();
        };

        let messages = match self.platform.thread_messages(&event.channel_id, thread_ts).await {
            Ok(messages) => messages,
            Err(error) => {
                warn!(
                    event_name = "slack.history.failed",
                    correlation_id = %ctx.correlation_id,
                    thread_id = thread_ts,
                    error = %error,
                    "could not load thread history; answering without it"
                );
                return Vec::new();
            }
        };

        let prior: Vec<PriorMessage> = messages
            .iter()
            .filter(|message| message.ts != event.ts)
            .filter_map(history_entry)
            .collect();
        let skip = prior.len().saturating_sub(self.history_limit);
        prior.into_iter().skip(skip).collect()
    }
}

fn history_entry(message: &ThreadMessage) -> Option<PriorMessage> {
    let text = strip_mentions(&message.text);
    if text.is_empty() {
        return None;
    }
    let role = if message.bot_id.is_some() { Role::Assistant } else { Role::User };
    Some(PriorMessage::new(role, text))
}

#[async_trait]
impl EventHandler for QuestionHandler {
    fn event_type(&self) -> SlackEventType {
        self.event_type
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let Some(event) = envelope.event.message() else {
            return Ok(HandlerResult::Ignored);
        };
        if event.is_from_bot() {
            debug!(correlation_id = %ctx.correlation_id, "ignoring bot message");
            return Ok(HandlerResult::Ignored);
        }
        let text = event.question();
        if text.is_empty() {
            return Ok(HandlerResult::Ignored);
        }

        let thread_ts = event.thread_key().to_owned();
        if let Err(error) =
            self.platform.add_reaction(&event.channel_id, &event.ts, PROCESSING_REACTION).await
        {
            warn!(
                event_name = "slack.reaction.failed",
                correlation_id = %ctx.correlation_id,
                error = %error,
                "failed to add processing reaction"
            );
        }

        let question = Question {
            thread_key: format!("{}:{}", event.channel_id, thread_ts),
            prior: self.prior_messages(event, ctx).await,
            text,
            correlation_id: ctx.correlation_id.clone(),
        };

        let chunks = match self.service.answer(&question).await {
            Ok(chunks) if !chunks.is_empty() => chunks,
            Ok(_) => vec![APOLOGY_MESSAGE.to_owned()],
            Err(error) => {
                warn!(
                    event_name = "slack.answer.failed",
                    correlation_id = error.correlation_id(),
                    thread_id = %thread_ts,
                    error = %error,
                    "question service failed"
                );
                vec![error.user_message().to_owned()]
            }
        };

        for chunk in &chunks {
            self.platform.post_message(&event.channel_id, &thread_ts, chunk).await?;
        }
        info!(
            event_name = "slack.answer.posted",
            correlation_id = %ctx.correlation_id,
            thread_id = %thread_ts,
            chunks = chunks.len(),
            "posted answer"
        );

        Ok(HandlerResult::Answered { chunks: chunks.len() })
    }
}
