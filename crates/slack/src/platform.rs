use async_trait::async_trait;
use thiserror::Error;

/// A message already posted in a thread.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ThreadMessage {
    pub ts: String,
    pub user_id: Option<String>,
    /// Set when a bot (including this one) posted the message.
    pub bot_id: Option<String>,
    pub text: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlatformError {
    #[error("slack call `{method}` failed: {message}")]
    Api { method: &'static str, message: String },
}

/// Outbound Web API calls the bot makes while answering.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    async fn thread_messages(
        &self,
        channel_id: &str,
        thread_ts: &str,
    ) -> Result<Vec<ThreadMessage>, PlatformError>;

    async fn add_reaction(
        &self,
        channel_id: &str,
        message_ts: &str,
        name: &str,
    ) -> Result<(), PlatformError>;

    async fn post_message(
        &self,
        channel_id: &str,
        thread_ts: &str,
        text: &str,
    ) -> Result<(), PlatformError>;
}

#[derive(Default)]
pub struct NoopChatPlatform;

#[async_trait]
impl ChatPlatform for NoopChatPlatform {
    async fn thread_messages(
        &self,
        _channel_id: &str,
        _thread_ts: &str,
    ) -> Result<Vec<ThreadMessage>, PlatformError> {
        Ok(Vec::new())
    }

    async fn add_reaction(
        &self,
        _channel_id: &str,
        _message_ts: &str,
        _name: &str,
    ) -> Result<(), PlatformError> {
        Ok(())
    }

    async fn post_message(
        &self,
        _channel_id: &str,
        _thread_ts: &str,
        _text: &str,
    ) -> Result<(), PlatformError> {
        Ok(())
    }
}
