use metabot_core::config::AgentConfig;
use metabot_core::{PriorMessage, Turn};

use crate::prompts::question_turn;

/// Round thresholds. `soft` asks the model to wrap up; `hard` forces a final answer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RoundLimits {
    pub soft: u32,
    pub hard: u32,
}

impl Default for RoundLimits {
    fn default() -> Self {
        Self { soft: 25, hard: 50 }
    }
}

impl RoundLimits {
    pub fn from_config(config: &AgentConfig) -> Self {
        Self { soft: config.soft_round_limit, hard: config.hard_round_limit }
    }

    pub fn is_soft_limit(&self, rounds: u32) -> bool {
        rounds == self.soft
    }

    pub fn is_hard_limit(&self, rounds: u32) -> bool {
        rounds >= self.hard
    }
}

/// Working state for one question in one thread. Lives only until the answer is delivered.
#[derive(Clone, Debug)]
pub struct Session {
    thread_key: String,
    transcript: Vec<Turn>,
    rounds: u32,
    terminal: bool,
}

impl Session {
    /// Seeds the transcript with a single user turn carrying history and question.
    pub fn begin(thread_key: impl Into<String>, prior: &[PriorMessage], question: &str) -> Self {
        Self {
            thread_key: thread_key.into(),
            transcript: vec![Turn::user(question_turn(prior, question))],
            rounds: 0,
            terminal: false,
        }
    }

    pub fn thread_key(&self) -> &str {
        &self.thread_key
    }

    pub fn transcript(&self) -> &[Turn] {
        &self.transcript
    }

    pub fn rounds(&self) -> u32 {
        self.rounds
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    pub fn append_turn(&mut self, turn: Turn) {
        self.transcript.push(turn);
    }

    pub fn increment_round(&mut self) -> u32 {
        self.rounds = self.rounds.saturating_add(1);
        self.rounds
    }

    pub fn mark_terminal(&mut self) {
        self.terminal = true;
    }

    /// True once any assistant turn has asked for a tool.
    pub fn used_tools(&self) -> bool {
        self.transcript.iter().any(Turn::requests_tools)
    }
}

#[cfg(test)]
mod tests {
    use metabot_core::{PriorMessage, Role, ToolCall, Turn};
    use serde_json::json;

    use super::{RoundLimits, Session};

    #[test]
    fn begin_seeds_one_user_turn() {
        let session = Session::begin(
            "C1:1700000000.0001",
            &[PriorMessage::new(Role::User, "hi")],
            "who owns ORDERS?",
        );
        assert_eq!(session.thread_key(), "C1:1700000000.0001");
        assert_eq!(session.transcript().len(), 1);
        assert_eq!(session.transcript()[0].role, Role::User);
        assert!(session.transcript()[0].content.contains("who owns ORDERS?"));
        assert_eq!(session.rounds(), 0);
        assert!(!session.is_terminal());
        assert!(!session.used_tools());
    }

    #[test]
    fn rounds_only_go_up() {
        let mut session = Session::begin("t", &[], "q");
        assert_eq!(session.increment_round(), 1);
        assert_eq!(session.increment_round(), 2);
        assert_eq!(session.rounds(), 2);
    }

    #[test]
    fn tool_requests_are_detected_in_transcript() {
        let mut session = Session::begin("t", &[], "q");
        session.append_turn(Turn::assistant(
            "",
            vec![ToolCall::new("toolu_1", "list_data_sources", json!({}))],
        ));
        assert!(session.used_tools());
    }

    #[test]
    fn limits_fire_at_their_thresholds() {
        let limits = RoundLimits::default();
        assert!(!limits.is_soft_limit(24));
        assert!(limits.is_soft_limit(25));
        assert!(!limits.is_soft_limit(26));
        assert!(!limits.is_hard_limit(49));
        assert!(limits.is_hard_limit(50));
        assert!(limits.is_hard_limit(51));
    }
}
