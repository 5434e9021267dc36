use crate::prompts::{CATALOG_UNAVAILABLE_MESSAGE, FORCED_STOP_MESSAGE, LOOKUP_REQUIRED_MESSAGE};

/// A point in a session where the runtime asks whether an answer may go out.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AnswerCheck {
    /// No catalog tools are registered, so nothing can be looked up.
    ToolsUnavailable,
    /// The model produced its final text.
    FinalAnswer { used_tools: bool, forced: bool, empty: bool },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardrailDecision {
    Allow,
    Deny { reason_code: &'static str, user_message: String, fallback_path: &'static str },
    Degrade { reason_code: &'static str, user_message: String, fallback_path: &'static str },
}

impl GuardrailDecision {
    /// The user-facing replacement text, if the answer must not go out as is.
    pub fn replacement(&self) -> Option<&str> {
        match self {
            Self::Allow => None,
            Self::Deny { user_message, .. } | Self::Degrade { user_message, .. } => {
                Some(user_message.as_str())
            }
        }
    }

    pub fn reason_code(&self) -> Option<&'static str> {
        match self {
            Self::Allow => None,
            Self::Deny { reason_code, .. } | Self::Degrade { reason_code, .. } => Some(*reason_code),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GuardrailPolicy {
    /// Block answers that were not grounded in at least one tool call.
    pub require_tool_use: bool,
}

impl Default for GuardrailPolicy {
    fn default() -> Self {
        Self { require_tool_use: true }
    }
}

impl GuardrailPolicy {
    pub fn evaluate(&self, check: AnswerCheck) -> GuardrailDecision {
        match check {
            AnswerCheck::ToolsUnavailable => GuardrailDecision::Deny {
                reason_code: "catalog_tools_unavailable",
                user_message: CATALOG_UNAVAILABLE_MESSAGE.to_string(),
                fallback_path: "retry_later",
            },
            AnswerCheck::FinalAnswer { used_tools: false, forced: false, .. }
                if self.require_tool_use =>
            {
                GuardrailDecision::Deny {
                    reason_code: "answer_without_lookup",
                    user_message: LOOKUP_REQUIRED_MESSAGE.to_string(),
                    fallback_path: "retry_question",
                }
            }
            AnswerCheck::FinalAnswer { empty: true, forced: true, .. } => {
                GuardrailDecision::Degrade {
                    reason_code: "forced_summary_empty",
                    user_message: FORCED_STOP_MESSAGE.to_string(),
                    fallback_path: "rephrase_question",
                }
            }
            AnswerCheck::FinalAnswer { empty: true, .. } => GuardrailDecision::Degrade {
                reason_code: "empty_answer",
                user_message: LOOKUP_REQUIRED_MESSAGE.to_string(),
                fallback_path: "retry_question",
            },
            AnswerCheck::FinalAnswer { .. } => GuardrailDecision::Allow,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{AnswerCheck, GuardrailDecision, GuardrailPolicy};
    use crate::prompts::{CATALOG_UNAVAILABLE_MESSAGE, FORCED_STOP_MESSAGE, LOOKUP_REQUIRED_MESSAGE};

    fn final_answer(used_tools: bool, forced: bool, empty: bool) -> AnswerCheck {
        AnswerCheck::FinalAnswer { used_tools, forced, empty }
    }

    #[test]
    fn grounded_answer_is_allowed() {
        let policy = GuardrailPolicy::default();
        assert_eq!(policy.evaluate(final_answer(true, false, false)), GuardrailDecision::Allow);
    }

    #[test]
    fn missing_tools_denies_with_unavailable_text() {
        let decision = GuardrailPolicy::default().evaluate(AnswerCheck::ToolsUnavailable);
        assert_eq!(decision.reason_code(), Some("catalog_tools_unavailable"));
        assert_eq!(decision.replacement(), Some(CATALOG_UNAVAILABLE_MESSAGE));
    }

    #[test]
    fn ungrounded_answer_is_denied_only_when_required() {
        let strict = GuardrailPolicy::default().evaluate(final_answer(false, false, false));
        let (reason_code, user_message, fallback_path) = match strict {
            GuardrailDecision::Deny { reason_code, user_message, fallback_path } => {
                (reason_code, user_message, fallback_path)
            }
            _ => ("", String::new(), ""),
        };
        assert_eq!(reason_code, "answer_without_lookup");
        assert_eq!(user_message, LOOKUP_REQUIRED_MESSAGE);
        assert_eq!(fallback_path, "retry_question");

        let relaxed = GuardrailPolicy { require_tool_use: false };
        assert_eq!(relaxed.evaluate(final_answer(false, false, false)), GuardrailDecision::Allow);
    }

    #[test]
    fn empty_forced_summary_degrades_to_fallback() {
        let decision = GuardrailPolicy::default().evaluate(final_answer(true, true, true));
        assert!(matches!(decision, GuardrailDecision::Degrade { reason_code: "forced_summary_empty", .. }));
        assert_eq!(decision.replacement(), Some(FORCED_STOP_MESSAGE));
    }

    #[test]
    fn forced_summary_without_tools_still_goes_out() {
        let decision = GuardrailPolicy::default().evaluate(final_answer(false, true, false));
        assert_eq!(decision, GuardrailDecision::Allow);
    }
}
