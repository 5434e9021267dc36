//! Chat-platform boundary for the catalog assistant.
//!
//! - **Events** (`events`): mention and direct-message envelopes, the dispatcher, and
//!   the question handler that answers in thread
//! - **Platform** (`platform`): outbound Web API calls (history, reactions, posts)
//! - **Socket Mode** (`socket`): envelope pump with reconnect and per-event tasks
//!
//! ```text
//! Socket envelope → EventDispatcher → QuestionHandler → QuestionService → chunks
//!                                           ↓
//!                                   ChatPlatform (reaction, history, posts)
//! ```

pub mod events;
pub mod platform;
pub mod socket;
