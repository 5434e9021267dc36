pub mod clock;
pub mod config;
pub mod conversation;
pub mod errors;
pub mod retry;
pub mod segment;

pub use clock::{Clock, ManualClock, SystemClock};
pub use conversation::{PriorMessage, Role, ToolCall, ToolCallId, ToolOutcome, ToolResult, Turn};
pub use errors::{ApplicationError, InterfaceError};
pub use retry::RetryPolicy;
pub use segment::segment;
